//! Binary encoding of the chunkedgraph `*_binary` endpoints: a packed array of
//! little-endian `u64`s, nothing else.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rootsync::{LeafId, RootId, ServiceError};

const ID_WIDTH: usize = size_of::<u64>();

/// Packs `keys` in order.
pub fn encode_leaves(keys: &[LeafId]) -> Bytes {
    let mut buf = BytesMut::with_capacity(keys.len() * ID_WIDTH);
    for key in keys {
        buf.put_u64_le(key.to_raw());
    }
    buf.freeze()
}

/// Unpacks a response body into roots, in request order.
///
/// # Errors
///
/// Returns [`ServiceError::Decode`] if the body is not a whole number of IDs.
pub fn decode_roots(mut body: Bytes) -> Result<Vec<RootId>, ServiceError> {
    if body.len() % ID_WIDTH != 0 {
        return Err(ServiceError::Decode(format!(
            "binary id payload of {} bytes is not a multiple of {ID_WIDTH}",
            body.len()
        )));
    }

    let mut roots = Vec::with_capacity(body.len() / ID_WIDTH);
    while body.has_remaining() {
        roots.push(RootId::new(body.get_u64_le()));
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_little_endian() {
        let bytes = encode_leaves(&[LeafId::new(1), LeafId::new(0x0102_0304_0506_0708)]);
        assert_eq!(
            bytes.as_ref(),
            &[1, 0, 0, 0, 0, 0, 0, 0, 8, 7, 6, 5, 4, 3, 2, 1]
        );
    }

    #[test]
    fn decodes_what_the_service_sends() {
        let body = Bytes::from_static(&[
            0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x08, //
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        ]);
        assert_eq!(
            decode_roots(body).unwrap(),
            vec![RootId::new(0x0877_6655_4433_2211), RootId::new(u64::MAX)]
        );
    }

    #[test]
    fn rejects_truncated_payload() {
        let body = Bytes::from_static(&[1, 2, 3]);
        assert!(matches!(decode_roots(body), Err(ServiceError::Decode(_))));
    }

    #[test]
    fn empty_payload_is_empty() {
        assert!(decode_roots(Bytes::new()).unwrap().is_empty());
        assert!(encode_leaves(&[]).is_empty());
    }
}
