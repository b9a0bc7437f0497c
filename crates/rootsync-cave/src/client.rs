use crate::{config::CaveConfig, info::DatastackInfo, wire};
use async_trait::async_trait;
use reqwest::{
    Client, Response, StatusCode,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use rootsync::{
    AnnotationService, Error, LeafId, LeafLayer, LookupErrorKind, NmCoord, Resolution, Result,
    RootId, ServiceError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Longest error body excerpt carried into an error message.
const MAX_ERROR_BODY: usize = 200;

const L2_COORDINATE_ATTRIBUTE: &str = "rep_coord_nm";

/// HTTP client for one CAVE datastack.
///
/// Built once per run with [`CaveClient::connect`] and shared by every lookup
/// worker. The underlying [`reqwest::Client`] pools connections internally, so
/// concurrent calls need no extra synchronization.
#[derive(Clone, Debug)]
pub struct CaveClient {
    http: Client,
    datastack: String,
    base_url: String,
    table: String,
    resolution: Resolution,
}

#[derive(Deserialize)]
struct LeavesResponse {
    leaf_ids: Vec<u64>,
}

#[derive(Serialize)]
struct L2Request<'a> {
    l2_ids: &'a [u64],
}

#[derive(Deserialize)]
struct L2Attributes {
    #[serde(default)]
    rep_coord_nm: Option<[f64; 3]>,
}

impl CaveClient {
    /// Resolves the datastack through the info service and builds a client
    /// for its chunkedgraph and L2 cache.
    ///
    /// # Errors
    ///
    /// - [`Error::Credential`] if the token is empty, not a valid header value
    ///   or rejected by the info service (401/403).
    /// - [`Error::Configuration`] if the info service cannot be reached, does
    ///   not know the datastack, or describes it in a way this client cannot
    ///   use.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(datastack = %config.datastack)))]
    pub async fn connect(config: CaveConfig) -> Result<Self> {
        let http = build_http(&config)?;
        let url = config.info_url();

        #[cfg(feature = "tracing")]
        tracing::debug!("Fetching datastack info from {url}");

        let response = http.get(&url).send().await.map_err(|e| Error::Configuration {
            reason: format!("cannot reach info service at {url}: {e}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Credential {
                    reason: format!("info service rejected the token ({status}): {body}"),
                },
                StatusCode::NOT_FOUND => Error::Configuration {
                    reason: format!("unknown datastack {:?}", config.datastack),
                },
                _ => Error::Configuration {
                    reason: format!("info service returned {status}: {body}"),
                },
            });
        }

        let body = response.bytes().await.map_err(|e| Error::Configuration {
            reason: format!("failed to read datastack info: {e}"),
        })?;
        let info = DatastackInfo::from_json(&body)?;

        Self::from_info(http, config.datastack, &info)
    }

    /// Builds a client from an already fetched datastack description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `info` does not describe a
    /// chunkedgraph datastack with a valid resolution.
    pub fn from_info(http: Client, datastack: impl Into<String>, info: &DatastackInfo) -> Result<Self> {
        let segmentation = info.segmentation()?;
        let client = Self {
            http,
            datastack: datastack.into(),
            base_url: info.service_base()?,
            table: segmentation.table,
            resolution: info.resolution()?,
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Connected to datastack {} (table {}, {})",
            client.datastack,
            client.table,
            client.base_url
        );

        Ok(client)
    }

    pub fn datastack(&self) -> &str {
        &self.datastack
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn leaves_url(&self, id: RootId) -> String {
        format!(
            "{}/segmentation/api/v1/table/{}/node/{id}/leaves",
            self.base_url, self.table
        )
    }

    fn roots_url(&self) -> String {
        format!(
            "{}/segmentation/api/v1/table/{}/roots_binary",
            self.base_url, self.table
        )
    }

    fn l2_attributes_url(&self) -> String {
        format!(
            "{}/l2cache/api/v1/table/{}/attributes",
            self.base_url, self.table
        )
    }
}

#[async_trait]
impl AnnotationService for CaveClient {
    async fn lookup_one(
        &self,
        id: RootId,
        layer: LeafLayer,
    ) -> core::result::Result<Option<LeafId>, LookupErrorKind> {
        let mut request = self.http.get(self.leaves_url(id));
        if let Some(stop_layer) = layer.stop_layer() {
            request = request.query(&[("stop_layer", stop_layer)]);
        }

        let response = request.send().await.map_err(lookup_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(lookup_status_error(status, error_body(response).await));
        }

        let leaves: LeavesResponse = response.json().await.map_err(lookup_transport_error)?;
        Ok(leaves.leaf_ids.first().copied().map(LeafId::new))
    }

    async fn bulk_resolve(
        &self,
        keys: &[LeafId],
    ) -> core::result::Result<HashMap<LeafId, RootId>, ServiceError> {
        let response = self
            .http
            .post(self.roots_url())
            .body(wire::encode_leaves(keys))
            .send()
            .await
            .map_err(service_transport_error)?;
        let response = check_service_status(response).await?;

        let body = response.bytes().await.map_err(service_transport_error)?;
        zip_roots(keys, wire::decode_roots(body)?)
    }

    async fn bulk_coordinate_fetch(
        &self,
        keys: &[LeafId],
    ) -> core::result::Result<HashMap<LeafId, NmCoord>, ServiceError> {
        let l2_ids: Vec<u64> = keys.iter().map(|k| k.to_raw()).collect();
        let response = self
            .http
            .post(self.l2_attributes_url())
            .query(&[("attribute_names", L2_COORDINATE_ATTRIBUTE)])
            .json(&L2Request { l2_ids: &l2_ids })
            .send()
            .await
            .map_err(service_transport_error)?;
        let response = check_service_status(response).await?;

        let body = response.bytes().await.map_err(service_transport_error)?;
        decode_l2_coordinates(&body)
    }

    async fn resolution_vector(&self) -> core::result::Result<Resolution, ServiceError> {
        // Fetched with the datastack info at connect time.
        Ok(self.resolution)
    }
}

fn build_http(config: &CaveConfig) -> Result<Client> {
    let token = config.token.trim();
    if token.is_empty() {
        return Err(Error::Credential {
            reason: "empty API token".to_string(),
        });
    }

    let mut auth = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
        Error::Credential {
            reason: "API token contains characters not allowed in a header".to_string(),
        }
    })?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth);

    Client::builder()
        .default_headers(headers)
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(concat!("rootsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Configuration {
            reason: format!("failed to build HTTP client: {e}"),
        })
}

async fn error_body(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    summarize_body(status, &body)
}

fn summarize_body(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status.canonical_reason().unwrap_or("no response body").to_string()
    } else {
        body.chars().take(MAX_ERROR_BODY).collect()
    }
}

async fn check_service_status(response: Response) -> core::result::Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(ServiceError::Status {
        status: status.as_u16(),
        message: error_body(response).await,
    })
}

fn lookup_status_error(status: StatusCode, message: String) -> LookupErrorKind {
    if status == StatusCode::NOT_FOUND {
        LookupErrorKind::NotFound
    } else {
        LookupErrorKind::Service {
            status: status.as_u16(),
            message,
        }
    }
}

fn lookup_transport_error(e: reqwest::Error) -> LookupErrorKind {
    if e.is_decode() {
        LookupErrorKind::Decode(e.to_string())
    } else {
        LookupErrorKind::Network(e.to_string())
    }
}

fn service_transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_decode() {
        ServiceError::Decode(e.to_string())
    } else {
        ServiceError::Network(e.to_string())
    }
}

/// Pairs each requested key with the root at the same index.
fn zip_roots(
    keys: &[LeafId],
    roots: Vec<RootId>,
) -> core::result::Result<HashMap<LeafId, RootId>, ServiceError> {
    if roots.len() != keys.len() {
        return Err(ServiceError::Incomplete {
            expected: keys.len(),
            actual: roots.len(),
        });
    }
    Ok(keys.iter().copied().zip(roots).collect())
}

/// Entries without a coordinate are left out; the caller treats the group as
/// incomplete.
fn decode_l2_coordinates(body: &[u8]) -> core::result::Result<HashMap<LeafId, NmCoord>, ServiceError> {
    let raw: HashMap<String, L2Attributes> =
        serde_json::from_slice(body).map_err(|e| ServiceError::Decode(e.to_string()))?;

    let mut coords = HashMap::with_capacity(raw.len());
    for (key, attributes) in raw {
        let key: LeafId = key
            .parse()
            .map_err(|e| ServiceError::Decode(format!("bad l2 id {key:?}: {e}")))?;
        if let Some([x, y, z]) = attributes.rep_coord_nm {
            coords.insert(key, NmCoord::new(x, y, z));
        }
    }
    Ok(coords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaveConfig;

    fn client() -> CaveClient {
        let info = DatastackInfo::from_json(
            br#"{
                "segmentation_source": "graphene://https://cave.example.org/segmentation/table/fly_v1",
                "local_server": "https://cave.example.org/",
                "viewer_resolution_x": 4,
                "viewer_resolution_y": 4,
                "viewer_resolution_z": 40
            }"#,
        )
        .unwrap();
        CaveClient::from_info(Client::new(), "fly", &info).unwrap()
    }

    #[test]
    fn builds_endpoint_urls() {
        let client = client();
        assert_eq!(client.table(), "fly_v1");
        assert_eq!(client.datastack(), "fly");
        assert_eq!(
            client.leaves_url(RootId::new(720575940621039145)),
            "https://cave.example.org/segmentation/api/v1/table/fly_v1/node/720575940621039145/leaves"
        );
        assert_eq!(
            client.roots_url(),
            "https://cave.example.org/segmentation/api/v1/table/fly_v1/roots_binary"
        );
        assert_eq!(
            client.l2_attributes_url(),
            "https://cave.example.org/l2cache/api/v1/table/fly_v1/attributes"
        );
    }

    #[test]
    fn not_found_is_its_own_lookup_error() {
        assert_eq!(
            lookup_status_error(StatusCode::NOT_FOUND, "gone".to_string()),
            LookupErrorKind::NotFound
        );
        assert_eq!(
            lookup_status_error(StatusCode::BAD_GATEWAY, "Bad Gateway".to_string()),
            LookupErrorKind::Service {
                status: 502,
                message: "Bad Gateway".to_string()
            }
        );
    }

    #[test]
    fn error_bodies_are_trimmed_and_capped() {
        assert_eq!(
            summarize_body(StatusCode::GATEWAY_TIMEOUT, "  "),
            "Gateway Timeout"
        );
        assert_eq!(summarize_body(StatusCode::BAD_REQUEST, " oops \n"), "oops");
        let long = "x".repeat(1000);
        assert_eq!(
            summarize_body(StatusCode::BAD_REQUEST, &long).len(),
            MAX_ERROR_BODY
        );
    }

    #[test]
    fn roots_pair_up_by_index() {
        let keys = [LeafId::new(1), LeafId::new(2)];
        let roots = zip_roots(&keys, vec![RootId::new(10), RootId::new(20)]).unwrap();
        assert_eq!(roots[&LeafId::new(2)], RootId::new(20));

        assert_eq!(
            zip_roots(&keys, vec![RootId::new(10)]),
            Err(ServiceError::Incomplete {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn decodes_l2_coordinates() {
        let body = br#"{
            "160032475051983415": {"rep_coord_nm": [400.0, 800.0, 4000.0]},
            "160032475051983416": {}
        }"#;
        let coords = decode_l2_coordinates(body).unwrap();

        assert_eq!(coords.len(), 1);
        assert_eq!(
            coords[&LeafId::new(160032475051983415)],
            NmCoord::new(400.0, 800.0, 4000.0)
        );
    }

    #[test]
    fn rejects_non_numeric_l2_keys() {
        let body = br#"{"abc": {"rep_coord_nm": [1, 2, 3]}}"#;
        assert!(matches!(
            decode_l2_coordinates(body),
            Err(ServiceError::Decode(_))
        ));
    }

    #[test]
    fn rejects_empty_token() {
        let config = CaveConfig::new("fly", "   ");
        assert!(matches!(
            build_http(&config),
            Err(Error::Credential { .. })
        ));
    }

    #[test]
    fn rejects_token_with_newline() {
        let config = CaveConfig::new("fly", "abc\ndef");
        assert!(matches!(
            build_http(&config),
            Err(Error::Credential { .. })
        ));
    }
}
