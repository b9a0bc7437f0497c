//! # Identifier and coordinate types
//!
//! Root IDs and leaf IDs are both 64-bit integers on the wire, but they name
//! different things and must never be mixed up: a [`RootId`] names a whole
//! (versioned) segment, while a [`LeafId`] names one of its physically stable
//! sub-units. Wrapping both in distinct newtypes keeps the pipeline stages
//! honest about which one they hold.
//!
//! Coordinates come back from the service in nanometers ([`NmCoord`]) and are
//! converted to voxel-grid units ([`VoxelCoord`]) using the datastack's
//! [`Resolution`].

use crate::{Error, Result};
use core::{fmt, str::FromStr};

/// Why a token could not be turned into an identifier.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseIdError {
    #[error("empty identifier")]
    Empty,
    #[error("identifier contains non-digit characters")]
    NotNumeric,
    #[error("identifier does not fit in 64 bits")]
    Overflow,
}

fn parse_u64_digits(s: &str) -> core::result::Result<u64, ParseIdError> {
    if s.is_empty() {
        return Err(ParseIdError::Empty);
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseIdError::NotNumeric);
    }
    // Only overflow is left once every byte is a digit.
    s.parse::<u64>().map_err(|_| ParseIdError::Overflow)
}

/// A segment identifier in the remote annotation service.
///
/// Root IDs are versioned: every edit to a segment (split or merge) retires
/// the old root and mints a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(u64);

impl RootId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RootId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        parse_u64_digits(s).map(Self)
    }
}

impl From<u64> for RootId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// A leaf of a segment at some layer of the chunked graph: a supervoxel
/// (layer 1) or a level-2 chunk.
///
/// Leaves never change identity across edits, which is what makes them a
/// reliable key for finding the *current* root of an old one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafId(u64);

impl LeafId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LeafId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LeafId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        parse_u64_digits(s).map(Self)
    }
}

impl From<u64> for LeafId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Which layer of the chunked graph a lookup descends to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LeafLayer {
    /// Layer 1. Used for identity resolution.
    Supervoxel,
    /// Layer 2. Used for coordinate lookup through the L2 cache.
    Level2,
}

impl LeafLayer {
    /// The `stop_layer` query parameter for this layer, if any. Supervoxels
    /// are the service default.
    pub const fn stop_layer(self) -> Option<u8> {
        match self {
            Self::Supervoxel => None,
            Self::Level2 => Some(2),
        }
    }
}

/// A position in physical space, in nanometers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NmCoord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl NmCoord {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A position on the datastack's viewer voxel grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoxelCoord {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl VoxelCoord {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }
}

/// Nanometers per voxel along each axis. Fixed for a datastack, fetched once
/// per run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolution {
    x: f64,
    y: f64,
    z: f64,
}

impl Resolution {
    /// Builds a resolution vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any component is not a positive,
    /// finite number.
    pub fn new(x: f64, y: f64, z: f64) -> Result<Self> {
        for (axis, value) in [("x", x), ("y", y), ("z", z)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Configuration {
                    reason: format!("resolution along {axis} must be positive, got {value}"),
                });
            }
        }
        Ok(Self { x, y, z })
    }

    pub const fn x(&self) -> f64 {
        self.x
    }

    pub const fn y(&self) -> f64 {
        self.y
    }

    pub const fn z(&self) -> f64 {
        self.z
    }

    /// Converts a nanometer position to voxels by elementwise division,
    /// truncating toward zero.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_voxel(&self, nm: NmCoord) -> VoxelCoord {
        VoxelCoord {
            x: (nm.x / self.x) as i64,
            y: (nm.y / self.y) as i64,
            z: (nm.z / self.z) as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_id_parses_digits_only() {
        assert_eq!(
            "864691135123456789".parse::<RootId>(),
            Ok(RootId::new(864_691_135_123_456_789))
        );
        assert_eq!("".parse::<RootId>(), Err(ParseIdError::Empty));
        assert_eq!("12a".parse::<RootId>(), Err(ParseIdError::NotNumeric));
        assert_eq!("-12".parse::<RootId>(), Err(ParseIdError::NotNumeric));
        assert_eq!("+12".parse::<RootId>(), Err(ParseIdError::NotNumeric));
        assert_eq!(
            "18446744073709551616".parse::<RootId>(),
            Err(ParseIdError::Overflow)
        );
    }

    #[test]
    fn display_is_the_raw_integer() {
        assert_eq!(RootId::new(42).to_string(), "42");
        assert_eq!(LeafId::new(u64::MAX).to_string(), u64::MAX.to_string());
    }

    #[test]
    fn converts_nanometers_to_voxels() {
        let res = Resolution::new(4.0, 4.0, 40.0).unwrap();
        let voxel = res.to_voxel(NmCoord::new(400.0, 800.0, 4000.0));
        assert_eq!(voxel, VoxelCoord::new(100, 200, 100));
    }

    #[test]
    fn voxel_conversion_truncates_toward_zero() {
        let res = Resolution::new(4.0, 4.0, 40.0).unwrap();
        let voxel = res.to_voxel(NmCoord::new(403.9, 7.99, 79.0));
        assert_eq!(voxel, VoxelCoord::new(100, 1, 1));
    }

    #[test]
    fn rejects_degenerate_resolution() {
        assert!(Resolution::new(0.0, 4.0, 40.0).is_err());
        assert!(Resolution::new(4.0, -4.0, 40.0).is_err());
        assert!(Resolution::new(4.0, 4.0, f64::NAN).is_err());
        assert!(Resolution::new(4.0, 4.0, f64::INFINITY).is_err());
    }

    #[test]
    fn only_level2_sets_a_stop_layer() {
        assert_eq!(LeafLayer::Supervoxel.stop_layer(), None);
        assert_eq!(LeafLayer::Level2.stop_layer(), Some(2));
    }
}
