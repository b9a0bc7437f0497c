//! Datastack metadata from the info service.

use rootsync::{Error, Resolution, Result};
use serde::Deserialize;

/// Scheme prefix of chunkedgraph segmentation sources.
const GRAPHENE_SCHEME: &str = "graphene://";
const TABLE_SEGMENT: &str = "/segmentation/table/";

/// The fields of `GET /info/api/v2/datastack/full/{name}` this crate uses.
#[derive(Clone, Debug, Deserialize)]
pub struct DatastackInfo {
    /// e.g. `graphene://https://host/segmentation/table/fanc_v4`
    pub segmentation_source: String,
    /// Base URL of the datastack's own services. Falls back to the host of the
    /// segmentation source when absent.
    #[serde(default)]
    pub local_server: Option<String>,
    pub viewer_resolution_x: f64,
    pub viewer_resolution_y: f64,
    pub viewer_resolution_z: f64,
}

/// Where a datastack's chunkedgraph lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentationSource {
    /// Scheme and host, no trailing slash.
    pub server: String,
    pub table: String,
}

impl DatastackInfo {
    /// Parses an info service response body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the body is not valid datastack JSON.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| Error::Configuration {
            reason: format!("malformed datastack info: {e}"),
        })
    }

    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the segmentation source is not a
    /// chunkedgraph (`graphene://`) table.
    pub fn segmentation(&self) -> Result<SegmentationSource> {
        let source = self.segmentation_source.trim();
        let url = source
            .strip_prefix(GRAPHENE_SCHEME)
            .ok_or_else(|| Error::Configuration {
                reason: format!("segmentation source {source:?} is not a graphene source"),
            })?;

        let (server, table) = url.split_once(TABLE_SEGMENT).ok_or_else(|| Error::Configuration {
            reason: format!("segmentation source {source:?} has no table"),
        })?;
        let table = table.trim_end_matches('/');
        if table.is_empty() || table.contains('/') {
            return Err(Error::Configuration {
                reason: format!("segmentation source {source:?} has an invalid table name"),
            });
        }

        Ok(SegmentationSource {
            server: server.trim_end_matches('/').to_string(),
            table: table.to_string(),
        })
    }

    /// Base URL for the chunkedgraph and L2 cache of this datastack.
    ///
    /// # Errors
    ///
    /// See [`segmentation`](Self::segmentation).
    pub fn service_base(&self) -> Result<String> {
        match self.local_server.as_deref().map(str::trim) {
            Some(local) if !local.is_empty() => Ok(local.trim_end_matches('/').to_string()),
            _ => Ok(self.segmentation()?.server),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any axis is not a positive number.
    pub fn resolution(&self) -> Result<Resolution> {
        Resolution::new(
            self.viewer_resolution_x,
            self.viewer_resolution_y,
            self.viewer_resolution_z,
        )
    }
}
