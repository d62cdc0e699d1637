//! Durable projection of a content app.

use crate::config::StoreConfig;
use serde::{Deserialize, Serialize};

use super::EndpointId;

/// What the endpoint store remembers about a content app, keyed by app name.
///
/// Every field is defaulted on read so records written by older schema
/// versions (which lacked `version` and `endpoint_id`) still load: strings
/// become empty and the endpoint becomes [`EndpointId::INVALID`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointRecord {
    pub schema: u32,
    pub vendor_id: u16,
    pub vendor_name: String,
    pub product_id: u16,
    pub version: String,
    pub endpoint_id: EndpointId,
}

impl Default for EndpointRecord {
    fn default() -> Self {
        Self {
            schema: StoreConfig::RECORD_SCHEMA_VERSION,
            vendor_id: 0,
            vendor_name: String::new(),
            product_id: 0,
            version: String::new(),
            endpoint_id: EndpointId::INVALID,
        }
    }
}

impl EndpointRecord {
    /// Serialize into the tagged string form kept by the record backend.
    pub fn encode(&self) -> serde_json::Result<String> {
        let mut record = self.clone();
        record.schema = StoreConfig::RECORD_SCHEMA_VERSION;
        serde_json::to_string(&record)
    }

    /// Parse the tagged string form.
    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
