//! Routed request types.

use crate::models::EndpointId;
use serde::{Deserialize, Serialize};

/// Whether a request invokes a command or reads an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteOperation {
    Command { command_id: u32 },
    ReadAttribute { attribute_id: u32 },
}

/// A decoded cluster request addressed to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteRequest {
    pub endpoint_id: EndpointId,
    pub cluster_id: u32,
    #[serde(flatten)]
    pub operation: RouteOperation,
    #[serde(default)]
    pub payload: String,
}

impl RouteRequest {
    pub fn command(
        endpoint_id: EndpointId,
        cluster_id: u32,
        command_id: u32,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            operation: RouteOperation::Command { command_id },
            payload: payload.into(),
        }
    }

    pub fn read_attribute(endpoint_id: EndpointId, cluster_id: u32, attribute_id: u32) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            operation: RouteOperation::ReadAttribute { attribute_id },
            payload: String::new(),
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self.operation, RouteOperation::Command { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_is_flat() {
        let request = RouteRequest::command(EndpointId::new(5), 1289, 0, r#"{"0":1}"#);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["endpoint_id"], 5);
        assert_eq!(value["kind"], "command");
        assert_eq!(value["command_id"], 0);

        let parsed: RouteRequest = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_attribute_read_without_payload() {
        let json = r#"{"endpoint_id": 7, "cluster_id": 1290, "kind": "read_attribute", "attribute_id": 1}"#;
        let parsed: RouteRequest = serde_json::from_str(json).unwrap();
        assert!(!parsed.is_command());
        assert_eq!(parsed.payload, "");
    }
}
