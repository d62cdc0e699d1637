//! Shared handler utilities used across RPC domains.

use appbridge_core::{BridgeError, EndpointId};
use serde_json::Value;

/// Extract an optional string parameter, supporting both snake_case and camelCase.
pub(crate) fn get_str_param<'a>(params: &'a Value, snake: &str, camel: &str) -> Option<&'a str> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_str())
}

/// Extract a required string parameter or return an error.
pub(crate) fn require_str_param(
    params: &Value,
    snake: &str,
    camel: &str,
) -> appbridge_core::Result<String> {
    get_str_param(params, snake, camel)
        .map(String::from)
        .ok_or_else(|| BridgeError::InvalidParams {
            message: format!("Missing required parameter: {}", snake),
        })
}

/// Extract an optional i64 parameter, supporting both snake_case and camelCase.
pub(crate) fn get_i64_param(params: &Value, snake: &str, camel: &str) -> Option<i64> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_i64())
}

/// Extract a required unsigned parameter that must fit in `T`.
pub(crate) fn require_uint_param<T: TryFrom<i64>>(
    params: &Value,
    snake: &str,
    camel: &str,
) -> appbridge_core::Result<T> {
    let raw = get_i64_param(params, snake, camel).ok_or_else(|| BridgeError::InvalidParams {
        message: format!("Missing required parameter: {}", snake),
    })?;
    T::try_from(raw).map_err(|_| BridgeError::InvalidParams {
        message: format!("Parameter {} out of range: {}", snake, raw),
    })
}

/// Extract the `endpoint_id` parameter.
pub(crate) fn require_endpoint_param(params: &Value) -> appbridge_core::Result<EndpointId> {
    require_uint_param::<u16>(params, "endpoint_id", "endpointId").map(EndpointId::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_accept_both_casings() {
        let params = json!({"app_name": "a", "clusterId": 6});
        assert_eq!(get_str_param(&params, "app_name", "appName"), Some("a"));
        assert_eq!(get_i64_param(&params, "cluster_id", "clusterId"), Some(6));
    }

    #[test]
    fn test_missing_required_param() {
        let err = require_str_param(&json!({}), "app_name", "appName").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidParams { .. }));
    }

    #[test]
    fn test_endpoint_param_range() {
        assert_eq!(
            require_endpoint_param(&json!({"endpoint_id": 5})).unwrap(),
            EndpointId::new(5)
        );
        assert!(require_endpoint_param(&json!({"endpoint_id": 70000})).is_err());
        assert!(require_endpoint_param(&json!({"endpoint_id": -1})).is_err());
        assert!(require_uint_param::<u32>(&json!({"cluster_id": -1}), "cluster_id", "clusterId")
            .is_err());
    }
}
