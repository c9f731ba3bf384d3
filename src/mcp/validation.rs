//! MCP Message Validation
//!
//! Structural checks on incoming JSON before it is dispatched, so malformed
//! envelopes are answered with `Invalid Request` instead of reaching a
//! handler.

use crate::mcp::protocol::*;
use anyhow::{Result, anyhow, bail};
use serde_json::Value;
use tracing::debug;

/// Validator for JSON-RPC envelopes and MCP method parameters
#[derive(Debug, Default)]
pub struct McpValidator;

impl McpValidator {
    #[inline]
    pub fn new() -> Self {
        Self
    }

    /// Validate a raw JSON value and classify it as a JSON-RPC message
    #[inline]
    pub fn validate_raw_message(&self, value: &Value) -> Result<JsonRpcMessage> {
        let object = value
            .as_object()
            .ok_or_else(|| anyhow!("Message must be a JSON object"))?;

        match object.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            Some(other) => bail!("Unsupported jsonrpc version: {}", other),
            None => bail!("Missing jsonrpc version"),
        }

        if let Some(id) = object.get("id") {
            let valid_id = id.is_string()
                || id.is_i64()
                || (id.is_null() && !object.contains_key("method"));
            if !valid_id {
                bail!("Request id must be a string or an integer");
            }
        }

        let message: JsonRpcMessage = serde_json::from_value(value.clone())
            .map_err(|e| anyhow!("Value does not match any known JSON-RPC message type: {}", e))?;

        if let JsonRpcMessage::Request(request) = &message {
            if let Some(params) = &request.params {
                self.validate_method_params(&request.method, params)?;
            }
        }

        Ok(message)
    }

    /// Validate method-specific parameters
    fn validate_method_params(&self, method: &str, params: &Value) -> Result<()> {
        match method {
            "initialize" => {
                require_string(params, "protocolVersion")?;
                let client_info = params
                    .get("clientInfo")
                    .ok_or_else(|| anyhow!("Missing clientInfo"))?;
                require_string(client_info, "name")?;
                require_string(client_info, "version")?;
            }
            "tools/call" => {
                require_string(params, "name")?;
                if let Some(arguments) = params.get("arguments") {
                    if !arguments.is_object() && !arguments.is_null() {
                        bail!("Tool arguments must be an object");
                    }
                }
            }
            _ => {
                debug!("No parameter validation for method: {}", method);
            }
        }
        Ok(())
    }

    /// Check if a protocol version is supported
    #[inline]
    pub fn is_protocol_version_supported(&self, version: &str) -> bool {
        SUPPORTED_VERSIONS.contains(&version)
    }

    /// Get supported protocol versions
    #[inline]
    pub fn supported_protocol_versions(&self) -> Vec<&'static str> {
        SUPPORTED_VERSIONS.to_vec()
    }
}

fn require_string(value: &Value, field: &str) -> Result<()> {
    match value.get(field) {
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(anyhow!("Field '{}' must be a string", field)),
        None => Err(anyhow!("Missing required field '{}'", field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn protocol_version_validation() {
        let validator = McpValidator::new();

        assert!(validator.is_protocol_version_supported(MCP_VERSION));
        assert!(validator.is_protocol_version_supported("2024-11-05"));
        assert!(!validator.is_protocol_version_supported("invalid-version"));
    }

    #[test]
    fn request_validation() {
        let validator = McpValidator::new();

        let message = validator
            .validate_raw_message(&json!({
                "jsonrpc": "2.0",
                "method": "tools/list",
                "id": "test-id"
            }))
            .expect("valid request");
        assert!(matches!(message, JsonRpcMessage::Request(_)));
    }

    #[test]
    fn notification_validation() {
        let validator = McpValidator::new();

        let message = validator
            .validate_raw_message(&json!({
                "jsonrpc": "2.0",
                "method": "notifications/initialized"
            }))
            .expect("valid notification");
        assert!(matches!(message, JsonRpcMessage::Notification(_)));
    }

    #[test]
    fn initialize_params_validation() {
        let validator = McpValidator::new();

        let valid = json!({
            "jsonrpc": "2.0",
            "method": "initialize",
            "id": 1,
            "params": {
                "protocolVersion": MCP_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            }
        });
        assert!(validator.validate_raw_message(&valid).is_ok());

        let missing_client = json!({
            "jsonrpc": "2.0",
            "method": "initialize",
            "id": 1,
            "params": {"protocolVersion": MCP_VERSION}
        });
        assert!(validator.validate_raw_message(&missing_client).is_err());
    }

    #[test]
    fn invalid_envelopes_are_rejected() {
        let validator = McpValidator::new();

        assert!(validator.validate_raw_message(&json!([1, 2])).is_err());
        assert!(
            validator
                .validate_raw_message(&json!({"jsonrpc": "1.0", "method": "ping", "id": 1}))
                .is_err()
        );
        assert!(
            validator
                .validate_raw_message(&json!({"jsonrpc": "2.0", "method": "ping", "id": 1.5}))
                .is_err()
        );
        assert!(
            validator
                .validate_raw_message(&json!({
                    "jsonrpc": "2.0",
                    "method": "tools/call",
                    "id": 2,
                    "params": {"name": "ask", "arguments": "question"}
                }))
                .is_err()
        );
    }
}
