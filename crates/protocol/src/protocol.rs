//! Wire types: JSON-RPC 2.0 envelope and the capability API payloads.

use authority::ReasonCode;
use policy::{ActionType, Subject};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 request. A missing `id` makes it a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id.into()),
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: impl Serialize) -> Self {
        self.params = Some(serde_json::to_value(params).unwrap_or(Value::Null));
        self
    }
}

/// JSON-RPC 2.0 response.
///
/// `id` is `null` when the request could not be parsed far enough to read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Returns the result if successful, or the error.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(error) = self.error {
            Err(error)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// A capability rejection; `data` holds the [`ApiError`].
    pub const DOMAIN_ERROR: i32 = -32000;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    /// The structured rejection carried in `data`, if any.
    pub fn api_error(&self) -> Option<ApiError> {
        self.data
            .as_ref()
            .and_then(|d| serde_json::from_value(d.clone()).ok())
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.code;
        let message = &self.message;
        write!(f, "[{code}] {message}")
    }
}

impl std::error::Error for JsonRpcError {}

/// Request ID (can be string or number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

// --- Capability API payloads ---

/// Params for `capabilities/issue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCapabilityParams {
    /// Identity supplied by the authentication layer.
    pub context: Subject,
    pub client_id: String,
    pub phone: String,
    pub action_type: ActionType,
    pub source_module: String,
}

/// Result of `capabilities/issue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCapabilityResult {
    pub capability_token: String,
    pub expires_in_seconds: u64,
}

/// Params for `actions/callback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackParams {
    pub context: Subject,
    pub capability_token: String,
    pub client_id: String,
    pub phone: String,
}

/// Result of `actions/callback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResult {
    pub status: String,
    pub action_id: String,
}

/// A structured rejection: reason code plus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub reason_code: ReasonCode,
    pub message: String,
}

impl From<&authority::Error> for ApiError {
    fn from(e: &authority::Error) -> Self {
        Self {
            reason_code: e.reason_code(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::Role;

    #[test]
    fn deserialize_issue_request() {
        let json = r#"{
            "jsonrpc": "2.0",
            "id": 7,
            "method": "capabilities/issue",
            "params": {
                "context": {"userId": "operator-1", "role": "OPERATOR"},
                "clientId": "C-105",
                "phone": "+79001234567",
                "actionType": "crm:callback",
                "sourceModule": "mf-a"
            }
        }"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.id, Some(RequestId::Number(7)));

        let params: IssueCapabilityParams = serde_json::from_value(req.params.unwrap()).unwrap();
        assert_eq!(params.context.role, Role::Operator);
        assert_eq!(params.action_type, ActionType::callback());
    }

    #[test]
    fn notification_has_no_id() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"actions/callback"}"#).unwrap();
        assert!(req.id.is_none());
    }

    #[test]
    fn serialize_domain_failure() {
        let error = JsonRpcError::new(JsonRpcError::DOMAIN_ERROR, "capability has already been used")
            .with_data(ApiError::from(&authority::Error::CapabilityReplay));
        let resp = JsonRpcResponse::failure(Some(RequestId::from("a")), error);
        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["id"], "a");
        assert!(json.get("result").is_none());
        assert_eq!(json["error"]["code"], -32000);
        assert_eq!(json["error"]["data"]["reasonCode"], "CAPABILITY_REPLAY");
        assert_eq!(json["error"]["data"]["message"], "capability has already been used");
    }

    #[test]
    fn serialize_issue_result() {
        let result = IssueCapabilityResult {
            capability_token: "cap-1".into(),
            expires_in_seconds: 30,
        };
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"capabilityToken":"cap-1","expiresInSeconds":30}"#
        );
    }
}
