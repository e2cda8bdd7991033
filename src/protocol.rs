//! Request and response envelopes.
//!
//! The wire protocol is JSON-RPC flavoured but deliberately loose: requests
//! carry a `method` and optional `params`, responses carry exactly one of
//! `result` or `error`. An `id` is optional and echoed back when supplied.
//!
//! ```json
//! {"method": "tools/call", "params": {"name": "scrape_url", "arguments": {"url": "https://example.com"}}}
//! {"result": {"success": true, "data": {}}}
//! {"error": {"code": -32602, "message": "Unknown tool: nonexistent"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RpcError;

/// Supported top-level methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Initialize,
    ToolsList,
    ToolsCall,
}

impl Method {
    /// Resolves a wire method name.
    pub fn parse(name: &str) -> Result<Self, RpcError> {
        match name {
            "initialize" => Ok(Self::Initialize),
            "tools/list" => Ok(Self::ToolsList),
            "tools/call" => Ok(Self::ToolsCall),
            other => Err(RpcError::MethodNotFound {
                method: other.to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
        }
    }
}

/// An incoming request envelope.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RpcRequest {
    /// Optional correlation id, echoed in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name, e.g. `tools/call`.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: RequestParams,
}

/// Parameters of a request. Only `tools/call` uses them.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RequestParams {
    /// Tool name for `tools/call`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Raw tool arguments; validated against the tool contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl RpcRequest {
    /// Builds a request for `method` with no parameters.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            id: None,
            method: method.into(),
            params: RequestParams::default(),
        }
    }

    /// Builds a `tools/call` request.
    pub fn call(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: None,
            method: Method::ToolsCall.as_str().to_string(),
            params: RequestParams {
                name: Some(tool.into()),
                arguments: Some(arguments),
            },
        }
    }

    /// Parses one wire message.
    ///
    /// Invalid JSON and JSON that is not a request object both yield
    /// [`RpcError::Parse`].
    pub fn parse(text: &str) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_str(text).map_err(|e| RpcError::parse(&e))?;
        Self::from_value(value)
    }

    /// Interprets an already-decoded JSON value as a request.
    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        if !value.is_object() {
            return Err(RpcError::Parse {
                message: "request must be a JSON object".to_string(),
            });
        }
        serde_json::from_value(value).map_err(|e| RpcError::Parse {
            message: format!("invalid request envelope: {e}"),
        })
    }

    /// Arguments as an object; absent or null arguments become an empty map.
    ///
    /// Returns the raw value untouched when it is some other JSON type so the
    /// validator can report it.
    pub fn arguments(&self) -> Value {
        match &self.params.arguments {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(v) => v.clone(),
        }
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
}

/// An outgoing response envelope. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl RpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, error: &RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.to_error_object()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Error code, if this is an error envelope.
    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }

    /// Serializes the envelope as a single line of JSON.
    ///
    /// `serde_json` escapes control characters inside strings, so the output
    /// never contains a raw newline.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            // Only reachable with non-string map keys, which this type never has.
            format!(r#"{{"error":{{"code":-32603,"message":"response encoding failed: {e}"}}}}"#)
        })
    }
}
