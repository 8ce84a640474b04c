//! Wire protocol: one JSON object per line in each direction.
//!
//! Requests carry `{op, params}`; responses carry `{ok, result}` or
//! `{ok: false, error}`. There is no request id — each connection handles one
//! request at a time and replies before reading the next line.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
  pub op: String,
  #[serde(default)]
  pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
  pub code: String,
  pub message: String,
  pub retryable: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
  pub ok: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<RpcError>,
}

impl RpcResponse {
  pub fn success(result: serde_json::Value) -> Self {
    Self { ok: true, result: Some(result), error: None }
  }

  pub fn failure(error: RpcError) -> Self {
    Self { ok: false, result: None, error: Some(error) }
  }
}

impl From<amanmcp_core::Error> for RpcError {
  fn from(e: amanmcp_core::Error) -> Self {
    Self {
      code: e.kind.code().to_string(),
      retryable: e.retryable(),
      suggestion: e.suggestion.clone(),
      message: e.to_string(),
    }
  }
}

impl From<amanmcp_core::Error> for RpcResponse {
  fn from(e: amanmcp_core::Error) -> Self {
    RpcResponse::failure(e.into())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn request_parses_from_json_line() {
    let req: RpcRequest = serde_json::from_str(r#"{"op":"status","params":{}}"#).unwrap();
    assert_eq!(req.op, "status");
  }

  #[test]
  fn request_defaults_params_when_absent() {
    let req: RpcRequest = serde_json::from_str(r#"{"op":"shutdown"}"#).unwrap();
    assert_eq!(req.params, serde_json::json!(null));
  }

  #[test]
  fn failure_response_omits_result() {
    let response = RpcResponse::failure(RpcError {
      code: "query_empty".to_string(),
      message: "query is empty".to_string(),
      retryable: false,
      suggestion: None,
    });
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["ok"], false);
    assert!(json.get("result").is_none());
  }
}
