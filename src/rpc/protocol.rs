//! JSON-RPC 2.0 envelopes.
//!
//! ```text
//! → {"jsonrpc":"2.0","id":1,"method":"getNode","params":{"path":"content/a.md"}}
//! ← {"jsonrpc":"2.0","id":1,"result":{...}}
//! ← {"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"...","data":{"field":"path","message":"..."}}}
//! ← {"jsonrpc":"2.0","method":"treeChanged","params":{"version":7,"changed":["content/a.md"]}}
//! ```

use serde::Serialize;
use serde_json::{Value, json};

use crate::actor::messages::SiteEvent;
use crate::core::SiteError;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const NOT_FOUND: i64 = 1;
pub const EDIT_FAILED: i64 = 2;

/// A well-formed request. `id: None` marks a notification (no reply).
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: Option<Value>,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_params(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: INVALID_PARAMS,
            message: format!("invalid `{field}`: {message}"),
            data: Some(json!({ "field": field, "message": message })),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    /// Map a domain error. Edit-path I/O failures carry code 2.
    pub fn from_site(err: &SiteError) -> Self {
        match err {
            SiteError::Validation { field, message } => Self::invalid_params(field, message.as_str()),
            SiteError::NotFound(_) => Self::new(NOT_FOUND, err.to_string()),
            SiteError::System { .. } | SiteError::Build { .. } | SiteError::Timeout { .. } => {
                Self::new(EDIT_FAILED, err.to_string())
            }
        }
    }
}

impl From<SiteError> for RpcError {
    fn from(err: SiteError) -> Self {
        Self::from_site(&err)
    }
}

/// Parse one inbound frame.
///
/// Returns the request, or the error to send back along with whatever id
/// could be recovered.
pub fn parse_request(text: &str) -> Result<Request, (Value, RpcError)> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| (Value::Null, RpcError::new(PARSE_ERROR, format!("parse error: {e}"))))?;

    let Value::Object(mut obj) = value else {
        return Err((
            Value::Null,
            RpcError::new(INVALID_REQUEST, "request must be a JSON object"),
        ));
    };

    let id = obj.remove("id");
    let reply_id = id.clone().unwrap_or(Value::Null);
    let invalid = |message: &str| (reply_id.clone(), RpcError::new(INVALID_REQUEST, message));

    if let Some(id) = &id
        && !matches!(id, Value::Null | Value::Number(_) | Value::String(_))
    {
        return Err((Value::Null, RpcError::new(INVALID_REQUEST, "`id` must be a number or string")));
    }
    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(invalid("`jsonrpc` must be \"2.0\""));
    }
    let method = match obj.remove("method") {
        Some(Value::String(method)) => method,
        _ => return Err(invalid("`method` must be a string")),
    };
    let params = match obj.remove("params") {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(params @ (Value::Object(_) | Value::Array(_))) => params,
        Some(_) => return Err(invalid("`params` must be an object or array")),
    };

    Ok(Request { id, method, params })
}

pub fn success(id: Value, result: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string()
}

pub fn failure(id: Value, error: &RpcError) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "error": error }).to_string()
}

/// Server-initiated message for `event`.
pub fn notification(event: &SiteEvent) -> String {
    let (method, params) = match event {
        SiteEvent::TreeChanged { version, changed } => {
            ("treeChanged", json!({ "version": version, "changed": changed }))
        }
        SiteEvent::BuildStatusChanged(job) => ("buildStatusChanged", to_value(job)),
        SiteEvent::Conflict(record) => ("conflict", to_value(record)),
    };
    json!({ "jsonrpc": "2.0", "method": method, "params": params }).to_string()
}

pub fn to_value(value: &impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ConflictRecord, Writer};

    #[test]
    fn test_parse_valid_request() {
        let req = parse_request(r#"{"jsonrpc":"2.0","id":3,"method":"getTree"}"#).unwrap();
        assert_eq!(req.id, Some(json!(3)));
        assert_eq!(req.method, "getTree");
        assert_eq!(req.params, json!({}));
    }

    #[test]
    fn test_parse_notification_has_no_id() {
        let req = parse_request(r#"{"jsonrpc":"2.0","method":"unsubscribe"}"#).unwrap();
        assert!(req.id.is_none());
    }

    #[test]
    fn test_parse_errors() {
        let (id, err) = parse_request("{not json").unwrap_err();
        assert_eq!(id, Value::Null);
        assert_eq!(err.code, PARSE_ERROR);

        let (_, err) = parse_request("[1,2]").unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);

        let (id, err) = parse_request(r#"{"jsonrpc":"1.0","id":"a","method":"x"}"#).unwrap_err();
        assert_eq!(id, json!("a"));
        assert_eq!(err.code, INVALID_REQUEST);

        let (_, err) = parse_request(r#"{"jsonrpc":"2.0","id":1,"method":5}"#).unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);

        let (_, err) =
            parse_request(r#"{"jsonrpc":"2.0","id":1,"method":"x","params":"p"}"#).unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);

        let (id, err) = parse_request(r#"{"jsonrpc":"2.0","id":{},"method":"x"}"#).unwrap_err();
        assert_eq!(id, Value::Null);
        assert_eq!(err.code, INVALID_REQUEST);
    }

    #[test]
    fn test_site_error_mapping() {
        let err = RpcError::from_site(&SiteError::validation("path", "must be relative"));
        assert_eq!(err.code, INVALID_PARAMS);
        assert_eq!(err.data, Some(json!({"field": "path", "message": "must be relative"})));

        let err = RpcError::from_site(&SiteError::NotFound("content/x.md".into()));
        assert_eq!(err.code, NOT_FOUND);

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = RpcError::from_site(&SiteError::system("write content/a.md", io));
        assert_eq!(err.code, EDIT_FAILED);
    }

    #[test]
    fn test_envelopes() {
        let ok: Value = serde_json::from_str(&success(json!(1), json!({"a": 1}))).unwrap();
        assert_eq!(ok["jsonrpc"], "2.0");
        assert_eq!(ok["result"]["a"], 1);

        let err: Value =
            serde_json::from_str(&failure(json!(2), &RpcError::new(METHOD_NOT_FOUND, "nope")))
                .unwrap();
        assert_eq!(err["error"]["code"], METHOD_NOT_FOUND);
        assert!(err["error"].get("data").is_none());
    }

    #[test]
    fn test_notifications() {
        let tree: Value = serde_json::from_str(&notification(&SiteEvent::TreeChanged {
            version: 7,
            changed: vec!["content/a.md".into()],
        }))
        .unwrap();
        assert_eq!(tree["method"], "treeChanged");
        assert_eq!(tree["params"]["version"], 7);
        assert!(tree.get("id").is_none());

        let conflict: Value = serde_json::from_str(&notification(&SiteEvent::Conflict(
            ConflictRecord {
                path: "content/a.md".into(),
                winner: Writer::Ui,
                loser: Writer::External,
                version: 3,
                lost_text: Some("vim".into()),
            },
        )))
        .unwrap();
        assert_eq!(conflict["method"], "conflict");
        assert_eq!(conflict["params"]["winner"], "ui");
        assert_eq!(conflict["params"]["lostText"], "vim");
    }
}
