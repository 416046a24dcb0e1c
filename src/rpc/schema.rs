//! The published request schema and the validation that enforces it.
//!
//! Nothing reaches the content model or the reconciler without passing
//! [`validate`] first; the same table is what `getSchema` returns.

use serde::Serialize;
use serde_json::{Map, Value, json};

use super::protocol::{METHOD_NOT_FOUND, RpcError};
use crate::actor::messages::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamType {
    String,
    /// A string or `null`; the key itself must be present when required
    NullableString,
    /// Non-negative integer
    Integer,
    /// Array of topic names
    Topics,
    /// Array of site-relative paths
    Paths,
}

#[derive(Debug, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MethodSpec {
    pub name: &'static str,
    pub params: &'static [ParamSpec],
    pub result: &'static str,
    pub description: &'static str,
}

const fn param(
    name: &'static str,
    ty: ParamType,
    required: bool,
    description: &'static str,
) -> ParamSpec {
    ParamSpec {
        name,
        ty,
        required,
        description,
    }
}

pub static METHODS: &[MethodSpec] = &[
    MethodSpec {
        name: "getSiteInfo",
        params: &[],
        result: "SiteInfo",
        description: "Site name, directories, content formats and current version",
    },
    MethodSpec {
        name: "getSchema",
        params: &[],
        result: "Schema",
        description: "This document",
    },
    MethodSpec {
        name: "getTree",
        params: &[],
        result: "Tree",
        description: "Every node of the current snapshot, without text",
    },
    MethodSpec {
        name: "getNode",
        params: &[param("path", ParamType::String, true, "Site-relative path")],
        result: "Node",
        description: "One node, with its text when it has any",
    },
    MethodSpec {
        name: "applyEdit",
        params: &[
            param("path", ParamType::String, true, "Site-relative path"),
            param(
                "content",
                ParamType::NullableString,
                true,
                "New file text, or null to delete",
            ),
        ],
        result: "EditResult",
        description: "Write or delete a file and publish a new version",
    },
    MethodSpec {
        name: "requestBuild",
        params: &[param(
            "paths",
            ParamType::Paths,
            false,
            "Sources to rebuild (passed to the generator as $PATHS); the whole site when omitted",
        )],
        result: "BuildJob",
        description: "Build the current version; returns the job that will do it",
    },
    MethodSpec {
        name: "cancelBuild",
        params: &[param("seq", ParamType::Integer, true, "Queued job to cancel")],
        result: "BuildJob",
        description: "Cancel a queued build",
    },
    MethodSpec {
        name: "getBuildStatus",
        params: &[],
        result: "BuildStatus",
        description: "Site state with queued, running and recent jobs",
    },
    MethodSpec {
        name: "subscribe",
        params: &[param(
            "topics",
            ParamType::Topics,
            false,
            "Any of tree, build, conflict; all when omitted",
        )],
        result: "Subscription",
        description: "Receive treeChanged, buildStatusChanged and conflict notifications",
    },
    MethodSpec {
        name: "unsubscribe",
        params: &[],
        result: "boolean",
        description: "Stop receiving notifications",
    },
];

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetSiteInfo,
    GetSchema,
    GetTree,
    GetNode { path: String },
    ApplyEdit { path: String, content: Option<String> },
    RequestBuild { paths: Vec<String> },
    CancelBuild { seq: u64 },
    GetBuildStatus,
    Subscribe { topics: Vec<Topic> },
    Unsubscribe,
}

pub fn find(method: &str) -> Option<&'static MethodSpec> {
    METHODS.iter().find(|spec| spec.name == method)
}

/// Everything `getSchema` reports.
pub fn document() -> Value {
    json!({
        "protocol": "jsonrpc-2.0",
        "methods": METHODS,
        "notifications": [
            { "name": "treeChanged", "params": "{ version, changed }", "topic": "tree" },
            { "name": "buildStatusChanged", "params": "BuildJob", "topic": "build" },
            { "name": "conflict", "params": "ConflictRecord", "topic": "conflict" },
        ],
    })
}

/// Check `params` against `method`'s schema and decode them.
pub fn validate(method: &str, params: Value) -> Result<Call, RpcError> {
    let spec = find(method)
        .ok_or_else(|| RpcError::new(METHOD_NOT_FOUND, format!("method not found: {method}")))?;
    let mut args = named(spec, params)?;

    let call = match spec.name {
        "getSiteInfo" => Call::GetSiteInfo,
        "getSchema" => Call::GetSchema,
        "getTree" => Call::GetTree,
        "getNode" => Call::GetNode {
            path: string(&mut args, "path")?,
        },
        "applyEdit" => Call::ApplyEdit {
            path: string(&mut args, "path")?,
            content: nullable_string(&mut args, "content")?,
        },
        "requestBuild" => Call::RequestBuild {
            paths: paths(&mut args, "paths")?,
        },
        "cancelBuild" => Call::CancelBuild {
            seq: integer(&mut args, "seq")?,
        },
        "getBuildStatus" => Call::GetBuildStatus,
        "subscribe" => Call::Subscribe {
            topics: topics(&mut args, "topics")?,
        },
        "unsubscribe" => Call::Unsubscribe,
        _ => return Err(RpcError::new(METHOD_NOT_FOUND, format!("method not found: {method}"))),
    };
    Ok(call)
}

/// Turn positional or named params into a map, rejecting unknown and
/// missing keys.
fn named(spec: &MethodSpec, params: Value) -> Result<Map<String, Value>, RpcError> {
    let args = match params {
        Value::Object(map) => map,
        Value::Array(items) => {
            if items.len() > spec.params.len() {
                return Err(RpcError::invalid_params(
                    "params",
                    format!(
                        "`{}` takes at most {} positional parameter(s)",
                        spec.name,
                        spec.params.len()
                    ),
                ));
            }
            spec.params
                .iter()
                .zip(items)
                .map(|(p, v)| (p.name.to_string(), v))
                .collect()
        }
        _ => return Err(RpcError::invalid_params("params", "must be an object or array")),
    };

    if let Some(unknown) = args.keys().find(|k| spec.params.iter().all(|p| p.name != k.as_str())) {
        return Err(RpcError::invalid_params(unknown, "unknown parameter"));
    }
    if let Some(missing) = spec.params.iter().find(|p| p.required && !args.contains_key(p.name)) {
        return Err(RpcError::invalid_params(missing.name, "is required"));
    }
    Ok(args)
}

fn string(args: &mut Map<String, Value>, field: &str) -> Result<String, RpcError> {
    match args.remove(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) => Err(RpcError::invalid_params(field, "must not be empty")),
        _ => Err(RpcError::invalid_params(field, "must be a string")),
    }
}

fn nullable_string(args: &mut Map<String, Value>, field: &str) -> Result<Option<String>, RpcError> {
    match args.remove(field) {
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Null) => Ok(None),
        _ => Err(RpcError::invalid_params(field, "must be a string or null")),
    }
}

fn integer(args: &mut Map<String, Value>, field: &str) -> Result<u64, RpcError> {
    args.remove(field)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| RpcError::invalid_params(field, "must be a non-negative integer"))
}

/// Omitted or `null` means no filter.
fn paths(args: &mut Map<String, Value>, field: &str) -> Result<Vec<String>, RpcError> {
    let items = match args.remove(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) if !items.is_empty() => items,
        Some(Value::Array(_)) => {
            return Err(RpcError::invalid_params(field, "must name at least one path"));
        }
        Some(_) => return Err(RpcError::invalid_params(field, "must be an array of paths")),
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) if !s.is_empty() => Ok(s),
            _ => Err(RpcError::invalid_params(field, "must contain non-empty strings")),
        })
        .collect()
}

fn topics(args: &mut Map<String, Value>, field: &str) -> Result<Vec<Topic>, RpcError> {
    let items = match args.remove(field) {
        None | Some(Value::Null) => return Ok(Topic::ALL.to_vec()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(RpcError::invalid_params(field, "must be an array of topics")),
    };

    let mut topics = Vec::with_capacity(items.len());
    for item in &items {
        let topic = item.as_str().and_then(Topic::parse).ok_or_else(|| {
            RpcError::invalid_params(
                field,
                format!("unknown topic {item}, expected tree, build or conflict"),
            )
        })?;
        if !topics.contains(&topic) {
            topics.push(topic);
        }
    }
    if topics.is_empty() {
        return Err(RpcError::invalid_params(field, "must name at least one topic"));
    }
    Ok(topics)
}
