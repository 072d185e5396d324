//! JSON-RPC 2.0 envelopes exchanged with the diagnostic agent.
//! - Request: outbound start requests and fire-and-forget notifications
//! - Inbound/decode: tagged decode of reply, error reply and notification shapes
//! - ReplyResult/InstanceParams/EodParams: typed payloads of inbound messages

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::error::ProtocolError;

/// Fixed protocol version tag.
pub const JSONRPC_VERSION: &str = "2.0";

/// Reserved end-of-diagnostic method.
pub const EOD_METHOD: &str = "eod";

/// Outbound request or notification.
///
/// `id: None` serializes as `null` and is never correlated with a reply.
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

impl<'a> Request<'a> {
    #[must_use]
    pub fn call(method: &'a str, id: u64, params: Option<&'a Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            id: Some(id),
            params,
        }
    }

    #[must_use]
    pub fn notify(method: &'a str, params: Option<&'a Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            id: None,
            params,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Params of a break request sent on the control channel.
#[derive(Debug, Clone, Serialize)]
pub struct BreakParams<'a> {
    #[serde(rename = "break")]
    pub diag: &'a str,
}

/// Envelope shapes the correlator distinguishes.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `result` present.
    Reply { id: Value, result: Value },
    /// `method` present.
    Notification {
        id: Value,
        method: Value,
        params: Option<Value>,
    },
    /// `error` present.
    ErrorReply { id: Value, error: Value },
    /// None of the above.
    Unrecognized { id: Value },
}

/// Validate the envelope and classify its shape.
///
/// `result` wins over `method`, which wins over `error`.
pub fn decode(text: &str) -> Result<Inbound, ProtocolError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| ProtocolError::InvalidJson(err.to_string().into()))?;
    let Value::Object(mut object) = value else {
        return Err(ProtocolError::NotAnObject);
    };
    match object.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        _ => return Err(ProtocolError::VersionMissing),
    }
    let id = object.remove("id").ok_or(ProtocolError::IdMissing)?;

    if let Some(result) = object.remove("result") {
        return Ok(Inbound::Reply { id, result });
    }
    if let Some(method) = object.remove("method") {
        let params = object.remove("params");
        return Ok(Inbound::Notification { id, method, params });
    }
    if let Some(error) = object.remove("error") {
        return Ok(Inbound::ErrorReply { id, error });
    }
    Ok(Inbound::Unrecognized { id })
}

/// Request id carried by a reply, if it is a non-negative integer.
#[must_use]
pub fn request_id(id: &Value) -> Option<u64> {
    id.as_u64()
}

#[must_use]
pub fn describe_id(id: &Value) -> SmolStr {
    match id {
        Value::String(text) => SmolStr::new(text),
        other => SmolStr::new(other.to_string()),
    }
}

/// Outcome of a start reply's `result` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyResult {
    /// Instance name, `None` when the agent could not start the diagnostic.
    pub diag: Option<SmolStr>,
    pub message: Option<Value>,
}

impl ReplyResult {
    /// `Err` when the payload is not an object or carries no `diag` key at all.
    pub fn parse(result: &Value) -> Result<Self, ProtocolError> {
        let object = result.as_object().ok_or(ProtocolError::MissingField {
            context: "result",
            field: "diag",
        })?;
        let diag = object.get("diag").ok_or(ProtocolError::MissingField {
            context: "result",
            field: "diag",
        })?;
        Ok(Self {
            diag: diag.as_str().map(SmolStr::new),
            message: object.get("message").cloned(),
        })
    }
}

/// Sub-events of a running instance notification; each is independent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InstanceParams {
    #[serde(default)]
    pub progress: Option<Value>,
    #[serde(default)]
    pub log: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl InstanceParams {
    pub fn parse(params: Option<&Value>) -> Result<Self, ProtocolError> {
        match params {
            None => Ok(Self::default()),
            Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())
                .map_err(|_| ProtocolError::InvalidParams("method")),
            Some(_) => Err(ProtocolError::InvalidParams("method")),
        }
    }
}

/// Filtering outcome the agent attaches to an end-of-diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterReport {
    pub enabled: bool,
    pub status: i64,
}

/// Params of the reserved end-of-diagnostic notification.
#[derive(Debug, Clone, PartialEq)]
pub struct EodParams {
    /// Final status; a non-integer status is reported as a startup failure.
    pub status: i64,
    pub diag: SmolStr,
    pub data: Option<Value>,
    pub filter: Option<FilterReport>,
}

impl EodParams {
    pub fn parse(params: Option<&Value>) -> Result<Self, ProtocolError> {
        let params = params.ok_or(ProtocolError::MissingField {
            context: "eod",
            field: "params",
        })?;
        let object = params
            .as_object()
            .ok_or(ProtocolError::InvalidParams("eod"))?;
        let status = object.get("status").ok_or(ProtocolError::MissingField {
            context: "eod",
            field: "status",
        })?;
        let status = status.as_i64().unwrap_or(crate::errcodes::STARTUP_FAILURE);
        let diag = object
            .get("diag")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingField {
                context: "eod",
                field: "diag",
            })?;
        Ok(Self {
            status,
            diag: SmolStr::new(diag),
            data: object.get("data").cloned(),
            filter: filter_report(object),
        })
    }
}

fn filter_report(object: &Map<String, Value>) -> Option<FilterReport> {
    let enabled = object.get("filterenabled").and_then(Value::as_i64)?;
    let status = object.get("filterstatus").and_then(Value::as_i64)?;
    Some(FilterReport {
        enabled: enabled != 0,
        status,
    })
}

/// `code`/`message` of an error reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorObject {
    pub code: Option<i64>,
    pub message: Option<Value>,
}

impl ErrorObject {
    #[must_use]
    pub fn parse(error: &Value) -> Self {
        Self {
            code: error.get("code").and_then(Value::as_i64),
            message: error.get("message").cloned(),
        }
    }
}
