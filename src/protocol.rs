use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Error, Result};

pub const NEW_TOKEN_PATH: &str = "/v1.0/token?grant_type=1";

pub fn refresh_token_path(refresh_token: &str) -> String {
    format!("/v1.0/token/{refresh_token}")
}

pub fn status_path(device_id: &str) -> String {
    format!("/v1.0/devices/{device_id}/status")
}

pub fn commands_path(device_id: &str) -> String {
    format!("/v1.0/devices/{device_id}/commands")
}

/// One `{code, value}` pair as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpStatus {
    pub code: String,
    pub value: Value,
}

/// One `{code, value}` pair sent to the commands endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpCommand {
    pub code: String,
    pub value: Value,
}

impl DpCommand {
    pub fn new(code: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            code: code.into(),
            value: value.into(),
        }
    }
}

pub fn commands_body(commands: &[DpCommand]) -> Value {
    json!({ "commands": commands })
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
}

/// Unwrap the vendor envelope. Anything without `success: true` is an error,
/// so callers never act on half a response.
pub fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T> {
    let envelope: Envelope = serde_json::from_str(body)?;
    if !envelope.success {
        return Err(Error::Api {
            code: envelope.code.unwrap_or(-1),
            msg: envelope.msg.unwrap_or_else(|| "request not successful".into()),
        });
    }
    let result = envelope.result.unwrap_or(Value::Null);
    Ok(serde_json::from_value(result)?)
}

/// Same as [`parse_envelope`] for endpoints whose result is irrelevant.
pub fn parse_ack(body: &str) -> Result<()> {
    parse_envelope::<Value>(body).map(|_| ())
}
