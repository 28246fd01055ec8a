use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::diff::diff_status;
use crate::protocol::{DpCommand, DpStatus};

/// How status polls are written to the message log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    /// Every poll with its full payload.
    Full,
    /// First poll per device in full, then only changed data points.
    Diffed,
}

/// NDJSON log of the traffic exchanged with the cloud. Tokens and secrets
/// are never written.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous: HashMap<String, Map<String, Value>>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous: HashMap::new(),
        })
    }

    pub fn log_request(&mut self, method: &str, path: &str, authenticated: bool) {
        // Refresh paths embed the refresh token.
        let path = if path.starts_with("/v1.0/token/") {
            "/v1.0/token/<redacted>"
        } else {
            path
        };
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "method": method,
            "path": path,
            "authenticated": authenticated,
        });
        self.write_line(&entry);
    }

    pub fn log_command(&mut self, device_id: &str, commands: &[DpCommand]) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "cmd",
            "device": device_id,
            "commands": commands,
        });
        self.write_line(&entry);
    }

    pub fn log_poll(&mut self, device_id: &str, status: &[DpStatus]) {
        let current: Map<String, Value> = status
            .iter()
            .map(|dp| (dp.code.clone(), dp.value.clone()))
            .collect();

        let entry = match (self.mode, self.previous.get(device_id)) {
            (MessageLogMode::Diffed, Some(prev)) => {
                let changes: Vec<Value> = diff_status(prev, &current)
                    .into_iter()
                    .map(|(code, old, new)| json!({ "code": code, "old": old, "new": new }))
                    .collect();
                json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "poll",
                    "device": device_id,
                    "changes": changes,
                })
            }
            (MessageLogMode::Diffed, None) => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "poll",
                "device": device_id,
                "full": true,
                "status": status,
            }),
            (MessageLogMode::Full, _) => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "poll",
                "device": device_id,
                "status": status,
            }),
        };
        self.write_line(&entry);

        if self.mode == MessageLogMode::Diffed {
            self.previous
                .entry(device_id.to_string())
                .or_default()
                .extend(current);
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}
