use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, trace};

use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    commands_body, commands_path, parse_ack, parse_envelope, refresh_token_path, status_path,
    DpCommand, DpStatus, NEW_TOKEN_PATH,
};
use crate::signing::{Credentials, SignedHeaders};
use crate::token::Token;
use crate::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CloudClientBuilder {
    base_url: String,
    credentials: Credentials,
    timeout: Duration,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl CloudClientBuilder {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            timeout: DEFAULT_TIMEOUT,
            log_mode: None,
            log_path: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<CloudClient> {
        let http = reqwest::Client::builder().timeout(self.timeout).build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Mutex::new(MessageLogger::new(mode, &path)?)),
            _ => None,
        };

        Ok(CloudClient {
            http,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            credentials: self.credentials,
            logger,
        })
    }
}

/// Signed client for the vendor REST API. Every call issues exactly one
/// request; retries are left to the next scheduled cycle.
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    logger: Option<Mutex<MessageLogger>>,
}

impl CloudClient {
    pub fn builder(base_url: impl Into<String>, credentials: Credentials) -> CloudClientBuilder {
        CloudClientBuilder::new(base_url, credentials)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// `GET /v1.0/token?grant_type=1`
    pub async fn request_token(&self) -> Result<Token> {
        debug!("requesting new access token");
        let body = self.get(NEW_TOKEN_PATH, None).await.map_err(auth_error)?;
        let mut token: Token = parse_envelope(&body).map_err(auth_error)?;
        token.obtained_at = Some(Utc::now());
        Ok(token)
    }

    /// `GET /v1.0/token/{refresh_token}`
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Token> {
        debug!("refreshing access token");
        let body = self
            .get(&refresh_token_path(refresh_token), None)
            .await
            .map_err(auth_error)?;
        let mut token: Token = parse_envelope(&body).map_err(auth_error)?;
        token.obtained_at = Some(Utc::now());
        Ok(token)
    }

    /// `GET /v1.0/devices/{device_id}/status`
    pub async fn device_status(&self, device_id: &str, access_token: &str) -> Result<Vec<DpStatus>> {
        let body = self.get(&status_path(device_id), Some(access_token)).await?;
        let status: Vec<DpStatus> = parse_envelope(&body)?;
        trace!(device_id, entries = status.len(), "status received");

        self.with_logger(|logger| logger.log_poll(device_id, &status));
        Ok(status)
    }

    /// `POST /v1.0/devices/{device_id}/commands`
    pub async fn send_commands(
        &self,
        device_id: &str,
        access_token: &str,
        commands: &[DpCommand],
    ) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }
        self.with_logger(|logger| logger.log_command(device_id, commands));

        let body = serde_json::to_vec(&commands_body(commands))?;
        let path = commands_path(device_id);
        let headers = SignedHeaders::new(&self.credentials, "POST", &path, &body, Some(access_token));
        debug!(device_id, count = commands.len(), "sending commands");

        let request = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let text = headers
            .apply(request)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_ack(&text)
    }

    async fn get(&self, path: &str, access_token: Option<&str>) -> Result<String> {
        self.with_logger(|logger| logger.log_request("GET", path, access_token.is_some()));

        let headers = SignedHeaders::new(&self.credentials, "GET", path, b"", access_token);
        let request = self.http.get(format!("{}{path}", self.base_url));
        let text = headers
            .apply(request)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }

    fn with_logger(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(ref logger) = self.logger {
            let mut guard = logger.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard);
        }
    }
}

fn auth_error(err: Error) -> Error {
    match err {
        Error::Api { code, msg } => Error::Auth(format!("{code}: {msg}")),
        Error::Http(e) => Error::Auth(e.to_string()),
        other => other,
    }
}
