use std::fmt::{self, Write as _};

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::RequestBuilder;
use sha2::{Digest, Sha256};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SIGN_METHOD: &str = "HMAC-SHA256";

/// Cloud project credentials. The secret never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Header set attached to every vendor request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub client_id: String,
    pub access_token: Option<String>,
    pub sign: String,
    pub t: String,
    pub nonce: String,
}

impl SignedHeaders {
    /// Sign a request. The timestamp and nonce are always taken here, at call
    /// time. `access_token` is `None` only for the token endpoints.
    pub fn new(
        credentials: &Credentials,
        method: &str,
        path: &str,
        body: &[u8],
        access_token: Option<&str>,
    ) -> Self {
        let t = Utc::now().timestamp_millis().to_string();
        let nonce = Uuid::new_v4().to_string();
        Self::at(credentials, method, path, body, access_token, t, nonce)
    }

    pub(crate) fn at(
        credentials: &Credentials,
        method: &str,
        path: &str,
        body: &[u8],
        access_token: Option<&str>,
        t: String,
        nonce: String,
    ) -> Self {
        let to_sign = string_to_sign(method, &content_hash(body), path);
        let mut message = String::with_capacity(
            credentials.client_id.len() + t.len() + nonce.len() + to_sign.len() + 64,
        );
        message.push_str(&credentials.client_id);
        if let Some(token) = access_token {
            message.push_str(token);
        }
        message.push_str(&t);
        message.push_str(&nonce);
        message.push_str(&to_sign);

        Self {
            client_id: credentials.client_id.clone(),
            access_token: access_token.map(str::to_string),
            sign: hmac_hex_upper(credentials.client_secret.as_bytes(), message.as_bytes()),
            t,
            nonce,
        }
    }

    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request
            .header("client_id", &self.client_id)
            .header("sign", &self.sign)
            .header("t", &self.t)
            .header("nonce", &self.nonce)
            .header("sign_method", SIGN_METHOD);
        if let Some(ref token) = self.access_token {
            request = request.header("access_token", token);
        }
        request
    }
}

/// Lowercase hex SHA-256 of the request body (the empty-string digest when
/// there is no body).
pub fn content_hash(body: &[u8]) -> String {
    to_hex(&Sha256::digest(body), false)
}

pub fn string_to_sign(method: &str, body_hash: &str, path: &str) -> String {
    format!("{}\n{body_hash}\n\n{path}", method.to_ascii_uppercase())
}

fn hmac_hex_upper(key: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    to_hex(&mac.finalize().into_bytes(), true)
}

fn to_hex(bytes: &[u8], upper: bool) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        if upper {
            let _ = write!(out, "{byte:02X}");
        } else {
            let _ = write!(out, "{byte:02x}");
        }
    }
    out
}
