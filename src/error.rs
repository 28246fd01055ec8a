use std::fmt;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Io(std::io::Error),
    Json(serde_json::Error),
    Yaml(serde_yaml::Error),
    Config(String),
    DuplicateDevice(String),
    Auth(String),
    NoToken,
    Api { code: i64, msg: String },
    UnknownEntity { device_id: String, code: String },
    InvalidCommand(String),
}

impl Error {
    /// Fatal to setup: bad secrets or device definitions.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::DuplicateDevice(_) | Error::Yaml(_)
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::NoToken)
    }

    /// Network failure, non-2xx, or a vendor envelope without `success`.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Api { .. } | Error::Io(_) | Error::Json(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::Yaml(e) => write!(f, "YAML error: {e}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::DuplicateDevice(id) => write!(f, "duplicate device id: {id}"),
            Error::Auth(msg) => write!(f, "authentication failed: {msg}"),
            Error::NoToken => write!(f, "no access token available"),
            Error::Api { code, msg } => write!(f, "API error {code}: {msg}"),
            Error::UnknownEntity { device_id, code } => {
                write!(f, "no entity registered for {device_id}/{code}")
            }
            Error::InvalidCommand(msg) => write!(f, "invalid command: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Yaml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Yaml(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
