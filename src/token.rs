use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::CloudClient;
use crate::{Error, Result};

/// The persisted token document, as returned in the `result` of the token
/// endpoints plus the time we received it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expire_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obtained_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.obtained_at
            .map(|at| at + TimeDelta::seconds(self.expire_time))
    }

    /// Unknown expiry counts as not expired; the vendor rejects stale tokens
    /// and the next refresh replaces them.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }

    fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|rt| !rt.is_empty())
    }
}

/// The token file. Sole source of truth for the current token; replaced
/// atomically so readers see either the old or the new document.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Token> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::NoToken),
            Err(e) => return Err(e.into()),
        };
        let token: Token = serde_json::from_str(&text)?;
        if token.access_token.is_empty() {
            return Err(Error::NoToken);
        }
        Ok(token)
    }

    pub async fn store(&self, token: &Token) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(token)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Keeps the token file valid: refresh with the refresh token when there is
/// one, otherwise (or when refreshing fails) request a brand-new token.
pub struct TokenManager {
    client: Arc<CloudClient>,
    store: TokenStore,
    exchange: Mutex<()>,
}

impl TokenManager {
    pub fn new(client: Arc<CloudClient>, store: TokenStore) -> Self {
        Self {
            client,
            store,
            exchange: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Current access token straight from disk. Never blocks on a refresh.
    pub async fn access_token(&self) -> Result<String> {
        self.store.load().await.map(|t| t.access_token)
    }

    /// Idempotent; concurrent callers queue behind one token exchange.
    pub async fn refresh(&self) -> Result<Token> {
        let _exchange = self.exchange.lock().await;

        let current = match self.store.load().await {
            Ok(token) => Some(token),
            Err(Error::NoToken) => {
                warn!(path = %self.store.path.display(), "no token file yet, requesting new token");
                None
            }
            Err(e) => {
                warn!(error = %e, "token file unreadable, requesting new token");
                None
            }
        };

        if let Some(refresh_token) = current.as_ref().and_then(Token::usable_refresh_token) {
            debug!("refreshing with stored refresh token");
            match self.client.refresh_token(refresh_token).await {
                Ok(token) => {
                    self.store.store(&token).await?;
                    info!("access token refreshed");
                    return Ok(token);
                }
                Err(e) => warn!(error = %e, "token refresh failed, requesting new token"),
            }
        }

        match self.client.request_token().await {
            Ok(token) => {
                self.store.store(&token).await?;
                info!("new access token fetched");
                Ok(token)
            }
            Err(e) => {
                error!(error = %e, "failed to request new token");
                Err(e)
            }
        }
    }

    /// Refresh every `every` until cancelled. The first run happens one
    /// period from now; setup performs the initial refresh itself.
    pub fn spawn_refresh_loop(
        self: Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + every, every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => {
                        info!("scheduled token refresh");
                        // Failures are logged inside refresh; the next tick retries.
                        let _ = self.refresh().await;
                    }
                }
            }
            debug!("token refresh loop stopped");
        })
    }
}
