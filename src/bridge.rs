use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::CloudClient;
use crate::config::{DeviceCatalog, Secrets};
use crate::logger::MessageLogMode;
use crate::poller::{PollOutcome, Poller, Publisher};
use crate::registry::EntityRegistry;
use crate::token::{TokenManager, TokenStore};
use crate::types::{Command, EntityUpdate};
use crate::{Error, Result};

pub const DEFAULT_TOKEN_PATH: &str = "tuya_token.json";

pub struct BridgeBuilder {
    secrets: Secrets,
    catalog: DeviceCatalog,
    token_path: PathBuf,
    timeout: Option<Duration>,
    message_log: Option<(MessageLogMode, String)>,
    publisher: Publisher,
}

impl BridgeBuilder {
    pub fn new(secrets: Secrets, catalog: DeviceCatalog) -> Self {
        Self {
            secrets,
            catalog,
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            timeout: None,
            message_log: None,
            publisher: Publisher::new(),
        }
    }

    pub fn token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.message_log = Some((mode, path.into()));
        self
    }

    pub fn on_update(mut self, f: impl Fn(&EntityUpdate) + Send + Sync + 'static) -> Self {
        self.publisher.subscribe(f);
        self
    }

    /// Authenticate, build the registry and start the background tasks.
    /// A failed initial token exchange is logged and retried by the pollers.
    pub async fn start(self) -> Result<Bridge> {
        let mut client = CloudClient::builder(&self.secrets.base_url, self.secrets.credentials);
        if let Some(timeout) = self.timeout {
            client = client.timeout(timeout);
        }
        if let Some((mode, path)) = self.message_log {
            client = client.message_log(mode, path);
        }
        let client = Arc::new(client.build()?);

        let tokens = Arc::new(TokenManager::new(
            Arc::clone(&client),
            TokenStore::new(self.token_path),
        ));
        if let Err(e) = tokens.refresh().await {
            warn!(error = %e, "initial token exchange failed, continuing");
        }

        if self.catalog.enabled().next().is_none() {
            warn!("no enabled devices configured");
        }
        let registry = Arc::new(EntityRegistry::from_catalog(&self.catalog));
        let publisher = Arc::new(self.publisher);
        let poller = Arc::new(Poller::new(
            Arc::clone(&client),
            Arc::clone(&tokens),
            Arc::clone(&registry),
            Arc::clone(&publisher),
        ));

        let cancel = CancellationToken::new();
        let mut tasks =
            vec![Arc::clone(&tokens).spawn_refresh_loop(self.secrets.token_refresh, cancel.clone())];
        for device in self.catalog.enabled() {
            if registry.entities_for(&device.id).is_empty() {
                continue;
            }
            tasks.push(Arc::clone(&poller).spawn(
                device.id.clone(),
                device.poll_interval,
                cancel.clone(),
            ));
        }
        info!(
            devices = tasks.len() - 1,
            entities = registry.len(),
            "bridge started"
        );

        Ok(Bridge {
            client,
            tokens,
            registry,
            publisher,
            poller,
            cancel,
            tasks,
        })
    }
}

/// A running bridge. Dropping it cancels all background tasks.
pub struct Bridge {
    client: Arc<CloudClient>,
    tokens: Arc<TokenManager>,
    registry: Arc<EntityRegistry>,
    publisher: Arc<Publisher>,
    poller: Arc<Poller>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    pub fn builder(secrets: Secrets, catalog: DeviceCatalog) -> BridgeBuilder {
        BridgeBuilder::new(secrets, catalog)
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub async fn poll_now(&self, device_id: &str) -> Result<PollOutcome> {
        self.poller.poll_device(device_id).await
    }

    /// Current display value of the entity registered for `(device_id, code)`.
    pub fn value(&self, device_id: &str, code: &str) -> Option<Value> {
        let id = self.registry.lookup(device_id, code)?;
        self.registry.with_entity(id, |e| e.current_value())
    }

    /// Route a command to the entity behind `(device_id, code)`. Every data
    /// point the command needs goes out in one request; the entity is
    /// updated once the cloud accepts it. Passive entities only update
    /// locally.
    pub async fn command(&self, device_id: &str, code: &str, command: Command) -> Result<()> {
        let id = self
            .registry
            .lookup(device_id, code)
            .ok_or_else(|| Error::UnknownEntity {
                device_id: device_id.to_string(),
                code: code.to_string(),
            })?;
        let (planned, passive) = self
            .registry
            .with_entity(id, |e| (e.plan(&command), e.is_passive()))
            .ok_or_else(|| Error::UnknownEntity {
                device_id: device_id.to_string(),
                code: code.to_string(),
            })?;
        let planned = planned?;

        if passive {
            info!(device_id, code, ?command, "passive entity, updating locally");
        } else {
            let access_token = self.tokens.access_token().await?;
            self.client
                .send_commands(device_id, &access_token, &planned)
                .await?;
            info!(device_id, code, ?command, "command accepted");
        }

        if let Some(update) = self.registry.with_entity(id, |e| {
            e.confirm(&command);
            e.update_for(code)
        }) {
            self.publisher.publish(&update);
        }
        Ok(())
    }

    /// Cancel every background task and wait for them to stop. In-flight
    /// requests are abandoned.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("bridge stopped");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
