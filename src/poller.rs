use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::CloudClient;
use crate::protocol::DpStatus;
use crate::registry::EntityRegistry;
use crate::token::TokenManager;
use crate::types::EntityUpdate;
use crate::{Error, Result};

pub(crate) type UpdateCallback = Box<dyn Fn(&EntityUpdate) + Send + Sync>;

/// Vendor codes for an invalid or expired access token.
const TOKEN_INVALID_CODES: [i64; 2] = [1010, 1011];

#[derive(Default)]
pub struct Publisher {
    callbacks: Vec<UpdateCallback>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, f: impl Fn(&EntityUpdate) + Send + Sync + 'static) {
        self.callbacks.push(Box::new(f));
    }

    pub fn publish(&self, update: &EntityUpdate) {
        for cb in &self.callbacks {
            cb(update);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollReport {
    pub updated: usize,
    pub unmatched: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Applied(PollReport),
    Skipped,
}

struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    device_id: String,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, device_id: &str) -> Option<Self> {
        let mut guard = set.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(device_id.to_string()).then(|| Self {
            set,
            device_id: device_id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.device_id);
    }
}

pub struct Poller {
    client: Arc<CloudClient>,
    tokens: Arc<TokenManager>,
    registry: Arc<EntityRegistry>,
    publisher: Arc<Publisher>,
    in_flight: Mutex<HashSet<String>>,
}

impl Poller {
    pub fn new(
        client: Arc<CloudClient>,
        tokens: Arc<TokenManager>,
        registry: Arc<EntityRegistry>,
        publisher: Arc<Publisher>,
    ) -> Self {
        Self {
            client,
            tokens,
            registry,
            publisher,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn poll_device(&self, device_id: &str) -> Result<PollOutcome> {
        let Some(_in_flight) = InFlight::acquire(&self.in_flight, device_id) else {
            debug!(device_id, "previous poll still in flight, skipping tick");
            return Ok(PollOutcome::Skipped);
        };

        let access_token = match self.tokens.access_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(device_id, error = %e, "no usable access token, re-authenticating");
                self.reauthenticate().await;
                return Err(e);
            }
        };

        let status = match self.client.device_status(device_id, &access_token).await {
            Ok(status) => status,
            Err(Error::Api { code, msg }) if TOKEN_INVALID_CODES.contains(&code) => {
                warn!(device_id, code, %msg, "access token rejected, re-authenticating");
                self.reauthenticate().await;
                return Err(Error::Api { code, msg });
            }
            Err(e) => return Err(e),
        };

        Ok(PollOutcome::Applied(self.apply_status(device_id, &status)))
    }

    /// Apply a status report in server order. Applying the same report
    /// twice leaves the same state.
    pub fn apply_status(&self, device_id: &str, status: &[DpStatus]) -> PollReport {
        let mut report = PollReport::default();
        for dp in status {
            match self.registry.apply(device_id, &dp.code, &dp.value) {
                Some(update) => {
                    self.publisher.publish(&update);
                    report.updated += 1;
                }
                None => {
                    debug!(device_id, code = %dp.code, value = %dp.value, "no entity for data point");
                    report.unmatched.push(dp.code.clone());
                }
            }
        }
        report
    }

    async fn reauthenticate(&self) {
        // Logged inside refresh; the next cycle picks up whatever is on disk.
        let _ = self.tokens.refresh().await;
    }

    /// Poll `device_id` every `every`, starting immediately, until
    /// cancelled. Each tick runs in its own task so a slow request never
    /// delays the schedule; overlapping ticks are skipped.
    pub fn spawn(
        self: Arc<Self>,
        device_id: String,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(%device_id, interval_secs = every.as_secs_f64(), "polling started");
            let mut timer = interval(every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => {
                        let poller = Arc::clone(&self);
                        let device_id = device_id.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                _ = cancel.cancelled() => {}
                                result = poller.poll_device(&device_id) => {
                                    if let Err(e) = result {
                                        warn!(%device_id, error = %e, "poll failed");
                                    }
                                }
                            }
                        });
                    }
                }
            }
            debug!(%device_id, "polling stopped");
        })
    }
}
