//! Drains the action queue against the remote API.
//!
//! A drain walks the queue in order and hands each item to the handler
//! registered for its type. Acknowledged items are removed; the first failure
//! ends the pass and leaves that item and everything after it queued, in
//! order. Items that can never be dispatched (unknown type, no handler) are
//! parked in the dead-letter store so they do not block the rest.

use reqwest::Url;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::connectivity::Connectivity;
use super::error::{ConfigurationError, HandlerError, SyncError};
use super::handler::HandlerRegistry;
use crate::config::Environment;
use crate::queue::{ActionQueue, QueueItem};

/// Settings injected at construction.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Base URL used when `drain` is not given one.
    pub base_url: Option<String>,
    pub environment: Environment,
    /// Upper bound for a single remote call; exceeding it halts the pass.
    pub item_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            environment: Environment::default(),
            item_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// Every item in the snapshot was synced or parked.
    Completed,
    /// Stopped at a failed item.
    Halted,
    /// No connectivity; nothing was attempted.
    Offline,
    /// Another drain was in progress; this call did nothing.
    AlreadyRunning,
}

/// The item a drain pass stopped on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub item_id: i64,
    pub kind: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub status: DrainStatus,
    /// Queue ids removed after the server acknowledged them, in order.
    pub synced: Vec<i64>,
    /// Queue ids moved to the dead-letter store.
    pub parked: Vec<i64>,
    pub failure: Option<SyncFailure>,
}

impl DrainReport {
    fn new(status: DrainStatus) -> Self {
        Self {
            status,
            synced: Vec::new(),
            parked: Vec::new(),
            failure: None,
        }
    }
}

/// Holds the in-flight flag for the duration of one drain.
struct DrainGuard {
    flag: Arc<AtomicBool>,
}

impl DrainGuard {
    fn try_begin(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct SyncEngine {
    queue: ActionQueue,
    handlers: HandlerRegistry,
    connectivity: Arc<dyn Connectivity>,
    settings: SyncSettings,
    in_flight: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(
        queue: ActionQueue,
        handlers: HandlerRegistry,
        connectivity: Arc<dyn Connectivity>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            queue,
            handlers,
            connectivity,
            settings,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub fn is_draining(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves the base URL: explicit argument first, then the configured
    /// value. Loopback targets are refused in production.
    pub fn resolve_target(&self, explicit: Option<&str>) -> Result<Url, ConfigurationError> {
        let raw = explicit
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                self.settings
                    .base_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            })
            .ok_or(ConfigurationError::MissingBaseUrl)?;

        let url = Url::parse(raw).map_err(|e| ConfigurationError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigurationError::InvalidBaseUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        if self.settings.environment.is_production() && is_loopback(&url) {
            return Err(ConfigurationError::LoopbackInProduction(raw.to_string()));
        }

        Ok(url)
    }

    /// Runs one drain pass.
    ///
    /// Configuration problems are returned as errors before any network
    /// access. Being offline or finding another drain in progress is not an
    /// error. A failed remote call is reported in the returned
    /// [`DrainReport`] and the item stays queued for the next trigger.
    ///
    /// The offline check is whatever [`Connectivity`] the engine was built
    /// with. [`StaticConnectivity`](super::StaticConnectivity), fed by the host
    /// or by [`watch`](Self::watch), answers without touching the network;
    /// [`HttpProbe`](super::HttpProbe) sends a request to the target to find
    /// out.
    pub async fn drain(&self, explicit_base_url: Option<&str>) -> Result<DrainReport, SyncError> {
        let target = self.resolve_target(explicit_base_url)?;

        if !self.connectivity.is_online(&target).await {
            tracing::debug!("Offline, skipping drain");
            return Ok(DrainReport::new(DrainStatus::Offline));
        }

        let _guard = match DrainGuard::try_begin(&self.in_flight) {
            Some(guard) => guard,
            None => {
                tracing::debug!("Drain already in progress");
                return Ok(DrainReport::new(DrainStatus::AlreadyRunning));
            }
        };

        let items = self.queue.list().await?;
        tracing::info!("Draining {} queued action(s) to {}", items.len(), target);

        let mut report = DrainReport::new(DrainStatus::Completed);
        for item in items {
            let action = match item.action_type() {
                Ok(action) => action,
                Err(reason) => {
                    self.park(&item, &reason, &mut report).await?;
                    continue;
                }
            };
            let handler = match self.handlers.get(action) {
                Some(handler) => handler,
                None => {
                    let reason = format!("no handler registered for '{}'", action);
                    self.park(&item, &reason, &mut report).await?;
                    continue;
                }
            };

            let outcome =
                match tokio::time::timeout(self.settings.item_timeout, handler.execute(&target, &item))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(HandlerError::Timeout(self.settings.item_timeout)),
                };

            match outcome {
                Ok(()) => {
                    self.queue.remove(item.id).await?;
                    tracing::debug!("Synced {} action #{}", action, item.id);
                    report.synced.push(item.id);
                }
                Err(e) => {
                    tracing::warn!(
                        "Sync of {} action #{} failed, stopping: {}",
                        action,
                        item.id,
                        e
                    );
                    report.status = DrainStatus::Halted;
                    report.failure = Some(SyncFailure {
                        item_id: item.id,
                        kind: item.kind.clone(),
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }

        tracing::info!(
            "Drain finished: {} synced, {} parked{}",
            report.synced.len(),
            report.parked.len(),
            if report.status == DrainStatus::Halted {
                ", halted"
            } else {
                ""
            }
        );
        Ok(report)
    }

    async fn park(
        &self,
        item: &QueueItem,
        reason: &str,
        report: &mut DrainReport,
    ) -> Result<(), SyncError> {
        if self.queue.park(item, reason).await?.is_some() {
            report.parked.push(item.id);
        }
        Ok(())
    }

    /// Drains every time `online` reports connectivity, including once at
    /// start if it already does. Returns when the sender is dropped.
    ///
    /// Errors are logged and do not stop the listener.
    pub async fn watch(self: Arc<Self>, mut online: watch::Receiver<bool>) {
        loop {
            let is_online = *online.borrow_and_update();
            if is_online {
                match self.drain(None).await {
                    Ok(report) => tracing::debug!("Reconnect drain: {:?}", report.status),
                    Err(e) => tracing::error!("Reconnect drain failed: {}", e),
                }
            }
            if online.changed().await.is_err() {
                break;
            }
        }
    }
}

/// True for hosts that resolve to the device itself.
fn is_loopback(url: &Url) -> bool {
    let host = match url.host_str() {
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim_end_matches('.')
            .to_ascii_lowercase(),
        None => return false,
    };

    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_loopback() || ip.is_unspecified(),
        Ok(IpAddr::V6(ip)) => {
            ip.is_loopback()
                || ip.is_unspecified()
                || ip.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
        Err(_) => false,
    }
}
