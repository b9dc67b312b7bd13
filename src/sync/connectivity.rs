//! Runtime connectivity checks used as the drain preflight.

use async_trait::async_trait;
use reqwest::Url;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Reports whether the network is usable right now.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self, target: &Url) -> bool;
}

/// Connectivity flag set by the host (e.g. from platform online/offline events).
#[derive(Debug)]
pub struct StaticConnectivity {
    online: AtomicBool,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connectivity for StaticConnectivity {
    async fn is_online(&self, _target: &Url) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Treats the network as online when the target answers any HTTP request
/// within the probe timeout. The status code is irrelevant.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Connectivity for HttpProbe {
    async fn is_online(&self, target: &Url) -> bool {
        match self
            .client
            .head(target.clone())
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Connectivity probe to {} failed: {}", target, e);
                false
            }
        }
    }
}
