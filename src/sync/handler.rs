//! Remote handlers, one per action type.

use async_trait::async_trait;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::error::HandlerError;
use crate::models::ActionType;
use crate::queue::QueueItem;

/// Header carrying the item's idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Delivers one queued item to the server.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Succeeds only once the server has acknowledged the item.
    async fn execute(&self, target: &Url, item: &QueueItem) -> Result<(), HandlerError>;
}

/// Explicit mapping from action type to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry posting every action type to `{base}/{type}`.
    pub fn http(client: reqwest::Client) -> Self {
        let mut registry = Self::new();
        for action in ActionType::ALL {
            registry.register(
                action,
                Arc::new(HttpActionHandler::new(client.clone(), action.as_str())),
            );
        }
        registry
    }

    /// Adds or replaces the handler for `action`.
    pub fn register(&mut self, action: ActionType, handler: Arc<dyn ActionHandler>) -> &mut Self {
        self.handlers.insert(action, handler);
        self
    }

    pub fn with(mut self, action: ActionType, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(action, handler);
        self
    }

    pub fn get(&self, action: ActionType) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&action).cloned()
    }

    pub fn contains(&self, action: ActionType) -> bool {
        self.handlers.contains_key(&action)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<&ActionType> = self.handlers.keys().collect();
        registered.sort_by_key(|a| a.as_str());
        f.debug_struct("HandlerRegistry")
            .field("registered", &registered)
            .finish()
    }
}

/// POSTs the payload as JSON to `{base}/{path}`. Any 2xx status is success.
#[derive(Debug, Clone)]
pub struct HttpActionHandler {
    client: reqwest::Client,
    path: String,
}

impl HttpActionHandler {
    pub fn new(client: reqwest::Client, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }

    /// Builds the endpoint URL, keeping any path prefix on the base URL.
    fn endpoint(&self, target: &Url) -> String {
        format!(
            "{}/{}",
            target.as_str().trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ActionHandler for HttpActionHandler {
    async fn execute(&self, target: &Url, item: &QueueItem) -> Result<(), HandlerError> {
        let mut request = self.client.post(self.endpoint(target)).json(&item.payload);
        if let Some(key) = item.idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| HandlerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HandlerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// HTTP client used for sync requests.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("wellnest/", env!("CARGO_PKG_VERSION")))
        .build()
}
