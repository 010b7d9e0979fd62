use crate::config::ServerConfig;
use crate::db::SqliteStore;
use paygate::{AdapterContext, Registry, WebhookRelay};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<SqliteStore>,
    pub registry: Registry,
    pub relay: Arc<WebhookRelay>,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(config: ServerConfig, store: SqliteStore) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.providers.request_timeout)
            .redirect(reqwest::redirect::Policy::none()) // Prevent SSRF via redirects
            .build()?;

        let store = Arc::new(store);
        let context = AdapterContext::new(http_client.clone(), config.providers.clone(), store.clone());
        let registry = Registry::new(context);
        let relay = Arc::new(WebhookRelay::new(registry.clone()));

        Ok(Self {
            config: Arc::new(config),
            store,
            registry,
            relay,
            http_client,
        })
    }
}
