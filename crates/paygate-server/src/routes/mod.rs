pub mod callback;
pub mod health;
pub mod merchants;
pub mod payments;

use std::future::Future;

use actix_web::{web, HttpRequest, Scope};
use paygate::{Merchant, Operation, Outcome, PaygateError, Provider};
use serde::Deserialize;

use crate::db::SqliteStore;
use crate::error::{ApiError, StoreError};
use crate::metrics::{outcome_label, PROVIDER_CALLS_TOTAL, PROVIDER_LATENCY};
use crate::state::AppState;

pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// `?service=<provider>` on every provider-facing route.
#[derive(Debug, Deserialize)]
pub struct ServiceQuery {
    pub service: Option<String>,
}

impl ServiceQuery {
    pub fn provider(&self) -> Result<Provider, ApiError> {
        let service = self.service.as_deref().unwrap_or_default();
        service
            .parse()
            .map_err(|_| ApiError::ServiceNotFound(service.to_string()))
    }
}

/// Resolve the calling merchant from the `x-client-id` header.
pub async fn authenticate(req: &HttpRequest, state: &AppState) -> Result<Merchant, ApiError> {
    let client_id = req
        .headers()
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::Unauthorized("missing x-client-id header"))?
        .to_string();

    with_store(state, move |store| store.get_merchant(&client_id))
        .await?
        .ok_or(ApiError::Unauthorized("unknown client id"))
}

/// Run a store call on the blocking pool.
pub async fn with_store<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&SqliteStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = state.store.clone();
    web::block(move || f(store.as_ref()))
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
        .map_err(ApiError::from)
}

/// Every route that lives under the configurable base path.
pub fn api_scope(base_path: &str) -> Scope {
    web::scope(base_path)
        .app_data(json_config())
        .configure(merchants::configure)
        .configure(payments::configure)
        .configure(callback::configure)
}

/// Malformed JSON bodies answer with the BAD_REQUEST envelope.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(256 * 1024)
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}

/// Run a provider operation detached from the inbound request and record its outcome.
///
/// A client disconnect drops the handler future but not the spawned call.
pub async fn call_provider<T, Fut>(
    provider: Provider,
    operation: Operation,
    call: Fut,
) -> Result<Outcome<T>, ApiError>
where
    T: Send + 'static,
    Fut: Future<Output = Result<Outcome<T>, PaygateError>> + Send + 'static,
{
    let timer = PROVIDER_LATENCY
        .with_label_values(&[provider.as_str(), operation.as_str()])
        .start_timer();
    let result = tokio::spawn(call)
        .await
        .map_err(|e| ApiError::Internal(format!("provider task failed: {e}")))?;
    timer.observe_duration();

    PROVIDER_CALLS_TOTAL
        .with_label_values(&[provider.as_str(), operation.as_str(), outcome_label(&result)])
        .inc();

    match &result {
        Ok(outcome) => tracing::debug!(%provider, %operation, kind = ?outcome.kind(), "provider call finished"),
        Err(e) if !e.is_internal() => {
            tracing::info!(%provider, %operation, error = %e, "provider call rejected")
        }
        Err(_) => {}
    }

    Ok(result?)
}
