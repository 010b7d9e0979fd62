use actix_web::{web, HttpRequest, HttpResponse};
use paygate::signature::constant_time_eq;
use paygate::{Credentials, Issue, Merchant, Operation, Provider};
use serde::{Deserialize, Serialize};

use super::{authenticate, call_provider, with_store};
use crate::db::MerchantSummary;
use crate::error::{ok, ApiError, Envelope};
use crate::metrics::MERCHANTS_REGISTERED;
use crate::state::AppState;
use crate::validation::{merchant_issues, probe_ipn_url};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Body of `POST /create_user` and `PUT /update_user`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MerchantInput {
    /// Accepted on update for compatibility; must match `x-client-id`
    #[serde(default)]
    pub id: Option<String>,
    pub email: String,
    pub ipn_url: String,
    #[serde(default)]
    pub services: Credentials,
}

/// A merchant as shown to its owner: provider names, never key material
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantView {
    pub id: String,
    pub email: String,
    pub ipn_url: String,
    pub services: Vec<Provider>,
}

impl From<&Merchant> for MerchantView {
    fn from(m: &Merchant) -> Self {
        Self {
            id: m.id.clone(),
            email: m.email.clone(),
            ipn_url: m.ipn_url.clone(),
            services: m.credentials.providers(),
        }
    }
}

/// Local checks, duplicate e-mail check, then the IPN reachability probe.
async fn validate(state: &AppState, input: &MerchantInput, except_id: Option<&str>) -> Result<(), ApiError> {
    let mut issues = merchant_issues(&input.email, &input.ipn_url, state.config.insecure_dev);

    let email = input.email.clone();
    let except = except_id.map(str::to_string);
    if with_store(state, move |store| store.email_taken(&email, except.as_deref())).await? {
        issues.push(Issue {
            field: "email".to_string(),
            message: "Email already exists".to_string(),
        });
    }

    if !issues.is_empty() {
        return Err(ApiError::InvalidInput(issues));
    }

    let timeout = state.config.providers.forward_timeout;
    if !probe_ipn_url(&state.http_client, &input.ipn_url, timeout).await {
        return Err(ApiError::invalid("ipnUrl", "Invalid IPN URL or unreachable"));
    }
    Ok(())
}

/// Point payos at our callback route for this merchant.
async fn register_payos_webhook(state: &AppState, merchant: &Merchant) -> Result<(), ApiError> {
    if merchant.credentials.payos.is_none() {
        return Ok(());
    }
    let adapter = state.registry.adapter(Provider::Payos);
    let merchant_id = merchant.id.clone();
    call_provider(Provider::Payos, Operation::RegisterWebhook, async move {
        adapter.register_webhook(&merchant_id).await
    })
    .await?;
    tracing::info!(merchant = %merchant.id, "payos webhook registered");
    Ok(())
}

/// GET /get_users - admin listing without credentials
pub async fn get_users(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let Some(ref expected) = state.config.admin_token else {
        return Err(ApiError::Unauthorized("admin endpoint disabled"));
    };
    let authorized = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
        .unwrap_or(false);
    if !authorized {
        return Err(ApiError::Unauthorized("valid x-admin-token required"));
    }

    let merchants = with_store(&state, |store| store.list_merchants()).await?;
    Ok(ok(merchants))
}

/// POST /create_user
pub async fn create_user(
    state: web::Data<AppState>,
    body: web::Json<MerchantInput>,
) -> Result<HttpResponse, ApiError> {
    let input = body.into_inner();
    validate(&state, &input, None).await?;

    let merchant = Merchant {
        id: uuid::Uuid::new_v4().to_string(),
        email: input.email,
        ipn_url: input.ipn_url,
        credentials: input.services,
    };

    let record = merchant.clone();
    let created: MerchantSummary = with_store(&state, move |store| store.create_merchant(&record)).await?;

    if let Err(e) = register_payos_webhook(&state, &merchant).await {
        let id = merchant.id.clone();
        if let Err(rollback) = with_store(&state, move |store| store.delete_merchant(&id)).await {
            tracing::error!(merchant = %merchant.id, error = %rollback, "failed to roll back merchant");
        }
        return Err(e);
    }

    MERCHANTS_REGISTERED.inc();
    tracing::info!(merchant = %merchant.id, services = ?created.services, "merchant registered");

    Ok(HttpResponse::Created().json(Envelope::success(created)))
}

/// GET /get_user
pub async fn get_user(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let merchant = authenticate(&req, &state).await?;
    Ok(ok(MerchantView::from(&merchant)))
}

/// PUT /update_user
pub async fn update_user(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<MerchantInput>,
) -> Result<HttpResponse, ApiError> {
    let previous = authenticate(&req, &state).await?;
    let input = body.into_inner();
    if input.id.as_deref().is_some_and(|id| id != previous.id) {
        return Err(ApiError::invalid("id", "Invalid user id"));
    }
    validate(&state, &input, Some(&previous.id)).await?;

    let merchant = Merchant {
        id: previous.id.clone(),
        email: input.email,
        ipn_url: input.ipn_url,
        credentials: input.services,
    };

    let record = merchant.clone();
    let updated = with_store(&state, move |store| store.update_merchant(&record))
        .await?
        .ok_or(ApiError::Unauthorized("unknown client id"))?;

    if let Err(e) = register_payos_webhook(&state, &merchant).await {
        let restore = previous.clone();
        if let Err(rollback) = with_store(&state, move |store| store.update_merchant(&restore)).await {
            tracing::error!(merchant = %previous.id, error = %rollback, "failed to restore merchant");
        }
        return Err(e);
    }

    tracing::info!(merchant = %merchant.id, "merchant updated");
    Ok(ok(updated))
}

/// DELETE /delete_user
pub async fn delete_user(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let merchant = authenticate(&req, &state).await?;
    let id = merchant.id.clone();
    let deleted = with_store(&state, move |store| store.delete_merchant(&id)).await?;
    if !deleted {
        return Err(ApiError::Unauthorized("unknown client id"));
    }
    tracing::info!(merchant = %merchant.id, "merchant deleted");
    Ok(ok(MerchantView::from(&merchant)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/get_users", web::get().to(get_users))
        .route("/create_user", web::post().to(create_user))
        .route("/get_user", web::get().to(get_user))
        .route("/update_user", web::put().to(update_user))
        .route("/delete_user", web::delete().to(delete_user));
}
