use std::net::{IpAddr, SocketAddr};

use actix_web::{web, HttpRequest, HttpResponse};
use paygate::{Operation, PaymentLinkRequest, QrCodeRequest, TransactionStatusRequest};

use super::{authenticate, call_provider, ServiceQuery, CLIENT_ID_HEADER};
use crate::error::{ok, ApiError};
use crate::state::AppState;

/// GET /banks?service=
///
/// Public for momo and vietqr; vnpay and zalopay list banks per merchant and
/// need `x-client-id`.
pub async fn banks(
    req: HttpRequest,
    query: web::Query<ServiceQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let provider = query.provider()?;
    let merchant_id = if req.headers().contains_key(CLIENT_ID_HEADER) {
        Some(authenticate(&req, &state).await?.id)
    } else {
        None
    };

    let adapter = state.registry.adapter(provider);
    let outcome = call_provider(provider, Operation::Banks, async move {
        adapter.banks(merchant_id.as_deref()).await
    })
    .await?;
    Ok(ok(outcome))
}

/// POST /qr_code?service=
pub async fn qr_code(
    query: web::Query<ServiceQuery>,
    state: web::Data<AppState>,
    body: web::Json<QrCodeRequest>,
) -> Result<HttpResponse, ApiError> {
    let provider = query.provider()?;
    let request = body.into_inner();

    let adapter = state.registry.adapter(provider);
    let outcome = call_provider(provider, Operation::QrCode, async move {
        adapter.qr_code(&request).await
    })
    .await?;
    Ok(ok(outcome))
}

/// POST /payment_link?service=
pub async fn payment_link(
    req: HttpRequest,
    query: web::Query<ServiceQuery>,
    state: web::Data<AppState>,
    body: web::Json<PaymentLinkRequest>,
) -> Result<HttpResponse, ApiError> {
    let merchant = authenticate(&req, &state).await?;
    let provider = query.provider()?;
    let mut request = body.into_inner();
    if request.client_ip.is_none() {
        request.client_ip = client_ip(&req);
    }

    tracing::info!(%provider, merchant = %merchant.id, order_id = %request.order_id, "creating payment link");

    let adapter = state.registry.adapter(provider);
    let outcome = call_provider(provider, Operation::CreatePaymentLink, async move {
        adapter.create_payment_link(&merchant.id, &request).await
    })
    .await?;
    Ok(ok(outcome))
}

/// POST /transaction_status?service=
pub async fn transaction_status(
    req: HttpRequest,
    query: web::Query<ServiceQuery>,
    state: web::Data<AppState>,
    body: web::Json<TransactionStatusRequest>,
) -> Result<HttpResponse, ApiError> {
    let merchant = authenticate(&req, &state).await?;
    let provider = query.provider()?;
    let mut request = body.into_inner();
    if request.client_ip.is_none() {
        request.client_ip = client_ip(&req);
    }

    let adapter = state.registry.adapter(provider);
    let outcome = call_provider(provider, Operation::TransactionStatus, async move {
        adapter.transaction_status(&merchant.id, &request).await
    })
    .await?;
    Ok(ok(outcome))
}

/// The caller's IP: first `Forwarded`/`X-Forwarded-For` hop, else the peer.
fn client_ip(req: &HttpRequest) -> Option<String> {
    let info = req.connection_info();
    let raw = info.realip_remote_addr()?;
    let ip = raw
        .parse::<IpAddr>()
        .or_else(|_| raw.parse::<SocketAddr>().map(|s| s.ip()))
        .ok()?;
    Some(ip.to_string())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/banks", web::get().to(banks))
        .route("/qr_code", web::post().to(qr_code))
        .route("/payment_link", web::post().to(payment_link))
        .route("/transaction_status", web::post().to(transaction_status));
}
