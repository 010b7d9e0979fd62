use std::collections::BTreeMap;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use paygate::{Acknowledgement, InboundCallback, Operation, PaygateError};

use super::ServiceQuery;
use crate::error::ApiError;
use crate::metrics::record_webhook;
use crate::state::AppState;

/// GET|POST /payment_link_callback?service=&token=
///
/// Answers the vendor with its documented acknowledgement straight away and
/// relays the notification to the merchant in the background.
pub async fn payment_link_callback(
    query: web::Query<BTreeMap<String, String>>,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let mut query = query.into_inner();
    let service = ServiceQuery {
        service: query.remove("service"),
    };
    let provider = service.provider()?;
    let token = query.remove("token").unwrap_or_default();

    let ack = state
        .relay
        .acknowledgement(provider)
        .ok_or_else(|| PaygateError::not_implemented(provider, Operation::Webhook))?;

    let callback = InboundCallback {
        provider,
        token,
        body: body.to_vec(),
        query,
    };
    tracing::debug!(%provider, bytes = callback.body.len(), "callback received");
    state.relay.spawn(callback, record_webhook);

    Ok(acknowledge(&ack))
}

fn acknowledge(ack: &Acknowledgement) -> HttpResponse {
    let status = StatusCode::from_u16(ack.status).unwrap_or(StatusCode::OK);
    match &ack.body {
        Some(body) => HttpResponse::build(status).json(body),
        None => HttpResponse::build(status).finish(),
    }
}

/// POST /ipn - answers 204 so the gateway itself can serve as a merchant IPN target
pub async fn ipn() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/ipn", web::post().to(ipn))
        .route("/payment_link_callback", web::get().to(payment_link_callback))
        .route("/payment_link_callback", web::post().to(payment_link_callback));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use serde_json::json;

    #[actix_rt::test]
    async fn acknowledgement_without_body_is_empty() {
        let resp = acknowledge(&Acknowledgement {
            status: 204,
            body: None,
        });
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(to_bytes(resp.into_body()).await.unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn acknowledgement_body_is_json() {
        let resp = acknowledge(&Acknowledgement {
            status: 200,
            body: Some(json!({"RspCode": "00", "Message": "Confirm Success"})),
        });
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["RspCode"], "00");
    }
}
