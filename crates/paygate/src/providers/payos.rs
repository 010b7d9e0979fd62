//! PayOS bank-transfer gateway.
//!
//! Every answer is an envelope `{code, desc, data, signature}`. Webhooks
//! carry the same envelope and are signed over the key-sorted `data`
//! object.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

use crate::adapter::{
    Acknowledgement, AdapterContext, DropReason, InboundCallback, PaymentLink, PaymentLinkRequest,
    ProviderAdapter, TransactionStatusRequest, WebhookVerdict,
};
use crate::error::{PaygateError, VendorReply};
use crate::outcome::{CodeTable, Outcome, OutcomeKind, Resolution};
use crate::provider::{Operation, Provider};
use crate::signature::{self, ordered_pairs, sorted_data_pairs};
use crate::store::{CredentialBundle, PayosCredentials};
use crate::validation::Checker;

use super::{code_text, from_vietnam_time, json_object, send, str_field};

const MIN_AMOUNT: i64 = 1_000;
const MAX_DESCRIPTION: usize = 9;

pub static CODES: CodeTable<&'static str> = CodeTable {
    kinds: &[
        ("00", OutcomeKind::Success),
        ("20", OutcomeKind::MerchantError),
        ("101", OutcomeKind::MerchantError),
        ("201", OutcomeKind::MerchantError),
        ("214", OutcomeKind::MerchantError),
        ("231", OutcomeKind::MerchantError),
        ("401", OutcomeKind::MerchantError),
        ("503", OutcomeKind::MerchantError),
    ],
    resolutions: &[
        ("20", Resolution::BadFormat(&[])),
        ("401", Resolution::BadFormat(&["Missing API key or Client ID or both"])),
        ("503", Resolution::BadFormat(&["Sending float order code"])),
        ("214", Resolution::Rejected(&["Invalid API key and Client ID pair"])),
        ("101", Resolution::Rejected(&[])),
        ("201", Resolution::Rejected(&[])),
        ("231", Resolution::Rejected(&[])),
    ],
};

/// Payment statuses reported by the status endpoint that are not final.
const OPEN_STATUSES: &[&str] = &["PENDING", "PROCESSING"];

/// The payload PayOS sends when a merchant confirms a webhook URL.
static TEST_FIXTURE: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "orderCode": 123,
        "amount": 3000,
        "description": "VQRIO123",
        "accountNumber": "12345678",
        "reference": "TF230204212323",
        "transactionDateTime": "2023-02-04 18:25:00",
        "currency": "VND",
        "paymentLinkId": "124c33293c43417ab7879e14c8d9eb18",
        "code": "00",
        "desc": "Thành công",
        "counterAccountBankId": "",
        "counterAccountBankName": "",
        "counterAccountName": "",
        "counterAccountNumber": "",
        "virtualAccountName": "",
        "virtualAccountNumber": "",
    })
});

pub fn is_test_fixture(data: &Value) -> bool {
    *data == *TEST_FIXTURE
}

pub struct PayosAdapter {
    ctx: AdapterContext,
}

impl PayosAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    async fn credentials(
        &self,
        merchant_id: &str,
        operation: Operation,
    ) -> Result<PayosCredentials, PaygateError> {
        match self
            .ctx
            .credentials(merchant_id, Provider::Payos, operation)
            .await?
        {
            CredentialBundle::Payos(c) => Ok(c),
            _ => Err(PaygateError::missing_credentials(Provider::Payos, operation)),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str, creds: &PayosCredentials) -> reqwest::RequestBuilder {
        self.ctx
            .http
            .request(method, format!("{}{}", self.ctx.config.payos_url, path))
            .timeout(self.ctx.config.request_timeout)
            .header("x-api-key", &creds.api_key)
            .header("x-client-id", &creds.client_id)
    }

    /// Classify the envelope and unwrap `data`.
    fn classify(
        operation: Operation,
        status: u16,
        payload: Value,
        order_id: Option<&str>,
    ) -> Result<Outcome<Value>, PaygateError> {
        let reply = VendorReply::new(Provider::Payos, operation, status, payload).with_order_id(order_id);
        let Some(code) = code_text(&reply.payload, "code") else {
            return Err(PaygateError::unknown(reply, "response has no code"));
        };
        let kind = CODES.kind_of(code.as_str());
        let resolution = CODES.resolution_of(code.as_str());
        let reply = reply.with_code(&code);

        if kind == Some(OutcomeKind::Success) && reply.payload.get("data").is_none_or(Value::is_null) {
            return Err(PaygateError::unknown(reply, "success response has no data"));
        }
        let outcome = crate::outcome::conclude(kind, resolution, reply)?;
        Ok(outcome.map(|mut envelope| {
            envelope
                .get_mut("data")
                .map(Value::take)
                .unwrap_or_default()
        }))
    }
}

pub fn validate_payment_link(request: &PaymentLinkRequest) -> Result<i64, PaygateError> {
    let mut c = Checker::new(Operation::CreatePaymentLink);
    let order_code = request.order_id.parse::<i64>().ok().filter(|n| *n > 0);
    c.check(order_code.is_some(), "order_id", "must be a positive integer");
    c.at_least("amount", request.amount, MIN_AMOUNT);
    c.not_empty("description", &request.description);
    c.max_chars("description", &request.description, MAX_DESCRIPTION);
    c.url("return_url", &request.return_url);
    if let Some(cancel_url) = c.required("cancel_url", request.cancel_url.as_deref()) {
        c.url("cancel_url", cancel_url);
    }
    if let Some(email) = request.buyer.as_ref().and_then(|b| b.email.as_deref()) {
        c.email("buyer.email", email);
    }
    for (i, item) in request.items.iter().enumerate() {
        c.not_empty(&format!("items[{i}].name"), &item.name);
        c.at_least(&format!("items[{i}].price"), item.price, 0);
    }
    c.finish()?;
    Ok(order_code.unwrap_or_default())
}

/// Expiry as 32-bit unix seconds. Millisecond inputs are scaled down.
pub fn expiry_seconds(expires_at: i64) -> i64 {
    if i32::try_from(expires_at).is_ok() {
        expires_at
    } else {
        expires_at / 1000
    }
}

pub fn create_signature_string(
    amount: i64,
    cancel_url: &str,
    description: &str,
    order_code: i64,
    return_url: &str,
) -> String {
    let amount = amount.to_string();
    let order_code = order_code.to_string();
    ordered_pairs(&[
        ("amount", amount.as_str()),
        ("cancelUrl", cancel_url),
        ("description", description),
        ("orderCode", order_code.as_str()),
        ("returnUrl", return_url),
    ])
}

fn transaction_time(data: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let raw = data.get("transactionDateTime")?.as_str()?;
    let local = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()?;
    Some(from_vietnam_time(local))
}

#[async_trait]
impl ProviderAdapter for PayosAdapter {
    fn provider(&self) -> Provider {
        Provider::Payos
    }

    async fn create_payment_link(
        &self,
        merchant_id: &str,
        request: &PaymentLinkRequest,
    ) -> Result<Outcome<PaymentLink>, PaygateError> {
        let op = Operation::CreatePaymentLink;
        let creds = self.credentials(merchant_id, op).await?;
        let order_code = validate_payment_link(request)?;
        let cancel_url = request.cancel_url.as_deref().unwrap_or_default();

        let raw = create_signature_string(
            request.amount,
            cancel_url,
            &request.description,
            order_code,
            &request.return_url,
        );
        let signature = signature::sign_for(Provider::Payos, &creds.checksum_key, &raw)?;

        let mut body = json!({
            "orderCode": order_code,
            "amount": request.amount,
            "description": request.description,
            "cancelUrl": cancel_url,
            "returnUrl": request.return_url,
            "signature": signature,
        });
        if !request.items.is_empty() {
            body["items"] = request
                .items
                .iter()
                .map(|item| json!({"name": item.name, "quantity": item.quantity, "price": item.price}))
                .collect();
        }
        if let Some(buyer) = &request.buyer {
            body["buyerName"] = json!(buyer.name);
            body["buyerEmail"] = json!(buyer.email);
            body["buyerPhone"] = json!(buyer.phone);
            body["buyerAddress"] = json!(buyer.address);
        }
        if let Some(expires_at) = request.expires_at {
            body["expiredAt"] = json!(expiry_seconds(expires_at));
        }

        let http = self
            .request(reqwest::Method::POST, "/v2/payment-requests", &creds)
            .json(&body);
        let (status, payload) = send(Provider::Payos, op, http).await?;
        let outcome = Self::classify(op, status, payload, Some(&request.order_id))?;

        outcome.try_map(|data| {
            let Some(checkout_url) = str_field(&data, "checkoutUrl").map(str::to_string) else {
                return Err(PaygateError::unknown(
                    VendorReply::new(Provider::Payos, op, status, data),
                    "success response has no checkoutUrl",
                ));
            };
            Ok(PaymentLink {
                provider: Provider::Payos,
                order_id: request.order_id.clone(),
                checkout_url,
                qr_code: str_field(&data, "qrCode").map(str::to_string),
                deeplink: None,
                raw: data,
            })
        })
    }

    async fn transaction_status(
        &self,
        merchant_id: &str,
        request: &TransactionStatusRequest,
    ) -> Result<Outcome<Value>, PaygateError> {
        let op = Operation::TransactionStatus;
        let creds = self.credentials(merchant_id, op).await?;

        let mut c = Checker::new(op);
        c.check(
            !request.order_id.is_empty()
                && request.order_id.chars().all(|ch| ch.is_ascii_alphanumeric()),
            "order_id",
            "must be an order code or payment link id",
        );
        c.finish()?;

        let path = format!("/v2/payment-requests/{}", request.order_id);
        let http = self.request(reqwest::Method::GET, &path, &creds);
        let (status, payload) = send(Provider::Payos, op, http).await?;
        let outcome = Self::classify(op, status, payload, Some(&request.order_id))?;

        let open = outcome
            .data()
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|s| OPEN_STATUSES.contains(&s));
        Ok(if open {
            Outcome::Pending(outcome.into_data())
        } else {
            outcome
        })
    }

    async fn register_webhook(&self, merchant_id: &str) -> Result<Outcome<Value>, PaygateError> {
        let op = Operation::RegisterWebhook;
        let creds = self.credentials(merchant_id, op).await?;
        let webhook_url = self.ctx.config.ipn_url(Provider::Payos, merchant_id);

        let http = self
            .request(reqwest::Method::POST, "/confirm-webhook", &creds)
            .json(&json!({ "webhookUrl": webhook_url }));
        let (status, payload) = send(Provider::Payos, op, http).await?;
        let reply = VendorReply::new(Provider::Payos, op, status, payload);
        match code_text(&reply.payload, "code") {
            Some(code) => CODES.classify(code.as_str(), reply.with_code(&code)),
            None => Err(PaygateError::unknown(reply, "response has no code")),
        }
    }

    fn acknowledgement(&self) -> Option<Acknowledgement> {
        Some(Acknowledgement {
            status: 200,
            body: Some(json!({ "success": true })),
        })
    }

    fn inspect_webhook(
        &self,
        credentials: Option<&CredentialBundle>,
        callback: &InboundCallback,
        now: DateTime<Utc>,
    ) -> Result<WebhookVerdict, PaygateError> {
        let envelope = match json_object(callback) {
            Ok(body) => body,
            Err(reason) => return Ok(WebhookVerdict::Drop(reason)),
        };
        let Some(Value::Object(data)) = envelope.get("data") else {
            return Ok(WebhookVerdict::Drop(DropReason::Malformed(
                "envelope has no data object".to_string(),
            )));
        };
        let data_value = Value::Object(data.clone());
        if is_test_fixture(&data_value) {
            return Ok(WebhookVerdict::Drop(DropReason::TestFixture));
        }

        let Some(CredentialBundle::Payos(creds)) = credentials else {
            return Ok(WebhookVerdict::Drop(DropReason::Unverifiable));
        };
        let claimed = envelope.get("signature").and_then(Value::as_str).unwrap_or_default();
        let canonical = sorted_data_pairs(data);
        if !signature::verify_for(Provider::Payos, &creds.checksum_key, &canonical, claimed)? {
            return Ok(WebhookVerdict::Drop(DropReason::BadSignature));
        }

        let Some(happened_at) = transaction_time(data) else {
            return Ok(WebhookVerdict::Drop(DropReason::Malformed(
                "transactionDateTime is missing or unreadable".to_string(),
            )));
        };
        let max_age = chrono::Duration::from_std(self.ctx.config.payos_stale_after)
            .unwrap_or(chrono::Duration::MAX);
        if now - happened_at > max_age {
            return Ok(WebhookVerdict::Drop(DropReason::Stale));
        }

        Ok(WebhookVerdict::Forward(data_value))
    }
}
