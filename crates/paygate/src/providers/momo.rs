//! MoMo wallet gateway (API v2).
//!
//! Requests are JSON, signed with HMAC-SHA256 over an alphabetical
//! `key=value&...` string. Callbacks carry the same style of signature and
//! are acknowledged with an empty 204.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::adapter::{
    Acknowledgement, AdapterContext, DropReason, InboundCallback, Item, PaymentLink,
    PaymentLinkRequest, ProviderAdapter, TransactionStatusRequest, WebhookVerdict,
};
use crate::error::{PaygateError, VendorReply};
use crate::outcome::{CodeTable, Outcome, OutcomeKind, Resolution};
use crate::provider::{Operation, Provider};
use crate::signature::{self, ordered_pairs};
use crate::store::{CredentialBundle, MomoCredentials};
use crate::validation::{is_order_reference, Checker};

use super::{json_object, listing, send, str_field};

const REQUEST_TYPES: &[&str] = &["captureWallet", "payWithATM", "payWithCC", "payWithMethod"];
const LANGS: &[&str] = &["vi", "en"];
const MIN_AMOUNT: i64 = 1_000;
const MAX_AMOUNT: i64 = 50_000_000;
const MAX_ITEMS: usize = 50;

use OutcomeKind::{MerchantError as M, Pending as P, Success as S, SystemError as X, UserError as U};

pub static CODES: CodeTable<i64> = CodeTable {
    kinds: &[
        (0, S),
        (1000, P),
        (7000, P),
        (7002, P),
        (9000, P),
        (1002, U),
        (1004, U),
        (1006, U),
        (4001, U),
        (4100, U),
        (10, X),
        (11, X),
        (12, X),
        (47, X),
        (98, X),
        (99, X),
        (1005, X),
        (1007, X),
        (1026, X),
        (13, M),
        (20, M),
        (21, M),
        (22, M),
        (40, M),
        (41, M),
        (42, M),
        (43, M),
        (45, M),
        (1001, M),
        (1003, M),
        (1017, M),
        (1080, M),
        (1081, M),
        (1088, M),
        (2019, M),
    ],
    resolutions: &[
        (10, Resolution::Unavailable),
        (12, Resolution::Unavailable),
        (98, Resolution::Unavailable),
        (99, Resolution::Unavailable),
        (11, Resolution::Rejected(&["Partner access denied, check partnerCode and IP allow-list"])),
        (47, Resolution::Rejected(&[])),
        (1005, Resolution::Rejected(&["Payment URL or QR code expired"])),
        (1007, Resolution::Rejected(&[])),
        (1026, Resolution::Rejected(&[])),
        (20, Resolution::BadFormat(&[])),
        (13, Resolution::Rejected(&["Merchant authentication failed, check accessKey and secretKey"])),
        (21, Resolution::Rejected(&[])),
        (22, Resolution::Rejected(&[])),
        (40, Resolution::Rejected(&["Duplicated requestId"])),
        (41, Resolution::Rejected(&["Duplicated orderId"])),
        (42, Resolution::Rejected(&[])),
        (43, Resolution::Rejected(&[])),
        (45, Resolution::Rejected(&[])),
        (1001, Resolution::Rejected(&[])),
        (1003, Resolution::Rejected(&[])),
        (1017, Resolution::Rejected(&[])),
        (1080, Resolution::Rejected(&[])),
        (1081, Resolution::Rejected(&[])),
        (1088, Resolution::Rejected(&[])),
        (2019, Resolution::Rejected(&[])),
    ],
};

/// Fields MoMo signs on its instant payment notification, in signing order.
const IPN_FIELDS: &[&str] = &[
    "amount",
    "extraData",
    "message",
    "orderId",
    "orderInfo",
    "orderType",
    "partnerCode",
    "payType",
    "requestId",
    "responseTime",
    "resultCode",
    "transId",
];

pub struct MomoAdapter {
    ctx: AdapterContext,
}

impl MomoAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    async fn credentials(
        &self,
        merchant_id: &str,
        operation: Operation,
    ) -> Result<MomoCredentials, PaygateError> {
        match self
            .ctx
            .credentials(merchant_id, Provider::Momo, operation)
            .await?
        {
            CredentialBundle::Momo(c) => Ok(c),
            _ => Err(PaygateError::missing_credentials(Provider::Momo, operation)),
        }
    }

    fn classify(
        operation: Operation,
        status: u16,
        payload: Value,
        order_id: &str,
    ) -> Result<Outcome<Value>, PaygateError> {
        let reply = VendorReply::new(Provider::Momo, operation, status, payload)
            .with_order_id(Some(order_id));
        let Some(code) = reply.payload.get("resultCode").and_then(Value::as_i64) else {
            return Err(PaygateError::unknown(reply, "response has no resultCode"));
        };
        CODES.classify(code, reply.with_code(code))
    }
}

pub fn validate_payment_link(request: &PaymentLinkRequest, now: DateTime<Utc>) -> Result<(), PaygateError> {
    let mut c = Checker::new(Operation::CreatePaymentLink);
    c.range("amount", request.amount, MIN_AMOUNT, MAX_AMOUNT);
    c.check(
        is_order_reference(&request.order_id),
        "order_id",
        "must be alphanumeric runs separated by '-', '_' or '.'",
    );
    c.not_empty("description", &request.description);
    c.url("return_url", &request.return_url);
    c.check(
        request.items.len() <= MAX_ITEMS,
        "items",
        format!("must contain at most {MAX_ITEMS} items"),
    );
    for (i, item) in request.items.iter().enumerate() {
        c.at_least(&format!("items[{i}].price"), item.price, 0);
        c.check(
            line_total(item).is_some(),
            &format!("items[{i}].quantity"),
            "price times quantity overflows",
        );
    }
    if let Some(method) = &request.payment_method {
        c.one_of("payment_method", method, REQUEST_TYPES);
    }
    if let Some(lang) = &request.lang {
        c.one_of("lang", lang, LANGS);
    }
    if let Some(currency) = &request.currency {
        c.one_of("currency", currency, &["VND"]);
    }
    if let Some(expires_at) = request.expires_at {
        c.check(expires_at > now.timestamp(), "expires_at", "must be in the future");
    }
    c.finish()
}

fn line_total(item: &Item) -> Option<i64> {
    item.price.checked_mul(i64::from(item.quantity))
}

fn encode_extra_data(extra: Option<&Value>) -> Result<String, PaygateError> {
    match extra {
        None | Some(Value::Null) => Ok(String::new()),
        Some(v) => Ok(base64::engine::general_purpose::STANDARD.encode(serde_json::to_vec(v)?)),
    }
}

/// Canonical string for payment creation.
#[allow(clippy::too_many_arguments)]
pub fn create_signature_string(
    creds: &MomoCredentials,
    amount: &str,
    extra_data: &str,
    ipn_url: &str,
    order_id: &str,
    order_info: &str,
    redirect_url: &str,
    request_id: &str,
    request_type: &str,
) -> String {
    ordered_pairs(&[
        ("accessKey", creds.access_key.as_str()),
        ("amount", amount),
        ("extraData", extra_data),
        ("ipnUrl", ipn_url),
        ("orderId", order_id),
        ("orderInfo", order_info),
        ("partnerCode", creds.partner_code.as_str()),
        ("redirectUrl", redirect_url),
        ("requestId", request_id),
        ("requestType", request_type),
    ])
}

pub fn query_signature_string(creds: &MomoCredentials, order_id: &str, request_id: &str) -> String {
    ordered_pairs(&[
        ("accessKey", creds.access_key.as_str()),
        ("orderId", order_id),
        ("partnerCode", creds.partner_code.as_str()),
        ("requestId", request_id),
    ])
}

/// Canonical string of an inbound notification. Absent fields sign as empty.
pub fn ipn_signature_string(creds: &MomoCredentials, body: &serde_json::Map<String, Value>) -> String {
    let values: Vec<(&str, String)> = IPN_FIELDS
        .iter()
        .map(|k| {
            let v = match body.get(*k) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            (*k, v)
        })
        .collect();
    let mut pairs: Vec<(&str, &str)> = vec![("accessKey", creds.access_key.as_str())];
    pairs.extend(values.iter().map(|(k, v)| (*k, v.as_str())));
    ordered_pairs(&pairs)
}

#[async_trait]
impl ProviderAdapter for MomoAdapter {
    fn provider(&self) -> Provider {
        Provider::Momo
    }

    async fn create_payment_link(
        &self,
        merchant_id: &str,
        request: &PaymentLinkRequest,
    ) -> Result<Outcome<PaymentLink>, PaygateError> {
        let op = Operation::CreatePaymentLink;
        let creds = self.credentials(merchant_id, op).await?;
        let now = Utc::now();
        validate_payment_link(request, now)?;

        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let request_type = request.payment_method.as_deref().unwrap_or("captureWallet");
        let lang = request.lang.as_deref().unwrap_or("vi");
        let ipn_url = self.ctx.config.ipn_url(Provider::Momo, merchant_id);
        let extra_data = encode_extra_data(request.extra_data.as_ref())?;
        let amount = request.amount.to_string();

        let raw = create_signature_string(
            &creds,
            &amount,
            &extra_data,
            &ipn_url,
            &request.order_id,
            &request.description,
            &request.return_url,
            &request_id,
            request_type,
        );
        let signature = signature::sign_for(Provider::Momo, &creds.secret_key, &raw)?;

        let mut body = json!({
            "partnerCode": creds.partner_code,
            "requestId": request_id,
            "amount": request.amount,
            "orderId": request.order_id,
            "orderInfo": request.description,
            "redirectUrl": request.return_url,
            "ipnUrl": ipn_url,
            "requestType": request_type,
            "extraData": extra_data,
            "autoCapture": true,
            "lang": lang,
            "signature": signature,
        });
        if !request.items.is_empty() {
            body["items"] = request
                .items
                .iter()
                .map(|item| {
                    json!({
                        "id": item.id.clone().unwrap_or_else(|| item.name.clone()),
                        "name": item.name,
                        "price": item.price,
                        "currency": "VND",
                        "quantity": item.quantity,
                        "totalPrice": line_total(item).unwrap_or_default(),
                    })
                })
                .collect();
        }
        if let Some(buyer) = &request.buyer {
            body["userInfo"] = json!({
                "name": buyer.name,
                "phoneNumber": buyer.phone,
                "email": buyer.email,
            });
        }
        if let Some(expires_at) = request.expires_at {
            let minutes = ((expires_at - now.timestamp()) / 60).max(1);
            body["orderExpireTime"] = json!(minutes);
        }

        let http = self
            .ctx
            .http
            .post(format!("{}/create", self.ctx.config.momo_url))
            .timeout(self.ctx.config.request_timeout)
            .json(&body);
        let (status, payload) = send(Provider::Momo, op, http).await?;
        let outcome = Self::classify(op, status, payload, &request.order_id)?;

        outcome.try_map(|data| {
            let Some(pay_url) = str_field(&data, "payUrl").map(str::to_string) else {
                return Err(PaygateError::unknown(
                    VendorReply::new(Provider::Momo, op, status, data)
                        .with_order_id(Some(&request.order_id)),
                    "success response has no payUrl",
                ));
            };
            Ok(PaymentLink {
                provider: Provider::Momo,
                order_id: request.order_id.clone(),
                checkout_url: pay_url,
                qr_code: str_field(&data, "qrCodeUrl").map(str::to_string),
                deeplink: str_field(&data, "deeplink").map(str::to_string),
                raw: data,
            })
        })
    }

    /// The status response carries `lastUpdated` where the published docs
    /// list `responseTime`, and `signature` is null. Both are passed through
    /// as observed.
    async fn transaction_status(
        &self,
        merchant_id: &str,
        request: &TransactionStatusRequest,
    ) -> Result<Outcome<Value>, PaygateError> {
        let op = Operation::TransactionStatus;
        let creds = self.credentials(merchant_id, op).await?;

        let mut c = Checker::new(op);
        c.check(
            is_order_reference(&request.order_id),
            "order_id",
            "must be alphanumeric runs separated by '-', '_' or '.'",
        );
        if let Some(lang) = &request.lang {
            c.one_of("lang", lang, LANGS);
        }
        c.finish()?;

        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let raw = query_signature_string(&creds, &request.order_id, &request_id);
        let signature = signature::sign_for(Provider::Momo, &creds.secret_key, &raw)?;

        let http = self
            .ctx
            .http
            .post(format!("{}/query", self.ctx.config.momo_url))
            .timeout(self.ctx.config.request_timeout)
            .json(&json!({
                "partnerCode": creds.partner_code,
                "requestId": request_id,
                "orderId": request.order_id,
                "lang": request.lang.as_deref().unwrap_or("vi"),
                "signature": signature,
            }));
        let (status, payload) = send(Provider::Momo, op, http).await?;
        Self::classify(op, status, payload, &request.order_id)
    }

    async fn banks(&self, _merchant_id: Option<&str>) -> Result<Outcome<Value>, PaygateError> {
        let op = Operation::Banks;
        let http = self
            .ctx
            .http
            .get(format!("{}/bankcodes", self.ctx.config.momo_url))
            .timeout(self.ctx.config.request_timeout);
        let (status, payload) = send(Provider::Momo, op, http).await?;
        listing(Provider::Momo, op, status, payload)
    }

    fn acknowledgement(&self) -> Option<Acknowledgement> {
        Some(Acknowledgement {
            status: 204,
            body: None,
        })
    }

    fn inspect_webhook(
        &self,
        credentials: Option<&CredentialBundle>,
        callback: &InboundCallback,
        _now: DateTime<Utc>,
    ) -> Result<WebhookVerdict, PaygateError> {
        let body = match json_object(callback) {
            Ok(body) => body,
            Err(reason) => return Ok(WebhookVerdict::Drop(reason)),
        };
        let Some(CredentialBundle::Momo(creds)) = credentials else {
            return Ok(WebhookVerdict::Drop(DropReason::Unverifiable));
        };
        let claimed = body.get("signature").and_then(Value::as_str).unwrap_or_default();
        let canonical = ipn_signature_string(creds, &body);
        if !signature::verify_for(Provider::Momo, &creds.secret_key, &canonical, claimed)? {
            return Ok(WebhookVerdict::Drop(DropReason::BadSignature));
        }
        let order_id = body.get("orderId").and_then(Value::as_str).unwrap_or_default();
        tracing::debug!(order_id, "momo notification verified");
        Ok(WebhookVerdict::Forward(Value::Object(body)))
    }
}
