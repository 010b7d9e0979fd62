//! VNPay gateway.
//!
//! Payment links are built locally: every `vnp_*` parameter is sorted,
//! form-encoded and signed with HMAC-SHA512, and the digest is appended as
//! `vnp_SecureHash`. No network call is involved. Status queries go to the
//! merchant web API (`querydr`) with a pipe-joined signature.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{json, Map, Value};

use crate::adapter::{
    Acknowledgement, AdapterContext, DropReason, InboundCallback, PaymentLink, PaymentLinkRequest,
    ProviderAdapter, TransactionStatusRequest, WebhookVerdict,
};
use crate::error::{PaygateError, VendorReply};
use crate::outcome::{conclude, CodeTable, Outcome, OutcomeKind, Resolution};
use crate::provider::{Operation, Provider};
use crate::signature::{self, pipe_joined, sorted_query};
use crate::store::{CredentialBundle, VnpayCredentials};
use crate::validation::Checker;

use super::{code_text, listing, send, vietnam_time};

const MIN_AMOUNT: i64 = 1_000;
/// `vnp_Amount` is sent in hundredths of a dong.
const MAX_AMOUNT: i64 = i64::MAX / 100;
const DEFAULT_EXPIRY_MINUTES: i64 = 15;
const LANGS: &[&str] = &["vn", "en"];
const SECURE_HASH: &str = "vnp_SecureHash";
const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";
/// `vnp_TransactionStatus` of a transaction still waiting on the customer.
const TRANSACTION_OPEN: &str = "01";

use OutcomeKind::{MerchantError as M, Success as S, SystemError as X, UserError as U};

pub static CODES: CodeTable<&'static str> = CodeTable {
    kinds: &[
        ("00", S),
        ("07", U),
        ("09", U),
        ("10", U),
        ("11", U),
        ("12", U),
        ("13", U),
        ("24", U),
        ("51", U),
        ("65", U),
        ("79", U),
        ("02", M),
        ("03", M),
        ("91", M),
        ("94", M),
        ("97", M),
        ("75", X),
    ],
    resolutions: &[
        ("02", Resolution::Rejected(&["Invalid TMN Code"])),
        ("03", Resolution::BadFormat(&[])),
        ("91", Resolution::Rejected(&[])),
        ("94", Resolution::Rejected(&["Duplicated request"])),
        ("97", Resolution::Rejected(&["Invalid checksum, check the hash secret"])),
        ("75", Resolution::Unavailable),
    ],
};

/// `vnp_ResponseCode` classification. A successful query for a transaction
/// the customer has not finished yet is pending.
pub fn classify(reply: VendorReply) -> Result<Outcome<Value>, PaygateError> {
    let Some(code) = code_text(&reply.payload, "vnp_ResponseCode") else {
        return Err(PaygateError::unknown(reply, "response has no vnp_ResponseCode"));
    };
    let open = reply.payload.get("vnp_TransactionStatus").and_then(Value::as_str) == Some(TRANSACTION_OPEN);
    let kind = match CODES.kind_of(code.as_str()) {
        Some(S) if open => Some(OutcomeKind::Pending),
        other => other,
    };
    let resolution = CODES.resolution_of(code.as_str());
    conclude(kind, resolution, reply.with_code(code))
}

/// `yyyyMMddHHmmss` in Vietnam time.
pub fn format_date(t: DateTime<Utc>) -> String {
    vietnam_time(t).format("%Y%m%d%H%M%S").to_string()
}

fn is_order_info(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Sorted, form-encoded query over the signed parameters plus its hash.
pub fn signed_query(params: &BTreeMap<String, String>, hash_secret: &str) -> Result<String, PaygateError> {
    let query = sorted_query(params);
    let hash = signature::sign_for(Provider::Vnpay, hash_secret, &query)?;
    Ok(format!("{query}&{SECURE_HASH}={hash}"))
}

/// Build the parameter set of a `pay` command.
pub fn payment_params(
    creds: &VnpayCredentials,
    version: &str,
    request: &PaymentLinkRequest,
    now: DateTime<Utc>,
) -> Result<BTreeMap<String, String>, PaygateError> {
    let op = Operation::CreatePaymentLink;
    let mut c = Checker::new(op);
    c.not_empty("order_id", &request.order_id);
    c.range("amount", request.amount, MIN_AMOUNT, MAX_AMOUNT);
    c.check(
        is_order_info(&request.description),
        "description",
        "must contain only letters, digits and spaces",
    );
    c.url("return_url", &request.return_url);
    if let Some(ip) = c.required("client_ip", request.client_ip.as_deref()) {
        c.ipv4("client_ip", ip);
    }
    let lang = request.lang.as_deref().unwrap_or("vn");
    c.one_of("lang", lang, LANGS);
    let default_expiry = now + TimeDelta::minutes(DEFAULT_EXPIRY_MINUTES);
    let expires = match request.expires_at.map(timestamp) {
        None => default_expiry,
        Some(Some(t)) if t > now => t,
        Some(_) => {
            c.fail("expires_at", "must be a unix time after the creation time");
            default_expiry
        }
    };
    c.finish()?;

    let mut params = BTreeMap::new();
    let mut set = |k: &str, v: String| {
        params.insert(k.to_string(), v);
    };
    set("vnp_Version", version.to_string());
    set("vnp_Command", "pay".to_string());
    set("vnp_TmnCode", creds.tmn_code.clone());
    set("vnp_Amount", (request.amount * 100).to_string());
    set("vnp_CurrCode", "VND".to_string());
    set("vnp_TxnRef", request.order_id.clone());
    set("vnp_OrderInfo", request.description.clone());
    set("vnp_OrderType", "other".to_string());
    set("vnp_Locale", lang.to_string());
    set("vnp_ReturnUrl", request.return_url.clone());
    set("vnp_IpAddr", request.client_ip.clone().unwrap_or_default());
    set("vnp_CreateDate", format_date(now));
    set("vnp_ExpireDate", format_date(expires));
    if let Some(bank) = request.bank_code.as_ref().filter(|b| !b.is_empty()) {
        set("vnp_BankCode", bank.clone());
    }
    Ok(params)
}

#[allow(clippy::too_many_arguments)]
pub fn query_hash_string(
    request_id: &str,
    version: &str,
    command: &str,
    tmn_code: &str,
    txn_ref: &str,
    transaction_date: &str,
    create_date: &str,
    ip_addr: &str,
    order_info: &str,
) -> String {
    pipe_joined(&[
        request_id,
        version,
        command,
        tmn_code,
        txn_ref,
        transaction_date,
        create_date,
        ip_addr,
        order_info,
    ])
}

/// The `vnp_*` parameters of a notification, from the query string or, if
/// that is empty, a form-encoded body.
fn notification_params(callback: &InboundCallback) -> BTreeMap<String, String> {
    let source: Vec<(String, String)> = if callback.query.keys().any(|k| k.starts_with("vnp_")) {
        callback
            .query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    } else {
        url::form_urlencoded::parse(&callback.body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    };
    source
        .into_iter()
        .filter(|(k, _)| k.starts_with("vnp_"))
        .collect()
}

pub struct VnpayAdapter {
    ctx: AdapterContext,
}

impl VnpayAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    async fn credentials(
        &self,
        merchant_id: &str,
        operation: Operation,
    ) -> Result<VnpayCredentials, PaygateError> {
        match self
            .ctx
            .credentials(merchant_id, Provider::Vnpay, operation)
            .await?
        {
            CredentialBundle::Vnpay(c) => Ok(c),
            _ => Err(PaygateError::missing_credentials(Provider::Vnpay, operation)),
        }
    }
}

#[async_trait]
impl ProviderAdapter for VnpayAdapter {
    fn provider(&self) -> Provider {
        Provider::Vnpay
    }

    async fn create_payment_link(
        &self,
        merchant_id: &str,
        request: &PaymentLinkRequest,
    ) -> Result<Outcome<PaymentLink>, PaygateError> {
        let creds = self
            .credentials(merchant_id, Operation::CreatePaymentLink)
            .await?;
        let params = payment_params(&creds, &self.ctx.config.vnpay_version, request, Utc::now())?;
        let query = signed_query(&params, &creds.hash_secret)?;

        let raw: Map<String, Value> = params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Ok(Outcome::Success(PaymentLink {
            provider: Provider::Vnpay,
            order_id: request.order_id.clone(),
            checkout_url: format!("{}/paymentv2/vpcpay.html?{query}", self.ctx.config.vnpay_url),
            qr_code: None,
            deeplink: None,
            raw: Value::Object(raw),
        }))
    }

    async fn transaction_status(
        &self,
        merchant_id: &str,
        request: &TransactionStatusRequest,
    ) -> Result<Outcome<Value>, PaygateError> {
        let op = Operation::TransactionStatus;
        let creds = self.credentials(merchant_id, op).await?;

        let mut c = Checker::new(op);
        c.not_empty("order_id", &request.order_id);
        let transaction_date = match request.transaction_date.and_then(timestamp) {
            Some(t) => Some(format_date(t)),
            None => {
                c.fail("transaction_date", "is required as unix seconds");
                None
            }
        };
        if let Some(ip) = c.required("client_ip", request.client_ip.as_deref()) {
            c.ipv4("client_ip", ip);
        }
        if let Some(info) = c.required("description", request.description.as_deref()) {
            c.check(
                is_order_info(info),
                "description",
                "must contain only letters, digits and spaces",
            );
        }
        c.finish()?;

        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let version = self.ctx.config.vnpay_version.as_str();
        let transaction_date = transaction_date.unwrap_or_default();
        let create_date = format_date(Utc::now());
        let ip = request.client_ip.as_deref().unwrap_or_default();
        let info = request.description.as_deref().unwrap_or_default();

        let raw = query_hash_string(
            &request_id,
            version,
            "querydr",
            &creds.tmn_code,
            &request.order_id,
            &transaction_date,
            &create_date,
            ip,
            info,
        );
        let hash = signature::sign_for(Provider::Vnpay, &creds.hash_secret, &raw)?;

        let http = self
            .ctx
            .http
            .post(format!("{}/merchant_webapi/api/transaction", self.ctx.config.vnpay_url))
            .timeout(self.ctx.config.request_timeout)
            .json(&json!({
                "vnp_RequestId": request_id,
                "vnp_Version": version,
                "vnp_Command": "querydr",
                "vnp_TmnCode": creds.tmn_code,
                "vnp_TxnRef": request.order_id,
                "vnp_OrderInfo": info,
                "vnp_TransactionDate": transaction_date,
                "vnp_CreateDate": create_date,
                "vnp_IpAddr": ip,
                "vnp_SecureHash": hash,
            }));
        let (status, payload) = send(Provider::Vnpay, op, http).await?;
        classify(VendorReply::new(Provider::Vnpay, op, status, payload).with_order_id(Some(&request.order_id)))
    }

    async fn banks(&self, merchant_id: Option<&str>) -> Result<Outcome<Value>, PaygateError> {
        let op = Operation::Banks;
        let Some(merchant_id) = merchant_id else {
            return Err(PaygateError::missing_credentials(Provider::Vnpay, op));
        };
        let creds = self.credentials(merchant_id, op).await?;
        let http = self
            .ctx
            .http
            .post(format!("{}/qrpayauth/api/merchant/get_bank_list", self.ctx.config.vnpay_url))
            .timeout(self.ctx.config.request_timeout)
            .form(&[("tmn_code", creds.tmn_code.as_str())]);
        let (status, payload) = send(Provider::Vnpay, op, http).await?;
        listing(Provider::Vnpay, op, status, payload)
    }

    fn acknowledgement(&self) -> Option<Acknowledgement> {
        Some(Acknowledgement {
            status: 200,
            body: Some(json!({ "RspCode": "00", "Message": "Confirm Success" })),
        })
    }

    fn inspect_webhook(
        &self,
        credentials: Option<&CredentialBundle>,
        callback: &InboundCallback,
        _now: DateTime<Utc>,
    ) -> Result<WebhookVerdict, PaygateError> {
        let mut params = notification_params(callback);
        let Some(hash) = params.remove(SECURE_HASH) else {
            return Ok(WebhookVerdict::Drop(DropReason::Malformed(
                "notification has no vnp_SecureHash".to_string(),
            )));
        };
        params.remove(SECURE_HASH_TYPE);
        let Some(CredentialBundle::Vnpay(creds)) = credentials else {
            return Ok(WebhookVerdict::Drop(DropReason::Unverifiable));
        };
        let canonical = sorted_query(&params);
        if !signature::verify_for(Provider::Vnpay, &creds.hash_secret, &canonical, &hash)? {
            return Ok(WebhookVerdict::Drop(DropReason::BadSignature));
        }
        let data: Map<String, Value> = params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Ok(WebhookVerdict::Forward(Value::Object(data)))
    }
}
