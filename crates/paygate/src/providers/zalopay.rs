//! ZaloPay order API (v2).
//!
//! MACs are HMAC-SHA256 over pipe-joined fields: `key1` signs requests,
//! `key2` signs callbacks. Classification is two-level: `return_code`
//! decides success/pending/failure and `sub_return_code` says why.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::adapter::{
    Acknowledgement, AdapterContext, DropReason, InboundCallback, PaymentLink, PaymentLinkRequest,
    ProviderAdapter, TransactionStatusRequest, WebhookVerdict,
};
use crate::error::{PaygateError, VendorReply};
use crate::outcome::{conclude, CodeTable, Outcome, OutcomeKind, Resolution};
use crate::provider::{Operation, Provider};
use crate::signature::{self, pipe_joined};
use crate::store::{CredentialBundle, ZalopayCredentials};
use crate::validation::Checker;

use super::{json_object, send, str_field, vietnam_time};

const MIN_AMOUNT: i64 = 1_000;
const MAX_APP_USER: usize = 50;
const MAX_ORDER_ID: usize = 33;
const MAX_DESCRIPTION: usize = 256;
const MAX_ITEM_JSON: usize = 2048;
const MAX_EMBED_JSON: usize = 1024;
const MIN_EXPIRE_SECS: i64 = 300;
const MAX_EXPIRE_SECS: i64 = 2_592_000;

use OutcomeKind::{MerchantError as M, SystemError as X, UserError as U};

const REJECTED: Resolution = Resolution::Rejected(&[]);
const BAD_FORMAT: Resolution = Resolution::BadFormat(&[]);

/// Classification of `sub_return_code` when `return_code` is 2.
pub static SUB_CODES: CodeTable<i64> = CodeTable {
    kinds: &[
        (-63, U),
        (-2, M),
        (-3, M),
        (-4, M),
        (-5, M),
        (-6, M),
        (-8, M),
        (-9, M),
        (-10, M),
        (-11, M),
        (-12, M),
        (-13, M),
        (-14, M),
        (-23, M),
        (-24, M),
        (-25, M),
        (-26, M),
        (-27, M),
        (-28, M),
        (-49, M),
        (-53, M),
        (-54, M),
        (-92, M),
        (-101, M),
        (-401, M),
        (-402, M),
        (-403, M),
        (-405, M),
        (-429, M),
        (-1, X),
        (-15, X),
        (-16, X),
        (-17, X),
        (-18, X),
        (-19, X),
        (-20, X),
        (-21, X),
        (-22, X),
        (-29, X),
        (-30, X),
        (-31, X),
        (-500, X),
    ],
    // -402, -403 and -405 are catalogued but deliberately unresolved.
    resolutions: &[
        (-10, BAD_FORMAT),
        (-12, BAD_FORMAT),
        (-401, BAD_FORMAT),
        (-2, Resolution::Rejected(&["Wrong app_id or mac computed with the wrong key"])),
        (-3, REJECTED),
        (-4, REJECTED),
        (-5, REJECTED),
        (-6, REJECTED),
        (-8, REJECTED),
        (-9, REJECTED),
        (-11, REJECTED),
        (-13, REJECTED),
        (-14, REJECTED),
        (-23, REJECTED),
        (-24, REJECTED),
        (-25, REJECTED),
        (-26, REJECTED),
        (-27, REJECTED),
        (-28, REJECTED),
        (-49, REJECTED),
        (-53, REJECTED),
        (-54, REJECTED),
        (-92, REJECTED),
        (-101, REJECTED),
        (-429, Resolution::Rejected(&["Too many requests for this app_id"])),
        (-1, Resolution::Unavailable),
        (-15, Resolution::Unavailable),
        (-16, Resolution::Unavailable),
        (-17, Resolution::Unavailable),
        (-18, Resolution::Unavailable),
        (-19, Resolution::Unavailable),
        (-20, Resolution::Unavailable),
        (-21, Resolution::Unavailable),
        (-22, Resolution::Unavailable),
        (-29, Resolution::Unavailable),
        (-30, Resolution::Unavailable),
        (-31, Resolution::Unavailable),
        (-500, Resolution::Unavailable),
    ],
};

/// Two-level classification of an order API reply.
pub fn classify(reply: VendorReply) -> Result<Outcome<Value>, PaygateError> {
    let Some(return_code) = reply.payload.get("return_code").and_then(Value::as_i64) else {
        return Err(PaygateError::unknown(reply, "response has no return_code"));
    };
    match return_code {
        1 => Ok(Outcome::Success(reply.payload)),
        3 => Ok(Outcome::Pending(reply.payload)),
        2 => {
            let Some(sub) = reply.payload.get("sub_return_code").and_then(Value::as_i64) else {
                return Err(PaygateError::unknown(
                    reply.with_code(2),
                    "failure without sub_return_code",
                ));
            };
            let reply = reply.with_code(sub);
            conclude(SUB_CODES.kind_of(sub), SUB_CODES.resolution_of(sub), reply)
        }
        other => Err(PaygateError::unknown(
            reply.with_code(other),
            "return_code is not in the catalogue",
        )),
    }
}

/// `yymmdd_` in Vietnam time, as the order API requires.
pub fn app_trans_id(order_id: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", vietnam_time(now).format("%y%m%d"), order_id)
}

pub fn create_mac_string(
    app_id: u64,
    app_trans_id: &str,
    app_user: &str,
    amount: i64,
    app_time: i64,
    embed_data: &str,
    item: &str,
) -> String {
    let app_id = app_id.to_string();
    let amount = amount.to_string();
    let app_time = app_time.to_string();
    pipe_joined(&[
        app_id.as_str(),
        app_trans_id,
        app_user,
        amount.as_str(),
        app_time.as_str(),
        embed_data,
        item,
    ])
}

pub fn query_mac_string(creds: &ZalopayCredentials, app_trans_id: &str) -> String {
    let app_id = creds.app_id.to_string();
    pipe_joined(&[app_id.as_str(), app_trans_id, creds.key1.as_str()])
}

fn embed_data(request: &PaymentLinkRequest) -> Value {
    let mut embed = match &request.extra_data {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => json!({}),
    };
    embed["redirecturl"] = json!(request.return_url);
    embed
}

fn item_data(request: &PaymentLinkRequest) -> Value {
    request
        .items
        .iter()
        .map(|item| {
            json!({
                "itemid": item.id,
                "itemname": item.name,
                "itemprice": item.price,
                "itemquantity": item.quantity,
            })
        })
        .collect()
}

pub struct ZalopayAdapter {
    ctx: AdapterContext,
}

impl ZalopayAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    async fn credentials(
        &self,
        merchant_id: &str,
        operation: Operation,
    ) -> Result<ZalopayCredentials, PaygateError> {
        match self
            .ctx
            .credentials(merchant_id, Provider::Zalopay, operation)
            .await?
        {
            CredentialBundle::Zalopay(c) => Ok(c),
            _ => Err(PaygateError::missing_credentials(Provider::Zalopay, operation)),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ZalopayAdapter {
    fn provider(&self) -> Provider {
        Provider::Zalopay
    }

    async fn create_payment_link(
        &self,
        merchant_id: &str,
        request: &PaymentLinkRequest,
    ) -> Result<Outcome<PaymentLink>, PaygateError> {
        let op = Operation::CreatePaymentLink;
        let creds = self.credentials(merchant_id, op).await?;
        let now = Utc::now();

        let embed = embed_data(request).to_string();
        let item = item_data(request).to_string();
        let expire_secs = request.expires_at.map(|t| t.checked_sub(now.timestamp()));

        let mut c = Checker::new(op);
        let app_user = c.required("customer_id", request.customer_id.as_deref());
        if let Some(user) = app_user {
            c.max_chars("customer_id", user, MAX_APP_USER);
        }
        c.not_empty("order_id", &request.order_id);
        c.max_chars("order_id", &request.order_id, MAX_ORDER_ID);
        c.at_least("amount", request.amount, MIN_AMOUNT);
        c.max_chars("description", &request.description, MAX_DESCRIPTION);
        c.url("return_url", &request.return_url);
        c.check(item.len() <= MAX_ITEM_JSON, "items", "serialized items exceed 2048 bytes");
        c.check(embed.len() <= MAX_EMBED_JSON, "extra_data", "serialized embed data exceeds 1024 bytes");
        match expire_secs {
            Some(Some(secs)) => c.range("expires_at", secs, MIN_EXPIRE_SECS, MAX_EXPIRE_SECS),
            Some(None) => c.fail("expires_at", "is not a representable unix time"),
            None => {}
        }
        c.finish()?;
        let expire_secs = expire_secs.flatten();
        let app_user = app_user.unwrap_or_default();

        let trans_id = app_trans_id(&request.order_id, now);
        let app_time = now.timestamp_millis();
        let raw = create_mac_string(
            creds.app_id,
            &trans_id,
            app_user,
            request.amount,
            app_time,
            &embed,
            &item,
        );
        let mac = signature::sign_for(Provider::Zalopay, &creds.key1, &raw)?;

        let mut body = json!({
            "app_id": creds.app_id,
            "app_user": app_user,
            "app_trans_id": trans_id,
            "app_time": app_time,
            "amount": request.amount,
            "item": item,
            "embed_data": embed,
            "description": request.description,
            "bank_code": request.bank_code.clone().unwrap_or_default(),
            "callback_url": self.ctx.config.ipn_url(Provider::Zalopay, merchant_id),
            "mac": mac,
        });
        if let Some(secs) = expire_secs {
            body["expire_duration_seconds"] = json!(secs);
        }
        if let Some(buyer) = &request.buyer {
            body["phone"] = json!(buyer.phone);
            body["email"] = json!(buyer.email);
            body["address"] = json!(buyer.address);
        }

        let http = self
            .ctx
            .http
            .post(format!("{}/create", self.ctx.config.zalopay_url))
            .timeout(self.ctx.config.request_timeout)
            .json(&body);
        let (status, payload) = send(Provider::Zalopay, op, http).await?;
        let reply = VendorReply::new(Provider::Zalopay, op, status, payload).with_order_id(Some(&trans_id));

        classify(reply)?.try_map(|data| {
            let Some(order_url) = str_field(&data, "order_url").map(str::to_string) else {
                return Err(PaygateError::unknown(
                    VendorReply::new(Provider::Zalopay, op, status, data).with_order_id(Some(&trans_id)),
                    "success response has no order_url",
                ));
            };
            Ok(PaymentLink {
                provider: Provider::Zalopay,
                order_id: trans_id.clone(),
                checkout_url: order_url,
                qr_code: str_field(&data, "qr_code").map(str::to_string),
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
        c.not_empty("order_id", &request.order_id);
        c.max_chars("order_id", &request.order_id, 40);
        c.finish()?;

        let mac = signature::sign_for(
            Provider::Zalopay,
            &creds.key1,
            &query_mac_string(&creds, &request.order_id),
        )?;
        let http = self
            .ctx
            .http
            .post(format!("{}/query", self.ctx.config.zalopay_url))
            .timeout(self.ctx.config.request_timeout)
            .json(&json!({
                "app_id": creds.app_id,
                "app_trans_id": request.order_id,
                "mac": mac,
            }));
        let (status, payload) = send(Provider::Zalopay, op, http).await?;
        classify(VendorReply::new(Provider::Zalopay, op, status, payload).with_order_id(Some(&request.order_id)))
    }

    async fn banks(&self, merchant_id: Option<&str>) -> Result<Outcome<Value>, PaygateError> {
        let op = Operation::Banks;
        let Some(merchant_id) = merchant_id else {
            return Err(PaygateError::missing_credentials(Provider::Zalopay, op));
        };
        let creds = self.credentials(merchant_id, op).await?;
        let reqtime = Utc::now().timestamp_millis().to_string();
        let app_id = creds.app_id.to_string();
        let mac = signature::sign_for(Provider::Zalopay, &creds.key1, &pipe_joined(&[app_id.as_str(), reqtime.as_str()]))?;

        let http = self
            .ctx
            .http
            .post(&self.ctx.config.zalopay_banks_url)
            .timeout(self.ctx.config.request_timeout)
            .form(&[("appid", app_id.as_str()), ("reqtime", reqtime.as_str()), ("mac", mac.as_str())]);
        let (status, payload) = send(Provider::Zalopay, op, http).await?;
        let reply = VendorReply::new(Provider::Zalopay, op, status, payload);
        match reply.payload.get("returncode").and_then(Value::as_i64) {
            Some(1) => Ok(Outcome::Success(reply.payload)),
            Some(code) => Err(PaygateError::unknown(reply.with_code(code), "bank list request failed")),
            None => Err(PaygateError::unknown(reply, "response has no returncode")),
        }
    }

    fn acknowledgement(&self) -> Option<Acknowledgement> {
        Some(Acknowledgement {
            status: 200,
            body: Some(json!({ "return_code": 1, "return_message": "success" })),
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
        let (Some(data), Some(mac)) = (
            body.get("data").and_then(Value::as_str),
            body.get("mac").and_then(Value::as_str),
        ) else {
            return Ok(WebhookVerdict::Drop(DropReason::Malformed(
                "callback needs string data and mac".to_string(),
            )));
        };
        let Some(CredentialBundle::Zalopay(creds)) = credentials else {
            return Ok(WebhookVerdict::Drop(DropReason::Unverifiable));
        };
        if !signature::verify_for(Provider::Zalopay, &creds.key2, data, mac)? {
            return Ok(WebhookVerdict::Drop(DropReason::BadSignature));
        }
        match serde_json::from_str::<Value>(data) {
            Ok(parsed) => Ok(WebhookVerdict::Forward(parsed)),
            Err(e) => Ok(WebhookVerdict::Drop(DropReason::Malformed(format!(
                "data is not JSON: {e}"
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reply(payload: Value) -> VendorReply {
        VendorReply::new(Provider::Zalopay, Operation::CreatePaymentLink, 200, payload)
    }

    #[test]
    fn mac_string_field_order() {
        assert_eq!(
            create_mac_string(2553, "240101_42", "user1", 50000, 1704067200000, "{}", "[]"),
            "2553|240101_42|user1|50000|1704067200000|{}|[]"
        );
        let creds = ZalopayCredentials {
            app_id: 2553,
            key1: "k1".to_string(),
            key2: "k2".to_string(),
        };
        assert_eq!(query_mac_string(&creds, "240101_42"), "2553|240101_42|k1");
    }

    #[test]
    fn trans_id_prefix_uses_vietnam_date() {
        let late_utc = NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(app_trans_id("42", late_utc), "250101_42");
    }

    #[test]
    fn return_codes_drive_first_level() {
        assert!(!classify(reply(json!({"return_code": 1}))).unwrap().is_pending());
        assert!(classify(reply(json!({"return_code": 3}))).unwrap().is_pending());
        assert!(matches!(
            classify(reply(json!({"return_code": 4}))),
            Err(PaygateError::UnknownVendorResponse { .. })
        ));
    }

    #[test]
    fn every_sub_code_classifies() {
        for (code, kind) in SUB_CODES.kinds {
            let result = classify(reply(json!({"return_code": 2, "sub_return_code": code})));
            let unresolved = matches!(*code, -402 | -403 | -405);
            match result {
                Err(PaygateError::UnknownVendorResponse { .. }) => {
                    assert!(unresolved, "sub code {code} ({kind:?}) should be resolved")
                }
                Err(_) => assert!(!unresolved, "sub code {code} should stay unknown"),
                Ok(_) => panic!("failure sub code {code} classified as success"),
            }
        }
    }

    #[test]
    fn sub_code_resolutions() {
        let sub = |code: i64| classify(reply(json!({"return_code": 2, "sub_return_code": code})));
        assert!(matches!(sub(-63), Err(PaygateError::ApiResponse { kind: U, .. })));
        assert!(matches!(sub(-401), Err(PaygateError::BadFormatRequest { .. })));
        assert!(matches!(sub(-500), Err(PaygateError::ServiceUnavailable { .. })));
        assert!(matches!(sub(-54), Err(PaygateError::ApiResponse { kind: M, .. })));
        match sub(-7777) {
            Err(PaygateError::UnknownVendorResponse { reply, .. }) => {
                assert_eq!(reply.code.as_deref(), Some("-7777"));
                assert_eq!(reply.payload["sub_return_code"], -7777);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            classify(reply(json!({"return_code": 2}))),
            Err(PaygateError::UnknownVendorResponse { .. })
        ));
    }

    #[test]
    fn embed_data_carries_redirect_url() {
        let request = PaymentLinkRequest {
            return_url: "https://shop.example/r".to_string(),
            extra_data: Some(json!({"promotioninfo": ""})),
            ..Default::default()
        };
        let embed = embed_data(&request);
        assert_eq!(embed["redirecturl"], "https://shop.example/r");
        assert_eq!(embed["promotioninfo"], "");
    }
}
