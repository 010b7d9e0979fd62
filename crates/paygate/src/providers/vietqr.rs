//! VietQR public API: bank directory and transfer QR generation.
//!
//! Unauthenticated, so no credentials are involved. Replies are wrapped as
//! `{code, desc, data}`; only `"00"` with data counts as success.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::adapter::{AdapterContext, ProviderAdapter, QrCodeRequest};
use crate::error::{PaygateError, VendorReply};
use crate::outcome::Outcome;
use crate::provider::{Operation, Provider};
use crate::validation::Checker;

use super::{code_text, send};

const TEMPLATES: &[&str] = &["print", "qr_only", "compact", "compact2"];
const DEFAULT_TEMPLATE: &str = "compact2";

/// Unwrap the `data` of a `"00"` reply; anything else is unexpected.
pub fn classify(mut reply: VendorReply) -> Result<Outcome<Value>, PaygateError> {
    let code = code_text(&reply.payload, "code");
    let data = reply.payload.get_mut("data").map(Value::take).unwrap_or_default();
    if code.as_deref() == Some("00") && !data.is_null() {
        return Ok(Outcome::Success(data));
    }
    if let Some(slot) = reply.payload.get_mut("data") {
        *slot = data;
    }
    let description = reply
        .payload
        .get("desc")
        .and_then(Value::as_str)
        .unwrap_or("reply carries no data")
        .to_string();
    let reply = match code {
        Some(code) => reply.with_code(code),
        None => reply,
    };
    Err(PaygateError::unknown(reply, description))
}

/// Validate a QR request and build the wire body.
pub fn qr_body(request: &QrCodeRequest) -> Result<Value, PaygateError> {
    let mut c = Checker::new(Operation::QrCode);
    c.not_empty("account_no", &request.account_no);
    c.char_range("account_name", &request.account_name, 5, 50);
    let acq_id = request.acq_id.parse::<u32>().ok();
    c.check(
        request.acq_id.len() == 6 && request.acq_id.chars().all(|ch| ch.is_ascii_digit()) && acq_id.is_some(),
        "acq_id",
        "must be exactly 6 digits",
    );
    if let Some(amount) = request.amount {
        c.check(
            (0..=9_999_999_999_999).contains(&amount),
            "amount",
            "must be a non-negative number of at most 13 digits",
        );
    }
    if let Some(info) = &request.add_info {
        c.max_chars("add_info", info, 25);
    }
    let template = request.template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
    c.one_of("template", template, TEMPLATES);
    c.finish()?;

    let mut body = json!({
        "accountNo": request.account_no,
        "accountName": request.account_name,
        "acqId": acq_id,
        "format": "text",
        "template": template,
    });
    if let Some(amount) = request.amount {
        body["amount"] = json!(amount);
    }
    if let Some(info) = &request.add_info {
        body["addInfo"] = json!(info);
    }
    Ok(body)
}

pub struct VietqrAdapter {
    ctx: AdapterContext,
}

impl VietqrAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ProviderAdapter for VietqrAdapter {
    fn provider(&self) -> Provider {
        Provider::Vietqr
    }

    async fn banks(&self, _merchant_id: Option<&str>) -> Result<Outcome<Value>, PaygateError> {
        let op = Operation::Banks;
        let http = self
            .ctx
            .http
            .get(format!("{}/banks", self.ctx.config.vietqr_url))
            .timeout(self.ctx.config.request_timeout);
        let (status, payload) = send(Provider::Vietqr, op, http).await?;
        classify(VendorReply::new(Provider::Vietqr, op, status, payload))
    }

    async fn qr_code(&self, request: &QrCodeRequest) -> Result<Outcome<Value>, PaygateError> {
        let op = Operation::QrCode;
        let body = qr_body(request)?;
        let http = self
            .ctx
            .http
            .post(format!("{}/generate", self.ctx.config.vietqr_url))
            .timeout(self.ctx.config.request_timeout)
            .json(&body);
        let (status, payload) = send(Provider::Vietqr, op, http).await?;
        classify(VendorReply::new(Provider::Vietqr, op, status, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> QrCodeRequest {
        QrCodeRequest {
            account_no: "113366668888".to_string(),
            account_name: "QUY VAC XIN PHONG CHONG COVID".to_string(),
            acq_id: "970415".to_string(),
            amount: Some(79_000),
            add_info: Some("Ung Ho Quy Vac Xin".to_string()),
            template: None,
        }
    }

    #[test]
    fn body_uses_numeric_acquirer_and_default_template() {
        let body = qr_body(&request()).unwrap();
        assert_eq!(body["acqId"], 970415);
        assert_eq!(body["template"], "compact2");
        assert_eq!(body["format"], "text");
        assert_eq!(body["addInfo"], "Ung Ho Quy Vac Xin");
    }

    #[test]
    fn validation_collects_every_issue() {
        let bad = QrCodeRequest {
            account_name: "Bo".to_string(),
            acq_id: "97041".to_string(),
            amount: Some(10_000_000_000_000),
            add_info: Some("x".repeat(26)),
            template: Some("poster".to_string()),
            ..request()
        };
        match qr_body(&bad) {
            Err(PaygateError::Validation { issues, .. }) => {
                let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
                assert_eq!(fields, ["account_name", "acq_id", "amount", "add_info", "template"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn only_success_with_data_passes() {
        let reply = |payload| VendorReply::new(Provider::Vietqr, Operation::QrCode, 200, payload);
        let ok = classify(reply(json!({"code": "00", "desc": "ok", "data": {"qrCode": "000201"}}))).unwrap();
        assert_eq!(ok.data()["qrCode"], "000201");

        match classify(reply(json!({"code": "11", "desc": "Invalid acqId", "data": null}))) {
            Err(PaygateError::UnknownVendorResponse { reply, description }) => {
                assert_eq!(reply.code.as_deref(), Some("11"));
                assert_eq!(description, "Invalid acqId");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(classify(reply(json!({"code": "00", "desc": "empty"}))).is_err());
    }
}
