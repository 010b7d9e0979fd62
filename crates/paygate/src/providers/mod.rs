pub mod momo;
pub mod payos;
pub mod vietqr;
pub mod vnpay;
pub mod zalopay;

use std::time::Instant;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde_json::{Map, Value};

use crate::adapter::{DropReason, InboundCallback};
use crate::error::{PaygateError, VendorReply};
use crate::outcome::Outcome;
use crate::provider::{Operation, Provider};

pub use momo::MomoAdapter;
pub use payos::PayosAdapter;
pub use vietqr::VietqrAdapter;
pub use vnpay::VnpayAdapter;
pub use zalopay::ZalopayAdapter;

/// Vietnamese providers timestamp in GMT+7 regardless of server locale.
const VIETNAM_OFFSET_HOURS: i64 = 7;

pub(crate) fn vietnam_time(t: DateTime<Utc>) -> NaiveDateTime {
    t.naive_utc() + TimeDelta::hours(VIETNAM_OFFSET_HOURS)
}

pub(crate) fn from_vietnam_time(local: NaiveDateTime) -> DateTime<Utc> {
    (local - TimeDelta::hours(VIETNAM_OFFSET_HOURS)).and_utc()
}

/// Send a prepared request and parse the JSON answer.
///
/// Connection failures and non-2xx answers without a JSON body are
/// transport failures. A 2xx answer that is not JSON is an unknown vendor
/// response.
pub(crate) async fn send(
    provider: Provider,
    operation: Operation,
    request: reqwest::RequestBuilder,
) -> Result<(u16, Value), PaygateError> {
    let started = Instant::now();
    let response = request
        .send()
        .await
        .map_err(|e| PaygateError::transport(provider, operation, &e))?;
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| PaygateError::transport(provider, operation, &e))?;

    tracing::debug!(
        provider = %provider,
        operation = %operation,
        status = status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "provider call finished"
    );

    match serde_json::from_slice::<Value>(&body) {
        Ok(value) => Ok((status.as_u16(), value)),
        Err(_) if !status.is_success() => Err(PaygateError::Transport {
            provider,
            operation,
            message: format!("HTTP {} without a parseable body", status.as_u16()),
            timed_out: false,
        }),
        Err(e) => Err(PaygateError::unknown(
            VendorReply::new(
                provider,
                operation,
                status.as_u16(),
                Value::String(String::from_utf8_lossy(&body).into_owned()),
            ),
            format!("body is not JSON: {e}"),
        )),
    }
}

/// Classify a plain listing endpoint that has no result code of its own.
pub(crate) fn listing(
    provider: Provider,
    operation: Operation,
    status: u16,
    payload: Value,
) -> Result<Outcome<Value>, PaygateError> {
    let reply = VendorReply::new(provider, operation, status, payload);
    if (200..300).contains(&status) && (reply.payload.is_array() || reply.payload.is_object()) {
        Ok(Outcome::Success(reply.payload))
    } else {
        Err(PaygateError::unknown(reply, "listing endpoint returned an unexpected shape"))
    }
}

/// A result code as text, whether the vendor sent it as number or string.
pub(crate) fn code_text(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Parse a JSON object callback body.
pub(crate) fn json_object(callback: &InboundCallback) -> Result<Map<String, Value>, DropReason> {
    match serde_json::from_slice::<Value>(&callback.body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DropReason::Malformed("body is not a JSON object".to_string())),
        Err(e) => Err(DropReason::Malformed(format!("body is not JSON: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn vietnam_time_is_utc_plus_seven() {
        let t = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(20, 30, 0)
            .unwrap()
            .and_utc();
        let local = vietnam_time(t);
        assert_eq!(local.format("%Y%m%d%H%M%S").to_string(), "20240201033000");
        assert_eq!(from_vietnam_time(local), t);
    }

    #[test]
    fn code_text_accepts_numbers_and_strings() {
        let v = json!({"a": 0, "b": "00", "c": null});
        assert_eq!(code_text(&v, "a").as_deref(), Some("0"));
        assert_eq!(code_text(&v, "b").as_deref(), Some("00"));
        assert_eq!(code_text(&v, "c"), None);
    }

    #[test]
    fn listing_requires_success_status() {
        let ok = listing(Provider::Momo, Operation::Banks, 200, json!({"970415": {}}));
        assert!(ok.is_ok());
        let err = listing(Provider::Momo, Operation::Banks, 404, json!({"error": "x"}));
        assert!(matches!(err, Err(PaygateError::UnknownVendorResponse { .. })));
    }
}
