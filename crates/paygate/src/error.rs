use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

use crate::outcome::OutcomeKind;
use crate::provider::{Operation, Provider};

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub field: String,
    pub message: String,
}

/// Why an operation cannot be performed for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedReason {
    /// The merchant has no credential bundle for the provider.
    MissingCredentials,
    /// The provider does not offer the operation at all.
    NotImplemented,
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsupportedReason::MissingCredentials => f.write_str("merchant has no credentials"),
            UnsupportedReason::NotImplemented => f.write_str("not implemented"),
        }
    }
}

/// A parsed vendor answer together with the call it belongs to.
///
/// The payload is kept exactly as received. Only the surrounding context
/// (code, order id) is annotated for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct VendorReply {
    pub provider: Provider,
    pub operation: Operation,
    pub status: u16,
    pub code: Option<String>,
    pub order_id: Option<String>,
    pub payload: Value,
}

impl VendorReply {
    pub fn new(provider: Provider, operation: Operation, status: u16, payload: Value) -> Self {
        Self {
            provider,
            operation,
            status,
            code: None,
            order_id: None,
            payload,
        }
    }

    pub fn with_code(mut self, code: impl ToString) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn with_order_id(mut self, order_id: Option<&str>) -> Self {
        self.order_id = order_id.map(str::to_string);
        self
    }

    pub fn code_str(&self) -> &str {
        self.code.as_deref().unwrap_or("none")
    }
}

/// Errors returned by provider operations and the webhook relay.
#[derive(Debug, Error)]
pub enum PaygateError {
    #[error("validation failed for {operation}: {} issue(s)", .issues.len())]
    Validation {
        operation: Operation,
        issues: Vec<Issue>,
    },

    #[error("{provider} does not support {operation}: {reason}")]
    Unsupported {
        provider: Provider,
        operation: Operation,
        reason: UnsupportedReason,
    },

    #[error(
        "{} rejected a {} request that passed local validation (code {})",
        .reply.provider, .reply.operation, .reply.code_str()
    )]
    BadFormatRequest {
        reply: Box<VendorReply>,
        possible_reasons: &'static [&'static str],
    },

    #[error(
        "{} answered {} with error code {}",
        .reply.provider, .reply.operation, .reply.code_str()
    )]
    ApiResponse {
        reply: Box<VendorReply>,
        kind: OutcomeKind,
        possible_reasons: &'static [&'static str],
    },

    #[error(
        "{} is unavailable during {} (code {})",
        .reply.provider, .reply.operation, .reply.code_str()
    )]
    ServiceUnavailable { reply: Box<VendorReply> },

    #[error(
        "unrecognized {} response during {}: {description}",
        .reply.provider, .reply.operation
    )]
    UnknownVendorResponse {
        reply: Box<VendorReply>,
        description: String,
    },

    #[error("merchant not found for token {token}")]
    MerchantNotFound { token: String },

    #[error("{provider} transport failure during {operation}: {message}")]
    Transport {
        provider: Provider,
        operation: Operation,
        message: String,
        timed_out: bool,
    },

    #[error("credential store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PaygateError {
    pub fn missing_credentials(provider: Provider, operation: Operation) -> Self {
        PaygateError::Unsupported {
            provider,
            operation,
            reason: UnsupportedReason::MissingCredentials,
        }
    }

    pub fn not_implemented(provider: Provider, operation: Operation) -> Self {
        PaygateError::Unsupported {
            provider,
            operation,
            reason: UnsupportedReason::NotImplemented,
        }
    }

    pub fn unknown(reply: VendorReply, description: impl Into<String>) -> Self {
        PaygateError::UnknownVendorResponse {
            reply: Box::new(reply),
            description: description.into(),
        }
    }

    pub fn transport(provider: Provider, operation: Operation, err: &reqwest::Error) -> Self {
        PaygateError::Transport {
            provider,
            operation,
            message: err.to_string(),
            timed_out: err.is_timeout(),
        }
    }

    /// The vendor reply attached to this error, if any.
    pub fn reply(&self) -> Option<&VendorReply> {
        match self {
            PaygateError::BadFormatRequest { reply, .. }
            | PaygateError::ApiResponse { reply, .. }
            | PaygateError::ServiceUnavailable { reply }
            | PaygateError::UnknownVendorResponse { reply, .. } => Some(reply),
            _ => None,
        }
    }

    /// The stable code/message pair reported to callers.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            PaygateError::Validation { .. } => ResponseCode::ValidationError,
            PaygateError::Unsupported { .. } => ResponseCode::UnsupportedError,
            PaygateError::BadFormatRequest { .. } => ResponseCode::BadFormatRequest,
            PaygateError::ApiResponse { .. } => ResponseCode::ApiResponseError,
            PaygateError::ServiceUnavailable { .. } | PaygateError::Transport { .. } => {
                ResponseCode::ServiceUnavailable
            }
            PaygateError::UnknownVendorResponse { .. } => ResponseCode::ServiceUnknownResponse,
            PaygateError::MerchantNotFound { .. } => ResponseCode::Unauthorized,
            PaygateError::Store(_) | PaygateError::Serde(_) => ResponseCode::InternalServerError,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            PaygateError::Validation { .. } => 400,
            PaygateError::Unsupported {
                reason: UnsupportedReason::MissingCredentials,
                ..
            } => 409,
            PaygateError::Unsupported { .. } => 501,
            PaygateError::ApiResponse { .. } => 400,
            PaygateError::MerchantNotFound { .. } => 401,
            PaygateError::ServiceUnavailable { .. } => 503,
            PaygateError::Transport {
                timed_out: true, ..
            } => 504,
            PaygateError::Transport { .. } => 502,
            PaygateError::BadFormatRequest { .. }
            | PaygateError::UnknownVendorResponse { .. }
            | PaygateError::Store(_)
            | PaygateError::Serde(_) => 500,
        }
    }

    /// Whether full diagnostics must stay in the logs rather than the response.
    pub fn is_internal(&self) -> bool {
        self.http_status() >= 500
    }

    /// The caller-safe detail attached to an error response.
    pub fn public_detail(&self) -> Option<Value> {
        match self {
            PaygateError::Validation { operation, issues } => Some(json!({
                "operation": operation,
                "issues": issues,
            })),
            PaygateError::Unsupported {
                provider,
                operation,
                reason,
            } => Some(json!({
                "service": provider,
                "operation": operation,
                "reason": reason,
            })),
            PaygateError::ApiResponse {
                reply,
                possible_reasons,
                ..
            } => {
                let mut detail = json!({
                    "service": reply.provider,
                    "code": reply.code,
                    "data": reply.payload,
                });
                if !possible_reasons.is_empty() {
                    detail["possibleReasons"] = json!(possible_reasons);
                }
                Some(detail)
            }
            PaygateError::BadFormatRequest { reply, .. }
            | PaygateError::ServiceUnavailable { reply }
            | PaygateError::UnknownVendorResponse { reply, .. } => Some(json!({
                "service": reply.provider,
                "operation": reply.operation,
            })),
            PaygateError::Transport {
                provider,
                operation,
                ..
            } => Some(json!({
                "service": provider,
                "operation": operation,
            })),
            _ => None,
        }
    }
}

/// Externally stable response codes shared by every endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    Unauthorized,
    BadRequest,
    UnsupportedError,
    ValidationError,
    ServiceNotFound,
    ApiResponseError,
    BadFormatRequest,
    ServiceUnknownResponse,
    ServiceUnavailable,
    InternalServerError,
}

impl ResponseCode {
    pub fn code(&self) -> u16 {
        match self {
            ResponseCode::Success => 0,
            ResponseCode::Unauthorized => 1,
            ResponseCode::BadRequest => 4,
            ResponseCode::UnsupportedError => 6,
            ResponseCode::ValidationError => 8,
            ResponseCode::ServiceNotFound => 9,
            ResponseCode::ApiResponseError => 10,
            ResponseCode::BadFormatRequest => 40,
            ResponseCode::ServiceUnknownResponse => 45,
            ResponseCode::ServiceUnavailable => 50,
            ResponseCode::InternalServerError => 100,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ResponseCode::Success => "Operation completed successfully",
            ResponseCode::Unauthorized => "Access denied! Please provide valid authentication",
            ResponseCode::BadRequest => "Invalid request! Please check your input data",
            ResponseCode::UnsupportedError => "This operation is not supported",
            ResponseCode::ValidationError => "Input validation failed! Please check your data",
            ResponseCode::ServiceNotFound => {
                "Service not found! Please verify the 'service' parameter and try again"
            }
            ResponseCode::ApiResponseError => "An error occurred while processing the request",
            ResponseCode::BadFormatRequest => {
                "The request contains a value that unintentionally bypassed validation due to an unrecognized or invalid schema format."
            }
            ResponseCode::ServiceUnknownResponse => {
                "The service returned an unexpected response from the API."
            }
            ResponseCode::ServiceUnavailable => {
                "Service is currently unavailable. Please try again later"
            }
            ResponseCode::InternalServerError => {
                "An unexpected error occurred! Please try again later."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply() -> VendorReply {
        VendorReply::new(
            Provider::Momo,
            Operation::CreatePaymentLink,
            400,
            json!({"resultCode": 99, "secret": "internal"}),
        )
        .with_code(99)
    }

    #[test]
    fn unsupported_status_depends_on_reason() {
        let missing = PaygateError::missing_credentials(Provider::Payos, Operation::Banks);
        let absent = PaygateError::not_implemented(Provider::Payos, Operation::Banks);
        assert_eq!(missing.http_status(), 409);
        assert_eq!(absent.http_status(), 501);
        assert_eq!(missing.response_code().code(), 6);
    }

    #[test]
    fn system_class_errors_hide_vendor_payload() {
        let err = PaygateError::ServiceUnavailable {
            reply: Box::new(reply()),
        };
        let detail = err.public_detail().unwrap();
        assert!(detail.get("data").is_none());
        assert_eq!(detail["service"], "momo");
        assert!(err.is_internal());

        let err = PaygateError::unknown(reply(), "new code");
        assert!(err.public_detail().unwrap().get("data").is_none());
        assert_eq!(err.response_code().code(), 45);
    }

    #[test]
    fn api_response_errors_expose_payload_and_hints() {
        let err = PaygateError::ApiResponse {
            reply: Box::new(reply()),
            kind: OutcomeKind::MerchantError,
            possible_reasons: &["Invalid API key and Client ID pair"],
        };
        let detail = err.public_detail().unwrap();
        assert_eq!(detail["data"]["resultCode"], 99);
        assert_eq!(detail["possibleReasons"][0], "Invalid API key and Client ID pair");
        assert!(!err.is_internal());
    }

    #[test]
    fn display_names_provider_and_code() {
        let err = PaygateError::BadFormatRequest {
            reply: Box::new(reply()),
            possible_reasons: &[],
        };
        assert_eq!(
            err.to_string(),
            "momo rejected a create_payment_link request that passed local validation (code 99)"
        );
    }
}
