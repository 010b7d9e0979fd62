use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use paygate::{Issue, PaygateError, ResponseCode};
use serde::Serialize;
use serde_json::{json, Value};

/// Persistence failures of the merchant store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("stored credentials are corrupt: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("email already registered: {0}")]
    DuplicateEmail(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref err, _) = e {
            if err.extended_code == 2067 {
                // SQLITE_CONSTRAINT_UNIQUE
                return StoreError::DuplicateEmail("email already exists".to_string());
            }
        }
        StoreError::Database(e)
    }
}

impl From<StoreError> for PaygateError {
    fn from(e: StoreError) -> Self {
        PaygateError::Store(e.to_string())
    }
}

/// Everything a handler can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Paygate(#[from] PaygateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown service: {0}")]
    ServiceNotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid input: {} issue(s)", .0.len())]
    InvalidInput(Vec<Issue>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ApiError::InvalidInput(vec![Issue {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    pub fn response_code(&self) -> ResponseCode {
        match self {
            ApiError::Paygate(e) => e.response_code(),
            ApiError::Store(StoreError::DuplicateEmail(_)) => ResponseCode::ValidationError,
            ApiError::Store(_) | ApiError::Internal(_) => ResponseCode::InternalServerError,
            ApiError::ServiceNotFound(_) => ResponseCode::ServiceNotFound,
            ApiError::Unauthorized(_) => ResponseCode::Unauthorized,
            ApiError::BadRequest(_) => ResponseCode::BadRequest,
            ApiError::InvalidInput(_) => ResponseCode::ValidationError,
        }
    }

    fn detail(&self) -> Option<Value> {
        match self {
            ApiError::Paygate(e) => e.public_detail(),
            ApiError::Store(StoreError::DuplicateEmail(_)) => Some(json!({
                "issues": [{ "field": "email", "message": "Email already exists" }]
            })),
            ApiError::ServiceNotFound(service) => Some(json!({ "service": service })),
            ApiError::Unauthorized(reason) => Some(json!(reason)),
            ApiError::BadRequest(reason) => Some(json!(reason)),
            ApiError::InvalidInput(issues) => Some(json!({ "issues": issues })),
            ApiError::Store(_) | ApiError::Internal(_) => None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Paygate(e) => {
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Store(StoreError::DuplicateEmail(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceNotFound(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) | ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            match self {
                ApiError::Paygate(e) => tracing::error!(
                    code = e.response_code().code(),
                    reply = ?e.reply(),
                    "provider call failed: {}",
                    e
                ),
                other => tracing::error!("Internal error: {}", other),
            }
        }

        let code = self.response_code();
        HttpResponse::build(status).json(Envelope::<()> {
            code: code.code(),
            message: code.message(),
            data: None,
            error: self.detail(),
        })
    }
}

/// The `{ code, message, data?, error? }` body every JSON answer uses.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub code: u16,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: ResponseCode::Success.code(),
            message: ResponseCode::Success.message(),
            data: Some(data),
            error: None,
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope::success(data))
}
