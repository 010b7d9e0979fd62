//! Unified classification of vendor result codes.
//!
//! Each provider module owns one [`CodeTable`]: a static list mapping its
//! result codes to an [`OutcomeKind`], plus a second list resolving
//! merchant- and system-class codes to the concrete error to raise. A code
//! missing from the tables always ends in `UnknownVendorResponse`.

use serde::Serialize;
use serde_json::Value;

use crate::error::{PaygateError, VendorReply};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Pending,
    UserError,
    MerchantError,
    SystemError,
}

/// A non-error classification result. The data is the vendor's, untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Outcome<T> {
    Success(T),
    Pending(T),
}

impl<T> Outcome<T> {
    pub fn data(&self) -> &T {
        match self {
            Outcome::Success(d) | Outcome::Pending(d) => d,
        }
    }

    pub fn into_data(self) -> T {
        match self {
            Outcome::Success(d) | Outcome::Pending(d) => d,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending(_))
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success(_) => OutcomeKind::Success,
            Outcome::Pending(_) => OutcomeKind::Pending,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(d) => Outcome::Success(f(d)),
            Outcome::Pending(d) => Outcome::Pending(f(d)),
        }
    }

    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Outcome<U>, E> {
        Ok(match self {
            Outcome::Success(d) => Outcome::Success(f(d)?),
            Outcome::Pending(d) => Outcome::Pending(f(d)?),
        })
    }
}

/// The concrete error a failing merchant/system code turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The vendor rejected something local validation let through.
    BadFormat(&'static [&'static str]),
    /// Ordinary business rejection, with likely root causes for diagnostics.
    Rejected(&'static [&'static str]),
    /// Vendor-side outage.
    Unavailable,
}

/// Static per-provider classification data.
#[derive(Debug)]
pub struct CodeTable<C: 'static> {
    pub kinds: &'static [(C, OutcomeKind)],
    pub resolutions: &'static [(C, Resolution)],
}

impl<C: Copy> CodeTable<C> {
    pub fn kind_of<Q: Copy>(&self, code: Q) -> Option<OutcomeKind>
    where
        C: PartialEq<Q>,
    {
        self.kinds.iter().find(|(c, _)| *c == code).map(|(_, k)| *k)
    }

    pub fn resolution_of<Q: Copy>(&self, code: Q) -> Option<Resolution>
    where
        C: PartialEq<Q>,
    {
        self.resolutions
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, r)| *r)
    }

    /// Classify a reply whose single result code drives both levels.
    pub fn classify<Q: Copy>(&self, code: Q, reply: VendorReply) -> Result<Outcome<Value>, PaygateError>
    where
        C: PartialEq<Q>,
    {
        conclude(self.kind_of(code), self.resolution_of(code), reply)
    }
}

/// Turn a first-level kind and second-level resolution into a result.
pub fn conclude(
    kind: Option<OutcomeKind>,
    resolution: Option<Resolution>,
    reply: VendorReply,
) -> Result<Outcome<Value>, PaygateError> {
    let Some(kind) = kind else {
        return Err(PaygateError::unknown(reply, "result code is not in the catalogue"));
    };

    match kind {
        OutcomeKind::Success => Ok(Outcome::Success(reply.payload)),
        OutcomeKind::Pending => Ok(Outcome::Pending(reply.payload)),
        OutcomeKind::UserError => Err(PaygateError::ApiResponse {
            reply: Box::new(reply),
            kind,
            possible_reasons: match resolution {
                Some(Resolution::Rejected(hints)) => hints,
                _ => &[],
            },
        }),
        OutcomeKind::MerchantError | OutcomeKind::SystemError => match resolution {
            Some(Resolution::BadFormat(hints)) => Err(PaygateError::BadFormatRequest {
                reply: Box::new(reply),
                possible_reasons: hints,
            }),
            Some(Resolution::Rejected(hints)) => Err(PaygateError::ApiResponse {
                reply: Box::new(reply),
                kind,
                possible_reasons: hints,
            }),
            Some(Resolution::Unavailable) => Err(PaygateError::ServiceUnavailable {
                reply: Box::new(reply),
            }),
            None => Err(PaygateError::unknown(
                reply,
                "error code has no known resolution",
            )),
        },
    }
}
