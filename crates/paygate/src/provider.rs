use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A third-party payment processor this gateway can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Momo,
    Payos,
    Zalopay,
    Vnpay,
    Vietqr,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Momo,
        Provider::Payos,
        Provider::Zalopay,
        Provider::Vnpay,
        Provider::Vietqr,
    ];

    /// The identifier used in `?service=` query parameters and relay URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Momo => "momo",
            Provider::Payos => "payos",
            Provider::Zalopay => "zalopay",
            Provider::Vnpay => "vnpay",
            Provider::Vietqr => "vietqr",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

/// The provider-facing operations an adapter can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Sign,
    CreatePaymentLink,
    TransactionStatus,
    Banks,
    QrCode,
    Webhook,
    RegisterWebhook,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Sign => "sign",
            Operation::CreatePaymentLink => "create_payment_link",
            Operation::TransactionStatus => "transaction_status",
            Operation::Banks => "banks",
            Operation::QrCode => "qr_code",
            Operation::Webhook => "webhook",
            Operation::RegisterWebhook => "register_webhook",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
