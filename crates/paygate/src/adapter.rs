//! The provider strategy seam.
//!
//! Each provider implements [`ProviderAdapter`]. Operations a provider does
//! not offer keep the default bodies, which fail with `Unsupported` before
//! touching the network.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::PaygateError;
use crate::outcome::Outcome;
use crate::provider::{Operation, Provider};
use crate::store::{CredentialBundle, CredentialStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Item {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub quantity: u32,
    /// Unit price.
    pub price: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Buyer {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Provider-neutral payment link request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaymentLinkRequest {
    pub order_id: String,
    pub amount: i64,
    pub description: String,
    #[serde(default)]
    pub currency: Option<String>,
    pub return_url: String,
    #[serde(default)]
    pub cancel_url: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub buyer: Option<Buyer>,
    #[serde(default)]
    pub extra_data: Option<Value>,
    #[serde(default)]
    pub bank_code: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransactionStatusRequest {
    /// The provider-side order reference returned by payment link creation.
    pub order_id: String,
    #[serde(default)]
    pub request_id: Option<String>,
    /// Unix seconds of the original payment.
    #[serde(default)]
    pub transaction_date: Option<i64>,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QrCodeRequest {
    pub account_no: String,
    pub account_name: String,
    pub acq_id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub add_info: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaymentLink {
    pub provider: Provider,
    /// The reference to use for status queries.
    pub order_id: String,
    pub checkout_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deeplink: Option<String>,
    pub raw: Value,
}

/// A provider-initiated notification as received.
#[derive(Debug, Clone)]
pub struct InboundCallback {
    pub provider: Provider,
    /// Opaque merchant token taken from the callback URL.
    pub token: String,
    pub body: Vec<u8>,
    pub query: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    TestFixture,
    BadSignature,
    Stale,
    Unverifiable,
    Malformed(String),
}

/// What the relay should do with a callback.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookVerdict {
    Forward(Value),
    Drop(DropReason),
}

/// The vendor's documented success answer to a callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledgement {
    pub status: u16,
    pub body: Option<Value>,
}

/// Dependencies every adapter is constructed with.
#[derive(Clone)]
pub struct AdapterContext {
    pub http: reqwest::Client,
    pub config: Arc<ProviderConfig>,
    pub store: Arc<dyn CredentialStore>,
}

impl AdapterContext {
    pub fn new(http: reqwest::Client, config: ProviderConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            http,
            config: Arc::new(config),
            store,
        }
    }

    /// Load the merchant's bundle for `provider`, failing with
    /// `Unsupported` when there is none.
    pub async fn credentials(
        &self,
        merchant_id: &str,
        provider: Provider,
        operation: Operation,
    ) -> Result<CredentialBundle, PaygateError> {
        self.store
            .credential(merchant_id, provider)
            .await?
            .ok_or_else(|| PaygateError::missing_credentials(provider, operation))
    }
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    async fn create_payment_link(
        &self,
        _merchant_id: &str,
        _request: &PaymentLinkRequest,
    ) -> Result<Outcome<PaymentLink>, PaygateError> {
        Err(PaygateError::not_implemented(self.provider(), Operation::CreatePaymentLink))
    }

    async fn transaction_status(
        &self,
        _merchant_id: &str,
        _request: &TransactionStatusRequest,
    ) -> Result<Outcome<Value>, PaygateError> {
        Err(PaygateError::not_implemented(self.provider(), Operation::TransactionStatus))
    }

    async fn banks(&self, _merchant_id: Option<&str>) -> Result<Outcome<Value>, PaygateError> {
        Err(PaygateError::not_implemented(self.provider(), Operation::Banks))
    }

    async fn qr_code(&self, _request: &QrCodeRequest) -> Result<Outcome<Value>, PaygateError> {
        Err(PaygateError::not_implemented(self.provider(), Operation::QrCode))
    }

    /// Tell the provider where to deliver callbacks for this merchant.
    async fn register_webhook(&self, _merchant_id: &str) -> Result<Outcome<Value>, PaygateError> {
        Err(PaygateError::not_implemented(self.provider(), Operation::RegisterWebhook))
    }

    fn acknowledgement(&self) -> Option<Acknowledgement> {
        None
    }

    /// Decide whether a callback is authentic, current, and worth forwarding.
    fn inspect_webhook(
        &self,
        _credentials: Option<&CredentialBundle>,
        _callback: &InboundCallback,
        _now: DateTime<Utc>,
    ) -> Result<WebhookVerdict, PaygateError> {
        Err(PaygateError::not_implemented(self.provider(), Operation::Webhook))
    }
}
