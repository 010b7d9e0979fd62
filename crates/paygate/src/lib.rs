//! Provider normalization layer for Vietnamese payment gateways.
//!
//! Every gateway (MoMo, PayOS, ZaloPay, VNPay, VietQR) speaks its own
//! signing scheme and result-code vocabulary. This crate hides that behind
//! one [`ProviderAdapter`] per provider and a unified [`Outcome`] /
//! [`PaygateError`] result.
//!
//! # Parts
//!
//! - **Signature engine** ([`signature`]): HMAC-SHA256/512 over canonical strings
//! - **Adapters** ([`providers`]): validation, wire mapping, outbound calls
//! - **Classifiers** ([`outcome`]): static per-provider code tables
//! - **Webhook relay** ([`webhook`]): verify, filter and forward callbacks
//! - **Credential store** ([`store`]): the merchant lookup contract
//!
//! # Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//! use paygate::{AdapterContext, MemoryStore, PaymentLinkRequest, Provider, ProviderConfig, Registry};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), paygate::PaygateError> {
//! let store = Arc::new(MemoryStore::new());
//! let ctx = AdapterContext::new(reqwest::Client::new(), ProviderConfig::default(), store);
//! let registry = Registry::new(ctx);
//!
//! let request = PaymentLinkRequest {
//!     order_id: "42".into(),
//!     amount: 50_000,
//!     description: "Order 42".into(),
//!     return_url: "https://shop.example/return".into(),
//!     cancel_url: Some("https://shop.example/cancel".into()),
//!     ..Default::default()
//! };
//! let link = registry
//!     .adapter(Provider::Payos)
//!     .create_payment_link("merchant-id", &request)
//!     .await?;
//! println!("{}", link.data().checkout_url);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod outcome;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod signature;
pub mod store;
pub mod validation;
pub mod webhook;

pub use adapter::{
    Acknowledgement, AdapterContext, Buyer, DropReason, InboundCallback, Item, PaymentLink,
    PaymentLinkRequest, ProviderAdapter, QrCodeRequest, TransactionStatusRequest, WebhookVerdict,
};
pub use config::ProviderConfig;
pub use error::{Issue, PaygateError, ResponseCode, UnsupportedReason, VendorReply};
pub use outcome::{Outcome, OutcomeKind};
pub use provider::{Operation, Provider, UnknownProvider};
pub use registry::Registry;
pub use store::{
    CredentialBundle, CredentialStore, Credentials, Merchant, MemoryStore, MomoCredentials,
    PayosCredentials, VnpayCredentials, ZalopayCredentials,
};
pub use webhook::{RelayOutcome, WebhookRelay};
