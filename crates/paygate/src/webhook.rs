//! Inbound callback relay.
//!
//! A callback is resolved to its merchant by the token in the callback URL,
//! handed to the provider adapter for authenticity and relevance checks, and
//! then either dropped or forwarded to the merchant's IPN URL. The vendor's
//! acknowledgement never depends on any of this: callers answer the vendor
//! first and run the relay detached.
//!
//! Merchant resolution comes before the signature check because the
//! verification secret is part of the merchant's credentials.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::adapter::{Acknowledgement, DropReason, InboundCallback, WebhookVerdict};
use crate::error::PaygateError;
use crate::provider::Provider;
use crate::registry::Registry;
use crate::store::Merchant;

/// How a relayed callback ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum RelayOutcome {
    /// The merchant endpoint answered, with any status.
    Forwarded { status: u16 },
    Dropped { reason: DropReason },
    /// The merchant endpoint could not be reached.
    Failed { error: String },
}

impl RelayOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RelayOutcome::Forwarded { .. } => "forwarded",
            RelayOutcome::Dropped { .. } => "dropped",
            RelayOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Clone)]
pub struct WebhookRelay {
    registry: Registry,
    forward_timeout: Duration,
}

impl WebhookRelay {
    pub fn new(registry: Registry) -> Self {
        let forward_timeout = registry.context().config.forward_timeout;
        Self {
            registry,
            forward_timeout,
        }
    }

    /// The vendor's documented success answer, if the provider sends callbacks.
    pub fn acknowledgement(&self, provider: Provider) -> Option<Acknowledgement> {
        self.registry.adapter(provider).acknowledgement()
    }

    pub async fn relay(&self, callback: InboundCallback) -> Result<RelayOutcome, PaygateError> {
        self.relay_at(callback, Utc::now()).await
    }

    /// Relay with an explicit receipt time, used for staleness checks.
    pub async fn relay_at(
        &self,
        callback: InboundCallback,
        received_at: DateTime<Utc>,
    ) -> Result<RelayOutcome, PaygateError> {
        let provider = callback.provider;
        let merchant = self
            .registry
            .context()
            .store
            .merchant_by_token(&callback.token)
            .await?
            .ok_or_else(|| PaygateError::MerchantNotFound {
                token: callback.token.clone(),
            })?;

        let credentials = merchant.credentials.bundle(provider);
        let verdict = self
            .registry
            .adapter(provider)
            .inspect_webhook(credentials.as_ref(), &callback, received_at)?;

        match verdict {
            WebhookVerdict::Drop(DropReason::TestFixture) => {
                tracing::debug!(provider = %provider, merchant = %merchant.id, "sandbox test callback ignored");
                Ok(RelayOutcome::Dropped {
                    reason: DropReason::TestFixture,
                })
            }
            WebhookVerdict::Drop(reason) => {
                tracing::warn!(
                    provider = %provider,
                    merchant = %merchant.id,
                    reason = ?reason,
                    "callback dropped"
                );
                Ok(RelayOutcome::Dropped { reason })
            }
            WebhookVerdict::Forward(payload) => Ok(self.forward(&merchant, provider, &payload).await),
        }
    }

    /// POST the payload to `<ipn_url>?service=<provider>`.
    async fn forward(&self, merchant: &Merchant, provider: Provider, payload: &Value) -> RelayOutcome {
        let result = self
            .registry
            .context()
            .http
            .post(&merchant.ipn_url)
            .query(&[("service", provider.as_str())])
            .timeout(self.forward_timeout)
            .json(payload)
            .send()
            .await;

        match result {
            Ok(resp) => {
                let status = resp.status().as_u16();
                tracing::debug!(
                    provider = %provider,
                    merchant = %merchant.id,
                    status,
                    "callback forwarded"
                );
                RelayOutcome::Forwarded { status }
            }
            Err(e) => {
                tracing::warn!(
                    provider = %provider,
                    merchant = %merchant.id,
                    url = %merchant.ipn_url,
                    error = %e,
                    "callback forwarding failed"
                );
                RelayOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Run the relay detached from the inbound request.
    ///
    /// `on_done` observes the result, e.g. to record metrics.
    pub fn spawn<F>(self: &Arc<Self>, callback: InboundCallback, on_done: F)
    where
        F: FnOnce(Provider, &Result<RelayOutcome, PaygateError>) + Send + 'static,
    {
        let relay = Arc::clone(self);
        tokio::spawn(async move {
            let provider = callback.provider;
            let result = relay.relay(callback).await;
            if let Err(e) = &result {
                tracing::error!(provider = %provider, error = %e, "callback relay failed");
            }
            on_done(provider, &result);
        });
    }
}
