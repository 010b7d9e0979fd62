//! Merchant and credential lookup contract.
//!
//! Adapters and the webhook relay only ever read through
//! [`CredentialStore`]. Persistence lives behind it: the server ships a
//! SQLite implementation and [`MemoryStore`] serves tests.

use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::PaygateError;
use crate::provider::Provider;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MomoCredentials {
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PayosCredentials {
    pub api_key: String,
    pub client_id: String,
    pub checksum_key: String,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ZalopayCredentials {
    #[serde(rename = "appid")]
    pub app_id: u64,
    pub key1: String,
    pub key2: String,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VnpayCredentials {
    pub tmn_code: String,
    pub hash_secret: String,
}

impl fmt::Debug for MomoCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MomoCredentials")
            .field("partner_code", &self.partner_code)
            .field("access_key", &"[REDACTED]")
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for PayosCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayosCredentials")
            .field("client_id", &self.client_id)
            .field("api_key", &"[REDACTED]")
            .field("checksum_key", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for ZalopayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZalopayCredentials")
            .field("app_id", &self.app_id)
            .field("key1", &"[REDACTED]")
            .field("key2", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for VnpayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VnpayCredentials")
            .field("tmn_code", &self.tmn_code)
            .field("hash_secret", &"[REDACTED]")
            .finish()
    }
}

/// At most one credential bundle per provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub momo: Option<MomoCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payos: Option<PayosCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zalopay: Option<ZalopayCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnpay: Option<VnpayCredentials>,
}

impl Credentials {
    pub fn bundle(&self, provider: Provider) -> Option<CredentialBundle> {
        match provider {
            Provider::Momo => self.momo.clone().map(CredentialBundle::Momo),
            Provider::Payos => self.payos.clone().map(CredentialBundle::Payos),
            Provider::Zalopay => self.zalopay.clone().map(CredentialBundle::Zalopay),
            Provider::Vnpay => self.vnpay.clone().map(CredentialBundle::Vnpay),
            Provider::Vietqr => None,
        }
    }

    /// Providers the merchant holds credentials for.
    pub fn providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.bundle(*p).is_some())
            .collect()
    }
}

/// One provider's key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialBundle {
    Momo(MomoCredentials),
    Payos(PayosCredentials),
    Zalopay(ZalopayCredentials),
    Vnpay(VnpayCredentials),
}

impl CredentialBundle {
    pub fn provider(&self) -> Provider {
        match self {
            CredentialBundle::Momo(_) => Provider::Momo,
            CredentialBundle::Payos(_) => Provider::Payos,
            CredentialBundle::Zalopay(_) => Provider::Zalopay,
            CredentialBundle::Vnpay(_) => Provider::Vnpay,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Merchant {
    pub id: String,
    pub email: String,
    pub ipn_url: String,
    #[serde(default, rename = "services")]
    pub credentials: Credentials,
}

/// Read side of the merchant store.
///
/// Implementations must tolerate concurrent readers and keep writes
/// consistent for in-flight reads.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve the opaque token carried in callback URLs and client headers.
    async fn merchant_by_token(&self, token: &str) -> Result<Option<Merchant>, PaygateError>;

    async fn credential(
        &self,
        merchant_id: &str,
        provider: Provider,
    ) -> Result<Option<CredentialBundle>, PaygateError> {
        Ok(self
            .merchant_by_token(merchant_id)
            .await?
            .and_then(|m| m.credentials.bundle(provider)))
    }
}

/// In-process store keyed by merchant id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    merchants: DashMap<String, Merchant>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, merchant: Merchant) {
        self.merchants.insert(merchant.id.clone(), merchant);
    }

    pub fn remove(&self, id: &str) -> Option<Merchant> {
        self.merchants.remove(id).map(|(_, m)| m)
    }

    pub fn len(&self) -> usize {
        self.merchants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merchants.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn merchant_by_token(&self, token: &str) -> Result<Option<Merchant>, PaygateError> {
        Ok(self.merchants.get(token).map(|m| m.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merchant() -> Merchant {
        Merchant {
            id: "m-1".to_string(),
            email: "shop@example.com".to_string(),
            ipn_url: "https://shop.example/ipn".to_string(),
            credentials: Credentials {
                vnpay: Some(VnpayCredentials {
                    tmn_code: "TMN01".to_string(),
                    hash_secret: "very-secret".to_string(),
                }),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn memory_store_resolves_credentials() {
        let store = MemoryStore::new();
        store.insert(merchant());

        let bundle = store.credential("m-1", Provider::Vnpay).await.unwrap();
        assert_eq!(bundle.map(|b| b.provider()), Some(Provider::Vnpay));
        assert!(store.credential("m-1", Provider::Momo).await.unwrap().is_none());
        assert!(store.credential("nope", Provider::Vnpay).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn removed_merchant_is_gone() {
        let store = MemoryStore::new();
        store.insert(merchant());
        assert!(store.remove("m-1").is_some());
        assert!(store.merchant_by_token("m-1").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn debug_redacts_secrets() {
        let text = format!("{:?}", merchant());
        assert!(text.contains("TMN01"));
        assert!(!text.contains("very-secret"));
    }

    #[test]
    fn credentials_use_wire_names() {
        let json = serde_json::json!({
            "id": "m-2",
            "email": "a@b.co",
            "ipnUrl": "https://a.b/ipn",
            "services": {
                "zalopay": { "appid": 2553, "key1": "k1", "key2": "k2" },
                "momo": { "partnerCode": "MOMO", "accessKey": "ak", "secretKey": "sk" }
            }
        });
        let m: Merchant = serde_json::from_value(json).unwrap();
        assert_eq!(m.credentials.zalopay.as_ref().unwrap().app_id, 2553);
        assert_eq!(m.credentials.providers(), vec![Provider::Momo, Provider::Zalopay]);
    }
}
