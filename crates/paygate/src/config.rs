use std::time::Duration;

use crate::provider::Provider;

pub const DEFAULT_MOMO_URL: &str = "https://test-payment.momo.vn/v2/gateway/api";
pub const DEFAULT_PAYOS_URL: &str = "https://api-merchant.payos.vn";
pub const DEFAULT_ZALOPAY_URL: &str = "https://sb-openapi.zalopay.vn/v2";
pub const DEFAULT_ZALOPAY_BANKS_URL: &str = "https://sbgateway.zalopay.vn/api/getlistmerchantbanks";
pub const DEFAULT_VNPAY_URL: &str = "https://sandbox.vnpayment.vn";
pub const DEFAULT_VNPAY_VERSION: &str = "2.1.0";
pub const DEFAULT_VIETQR_URL: &str = "https://api.vietqr.io/v2";

/// Endpoints and timing policy shared by every adapter.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub momo_url: String,
    pub payos_url: String,
    pub zalopay_url: String,
    pub zalopay_banks_url: String,
    pub vnpay_url: String,
    pub vnpay_version: String,
    pub vietqr_url: String,
    /// Public base URL of this service's API, used to build callback URLs.
    pub callback_base: String,
    /// Timeout for every outbound provider call.
    pub request_timeout: Duration,
    /// Timeout for relaying a callback to the merchant.
    pub forward_timeout: Duration,
    /// PayOS callbacks whose transaction time is older than this are dropped.
    pub payos_stale_after: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            momo_url: DEFAULT_MOMO_URL.to_string(),
            payos_url: DEFAULT_PAYOS_URL.to_string(),
            zalopay_url: DEFAULT_ZALOPAY_URL.to_string(),
            zalopay_banks_url: DEFAULT_ZALOPAY_BANKS_URL.to_string(),
            vnpay_url: DEFAULT_VNPAY_URL.to_string(),
            vnpay_version: DEFAULT_VNPAY_VERSION.to_string(),
            vietqr_url: DEFAULT_VIETQR_URL.to_string(),
            callback_base: "http://localhost:4080/api/v1".to_string(),
            request_timeout: Duration::from_secs(30),
            forward_timeout: Duration::from_secs(5),
            payos_stale_after: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl ProviderConfig {
    /// Callback URL a provider is told to notify for a merchant.
    pub fn ipn_url(&self, provider: Provider, merchant_id: &str) -> String {
        format!(
            "{}/payment_link_callback?service={}&token={}",
            self.callback_base.trim_end_matches('/'),
            provider,
            urlencoding::encode(merchant_id)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipn_url_embeds_service_and_token() {
        let config = ProviderConfig {
            callback_base: "https://pay.example/api/v1/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.ipn_url(Provider::Payos, "a b"),
            "https://pay.example/api/v1/payment_link_callback?service=payos&token=a%20b"
        );
    }
}
