#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use paygate::{
    AdapterContext, Credentials, MemoryStore, Merchant, MomoCredentials, PayosCredentials, ProviderConfig,
    Registry, VnpayCredentials, ZalopayCredentials,
};

pub const MERCHANT_ID: &str = "merchant-1";

pub fn momo() -> MomoCredentials {
    MomoCredentials {
        partner_code: "MOMOBKUN20180529".to_string(),
        access_key: "klm05TvNBzhg7h7j".to_string(),
        secret_key: "at67qH6mk8w5Y1nAyMoYKMWACiEi2bsa".to_string(),
        public_key: None,
    }
}

pub fn payos() -> PayosCredentials {
    PayosCredentials {
        api_key: "payos-api-key".to_string(),
        client_id: "payos-client-id".to_string(),
        checksum_key: "payos-checksum-key".to_string(),
    }
}

pub fn zalopay() -> ZalopayCredentials {
    ZalopayCredentials {
        app_id: 2553,
        key1: "PcY4iZIKFCIdgZvA6ueMcMHHUbRLYjPL".to_string(),
        key2: "kLtgPl8HHhfvMuDHPwKfgfsY4Ydm9eIz".to_string(),
    }
}

pub fn vnpay() -> VnpayCredentials {
    VnpayCredentials {
        tmn_code: "DEMOV210".to_string(),
        hash_secret: "RAOEXHYVSDDIIENYWSLDIIZTANXUXZFJ".to_string(),
    }
}

/// A merchant holding momo, payos and vnpay credentials but no zalopay ones.
pub fn merchant(ipn_url: &str) -> Merchant {
    Merchant {
        id: MERCHANT_ID.to_string(),
        email: "shop@example.com".to_string(),
        ipn_url: ipn_url.to_string(),
        credentials: Credentials {
            momo: Some(momo()),
            payos: Some(payos()),
            zalopay: None,
            vnpay: Some(vnpay()),
        },
    }
}

/// Every provider endpoint pointed at one mock server.
pub fn config(base: &str) -> ProviderConfig {
    ProviderConfig {
        momo_url: base.to_string(),
        payos_url: base.to_string(),
        zalopay_url: base.to_string(),
        zalopay_banks_url: format!("{base}/getlistmerchantbanks"),
        vnpay_url: base.to_string(),
        vietqr_url: base.to_string(),
        callback_base: "https://gateway.example/api/v1".to_string(),
        request_timeout: Duration::from_secs(5),
        forward_timeout: Duration::from_secs(2),
        ..ProviderConfig::default()
    }
}

pub fn registry_with(base: &str, merchants: Vec<Merchant>) -> Registry {
    let store = Arc::new(MemoryStore::new());
    for m in merchants {
        store.insert(m);
    }
    let ctx = AdapterContext::new(reqwest::Client::new(), config(base), store);
    Registry::new(ctx)
}
