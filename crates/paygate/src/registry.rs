use std::sync::Arc;

use crate::adapter::{AdapterContext, ProviderAdapter};
use crate::provider::Provider;
use crate::providers::{MomoAdapter, PayosAdapter, VietqrAdapter, VnpayAdapter, ZalopayAdapter};

/// Every provider adapter, built once at startup and shared.
#[derive(Clone)]
pub struct Registry {
    momo: Arc<dyn ProviderAdapter>,
    payos: Arc<dyn ProviderAdapter>,
    zalopay: Arc<dyn ProviderAdapter>,
    vnpay: Arc<dyn ProviderAdapter>,
    vietqr: Arc<dyn ProviderAdapter>,
    context: AdapterContext,
}

impl Registry {
    pub fn new(ctx: AdapterContext) -> Self {
        Self {
            momo: Arc::new(MomoAdapter::new(ctx.clone())),
            payos: Arc::new(PayosAdapter::new(ctx.clone())),
            zalopay: Arc::new(ZalopayAdapter::new(ctx.clone())),
            vnpay: Arc::new(VnpayAdapter::new(ctx.clone())),
            vietqr: Arc::new(VietqrAdapter::new(ctx.clone())),
            context: ctx,
        }
    }

    pub fn adapter(&self, provider: Provider) -> Arc<dyn ProviderAdapter> {
        let adapter = match provider {
            Provider::Momo => &self.momo,
            Provider::Payos => &self.payos,
            Provider::Zalopay => &self.zalopay,
            Provider::Vnpay => &self.vnpay,
            Provider::Vietqr => &self.vietqr,
        };
        Arc::clone(adapter)
    }

    pub fn context(&self) -> &AdapterContext {
        &self.context
    }
}
