use paygate::{Outcome, PaygateError, Provider, RelayOutcome};
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Provider call counters, labelled by normalized outcome
pub static PROVIDER_CALLS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("paygate_provider_calls_total", "Outbound provider operations by outcome"),
        &["provider", "operation", "outcome"],
    )
    .unwrap()
});

pub static PROVIDER_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new("paygate_provider_latency_seconds", "Provider operation latency")
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["provider", "operation"],
    )
    .unwrap()
});

// Webhook counters
pub static WEBHOOKS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("paygate_webhooks_total", "Inbound provider callbacks by relay result"),
        &["provider", "result"],
    )
    .unwrap()
});

// Merchant counters
pub static MERCHANTS_REGISTERED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("paygate_merchants_registered", "Total number of merchants registered").unwrap()
});

/// Register all metrics with the registry
pub fn register_metrics() {
    REGISTRY
        .register(Box::new(PROVIDER_CALLS_TOTAL.clone()))
        .unwrap();
    REGISTRY.register(Box::new(PROVIDER_LATENCY.clone())).unwrap();
    REGISTRY.register(Box::new(WEBHOOKS_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(MERCHANTS_REGISTERED.clone()))
        .unwrap();
}

/// Label for a provider call result: the outcome kind, or the error class.
pub fn outcome_label<T>(result: &Result<Outcome<T>, PaygateError>) -> &'static str {
    match result {
        Ok(Outcome::Success(_)) => "success",
        Ok(Outcome::Pending(_)) => "pending",
        Err(PaygateError::Validation { .. }) => "validation_error",
        Err(PaygateError::Unsupported { .. }) => "unsupported",
        Err(PaygateError::BadFormatRequest { .. }) => "bad_format_request",
        Err(PaygateError::ApiResponse { .. }) => "api_response_error",
        Err(PaygateError::ServiceUnavailable { .. }) => "service_unavailable",
        Err(PaygateError::UnknownVendorResponse { .. }) => "unknown_response",
        Err(PaygateError::Transport { .. }) => "transport_error",
        Err(_) => "internal_error",
    }
}

pub fn record_webhook(provider: Provider, result: &Result<RelayOutcome, PaygateError>) {
    let label = match result {
        Ok(outcome) => outcome.label(),
        Err(PaygateError::MerchantNotFound { .. }) => "unknown_merchant",
        Err(_) => "error",
    };
    WEBHOOKS_TOTAL
        .with_label_values(&[provider.as_str(), label])
        .inc();
}
