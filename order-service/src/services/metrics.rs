use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls are no-ops so tests can build
/// several applications in one process.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
        }
    }
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Count a placed order by payment method.
pub fn record_order_placed(payment_method: &str, currency: &str, amount_minor: i64) {
    metrics::counter!("orders_placed_total", "method" => payment_method.to_string())
        .increment(1);
    metrics::counter!("order_amount_minor_total", "currency" => currency.to_string())
        .increment(amount_minor.max(0) as u64);
}

/// Count a verified gateway event and what applying it did.
pub fn record_gateway_event(kind: &str, outcome: &str) {
    metrics::counter!(
        "gateway_events_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_out_of_band_transition(from: &str, to: &str) {
    metrics::counter!(
        "order_status_out_of_band_total",
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

/// Count paid events that found their order outside the payment states.
pub fn record_unconfirmed_payment(status: &str) {
    metrics::counter!("payments_unconfirmed_total", "status" => status.to_string()).increment(1);
}
