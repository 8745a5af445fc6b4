use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metric descriptions (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "aggregate_submissions_total",
            "Submissions aggregated into a snapshot."
        );
        describe_counter!(
            "aggregate_items_accepted_total",
            "Items accepted into category totals."
        );
        describe_counter!(
            "aggregate_items_discarded_total",
            "Items discarded, by reason."
        );
        describe_counter!(
            "airport_remote_lookups_total",
            "Remote airport lookups, by outcome."
        );
        describe_counter!("snapshot_store_errors_total", "Failed snapshot appends.");
        describe_gauge!(
            "airport_table_entries",
            "Airports in the local reference table."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and record the reference table size.
    pub fn init(airport_table_entries: usize) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        ensure_metrics_described();
        gauge!("airport_table_entries").set(airport_table_entries as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
