//! Metrics collection and exposition.
//!
//! # Metrics
//! - `live_config_mutations_total` (counter): mutations by op, outcome
//! - `live_config_conflicts_total` (counter): version conflicts by op
//! - `live_config_rollbacks_total` (counter): rolled-back mutations by op, stage
//! - `live_config_queries_total` (counter): queries by outcome
//! - `live_config_version` (gauge): current document version
//! - `live_config_http_requests_total` (counter): HTTP requests by method, status
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so the library never requires an exporter
//! - The Prometheus exporter is installed by the binary only

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::Error;
use crate::manager::Operation;

/// Install the Prometheus exporter with an HTTP scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Outcome label for a finished mutation.
pub fn outcome_label(result: &Result<i64, Error>) -> &'static str {
    match result {
        Ok(_) => "committed",
        Err(Error::Conflict(_)) => "conflict",
        Err(Error::Validation(_)) => "invalid",
        Err(Error::HandlerRejected { .. }) => "handler_rejected",
        Err(Error::PersistenceFailed(_)) => "persist_failed",
        Err(_) => "rejected",
    }
}

pub fn record_mutation(op: Operation, outcome: &'static str) {
    metrics::counter!("live_config_mutations_total", "op" => op.as_str(), "outcome" => outcome)
        .increment(1);
}

pub fn record_conflict(op: Operation) {
    metrics::counter!("live_config_conflicts_total", "op" => op.as_str()).increment(1);
}

/// `stage` is `handler` or `persist`.
pub fn record_rollback(op: Operation, stage: &'static str) {
    metrics::counter!("live_config_rollbacks_total", "op" => op.as_str(), "stage" => stage)
        .increment(1);
}

pub fn record_query(ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!("live_config_queries_total", "outcome" => outcome).increment(1);
}

pub fn record_version(version: i64) {
    metrics::gauge!("live_config_version").set(version as f64);
}

pub fn record_http_request(method: &str, status: u16) {
    metrics::counter!(
        "live_config_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome_label(&Ok(2)), "committed");
        assert_eq!(
            outcome_label(&Err(Error::Validation(ValidationError::External("down".into())))),
            "invalid"
        );
        assert_eq!(outcome_label(&Err(Error::Disjoint)), "rejected");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_mutation(Operation::Insert, "committed");
        record_conflict(Operation::Replace);
        record_rollback(Operation::Remove, "persist");
        record_query(true);
        record_version(7);
        record_http_request("GET", 200);
    }
}
