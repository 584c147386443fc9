use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: admission attempts. Labels: outcome.
pub const ADMISSIONS_TOTAL: &str = "roomlock_admissions_total";

/// Histogram: admission latency in seconds (validation + scan + commit).
pub const ADMIT_DURATION_SECONDS: &str = "roomlock_admit_duration_seconds";

/// Counter: protocol commands handled. Labels: command.
pub const COMMANDS_TOTAL: &str = "roomlock_commands_total";

// ── Store health ────────────────────────────────────────────────

/// Counter: commits rejected by optimistic validation.
pub const STORE_CONFLICTS_TOTAL: &str = "roomlock_store_conflicts_total";

/// Counter: stored records that failed to decode during listings.
pub const MALFORMED_RECORDS_TOTAL: &str = "roomlock_malformed_records_total";

/// Histogram: WAL append + fsync duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomlock_wal_flush_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "roomlock_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "roomlock_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "roomlock_connections_rejected_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
