use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── Fetch lifecycle ─────────────────────────────────────────────

/// Counter: fetch generations started (including refetches).
pub const FETCHES_TOTAL: &str = "rescache_fetches_total";

/// Counter: completions discarded because a newer fetch had started.
pub const STALE_FETCHES_TOTAL: &str = "rescache_stale_fetches_total";

/// Histogram: time spent resolving function and remote sources, in seconds.
pub const FETCH_DURATION_SECONDS: &str = "rescache_fetch_duration_seconds";

/// Counter: remote retrievals that degraded to an empty list.
pub const SOURCE_FAILURES_TOTAL: &str = "rescache_source_failures_total";

// ── Cache contents ──────────────────────────────────────────────

/// Gauge: resources currently in the index.
pub const RESOURCES_INDEXED: &str = "rescache_resources_indexed";

/// Counter: resources added one at a time.
pub const RESOURCES_ADDED_TOTAL: &str = "rescache_resources_added_total";

/// Counter: resources removed one at a time.
pub const RESOURCES_REMOVED_TOTAL: &str = "rescache_resources_removed_total";

/// Counter: single adds rejected for an id that was already indexed.
pub const DUPLICATE_RESOURCES_TOTAL: &str = "rescache_duplicate_resources_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
