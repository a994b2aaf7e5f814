use std::net::SocketAddr;
use std::time::Duration;

use dashmap::DashMap;
use metrics::{Gauge, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tracing::debug;

// ── Request-driven metrics ──────────────────────────────────────

/// Histogram: time spent in document store calls, in seconds.
/// Labels: operation, ambulance_id, ambulance_name.
pub const DB_TIME_SPENT_SECONDS: &str = "ambulance_wl_time_spent_in_db_seconds";

/// Counter: pipeline runs. Labels: operation, status.
pub const REQUESTS_TOTAL: &str = "ambulance_wl_requests_total";

// ── Business / resource metrics ─────────────────────────────────

/// Gauge: waiting-list length per ambulance, set on every persisted update.
/// Labels: ambulance_id.
pub const WAITING_PATIENTS: &str = "ambulance_wl_waiting_patients";

/// Gauge: ambulance documents held by the store.
pub const AMBULANCES_ACTIVE: &str = "ambulance_wl_ambulances_active";

/// Histogram: log-store fsync duration in seconds.
pub const LOG_FLUSH_DURATION_SECONDS: &str = "ambulance_wl_log_flush_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Register descriptions for the store-latency instruments.
pub fn describe_db_metrics() {
    metrics::describe_histogram!(
        DB_TIME_SPENT_SECONDS,
        Unit::Seconds,
        "The time spent in the database requests"
    );
    metrics::describe_counter!(REQUESTS_TOTAL, "Ambulance update pipeline runs");
    metrics::describe_gauge!(
        WAITING_PATIENTS,
        Unit::Count,
        "The length of the waiting list for the ambulance"
    );
}

/// Record one store call.
pub fn record_db_time(operation: &'static str, ambulance_id: &str, ambulance_name: &str, elapsed: Duration) {
    metrics::histogram!(
        DB_TIME_SPENT_SECONDS,
        "operation" => operation,
        "ambulance_id" => ambulance_id.to_owned(),
        "ambulance_name" => ambulance_name.to_owned()
    )
    .record(elapsed.as_secs_f64());
}

struct GaugeSlot {
    gauge: Gauge,
    waiting: i64,
}

/// Last known waiting-list length per ambulance.
///
/// Request handlers record the length after every persisted update and the
/// exported gauge is set in the same call, while the slot is locked. The
/// store is never queried to answer a scrape.
#[derive(Default)]
pub struct WaitingListGauges {
    snapshot: DashMap<String, GaugeSlot>,
}

impl WaitingListGauges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest length and set the gauge, registering it the first
    /// time the id is seen.
    pub fn record(&self, ambulance_id: &str, waiting: usize) {
        let waiting = i64::try_from(waiting).unwrap_or(i64::MAX);
        let mut slot = match self.snapshot.get_mut(ambulance_id) {
            Some(slot) => slot,
            None => self
                .snapshot
                .entry(ambulance_id.to_string())
                .or_insert_with(|| {
                    debug!("registering waiting list gauge for ambulance {ambulance_id}");
                    GaugeSlot {
                        gauge: metrics::gauge!(WAITING_PATIENTS, "ambulance_id" => ambulance_id.to_owned()),
                        waiting: 0,
                    }
                }),
        };
        slot.waiting = waiting;
        slot.gauge.set(waiting as f64);
    }

    pub fn waiting(&self, ambulance_id: &str) -> Option<i64> {
        self.snapshot.get(ambulance_id).map(|s| s.waiting)
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Drop the snapshot for a deleted ambulance.
    pub fn forget(&self, ambulance_id: &str) {
        if let Some((_, slot)) = self.snapshot.remove(ambulance_id) {
            slot.gauge.set(0.0);
        }
    }

    pub fn clear(&self) {
        self.snapshot.clear();
    }
}
