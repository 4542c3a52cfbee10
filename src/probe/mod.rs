//! Probe executors (§4.1): run one probe against a monitor's target and
//! classify the outcome. No persistence, no retries beyond what the
//! algorithm itself calls for.

mod http;
mod tcp;

pub use http::probe_http;
pub use tcp::probe_tcp;

use crate::models::{CheckOutcome, CheckStatus, Monitor, MonitorType};

/// Dispatch to the probe executor matching `monitor.monitor_type`.
pub async fn probe(client: &reqwest::Client, monitor: &Monitor) -> CheckOutcome {
    match monitor.monitor_type {
        MonitorType::Http => probe_http(client, monitor).await,
        MonitorType::Tcp => probe_tcp(monitor).await,
    }
}

pub(crate) fn unknown_outcome(error: String) -> CheckOutcome {
    CheckOutcome {
        status: CheckStatus::Unknown,
        latency_ms: None,
        http_status: None,
        error: Some(error),
        attempts: 0,
    }
}
