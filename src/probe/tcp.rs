use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use crate::error::ProbeError;
use crate::models::{CheckOutcome, CheckStatus, Monitor};

/// Execute a TCP probe (§4.1): a single connect attempt, no retry. Resolution
/// and connection are two distinct steps so a DNS failure is classified as
/// such rather than falling through to a generic connect error.
pub async fn probe_tcp(monitor: &Monitor) -> CheckOutcome {
    let start = Instant::now();
    let target = monitor.target.strip_prefix("tcp://").unwrap_or(&monitor.target);

    let result = tokio::time::timeout(
        Duration::from_millis(monitor.timeout_ms as u64),
        resolve_and_connect(target),
    )
    .await;

    let latency_ms = start.elapsed().as_millis() as i64;

    match result {
        Ok(Ok(())) => CheckOutcome {
            status: CheckStatus::Up,
            latency_ms: Some(latency_ms),
            http_status: None,
            error: None,
            attempts: 1,
        },
        Ok(Err(probe_err)) => CheckOutcome {
            status: CheckStatus::Down,
            latency_ms: Some(latency_ms),
            http_status: None,
            error: Some(probe_err.to_string()),
            attempts: 1,
        },
        Err(_) => CheckOutcome {
            status: CheckStatus::Down,
            latency_ms: Some(latency_ms),
            http_status: None,
            error: Some(ProbeError::Timeout.to_string()),
            attempts: 1,
        },
    }
}

async fn resolve_and_connect(target: &str) -> Result<(), ProbeError> {
    let mut addrs = tokio::net::lookup_host(target)
        .await
        .map_err(|e| ProbeError::Dns(e.to_string()))?;
    let addr = addrs
        .next()
        .ok_or_else(|| ProbeError::Dns(format!("no addresses found for '{target}'")))?;

    TcpStream::connect(addr).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::ConnectionRefused => ProbeError::Transport(format!("connection refused: {e}")),
        _ => ProbeError::Transport(format!("tcp connect failed: {e}")),
    })?;
    Ok(())
}
