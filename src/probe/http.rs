use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::Method;

use crate::error::ProbeError;
use crate::models::{CheckOutcome, CheckStatus, ExpectedStatus, Monitor};

const MAX_ERROR_EXCERPT_BYTES: usize = 64 * 1024;

/// Execute an HTTP probe (§4.1): up to two attempts, retrying once after a
/// short uniform backoff on transport/timeout failure.
pub async fn probe_http(client: &reqwest::Client, monitor: &Monitor) -> CheckOutcome {
    let method = match monitor.http_method.to_uppercase().as_str() {
        "GET" => Method::GET,
        "HEAD" => Method::HEAD,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "DELETE" => Method::DELETE,
        "PATCH" => Method::PATCH,
        other => {
            return super::unknown_outcome(
                ProbeError::InvalidConfig(format!("unsupported http_method '{other}'")).to_string(),
            );
        }
    };

    let mut attempt = 1;
    loop {
        let outcome = attempt_once(client, monitor, method.clone(), attempt).await;
        match &outcome.status {
            CheckStatus::Down if attempt == 1 && outcome.http_status.is_none() => {
                // Transport/timeout failure on the cold attempt — retry once.
                let backoff_ms = rand::thread_rng().gen_range(200..=500);
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
                continue;
            }
            _ => return outcome,
        }
    }
}

async fn attempt_once(
    client: &reqwest::Client,
    monitor: &Monitor,
    method: Method,
    attempt: i64,
) -> CheckOutcome {
    let is_head = method == Method::HEAD;
    let start = Instant::now();
    let mut req = client.request(method, &monitor.target);
    req = req.timeout(Duration::from_millis(monitor.timeout_ms as u64));

    if let Some(ref headers) = monitor.http_headers {
        for (k, v) in headers {
            req = req.header(k.as_str(), v.as_str());
        }
    }

    if let Some(ref body) = monitor.http_body {
        req = req.body(body.clone());
    }

    let result = req.send().await;

    match result {
        Ok(resp) => {
            let code = resp.status().as_u16();

            // HEAD carries no body; latency is to the response head.
            if is_head {
                let latency_ms = start.elapsed().as_millis() as i64;
                return if !ExpectedStatus::matches(&monitor.expected_status, code) {
                    let err = ProbeError::StatusMismatch {
                        expected: ExpectedStatus::describe(&monitor.expected_status),
                        got: code,
                    };
                    CheckOutcome {
                        status: CheckStatus::Down,
                        latency_ms: Some(latency_ms),
                        http_status: Some(code as i64),
                        error: Some(err.to_string()),
                        attempts: attempt,
                    }
                } else {
                    CheckOutcome {
                        status: CheckStatus::Up,
                        latency_ms: Some(latency_ms),
                        http_status: Some(code as i64),
                        error: None,
                        attempts: attempt,
                    }
                };
            }

            if !ExpectedStatus::matches(&monitor.expected_status, code) {
                // Drain so `latency_ms` reflects body-read-complete and `error`
                // carries a useful excerpt.
                let _ = read_excerpt(resp).await;
                let latency_ms = start.elapsed().as_millis() as i64;
                let err = ProbeError::StatusMismatch {
                    expected: ExpectedStatus::describe(&monitor.expected_status),
                    got: code,
                };
                return CheckOutcome {
                    status: CheckStatus::Down,
                    latency_ms: Some(latency_ms),
                    http_status: Some(code as i64),
                    error: Some(err.to_string()),
                    attempts: attempt,
                };
            }

            match resp.text().await {
                Ok(body) => {
                    let latency_ms = start.elapsed().as_millis() as i64;
                    if let Some(ref kw) = monitor.response_keyword {
                        if !body.contains(kw.as_str()) {
                            return CheckOutcome {
                                status: CheckStatus::Down,
                                latency_ms: Some(latency_ms),
                                http_status: Some(code as i64),
                                error: Some(ProbeError::KeywordMissing(kw.clone()).to_string()),
                                attempts: attempt,
                            };
                        }
                    }
                    if let Some(ref kw) = monitor.response_forbidden_keyword {
                        if body.contains(kw.as_str()) {
                            return CheckOutcome {
                                status: CheckStatus::Down,
                                latency_ms: Some(latency_ms),
                                http_status: Some(code as i64),
                                error: Some(ProbeError::KeywordForbidden(kw.clone()).to_string()),
                                attempts: attempt,
                            };
                        }
                    }
                    CheckOutcome {
                        status: CheckStatus::Up,
                        latency_ms: Some(latency_ms),
                        http_status: Some(code as i64),
                        error: None,
                        attempts: attempt,
                    }
                }
                Err(e) => {
                    let latency_ms = start.elapsed().as_millis() as i64;
                    CheckOutcome {
                        status: CheckStatus::Down,
                        latency_ms: Some(latency_ms),
                        http_status: Some(code as i64),
                        error: Some(ProbeError::Transport(format!("body read error: {e}")).to_string()),
                        attempts: attempt,
                    }
                }
            }
        }
        Err(e) => {
            let latency_ms = start.elapsed().as_millis() as i64;
            let probe_err = classify_transport_error(&e);
            let status = if matches!(probe_err, ProbeError::InvalidConfig(_)) {
                CheckStatus::Unknown
            } else {
                CheckStatus::Down
            };
            CheckOutcome {
                status,
                latency_ms: Some(latency_ms),
                http_status: None,
                error: Some(probe_err.to_string()),
                attempts: attempt,
            }
        }
    }
}

/// Classify a `reqwest::Error` from `req.send()` into the probe error taxonomy.
fn classify_transport_error(e: &reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout
    } else if e.is_connect() {
        let text = e.to_string();
        let lower = text.to_lowercase();
        if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl") {
            ProbeError::TlsError(text)
        } else {
            ProbeError::Transport(format!("connection refused: {e}"))
        }
    } else if e.is_builder() || e.is_request() {
        ProbeError::InvalidConfig(format!("invalid request: {e}"))
    } else {
        ProbeError::Transport(format!("request failed: {e}"))
    }
}

/// Drain at most `MAX_ERROR_EXCERPT_BYTES` of the body for an error excerpt,
/// ignoring read failures (the status mismatch is already the real error).
async fn read_excerpt(resp: reqwest::Response) -> String {
    match resp.text().await {
        Ok(body) => body.chars().take(MAX_ERROR_EXCERPT_BYTES).collect(),
        Err(_) => String::new(),
    }
}
