use std::collections::HashMap;
use std::time::Duration;

use crate::db::Db;
use crate::error::{DispatchError, StoreError};
use crate::models::{DeliveryStatus, EventType, NotificationChannel, NotificationDelivery};
use crate::store;

use super::render;
use super::sign::sign_payload;

/// One logical occurrence to fan out to channels (§4.4).
pub struct Event {
    pub event_type: EventType,
    pub event_key: String,
    pub timestamp: i64,
    /// Flattened template variables, e.g. `monitor.name`, `state.status`.
    pub vars: HashMap<String, String>,
}

const RETRY_BACKOFFS: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(4)];

/// Fan `event` out to every eligible channel, recording one delivery row
/// per channel (§4.4, §4.5 step 7, §5 ordering guarantee (ii)).
pub async fn dispatch_event(
    db: &Db,
    client: &reqwest::Client,
    channels: &[NotificationChannel],
    event: &Event,
) -> Result<(), StoreError> {
    for channel in channels {
        if !channel.is_active {
            continue;
        }
        if let Some(ref enabled) = channel.config.enabled_events {
            if !enabled.contains(&event.event_type) {
                continue;
            }
        }
        if channel.created_at > event.timestamp {
            continue;
        }
        let Some(channel_id) = channel.id else { continue };
        if store::delivery_exists(db, channel_id, &event.event_key)? {
            continue;
        }

        let outcome = deliver_with_retry(client, channel, event).await;
        let delivery = match outcome {
            Ok(http_status) => NotificationDelivery {
                channel_id,
                event_key: event.event_key.clone(),
                status: DeliveryStatus::Sent,
                http_status: Some(http_status),
                error: None,
                created_at: event.timestamp,
            },
            Err(e) => NotificationDelivery {
                channel_id,
                event_key: event.event_key.clone(),
                status: DeliveryStatus::Failed,
                http_status: match e {
                    DispatchError::NonRetryable4xx(code) => Some(code),
                    _ => None,
                },
                error: Some(e.to_string()),
                created_at: event.timestamp,
            },
        };

        if !store::record_delivery(db, &delivery)? {
            println!(
                "webhook: delivery for channel {channel_id} event {} already recorded by a racing writer",
                event.event_key
            );
        } else {
            match delivery.status {
                DeliveryStatus::Sent => println!(
                    "webhook: delivered channel={channel_id} event={}",
                    event.event_key
                ),
                DeliveryStatus::Failed => println!(
                    "webhook: failed channel={channel_id} event={} error={:?}",
                    event.event_key, delivery.error
                ),
            }
        }
    }
    Ok(())
}

async fn deliver_with_retry(
    client: &reqwest::Client,
    channel: &NotificationChannel,
    event: &Event,
) -> Result<u16, DispatchError> {
    let mut last_err = DispatchError::Timeout;
    for (attempt, backoff) in std::iter::once(None)
        .chain(RETRY_BACKOFFS.iter().map(Some))
        .enumerate()
    {
        if let Some(delay) = backoff {
            tokio::time::sleep(*delay).await;
        }
        match deliver_once(client, channel, event).await {
            Ok(code) => return Ok(code),
            Err(DispatchError::NonRetryable4xx(code)) => return Err(DispatchError::NonRetryable4xx(code)),
            Err(e) => {
                last_err = e;
                let _ = attempt;
            }
        }
    }
    Err(last_err)
}

async fn deliver_once(
    client: &reqwest::Client,
    channel: &NotificationChannel,
    event: &Event,
) -> Result<u16, DispatchError> {
    let config = &channel.config;
    let method: reqwest::Method = config
        .method()
        .parse()
        .unwrap_or(reqwest::Method::POST);

    let body_text = render_body(channel, event);

    let mut req = client
        .request(method, &config.url)
        .timeout(Duration::from_millis(config.timeout_ms()));

    if let Some(ref headers) = config.headers {
        for (k, v) in headers {
            req = req.header(k.as_str(), v.as_str());
        }
    }

    if let Some(ref signing) = config.signing {
        if signing.enabled {
            let secret = std::env::var(&signing.secret_ref)
                .map_err(|_| DispatchError::SignatureConfigMissing(signing.secret_ref.clone()))?;
            let signature = sign_payload(&secret, event.timestamp, &body_text);
            req = req
                .header("X-Timestamp", event.timestamp.to_string())
                .header("X-Signature", signature);
        }
    }

    match config.payload_type {
        crate::models::PayloadType::Json => {
            req = req
                .header("Content-Type", "application/json")
                .body(body_text);
        }
        crate::models::PayloadType::XWwwFormUrlencoded => {
            req = req
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(body_text);
        }
        crate::models::PayloadType::Param => {
            req = req.query(&[("payload", body_text)]);
        }
    }

    let resp = req.send().await.map_err(|e| {
        if e.is_timeout() {
            DispatchError::Timeout
        } else {
            DispatchError::RetryableTransport5xx(e.to_string())
        }
    })?;

    let code = resp.status().as_u16();
    if resp.status().is_success() {
        Ok(code)
    } else if (400..500).contains(&(code as u32)) {
        Err(DispatchError::NonRetryable4xx(code))
    } else {
        Err(DispatchError::RetryableTransport5xx(format!(
            "upstream returned {code}"
        )))
    }
}

fn render_body(channel: &NotificationChannel, event: &Event) -> String {
    let config = &channel.config;
    if let Some(ref template) = config.payload_template {
        return render::substitute(template, &event.vars);
    }
    match config.payload_type {
        crate::models::PayloadType::XWwwFormUrlencoded => render::form_urlencoded_body(&event.vars),
        _ => {
            let mut vars = event.vars.clone();
            if let Some(ref message_template) = config.message_template {
                vars.insert("message".to_string(), render::substitute(message_template, &event.vars));
            }
            render::default_json_payload(&vars).to_string()
        }
    }
}
