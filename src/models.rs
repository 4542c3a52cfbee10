//! Core data types.
//!
//! Dynamic JSON columns (headers, expected status, webhook config) are typed
//! structs at this layer; the store module is responsible for decoding the
//! persisted JSON text into these types and surfacing `StoreError::ParseError`
//! on malformed columns rather than silently defaulting.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub type MonitorId = i64;
pub type ChannelId = i64;
pub type IncidentId = i64;
pub type OutageId = i64;
pub type MaintenanceWindowId = i64;
pub type UnixSeconds = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorType {
    Http,
    Tcp,
}

/// The persisted status column shared by `MonitorState` (raw) and the public
/// composer's effective status. The core state machine only ever writes
/// `Up`/`Down`/`Unknown`; `Paused` is admin-set, `Maintenance` only ever
/// appears as a read-time overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Maintenance,
    Paused,
    Unknown,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
            MonitorStatus::Maintenance => "maintenance",
            MonitorStatus::Paused => "paused",
            MonitorStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(MonitorStatus::Up),
            "down" => Some(MonitorStatus::Down),
            "maintenance" => Some(MonitorStatus::Maintenance),
            "paused" => Some(MonitorStatus::Paused),
            "unknown" => Some(MonitorStatus::Unknown),
            _ => None,
        }
    }
}

/// The status recorded on a single `CheckResult` row. The scheduler tick only
/// ever writes `Up`/`Down`/`Unknown`; `Maintenance` exists for completeness
/// and for the daily rollup's maintenance-overlay reclassification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
    Unknown,
    Maintenance,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "up",
            CheckStatus::Down => "down",
            CheckStatus::Unknown => "unknown",
            CheckStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(CheckStatus::Up),
            "down" => Some(CheckStatus::Down),
            "unknown" => Some(CheckStatus::Unknown),
            "maintenance" => Some(CheckStatus::Maintenance),
            _ => None,
        }
    }
}

/// `expected_status`: a nullable set of integers, defaulting to "any 2xx".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectedStatus(pub HashSet<u16>);

impl ExpectedStatus {
    pub fn matches(opt: &Option<ExpectedStatus>, code: u16) -> bool {
        match opt {
            None => (200..300).contains(&code),
            Some(ExpectedStatus(codes)) => codes.contains(&code),
        }
    }

    pub fn describe(opt: &Option<ExpectedStatus>) -> String {
        match opt {
            None => "2xx".to_string(),
            Some(ExpectedStatus(codes)) => {
                let mut v: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
                v.sort();
                v.join(",")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: MonitorId,
    pub name: String,
    #[serde(rename = "type")]
    pub monitor_type: MonitorType,
    pub target: String,
    pub interval_sec: i64,
    pub timeout_ms: i64,
    pub http_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<ExpectedStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_forbidden_keyword: Option<String>,
    pub is_active: bool,
    pub created_at: UnixSeconds,
    pub updated_at: UnixSeconds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorState {
    pub monitor_id: MonitorId,
    pub status: MonitorStatus,
    pub last_checked_at: Option<UnixSeconds>,
    pub last_changed_at: Option<UnixSeconds>,
    pub last_latency_ms: Option<i64>,
    pub last_error: Option<String>,
    pub consecutive_failures: i64,
    pub consecutive_successes: i64,
}

impl MonitorState {
    /// The state of a monitor that has never been probed (cold start).
    pub fn unseen(monitor_id: MonitorId) -> Self {
        MonitorState {
            monitor_id,
            status: MonitorStatus::Unknown,
            last_checked_at: None,
            last_changed_at: None,
            last_latency_ms: None,
            last_error: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: Option<i64>,
    pub monitor_id: MonitorId,
    pub checked_at: UnixSeconds,
    pub status: CheckStatus,
    pub latency_ms: Option<i64>,
    pub http_status: Option<i64>,
    pub error: Option<String>,
    pub location: Option<String>,
    pub attempt: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outage {
    pub id: Option<OutageId>,
    pub monitor_id: MonitorId,
    pub started_at: UnixSeconds,
    pub ended_at: Option<UnixSeconds>,
    pub initial_error: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorDailyRollup {
    pub monitor_id: MonitorId,
    pub day_start_at: UnixSeconds,
    pub total_sec: i64,
    pub downtime_sec: i64,
    pub unknown_sec: i64,
    pub uptime_sec: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub id: Option<MaintenanceWindowId>,
    pub title: String,
    pub message: Option<String>,
    pub starts_at: UnixSeconds,
    pub ends_at: UnixSeconds,
    pub created_at: UnixSeconds,
    pub monitor_ids: Vec<MonitorId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Investigating,
    Identified,
    Monitoring,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Investigating => "investigating",
            IncidentStatus::Identified => "identified",
            IncidentStatus::Monitoring => "monitoring",
            IncidentStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "investigating" => Some(IncidentStatus::Investigating),
            "identified" => Some(IncidentStatus::Identified),
            "monitoring" => Some(IncidentStatus::Monitoring),
            "resolved" => Some(IncidentStatus::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentImpact {
    None,
    Minor,
    Major,
    Critical,
}

impl IncidentImpact {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentImpact::None => "none",
            IncidentImpact::Minor => "minor",
            IncidentImpact::Major => "major",
            IncidentImpact::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(IncidentImpact::None),
            "minor" => Some(IncidentImpact::Minor),
            "major" => Some(IncidentImpact::Major),
            "critical" => Some(IncidentImpact::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentUpdate {
    pub id: Option<i64>,
    pub incident_id: IncidentId,
    pub message: String,
    pub status: IncidentStatus,
    pub created_at: UnixSeconds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Option<IncidentId>,
    pub title: String,
    pub status: IncidentStatus,
    pub impact: IncidentImpact,
    pub message: String,
    pub started_at: UnixSeconds,
    pub resolved_at: Option<UnixSeconds>,
    pub monitor_ids: Vec<MonitorId>,
    pub updates: Vec<IncidentUpdate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    Json,
    Param,
    #[serde(rename = "x-www-form-urlencoded")]
    XWwwFormUrlencoded,
}

impl Default for PayloadType {
    fn default() -> Self {
        PayloadType::Json
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[serde(rename = "monitor.down")]
    MonitorDown,
    #[serde(rename = "monitor.up")]
    MonitorUp,
    #[serde(rename = "incident.created")]
    IncidentCreated,
    #[serde(rename = "incident.updated")]
    IncidentUpdated,
    #[serde(rename = "incident.resolved")]
    IncidentResolved,
    #[serde(rename = "maintenance.started")]
    MaintenanceStarted,
    #[serde(rename = "maintenance.ended")]
    MaintenanceEnded,
    #[serde(rename = "test.ping")]
    TestPing,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MonitorDown => "monitor.down",
            EventType::MonitorUp => "monitor.up",
            EventType::IncidentCreated => "incident.created",
            EventType::IncidentUpdated => "incident.updated",
            EventType::IncidentResolved => "incident.resolved",
            EventType::MaintenanceStarted => "maintenance.started",
            EventType::MaintenanceEnded => "maintenance.ended",
            EventType::TestPing => "test.ping",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub enabled: bool,
    pub secret_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChannelConfig {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub payload_type: PayloadType,
    #[serde(default)]
    pub message_template: Option<String>,
    #[serde(default)]
    pub payload_template: Option<String>,
    #[serde(default)]
    pub enabled_events: Option<HashSet<EventType>>,
    #[serde(default)]
    pub signing: Option<SigningConfig>,
}

impl WebhookChannelConfig {
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("POST")
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(10_000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: Option<ChannelId>,
    pub name: String,
    pub config: WebhookChannelConfig,
    pub is_active: bool,
    pub created_at: UnixSeconds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDelivery {
    pub channel_id: ChannelId,
    pub event_key: String,
    pub status: DeliveryStatus,
    pub http_status: Option<u16>,
    pub error: Option<String>,
    pub created_at: UnixSeconds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub site_title: String,
    pub site_description: Option<String>,
    pub site_timezone: String,
    pub retention_check_results_days: i64,
    pub state_failures_to_down_from_up: i64,
    pub state_successes_to_up_from_down: i64,
    pub uptime_rating_level: i64,
    /// Admin API default query ranges (e.g. default latency/outage window). Opaque to the
    /// core — never read by scheduler, state machine, dispatcher, or composer logic.
    #[serde(default)]
    pub admin_default_ranges: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            site_title: "Status".to_string(),
            site_description: None,
            site_timezone: "UTC".to_string(),
            retention_check_results_days: 90,
            state_failures_to_down_from_up: 2,
            state_successes_to_up_from_down: 2,
            uptime_rating_level: 3,
            admin_default_ranges: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub name: String,
    pub owner: Option<String>,
    pub expires_at: UnixSeconds,
}

/// Output of a single probe. Not persisted directly; the scheduler tick
/// turns this into a `CheckResult` row plus a state transition.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub latency_ms: Option<i64>,
    pub http_status: Option<i64>,
    pub error: Option<String>,
    pub attempts: i64,
}

/// What to do to the open-outage bracket for a monitor, derived by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutageAction {
    Open,
    Close,
    Update,
    None,
}

/// Result of applying the state machine to one probe.
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub next: MonitorState,
    pub changed: bool,
    pub outage_action: OutageAction,
}
