//! Webhook dispatcher (§4.4): per-channel event filtering, rendering,
//! signing, retry, and idempotent delivery recording.

mod dispatch;
pub mod render;
pub mod sign;

pub use dispatch::{dispatch_event, Event};
