//! Notification channel for upload owners.
//!
//! A single reconnecting WebSocket per [`NotificationClient`], with endpoint
//! fallback, a text heartbeat and JSON message delivery over an event
//! receiver.

pub mod client;
mod pumps;
pub(crate) mod reconnection;
pub mod types;

use tokio_tungstenite::tungstenite;

pub use client::NotificationClient;
pub use types::{ChannelState, NotifyConfig, NotifyEvent, ReconnectConfig};

/// Errors from the notification channel.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed")]
    Closed,

    #[error("no notification endpoints configured")]
    NoEndpoints,
}
