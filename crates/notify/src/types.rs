//! Public types for the notification channel.

use std::time::Duration;

use chunkflow_protocol::constants::{
    ENDPOINT_FALLBACK_DELAY, HEARTBEAT_INTERVAL, MAX_RECONNECT_ATTEMPTS, NOTIFY_OWNER_PARAM,
    NOTIFY_PATH, RECONNECT_INTERVAL,
};

/// Close code of an orderly shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Connection state of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Dialing an endpoint, or waiting to redial.
    Connecting,
    Open,
    /// Local close requested, not yet finished.
    Closing,
    Closed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

/// Events emitted by a [`NotificationClient`](crate::NotificationClient).
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyEvent {
    /// The socket to `endpoint` is open.
    Opened { endpoint: String },
    /// A JSON message pushed by the server.
    Message(serde_json::Value),
    /// The socket closed with `code`.
    Closed { code: u16 },
    /// A reconnect is scheduled.
    Reconnecting { attempt: u32 },
    Error(String),
}

/// Reconnection behavior after an unexpected close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Fixed delay before each reconnect.
    pub interval: Duration,
    /// Reconnects allowed between two successful opens.
    pub max_attempts: u32,
    /// Delay before trying the next endpoint after a failed dial.
    pub endpoint_fallback_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval: RECONNECT_INTERVAL,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            endpoint_fallback_delay: ENDPOINT_FALLBACK_DELAY,
        }
    }
}

/// Configuration of one notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    /// WebSocket endpoints, tried in order on every (re)connect.
    pub endpoints: Vec<String>,
    pub owner_id: i64,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl NotifyConfig {
    pub fn new(endpoints: Vec<String>, owner_id: i64) -> Self {
        Self {
            endpoints,
            owner_id,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Endpoint URLs with the owner query parameter attached.
    pub fn urls(&self) -> Vec<String> {
        self.endpoints
            .iter()
            .map(|endpoint| {
                let sep = if endpoint.contains('?') { '&' } else { '?' };
                format!("{endpoint}{sep}{NOTIFY_OWNER_PARAM}={}", self.owner_id)
            })
            .collect()
    }

    /// Derives the notification endpoint from an HTTP service URL.
    ///
    /// `http://host:8080/api` becomes `ws://host:8080/api/ws/message`;
    /// `https` maps to `wss`. Returns `None` for other schemes.
    pub fn endpoint_from_base_url(base_url: &str) -> Option<String> {
        let (scheme, rest) = base_url.split_once("://")?;
        let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            _ => return None,
        };
        let authority = rest.split('/').next().filter(|a| !a.is_empty())?;
        Some(format!("{ws_scheme}://{authority}{NOTIFY_PATH}"))
    }
}
