use std::env;
use uuid::Uuid;

pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:9002";
pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8080/io";
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Autorouter WebSocket endpoint
    pub ws_url: String,
    /// Relay endpoint for the long-poll transport
    pub bridge_url: String,
    /// Relay session identifier; generated per run when unset
    pub session: Option<String>,
    /// Entries kept per log buffer
    pub log_capacity: usize,
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let ws_url = env::var("AUTOROUTE_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string());
        let ws_url = if ws_url.contains("://localhost") {
            ws_url.replacen("localhost", "127.0.0.1", 1)
        } else {
            ws_url
        };
        let bridge_url =
            env::var("AUTOROUTE_BRIDGE_URL").unwrap_or_else(|_| DEFAULT_BRIDGE_URL.to_string());
        let session = env::var("AUTOROUTE_SESSION")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let log_capacity = env::var("AUTOROUTE_LOG_CAPACITY")
            .ok()
            .and_then(|value| value.parse().ok())
            .filter(|capacity| *capacity > 0)
            .unwrap_or(DEFAULT_LOG_CAPACITY);

        Self {
            ws_url,
            bridge_url,
            session,
            log_capacity,
        }
    }

    pub fn bridge_session(&self) -> String {
        self.session
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            bridge_url: DEFAULT_BRIDGE_URL.to_string(),
            session: None,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}
