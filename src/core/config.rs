use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the simulation server lives and how patient the client is with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the simulation server, e.g. `http://127.0.0.1:8000`.
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_layout_path")]
    pub layout_path: String,
    #[serde(default = "default_start_path")]
    pub start_path: String,
    #[serde(default = "default_stop_path")]
    pub stop_path: String,
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    /// Per-request timeout for layout/start/stop calls. `0` waits forever.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Time after a fault during which a new start is refused. `0` disables.
    #[serde(default = "default_fault_cooldown_ms")]
    pub fault_cooldown_ms: u64,
}

fn default_server() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_layout_path() -> String {
    "/api/city".to_string()
}

fn default_start_path() -> String {
    "/api/start".to_string()
}

fn default_stop_path() -> String {
    "/api/stop".to_string()
}

fn default_stream_path() -> String {
    "/ws".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_fault_cooldown_ms() -> u64 {
    1_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            layout_path: default_layout_path(),
            start_path: default_start_path(),
            stop_path: default_stop_path(),
            stream_path: default_stream_path(),
            request_timeout_ms: default_request_timeout_ms(),
            fault_cooldown_ms: default_fault_cooldown_ms(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Parses a JSON config document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("Invalid config: {}", e))
    }

    /// Overrides fields from `CITYVIEW_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        // CITYVIEW_SERVER=http://host:port
        if let Some(v) = var("CITYVIEW_SERVER") {
            let v = v.trim();
            if !v.is_empty() {
                self.server = v.to_string();
            }
        }

        // CITYVIEW_REQUEST_TIMEOUT_MS=10000
        if let Some(v) = var("CITYVIEW_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = v.trim().parse::<u64>() {
                self.request_timeout_ms = ms;
            }
        }

        // CITYVIEW_FAULT_COOLDOWN_MS=1000
        if let Some(v) = var("CITYVIEW_FAULT_COOLDOWN_MS") {
            if let Ok(ms) = v.trim().parse::<u64>() {
                self.fault_cooldown_ms = ms;
            }
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.server.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn layout_url(&self) -> String {
        self.endpoint(&self.layout_path)
    }

    pub fn start_url(&self) -> String {
        self.endpoint(&self.start_path)
    }

    pub fn stop_url(&self) -> String {
        self.endpoint(&self.stop_path)
    }

    /// WebSocket URL for the snapshot stream (`http` → `ws`, `https` → `wss`).
    pub fn stream_url(&self) -> String {
        let url = self.endpoint(&self.stream_path);
        if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if url.starts_with("ws://") || url.starts_with("wss://") {
            url
        } else {
            format!("ws://{url}")
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn fault_cooldown(&self) -> Duration {
        Duration::from_millis(self.fault_cooldown_ms)
    }
}
