use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub max_connections: usize,
    /// Header sent with every request so the tunnelling service in front of
    /// the backend skips its interstitial page. An empty name disables it.
    pub tunnel_header: (String, String),
    pub refresh_path: String,
}

fn default_tunnel_header() -> (String, String) {
    ("ngrok-skip-browser-warning".to_string(), "true".to_string())
}

fn default_refresh_path() -> String {
    "/auth/refresh".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub success_ttl_ms: u64,
    pub error_ttl_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub threshold: f64,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub http: HttpConfig,
    pub notifications: NotificationConfig,
    pub search: SearchConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 10_000,
            max_connections: 8,
            tunnel_header: default_tunnel_header(),
            refresh_path: default_refresh_path(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            success_ttl_ms: 3_000,
            error_ttl_ms: 5_000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: realm_core::search::DEFAULT_THRESHOLD,
            keys: vec!["name".to_string(), "description".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: ClientConfig =
            serde_json::from_str(r#"{"http": {"base_url": "https://realm.example"}}"#).unwrap();
        assert_eq!(cfg.http.base_url, "https://realm.example");
        assert_eq!(cfg.http.refresh_path, "/auth/refresh");
        assert_eq!(cfg.http.tunnel_header.0, "ngrok-skip-browser-warning");
        assert_eq!(cfg.notifications.success_ttl_ms, 3_000);
        assert_eq!(cfg.search.keys, vec!["name", "description"]);
    }
}
