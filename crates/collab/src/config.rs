//! Configuration for the collaboration client
//!
//! Reads config from ~/.config/sitecraft/config.toml. Every field has a
//! default, so a missing or unreadable file is not an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::CollabError;

/// Collaboration client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollabConfig {
    /// Base API URL the WebSocket endpoint is derived from.
    pub api_base_url: String,
    /// Delay before the first reconnect attempt, in milliseconds.
    /// Subsequent attempts double this.
    pub reconnect_base_delay_ms: u64,
    /// Automatic reconnect attempts before the client stays offline.
    pub max_reconnect_attempts: u32,
    /// Presence heartbeat interval, in seconds.
    pub heartbeat_interval_secs: u64,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            reconnect_base_delay_ms: 1000,
            max_reconnect_attempts: 5,
            heartbeat_interval_secs: 5,
        }
    }
}

impl CollabConfig {
    /// Load configuration from the default path, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from_path(&Self::default_config_path()).unwrap_or_default()
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sitecraft")
            .join("config.toml")
    }

    /// Load from a specific path. Returns `None` when the file is
    /// missing or does not parse (a parse failure is logged).
    pub fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
                None
            }
        }
    }

    /// Derive the WebSocket endpoint from the configured base URL.
    pub fn websocket_endpoint(&self) -> Result<Url, CollabError> {
        websocket_endpoint(&self.api_base_url)
    }

    pub const fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Swap http(s) for ws(s) and append `/ws` to the path.
pub fn websocket_endpoint(base: &str) -> Result<Url, CollabError> {
    let mut url = Url::parse(base)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(CollabError::UnsupportedScheme(other.to_string())),
    };
    if url.set_scheme(scheme).is_err() {
        return Err(CollabError::UnsupportedScheme(url.scheme().to_string()));
    }
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_default_config() {
        let config = CollabConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:3000");
        assert_eq!(config.reconnect_base_delay_ms, 1000);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.heartbeat_interval_secs, 5);
    }

    #[test]
    fn endpoint_swaps_scheme_and_appends_ws() {
        assert_eq!(
            websocket_endpoint("http://localhost:3000").unwrap().as_str(),
            "ws://localhost:3000/ws"
        );
        assert_eq!(
            websocket_endpoint("https://builder.example.com/api")
                .unwrap()
                .as_str(),
            "wss://builder.example.com/api/ws"
        );
        // Trailing slash does not double up.
        assert_eq!(
            websocket_endpoint("https://builder.example.com/api/")
                .unwrap()
                .as_str(),
            "wss://builder.example.com/api/ws"
        );
        // Already-websocket bases pass through.
        assert_eq!(
            websocket_endpoint("wss://builder.example.com").unwrap().as_str(),
            "wss://builder.example.com/ws"
        );
    }

    #[test]
    fn endpoint_rejects_other_schemes() {
        assert!(matches!(
            websocket_endpoint("ftp://builder.example.com"),
            Err(CollabError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            websocket_endpoint("not a url"),
            Err(CollabError::InvalidUrl(_))
        ));
    }

    #[test]
    fn load_from_file_with_partial_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_base_url = \"https://builder.example.com\"").unwrap();
        writeln!(file, "reconnect_base_delay_ms = 250").unwrap();

        let config = CollabConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.api_base_url, "https://builder.example.com");
        assert_eq!(config.reconnect_base_delay_ms, 250);
        // Unset keys keep their defaults.
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.heartbeat_interval_secs, 5);
    }

    #[test]
    fn missing_file_is_none() {
        assert!(CollabConfig::load_from_path(Path::new("/nonexistent/config.toml")).is_none());
    }
}
