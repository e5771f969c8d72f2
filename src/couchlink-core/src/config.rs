use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::auth::{AuthMode, User};
use crate::cluster::LOCAL_CLUSTER_NODE_PORT;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,

    /// "none", "basic", "cookie" (or "auth"), case-insensitive
    #[serde(default = "default_auth_mode")]
    pub auth_mode: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Node-local port used when upgrading to node connections
    #[serde(default = "default_node_local_port")]
    pub node_local_port: u16,

    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Directory for JSON log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_server_url() -> String {
    "http://localhost:5984".to_string()
}

fn default_auth_mode() -> String {
    "none".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_node_local_port() -> u16 {
    LOCAL_CLUSTER_NODE_PORT
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Load `path`, falling back to defaults when it cannot be read
    pub fn load_or_default(path: &str) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load {}, using defaults: {}", path, e);
            Self::default()
        })
    }

    pub fn user(&self) -> User {
        User::new(self.username.clone(), self.password.clone())
    }

    pub fn auth_mode(&self) -> crate::Result<AuthMode> {
        self.auth_mode.parse()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            username: String::new(),
            password: String::new(),
            auth_mode: default_auth_mode(),
            timeout_ms: default_timeout_ms(),
            node_local_port: default_node_local_port(),
            insecure_skip_verify: false,
            log_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"username": "admin", "auth_mode": "Cookie"}"#).unwrap();

        assert_eq!(config.server_url, "http://localhost:5984");
        assert_eq!(config.auth_mode().unwrap(), AuthMode::Cookie);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.node_local_port, 5986);
        assert_eq!(config.user().username(), "admin");
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_bad_auth_mode_is_reported() {
        let config = Config {
            auth_mode: "kerberos".to_string(),
            ..Config::default()
        };
        assert!(config.auth_mode().is_err());
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = Config::load_or_default("/nonexistent/couchlink.json");
        assert_eq!(config.auth_mode, "none");
    }
}
