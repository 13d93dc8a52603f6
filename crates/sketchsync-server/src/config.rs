//! Server configuration from environment variables.

use std::net::SocketAddr;
use thiserror::Error;

pub const DEFAULT_ADDR: &str = "0.0.0.0:3030";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address to listen on (`SKETCHSYNC_ADDR`).
    pub addr: SocketAddr,
    /// Create canvases on first join (`SKETCHSYNC_AUTO_CREATE`).
    pub auto_create: bool,
    /// Canvases that exist from startup (`SKETCHSYNC_CANVASES`, comma separated).
    pub canvases: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3030)),
            auto_create: true,
            canvases: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("SKETCHSYNC_ADDR") {
            config.addr = value
                .parse()
                .map_err(|_| ConfigError::Invalid { var: "SKETCHSYNC_ADDR", value })?;
        }
        if let Some(value) = lookup("SKETCHSYNC_AUTO_CREATE") {
            config.auto_create = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => return Err(ConfigError::Invalid { var: "SKETCHSYNC_AUTO_CREATE", value }),
            };
        }
        if let Some(value) = lookup("SKETCHSYNC_CANVASES") {
            config.canvases = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.addr.to_string(), DEFAULT_ADDR);
        assert!(config.auto_create);
        assert!(config.canvases.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("SKETCHSYNC_ADDR", "127.0.0.1:9000"),
            ("SKETCHSYNC_AUTO_CREATE", "false"),
            ("SKETCHSYNC_CANVASES", "board, team ,,"),
        ]))
        .unwrap();
        assert_eq!(config.addr.port(), 9000);
        assert!(!config.auto_create);
        assert_eq!(config.canvases, vec!["board".to_string(), "team".to_string()]);
    }

    #[test]
    fn test_invalid_values() {
        assert!(ServerConfig::from_lookup(lookup(&[("SKETCHSYNC_ADDR", "nowhere")])).is_err());
        assert_eq!(
            ServerConfig::from_lookup(lookup(&[("SKETCHSYNC_AUTO_CREATE", "maybe")])),
            Err(ConfigError::Invalid { var: "SKETCHSYNC_AUTO_CREATE", value: "maybe".into() })
        );
    }
}
