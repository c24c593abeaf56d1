//! Client configuration loaded from environment variables.
//!
//! Everything has a default so `peerchat` starts with no configuration at
//! all; login details can then be typed in or come from the stored session.

use std::path::PathBuf;

use peerchat_net::discovery::parse_multiaddrs;
use peerchat_net::SwarmConfig;
use peerchat_shared::constants::DEFAULT_QUIC_PORT;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Env: `PEERCHAT_LOGIN`
    pub login: Option<String>,

    /// Env: `PEERCHAT_PASSWORD`
    pub password: Option<String>,

    /// Env: `PEERCHAT_DEVICE_NAME`
    pub device_name: Option<String>,

    /// QUIC port to listen on.
    /// Env: `PEERCHAT_LISTEN_PORT`
    /// Default: `4001`
    pub listen_port: u16,

    /// File with one bootstrap multiaddr per line.
    /// Env: `PEERCHAT_BOOTSTRAP`
    pub bootstrap_path: Option<PathBuf>,

    /// Multiaddrs to dial on startup.
    /// Env: `PEERCHAT_DIAL` (comma separated)
    pub dial: Vec<String>,

    /// Settings database. Defaults to the platform data directory.
    /// Env: `PEERCHAT_DB`
    pub database_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            login: None,
            password: None,
            device_name: None,
            listen_port: DEFAULT_QUIC_PORT,
            bootstrap_path: None,
            dial: Vec::new(),
            database_path: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        config.login = non_empty("PEERCHAT_LOGIN");
        config.password = non_empty("PEERCHAT_PASSWORD");
        config.device_name = non_empty("PEERCHAT_DEVICE_NAME");

        if let Some(port) = non_empty("PEERCHAT_LISTEN_PORT") {
            match port.trim().parse::<u16>() {
                Ok(parsed) => config.listen_port = parsed,
                Err(e) => tracing::warn!(
                    value = %port,
                    error = %e,
                    "Invalid PEERCHAT_LISTEN_PORT, using default"
                ),
            }
        }

        config.bootstrap_path = non_empty("PEERCHAT_BOOTSTRAP").map(PathBuf::from);

        if let Some(dial) = non_empty("PEERCHAT_DIAL") {
            config.dial = dial
                .split(',')
                .map(str::trim)
                .filter(|addr| !addr.is_empty())
                .map(String::from)
                .collect();
        }

        config.database_path = non_empty("PEERCHAT_DB").map(PathBuf::from);

        // RUST_LOG goes straight to tracing-subscriber's EnvFilter.

        config
    }

    /// Login details given up front, when all three are present.
    pub fn login_details(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.login.as_deref()?,
            self.password.as_deref()?,
            self.device_name.as_deref()?,
        ))
    }

    pub fn swarm_config(&self) -> SwarmConfig {
        SwarmConfig {
            bootstrap_peers_path: self.bootstrap_path.clone(),
            listen_port: self.listen_port,
            extra_dials: parse_multiaddrs(self.dial.iter().map(String::as_str)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.listen_port, 4001);
        assert!(config.login_details().is_none());
    }

    #[test]
    fn test_full_environment() {
        let config = config(&[
            ("PEERCHAT_LOGIN", "alice"),
            ("PEERCHAT_PASSWORD", "pw"),
            ("PEERCHAT_DEVICE_NAME", "Laptop"),
            ("PEERCHAT_LISTEN_PORT", "5001"),
            ("PEERCHAT_DIAL", "/ip4/10.0.0.2/udp/4001/quic-v1, ,/ip4/10.0.0.3/udp/4001/quic-v1"),
            ("PEERCHAT_DB", "/tmp/chat.db"),
        ]);
        assert_eq!(config.login_details(), Some(("alice", "pw", "Laptop")));
        assert_eq!(config.listen_port, 5001);
        assert_eq!(config.dial.len(), 2);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/chat.db")));
        assert_eq!(config.swarm_config().extra_dials.len(), 2);
    }

    #[test]
    fn test_invalid_port_keeps_default() {
        let config = config(&[("PEERCHAT_LISTEN_PORT", "not-a-port")]);
        assert_eq!(config.listen_port, DEFAULT_QUIC_PORT);
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = config(&[("PEERCHAT_LOGIN", "  "), ("PEERCHAT_DIAL", "")]);
        assert!(config.login.is_none());
        assert!(config.dial.is_empty());
    }
}
