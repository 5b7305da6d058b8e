//! Configuration for UDP console export.
//!
//! Configuration is read once at startup, normally from `MTER*` environment
//! variables. The same settings can be loaded from a JSON file, which is
//! convenient when many processes share one setup.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::adapters::LocalEcho;
use crate::domain::{resolve_multicast, StreamKind, TargetRule};
use crate::error::{Error, Result};

/// Comma-separated target rules.
pub const ENV_TARGETS: &str = "MTER";
/// Explicit multicast destination for announcements.
pub const ENV_MULTICAST: &str = "MTER_MULTICAST";
/// Keep writing stdout locally while exporting.
pub const ENV_KEEP_STDOUT: &str = "MTER_KEEP_STDOUT";
/// Stop writing stderr locally once exporting is live.
pub const ENV_QUIET_STDERR: &str = "MTER_QUIET_STDERR";
/// Explicit logical process name.
pub const ENV_NAME: &str = "MTER_NAME";
pub const ENV_RECIPIENT_PORT: &str = "MTER_RECIPIENT_PORT";
pub const ENV_RECIPIENT_HOST: &str = "MTER_RECIPIENT_HOST";
pub const ENV_BIND_PORT: &str = "MTER_BIND_PORT";
pub const ENV_HEARTBEAT_PORT: &str = "MTER_HEARTBEAT_PORT";
pub const ENV_LOCK_FILE: &str = "MTER_LOCK_FILE";
pub const ENV_HEARTBEAT_MS: &str = "MTER_HEARTBEAT_MS";

/// Export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MterConfig {
    /// Raw target rule entries, e.g. `5001:worker-*`.
    #[serde(default)]
    pub targets: Vec<String>,

    /// Multicast group for announcements; invalid values fall back to the default.
    #[serde(default)]
    pub multicast: Option<String>,

    /// Keep writing stdout locally.
    #[serde(default, rename = "keepStdout")]
    pub keep_local_output: bool,

    /// Suppress local stderr once the export is live.
    #[serde(default, rename = "quietStderr")]
    pub suppress_local_stderr: bool,

    /// Logical process name overriding the derived one.
    #[serde(default, rename = "processName")]
    pub process_name: Option<String>,

    /// Port collectors listen on.
    #[serde(default = "default_recipient_port", rename = "recipientPort")]
    pub recipient_port: u16,

    /// Host log datagrams are sent to.
    #[serde(default = "default_recipient_host", rename = "recipientHost")]
    pub recipient_host: Ipv4Addr,

    /// First port handed out by the allocator.
    #[serde(default = "default_bind_port", rename = "defaultBindPort")]
    pub default_bind_port: u16,

    /// Shared heartbeat port; defaults to one below `default_bind_port`.
    #[serde(default, rename = "heartbeatPort")]
    pub heartbeat_port: Option<u16>,

    /// File name of the allocation record in the temp directory.
    #[serde(default = "default_lock_file_name", rename = "lockFileName")]
    pub lock_file_name: String,

    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_interval", rename = "heartbeatIntervalMs")]
    pub heartbeat_interval_ms: u64,
}

fn default_recipient_port() -> u16 {
    4511
}

fn default_recipient_host() -> Ipv4Addr {
    Ipv4Addr::LOCALHOST
}

fn default_bind_port() -> u16 {
    4600
}

fn default_lock_file_name() -> String {
    "udp_xlogger_port.lock".to_string()
}

fn default_heartbeat_interval() -> u64 {
    1000
}

impl Default for MterConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            multicast: None,
            keep_local_output: false,
            suppress_local_stderr: false,
            process_name: None,
            recipient_port: default_recipient_port(),
            recipient_host: default_recipient_host(),
            default_bind_port: default_bind_port(),
            heartbeat_port: None,
            lock_file_name: default_lock_file_name(),
            heartbeat_interval_ms: default_heartbeat_interval(),
        }
    }
}

impl MterConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Build configuration from `(name, value)` pairs; unknown names are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let value = value.as_ref().trim();
            match key.as_ref() {
                ENV_TARGETS => {
                    config.targets = TargetRule::split_entries(value)
                        .map(str::to_string)
                        .collect();
                }
                ENV_MULTICAST => config.multicast = non_empty(value),
                ENV_KEEP_STDOUT => config.keep_local_output = parse_flag(ENV_KEEP_STDOUT, value)?,
                ENV_QUIET_STDERR => {
                    config.suppress_local_stderr = parse_flag(ENV_QUIET_STDERR, value)?
                }
                ENV_NAME => config.process_name = non_empty(value),
                ENV_RECIPIENT_PORT => config.recipient_port = parse_value(ENV_RECIPIENT_PORT, value)?,
                ENV_RECIPIENT_HOST => config.recipient_host = parse_value(ENV_RECIPIENT_HOST, value)?,
                ENV_BIND_PORT => config.default_bind_port = parse_value(ENV_BIND_PORT, value)?,
                ENV_HEARTBEAT_PORT => {
                    config.heartbeat_port = Some(parse_value(ENV_HEARTBEAT_PORT, value)?)
                }
                ENV_LOCK_FILE => {
                    if let Some(name) = non_empty(value) {
                        config.lock_file_name = name;
                    }
                }
                ENV_HEARTBEAT_MS => {
                    config.heartbeat_interval_ms = parse_value(ENV_HEARTBEAT_MS, value)?
                }
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.default_bind_port == 0 {
            return Err(Error::Config("default bind port must not be 0".to_string()));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(Error::Config("heartbeat interval must not be 0".to_string()));
        }
        if self.lock_file_name.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "lock file name '{}' must not contain a path separator",
                self.lock_file_name
            )));
        }
        Ok(())
    }

    /// Returns true if any target rule is configured.
    pub fn is_active(&self) -> bool {
        !self.targets.is_empty()
    }

    /// Parse the target rules, skipping (and logging) malformed entries.
    pub fn rules(&self) -> Vec<TargetRule> {
        self.targets
            .iter()
            .filter_map(|raw| match TargetRule::parse(raw) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(error = %e, "Skipping target rule");
                    None
                }
            })
            .collect()
    }

    /// Shared heartbeat port.
    pub fn heartbeat_port(&self) -> u16 {
        self.heartbeat_port
            .unwrap_or_else(|| self.default_bind_port.saturating_sub(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Where log datagrams are sent.
    pub fn recipient_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.recipient_host, self.recipient_port))
    }

    /// Where announcements are sent: the validated multicast group.
    pub fn announce_destination(&self) -> SocketAddrV4 {
        SocketAddrV4::new(
            resolve_multicast(self.multicast.as_deref()),
            self.recipient_port,
        )
    }

    /// Local echo policy for a stream.
    pub fn local_echo(&self, kind: StreamKind) -> LocalEcho {
        let keep = match kind {
            StreamKind::Stdout => self.keep_local_output,
            StreamKind::Stderr => !self.suppress_local_stderr,
        };
        if keep {
            LocalEcho::Always
        } else {
            LocalEcho::SuppressWhenLive
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        other => Err(Error::Config(format!("{} expects a boolean, got '{}'", name, other))),
    }
}

fn parse_value<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{} has an invalid value '{}'", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DEFAULT_MULTICAST_ADDR;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = MterConfig::from_vars(Vec::<(String, String)>::new()).unwrap();
        assert!(!config.is_active());
        assert_eq!(config.recipient_port, 4511);
        assert_eq!(config.default_bind_port, 4600);
        assert_eq!(config.heartbeat_port(), 4599);
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(1000));
        assert_eq!(config.lock_file_name, "udp_xlogger_port.lock");
        assert_eq!(config.recipient_addr(), "127.0.0.1:4511".parse().unwrap());
        assert_eq!(
            config.announce_destination(),
            SocketAddrV4::new(DEFAULT_MULTICAST_ADDR, 4511)
        );
    }

    #[test]
    fn test_from_vars() {
        let config = MterConfig::from_vars([
            ("MTER", " 5001:worker-* , ,@api "),
            ("MTER_MULTICAST", "224.0.2.9"),
            ("MTER_KEEP_STDOUT", "yes"),
            ("MTER_NAME", "worker-3"),
            ("MTER_BIND_PORT", "5000"),
            ("MTER_HEARTBEAT_MS", "250"),
            ("PATH", "/usr/bin"),
        ])
        .unwrap();

        assert_eq!(config.targets, vec!["5001:worker-*", "@api"]);
        assert!(config.keep_local_output);
        assert_eq!(config.process_name.as_deref(), Some("worker-3"));
        assert_eq!(config.heartbeat_port(), 4999);
        assert_eq!(config.heartbeat_interval_ms, 250);
        assert_eq!(
            config.announce_destination().ip(),
            &Ipv4Addr::new(224, 0, 2, 9)
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(MterConfig::from_vars([("MTER_RECIPIENT_PORT", "99999")]).is_err());
        assert!(MterConfig::from_vars([("MTER_KEEP_STDOUT", "maybe")]).is_err());
        assert!(MterConfig::from_vars([("MTER_BIND_PORT", "0")]).is_err());
        assert!(MterConfig::from_vars([("MTER_LOCK_FILE", "../escape")]).is_err());
    }

    #[test]
    fn test_out_of_range_multicast_falls_back() {
        let config = MterConfig::from_vars([("MTER_MULTICAST", "239.255.255.250")]).unwrap();
        assert_eq!(config.announce_destination().ip(), &DEFAULT_MULTICAST_ADDR);
    }

    #[test]
    fn test_rules_skip_malformed() {
        let config = MterConfig::from_vars([("MTER", "70000:bad,5001:worker-*,::")]).unwrap();
        let rules = config.rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].explicit_port, Some(5001));
    }

    #[test]
    fn test_local_echo_policy() {
        let mut config = MterConfig::default();
        assert_eq!(config.local_echo(StreamKind::Stdout), LocalEcho::SuppressWhenLive);
        assert_eq!(config.local_echo(StreamKind::Stderr), LocalEcho::Always);

        config.keep_local_output = true;
        config.suppress_local_stderr = true;
        assert_eq!(config.local_echo(StreamKind::Stdout), LocalEcho::Always);
        assert_eq!(config.local_echo(StreamKind::Stderr), LocalEcho::SuppressWhenLive);
    }

    #[tokio::test]
    async fn test_load_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mter.json");
        std::fs::write(
            &path,
            r#"{"targets": ["*"], "recipientPort": 5511, "heartbeatPort": 5599}"#,
        )
        .unwrap();

        let config = MterConfig::load(&path).await.unwrap();
        assert_eq!(config.targets, vec!["*"]);
        assert_eq!(config.recipient_port, 5511);
        assert_eq!(config.heartbeat_port(), 5599);
        assert_eq!(config.default_bind_port, 4600);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = MterConfig::load(&dir.path().join("missing.json")).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_load_malformed_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mter.json");
        std::fs::write(&path, r#"{"targets": "#).unwrap();

        let result = MterConfig::load(&path).await;
        assert!(matches!(result, Err(Error::Json(_))));
    }
}
