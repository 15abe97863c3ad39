use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from watchdog.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ServiceConfig {
    pub watchdog: WatchdogConfig,
    pub serve: ServeConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Stall threshold; a notification fires once elapsed time reaches it.
    pub threshold_secs: u64,
    /// Fixed step added to elapsed time on every tick.
    pub tick_interval_secs: u64,
    /// Human-readable name of the monitored worker, used in messages.
    pub job_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Environment variable holding the bearer token.
    pub token_env: String,
    /// Environment variable holding the push destination id.
    pub destination_env: String,
}

// --- Default implementations ---

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            threshold_secs: 20 * 60,
            tick_interval_secs: 1,
            job_name: "worker".to_string(),
        }
    }
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.line.me/v2/bot/message/push".to_string(),
            timeout_secs: 10,
            token_env: "LINE_TOKEN".to_string(),
            destination_env: "GROUP_ID".to_string(),
        }
    }
}

/// Credentials for the push gateway, resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub destination: String,
}

impl NotifyConfig {
    /// Read the token and destination from the configured environment variables.
    ///
    /// Returns `None` when either is unset or empty.
    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials_with(|name| std::env::var(name).ok())
    }

    /// Resolve credentials through `lookup`, keyed by variable name.
    pub fn credentials_with<F>(&self, lookup: F) -> Option<Credentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup(&self.token_env).filter(|v| !v.is_empty())?;
        let destination = lookup(&self.destination_env).filter(|v| !v.is_empty())?;
        Some(Credentials { token, destination })
    }
}

/// Load config from `path`. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(ServiceConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Upper bound for threshold and tick interval (one year).
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

impl ServiceConfig {
    /// Reject settings the watchdog cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watchdog.threshold_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "watchdog.threshold_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.watchdog.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "watchdog.tick_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.watchdog.threshold_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::Invalid {
                field: "watchdog.threshold_secs",
                reason: format!("must not exceed {MAX_INTERVAL_SECS}"),
            });
        }
        if self.watchdog.tick_interval_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::Invalid {
                field: "watchdog.tick_interval_secs",
                reason: format!("must not exceed {MAX_INTERVAL_SECS}"),
            });
        }
        if self.notify.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "notify.timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {source}", path.display())
            }
            ConfigError::Invalid { field, reason } => write!(f, "invalid {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.watchdog.threshold_secs, 1200);
        assert_eq!(cfg.watchdog.tick_interval_secs, 1);
        assert_eq!(cfg.serve.port, 5000);
        assert_eq!(cfg.serve.bind, "0.0.0.0");
        assert_eq!(cfg.notify.token_env, "LINE_TOKEN");
        assert_eq!(cfg.notify.destination_env, "GROUP_ID");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let cfg = load_config(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.watchdog.threshold_secs, 1200);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchdog.toml");
        std::fs::write(
            &path,
            "[watchdog]\nthreshold_secs = 300\njob_name = \"crawler\"\n\n[serve]\nport = 8080\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.watchdog.threshold_secs, 300);
        assert_eq!(cfg.watchdog.tick_interval_secs, 1);
        assert_eq!(cfg.watchdog.job_name, "crawler");
        assert_eq!(cfg.serve.port, 8080);
        assert_eq!(cfg.serve.bind, "0.0.0.0");
        assert_eq!(cfg.notify.timeout_secs, 10);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchdog.toml");
        std::fs::write(&path, "[watchdog\nthreshold_secs = ").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchdog.toml");
        std::fs::write(&path, "[watchdog]\nthreshold_secs = \"soon\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut cfg = ServiceConfig::default();
        cfg.watchdog.threshold_secs = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("watchdog.threshold_secs"));
    }

    #[test]
    fn test_validate_rejects_zero_tick_interval() {
        let mut cfg = ServiceConfig::default();
        cfg.watchdog.tick_interval_secs = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "watchdog.tick_interval_secs",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_threshold_above_cap() {
        let mut cfg = ServiceConfig::default();
        cfg.watchdog.threshold_secs = u64::MAX;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "watchdog.threshold_secs",
                ..
            })
        ));

        cfg.watchdog.threshold_secs = MAX_INTERVAL_SECS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_tick_interval_above_cap() {
        let mut cfg = ServiceConfig::default();
        cfg.watchdog.tick_interval_secs = MAX_INTERVAL_SECS + 1;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("watchdog.tick_interval_secs"));
    }

    fn lookup_from<'a>(
        vars: &'a [(&'static str, &'static str)],
    ) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_credentials_from_lookup() {
        let notify = NotifyConfig::default();
        let vars = [("LINE_TOKEN", "tok"), ("GROUP_ID", "group-1")];

        assert_eq!(
            notify.credentials_with(lookup_from(&vars)),
            Some(Credentials {
                token: "tok".to_string(),
                destination: "group-1".to_string(),
            })
        );
    }

    #[test]
    fn test_credentials_use_configured_names() {
        let notify = NotifyConfig {
            token_env: "PUSH_TOKEN".to_string(),
            destination_env: "PUSH_TO".to_string(),
            ..Default::default()
        };
        let vars = [
            ("LINE_TOKEN", "wrong"),
            ("PUSH_TOKEN", "tok"),
            ("PUSH_TO", "room-9"),
        ];
        let creds = notify.credentials_with(lookup_from(&vars)).unwrap();
        assert_eq!(creds.token, "tok");
        assert_eq!(creds.destination, "room-9");
    }

    #[test]
    fn test_credentials_missing_or_empty() {
        let notify = NotifyConfig::default();
        assert_eq!(
            notify.credentials_with(lookup_from(&[("GROUP_ID", "group-1")])),
            None
        );
        assert_eq!(
            notify.credentials_with(lookup_from(&[("LINE_TOKEN", ""), ("GROUP_ID", "group-1")])),
            None
        );
    }
}
