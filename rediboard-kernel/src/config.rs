use crate::models::Instance;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::warn;

pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(3600);
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(300);
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConf,
    /// ex: "500ms"
    #[serde(default)]
    pub connection_timeout: Option<String>,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConf {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    /// ex: "1h"
    #[serde(default)]
    pub expiration: Option<String>,
    /// ex: "5m"
    #[serde(default)]
    pub refresh: Option<String>,
}

impl Default for CacheConf {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            expiration: None,
            refresh: None,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("rediboard-cache.json")
}

impl Config {
    pub fn expiration(&self) -> Duration {
        duration_or_default("cache.expiration", self.cache.expiration.as_deref(), DEFAULT_EXPIRATION)
    }

    pub fn refresh(&self) -> Duration {
        duration_or_default("cache.refresh", self.cache.refresh.as_deref(), DEFAULT_REFRESH)
    }

    pub fn connection_timeout(&self) -> Duration {
        duration_or_default(
            "connection_timeout",
            self.connection_timeout.as_deref(),
            DEFAULT_CONNECTION_TIMEOUT,
        )
    }

    /// Rejette ce qui rendrait le cache ambigu (il est indexé par port)
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for inst in &self.instances {
            if inst.vip.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("instance on port {} has no vip", inst.port)));
            }
            if inst.port == 0 {
                return Err(ConfigError::Invalid(format!("instance {} has port 0", inst.vip)));
            }
            if !seen.insert(inst.port) {
                return Err(ConfigError::Invalid(format!("port {} is configured twice", inst.port)));
            }
        }
        Ok(())
    }
}

/// Valeur absente ou illisible -> défaut (avec warning)
fn duration_or_default(field: &str, raw: Option<&str>, default: Duration) -> Duration {
    let Some(raw) = raw else { return default };
    match humantime::parse_duration(raw.trim()) {
        Ok(d) => d,
        Err(e) => {
            warn!(field, value = raw, error = %e, default = ?default, "unparseable duration, using default");
            default
        }
    }
}

/// Chemin : argument CLI, sinon REDIBOARD_CONFIG, sinon rediboard.json
pub fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("REDIBOARD_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("rediboard.json"))
}

pub fn parse_config(path: &Path, txt: &str) -> Result<Config, ConfigError> {
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let cfg: Config = if is_yaml {
        serde_yaml::from_str(txt)?
    } else {
        serde_json::from_str(txt)?
    };
    cfg.validate()?;
    Ok(cfg)
}

pub async fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(path, &txt)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_JSON: &str = r#"{
        "cache": {"path": "/tmp/rediboard.cache", "expiration": "1h", "refresh": "5m"},
        "connection_timeout": "250ms",
        "listen": "127.0.0.1:9090",
        "instances": [
            {"vip": "redis-a.vip", "port": "6379", "auth": ""},
            {"vip": "10.0.0.2", "port": "6380", "auth": "s3cret", "name": "sessions"}
        ]
    }"#;

    #[test]
    fn test_parse_json_config() {
        let cfg = parse_config(Path::new("rediboard.json"), LEGACY_JSON).unwrap();
        assert_eq!(cfg.listen, "127.0.0.1:9090");
        assert_eq!(cfg.cache.path, PathBuf::from("/tmp/rediboard.cache"));
        assert_eq!(cfg.expiration(), Duration::from_secs(3600));
        assert_eq!(cfg.refresh(), Duration::from_secs(300));
        assert_eq!(cfg.connection_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.instances.len(), 2);
        assert_eq!(cfg.instances[0].credential(), None);
        assert_eq!(cfg.instances[1].credential(), Some("s3cret"));
        assert_eq!(cfg.instances[1].name, "sessions");
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = "listen: 0.0.0.0:8081\ninstances:\n  - vip: 10.0.0.1\n    port: 6379\n";
        let cfg = parse_config(Path::new("kernel.yaml"), yaml).unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:8081");
        assert_eq!(cfg.instances[0].port, 6379);
    }

    #[test]
    fn test_defaults_for_missing_or_bad_durations() {
        let cfg = parse_config(
            Path::new("c.json"),
            r#"{"cache": {"expiration": "forever"}, "connection_timeout": "soon"}"#,
        )
        .unwrap();
        assert_eq!(cfg.expiration(), DEFAULT_EXPIRATION);
        assert_eq!(cfg.refresh(), DEFAULT_REFRESH);
        assert_eq!(cfg.connection_timeout(), DEFAULT_CONNECTION_TIMEOUT);
        assert_eq!(cfg.listen, "0.0.0.0:8080");
        assert_eq!(cfg.cache.path, PathBuf::from("rediboard-cache.json"));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(matches!(
            parse_config(Path::new("c.json"), "{not json"),
            Err(ConfigError::Json(_))
        ));
        let dup = r#"{"instances": [{"vip": "a", "port": 1}, {"vip": "b", "port": "1"}]}"#;
        assert!(matches!(
            parse_config(Path::new("c.json"), dup),
            Err(ConfigError::Invalid(_))
        ));
        let no_vip = r#"{"instances": [{"vip": " ", "port": 1}]}"#;
        assert!(matches!(
            parse_config(Path::new("c.json"), no_vip),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/rediboard.json")).await;
        assert!(matches!(err, Err(ConfigError::Read { .. })));
    }
}
