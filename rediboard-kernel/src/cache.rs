/**
 * CACHE PERSISTANT - Snapshot des instances entre deux redémarrages
 *
 * FORMAT : tableau JSON d'Instance (mêmes champs que l'API, plus `auth`).
 * - Lecture au démarrage ; fichier absent = cache vide
 * - Écriture complète sur Ctrl-C
 * - Seed : une instance configurée reprend l'état observé de l'entrée de même port
 */

use crate::models::Instance;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cannot access cache file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode cache file {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot encode cache content: {0}")]
    Encode(#[from] serde_json::Error),
}

pub async fn read_cache(path: &Path) -> Result<Vec<Instance>, CacheError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no existing cache file, starting fresh");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(CacheError::Io { path: path.to_path_buf(), source });
        }
    };

    let instances: Vec<Instance> = serde_json::from_str(&content).map_err(|source| CacheError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), count = instances.len(), "cache loaded");
    Ok(instances)
}

pub async fn write_cache(path: &Path, instances: &[Instance]) -> Result<(), CacheError> {
    let content = serde_json::to_string_pretty(instances)?;
    tokio::fs::write(path, content)
        .await
        .map_err(|source| CacheError::Io { path: path.to_path_buf(), source })?;
    info!(path = %path.display(), count = instances.len(), "cache saved");
    Ok(())
}

/// Instances configurées, enrichies de l'entrée de cache de même port
pub fn seed_instances(configured: &[Instance], cached: &[Instance]) -> Vec<Instance> {
    configured
        .iter()
        .map(|conf| {
            let mut inst = conf.clone();
            if let Some(entry) = cached.iter().find(|c| c.port == conf.port) {
                inst.adopt_observed(entry);
            }
            inst
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Connection, Role};

    fn observed(vip: &str, port: u16) -> Instance {
        let mut inst = Instance::new(vip, port);
        inst.name = "cache".into();
        inst.auth = Some("s3cret".into());
        inst.host = "db1.example.".into();
        inst.role = Role::Replica;
        inst.version = "3.0.7".into();
        inst.used_memory = 1_048_576;
        inst.maxmemory = 2_147_483_648;
        inst.maxmemory_policy = "allkeys-lru".into();
        inst.connections = vec![Connection { host: "db0.example.".into(), port: 6379 }];
        inst.errors = vec!["CONFIG GET maxmemory error [denied]".into()];
        inst.last_updated = 1_700_000_000;
        inst
    }

    #[tokio::test]
    async fn test_write_then_read_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let instances = vec![observed("10.0.0.1", 6380), Instance::new("10.0.0.2", 6381)];

        write_cache(&path, &instances).await.unwrap();
        let back = read_cache(&path).await.unwrap();
        assert_eq!(back, instances);
    }

    #[tokio::test]
    async fn test_missing_cache_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let back = read_cache(&dir.path().join("absent.json")).await.unwrap();
        assert!(back.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, "[{\"port\": ").await.unwrap();
        assert!(matches!(read_cache(&path).await, Err(CacheError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_reads_legacy_cache_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let legacy = r#"[{"port":"6379","vip":"10.0.0.1","errors":[],"name":"","host":"db1.",
            "auth":"","role":"master","used_memory:":2048,"maxmemory":0,
            "maxmemory_policy":"noeviction","version":"2.6.17",
            "connections":[{"port":"6380","host":"db2."}],"last_updated":1400000000}]"#;
        tokio::fs::write(&path, legacy).await.unwrap();

        let back = read_cache(&path).await.unwrap();
        assert_eq!(back[0].used_memory, 2048);
        assert_eq!(back[0].role, Role::Master);
        assert_eq!(back[0].connections[0].port, 6380);
    }

    #[test]
    fn test_seed_matches_on_port() {
        let configured = vec![Instance::new("vip-a", 6380), Instance::new("vip-b", 6390)];
        let cached = vec![observed("old-vip", 6380)];

        let seeded = seed_instances(&configured, &cached);
        assert_eq!(seeded[0].vip, "vip-a");
        assert_eq!(seeded[0].auth, None);
        assert_eq!(seeded[0].role, Role::Replica);
        assert_eq!(seeded[0].last_updated, 1_700_000_000);
        assert_eq!(seeded[1], configured[1]);
    }
}
