/**
 * HOSTNAME RESOLVER - Reverse DNS mémoïsé pour nommer les instances
 *
 * RÔLE : Transformer une adresse (IP ou nom de VIP) en nom d'hôte lisible.
 *
 * FONCTIONNEMENT :
 * - Adresse non numérique -> résolution directe, premier résultat retenu
 * - IP cherchée dans le HostnameCache ; sinon reverse lookup, premier nom, mis en cache
 * - Le cache n'expire jamais : les noms sont supposés stables pendant la vie du process
 *
 * ERREURS : toute résolution ratée remonte en ResolveError ; l'appelant la classe
 * comme faute d'environnement, pas comme faute de l'instance.
 */

use crate::state::{new_state, HostnameCache};
use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no address found for {0}")]
    NoAddress(String),
    #[error("no hostname found for {0}")]
    NoName(IpAddr),
    #[error("lookup of {target} failed: {reason}")]
    Lookup { target: String, reason: String },
}

/// Accès DNS brut, remplaçable en test
#[async_trait]
pub trait NameLookup: Send + Sync {
    async fn forward(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError>;
    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, ResolveError>;
}

/// Résolveur système (resolv.conf) via hickory
pub struct SystemLookup {
    resolver: TokioResolver,
}

impl SystemLookup {
    pub fn from_system_conf() -> Result<Self, ResolveError> {
        let resolver = TokioResolver::builder_tokio()
            .map_err(|e| ResolveError::Lookup {
                target: "system configuration".into(),
                reason: e.to_string(),
            })?
            .build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl NameLookup for SystemLookup {
    async fn forward(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let lookup = self.resolver.lookup_ip(host).await.map_err(|e| ResolveError::Lookup {
            target: host.to_string(),
            reason: e.to_string(),
        })?;
        Ok(lookup.iter().collect())
    }

    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, ResolveError> {
        let lookup = self.resolver.reverse_lookup(ip).await.map_err(|e| ResolveError::Lookup {
            target: ip.to_string(),
            reason: e.to_string(),
        })?;
        Ok(lookup.iter().map(|name| name.to_string()).collect())
    }
}

#[derive(Clone)]
pub struct HostnameResolver {
    lookup: Arc<dyn NameLookup>,
    cache: HostnameCache,
}

impl HostnameResolver {
    pub fn new(lookup: Arc<dyn NameLookup>) -> Self {
        Self {
            lookup,
            cache: new_state(HashMap::new()),
        }
    }

    /// Nom d'hôte pour `address` (IP littérale ou nom)
    pub async fn hostname(&self, address: &str) -> Result<String, ResolveError> {
        let ip = match address.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => self
                .lookup
                .forward(address)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| ResolveError::NoAddress(address.to_string()))?,
        };

        let cached = self.cache.lock().get(&ip).cloned();
        if let Some(name) = cached {
            return Ok(name);
        }

        let name = self
            .lookup
            .reverse(ip)
            .await?
            .into_iter()
            .next()
            .ok_or(ResolveError::NoName(ip))?;
        debug!(%ip, %name, "hostname cached");
        self.cache.lock().insert(ip, name.clone());
        Ok(name)
    }

    pub fn cached_names(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Table DNS statique qui compte les reverse lookups
    #[derive(Default)]
    pub struct StaticLookup {
        forward: HashMap<String, IpAddr>,
        reverse: HashMap<IpAddr, String>,
        pub reverse_calls: AtomicUsize,
    }

    impl StaticLookup {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_name(mut self, name: &str, ip: &str) -> Self {
            let ip: IpAddr = ip.parse().unwrap();
            self.forward.insert(name.to_string(), ip);
            self.reverse.insert(ip, format!("{name}."));
            self
        }

        pub fn with_ptr(mut self, ip: &str, name: &str) -> Self {
            self.reverse.insert(ip.parse().unwrap(), name.to_string());
            self
        }

        pub fn into_resolver(self) -> HostnameResolver {
            HostnameResolver::new(Arc::new(self))
        }
    }

    #[async_trait]
    impl NameLookup for StaticLookup {
        async fn forward(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
            Ok(self.forward.get(host).copied().into_iter().collect())
        }

        async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, ResolveError> {
            self.reverse_calls.fetch_add(1, Ordering::SeqCst);
            self.reverse.get(&ip).cloned().map(|n| vec![n]).ok_or_else(|| ResolveError::Lookup {
                target: ip.to_string(),
                reason: "NXDOMAIN".into(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StaticLookup;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_reverse_lookup_is_memoized() {
        let lookup = Arc::new(StaticLookup::new().with_ptr("10.0.0.5", "db1.example."));
        let resolver = HostnameResolver::new(lookup.clone());

        assert_eq!(resolver.hostname("10.0.0.5").await.unwrap(), "db1.example.");
        assert_eq!(resolver.hostname("10.0.0.5").await.unwrap(), "db1.example.");
        assert_eq!(lookup.reverse_calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cached_names(), 1);
    }

    #[tokio::test]
    async fn test_symbolic_address_resolved_forward_first() {
        let lookup = Arc::new(StaticLookup::new().with_name("redis-vip", "10.0.0.7"));
        let resolver = HostnameResolver::new(lookup.clone());

        assert_eq!(resolver.hostname("redis-vip").await.unwrap(), "redis-vip.");
        // la même IP sous forme littérale tombe dans le cache
        assert_eq!(resolver.hostname("10.0.0.7").await.unwrap(), "redis-vip.");
        assert_eq!(lookup.reverse_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolution_failures_propagate() {
        let resolver = StaticLookup::new().into_resolver();
        assert!(matches!(
            resolver.hostname("unknown-vip").await,
            Err(ResolveError::NoAddress(_))
        ));
        assert!(matches!(
            resolver.hostname("10.9.9.9").await,
            Err(ResolveError::Lookup { .. })
        ));
        assert_eq!(resolver.cached_names(), 0);
    }
}
