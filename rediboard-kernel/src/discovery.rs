/**
 * TOPOLOGY DISCOVERY - Poll d'une instance Redis et mise à jour de son état
 *
 * MACHINE À ÉTATS (par instance, par pass) :
 *   Idle -> Connecting -> Authenticating (si auth) -> QueryingConfig -> QueryingInfo -> Parsed
 *   Toute étape peut basculer en Failed ; les étapes suivantes ne tournent pas.
 *
 * RÈGLES :
 * - Chaque tentative remet `connections` et `errors` à zéro et horodate `last_updated`
 * - Échec : rôle, version et mémoire gardent les valeurs du dernier poll réussi
 * - maxmemory / maxmemory-policy appliqués ensemble ou pas du tout
 * - Les champs issus d'INFO (et les arêtes résolues) appliqués ensemble à la fin
 *
 * ERREURS : PollError typée ; `is_instance_fault()` sépare les fautes propres à
 * l'instance (enregistrées sur elle) des fautes d'environnement (DNS, réponse
 * malformée) que l'appelant remonte dans la liste d'erreurs globale.
 */

use crate::info::{parse_info, InfoError};
use crate::models::{Connection, Instance};
use crate::protocol::{ProtocolError, RedisConnection, Reply};
use crate::resolver::{HostnameResolver, ResolveError};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStage {
    Connecting,
    Authenticating,
    QueryingConfig,
    QueryingInfo,
    Parsing,
}

impl fmt::Display for PollStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollStage::Connecting => "connecting",
            PollStage::Authenticating => "authenticating",
            PollStage::QueryingConfig => "querying config",
            PollStage::QueryingInfo => "querying info",
            PollStage::Parsing => "parsing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Connection error [{0}]")]
    Connect(#[source] ProtocolError),
    #[error("Authentication error [{0}]")]
    Auth(String),
    #[error("CONFIG GET {item} error [{reason}]")]
    Config { item: &'static str, reason: String },
    #[error("INFO error [{0}]")]
    Info(String),
    #[error("{stage} failed [{source}]")]
    Transport {
        stage: PollStage,
        #[source]
        source: ProtocolError,
    },
    #[error("malformed reply from {address}: {reason}")]
    Malformed { address: String, reason: String },
    #[error("hostname resolution failed for {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: ResolveError,
    },
}

impl PollError {
    /// Faute propre à l'instance (vs environnement : DNS, réponse malformée,
    /// violation du protocole)
    pub fn is_instance_fault(&self) -> bool {
        !matches!(
            self,
            PollError::Malformed { .. }
                | PollError::Resolve { .. }
                | PollError::Transport { source: ProtocolError::Malformed(_), .. }
        )
    }

    pub fn stage(&self) -> PollStage {
        match self {
            PollError::Connect(_) => PollStage::Connecting,
            PollError::Auth(_) => PollStage::Authenticating,
            PollError::Config { .. } => PollStage::QueryingConfig,
            PollError::Info(_) => PollStage::QueryingInfo,
            PollError::Transport { stage, .. } => *stage,
            PollError::Malformed { .. } | PollError::Resolve { .. } => PollStage::Parsing,
        }
    }
}

#[derive(Clone)]
pub struct DiscoveryEngine {
    resolver: HostnameResolver,
    timeout: Duration,
}

impl DiscoveryEngine {
    pub fn new(resolver: HostnameResolver, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }

    pub fn resolver(&self) -> &HostnameResolver {
        &self.resolver
    }

    /// Une tentative complète. `Err` = l'instance est en Failed pour ce pass ;
    /// l'appelant choisit où ranger l'erreur.
    pub async fn poll(&self, instance: &mut Instance, now: i64) -> Result<(), PollError> {
        instance.connections.clear();
        instance.errors.clear();
        instance.last_updated = now;

        let address = instance.address();
        let label = instance.to_string();
        debug!(instance = %label, "polling");

        let mut conn = RedisConnection::connect(&address, self.timeout)
            .await
            .map_err(PollError::Connect)?;

        if let Some(secret) = instance.credential() {
            authenticate(&mut conn, secret).await?;
        }

        let maxmemory = config_get(&mut conn, "maxmemory").await?;
        let policy = config_get(&mut conn, "maxmemory-policy").await?;
        let maxmemory = maxmemory.trim().parse::<u64>().map_err(|_| PollError::Malformed {
            address: address.clone(),
            reason: format!("maxmemory is not an integer: {maxmemory:?}"),
        })?;
        instance.maxmemory = maxmemory;
        instance.maxmemory_policy = policy;

        let raw = fetch_info(&mut conn).await?;
        let report = parse_info(&raw).map_err(|e: InfoError| PollError::Malformed {
            address: address.clone(),
            reason: e.to_string(),
        })?;

        let mut connections = Vec::new();
        for endpoint in report.endpoints() {
            let host = self.resolve(&endpoint.host).await?;
            connections.push(Connection { host, port: endpoint.port });
        }
        let host = self.resolve(&instance.vip).await?;

        if let Some(version) = report.version {
            instance.version = version;
        }
        if let Some(used) = report.used_memory {
            instance.used_memory = used;
        }
        if let Some(role) = report.role {
            instance.role = role;
        }
        instance.host = host;
        instance.connections = connections;
        for issue in &report.issues {
            warn!(instance = %label, %issue, "info report anomaly");
        }
        instance.errors = report.issues;

        info!(
            instance = %label,
            role = ?instance.role,
            version = %instance.version,
            connections = instance.connections.len(),
            "instance polled"
        );
        Ok(())
    }

    async fn resolve(&self, target: &str) -> Result<String, PollError> {
        self.resolver.hostname(target).await.map_err(|source| PollError::Resolve {
            target: target.to_string(),
            source,
        })
    }
}

async fn authenticate(conn: &mut RedisConnection, secret: &str) -> Result<(), PollError> {
    let reply = conn
        .command(&["AUTH", secret])
        .await
        .map_err(|source| PollError::Transport { stage: PollStage::Authenticating, source })?;
    match reply {
        Reply::Status(_) => Ok(()),
        Reply::Error(e) => Err(PollError::Auth(e)),
        other => Err(PollError::Auth(format!("unexpected reply {other:?}"))),
    }
}

/// `CONFIG GET item` -> valeur ; tableau vide = item inconnu
async fn config_get(conn: &mut RedisConnection, item: &'static str) -> Result<String, PollError> {
    let reply = conn
        .command(&["CONFIG", "GET", item])
        .await
        .map_err(|source| PollError::Transport { stage: PollStage::QueryingConfig, source })?;
    let reason = match reply {
        Reply::Array(Some(items)) if items.len() >= 2 => {
            match items.into_iter().nth(1).and_then(Reply::into_text) {
                Some(value) => return Ok(value),
                None => "value is not a string".to_string(),
            }
        }
        Reply::Array(_) => "no value returned".to_string(),
        Reply::Error(e) => e,
        other => format!("unexpected reply {other:?}"),
    };
    Err(PollError::Config { item, reason })
}

async fn fetch_info(conn: &mut RedisConnection) -> Result<String, PollError> {
    let reply = conn
        .command(&["INFO"])
        .await
        .map_err(|source| PollError::Transport { stage: PollStage::QueryingInfo, source })?;
    match reply {
        Reply::Bulk(Some(report)) => Ok(report),
        Reply::Error(e) => Err(PollError::Info(e)),
        other => Err(PollError::Info(format!("unexpected reply {other:?}"))),
    }
}
