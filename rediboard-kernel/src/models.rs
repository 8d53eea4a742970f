use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Rôle rapporté par `INFO` (`role:master` / `role:slave`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "master")]
    Master,
    #[serde(rename = "slave")]
    Replica,
    #[default]
    #[serde(rename = "unknown", alias = "")]
    Unknown,
}

impl Role {
    pub fn from_info(value: &str) -> Self {
        match value {
            "master" => Role::Master,
            "slave" => Role::Replica,
            _ => Role::Unknown,
        }
    }
}

/// Arête de réplication : "cette instance réplique depuis / est répliquée par host:port"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub host: String,
    #[serde(deserialize_with = "port_from_any")]
    pub port: u16,
}

/// Un noeud Redis pollé.
///
/// L'identité (`vip`, `port`, `auth`, `name`) vient de la configuration ;
/// le reste est l'état observé lors du dernier poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(deserialize_with = "port_from_any")]
    pub port: u16,
    pub vip: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub version: String,
    // les anciens caches écrivaient la clé avec un ':' final
    #[serde(default, alias = "used_memory:")]
    pub used_memory: u64,
    #[serde(default)]
    pub maxmemory: u64,
    #[serde(default)]
    pub maxmemory_policy: String,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub last_updated: i64,
}

impl Instance {
    pub fn new(vip: impl Into<String>, port: u16) -> Self {
        Self {
            port,
            vip: vip.into(),
            name: String::new(),
            auth: None,
            host: String::new(),
            role: Role::Unknown,
            version: String::new(),
            used_memory: 0,
            maxmemory: 0,
            maxmemory_policy: String::new(),
            connections: Vec::new(),
            errors: Vec::new(),
            last_updated: 0,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.vip, self.port)
    }

    /// Mot de passe AUTH, une chaîne vide vaut absence
    pub fn credential(&self) -> Option<&str> {
        self.auth.as_deref().filter(|secret| !secret.is_empty())
    }

    /// Reprend l'état observé d'une entrée du cache, l'identité configurée reste intacte
    pub fn adopt_observed(&mut self, cached: &Instance) {
        self.host = cached.host.clone();
        self.role = cached.role;
        self.version = cached.version.clone();
        self.used_memory = cached.used_memory;
        self.maxmemory = cached.maxmemory;
        self.maxmemory_policy = cached.maxmemory_policy.clone();
        self.connections = cached.connections.clone();
        self.errors = cached.errors.clone();
        self.last_updated = cached.last_updated;
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.address())
        } else {
            write!(f, "{} ({})", self.name, self.address())
        }
    }
}

/// Secondes Unix courantes, format de `last_updated`
pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

// Les fichiers de config historiques écrivent les ports en chaîne ("6379")
fn port_from_any<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u16),
        Text(String),
    }

    match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(port) => Ok(port),
        PortRepr::Text(text) => text
            .trim()
            .parse::<u16>()
            .map_err(|e| serde::de::Error::custom(format!("invalid port {text:?}: {e}"))),
    }
}
