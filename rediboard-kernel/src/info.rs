/**
 * PARSER INFO - Décodage du rapport texte renvoyé par la commande INFO
 *
 * FORMAT :
 * - Lignes séparées par CRLF ; vides ou commençant par '#' = marqueurs de section
 * - Autres lignes : `key:value` (coupé au premier ':')
 *
 * CLÉS RETENUES :
 * - redis_version, used_memory, role
 * - role:slave -> les DEUX lignes suivantes doivent être master_host / master_port
 *   (dépendance positionnelle, pas une recherche par clé)
 * - slave<N> -> un replica connecté ; encodage choisi selon la version parsée
 *
 * Fonction pure : pas de réseau, pas de DNS. Les hôtes sont rendus bruts.
 */

use crate::models::Role;
use std::fmt;

/// Version `major.minor.patch` ; parties absentes = 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        Some(Self { major, minor, patch })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Encodage des champs `slaveN`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaEncoding {
    /// jusqu'à 2.6 : `ip,port,state`
    Legacy,
    /// 2.8+ : `ip=..,port=..,state=..,offset=..,lag=..`
    KeyValue,
}

impl ReplicaEncoding {
    const KEY_VALUE_SINCE: Version = Version::new(2, 8, 0);

    pub fn for_version(version: Option<Version>) -> Self {
        match version {
            Some(v) if v < Self::KEY_VALUE_SINCE => ReplicaEncoding::Legacy,
            _ => ReplicaEncoding::KeyValue,
        }
    }

    pub fn decode(self, value: &str) -> Option<Endpoint> {
        let (host, port) = match self {
            ReplicaEncoding::Legacy => {
                let mut parts = value.split(',');
                (parts.next()?, parts.next()?)
            }
            ReplicaEncoding::KeyValue => {
                let mut host = None;
                let mut port = None;
                for pair in value.split(',') {
                    match pair.split_once('=') {
                        Some(("ip", v)) => host = Some(v),
                        Some(("port", v)) => port = Some(v),
                        _ => {}
                    }
                }
                (host?, port?)
            }
        };
        Endpoint::new(host, port)
    }
}

/// Adresse brute (non résolue) trouvée dans le rapport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    fn new(host: &str, port: &str) -> Option<Self> {
        let host = host.trim();
        if host.is_empty() {
            return None;
        }
        Some(Self {
            host: host.to_string(),
            port: port.trim().parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoReport {
    pub version: Option<String>,
    pub used_memory: Option<u64>,
    pub role: Option<Role>,
    /// master suivi, si role:slave et lignes positionnelles valides
    pub master: Option<Endpoint>,
    /// replicas connectés (champs slaveN), dans l'ordre du rapport
    pub replicas: Vec<Endpoint>,
    /// anomalies non bloquantes, à enregistrer sur l'instance
    pub issues: Vec<String>,
}

impl InfoReport {
    /// Master d'abord puis replicas : ordre des arêtes de l'instance
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.master.iter().chain(self.replicas.iter())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InfoError {
    #[error("used_memory is not an integer: {0:?}")]
    UsedMemory(String),
}

fn split_field(line: &str) -> Option<(&str, &str)> {
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    line.split_once(':')
}

fn is_replica_field(key: &str) -> bool {
    key.strip_prefix("slave")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Lignes `index+1` et `index+2` : master_host puis master_port
fn master_after_role(lines: &[&str], index: usize) -> Result<Endpoint, String> {
    let host = lines.get(index + 1).and_then(|l| split_field(l));
    let port = lines.get(index + 2).and_then(|l| split_field(l));
    match (host, port) {
        (Some(("master_host", host)), Some(("master_port", port))) => Endpoint::new(host, port)
            .ok_or_else(|| format!("invalid master address {host:?}:{port:?}")),
        _ => Err("role:slave is not followed by master_host and master_port".to_string()),
    }
}

pub fn parse_info(reply: &str) -> Result<InfoReport, InfoError> {
    let lines: Vec<&str> = reply.lines().collect();
    let mut report = InfoReport::default();

    // la version choisit l'encodage des slaveN, on la lit avant tout
    report.version = lines
        .iter()
        .filter_map(|l| split_field(l))
        .find(|(key, _)| *key == "redis_version")
        .map(|(_, value)| value.to_string());
    let encoding = ReplicaEncoding::for_version(report.version.as_deref().and_then(Version::parse));

    for (index, line) in lines.iter().enumerate() {
        let Some((key, value)) = split_field(line) else { continue };
        match key {
            "used_memory" => {
                let parsed = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| InfoError::UsedMemory(value.to_string()))?;
                report.used_memory = Some(parsed);
            }
            "role" => {
                let role = Role::from_info(value);
                report.role = Some(role);
                if role == Role::Replica {
                    match master_after_role(&lines, index) {
                        Ok(master) => report.master = Some(master),
                        Err(issue) => report.issues.push(issue),
                    }
                }
            }
            key if is_replica_field(key) => match encoding.decode(value) {
                Some(replica) => report.replicas.push(replica),
                None => report
                    .issues
                    .push(format!("cannot decode replica field {key}:{value} ({encoding:?})")),
            },
            _ => {}
        }
    }

    Ok(report)
}
