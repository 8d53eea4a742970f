/*!
Builders pour tests du kernel

Produit des rapports INFO au format réel (sections `# Server`, `# Memory`,
`# Replication`, lignes séparées par CRLF).
*/

/// Init logging pour tests (idempotent)
pub fn init_test_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// Rapport INFO synthétique
#[derive(Debug, Clone)]
pub struct InfoBuilder {
    version: String,
    used_memory: String,
    role: String,
    master: Option<(String, String)>,
    replicas: Vec<String>,
    extra: Vec<(String, String)>,
}

impl InfoBuilder {
    pub fn master(version: &str) -> Self {
        Self {
            version: version.to_string(),
            used_memory: "1048576".to_string(),
            role: "master".to_string(),
            master: None,
            replicas: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Replica : `master_host` / `master_port` suivent immédiatement `role:slave`
    pub fn replica_of(version: &str, master_host: &str, master_port: u16) -> Self {
        Self {
            role: "slave".to_string(),
            master: Some((master_host.to_string(), master_port.to_string())),
            ..Self::master(version)
        }
    }

    pub fn used_memory(mut self, raw: impl ToString) -> Self {
        self.used_memory = raw.to_string();
        self
    }

    /// Champ `slaveN` au format 2.6 : `ip,port,state`
    pub fn legacy_replica(mut self, ip: &str, port: u16) -> Self {
        self.replicas.push(format!("{ip},{port},online"));
        self
    }

    /// Champ `slaveN` moderne : `ip=..,port=..,state=..,offset=..,lag=..`
    pub fn replica(mut self, ip: &str, port: u16) -> Self {
        self.replicas
            .push(format!("ip={ip},port={port},state=online,offset=100,lag=0"));
        self
    }

    /// Valeur brute d'un champ `slaveN` (pour tester les entrées malformées)
    pub fn raw_replica(mut self, value: &str) -> Self {
        self.replicas.push(value.to_string());
        self
    }

    /// Ligne `key:value` ajoutée à la fin du rapport
    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.extra.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(&self) -> String {
        let mut lines = vec![
            "# Server".to_string(),
            format!("redis_version:{}", self.version),
            "redis_mode:standalone".to_string(),
            "os:Linux 5.10.0 x86_64".to_string(),
            String::new(),
            "# Memory".to_string(),
            format!("used_memory:{}", self.used_memory),
            "used_memory_human:1.00M".to_string(),
            String::new(),
            "# Replication".to_string(),
            format!("role:{}", self.role),
        ];
        if let Some((host, port)) = &self.master {
            lines.push(format!("master_host:{host}"));
            lines.push(format!("master_port:{port}"));
            lines.push("master_link_status:up".to_string());
            lines.push("slave_repl_offset:100".to_string());
            lines.push("slave_priority:100".to_string());
        }
        lines.push(format!("connected_slaves:{}", self.replicas.len()));
        for (index, value) in self.replicas.iter().enumerate() {
            lines.push(format!("slave{index}:{value}"));
        }
        for (key, value) in &self.extra {
            lines.push(format!("{key}:{value}"));
        }
        lines.push(String::new());
        lines.push("# Keyspace".to_string());
        lines.push("db0:keys=12,expires=0,avg_ttl=0".to_string());
        lines.join("\r\n") + "\r\n"
    }
}
