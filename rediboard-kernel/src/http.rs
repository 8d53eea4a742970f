/**
 * API REST REDIBOARD - Lecture seule de la topologie découverte
 *
 * RÔLE :
 * Expose le dernier Snapshot publié en JSON. Aucun handler ne déclenche de poll :
 * les données viennent toutes du cache mémoire alimenté par le scheduler.
 *
 * ROUTES :
 * - /health               -> "ok"
 * - /system/health        -> état du kernel (passes, erreurs, mémoire)
 * - /api/instances        -> { instances, errors }
 * - /api/instance/{port}  -> une instance (404 si inconnue)
 * - /api/hosts            -> hôtes physiques distincts, triés
 * - /api/host/{name}      -> instances tournant sur cet hôte
 *
 * SÉCURITÉ : le mot de passe AUTH n'apparaît jamais dans une réponse (InstanceView).
 */

use crate::health::{HealthTracker, KernelHealth};
use crate::models::{Connection, Instance, Role};
use crate::snapshot::SharedStore;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize, PartialEq)]
pub struct InstanceView {
    port: u16,
    vip: String,
    name: String,
    host: String,
    role: Role,
    version: String,
    used_memory: u64,
    maxmemory: u64,
    maxmemory_policy: String,
    connections: Vec<Connection>,
    errors: Vec<String>,
    last_updated: i64,
}

fn to_view(i: &Instance) -> InstanceView {
    InstanceView {
        port: i.port,
        vip: i.vip.clone(),
        name: i.name.clone(),
        host: i.host.clone(),
        role: i.role,
        version: i.version.clone(),
        used_memory: i.used_memory,
        maxmemory: i.maxmemory,
        maxmemory_policy: i.maxmemory_policy.clone(),
        connections: i.connections.clone(),
        errors: i.errors.clone(),
        last_updated: i.last_updated,
    }
}

#[derive(Debug, Serialize)]
pub struct TopologyView {
    instances: Vec<InstanceView>,
    errors: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub health_tracker: HealthTracker,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/api/instances", get(get_instances))
        .route("/api/instance/{port}", get(get_instance))
        .route("/api/hosts", get(get_hosts))
        .route("/api/host/{name}", get(get_host))
        .with_state(app_state)
}

// GET /api/instances (snapshot complet)
async fn get_instances(State(app): State<AppState>) -> Json<TopologyView> {
    let snap = app.store.load();
    Json(TopologyView {
        instances: snap.instances.iter().map(to_view).collect(),
        errors: snap.errors.clone(),
    })
}

// GET /api/instance/{port}
async fn get_instance(
    State(app): State<AppState>,
    Path(port): Path<u16>,
) -> Result<Json<InstanceView>, StatusCode> {
    let snap = app.store.load();
    let Some(inst) = snap.instance(port) else { return Err(StatusCode::NOT_FOUND); };
    Ok(Json(to_view(inst)))
}

// GET /api/hosts
async fn get_hosts(State(app): State<AppState>) -> Json<Vec<String>> {
    Json(app.store.load().hosts())
}

// GET /api/host/{name}
async fn get_host(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Json<Vec<InstanceView>> {
    let snap = app.store.load();
    Json(snap.instances_on(&name).into_iter().map(to_view).collect())
}

// GET /system/health (état du kernel)
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Snapshot, SnapshotStore};
    use std::sync::Arc;

    fn app() -> AppState {
        let mut master = Instance::new("10.0.0.1", 6379);
        master.auth = Some("s3cret".into());
        master.host = "db1.example.".into();
        master.role = Role::Master;
        master.connections = vec![Connection { host: "db2.example.".into(), port: 6380 }];

        let mut replica = Instance::new("10.0.0.2", 6380);
        replica.host = "db2.example.".into();
        replica.role = Role::Replica;

        let mut other = Instance::new("10.0.0.1", 6390);
        other.host = "db1.example.".into();

        let snapshot = Snapshot {
            instances: vec![master, replica, other],
            errors: vec!["10.0.0.9:6400: hostname resolution failed".into()],
        };
        AppState {
            store: Arc::new(SnapshotStore::new(snapshot)),
            health_tracker: HealthTracker::new(),
        }
    }

    #[tokio::test]
    async fn test_instances_endpoint_shape() {
        let Json(view) = get_instances(State(app())).await;
        let body = serde_json::to_value(&view).unwrap();

        assert_eq!(body["instances"].as_array().unwrap().len(), 3);
        assert_eq!(body["errors"][0], "10.0.0.9:6400: hostname resolution failed");
        let first = &body["instances"][0];
        assert_eq!(first["role"], "master");
        assert_eq!(first["connections"][0]["port"], 6380);
        assert!(first.get("auth").is_none());
    }

    #[tokio::test]
    async fn test_credential_never_served() {
        let Json(view) = get_instances(State(app())).await;
        let txt = serde_json::to_string(&view).unwrap();
        assert!(!txt.contains("s3cret"));
    }

    #[tokio::test]
    async fn test_instance_by_port() {
        let Json(view) = get_instance(State(app()), Path(6380)).await.unwrap();
        assert_eq!(view.role, Role::Replica);
        assert_eq!(view.vip, "10.0.0.2");

        let missing = get_instance(State(app()), Path(1)).await;
        assert_eq!(missing.unwrap_err(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_hosts_and_host_detail() {
        let Json(hosts) = get_hosts(State(app())).await;
        assert_eq!(hosts, vec!["db1.example.".to_string(), "db2.example.".to_string()]);

        let Json(on_db1) = get_host(State(app()), Path("db1.example.".into())).await;
        let ports: Vec<u16> = on_db1.iter().map(|v| v.port).collect();
        assert_eq!(ports, vec![6379, 6390]);

        let Json(none) = get_host(State(app()), Path("nowhere.".into())).await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_system_health() {
        let Json(health) = get_system_health(State(app())).await;
        assert_eq!(health.instances_tracked, 3);
        assert_eq!(health.global_errors, 1);
    }
}
