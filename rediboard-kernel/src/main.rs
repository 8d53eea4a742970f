/**
 * REDIBOARD KERNEL - Point d'entrée du service de découverte de topologie Redis
 *
 * RÔLE : Orchestration config -> cache -> premier pass -> refresh périodique -> HTTP.
 * Au Ctrl-C : arrêt du serveur HTTP puis écriture du cache.
 *
 * SORTIES EN ERREUR : config illisible/invalide, cache corrompu, bind impossible,
 * échec d'écriture du cache à l'arrêt. Les erreurs de poll ne font jamais quitter.
 */

mod cache;
mod config;
mod discovery;
mod freshness;
mod health;
mod http;
mod info;
mod models;
mod protocol;
mod resolver;
mod scheduler;
mod snapshot;
mod state;

use crate::cache::{read_cache, seed_instances, write_cache};
use crate::config::{config_path, load_config};
use crate::discovery::DiscoveryEngine;
use crate::freshness::FreshnessGate;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::resolver::{HostnameResolver, SystemLookup};
use crate::scheduler::Refresher;
use crate::snapshot::{Snapshot, SnapshotStore};

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // configuration
    let path = config_path();
    let cfg = load_config(&path)
        .await
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    info!(
        path = %path.display(),
        instances = cfg.instances.len(),
        expiration = ?cfg.expiration(),
        refresh = ?cfg.refresh(),
        timeout = ?cfg.connection_timeout(),
        "configuration loaded"
    );

    // cache -> snapshot initial
    let cached = read_cache(&cfg.cache.path).await.context("failed to read cache")?;
    let seeded = seed_instances(&cfg.instances, &cached);
    let store = Arc::new(SnapshotStore::new(Snapshot::new(seeded)));

    // moteur de découverte
    let lookup = SystemLookup::from_system_conf().context("failed to build DNS resolver")?;
    let engine = DiscoveryEngine::new(HostnameResolver::new(Arc::new(lookup)), cfg.connection_timeout());
    let health_tracker = HealthTracker::new();
    let refresher = Arc::new(Refresher::new(
        engine.clone(),
        FreshnessGate::new(cfg.expiration()),
        store.clone(),
        health_tracker.clone(),
    ));

    // premier pass avant d'ouvrir l'API, puis boucle périodique
    refresher.refresh().await;
    let refresh_task = refresher.clone().spawn(cfg.refresh());

    // HTTP
    let app = http::build_router(AppState { store: store.clone(), health_tracker });
    let listener = TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen))?;
    info!(addr = %cfg.listen, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    refresh_task.abort();
    let snapshot = store.load();
    info!(hostnames = engine.resolver().cached_names(), "shutting down, saving cache");
    write_cache(&cfg.cache.path, &snapshot.instances)
        .await
        .context("failed to write cache on shutdown")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("interrupt received");
}
