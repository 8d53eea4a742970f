/**
 * REFRESH SCHEDULER - Pass de découverte périodique sur toute la flotte
 *
 * FONCTIONNEMENT :
 * - Boucle sleep -> pass, intervalle fixe commun à toutes les instances
 * - Un pass : chaque instance, dans l'ordre configuré et séquentiellement,
 *   passe par le FreshnessGate puis (si besoin) par le DiscoveryEngine
 * - Le Snapshot est construit à côté et publié seulement en fin de pass
 * - Erreurs : faute d'instance -> `errors` de l'instance ; faute
 *   d'environnement -> liste globale du snapshot
 */

use crate::discovery::DiscoveryEngine;
use crate::freshness::FreshnessGate;
use crate::health::HealthTracker;
use crate::models::{unix_now, Instance};
use crate::snapshot::{SharedStore, Snapshot};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct Refresher {
    engine: DiscoveryEngine,
    gate: FreshnessGate,
    store: SharedStore,
    health: HealthTracker,
}

impl Refresher {
    pub fn new(engine: DiscoveryEngine, gate: FreshnessGate, store: SharedStore, health: HealthTracker) -> Self {
        Self { engine, gate, store, health }
    }

    /// Passe sur `instances` et rend le snapshot complet, sans le publier
    pub async fn run_pass(&self, instances: Vec<Instance>) -> Snapshot {
        let started = Instant::now();
        let mut next = Snapshot::new(Vec::with_capacity(instances.len()));
        let (mut polled, mut skipped, mut failed) = (0, 0, 0);

        for mut instance in instances {
            let now = unix_now();
            if self.gate.should_skip(instance.last_updated, now) {
                debug!(instance = %instance, last_updated = instance.last_updated, "fresh, skipping");
                skipped += 1;
                next.instances.push(instance);
                continue;
            }

            polled += 1;
            if let Err(e) = self.engine.poll(&mut instance, now).await {
                failed += 1;
                if e.is_instance_fault() {
                    warn!(instance = %instance, stage = %e.stage(), error = %e, "poll failed");
                    instance.errors.push(e.to_string());
                } else {
                    error!(instance = %instance, error = %e, "environment error during poll");
                    next.errors.push(format!("{}: {}", instance.address(), e));
                }
            }
            next.instances.push(instance);
        }

        self.health
            .record_pass(unix_now(), started.elapsed(), polled, skipped, failed);
        info!(
            polled,
            skipped,
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "discovery pass done"
        );
        next
    }

    /// Pass sur le snapshot courant puis publication atomique
    pub async fn refresh(&self) {
        let current = self.store.load();
        let next = self.run_pass(current.instances.clone()).await;
        self.store.publish(next);
    }

    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        info!(interval = ?interval, "starting refresh loop");
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                self.refresh().await;
            }
        })
    }
}
