/**
 * SNAPSHOT STORE - Vue publiée de la flotte pour les lecteurs concurrents
 *
 * RÈGLES :
 * - Un seul écrivain (le pass du scheduler), N lecteurs (handlers HTTP)
 * - Le pass construit un Snapshot complet à côté puis le publie d'un coup
 *   (ArcSwap::store) : un lecteur voit l'ancien ou le nouveau,
 *   jamais un mélange de deux passes
 * - Un Snapshot publié est immuable
 */

use crate::models::Instance;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub instances: Vec<Instance>,
    pub errors: Vec<String>,
}

impl Snapshot {
    pub fn new(instances: Vec<Instance>) -> Self {
        Self { instances, errors: Vec::new() }
    }

    pub fn instance(&self, port: u16) -> Option<&Instance> {
        self.instances.iter().find(|i| i.port == port)
    }

    /// Noms d'hôtes résolus distincts, triés
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .instances
            .iter()
            .filter(|i| !i.host.is_empty())
            .map(|i| i.host.clone())
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    pub fn instances_on(&self, host: &str) -> Vec<&Instance> {
        self.instances.iter().filter(|i| i.host == host).collect()
    }
}

pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
}

pub type SharedStore = Arc<SnapshotStore>;

impl SnapshotStore {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Dernier snapshot complet, lecture sans verrou
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn publish(&self, next: Snapshot) {
        self.current.store(Arc::new(next));
    }
}
