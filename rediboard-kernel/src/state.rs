use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

/// IP littérale -> nom résolu, jamais purgé
pub type HostnameCache = Shared<HashMap<IpAddr, String>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
