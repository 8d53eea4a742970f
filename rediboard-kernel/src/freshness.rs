use std::time::Duration;

/// Décide, instance par instance, si un poll est nécessaire à ce pass
#[derive(Debug, Clone, Copy)]
pub struct FreshnessGate {
    expiration: Duration,
}

impl FreshnessGate {
    pub fn new(expiration: Duration) -> Self {
        Self { expiration }
    }

    /// `last_updated == 0` : jamais initialisée, toujours pollée
    pub fn should_skip(&self, last_updated: i64, now: i64) -> bool {
        if last_updated == 0 {
            return false;
        }
        let age = now.saturating_sub(last_updated);
        i128::from(age) < self.expiration.as_secs() as i128
    }
}
