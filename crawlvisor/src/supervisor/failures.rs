//! Consecutive-failure counts backing the circuit breaker.
//!
//! Kept in memory only; a supervisor restart closes every breaker.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct FailureCounter {
    counts: Mutex<HashMap<String, u32>>,
}

impl FailureCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> u32 {
        self.counts.lock().await.get(name).copied().unwrap_or(0)
    }

    /// Count one more failure and return the new total.
    pub async fn increment(&self, name: &str) -> u32 {
        let mut counts = self.counts.lock().await;
        let count = counts.entry(name.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub async fn reset(&self, name: &str) {
        self.counts.lock().await.remove(name);
    }

    /// Non-zero counts, ordered by job name.
    pub async fn snapshot(&self) -> BTreeMap<String, u32> {
        self.counts
            .lock()
            .await
            .iter()
            .filter(|(_, &count)| count > 0)
            .map(|(name, &count)| (name.clone(), count))
            .collect()
    }
}
