//! Per-release lock registry

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-(namespace, name) async locks
///
/// Two concurrent operations on the same release serialize on the same
/// mutex; operations on distinct releases never contend. Entries are never
/// removed; the map grows with the set of releases touched.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<(String, String), Arc<AsyncMutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a release, waiting if another holder exists
    pub async fn acquire(&self, namespace: &str, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("lock registry poisoned");
            locks
                .entry((namespace.to_string(), name.to_string()))
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_release_serializes() {
        let registry = Arc::new(LockRegistry::new());
        let in_section = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let in_section = in_section.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire("default", "myapp").await;
                let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_releases_do_not_contend() {
        let registry = LockRegistry::new();
        let guard_a = registry.acquire("default", "app-a").await;
        // Second acquire must not block on the first
        let guard_b = registry.acquire("default", "app-b").await;
        drop(guard_a);
        drop(guard_b);
    }
}
