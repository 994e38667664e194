//! In-memory store driver
//!
//! The default driver for tests and for embedding the engine without any
//! persistence medium. Tracks operation counts for test assertions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::OwnedMutexGuard;

use super::{LockRegistry, ReleaseStore, apply_append};
use crate::error::{DeployError, Result};
use crate::release::{Release, ReleaseStatus, Revision};

/// One release with its revision history
#[derive(Debug, Clone)]
struct ReleaseRecord {
    release: Release,
    revisions: Vec<Revision>,
}

/// In-memory release store
#[derive(Clone, Default)]
pub struct MemoryStore {
    /// Storage: namespace -> name -> record
    store: Arc<RwLock<HashMap<String, HashMap<String, ReleaseRecord>>>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
    /// Per-release locks
    locks: Arc<LockRegistry>,
}

/// Counts of operations performed, for test assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub appends: usize,
    pub status_updates: usize,
    pub purges: usize,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().expect("store lock poisoned").clone()
    }

    /// Count releases across all namespaces
    pub fn release_count(&self) -> usize {
        let store = self.store.read().expect("store lock poisoned");
        store.values().map(|ns| ns.len()).sum()
    }

    fn with_record<T>(
        &self,
        namespace: &str,
        name: &str,
        f: impl FnOnce(&mut ReleaseRecord) -> Result<T>,
    ) -> Result<T> {
        let mut store = self.store.write().expect("store lock poisoned");
        let record = store
            .get_mut(namespace)
            .and_then(|ns| ns.get_mut(name))
            .ok_or_else(|| DeployError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })?;
        f(record)
    }
}

#[async_trait]
impl ReleaseStore for MemoryStore {
    async fn create(&self, release: &Release) -> Result<()> {
        self.operations.write().expect("store lock poisoned").creates += 1;

        let mut store = self.store.write().expect("store lock poisoned");
        let names = store.entry(release.namespace.clone()).or_default();

        match names.get_mut(&release.name) {
            Some(record) if record.release.is_active() => Err(DeployError::DuplicateReleaseName {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
            }),
            Some(record) => {
                // Reinstall over retained history: keep revisions and the
                // original creation timestamp
                let created_at = record.release.created_at;
                record.release = release.clone();
                record.release.created_at = created_at;
                Ok(())
            }
            None => {
                names.insert(
                    release.name.clone(),
                    ReleaseRecord {
                        release: release.clone(),
                        revisions: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn append_revision(
        &self,
        namespace: &str,
        name: &str,
        revision: Revision,
    ) -> Result<()> {
        self.operations.write().expect("store lock poisoned").appends += 1;

        self.with_record(namespace, name, |record| {
            apply_append(&mut record.release, &mut record.revisions, revision).map(|_| ())
        })
    }

    async fn set_status(&self, namespace: &str, name: &str, status: ReleaseStatus) -> Result<()> {
        self.operations
            .write()
            .expect("store lock poisoned")
            .status_updates += 1;

        self.with_record(namespace, name, |record| {
            record.release.status = status;
            record.release.updated_at = chrono::Utc::now();
            Ok(())
        })
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Release> {
        self.operations.write().expect("store lock poisoned").gets += 1;

        let store = self.store.read().expect("store lock poisoned");
        store
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .map(|record| record.release.clone())
            .ok_or_else(|| DeployError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Revision>> {
        self.operations.write().expect("store lock poisoned").lists += 1;

        let store = self.store.read().expect("store lock poisoned");
        store
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .map(|record| record.revisions.clone())
            .ok_or_else(|| DeployError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        status: Option<ReleaseStatus>,
    ) -> Result<Vec<Release>> {
        self.operations.write().expect("store lock poisoned").lists += 1;

        let store = self.store.read().expect("store lock poisoned");
        let mut releases: Vec<Release> = store
            .iter()
            .filter(|(ns, _)| namespace.map(|n| n == *ns).unwrap_or(true))
            .flat_map(|(_, names)| names.values())
            .filter(|record| status.map(|s| record.release.status == s).unwrap_or(true))
            .map(|record| record.release.clone())
            .collect();

        releases.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        Ok(releases)
    }

    async fn purge(&self, namespace: &str, name: &str) -> Result<()> {
        self.operations.write().expect("store lock poisoned").purges += 1;

        let mut store = self.store.write().expect("store lock poisoned");
        let removed = store
            .get_mut(namespace)
            .and_then(|ns| ns.remove(name))
            .is_some();

        if !removed {
            return Err(DeployError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        }

        if store.get(namespace).is_some_and(|ns| ns.is_empty()) {
            store.remove(namespace);
        }

        Ok(())
    }

    async fn mark_uninstalled(&self, namespace: &str, name: &str) -> Result<()> {
        self.operations
            .write()
            .expect("store lock poisoned")
            .status_updates += 1;

        self.with_record(namespace, name, |record| {
            record.release.status = ReleaseStatus::Uninstalled;
            record.release.updated_at = chrono::Utc::now();
            Ok(())
        })
    }

    async fn lock_release(&self, namespace: &str, name: &str) -> OwnedMutexGuard<()> {
        self.locks.acquire(namespace, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::RevisionStatus;
    use capstan_core::{ChartRef, Values};
    use semver::Version;

    fn test_release(name: &str, namespace: &str) -> Release {
        Release::for_install(
            name,
            namespace,
            ChartRef::new("web", Version::new(1, 0, 0)),
            Values::new(),
            1,
        )
    }

    fn deployed_revision(number: u32) -> Revision {
        Revision::deployed(
            number,
            ChartRef::new("web", Version::new(1, 0, 0)),
            Values::new(),
            Default::default(),
            "Install complete",
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();

        store.create(&test_release("myapp", "default")).await.unwrap();

        let release = store.get("default", "myapp").await.unwrap();
        assert_eq!(release.name, "myapp");
        assert_eq!(release.status, ReleaseStatus::PendingInstall);

        let counts = store.operation_counts();
        assert_eq!(counts.creates, 1);
        assert_eq!(counts.gets, 1);
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let store = MemoryStore::new();

        store.create(&test_release("myapp", "default")).await.unwrap();

        let result = store.create(&test_release("myapp", "default")).await;
        assert!(matches!(
            result,
            Err(DeployError::DuplicateReleaseName { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_over_uninstalled_keeps_history() {
        let store = MemoryStore::new();

        store.create(&test_release("myapp", "default")).await.unwrap();
        store
            .append_revision("default", "myapp", deployed_revision(1))
            .await
            .unwrap();
        store.mark_uninstalled("default", "myapp").await.unwrap();

        let mut reinstall = test_release("myapp", "default");
        reinstall.current_revision = 2;
        store.create(&reinstall).await.unwrap();

        let history = store.history("default", "myapp").await.unwrap();
        assert_eq!(history.len(), 1);
        let release = store.get("default", "myapp").await.unwrap();
        assert_eq!(release.current_revision, 2);
        assert_eq!(release.status, ReleaseStatus::PendingInstall);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let store = MemoryStore::new();

        let result = store.get("default", "nonexistent").await;
        assert!(matches!(result, Err(DeployError::ReleaseNotFound { .. })));
    }

    #[tokio::test]
    async fn test_append_updates_header_and_supersedes() {
        let store = MemoryStore::new();

        store.create(&test_release("myapp", "default")).await.unwrap();
        store
            .append_revision("default", "myapp", deployed_revision(1))
            .await
            .unwrap();
        store
            .append_revision("default", "myapp", deployed_revision(2))
            .await
            .unwrap();

        let release = store.get("default", "myapp").await.unwrap();
        assert_eq!(release.current_revision, 2);
        assert_eq!(release.status, ReleaseStatus::Deployed);

        let history = store.history("default", "myapp").await.unwrap();
        assert_eq!(history[0].status, RevisionStatus::Superseded);
        assert_eq!(history[1].status, RevisionStatus::Deployed);
    }

    #[tokio::test]
    async fn test_append_missing_release() {
        let store = MemoryStore::new();

        let result = store
            .append_revision("default", "ghost", deployed_revision(1))
            .await;
        assert!(matches!(result, Err(DeployError::ReleaseNotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_by_namespace_and_status() {
        let store = MemoryStore::new();

        store.create(&test_release("app1", "default")).await.unwrap();
        store
            .append_revision("default", "app1", deployed_revision(1))
            .await
            .unwrap();
        store.create(&test_release("app2", "default")).await.unwrap();
        store.create(&test_release("app1", "staging")).await.unwrap();

        let in_default = store.list(Some("default"), None).await.unwrap();
        assert_eq!(in_default.len(), 2);

        let all = store.list(None, None).await.unwrap();
        assert_eq!(all.len(), 3);

        let deployed = store
            .list(None, Some(ReleaseStatus::Deployed))
            .await
            .unwrap();
        assert_eq!(deployed.len(), 1);
        assert_eq!(deployed[0].name, "app1");
        assert_eq!(deployed[0].namespace, "default");
    }

    #[tokio::test]
    async fn test_purge() {
        let store = MemoryStore::new();

        store.create(&test_release("myapp", "default")).await.unwrap();
        store
            .append_revision("default", "myapp", deployed_revision(1))
            .await
            .unwrap();

        store.purge("default", "myapp").await.unwrap();

        assert!(store.get("default", "myapp").await.is_err());
        assert!(store.history("default", "myapp").await.is_err());
        assert_eq!(store.release_count(), 0);
    }

    #[tokio::test]
    async fn test_mark_uninstalled_retains_revisions() {
        let store = MemoryStore::new();

        store.create(&test_release("myapp", "default")).await.unwrap();
        store
            .append_revision("default", "myapp", deployed_revision(1))
            .await
            .unwrap();

        store.mark_uninstalled("default", "myapp").await.unwrap();

        let release = store.get("default", "myapp").await.unwrap();
        assert_eq!(release.status, ReleaseStatus::Uninstalled);
        assert_eq!(store.history("default", "myapp").await.unwrap().len(), 1);
    }
}
