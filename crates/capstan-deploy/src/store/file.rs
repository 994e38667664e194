//! File-based store driver
//!
//! Stores release data in local files. Useful for development and testing
//! without a cluster, and for offline inspection of release history.
//!
//! Layout: `<base>/<namespace>/<name>/release.json` for the header and
//! `v<N>.json` per revision. Every write goes through a temp file and a
//! rename, so a concurrent reader never observes a partially written
//! record.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

use super::{
    CompressionMethod, LockRegistry, ReleaseStore, StoreConfig, apply_append, compress, decompress,
};
use crate::error::{DeployError, Result};
use crate::release::{Release, ReleaseStatus, Revision};

/// File-based release store
pub struct FileStore {
    /// Base directory for storing releases
    base_dir: PathBuf,
    config: StoreConfig,
    locks: Arc<LockRegistry>,
}

impl FileStore {
    /// Create a new file store, creating the base directory if needed
    pub fn new(base_dir: PathBuf, config: StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            config,
            locks: Arc::new(LockRegistry::new()),
        })
    }

    fn release_dir(&self, namespace: &str, name: &str) -> PathBuf {
        self.base_dir.join(namespace).join(name)
    }

    fn header_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.release_dir(namespace, name).join("release.json")
    }

    fn revision_path(&self, namespace: &str, name: &str, number: u32) -> PathBuf {
        self.release_dir(namespace, name)
            .join(format!("v{}.json", number))
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(value)?;
        compress(&json, self.config.compression)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        let json = decompress(data, self.config.compression)?;
        serde_json::from_slice(&json).map_err(|e| DeployError::Serialization(e.to_string()))
    }

    /// Write a record via temp file + rename
    fn write_record<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = self.encode(value)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_record<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let data = std::fs::read(path)?;
        self.decode(&data)
    }

    fn read_header(&self, namespace: &str, name: &str) -> Result<Release> {
        let path = self.header_path(namespace, name);
        if !path.exists() {
            return Err(DeployError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        }
        self.read_record(&path)
    }

    fn read_revisions(&self, namespace: &str, name: &str) -> Result<Vec<Revision>> {
        let dir = self.release_dir(namespace, name);
        let mut revisions: Vec<Revision> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with('v') && n.ends_with(".json"))
                    .unwrap_or(false)
            })
            .filter_map(|p| self.read_record(&p).ok())
            .collect();

        revisions.sort_by_key(|r: &Revision| r.number);
        Ok(revisions)
    }

    /// Remove empty namespace directory after a purge
    fn cleanup_namespace_dir(&self, namespace: &str) -> Result<()> {
        let ns_dir = self.base_dir.join(namespace);
        if ns_dir.exists() && std::fs::read_dir(&ns_dir)?.next().is_none() {
            let _ = std::fs::remove_dir(&ns_dir);
        }
        Ok(())
    }
}

#[async_trait]
impl ReleaseStore for FileStore {
    async fn create(&self, release: &Release) -> Result<()> {
        let path = self.header_path(&release.namespace, &release.name);

        let mut header = release.clone();
        if path.exists() {
            let existing: Release = self.read_record(&path)?;
            if existing.is_active() {
                return Err(DeployError::DuplicateReleaseName {
                    name: release.name.clone(),
                    namespace: release.namespace.clone(),
                });
            }
            // Reinstall over retained history keeps the original creation time
            header.created_at = existing.created_at;
        }

        self.write_record(&path, &header)
    }

    async fn append_revision(
        &self,
        namespace: &str,
        name: &str,
        revision: Revision,
    ) -> Result<()> {
        let mut release = self.read_header(namespace, name)?;
        let mut revisions = self.read_revisions(namespace, name)?;
        let number = revision.number;

        let superseded = apply_append(&mut release, &mut revisions, revision)?;

        // Revisions first, header last: the header only ever points at
        // records that are already durable
        self.write_record(
            &self.revision_path(namespace, name, number),
            revisions.last().expect("just appended"),
        )?;
        for prior in &revisions {
            if superseded.contains(&prior.number) {
                self.write_record(&self.revision_path(namespace, name, prior.number), prior)?;
            }
        }
        self.write_record(&self.header_path(namespace, name), &release)
    }

    async fn set_status(&self, namespace: &str, name: &str, status: ReleaseStatus) -> Result<()> {
        let mut release = self.read_header(namespace, name)?;
        release.status = status;
        release.updated_at = chrono::Utc::now();
        self.write_record(&self.header_path(namespace, name), &release)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Release> {
        self.read_header(namespace, name)
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Revision>> {
        // Header existence defines release existence
        self.read_header(namespace, name)?;
        self.read_revisions(namespace, name)
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        status: Option<ReleaseStatus>,
    ) -> Result<Vec<Release>> {
        let namespaces: Vec<PathBuf> = if let Some(ns) = namespace {
            let path = self.base_dir.join(ns);
            if path.exists() { vec![path] } else { vec![] }
        } else {
            std::fs::read_dir(&self.base_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect()
        };

        let mut releases = Vec::new();
        for ns_path in namespaces {
            for entry in std::fs::read_dir(&ns_path)? {
                let Ok(entry) = entry else { continue };
                let header = entry.path().join("release.json");
                if !header.exists() {
                    continue;
                }
                if let Ok(release) = self.read_record::<Release>(&header) {
                    if status.map(|s| release.status == s).unwrap_or(true) {
                        releases.push(release);
                    }
                }
            }
        }

        releases.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        Ok(releases)
    }

    async fn purge(&self, namespace: &str, name: &str) -> Result<()> {
        let dir = self.release_dir(namespace, name);
        if !dir.exists() {
            return Err(DeployError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        }

        std::fs::remove_dir_all(&dir)?;
        self.cleanup_namespace_dir(namespace)
    }

    async fn mark_uninstalled(&self, namespace: &str, name: &str) -> Result<()> {
        self.set_status(namespace, name, ReleaseStatus::Uninstalled)
            .await
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
    use tempfile::TempDir;

    fn test_release(name: &str) -> Release {
        Release::for_install(
            name,
            "default",
            ChartRef::new("web", Version::new(1, 0, 0)),
            Values::new(),
            1,
        )
    }

    fn deployed_revision(number: u32) -> Revision {
        Revision::deployed(
            number,
            ChartRef::new("web", Version::new(1, 0, 0)),
            Values::from_yaml("replicas: 1").unwrap(),
            Default::default(),
            "Install complete",
        )
    }

    fn store(tmp: &TempDir) -> FileStore {
        FileStore::new(tmp.path().to_path_buf(), StoreConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.create(&test_release("myapp")).await.unwrap();

        let release = store.get("default", "myapp").await.unwrap();
        assert_eq!(release.name, "myapp");
        assert_eq!(release.status, ReleaseStatus::PendingInstall);
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.create(&test_release("myapp")).await.unwrap();
        let result = store.create(&test_release("myapp")).await;
        assert!(matches!(
            result,
            Err(DeployError::DuplicateReleaseName { .. })
        ));
    }

    #[tokio::test]
    async fn test_append_and_history() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.create(&test_release("myapp")).await.unwrap();
        store
            .append_revision("default", "myapp", deployed_revision(1))
            .await
            .unwrap();
        store
            .append_revision("default", "myapp", deployed_revision(2))
            .await
            .unwrap();

        let history = store.history("default", "myapp").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].number, 1);
        assert_eq!(history[0].status, RevisionStatus::Superseded);
        assert_eq!(history[1].status, RevisionStatus::Deployed);

        let release = store.get("default", "myapp").await.unwrap();
        assert_eq!(release.current_revision, 2);
        assert_eq!(release.status, ReleaseStatus::Deployed);
    }

    #[tokio::test]
    async fn test_history_missing_release() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let result = store.history("default", "ghost").await;
        assert!(matches!(result, Err(DeployError::ReleaseNotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.create(&test_release("app1")).await.unwrap();
        store
            .append_revision("default", "app1", deployed_revision(1))
            .await
            .unwrap();
        store.create(&test_release("app2")).await.unwrap();

        let all = store.list(None, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let deployed = store
            .list(Some("default"), Some(ReleaseStatus::Deployed))
            .await
            .unwrap();
        assert_eq!(deployed.len(), 1);
        assert_eq!(deployed[0].name, "app1");

        let other_ns = store.list(Some("staging"), None).await.unwrap();
        assert!(other_ns.is_empty());
    }

    #[tokio::test]
    async fn test_purge_removes_everything() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.create(&test_release("myapp")).await.unwrap();
        store
            .append_revision("default", "myapp", deployed_revision(1))
            .await
            .unwrap();

        store.purge("default", "myapp").await.unwrap();

        assert!(store.get("default", "myapp").await.is_err());
        assert!(!tmp.path().join("default").exists());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let tmp = TempDir::new().unwrap();

        {
            let store = store(&tmp);
            store.create(&test_release("myapp")).await.unwrap();
            store
                .append_revision("default", "myapp", deployed_revision(1))
                .await
                .unwrap();
        }

        let reopened = store(&tmp);
        let release = reopened.get("default", "myapp").await.unwrap();
        assert_eq!(release.current_revision, 1);
        let history = reopened.history("default", "myapp").await.unwrap();
        assert_eq!(history[0].config.get("replicas").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_uncompressed_store() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(
            tmp.path().to_path_buf(),
            StoreConfig {
                compression: CompressionMethod::None,
            },
        )
        .unwrap();

        store.create(&test_release("myapp")).await.unwrap();
        let release = store.get("default", "myapp").await.unwrap();
        assert_eq!(release.name, "myapp");
    }
}
