//! Release store: persistence for release headers and revision histories
//!
//! Two drivers ship with the engine:
//! - **Memory**: in-process storage, the default for tests and embedding
//! - **File**: local files, one directory per release, one file per revision
//!
//! Every mutation goes through `create`/`append_revision`/`set_status`/
//! `mark_uninstalled`/`purge`, each atomic with respect to concurrent
//! reads. Callers serialize whole operations on the same release through
//! `lock_release`; operations on distinct releases proceed independently.

mod file;
mod lock;
mod memory;

pub use file::FileStore;
pub use lock::LockRegistry;
pub use memory::{MemoryStore, OperationCounts};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use crate::error::{DeployError, Result};
use crate::release::{Release, ReleaseStatus, Revision, RevisionStatus};

/// Storage trait for release persistence
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Create a release header
    ///
    /// Fails with `DuplicateReleaseName` if an active release with the same
    /// (name, namespace) exists. Creating over an uninstalled release keeps
    /// its revision history and original creation timestamp.
    async fn create(&self, release: &Release) -> Result<()>;

    /// Atomically append a revision and refresh the release header from it
    ///
    /// Revision numbers must stay contiguous from 1. Appending a deployed
    /// or uninstalled revision supersedes the previously deployed one.
    async fn append_revision(&self, namespace: &str, name: &str, revision: Revision)
    -> Result<()>;

    /// Persist a status change without touching the revision history
    async fn set_status(&self, namespace: &str, name: &str, status: ReleaseStatus) -> Result<()>;

    /// Get a release header
    async fn get(&self, namespace: &str, name: &str) -> Result<Release>;

    /// Get the full revision history, ascending by revision number
    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Revision>>;

    /// List release headers, optionally filtered by namespace and/or status
    async fn list(
        &self,
        namespace: Option<&str>,
        status: Option<ReleaseStatus>,
    ) -> Result<Vec<Release>>;

    /// Delete a release and all its revisions irrevocably
    async fn purge(&self, namespace: &str, name: &str) -> Result<()>;

    /// Set the release status to uninstalled, retaining all revisions
    async fn mark_uninstalled(&self, namespace: &str, name: &str) -> Result<()>;

    /// Acquire the per-release mutex; the guard serializes whole operations
    async fn lock_release(&self, namespace: &str, name: &str) -> OwnedMutexGuard<()>;
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Compression applied to records at rest (file driver only)
    pub compression: CompressionMethod,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::Zstd { level: 3 },
        }
    }
}

/// Compression method for stored records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression
    None,

    /// Zstd compression
    Zstd { level: i32 },
}

impl Default for CompressionMethod {
    fn default() -> Self {
        Self::Zstd { level: 3 }
    }
}

/// Compress data using the configured method
pub(crate) fn compress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Zstd { level } => zstd::encode_all(std::io::Cursor::new(data), level)
            .map_err(|e| DeployError::Compression(e.to_string())),
    }
}

/// Decompress data
pub(crate) fn decompress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Zstd { .. } => zstd::decode_all(std::io::Cursor::new(data))
            .map_err(|e| DeployError::Compression(e.to_string())),
    }
}

/// Apply append semantics to an in-memory view of a release record
///
/// Validates contiguity, supersedes the previously deployed revision when
/// the new one is deployed or uninstalled, refreshes the header, and pushes
/// the revision. Returns the numbers of prior revisions whose status
/// changed, so file-backed drivers know which records to rewrite.
pub(crate) fn apply_append(
    release: &mut Release,
    revisions: &mut Vec<Revision>,
    revision: Revision,
) -> Result<Vec<u32>> {
    let expected = revisions.last().map(|r| r.number + 1).unwrap_or(1);
    if revision.number != expected {
        return Err(DeployError::Storage(format!(
            "revision {} for release '{}' breaks contiguous numbering (expected {})",
            revision.number, release.name, expected
        )));
    }

    let Some(release_status) = revision.status.release_status() else {
        return Err(DeployError::Storage(format!(
            "cannot append revision {} with status '{}'",
            revision.number, revision.status
        )));
    };

    let mut superseded = Vec::new();
    if matches!(
        revision.status,
        RevisionStatus::Deployed | RevisionStatus::Uninstalled
    ) {
        for prior in revisions.iter_mut() {
            if prior.status == RevisionStatus::Deployed {
                prior.status = RevisionStatus::Superseded;
                superseded.push(prior.number);
            }
        }
    }

    release.current_revision = revision.number;
    release.status = release_status;
    release.chart = revision.chart.clone();
    release.config = revision.config.clone();
    release.updated_at = revision.created_at;
    revisions.push(revision);

    Ok(superseded)
}
