//! Capstan Deploy - the release lifecycle engine
//!
//! This crate provides:
//! - **Release Store**: persistence for release headers and append-only
//!   revision histories, with in-memory and file drivers and per-release
//!   locking
//! - **Lifecycle Manager**: the install/upgrade/rollback/uninstall state
//!   machine and the engine's public surface
//! - **Deployment Orchestrator**: resource application with readiness
//!   waits and compensating reverse-apply for atomic operations
//! - **Collaborator traits**: the cluster, chart source, and renderer
//!   seams, plus mock implementations for testing

pub mod actions;
pub mod cluster;
pub mod error;
pub mod manager;
pub mod mock;
pub mod orchestrator;
pub mod release;
pub mod source;
pub mod store;

pub use actions::{InstallOptions, RollbackOptions, UninstallOptions, UpgradeOptions};
pub use cluster::{
    ApplyOutcome, ClusterInterface, ReadinessEvent, ReadinessStream, Resource, ResourceId,
    ResourceSet,
};
pub use error::{DeployError, Result};
pub use manager::ReleaseManager;
pub use mock::{ClusterOpCounts, ManifestRenderer, MockCluster, StaticChartSource};
pub use orchestrator::{
    ApplyRequest, ApplySummary, CancelHandle, CancelToken, DEFAULT_READY_TIMEOUT, Orchestrator,
    cancel_pair,
};
pub use release::{Release, ReleaseStatus, Revision, RevisionStatus};
pub use source::{ChartSource, Renderer};
pub use store::{
    CompressionMethod, FileStore, LockRegistry, MemoryStore, OperationCounts, ReleaseStore,
    StoreConfig,
};
