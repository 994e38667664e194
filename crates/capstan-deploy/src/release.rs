//! Release and revision records

use capstan_core::{ChartRef, Values};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::cluster::ResourceSet;

/// A named, namespaced instance of a deployed chart
///
/// The release header tracks the identity and the state of the most recent
/// operation; the full record of every operation lives in the revision list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Release name, unique within its namespace
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Revision number the in-flight or last-committed operation refers to
    pub current_revision: u32,

    /// Current status
    pub status: ReleaseStatus,

    /// Chart reference in effect
    pub chart: ChartRef,

    /// Effective configuration snapshot
    pub config: Values,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Release {
    /// Create a release header for a new install, in pending-install state
    pub fn for_install(
        name: impl Into<String>,
        namespace: impl Into<String>,
        chart: ChartRef,
        config: Values,
        revision: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            namespace: namespace.into(),
            current_revision: revision,
            status: ReleaseStatus::PendingInstall,
            chart,
            config,
            created_at: now,
            updated_at: now,
        }
    }

    /// An active release blocks installs under the same (name, namespace)
    pub fn is_active(&self) -> bool {
        self.status != ReleaseStatus::Uninstalled
    }

    /// Check if an operation currently holds this release
    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }
}

/// Release status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ReleaseStatus {
    PendingInstall,
    PendingUpgrade,
    Deployed,
    Failed,
    Uninstalled,
}

impl ReleaseStatus {
    /// Check if this is a pending (transitional) status
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::PendingInstall | Self::PendingUpgrade)
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
            Self::Uninstalled => "uninstalled",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ReleaseStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending-install" => Ok(Self::PendingInstall),
            "pending-upgrade" => Ok(Self::PendingUpgrade),
            "deployed" => Ok(Self::Deployed),
            "failed" => Ok(Self::Failed),
            "uninstalled" => Ok(Self::Uninstalled),
            _ => Err(format!("unknown release status: {}", s)),
        }
    }
}

/// One immutable historical record of a release operation
///
/// Revisions are append-only. Content never changes after commit; only the
/// status moves (deployed -> superseded when a newer revision takes over).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    /// Revision number, contiguous from 1 within a release
    pub number: u32,

    /// Status of this revision
    pub status: RevisionStatus,

    /// Chart reference used
    pub chart: ChartRef,

    /// Fully resolved configuration used
    pub config: Values,

    /// Resource set this revision applied (empty for uninstall records)
    pub resources: ResourceSet,

    /// Human-readable description ("Install complete", "Rollback to 2", ...)
    pub description: String,

    /// Timestamp of the recording
    pub created_at: DateTime<Utc>,
}

impl Revision {
    /// Record a successfully deployed revision
    pub fn deployed(
        number: u32,
        chart: ChartRef,
        config: Values,
        resources: ResourceSet,
        description: impl Into<String>,
    ) -> Self {
        Self {
            number,
            status: RevisionStatus::Deployed,
            chart,
            config,
            resources,
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    /// Record a failed operation, keeping the attempted resource set so a
    /// later uninstall can clean up partial state
    pub fn failed(
        number: u32,
        chart: ChartRef,
        config: Values,
        resources: ResourceSet,
        description: impl Into<String>,
    ) -> Self {
        Self {
            number,
            status: RevisionStatus::Failed,
            chart,
            config,
            resources,
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    /// Record an uninstall; nothing remains deployed
    pub fn uninstalled(
        number: u32,
        chart: ChartRef,
        config: Values,
        description: impl Into<String>,
    ) -> Self {
        Self {
            number,
            status: RevisionStatus::Uninstalled,
            chart,
            config,
            resources: ResourceSet::default(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

/// Status a revision carries in the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevisionStatus {
    Deployed,
    Superseded,
    Failed,
    Uninstalled,
}

impl RevisionStatus {
    /// The release status a freshly appended revision implies
    pub(crate) fn release_status(&self) -> Option<ReleaseStatus> {
        match self {
            Self::Deployed => Some(ReleaseStatus::Deployed),
            Self::Failed => Some(ReleaseStatus::Failed),
            Self::Uninstalled => Some(ReleaseStatus::Uninstalled),
            // Revisions are never appended already superseded
            Self::Superseded => None,
        }
    }
}

impl std::fmt::Display for RevisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Deployed => "deployed",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
            Self::Uninstalled => "uninstalled",
        };
        write!(f, "{}", s)
    }
}
