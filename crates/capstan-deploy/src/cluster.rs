//! Cluster interface and the resource model it operates on
//!
//! Actual cluster communication lives behind `ClusterInterface`; this
//! engine only decides what to apply, what to delete, and what to wait
//! for. Rejections reported by the cluster are surfaced verbatim.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;

/// Identity of a single resource within a cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    /// Resource kind
    pub kind: String,

    /// Resource name
    pub name: String,

    /// Resource namespace (None for cluster-scoped)
    pub namespace: Option<String>,
}

impl ResourceId {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    pub fn namespaced(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", ns, self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// A single desired resource: identity plus its rendered manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub manifest: JsonValue,
}

/// An ordered set of desired resources for one release operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSet {
    resources: Vec<Resource>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Resource> {
        self.resources.iter()
    }

    /// Identities of every resource in the set, in order
    pub fn ids(&self) -> Vec<ResourceId> {
        self.resources.iter().map(|r| r.id.clone()).collect()
    }
}

impl FromIterator<Resource> for ResourceSet {
    fn from_iter<T: IntoIterator<Item = Resource>>(iter: T) -> Self {
        Self {
            resources: iter.into_iter().collect(),
        }
    }
}

/// Per-resource result of an apply call
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Resource was applied; `created` distinguishes create from update
    Applied { resource: ResourceId, created: bool },

    /// Cluster refused the resource (e.g. a port conflict)
    Rejected { resource: ResourceId, reason: String },
}

/// One readiness report for a watched resource
#[derive(Debug, Clone)]
pub struct ReadinessEvent {
    pub resource: ResourceId,
    pub ready: bool,
    pub message: Option<String>,
}

/// Stream of readiness events for a watched resource set
pub type ReadinessStream = BoxStream<'static, ReadinessEvent>;

/// Interface to the target cluster
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ClusterInterface: Send + Sync {
    /// Apply a resource set, returning one outcome per resource
    async fn apply_resource_set(
        &self,
        namespace: &str,
        set: &ResourceSet,
    ) -> Result<Vec<ApplyOutcome>>;

    /// Delete a resource set, in the order given; missing resources are not an error
    async fn delete_resource_set(&self, namespace: &str, set: &ResourceSet) -> Result<()>;

    /// Watch readiness of a resource set
    ///
    /// The stream yields events until every resource has reported ready at
    /// least once, or indefinitely if some never do; consumers bound the
    /// wait with their own timeout.
    async fn watch_readiness(&self, namespace: &str, set: &ResourceSet) -> Result<ReadinessStream>;

    /// Create the namespace if it does not already exist
    async fn ensure_namespace(&self, namespace: &str) -> Result<()>;
}
