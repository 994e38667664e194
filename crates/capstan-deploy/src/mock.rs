//! Mock collaborators for testing
//!
//! These stand in for the external cluster, chart source, and renderer so
//! the engine can be exercised without any real infrastructure. The mock
//! cluster supports failure injection (per-resource rejections, resources
//! that never report ready) and records every apply and delete for
//! assertions.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use capstan_core::{Chart, ReleaseContext, Values, VersionSpec};

use crate::cluster::{
    ApplyOutcome, ClusterInterface, ReadinessEvent, ReadinessStream, Resource, ResourceId,
    ResourceSet,
};
use crate::error::{DeployError, Result};
use crate::source::{ChartSource, Renderer};

/// In-memory cluster double with failure injection
#[derive(Clone, Default)]
pub struct MockCluster {
    inner: Arc<RwLock<MockClusterState>>,
}

#[derive(Default)]
struct MockClusterState {
    /// Resources currently present, keyed by display name
    live: BTreeMap<String, Resource>,
    /// Every resource ever applied, in order
    applied_log: Vec<ResourceId>,
    /// Every resource ever deleted, in order
    deleted_log: Vec<ResourceId>,
    /// Resource name -> rejection reason
    rejections: HashMap<String, String>,
    /// Resource names that never report ready
    unready: HashSet<String>,
    /// Namespaces ensured so far
    namespaces: HashSet<String>,
    counts: ClusterOpCounts,
}

/// Counts of cluster calls, for test assertions
#[derive(Debug, Default, Clone)]
pub struct ClusterOpCounts {
    pub applies: usize,
    pub deletes: usize,
    pub watches: usize,
    pub namespace_ensures: usize,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any resource with this name, with the given reason
    pub fn reject(&self, resource_name: &str, reason: &str) {
        let mut state = self.inner.write().expect("mock cluster poisoned");
        state
            .rejections
            .insert(resource_name.to_string(), reason.to_string());
    }

    /// Remove all configured rejections
    pub fn clear_rejections(&self) {
        let mut state = self.inner.write().expect("mock cluster poisoned");
        state.rejections.clear();
    }

    /// Make a resource never report ready
    pub fn hold_unready(&self, resource_name: &str) {
        let mut state = self.inner.write().expect("mock cluster poisoned");
        state.unready.insert(resource_name.to_string());
    }

    /// Display names of resources currently present, sorted
    pub fn live_resources(&self) -> Vec<String> {
        let state = self.inner.read().expect("mock cluster poisoned");
        state.live.keys().cloned().collect()
    }

    /// Every resource applied so far, in order
    pub fn applied_log(&self) -> Vec<ResourceId> {
        self.inner
            .read()
            .expect("mock cluster poisoned")
            .applied_log
            .clone()
    }

    /// Every resource deleted so far, in order
    pub fn deleted_log(&self) -> Vec<ResourceId> {
        self.inner
            .read()
            .expect("mock cluster poisoned")
            .deleted_log
            .clone()
    }

    /// Namespaces ensured so far
    pub fn namespaces(&self) -> Vec<String> {
        let state = self.inner.read().expect("mock cluster poisoned");
        let mut namespaces: Vec<String> = state.namespaces.iter().cloned().collect();
        namespaces.sort();
        namespaces
    }

    pub fn operation_counts(&self) -> ClusterOpCounts {
        self.inner
            .read()
            .expect("mock cluster poisoned")
            .counts
            .clone()
    }
}

#[async_trait]
impl ClusterInterface for MockCluster {
    async fn apply_resource_set(
        &self,
        _namespace: &str,
        set: &ResourceSet,
    ) -> Result<Vec<ApplyOutcome>> {
        let mut state = self.inner.write().expect("mock cluster poisoned");
        state.counts.applies += 1;

        let mut outcomes = Vec::with_capacity(set.len());
        for resource in set.iter() {
            if let Some(reason) = state.rejections.get(&resource.id.name) {
                outcomes.push(ApplyOutcome::Rejected {
                    resource: resource.id.clone(),
                    reason: reason.clone(),
                });
                continue;
            }

            let created = state
                .live
                .insert(resource.id.to_string(), resource.clone())
                .is_none();
            state.applied_log.push(resource.id.clone());
            outcomes.push(ApplyOutcome::Applied {
                resource: resource.id.clone(),
                created,
            });
        }

        Ok(outcomes)
    }

    async fn delete_resource_set(&self, _namespace: &str, set: &ResourceSet) -> Result<()> {
        let mut state = self.inner.write().expect("mock cluster poisoned");
        state.counts.deletes += 1;

        for resource in set.iter() {
            state.live.remove(&resource.id.to_string());
            state.deleted_log.push(resource.id.clone());
        }

        Ok(())
    }

    async fn watch_readiness(
        &self,
        _namespace: &str,
        set: &ResourceSet,
    ) -> Result<ReadinessStream> {
        let events: Vec<ReadinessEvent> = {
            let mut state = self.inner.write().expect("mock cluster poisoned");
            state.counts.watches += 1;

            set.iter()
                .filter(|r| !state.unready.contains(&r.id.name))
                .map(|r| ReadinessEvent {
                    resource: r.id.clone(),
                    ready: true,
                    message: None,
                })
                .collect()
        };

        // Held-back resources simply never produce an event, so consumers
        // exercise their timeout path
        Ok(stream::iter(events).chain(stream::pending()).boxed())
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        let mut state = self.inner.write().expect("mock cluster poisoned");
        state.counts.namespace_ensures += 1;
        state.namespaces.insert(namespace.to_string());
        Ok(())
    }
}

/// Chart source backed by a fixed in-memory catalog
#[derive(Clone, Default)]
pub struct StaticChartSource {
    charts: Arc<RwLock<HashMap<String, Vec<Chart>>>>,
}

impl StaticChartSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chart version to the catalog
    pub fn add(&self, chart: Chart) {
        let mut charts = self.charts.write().expect("chart catalog poisoned");
        charts
            .entry(chart.reference.name.clone())
            .or_default()
            .push(chart);
    }
}

#[async_trait]
impl ChartSource for StaticChartSource {
    async fn fetch_chart(&self, name: &str, version: &VersionSpec) -> Result<Chart> {
        let charts = self.charts.read().expect("chart catalog poisoned");
        let not_found = || DeployError::ChartNotFound {
            name: name.to_string(),
            version: version.to_string(),
        };

        let versions = charts.get(name).ok_or_else(not_found)?;
        let chart = match version {
            VersionSpec::Latest => versions
                .iter()
                .max_by(|a, b| a.reference.version.cmp(&b.reference.version)),
            VersionSpec::Exact(v) => versions.iter().find(|c| c.reference.version == *v),
        };

        chart.cloned().ok_or_else(not_found)
    }
}

/// Renderer for charts whose templates are literal manifests
///
/// Real template expansion is an external collaborator; this renderer
/// parses each template file as a stream of YAML documents and reads the
/// resource identity from `kind` and `metadata.name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestRenderer;

impl Renderer for ManifestRenderer {
    fn render(
        &self,
        chart: &Chart,
        _values: &Values,
        context: &ReleaseContext,
    ) -> Result<ResourceSet> {
        let mut set = ResourceSet::new();

        for file in &chart.templates {
            for doc in file.content.split("---") {
                let doc = doc.trim();
                if doc.is_empty()
                    || doc
                        .lines()
                        .all(|l| l.trim().is_empty() || l.trim().starts_with('#'))
                {
                    continue;
                }

                let manifest: serde_json::Value = serde_yaml::from_str(doc)
                    .map_err(|e| DeployError::Render(format!("{}: {}", file.path, e)))?;

                let kind = manifest
                    .get("kind")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        DeployError::Render(format!("{}: document missing kind", file.path))
                    })?
                    .to_string();
                let name = manifest
                    .pointer("/metadata/name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        DeployError::Render(format!(
                            "{}: document missing metadata.name",
                            file.path
                        ))
                    })?
                    .to_string();

                set.push(Resource {
                    id: ResourceId::namespaced(kind, name, context.namespace.clone()),
                    manifest,
                });
            }
        }

        Ok(set)
    }
}
