//! Deployment orchestrator: apply, wait for readiness, reverse on failure
//!
//! The orchestrator holds no persistent state. During an operation it keeps
//! an undo log of every resource it created; on failure in atomic mode it
//! replays that log in reverse (delete what was created, re-apply the
//! previous revision's set to revert changes) before surfacing the original
//! error. A failure of the reverse-apply itself escalates to
//! `RollbackFailed`, the one condition that requires manual intervention.

use chrono::Duration;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cluster::{ApplyOutcome, ClusterInterface, ResourceId, ResourceSet};
use crate::error::{DeployError, Result};

/// Default timeout for readiness waits (5 minutes)
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::minutes(5);

/// Create a linked cancellation pair
///
/// Dropping the handle without calling `cancel` leaves the operation
/// running to completion.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelToken(rx))
}

/// Caller-side handle to cancel an in-flight operation
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// Orchestrator-side token observed during readiness waits
#[derive(Debug, Clone)]
pub struct CancelToken(watch::Receiver<bool>);

impl CancelToken {
    async fn cancelled(mut self) {
        loop {
            if *self.0.borrow() {
                return;
            }
            if self.0.changed().await.is_err() {
                // Handle dropped without cancelling; never fires
                futures::future::pending::<()>().await;
            }
        }
    }
}

/// What to apply for one release operation
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    /// Target namespace
    pub namespace: String,

    /// Desired resource set
    pub resources: ResourceSet,

    /// Resource set of the previously deployed revision; re-applied during
    /// reverse-apply to revert in-place changes (atomic upgrades)
    pub previous: Option<ResourceSet>,

    /// Block until every resource reports ready
    pub wait: bool,

    /// Bound on the readiness wait
    pub timeout: Duration,

    /// Reverse all effects of this operation on failure
    pub atomic: bool,
}

/// Resources touched by a successful apply
#[derive(Debug, Clone, Default)]
pub struct ApplySummary {
    /// Resources this operation created
    pub created: Vec<ResourceId>,

    /// Resources this operation changed in place
    pub updated: Vec<ResourceId>,
}

/// Drives resource application against the cluster interface
pub struct Orchestrator {
    cluster: Arc<dyn ClusterInterface>,
}

impl Orchestrator {
    pub fn new(cluster: Arc<dyn ClusterInterface>) -> Self {
        Self { cluster }
    }

    /// Apply a resource set, optionally waiting for readiness
    ///
    /// In atomic mode any failure (rejection, readiness timeout,
    /// cancellation) triggers a full reverse-apply before the original
    /// error is returned. Non-atomic mode reports the error and leaves
    /// applied resources in place.
    pub async fn apply(
        &self,
        request: &ApplyRequest,
        cancel: Option<CancelToken>,
    ) -> Result<ApplySummary> {
        let outcomes = self
            .cluster
            .apply_resource_set(&request.namespace, &request.resources)
            .await?;

        let mut summary = ApplySummary::default();
        let mut rejection = None;
        for outcome in outcomes {
            match outcome {
                ApplyOutcome::Applied { resource, created } => {
                    if created {
                        summary.created.push(resource);
                    } else {
                        summary.updated.push(resource);
                    }
                }
                ApplyOutcome::Rejected { resource, reason } => {
                    if rejection.is_none() {
                        rejection = Some(DeployError::ResourceRejected {
                            resource: resource.to_string(),
                            reason,
                        });
                    }
                }
            }
        }
        if let Some(err) = rejection {
            return self.fail(request, &summary, err).await;
        }

        if request.wait {
            if let Err(err) = self.wait_for_ready(request, cancel).await {
                return self.fail(request, &summary, err).await;
            }
        }

        debug!(
            namespace = %request.namespace,
            created = summary.created.len(),
            updated = summary.updated.len(),
            "resource set applied"
        );
        Ok(summary)
    }

    /// Handle an operation failure per the requested atomicity
    async fn fail(
        &self,
        request: &ApplyRequest,
        summary: &ApplySummary,
        err: DeployError,
    ) -> Result<ApplySummary> {
        if !request.atomic {
            return Err(err);
        }

        warn!(
            namespace = %request.namespace,
            error = %err,
            "apply failed, reversing applied resources"
        );
        self.reverse_apply(request, summary)
            .await
            .map_err(|cleanup| DeployError::RollbackFailed {
                reason: cleanup.to_string(),
            })?;
        info!(namespace = %request.namespace, "automatic cleanup complete");

        Err(err)
    }

    /// Replay the undo log: delete created resources in reverse order, then
    /// restore the previous revision's resources if given
    async fn reverse_apply(&self, request: &ApplyRequest, summary: &ApplySummary) -> Result<()> {
        if !summary.created.is_empty() {
            let created: HashSet<&ResourceId> = summary.created.iter().collect();
            let undo: ResourceSet = request
                .resources
                .iter()
                .rev()
                .filter(|r| created.contains(&r.id))
                .cloned()
                .collect();
            self.cluster
                .delete_resource_set(&request.namespace, &undo)
                .await?;
        }

        if let Some(previous) = &request.previous {
            let outcomes = self
                .cluster
                .apply_resource_set(&request.namespace, previous)
                .await?;
            for outcome in outcomes {
                if let ApplyOutcome::Rejected { resource, reason } = outcome {
                    return Err(DeployError::ResourceRejected {
                        resource: resource.to_string(),
                        reason,
                    });
                }
            }
        }

        Ok(())
    }

    /// Join on readiness of every resource in the set, bounded by the
    /// request timeout; cancellation is reported as a timeout
    async fn wait_for_ready(
        &self,
        request: &ApplyRequest,
        cancel: Option<CancelToken>,
    ) -> Result<()> {
        let ids = request.resources.ids();
        let total = ids.len();
        if total == 0 {
            return Ok(());
        }

        let stream = self
            .cluster
            .watch_readiness(&request.namespace, &request.resources)
            .await?;

        let wait = request
            .timeout
            .to_std()
            .unwrap_or_else(|_| std::time::Duration::from_secs(300));

        let drain = async move {
            let mut pending: HashSet<ResourceId> = ids.into_iter().collect();
            let mut stream = stream;
            while !pending.is_empty() {
                match stream.next().await {
                    Some(event) if event.ready => {
                        pending.remove(&event.resource);
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            pending.len()
        };

        let cancelled = async move {
            match cancel {
                Some(token) => token.cancelled().await,
                None => futures::future::pending().await,
            }
        };

        tokio::select! {
            outcome = tokio::time::timeout(wait, drain) => match outcome {
                Ok(0) => Ok(()),
                Ok(remaining) => Err(DeployError::ReadinessTimeout(format!(
                    "readiness stream ended with {} of {} resources unready",
                    remaining, total
                ))),
                Err(_) => Err(DeployError::ReadinessTimeout(format!(
                    "timeout of {}s elapsed",
                    request.timeout.num_seconds()
                ))),
            },
            _ = cancelled => Err(DeployError::ReadinessTimeout(
                "operation cancelled by caller".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Resource;
    use crate::mock::MockCluster;

    fn resource(name: &str) -> Resource {
        Resource {
            id: crate::cluster::ResourceId::namespaced("ConfigMap", name, "default"),
            manifest: serde_json::json!({"kind": "ConfigMap"}),
        }
    }

    fn request(resources: Vec<Resource>, atomic: bool, wait: bool) -> ApplyRequest {
        ApplyRequest {
            namespace: "default".to_string(),
            resources: resources.into_iter().collect(),
            previous: None,
            wait,
            timeout: Duration::milliseconds(100),
            atomic,
        }
    }

    #[tokio::test]
    async fn test_apply_success() {
        let cluster = MockCluster::new();
        let orchestrator = Orchestrator::new(Arc::new(cluster.clone()));

        let summary = orchestrator
            .apply(&request(vec![resource("a"), resource("b")], false, true), None)
            .await
            .unwrap();

        assert_eq!(summary.created.len(), 2);
        assert!(summary.updated.is_empty());
        assert_eq!(cluster.live_resources().len(), 2);
    }

    #[tokio::test]
    async fn test_rejection_non_atomic_leaves_partial_state() {
        let cluster = MockCluster::new();
        cluster.reject("b", "port conflict");
        let orchestrator = Orchestrator::new(Arc::new(cluster.clone()));

        let err = orchestrator
            .apply(&request(vec![resource("a"), resource("b")], false, false), None)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::ResourceRejected { .. }));
        // Applied resource left in place
        assert_eq!(cluster.live_resources().len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_atomic_reverses_created() {
        let cluster = MockCluster::new();
        cluster.reject("b", "port conflict");
        let orchestrator = Orchestrator::new(Arc::new(cluster.clone()));

        let err = orchestrator
            .apply(&request(vec![resource("a"), resource("b")], true, false), None)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::ResourceRejected { .. }));
        assert!(cluster.live_resources().is_empty());
        assert_eq!(cluster.deleted_log().len(), 1);
        assert_eq!(cluster.deleted_log()[0].name, "a");
    }

    #[tokio::test]
    async fn test_readiness_timeout_atomic_reverses() {
        let cluster = MockCluster::new();
        cluster.hold_unready("a");
        let orchestrator = Orchestrator::new(Arc::new(cluster.clone()));

        let err = orchestrator
            .apply(&request(vec![resource("a")], true, true), None)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::ReadinessTimeout(_)));
        assert!(cluster.live_resources().is_empty());
    }

    #[tokio::test]
    async fn test_atomic_upgrade_restores_previous_set() {
        let cluster = MockCluster::new();
        let orchestrator = Orchestrator::new(Arc::new(cluster.clone()));

        // Deploy v1
        let previous: ResourceSet = vec![resource("app")].into_iter().collect();
        cluster
            .apply_resource_set("default", &previous)
            .await
            .unwrap();

        // Upgrade adds a resource that never becomes ready
        cluster.hold_unready("extra");
        let upgrade = ApplyRequest {
            namespace: "default".to_string(),
            resources: vec![resource("app"), resource("extra")].into_iter().collect(),
            previous: Some(previous),
            wait: true,
            timeout: Duration::milliseconds(100),
            atomic: true,
        };

        let err = orchestrator.apply(&upgrade, None).await.unwrap_err();
        assert!(matches!(err, DeployError::ReadinessTimeout(_)));

        // The created "extra" is gone, the previous "app" is back
        assert_eq!(cluster.live_resources().len(), 1);
        assert!(cluster.live_resources()[0].contains("app"));
    }

    #[tokio::test]
    async fn test_cancellation_treated_as_timeout() {
        let cluster = MockCluster::new();
        cluster.hold_unready("a");
        let orchestrator = Orchestrator::new(Arc::new(cluster.clone()));

        let (handle, token) = cancel_pair();
        handle.cancel();

        let mut req = request(vec![resource("a")], false, true);
        req.timeout = Duration::minutes(5);

        let err = orchestrator.apply(&req, Some(token)).await.unwrap_err();
        assert!(matches!(err, DeployError::ReadinessTimeout(_)));
        assert!(err.to_string().contains("cancelled"));
    }
}
