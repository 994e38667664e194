//! Release lifecycle manager
//!
//! `ReleaseManager` is the public surface of the engine: install, upgrade,
//! rollback, uninstall, plus the history/list/status queries. Each
//! operation acquires the release's store lock for its whole duration, so
//! operations on the same (name, namespace) serialize while distinct
//! releases proceed independently.
//!
//! Outcome handling follows one rule: a successful operation commits a new
//! revision; a failed non-atomic operation commits a `failed` revision; a
//! failed atomic operation leaves the store reflecting the pre-operation
//! state exactly (the orchestrator has already reversed the cluster-side
//! effects, and completion of that cleanup is reported on the log stream).

use std::sync::Arc;
use tracing::{info, warn};

use capstan_core::{ReleaseContext, resolve};

use crate::actions::{InstallOptions, RollbackOptions, UninstallOptions, UpgradeOptions};
use crate::cluster::ClusterInterface;
use crate::error::{DeployError, Result};
use crate::orchestrator::{ApplyRequest, CancelToken, DEFAULT_READY_TIMEOUT, Orchestrator};
use crate::release::{Release, ReleaseStatus, Revision, RevisionStatus};
use crate::source::{ChartSource, Renderer};
use crate::store::ReleaseStore;

/// Drives release lifecycle operations over a store and the external
/// collaborators (chart source, renderer, cluster)
pub struct ReleaseManager<S: ReleaseStore> {
    store: S,
    charts: Arc<dyn ChartSource>,
    renderer: Arc<dyn Renderer>,
    cluster: Arc<dyn ClusterInterface>,
    orchestrator: Orchestrator,
}

impl<S: ReleaseStore> ReleaseManager<S> {
    /// Create a manager over the given store and collaborators
    pub fn new(
        store: S,
        charts: Arc<dyn ChartSource>,
        renderer: Arc<dyn Renderer>,
        cluster: Arc<dyn ClusterInterface>,
    ) -> Self {
        let orchestrator = Orchestrator::new(cluster.clone());
        Self {
            store,
            charts,
            renderer,
            cluster,
            orchestrator,
        }
    }

    /// Get the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    // ========== Install ==========

    /// Install a chart as a new release
    pub async fn install(&self, options: &InstallOptions) -> Result<Release> {
        self.install_with_cancel(options, None).await
    }

    /// Install with a cancellation token observed during the readiness wait
    pub async fn install_with_cancel(
        &self,
        options: &InstallOptions,
        cancel: Option<CancelToken>,
    ) -> Result<Release> {
        let _guard = self
            .store
            .lock_release(&options.namespace, &options.name)
            .await;

        // An active release blocks the name; retained history of an
        // uninstalled one is continued instead
        let prior = match self.store.get(&options.namespace, &options.name).await {
            Ok(existing) if existing.is_active() => {
                return Err(DeployError::DuplicateReleaseName {
                    name: options.name.clone(),
                    namespace: options.namespace.clone(),
                });
            }
            Ok(existing) => Some(existing),
            Err(DeployError::ReleaseNotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let next_revision = if prior.is_some() {
            let history = self
                .store
                .history(&options.namespace, &options.name)
                .await?;
            history.last().map(|r| r.number + 1).unwrap_or(1)
        } else {
            1
        };

        let chart = self
            .charts
            .fetch_chart(&options.chart, &options.version)
            .await?;
        let values = resolve(&chart.default_values, &options.value_files, &options.set_values)?;
        let context = ReleaseContext::for_install(&options.name, &options.namespace, next_revision);
        let resources = self.renderer.render(&chart, &values, &context)?;

        if options.create_namespace {
            self.cluster.ensure_namespace(&options.namespace).await?;
        }

        let release = Release::for_install(
            &options.name,
            &options.namespace,
            chart.reference.clone(),
            values.clone(),
            next_revision,
        );
        self.store.create(&release).await?;

        info!(
            name = %options.name,
            namespace = %options.namespace,
            chart = %chart.reference,
            revision = next_revision,
            "installing release"
        );

        let request = ApplyRequest {
            namespace: options.namespace.clone(),
            resources: resources.clone(),
            previous: None,
            wait: options.wait,
            timeout: options.timeout.unwrap_or(DEFAULT_READY_TIMEOUT),
            atomic: options.atomic,
        };

        match self.orchestrator.apply(&request, cancel).await {
            Ok(_) => {
                let revision = Revision::deployed(
                    next_revision,
                    chart.reference,
                    values,
                    resources,
                    "Install complete",
                );
                self.store
                    .append_revision(&options.namespace, &options.name, revision)
                    .await?;
                self.store.get(&options.namespace, &options.name).await
            }
            Err(err @ DeployError::RollbackFailed { .. }) => {
                // Cleanup itself failed; keep the record for the operator
                warn!(name = %options.name, error = %err, "install cleanup failed");
                self.store
                    .set_status(&options.namespace, &options.name, ReleaseStatus::Failed)
                    .await?;
                Err(err)
            }
            Err(err) if options.atomic => {
                // Cluster effects already reversed; restore the store to
                // its pre-operation state
                match prior {
                    Some(prior) => self.store.create(&prior).await?,
                    None => self.store.purge(&options.namespace, &options.name).await?,
                }
                Err(err)
            }
            Err(err) => {
                warn!(name = %options.name, error = %err, "install failed");
                let revision = Revision::failed(
                    next_revision,
                    chart.reference,
                    values,
                    resources,
                    format!("Install failed: {}", err),
                );
                self.store
                    .append_revision(&options.namespace, &options.name, revision)
                    .await?;
                Err(err)
            }
        }
    }

    // ========== Upgrade ==========

    /// Upgrade an existing release to a new chart version and/or values
    pub async fn upgrade(&self, options: &UpgradeOptions) -> Result<Release> {
        self.upgrade_with_cancel(options, None).await
    }

    /// Upgrade with a cancellation token observed during the readiness wait
    pub async fn upgrade_with_cancel(
        &self,
        options: &UpgradeOptions,
        cancel: Option<CancelToken>,
    ) -> Result<Release> {
        let _guard = self
            .store
            .lock_release(&options.namespace, &options.name)
            .await;

        let existing = self.store.get(&options.namespace, &options.name).await?;
        match existing.status {
            ReleaseStatus::Deployed | ReleaseStatus::Failed => {}
            ReleaseStatus::PendingInstall | ReleaseStatus::PendingUpgrade => {
                return Err(DeployError::OperationInProgress {
                    name: options.name.clone(),
                    status: existing.status.to_string(),
                });
            }
            ReleaseStatus::Uninstalled => {
                return Err(DeployError::InvalidReleaseState {
                    name: options.name.clone(),
                    status: existing.status.to_string(),
                    operation: "upgrade".to_string(),
                });
            }
        }

        let history = self
            .store
            .history(&options.namespace, &options.name)
            .await?;
        let next_revision = history.last().map(|r| r.number + 1).unwrap_or(1);
        let previous_deployed = history
            .iter()
            .rev()
            .find(|r| r.status == RevisionStatus::Deployed)
            .cloned();

        let chart = self
            .charts
            .fetch_chart(&options.chart, &options.version)
            .await?;
        let values = resolve(&chart.default_values, &options.value_files, &options.set_values)?;
        let context = ReleaseContext::for_upgrade(&options.name, &options.namespace, next_revision);
        let resources = self.renderer.render(&chart, &values, &context)?;

        self.store
            .set_status(&options.namespace, &options.name, ReleaseStatus::PendingUpgrade)
            .await?;

        info!(
            name = %options.name,
            namespace = %options.namespace,
            chart = %chart.reference,
            revision = next_revision,
            "upgrading release"
        );

        let request = ApplyRequest {
            namespace: options.namespace.clone(),
            resources: resources.clone(),
            previous: previous_deployed
                .as_ref()
                .filter(|_| options.atomic)
                .map(|r| r.resources.clone()),
            wait: options.wait,
            timeout: options.timeout.unwrap_or(DEFAULT_READY_TIMEOUT),
            atomic: options.atomic,
        };

        match self.orchestrator.apply(&request, cancel).await {
            Ok(_) => {
                let revision = Revision::deployed(
                    next_revision,
                    chart.reference,
                    values,
                    resources,
                    "Upgrade complete",
                );
                self.store
                    .append_revision(&options.namespace, &options.name, revision)
                    .await?;
                self.store.get(&options.namespace, &options.name).await
            }
            Err(err @ DeployError::RollbackFailed { .. }) => {
                warn!(name = %options.name, error = %err, "upgrade cleanup failed");
                self.store
                    .set_status(&options.namespace, &options.name, ReleaseStatus::Failed)
                    .await?;
                Err(err)
            }
            Err(err) if options.atomic => {
                // Previous revision's resources restored; no new revision
                // is recorded and the prior one stays current
                self.store
                    .set_status(&options.namespace, &options.name, existing.status)
                    .await?;
                Err(err)
            }
            Err(err) => {
                warn!(name = %options.name, error = %err, "upgrade failed");
                let revision = Revision::failed(
                    next_revision,
                    chart.reference,
                    values,
                    resources,
                    format!("Upgrade failed: {}", err),
                );
                self.store
                    .append_revision(&options.namespace, &options.name, revision)
                    .await?;
                Err(err)
            }
        }
    }

    // ========== Rollback ==========

    /// Rollback to a previous revision
    ///
    /// With no explicit target, rolls back to the most recent revision that
    /// is neither failed nor current. An uninstalled release can be rolled
    /// back; its resources are recreated from the target revision.
    pub async fn rollback(&self, options: &RollbackOptions) -> Result<Release> {
        let _guard = self
            .store
            .lock_release(&options.namespace, &options.name)
            .await;

        let release = self.store.get(&options.namespace, &options.name).await?;
        if release.is_pending() {
            return Err(DeployError::OperationInProgress {
                name: options.name.clone(),
                status: release.status.to_string(),
            });
        }

        let history = self
            .store
            .history(&options.namespace, &options.name)
            .await?;

        let target = match options.revision {
            Some(number) => {
                let revision = history.iter().find(|r| r.number == number).ok_or_else(|| {
                    DeployError::RollbackTargetInvalid {
                        name: options.name.clone(),
                        revision: number,
                        reason: "revision does not exist".to_string(),
                    }
                })?;
                if revision.status == RevisionStatus::Failed {
                    return Err(DeployError::RollbackTargetInvalid {
                        name: options.name.clone(),
                        revision: number,
                        reason: "target revision itself failed".to_string(),
                    });
                }
                revision.clone()
            }
            None => history
                .iter()
                .rev()
                .find(|r| {
                    r.status != RevisionStatus::Failed && r.number != release.current_revision
                })
                .cloned()
                .ok_or_else(|| DeployError::RollbackTargetInvalid {
                    name: options.name.clone(),
                    revision: 0,
                    reason: "no previous revision to roll back to".to_string(),
                })?,
        };

        let next_revision = history.last().map(|r| r.number + 1).unwrap_or(1);
        let description = format!("Rollback to {}", target.number);

        info!(
            name = %options.name,
            namespace = %options.namespace,
            target = target.number,
            revision = next_revision,
            "rolling back release"
        );

        let request = ApplyRequest {
            namespace: options.namespace.clone(),
            resources: target.resources.clone(),
            previous: None,
            wait: options.wait,
            timeout: options.timeout.unwrap_or(DEFAULT_READY_TIMEOUT),
            atomic: false,
        };

        match self.orchestrator.apply(&request, None).await {
            Ok(_) => {
                let revision = Revision::deployed(
                    next_revision,
                    target.chart.clone(),
                    target.config.clone(),
                    target.resources.clone(),
                    description,
                );
                self.store
                    .append_revision(&options.namespace, &options.name, revision)
                    .await?;
                self.store.get(&options.namespace, &options.name).await
            }
            Err(err) => {
                warn!(name = %options.name, error = %err, "rollback failed");
                let revision = Revision::failed(
                    next_revision,
                    target.chart,
                    target.config,
                    target.resources,
                    format!("{} failed: {}", description, err),
                );
                self.store
                    .append_revision(&options.namespace, &options.name, revision)
                    .await?;
                Err(err)
            }
        }
    }

    // ========== Uninstall ==========

    /// Uninstall a release
    ///
    /// Deletes the current revision's resources, then either purges the
    /// release entirely or, with `keep_history`, records an uninstalled
    /// revision and retains the full history.
    pub async fn uninstall(&self, options: &UninstallOptions) -> Result<()> {
        let _guard = self
            .store
            .lock_release(&options.namespace, &options.name)
            .await;

        let release = self.store.get(&options.namespace, &options.name).await?;
        if release.is_pending() {
            return Err(DeployError::OperationInProgress {
                name: options.name.clone(),
                status: release.status.to_string(),
            });
        }
        if release.status == ReleaseStatus::Uninstalled {
            if options.keep_history {
                return Err(DeployError::InvalidReleaseState {
                    name: options.name.clone(),
                    status: release.status.to_string(),
                    operation: "uninstall".to_string(),
                });
            }
            // Nothing deployed; discard the retained records
            return self.store.purge(&options.namespace, &options.name).await;
        }

        let history = self
            .store
            .history(&options.namespace, &options.name)
            .await?;

        // Delete what the current revision applied, including the partial
        // state a failed operation may have left behind
        if let Some(current) = history
            .iter()
            .rev()
            .find(|r| r.number == release.current_revision)
        {
            if let Err(err) = self
                .cluster
                .delete_resource_set(&options.namespace, &current.resources)
                .await
            {
                warn!(name = %options.name, error = %err, "uninstall failed");
                self.store
                    .set_status(&options.namespace, &options.name, ReleaseStatus::Failed)
                    .await?;
                return Err(err);
            }
        }

        if options.keep_history {
            let next_revision = history.last().map(|r| r.number + 1).unwrap_or(1);
            let revision = Revision::uninstalled(
                next_revision,
                release.chart.clone(),
                release.config.clone(),
                "Uninstall complete",
            );
            self.store
                .append_revision(&options.namespace, &options.name, revision)
                .await?;
        } else {
            self.store.purge(&options.namespace, &options.name).await?;
        }

        info!(
            name = %options.name,
            namespace = %options.namespace,
            keep_history = options.keep_history,
            "release uninstalled"
        );
        Ok(())
    }

    // ========== Query Operations ==========

    /// Get the full revision history of a release, ascending
    pub async fn history(&self, namespace: &str, name: &str) -> Result<Vec<Revision>> {
        self.store.history(namespace, name).await
    }

    /// List releases, optionally filtered by namespace and/or status
    pub async fn list(
        &self,
        namespace: Option<&str>,
        status: Option<ReleaseStatus>,
    ) -> Result<Vec<Release>> {
        self.store.list(namespace, status).await
    }

    /// Get the current state of a release
    pub async fn status(&self, namespace: &str, name: &str) -> Result<Release> {
        self.store.get(namespace, name).await
    }
}
