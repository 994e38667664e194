//! Action options for install, upgrade, rollback, and uninstall operations

use capstan_core::{Values, VersionSpec};
use chrono::Duration;
use semver::Version;

/// Options for install operation
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Chart name to install
    pub chart: String,

    /// Chart version to resolve
    pub version: VersionSpec,

    /// File-supplied value overrides, applied in order
    pub value_files: Vec<Values>,

    /// Inline key=value overrides, applied in order after all files
    pub set_values: Vec<String>,

    /// Wait for resources to be ready
    pub wait: bool,

    /// Timeout for wait
    pub timeout: Option<Duration>,

    /// Automatically reverse all effects on failure
    pub atomic: bool,

    /// Create namespace if it doesn't exist
    pub create_namespace: bool,
}

impl InstallOptions {
    /// Create default install options
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        chart: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            chart: chart.into(),
            ..Default::default()
        }
    }

    /// Pin the chart version
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = VersionSpec::Exact(version);
        self
    }

    /// Add a file-supplied values overlay
    pub fn with_values_file(mut self, values: Values) -> Self {
        self.value_files.push(values);
        self
    }

    /// Add an inline key=value override
    pub fn with_set(mut self, assignment: impl Into<String>) -> Self {
        self.set_values.push(assignment.into());
        self
    }

    /// Enable waiting for resources
    pub fn with_wait(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.timeout = Some(timeout);
        self
    }

    /// Enable atomic mode (auto-reverse on failure)
    pub fn with_atomic(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.atomic = true;
        self.timeout = Some(timeout);
        self
    }

    /// Create the target namespace if missing
    pub fn with_namespace_creation(mut self) -> Self {
        self.create_namespace = true;
        self
    }
}

/// Options for upgrade operation
#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Chart name to upgrade to
    pub chart: String,

    /// Chart version to resolve
    pub version: VersionSpec,

    /// File-supplied value overrides, applied in order
    pub value_files: Vec<Values>,

    /// Inline key=value overrides, applied in order after all files
    pub set_values: Vec<String>,

    /// Wait for resources to be ready
    pub wait: bool,

    /// Timeout for wait
    pub timeout: Option<Duration>,

    /// Automatically restore the previous revision on failure
    pub atomic: bool,
}

impl UpgradeOptions {
    /// Create default upgrade options
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        chart: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            chart: chart.into(),
            ..Default::default()
        }
    }

    /// Pin the chart version
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = VersionSpec::Exact(version);
        self
    }

    /// Add a file-supplied values overlay
    pub fn with_values_file(mut self, values: Values) -> Self {
        self.value_files.push(values);
        self
    }

    /// Add an inline key=value override
    pub fn with_set(mut self, assignment: impl Into<String>) -> Self {
        self.set_values.push(assignment.into());
        self
    }

    /// Enable waiting for resources
    pub fn with_wait(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.timeout = Some(timeout);
        self
    }

    /// Enable atomic mode
    pub fn with_atomic(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.atomic = true;
        self.timeout = Some(timeout);
        self
    }
}

/// Options for rollback operation
#[derive(Debug, Clone, Default)]
pub struct RollbackOptions {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Target revision (None = previous deployable revision)
    pub revision: Option<u32>,

    /// Wait for resources to be ready
    pub wait: bool,

    /// Timeout for wait
    pub timeout: Option<Duration>,
}

impl RollbackOptions {
    /// Create default rollback options
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Set an explicit target revision
    pub fn to_revision(mut self, revision: u32) -> Self {
        self.revision = Some(revision);
        self
    }

    /// Enable waiting for resources
    pub fn with_wait(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.timeout = Some(timeout);
        self
    }
}

/// Options for uninstall operation
#[derive(Debug, Clone, Default)]
pub struct UninstallOptions {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Keep release history (retain revision records)
    pub keep_history: bool,
}

impl UninstallOptions {
    /// Create default uninstall options
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Keep history after uninstall
    pub fn keep_history(mut self) -> Self {
        self.keep_history = true;
        self
    }
}
