//! Chart references and fetched chart payloads

use semver::Version;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Result;
use crate::values::Values;

/// Reference to a concrete chart version
///
/// Multiple chart versions may package the same or different application
/// versions, so the application version travels alongside the chart version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRef {
    /// Chart name
    pub name: String,

    /// Chart version
    pub version: Version,

    /// Version of the packaged application, if declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

impl ChartRef {
    /// Create a reference with no application version
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            app_version: None,
        }
    }

    /// Attach an application version
    pub fn with_app_version(mut self, app_version: impl Into<String>) -> Self {
        self.app_version = Some(app_version.into());
        self
    }
}

impl std::fmt::Display for ChartRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// A fetched chart: the reference plus everything a renderer needs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    /// Resolved chart reference
    pub reference: ChartRef,

    /// Default values shipped with the chart
    pub default_values: Values,

    /// Template files, opaque to the engine; a renderer turns these plus
    /// effective values into a resource set
    pub templates: Vec<TemplateFile>,
}

/// A single template file inside a chart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateFile {
    /// Path within the chart (e.g. "templates/deployment.yaml")
    pub path: String,

    /// Raw file content
    pub content: String,
}

impl TemplateFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Requested chart version: an exact version, or whatever the source
/// resolves as the latest available
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionSpec {
    #[default]
    Latest,
    Exact(Version),
}

impl std::fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Exact(v) => write!(f, "{}", v),
        }
    }
}

impl FromStr for VersionSpec {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("latest") {
            Ok(Self::Latest)
        } else {
            Ok(Self::Exact(Version::parse(s)?))
        }
    }
}
