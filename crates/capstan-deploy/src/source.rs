//! Collaborator traits: chart source and template renderer
//!
//! Chart fetching and template expansion are external concerns; the engine
//! consumes them through these two seams.

use async_trait::async_trait;
use capstan_core::{Chart, ReleaseContext, Values, VersionSpec};

use crate::cluster::ResourceSet;
use crate::error::Result;

/// Resolves chart references to fetched charts
#[async_trait]
pub trait ChartSource: Send + Sync {
    /// Fetch a chart by name and version spec
    ///
    /// Fails with `ChartNotFound` if the name is unknown or no version
    /// satisfies the spec.
    async fn fetch_chart(&self, name: &str, version: &VersionSpec) -> Result<Chart>;
}

/// Turns a chart plus effective values into the desired resource set
pub trait Renderer: Send + Sync {
    fn render(&self, chart: &Chart, values: &Values, context: &ReleaseContext)
    -> Result<ResourceSet>;
}
