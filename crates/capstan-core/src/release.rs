//! Render context handed to the external template renderer

use serde::{Deserialize, Serialize};

/// Release information visible to templates during rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseContext {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Revision number this operation will commit
    pub revision: u32,

    /// Is this an install operation?
    pub is_install: bool,

    /// Is this an upgrade operation?
    pub is_upgrade: bool,
}

impl ReleaseContext {
    /// Context for an install (revision 1, or higher on reinstall after uninstall)
    pub fn for_install(name: &str, namespace: &str, revision: u32) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision,
            is_install: true,
            is_upgrade: false,
        }
    }

    /// Context for an upgrade or rollback
    pub fn for_upgrade(name: &str, namespace: &str, revision: u32) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision,
            is_install: false,
            is_upgrade: true,
        }
    }
}
