//! Capstan Core - foundation types for the Capstan release engine
//!
//! This crate provides the types shared across the engine:
//! - `Values`: configuration trees with deep merge and dot-path assignment
//! - `resolve`: the value-override resolution function (defaults, files, inline)
//! - `ChartRef` / `Chart`: chart references and fetched chart payloads
//! - `ReleaseContext`: release information handed to the template renderer

pub mod chart;
pub mod error;
pub mod release;
pub mod values;

pub use chart::{Chart, ChartRef, TemplateFile, VersionSpec};
pub use error::{CoreError, Result};
pub use release::ReleaseContext;
pub use values::{Values, resolve};
