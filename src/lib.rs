//! ducktool: symbol resolution and refactoring for VBA projects.
//!
//! This crate provides the `duck` CLI binary and the helpers behind it.
//!
//! ## Modules
//!
//! - `cli` - CLI command implementations
//! - `project` - Loading project directories and writing changes back

pub mod cli;
pub mod project;

// Re-export the workspace crates for convenience
pub use ducktool_core::config::DuckConfig;
pub use ducktool_core::error::{DuckError, OutputErrorCode};
pub use ducktool_core::output::{ErrorInfo, ErrorResponse, SCHEMA_VERSION};
pub use ducktool_core::state::{ParserState, ProjectState};
pub use ducktool_core::types::{Location, QualifiedModuleName, QualifiedSelection, Selection};
pub use ducktool_refactor::{PipelineReport, PipelineStage, RefactoringFailure};
