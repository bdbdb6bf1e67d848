//! Error types and error code constants for duck.
//!
//! `DuckError` is the unified error for CLI output. Layer errors (graph,
//! resolution state, scanning, validation, configuration) are bridged into it
//! with `From` impls, and `OutputErrorCode` maps each variant to a stable exit
//! code:
//!
//! - `2`: Invalid arguments (bad input from caller)
//! - `3`: Resolution errors (target not found, module not found, scan failure)
//! - `4`: Apply errors (commit conflict, failed write)
//! - `5`: Validation failed (invalid name, collision, empty model)
//! - `6`: Not ready (the project has no ready graph)
//! - `10`: Internal errors (bugs, unexpected state)

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::graph::GraphError;
use crate::resolver::ResolveError;
use crate::scan::ScanError;
use crate::state::{ParserState, StateError};
use crate::validation::ValidationError;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output and CLI exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller.
    InvalidArguments = 2,
    /// Resolution errors (target not found, module not found).
    ResolutionError = 3,
    /// Apply errors (commit conflict, failed write).
    ApplyError = 4,
    /// Validation of a refactoring model failed.
    ValidationFailed = 5,
    /// The project graph is not ready.
    NotReady = 6,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
#[derive(Debug, Error)]
pub enum DuckError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Nothing usable at the requested location.
    #[error("no declaration found at {location}")]
    TargetNotFound { location: String },

    /// The named module is not part of the project.
    #[error("module not found: {module}")]
    ModuleNotFound { module: String },

    /// Source could not be scanned or resolved.
    #[error("resolution failed: {message}")]
    ResolutionFailed { message: String },

    /// Invalid identifier.
    #[error("invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    /// A refactoring model failed validation.
    #[error("validation failed: {message}")]
    ValidationFailed { message: String },

    /// The project graph is not ready.
    #[error("project is not ready (status: {state})")]
    NotReady { state: ParserState },

    /// Failed to apply changes.
    #[error("apply error: {message}")]
    ApplyError {
        message: String,
        module: Option<String>,
    },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&DuckError> for OutputErrorCode {
    fn from(err: &DuckError) -> Self {
        match err {
            DuckError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            DuckError::TargetNotFound { .. } => OutputErrorCode::ResolutionError,
            DuckError::ModuleNotFound { .. } => OutputErrorCode::ResolutionError,
            DuckError::ResolutionFailed { .. } => OutputErrorCode::ResolutionError,
            DuckError::InvalidIdentifier { .. } => OutputErrorCode::ValidationFailed,
            DuckError::ValidationFailed { .. } => OutputErrorCode::ValidationFailed,
            DuckError::NotReady { .. } => OutputErrorCode::NotReady,
            DuckError::ApplyError { .. } => OutputErrorCode::ApplyError,
            DuckError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<DuckError> for OutputErrorCode {
    fn from(err: DuckError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Bridges
// ============================================================================

impl From<GraphError> for DuckError {
    fn from(err: GraphError) -> Self {
        DuckError::internal(err.to_string())
    }
}

impl From<ResolveError> for DuckError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Graph(graph) => DuckError::from(graph),
            other => DuckError::ResolutionFailed {
                message: other.to_string(),
            },
        }
    }
}

impl From<ScanError> for DuckError {
    fn from(err: ScanError) -> Self {
        DuckError::ResolutionFailed {
            message: err.to_string(),
        }
    }
}

impl From<StateError> for DuckError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::ForeignModule(module) => DuckError::InvalidArguments {
                message: format!("module {} does not belong to this project", module),
                details: None,
            },
            StateError::AwaitingModules(_) => DuckError::ResolutionFailed {
                message: err.to_string(),
            },
            StateError::Superseded { .. } | StateError::InvalidTransition { .. } => {
                DuckError::internal(err.to_string())
            }
        }
    }
}

impl From<ValidationError> for DuckError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidName { name, reason } => {
                DuckError::InvalidIdentifier { name, reason }
            }
        }
    }
}

impl From<ConfigError> for DuckError {
    fn from(err: ConfigError) -> Self {
        DuckError::invalid_args(err.to_string())
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl DuckError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        DuckError::InvalidArguments {
            message: message.into(),
            details: None,
        }
    }

    /// Create an invalid arguments error with JSON details.
    pub fn invalid_args_with_details(message: impl Into<String>, details: serde_json::Value) -> Self {
        DuckError::InvalidArguments {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Create a target not found error.
    pub fn target_not_found(location: impl fmt::Display) -> Self {
        DuckError::TargetNotFound {
            location: location.to_string(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        DuckError::InternalError {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QualifiedModuleName;

    mod error_code_mapping {
        use super::*;

        #[test]
        fn target_not_found_maps_to_resolution_error() {
            let err = DuckError::target_not_found("Module1:3:5");
            assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);
            assert_eq!(err.error_code().code(), 3);
            assert_eq!(err.to_string(), "no declaration found at Module1:3:5");
        }

        #[test]
        fn invalid_arguments_maps_to_invalid_arguments() {
            let err = DuckError::invalid_args("missing --to");
            assert_eq!(err.error_code().code(), 2);
        }

        #[test]
        fn not_ready_maps_to_not_ready() {
            let err = DuckError::NotReady {
                state: ParserState::ParserError,
            };
            assert_eq!(err.error_code().code(), 6);
        }

        #[test]
        fn apply_error_maps_to_apply_error() {
            let err = DuckError::ApplyError {
                message: "module changed".to_string(),
                module: Some("Class1".to_string()),
            };
            assert_eq!(err.error_code().code(), 4);
        }

        #[test]
        fn internal_error_maps_to_internal_error() {
            assert_eq!(DuckError::internal("oops").error_code().code(), 10);
        }
    }

    mod bridge_tests {
        use super::*;

        #[test]
        fn validation_error_becomes_invalid_identifier() {
            let err: DuckError = ValidationError::InvalidName {
                name: "1x".to_string(),
                reason: "must start with a letter".to_string(),
            }
            .into();
            assert!(matches!(err, DuckError::InvalidIdentifier { ref name, .. } if name == "1x"));
            assert_eq!(err.error_code(), OutputErrorCode::ValidationFailed);
        }

        #[test]
        fn scan_error_becomes_resolution_failure() {
            let err: DuckError = ScanError::Syntax {
                line: 4,
                message: "unclosed parameter list".to_string(),
            }
            .into();
            assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);
            assert!(err.to_string().contains("line 4"));
        }

        #[test]
        fn foreign_module_is_an_argument_error() {
            let err: DuckError =
                StateError::ForeignModule(QualifiedModuleName::new("Other", "Module1")).into();
            assert_eq!(err.error_code(), OutputErrorCode::InvalidArguments);
        }

        #[test]
        fn superseded_pass_is_internal() {
            let err: DuckError = StateError::Superseded { token: 1, current: 2 }.into();
            assert_eq!(err.error_code(), OutputErrorCode::InternalError);
        }
    }
}
