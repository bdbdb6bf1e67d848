//! The closed set of ways a refactoring can end without committing.
//!
//! Failures are values, not panics: the pipeline records them in its report
//! and hands user-visible ones to the notifier. The CLI turns them into a
//! `DuckError` for its JSON error response and exit code.

use ducktool_core::error::DuckError;
use ducktool_core::graph::DeclarationKind;
use ducktool_core::rewrite::{Conflict, Precondition};
use ducktool_core::state::ParserState;
use ducktool_core::validation::ValidationError;
use thiserror::Error;

/// Why a refactoring did not commit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefactoringFailure {
    /// The project has no ready graph.
    #[error("the project is not ready (status: {state})")]
    NotReady { state: ParserState },

    /// No explicit target and nothing usable under the cursor.
    #[error("no target is selected")]
    NoTarget,

    /// The model could not be built from the target.
    #[error("the refactoring model could not be built: {reason}")]
    InvalidModel { reason: String },

    /// The target is the wrong kind of declaration.
    #[error("'{name}' is a {actual}; expected {expected}")]
    InvalidDeclarationType {
        name: String,
        actual: DeclarationKind,
        expected: String,
    },

    /// Implement-interface was invoked away from an `Implements` statement.
    #[error("no Implements statement is selected")]
    NoImplementsStatementSelected,

    /// The confirmed model is invalid.
    #[error("{message}")]
    Validation { message: String },

    /// The target changed or disappeared while the model was presented.
    #[error("'{name}' changed since the refactoring started")]
    TargetStale { name: String },

    /// The module texts changed since the graph was resolved.
    #[error("the edits conflict with changes made since the project was resolved ({} conflict(s))", .conflicts.len())]
    CommitConflict { conflicts: Vec<Conflict> },

    /// The user cancelled the presenter.
    #[error("cancelled")]
    Cancelled,
}

impl RefactoringFailure {
    /// Create a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        RefactoringFailure::Validation {
            message: message.into(),
        }
    }

    /// Create an invalid-declaration-type failure.
    pub fn invalid_type(name: impl Into<String>, actual: DeclarationKind, expected: impl Into<String>) -> Self {
        RefactoringFailure::InvalidDeclarationType {
            name: name.into(),
            actual,
            expected: expected.into(),
        }
    }

    /// Failures the user is told about. Not-ready, cancellation and a model
    /// that could not be built end silently.
    pub fn is_user_visible(&self) -> bool {
        match self {
            RefactoringFailure::NotReady { .. }
            | RefactoringFailure::Cancelled
            | RefactoringFailure::InvalidModel { .. } => false,
            RefactoringFailure::NoTarget
            | RefactoringFailure::InvalidDeclarationType { .. }
            | RefactoringFailure::NoImplementsStatementSelected
            | RefactoringFailure::Validation { .. }
            | RefactoringFailure::TargetStale { .. }
            | RefactoringFailure::CommitConflict { .. } => true,
        }
    }
}

impl From<ValidationError> for RefactoringFailure {
    fn from(err: ValidationError) -> Self {
        RefactoringFailure::validation(err.to_string())
    }
}

fn conflict_module(conflict: &Conflict) -> String {
    match conflict {
        Conflict::PreconditionFailed {
            precondition: Precondition::ModuleHashMatches { module, .. },
            ..
        }
        | Conflict::OverlappingEdits { module, .. }
        | Conflict::SelectionOutOfBounds { module, .. }
        | Conflict::ModuleMissing { module }
        | Conflict::ModuleExists { module } => module.module.clone(),
    }
}

impl From<RefactoringFailure> for DuckError {
    fn from(failure: RefactoringFailure) -> Self {
        match failure {
            RefactoringFailure::NotReady { state } => DuckError::NotReady { state },
            RefactoringFailure::NoTarget => DuckError::target_not_found("the active selection"),
            RefactoringFailure::InvalidModel { reason } => DuckError::internal(reason),
            RefactoringFailure::InvalidDeclarationType {
                ref name,
                actual,
                ref expected,
            } => DuckError::invalid_args_with_details(
                failure.to_string(),
                serde_json::json!({
                    "name": name,
                    "actual": actual,
                    "expected": expected,
                }),
            ),
            RefactoringFailure::NoImplementsStatementSelected => {
                DuckError::invalid_args(failure.to_string())
            }
            RefactoringFailure::Validation { message } => DuckError::ValidationFailed { message },
            RefactoringFailure::TargetStale { .. } => DuckError::ApplyError {
                message: failure.to_string(),
                module: None,
            },
            RefactoringFailure::CommitConflict { ref conflicts } => DuckError::ApplyError {
                message: failure.to_string(),
                module: conflicts.first().map(conflict_module),
            },
            RefactoringFailure::Cancelled => DuckError::internal("the refactoring was cancelled"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ducktool_core::error::OutputErrorCode;
    use ducktool_core::rewrite::ContentHash;
    use ducktool_core::types::QualifiedModuleName;

    #[test]
    fn silent_failures() {
        assert!(!RefactoringFailure::NotReady {
            state: ParserState::Parsing
        }
        .is_user_visible());
        assert!(!RefactoringFailure::Cancelled.is_user_visible());
        assert!(!RefactoringFailure::InvalidModel {
            reason: "x".to_string()
        }
        .is_user_visible());
        assert!(RefactoringFailure::NoImplementsStatementSelected.is_user_visible());
        assert!(RefactoringFailure::CommitConflict { conflicts: vec![] }.is_user_visible());
    }

    #[test]
    fn invalid_type_message_names_expected_kind() {
        let failure =
            RefactoringFailure::invalid_type("Foo", DeclarationKind::Procedure, "a module-level variable");
        assert_eq!(
            failure.to_string(),
            "'Foo' is a procedure; expected a module-level variable"
        );
        let err = DuckError::from(failure);
        assert_eq!(err.error_code(), OutputErrorCode::InvalidArguments);
    }

    #[test]
    fn conflict_becomes_apply_error_naming_module() {
        let module = QualifiedModuleName::new("VBAProject", "Class1");
        let failure = RefactoringFailure::CommitConflict {
            conflicts: vec![Conflict::PreconditionFailed {
                precondition: Precondition::ModuleHashMatches {
                    module,
                    content_hash: ContentHash::of_text(""),
                },
                reason: "module changed".to_string(),
            }],
        };
        match DuckError::from(failure) {
            DuckError::ApplyError { module, .. } => assert_eq!(module.as_deref(), Some("Class1")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn identifier_errors_are_validation_failures() {
        let failure = RefactoringFailure::from(ValidationError::InvalidName {
            name: "Sub".to_string(),
            reason: "is a reserved keyword".to_string(),
        });
        assert!(matches!(failure, RefactoringFailure::Validation { .. }));
        assert_eq!(DuckError::from(failure).error_code(), OutputErrorCode::ValidationFailed);
    }
}
