//! Turning refactoring failures into user messages.
//!
//! Each operation supplies a [`FailureMessages`] map: a caption and a
//! message per failure, with anything it does not word itself delegated to
//! [`base_message`]. The [`FailureNotifier`] only shows user-visible failures
//! and falls back to a generic message when a map has nothing to say.

use tracing::debug;

use crate::failure::RefactoringFailure;
use crate::interaction::MessageBox;

/// Shown when a message map has no wording for a visible failure.
pub const GENERIC_FAILURE_MESSAGE: &str = "The operation failed.";

/// Per-operation wording of failures.
pub trait FailureMessages {
    /// Title of the message box.
    fn caption(&self) -> &str;

    /// Message for `failure`, if the operation words it.
    fn message(&self, failure: &RefactoringFailure) -> Option<String>;
}

/// Wording shared by every operation. Silent failures have none.
pub fn base_message(failure: &RefactoringFailure) -> Option<String> {
    match failure {
        RefactoringFailure::NotReady { .. }
        | RefactoringFailure::Cancelled
        | RefactoringFailure::InvalidModel { .. } => None,
        RefactoringFailure::NoTarget => {
            Some("Nothing suitable is selected. Place the cursor on a declaration or a reference to it.".to_string())
        }
        RefactoringFailure::InvalidDeclarationType {
            name,
            actual,
            expected,
        } => Some(format!(
            "'{}' is a {}. This operation needs {}.",
            name, actual, expected
        )),
        RefactoringFailure::NoImplementsStatementSelected => {
            Some("Place the cursor on an Implements statement.".to_string())
        }
        RefactoringFailure::Validation { message } => Some(message.clone()),
        RefactoringFailure::TargetStale { name } => Some(format!(
            "'{}' was changed or removed while the refactoring was open. Nothing was modified.",
            name
        )),
        RefactoringFailure::CommitConflict { conflicts } => {
            let details: Vec<String> = conflicts.iter().map(|c| c.to_string()).collect();
            Some(format!(
                "The code was modified since it was last resolved; nothing was changed. {}",
                details.join("; ")
            ))
        }
    }
}

/// Reports failures through a [`MessageBox`].
pub struct FailureNotifier<'a> {
    message_box: &'a dyn MessageBox,
}

impl<'a> FailureNotifier<'a> {
    pub fn new(message_box: &'a dyn MessageBox) -> Self {
        Self { message_box }
    }

    /// Show `failure` if it is user-visible. Returns whether a message was shown.
    pub fn notify(&self, messages: &dyn FailureMessages, failure: &RefactoringFailure) -> bool {
        if !failure.is_user_visible() {
            debug!(%failure, "failure not shown");
            return false;
        }
        let message = messages
            .message(failure)
            .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());
        self.message_box.notify_warn(messages.caption(), &message);
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
