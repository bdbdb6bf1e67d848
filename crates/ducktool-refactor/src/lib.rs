//! Refactoring pipeline for ducktool.
//!
//! This crate turns graph queries into source edits:
//! - Host collaborators (presenters, selection, message box)
//! - The closed set of refactoring failures and their notification
//! - The stage machine running a refactoring from model to commit
//! - Operation model builders (encapsulate field, extract interface,
//!   implement interface, rename)
//! - Commands wrapping searches and refactorings for a host

pub mod commands;
pub mod failure;
pub mod interaction;
pub mod notifier;
pub mod ops;
pub mod pipeline;

pub use failure::RefactoringFailure;
pub use pipeline::{PipelineReport, PipelineStage, Refactoring, RefactoringPipeline, RefactoringTarget};
