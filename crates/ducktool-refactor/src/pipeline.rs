//! The refactoring stage machine.
//!
//! One invocation runs through:
//!
//! 1. **Initializing**: require a ready snapshot, resolve the target (explicit
//!    or from the active selection), build the model.
//! 2. **Presenting**: show the model through a presenter; the presenter is
//!    released on every exit path.
//! 3. **Validating**: against the *current* snapshot, check that the target
//!    still exists unchanged and the confirmed model is valid.
//! 4. **Committing**: compute the edits, require every touched module to
//!    still hash to the snapshot's recorded content hash, commit atomically.
//!
//! Any stage can abort. Nothing is written unless the commit succeeds, and a
//! failed run leaves every module text as it was.

use ducktool_core::graph::{Declaration, DeclarationGraph, DeclarationId, DeclarationKind};
use ducktool_core::rewrite::{CommitOutcome, EditKind, RecordingSession, RewriteManager};
use ducktool_core::state::GraphSnapshot;
use ducktool_core::types::{QualifiedModuleName, QualifiedSelection};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, info_span};

use crate::failure::RefactoringFailure;
use crate::interaction::{PresenterDecision, PresenterFactory, PresenterGuard, RefactoringHost};
use crate::notifier::{FailureMessages, FailureNotifier};

// ============================================================================
// Targets
// ============================================================================

/// What a refactoring is invoked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefactoringTarget {
    /// A declaration of the current snapshot.
    Declaration(DeclarationId),
    /// A cursor position; the operation decides what it selects.
    Selection(QualifiedSelection),
}

/// Identity of a target that survives re-resolution: where it is declared,
/// its name and its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetIdentity {
    pub selection: QualifiedSelection,
    pub name: String,
    pub kind: DeclarationKind,
}

impl TargetIdentity {
    pub fn of(declaration: &Declaration) -> Self {
        TargetIdentity {
            selection: declaration.qualified_selection(),
            name: declaration.name.clone(),
            kind: declaration.kind,
        }
    }

    /// The same declaration in `graph`, if it still exists unchanged.
    pub fn resolve<'g>(&self, graph: &'g DeclarationGraph) -> Option<&'g Declaration> {
        let found = if self.kind.is_module() {
            graph.module_declaration(&self.selection.module)
        } else {
            graph.find(&self.selection)
        };
        found.filter(|d| d.kind == self.kind && d.name_eq(&self.name))
    }
}

// ============================================================================
// Refactoring trait
// ============================================================================

/// A model presented to the user.
pub trait RefactoringModel {
    /// The declaration the model was built for.
    fn target(&self) -> &TargetIdentity;
}

/// Read access for computing edits.
pub struct RewriteContext<'a> {
    pub graph: &'a DeclarationGraph,
    rewriter: &'a dyn RewriteManager,
}

impl<'a> RewriteContext<'a> {
    pub fn new(graph: &'a DeclarationGraph, rewriter: &'a dyn RewriteManager) -> Self {
        Self { graph, rewriter }
    }

    /// Current text of `module`.
    pub fn module_text(&self, module: &QualifiedModuleName) -> Result<String, RefactoringFailure> {
        self.rewriter
            .module_text(module)
            .ok_or_else(|| RefactoringFailure::TargetStale {
                name: module.module.clone(),
            })
    }
}

/// One refactoring operation.
pub trait Refactoring {
    type Model: RefactoringModel + 'static;

    /// Operation name used in logs and responses.
    fn name(&self) -> &'static str;

    /// Wording of this operation's failures.
    fn messages(&self) -> &dyn FailureMessages;

    /// Build the model for `target`. Kind mismatches fail here, before any
    /// presenter is involved.
    fn build_model(
        &self,
        graph: &DeclarationGraph,
        target: &RefactoringTarget,
    ) -> Result<Self::Model, RefactoringFailure>;

    /// Check a confirmed model against the current graph.
    fn validate(&self, graph: &DeclarationGraph, model: &Self::Model) -> Result<(), RefactoringFailure>;

    /// Record the edits implementing `model`.
    fn rewrite(
        &self,
        context: &RewriteContext<'_>,
        model: &Self::Model,
        edits: &mut RecordingSession,
    ) -> Result<(), RefactoringFailure>;
}

// ============================================================================
// Report
// ============================================================================

/// Stages of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Initializing,
    Presenting,
    Validating,
    Committing,
    Done,
    Aborted,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Aborted)
    }
}

/// What happened during one invocation.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Stages entered, in order.
    pub history: Vec<PipelineStage>,
    pub failure: Option<RefactoringFailure>,
    /// Modules whose text changed (created modules included).
    pub modified: Vec<QualifiedModuleName>,
}

impl PipelineReport {
    /// The last stage entered.
    pub fn stage(&self) -> PipelineStage {
        self.history
            .last()
            .copied()
            .unwrap_or(PipelineStage::Initializing)
    }

    pub fn is_done(&self) -> bool {
        self.stage() == PipelineStage::Done
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!(?stage, "pipeline stage");
        self.history.push(stage);
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Runs a refactoring against a host.
pub struct RefactoringPipeline<'a, R: Refactoring> {
    refactoring: R,
    host: RefactoringHost<'a>,
    presenters: &'a dyn PresenterFactory<R::Model>,
}

impl<'a, R: Refactoring> RefactoringPipeline<'a, R> {
    pub fn new(
        refactoring: R,
        host: RefactoringHost<'a>,
        presenters: &'a dyn PresenterFactory<R::Model>,
    ) -> Self {
        Self {
            refactoring,
            host,
            presenters,
        }
    }

    pub fn refactoring(&self) -> &R {
        &self.refactoring
    }

    pub fn host(&self) -> &RefactoringHost<'a> {
        &self.host
    }

    /// The ready snapshot, or `NotReady` with the current status.
    pub fn ready_snapshot(&self) -> Result<Arc<GraphSnapshot>, RefactoringFailure> {
        self.host
            .project
            .snapshot()
            .ok_or_else(|| RefactoringFailure::NotReady {
                state: self.host.project.status(),
            })
    }

    /// The explicit target, or the active selection.
    pub fn resolve_target(&self, target: Option<RefactoringTarget>) -> Option<RefactoringTarget> {
        target.or_else(|| {
            self.host
                .selection
                .active_selection()
                .map(RefactoringTarget::Selection)
        })
    }

    /// Run one invocation. Failures are reported, and user-visible ones are
    /// shown through the host's message box.
    pub fn run(&self, target: Option<RefactoringTarget>) -> PipelineReport {
        let span = info_span!("refactor", operation = self.refactoring.name());
        let _enter = span.enter();

        let mut report = PipelineReport::default();
        match self.execute(target, &mut report) {
            Ok(modified) => {
                info!(modules = modified.len(), "refactoring committed");
                report.modified = modified;
                report.enter(PipelineStage::Done);
            }
            Err(failure) => {
                info!(stage = ?report.stage(), %failure, "refactoring aborted");
                FailureNotifier::new(self.host.messages).notify(self.refactoring.messages(), &failure);
                report.failure = Some(failure);
                report.enter(PipelineStage::Aborted);
            }
        }
        report
    }

    fn execute(
        &self,
        target: Option<RefactoringTarget>,
        report: &mut PipelineReport,
    ) -> Result<Vec<QualifiedModuleName>, RefactoringFailure> {
        report.enter(PipelineStage::Initializing);
        let snapshot = self.ready_snapshot()?;
        let target = self.resolve_target(target).ok_or(RefactoringFailure::NoTarget)?;
        let model = self.refactoring.build_model(snapshot.graph(), &target)?;
        drop(snapshot);

        report.enter(PipelineStage::Presenting);
        let model = {
            let mut presenter = PresenterGuard::new(self.presenters);
            match presenter.show(model) {
                PresenterDecision::Confirmed(model) => model,
                PresenterDecision::Cancelled => return Err(RefactoringFailure::Cancelled),
            }
        };

        report.enter(PipelineStage::Validating);
        let stale = || RefactoringFailure::TargetStale {
            name: model.target().name.clone(),
        };
        let current = self.host.project.snapshot().ok_or_else(stale)?;
        let graph = current.graph();
        model.target().resolve(graph).ok_or_else(stale)?;
        self.refactoring.validate(graph, &model)?;

        report.enter(PipelineStage::Committing);
        let mut edits = RecordingSession::new();
        self.refactoring.rewrite(
            &RewriteContext::new(graph, self.host.rewriter),
            &model,
            &mut edits,
        )?;
        let patch = edits.into_patch();

        let mut session = self.host.rewriter.begin_session();
        for module in patch.modules() {
            if let Some(hash) = graph.module_hash(module) {
                session.require_unchanged(module, hash.clone());
            }
        }
        for edit in &patch.edits {
            match &edit.kind {
                EditKind::Replace { selection } => session.replace(&edit.module, *selection, &edit.text),
                EditKind::Insert { line, column } => {
                    session.insert(&edit.module, *line, *column, &edit.text)
                }
                EditKind::Append => session.append(&edit.module, &edit.text),
                EditKind::CreateModule => session.create_module(&edit.module, &edit.text),
            }
        }
        debug!(edits = session.edit_count(), "committing");
        match session.commit() {
            CommitOutcome::Committed { modules } => Ok(modules),
            CommitOutcome::Conflict { conflicts } => Err(RefactoringFailure::CommitConflict { conflicts }),
        }
    }
}
