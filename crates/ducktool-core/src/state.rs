//! Resolution state machine for one project.
//!
//! [`ProjectState`] drives a project through
//! `Pending → Parsing → ResolvedDeclarations → ResolvingReferences → Ready`
//! (with `ParserError` and `ResolverError` as terminal states) and is the only
//! writer of the project's [`DeclarationGraph`].
//!
//! - Every transition is broadcast on a [`tokio::sync::watch`] channel.
//! - Each pass is identified by a [`PassToken`]; starting a new pass
//!   supersedes the in-flight one and its late events are rejected.
//! - On `Ready` the graph is published as an immutable [`GraphSnapshot`].
//!   [`ProjectState::snapshot`] hands it out only while the status is
//!   `Ready`, so consumers never see a partially rebuilt graph.
//! - An error is published once; the project stays in the error state until
//!   the next pass begins.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::analysis::ModuleAnalysis;
use crate::graph::DeclarationGraph;
use crate::resolver::{build_declarations, resolve_references, DeclaredGraph, ResolveSummary};
use crate::types::QualifiedModuleName;

// ============================================================================
// States and events
// ============================================================================

/// Status of a project's resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserState {
    Pending,
    Parsing,
    ParserError,
    ResolvedDeclarations,
    ResolvingReferences,
    ResolverError,
    Ready,
}

impl ParserState {
    /// Terminal error states.
    pub fn is_error(&self) -> bool {
        matches!(self, ParserState::ParserError | ParserState::ResolverError)
    }

    /// The only state in which queries and refactorings may proceed.
    pub fn is_ready(&self) -> bool {
        *self == ParserState::Ready
    }
}

impl fmt::Display for ParserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParserState::Pending => "pending",
            ParserState::Parsing => "parsing",
            ParserState::ParserError => "parser error",
            ParserState::ResolvedDeclarations => "resolved declarations",
            ParserState::ResolvingReferences => "resolving references",
            ParserState::ResolverError => "resolver error",
            ParserState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Stage of a resolution pass, as reported with errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStage {
    Parse,
    BuildDeclarations,
    ResolveReferences,
}

/// An error reported for a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: ResolutionStage,
    pub message: String,
}

/// A status change broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub generation: u64,
    pub state: ParserState,
    pub error: Option<StageError>,
}

/// Identifies one resolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassToken {
    generation: u64,
}

impl PassToken {
    /// Generation number of the pass.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Error type for state machine events.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    /// The event belongs to a pass that has been superseded.
    #[error("pass {token} was superseded by pass {current}")]
    Superseded { token: u64, current: u64 },

    /// The event is not valid in the current state.
    #[error("'{event}' is not valid while {state}")]
    InvalidTransition {
        state: ParserState,
        event: &'static str,
    },

    /// The module belongs to another project.
    #[error("module {0} does not belong to this project")]
    ForeignModule(QualifiedModuleName),

    /// Declarations were requested before every changed module was parsed.
    #[error("{} module(s) not parsed yet", .0.len())]
    AwaitingModules(Vec<QualifiedModuleName>),
}

/// The graph as of a `Ready` transition.
#[derive(Debug)]
pub struct GraphSnapshot {
    generation: u64,
    graph: DeclarationGraph,
    summary: ResolveSummary,
}

impl GraphSnapshot {
    /// Generation of the pass that produced this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The resolved graph.
    pub fn graph(&self) -> &DeclarationGraph {
        &self.graph
    }

    /// Resolution counts.
    pub fn summary(&self) -> ResolveSummary {
        self.summary
    }
}

// ============================================================================
// ProjectState
// ============================================================================

#[derive(Debug, Default)]
struct PassState {
    generation: u64,
    state: Option<ParserState>,
    /// Analyses of the last `Ready` pass, reused for unchanged modules.
    baseline: BTreeMap<QualifiedModuleName, Arc<ModuleAnalysis>>,
    /// Analyses for the in-flight pass.
    pending: BTreeMap<QualifiedModuleName, Arc<ModuleAnalysis>>,
    /// Changed modules not yet delivered by the parser.
    awaiting: BTreeSet<QualifiedModuleName>,
    declared: Option<DeclaredGraph>,
    resolved: Option<(DeclarationGraph, ResolveSummary)>,
}

impl PassState {
    fn current(&self) -> ParserState {
        self.state.unwrap_or(ParserState::Pending)
    }

    fn discard_in_flight(&mut self) {
        self.pending.clear();
        self.awaiting.clear();
        self.declared = None;
        self.resolved = None;
    }
}

/// Resolution state for one project.
pub struct ProjectState {
    project: String,
    pass: Mutex<PassState>,
    status: watch::Sender<StatusEvent>,
    published: ArcSwapOption<GraphSnapshot>,
}

impl fmt::Debug for ProjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectState")
            .field("project", &self.project)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl ProjectState {
    /// Create a project in the `Pending` state.
    pub fn new(project: impl Into<String>) -> Self {
        let (status, _) = watch::channel(StatusEvent {
            generation: 0,
            state: ParserState::Pending,
            error: None,
        });
        ProjectState {
            project: project.into(),
            pass: Mutex::new(PassState::default()),
            status,
            published: ArcSwapOption::empty(),
        }
    }

    /// Project name.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    /// Latest status event.
    pub fn status_event(&self) -> StatusEvent {
        self.status.borrow().clone()
    }

    /// Current status.
    pub fn status(&self) -> ParserState {
        self.status.borrow().state
    }

    /// True if queries may proceed.
    pub fn is_ready(&self) -> bool {
        self.status().is_ready()
    }

    /// The graph of the last `Ready` transition, while the project is `Ready`.
    pub fn snapshot(&self) -> Option<Arc<GraphSnapshot>> {
        let event = self.status.borrow().clone();
        if !event.state.is_ready() {
            return None;
        }
        self.published
            .load_full()
            .filter(|snapshot| snapshot.generation == event.generation)
    }

    /// Generation of the latest published snapshot, even if no longer ready.
    pub fn ready_generation(&self) -> Option<u64> {
        self.published.load().as_ref().map(|s| s.generation)
    }

    fn lock(&self) -> MutexGuard<'_, PassState> {
        self.pass.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, pass: &mut PassState, state: ParserState, error: Option<StageError>) {
        pass.state = Some(state);
        debug!(project = %self.project, generation = pass.generation, %state, "status changed");
        self.status.send_replace(StatusEvent {
            generation: pass.generation,
            state,
            error,
        });
    }

    fn check(
        &self,
        pass: &PassState,
        token: PassToken,
        allowed: &[ParserState],
        event: &'static str,
    ) -> Result<(), StateError> {
        if token.generation != pass.generation {
            debug!(
                project = %self.project,
                token = token.generation,
                current = pass.generation,
                event,
                "discarding event from superseded pass"
            );
            return Err(StateError::Superseded {
                token: token.generation,
                current: pass.generation,
            });
        }
        let state = pass.current();
        if !allowed.contains(&state) {
            return Err(StateError::InvalidTransition { state, event });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Parser collaborator events
    // ------------------------------------------------------------------------

    /// Start a pass re-parsing `changed` modules; other modules keep their
    /// analyses from the last `Ready` pass.
    pub fn begin_pass(&self, changed: impl IntoIterator<Item = QualifiedModuleName>) -> PassToken {
        let mut pass = self.lock();
        pass.generation += 1;
        pass.discard_in_flight();
        pass.awaiting = changed.into_iter().collect();
        pass.pending = pass
            .baseline
            .iter()
            .filter(|(module, _)| !pass.awaiting.contains(*module))
            .map(|(module, analysis)| (module.clone(), Arc::clone(analysis)))
            .collect();
        self.transition(&mut pass, ParserState::Parsing, None);
        PassToken {
            generation: pass.generation,
        }
    }

    /// Start a pass that re-parses every module from scratch.
    pub fn begin_full_pass(&self, modules: impl IntoIterator<Item = QualifiedModuleName>) -> PassToken {
        self.lock().baseline.clear();
        self.begin_pass(modules)
    }

    /// A module was parsed.
    pub fn on_parsed(&self, token: PassToken, analysis: ModuleAnalysis) -> Result<(), StateError> {
        let mut pass = self.lock();
        self.check(&pass, token, &[ParserState::Parsing], "parsed")?;
        if analysis.module.project != self.project {
            return Err(StateError::ForeignModule(analysis.module));
        }
        pass.awaiting.remove(&analysis.module);
        pass.pending
            .insert(analysis.module.clone(), Arc::new(analysis));
        Ok(())
    }

    /// A module was removed from the project.
    pub fn on_module_removed(
        &self,
        token: PassToken,
        module: &QualifiedModuleName,
    ) -> Result<(), StateError> {
        let mut pass = self.lock();
        self.check(&pass, token, &[ParserState::Parsing], "module removed")?;
        pass.awaiting.remove(module);
        pass.pending.remove(module);
        Ok(())
    }

    /// Every module is parsed: build the declarations.
    pub fn on_declarations_built(&self, token: PassToken) -> Result<ParserState, StateError> {
        let mut pass = self.lock();
        self.check(&pass, token, &[ParserState::Parsing], "declarations built")?;
        if !pass.awaiting.is_empty() {
            return Err(StateError::AwaitingModules(
                pass.awaiting.iter().cloned().collect(),
            ));
        }

        let analyses: Vec<Arc<ModuleAnalysis>> = pass.pending.values().cloned().collect();
        match build_declarations(&self.project, &analyses) {
            Ok(declared) => {
                pass.declared = Some(declared);
                self.transition(&mut pass, ParserState::ResolvedDeclarations, None);
            }
            Err(err) => self.fail(&mut pass, ResolutionStage::BuildDeclarations, err.to_string()),
        }
        Ok(pass.current())
    }

    /// Resolve references against the built declarations.
    pub fn begin_resolving_references(&self, token: PassToken) -> Result<ParserState, StateError> {
        let mut pass = self.lock();
        self.check(
            &pass,
            token,
            &[ParserState::ResolvedDeclarations],
            "resolve references",
        )?;
        self.transition(&mut pass, ParserState::ResolvingReferences, None);

        let Some(declared) = pass.declared.take() else {
            self.fail(
                &mut pass,
                ResolutionStage::ResolveReferences,
                "no declarations to resolve against".to_string(),
            );
            return Ok(pass.current());
        };
        let analyses: Vec<Arc<ModuleAnalysis>> = pass.pending.values().cloned().collect();
        match resolve_references(declared, &analyses) {
            Ok(resolved) => pass.resolved = Some(resolved),
            Err(err) => self.fail(&mut pass, ResolutionStage::ResolveReferences, err.to_string()),
        }
        Ok(pass.current())
    }

    /// References are resolved: publish the graph and become `Ready`.
    pub fn on_references_resolved(&self, token: PassToken) -> Result<ParserState, StateError> {
        let mut pass = self.lock();
        self.check(
            &pass,
            token,
            &[ParserState::ResolvingReferences],
            "references resolved",
        )?;
        let Some((graph, summary)) = pass.resolved.take() else {
            return Err(StateError::InvalidTransition {
                state: pass.current(),
                event: "references resolved",
            });
        };

        self.published.store(Some(Arc::new(GraphSnapshot {
            generation: pass.generation,
            graph,
            summary,
        })));
        pass.baseline = std::mem::take(&mut pass.pending);
        pass.discard_in_flight();
        info!(
            project = %self.project,
            generation = pass.generation,
            declarations = summary.declarations,
            references = summary.references,
            unresolved = summary.unresolved,
            "project ready"
        );
        self.transition(&mut pass, ParserState::Ready, None);
        Ok(ParserState::Ready)
    }

    /// A stage failed.
    ///
    /// The error is published once; further errors for the same pass are
    /// rejected until a new pass begins.
    pub fn on_error(
        &self,
        token: PassToken,
        stage: ResolutionStage,
        message: impl Into<String>,
    ) -> Result<ParserState, StateError> {
        let mut pass = self.lock();
        self.check(
            &pass,
            token,
            &[
                ParserState::Parsing,
                ParserState::ResolvedDeclarations,
                ParserState::ResolvingReferences,
            ],
            "error",
        )?;
        self.fail(&mut pass, stage, message.into());
        Ok(pass.current())
    }

    fn fail(&self, pass: &mut PassState, stage: ResolutionStage, message: String) {
        let state = match stage {
            ResolutionStage::Parse => ParserState::ParserError,
            ResolutionStage::BuildDeclarations | ResolutionStage::ResolveReferences => {
                ParserState::ResolverError
            }
        };
        warn!(project = %self.project, ?stage, %message, "resolution failed");
        pass.discard_in_flight();
        self.transition(pass, state, Some(StageError { stage, message }));
    }

    // ------------------------------------------------------------------------
    // Drivers
    // ------------------------------------------------------------------------

    /// Run a complete pass over `analyses`, replacing every module.
    pub fn reparse(&self, analyses: Vec<ModuleAnalysis>) -> Result<ParserState, StateError> {
        let token = self.begin_full_pass(analyses.iter().map(|a| a.module.clone()));
        self.run_pass(token, analyses)
    }

    /// Run a pass re-parsing only `changed`; `removed` modules are dropped.
    pub fn refresh(
        &self,
        changed: Vec<ModuleAnalysis>,
        removed: &[QualifiedModuleName],
    ) -> Result<ParserState, StateError> {
        let token = self.begin_pass(changed.iter().map(|a| a.module.clone()));
        for module in removed {
            self.on_module_removed(token, module)?;
        }
        self.run_pass(token, changed)
    }

    fn run_pass(
        &self,
        token: PassToken,
        analyses: Vec<ModuleAnalysis>,
    ) -> Result<ParserState, StateError> {
        for analysis in analyses {
            self.on_parsed(token, analysis)?;
        }
        if self.on_declarations_built(token)?.is_error() {
            return Ok(self.status());
        }
        if self.begin_resolving_references(token)?.is_error() {
            return Ok(self.status());
        }
        self.on_references_resolved(token)
    }
}

// ============================================================================
// Tests
// ============================================================================
