//! Host collaborators for refactorings.
//!
//! A refactoring talks to its host through four seams:
//!
//! - **Presenters** show a model to the user, who confirms (possibly after
//!   editing it) or cancels.
//! - **Selection** reports where the cursor is and can move it.
//! - **Message box** shows warnings.
//! - **Rewrite manager** (from `ducktool_core::rewrite`) applies edits.
//!
//! The traits are object-safe so a host can hand out `dyn` collaborators.
//! `AutoConfirmPresenterFactory`, `FixedSelection` and `LogMessageBox` are the
//! non-interactive implementations used by the CLI.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use ducktool_core::rewrite::RewriteManager;
use ducktool_core::state::ProjectState;
use ducktool_core::types::{QualifiedModuleName, QualifiedSelection};
use tracing::warn;

// ============================================================================
// Presenters
// ============================================================================

/// What the user did with a presented model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterDecision<M> {
    /// Proceed with the (possibly edited) model.
    Confirmed(M),
    /// Abandon the refactoring.
    Cancelled,
}

/// Shows a refactoring model to the user.
pub trait Presenter<M> {
    fn show(&mut self, model: M) -> PresenterDecision<M>;
}

/// Creates and releases presenters.
///
/// Every presenter handed out by `create` must come back through `release`;
/// [`PresenterGuard`] does that on every exit path.
pub trait PresenterFactory<M> {
    fn create(&self) -> Box<dyn Presenter<M>>;
    fn release(&self, presenter: Box<dyn Presenter<M>>);
}

/// Owns a presenter for one invocation and releases it on drop.
pub struct PresenterGuard<'f, M> {
    factory: &'f dyn PresenterFactory<M>,
    presenter: Option<Box<dyn Presenter<M>>>,
}

impl<'f, M> PresenterGuard<'f, M> {
    /// Create a presenter through `factory`.
    pub fn new(factory: &'f dyn PresenterFactory<M>) -> Self {
        Self {
            presenter: Some(factory.create()),
            factory,
        }
    }

    /// Show the model.
    pub fn show(&mut self, model: M) -> PresenterDecision<M> {
        match self.presenter.as_mut() {
            Some(presenter) => presenter.show(model),
            None => PresenterDecision::Cancelled,
        }
    }
}

impl<M> Drop for PresenterGuard<'_, M> {
    fn drop(&mut self) {
        if let Some(presenter) = self.presenter.take() {
            self.factory.release(presenter);
        }
    }
}

type Adjustment<M> = Arc<dyn Fn(&mut M) + Send + Sync>;

/// Presenter factory that confirms every model without user interaction.
///
/// An optional adjustment is applied to the model before confirming, which
/// is how the CLI feeds its `--name`/`--property` style options in. The
/// factory counts created and released presenters.
pub struct AutoConfirmPresenterFactory<M> {
    adjust: Option<Adjustment<M>>,
    created: AtomicUsize,
    released: AtomicUsize,
}

impl<M: 'static> AutoConfirmPresenterFactory<M> {
    /// Confirm models unchanged.
    pub fn new() -> Self {
        Self {
            adjust: None,
            created: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Apply `adjust` to each model before confirming it.
    pub fn with_adjustment(adjust: impl Fn(&mut M) + Send + Sync + 'static) -> Self {
        Self {
            adjust: Some(Arc::new(adjust)),
            ..Self::new()
        }
    }

    /// Presenters created so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Presenters released so far.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl<M: 'static> Default for AutoConfirmPresenterFactory<M> {
    fn default() -> Self {
        Self::new()
    }
}

struct AutoConfirmPresenter<M> {
    adjust: Option<Adjustment<M>>,
}

impl<M> Presenter<M> for AutoConfirmPresenter<M> {
    fn show(&mut self, mut model: M) -> PresenterDecision<M> {
        if let Some(adjust) = &self.adjust {
            adjust(&mut model);
        }
        PresenterDecision::Confirmed(model)
    }
}

impl<M: 'static> PresenterFactory<M> for AutoConfirmPresenterFactory<M> {
    fn create(&self) -> Box<dyn Presenter<M>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(AutoConfirmPresenter {
            adjust: self.adjust.clone(),
        })
    }

    fn release(&self, presenter: Box<dyn Presenter<M>>) {
        self.released.fetch_add(1, Ordering::SeqCst);
        drop(presenter);
    }
}

// ============================================================================
// Selection
// ============================================================================

/// The host's cursor and open modules.
pub trait SelectionService: Send + Sync {
    /// Where the cursor is, if a module is active.
    fn active_selection(&self) -> Option<QualifiedSelection>;

    /// Move the cursor. Returns false if the host refused.
    fn try_set_selection(&self, selection: &QualifiedSelection) -> bool;

    /// Modules currently open in the host.
    fn open_modules(&self) -> BTreeSet<QualifiedModuleName>;
}

/// A selection held in memory; navigation just moves it.
#[derive(Debug, Default)]
pub struct FixedSelection {
    selection: Mutex<Option<QualifiedSelection>>,
}

impl FixedSelection {
    /// Start with the cursor at `selection` (or nowhere).
    pub fn new(selection: Option<QualifiedSelection>) -> Self {
        Self {
            selection: Mutex::new(selection),
        }
    }
}

impl SelectionService for FixedSelection {
    fn active_selection(&self) -> Option<QualifiedSelection> {
        self.selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn try_set_selection(&self, selection: &QualifiedSelection) -> bool {
        *self.selection.lock().unwrap_or_else(PoisonError::into_inner) = Some(selection.clone());
        true
    }

    fn open_modules(&self) -> BTreeSet<QualifiedModuleName> {
        self.active_selection()
            .map(|s| s.module)
            .into_iter()
            .collect()
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Shows messages to the user.
pub trait MessageBox: Send + Sync {
    fn notify_warn(&self, title: &str, message: &str);
}

/// Message box writing to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMessageBox;

impl MessageBox for LogMessageBox {
    fn notify_warn(&self, title: &str, message: &str) {
        warn!(title, "{}", message);
    }
}

// ============================================================================
// Host
// ============================================================================

/// Everything a refactoring or command needs from its host.
#[derive(Clone, Copy)]
pub struct RefactoringHost<'a> {
    pub project: &'a ProjectState,
    pub selection: &'a dyn SelectionService,
    pub rewriter: &'a dyn RewriteManager,
    pub messages: &'a dyn MessageBox,
}

// ============================================================================
// Tests
// ============================================================================
