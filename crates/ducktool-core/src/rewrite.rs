//! Rewrite sessions: atomic, multi-module text edits.
//!
//! This module implements the edit infrastructure used by refactorings:
//! - Selection-addressed edits keyed by qualified module name
//! - Preconditions on module content hashes (staleness detection)
//! - Conflict detection (overlapping edits, out-of-bounds selections)
//! - Atomic apply semantics (all-or-nothing)
//!
//! A [`RewriteManager`] hands out [`RewriteSession`]s. A session only
//! records edits; nothing is visible until [`RewriteSession::commit`], which
//! either applies every edit or reports the conflicts and applies none.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::text::{line_ending, position_to_byte_offset, selection_to_span};
use crate::types::{QualifiedModuleName, Selection};

/// Hash type for content verification (SHA-256, stored as hex string for JSON compatibility).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute SHA-256 hash of the given bytes, returning hex-encoded string.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex::encode(hasher.finalize()))
    }

    /// Hash a module's source text.
    pub fn of_text(text: &str) -> Self {
        Self::compute(text.as_bytes())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A byte range `[start, end)` in a module's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start must not exceed end");
        Span { start, end }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True if the span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True if the spans share at least one byte.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ============================================================================
// Edits
// ============================================================================

/// Where an edit lands in its module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditKind {
    /// Replace the text covered by a selection.
    Replace { selection: Selection },
    /// Insert text at a position.
    Insert { line: u32, column: u32 },
    /// Append text at the end of the module, on a new line.
    Append,
    /// Create a new module with the edit text as its content.
    CreateModule,
}

/// A single text edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub module: QualifiedModuleName,
    #[serde(flatten)]
    pub kind: EditKind,
    pub text: String,
}

/// Checks that must pass before any edit can apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precondition {
    /// Module content hash must match.
    ModuleHashMatches {
        module: QualifiedModuleName,
        content_hash: ContentHash,
    },
}

/// A detected invalidation that prevents apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conflict {
    /// Precondition failed.
    PreconditionFailed {
        precondition: Precondition,
        reason: String,
    },

    /// Two edits overlap in the same module.
    OverlappingEdits {
        module: QualifiedModuleName,
        first: Span,
        second: Span,
    },

    /// Selection does not exist in the module text.
    SelectionOutOfBounds {
        module: QualifiedModuleName,
        selection: Selection,
    },

    /// Module not found.
    ModuleMissing { module: QualifiedModuleName },

    /// A module to be created already exists.
    ModuleExists { module: QualifiedModuleName },
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::PreconditionFailed { reason, .. } => write!(f, "{}", reason),
            Conflict::OverlappingEdits { module, .. } => {
                write!(f, "overlapping edits in {}", module)
            }
            Conflict::SelectionOutOfBounds { module, selection } => {
                write!(f, "selection {} is out of bounds in {}", selection, module)
            }
            Conflict::ModuleMissing { module } => write!(f, "module {} not found", module),
            Conflict::ModuleExists { module } => write!(f, "module {} already exists", module),
        }
    }
}

// ============================================================================
// PatchSet
// ============================================================================

/// An ordered set of edits plus the preconditions they were computed under.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchSet {
    pub preconditions: Vec<Precondition>,
    pub edits: Vec<Edit>,
}

/// Result of attempting to apply a PatchSet.
#[derive(Debug, Clone)]
pub enum ApplyResult {
    /// All edits applied successfully.
    Success {
        /// The new content for each modified or created module.
        modified: BTreeMap<QualifiedModuleName, String>,
    },

    /// Apply failed; nothing was modified.
    Failed { conflicts: Vec<Conflict> },
}

impl PatchSet {
    /// Create an empty patch set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a precondition (builder pattern).
    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// Add an edit (builder pattern).
    pub fn with_edit(mut self, edit: Edit) -> Self {
        self.edits.push(edit);
        self
    }

    /// Modules touched by this patch set, in order.
    pub fn modules(&self) -> BTreeSet<&QualifiedModuleName> {
        self.edits.iter().map(|e| &e.module).collect()
    }

    /// Apply this PatchSet atomically against the given module texts.
    ///
    /// Either all edits apply, or none do. Edits are applied in reverse offset
    /// order within each module; edits at the same offset keep their
    /// recording order.
    #[must_use]
    pub fn apply(&self, current: &BTreeMap<QualifiedModuleName, String>) -> ApplyResult {
        let mut conflicts = Vec::new();

        for precondition in &self.preconditions {
            match precondition {
                Precondition::ModuleHashMatches {
                    module,
                    content_hash,
                } => match current.get(module) {
                    Some(text) => {
                        let actual = ContentHash::of_text(text);
                        if &actual != content_hash {
                            conflicts.push(Conflict::PreconditionFailed {
                                precondition: precondition.clone(),
                                reason: format!(
                                    "module {} changed: expected {}, got {}",
                                    module, content_hash, actual
                                ),
                            });
                        }
                    }
                    None => conflicts.push(Conflict::ModuleMissing {
                        module: module.clone(),
                    }),
                },
            }
        }

        let mut created: BTreeMap<QualifiedModuleName, String> = BTreeMap::new();
        let mut resolved: BTreeMap<&QualifiedModuleName, Vec<(Span, usize, &Edit)>> =
            BTreeMap::new();

        for (order, edit) in self.edits.iter().enumerate() {
            if edit.kind == EditKind::CreateModule {
                if current.contains_key(&edit.module) || created.contains_key(&edit.module) {
                    conflicts.push(Conflict::ModuleExists {
                        module: edit.module.clone(),
                    });
                } else {
                    created.insert(edit.module.clone(), edit.text.clone());
                }
                continue;
            }

            let Some(content) = current.get(&edit.module) else {
                conflicts.push(Conflict::ModuleMissing {
                    module: edit.module.clone(),
                });
                continue;
            };

            let span = match &edit.kind {
                EditKind::Replace { selection } => {
                    selection_to_span(content, selection).ok_or(*selection)
                }
                EditKind::Insert { line, column } => {
                    position_to_byte_offset(content, *line, *column)
                        .map(|offset| Span::new(offset, offset))
                        .ok_or(Selection::at(*line, *column))
                }
                EditKind::Append => Ok(Span::new(content.len(), content.len())),
                EditKind::CreateModule => continue,
            };
            match span {
                Ok(span) => resolved
                    .entry(&edit.module)
                    .or_default()
                    .push((span, order, edit)),
                Err(selection) => conflicts.push(Conflict::SelectionOutOfBounds {
                    module: edit.module.clone(),
                    selection,
                }),
            }
        }

        for (module, edits) in &resolved {
            let mut sorted: Vec<&(Span, usize, &Edit)> = edits.iter().collect();
            sorted.sort_by_key(|(span, order, _)| (span.start, span.end, *order));
            for pair in sorted.windows(2) {
                if pair[0].0.overlaps(&pair[1].0) {
                    conflicts.push(Conflict::OverlappingEdits {
                        module: (*module).clone(),
                        first: pair[0].0,
                        second: pair[1].0,
                    });
                }
            }
        }

        if !conflicts.is_empty() {
            return ApplyResult::Failed { conflicts };
        }

        let mut modified = created;
        for (module, mut edits) in resolved {
            let Some(original) = current.get(module) else {
                continue;
            };
            let mut content = original.clone();
            let newline = line_ending(original);

            // Apply from end to start to preserve offsets.
            edits.sort_by(|a, b| (b.0.start, b.1).cmp(&(a.0.start, a.1)));
            for (span, _, edit) in edits {
                // Edit text is written with `\n`; it takes the module's line ending.
                let body = if newline == "\r\n" && !edit.text.contains("\r\n") {
                    edit.text.replace('\n', "\r\n")
                } else {
                    edit.text.clone()
                };
                let text = match edit.kind {
                    EditKind::Append if !content.is_empty() && !content.ends_with('\n') => {
                        format!("{}{}", newline, body)
                    }
                    _ => body,
                };
                content.replace_range(span.start..span.end, &text);
            }
            modified.insert(module.clone(), content);
        }

        ApplyResult::Success { modified }
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Outcome of committing a rewrite session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every edit was applied.
    Committed { modules: Vec<QualifiedModuleName> },
    /// Nothing was applied.
    Conflict { conflicts: Vec<Conflict> },
}

impl CommitOutcome {
    /// True if the session committed.
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }
}

/// An atomic batch of text edits keyed by qualified module name.
pub trait RewriteSession: Send {
    /// Replace the text covered by `selection`.
    fn replace(&mut self, module: &QualifiedModuleName, selection: Selection, text: &str);

    /// Insert text at a position.
    fn insert(&mut self, module: &QualifiedModuleName, line: u32, column: u32, text: &str);

    /// Append text at the end of a module.
    fn append(&mut self, module: &QualifiedModuleName, text: &str);

    /// Create a new module.
    fn create_module(&mut self, module: &QualifiedModuleName, text: &str);

    /// Require the module to still hash to `hash` at commit time.
    fn require_unchanged(&mut self, module: &QualifiedModuleName, hash: ContentHash);

    /// Number of edits recorded so far.
    fn edit_count(&self) -> usize;

    /// Apply every edit or none.
    fn commit(self: Box<Self>) -> CommitOutcome;
}

/// Hands out rewrite sessions for one project.
pub trait RewriteManager: Send + Sync {
    /// Open a new session.
    fn begin_session(&self) -> Box<dyn RewriteSession + '_>;

    /// Current text of a module.
    fn module_text(&self, module: &QualifiedModuleName) -> Option<String>;
}

/// A session that records edits into a [`PatchSet`].
///
/// Concrete managers only need to supply the commit step.
#[derive(Debug, Default)]
pub struct RecordingSession {
    patch: PatchSet,
}

impl RecordingSession {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded patch set.
    pub fn patch(&self) -> &PatchSet {
        &self.patch
    }

    /// Consume the session, returning the recorded patch set.
    pub fn into_patch(self) -> PatchSet {
        self.patch
    }

    fn push(&mut self, module: &QualifiedModuleName, kind: EditKind, text: &str) {
        self.patch.edits.push(Edit {
            module: module.clone(),
            kind,
            text: text.to_string(),
        });
    }

    /// Record a replacement.
    pub fn replace(&mut self, module: &QualifiedModuleName, selection: Selection, text: &str) {
        self.push(module, EditKind::Replace { selection }, text);
    }

    /// Record an insertion.
    pub fn insert(&mut self, module: &QualifiedModuleName, line: u32, column: u32, text: &str) {
        self.push(module, EditKind::Insert { line, column }, text);
    }

    /// Record an append.
    pub fn append(&mut self, module: &QualifiedModuleName, text: &str) {
        self.push(module, EditKind::Append, text);
    }

    /// Record a module creation.
    pub fn create_module(&mut self, module: &QualifiedModuleName, text: &str) {
        self.push(module, EditKind::CreateModule, text);
    }

    /// Record a content hash precondition, once per module.
    pub fn require_unchanged(&mut self, module: &QualifiedModuleName, hash: ContentHash) {
        let exists = self.patch.preconditions.iter().any(|p| {
            let Precondition::ModuleHashMatches { module: m, .. } = p;
            m == module
        });
        if !exists {
            self.patch.preconditions.push(Precondition::ModuleHashMatches {
                module: module.clone(),
                content_hash: hash,
            });
        }
    }
}

// ============================================================================
// In-memory module buffers
// ============================================================================

/// In-memory module texts for one project, committed to atomically.
///
/// Commits take the write lock for the whole apply, so only one commit is
/// in flight at a time and readers never see a half-applied batch.
#[derive(Debug, Default)]
pub struct ModuleBuffers {
    texts: RwLock<BTreeMap<QualifiedModuleName, String>>,
}

impl ModuleBuffers {
    /// Create empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create buffers from existing module texts.
    pub fn from_modules(modules: impl IntoIterator<Item = (QualifiedModuleName, String)>) -> Self {
        ModuleBuffers {
            texts: RwLock::new(modules.into_iter().collect()),
        }
    }

    /// Set (or replace) a module's text outside of any session.
    pub fn set_text(&self, module: QualifiedModuleName, text: impl Into<String>) {
        self.texts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module, text.into());
    }

    /// Current text of a module.
    pub fn text(&self, module: &QualifiedModuleName) -> Option<String> {
        self.texts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module)
            .cloned()
    }

    /// Current content hash of a module.
    pub fn hash(&self, module: &QualifiedModuleName) -> Option<ContentHash> {
        self.texts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module)
            .map(|t| ContentHash::of_text(t))
    }

    /// Copy of every module text.
    pub fn snapshot(&self) -> BTreeMap<QualifiedModuleName, String> {
        self.texts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply a patch set atomically.
    pub fn commit_patch(&self, patch: &PatchSet) -> CommitOutcome {
        let mut texts = self.texts.write().unwrap_or_else(PoisonError::into_inner);
        match patch.apply(&texts) {
            ApplyResult::Success { modified } => {
                let modules: Vec<QualifiedModuleName> = modified.keys().cloned().collect();
                for (module, text) in modified {
                    texts.insert(module, text);
                }
                debug!(modules = modules.len(), edits = patch.edits.len(), "commit applied");
                CommitOutcome::Committed { modules }
            }
            ApplyResult::Failed { conflicts } => {
                warn!(conflicts = conflicts.len(), "commit rejected");
                CommitOutcome::Conflict { conflicts }
            }
        }
    }
}

/// Session over [`ModuleBuffers`].
pub struct BufferSession<'a> {
    buffers: &'a ModuleBuffers,
    recorded: RecordingSession,
}

impl RewriteSession for BufferSession<'_> {
    fn replace(&mut self, module: &QualifiedModuleName, selection: Selection, text: &str) {
        self.recorded.replace(module, selection, text);
    }

    fn insert(&mut self, module: &QualifiedModuleName, line: u32, column: u32, text: &str) {
        self.recorded.insert(module, line, column, text);
    }

    fn append(&mut self, module: &QualifiedModuleName, text: &str) {
        self.recorded.append(module, text);
    }

    fn create_module(&mut self, module: &QualifiedModuleName, text: &str) {
        self.recorded.create_module(module, text);
    }

    fn require_unchanged(&mut self, module: &QualifiedModuleName, hash: ContentHash) {
        self.recorded.require_unchanged(module, hash);
    }

    fn edit_count(&self) -> usize {
        self.recorded.patch().edits.len()
    }

    fn commit(self: Box<Self>) -> CommitOutcome {
        let this = *self;
        this.buffers.commit_patch(this.recorded.patch())
    }
}

impl RewriteManager for ModuleBuffers {
    fn begin_session(&self) -> Box<dyn RewriteSession + '_> {
        Box::new(BufferSession {
            buffers: self,
            recorded: RecordingSession::new(),
        })
    }

    fn module_text(&self, module: &QualifiedModuleName) -> Option<String> {
        self.text(module)
    }
}

// ============================================================================
// Tests
// ============================================================================
