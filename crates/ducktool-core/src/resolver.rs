//! Resolver: builds a [`DeclarationGraph`] from module analyses.
//!
//! Resolution runs in two stages, matching the states of the resolution
//! state machine:
//!
//! 1. [`build_declarations`]: allocate ids, insert every declaration, bind
//!    `Implements` clauses and annotations. Produces a [`DeclaredGraph`].
//! 2. [`resolve_references`]: resolve every usage by name and attach the
//!    resulting references. Produces the final graph.
//!
//! # Name Lookup
//!
//! Names are case-insensitive. An unqualified name is looked up in order:
//! locals and parameters of the enclosing member (or the member itself, for
//! function return assignments), members of the current module, enum members
//! of the current module, exposed members of procedural modules, then module
//! names. A qualified name (`Module1.Foo`) is looked up among the exposed
//! members of the qualifying module. When several property accessors share a
//! name, the accessor matching the usage wins (`Set` → set, assignment →
//! let, read → get).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::{ModuleAnalysis, UsageData};
use crate::annotation::{parse_annotation, Annotation};
use crate::graph::{
    Accessibility, Declaration, DeclarationGraph, DeclarationId, DeclarationKind, GraphError,
    ImplementsClause, Reference, SyntaxKind,
};
use crate::types::{QualifiedModuleName, QualifiedSelection, Selection};

/// Type name used when none is declared.
pub const VARIANT: &str = "Variant";

/// Error type for resolution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// An analysis is internally inconsistent.
    #[error("invalid analysis for {module}: {message}")]
    InvalidAnalysis {
        module: QualifiedModuleName,
        message: String,
    },

    /// The analysis belongs to another project.
    #[error("module {module} does not belong to project '{project}'")]
    ForeignModule {
        module: QualifiedModuleName,
        project: String,
    },

    /// Graph invariant violated.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Counts reported after reference resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    pub declarations: usize,
    pub references: usize,
    pub unresolved: usize,
}

/// A graph with declarations but no references yet.
#[derive(Debug, Clone)]
pub struct DeclaredGraph {
    graph: DeclarationGraph,
    /// module → declaration ids, indexed like `ModuleAnalysis::declarations`.
    ids: HashMap<QualifiedModuleName, Vec<DeclarationId>>,
}

impl DeclaredGraph {
    /// The graph built so far (declarations only).
    pub fn graph(&self) -> &DeclarationGraph {
        &self.graph
    }
}

// ============================================================================
// Stage 1: declarations
// ============================================================================

/// Build the declarations of every module.
pub fn build_declarations(
    project: &str,
    analyses: &[Arc<ModuleAnalysis>],
) -> Result<DeclaredGraph, ResolveError> {
    let mut graph = DeclarationGraph::new(project);
    let mut ids = HashMap::new();

    for analysis in analyses {
        if analysis.module.project != project {
            return Err(ResolveError::ForeignModule {
                module: analysis.module.clone(),
                project: project.to_string(),
            });
        }
        analysis
            .validate_indices()
            .map_err(|message| ResolveError::InvalidAnalysis {
                module: analysis.module.clone(),
                message,
            })?;
        let module_ids = declare_module(&mut graph, analysis)?;
        ids.insert(analysis.module.clone(), module_ids);
    }

    for analysis in analyses {
        bind_implements(&mut graph, analysis);
        let module_ids = ids.get(&analysis.module).cloned().unwrap_or_default();
        bind_annotations(&mut graph, analysis, &module_ids);
    }

    debug!(
        modules = analyses.len(),
        declarations = graph.declaration_count(),
        "declarations built"
    );
    Ok(DeclaredGraph { graph, ids })
}

fn declare_module(
    graph: &mut DeclarationGraph,
    analysis: &ModuleAnalysis,
) -> Result<Vec<DeclarationId>, ResolveError> {
    let module_id = graph.next_declaration_id();
    graph.insert_declaration(Declaration {
        id: module_id,
        name: analysis.module.module.clone(),
        kind: analysis.kind.declaration_kind(),
        type_name: analysis.module.module.clone(),
        is_array: false,
        accessibility: Accessibility::Public,
        module: analysis.module.clone(),
        selection: Selection::home(),
        context_selection: None,
        parent: None,
        parameter: None,
        annotations: Vec::new(),
    })?;
    graph.set_module_hash(analysis.module.clone(), analysis.content_hash.clone());

    let mut module_ids = Vec::with_capacity(analysis.declarations.len());
    for data in &analysis.declarations {
        let id = graph.next_declaration_id();
        let parent = match data.parent_index {
            Some(index) => module_ids.get(index).copied().unwrap_or(module_id),
            None => module_id,
        };
        graph.insert_declaration(Declaration {
            id,
            name: data.name.clone(),
            kind: data.kind,
            type_name: data
                .type_name
                .clone()
                .unwrap_or_else(|| VARIANT.to_string()),
            is_array: data.is_array,
            accessibility: data.accessibility,
            module: analysis.module.clone(),
            selection: data.selection,
            context_selection: data.context_selection,
            parent: Some(parent),
            parameter: data.parameter.clone(),
            annotations: Vec::new(),
        })?;
        module_ids.push(id);
    }
    Ok(module_ids)
}

fn bind_implements(graph: &mut DeclarationGraph, analysis: &ModuleAnalysis) {
    for clause in &analysis.implements {
        let interface = graph.module_named(&clause.interface).map(|d| d.module.clone());
        match interface {
            Some(interface) => graph.insert_implements(
                analysis.module.clone(),
                ImplementsClause {
                    interface,
                    selection: QualifiedSelection::new(analysis.module.clone(), clause.selection),
                },
            ),
            None => warn!(
                module = %analysis.module,
                interface = %clause.interface,
                "implemented interface is not a project module"
            ),
        }
    }
}

fn bind_annotations(
    graph: &mut DeclarationGraph,
    analysis: &ModuleAnalysis,
    module_ids: &[DeclarationId],
) {
    let mut parsed = Vec::new();
    for comment in &analysis.comments {
        match parse_annotation(&comment.text) {
            Ok(Some((kind, parameters))) => parsed.push((comment, kind, parameters)),
            Ok(None) => {}
            Err(err) => warn!(
                module = %analysis.module,
                line = comment.selection.start_line,
                %err,
                "ignoring annotation"
            ),
        }
    }
    let annotation_lines: BTreeSet<u32> = parsed
        .iter()
        .map(|(comment, _, _)| comment.selection.start_line)
        .collect();

    for (comment, kind, parameters) in parsed {
        let mut annotated_line = comment.selection.end_line + 1;
        while annotation_lines.contains(&annotated_line) {
            annotated_line += 1;
        }

        let target = if kind.is_module_scoped() {
            graph.module_declaration(&analysis.module).map(|d| d.id)
        } else {
            module_ids
                .iter()
                .filter_map(|id| graph.declaration(*id))
                .filter(|d| d.kind != DeclarationKind::Parameter)
                .find(|d| d.context_selection.unwrap_or(d.selection).start_line == annotated_line)
                .map(|d| d.id)
        };
        let Some(target) = target else {
            warn!(
                module = %analysis.module,
                annotation = %kind,
                line = annotated_line,
                "annotation has no target"
            );
            continue;
        };

        let annotation = Annotation {
            kind,
            parameters,
            selection: QualifiedSelection::new(analysis.module.clone(), comment.selection),
            annotated_line,
        };
        if let Err(err) = graph.attach_annotation(target, annotation) {
            warn!(module = %analysis.module, %err, "dropping annotation");
        }
    }
}

// ============================================================================
// Stage 2: references
// ============================================================================

/// Resolve every usage into a reference.
pub fn resolve_references(
    declared: DeclaredGraph,
    analyses: &[Arc<ModuleAnalysis>],
) -> Result<(DeclarationGraph, ResolveSummary), ResolveError> {
    let DeclaredGraph { mut graph, ids } = declared;
    let mut summary = ResolveSummary::default();

    for analysis in analyses {
        let module_ids = ids.get(&analysis.module).map(Vec::as_slice).unwrap_or(&[]);
        for usage in &analysis.usages {
            let scope = usage.member_index.and_then(|i| module_ids.get(i).copied());
            match resolve_usage(&graph, &analysis.module, scope, usage) {
                Some(declaration) => {
                    let id = graph.next_reference_id();
                    graph.insert_reference(Reference {
                        id,
                        declaration,
                        selection: QualifiedSelection::new(analysis.module.clone(), usage.selection),
                        is_assignment: usage.is_assignment,
                        context: usage.context.clone(),
                        scope,
                    })?;
                    summary.references += 1;
                }
                None => {
                    debug!(module = %analysis.module, name = %usage.name, "unresolved identifier");
                    summary.unresolved += 1;
                }
            }
        }
    }

    summary.declarations = graph.declaration_count();
    debug!(
        references = summary.references,
        unresolved = summary.unresolved,
        "references resolved"
    );
    Ok((graph, summary))
}

fn resolve_usage(
    graph: &DeclarationGraph,
    module: &QualifiedModuleName,
    scope: Option<DeclarationId>,
    usage: &UsageData,
) -> Option<DeclarationId> {
    if let Some(qualifier) = &usage.qualifier {
        let target = graph.module_named(qualifier)?;
        let same_module = &target.module == module;
        let candidates = graph.members(&target.module, |d| {
            d.name_eq(&usage.name) && (same_module || d.accessibility.is_exposed())
        });
        return pick(&candidates, usage);
    }

    if let Some(scope) = scope {
        let locals: Vec<&Declaration> = graph
            .children_of(scope)
            .into_iter()
            .filter(|d| d.name_eq(&usage.name))
            .collect();
        if let Some(found) = pick(&locals, usage) {
            return Some(found);
        }
        if let Some(member) = graph.declaration(scope) {
            if member.name_eq(&usage.name)
                && usage.is_assignment
                && matches!(
                    member.kind,
                    DeclarationKind::Function | DeclarationKind::PropertyGet
                )
            {
                return Some(member.id);
            }
        }
    }

    let own = graph.members(module, |d| d.name_eq(&usage.name));
    if let Some(found) = pick(&own, usage) {
        return Some(found);
    }
    if let Some(found) = enum_member(graph, module, &usage.name, true) {
        return Some(found);
    }

    let others: Vec<&QualifiedModuleName> = graph.modules().filter(|m| *m != module).collect();
    for other in others {
        let procedural = graph
            .module_declaration(other)
            .map(|d| d.kind == DeclarationKind::ProceduralModule)
            .unwrap_or(false);
        if !procedural {
            continue;
        }
        let exposed = graph.members(other, |d| {
            d.name_eq(&usage.name) && d.accessibility.is_exposed()
        });
        if let Some(found) = pick(&exposed, usage) {
            return Some(found);
        }
        if let Some(found) = enum_member(graph, other, &usage.name, false) {
            return Some(found);
        }
    }

    graph.module_named(&usage.name).map(|d| d.id)
}

/// Enum members are visible wherever their enumeration is.
fn enum_member(
    graph: &DeclarationGraph,
    module: &QualifiedModuleName,
    name: &str,
    same_module: bool,
) -> Option<DeclarationId> {
    graph
        .members(module, |d| {
            d.kind == DeclarationKind::Enumeration && (same_module || d.accessibility.is_exposed())
        })
        .into_iter()
        .flat_map(|e| graph.children_of(e.id))
        .find(|m| m.kind == DeclarationKind::EnumerationMember && m.name_eq(name))
        .map(|m| m.id)
}

/// Choose among same-named candidates, preferring the accessor the usage implies.
fn pick(candidates: &[&Declaration], usage: &UsageData) -> Option<DeclarationId> {
    if candidates.len() <= 1 || !candidates.iter().any(|d| d.kind.is_property()) {
        return candidates.first().map(|d| d.id);
    }
    let wanted = if usage.context.contains(&SyntaxKind::SetStmt) && usage.is_assignment {
        DeclarationKind::PropertySet
    } else if usage.is_assignment {
        DeclarationKind::PropertyLet
    } else {
        DeclarationKind::PropertyGet
    };
    candidates
        .iter()
        .find(|d| d.kind == wanted)
        .or_else(|| candidates.first())
        .map(|d| d.id)
}
