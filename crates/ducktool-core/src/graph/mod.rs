//! Declaration graph: the project symbol table.
//!
//! This module provides the semantic data model for ducktool:
//! - [`Declaration`]: every declared identifier (modules, members, fields,
//!   locals, parameters, enum members, ...)
//! - [`Reference`]: every resolved use-site of a declaration, tagged read or
//!   write and carrying its syntax ancestry
//! - [`ImplementsClause`]: `Implements <Interface>` statements per module
//!
//! The [`DeclarationGraph`] provides in-memory storage with:
//! - BTreeMaps for deterministic iteration
//! - Postings lists for efficient queries (declaration → refs, module → decls)
//! - Identity lookup by (module, selection)
//!
//! # Identity
//!
//! A declaration is identified by its qualified module name and the selection
//! of its identifier. Inserting a second declaration with the same identity
//! is rejected with [`GraphError::DuplicateIdentity`].
//!
//! # Mutation
//!
//! Only the resolver (inside this crate) populates a graph. Consumers reach a
//! graph through a `Ready` snapshot of the resolution state machine and only
//! ever see `&DeclarationGraph`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotation::{Annotation, AnnotationError, AnnotationKind};
use crate::rewrite::ContentHash;
use crate::types::{QualifiedModuleName, QualifiedSelection, Selection};

// ============================================================================
// Errors
// ============================================================================

/// Error type for graph construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Two declarations share (module, selection).
    #[error("declaration '{name}' reuses the identity of '{existing}' at {selection}")]
    DuplicateIdentity {
        name: String,
        existing: String,
        selection: QualifiedSelection,
    },

    /// A reference or child points at a declaration that does not exist.
    #[error("unknown declaration {0}")]
    UnknownDeclaration(DeclarationId),

    /// A module was declared twice.
    #[error("module {0} declared twice")]
    DuplicateModule(QualifiedModuleName),
}

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a declaration within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclarationId(pub u32);

impl DeclarationId {
    /// Create a new DeclarationId.
    pub fn new(id: u32) -> Self {
        DeclarationId(id)
    }
}

impl fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decl_{}", self.0)
    }
}

/// Unique identifier for a reference within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceId(pub u32);

impl ReferenceId {
    /// Create a new ReferenceId.
    pub fn new(id: u32) -> Self {
        ReferenceId(id)
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref_{}", self.0)
    }
}

// ============================================================================
// Kinds
// ============================================================================

/// Kind of declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    ProceduralModule,
    ClassModule,
    DocumentModule,
    UserForm,
    Variable,
    Constant,
    Procedure,
    Function,
    PropertyGet,
    PropertyLet,
    PropertySet,
    Event,
    Parameter,
    Enumeration,
    EnumerationMember,
    UserDefinedType,
    UserDefinedTypeMember,
    LineLabel,
}

impl DeclarationKind {
    /// Module-level kinds (the declaration *is* a module).
    pub fn is_module(&self) -> bool {
        matches!(
            self,
            DeclarationKind::ProceduralModule
                | DeclarationKind::ClassModule
                | DeclarationKind::DocumentModule
                | DeclarationKind::UserForm
        )
    }

    /// Modules that define a class (and can implement or be an interface).
    pub fn is_class_module(&self) -> bool {
        matches!(
            self,
            DeclarationKind::ClassModule | DeclarationKind::DocumentModule | DeclarationKind::UserForm
        )
    }

    /// Procedures, functions and property accessors.
    pub fn is_member(&self) -> bool {
        matches!(
            self,
            DeclarationKind::Procedure
                | DeclarationKind::Function
                | DeclarationKind::PropertyGet
                | DeclarationKind::PropertyLet
                | DeclarationKind::PropertySet
        )
    }

    /// Property get/let/set.
    pub fn is_property(&self) -> bool {
        matches!(
            self,
            DeclarationKind::PropertyGet | DeclarationKind::PropertyLet | DeclarationKind::PropertySet
        )
    }

    /// Human-readable name used in messages.
    pub fn label(&self) -> &'static str {
        match self {
            DeclarationKind::ProceduralModule => "standard module",
            DeclarationKind::ClassModule => "class module",
            DeclarationKind::DocumentModule => "document module",
            DeclarationKind::UserForm => "user form",
            DeclarationKind::Variable => "variable",
            DeclarationKind::Constant => "constant",
            DeclarationKind::Procedure => "procedure",
            DeclarationKind::Function => "function",
            DeclarationKind::PropertyGet => "property get",
            DeclarationKind::PropertyLet => "property let",
            DeclarationKind::PropertySet => "property set",
            DeclarationKind::Event => "event",
            DeclarationKind::Parameter => "parameter",
            DeclarationKind::Enumeration => "enumeration",
            DeclarationKind::EnumerationMember => "enumeration member",
            DeclarationKind::UserDefinedType => "user-defined type",
            DeclarationKind::UserDefinedTypeMember => "user-defined type member",
            DeclarationKind::LineLabel => "line label",
        }
    }

    /// Statement keyword opening a member of this kind.
    pub fn member_keyword(&self) -> Option<&'static str> {
        match self {
            DeclarationKind::Procedure => Some("Sub"),
            DeclarationKind::Function => Some("Function"),
            DeclarationKind::PropertyGet => Some("Property Get"),
            DeclarationKind::PropertyLet => Some("Property Let"),
            DeclarationKind::PropertySet => Some("Property Set"),
            _ => None,
        }
    }

    /// Statement closing a member of this kind.
    pub fn member_terminator(&self) -> Option<&'static str> {
        match self {
            DeclarationKind::Procedure => Some("End Sub"),
            DeclarationKind::Function => Some("End Function"),
            DeclarationKind::PropertyGet
            | DeclarationKind::PropertyLet
            | DeclarationKind::PropertySet => Some("End Property"),
            _ => None,
        }
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Visibility scope of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    /// No access modifier written.
    Implicit,
    Private,
    Friend,
    Public,
}

impl Accessibility {
    /// Visible from other modules of the project.
    pub fn is_exposed(&self) -> bool {
        !matches!(self, Accessibility::Private)
    }

    /// The modifier keyword, if one is written.
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Accessibility::Implicit => None,
            Accessibility::Private => Some("Private"),
            Accessibility::Friend => Some("Friend"),
            Accessibility::Public => Some("Public"),
        }
    }
}

/// How an argument is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Passing {
    /// `ByRef`, or nothing written (the language default).
    #[default]
    ByRef,
    ByVal,
}

/// Parameter-specific attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub passing: Passing,
    /// `ByVal`/`ByRef` written explicitly.
    pub explicit_passing: bool,
    pub optional: bool,
    pub param_array: bool,
    pub default_value: Option<String>,
}

/// Syntax node kinds recorded on the ancestry path of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxKind {
    Expression,
    ArgumentList,
    MemberAccess,
    /// Value assignment, `[Let] x = expr`.
    LetStmt,
    /// Object assignment, `Set x = expr`.
    SetStmt,
    CallStmt,
    ForNextStmt,
    ForEachStmt,
    WithStmt,
    RedimStmt,
    IfStmt,
    SelectCaseStmt,
    DoLoopStmt,
    WhileWendStmt,
}

impl SyntaxKind {
    /// True for value-assignment and object-assignment statements.
    pub fn is_assignment_statement(&self) -> bool {
        matches!(self, SyntaxKind::LetStmt | SyntaxKind::SetStmt)
    }
}

// ============================================================================
// Declarations and References
// ============================================================================

/// A declared identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub id: DeclarationId,
    pub name: String,
    pub kind: DeclarationKind,
    /// Declared type (`Variant` when none is written).
    pub type_name: String,
    pub is_array: bool,
    pub accessibility: Accessibility,
    pub module: QualifiedModuleName,
    /// Selection of the identifier.
    pub selection: Selection,
    /// Selection of the whole declaring statement (or member body).
    pub context_selection: Option<Selection>,
    /// Module declaration for module-level declarations; member for locals.
    pub parent: Option<DeclarationId>,
    /// Present on parameters.
    pub parameter: Option<ParameterInfo>,
    pub annotations: Vec<Annotation>,
}

impl Declaration {
    /// The identity key (module, selection).
    pub fn qualified_selection(&self) -> QualifiedSelection {
        QualifiedSelection::new(self.module.clone(), self.selection)
    }

    /// Case-insensitive name comparison.
    pub fn name_eq(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// True if the declaration carries an annotation of `kind`.
    pub fn has_annotation(&self, kind: AnnotationKind) -> bool {
        self.annotations.iter().any(|a| a.kind == kind)
    }
}

/// A resolved use-site of a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: ReferenceId,
    pub declaration: DeclarationId,
    pub selection: QualifiedSelection,
    /// Write use (assignment target) rather than a read.
    pub is_assignment: bool,
    /// Syntax ancestry of the use-site, innermost first.
    pub context: Vec<SyntaxKind>,
    /// Member in which the reference occurs, if any.
    pub scope: Option<DeclarationId>,
}

impl Reference {
    /// The nearest assignment statement on the ancestry path.
    pub fn assignment_statement(&self) -> Option<SyntaxKind> {
        self.context
            .iter()
            .copied()
            .find(SyntaxKind::is_assignment_statement)
    }
}

/// An `Implements <Interface>` statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementsClause {
    pub interface: QualifiedModuleName,
    /// Selection of the whole statement.
    pub selection: QualifiedSelection,
}

// ============================================================================
// DeclarationGraph
// ============================================================================

/// In-memory declaration graph for one project.
#[derive(Debug, Clone, Default)]
pub struct DeclarationGraph {
    project: String,

    // Primary storage
    declarations: BTreeMap<DeclarationId, Declaration>,
    references: BTreeMap<ReferenceId, Reference>,

    // Secondary indexes
    /// (module, selection) → declaration.
    by_identity: HashMap<QualifiedSelection, DeclarationId>,
    /// lowercase name → declarations.
    by_name: HashMap<String, Vec<DeclarationId>>,
    /// module → module declaration.
    module_declarations: BTreeMap<QualifiedModuleName, DeclarationId>,
    /// module → implements clauses, in source order.
    implements: BTreeMap<QualifiedModuleName, Vec<ImplementsClause>>,
    /// module → content hash of the text the graph was built from.
    module_hashes: BTreeMap<QualifiedModuleName, ContentHash>,

    // Postings lists
    /// module → declaration ids (insertion order).
    decls_by_module: HashMap<QualifiedModuleName, Vec<DeclarationId>>,
    /// parent → child ids (insertion order).
    children: HashMap<DeclarationId, Vec<DeclarationId>>,
    /// declaration → reference ids.
    refs_by_declaration: HashMap<DeclarationId, Vec<ReferenceId>>,
    /// module → reference ids.
    refs_by_module: HashMap<QualifiedModuleName, Vec<ReferenceId>>,

    next_declaration_id: u32,
    next_reference_id: u32,
}

fn by_position(a: &&Declaration, b: &&Declaration) -> std::cmp::Ordering {
    a.selection.start().cmp(&b.selection.start())
}

impl DeclarationGraph {
    /// Create an empty graph for `project`.
    pub fn new(project: impl Into<String>) -> Self {
        DeclarationGraph {
            project: project.into(),
            ..Default::default()
        }
    }

    /// Project name.
    pub fn project(&self) -> &str {
        &self.project
    }

    // ------------------------------------------------------------------------
    // Construction (resolver only)
    // ------------------------------------------------------------------------

    pub(crate) fn next_declaration_id(&mut self) -> DeclarationId {
        let id = DeclarationId(self.next_declaration_id);
        self.next_declaration_id += 1;
        id
    }

    pub(crate) fn next_reference_id(&mut self) -> ReferenceId {
        let id = ReferenceId(self.next_reference_id);
        self.next_reference_id += 1;
        id
    }

    pub(crate) fn insert_declaration(&mut self, declaration: Declaration) -> Result<(), GraphError> {
        let key = declaration.qualified_selection();
        if declaration.kind.is_module() {
            if self.module_declarations.contains_key(&declaration.module) {
                return Err(GraphError::DuplicateModule(declaration.module.clone()));
            }
        } else if let Some(existing) = self.by_identity.get(&key) {
            return Err(GraphError::DuplicateIdentity {
                name: declaration.name.clone(),
                existing: self.declarations[existing].name.clone(),
                selection: key,
            });
        }
        if let Some(parent) = declaration.parent {
            if !self.declarations.contains_key(&parent) {
                return Err(GraphError::UnknownDeclaration(parent));
            }
            self.children.entry(parent).or_default().push(declaration.id);
        }

        let id = declaration.id;
        if declaration.kind.is_module() {
            self.module_declarations.insert(declaration.module.clone(), id);
        } else {
            self.by_identity.insert(key, id);
        }
        self.by_name
            .entry(declaration.name.to_ascii_lowercase())
            .or_default()
            .push(id);
        self.decls_by_module
            .entry(declaration.module.clone())
            .or_default()
            .push(id);
        self.declarations.insert(id, declaration);
        Ok(())
    }

    pub(crate) fn insert_reference(&mut self, reference: Reference) -> Result<(), GraphError> {
        if !self.declarations.contains_key(&reference.declaration) {
            return Err(GraphError::UnknownDeclaration(reference.declaration));
        }
        let id = reference.id;
        self.refs_by_declaration
            .entry(reference.declaration)
            .or_default()
            .push(id);
        self.refs_by_module
            .entry(reference.selection.module.clone())
            .or_default()
            .push(id);
        self.references.insert(id, reference);
        Ok(())
    }

    pub(crate) fn insert_implements(&mut self, module: QualifiedModuleName, clause: ImplementsClause) {
        self.implements.entry(module).or_default().push(clause);
    }

    pub(crate) fn set_module_hash(&mut self, module: QualifiedModuleName, hash: ContentHash) {
        self.module_hashes.insert(module, hash);
    }

    pub(crate) fn attach_annotation(
        &mut self,
        id: DeclarationId,
        annotation: Annotation,
    ) -> Result<(), AnnotationError> {
        match self.declarations.get_mut(&id) {
            Some(declaration) => annotation.attach_to(&mut declaration.annotations),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// Look up a declaration by id.
    pub fn declaration(&self, id: DeclarationId) -> Option<&Declaration> {
        self.declarations.get(&id)
    }

    /// Look up a reference by id.
    pub fn reference(&self, id: ReferenceId) -> Option<&Reference> {
        self.references.get(&id)
    }

    /// Look up a declaration by its identity (module, identifier selection).
    pub fn find(&self, key: &QualifiedSelection) -> Option<&Declaration> {
        self.by_identity
            .get(key)
            .and_then(|id| self.declarations.get(id))
    }

    /// All declarations, in id order.
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.values()
    }

    /// All references, in id order.
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.references.values()
    }

    /// Number of declarations.
    pub fn declaration_count(&self) -> usize {
        self.declarations.len()
    }

    /// Number of references.
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Declarations with this name (case-insensitive), in id order.
    pub fn declarations_named(&self, name: &str) -> Vec<&Declaration> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|ids| ids.iter().filter_map(|id| self.declarations.get(id)).collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------------

    /// All modules, in name order.
    pub fn modules(&self) -> impl Iterator<Item = &QualifiedModuleName> {
        self.module_declarations.keys()
    }

    /// The declaration of a module.
    pub fn module_declaration(&self, module: &QualifiedModuleName) -> Option<&Declaration> {
        self.module_declarations
            .get(module)
            .and_then(|id| self.declarations.get(id))
    }

    /// Find a module by unqualified name (case-insensitive).
    pub fn module_named(&self, name: &str) -> Option<&Declaration> {
        self.module_declarations
            .iter()
            .find(|(qmn, _)| qmn.module_eq(name))
            .and_then(|(_, id)| self.declarations.get(id))
    }

    /// Content hash of the module text this graph was built from.
    pub fn module_hash(&self, module: &QualifiedModuleName) -> Option<&ContentHash> {
        self.module_hashes.get(module)
    }

    /// Every declaration in a module (the module declaration included),
    /// ordered by start line then start column.
    pub fn declarations_in_module(&self, module: &QualifiedModuleName) -> Vec<&Declaration> {
        let mut decls: Vec<&Declaration> = self
            .decls_by_module
            .get(module)
            .map(|ids| ids.iter().filter_map(|id| self.declarations.get(id)).collect())
            .unwrap_or_default();
        decls.sort_by(by_position);
        decls
    }

    /// Module-level declarations of `module` matching `filter`, in position order.
    pub fn members<F>(&self, module: &QualifiedModuleName, filter: F) -> Vec<&Declaration>
    where
        F: Fn(&Declaration) -> bool,
    {
        let Some(module_decl) = self.module_declarations.get(module) else {
            return Vec::new();
        };
        let mut members: Vec<&Declaration> = self
            .children_of(*module_decl)
            .into_iter()
            .filter(|d| filter(d))
            .collect();
        members.sort_by(by_position);
        members
    }

    /// Direct children of a declaration, in insertion order.
    pub fn children_of(&self, id: DeclarationId) -> Vec<&Declaration> {
        self.children
            .get(&id)
            .map(|ids| ids.iter().filter_map(|id| self.declarations.get(id)).collect())
            .unwrap_or_default()
    }

    /// Parameters of a member, in position order.
    pub fn parameters_of(&self, member: DeclarationId) -> Vec<&Declaration> {
        let mut params: Vec<&Declaration> = self
            .children_of(member)
            .into_iter()
            .filter(|d| d.kind == DeclarationKind::Parameter)
            .collect();
        params.sort_by(by_position);
        params
    }

    /// True if the declaration lives directly in a module (a field or member).
    pub fn is_module_level(&self, declaration: &Declaration) -> bool {
        declaration
            .parent
            .and_then(|p| self.declarations.get(&p))
            .map(|p| p.kind.is_module())
            .unwrap_or(false)
    }

    /// The module declaration owning `declaration`.
    pub fn owning_module(&self, declaration: &Declaration) -> Option<&Declaration> {
        self.module_declaration(&declaration.module)
    }

    // ------------------------------------------------------------------------
    // Interfaces
    // ------------------------------------------------------------------------

    /// `Implements` clauses of a module, in source order.
    pub fn implemented_interfaces(&self, module: &QualifiedModuleName) -> &[ImplementsClause] {
        self.implements
            .get(module)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True if `module` implements `interface`.
    pub fn implements(&self, module: &QualifiedModuleName, interface: &QualifiedModuleName) -> bool {
        self.implemented_interfaces(module)
            .iter()
            .any(|c| &c.interface == interface)
    }

    /// Modules implementing `interface`, in name order.
    pub fn implementers_of(&self, interface: &QualifiedModuleName) -> Vec<&QualifiedModuleName> {
        self.implements
            .iter()
            .filter(|(_, clauses)| clauses.iter().any(|c| &c.interface == interface))
            .map(|(module, _)| module)
            .collect()
    }

    /// True if some module implements `module`, or it carries `@Interface`.
    pub fn is_interface(&self, module: &QualifiedModuleName) -> bool {
        let annotated = self
            .module_declaration(module)
            .map(|d| d.has_annotation(AnnotationKind::Interface))
            .unwrap_or(false);
        annotated || !self.implementers_of(module).is_empty()
    }

    /// The `Implements` clause whose statement contains the cursor.
    pub fn implements_clause_at(&self, cursor: &QualifiedSelection) -> Option<&ImplementsClause> {
        self.implemented_interfaces(&cursor.module)
            .iter()
            .find(|c| c.selection.contains_cursor_of(cursor))
    }

    // ------------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------------

    /// References of a declaration, in position order.
    pub fn references_of(&self, id: DeclarationId) -> Vec<&Reference> {
        let mut refs: Vec<&Reference> = self
            .refs_by_declaration
            .get(&id)
            .map(|ids| ids.iter().filter_map(|r| self.references.get(r)).collect())
            .unwrap_or_default();
        refs.sort_by(|a, b| a.selection.cmp(&b.selection));
        refs
    }

    /// References located in a module, in position order.
    pub fn references_in_module(&self, module: &QualifiedModuleName) -> Vec<&Reference> {
        let mut refs: Vec<&Reference> = self
            .refs_by_module
            .get(module)
            .map(|ids| ids.iter().filter_map(|r| self.references.get(r)).collect())
            .unwrap_or_default();
        refs.sort_by(|a, b| a.selection.cmp(&b.selection));
        refs
    }

    // ------------------------------------------------------------------------
    // Selection queries
    // ------------------------------------------------------------------------

    /// The declaration whose identifier, or a reference to it, is under the cursor.
    pub fn declaration_at(&self, cursor: &QualifiedSelection) -> Option<&Declaration> {
        let (line, column) = cursor.selection.start();
        let declared = self
            .decls_by_module
            .get(&cursor.module)
            .into_iter()
            .flatten()
            .filter_map(|id| self.declarations.get(id))
            .filter(|d| !d.kind.is_module() && d.selection.contains_position(line, column))
            .min_by_key(|d| d.selection);
        if declared.is_some() {
            return declared;
        }
        self.refs_by_module
            .get(&cursor.module)
            .into_iter()
            .flatten()
            .filter_map(|id| self.references.get(id))
            .find(|r| r.selection.selection.contains_position(line, column))
            .and_then(|r| self.declarations.get(&r.declaration))
    }

    /// The narrowest declaration whose statement contains the cursor.
    pub fn enclosing_declaration(&self, cursor: &QualifiedSelection) -> Option<&Declaration> {
        let (line, column) = cursor.selection.start();
        self.decls_by_module
            .get(&cursor.module)
            .into_iter()
            .flatten()
            .filter_map(|id| self.declarations.get(id))
            .filter(|d| {
                d.context_selection
                    .map(|c| c.contains_position(line, column))
                    .unwrap_or(false)
            })
            .min_by_key(|d| {
                let c = d.context_selection.unwrap_or(d.selection);
                (c.end_line - c.start_line, std::cmp::Reverse(c.start()))
            })
    }

    /// Best declaration for a cursor: identifier or reference under it, else
    /// the enclosing member, else the module.
    pub fn selected_declaration(&self, cursor: &QualifiedSelection) -> Option<&Declaration> {
        self.declaration_at(cursor)
            .or_else(|| self.enclosing_declaration(cursor))
            .or_else(|| self.module_declaration(&cursor.module))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn qmn(name: &str) -> QualifiedModuleName {
        QualifiedModuleName::new("VBAProject", name)
    }

    fn declare(
        graph: &mut DeclarationGraph,
        module: &str,
        name: &str,
        kind: DeclarationKind,
        selection: Selection,
        parent: Option<DeclarationId>,
    ) -> DeclarationId {
        let id = graph.next_declaration_id();
        graph
            .insert_declaration(Declaration {
                id,
                name: name.to_string(),
                kind,
                type_name: "Variant".to_string(),
                is_array: false,
                accessibility: Accessibility::Public,
                module: qmn(module),
                selection,
                context_selection: None,
                parent,
                parameter: None,
                annotations: Vec::new(),
            })
            .unwrap();
        id
    }

    fn sample() -> (DeclarationGraph, DeclarationId, DeclarationId) {
        let mut graph = DeclarationGraph::new("VBAProject");
        let module = declare(
            &mut graph,
            "Module1",
            "Module1",
            DeclarationKind::ProceduralModule,
            Selection::home(),
            None,
        );
        // Inserted out of source order on purpose.
        declare(
            &mut graph,
            "Module1",
            "Bar",
            DeclarationKind::Function,
            Selection::on_line(8, 17, 3),
            Some(module),
        );
        let foo = declare(
            &mut graph,
            "Module1",
            "Foo",
            DeclarationKind::Procedure,
            Selection::on_line(3, 12, 3),
            Some(module),
        );
        declare(
            &mut graph,
            "Module1",
            "x",
            DeclarationKind::Variable,
            Selection::on_line(4, 9, 1),
            Some(foo),
        );
        (graph, module, foo)
    }

    mod insert_tests {
        use super::*;

        #[test]
        fn duplicate_identity_is_rejected() {
            let (mut graph, module, _) = sample();
            let id = graph.next_declaration_id();
            let err = graph
                .insert_declaration(Declaration {
                    id,
                    name: "Other".to_string(),
                    kind: DeclarationKind::Procedure,
                    type_name: "Variant".to_string(),
                    is_array: false,
                    accessibility: Accessibility::Public,
                    module: qmn("Module1"),
                    selection: Selection::on_line(3, 12, 3),
                    context_selection: None,
                    parent: Some(module),
                    parameter: None,
                    annotations: Vec::new(),
                })
                .unwrap_err();
            assert!(matches!(err, GraphError::DuplicateIdentity { .. }));
            assert!(graph.declaration(id).is_none());
        }

        #[test]
        fn reference_to_unknown_declaration_is_rejected() {
            let (mut graph, _, _) = sample();
            let id = graph.next_reference_id();
            let err = graph
                .insert_reference(Reference {
                    id,
                    declaration: DeclarationId(999),
                    selection: QualifiedSelection::new(qmn("Module1"), Selection::on_line(5, 5, 1)),
                    is_assignment: false,
                    context: Vec::new(),
                    scope: None,
                })
                .unwrap_err();
            assert_eq!(err, GraphError::UnknownDeclaration(DeclarationId(999)));
        }
    }

    mod query_tests {
        use super::*;

        #[test]
        fn declarations_in_module_are_position_ordered() {
            let (graph, _, _) = sample();
            let names: Vec<&str> = graph
                .declarations_in_module(&qmn("Module1"))
                .iter()
                .map(|d| d.name.as_str())
                .collect();
            assert_eq!(names, vec!["Module1", "Foo", "x", "Bar"]);
        }

        #[test]
        fn members_excludes_locals_and_applies_filter() {
            let (graph, _, _) = sample();
            let all: Vec<&str> = graph
                .members(&qmn("Module1"), |_| true)
                .iter()
                .map(|d| d.name.as_str())
                .collect();
            assert_eq!(all, vec!["Foo", "Bar"]);
            let functions = graph.members(&qmn("Module1"), |d| d.kind == DeclarationKind::Function);
            assert_eq!(functions.len(), 1);
            assert!(graph.members(&qmn("Missing"), |_| true).is_empty());
        }

        #[test]
        fn references_are_position_ordered() {
            let (mut graph, _, foo) = sample();
            for line in [9, 5, 7] {
                let id = graph.next_reference_id();
                graph
                    .insert_reference(Reference {
                        id,
                        declaration: foo,
                        selection: QualifiedSelection::new(
                            qmn("Module1"),
                            Selection::on_line(line, 5, 3),
                        ),
                        is_assignment: false,
                        context: vec![SyntaxKind::CallStmt],
                        scope: None,
                    })
                    .unwrap();
            }
            let lines: Vec<u32> = graph
                .references_of(foo)
                .iter()
                .map(|r| r.selection.selection.start_line)
                .collect();
            assert_eq!(lines, vec![5, 7, 9]);
        }

        #[test]
        fn lookup_by_name_is_case_insensitive() {
            let (graph, _, _) = sample();
            assert_eq!(graph.declarations_named("FOO").len(), 1);
            assert!(graph.module_named("module1").is_some());
        }

        #[test]
        fn declaration_at_cursor() {
            let (graph, _, foo) = sample();
            let cursor = QualifiedSelection::new(qmn("Module1"), Selection::at(3, 13));
            assert_eq!(graph.declaration_at(&cursor).map(|d| d.id), Some(foo));
            let nowhere = QualifiedSelection::new(qmn("Module1"), Selection::at(20, 1));
            assert!(graph.declaration_at(&nowhere).is_none());
            assert_eq!(
                graph.selected_declaration(&nowhere).map(|d| d.name.as_str()),
                Some("Module1")
            );
        }

        #[test]
        fn module_level_detection() {
            let (graph, _, foo) = sample();
            let foo = graph.declaration(foo).unwrap();
            assert!(graph.is_module_level(foo));
            let x = graph.declarations_named("x")[0];
            assert!(!graph.is_module_level(x));
        }
    }
}
