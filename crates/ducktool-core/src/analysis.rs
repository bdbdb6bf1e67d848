//! Module analysis: the parser collaborator's output for one module.
//!
//! The parser produces analysis results using index-based references (not
//! ids). The resolver is responsible for:
//! 1. Allocating [`DeclarationId`](crate::graph::DeclarationId)s
//! 2. Converting `parent_index`/`member_index` into ids
//! 3. Resolving usages by name into references
//!
//! # ID Ownership
//!
//! - **Analyses do NOT allocate ids**
//! - `parent_index` and `member_index` index into
//!   [`ModuleAnalysis::declarations`] of the same module
//! - `None` for `parent_index` means "declared at module level"
//! - A parent always precedes its children
//!
//! Analyses are plain serde data so hosts can hand them over as JSON.

use serde::{Deserialize, Serialize};

use crate::graph::{Accessibility, DeclarationKind, ParameterInfo, SyntaxKind};
use crate::rewrite::ContentHash;
use crate::types::{QualifiedModuleName, Selection};

/// Kind of module, from the host's component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Procedural,
    Class,
    Document,
    UserForm,
}

impl ModuleKind {
    /// Declaration kind of the module declaration.
    pub fn declaration_kind(&self) -> DeclarationKind {
        match self {
            ModuleKind::Procedural => DeclarationKind::ProceduralModule,
            ModuleKind::Class => DeclarationKind::ClassModule,
            ModuleKind::Document => DeclarationKind::DocumentModule,
            ModuleKind::UserForm => DeclarationKind::UserForm,
        }
    }

    /// Conventional export file extension.
    pub fn file_extension(&self) -> &'static str {
        match self {
            ModuleKind::Procedural => "bas",
            ModuleKind::Class => "cls",
            ModuleKind::Document => "doccls",
            ModuleKind::UserForm => "frm",
        }
    }

    /// Module kind for an exported file's extension.
    pub fn from_file_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "bas" => Some(ModuleKind::Procedural),
            "cls" => Some(ModuleKind::Class),
            "doccls" => Some(ModuleKind::Document),
            "frm" => Some(ModuleKind::UserForm),
            _ => None,
        }
    }
}

/// A declaration found by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationData {
    pub name: String,
    pub kind: DeclarationKind,
    /// Declared type; `None` means `Variant`.
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub is_array: bool,
    pub accessibility: Accessibility,
    /// Identifier selection.
    pub selection: Selection,
    /// Whole statement (or member body) selection.
    #[serde(default)]
    pub context_selection: Option<Selection>,
    /// Index of the enclosing declaration (member or enum/type block).
    #[serde(default)]
    pub parent_index: Option<usize>,
    #[serde(default)]
    pub parameter: Option<ParameterInfo>,
}

/// An identifier use found by the parser, not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageData {
    pub name: String,
    pub selection: Selection,
    #[serde(default)]
    pub is_assignment: bool,
    /// Syntax ancestry, innermost first.
    #[serde(default)]
    pub context: Vec<SyntaxKind>,
    /// Index of the member the usage occurs in.
    #[serde(default)]
    pub member_index: Option<usize>,
    /// Module qualifier, as in `Module1.Foo`.
    #[serde(default)]
    pub qualifier: Option<String>,
}

/// An `Implements` statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementsData {
    pub interface: String,
    pub selection: Selection,
}

/// A comment, candidate for annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentData {
    /// Comment text including the leading quote.
    pub text: String,
    pub selection: Selection,
}

/// Everything the parser reports about one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAnalysis {
    pub module: QualifiedModuleName,
    pub kind: ModuleKind,
    /// Hash of the text this analysis was produced from.
    pub content_hash: ContentHash,
    #[serde(default)]
    pub declarations: Vec<DeclarationData>,
    #[serde(default)]
    pub usages: Vec<UsageData>,
    #[serde(default)]
    pub implements: Vec<ImplementsData>,
    #[serde(default)]
    pub comments: Vec<CommentData>,
}

impl ModuleAnalysis {
    /// Create an empty analysis for a module.
    pub fn new(module: QualifiedModuleName, kind: ModuleKind, content_hash: ContentHash) -> Self {
        ModuleAnalysis {
            module,
            kind,
            content_hash,
            declarations: Vec::new(),
            usages: Vec::new(),
            implements: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Check that every index points inside this analysis.
    pub fn validate_indices(&self) -> Result<(), String> {
        let count = self.declarations.len();
        for (i, decl) in self.declarations.iter().enumerate() {
            if let Some(parent) = decl.parent_index {
                if parent >= i {
                    return Err(format!(
                        "declaration '{}' has parent index {} that does not precede it",
                        decl.name, parent
                    ));
                }
            }
        }
        for usage in &self.usages {
            if let Some(member) = usage.member_index {
                if member >= count {
                    return Err(format!(
                        "usage '{}' has invalid member index {}",
                        usage.name, member
                    ));
                }
            }
        }
        Ok(())
    }
}
