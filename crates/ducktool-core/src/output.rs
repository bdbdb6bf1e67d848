//! JSON output types and serialization for CLI responses.
//!
//! Every response starts with `status` and `schema_version`. Arrays are
//! emitted in graph order (module, then position) so the same project gives
//! the same bytes.

use std::io::{self, Write};

use serde::Serialize;

use crate::error::{DuckError, OutputErrorCode};
use crate::graph::{Accessibility, Declaration, DeclarationKind, Reference};
use crate::search::ReferenceGroup;
use crate::state::{GraphSnapshot, ParserState};
use crate::types::Location;

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Shared Types
// ============================================================================

/// A declaration as shown to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclarationInfo {
    pub name: String,
    pub kind: DeclarationKind,
    pub type_name: String,
    pub accessibility: Accessibility,
    pub location: Location,
}

impl DeclarationInfo {
    pub fn from_declaration(declaration: &Declaration) -> Self {
        DeclarationInfo {
            name: declaration.name.clone(),
            kind: declaration.kind,
            type_name: declaration.type_name.clone(),
            accessibility: declaration.accessibility,
            location: Location::new(
                declaration.module.module.clone(),
                declaration.selection.start_line,
                declaration.selection.start_column,
            ),
        }
    }
}

/// A reference as shown to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceInfo {
    pub location: Location,
    pub is_assignment: bool,
}

impl ReferenceInfo {
    pub fn from_reference(reference: &Reference) -> Self {
        let selection = &reference.selection;
        ReferenceInfo {
            location: Location::new(
                selection.module.module.clone(),
                selection.selection.start_line,
                selection.selection.start_column,
            ),
            is_assignment: reference.is_assignment,
        }
    }
}

/// References in one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceGroupInfo {
    pub module: String,
    pub references: Vec<ReferenceInfo>,
}

/// Full text of a module after a refactoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleText {
    pub module: String,
    pub text: String,
}

/// Error information.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    pub code: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    /// Create from a DuckError.
    pub fn from_error(err: &DuckError) -> Self {
        let details = match err {
            DuckError::InvalidArguments { details, .. } => details.clone(),
            DuckError::ModuleNotFound { module } => Some(serde_json::json!({ "module": module })),
            DuckError::ApplyError { module, .. } => {
                module.as_ref().map(|m| serde_json::json!({ "module": m }))
            }
            DuckError::NotReady { state } => Some(serde_json::json!({ "state": state })),
            _ => None,
        };
        ErrorInfo {
            code: OutputErrorCode::from(err).code(),
            message: err.to_string(),
            details,
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Response for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub schema_version: String,
    pub project: String,
    pub state: ParserState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    pub modules: usize,
    pub declarations: usize,
    pub references: usize,
    pub unresolved: usize,
}

impl StatusResponse {
    pub fn new(project: impl Into<String>, state: ParserState, snapshot: Option<&GraphSnapshot>) -> Self {
        let (generation, modules, declarations, references, unresolved) = match snapshot {
            Some(snapshot) => {
                let summary = snapshot.summary();
                (
                    Some(snapshot.generation()),
                    snapshot.graph().modules().count(),
                    summary.declarations,
                    summary.references,
                    summary.unresolved,
                )
            }
            None => (None, 0, 0, 0, 0),
        };
        StatusResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            project: project.into(),
            state,
            generation,
            modules,
            declarations,
            references,
            unresolved,
        }
    }
}

/// Response for the `references` command.
#[derive(Debug, Clone, Serialize)]
pub struct ReferencesResponse {
    pub status: String,
    pub schema_version: String,
    pub target: DeclarationInfo,
    pub count: usize,
    pub groups: Vec<ReferenceGroupInfo>,
}

impl ReferencesResponse {
    pub fn new(target: &Declaration, groups: &[ReferenceGroup]) -> Self {
        let groups: Vec<ReferenceGroupInfo> = groups
            .iter()
            .map(|g| ReferenceGroupInfo {
                module: g.module.module.clone(),
                references: g.references.iter().map(ReferenceInfo::from_reference).collect(),
            })
            .collect();
        ReferencesResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            target: DeclarationInfo::from_declaration(target),
            count: groups.iter().map(|g| g.references.len()).sum(),
            groups,
        }
    }
}

/// Response for the `implementations` command.
#[derive(Debug, Clone, Serialize)]
pub struct ImplementationsResponse {
    pub status: String,
    pub schema_version: String,
    pub target: DeclarationInfo,
    pub implementations: Vec<DeclarationInfo>,
}

impl ImplementationsResponse {
    pub fn new(target: &Declaration, implementations: &[&Declaration]) -> Self {
        ImplementationsResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            target: DeclarationInfo::from_declaration(target),
            implementations: implementations
                .iter()
                .map(|d| DeclarationInfo::from_declaration(d))
                .collect(),
        }
    }
}

/// Response for refactoring commands.
#[derive(Debug, Clone, Serialize)]
pub struct RefactorResponse {
    pub status: String,
    pub schema_version: String,
    pub operation: String,
    /// True when the modified modules were written back to disk.
    pub applied: bool,
    pub modules: Vec<ModuleText>,
}

impl RefactorResponse {
    pub fn new(operation: impl Into<String>, modules: Vec<ModuleText>, applied: bool) -> Self {
        RefactorResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            operation: operation.into(),
            applied,
            modules,
        }
    }
}

/// Error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    /// Create an error response from a DuckError.
    pub fn from_error(err: &DuckError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

/// Emit a response as pretty-printed JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================
