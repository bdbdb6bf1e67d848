//! Refactoring operations.
//!
//! Each operation is a [`Refactoring`](crate::pipeline::Refactoring): a model
//! builder, a validator and a rewriter. Helpers shared by the operations
//! live here.

pub mod encapsulate_field;
pub mod extract_interface;
pub mod implement_interface;
pub mod rename;
pub mod signature;

use ducktool_core::graph::{Declaration, DeclarationGraph, DeclarationId};
use ducktool_core::rewrite::RecordingSession;
use ducktool_core::text::position_to_byte_offset;
use ducktool_core::types::QualifiedModuleName;

use crate::failure::RefactoringFailure;
use crate::pipeline::RefactoringTarget;

pub use encapsulate_field::{EncapsulateField, EncapsulateFieldModel};
pub use extract_interface::{ExtractInterface, ExtractInterfaceModel};
pub use implement_interface::{ImplementInterface, ImplementInterfaceModel};
pub use rename::{Rename, RenameModel};

/// The declaration an operation is invoked on: the explicit declaration, or
/// the best declaration for the cursor.
pub fn target_declaration<'g>(
    graph: &'g DeclarationGraph,
    target: &RefactoringTarget,
) -> Result<&'g Declaration, RefactoringFailure> {
    let found = match target {
        RefactoringTarget::Declaration(id) => graph.declaration(*id),
        RefactoringTarget::Selection(selection) => graph.selected_declaration(selection),
    };
    found.ok_or(RefactoringFailure::NoTarget)
}

/// The module-level declaration of `module` named `name`, ignoring `except`.
pub fn module_member_named<'g>(
    graph: &'g DeclarationGraph,
    module: &QualifiedModuleName,
    name: &str,
    except: &[DeclarationId],
) -> Option<&'g Declaration> {
    graph
        .members(module, |d| d.name_eq(name) && !except.contains(&d.id))
        .into_iter()
        .next()
}

/// Line on which an `Implements` statement goes: after the module header,
/// `Option` and existing `Implements` lines.
pub fn declarations_section_line(text: &str) -> u32 {
    let mut after = 0;
    let mut in_header = false;
    for (index, line) in text.lines().enumerate() {
        let number = index as u32 + 1;
        let trimmed = line.trim();
        let word = trimmed
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        if in_header {
            if trimmed.eq_ignore_ascii_case("end") {
                in_header = false;
                after = number;
            }
            continue;
        }
        match word.as_str() {
            "version" | "attribute" | "option" | "implements" => after = number,
            "begin" => in_header = true,
            "" => {}
            _ if trimmed.starts_with('\'') => {}
            _ => break,
        }
    }
    after + 1
}

/// Record `text` as whole lines inserted before `line`, or appended when the
/// module has fewer lines.
pub fn insert_lines(
    edits: &mut RecordingSession,
    module: &QualifiedModuleName,
    current: &str,
    line: u32,
    text: &str,
) {
    if position_to_byte_offset(current, line, 1).is_some() {
        edits.insert(module, line, 1, text);
    } else {
        edits.append(module, text);
    }
}

/// Split a declaration list (`a As Long, b(1 To 3) As String`) on its
/// top-level commas.
pub fn split_declaration_items(list: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut start = 0;
    for (index, ch) in list.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth -= 1,
            ',' if !in_string && depth == 0 => {
                items.push(list[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    items.push(list[start..].trim());
    items.retain(|item| !item.is_empty());
    items
}

/// `name` with its first letter upper-cased.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================
