//! Annotation comments: `'@Name`, `'@Name "arg", arg2`, `'@Name("arg")`.
//!
//! An annotation is bound to exactly one comment line and targets either the
//! module (module-scoped kinds) or the declaration starting on the next
//! non-annotation line.
//!
//! ## Grammar
//!
//! ```text
//! <annotation> := "'" ws* "@" name [ "(" [args] ")" | ws+ args ] [ws* "'" comment]
//! <args>       := arg (ws* "," ws* arg)*
//! <arg>        := '"' (char | '""')* '"' | bare
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use winnow::ascii::{space0, space1};
use winnow::combinator::{alt, delimited, opt, preceded, repeat, separated};
use winnow::prelude::*;
use winnow::token::{take_till, take_while};
use winnow::ModalResult;

use crate::types::QualifiedSelection;

/// Error type for annotation parsing and attachment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnnotationError {
    /// The comment looks like an annotation but does not parse.
    #[error("malformed annotation '{text}'")]
    Malformed { text: String },

    /// The annotation name is not a known annotation.
    #[error("unknown annotation '@{name}'")]
    Unknown { name: String },

    /// The target already carries an annotation of this single-instance kind.
    #[error("duplicate '@{kind}' annotation")]
    Duplicate { kind: AnnotationKind },
}

/// Annotation type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnnotationKind {
    TestModule,
    ModuleInitialize,
    ModuleCleanup,
    TestMethod,
    TestInitialize,
    TestCleanup,
    IgnoreTest,
    Ignore,
    IgnoreModule,
    Folder,
    NoIndent,
    Interface,
    Description,
    ModuleDescription,
    PredeclaredId,
    Exposed,
    Obsolete,
}

const ALL_KINDS: &[AnnotationKind] = &[
    AnnotationKind::TestModule,
    AnnotationKind::ModuleInitialize,
    AnnotationKind::ModuleCleanup,
    AnnotationKind::TestMethod,
    AnnotationKind::TestInitialize,
    AnnotationKind::TestCleanup,
    AnnotationKind::IgnoreTest,
    AnnotationKind::Ignore,
    AnnotationKind::IgnoreModule,
    AnnotationKind::Folder,
    AnnotationKind::NoIndent,
    AnnotationKind::Interface,
    AnnotationKind::Description,
    AnnotationKind::ModuleDescription,
    AnnotationKind::PredeclaredId,
    AnnotationKind::Exposed,
    AnnotationKind::Obsolete,
];

impl AnnotationKind {
    /// The name as written after `@`.
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationKind::TestModule => "TestModule",
            AnnotationKind::ModuleInitialize => "ModuleInitialize",
            AnnotationKind::ModuleCleanup => "ModuleCleanup",
            AnnotationKind::TestMethod => "TestMethod",
            AnnotationKind::TestInitialize => "TestInitialize",
            AnnotationKind::TestCleanup => "TestCleanup",
            AnnotationKind::IgnoreTest => "IgnoreTest",
            AnnotationKind::Ignore => "Ignore",
            AnnotationKind::IgnoreModule => "IgnoreModule",
            AnnotationKind::Folder => "Folder",
            AnnotationKind::NoIndent => "NoIndent",
            AnnotationKind::Interface => "Interface",
            AnnotationKind::Description => "Description",
            AnnotationKind::ModuleDescription => "ModuleDescription",
            AnnotationKind::PredeclaredId => "PredeclaredId",
            AnnotationKind::Exposed => "Exposed",
            AnnotationKind::Obsolete => "Obsolete",
        }
    }

    /// Look up a kind by name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_KINDS
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }

    /// Whether a target may carry more than one annotation of this kind.
    pub fn allow_multiple(&self) -> bool {
        matches!(self, AnnotationKind::Ignore | AnnotationKind::IgnoreModule)
    }

    /// Whether this kind annotates the module rather than a member.
    pub fn is_module_scoped(&self) -> bool {
        matches!(
            self,
            AnnotationKind::TestModule
                | AnnotationKind::IgnoreModule
                | AnnotationKind::Folder
                | AnnotationKind::NoIndent
                | AnnotationKind::Interface
                | AnnotationKind::ModuleDescription
                | AnnotationKind::PredeclaredId
                | AnnotationKind::Exposed
        )
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed annotation bound to its comment line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub parameters: Vec<String>,
    /// Selection of the comment carrying the annotation.
    pub selection: QualifiedSelection,
    /// Line of the code this annotation applies to.
    pub annotated_line: u32,
}

impl Annotation {
    /// Add this annotation to a target's list, honoring single-instance kinds.
    pub fn attach_to(self, target: &mut Vec<Annotation>) -> Result<(), AnnotationError> {
        if !self.kind.allow_multiple() && target.iter().any(|a| a.kind == self.kind) {
            return Err(AnnotationError::Duplicate { kind: self.kind });
        }
        target.push(self);
        Ok(())
    }
}

/// Parse a comment as an annotation.
///
/// Returns `Ok(None)` for ordinary comments (no `@` after the quote).
pub fn parse_annotation(comment: &str) -> Result<Option<(AnnotationKind, Vec<String>)>, AnnotationError> {
    let trimmed = comment.trim_start();
    let Some(body) = trimmed.strip_prefix('\'') else {
        return Ok(None);
    };
    if !body.trim_start().starts_with('@') {
        return Ok(None);
    }

    let malformed = || AnnotationError::Malformed {
        text: comment.trim().to_string(),
    };
    let mut input = body;
    let (name, parameters) = parse_body(&mut input).map_err(|_| malformed())?;
    let rest = input.trim();
    if !rest.is_empty() && !rest.starts_with('\'') {
        return Err(malformed());
    }

    let kind = AnnotationKind::from_name(name).ok_or_else(|| AnnotationError::Unknown {
        name: name.to_string(),
    })?;
    Ok(Some((kind, parameters)))
}

// ============================================================================
// Parser implementation using winnow
// ============================================================================

fn parse_body<'s>(input: &mut &'s str) -> ModalResult<(&'s str, Vec<String>)> {
    let _ = space0.parse_next(input)?;
    let _ = '@'.parse_next(input)?;
    let name = parse_name(input)?;
    let parameters = alt((
        delimited(('(', space0), opt(parse_args), (space0, ')')).map(Option::unwrap_or_default),
        preceded(space1, opt(parse_args)).map(Option::unwrap_or_default),
        space0.map(|_| Vec::new()),
    ))
    .parse_next(input)?;
    Ok((name, parameters))
}

fn parse_name<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    (
        take_while(1, |c: char| c.is_ascii_alphabetic()),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn parse_args(input: &mut &str) -> ModalResult<Vec<String>> {
    separated(1.., parse_arg, (space0, ',', space0)).parse_next(input)
}

fn parse_arg(input: &mut &str) -> ModalResult<String> {
    alt((parse_quoted, parse_bare)).parse_next(input)
}

/// A double-quoted string; `""` inside it is an escaped quote.
fn parse_quoted(input: &mut &str) -> ModalResult<String> {
    let parts: Vec<String> = delimited(
        '"',
        repeat(
            0..,
            alt((
                "\"\"".map(|_| "\"".to_string()),
                take_till(1.., |c| c == '"').map(|s: &str| s.to_string()),
            )),
        ),
        '"',
    )
    .parse_next(input)?;
    Ok(parts.concat())
}

fn parse_bare(input: &mut &str) -> ModalResult<String> {
    take_while(1.., |c: char| {
        !c.is_whitespace() && c != ',' && c != '(' && c != ')' && c != '"' && c != '\''
    })
    .map(|s: &str| s.to_string())
    .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QualifiedModuleName, Selection};

    mod parse_tests {
        use super::*;

        #[test]
        fn plain_comment_is_not_annotation() {
            assert_eq!(parse_annotation("' just a comment").unwrap(), None);
            assert_eq!(parse_annotation("Dim x").unwrap(), None);
        }

        #[test]
        fn bare_annotation() {
            let (kind, params) = parse_annotation("'@TestMethod").unwrap().unwrap();
            assert_eq!(kind, AnnotationKind::TestMethod);
            assert!(params.is_empty());
        }

        #[test]
        fn parenthesized_arguments() {
            let (kind, params) = parse_annotation("'@Folder(\"Tests.Unit\")").unwrap().unwrap();
            assert_eq!(kind, AnnotationKind::Folder);
            assert_eq!(params, vec!["Tests.Unit".to_string()]);
        }

        #[test]
        fn space_separated_arguments() {
            let (kind, params) = parse_annotation("  ' @Ignore ProcedureNotUsed, \"Use \"\"Foo\"\"\"")
                .unwrap()
                .unwrap();
            assert_eq!(kind, AnnotationKind::Ignore);
            assert_eq!(
                params,
                vec!["ProcedureNotUsed".to_string(), "Use \"Foo\"".to_string()]
            );
        }

        #[test]
        fn trailing_comment_is_allowed() {
            let (kind, _) = parse_annotation("'@Interface ' extracted").unwrap().unwrap();
            assert_eq!(kind, AnnotationKind::Interface);
        }

        #[test]
        fn names_are_case_insensitive() {
            let (kind, _) = parse_annotation("'@predeclaredid").unwrap().unwrap();
            assert_eq!(kind, AnnotationKind::PredeclaredId);
        }

        #[test]
        fn unknown_and_malformed() {
            assert_eq!(
                parse_annotation("'@Frobnicate").unwrap_err(),
                AnnotationError::Unknown {
                    name: "Frobnicate".to_string()
                }
            );
            assert!(matches!(
                parse_annotation("'@Folder(\"unterminated").unwrap_err(),
                AnnotationError::Malformed { .. }
            ));
        }
    }

    mod attach_tests {
        use super::*;

        fn annotation(kind: AnnotationKind, line: u32) -> Annotation {
            Annotation {
                kind,
                parameters: Vec::new(),
                selection: QualifiedSelection::new(
                    QualifiedModuleName::new("VBAProject", "Module1"),
                    Selection::on_line(line, 1, 10),
                ),
                annotated_line: line + 1,
            }
        }

        #[test]
        fn single_instance_kind_rejects_duplicate() {
            let mut target = Vec::new();
            annotation(AnnotationKind::TestMethod, 1)
                .attach_to(&mut target)
                .unwrap();
            let err = annotation(AnnotationKind::TestMethod, 2)
                .attach_to(&mut target)
                .unwrap_err();
            assert_eq!(
                err,
                AnnotationError::Duplicate {
                    kind: AnnotationKind::TestMethod
                }
            );
            assert_eq!(target.len(), 1);
        }

        #[test]
        fn multiple_allowed_kind_accumulates() {
            let mut target = Vec::new();
            annotation(AnnotationKind::Ignore, 1)
                .attach_to(&mut target)
                .unwrap();
            annotation(AnnotationKind::Ignore, 2)
                .attach_to(&mut target)
                .unwrap();
            assert_eq!(target.len(), 2);
        }

        #[test]
        fn scope_flags() {
            assert!(AnnotationKind::Folder.is_module_scoped());
            assert!(!AnnotationKind::TestMethod.is_module_scoped());
            assert!(AnnotationKind::IgnoreModule.allow_multiple());
        }
    }
}
