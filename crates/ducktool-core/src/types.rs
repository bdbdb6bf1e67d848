//! Addressing types shared across ducktool.
//!
//! Every declaration, reference and editor position is addressed by a
//! [`QualifiedModuleName`] (project + module) and a [`Selection`] inside it.
//! Together they form a [`QualifiedSelection`].
//!
//! ## Coordinate Conventions
//!
//! - Lines and columns are **1-indexed** (matching the host editor)
//! - `end_column` is one past the last selected column
//! - Columns count bytes; module sources are expected to be ASCII
//!
//! All types compare structurally and order by module, then by
//! (start line, start column, end line, end column).

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Module Names
// ============================================================================

/// A module name qualified by the project that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedModuleName {
    /// Project name.
    pub project: String,
    /// Module name (unique within the project).
    pub module: String,
}

impl QualifiedModuleName {
    /// Create a new qualified module name.
    pub fn new(project: impl Into<String>, module: impl Into<String>) -> Self {
        QualifiedModuleName {
            project: project.into(),
            module: module.into(),
        }
    }

    /// Case-insensitive comparison of the module part, as the language does.
    pub fn module_eq(&self, name: &str) -> bool {
        self.module.eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for QualifiedModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.project, self.module)
    }
}

// ============================================================================
// Selections
// ============================================================================

/// A line/column span inside one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Selection {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Selection {
    /// Create a selection from its four coordinates.
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Selection {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// A zero-width selection (a cursor position).
    pub fn at(line: u32, column: u32) -> Self {
        Selection::new(line, column, line, column)
    }

    /// A single-line selection covering `len` columns starting at `column`.
    pub fn on_line(line: u32, column: u32, len: u32) -> Self {
        Selection::new(line, column, line, column + len)
    }

    /// The selection used for module declarations: the top of the module.
    pub fn home() -> Self {
        Selection::at(1, 1)
    }

    /// Start position as `(line, column)`.
    pub fn start(&self) -> (u32, u32) {
        (self.start_line, self.start_column)
    }

    /// End position as `(line, column)`.
    pub fn end(&self) -> (u32, u32) {
        (self.end_line, self.end_column)
    }

    /// True if this selection has no extent.
    pub fn is_empty(&self) -> bool {
        self.start() == self.end()
    }

    /// True if the position lies within this selection.
    ///
    /// The end is inclusive so that a cursor placed right after an
    /// identifier still selects it.
    pub fn contains_position(&self, line: u32, column: u32) -> bool {
        let pos = (line, column);
        self.start() <= pos && pos <= self.end()
    }

    /// True if `other` lies entirely within this selection.
    pub fn contains(&self, other: &Selection) -> bool {
        self.start() <= other.start() && other.end() <= self.end()
    }

    /// True if the two selections share at least one column.
    pub fn overlaps(&self, other: &Selection) -> bool {
        self.start() < other.end() && other.start() < self.end()
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(
                f,
                "L{}C{}-{}",
                self.start_line, self.start_column, self.end_column
            )
        } else {
            write!(
                f,
                "L{}C{}-L{}C{}",
                self.start_line, self.start_column, self.end_line, self.end_column
            )
        }
    }
}

/// A selection inside a specific module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedSelection {
    pub module: QualifiedModuleName,
    pub selection: Selection,
}

impl QualifiedSelection {
    /// Create a new qualified selection.
    pub fn new(module: QualifiedModuleName, selection: Selection) -> Self {
        QualifiedSelection { module, selection }
    }

    /// True if the cursor position of `other` (its start) lies in this selection.
    pub fn contains_cursor_of(&self, other: &QualifiedSelection) -> bool {
        self.module == other.module
            && self
                .selection
                .contains_position(other.selection.start_line, other.selection.start_column)
    }
}

impl fmt::Display for QualifiedSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.module, self.selection)
    }
}

// ============================================================================
// Location
// ============================================================================

/// A `Module:line:col` cursor location as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Module name (unqualified).
    pub module: String,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub col: u32,
}

impl Location {
    /// Create a new location.
    pub fn new(module: impl Into<String>, line: u32, col: u32) -> Self {
        Location {
            module: module.into(),
            line,
            col,
        }
    }

    /// Parse a location string in format "Module:line:col".
    ///
    /// Returns `None` if the format is invalid.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.rsplitn(3, ':');
        let col = parts.next()?.parse().ok()?;
        let line = parts.next()?.parse().ok()?;
        let module = parts.next()?;
        if module.is_empty() || line == 0 || col == 0 {
            return None;
        }
        Some(Location::new(module, line, col))
    }

    /// Qualify this location inside `project` as a cursor selection.
    pub fn to_selection(&self, project: &str) -> QualifiedSelection {
        QualifiedSelection::new(
            QualifiedModuleName::new(project, &self.module),
            Selection::at(self.line, self.col),
        )
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.module, self.line, self.col)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod selection_tests {
        use super::*;

        #[test]
        fn contains_position_is_end_inclusive() {
            let sel = Selection::on_line(3, 5, 3);
            assert!(sel.contains_position(3, 5));
            assert!(sel.contains_position(3, 8));
            assert!(!sel.contains_position(3, 9));
            assert!(!sel.contains_position(2, 6));
        }

        #[test]
        fn ordering_is_line_then_column() {
            let mut sels = vec![
                Selection::on_line(4, 1, 2),
                Selection::on_line(2, 9, 2),
                Selection::on_line(2, 3, 2),
            ];
            sels.sort();
            assert_eq!(
                sels,
                vec![
                    Selection::on_line(2, 3, 2),
                    Selection::on_line(2, 9, 2),
                    Selection::on_line(4, 1, 2),
                ]
            );
        }

        #[test]
        fn overlaps_excludes_touching_spans() {
            let a = Selection::on_line(1, 1, 4);
            let b = Selection::on_line(1, 5, 2);
            let c = Selection::on_line(1, 4, 2);
            assert!(!a.overlaps(&b));
            assert!(a.overlaps(&c));
        }
    }

    mod qualified_tests {
        use super::*;

        #[test]
        fn equality_is_structural() {
            let a = QualifiedSelection::new(
                QualifiedModuleName::new("Project", "Module1"),
                Selection::on_line(1, 1, 3),
            );
            let b = QualifiedSelection::new(
                QualifiedModuleName::new("Project", "Module1"),
                Selection::on_line(1, 1, 3),
            );
            assert_eq!(a, b);
            assert_ne!(
                a,
                QualifiedSelection::new(
                    QualifiedModuleName::new("Other", "Module1"),
                    Selection::on_line(1, 1, 3),
                )
            );
        }

        #[test]
        fn display_formats() {
            let qmn = QualifiedModuleName::new("VBAProject", "Class1");
            assert_eq!(qmn.to_string(), "VBAProject.Class1");
            let qs = QualifiedSelection::new(qmn, Selection::on_line(2, 3, 4));
            assert_eq!(qs.to_string(), "VBAProject.Class1 L2C3-7");
        }
    }

    mod location_tests {
        use super::*;

        #[test]
        fn parse_valid_location() {
            let loc = Location::parse("Module1:12:5").unwrap();
            assert_eq!(loc, Location::new("Module1", 12, 5));
        }

        #[test]
        fn parse_rejects_malformed() {
            assert!(Location::parse("Module1:12").is_none());
            assert!(Location::parse(":1:1").is_none());
            assert!(Location::parse("Module1:0:1").is_none());
            assert!(Location::parse("Module1:a:1").is_none());
        }

        #[test]
        fn to_selection_is_cursor() {
            let qs = Location::new("Class1", 3, 7).to_selection("VBAProject");
            assert_eq!(qs.module.module, "Class1");
            assert!(qs.selection.is_empty());
        }
    }
}
