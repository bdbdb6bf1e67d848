//! Line scanner producing a [`ModuleAnalysis`] from module source text.
//!
//! The scanner stands in for the parser collaborator. It understands the
//! subset of VBA used by fixtures and the CLI:
//!
//! - module headers (`VERSION`, `BEGIN ... END`, `Attribute`, `Option`)
//! - `Implements` statements
//! - fields, constants, `Declare` statements and events
//! - `Sub`/`Function`/`Property Get|Let|Set` members with parameters
//! - `Enum` and `Type` blocks
//! - locals, line labels and comments (annotation candidates)
//! - identifier uses inside members, classified by statement: `Set`,
//!   `[Let]` assignment, `Call`/bare call, `For`, `ReDim`, control flow
//! - `Module.Member` and `Me.Member` qualifiers
//!
//! Line continuations are not supported. Columns are byte columns.

use thiserror::Error;
use tracing::debug;

use crate::analysis::{CommentData, DeclarationData, ImplementsData, ModuleAnalysis, ModuleKind, UsageData};
use crate::graph::{Accessibility, DeclarationKind, ParameterInfo, Passing, SyntaxKind};
use crate::rewrite::ContentHash;
use crate::types::{QualifiedModuleName, Selection};
use crate::validation::is_vba_keyword;

/// Error type for scanning.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    /// A statement could not be understood.
    #[error("line {line}: {message}")]
    Syntax { line: u32, message: String },

    /// A block was still open at the end of the module.
    #[error("line {line}: {opened} is never closed")]
    Unterminated { line: u32, opened: String },
}

/// Scan a module's source text.
pub fn scan_module(
    module: QualifiedModuleName,
    kind: ModuleKind,
    source: &str,
) -> Result<ModuleAnalysis, ScanError> {
    let mut scanner = Scanner {
        analysis: ModuleAnalysis::new(module, kind, ContentHash::of_text(source)),
        block: Block::Module,
    };
    for (index, text) in source.lines().enumerate() {
        let line = tokenize(text, index as u32 + 1);
        scanner.line(&line)?;
    }
    scanner.finish()
}

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Number,
    Str,
    Punct,
    /// `:=` in named arguments.
    NamedArg,
    Comment,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    col: u32,
}

impl Token<'_> {
    fn end(&self) -> u32 {
        self.col + self.text.len() as u32
    }

    fn selection(&self, line: u32) -> Selection {
        Selection::on_line(line, self.col, self.text.len() as u32)
    }

    fn is_kw(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Ident && self.text.eq_ignore_ascii_case(keyword)
    }

    fn is_punct(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == punct
    }

    /// An identifier that can name a declaration.
    fn is_name(&self) -> bool {
        self.kind == TokenKind::Ident && !is_vba_keyword(self.text)
    }
}

struct Line<'a> {
    number: u32,
    text: &'a str,
    tokens: Vec<Token<'a>>,
    comment: Option<Token<'a>>,
}

impl Line<'_> {
    /// Source text spanned by `tokens`.
    fn slice(&self, tokens: &[Token<'_>]) -> Option<String> {
        let (first, last) = (tokens.first()?, tokens.last()?);
        self.text
            .get((first.col - 1) as usize..(last.end() - 1) as usize)
            .map(str::to_string)
    }

    /// Selection spanned by `tokens`.
    fn span(&self, tokens: &[Token<'_>]) -> Selection {
        match (tokens.first(), tokens.last()) {
            (Some(first), Some(last)) => {
                Selection::new(self.number, first.col, self.number, last.end())
            }
            _ => Selection::at(self.number, 1),
        }
    }
}

fn tokenize(text: &str, number: u32) -> Line<'_> {
    let bytes = text.as_bytes();
    let mut tokens: Vec<Token<'_>> = Vec::new();
    let mut comment = None;
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let col = i as u32 + 1;
        let token = move |kind: TokenKind, end: usize| Token {
            kind,
            text: &text[start..end],
            col,
        };
        match bytes[i] {
            b' ' | b'\t' => i += 1,
            b'\'' => {
                comment = Some(token(TokenKind::Comment, bytes.len()));
                break;
            }
            b'"' => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'"' {
                        if bytes.get(i + 1) == Some(&b'"') {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                tokens.push(token(TokenKind::Str, i));
            }
            b if b.is_ascii_alphabetic() => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let starts_statement = match tokens.last() {
                    Some(t) => t.is_punct(":"),
                    None => true,
                };
                if starts_statement && text[start..i].eq_ignore_ascii_case("Rem") {
                    comment = Some(token(TokenKind::Comment, bytes.len()));
                    break;
                }
                tokens.push(token(TokenKind::Ident, i));
                // Type suffix, as in `Left$`.
                let suffixed = i < bytes.len()
                    && b"$%!#@&".contains(&bytes[i])
                    && !bytes.get(i + 1).is_some_and(|c| c.is_ascii_alphanumeric());
                if suffixed {
                    i += 1;
                }
            }
            b if b.is_ascii_digit() => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                    i += 1;
                }
                tokens.push(token(TokenKind::Number, i));
            }
            b'&' if matches!(bytes.get(i + 1), Some(b'H' | b'h' | b'O' | b'o'))
                && bytes.get(i + 2).is_some_and(|c| c.is_ascii_hexdigit()) =>
            {
                i += 2;
                while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                tokens.push(token(TokenKind::Number, i));
            }
            b':' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                tokens.push(token(TokenKind::NamedArg, i));
            }
            b if b.is_ascii() => {
                i += 1;
                tokens.push(token(TokenKind::Punct, i));
            }
            _ => i += text[i..].chars().next().map_or(1, char::len_utf8),
        }
    }

    Line {
        number,
        text,
        tokens,
        comment,
    }
}

/// Split on a punctuation token outside parentheses.
fn split_top_level<'t, 'a>(tokens: &'t [Token<'a>], sep: &str) -> Vec<&'t [Token<'a>]> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, t) in tokens.iter().enumerate() {
        if t.is_punct("(") {
            depth += 1;
        } else if t.is_punct(")") {
            depth -= 1;
        } else if depth == 0 && t.is_punct(sep) {
            parts.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    parts.push(&tokens[start..]);
    parts
}

/// Split on a keyword outside parentheses.
fn split_on_keyword<'t, 'a>(tokens: &'t [Token<'a>], keyword: &str) -> Vec<&'t [Token<'a>]> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, t) in tokens.iter().enumerate() {
        if t.is_kw(keyword) {
            parts.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    parts.push(&tokens[start..]);
    parts
}

fn find_top_level(tokens: &[Token<'_>], punct: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, t) in tokens.iter().enumerate() {
        if t.is_punct("(") {
            depth += 1;
        } else if t.is_punct(")") {
            depth -= 1;
        } else if depth == 0 && t.is_punct(punct) {
            return Some(i);
        }
    }
    None
}

fn matching_paren(tokens: &[Token<'_>], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, t) in tokens.iter().enumerate().skip(open) {
        if t.is_punct("(") {
            depth += 1;
        } else if t.is_punct(")") {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Leading `a.b.c` chain: the identifiers and the number of tokens consumed.
///
/// A chain starting with `.` (a `With` member) yields no identifiers.
fn chain<'a>(tokens: &[Token<'a>]) -> (Vec<Token<'a>>, usize) {
    let mut i = 0;
    if tokens.first().is_some_and(|t| t.is_punct(".")) {
        while i + 1 < tokens.len() && tokens[i].is_punct(".") && tokens[i + 1].kind == TokenKind::Ident {
            i += 2;
        }
        return (Vec::new(), i);
    }
    let mut names = Vec::new();
    while let Some(t) = tokens.get(i) {
        if t.kind != TokenKind::Ident {
            break;
        }
        names.push(*t);
        i += 1;
        let continues = tokens.get(i).is_some_and(|t| t.is_punct("."))
            && tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::Ident);
        if !continues {
            break;
        }
        i += 1;
    }
    (names, i)
}

/// `target [(args)] = value` with a chain target.
fn is_assignment(stmt: &[Token<'_>]) -> bool {
    let Some(eq) = find_top_level(stmt, "=") else {
        return false;
    };
    let (names, mut i) = chain(stmt);
    if i == 0 || (names.is_empty() && i < 2) {
        return false;
    }
    if i < eq && stmt[i].is_punct("(") {
        match matching_paren(stmt, i) {
            Some(close) => i = close + 1,
            None => return false,
        }
    }
    i == eq
}

fn accessibility(token: &Token<'_>) -> Option<Accessibility> {
    if token.is_kw("Public") || token.is_kw("Global") {
        Some(Accessibility::Public)
    } else if token.is_kw("Private") {
        Some(Accessibility::Private)
    } else if token.is_kw("Friend") {
        Some(Accessibility::Friend)
    } else {
        None
    }
}

/// `As [New] Type [()] [= value]`
struct TypeClause<'t, 'a> {
    type_name: Option<String>,
    is_array: bool,
    value: &'t [Token<'a>],
}

fn type_clause<'t, 'a>(line: &Line<'_>, tokens: &'t [Token<'a>]) -> TypeClause<'t, 'a> {
    let (declared, value) = match find_top_level(tokens, "=") {
        Some(eq) => (&tokens[..eq], &tokens[eq + 1..]),
        None => (tokens, &tokens[tokens.len()..]),
    };
    let mut clause = TypeClause {
        type_name: None,
        is_array: false,
        value,
    };
    if declared.first().is_some_and(|t| t.is_kw("As")) {
        let mut ty = &declared[1..];
        if ty.first().is_some_and(|t| t.is_kw("New")) {
            ty = &ty[1..];
        }
        let n = ty.len();
        if n >= 2 && ty[n - 2].is_punct("(") && ty[n - 1].is_punct(")") {
            clause.is_array = true;
            ty = &ty[..n - 2];
        }
        clause.type_name = line.slice(ty);
    }
    clause
}

// ============================================================================
// Scanner
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Module,
    Header { depth: u32 },
    Member { index: usize, kind: DeclarationKind },
    Enum { index: usize },
    Type { index: usize },
}

struct Scanner {
    analysis: ModuleAnalysis,
    block: Block,
}

impl Scanner {
    fn line(&mut self, line: &Line<'_>) -> Result<(), ScanError> {
        if let Some(comment) = &line.comment {
            self.analysis.comments.push(CommentData {
                text: comment.text.to_string(),
                selection: comment.selection(line.number),
            });
        }
        for (position, stmt) in split_top_level(&line.tokens, ":").into_iter().enumerate() {
            if stmt.is_empty() {
                continue;
            }
            match self.block {
                Block::Header { depth } => {
                    if stmt[0].is_kw("BEGIN") {
                        self.block = Block::Header { depth: depth + 1 };
                    } else if stmt.len() == 1 && stmt[0].is_kw("END") {
                        self.block = if depth <= 1 {
                            Block::Module
                        } else {
                            Block::Header { depth: depth - 1 }
                        };
                    }
                }
                Block::Module => self.module_statement(line, stmt)?,
                Block::Member { index, kind } => {
                    self.member_statement(line, position, stmt, index, kind)?
                }
                Block::Enum { index } => self.enum_statement(line, stmt, index),
                Block::Type { index } => self.type_statement(line, stmt, index),
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<ModuleAnalysis, ScanError> {
        let open = match self.block {
            Block::Module | Block::Header { .. } => None,
            Block::Member { index, .. } | Block::Enum { index } | Block::Type { index } => {
                self.analysis.declarations.get(index)
            }
        };
        if let Some(decl) = open {
            return Err(ScanError::Unterminated {
                line: decl.selection.start_line,
                opened: format!("{} '{}'", decl.kind, decl.name),
            });
        }
        debug!(
            module = %self.analysis.module,
            declarations = self.analysis.declarations.len(),
            usages = self.analysis.usages.len(),
            "module scanned"
        );
        Ok(self.analysis)
    }

    fn push(&mut self, data: DeclarationData) -> usize {
        self.analysis.declarations.push(data);
        self.analysis.declarations.len() - 1
    }

    fn close(&mut self, index: usize, line: &Line<'_>, stmt: &[Token<'_>]) {
        let end = line.span(stmt);
        if let Some(decl) = self.analysis.declarations.get_mut(index) {
            let start = decl.context_selection.unwrap_or(decl.selection);
            decl.context_selection = Some(Selection::new(
                start.start_line,
                start.start_column,
                end.end_line,
                end.end_column,
            ));
        }
        self.block = Block::Module;
    }

    // ------------------------------------------------------------------------
    // Module level
    // ------------------------------------------------------------------------

    fn module_statement(&mut self, line: &Line<'_>, stmt: &[Token<'_>]) -> Result<(), ScanError> {
        let first = &stmt[0];
        if first.is_kw("Option") || first.is_kw("Attribute") || first.is_kw("VERSION") {
            return Ok(());
        }
        if first.is_kw("BEGIN") {
            self.block = Block::Header { depth: 1 };
            return Ok(());
        }
        if first.is_kw("Implements") {
            if let Some(interface) = stmt.get(1).filter(|t| t.kind == TokenKind::Ident) {
                self.analysis.implements.push(ImplementsData {
                    interface: interface.text.to_string(),
                    selection: line.span(stmt),
                });
            }
            return Ok(());
        }

        let access = accessibility(first);
        let mut rest = if access.is_some() { &stmt[1..] } else { stmt };
        if rest.first().is_some_and(|t| t.is_kw("Static")) {
            rest = &rest[1..];
        }
        let Some(head) = rest.first() else {
            return Ok(());
        };

        if head.is_kw("Dim") {
            let access = access.unwrap_or(Accessibility::Private);
            self.declare_variables(line, stmt, &rest[1..], access, DeclarationKind::Variable, None);
        } else if head.is_kw("Const") {
            let access = access.unwrap_or(Accessibility::Private);
            self.declare_variables(line, stmt, &rest[1..], access, DeclarationKind::Constant, None);
        } else if head.is_kw("Sub") || head.is_kw("Function") || head.is_kw("Property") {
            self.open_member(line, stmt, rest, access.unwrap_or(Accessibility::Implicit))?;
        } else if head.is_kw("Declare") {
            self.declare_external(line, stmt, &rest[1..], access.unwrap_or(Accessibility::Implicit))?;
        } else if head.is_kw("Event") {
            self.declare_event(line, stmt, &rest[1..], access.unwrap_or(Accessibility::Implicit))?;
        } else if head.is_kw("Enum") || head.is_kw("Type") {
            let name = rest
                .get(1)
                .filter(|t| t.is_name())
                .ok_or_else(|| syntax(line, format!("expected a name after '{}'", head.text)))?;
            let kind = if head.is_kw("Enum") {
                DeclarationKind::Enumeration
            } else {
                DeclarationKind::UserDefinedType
            };
            let index = self.push(DeclarationData {
                name: name.text.to_string(),
                kind,
                type_name: Some(name.text.to_string()),
                is_array: false,
                accessibility: access.unwrap_or(Accessibility::Implicit),
                selection: name.selection(line.number),
                context_selection: Some(line.span(stmt)),
                parent_index: None,
                parameter: None,
            });
            self.block = if kind == DeclarationKind::Enumeration {
                Block::Enum { index }
            } else {
                Block::Type { index }
            };
        } else if let Some(access) = access {
            self.declare_variables(line, stmt, rest, access, DeclarationKind::Variable, None);
        } else {
            debug!(line = line.number, "skipping module-level statement");
        }
        Ok(())
    }

    /// Comma-separated `name [(bounds)] [As Type] [= value]` items.
    fn declare_variables(
        &mut self,
        line: &Line<'_>,
        stmt: &[Token<'_>],
        items: &[Token<'_>],
        access: Accessibility,
        kind: DeclarationKind,
        member: Option<usize>,
    ) {
        let context = line.span(stmt);
        for item in split_top_level(items, ",") {
            let item = match item.first() {
                Some(t) if t.is_kw("WithEvents") => &item[1..],
                _ => item,
            };
            let Some(name) = item.first().filter(|t| t.is_name()) else {
                continue;
            };
            let mut pos = 1;
            let mut is_array = false;
            if item.get(1).is_some_and(|t| t.is_punct("(")) {
                let close = matching_paren(item, 1).unwrap_or(item.len());
                is_array = true;
                self.expression(line, &item[2..close], &[SyntaxKind::Expression], member);
                pos = close + 1;
            }
            let clause = type_clause(line, &item[pos.min(item.len())..]);
            self.expression(line, clause.value, &[SyntaxKind::Expression], member);
            self.push(DeclarationData {
                name: name.text.to_string(),
                kind,
                type_name: clause.type_name,
                is_array: is_array || clause.is_array,
                accessibility: access,
                selection: name.selection(line.number),
                context_selection: Some(context),
                parent_index: member,
                parameter: None,
            });
        }
    }

    fn open_member(
        &mut self,
        line: &Line<'_>,
        stmt: &[Token<'_>],
        rest: &[Token<'_>],
        access: Accessibility,
    ) -> Result<(), ScanError> {
        let (kind, name_at) = if rest[0].is_kw("Sub") {
            (DeclarationKind::Procedure, 1)
        } else if rest[0].is_kw("Function") {
            (DeclarationKind::Function, 1)
        } else {
            let accessor = rest.get(1);
            let kind = match accessor {
                Some(t) if t.is_kw("Get") => DeclarationKind::PropertyGet,
                Some(t) if t.is_kw("Let") => DeclarationKind::PropertyLet,
                Some(t) if t.is_kw("Set") => DeclarationKind::PropertySet,
                _ => return Err(syntax(line, "expected Get, Let or Set after 'Property'")),
            };
            (kind, 2)
        };
        let index = self.declare_signature(line, stmt, kind, &rest[name_at..], access)?;
        self.block = Block::Member { index, kind };
        Ok(())
    }

    /// `Name [(params)] [As Type]`, declaring the member and its parameters.
    fn declare_signature(
        &mut self,
        line: &Line<'_>,
        stmt: &[Token<'_>],
        kind: DeclarationKind,
        signature: &[Token<'_>],
        access: Accessibility,
    ) -> Result<usize, ScanError> {
        let name = signature
            .first()
            .filter(|t| t.kind == TokenKind::Ident)
            .ok_or_else(|| syntax(line, format!("expected a {} name", kind)))?;

        let mut after = &signature[1..];
        // `Declare` statements: `Lib "x" [Alias "y"]`.
        while after
            .first()
            .is_some_and(|t| t.is_kw("Lib") || t.is_kw("Alias") || t.kind == TokenKind::Str)
        {
            after = &after[1..];
        }
        let mut params: &[Token<'_>] = &[];
        if after.first().is_some_and(|t| t.is_punct("(")) {
            let close = matching_paren(after, 0)
                .ok_or_else(|| syntax(line, "unclosed parameter list"))?;
            params = &after[1..close];
            after = &after[close + 1..];
        }
        let clause = type_clause(line, after);
        let returns = matches!(kind, DeclarationKind::Function | DeclarationKind::PropertyGet);

        let index = self.push(DeclarationData {
            name: name.text.to_string(),
            kind,
            type_name: if returns { clause.type_name } else { None },
            is_array: returns && clause.is_array,
            accessibility: access,
            selection: name.selection(line.number),
            context_selection: Some(line.span(stmt)),
            parent_index: None,
            parameter: None,
        });
        self.declare_parameters(line, params, index);
        Ok(index)
    }

    fn declare_parameters(&mut self, line: &Line<'_>, params: &[Token<'_>], member: usize) {
        if params.is_empty() {
            return;
        }
        for item in split_top_level(params, ",") {
            let mut info = ParameterInfo::default();
            let mut i = 0;
            while let Some(t) = item.get(i) {
                if t.is_kw("Optional") {
                    info.optional = true;
                } else if t.is_kw("ByVal") {
                    info.passing = Passing::ByVal;
                    info.explicit_passing = true;
                } else if t.is_kw("ByRef") {
                    info.passing = Passing::ByRef;
                    info.explicit_passing = true;
                } else if t.is_kw("ParamArray") {
                    info.param_array = true;
                } else {
                    break;
                }
                i += 1;
            }
            let Some(name) = item.get(i).filter(|t| t.kind == TokenKind::Ident) else {
                continue;
            };
            let mut is_array = false;
            i += 1;
            if item.get(i).is_some_and(|t| t.is_punct("("))
                && item.get(i + 1).is_some_and(|t| t.is_punct(")"))
            {
                is_array = true;
                i += 2;
            }
            let clause = type_clause(line, &item[i.min(item.len())..]);
            info.default_value = line.slice(clause.value);
            self.push(DeclarationData {
                name: name.text.to_string(),
                kind: DeclarationKind::Parameter,
                type_name: clause.type_name,
                is_array: is_array || clause.is_array,
                accessibility: Accessibility::Implicit,
                selection: name.selection(line.number),
                context_selection: Some(line.span(item)),
                parent_index: Some(member),
                parameter: Some(info),
            });
        }
    }

    fn declare_external(
        &mut self,
        line: &Line<'_>,
        stmt: &[Token<'_>],
        rest: &[Token<'_>],
        access: Accessibility,
    ) -> Result<(), ScanError> {
        let rest = match rest.first() {
            Some(t) if t.is_kw("PtrSafe") => &rest[1..],
            _ => rest,
        };
        let kind = match rest.first() {
            Some(t) if t.is_kw("Sub") => DeclarationKind::Procedure,
            Some(t) if t.is_kw("Function") => DeclarationKind::Function,
            _ => return Err(syntax(line, "expected Sub or Function after 'Declare'")),
        };
        self.declare_signature(line, stmt, kind, &rest[1..], access)?;
        Ok(())
    }

    fn declare_event(
        &mut self,
        line: &Line<'_>,
        stmt: &[Token<'_>],
        rest: &[Token<'_>],
        access: Accessibility,
    ) -> Result<(), ScanError> {
        self.declare_signature(line, stmt, DeclarationKind::Event, rest, access)?;
        Ok(())
    }

    fn enum_statement(&mut self, line: &Line<'_>, stmt: &[Token<'_>], index: usize) {
        if stmt[0].is_kw("End") && stmt.get(1).is_some_and(|t| t.is_kw("Enum")) {
            self.close(index, line, stmt);
            return;
        }
        let Some(name) = stmt.first().filter(|t| t.is_name()) else {
            return;
        };
        let clause = type_clause(line, &stmt[1..]);
        self.expression(line, clause.value, &[SyntaxKind::Expression], None);
        let enum_name = self.analysis.declarations.get(index).map(|d| d.name.clone());
        self.push(DeclarationData {
            name: name.text.to_string(),
            kind: DeclarationKind::EnumerationMember,
            type_name: enum_name,
            is_array: false,
            accessibility: Accessibility::Implicit,
            selection: name.selection(line.number),
            context_selection: Some(line.span(stmt)),
            parent_index: Some(index),
            parameter: None,
        });
    }

    fn type_statement(&mut self, line: &Line<'_>, stmt: &[Token<'_>], index: usize) {
        if stmt[0].is_kw("End") && stmt.get(1).is_some_and(|t| t.is_kw("Type")) {
            self.close(index, line, stmt);
            return;
        }
        self.declare_variables(
            line,
            stmt,
            stmt,
            Accessibility::Implicit,
            DeclarationKind::UserDefinedTypeMember,
            Some(index),
        );
    }

    // ------------------------------------------------------------------------
    // Member bodies
    // ------------------------------------------------------------------------

    fn member_statement(
        &mut self,
        line: &Line<'_>,
        position: usize,
        stmt: &[Token<'_>],
        member: usize,
        kind: DeclarationKind,
    ) -> Result<(), ScanError> {
        if stmt[0].is_kw("End") {
            if let Some(closing) = stmt
                .get(1)
                .filter(|t| t.is_kw("Sub") || t.is_kw("Function") || t.is_kw("Property"))
            {
                let expected = kind.member_terminator().unwrap_or("End Sub");
                let found = format!("End {}", closing.text);
                if !expected.eq_ignore_ascii_case(&found) {
                    return Err(syntax(line, format!("expected '{}', found '{}'", expected, found)));
                }
                self.close(member, line, stmt);
                return Ok(());
            }
        }

        let is_label = position == 0
            && stmt.len() == 1
            && stmt[0].is_name()
            && line.tokens.get(1).is_some_and(|t| t.is_punct(":"));
        if is_label {
            self.push(DeclarationData {
                name: stmt[0].text.to_string(),
                kind: DeclarationKind::LineLabel,
                type_name: None,
                is_array: false,
                accessibility: Accessibility::Implicit,
                selection: stmt[0].selection(line.number),
                context_selection: Some(line.span(stmt)),
                parent_index: Some(member),
                parameter: None,
            });
            return Ok(());
        }

        self.statement(line, stmt, member);
        Ok(())
    }

    fn statement(&mut self, line: &Line<'_>, stmt: &[Token<'_>], member: usize) {
        let Some(first) = stmt.first() else {
            return;
        };
        let scope = Some(member);
        let keyword = if first.kind == TokenKind::Ident {
            first.text.to_ascii_lowercase()
        } else {
            String::new()
        };

        match keyword.as_str() {
            "dim" | "static" => self.declare_variables(
                line,
                stmt,
                &stmt[1..],
                Accessibility::Implicit,
                DeclarationKind::Variable,
                scope,
            ),
            "const" => self.declare_variables(
                line,
                stmt,
                &stmt[1..],
                Accessibility::Implicit,
                DeclarationKind::Constant,
                scope,
            ),
            "redim" => {
                let rest = match stmt.get(1) {
                    Some(t) if t.is_kw("Preserve") => &stmt[2..],
                    _ => &stmt[1..],
                };
                for item in split_top_level(rest, ",") {
                    let n = self.target(line, item, true, &[SyntaxKind::RedimStmt], scope);
                    self.expression(
                        line,
                        &item[n..],
                        &[SyntaxKind::Expression, SyntaxKind::RedimStmt],
                        scope,
                    );
                }
            }
            "set" => self.assignment(line, &stmt[1..], SyntaxKind::SetStmt, scope),
            "let" => self.assignment(line, &stmt[1..], SyntaxKind::LetStmt, scope),
            "call" | "raiseevent" => self.call(line, &stmt[1..], scope),
            "if" | "elseif" => {
                let then = stmt.iter().position(|t| t.is_kw("Then")).unwrap_or(stmt.len());
                self.expression(
                    line,
                    &stmt[1..then],
                    &[SyntaxKind::Expression, SyntaxKind::IfStmt],
                    scope,
                );
                if then + 1 < stmt.len() {
                    for part in split_on_keyword(&stmt[then + 1..], "Else") {
                        self.statement(line, part, member);
                    }
                }
            }
            "else" => self.statement(line, &stmt[1..], member),
            "for" => {
                let (rest, kind) = match stmt.get(1) {
                    Some(t) if t.is_kw("Each") => (&stmt[2..], SyntaxKind::ForEachStmt),
                    _ => (&stmt[1..], SyntaxKind::ForNextStmt),
                };
                let n = self.target(line, rest, true, &[kind], scope);
                self.expression(line, &rest[n..], &[SyntaxKind::Expression, kind], scope);
            }
            "next" => self.expression(line, &stmt[1..], &[SyntaxKind::ForNextStmt], scope),
            "select" | "case" => self.expression(
                line,
                &stmt[1..],
                &[SyntaxKind::Expression, SyntaxKind::SelectCaseStmt],
                scope,
            ),
            "do" | "loop" => self.expression(
                line,
                &stmt[1..],
                &[SyntaxKind::Expression, SyntaxKind::DoLoopStmt],
                scope,
            ),
            "while" => self.expression(
                line,
                &stmt[1..],
                &[SyntaxKind::Expression, SyntaxKind::WhileWendStmt],
                scope,
            ),
            "with" => self.expression(
                line,
                &stmt[1..],
                &[SyntaxKind::Expression, SyntaxKind::WithStmt],
                scope,
            ),
            "erase" => self.expression(line, &stmt[1..], &[SyntaxKind::Expression], scope),
            "goto" | "gosub" | "on" => {
                let label = stmt
                    .iter()
                    .skip_while(|t| !t.is_kw("GoTo") && !t.is_kw("GoSub"))
                    .nth(1)
                    .filter(|t| t.is_name());
                if let Some(label) = label {
                    self.usage(line, label, false, Vec::new(), scope, None);
                }
            }
            "end" | "exit" | "stop" | "resume" | "return" | "wend" | "attribute" | "option" => {}
            _ if is_assignment(stmt) => self.assignment(line, stmt, SyntaxKind::LetStmt, scope),
            _ => self.call(line, stmt, scope),
        }
    }

    fn assignment(
        &mut self,
        line: &Line<'_>,
        tokens: &[Token<'_>],
        kind: SyntaxKind,
        scope: Option<usize>,
    ) {
        let Some(eq) = find_top_level(tokens, "=") else {
            self.expression(line, tokens, &[SyntaxKind::Expression, kind], scope);
            return;
        };
        let target = &tokens[..eq];
        let n = self.target(line, target, true, &[kind], scope);
        self.expression(line, &target[n..], &[SyntaxKind::Expression, kind], scope);
        self.expression(line, &tokens[eq + 1..], &[SyntaxKind::Expression, kind], scope);
    }

    fn call(&mut self, line: &Line<'_>, tokens: &[Token<'_>], scope: Option<usize>) {
        let n = self.target(line, tokens, false, &[SyntaxKind::CallStmt], scope);
        self.expression(
            line,
            &tokens[n..],
            &[
                SyntaxKind::Expression,
                SyntaxKind::ArgumentList,
                SyntaxKind::CallStmt,
            ],
            scope,
        );
    }

    /// Record the leading chain of a statement; returns the tokens consumed.
    fn target(
        &mut self,
        line: &Line<'_>,
        tokens: &[Token<'_>],
        is_assignment: bool,
        context: &[SyntaxKind],
        scope: Option<usize>,
    ) -> usize {
        let (names, consumed) = chain(tokens);
        let access_context = || {
            let mut ctx = vec![SyntaxKind::MemberAccess];
            ctx.extend_from_slice(context);
            ctx
        };
        match names.as_slice() {
            [] => {}
            [single] => {
                if single.is_name() {
                    self.usage(line, single, is_assignment, context.to_vec(), scope, None);
                }
            }
            [qualifier, target] => {
                if qualifier.is_name() {
                    self.usage(line, qualifier, false, access_context(), scope, None);
                }
                if target.is_name() {
                    self.usage(
                        line,
                        target,
                        is_assignment,
                        context.to_vec(),
                        scope,
                        Some(qualifier.text),
                    );
                }
            }
            [first, ..] => {
                if first.is_name() {
                    self.usage(line, first, false, access_context(), scope, None);
                }
            }
        }
        consumed
    }

    /// Record every identifier read in an expression.
    fn expression(
        &mut self,
        line: &Line<'_>,
        tokens: &[Token<'_>],
        context: &[SyntaxKind],
        scope: Option<usize>,
    ) {
        for (i, token) in tokens.iter().enumerate() {
            if !token.is_name() || tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::NamedArg) {
                continue;
            }
            let after_dot = i > 0 && tokens[i - 1].is_punct(".");
            let qualifier = if after_dot {
                let qualifier = i
                    .checked_sub(2)
                    .map(|j| &tokens[j])
                    .filter(|q| q.kind == TokenKind::Ident);
                let chained = i >= 3 && tokens[i - 3].is_punct(".");
                match qualifier {
                    Some(q) if !chained => Some(q.text),
                    _ => continue,
                }
            } else {
                None
            };
            let mut ctx = context.to_vec();
            if tokens.get(i + 1).is_some_and(|t| t.is_punct(".")) {
                ctx.insert(0, SyntaxKind::MemberAccess);
            }
            self.usage(line, token, false, ctx, scope, qualifier);
        }
    }

    fn usage(
        &mut self,
        line: &Line<'_>,
        token: &Token<'_>,
        is_assignment: bool,
        context: Vec<SyntaxKind>,
        scope: Option<usize>,
        qualifier: Option<&str>,
    ) {
        let qualifier = qualifier.map(|q| {
            if q.eq_ignore_ascii_case("Me") {
                self.analysis.module.module.clone()
            } else {
                q.to_string()
            }
        });
        self.analysis.usages.push(UsageData {
            name: token.text.to_string(),
            selection: token.selection(line.number),
            is_assignment,
            context,
            member_index: scope,
            qualifier,
        });
    }
}

fn syntax(line: &Line<'_>, message: impl Into<String>) -> ScanError {
    ScanError::Syntax {
        line: line.number,
        message: message.into(),
    }
}

// ============================================================================
// Tests
// ============================================================================
