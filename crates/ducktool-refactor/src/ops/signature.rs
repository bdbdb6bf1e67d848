//! Member signatures captured from the graph and rendered back to source.
//!
//! Signatures are copied out of the graph when a model is built, so a model
//! stays valid (and presentable) without borrowing a snapshot.

use ducktool_core::graph::{Declaration, DeclarationGraph, DeclarationKind, Passing};
use ducktool_core::search::implementation_name;
use serde::Serialize;

/// One parameter of a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterSignature {
    pub name: String,
    pub type_name: String,
    pub is_array: bool,
    /// `ByVal`/`ByRef`, when written explicitly.
    pub passing: Option<Passing>,
    pub optional: bool,
    pub param_array: bool,
    pub default_value: Option<String>,
}

impl ParameterSignature {
    pub fn of(parameter: &Declaration) -> Self {
        let info = parameter.parameter.clone().unwrap_or_default();
        ParameterSignature {
            name: parameter.name.clone(),
            type_name: parameter.type_name.clone(),
            is_array: parameter.is_array,
            passing: info.explicit_passing.then_some(info.passing),
            optional: info.optional,
            param_array: info.param_array,
            default_value: info.default_value,
        }
    }

    /// `[Optional] [ByVal|ByRef] [ParamArray] name[()] As Type [= default]`
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.optional {
            out.push_str("Optional ");
        }
        match self.passing {
            Some(Passing::ByVal) => out.push_str("ByVal "),
            Some(Passing::ByRef) => out.push_str("ByRef "),
            None => {}
        }
        if self.param_array {
            out.push_str("ParamArray ");
        }
        out.push_str(&self.name);
        if self.is_array {
            out.push_str("()");
        }
        out.push_str(" As ");
        out.push_str(&self.type_name);
        if let Some(default) = &self.default_value {
            out.push_str(" = ");
            out.push_str(default);
        }
        out
    }
}

/// A procedure, function or property accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSignature {
    pub name: String,
    pub kind: DeclarationKind,
    pub parameters: Vec<ParameterSignature>,
    /// Declared return type of functions and property getters.
    pub return_type: Option<String>,
}

impl MemberSignature {
    pub fn of(graph: &DeclarationGraph, member: &Declaration) -> Self {
        let returns = matches!(member.kind, DeclarationKind::Function | DeclarationKind::PropertyGet);
        MemberSignature {
            name: member.name.clone(),
            kind: member.kind,
            parameters: graph
                .parameters_of(member.id)
                .into_iter()
                .map(ParameterSignature::of)
                .collect(),
            return_type: returns.then(|| {
                if member.is_array {
                    format!("{}()", member.type_name)
                } else {
                    member.type_name.clone()
                }
            }),
        }
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// True if `declaration` has this signature's kind and arity.
    pub fn matches(&self, graph: &DeclarationGraph, declaration: &Declaration) -> bool {
        declaration.kind == self.kind && graph.parameters_of(declaration.id).len() == self.arity()
    }

    /// The opening line: `Public Function Name(a As Long) As String`.
    pub fn header(&self, access: &str, name: &str) -> String {
        let keyword = self.kind.member_keyword().unwrap_or("Sub");
        let parameters: Vec<String> = self.parameters.iter().map(ParameterSignature::render).collect();
        let mut line = format!("{} {} {}({})", access, keyword, name, parameters.join(", "));
        if let Some(return_type) = &self.return_type {
            line.push_str(" As ");
            line.push_str(return_type);
        }
        line
    }

    /// A whole member: header, indented body lines, terminator.
    pub fn block(&self, access: &str, name: &str, body: &[&str]) -> String {
        let mut lines = vec![self.header(access, name)];
        lines.extend(body.iter().map(|line| format!("    {}", line)));
        lines.push(self.kind.member_terminator().unwrap_or("End Sub").to_string());
        lines.join("\n")
    }
}

/// A private `<Interface>_<Member>` stub raising `stub_body`.
pub fn implementation_stub(interface: &str, member: &MemberSignature, stub_body: &str) -> String {
    member.block("Private", &implementation_name(interface, &member.name), &[stub_body])
}

// ============================================================================
// Tests
// ============================================================================
