//! Implement interface: add stubs for the members of an implemented interface.
//!
//! Invoked on an `Implements` statement. Members of the interface that the
//! class does not implement yet (no `<Interface>_<Member>` of the same kind
//! and arity) get a private stub whose body comes from the configuration.

use ducktool_core::config::RefactoringConfig;
use ducktool_core::graph::{Accessibility, DeclarationGraph};
use ducktool_core::rewrite::RecordingSession;
use ducktool_core::search::implementation_name;
use ducktool_core::types::QualifiedModuleName;
use serde::Serialize;

use crate::failure::RefactoringFailure;
use crate::notifier::{base_message, FailureMessages};
use crate::ops::signature::{implementation_stub, MemberSignature};
use crate::ops::target_declaration;
use crate::pipeline::{Refactoring, RefactoringModel, RefactoringTarget, RewriteContext, TargetIdentity};

/// The interface members one class is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImplementInterfaceModel {
    /// The implementing class.
    pub target: TargetIdentity,
    pub interface: QualifiedModuleName,
    /// Members without an implementation, in interface order.
    pub members: Vec<MemberSignature>,
}

impl RefactoringModel for ImplementInterfaceModel {
    fn target(&self) -> &TargetIdentity {
        &self.target
    }
}

/// Interface members of `interface` that `class` does not implement.
pub fn missing_members(
    graph: &DeclarationGraph,
    class: &QualifiedModuleName,
    interface: &QualifiedModuleName,
) -> Vec<MemberSignature> {
    graph
        .members(interface, |d| {
            d.kind.is_member() && matches!(d.accessibility, Accessibility::Public | Accessibility::Implicit)
        })
        .into_iter()
        .map(|member| MemberSignature::of(graph, member))
        .filter(|signature| {
            let name = implementation_name(&interface.module, &signature.name);
            graph
                .members(class, |d| d.name_eq(&name) && signature.matches(graph, d))
                .is_empty()
        })
        .collect()
}

/// Failure wording for implement interface.
pub struct ImplementInterfaceMessages;

impl FailureMessages for ImplementInterfaceMessages {
    fn caption(&self) -> &str {
        "Implement Interface"
    }

    fn message(&self, failure: &RefactoringFailure) -> Option<String> {
        match failure {
            RefactoringFailure::InvalidDeclarationType { name, actual, .. } => Some(format!(
                "'{}' is a {}. Only class modules can implement interfaces.",
                name, actual
            )),
            RefactoringFailure::NoImplementsStatementSelected => Some(
                "Place the cursor on the Implements statement of the interface to implement.".to_string(),
            ),
            other => base_message(other),
        }
    }
}

/// The implement interface operation.
#[derive(Debug, Clone, Default)]
pub struct ImplementInterface {
    config: RefactoringConfig,
}

impl ImplementInterface {
    pub fn new(config: RefactoringConfig) -> Self {
        Self { config }
    }
}

impl Refactoring for ImplementInterface {
    type Model = ImplementInterfaceModel;

    fn name(&self) -> &'static str {
        "implement-interface"
    }

    fn messages(&self) -> &dyn FailureMessages {
        &ImplementInterfaceMessages
    }

    fn build_model(
        &self,
        graph: &DeclarationGraph,
        target: &RefactoringTarget,
    ) -> Result<ImplementInterfaceModel, RefactoringFailure> {
        let RefactoringTarget::Selection(selection) = target else {
            let declaration = target_declaration(graph, target)?;
            if !declaration.kind.is_class_module() {
                return Err(RefactoringFailure::invalid_type(
                    &declaration.name,
                    declaration.kind,
                    "a class module",
                ));
            }
            return Err(RefactoringFailure::NoImplementsStatementSelected);
        };

        let class = graph
            .module_declaration(&selection.module)
            .ok_or(RefactoringFailure::NoTarget)?;
        if !class.kind.is_class_module() {
            return Err(RefactoringFailure::invalid_type(&class.name, class.kind, "a class module"));
        }
        let clause = graph
            .implements_clause_at(selection)
            .ok_or(RefactoringFailure::NoImplementsStatementSelected)?;
        if graph.module_declaration(&clause.interface).is_none() {
            return Err(RefactoringFailure::InvalidModel {
                reason: format!("interface {} is not part of the project", clause.interface),
            });
        }

        Ok(ImplementInterfaceModel {
            target: TargetIdentity::of(class),
            interface: clause.interface.clone(),
            members: missing_members(graph, &class.module, &clause.interface),
        })
    }

    fn validate(&self, graph: &DeclarationGraph, model: &ImplementInterfaceModel) -> Result<(), RefactoringFailure> {
        let class = &model.target.selection.module;
        if !graph.implements(class, &model.interface) {
            return Err(RefactoringFailure::TargetStale {
                name: model.target.name.clone(),
            });
        }
        if model.members.is_empty() {
            return Err(RefactoringFailure::validation(format!(
                "{} already implements every member of {}",
                class.module, model.interface.module
            )));
        }
        Ok(())
    }

    fn rewrite(
        &self,
        _context: &RewriteContext<'_>,
        model: &ImplementInterfaceModel,
        edits: &mut RecordingSession,
    ) -> Result<(), RefactoringFailure> {
        let stubs: Vec<String> = model
            .members
            .iter()
            .map(|m| implementation_stub(&model.interface.module, m, &self.config.stub_body))
            .collect();
        edits.append(&model.target.selection.module, &format!("\n{}\n", stubs.join("\n\n")));
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ducktool_core::analysis::ModuleKind;
    use ducktool_core::graph::DeclarationKind;
    use ducktool_core::resolver::{build_declarations, resolve_references};
    use ducktool_core::scan::scan_module;
    use ducktool_core::types::{QualifiedSelection, Selection};
    use std::sync::Arc;

    fn qmn(name: &str) -> QualifiedModuleName {
        QualifiedModuleName::new("VBAProject", name)
    }

    fn graph(modules: &[(&str, ModuleKind, &str)]) -> DeclarationGraph {
        let analyses: Vec<_> = modules
            .iter()
            .map(|(name, kind, source)| Arc::new(scan_module(qmn(name), *kind, source).unwrap()))
            .collect();
        let declared = build_declarations("VBAProject", &analyses).unwrap();
        resolve_references(declared, &analyses).unwrap().0
    }

    const ISHAPE: &str = "'@Interface\n\
                          Public Function Area() As Double\n\
                          End Function\n\
                          Public Property Get Name() As String\n\
                          End Property\n\
                          Public Property Let Name(ByVal value As String)\n\
                          End Property\n\
                          Friend Sub Reset()\n\
                          End Sub\n\
                          Sub Draw()\n\
                          End Sub\n";

    const SQUARE: &str = "Option Explicit\n\
                          Implements IShape\n\
                          Private Property Get IShape_Name() As String\n\
                          End Property\n";

    fn fixture() -> DeclarationGraph {
        graph(&[
            ("IShape", ModuleKind::Class, ISHAPE),
            ("Square", ModuleKind::Class, SQUARE),
            ("Module1", ModuleKind::Procedural, "Sub Main()\nEnd Sub\n"),
        ])
    }

    #[test]
    fn lists_public_members_without_implementation() {
        let g = fixture();
        let cursor = QualifiedSelection::new(qmn("Square"), Selection::at(2, 14));
        let model = ImplementInterface::default()
            .build_model(&g, &RefactoringTarget::Selection(cursor))
            .unwrap();
        assert_eq!(model.interface, qmn("IShape"));
        let missing: Vec<(&str, DeclarationKind)> = model
            .members
            .iter()
            .map(|m| (m.name.as_str(), m.kind))
            .collect();
        assert_eq!(
            missing,
            vec![
                ("Area", DeclarationKind::Function),
                ("Name", DeclarationKind::PropertyLet),
                ("Draw", DeclarationKind::Procedure),
            ]
        );
    }

    #[test]
    fn cursor_off_the_implements_statement() {
        let g = fixture();
        let op = ImplementInterface::default();
        let cursor = QualifiedSelection::new(qmn("Square"), Selection::at(3, 5));
        assert_eq!(
            op.build_model(&g, &RefactoringTarget::Selection(cursor)),
            Err(RefactoringFailure::NoImplementsStatementSelected)
        );

        let cursor = QualifiedSelection::new(qmn("Module1"), Selection::at(1, 5));
        assert!(matches!(
            op.build_model(&g, &RefactoringTarget::Selection(cursor)),
            Err(RefactoringFailure::InvalidDeclarationType { .. })
        ));
    }
}
