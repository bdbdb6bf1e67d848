//! Extract interface: create an interface class from a class's public members.
//!
//! The operation:
//! 1. Lists the class's public (or implicitly public) procedures, functions
//!    and property accessors as candidates, none selected
//! 2. Creates a new `@Interface` class module holding empty signatures of the
//!    selected members
//! 3. Adds `Implements <Interface>` to the class, after its options
//! 4. Appends a stub implementation for each selected member

use ducktool_core::config::RefactoringConfig;
use ducktool_core::graph::{Accessibility, DeclarationGraph};
use ducktool_core::rewrite::RecordingSession;
use ducktool_core::types::QualifiedModuleName;
use ducktool_core::validation::validate_vba_identifier;
use serde::Serialize;

use crate::failure::RefactoringFailure;
use crate::notifier::{base_message, FailureMessages};
use crate::ops::signature::{implementation_stub, MemberSignature};
use crate::ops::{declarations_section_line, insert_lines, target_declaration};
use crate::pipeline::{Refactoring, RefactoringModel, RefactoringTarget, RewriteContext, TargetIdentity};

/// A member that can go on the interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceMember {
    pub signature: MemberSignature,
    pub selected: bool,
}

/// Choices for extracting an interface from one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractInterfaceModel {
    pub target: TargetIdentity,
    pub interface_name: String,
    /// Candidates in position order.
    pub members: Vec<InterfaceMember>,
}

impl RefactoringModel for ExtractInterfaceModel {
    fn target(&self) -> &TargetIdentity {
        &self.target
    }
}

impl ExtractInterfaceModel {
    /// Selected members, in position order.
    pub fn selected_members(&self) -> impl Iterator<Item = &InterfaceMember> {
        self.members.iter().filter(|m| m.selected)
    }

    /// Select every candidate named `name` (all accessors of a property).
    /// Returns false if there is none.
    pub fn select(&mut self, name: &str) -> bool {
        let mut found = false;
        for member in &mut self.members {
            if member.signature.name.eq_ignore_ascii_case(name) {
                member.selected = true;
                found = true;
            }
        }
        found
    }

    pub fn select_all(&mut self) {
        for member in &mut self.members {
            member.selected = true;
        }
    }

    /// Source of the new interface module.
    pub fn interface_source(&self) -> String {
        let mut source = String::from("'@Interface\nOption Explicit\n");
        for member in self.selected_members() {
            let signature = &member.signature;
            source.push('\n');
            source.push_str(&signature.block("Public", &signature.name, &[]));
            source.push('\n');
        }
        source
    }
}

/// Failure wording for extract interface.
pub struct ExtractInterfaceMessages;

impl FailureMessages for ExtractInterfaceMessages {
    fn caption(&self) -> &str {
        "Extract Interface"
    }

    fn message(&self, failure: &RefactoringFailure) -> Option<String> {
        match failure {
            RefactoringFailure::InvalidDeclarationType { name, actual, .. } => Some(format!(
                "'{}' is a {}. Interfaces can only be extracted from class modules.",
                name, actual
            )),
            other => base_message(other),
        }
    }
}

/// The extract interface operation.
#[derive(Debug, Clone, Default)]
pub struct ExtractInterface {
    config: RefactoringConfig,
}

impl ExtractInterface {
    pub fn new(config: RefactoringConfig) -> Self {
        Self { config }
    }
}

impl Refactoring for ExtractInterface {
    type Model = ExtractInterfaceModel;

    fn name(&self) -> &'static str {
        "extract-interface"
    }

    fn messages(&self) -> &dyn FailureMessages {
        &ExtractInterfaceMessages
    }

    fn build_model(
        &self,
        graph: &DeclarationGraph,
        target: &RefactoringTarget,
    ) -> Result<ExtractInterfaceModel, RefactoringFailure> {
        // A cursor anywhere in a module selects the module.
        let class = match target {
            RefactoringTarget::Selection(selection) => graph
                .module_declaration(&selection.module)
                .ok_or(RefactoringFailure::NoTarget)?,
            RefactoringTarget::Declaration(_) => target_declaration(graph, target)?,
        };
        if !class.kind.is_class_module() {
            return Err(RefactoringFailure::invalid_type(&class.name, class.kind, "a class module"));
        }

        let members = graph
            .members(&class.module, |d| {
                d.kind.is_member()
                    && matches!(d.accessibility, Accessibility::Public | Accessibility::Implicit)
            })
            .into_iter()
            .map(|member| InterfaceMember {
                signature: MemberSignature::of(graph, member),
                selected: false,
            })
            .collect();

        Ok(ExtractInterfaceModel {
            target: TargetIdentity::of(class),
            interface_name: format!("{}{}", self.config.interface_prefix, class.name),
            members,
        })
    }

    fn validate(&self, graph: &DeclarationGraph, model: &ExtractInterfaceModel) -> Result<(), RefactoringFailure> {
        validate_vba_identifier(&model.interface_name)?;
        if graph.module_named(&model.interface_name).is_some() {
            return Err(RefactoringFailure::validation(format!(
                "a module named '{}' already exists",
                model.interface_name
            )));
        }
        if model.selected_members().next().is_none() {
            return Err(RefactoringFailure::validation("select at least one member"));
        }
        // `<Interface>_<Member>` must split unambiguously.
        if let Some(member) = model
            .selected_members()
            .find(|m| m.signature.name.contains('_'))
        {
            return Err(RefactoringFailure::validation(format!(
                "'{}' contains an underscore and cannot be an interface member",
                member.signature.name
            )));
        }
        Ok(())
    }

    fn rewrite(
        &self,
        context: &RewriteContext<'_>,
        model: &ExtractInterfaceModel,
        edits: &mut RecordingSession,
    ) -> Result<(), RefactoringFailure> {
        let class = &model.target.selection.module;
        let interface = QualifiedModuleName::new(class.project.clone(), model.interface_name.clone());
        let text = context.module_text(class)?;

        edits.create_module(&interface, &model.interface_source());
        insert_lines(
            edits,
            class,
            &text,
            declarations_section_line(&text),
            &format!("Implements {}\n", model.interface_name),
        );

        let stubs: Vec<String> = model
            .selected_members()
            .map(|m| implementation_stub(&model.interface_name, &m.signature, &self.config.stub_body))
            .collect();
        edits.append(class, &format!("\n{}\n", stubs.join("\n\n")));
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

    const ACCOUNT: &str = "Option Explicit\n\
                           Private balance As Currency\n\
                           Private Sub Audit()\n\
                           End Sub\n\
                           Public Function Withdraw(ByVal amount As Currency) As Boolean\n\
                           End Function\n\
                           Sub Deposit(ByVal amount As Currency)\n\
                           End Sub\n\
                           Public Property Get Owner() As String\n\
                           End Property\n\
                           Public Property Let Owner(ByVal value As String)\n\
                           End Property\n\
                           Friend Sub Shutdown()\n\
                           End Sub\n";

    fn model() -> (DeclarationGraph, ExtractInterfaceModel) {
        let g = graph(&[("Account", ModuleKind::Class, ACCOUNT)]);
        let cursor = QualifiedSelection::new(qmn("Account"), Selection::at(5, 20));
        let model = ExtractInterface::default()
            .build_model(&g, &RefactoringTarget::Selection(cursor))
            .unwrap();
        (g, model)
    }

    #[test]
    fn candidates_are_public_members_in_position_order() {
        let (_, model) = model();
        assert_eq!(model.interface_name, "IAccount");
        let names: Vec<(&str, DeclarationKind)> = model
            .members
            .iter()
            .map(|m| (m.signature.name.as_str(), m.signature.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Withdraw", DeclarationKind::Function),
                ("Deposit", DeclarationKind::Procedure),
                ("Owner", DeclarationKind::PropertyGet),
                ("Owner", DeclarationKind::PropertyLet),
            ]
        );
        assert!(model.members.iter().all(|m| !m.selected));
        assert_eq!(model.selected_members().count(), 0);
    }

    #[test]
    fn selection_keeps_position_order() {
        let (_, mut model) = model();
        assert!(model.select("owner"));
        assert!(model.select("Withdraw"));
        assert!(!model.select("Audit"));
        let selected: Vec<&str> = model
            .selected_members()
            .map(|m| m.signature.name.as_str())
            .collect();
        assert_eq!(selected, vec!["Withdraw", "Owner", "Owner"]);
    }

    #[test]
    fn interface_source_has_empty_signatures() {
        let (_, mut model) = model();
        model.select("Withdraw");
        assert_eq!(
            model.interface_source(),
            "'@Interface\nOption Explicit\n\nPublic Function Withdraw(ByVal amount As Currency) As Boolean\nEnd Function\n"
        );
    }

    #[test]
    fn validation() {
        let (g, mut model) = model();
        let op = ExtractInterface::default();
        assert!(op.validate(&g, &model).is_err());
        model.select_all();
        assert!(op.validate(&g, &model).is_ok());
        model.interface_name = "Account".to_string();
        assert!(op.validate(&g, &model).is_err());
    }

    #[test]
    fn procedural_modules_and_members_are_rejected() {
        let g = graph(&[
            ("Module1", ModuleKind::Procedural, "Public Sub Main()\nEnd Sub\n"),
            ("Account", ModuleKind::Class, ACCOUNT),
        ]);
        let op = ExtractInterface::default();
        let cursor = QualifiedSelection::new(qmn("Module1"), Selection::at(1, 15));
        let err = op
            .build_model(&g, &RefactoringTarget::Selection(cursor))
            .unwrap_err();
        assert!(matches!(
            err,
            RefactoringFailure::InvalidDeclarationType {
                actual: DeclarationKind::ProceduralModule,
                ..
            }
        ));

        let withdraw = g
            .members(&qmn("Account"), |d| d.name == "Withdraw")
            .into_iter()
            .next()
            .unwrap();
        let err = op
            .build_model(&g, &RefactoringTarget::Declaration(withdraw.id))
            .unwrap_err();
        assert!(matches!(err, RefactoringFailure::InvalidDeclarationType { .. }));
    }
}
