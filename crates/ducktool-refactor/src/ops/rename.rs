//! Rename a declaration and every reference to it.
//!
//! The operation:
//! 1. Groups the accessors of a property, so `Get`/`Let`/`Set` rename together
//! 2. For interface members, adds every `<Interface>_<Member>` implementation
//!    (renamed to `<Interface>_<New>`)
//! 3. Invoked on an implementation, renames through its interface member,
//!    keeping the `<Interface>_` prefix
//! 4. Replaces each declaration's identifier and each of its references

use ducktool_core::graph::{Declaration, DeclarationGraph, DeclarationId};
use ducktool_core::rewrite::RecordingSession;
use ducktool_core::search::{find_all_implementations, implementation_name, interface_member_of};
use ducktool_core::validation::validate_vba_identifier;
use serde::Serialize;

use crate::failure::RefactoringFailure;
use crate::notifier::{base_message, FailureMessages};
use crate::ops::{module_member_named, target_declaration};
use crate::pipeline::{Refactoring, RefactoringModel, RefactoringTarget, RewriteContext, TargetIdentity};

/// The new name for one declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameModel {
    pub target: TargetIdentity,
    /// Defaults to the current name.
    pub new_name: String,
}

impl RefactoringModel for RenameModel {
    fn target(&self) -> &TargetIdentity {
        &self.target
    }
}

/// One declaration and the name it gets.
#[derive(Debug, Clone)]
pub struct PlannedRename<'g> {
    pub declaration: &'g Declaration,
    pub new_name: String,
}

/// Every declaration renamed when `target` becomes `new_name`.
pub fn plan<'g>(
    graph: &'g DeclarationGraph,
    target: &'g Declaration,
    new_name: &str,
) -> Result<Vec<PlannedRename<'g>>, RefactoringFailure> {
    // An implementation renames through its interface member.
    let (root, root_name) = match interface_member_of(graph, target) {
        Some(member) => {
            let prefix = implementation_name(&member.module.module, "");
            let suffix = new_name
                .get(..prefix.len())
                .filter(|p| p.eq_ignore_ascii_case(&prefix))
                .map(|_| &new_name[prefix.len()..])
                .ok_or_else(|| {
                    RefactoringFailure::validation(format!(
                        "'{}' implements {}.{}; its new name must start with '{}'",
                        target.name, member.module.module, member.name, prefix
                    ))
                })?;
            (member, suffix.to_string())
        }
        None => (target, new_name.to_string()),
    };

    let group: Vec<&Declaration> = if root.kind.is_property() {
        graph.members(&root.module, |d| d.kind.is_property() && d.name_eq(&root.name))
    } else {
        vec![root]
    };

    let mut renames: Vec<PlannedRename<'g>> = Vec::new();
    let mut push = |declaration: &'g Declaration, new_name: String| {
        if !renames.iter().any(|r| r.declaration.id == declaration.id) {
            renames.push(PlannedRename {
                declaration,
                new_name,
            });
        }
    };
    for member in group.iter().copied() {
        push(member, root_name.clone());
    }
    if root.kind.is_member() && graph.is_interface(&root.module) {
        let implemented = implementation_name(&root.module.module, &root_name);
        for member in group.iter().copied() {
            for implementation in find_all_implementations(graph, member) {
                push(implementation, implemented.clone());
            }
        }
    }
    Ok(renames)
}

/// A declaration other than `planned` that would clash with its new name.
fn collision<'g>(
    graph: &'g DeclarationGraph,
    planned: &PlannedRename<'g>,
    renamed: &[DeclarationId],
) -> Option<&'g Declaration> {
    let declaration = planned.declaration;
    if graph.is_module_level(declaration) {
        return module_member_named(graph, &declaration.module, &planned.new_name, renamed);
    }
    let parent = declaration.parent?;
    graph
        .children_of(parent)
        .into_iter()
        .find(|d| d.name_eq(&planned.new_name) && !renamed.contains(&d.id))
}

/// Failure wording for rename.
pub struct RenameMessages;

impl FailureMessages for RenameMessages {
    fn caption(&self) -> &str {
        "Rename"
    }

    fn message(&self, failure: &RefactoringFailure) -> Option<String> {
        match failure {
            RefactoringFailure::InvalidDeclarationType { name, actual, .. } => Some(format!(
                "'{}' is a {}. Modules are renamed in the host, not here.",
                name, actual
            )),
            other => base_message(other),
        }
    }
}

/// The rename operation.
#[derive(Debug, Clone, Default)]
pub struct Rename;

impl Refactoring for Rename {
    type Model = RenameModel;

    fn name(&self) -> &'static str {
        "rename"
    }

    fn messages(&self) -> &dyn FailureMessages {
        &RenameMessages
    }

    fn build_model(&self, graph: &DeclarationGraph, target: &RefactoringTarget) -> Result<RenameModel, RefactoringFailure> {
        let declaration = target_declaration(graph, target)?;
        if declaration.kind.is_module() {
            return Err(RefactoringFailure::invalid_type(
                &declaration.name,
                declaration.kind,
                "a declaration inside a module",
            ));
        }
        Ok(RenameModel {
            target: TargetIdentity::of(declaration),
            new_name: declaration.name.clone(),
        })
    }

    fn validate(&self, graph: &DeclarationGraph, model: &RenameModel) -> Result<(), RefactoringFailure> {
        validate_vba_identifier(&model.new_name)?;
        if model.new_name == model.target.name {
            return Err(RefactoringFailure::validation(format!(
                "'{}' already has that name",
                model.target.name
            )));
        }
        let target = model
            .target
            .resolve(graph)
            .ok_or_else(|| RefactoringFailure::TargetStale {
                name: model.target.name.clone(),
            })?;
        let renames = plan(graph, target, &model.new_name)?;
        for planned in &renames {
            validate_vba_identifier(&planned.new_name)?;
        }

        if let Some(root) = renames.first() {
            if graph.is_interface(&root.declaration.module) && root.new_name.contains('_') {
                return Err(RefactoringFailure::validation(format!(
                    "interface member names cannot contain an underscore: '{}'",
                    root.new_name
                )));
            }
        }
        let renamed: Vec<DeclarationId> = renames.iter().map(|r| r.declaration.id).collect();
        for planned in &renames {
            if let Some(existing) = collision(graph, planned, &renamed) {
                return Err(RefactoringFailure::validation(format!(
                    "{} already has a {} named '{}'",
                    planned.declaration.module.module, existing.kind, existing.name
                )));
            }
        }
        Ok(())
    }

    fn rewrite(
        &self,
        context: &RewriteContext<'_>,
        model: &RenameModel,
        edits: &mut RecordingSession,
    ) -> Result<(), RefactoringFailure> {
        let graph = context.graph;
        let target = model
            .target
            .resolve(graph)
            .ok_or_else(|| RefactoringFailure::TargetStale {
                name: model.target.name.clone(),
            })?;
        for planned in plan(graph, target, &model.new_name)? {
            let declaration = planned.declaration;
            edits.replace(&declaration.module, declaration.selection, &planned.new_name);
            for reference in graph.references_of(declaration.id) {
                edits.replace(
                    &reference.selection.module,
                    reference.selection.selection,
                    &planned.new_name,
                );
            }
        }
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
    use ducktool_core::resolver::{build_declarations, resolve_references};
    use ducktool_core::scan::scan_module;
    use ducktool_core::types::QualifiedModuleName;
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

    fn member<'g>(g: &'g DeclarationGraph, module: &str, name: &str) -> &'g Declaration {
        g.members(&qmn(module), |d| d.name == name)
            .into_iter()
            .next()
            .unwrap()
    }

    fn planned_names(renames: &[PlannedRename<'_>]) -> Vec<(String, String, String)> {
        renames
            .iter()
            .map(|r| {
                (
                    r.declaration.module.module.clone(),
                    r.declaration.name.clone(),
                    r.new_name.clone(),
                )
            })
            .collect()
    }

    fn interface_fixture() -> DeclarationGraph {
        graph(&[
            (
                "IClass1",
                ModuleKind::Class,
                "Public Sub Foo()\nEnd Sub\n",
            ),
            (
                "Class1",
                ModuleKind::Class,
                "Implements IClass1\nPrivate Sub IClass1_Foo()\nEnd Sub\n",
            ),
            (
                "Class2",
                ModuleKind::Class,
                "Implements IClass1\nPrivate Sub IClass1_Foo()\nEnd Sub\n",
            ),
        ])
    }

    #[test]
    fn interface_member_renames_implementations() {
        let g = interface_fixture();
        let foo = member(&g, "IClass1", "Foo");
        let renames = plan(&g, foo, "Bar").unwrap();
        assert_eq!(
            planned_names(&renames),
            vec![
                ("IClass1".to_string(), "Foo".to_string(), "Bar".to_string()),
                ("Class1".to_string(), "IClass1_Foo".to_string(), "IClass1_Bar".to_string()),
                ("Class2".to_string(), "IClass1_Foo".to_string(), "IClass1_Bar".to_string()),
            ]
        );
    }

    #[test]
    fn implementation_renames_through_interface() {
        let g = interface_fixture();
        let implementation = member(&g, "Class2", "IClass1_Foo");
        let renames = plan(&g, implementation, "IClass1_Bar").unwrap();
        assert_eq!(renames.len(), 3);
        assert_eq!(renames[0].declaration.module, qmn("IClass1"));
        assert_eq!(renames[0].new_name, "Bar");

        assert!(matches!(
            plan(&g, implementation, "Bar"),
            Err(RefactoringFailure::Validation { .. })
        ));
    }

    #[test]
    fn property_accessors_rename_together() {
        let g = graph(&[(
            "Class1",
            ModuleKind::Class,
            "Public Property Get Name() As String\nEnd Property\nPublic Property Let Name(ByVal value As String)\nEnd Property\n",
        )]);
        let get = member(&g, "Class1", "Name");
        let renames = plan(&g, get, "Title").unwrap();
        assert_eq!(renames.len(), 2);
        assert!(renames.iter().all(|r| r.new_name == "Title"));
    }

    #[test]
    fn validation_checks_derived_interface_names() {
        let g = interface_fixture();
        let op = Rename;
        let implementation = member(&g, "Class1", "IClass1_Foo");
        let mut model = op
            .build_model(&g, &RefactoringTarget::Declaration(implementation.id))
            .unwrap();

        for bad in ["IClass1_", "IClass1_End", "IClass1_9lives"] {
            model.new_name = bad.to_string();
            assert!(
                matches!(op.validate(&g, &model), Err(RefactoringFailure::Validation { .. })),
                "{} should be rejected",
                bad
            );
        }
        model.new_name = "IClass1_Run".to_string();
        assert!(op.validate(&g, &model).is_ok());
    }

    #[test]
    fn validation_rejects_collisions_and_modules() {
        let g = graph(&[(
            "Module1",
            ModuleKind::Procedural,
            "Public Sub Foo()\n    Dim a As Long\n    Dim b As Long\nEnd Sub\nPublic Sub Bar()\nEnd Sub\n",
        )]);
        let op = Rename;
        let foo = member(&g, "Module1", "Foo");

        let mut model = op.build_model(&g, &RefactoringTarget::Declaration(foo.id)).unwrap();
        assert_eq!(model.new_name, "Foo");
        assert!(op.validate(&g, &model).is_err());
        model.new_name = "bar".to_string();
        assert!(op.validate(&g, &model).is_err());
        model.new_name = "Baz".to_string();
        assert!(op.validate(&g, &model).is_ok());

        let a = g
            .children_of(foo.id)
            .into_iter()
            .find(|d| d.name == "a")
            .unwrap();
        let mut local = op.build_model(&g, &RefactoringTarget::Declaration(a.id)).unwrap();
        local.new_name = "B".to_string();
        assert!(op.validate(&g, &local).is_err());

        let module = g.module_declaration(&qmn("Module1")).unwrap();
        assert!(matches!(
            op.build_model(&g, &RefactoringTarget::Declaration(module.id)),
            Err(RefactoringFailure::InvalidDeclarationType { .. })
        ));
    }
}
