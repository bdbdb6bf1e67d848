//! Read-only searches over a declaration graph.
//!
//! Results are ordered for presentation: references by module then position,
//! implementations by module name. An empty result is a valid answer.

use serde::Serialize;

use crate::graph::{Declaration, DeclarationGraph, Reference};
use crate::types::QualifiedModuleName;

/// References located in one module, in (line, column) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceGroup {
    pub module: QualifiedModuleName,
    pub references: Vec<Reference>,
}

/// Every reference of `declaration`, grouped by module in module order.
pub fn find_all_references(graph: &DeclarationGraph, declaration: &Declaration) -> Vec<ReferenceGroup> {
    let mut groups: Vec<ReferenceGroup> = Vec::new();
    // `references_of` sorts by qualified selection: module first, then position.
    for reference in graph.references_of(declaration.id) {
        match groups.last_mut() {
            Some(group) if group.module == reference.selection.module => {
                group.references.push(reference.clone());
            }
            _ => groups.push(ReferenceGroup {
                module: reference.selection.module.clone(),
                references: vec![reference.clone()],
            }),
        }
    }
    groups
}

/// Implementations of an interface member, or implementers of an interface.
///
/// - Interface class module: the module declarations of its implementers.
/// - Interface member: each `<Interface>_<Member>` of the same kind and arity
///   in an implementing module. Property get/let/set match independently.
/// - Implementation member: resolved to its interface member first, so the
///   result is the same set.
pub fn find_all_implementations<'g>(
    graph: &'g DeclarationGraph,
    declaration: &Declaration,
) -> Vec<&'g Declaration> {
    if declaration.kind.is_module() {
        return graph
            .implementers_of(&declaration.module)
            .into_iter()
            .filter_map(|module| graph.module_declaration(module))
            .collect();
    }
    if !declaration.kind.is_member() {
        return Vec::new();
    }

    let interface_member = if graph.is_interface(&declaration.module) {
        graph.declaration(declaration.id)
    } else {
        interface_member_of(graph, declaration)
    };
    let Some(member) = interface_member else {
        return Vec::new();
    };

    let interface = &member.module;
    let arity = graph.parameters_of(member.id).len();
    let expected = implementation_name(&interface.module, &member.name);
    graph
        .implementers_of(interface)
        .into_iter()
        .flat_map(|module| {
            graph.members(module, |d| {
                d.kind == member.kind
                    && d.name_eq(&expected)
                    && graph.parameters_of(d.id).len() == arity
            })
        })
        .collect()
}

/// The interface member `implementation` implements, if any.
///
/// `implementation` must be named `<Interface>_<Member>` and live in a module
/// with an `Implements <Interface>` clause; the member must match in kind and
/// arity.
pub fn interface_member_of<'g>(
    graph: &'g DeclarationGraph,
    implementation: &Declaration,
) -> Option<&'g Declaration> {
    let arity = graph.parameters_of(implementation.id).len();
    graph
        .implemented_interfaces(&implementation.module)
        .iter()
        .find_map(|clause| {
            let interface = &clause.interface.module;
            let prefix_len = interface.len() + 1;
            let name = &implementation.name;
            let prefixed = name.len() > prefix_len
                && name
                    .get(..interface.len())
                    .is_some_and(|p| p.eq_ignore_ascii_case(interface))
                && name.as_bytes()[interface.len()] == b'_';
            if !prefixed {
                return None;
            }
            let member_name = &name[prefix_len..];
            graph
                .members(&clause.interface, |d| {
                    d.kind == implementation.kind
                        && d.name_eq(member_name)
                        && graph.parameters_of(d.id).len() == arity
                })
                .into_iter()
                .next()
        })
}

/// `<Interface>_<Member>`
pub fn implementation_name(interface: &str, member: &str) -> String {
    format!("{}_{}", interface, member)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ModuleKind;
    use crate::graph::DeclarationKind;
    use crate::resolver::{build_declarations, resolve_references};
    use crate::scan::scan_module;
    use std::sync::Arc;

    fn build(modules: &[(&str, ModuleKind, &str)]) -> DeclarationGraph {
        let analyses: Vec<Arc<_>> = modules
            .iter()
            .map(|(name, kind, source)| {
                Arc::new(scan_module(QualifiedModuleName::new("VBAProject", *name), *kind, source).unwrap())
            })
            .collect();
        let declared = build_declarations("VBAProject", &analyses).unwrap();
        resolve_references(declared, &analyses).unwrap().0
    }

    fn named<'g>(graph: &'g DeclarationGraph, module: &str, name: &str, kind: DeclarationKind) -> &'g Declaration {
        graph
            .declarations_named(name)
            .into_iter()
            .find(|d| d.module.module == module && d.kind == kind)
            .unwrap()
    }

    const ICLASS1: &str = "Public Sub Foo()\nEnd Sub\n";
    const CLASS1: &str = "Implements IClass1\n\nPrivate Sub IClass1_Foo()\nEnd Sub\n";

    mod reference_tests {
        use super::*;

        #[test]
        fn groups_by_module_in_position_order() {
            let graph = build(&[
                (
                    "Module1",
                    ModuleKind::Procedural,
                    "Public Counter As Long\nSub Bump()\n    Counter = Counter + 1\nEnd Sub\n",
                ),
                (
                    "Module2",
                    ModuleKind::Procedural,
                    "Sub Reset()\n    Module1.Counter = 0\n    Counter = 0\nEnd Sub\n",
                ),
            ]);
            let counter = named(&graph, "Module1", "Counter", DeclarationKind::Variable);
            let groups = find_all_references(&graph, counter);

            assert_eq!(groups.len(), 2);
            assert_eq!(groups[0].module.module, "Module1");
            assert_eq!(groups[1].module.module, "Module2");
            let total: usize = groups.iter().map(|g| g.references.len()).sum();
            assert_eq!(total, graph.references_of(counter.id).len());
            assert_eq!(total, 4);

            let positions: Vec<(u32, u32)> = groups[0]
                .references
                .iter()
                .map(|r| r.selection.selection.start())
                .collect();
            assert_eq!(positions, vec![(3, 5), (3, 15)]);
            assert!(groups[0].references[0].is_assignment);
        }

        #[test]
        fn no_references_is_empty() {
            let graph = build(&[("Module1", ModuleKind::Procedural, "Private unused As Long\n")]);
            let unused = named(&graph, "Module1", "unused", DeclarationKind::Variable);
            assert!(find_all_references(&graph, unused).is_empty());
        }
    }

    mod implementation_tests {
        use super::*;

        #[test]
        fn interface_member_finds_implementation() {
            let graph = build(&[
                ("IClass1", ModuleKind::Class, ICLASS1),
                ("Class1", ModuleKind::Class, CLASS1),
            ]);
            let foo = named(&graph, "IClass1", "Foo", DeclarationKind::Procedure);
            let found = find_all_implementations(&graph, foo);
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].name, "IClass1_Foo");
            assert_eq!(found[0].module.module, "Class1");
        }

        #[test]
        fn implementation_resolves_to_interface_member() {
            let graph = build(&[
                ("IClass1", ModuleKind::Class, ICLASS1),
                ("Class1", ModuleKind::Class, CLASS1),
                ("Class2", ModuleKind::Class, "Implements IClass1\nPrivate Sub IClass1_Foo()\nEnd Sub\n"),
            ]);
            let foo = named(&graph, "IClass1", "Foo", DeclarationKind::Procedure);
            let from_interface: Vec<_> = find_all_implementations(&graph, foo).iter().map(|d| d.id).collect();

            let implementation = named(&graph, "Class1", "IClass1_Foo", DeclarationKind::Procedure);
            let from_implementation: Vec<_> = find_all_implementations(&graph, implementation)
                .iter()
                .map(|d| d.id)
                .collect();
            assert_eq!(from_interface.len(), 2);
            assert_eq!(from_interface, from_implementation);
        }

        #[test]
        fn property_accessors_match_independently() {
            let interface = "Public Property Get Value() As Long\nEnd Property\n\
                             Public Property Let Value(ByVal v As Long)\nEnd Property\n";
            let class = "Implements IShape\n\
                         Private Property Get IShape_Value() As Long\nEnd Property\n";
            let graph = build(&[
                ("IShape", ModuleKind::Class, interface),
                ("Shape", ModuleKind::Class, class),
            ]);
            let get = named(&graph, "IShape", "Value", DeclarationKind::PropertyGet);
            let let_ = named(&graph, "IShape", "Value", DeclarationKind::PropertyLet);
            assert_eq!(find_all_implementations(&graph, get).len(), 1);
            assert!(find_all_implementations(&graph, let_).is_empty());
        }

        #[test]
        fn arity_mismatch_is_not_an_implementation() {
            let graph = build(&[
                ("IClass1", ModuleKind::Class, "Public Sub Foo(ByVal a As Long)\nEnd Sub\n"),
                ("Class1", ModuleKind::Class, CLASS1),
            ]);
            let foo = named(&graph, "IClass1", "Foo", DeclarationKind::Procedure);
            assert!(find_all_implementations(&graph, foo).is_empty());
        }

        #[test]
        fn interface_module_lists_implementers() {
            let graph = build(&[
                ("IClass1", ModuleKind::Class, ICLASS1),
                ("Class1", ModuleKind::Class, CLASS1),
            ]);
            let module = graph
                .module_named("IClass1")
                .unwrap();
            let found = find_all_implementations(&graph, module);
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].kind, DeclarationKind::ClassModule);
            assert_eq!(found[0].module.module, "Class1");
        }

        #[test]
        fn unrelated_member_has_no_implementations() {
            let graph = build(&[("Module1", ModuleKind::Procedural, "Sub Foo()\nEnd Sub\n")]);
            let foo = named(&graph, "Module1", "Foo", DeclarationKind::Procedure);
            assert!(find_all_implementations(&graph, foo).is_empty());
        }
    }
}
