//! Commands a host binds to menu items or key presses.
//!
//! Searches report their results and navigate when there is exactly one;
//! refactoring commands wrap a [`RefactoringPipeline`]. Every command is
//! disabled while the project is not ready.

use ducktool_core::graph::{Declaration, DeclarationGraph};
use ducktool_core::search::{find_all_implementations, find_all_references, ReferenceGroup};
use ducktool_core::types::QualifiedSelection;
use tracing::debug;

use crate::interaction::{PresenterFactory, RefactoringHost};
use crate::ops::target_declaration;
use crate::pipeline::{PipelineReport, Refactoring, RefactoringPipeline, RefactoringTarget};

/// What a search found for its target.
#[derive(Debug, Clone)]
pub struct SearchReport<T> {
    pub target: Declaration,
    pub results: T,
    /// Where the cursor was moved, for a single result.
    pub navigated_to: Option<QualifiedSelection>,
}

fn search_target(host: &RefactoringHost<'_>, target: Option<RefactoringTarget>) -> Option<RefactoringTarget> {
    target.or_else(|| {
        host.selection
            .active_selection()
            .map(RefactoringTarget::Selection)
    })
}

fn resolve<'g>(graph: &'g DeclarationGraph, target: &RefactoringTarget) -> Option<&'g Declaration> {
    match target {
        RefactoringTarget::Declaration(id) => graph.declaration(*id),
        RefactoringTarget::Selection(selection) => graph.declaration_at(selection),
    }
}

/// Run a search: nothing while not ready or without a target, a warning on
/// an empty result, navigation on a single one.
fn run_search<T>(
    host: &RefactoringHost<'_>,
    title: &str,
    target: Option<RefactoringTarget>,
    search: impl FnOnce(&DeclarationGraph, &Declaration) -> (T, Vec<QualifiedSelection>),
) -> Option<SearchReport<T>> {
    let snapshot = host.project.snapshot()?;
    let graph = snapshot.graph();
    let target = search_target(host, target)?;
    let declaration = resolve(graph, &target)?;

    let (results, locations) = search(graph, declaration);
    let mut navigated_to = None;
    match locations.as_slice() {
        [] => host.messages.notify_warn(
            title,
            &format!("No results were found for '{}'.", declaration.name),
        ),
        [single] => {
            if host.selection.try_set_selection(single) {
                navigated_to = Some(single.clone());
            }
        }
        many => debug!(count = many.len(), "listing search results"),
    }
    Some(SearchReport {
        target: declaration.clone(),
        results,
        navigated_to,
    })
}

// ============================================================================
// Find all references
// ============================================================================

/// Lists every reference of the selected declaration.
pub struct FindAllReferencesCommand<'a> {
    host: RefactoringHost<'a>,
}

impl<'a> FindAllReferencesCommand<'a> {
    pub fn new(host: RefactoringHost<'a>) -> Self {
        Self { host }
    }

    pub fn can_execute(&self, target: Option<&RefactoringTarget>) -> bool {
        can_search(&self.host, target)
    }

    pub fn execute(&self, target: Option<RefactoringTarget>) -> Option<SearchReport<Vec<ReferenceGroup>>> {
        run_search(&self.host, "Find All References", target, |graph, declaration| {
            let groups = find_all_references(graph, declaration);
            let locations = groups
                .iter()
                .flat_map(|g| g.references.iter().map(|r| r.selection.clone()))
                .collect();
            (groups, locations)
        })
    }
}

// ============================================================================
// Find all implementations
// ============================================================================

/// Lists the implementations of the selected interface or interface member.
pub struct FindAllImplementationsCommand<'a> {
    host: RefactoringHost<'a>,
}

impl<'a> FindAllImplementationsCommand<'a> {
    pub fn new(host: RefactoringHost<'a>) -> Self {
        Self { host }
    }

    pub fn can_execute(&self, target: Option<&RefactoringTarget>) -> bool {
        can_search(&self.host, target)
    }

    pub fn execute(&self, target: Option<RefactoringTarget>) -> Option<SearchReport<Vec<Declaration>>> {
        run_search(&self.host, "Find All Implementations", target, |graph, declaration| {
            let found: Vec<Declaration> = find_all_implementations(graph, declaration)
                .into_iter()
                .cloned()
                .collect();
            let locations = found.iter().map(Declaration::qualified_selection).collect();
            (found, locations)
        })
    }
}

fn can_search(host: &RefactoringHost<'_>, target: Option<&RefactoringTarget>) -> bool {
    let Some(snapshot) = host.project.snapshot() else {
        return false;
    };
    let Some(target) = search_target(host, target.cloned()) else {
        return false;
    };
    resolve(snapshot.graph(), &target).is_some()
}

// ============================================================================
// Refactorings
// ============================================================================

/// A refactoring bound to a host.
pub struct RefactorCommand<'a, R: Refactoring> {
    pipeline: RefactoringPipeline<'a, R>,
}

impl<'a, R: Refactoring> RefactorCommand<'a, R> {
    pub fn new(refactoring: R, host: RefactoringHost<'a>, presenters: &'a dyn PresenterFactory<R::Model>) -> Self {
        Self {
            pipeline: RefactoringPipeline::new(refactoring, host, presenters),
        }
    }

    /// False while not ready, without a target, or when the target is the
    /// wrong kind for the operation.
    pub fn can_execute(&self, target: Option<&RefactoringTarget>) -> bool {
        let Ok(snapshot) = self.pipeline.ready_snapshot() else {
            return false;
        };
        let Some(target) = self.pipeline.resolve_target(target.cloned()) else {
            return false;
        };
        let graph = snapshot.graph();
        target_declaration(graph, &target).is_ok()
            && self.pipeline.refactoring().build_model(graph, &target).is_ok()
    }

    pub fn execute(&self, target: Option<RefactoringTarget>) -> PipelineReport {
        self.pipeline.run(target)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{
        AutoConfirmPresenterFactory, FixedSelection, MessageBox, SelectionService,
    };
    use crate::ops::Rename;
    use ducktool_core::analysis::ModuleKind;
    use ducktool_core::rewrite::ModuleBuffers;
    use ducktool_core::scan::scan_module;
    use ducktool_core::state::ProjectState;
    use ducktool_core::types::{QualifiedModuleName, Selection};
    use std::sync::Mutex;

    fn qmn(name: &str) -> QualifiedModuleName {
        QualifiedModuleName::new("VBAProject", name)
    }

    #[derive(Default)]
    struct RecordingBox {
        shown: Mutex<Vec<(String, String)>>,
    }

    impl RecordingBox {
        fn count(&self) -> usize {
            self.shown.lock().unwrap().len()
        }
    }

    impl MessageBox for RecordingBox {
        fn notify_warn(&self, title: &str, message: &str) {
            self.shown
                .lock()
                .unwrap()
                .push((title.to_string(), message.to_string()));
        }
    }

    const MODULES: &[(&str, ModuleKind, &str)] = &[
        ("IClass1", ModuleKind::Class, "Public Sub Foo()\nEnd Sub\n"),
        (
            "Class1",
            ModuleKind::Class,
            "Implements IClass1\nPrivate Sub IClass1_Foo()\nEnd Sub\n",
        ),
        (
            "Module1",
            ModuleKind::Procedural,
            "Public Sub Main()\n    Helper\nEnd Sub\nPublic Sub Helper()\nEnd Sub\nPublic Sub Unused()\nEnd Sub\n",
        ),
    ];

    fn ready_project() -> ProjectState {
        let project = ProjectState::new("VBAProject");
        project
            .reparse(
                MODULES
                    .iter()
                    .map(|(name, kind, source)| scan_module(qmn(name), *kind, source).unwrap())
                    .collect(),
            )
            .unwrap();
        project
    }

    fn buffers() -> ModuleBuffers {
        ModuleBuffers::from_modules(
            MODULES
                .iter()
                .map(|(name, _, source)| (qmn(name), source.to_string())),
        )
    }

    fn at(module: &str, line: u32, column: u32) -> QualifiedSelection {
        QualifiedSelection::new(qmn(module), Selection::at(line, column))
    }

    mod search_tests {
        use super::*;

        #[test]
        fn single_reference_navigates() {
            let project = ready_project();
            let buffers = buffers();
            let selection = FixedSelection::new(Some(at("Module1", 4, 13)));
            let messages = RecordingBox::default();
            let host = RefactoringHost {
                project: &project,
                selection: &selection,
                rewriter: &buffers,
                messages: &messages,
            };

            let command = FindAllReferencesCommand::new(host);
            assert!(command.can_execute(None));
            let report = command.execute(None).unwrap();
            assert_eq!(report.target.name, "Helper");
            assert_eq!(report.results.len(), 1);
            assert_eq!(report.results[0].module, qmn("Module1"));
            let moved = report.navigated_to.unwrap();
            assert_eq!(moved.selection.start(), (2, 5));
            assert_eq!(selection.active_selection(), Some(moved));
            assert_eq!(messages.count(), 0);
        }

        #[test]
        fn empty_result_warns_once() {
            let project = ready_project();
            let buffers = buffers();
            let selection = FixedSelection::new(Some(at("Module1", 6, 13)));
            let messages = RecordingBox::default();
            let host = RefactoringHost {
                project: &project,
                selection: &selection,
                rewriter: &buffers,
                messages: &messages,
            };

            let report = FindAllReferencesCommand::new(host).execute(None).unwrap();
            assert_eq!(report.target.name, "Unused");
            assert!(report.results.is_empty());
            assert!(report.navigated_to.is_none());
            assert_eq!(messages.count(), 1);
        }

        #[test]
        fn implementations_match_from_either_side() {
            let project = ready_project();
            let buffers = buffers();
            let selection = FixedSelection::new(None);
            let messages = RecordingBox::default();
            let host = RefactoringHost {
                project: &project,
                selection: &selection,
                rewriter: &buffers,
                messages: &messages,
            };
            let command = FindAllImplementationsCommand::new(host);

            let from_interface = command
                .execute(Some(RefactoringTarget::Selection(at("IClass1", 1, 13))))
                .unwrap();
            let from_implementation = command
                .execute(Some(RefactoringTarget::Selection(at("Class1", 2, 15))))
                .unwrap();
            assert_eq!(from_interface.results.len(), 1);
            assert_eq!(from_interface.results, from_implementation.results);
            assert_eq!(from_interface.results[0].name, "IClass1_Foo");
        }

        #[test]
        fn disabled_without_target_or_while_not_ready() {
            let ready = ready_project();
            let pending = ProjectState::new("VBAProject");
            let buffers = buffers();
            let selection = FixedSelection::new(None);
            let messages = RecordingBox::default();

            let host = RefactoringHost {
                project: &ready,
                selection: &selection,
                rewriter: &buffers,
                messages: &messages,
            };
            assert!(!FindAllReferencesCommand::new(host).can_execute(None));
            assert!(FindAllReferencesCommand::new(host).execute(None).is_none());

            let host = RefactoringHost {
                project: &pending,
                ..host
            };
            let target = RefactoringTarget::Selection(at("IClass1", 1, 13));
            assert!(!FindAllImplementationsCommand::new(host).can_execute(Some(&target)));
            assert!(FindAllImplementationsCommand::new(host)
                .execute(Some(target))
                .is_none());
            assert_eq!(messages.count(), 0);
        }
    }

    mod refactor_command_tests {
        use super::*;

        #[test]
        fn rename_is_disabled_on_modules_and_while_not_ready() {
            let project = ready_project();
            let buffers = buffers();
            let selection = FixedSelection::new(None);
            let messages = RecordingBox::default();
            let presenters = AutoConfirmPresenterFactory::new();
            let host = RefactoringHost {
                project: &project,
                selection: &selection,
                rewriter: &buffers,
                messages: &messages,
            };
            let command = RefactorCommand::new(Rename, host, &presenters);

            let member = RefactoringTarget::Selection(at("IClass1", 1, 13));
            assert!(command.can_execute(Some(&member)));
            let module = project
                .snapshot()
                .unwrap()
                .graph()
                .module_declaration(&qmn("Module1"))
                .unwrap()
                .id;
            assert!(!command.can_execute(Some(&RefactoringTarget::Declaration(module))));
            assert!(!command.can_execute(None));

            let pending = ProjectState::new("VBAProject");
            let host = RefactoringHost {
                project: &pending,
                ..host
            };
            let command = RefactorCommand::new(Rename, host, &presenters);
            assert!(!command.can_execute(Some(&member)));
            assert_eq!(presenters.created(), 0);
        }
    }
}
