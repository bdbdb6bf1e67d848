//! CLI front door.
//!
//! Provides the command implementations behind the `duck` binary:
//! - `status` - Resolution state and graph counts
//! - `references` / `implementations` - Searches at a `Module:line:col`
//! - `encapsulate-field`, `extract-interface`, `implement-interface`,
//!   `rename` - Refactorings run non-interactively
//!
//! ## Project Handling
//!
//! All functions take an [`OpenProject`]. The caller (typically `main.rs`)
//! loads it and runs the resolution pass before invoking these functions.
//! Refactorings commit into the project's in-memory buffers; with `apply`
//! the modified modules are also written back to disk.
//!
//! ## Error Handling
//!
//! All functions return `Result<T, DuckError>`. Refactoring failures are
//! converted through `From<RefactoringFailure>`, so each failure kind keeps a
//! stable exit code.

use ducktool_core::error::DuckError;
use ducktool_core::graph::Declaration;
use ducktool_core::output::{
    ImplementationsResponse, ModuleText, RefactorResponse, ReferencesResponse, StatusResponse,
};
use ducktool_core::types::Location;
use ducktool_refactor::commands::{FindAllImplementationsCommand, FindAllReferencesCommand};
use ducktool_refactor::interaction::{
    AutoConfirmPresenterFactory, FixedSelection, LogMessageBox, RefactoringHost,
};
use ducktool_refactor::ops::{
    EncapsulateField, EncapsulateFieldModel, ExtractInterface, ExtractInterfaceModel,
    ImplementInterface, Rename, RenameModel,
};
use ducktool_refactor::{Refactoring, RefactoringPipeline, RefactoringTarget};
use tracing::info;

use crate::project::OpenProject;

// ============================================================================
// Helpers
// ============================================================================

/// Parse a `Module:line:col` location.
pub fn parse_location(at: &str) -> Result<Location, DuckError> {
    Location::parse(at).ok_or_else(|| {
        DuckError::invalid_args(format!(
            "invalid location format '{}', expected Module:line:col",
            at
        ))
    })
}

fn not_ready(project: &OpenProject) -> DuckError {
    DuckError::NotReady {
        state: project.state().status(),
    }
}

/// Resolve `at` to a cursor target, checking the module exists.
fn cursor_target(project: &OpenProject, at: &str) -> Result<(Location, RefactoringTarget), DuckError> {
    let location = parse_location(at)?;
    let snapshot = project.state().snapshot().ok_or_else(|| not_ready(project))?;
    if snapshot
        .graph()
        .module_declaration(&project.module(&location.module))
        .is_none()
    {
        return Err(DuckError::ModuleNotFound {
            module: location.module,
        });
    }
    let target = RefactoringTarget::Selection(location.to_selection(project.name()));
    Ok((location, target))
}

fn host<'a>(project: &'a OpenProject, selection: &'a FixedSelection) -> RefactoringHost<'a> {
    RefactoringHost {
        project: project.state(),
        selection,
        rewriter: project.buffers(),
        messages: &LogMessageBox,
    }
}

// ============================================================================
// Status and Searches
// ============================================================================

/// Report the resolution state.
pub fn run_status(project: &OpenProject) -> StatusResponse {
    let snapshot = project.state().snapshot();
    StatusResponse::new(project.name(), project.state().status(), snapshot.as_deref())
}

/// Find every reference of the declaration at `at`.
pub fn run_references(project: &OpenProject, at: &str) -> Result<ReferencesResponse, DuckError> {
    let (location, target) = cursor_target(project, at)?;
    let selection = FixedSelection::new(None);
    let report = FindAllReferencesCommand::new(host(project, &selection))
        .execute(Some(target))
        .ok_or_else(|| DuckError::target_not_found(&location))?;
    Ok(ReferencesResponse::new(&report.target, &report.results))
}

/// Find the implementations of the interface or interface member at `at`.
pub fn run_implementations(project: &OpenProject, at: &str) -> Result<ImplementationsResponse, DuckError> {
    let (location, target) = cursor_target(project, at)?;
    let selection = FixedSelection::new(None);
    let report = FindAllImplementationsCommand::new(host(project, &selection))
        .execute(Some(target))
        .ok_or_else(|| DuckError::target_not_found(&location))?;
    let implementations: Vec<&Declaration> = report.results.iter().collect();
    Ok(ImplementationsResponse::new(&report.target, &implementations))
}

// ============================================================================
// Refactorings
// ============================================================================

/// Run `refactoring` at `at`, letting `adjust` stand in for the dialog.
///
/// Returns the full text of every modified module. With `apply` the
/// modules are also written to disk.
pub fn run_refactoring<R, F>(
    project: &OpenProject,
    refactoring: R,
    at: &str,
    adjust: F,
    apply: bool,
) -> Result<RefactorResponse, DuckError>
where
    R: Refactoring,
    F: Fn(&mut R::Model) + Send + Sync + 'static,
{
    let (_, target) = cursor_target(project, at)?;
    let operation = refactoring.name();
    let selection = FixedSelection::new(None);
    let presenters = AutoConfirmPresenterFactory::with_adjustment(adjust);
    let pipeline = RefactoringPipeline::new(refactoring, host(project, &selection), &presenters);

    let report = pipeline.run(Some(target));
    if let Some(failure) = report.failure {
        return Err(DuckError::from(failure));
    }

    let modules: Vec<ModuleText> = report
        .modified
        .iter()
        .map(|module| ModuleText {
            module: module.module.clone(),
            text: project.buffers().text(module).unwrap_or_default(),
        })
        .collect();
    if apply {
        let written = project.write_back(&report.modified)?;
        info!(operation, files = written.len(), "changes applied");
    }
    Ok(RefactorResponse::new(operation, modules, apply))
}

/// Encapsulate the field at `at` behind properties.
pub fn run_encapsulate_field(
    project: &OpenProject,
    at: &str,
    property: Option<String>,
    parameter: Option<String>,
    apply: bool,
) -> Result<RefactorResponse, DuckError> {
    let refactoring = EncapsulateField::new(project.config().refactoring.clone());
    run_refactoring(
        project,
        refactoring,
        at,
        move |model: &mut EncapsulateFieldModel| {
            if let Some(property) = &property {
                model.property_name = property.clone();
            }
            if let Some(parameter) = &parameter {
                model.parameter_name = parameter.clone();
            }
        },
        apply,
    )
}

/// Extract an interface from the class at `at`.
///
/// Members are chosen by name (`members`, case-insensitive; every accessor of
/// a property) or all at once (`all`).
pub fn run_extract_interface(
    project: &OpenProject,
    at: &str,
    name: Option<String>,
    members: Vec<String>,
    all: bool,
    apply: bool,
) -> Result<RefactorResponse, DuckError> {
    if !all && members.is_empty() {
        return Err(DuckError::invalid_args(
            "choose the interface members with --members or --all",
        ));
    }
    let refactoring = ExtractInterface::new(project.config().refactoring.clone());

    if !members.is_empty() {
        let (_, target) = cursor_target(project, at)?;
        let snapshot = project.state().snapshot().ok_or_else(|| not_ready(project))?;
        let model = refactoring.build_model(snapshot.graph(), &target)?;
        let unknown: Vec<&String> = members
            .iter()
            .filter(|wanted| {
                !model
                    .members
                    .iter()
                    .any(|m| m.signature.name.eq_ignore_ascii_case(wanted))
            })
            .collect();
        if !unknown.is_empty() {
            return Err(DuckError::invalid_args_with_details(
                "unknown interface members",
                serde_json::json!({ "members": unknown }),
            ));
        }
    }

    run_refactoring(
        project,
        refactoring,
        at,
        move |model: &mut ExtractInterfaceModel| {
            if all {
                model.select_all();
            } else {
                for member in &members {
                    model.select(member);
                }
            }
            if let Some(name) = &name {
                model.interface_name = name.clone();
            }
        },
        apply,
    )
}

/// Add stubs for the members missing from the `Implements` statement at `at`.
pub fn run_implement_interface(project: &OpenProject, at: &str, apply: bool) -> Result<RefactorResponse, DuckError> {
    let refactoring = ImplementInterface::new(project.config().refactoring.clone());
    run_refactoring(project, refactoring, at, |_| {}, apply)
}

/// Rename the declaration at `at` to `to`.
pub fn run_rename(project: &OpenProject, at: &str, to: &str, apply: bool) -> Result<RefactorResponse, DuckError> {
    let new_name = to.to_string();
    run_refactoring(
        project,
        Rename,
        at,
        move |model: &mut RenameModel| model.new_name = new_name.clone(),
        apply,
    )
}
