//! Project directories: loading module files, resolving them, and writing
//! refactored text back.
//!
//! A project is a directory of exported VBA modules (`.bas`, `.cls`,
//! `.frm`, `.doccls`), walked recursively. The file stem is the module name
//! and the directory name is the project name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use ducktool_core::analysis::ModuleKind;
use ducktool_core::config::DuckConfig;
use ducktool_core::error::DuckError;
use ducktool_core::rewrite::ModuleBuffers;
use ducktool_core::scan::scan_module;
use ducktool_core::state::{ProjectState, ResolutionStage};
use ducktool_core::types::QualifiedModuleName;

/// A module file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFile {
    pub path: PathBuf,
    pub kind: ModuleKind,
}

/// A loaded and resolved project.
pub struct OpenProject {
    root: PathBuf,
    name: String,
    config: DuckConfig,
    files: BTreeMap<QualifiedModuleName, ModuleFile>,
    buffers: ModuleBuffers,
    state: ProjectState,
}

impl OpenProject {
    /// Load every module under `root` and run a resolution pass.
    ///
    /// A module that fails to scan leaves the project in `ParserError`
    /// rather than failing the load, so `status` can still report it.
    pub fn open(root: &Path, config: DuckConfig) -> Result<Self, DuckError> {
        let root = root.canonicalize().map_err(|e| {
            DuckError::invalid_args(format!("cannot open project {}: {}", root.display(), e))
        })?;
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "VBAProject".to_string());

        let files = discover_modules(&root, &name)?;
        let mut texts = Vec::with_capacity(files.len());
        for (module, file) in &files {
            let bytes = fs::read(&file.path).map_err(|e| {
                DuckError::internal(format!("failed to read {}: {}", file.path.display(), e))
            })?;
            texts.push((module.clone(), String::from_utf8_lossy(&bytes).into_owned()));
        }
        info!(project = %name, modules = files.len(), "project loaded");

        let project = OpenProject {
            root,
            state: ProjectState::new(name.clone()),
            name,
            config,
            files,
            buffers: ModuleBuffers::from_modules(texts),
        };
        project.resolve()?;
        Ok(project)
    }

    /// Scan every buffer and run a full pass.
    fn resolve(&self) -> Result<(), DuckError> {
        let mut analyses = Vec::with_capacity(self.files.len());
        for (module, file) in &self.files {
            let text = self.buffers.text(module).unwrap_or_default();
            match scan_module(module.clone(), file.kind, &text) {
                Ok(analysis) => analyses.push(analysis),
                Err(err) => {
                    warn!(%module, %err, "module failed to scan");
                    let token = self.state.begin_full_pass(self.files.keys().cloned());
                    self.state
                        .on_error(token, ResolutionStage::Parse, format!("{}: {}", module, err))?;
                    return Ok(());
                }
            }
        }
        let state = self.state.reparse(analyses)?;
        debug!(?state, "resolution pass finished");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DuckConfig {
        &self.config
    }

    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    pub fn buffers(&self) -> &ModuleBuffers {
        &self.buffers
    }

    /// The file a module was loaded from.
    pub fn file(&self, module: &QualifiedModuleName) -> Option<&ModuleFile> {
        self.files.get(module)
    }

    /// Qualify a module name in this project.
    pub fn module(&self, name: &str) -> QualifiedModuleName {
        QualifiedModuleName::new(self.name.clone(), name)
    }

    /// Write the current text of `modules` to disk. Modules without a file
    /// become class modules in the project root.
    pub fn write_back(&self, modules: &[QualifiedModuleName]) -> Result<Vec<PathBuf>, DuckError> {
        let mut written = Vec::with_capacity(modules.len());
        for module in modules {
            let text = self.buffers.text(module).ok_or_else(|| DuckError::ApplyError {
                message: "module has no text to write".to_string(),
                module: Some(module.module.clone()),
            })?;
            let path = match self.files.get(module) {
                Some(file) => file.path.clone(),
                None => self
                    .root
                    .join(format!("{}.{}", module.module, ModuleKind::Class.file_extension())),
            };
            fs::write(&path, text).map_err(|e| DuckError::ApplyError {
                message: format!("failed to write {}: {}", path.display(), e),
                module: Some(module.module.clone()),
            })?;
            debug!(path = %path.display(), "module written");
            written.push(path);
        }
        Ok(written)
    }
}

/// Module files under `root`, keyed by qualified module name.
fn discover_modules(
    root: &Path,
    project: &str,
) -> Result<BTreeMap<QualifiedModuleName, ModuleFile>, DuckError> {
    let mut files: BTreeMap<QualifiedModuleName, ModuleFile> = BTreeMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| DuckError::internal(format!("failed to walk project: {}", e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(kind) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ModuleKind::from_file_extension)
        else {
            continue;
        };
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let module = QualifiedModuleName::new(project, stem);
        if let Some(existing) = files.get(&module) {
            return Err(DuckError::invalid_args(format!(
                "module {} is defined twice: {} and {}",
                stem,
                existing.path.display(),
                path.display()
            )));
        }
        files.insert(
            module,
            ModuleFile {
                path: path.to_path_buf(),
                kind,
            },
        );
    }
    Ok(files)
}

// ============================================================================
// Tests
// ============================================================================
