//! Binary entry point for the duck CLI.
//!
//! Loads a VBA project directory, resolves it, and runs one search or
//! refactoring. All output is JSON on stdout; logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! # Resolution state of the project in the current directory
//! duck status
//!
//! # Every reference of the declaration at a cursor
//! duck --project ./MyProject references --at Module1:12:9
//!
//! # Rename, printing the modified modules
//! duck rename --at Class1:4:13 --to Total
//!
//! # Extract an interface and write the result back to the module files
//! duck extract-interface --at Account:1:1 --members Deposit,Withdraw --apply
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use ducktool::cli::{
    run_encapsulate_field, run_extract_interface, run_implement_interface, run_implementations,
    run_references, run_rename, run_status,
};
use ducktool::project::OpenProject;
use ducktool_core::config::DuckConfig;
use ducktool_core::error::{DuckError, OutputErrorCode};
use ducktool_core::output::{emit_response, ErrorResponse};

// ============================================================================
// CLI Structure
// ============================================================================

/// Symbol resolution and refactoring for VBA projects.
///
/// Duck resolves the declarations and references of a directory of exported
/// VBA modules and runs refactorings against them. All output is JSON.
#[derive(Parser, Debug)]
#[command(name = "duck", version, about = "Symbol resolution and refactoring for VBA projects")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Project directory of .bas/.cls modules (default: current directory).
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Configuration file (default: duck.toml in the project directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level for tracing output (default: from the configuration).
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable lines (default).
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Show the resolution state of the project.
    Status,
    /// Find every reference of the declaration at a location.
    References {
        /// Location of the declaration or a reference to it (Module:line:col).
        #[arg(long)]
        at: String,
    },
    /// Find the implementations of an interface or interface member.
    Implementations {
        /// Location of the interface, member or implementation (Module:line:col).
        #[arg(long)]
        at: String,
    },
    /// Replace a field with properties.
    EncapsulateField {
        /// Location of the field (Module:line:col).
        #[arg(long)]
        at: String,
        /// Property name (default: derived from the field name).
        #[arg(long)]
        property: Option<String>,
        /// Parameter name of the Let/Set accessors.
        #[arg(long)]
        parameter: Option<String>,
        /// Write the modified modules back to disk.
        #[arg(long)]
        apply: bool,
    },
    /// Create an interface from a class's public members.
    ExtractInterface {
        /// Location inside the class module (Module:line:col).
        #[arg(long)]
        at: String,
        /// Interface name (default: the class name with the configured prefix).
        #[arg(long)]
        name: Option<String>,
        /// Members to extract, comma separated.
        #[arg(long, value_delimiter = ',', conflicts_with = "all")]
        members: Vec<String>,
        /// Extract every public member.
        #[arg(long)]
        all: bool,
        /// Write the modified modules back to disk.
        #[arg(long)]
        apply: bool,
    },
    /// Add stubs for the members of an implemented interface.
    ImplementInterface {
        /// Location of the Implements statement (Module:line:col).
        #[arg(long)]
        at: String,
        /// Write the modified modules back to disk.
        #[arg(long)]
        apply: bool,
    },
    /// Rename a declaration and all of its references.
    Rename {
        /// Location of the declaration or a reference to it (Module:line:col).
        #[arg(long)]
        at: String,
        /// New name.
        #[arg(long)]
        to: String,
        /// Write the modified modules back to disk.
        #[arg(long)]
        apply: bool,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = project_dir(&cli.global).and_then(|dir| load_config(&cli.global, &dir).map(|c| (dir, c)));

    // Initialize tracing: --log-level wins over the configured level
    let level = match (cli.global.log_level, &loaded) {
        (Some(level), _) => level.to_tracing_level().to_string(),
        (None, Ok((_, config))) => config.logging.level.clone(),
        (None, Err(_)) => tracing::Level::WARN.to_string(),
    };
    init_tracing(&level, cli.global.log_format);

    let result = loaded.and_then(|(dir, config)| execute(cli.command, dir, config));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);

            // Errors go to stdout as JSON, like every other response
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, format: LogFormat) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// The project directory: `--project`, or the current directory.
fn project_dir(global: &GlobalArgs) -> Result<PathBuf, DuckError> {
    match &global.project {
        Some(dir) => Ok(dir.clone()),
        None => std::env::current_dir()
            .map_err(|e| DuckError::internal(format!("failed to get current directory: {}", e))),
    }
}

/// Load `--config`, or `duck.toml` from the project directory.
fn load_config(global: &GlobalArgs, dir: &std::path::Path) -> Result<DuckConfig, DuckError> {
    let config = match &global.config {
        Some(path) => DuckConfig::load(path)?,
        None => DuckConfig::load_from_project(dir)?,
    };
    Ok(config)
}

/// Execute the CLI command.
fn execute(command: Command, dir: PathBuf, config: DuckConfig) -> Result<(), DuckError> {
    let project = OpenProject::open(&dir, config)?;
    match command {
        Command::Status => emit(&run_status(&project)),
        Command::References { at } => emit(&run_references(&project, &at)?),
        Command::Implementations { at } => emit(&run_implementations(&project, &at)?),
        Command::EncapsulateField {
            at,
            property,
            parameter,
            apply,
        } => emit(&run_encapsulate_field(&project, &at, property, parameter, apply)?),
        Command::ExtractInterface {
            at,
            name,
            members,
            all,
            apply,
        } => emit(&run_extract_interface(&project, &at, name, members, all, apply)?),
        Command::ImplementInterface { at, apply } => {
            emit(&run_implement_interface(&project, &at, apply)?)
        }
        Command::Rename { at, to, apply } => emit(&run_rename(&project, &at, &to, apply)?),
    }
}

/// Write a response to stdout.
fn emit<T: Serialize>(response: &T) -> Result<(), DuckError> {
    emit_response(response, &mut io::stdout()).map_err(|e| DuckError::internal(e.to_string()))?;
    let _ = io::stdout().flush();
    Ok(())
}
