//! Core infrastructure for ducktool.
//!
//! This crate provides the symbol side of the tool:
//! - Declaration graph for declarations and references
//! - Module analysis handoff types and a line scanner producing them
//! - Resolver building the graph from analyses
//! - Resolution state machine publishing ready snapshots
//! - Reference and implementation search
//! - Annotations bound to declarations
//! - Rewrite sessions with all-or-nothing commits
//! - Error types, error codes and JSON output types
//! - Configuration and identifier validation

pub mod analysis;
pub mod annotation;
pub mod config;
pub mod error;
pub mod graph;
pub mod output;
pub mod resolver;
pub mod rewrite;
pub mod scan;
pub mod search;
pub mod state;
pub mod text;
pub mod types;
pub mod validation;
