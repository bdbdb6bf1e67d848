//! CLI end-to-end tests.
//!
//! These tests spawn the actual `duck` binary against a temporary project
//! directory and validate stdout, exit codes and the files on disk.
//!
//! Exit code expectations:
//! - 0: Success
//! - 2: Invalid arguments (bad location)
//! - 3: Resolution error (unknown module, nothing at the location)
//! - 5: Validation failed (invalid name, collision)
//! - 6: Not ready (a module failed to scan)

use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

const CLASS1: &str = "VERSION 1.0 CLASS\r\n\
                      BEGIN\r\n\
                      \x20 MultiUse = -1  'True\r\n\
                      END\r\n\
                      Attribute VB_Name = \"Class1\"\r\n\
                      Option Explicit\r\n\
                      \r\n\
                      Public total As Long\r\n\
                      \r\n\
                      Public Sub Add(ByVal amount As Long)\r\n\
                      \x20   total = total + amount\r\n\
                      End Sub\r\n";

const MODULE1: &str = "Attribute VB_Name = \"Module1\"\r\n\
                       Option Explicit\r\n\
                       \r\n\
                       Public Sub Main()\r\n\
                       \x20   Helper\r\n\
                       End Sub\r\n\
                       \r\n\
                       Public Sub Helper()\r\n\
                       End Sub\r\n";

/// A project directory holding Class1.cls and Module1.bas.
fn project() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("Class1.cls"), CLASS1).unwrap();
    fs::write(dir.path().join("Module1.bas"), MODULE1).unwrap();
    dir
}

/// Run duck in `project` and return (stdout json, exit code).
fn run_duck(project: &Path, args: &[&str]) -> (Value, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_duck"))
        .arg("--project")
        .arg(project)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute duck");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let json: Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout should be valid JSON ({}): {}", e, stdout));
    (json, output.status.code().unwrap_or(-1))
}

fn read(project: &Path, file: &str) -> String {
    fs::read_to_string(project.join(file)).unwrap()
}

// ============================================================================
// Status and searches
// ============================================================================

#[test]
fn status_reports_ready_project() {
    let dir = project();
    let (json, code) = run_duck(dir.path(), &["status"]);
    assert_eq!(code, 0);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["state"], "ready");
    assert_eq!(json["modules"], 2);
}

#[test]
fn references_lists_call_sites() {
    let dir = project();
    let (json, code) = run_duck(dir.path(), &["references", "--at", "Module1:8:13"]);
    assert_eq!(code, 0);
    assert_eq!(json["target"]["name"], "Helper");
    assert_eq!(json["count"], 1);
    assert_eq!(json["groups"][0]["module"], "Module1");
    assert_eq!(json["groups"][0]["references"][0]["location"]["line"], 5);
}

#[test]
fn bad_locations_fail_with_stable_codes() {
    let dir = project();

    let (json, code) = run_duck(dir.path(), &["references", "--at", "Module1"]);
    assert_eq!(code, 2);
    assert_eq!(json["status"], "error");

    let (_, code) = run_duck(dir.path(), &["references", "--at", "Nowhere:1:1"]);
    assert_eq!(code, 3);
}

#[test]
fn broken_module_makes_project_not_ready() {
    let dir = project();
    fs::write(dir.path().join("Broken.bas"), "Public Sub Start()\r\n").unwrap();

    let (json, code) = run_duck(dir.path(), &["status"]);
    assert_eq!(code, 0);
    assert_eq!(json["state"], "parser_error");

    let (json, code) = run_duck(dir.path(), &["references", "--at", "Module1:8:13"]);
    assert_eq!(code, 6);
    assert_eq!(json["status"], "error");
}

// ============================================================================
// Refactorings
// ============================================================================

#[test]
fn rename_without_apply_leaves_files_alone() {
    let dir = project();
    let (json, code) = run_duck(dir.path(), &["rename", "--at", "Module1:8:13", "--to", "Assist"]);
    assert_eq!(code, 0);
    assert_eq!(json["operation"], "rename");
    assert_eq!(json["applied"], false);
    let text = json["modules"][0]["text"].as_str().unwrap();
    assert!(text.contains("    Assist\r\n"));
    assert!(text.contains("Public Sub Assist()\r\n"));
    assert_eq!(read(dir.path(), "Module1.bas"), MODULE1);
}

#[test]
fn rename_with_apply_writes_module() {
    let dir = project();
    let (_, code) = run_duck(
        dir.path(),
        &["rename", "--at", "Module1:5:6", "--to", "Assist", "--apply"],
    );
    assert_eq!(code, 0);
    let text = read(dir.path(), "Module1.bas");
    assert!(text.contains("    Assist\r\n"));
    assert!(text.contains("Public Sub Assist()\r\n"));
    assert!(!text.contains("Helper"));
}

#[test]
fn rename_rejects_invalid_names() {
    let dir = project();
    let (json, code) = run_duck(dir.path(), &["rename", "--at", "Module1:8:13", "--to", "1st"]);
    assert_eq!(code, 5);
    assert_eq!(json["status"], "error");
    assert_eq!(read(dir.path(), "Module1.bas"), MODULE1);
}

#[test]
fn encapsulate_public_field() {
    let dir = project();
    let (json, code) = run_duck(dir.path(), &["encapsulate-field", "--at", "Class1:8:9"]);
    assert_eq!(code, 0);
    let text = json["modules"][0]["text"].as_str().unwrap();
    assert!(text.contains("Private total As Long\r\n"));
    assert!(text.contains("Public Property Get TotalValue() As Long\r\n"));
    assert!(text.contains("Public Property Let TotalValue(ByVal value As Long)\r\n"));
    assert!(!text.contains("Property Set"));
}

#[test]
fn extract_interface_creates_class_file() {
    let dir = project();
    let (json, code) = run_duck(
        dir.path(),
        &["extract-interface", "--at", "Class1:10:13", "--all", "--apply"],
    );
    assert_eq!(code, 0);
    assert_eq!(json["applied"], true);

    let interface = read(dir.path(), "IClass1.cls");
    assert!(interface.starts_with("'@Interface\n"));
    assert!(interface.contains("Public Sub Add(ByVal amount As Long)\nEnd Sub\n"));

    let class = read(dir.path(), "Class1.cls");
    assert!(class.contains("Option Explicit\r\nImplements IClass1\r\n"));
    assert!(class.contains("Private Sub IClass1_Add(ByVal amount As Long)\r\n"));
}

#[test]
fn extract_interface_needs_members() {
    let dir = project();
    let (_, code) = run_duck(dir.path(), &["extract-interface", "--at", "Class1:10:13"]);
    assert_eq!(code, 2);

    let (json, code) = run_duck(
        dir.path(),
        &["extract-interface", "--at", "Class1:10:13", "--members", "Add,Remove"],
    );
    assert_eq!(code, 2);
    assert_eq!(json["error"]["details"]["members"][0], "Remove");
}
