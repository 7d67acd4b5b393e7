//! Integration tests for `framer init`, `framer origin` and `framer check`
//!
//! These run the built binary against temporary project directories.

use anyhow::Result;
use serial_test::serial;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Helper to get the path to the framer binary
fn get_framer_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_framer"))
}

fn run_framer(project: &Path, args: &[&str]) -> Result<Output> {
    let output = Command::new(get_framer_binary())
        .arg("--project-dir")
        .arg(project)
        .args(args)
        .output()?;
    Ok(output)
}

/// Run a command that is expected to succeed and return its stdout
fn run_ok(project: &Path, args: &[&str]) -> Result<String> {
    let output = run_framer(project, args)?;
    if !output.status.success() {
        anyhow::bail!(
            "framer {} failed:\nstderr: {}\nstdout: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr),
            String::from_utf8_lossy(&output.stdout)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn init_project() -> Result<TempDir> {
    let temp_dir = TempDir::new()?;
    run_ok(temp_dir.path(), &["init"])?;
    Ok(temp_dir)
}

fn read_manifest(project: &Path) -> Result<serde_json::Value> {
    let content = fs::read_to_string(project.join("framerpkg.json"))?;
    Ok(serde_json::from_str(&content)?)
}

fn write_module(project: &Path, name: &str, version: &str, require: &str) -> Result<()> {
    let dir = project.join("framer_modules").join(name);
    fs::create_dir_all(&dir)?;
    fs::write(
        dir.join("module.json"),
        format!(r#"{{"name": "{name}", "version": "{version}", "author": "acme"}}"#),
    )?;
    fs::write(dir.join("require.json"), require)?;
    fs::write(dir.join("main.py"), "print('hello')")?;
    Ok(())
}

fn install(project: &Path, modules: &[&str], disabled: &[&str]) -> Result<()> {
    let mut manifest = read_manifest(project)?;
    manifest["modules"] = serde_json::json!(modules);
    manifest["disable"] = serde_json::json!(disabled);
    fs::write(
        project.join("framerpkg.json"),
        serde_json::to_string_pretty(&manifest)?,
    )?;
    Ok(())
}

#[test]
#[serial]
fn test_init_creates_manifest_and_modules_dir() -> Result<()> {
    let project = init_project()?;

    let manifest = read_manifest(project.path())?;
    assert_eq!(manifest["modules"], serde_json::json!([]));
    assert_eq!(manifest["disable"], serde_json::json!([]));
    assert_eq!(manifest["origins"], serde_json::json!([]));
    assert!(project.path().join("framer_modules").is_dir());
    Ok(())
}

#[test]
#[serial]
fn test_origin_add_list_del() -> Result<()> {
    let project = init_project()?;
    let a = "https://a.example.com/framer";
    let b = "https://b.example.com";

    run_ok(project.path(), &["origin", "--add", a])?;
    run_ok(project.path(), &["origin", "--add", b])?;
    assert_eq!(
        read_manifest(project.path())?["origins"],
        serde_json::json!([a, b])
    );

    let listing = run_ok(project.path(), &["origin", "--list"])?;
    assert!(listing.contains(a));
    assert!(listing.contains(b));

    run_ok(project.path(), &["origin", "--del", a])?;
    assert_eq!(
        read_manifest(project.path())?["origins"],
        serde_json::json!([b])
    );
    Ok(())
}

#[test]
#[serial]
fn test_duplicate_origin_is_rejected() -> Result<()> {
    let project = init_project()?;
    run_ok(project.path(), &["origin", "--add", "https://a.example.com"])?;

    let output = run_framer(project.path(), &["origin", "--add", "https://a.example.com"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("already configured"));
    Ok(())
}

#[test]
#[serial]
fn test_origin_requires_exactly_one_action() -> Result<()> {
    let project = init_project()?;

    let none = run_framer(project.path(), &["origin"])?;
    assert!(!none.status.success());

    let two = run_framer(project.path(), &["origin", "--list", "--sync"])?;
    assert!(!two.status.success());
    Ok(())
}

#[test]
#[serial]
fn test_missing_manifest_points_to_init() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let output = run_framer(temp_dir.path(), &["origin", "--list"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("framer init"));
    Ok(())
}

#[test]
#[serial]
fn test_sync_skips_unreachable_origin() -> Result<()> {
    let project = init_project()?;
    fs::write(project.path().join("framer.yml"), "retries: 0\ntimeout_seconds: 2\n")?;

    // Bind then drop a listener so the port refuses connections
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let url = format!("http://{}", listener.local_addr()?);
    drop(listener);

    run_ok(project.path(), &["origin", "--add", &url])?;
    let stdout = run_ok(project.path(), &["origin", "--sync"])?;

    assert!(stdout.contains("Skipped unreachable origin"));
    assert_eq!(
        read_manifest(project.path())?["module_map"],
        serde_json::json!({})
    );
    Ok(())
}

#[test]
#[serial]
fn test_make_publishes_release_tree() -> Result<()> {
    let project = init_project()?;
    write_module(project.path(), "web", "1.0.0", r#"{"dependencies": []}"#)?;
    install(project.path(), &["web"], &[])?;
    fs::write(
        project.path().join("origin-maker.json"),
        r#"{"name": "acme", "base": "https://acme.example.com"}"#,
    )?;

    let stdout = run_ok(project.path(), &["origin", "--make"])?;
    assert!(stdout.contains("Published web 1.0.0"));

    let release = project.path().join("maker_release");
    assert!(release.join("map.json").is_file());
    assert!(release.join("web/1.0.0/file.zip").is_file());
    assert_eq!(fs::read_to_string(release.join("web/latest.txt"))?, "1.0.0");

    let again = run_ok(project.path(), &["origin", "--make"])?;
    assert!(again.contains("Skipped web 1.0.0"));
    Ok(())
}

#[test]
#[serial]
fn test_make_prompts_for_identity_once() -> Result<()> {
    let project = init_project()?;

    let mut child = Command::new(get_framer_binary())
        .arg("--project-dir")
        .arg(project.path())
        .args(["origin", "--make"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(b"acme\nhttps://acme.example.com\n")?;
    let output = child.wait_with_output()?;
    assert!(output.status.success());

    let identity: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(project.path().join("origin-maker.json"))?)?;
    assert_eq!(identity["name"], "acme");
    assert_eq!(identity["base"], "https://acme.example.com");
    Ok(())
}

#[test]
#[serial]
fn test_check_reports_disabled_dependency() -> Result<()> {
    let project = init_project()?;
    write_module(project.path(), "base", "1.0.0", r#"{"dependencies": []}"#)?;
    write_module(project.path(), "app", "1.0.0", r#"{"dependencies": ["base"]}"#)?;
    install(project.path(), &["base", "app"], &["base"])?;

    let output = run_framer(project.path(), &["check"])?;
    assert!(!output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Module app require base, but base disabled."));
    Ok(())
}

#[test]
#[serial]
fn test_check_fails_without_require_document() -> Result<()> {
    let project = init_project()?;
    write_module(project.path(), "app", "1.0.0", r#"{"dependencies": []}"#)?;
    fs::remove_file(project.path().join("framer_modules/app/require.json"))?;
    install(project.path(), &["app"], &[])?;

    let output = run_framer(project.path(), &["check"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("require.json"));
    Ok(())
}

#[test]
#[serial]
fn test_check_passes_for_consistent_project() -> Result<()> {
    let project = init_project()?;
    write_module(project.path(), "base", "1.2.0", r#"{"dependencies": []}"#)?;
    write_module(
        project.path(),
        "app",
        "1.0.0",
        r#"{"dependencies": {"base": ">=1.0"}}"#,
    )?;
    install(project.path(), &["base", "app"], &[])?;

    let stdout = run_ok(project.path(), &["check"])?;
    assert!(stdout.contains("app"));
    assert!(stdout.contains("ok"));
    Ok(())
}
