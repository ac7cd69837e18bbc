#![allow(clippy::disallowed_methods)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Run the pagoda binary with `args`, isolated from PAGODA_* variables
fn run_pagoda(args: &[&str], cwd: &Path) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_pagoda"));
    command.args(args).current_dir(cwd).env("RUST_LOG", "off");
    for (name, _) in std::env::vars() {
        if name.starts_with("PAGODA_") {
            command.env_remove(name);
        }
    }
    command.output().expect("Failed to execute pagoda")
}

#[test]
fn test_cli_builds_project() {
    let project = TempDir::new().unwrap();
    let root = project.path();
    fs::write(root.join("app.json"), r#"{ "pages": ["index"] }"#).unwrap();
    fs::write(root.join("app.js"), "App({});\n").unwrap();
    fs::write(root.join("index.wxml"), "<view/>\n").unwrap();
    fs::write(root.join("index.js"), "const dead = 1;\nPage({});\n").unwrap();

    let output = run_pagoda(&["--project", ".", "--out-dir", "out", "--minify"], root);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let html = fs::read_to_string(root.join("out/index.html")).unwrap();
    assert!(html.contains("\"index\""));
    let page = pagoda::asset_graph::content_identity("index");
    let script = fs::read_to_string(root.join(format!("out/{page}.js"))).unwrap();
    assert!(script.contains("Page("));
    assert!(!script.contains("dead"));
}

#[test]
fn test_cli_no_tree_shaking_keeps_statements() {
    let project = TempDir::new().unwrap();
    let root = project.path();
    fs::write(root.join("app.json"), r#"{ "pages": ["index"] }"#).unwrap();
    fs::write(root.join("index.wxml"), "<view/>\n").unwrap();
    fs::write(root.join("index.js"), "const kept = 1;\nPage({});\n").unwrap();

    let output = run_pagoda(&["-p", ".", "-o", "out", "--no-tree-shaking"], root);
    assert!(output.status.success());

    let page = pagoda::asset_graph::content_identity("index");
    let script = fs::read_to_string(root.join(format!("out/{page}.js"))).unwrap();
    assert!(script.contains("kept"));
}

#[test]
fn test_cli_reports_missing_project() {
    let project = TempDir::new().unwrap();
    let output = run_pagoda(&["--project", "missing"], project.path());
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("app.json"), "stderr: {stderr}");
}
