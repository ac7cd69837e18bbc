#![allow(clippy::disallowed_methods)]

use std::fs;
use std::path::Path;

use pagoda::asset_graph::content_identity;
use pagoda::{BuildError, Bundler, Config};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A small two-page project sharing one card component.
fn sample_project(root: &Path) {
    write(
        root,
        "app.json",
        r#"{ "pages": ["pages/index/index", "pages/logs/logs"] }"#,
    );
    write(root, "app.js", "const version = '1.0';\nApp({ version });\n");
    write(root, "app.wxss", "page { background: #fff; }\n");

    write(root, "pages/index/index.wxml", "<card title=\"home\"/>\n");
    write(root, "pages/index/index.js", "Page({ data: {} });\n");
    write(root, "pages/index/index.wxss", ".title { font-size: 20px; }\n");
    write(
        root,
        "pages/index/index.json",
        r#"{ "usingComponents": { "card": "../../components/card/card" } }"#,
    );

    write(root, "pages/logs/logs.wxml", "<card/>\n");
    write(
        root,
        "pages/logs/logs.json",
        r#"{ "usingComponents": { "card": "/components/card/card" } }"#,
    );

    write(root, "components/card/card.wxml", "<view class=\"card\">{{title}}</view>\n");
    write(
        root,
        "components/card/card.js",
        "const unused = 42;\nComponent({ properties: { title: String } });\n",
    );
    write(root, "components/card/card.wxss", ".card:hover { color: red; }\n");

    write(root, "runtime/wx.js", "var wx = {};\n");
}

fn config_for(root: &Path, out: &Path) -> Config {
    Config {
        project: root.to_path_buf(),
        out_dir: out.to_path_buf(),
        runtime_dir: Some(root.join("runtime")),
        ..Config::default()
    }
}

#[test]
fn test_bundles_sample_project() {
    let project = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    sample_project(project.path());

    let report = Bundler::new(config_for(project.path(), out.path())).bundle().unwrap();

    let index = content_identity("pages/index/index");
    let logs = content_identity("pages/logs/logs");
    let card = content_identity("components/card/card");
    let app = content_identity("app");

    let index_markup = fs::read_to_string(out.path().join(format!("{index}.jsx"))).unwrap();
    assert_eq!(
        index_markup,
        format!(
            "remotes['{card}'] = () => \"<view class=\\\"card\\\">{{{{title}}}}</view>\\n\"\n\nconst ${index} = () => \"<card title=\\\"home\\\"/>\\n\"\n\n"
        )
    );

    let index_style = fs::read_to_string(out.path().join(format!("{index}.css"))).unwrap();
    assert_eq!(
        index_style,
        format!(".card[data-p-{card}]:hover {{ color: red; }}\n.title[data-p-{index}] {{ font-size: 20px; }}\n")
    );

    let index_script = fs::read_to_string(out.path().join(format!("{index}.js"))).unwrap();
    assert!(index_script.contains("Component("));
    assert!(index_script.contains("Page("));
    assert!(!index_script.contains("unused"));

    // The logs page has no script or style of its own but still carries the card
    let logs_script = fs::read_to_string(out.path().join(format!("{logs}.js"))).unwrap();
    assert!(logs_script.contains("Component("));

    let app_script = fs::read_to_string(out.path().join(format!("{app}.js"))).unwrap();
    assert!(app_script.contains("version"));
    let app_style = fs::read_to_string(out.path().join(format!("{app}.css"))).unwrap();
    assert_eq!(app_style, "page { background: #fff; }\n");

    assert_eq!(report.context.manifest.len(), 2);
    assert_eq!(
        report.context.manifest.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["pages/index/index", "pages/logs/logs"]
    );

    let html = fs::read_to_string(&report.entry).unwrap();
    let runtime = html.find("./runtime/wx.js").unwrap();
    let app_bundle = html.find(&format!("./{app}.js")).unwrap();
    assert!(runtime < app_bundle);
    assert!(html.contains(&format!("href=\"./{app}.css\"")));
    assert!(out.path().join("runtime/wx.js").is_file());

    // Every node ends up with its final output in the arena
    let root = report.graph.root().unwrap();
    assert!(!report.graph.get(root).output.script.is_empty());
}

#[test]
fn test_minified_build_is_smaller() {
    let project = TempDir::new().unwrap();
    sample_project(project.path());

    let pretty_out = TempDir::new().unwrap();
    Bundler::new(config_for(project.path(), pretty_out.path())).bundle().unwrap();

    let minified_out = TempDir::new().unwrap();
    let config = Config {
        minify: true,
        ..config_for(project.path(), minified_out.path())
    };
    Bundler::new(config).bundle().unwrap();

    let index = content_identity("pages/index/index");
    for extension in ["js", "css"] {
        let file = format!("{index}.{extension}");
        let pretty = fs::read_to_string(pretty_out.path().join(&file)).unwrap();
        let minified = fs::read_to_string(minified_out.path().join(&file)).unwrap();
        assert!(minified.len() < pretty.len(), "{file} was not minified");
    }
    // Markup is written as-is either way
    let file = format!("{index}.jsx");
    assert_eq!(
        fs::read_to_string(pretty_out.path().join(&file)).unwrap(),
        fs::read_to_string(minified_out.path().join(&file)).unwrap()
    );
}

#[test]
fn test_page_without_markup_fails() {
    let project = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write(project.path(), "app.json", r#"{ "pages": ["pages/empty"] }"#);
    write(project.path(), "pages/empty.js", "Page({});\n");

    let err = Bundler::new(config_for(project.path(), out.path()))
        .bundle()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::Structural { .. })
    ));
    assert!(!out.path().join("index.html").exists());
}

#[test]
fn test_missing_app_json_is_io_error() {
    let project = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let err = Bundler::new(config_for(project.path(), out.path()))
        .bundle()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::Io { .. })
    ));
}
