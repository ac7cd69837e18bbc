use criterion::{Criterion, criterion_group, criterion_main};
use pagoda::annotator::{DependencyAnnotator, OxcAnnotator};
use pagoda::assembler::assemble;
use pagoda::config::Config;
use pagoda::context::BuildContext;
use pagoda::js_globals::KnownGlobals;
use pagoda::loader::ProjectLoader;
use pagoda::orchestrator::PackagingOrchestrator;
use pagoda::packagers::Packagers;
use pagoda::tree_shaking::{SelectOptions, SelectionMode, select};
use pagoda::writer::MemoryWriter;
use std::fs;
use std::hint::black_box;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const COMPONENT_SCRIPT: &str = r#"import { request } from '../../utils/http';
import { format } from '../../utils/date';

const unusedCache = new Map();

function helper(value) {
  return format(value);
}

function load(id) {
  return request('/items/' + id).then(helper);
}

export const defaults = { id: 0 };

Component({
  properties: { id: Number },
  methods: { load },
});
"#;

/// Create a project with a few pages sharing a handful of components
fn create_test_project(dir: &Path) -> std::io::Result<()> {
    let pages: Vec<String> = (0..8).map(|i| format!("pages/p{i}/index")).collect();
    fs::write(
        dir.join("app.json"),
        serde_json::json!({ "pages": pages }).to_string(),
    )?;
    fs::write(dir.join("app.js"), "App({ onLaunch() {} });\n")?;
    fs::write(dir.join("app.wxss"), "page { font-size: 14px; }\n")?;

    for i in 0..4 {
        let base = dir.join(format!("components/c{i}"));
        fs::create_dir_all(&base)?;
        fs::write(base.join("index.js"), COMPONENT_SCRIPT)?;
        fs::write(base.join("index.wxml"), format!("<view class=\"c{i}\">{{{{id}}}}</view>"))?;
        fs::write(
            base.join("index.wxss"),
            format!(".c{i} {{ color: red; }}\n.c{i}:hover :deep(.inner) {{ color: blue; }}\n"),
        )?;
    }

    for (i, page) in pages.iter().enumerate() {
        let base = dir.join(page);
        fs::create_dir_all(base.parent().unwrap_or(dir))?;
        let components: serde_json::Map<_, _> = (0..4)
            .filter(|c| (i + c) % 2 == 0)
            .map(|c| (format!("c{c}"), serde_json::json!(format!("/components/c{c}/index"))))
            .collect();
        fs::write(
            base.with_extension("json"),
            serde_json::json!({ "usingComponents": components }).to_string(),
        )?;
        fs::write(base.with_extension("wxml"), "<view><c0/><c2/></view>")?;
        fs::write(base.with_extension("js"), "Page({ data: { ready: false } });\n")?;
        fs::write(base.with_extension("wxss"), ".page { padding: 8px; }\n")?;
    }

    Ok(())
}

/// Benchmark statement selection and assembly of one module
fn benchmark_tree_shaking(c: &mut Criterion) {
    let module = OxcAnnotator
        .annotate(Path::new("components/c0/index.js"), Arc::from(COMPONENT_SCRIPT))
        .expect("Benchmark script should parse");
    let globals = KnownGlobals::default();

    c.bench_function("select_and_assemble", |b| {
        b.iter(|| {
            let options = SelectOptions {
                mode: SelectionMode::Reachability,
                globals: &globals,
            };
            let selection = select(black_box(&module), &options).expect("Selection should succeed");
            black_box(assemble(&module, &selection.statements))
        });
    });
}

/// Benchmark packaging a loaded project into memory
fn benchmark_packaging(c: &mut Criterion) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    create_test_project(temp_dir.path()).expect("Failed to create test project");
    let config = Config::default();
    let packagers = Packagers::from_config(&config);

    c.bench_function("package_project", |b| {
        b.iter_with_setup(
            || {
                ProjectLoader::new(temp_dir.path(), &config.extensions, &OxcAnnotator)
                    .load()
                    .expect("Loading should succeed")
            },
            |mut graph| {
                let writer = MemoryWriter::new();
                let mut context = BuildContext::new();
                PackagingOrchestrator::new(&packagers, &writer, "dist")
                    .package(black_box(&mut graph), &mut context)
                    .expect("Packaging should succeed");
                black_box(writer.files().len())
            },
        );
    });
}

criterion_group!(benches, benchmark_tree_shaking, benchmark_packaging);
criterion_main!(benches);
