//! The HTML entry point and the framework runtime files next to it.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use walkdir::WalkDir;

use crate::asset_graph::ModuleKind;
use crate::context::BuildContext;
use crate::error::BuildError;
use crate::writer::{CodeTransform, render};

/// Runtime files land under this directory of the output.
const RUNTIME_SUBDIR: &str = "runtime";
const ENTRY_FILE: &str = "index.html";

pub struct EntryEmitter<'a> {
    out_dir: &'a Path,
    transform: &'a dyn CodeTransform,
    minify: bool,
}

impl<'a> EntryEmitter<'a> {
    pub fn new(out_dir: &'a Path, transform: &'a dyn CodeTransform, minify: bool) -> Self {
        Self {
            out_dir,
            transform,
            minify,
        }
    }

    /// Copy the runtime, then write `index.html` loading the runtime, the
    /// app bundle and the page manifest. Returns the entry file path.
    pub fn emit(&self, runtime_dir: Option<&Path>, context: &BuildContext) -> Result<PathBuf> {
        let mut modules = match runtime_dir {
            Some(dir) => self.copy_runtime(dir)?,
            None => Vec::new(),
        };
        modules.extend(context.runtime_modules.iter().cloned());

        let manifest = context
            .manifest_json()
            .context("Failed to serialize the page manifest")?;
        let html = render_index(&modules, &manifest);

        let path = self.out_dir.join(ENTRY_FILE);
        fs::create_dir_all(self.out_dir).map_err(|err| BuildError::io(self.out_dir, err))?;
        fs::write(&path, html).map_err(|err| BuildError::io(&path, err))?;
        info!("Entry written to: {:?}", path);
        Ok(path)
    }

    /// Copy every file under `runtime_dir`, minifying scripts and styles when
    /// asked to. Returns the copied script and style paths relative to the
    /// output directory, sorted by path.
    fn copy_runtime(&self, runtime_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut loaded = Vec::new();
        let entries = WalkDir::new(runtime_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to read runtime directory {:?}", runtime_dir))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let source = entry.path();
            let relative = Path::new(RUNTIME_SUBDIR).join(source.strip_prefix(runtime_dir).unwrap_or(source));
            let destination = self.out_dir.join(&relative);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|err| BuildError::io(parent, err))?;
            }

            match kind_of(source) {
                Some(kind) if self.minify => {
                    let code = fs::read_to_string(source).map_err(|err| BuildError::io(source, err))?;
                    let minified = render(self.transform, true, source, kind, &code)?;
                    fs::write(&destination, minified.as_bytes())
                        .map_err(|err| BuildError::io(&destination, err))?;
                }
                _ => {
                    fs::copy(source, &destination).map_err(|err| BuildError::io(&destination, err))?;
                }
            }
            debug!("Copied runtime file {:?} to {:?}", source, destination);

            if kind_of(source).is_some() {
                loaded.push(relative);
            }
        }
        Ok(loaded)
    }
}

impl std::fmt::Debug for EntryEmitter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryEmitter")
            .field("out_dir", &self.out_dir)
            .field("minify", &self.minify)
            .finish_non_exhaustive()
    }
}

fn kind_of(path: &Path) -> Option<ModuleKind> {
    match path.extension()?.to_str()? {
        "js" => Some(ModuleKind::Script),
        "css" => Some(ModuleKind::Style),
        _ => None,
    }
}

fn href(path: &Path) -> String {
    let parts: Vec<_> = path
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect();
    format!("./{}", parts.join("/"))
}

/// `index.html` loading `modules` in order, with the manifest inlined.
pub fn render_index(modules: &[PathBuf], manifest_json: &str) -> String {
    let mut styles = String::new();
    let mut scripts = String::new();
    for module in modules {
        match kind_of(module) {
            Some(ModuleKind::Style) => {
                let _ = writeln!(styles, "    <link rel=\"stylesheet\" href=\"{}\" />", href(module));
            }
            _ => {
                let _ = writeln!(scripts, "    <script src=\"{}\"></script>", href(module));
            }
        }
    }
    // `</script>` inside the JSON would end the inline script early
    let manifest = manifest_json.replace("</", "<\\/");

    format!(
        "<!DOCTYPE html>\n<html>\n  <head>\n    <meta charset=\"utf-8\" />\n    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n{styles}  </head>\n  <body>\n    <div id=\"root\"></div>\n    <script>\n      window.manifest = {manifest};\n    </script>\n{scripts}  </body>\n</html>\n"
    )
}
