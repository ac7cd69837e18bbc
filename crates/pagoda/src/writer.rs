//! Writing bundles to their destination.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Result, anyhow};
use log::{debug, info};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::asset_graph::ModuleKind;
use crate::error::BuildError;

/// One bundle file ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub kind: ModuleKind,
    pub content: String,
}

impl OutputFile {
    /// `{out_dir}/{identity}.{ext}`
    pub fn for_bundle(out_dir: &Path, identity: &str, kind: ModuleKind, content: String) -> Self {
        Self {
            path: out_dir.join(format!("{identity}.{}", kind.extension())),
            kind,
            content,
        }
    }
}

pub trait OutputWriter: Send + Sync {
    fn write(&self, file: &OutputFile) -> Result<()>;
}

/// Minification and pretty-printing of script and style code.
pub trait CodeTransform: Send + Sync {
    fn minify(&self, kind: ModuleKind, code: &str) -> Result<String>;
    fn format(&self, kind: ModuleKind, code: &str) -> Result<String>;
}

/// Scripts go through the oxc code generator; styles get whitespace and
/// comment compaction only.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardTransform;

impl StandardTransform {
    fn regenerate(code: &str, options: CodegenOptions) -> Result<String> {
        let allocator = Allocator::default();
        let source_type = SourceType::default().with_module(true).with_jsx(true);
        let parsed = Parser::new(&allocator, code, source_type).parse();
        if let Some(error) = parsed.errors.first() {
            return Err(anyhow!("{error}"));
        }
        Ok(Codegen::new().with_options(options).build(&parsed.program).code)
    }
}

impl CodeTransform for StandardTransform {
    fn minify(&self, kind: ModuleKind, code: &str) -> Result<String> {
        match kind {
            ModuleKind::Script => Self::regenerate(code, CodegenOptions::minify()),
            ModuleKind::Style => Ok(compact_css(code)),
            ModuleKind::Markup => Ok(code.to_owned()),
        }
    }

    fn format(&self, kind: ModuleKind, code: &str) -> Result<String> {
        match kind {
            ModuleKind::Script => Self::regenerate(code, CodegenOptions::default()),
            ModuleKind::Style => Ok(format!("{}\n", code.trim())),
            ModuleKind::Markup => Ok(code.to_owned()),
        }
    }
}

/// Remove comments and redundant whitespace from a stylesheet.
///
/// Stands in for a full CSS minifier such as csso: no rule merging, shorthand
/// folding or value rewriting.
pub fn compact_css(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut chars = css.chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for c in chars.by_ref() {
                    if previous == '*' && c == '/' {
                        break;
                    }
                    previous = c;
                }
            }
            '"' | '\'' => {
                flush_space(&mut out, &mut pending_space);
                out.push(c);
                let mut escaped = false;
                for inner in chars.by_ref() {
                    out.push(inner);
                    if escaped {
                        escaped = false;
                    } else if inner == '\\' {
                        escaped = true;
                    } else if inner == c {
                        break;
                    }
                }
            }
            c if c.is_whitespace() => pending_space = true,
            '{' | '}' | ';' | ',' => {
                pending_space = false;
                if c == '}' && out.ends_with(';') {
                    out.pop();
                }
                out.push(c);
            }
            _ => {
                if out.ends_with(['{', '}', ';', ',']) {
                    pending_space = false;
                }
                flush_space(&mut out, &mut pending_space);
                out.push(c);
            }
        }
    }
    out
}

fn flush_space(out: &mut String, pending: &mut bool) {
    if *pending && !out.is_empty() {
        out.push(' ');
    }
    *pending = false;
}

/// Writes bundles to the filesystem, creating parent directories.
pub struct FsWriter {
    transform: Box<dyn CodeTransform>,
    minify: bool,
}

impl FsWriter {
    pub fn new(minify: bool) -> Self {
        Self::with_transform(Box::new(StandardTransform), minify)
    }

    pub fn with_transform(transform: Box<dyn CodeTransform>, minify: bool) -> Self {
        Self { transform, minify }
    }

    /// Apply the configured transform to `content`.
    pub fn render<'c>(&self, path: &Path, kind: ModuleKind, content: &'c str) -> Result<Cow<'c, str>> {
        render(self.transform.as_ref(), self.minify, path, kind, content)
    }
}

impl std::fmt::Debug for FsWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsWriter")
            .field("minify", &self.minify)
            .finish_non_exhaustive()
    }
}

impl OutputWriter for FsWriter {
    fn write(&self, file: &OutputFile) -> Result<()> {
        if file.content.is_empty() {
            debug!("Skipping empty {} output {:?}", file.kind, file.path);
            return Ok(());
        }

        let content = self.render(&file.path, file.kind, &file.content)?;

        if let Some(parent) = file.path.parent() {
            fs::create_dir_all(parent).map_err(|err| BuildError::io(parent, err))?;
        }
        fs::write(&file.path, content.as_bytes()).map_err(|err| BuildError::io(&file.path, err))?;

        info!("Bundle written to: {:?}", file.path);
        Ok(())
    }
}

/// Minify or format script and style content; markup passes through.
pub fn render<'c>(
    transform: &dyn CodeTransform,
    minify: bool,
    path: &Path,
    kind: ModuleKind,
    content: &'c str,
) -> Result<Cow<'c, str>> {
    if kind == ModuleKind::Markup {
        return Ok(Cow::Borrowed(content));
    }
    let (tool, result) = if minify {
        ("minifier", transform.minify(kind, content))
    } else {
        ("formatter", transform.format(kind, content))
    };
    result.map(Cow::Owned).map_err(|err| {
        BuildError::ExternalTool {
            tool,
            identity: path
                .file_stem()
                .map_or_else(|| path.display().to_string(), |stem| stem.to_string_lossy().into_owned()),
            kind,
            message: format!("{err:#}"),
        }
        .into()
    })
}

/// Keeps written files in memory, in write order.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    files: Mutex<Vec<OutputFile>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn files(&self) -> Vec<OutputFile> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Content written to `path`, if any.
    pub fn content(&self, path: &Path) -> Option<String> {
        self.files()
            .into_iter()
            .rev()
            .find(|file| file.path == path)
            .map(|file| file.content)
    }
}

impl OutputWriter for MemoryWriter {
    fn write(&self, file: &OutputFile) -> Result<()> {
        if file.content.is_empty() {
            return Ok(());
        }
        let mut files = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        files.push(file.clone());
        Ok(())
    }
}
