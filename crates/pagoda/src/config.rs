use anyhow::{Context, Result, bail};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::combine::Combine;
use crate::dirs::{project_config_file, system_config_file, user_config_file};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Project root containing `app.json`
    pub project: PathBuf,

    /// Directory bundles are written to
    pub out_dir: PathBuf,

    /// Minify script and style output instead of pretty-printing it
    pub minify: bool,

    /// Drop unreachable top-level statements. When disabled every statement
    /// except imports is kept.
    pub tree_shaking: bool,

    /// Global names scripts may reference in addition to the builtin ones
    pub known_globals: IndexSet<String>,

    /// Directory with framework runtime files copied next to the bundles
    pub runtime_dir: Option<PathBuf>,

    /// Source file extensions of co-located modules
    pub extensions: Extensions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: PathBuf::from("."),
            out_dir: PathBuf::from("dist"),
            minify: false,
            tree_shaking: true,
            known_globals: IndexSet::new(),
            runtime_dir: None,
            extensions: Extensions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Extensions {
    pub script: String,
    pub markup: String,
    pub style: String,
}

impl Default for Extensions {
    fn default() -> Self {
        Self {
            script: "js".to_owned(),
            markup: "wxml".to_owned(),
            style: "wxss".to_owned(),
        }
    }
}

impl Extensions {
    /// Strip leading dots and reject unusable extensions.
    pub fn normalized(self) -> Result<Self> {
        let normalize = |ext: String, kind: &str| -> Result<String> {
            let trimmed = ext.trim_start_matches('.');
            if trimmed.is_empty() || trimmed.contains(['/', '\\']) {
                bail!("Invalid {kind} extension '{ext}'");
            }
            if trimmed == "json" {
                bail!("The {kind} extension cannot be 'json', which holds page and component settings");
            }
            Ok(trimmed.to_owned())
        };
        let extensions = Self {
            script: normalize(self.script, "script")?,
            markup: normalize(self.markup, "markup")?,
            style: normalize(self.style, "style")?,
        };
        let distinct: IndexSet<&str> = [&extensions.script, &extensions.markup, &extensions.style]
            .into_iter()
            .map(String::as_str)
            .collect();
        if distinct.len() != 3 {
            bail!(
                "Script, markup and style extensions must differ (got {}, {}, {})",
                extensions.script,
                extensions.markup,
                extensions.style
            );
        }
        Ok(extensions)
    }
}

/// Contents of one `pagoda.toml`. Keys a file leaves out keep the value of
/// the lower precedence layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigFile {
    pub project: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub minify: Option<bool>,
    pub tree_shaking: Option<bool>,
    pub known_globals: Option<IndexSet<String>>,
    pub runtime_dir: Option<PathBuf>,
    pub extensions: ExtensionsFile,
}

/// The `[extensions]` table of a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtensionsFile {
    pub script: Option<String>,
    pub markup: Option<String>,
    pub style: Option<String>,
}

impl ConfigFile {
    /// Layer the values set in this file over `config`
    pub fn apply_to(self, config: Config) -> Config {
        Config {
            project: self.project.combine(Some(config.project)).unwrap_or_default(),
            out_dir: self.out_dir.combine(Some(config.out_dir)).unwrap_or_default(),
            minify: self.minify.combine(Some(config.minify)).unwrap_or_default(),
            tree_shaking: self
                .tree_shaking
                .combine(Some(config.tree_shaking))
                .unwrap_or(true),
            known_globals: self
                .known_globals
                .combine(Some(config.known_globals))
                .unwrap_or_default(),
            runtime_dir: self.runtime_dir.combine(config.runtime_dir),
            extensions: Extensions {
                script: self
                    .extensions
                    .script
                    .combine(Some(config.extensions.script))
                    .unwrap_or_default(),
                markup: self
                    .extensions
                    .markup
                    .combine(Some(config.extensions.markup))
                    .unwrap_or_default(),
                style: self
                    .extensions
                    .style
                    .combine(Some(config.extensions.style))
                    .unwrap_or_default(),
            },
        }
    }
}

/// Configuration values from environment variables with PAGODA_ prefix
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub project: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub minify: Option<bool>,
    pub tree_shaking: Option<bool>,
    pub known_globals: Option<IndexSet<String>>,
    pub runtime_dir: Option<PathBuf>,
}

impl EnvConfig {
    /// Load configuration from environment variables with PAGODA_ prefix
    pub fn from_env() -> Self {
        let path = |name: &str| {
            env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
        };

        Self {
            project: path("PAGODA_PROJECT"),
            out_dir: path("PAGODA_OUT_DIR"),
            runtime_dir: path("PAGODA_RUNTIME_DIR"),
            minify: env::var("PAGODA_MINIFY").ok().and_then(|value| parse_bool(&value)),
            tree_shaking: env::var("PAGODA_TREE_SHAKING")
                .ok()
                .and_then(|value| parse_bool(&value)),
            // PAGODA_KNOWN_GLOBALS - comma-separated list of global names
            known_globals: env::var("PAGODA_KNOWN_GLOBALS").ok().and_then(|value| {
                let names: IndexSet<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_owned)
                    .collect();
                (!names.is_empty()).then_some(names)
            }),
        }
    }

    /// Apply environment config to base config
    pub fn apply_to(self, config: Config) -> Config {
        Config {
            project: self.project.combine(Some(config.project)).unwrap_or_default(),
            out_dir: self.out_dir.combine(Some(config.out_dir)).unwrap_or_default(),
            minify: self.minify.combine(Some(config.minify)).unwrap_or_default(),
            tree_shaking: self
                .tree_shaking
                .combine(Some(config.tree_shaking))
                .unwrap_or(true),
            known_globals: self
                .known_globals
                .combine(Some(config.known_globals))
                .unwrap_or_default(),
            runtime_dir: self.runtime_dir.combine(config.runtime_dir),
            extensions: config.extensions,
        }
    }
}

/// Parse a boolean value from string, supporting various common formats
fn parse_bool(value: &str) -> Option<bool> {
    use cow_utils::CowUtils;
    match value.trim().cow_to_lowercase().as_ref() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load a single config file from a path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<ConfigFile> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Check the values that cannot be expressed in the type.
    pub fn validate(mut self) -> Result<Self> {
        self.extensions = self.extensions.normalized()?;
        if self.out_dir.as_os_str().is_empty() {
            bail!("out-dir cannot be empty");
        }
        Ok(self)
    }

    fn try_load_and_combine<P: AsRef<Path>>(
        config: &mut Config,
        path: P,
        context: &str,
    ) -> Result<()> {
        if path.as_ref().exists() {
            log::debug!("Loading {} from: {:?}", context, path.as_ref());
            let loaded = Self::load_from_file(&path)
                .with_context(|| format!("Failed to load {} from {:?}", context, path.as_ref()))?;
            *config = loaded
                .apply_to(config.clone())
                .validate()
                .with_context(|| format!("Invalid configuration in {:?}", path.as_ref()))?;
        }
        Ok(())
    }

    /// Load configuration with hierarchical precedence:
    /// 1. CLI-provided config path (highest precedence)
    /// 2. Environment variables (PAGODA_*)
    /// 3. Project config (pagoda.toml in the project or current directory)
    /// 4. User config (~/.config/pagoda/pagoda.toml)
    /// 5. System config (/etc/pagoda/pagoda.toml or equivalent)
    /// 6. Default values (lowest precedence)
    pub fn load(cli_config_path: Option<&Path>, project_dir: &Path) -> Result<Self> {
        let mut config = Config::default();

        if let Some(system_config_path) = system_config_file() {
            Self::try_load_and_combine(&mut config, &system_config_path, "system config")?;
        }

        if let Some(user_config_path) = user_config_file() {
            Self::try_load_and_combine(&mut config, &user_config_path, "user config")?;
        }

        if let Some(project_config_path) = project_config_file(project_dir) {
            Self::try_load_and_combine(&mut config, &project_config_path, "project config")?;
        }

        config = EnvConfig::from_env().apply_to(config);

        if let Some(cli_config_path) = cli_config_path {
            if !cli_config_path.exists() {
                bail!("Config file not found: {:?}", cli_config_path);
            }
            Self::try_load_and_combine(&mut config, cli_config_path, "CLI config")?;
        }

        config.validate().context("Invalid final configuration")
    }
}
