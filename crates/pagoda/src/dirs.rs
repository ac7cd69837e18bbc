use std::{
    env,
    path::{Path, PathBuf},
};

use etcetera::BaseStrategy;

/// Configuration directory name
const CONFIG_DIR: &str = "pagoda";

/// Configuration file name
pub const CONFIG_FILE: &str = "pagoda.toml";

/// Returns the path to the user's `pagoda.toml`, whether or not it exists.
///
/// On Windows this lives under e.g. `C:\Users\Alice\AppData\Roaming\pagoda`,
/// elsewhere under `XDG_CONFIG_HOME` or `$HOME/.config/pagoda`.
pub fn user_config_file() -> Option<PathBuf> {
    let strategy = etcetera::choose_base_strategy().ok()?;
    Some(strategy.config_dir().join(CONFIG_DIR).join(CONFIG_FILE))
}

/// The `pagoda.toml` governing a project: the one inside `project` if
/// present, otherwise the one in the current directory.
pub fn project_config_file(project: &Path) -> Option<PathBuf> {
    [project.join(CONFIG_FILE), PathBuf::from(CONFIG_FILE)]
        .into_iter()
        .find(|candidate| candidate.is_file())
}

#[cfg(not(windows))]
fn locate_system_config_xdg(value: Option<&str>) -> Option<PathBuf> {
    let config_dirs = value.filter(|s| !s.is_empty()).unwrap_or("/etc/xdg");
    config_dirs
        .split(':')
        .take_while(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(CONFIG_DIR).join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

#[cfg(windows)]
fn locate_system_config_windows(system_drive: impl AsRef<Path>) -> Option<PathBuf> {
    let candidate = system_drive
        .as_ref()
        .join("ProgramData")
        .join(CONFIG_DIR)
        .join(CONFIG_FILE);
    candidate.as_path().is_file().then_some(candidate)
}

/// Returns the path to the system configuration file.
///
/// On Unix-like systems, searches `XDG_CONFIG_DIRS` (`/etc/xdg` when unset)
/// and then falls back to `/etc/pagoda/pagoda.toml`. On Windows, uses
/// `%SYSTEMDRIVE%\ProgramData\pagoda\pagoda.toml`.
pub fn system_config_file() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        env::var("SYSTEMDRIVE")
            .ok()
            .and_then(|system_drive| locate_system_config_windows(PathBuf::from(system_drive)))
    }

    #[cfg(not(windows))]
    {
        let xdg_config_dirs = env::var("XDG_CONFIG_DIRS").ok();
        if let Some(path) = locate_system_config_xdg(xdg_config_dirs.as_deref()) {
            return Some(path);
        }

        let candidate = Path::new("/etc").join(CONFIG_DIR).join(CONFIG_FILE);
        match candidate.try_exists() {
            Ok(true) => Some(candidate),
            Ok(false) => None,
            Err(err) => {
                log::warn!("Failed to query system configuration file: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[cfg(not(windows))]
    fn test_locate_system_config_xdg() -> anyhow::Result<()> {
        let context = TempDir::new()?;
        let config_dir = context.path().join(CONFIG_DIR);
        fs::create_dir_all(&config_dir)?;
        fs::write(config_dir.join(CONFIG_FILE), "out-dir = \"dist\"")?;

        assert_eq!(locate_system_config_xdg(None), None);
        assert_eq!(locate_system_config_xdg(Some("")), None);
        assert_eq!(locate_system_config_xdg(Some(":")), None);

        let dirs = format!(
            "/nonexistent:{}",
            context.path().to_str().expect("path should be valid UTF-8")
        );
        assert_eq!(
            locate_system_config_xdg(Some(&dirs)),
            Some(config_dir.join(CONFIG_FILE))
        );
        Ok(())
    }

    #[test]
    #[cfg(windows)]
    fn test_windows_config() -> anyhow::Result<()> {
        let context = TempDir::new()?;
        let program_data = context.path().join("ProgramData").join(CONFIG_DIR);
        fs::create_dir_all(&program_data)?;
        fs::write(program_data.join(CONFIG_FILE), "out-dir = \"dist\"")?;

        assert_eq!(
            locate_system_config_windows(context.path()),
            Some(program_data.join(CONFIG_FILE))
        );

        let context = TempDir::new()?;
        assert_eq!(locate_system_config_windows(context.path()), None);
        Ok(())
    }

    #[test]
    fn test_project_config_file_prefers_project_dir() -> anyhow::Result<()> {
        let project = TempDir::new()?;
        fs::write(project.path().join(CONFIG_FILE), "minify = true")?;
        assert_eq!(
            project_config_file(project.path()),
            Some(project.path().join(CONFIG_FILE))
        );
        Ok(())
    }

    #[test]
    fn test_user_config_file_name() {
        if let Some(path) = user_config_file() {
            assert!(path.ends_with(Path::new(CONFIG_DIR).join(CONFIG_FILE)));
        }
    }
}
