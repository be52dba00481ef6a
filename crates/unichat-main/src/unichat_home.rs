use std::path::{Path, PathBuf};

const DEFAULT_UNICHAT_HOME_DIR_NAME: &str = ".unichat";
pub const CONFIG_FILE_NAME: &str = "unichat.toml";
pub const STATE_FILE_NAME: &str = "state.json";

pub fn resolve_unichat_home_dir(conf_dir: Option<&Path>) -> PathBuf {
    conf_dir
        .map(resolve_unichat_home_arg)
        .unwrap_or_else(default_unichat_home_dir)
}

/// Resolves a path from the config file: `~` expands to the home directory
/// and relative paths are taken from `base`.
pub fn resolve_config_path(base: &Path, value: &str) -> PathBuf {
    let expanded = expand_path_with_home(Path::new(value.trim()));
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

fn resolve_unichat_home_arg(path: &Path) -> PathBuf {
    let expanded = expand_path_with_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(expanded)
    }
}

fn expand_path_with_home(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw == "~" {
        return home_dir();
    }
    if let Some(suffix) = raw.strip_prefix("~/") {
        return home_dir().join(suffix);
    }
    path.to_path_buf()
}

fn default_unichat_home_dir() -> PathBuf {
    home_dir().join(DEFAULT_UNICHAT_HOME_DIR_NAME)
}

fn home_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home);
    }
    if let Some(profile) = std::env::var_os("USERPROFILE") {
        return PathBuf::from(profile);
    }
    PathBuf::from(".")
}
