use anyhow::Context;
use std::env;
use std::path::{Path, PathBuf};

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home))
}

fn ensure_dir(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))?;
    Ok(path.to_path_buf())
}

fn tutor_home() -> Option<PathBuf> {
    env::var_os("TUTOR_HOME").map(PathBuf::from)
}

/// `$TUTOR_HOME/config`, `$XDG_CONFIG_HOME/tutor` or `~/.config/tutor`.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    if let Some(base) = tutor_home() {
        return ensure_dir(&base.join("config"));
    }

    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").map(PathBuf::from) {
        return ensure_dir(&xdg.join("tutor"));
    }

    ensure_dir(&home_dir()?.join(".config").join("tutor"))
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}
