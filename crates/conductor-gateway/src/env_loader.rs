//! `.env` bootstrap.
//!
//! Nothing is loaded implicitly. `main` calls [`load_env`] once, before the
//! configuration is built. Variables already set in the process always win,
//! then the repository `.env`, then the per-user one.

use std::path::{Path, PathBuf};

/// Markers identifying the repository root
const ROOT_MARKERS: &[&str] = &[".git", "Cargo.toml"];

/// Load `.env` files for the current working directory.
///
/// Returns the files that were actually loaded, in load order.
pub fn load_env() -> Vec<PathBuf> {
    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            tracing::warn!(error = %e, "cannot resolve working directory, skipping repository .env");
            PathBuf::new()
        }
    };
    load_env_from(&cwd, global_config_dir())
}

/// Load the repository `.env` above `start`, then `<config_dir>/.env`.
pub fn load_env_from(start: &Path, config_dir: Option<PathBuf>) -> Vec<PathBuf> {
    let candidates = find_repo_root(start)
        .map(|root| root.join(".env"))
        .into_iter()
        .chain(config_dir.map(|dir| dir.join(".env")));

    let mut loaded = Vec::new();
    for path in candidates {
        if !path.is_file() {
            continue;
        }
        match dotenvy::from_path(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "loaded environment file");
                loaded.push(path);
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to load environment file"),
        }
    }
    loaded
}

/// First ancestor of `start` (inclusive) holding a repository marker
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()))
        .map(Path::to_path_buf)
}

/// `$XDG_CONFIG_HOME/conductor`, falling back to `~/.config/conductor`
pub fn global_config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .map(|dir| dir.join("conductor"))
}
