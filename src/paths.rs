//! Centralized path definitions for the shell's config files.
//!
//! This module is the single source of truth for leaf filenames and the
//! config-directory lookup. No other module should hard-code these strings.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

// ── Application identity ─────────────────────────────────────────

pub const QUALIFIER: &str = "org";
pub const ORGANIZATION: &str = "klipper-console";
pub const APPLICATION: &str = "klipper-console";

// ── Leaf filenames ───────────────────────────────────────────────

pub const SETTINGS_FILE: &str = "settings.json";

// ── Remote roots ─────────────────────────────────────────────────

/// Moonraker file root holding printable G-code.
pub const GCODES_ROOT: &str = "gcodes";
/// Moonraker file root holding printer configuration.
pub const CONFIG_ROOT: &str = "config";

// ── Config-dir functions ─────────────────────────────────────────

/// Platform config directory (XDG on Linux, Application Support on macOS,
/// AppData on Windows). Falls back to `./.klipper-console` when no home
/// directory can be resolved.
pub fn default_config_dir() -> PathBuf {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION).map_or_else(
        || PathBuf::from(".klipper-console"),
        |dirs| dirs.config_dir().to_path_buf(),
    )
}

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE)
}

/// User home directory, used by `cd` with no argument or `~`.
pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Prefix a remote path with the gcodes root unless it already names a root.
pub fn remote_dir_path(path: &str) -> String {
    let gcodes = format!("{GCODES_ROOT}/");
    let config = format!("{CONFIG_ROOT}/");
    if path.starts_with(&gcodes) || path.starts_with(&config) {
        path.to_string()
    } else {
        format!("{gcodes}{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_dir_path_prefixes_gcodes() {
        assert_eq!(remote_dir_path("parts"), "gcodes/parts");
        assert_eq!(remote_dir_path("gcodes/parts"), "gcodes/parts");
        assert_eq!(remote_dir_path("config/macros"), "config/macros");
    }

    #[test]
    fn settings_path_is_under_config_dir() {
        let dir = PathBuf::from("/tmp/kc");
        assert_eq!(settings_path(&dir), PathBuf::from("/tmp/kc/settings.json"));
    }
}
