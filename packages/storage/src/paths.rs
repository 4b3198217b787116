#![allow(clippy::module_name_repetitions)]
//! Canonical locations of the on-disk report store.

use std::path::{Path, PathBuf};

/// Environment variable that overrides [`default_data_dir`].
pub const DATA_DIR_ENV: &str = "CLEAN592_DATA_DIR";

/// Returns the directory used by [`crate::FileStore`] when none is
/// configured: `$CLEAN592_DATA_DIR` if set, otherwise `./data`.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV).map_or_else(|| PathBuf::from("data"), PathBuf::from)
}

/// Returns the file that holds the value for `key` inside `dir`.
#[must_use]
pub fn key_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

/// Whether `key` can be used as a file name on every platform.
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_path_appends_json_extension() {
        let path = key_path(Path::new("data"), "pending_reports");
        assert_eq!(path, PathBuf::from("data").join("pending_reports.json"));
    }

    #[test]
    fn keys_with_separators_are_invalid() {
        assert!(is_valid_key("history_reports"));
        assert!(!is_valid_key("../etc/passwd"));
        assert!(!is_valid_key("a/b"));
        assert!(!is_valid_key(""));
    }
}
