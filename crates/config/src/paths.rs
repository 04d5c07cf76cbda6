//! Path helpers for the openpasture data directory.

use std::path::PathBuf;

/// Data directory (~/.openpasture). Falls back to the current directory
/// when no home directory can be resolved.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".openpasture")
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Where the file store keeps one JSON document per farm.
pub fn farms_dir() -> PathBuf {
    data_dir().join("farms")
}

pub async fn ensure_dir(path: &PathBuf) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}
