//! Data directory layout for agentflow.
//!
//! Everything the engine persists lives under one directory: the SQLite
//! database (`agentflow.db`) and the optional `config.toml`.

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "AGENTFLOW_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `AGENTFLOW_DATA_DIR` environment variable
/// 2. `~/.agentflow`
/// 3. `.agentflow` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".agentflow");
    }

    PathBuf::from(".agentflow")
}

/// Create the data directory (and parents) if it does not exist yet.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(data_dir).await
}

/// Path of `config.toml` inside the data directory.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_ensure_data_dir_creates_nested() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        ensure_data_dir(&nested).await.unwrap();
        assert!(tokio::fs::try_exists(&nested).await.unwrap());

        // Idempotent on an existing directory.
        ensure_data_dir(&nested).await.unwrap();
    }

    #[test]
    fn test_config_path() {
        assert_eq!(
            config_path(Path::new("/home/user/.agentflow")),
            PathBuf::from("/home/user/.agentflow/config.toml")
        );
    }

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: no other test in this crate reads or writes this variable.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/test-agentflow");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-agentflow"));
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
    }
}
