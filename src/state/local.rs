//! JSON file state store.
//!
//! State lives in `state.json` inside the state directory and is replaced
//! atomically on every save.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Result, StateError};

use super::store::StateStore;
use super::types::FleetState;

/// File name of the state document inside the state directory.
const STATE_FILE: &str = "state.json";

/// Keeps fleet state in a single JSON file.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Directory holding the state file.
    base_dir: PathBuf,
    /// Full path of `state.json`.
    state_path: PathBuf,
}

impl LocalStateStore {
    /// Creates a state store rooted at `base_dir`.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let state_path = base_dir.join(STATE_FILE);

        Self {
            base_dir,
            state_path,
        }
    }

    /// Returns the path of the state file.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Creates the state directory on first save.
    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir)
                .await
                .map_err(|e| StateError::write(format!("Failed to create state directory: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<FleetState>> {
        if !self.state_path.exists() {
            debug!("No fleet state at {}", self.state_path.display());
            return Ok(None);
        }

        info!("Reading fleet state from {}", self.state_path.display());

        let content = fs::read_to_string(&self.state_path).await.map_err(|e| {
            StateError::Corrupted {
                message: format!("{}: {e}", self.state_path.display()),
            }
        })?;

        let state: FleetState = serde_json::from_str(&content).map_err(|e| StateError::Corrupted {
            message: format!("{} is not valid state JSON: {e}", self.state_path.display()),
        })?;
        state.check_version()?;

        Ok(Some(state))
    }

    async fn save(&self, state: &FleetState) -> Result<()> {
        self.ensure_dir().await?;

        debug!("Saving state to: {}", self.state_path.display());

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        let temp_path = self.state_path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StateError::write(format!("Failed to create temp state file: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::write(format!("Failed to write state file: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| StateError::write(format!("Failed to sync state file: {e}")))?;

        fs::rename(&temp_path, &self.state_path)
            .await
            .map_err(|e| StateError::write(format!("Failed to rename state file: {e}")))?;

        debug!("Fleet state written");
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.state_path.exists())
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{HistoryEntry, Operation};
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::with_base_dir(temp_dir.path().join("state"));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        let mut state = FleetState::new();
        state.add_history(HistoryEntry::new(Operation::Plan, "abc", 3));
        store.save(&state).await.expect("Failed to save state");

        let loaded = store
            .load()
            .await
            .expect("Failed to load state")
            .expect("State should exist");

        assert_eq!(loaded.history.len(), 1);
        assert_eq!(loaded.history[0].changes, 3);
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();

        let result = store.load().await.expect("Load should not fail");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_exists_after_first_save() {
        let (store, _temp) = create_test_store();

        assert!(!store.exists().await.expect("exists check failed"));
        assert!(store.load().await.expect("load failed").is_none());

        store.save(&FleetState::new()).await.expect("Failed to save state");
        assert!(store.exists().await.expect("exists check failed"));
    }

    #[tokio::test]
    async fn test_corrupted_state_is_rejected() {
        let (store, _temp) = create_test_store();
        store.save(&FleetState::new()).await.unwrap();
        tokio::fs::write(store.state_path(), "{ not json").await.unwrap();

        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn test_incompatible_version_is_rejected() {
        let (store, _temp) = create_test_store();
        let mut state = FleetState::new();
        state.version = String::from("0.1");
        store.save(&state).await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(err.to_string().contains("version mismatch"));
    }
}
