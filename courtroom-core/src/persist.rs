//! Case directory layout and JSON persistence helpers.
//!
//! Every record is written to a hidden sibling file first and renamed into
//! place, so a crash mid-write never leaves a half-written record behind.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid record path: {0}")]
    InvalidPath(PathBuf),
}

/// Directory holding the game-state records.
pub const GAME_STATE_DIR: &str = "game_state";

/// Directory holding narrative snapshots.
pub const NARRATIVE_SAVES_DIR: &str = "narrative_saves";

pub const INVESTIGATION_PROGRESS_FILE: &str = "investigation_progress.json";
pub const TRIAL_PROGRESS_FILE: &str = "trial_progress.json";
pub const DICE_LOG_FILE: &str = "dice_rolls.json";

/// Paths of the records that make up one case on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseFiles {
    root: PathBuf,
}

impl CaseFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Case name, taken from the directory name.
    pub fn case_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn game_state_dir(&self) -> PathBuf {
        self.root.join(GAME_STATE_DIR)
    }

    pub fn investigation_progress(&self) -> PathBuf {
        self.game_state_dir().join(INVESTIGATION_PROGRESS_FILE)
    }

    pub fn trial_progress(&self) -> PathBuf {
        self.game_state_dir().join(TRIAL_PROGRESS_FILE)
    }

    pub fn dice_log(&self) -> PathBuf {
        self.game_state_dir().join(DICE_LOG_FILE)
    }

    pub fn narrative_saves_dir(&self) -> PathBuf {
        self.root.join(NARRATIVE_SAVES_DIR)
    }
}

/// Read a JSON record, returning `None` if the file does not exist.
pub async fn read_json_optional<T: DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<Option<T>, PersistError> {
    let content = match fs::read_to_string(path.as_ref()).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// Write a JSON record by replacing the file atomically.
pub async fn write_json_atomic<T: Serialize>(
    path: impl AsRef<Path>,
    value: &T,
) -> Result<(), PersistError> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(value)?;

    let tmp = temp_sibling(path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(&tmp, content).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    debug!(path = %path.display(), "wrote record");
    Ok(())
}

/// Hidden sibling used as the staging file for `path`.
pub fn temp_sibling(path: &Path) -> Result<PathBuf, PersistError> {
    let name = path
        .file_name()
        .ok_or_else(|| PersistError::InvalidPath(path.to_path_buf()))?;
    Ok(path.with_file_name(format!(".{}.tmp", name.to_string_lossy())))
}

/// Replace anything but letters, digits and underscores.
pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Second-resolution timestamp used in record names.
pub fn timestamp_slug(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}
