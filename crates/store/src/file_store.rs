use crate::{validate_session_id, SessionStore};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use twin_common::{Error, Message, Result, SessionSummary};

const SESSION_EXT: &str = "json";

/// One pretty-printed JSON file per session
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Open the store, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            Error::Storage(format!(
                "Failed to create session directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        let store = Self { dir };
        store.sweep_temp_files().await;
        info!("Session storage at {}", store.dir.display());
        Ok(store)
    }

    /// Remove temp files left by writes that never reached the rename
    async fn sweep_temp_files(&self) {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to scan {} for temp files: {}", self.dir.display(), e);
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !is_temp_file(&path) {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => debug!("Removed stale temp file {}", path.display()),
                Err(e) => warn!("Failed to remove stale temp file {}: {}", path.display(), e),
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `session_id`
    pub fn session_path(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{}.{}", session_id, SESSION_EXT)))
    }

    fn temp_path(&self, session_id: &str) -> PathBuf {
        self.dir
            .join(format!(".{}.{}.tmp", session_id, uuid::Uuid::new_v4().simple()))
    }

    async fn read_conversation(session_id: &str, path: &Path) -> Result<Option<Vec<Message>>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "Failed to read session {}: {}",
                    session_id, e
                )))
            }
        };

        let conversation = serde_json::from_str(&content).map_err(|e| {
            Error::Storage(format!("Session {} is malformed: {}", session_id, e))
        })?;
        Ok(Some(conversation))
    }
}

fn is_temp_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'));
    hidden && path.extension().and_then(|ext| ext.to_str()) == Some("tmp")
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, session_id: &str) -> Result<Vec<Message>> {
        let path = self.session_path(session_id)?;
        let conversation = Self::read_conversation(session_id, &path)
            .await?
            .unwrap_or_default();
        debug!("Loaded {} turns for session {}", conversation.len(), session_id);
        Ok(conversation)
    }

    async fn save(&self, session_id: &str, conversation: &[Message]) -> Result<()> {
        let path = self.session_path(session_id)?;
        let content = serde_json::to_string_pretty(conversation)?;

        // Write beside the target then rename so readers never see a partial file
        let temp_path = self.temp_path(session_id);
        if let Err(e) = fs::write(&temp_path, content.as_bytes()).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::Storage(format!(
                "Failed to write session {}: {}",
                session_id, e
            )));
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::Storage(format!(
                "Failed to commit session {}: {}",
                session_id, e
            )));
        }

        debug!("Saved {} turns for session {}", conversation.len(), session_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| {
            Error::Storage(format!(
                "Failed to list session directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SESSION_EXT) {
                continue;
            }
            let Some(session_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if validate_session_id(session_id).is_err() {
                debug!("Ignoring foreign file {}", path.display());
                continue;
            }

            match Self::read_conversation(session_id, &path).await {
                Ok(Some(conversation)) => {
                    sessions.push(SessionSummary::from_conversation(session_id, &conversation));
                }
                // Removed between listing and reading
                Ok(None) => {}
                Err(e) => warn!("Skipping session {}: {}", session_id, e),
            }
        }

        Ok(sessions)
    }
}
