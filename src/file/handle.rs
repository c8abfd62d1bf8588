/// File access capabilities
///
/// A handle references one file on the local filesystem. It never caches
/// content: every `open()` re-reads the file so callers always see what is on
/// disk right now. Permission is queried and requested through the handle
/// itself, and a request needs a [`UserGesture`] to prove it runs inside a
/// user-initiated action.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

/// Access mode descriptor for permission queries, `{"mode": "read"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AccessMode {
    Read,
}

/// Result of a permission query or request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

/// Proof that the current call chain started from a user action.
///
/// Permission prompts outside such a chain are rejected by the host, so the
/// only way to reach [`FileHandle::request_permission`] is with one of these.
#[derive(Debug)]
pub struct UserGesture {
    _private: (),
}

impl UserGesture {
    /// Mint a gesture token. Call only from a UI event handler.
    pub fn from_user_action() -> Self {
        Self { _private: () }
    }
}

/// A fresh read of the file behind a handle
#[derive(Debug, Clone, PartialEq)]
pub struct FileSnapshot {
    /// Display name (file name only)
    pub name: String,
    /// Full text content
    pub text: String,
}

/// Capability for reading one local file
#[async_trait]
pub trait FileHandle: Send + Sync {
    /// Re-open the file and read its current content
    async fn open(&self) -> io::Result<FileSnapshot>;

    /// Current permission state, never prompts
    async fn query_permission(&self, mode: AccessMode) -> io::Result<PermissionState>;

    /// Actively request permission; may prompt and suspend on the user
    async fn request_permission(
        &self,
        mode: AccessMode,
        gesture: &UserGesture,
    ) -> io::Result<PermissionState>;
}

/// Desktop file handle: a path granted by the native file picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFileHandle {
    path: PathBuf,
}

impl LocalFileHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn display_name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }

    async fn probe(&self) -> io::Result<()> {
        tokio::fs::File::open(&self.path).await.map(|_| ())
    }
}

#[async_trait]
impl FileHandle for LocalFileHandle {
    async fn open(&self) -> io::Result<FileSnapshot> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        Ok(FileSnapshot {
            name: self.display_name(),
            text,
        })
    }

    async fn query_permission(&self, _mode: AccessMode) -> io::Result<PermissionState> {
        match self.probe().await {
            Ok(()) => Ok(PermissionState::Granted),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Ok(PermissionState::Denied),
            Err(_) => Ok(PermissionState::Prompt),
        }
    }

    async fn request_permission(
        &self,
        _mode: AccessMode,
        _gesture: &UserGesture,
    ) -> io::Result<PermissionState> {
        // The OS has no prompt for plain read access; a retry is the request.
        match self.probe().await {
            Ok(()) => Ok(PermissionState::Granted),
            Err(_) => Ok(PermissionState::Denied),
        }
    }
}
