use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::handle::{FileHandle, FileSnapshot, UserGesture};
use super::permission::{self, Access};
use super::picker::{FilePicker, PickError};
use crate::state::data::{FileLabel, SessionState, SessionView};
use crate::state::prefs::{Preferences, LAST_FILE_PATH};
use crate::state::store::HandleStore;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Please select a file first")]
    NoFileSelected,
    #[error("Permission to read {0} was not granted")]
    PermissionDenied(String),
    #[error("Error reading file {name}: {source}")]
    ReadFailure {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Pick(#[from] PickError),
}

/// Result of a file selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    /// The user dismissed the dialog; nothing changed
    Cancelled,
    /// A file became current. `persisted` is false when the handle store
    /// could not be written, in which case the file is usable for this
    /// session only.
    Selected { name: String, persisted: bool },
}

/// Owns the current file handle and drives pick, restore and read.
pub struct FileSession<H> {
    state: SessionState,
    handle: Option<H>,
    name: Option<String>,
    label: Option<FileLabel>,
    store: Arc<dyn HandleStore<H>>,
    prefs: Arc<dyn Preferences>,
}

impl<H: FileHandle + 'static> FileSession<H> {
    pub fn new(store: Arc<dyn HandleStore<H>>, prefs: Arc<dyn Preferences>) -> Self {
        Self {
            state: SessionState::NoFile,
            handle: None,
            name: None,
            label: None,
            store,
            prefs,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            state: self.state(),
            label: self.label.clone(),
            generate_enabled: self.state() == SessionState::Active,
        }
    }

    /// Put the cached display name on the label before anything slow runs.
    ///
    /// The label is stale until [`restore`](Self::restore) confirms the file.
    pub fn show_cached_name(&mut self) -> SessionView {
        if let Some(cached) = self.prefs.get(LAST_FILE_PATH) {
            self.label = Some(FileLabel::LastUsed(cached));
        }
        self.view()
    }

    /// Let the user choose a new file through `picker`.
    ///
    /// On success the handle becomes current, is persisted (best effort) and
    /// the cached display name is refreshed. Cancelling leaves everything as
    /// it was.
    pub async fn pick(&mut self, picker: &dyn FilePicker<H>) -> Result<PickOutcome, SessionError> {
        let previous = self.state;
        self.state = SessionState::Picking;

        let picked = match picker.pick().await {
            Ok(picked) => picked,
            Err(e) => {
                self.state = previous;
                error!("Error picking file: {}", e);
                return Err(e.into());
            }
        };

        let Some(handle) = picked else {
            info!("File selection cancelled");
            self.state = previous;
            return Ok(PickOutcome::Cancelled);
        };

        let snapshot = match handle.open().await {
            Ok(snapshot) => snapshot,
            Err(source) => {
                self.state = previous;
                return Err(SessionError::ReadFailure {
                    name: "selected file".to_string(),
                    source,
                });
            }
        };

        let persisted = match self.store.put(&handle).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Error storing file handle: {}", e);
                false
            }
        };

        info!("📄 Selected {}", snapshot.name);
        self.remember_name(&snapshot.name).await;
        self.label = Some(FileLabel::Selected(snapshot.name.clone()));
        self.name = Some(snapshot.name.clone());
        self.handle = Some(handle);
        self.state = SessionState::Active;

        Ok(PickOutcome::Selected {
            name: snapshot.name,
            persisted,
        })
    }

    /// Read the current file fresh from disk.
    ///
    /// A failed read drops the handle and moves the session to `Invalid`.
    pub async fn read(&mut self) -> Result<FileSnapshot, SessionError> {
        let Some(handle) = self.handle.as_ref() else {
            self.label = Some(FileLabel::SelectPrompt);
            return Err(SessionError::NoFileSelected);
        };

        match handle.open().await {
            Ok(snapshot) => {
                self.name = Some(snapshot.name.clone());
                Ok(snapshot)
            }
            Err(source) => {
                let name = self.name.take().unwrap_or_else(|| "file".to_string());
                error!("Error reading file {}: {}", name, source);
                self.handle = None;
                self.state = SessionState::Invalid;
                Err(SessionError::ReadFailure { name, source })
            }
        }
    }

    /// Startup restore.
    ///
    /// Shows the cached name right away, then tries to bring back the stored
    /// handle. Failures only degrade to a stale "Last used" label.
    pub async fn restore(&mut self) -> SessionView {
        if let Err(e) = self.restore_with(None).await {
            info!("File handle not restored: {}", e);
        }
        self.view()
    }

    /// Restore again from a user action, allowing a permission prompt.
    pub async fn reconnect(&mut self, gesture: &UserGesture) -> Result<SessionView, SessionError> {
        if self.state == SessionState::Active {
            return Ok(self.view());
        }
        self.restore_with(Some(gesture)).await?;
        Ok(self.view())
    }

    async fn restore_with(&mut self, gesture: Option<&UserGesture>) -> Result<(), SessionError> {
        let Some(cached) = self.prefs.get(LAST_FILE_PATH) else {
            return Err(SessionError::NoFileSelected);
        };
        self.label = Some(FileLabel::LastUsed(cached.clone()));

        let result = self.reacquire(&cached, gesture).await;
        if result.is_err() {
            // Remember what was used, but don't pretend we can reach it
            self.handle = None;
            self.name = None;
            self.state = SessionState::NoFile;
        }
        result
    }

    /// Update the display-name cache off the async executor
    async fn remember_name(&self, name: &str) {
        let prefs = self.prefs.clone();
        let name = name.to_string();
        if let Err(e) = tokio::task::spawn_blocking(move || prefs.set(LAST_FILE_PATH, &name)).await {
            warn!("Failed to cache file name: {}", e);
        }
    }

    async fn reacquire(&mut self, cached: &str, gesture: Option<&UserGesture>) -> Result<(), SessionError> {
        let stored = match self.store.get().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Error retrieving file handle: {}", e);
                None
            }
        };
        let Some(handle) = stored else {
            return Err(SessionError::NoFileSelected);
        };

        if permission::verify(&handle, gesture).await == Access::Denied {
            return Err(SessionError::PermissionDenied(cached.to_string()));
        }

        let snapshot = match handle.open().await {
            Ok(snapshot) => snapshot,
            Err(source) => {
                error!("Error accessing stored file {}: {}", cached, source);
                self.state = SessionState::Invalid;
                return Err(SessionError::ReadFailure {
                    name: cached.to_string(),
                    source,
                });
            }
        };

        info!("📄 Restored {}", snapshot.name);
        // The file may have been renamed since it was cached
        self.remember_name(&snapshot.name).await;
        self.label = Some(FileLabel::LastUsed(snapshot.name.clone()));
        self.name = Some(snapshot.name);
        self.handle = Some(handle);
        self.state = SessionState::Active;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::handle::{AccessMode, PermissionState};
    use crate::state::store::StoreError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// What the fake filesystem currently says about one file
    struct FakeFile {
        name: String,
        text: String,
        exists: bool,
        query: PermissionState,
        request: PermissionState,
        requests: usize,
    }

    #[derive(Clone)]
    struct FakeHandle(Arc<Mutex<FakeFile>>);

    impl FakeHandle {
        fn new(name: &str, text: &str) -> Self {
            Self(Arc::new(Mutex::new(FakeFile {
                name: name.to_string(),
                text: text.to_string(),
                exists: true,
                query: PermissionState::Granted,
                request: PermissionState::Granted,
                requests: 0,
            })))
        }

        fn edit(&self, f: impl FnOnce(&mut FakeFile)) {
            f(&mut self.0.lock().unwrap());
        }

        fn requests(&self) -> usize {
            self.0.lock().unwrap().requests
        }
    }

    #[async_trait]
    impl FileHandle for FakeHandle {
        async fn open(&self) -> io::Result<FileSnapshot> {
            let file = self.0.lock().unwrap();
            if !file.exists {
                return Err(io::ErrorKind::NotFound.into());
            }
            Ok(FileSnapshot {
                name: file.name.clone(),
                text: file.text.clone(),
            })
        }

        async fn query_permission(&self, _mode: AccessMode) -> io::Result<PermissionState> {
            Ok(self.0.lock().unwrap().query)
        }

        async fn request_permission(
            &self,
            _mode: AccessMode,
            _gesture: &UserGesture,
        ) -> io::Result<PermissionState> {
            let mut file = self.0.lock().unwrap();
            file.requests += 1;
            Ok(file.request)
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        slot: Mutex<Option<FakeHandle>>,
        puts: AtomicUsize,
        unavailable: bool,
    }

    #[async_trait]
    impl HandleStore<FakeHandle> for MemoryStore {
        async fn put(&self, handle: &FakeHandle) -> Result<(), StoreError> {
            if self.unavailable {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.puts.fetch_add(1, Ordering::SeqCst);
            *self.slot.lock().unwrap() = Some(handle.clone());
            Ok(())
        }

        async fn get(&self) -> Result<Option<FakeHandle>, StoreError> {
            if self.unavailable {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            Ok(self.slot.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct MemoryPrefs(Mutex<HashMap<String, String>>);

    impl Preferences for MemoryPrefs {
        fn get(&self, key: &str) -> Option<String> {
            self.0.lock().unwrap().get(key).cloned()
        }

        fn set(&self, key: &str, value: &str) {
            self.0.lock().unwrap().insert(key.to_string(), value.to_string());
        }
    }

    struct ScriptedPicker(Option<FakeHandle>);

    #[async_trait]
    impl FilePicker<FakeHandle> for ScriptedPicker {
        async fn pick(&self) -> Result<Option<FakeHandle>, PickError> {
            Ok(self.0.clone())
        }
    }

    struct Host {
        store: Arc<MemoryStore>,
        prefs: Arc<MemoryPrefs>,
    }

    impl Host {
        fn new() -> Self {
            Self {
                store: Arc::new(MemoryStore::default()),
                prefs: Arc::new(MemoryPrefs::default()),
            }
        }

        /// A fresh session over the same durable state, as after a reload
        fn session(&self) -> FileSession<FakeHandle> {
            FileSession::new(self.store.clone(), self.prefs.clone())
        }
    }

    #[tokio::test]
    async fn test_restore_with_nothing_stored() {
        let host = Host::new();
        let mut session = host.session();

        let view = session.restore().await;
        assert_eq!(view.state, SessionState::NoFile);
        assert_eq!(view.label, None);
        assert!(!view.generate_enabled);
    }

    #[tokio::test]
    async fn test_pick_persist_reload_restore() {
        let host = Host::new();
        let file = FakeHandle::new("notes.txt", "$x^2$");

        let mut session = host.session();
        let outcome = session.pick(&ScriptedPicker(Some(file.clone()))).await.unwrap();
        assert_eq!(
            outcome,
            PickOutcome::Selected { name: "notes.txt".into(), persisted: true }
        );
        assert_eq!(session.view().label.unwrap().text(), "Selected: notes.txt");

        let mut reloaded = host.session();
        let view = reloaded.restore().await;
        assert_eq!(view.state, SessionState::Active);
        assert_eq!(view.label.unwrap().text(), "Last used: notes.txt");
        assert!(view.generate_enabled);
        assert_eq!(file.requests(), 0);
    }

    #[tokio::test]
    async fn test_cached_name_shown_before_restore() {
        let host = Host::new();
        let mut session = host.session();
        assert_eq!(session.show_cached_name().label, None);

        session.pick(&ScriptedPicker(Some(FakeHandle::new("sum.typ", "$1$")))).await.unwrap();

        let mut reloaded = host.session();
        let early = reloaded.show_cached_name();
        assert_eq!(early.state, SessionState::NoFile);
        assert_eq!(early.label.unwrap().text(), "Last used: sum.typ");
        assert!(!early.generate_enabled);

        assert!(reloaded.restore().await.generate_enabled);
    }

    #[tokio::test]
    async fn test_cancelled_pick_has_no_side_effects() {
        let host = Host::new();
        let mut session = host.session();

        let outcome = session.pick(&ScriptedPicker(None)).await.unwrap();
        assert_eq!(outcome, PickOutcome::Cancelled);
        assert_eq!(session.state(), SessionState::NoFile);
        assert_eq!(session.view().label, None);
        assert_eq!(host.store.puts.load(Ordering::SeqCst), 0);
        assert_eq!(host.prefs.get(LAST_FILE_PATH), None);
    }

    #[tokio::test]
    async fn test_cancel_keeps_active_file() {
        let host = Host::new();
        let mut session = host.session();
        session
            .pick(&ScriptedPicker(Some(FakeHandle::new("a.typ", "a"))))
            .await
            .unwrap();

        session.pick(&ScriptedPicker(None)).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.read().await.unwrap().text, "a");
    }

    #[tokio::test]
    async fn test_denied_permission_leaves_stale_label() {
        let host = Host::new();
        let file = FakeHandle::new("notes.txt", "x");
        host.session().pick(&ScriptedPicker(Some(file.clone()))).await.unwrap();

        file.edit(|f| {
            f.query = PermissionState::Prompt;
            f.request = PermissionState::Denied;
        });

        let view = host.session().restore().await;
        assert_eq!(view.state, SessionState::NoFile);
        assert_eq!(view.label, Some(FileLabel::LastUsed("notes.txt".into())));
        assert!(!view.generate_enabled);
        // No user action at startup, so no prompt either
        assert_eq!(file.requests(), 0);
    }

    #[tokio::test]
    async fn test_deleted_file_on_restore() {
        let host = Host::new();
        let file = FakeHandle::new("notes.txt", "x");
        host.session().pick(&ScriptedPicker(Some(file.clone()))).await.unwrap();
        file.edit(|f| f.exists = false);

        let view = host.session().restore().await;
        assert_eq!(view.state, SessionState::NoFile);
        assert_eq!(view.label.unwrap().text(), "Last used: notes.txt");
        assert!(!view.generate_enabled);
    }

    #[tokio::test]
    async fn test_read_is_never_cached() {
        let host = Host::new();
        let file = FakeHandle::new("a.typ", "one");
        let mut session = host.session();
        session.pick(&ScriptedPicker(Some(file.clone()))).await.unwrap();

        assert_eq!(session.read().await.unwrap().text, "one");
        file.edit(|f| f.text = "two".into());
        assert_eq!(session.read().await.unwrap().text, "two");
    }

    #[tokio::test]
    async fn test_read_failure_invalidates() {
        let host = Host::new();
        let file = FakeHandle::new("a.typ", "one");
        let mut session = host.session();
        session.pick(&ScriptedPicker(Some(file.clone()))).await.unwrap();
        file.edit(|f| f.exists = false);

        let err = session.read().await.unwrap_err();
        assert!(matches!(err, SessionError::ReadFailure { ref name, .. } if name == "a.typ"));
        assert_eq!(session.state(), SessionState::Invalid);
        assert!(!session.view().generate_enabled);

        // The handle is gone, even if the file comes back
        file.edit(|f| f.exists = true);
        assert!(matches!(session.read().await, Err(SessionError::NoFileSelected)));
    }

    #[tokio::test]
    async fn test_read_without_file_prompts_selection() {
        let host = Host::new();
        let mut session = host.session();

        assert!(matches!(session.read().await, Err(SessionError::NoFileSelected)));
        assert_eq!(session.view().label, Some(FileLabel::SelectPrompt));
    }

    #[tokio::test]
    async fn test_unavailable_store_is_not_fatal() {
        let store = Arc::new(MemoryStore {
            unavailable: true,
            ..MemoryStore::default()
        });
        let prefs = Arc::new(MemoryPrefs::default());
        let mut session: FileSession<FakeHandle> = FileSession::new(store.clone(), prefs.clone());

        let outcome = session
            .pick(&ScriptedPicker(Some(FakeHandle::new("a.typ", "a"))))
            .await
            .unwrap();
        assert_eq!(outcome, PickOutcome::Selected { name: "a.typ".into(), persisted: false });
        assert_eq!(session.state(), SessionState::Active);

        // Restore degrades to the cached label
        let view = FileSession::<FakeHandle>::new(store, prefs).restore().await;
        assert_eq!(view.state, SessionState::NoFile);
        assert_eq!(view.label, Some(FileLabel::LastUsed("a.typ".into())));
    }

    #[tokio::test]
    async fn test_reconnect_prompts_with_gesture() {
        let host = Host::new();
        let file = FakeHandle::new("notes.txt", "x");
        host.session().pick(&ScriptedPicker(Some(file.clone()))).await.unwrap();
        file.edit(|f| f.query = PermissionState::Prompt);

        let mut session = host.session();
        assert_eq!(session.restore().await.state, SessionState::NoFile);

        let gesture = UserGesture::from_user_action();
        let view = session.reconnect(&gesture).await.unwrap();
        assert_eq!(view.state, SessionState::Active);
        assert_eq!(file.requests(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_denied() {
        let host = Host::new();
        let file = FakeHandle::new("notes.txt", "x");
        host.session().pick(&ScriptedPicker(Some(file.clone()))).await.unwrap();
        file.edit(|f| {
            f.query = PermissionState::Prompt;
            f.request = PermissionState::Denied;
        });

        let mut session = host.session();
        let gesture = UserGesture::from_user_action();
        let err = session.reconnect(&gesture).await.unwrap_err();
        assert!(matches!(err, SessionError::PermissionDenied(ref name) if name == "notes.txt"));
        assert_eq!(session.view().label, Some(FileLabel::LastUsed("notes.txt".into())));
    }

    #[tokio::test]
    async fn test_restore_refreshes_renamed_file() {
        let host = Host::new();
        let file = FakeHandle::new("old.typ", "x");
        host.session().pick(&ScriptedPicker(Some(file.clone()))).await.unwrap();
        file.edit(|f| f.name = "new.typ".into());

        let view = host.session().restore().await;
        assert_eq!(view.label.unwrap().text(), "Last used: new.typ");
        assert_eq!(host.prefs.get(LAST_FILE_PATH).as_deref(), Some("new.typ"));
    }
}
