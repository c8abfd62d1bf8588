/// State management module
///
/// This module handles all durable application state, including:
/// - The persisted file handle (store.rs)
/// - Key/value preferences such as the last file name (prefs.rs)
/// - Shared session data structures (data.rs)
/// - Editor settings (edit.rs)

pub mod store;
pub mod prefs;
pub mod data;
pub mod edit;
