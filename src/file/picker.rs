use async_trait::async_trait;
use rfd::AsyncFileDialog;
use std::path::PathBuf;
use thiserror::Error;

use super::handle::LocalFileHandle;

/// Extensions accepted as Typst sources
pub const TYPST_EXTENSIONS: [&str; 2] = ["typ", "txt"];

/// The picker itself failed (dismissal is not a failure)
#[derive(Debug, Error)]
#[error("file picker failed: {0}")]
pub struct PickError(pub String);

/// Platform file selection dialog.
///
/// `Ok(None)` means the user dismissed the dialog.
#[async_trait]
pub trait FilePicker<H>: Send + Sync {
    async fn pick(&self) -> Result<Option<H>, PickError>;
}

/// Native dialog limited to Typst sources, one file at a time
#[derive(Debug, Default, Clone, Copy)]
pub struct RfdPicker;

#[async_trait]
impl FilePicker<LocalFileHandle> for RfdPicker {
    async fn pick(&self) -> Result<Option<LocalFileHandle>, PickError> {
        let picked = AsyncFileDialog::new()
            .set_title("Select Typst File")
            .add_filter("Typst files", &TYPST_EXTENSIONS)
            .pick_file()
            .await;

        Ok(picked.map(|file| LocalFileHandle::new(file.path())))
    }
}

/// A file dropped onto the window, picked without a dialog
#[derive(Debug, Clone)]
pub struct DroppedFile(pub PathBuf);

#[async_trait]
impl FilePicker<LocalFileHandle> for DroppedFile {
    async fn pick(&self) -> Result<Option<LocalFileHandle>, PickError> {
        let accepted = self
            .0
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| TYPST_EXTENSIONS.iter().any(|t| ext.eq_ignore_ascii_case(t)));

        if !accepted {
            return Err(PickError(format!(
                "{} is not a Typst file (.typ or .txt)",
                self.0.display()
            )));
        }
        Ok(Some(LocalFileHandle::new(&self.0)))
    }
}
