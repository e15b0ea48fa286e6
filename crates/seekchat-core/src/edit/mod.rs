mod action;

pub use action::{EditAction, EditKind};

use similar::TextDiff;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ChatError, Result};

/// Writes whole files on behalf of the applier.
pub trait FileWriter: Send + Sync {
    /// Replace the file at `path` with `content`, or leave it untouched.
    fn write_file_atomically(&self, path: &Path, content: &str) -> Result<()>;
}

/// [`FileWriter`] over the local filesystem: creates the parent directory,
/// writes a sibling temp file, then renames it over the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFileWriter;

impl FileWriter for FsFileWriter {
    fn write_file_atomically(&self, path: &Path, content: &str) -> Result<()> {
        let display = path.display().to_string();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    ChatError::file_write(
                        &display,
                        format!("Failed to create directory {}: {}", parent.display(), e),
                    )
                })?;
            }
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| ChatError::file_write(&display, "Path has no file name"))?;
        let mut tmp_name = std::ffi::OsString::from(".");
        tmp_name.push(file_name);
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        fs::write(&tmp_path, content).map_err(|e| {
            ChatError::file_write(&display, format!("Cannot write to file: {}", e))
        })?;
        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(ChatError::file_write(
                &display,
                format!("Cannot replace file: {}", e),
            ));
        }
        Ok(())
    }
}

/// The editor buffer currently open in the host.
pub trait ActiveBuffer {
    /// Replace the entire buffer text.
    fn replace_contents(&self, content: &str) -> Result<()>;
}

/// Asks the user to approve a file write after showing its preview.
pub trait EditConfirmer {
    fn confirm(&self, preview: &EditPreview) -> bool;
}

impl<F> EditConfirmer for F
where
    F: Fn(&EditPreview) -> bool,
{
    fn confirm(&self, preview: &EditPreview) -> bool {
        self(preview)
    }
}

/// What the user sees before a file write is applied.
#[derive(Debug, Clone)]
pub struct EditPreview {
    pub path: PathBuf,
    pub title: String,
    pub new_content: String,
    /// Unified diff against the file's current content (empty for new files).
    pub diff: String,
    pub is_new_file: bool,
}

impl EditPreview {
    pub fn new(path: &Path, new_content: &str) -> Self {
        let current = fs::read_to_string(path).ok();
        let is_new_file = current.is_none();
        let old = current.unwrap_or_default();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let diff = TextDiff::from_lines(old.as_str(), new_content)
            .unified_diff()
            .context_radius(3)
            .header(&format!("a/{}", name), &format!("b/{}", name))
            .to_string();

        Self {
            path: path.to_path_buf(),
            title: format!("Preview Changes - {}", name),
            new_content: new_content.to_string(),
            diff,
            is_new_file,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The action carried no edit.
    Nothing,
    ReplacedBuffer,
    Written { path: PathBuf, bytes: usize },
    /// The preview was rejected; nothing was written.
    Declined,
}

/// Applies [`EditAction`]s, gating file writes behind a confirmed preview.
pub struct EditApplier {
    writer: Box<dyn FileWriter>,
    confirmer: Box<dyn EditConfirmer>,
}

impl EditApplier {
    pub fn new(confirmer: impl EditConfirmer + 'static) -> Self {
        Self {
            writer: Box::new(FsFileWriter),
            confirmer: Box::new(confirmer),
        }
    }

    pub fn with_writer(mut self, writer: impl FileWriter + 'static) -> Self {
        self.writer = Box::new(writer);
        self
    }

    /// Apply `action` as a whole or not at all.
    pub fn apply(
        &self,
        action: &EditAction,
        buffer: Option<&dyn ActiveBuffer>,
    ) -> Result<ApplyOutcome> {
        match action.kind {
            EditKind::None => Ok(ApplyOutcome::Nothing),
            EditKind::ReplaceCurrentBuffer => {
                let buffer = buffer.ok_or(ChatError::NoActiveEditor)?;
                buffer.replace_contents(&action.new_content)?;
                tracing::info!("Replaced active buffer ({} bytes)", action.new_content.len());
                Ok(ApplyOutcome::ReplacedBuffer)
            }
            EditKind::WriteFile => {
                let path = action
                    .target_path
                    .as_deref()
                    .filter(|p| !p.as_os_str().is_empty())
                    .ok_or(ChatError::EmptyTargetPath)?;

                let preview = EditPreview::new(path, &action.new_content);
                if !self.confirmer.confirm(&preview) {
                    tracing::info!("Write to {} declined", path.display());
                    return Ok(ApplyOutcome::Declined);
                }

                self.writer.write_file_atomically(path, &action.new_content)?;
                tracing::info!("Wrote {}", path.display());
                Ok(ApplyOutcome::Written {
                    path: path.to_path_buf(),
                    bytes: action.new_content.len(),
                })
            }
        }
    }
}
