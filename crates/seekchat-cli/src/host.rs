use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use seekchat_core::edit::{ActiveBuffer, EditConfirmer, EditPreview, FileWriter, FsFileWriter};

/// The file passed with `--file`, standing in for the editor's open buffer.
pub struct FileBuffer {
    path: PathBuf,
}

impl FileBuffer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ActiveBuffer for FileBuffer {
    fn replace_contents(&self, content: &str) -> seekchat_core::Result<()> {
        FsFileWriter.write_file_atomically(&self.path, content)
    }
}

/// One line-oriented input shared by the prompt loop and edit confirmations,
/// so neither can buffer away lines meant for the other.
#[derive(Clone)]
pub struct LineReader {
    inner: Arc<Mutex<Box<dyn BufRead + Send>>>,
}

impl LineReader {
    pub fn stdin() -> Self {
        Self::from_reader(io::BufReader::new(io::stdin()))
    }

    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(reader))),
        }
    }

    /// Next line without its line ending; `None` at end of input.
    pub fn read_line(&self) -> io::Result<Option<String>> {
        let mut reader = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    /// [`LineReader::read_line`] off the async runtime's worker threads.
    pub async fn next_line(&self) -> io::Result<Option<String>> {
        let reader = self.clone();
        tokio::task::spawn_blocking(move || reader.read_line())
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

/// Shows the diff on stderr and reads the answer from the shared input.
pub struct PromptConfirmer {
    lines: LineReader,
}

impl PromptConfirmer {
    pub fn new(lines: LineReader) -> Self {
        Self { lines }
    }
}

impl EditConfirmer for PromptConfirmer {
    fn confirm(&self, preview: &EditPreview) -> bool {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "\n── {} ──", preview.title);
        if preview.is_new_file {
            let _ = writeln!(err, "(new file: {})", preview.path.display());
        }
        let _ = write!(err, "{}", preview.diff);
        let _ = write!(err, "Apply changes to {}? [y/N] ", preview.path.display());
        let _ = err.flush();
        drop(err);

        match self.lines.read_line() {
            Ok(Some(answer)) => is_yes(&answer),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Could not read confirmation: {}", e);
                false
            }
        }
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
