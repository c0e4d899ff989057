use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Result, VerbumError};
use crate::hierarchy::is_openable_document;

/// The external pane that displays an opened document.
pub trait DocumentViewer: Send + Sync {
    fn show(&self, path: &str, content: &[u8]) -> Result<()>;
}

/// Saves the document to a scratch directory and hands it to the desktop's default opener.
#[derive(Debug, Clone)]
pub struct SystemViewer {
    scratch: PathBuf,
}

impl SystemViewer {
    pub fn new() -> Self {
        Self::with_scratch(std::env::temp_dir().join("verbum"))
    }

    pub fn with_scratch(scratch: impl Into<PathBuf>) -> Self {
        Self {
            scratch: scratch.into(),
        }
    }

    /// Write `content` under the scratch directory, keeping the document's file name.
    pub fn stage(&self, path: &str, content: &[u8]) -> Result<PathBuf> {
        let file_name = Path::new(path)
            .file_name()
            .ok_or_else(|| VerbumError::UnsupportedDocument {
                path: path.to_string(),
            })?;
        fs::create_dir_all(&self.scratch)?;
        let staged = self.scratch.join(file_name);
        fs::write(&staged, content)?;
        Ok(staged)
    }

    fn opener(target: &Path) -> Command {
        #[cfg(target_os = "macos")]
        {
            let mut command = Command::new("open");
            command.arg(target);
            command
        }
        #[cfg(target_os = "windows")]
        {
            let mut command = Command::new("cmd");
            command.args(["/C", "start", ""]).arg(target);
            command
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            let mut command = Command::new("xdg-open");
            command.arg(target);
            command
        }
    }
}

impl Default for SystemViewer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentViewer for SystemViewer {
    fn show(&self, path: &str, content: &[u8]) -> Result<()> {
        if !is_openable_document(path) {
            return Err(VerbumError::UnsupportedDocument {
                path: path.to_string(),
            });
        }
        let staged = self.stage(path, content)?;
        tracing::info!("Opening {} with the system viewer", staged.display());
        launch(Self::opener(&staged))
    }
}

/// Run the opener to completion so it is reaped. Desktop openers hand the
/// file to the viewer and exit.
fn launch(mut command: Command) -> Result<()> {
    let status = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?
        .wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(VerbumError::ViewerFailed {
            status: status.to_string(),
        })
    }
}
