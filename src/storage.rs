use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// An uploaded file staged in the scratch directory for the duration of a
/// single request.
///
/// The path is keyed by the (sanitized) client-supplied filename. Removal
/// happens exactly once: either through [`ScratchFile::remove`] on the
/// normal paths, or through the `Drop` guard if the request is aborted
/// before reaching one of them.
pub struct ScratchFile {
    path: PathBuf,
    file: Option<File>,
    removed: bool,
}

impl ScratchFile {
    pub async fn create(dir: &Path, filename: &str) -> io::Result<Self> {
        // Strip any directory components to prevent path traversal.
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid filename"))?;

        fs::create_dir_all(dir).await?;

        let path = dir.join(name);
        let file = File::create(&path).await?;

        Ok(ScratchFile {
            path,
            file: Some(file),
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|ext| ext.to_str())
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(chunk).await,
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "scratch file already finished",
            )),
        }
    }

    /// Flushes and closes the write handle. Must be called before the file
    /// is handed to a collaborator.
    pub async fn finish(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        Ok(())
    }

    /// Deletes the staged file. Failure to delete is logged, not surfaced:
    /// the request outcome was already decided at this point.
    pub async fn remove(mut self) {
        self.file.take();
        self.removed = true;
        if let Err(e) = fs::remove_file(&self.path).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove scratch file {}: {}", self.path.display(), e);
            }
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        self.file.take();
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    "Failed to remove scratch file {} on drop: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}
