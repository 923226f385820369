// THEORY:
// The frame cache remembers one thing: the path of the last image that loaded
// successfully. It is read once when a session starts (to restore the previous
// image) and written once per successful load. The file holds a plain UTF-8 path
// with no trailing structure; only the first line is read back.

use crate::error::ProcessorResult;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CACHE_FILE_NAME: &str = "last.txt";
pub const APP_DIR_NAME: &str = "Image Processor";

/// The last-loaded-image path, persisted in a single text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameCache {
    dir: PathBuf,
}

impl FrameCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Per-user application data directory, falling back to the working directory.
    pub fn default_dir() -> PathBuf {
        let base = std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("XDG_DATA_HOME").map(PathBuf::from))
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local").join("share")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join(APP_DIR_NAME)
    }

    pub fn file_path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE_NAME)
    }

    /// The cached path, or `None` when nothing (or only whitespace) is cached.
    pub fn read(&self) -> ProcessorResult<Option<PathBuf>> {
        let file = self.file_path();
        if !file.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&file)?;
        let line = contents.lines().next().unwrap_or_default().trim();
        debug!(cache = %file.display(), cached = line, "read frame cache");
        Ok((!line.is_empty()).then(|| PathBuf::from(line)))
    }

    /// Replaces the cached path. Relative paths are resolved against the working
    /// directory first, so a later session started elsewhere still finds the image.
    pub fn write(&self, image_path: &Path) -> ProcessorResult<()> {
        let image_path = std::path::absolute(image_path)?;
        fs::create_dir_all(&self.dir)?;
        let file = self.file_path();
        fs::write(&file, image_path.to_string_lossy().as_bytes())?;
        debug!(cache = %file.display(), path = %image_path.display(), "wrote frame cache");
        Ok(())
    }

    /// The cached path if it still names an existing file. Read failures are logged
    /// and treated as an empty cache.
    pub fn restorable(&self) -> Option<PathBuf> {
        match self.read() {
            Ok(Some(path)) if path.is_file() => Some(path),
            Ok(Some(path)) => {
                debug!(path = %path.display(), "cached image no longer exists");
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "could not read frame cache");
                None
            }
        }
    }
}
