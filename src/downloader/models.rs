// Common data models for fetch operations

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One concrete way of satisfying a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Single-file video rendition (mp4 preferred)
    Video,
    /// Audio-only rendition (AAC preferred)
    Audio,
    /// Whatever the source offers, audio first
    Generic,
}

impl Strategy {
    /// yt-dlp format selector
    pub fn format_spec(&self) -> &'static str {
        match self {
            Self::Video => "best[ext=mp4]/best",
            Self::Audio => "bestaudio[acodec^=mp4a]/bestaudio[ext=m4a]/bestaudio/best",
            Self::Generic => "bestaudio/best",
        }
    }

    /// How the produced artifact is handed to the messaging layer
    pub fn media_kind(&self) -> MediaKind {
        match self {
            Self::Video => MediaKind::Video,
            Self::Audio | Self::Generic => MediaKind::Audio,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Options passed to the extraction client for one fetch attempt
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub strategy: Strategy,
    pub timeout: Duration,
    /// Extra HTTP headers (name, value)
    pub headers: Vec<(String, String)>,
    /// Directory owned by this attempt; the artifact must land inside it
    pub output_dir: PathBuf,
}

/// What the extraction client reports after a successful download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedMedia {
    pub path: PathBuf,
    pub id: String,
    pub title: String,
}

/// One search hit (flat extraction, nothing downloaded)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub id: String,
    pub title: String,
}

/// Working directory reserved for a single fetch attempt.
///
/// Removed with everything inside it when dropped, so an aborted or failed
/// attempt never leaves files behind.
#[derive(Debug)]
pub struct AttemptDir {
    path: PathBuf,
}

impl AttemptDir {
    pub fn create(root: &Path) -> io::Result<Self> {
        let path = root.join(uuid::Uuid::new_v4().simple().to_string());
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Transfer ownership of the directory to the artifact found inside it
    pub fn into_artifact(self, file: PathBuf) -> Artifact {
        Artifact { file, _dir: self }
    }
}

impl Drop for AttemptDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(dir = %self.path.display(), "attempt directory removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.path.display(), error = %e, "failed to remove attempt directory"),
        }
    }
}

/// A downloaded file, deleted together with its attempt directory on drop
#[derive(Debug)]
pub struct Artifact {
    file: PathBuf,
    _dir: AttemptDir,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn size(&self) -> io::Result<u64> {
        Ok(std::fs::metadata(&self.file)?.len())
    }
}

/// Successful result of one strategy
#[derive(Debug)]
pub struct Fetched {
    pub strategy: Strategy,
    pub id: String,
    pub title: String,
    pub artifact: Artifact,
}

impl Fetched {
    pub fn kind(&self) -> MediaKind {
        self.strategy.media_kind()
    }
}
