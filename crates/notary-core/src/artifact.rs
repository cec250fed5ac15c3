//! Artifacts accepted for notarization.
//!
//! [`Artifact::open`] validates the file extension before touching the file
//! contents, then hashes the file in 64 KiB chunks. The resulting digest is
//! the one sent in the submission request, so it must be computed from the
//! same bytes the uploader later streams.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncReadExt;

/// File extensions the service accepts, compared case-insensitively.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["zip", "dmg"];

const READ_CHUNK: usize = 64 * 1024;

/// Errors raised while preparing an artifact.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArtifactError {
    /// The file extension is not one the service accepts.
    #[error("unsupported artifact {path}: expected .zip or .dmg")]
    UnsupportedExtension {
        /// Offending path.
        path: PathBuf,
    },

    /// The path has no final component to use as submission name.
    #[error("artifact path {path} has no file name")]
    MissingFileName {
        /// Offending path.
        path: PathBuf,
    },

    /// The file could not be read.
    #[error("failed to read artifact {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// A validated artifact and its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    file_name: String,
    size: u64,
    sha256: String,
}

impl Artifact {
    /// Validates and hashes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::UnsupportedExtension`] without opening the
    /// file when the extension is not accepted, or [`ArtifactError::Io`]
    /// when reading fails.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let file_name = validate(path)?;

        let io_error = |source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::open(path).await.map_err(io_error)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0_u8; READ_CHUNK];
        let mut size = 0_u64;
        loop {
            let read = file.read(&mut buffer).await.map_err(io_error)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            size += read as u64;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            size,
            sha256: hex::encode(hasher.finalize()),
        })
    }

    /// Location on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, used as the submission name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Size in bytes at hashing time.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Lowercase hex SHA-256 of the contents.
    #[must_use]
    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

/// Returns true when `path` has an accepted extension.
#[must_use]
pub fn has_accepted_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
}

fn validate(path: &Path) -> Result<String, ArtifactError> {
    if !has_accepted_extension(path) {
        return Err(ArtifactError::UnsupportedExtension {
            path: path.to_path_buf(),
        });
    }
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ArtifactError::MissingFileName {
            path: path.to_path_buf(),
        })
}
