//! Ownership of the generated audio.
//!
//! A session holds at most one generated artifact. Storing a new one releases
//! the previous file, and dropping the store releases whatever is left.

use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Suggested filename when saving the generated audio.
pub const DEFAULT_DOWNLOAD_NAME: &str = "output.wav";

/// A generated audio file owned by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub len: usize,
}

/// Keeps the single live artifact of a session.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    current: Option<Artifact>,
    generation: u64,
}

impl ArtifactStore {
    /// Creates the store, making `dir` if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| anyhow!("Failed to create artifact directory {}: {e}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            current: None,
            generation: 0,
        })
    }

    /// Store under the system temp dir, scoped to this process.
    pub fn for_process() -> Result<Self> {
        Self::new(&std::env::temp_dir().join(format!("charade-{}", std::process::id())))
    }

    /// Writes new generated audio and releases the previous artifact.
    pub fn replace(&mut self, bytes: &[u8]) -> Result<&Artifact> {
        self.generation += 1;
        let path = self.dir.join(format!("artifact-{}.wav", self.generation));
        fs::write(&path, bytes)
            .map_err(|e| anyhow!("Failed to store generated audio: {e}"))?;

        let previous = self.current.replace(Artifact {
            path,
            len: bytes.len(),
        });
        if let Some(old) = previous {
            release_file(&old.path);
        }

        let artifact = self
            .current
            .as_ref()
            .ok_or_else(|| anyhow!("Artifact vanished after store"))?;
        tracing::debug!(
            "Artifact stored: {} ({} bytes)",
            artifact.path.display(),
            artifact.len
        );
        Ok(artifact)
    }

    pub fn current(&self) -> Option<&Artifact> {
        self.current.as_ref()
    }

    /// Reads the live artifact back.
    pub fn read(&self) -> Result<Vec<u8>> {
        let artifact = self
            .current
            .as_ref()
            .ok_or_else(|| anyhow!("Nothing has been generated yet"))?;
        Ok(fs::read(&artifact.path)?)
    }

    /// Copies the live artifact to `dest`.
    pub fn save_as(&self, dest: &Path) -> Result<()> {
        let artifact = self
            .current
            .as_ref()
            .ok_or_else(|| anyhow!("Nothing has been generated yet"))?;
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&artifact.path, dest)
            .map_err(|e| anyhow!("Failed to save to {}: {e}", dest.display()))?;
        tracing::info!("Generated audio saved to {}", dest.display());
        Ok(())
    }

    /// Deletes the live artifact, if any.
    pub fn release(&mut self) {
        if let Some(artifact) = self.current.take() {
            release_file(&artifact.path);
        }
    }

    /// Number of artifact files currently on disk in the store directory.
    #[cfg(test)]
    fn live_files(&self) -> usize {
        fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_name().to_string_lossy().starts_with("artifact-"))
                    .count()
            })
            .unwrap_or(0)
    }
}

impl Drop for ArtifactStore {
    fn drop(&mut self) {
        self.release();
        // Only removes the directory if nothing else was put there.
        let _ = fs::remove_dir(&self.dir);
    }
}

fn release_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!("Released artifact {}", path.display()),
        Err(e) => tracing::warn!("Failed to release artifact {}: {}", path.display(), e),
    }
}

/// Where the most recent generated audio is kept for `charade play`.
pub fn last_output_path() -> Result<PathBuf> {
    let data_dir = dirs::home_dir()
        .ok_or_else(|| anyhow!("Could not determine home directory"))?
        .join(".local")
        .join("share")
        .join("charade");
    fs::create_dir_all(&data_dir)?;
    Ok(data_dir.join("last-output.wav"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_generation_replaces_first() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("artifacts");
        let mut store = ArtifactStore::new(&store_dir).unwrap();
        assert!(store.current().is_none());

        let first = store.replace(b"RIFF first").unwrap().clone();
        assert_eq!(store.live_files(), 1);
        assert!(first.path.exists());

        let second = store.replace(b"RIFF second take").unwrap().clone();
        assert_eq!(store.live_files(), 1);
        assert!(!first.path.exists());
        assert_ne!(first.path, second.path);
        assert_eq!(second.len, 16);
        assert_eq!(store.read().unwrap(), b"RIFF second take");
    }

    #[test]
    fn test_save_as_copies_current() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(&dir.path().join("artifacts")).unwrap();

        let dest = dir.path().join("out").join(DEFAULT_DOWNLOAD_NAME);
        assert!(store.save_as(&dest).is_err());

        store.replace(b"RIFFdata").unwrap();
        store.save_as(&dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"RIFFdata");
    }

    #[test]
    fn test_drop_releases_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("artifacts");
        let path = {
            let mut store = ArtifactStore::new(&store_dir).unwrap();
            store.replace(b"RIFF").unwrap().path.clone()
        };
        assert!(!path.exists());
        assert!(!store_dir.exists());
    }
}
