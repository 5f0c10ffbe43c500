//! File persistence for blocks, carriers and decrypted files.

use anyhow::{Context, Result};
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A file the CLI reads input from or writes output to.
///
/// Writes are atomic: readers see either the previous content or the new
/// content, never a partial file.
#[derive(Clone, Debug)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).with_context(|| format!("failed to read {}", self.path.display()))
    }

    pub fn load_string(&self) -> Result<String> {
        let bytes = self.load()?;
        String::from_utf8(bytes)
            .with_context(|| format!("{} is not valid UTF-8", self.path.display()))
    }

    /// Writes `data` through a temporary sibling file that is synced and
    /// renamed over the target. Parent directories are created as needed.
    pub fn save(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.random_tmp_path()?;

        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .context("failed to create temporary file")?;

        tmp_file.write_all(data)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e).with_context(|| format!("failed to write {}", self.path.display()));
        }

        // Directories cannot be opened for syncing on Windows.
        #[cfg(unix)]
        {
            if let Some(parent) = self.parent() {
                File::open(parent)?.sync_all()?;
            }
        }

        Ok(())
    }

    fn parent(&self) -> Option<&Path> {
        self.path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
    }

    /// `<file name>.tmp.<16 hex chars>` next to the target.
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8];
        fill(&mut buf).map_err(|_| anyhow::anyhow!("OS random generator unavailable"))?;

        let suffix = buf.iter().map(|b| format!("{b:02x}")).collect::<String>();
        let file_name = self
            .path
            .file_name()
            .context("output path has no file name")?
            .to_string_lossy();

        Ok(self.path.with_file_name(format!("{file_name}.tmp.{suffix}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_returns_written_data() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("block.txt"));

        storage.save(b"hello world").unwrap();
        assert_eq!(storage.load().unwrap(), b"hello world");
    }

    #[test]
    fn load_fails_if_file_does_not_exist() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("missing.png"));

        assert!(!storage.exists());
        assert!(storage.load().is_err());
    }

    #[test]
    fn load_string_rejects_binary() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("bin"));

        storage.save(&[0xff, 0xfe, 0x00]).unwrap();
        assert!(storage.load_string().is_err());
    }

    #[test]
    fn save_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.png");
        let storage = Storage::new(&path);

        storage.save(b"first").unwrap();
        storage.save(b"second").unwrap();

        assert_eq!(fs::read(path).unwrap(), b"second");
    }

    #[test]
    fn tmp_file_is_removed_after_success() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("out.png"));
        storage.save(b"data").unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();

        assert_eq!(entries, vec!["out.png"]);
    }

    #[test]
    fn tmp_names_are_unique_siblings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.png");
        let storage = Storage::new(&path);

        let a = storage.random_tmp_path().unwrap();
        let b = storage.random_tmp_path().unwrap();

        assert_ne!(a, b);
        assert_ne!(a, path);
        assert_eq!(a.parent(), path.parent());
    }

    #[test]
    fn parent_directory_is_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("secret.txt");

        Storage::new(&nested).save(b"data").unwrap();
        assert!(nested.exists());
    }
}
