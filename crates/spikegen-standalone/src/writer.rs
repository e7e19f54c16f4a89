//! Idempotent project writer.
//!
//! Files whose content is unchanged are not rewritten, so repeated builds
//! leave timestamps alone and `make` only recompiles what changed.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, StandaloneError};

/// Outcome of writing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Written,
    Unchanged,
}

/// Writes files below a project root and remembers them in first-write order.
#[derive(Debug, Clone)]
pub struct ProjectWriter {
    root: PathBuf,
    files: Vec<(String, WriteStatus)>,
}

impl ProjectWriter {
    /// Create `root` if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StandaloneError::Io {
            path: root.clone(),
            source: e,
        })?;
        Ok(Self {
            root,
            files: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `contents` to `relative` (a `/`-separated path) unless the file
    /// already holds exactly that content.
    pub fn write(&mut self, relative: &str, contents: &str) -> Result<WriteStatus> {
        let path = self.path_of(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StandaloneError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let status = match std::fs::read(&path) {
            Ok(existing) if existing == contents.as_bytes() => WriteStatus::Unchanged,
            _ => {
                std::fs::write(&path, contents).map_err(|e| StandaloneError::Io {
                    path: path.clone(),
                    source: e,
                })?;
                WriteStatus::Written
            }
        };
        debug!(file = relative, ?status, "project file");

        match self.files.iter_mut().find(|(name, _)| name == relative) {
            Some(entry) => entry.1 = status,
            None => self.files.push((relative.to_string(), status)),
        }
        Ok(status)
    }

    /// Create an empty directory below the root.
    pub fn create_dir(&self, relative: &str) -> Result<()> {
        let path = self.path_of(relative);
        std::fs::create_dir_all(&path).map_err(|source| StandaloneError::Io { path, source })
    }

    /// Every file handled so far, in first-write order.
    pub fn files(&self) -> impl Iterator<Item = (&str, WriteStatus)> {
        self.files.iter().map(|(name, status)| (name.as_str(), *status))
    }

    /// Files with extension `ext`, in first-write order.
    pub fn sources(&self, ext: &str) -> Vec<&str> {
        self.files
            .iter()
            .map(|(name, _)| name.as_str())
            .filter(|name| Path::new(name).extension().is_some_and(|e| e == ext))
            .collect()
    }

    pub fn written(&self) -> Vec<String> {
        self.with_status(WriteStatus::Written)
    }

    pub fn unchanged(&self) -> Vec<String> {
        self.with_status(WriteStatus::Unchanged)
    }

    fn with_status(&self, wanted: WriteStatus) -> Vec<String> {
        self.files
            .iter()
            .filter(|(_, status)| *status == wanted)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn path_of(&self, relative: &str) -> PathBuf {
        relative.split('/').fold(self.root.clone(), |path, part| path.join(part))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ProjectWriter::new(dir.path().join("out")).unwrap();
        assert_eq!(writer.write("objects/a.cpp", "int a;\n").unwrap(), WriteStatus::Written);

        let mut again = ProjectWriter::new(dir.path().join("out")).unwrap();
        assert_eq!(again.write("objects/a.cpp", "int a;\n").unwrap(), WriteStatus::Unchanged);
        assert_eq!(again.write("objects/a.cpp", "int b;\n").unwrap(), WriteStatus::Written);
        let text = std::fs::read_to_string(dir.path().join("out/objects/a.cpp")).unwrap();
        assert_eq!(text, "int b;\n");
    }

    #[test]
    fn sources_keep_first_write_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ProjectWriter::new(dir.path()).unwrap();
        writer.write("main.cpp", "").unwrap();
        writer.write("arrays.h", "").unwrap();
        writer.write("objects/z.cpp", "").unwrap();
        writer.write("main.cpp", "int main() {}\n").unwrap();
        assert_eq!(writer.sources("cpp"), vec!["main.cpp", "objects/z.cpp"]);
        assert_eq!(writer.files().count(), 3);
    }

    #[test]
    fn written_and_unchanged_are_tracked_separately() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kept.txt"), "same").unwrap();
        let mut writer = ProjectWriter::new(dir.path()).unwrap();
        writer.write("kept.txt", "same").unwrap();
        writer.write("fresh.txt", "new").unwrap();
        assert_eq!(writer.unchanged(), vec!["kept.txt"]);
        assert_eq!(writer.written(), vec!["fresh.txt"]);
    }

    #[test]
    fn directories_can_be_created_empty() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ProjectWriter::new(dir.path()).unwrap();
        writer.create_dir("results").unwrap();
        assert!(dir.path().join("results").is_dir());
    }

    #[test]
    fn directory_errors_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("results"), "not a directory").unwrap();
        let writer = ProjectWriter::new(dir.path()).unwrap();
        let err = writer.create_dir("results/run1").unwrap_err();
        match err {
            StandaloneError::Io { path, .. } => assert_eq!(path, dir.path().join("results/run1")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
