//! Atomic write-then-rename file persistence.
//!
//! A reader of the target path observes either the previous contents or the
//! new contents, never a partial write: the bytes go to a temporary sibling
//! first, are fsynced, and the sibling is renamed over the target.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `bytes` to `path` atomically.
///
/// The temporary sibling lives next to the target (`<path>.tmp`) so the
/// rename stays within one filesystem.
pub fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let temp_path = temp_sibling(path);

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()?;

    fs::rename(&temp_path, path)?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_new_file() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("record.json");

        write_file_atomic(&path, b"hello").expect("write");

        assert_eq!(fs::read(&path).expect("read"), b"hello");
        assert!(!temp_sibling(&path).exists(), "temp sibling left behind");
    }

    #[test]
    fn replaces_existing_contents() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("record.json");

        write_file_atomic(&path, b"first").expect("first write");
        write_file_atomic(&path, b"second, longer contents").expect("second write");

        assert_eq!(fs::read(&path).expect("read"), b"second, longer contents");
    }

    #[test]
    fn crash_before_rename_preserves_previous_contents() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("record.json");

        write_file_atomic(&path, b"committed").expect("write");

        // Simulate a crash between the temp-file write and the rename: the
        // sibling holds a truncated write that never got renamed.
        fs::write(temp_sibling(&path), b"tru").expect("write stray temp");

        assert_eq!(
            fs::read(&path).expect("read"),
            b"committed",
            "target must still hold the previous valid contents"
        );

        // A later successful write supersedes the stray temp file.
        write_file_atomic(&path, b"recovered").expect("rewrite");
        assert_eq!(fs::read(&path).expect("read"), b"recovered");
        assert!(!temp_sibling(&path).exists());
    }
}
