//! Filesystem access behind a trait, so ruleset writes can be mocked.

use std::io;
use std::path::Path;

#[cfg(test)]
use mockall::automock;

/// Filesystem operations used by the activator and the CLI.
///
/// # Example (testing)
/// ```ignore
/// let mut mock_fs = MockFileSystem::new();
/// mock_fs.expect_write().returning(|_, _| Ok(()));
/// ```
#[cfg_attr(test, automock)]
pub trait FileSystem: Send + Sync {
    /// Write bytes to a file, truncating any previous content.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Create a directory and all missing parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// `std::fs` implementation.
#[derive(Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }
}
