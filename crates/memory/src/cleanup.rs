//! Cleanup of named handlers and temporary files and directories.
//!
//! Every step is best effort: failures are logged and the remaining steps
//! still run.

use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

type Handler = Box<dyn Fn() + Send + Sync>;

/// Runs registered cleanup handlers and deletes tracked temporary paths.
#[derive(Default)]
pub struct ResourceCleanupManager {
    handlers: Mutex<Vec<(String, Handler)>>,
    temp_files: Mutex<Vec<PathBuf>>,
    temp_dirs: Mutex<Vec<PathBuf>>,
}

impl ResourceCleanupManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named handler. A handler with the same name is replaced.
    pub fn register_handler<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        let mut handlers = self.handlers.lock();
        handlers.retain(|(existing, _)| *existing != name);
        handlers.push((name, Box::new(handler)));
    }

    /// Track a temporary file for deletion.
    pub fn add_temp_file(&self, path: impl Into<PathBuf>) {
        push_unique(&self.temp_files, path.into());
    }

    /// Track a temporary directory for recursive deletion.
    pub fn add_temp_dir(&self, path: impl Into<PathBuf>) {
        push_unique(&self.temp_dirs, path.into());
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Delete tracked temporary files. Returns how many were removed.
    ///
    /// Files that are already gone count as removed; files that fail to
    /// delete stay tracked.
    pub fn cleanup_temp_files(&self) -> usize {
        let paths = std::mem::take(&mut *self.temp_files.lock());
        let (removed, failed) = remove_all(paths, |path| fs::remove_file(path));
        self.temp_files.lock().extend(failed);
        removed
    }

    /// Recursively delete tracked temporary directories. Returns how many
    /// were removed.
    pub fn cleanup_temp_dirs(&self) -> usize {
        let paths = std::mem::take(&mut *self.temp_dirs.lock());
        let (removed, failed) = remove_all(paths, |path| fs::remove_dir_all(path));
        self.temp_dirs.lock().extend(failed);
        removed
    }

    /// Run every handler, then delete temporary files and directories.
    pub fn cleanup_all(&self) {
        let handlers = std::mem::take(&mut *self.handlers.lock());
        for (name, handler) in &handlers {
            if panic::catch_unwind(AssertUnwindSafe(handler)).is_err() {
                tracing::warn!(handler = %name, "cleanup handler panicked");
            }
        }

        let files = self.cleanup_temp_files();
        let dirs = self.cleanup_temp_dirs();
        tracing::info!(
            handlers = handlers.len(),
            files,
            dirs,
            "resource cleanup finished"
        );
    }
}

impl std::fmt::Debug for ResourceCleanupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCleanupManager")
            .field("handlers", &self.handler_count())
            .field("temp_files", &self.temp_files.lock().len())
            .field("temp_dirs", &self.temp_dirs.lock().len())
            .finish()
    }
}

fn push_unique(paths: &Mutex<Vec<PathBuf>>, path: PathBuf) {
    let mut paths = paths.lock();
    if !paths.contains(&path) {
        paths.push(path);
    }
}

fn remove_all<F>(paths: Vec<PathBuf>, remove: F) -> (usize, Vec<PathBuf>)
where
    F: Fn(&Path) -> io::Result<()>,
{
    let mut removed = 0;
    let mut failed = Vec::new();
    for path in paths {
        match remove(&path) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => removed += 1,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove temporary path");
                failed.push(path);
            }
        }
    }
    (removed, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_temp_files_and_dirs_removed() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("swatch.tmp");
        fs::write(&file, b"rgb").unwrap();
        let dir = root.path().join("export");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested/palette.json"), b"[]").unwrap();

        let manager = ResourceCleanupManager::new();
        manager.add_temp_file(&file);
        manager.add_temp_file(&file);
        manager.add_temp_dir(&dir);

        assert_eq!(manager.cleanup_temp_files(), 1);
        assert_eq!(manager.cleanup_temp_dirs(), 1);
        assert!(!file.exists());
        assert!(!dir.exists());

        // Nothing left to remove
        assert_eq!(manager.cleanup_temp_files(), 0);
    }

    #[test]
    fn test_missing_paths_count_as_removed() {
        let root = tempfile::tempdir().unwrap();
        let manager = ResourceCleanupManager::new();
        manager.add_temp_file(root.path().join("never-created"));

        assert_eq!(manager.cleanup_temp_files(), 1);
    }

    #[test]
    fn test_cleanup_all_runs_handlers_despite_panic() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = ResourceCleanupManager::new();

        manager.register_handler("broken", || panic!("handler failed"));
        let counter = calls.clone();
        manager.register_handler("counter", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = calls.clone();
        manager.register_handler("counter", move || {
            counter.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(manager.handler_count(), 2);

        manager.cleanup_all();
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(manager.handler_count(), 0);
    }
}
