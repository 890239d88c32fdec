// pixmark/src/sink/memory.rs
use super::{validate_name, DirHandle, FileWriteHandle, SinkError, SinkResult, StorageSink};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct State {
    directories: Vec<String>,
    files: BTreeMap<String, Vec<u8>>,
    failing_directories: HashSet<String>,
    failing_files: HashSet<String>,
    denied_files: HashSet<String>,
    failing_writes: HashSet<String>,
    revoked: bool,
    open_handles: usize,
}

impl State {
    fn has_directory(&self, dir: &DirHandle) -> bool {
        dir.segments().is_empty() || self.directories.contains(&dir.segments().join("/"))
    }

    fn check_access(&self) -> SinkResult<()> {
        if self.revoked {
            return Err(SinkError::PermissionDenied(
                "destination grant was revoked".to_string(),
            ));
        }
        Ok(())
    }
}

/// In-memory sink with fault injection, for tests and embedders.
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<State>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Directory creation fails for any directory with this name.
    pub fn fail_directory(&self, name: &str) {
        self.lock().failing_directories.insert(name.to_string());
    }

    /// File creation fails for any file with this name.
    pub fn fail_file(&self, name: &str) {
        self.lock().failing_files.insert(name.to_string());
    }

    /// File creation is refused with `AccessDenied` for any file with this name.
    pub fn deny_file(&self, name: &str) {
        self.lock().denied_files.insert(name.to_string());
    }

    /// File creation succeeds but writes fail for any file with this name.
    pub fn fail_writes_to(&self, name: &str) {
        self.lock().failing_writes.insert(name.to_string());
    }

    /// Every later operation fails with `PermissionDenied`.
    pub fn revoke(&self) {
        self.lock().revoked = true;
    }

    /// Directories in creation order, as `a/b` paths.
    pub fn directories(&self) -> Vec<String> {
        self.lock().directories.clone()
    }

    pub fn has_directory(&self, path: &str) -> bool {
        self.lock().directories.iter().any(|dir| dir == path)
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    pub fn open_handles(&self) -> usize {
        self.lock().open_handles
    }
}

impl StorageSink for MemorySink {
    fn create_directory(&self, parent: &DirHandle, name: &str) -> SinkResult<DirHandle> {
        validate_name(name)?;
        let mut state = self.lock();
        state.check_access()?;

        if !state.has_directory(parent) {
            return Err(SinkError::NotFound(parent.to_string()));
        }
        if state.failing_directories.contains(name) {
            return Err(SinkError::Backend(format!(
                "cannot create directory {}",
                parent.join(name)
            )));
        }

        let dir = parent.child(name);
        let path = dir.segments().join("/");
        if !state.directories.contains(&path) {
            state.directories.push(path);
        }
        Ok(dir)
    }

    fn create_file(&self, dir: &DirHandle, name: &str) -> SinkResult<Box<dyn FileWriteHandle>> {
        validate_name(name)?;
        let mut state = self.lock();
        state.check_access()?;

        if !state.has_directory(dir) {
            return Err(SinkError::NotFound(dir.to_string()));
        }
        if state.failing_files.contains(name) {
            return Err(SinkError::Backend(format!(
                "cannot create file {}",
                dir.join(name)
            )));
        }
        if state.denied_files.contains(name) {
            return Err(SinkError::AccessDenied(dir.join(name)));
        }

        let path = dir.join(name);
        state.files.insert(path.clone(), Vec::new());
        state.open_handles += 1;

        Ok(Box::new(MemoryFile {
            state: Arc::clone(&self.state),
            fail_writes: state.failing_writes.contains(name),
            path,
        }))
    }
}

struct MemoryFile {
    state: Arc<Mutex<State>>,
    path: String,
    fail_writes: bool,
}

impl FileWriteHandle for MemoryFile {
    fn write(&mut self, bytes: &[u8]) -> SinkResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.check_access()?;

        if self.fail_writes {
            return Err(SinkError::Backend(format!("write to {} failed", self.path)));
        }

        state
            .files
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    fn close(self: Box<Self>) -> SinkResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.open_handles = state.open_handles.saturating_sub(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_nested_directories_and_files() {
        let sink = MemorySink::new();
        let product = sink.create_directory(&sink.root(), "p").unwrap();
        let images = sink.create_directory(&product, "images").unwrap();

        let mut file = sink.create_file(&images, "cover.jpg").unwrap();
        file.write(b"ab").unwrap();
        file.write(b"cd").unwrap();
        file.close().unwrap();

        assert_eq!(sink.directories(), vec!["p", "p/images"]);
        assert_eq!(sink.file("p/images/cover.jpg").unwrap(), b"abcd");
        assert_eq!(sink.open_handles(), 0);
    }

    #[test]
    fn directory_creation_is_idempotent() {
        let sink = MemorySink::new();
        sink.create_directory(&sink.root(), "p").unwrap();
        sink.create_directory(&sink.root(), "p").unwrap();
        assert_eq!(sink.directories().len(), 1);
    }

    #[test]
    fn create_file_truncates() {
        let sink = MemorySink::new();
        let root = sink.root();
        super::super::write_file(&sink, &root, "a.txt", b"long content").unwrap();
        super::super::write_file(&sink, &root, "a.txt", b"short").unwrap();
        assert_eq!(sink.file("a.txt").unwrap(), b"short");
    }

    #[test]
    fn missing_parent_is_not_found() {
        let sink = MemorySink::new();
        let ghost = DirHandle::root().child("ghost");
        assert!(matches!(
            sink.create_directory(&ghost, "x"),
            Err(SinkError::NotFound(_))
        ));
    }

    #[test]
    fn denied_file_is_not_fatal() {
        let sink = MemorySink::new();
        sink.deny_file("secret.txt");
        let err = match sink.create_file(&sink.root(), "secret.txt") {
            Err(e) => e,
            Ok(_) => panic!("expected access to be denied"),
        };
        assert!(matches!(err, SinkError::AccessDenied(_)));
        assert!(!err.is_fatal());
        assert_eq!(sink.open_handles(), 0);
    }

    #[test]
    fn revoked_sink_denies_everything() {
        let sink = MemorySink::new();
        sink.revoke();
        let err = sink.create_directory(&sink.root(), "p").unwrap_err();
        assert!(err.is_fatal());
    }
}
