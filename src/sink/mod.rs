// pixmark/src/sink/mod.rs
//! Hierarchical write destinations.
//!
//! The exporter never touches a filesystem or object store directly. It only
//! creates directories, creates files inside them, writes bytes and closes
//! the handle, through the [`StorageSink`] trait.

mod fs;
mod memory;

pub use fs::FsSink;
pub use memory::MemorySink;

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The destination as a whole refuses writes.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A single entry was refused; the rest of the destination is still usable.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Destination unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl SinkError {
    /// A revoked grant or a vanished root; nothing further can be written.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SinkError::PermissionDenied(_) | SinkError::Unavailable(_)
        )
    }
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Opaque directory location inside a sink, as path segments from its root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DirHandle {
    segments: Vec<String>,
}

impl DirHandle {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn join(&self, name: &str) -> String {
        if self.segments.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.segments.join("/"), name)
        }
    }
}

impl fmt::Display for DirHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

pub trait FileWriteHandle: Send {
    /// May be called any number of times before `close`.
    fn write(&mut self, bytes: &[u8]) -> SinkResult<()>;

    fn close(self: Box<Self>) -> SinkResult<()>;
}

pub trait StorageSink: Send + Sync {
    fn root(&self) -> DirHandle {
        DirHandle::root()
    }

    /// Create-if-absent.
    fn create_directory(&self, parent: &DirHandle, name: &str) -> SinkResult<DirHandle>;

    /// Create-or-truncate.
    fn create_file(&self, dir: &DirHandle, name: &str) -> SinkResult<Box<dyn FileWriteHandle>>;
}

/// Creates `name` in `dir`, writes `bytes` and closes the handle on every path.
pub fn write_file(
    sink: &dyn StorageSink,
    dir: &DirHandle,
    name: &str,
    bytes: &[u8],
) -> SinkResult<()> {
    let mut handle = sink.create_file(dir, name)?;
    let written = handle.write(bytes);
    let closed = handle.close();
    written?;
    closed?;
    log::debug!("Wrote {} ({} bytes)", dir.join(name), bytes.len());
    Ok(())
}

pub(crate) fn validate_name(name: &str) -> SinkResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(SinkError::InvalidName(format!("'{}'", name)));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(SinkError::InvalidName(format!(
            "'{}' contains a path separator",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_handle_paths() {
        let root = DirHandle::root();
        assert_eq!(root.join("a.txt"), "a.txt");
        let images = root.child("p").child("images");
        assert_eq!(images.join("cover.jpg"), "p/images/cover.jpg");
        assert_eq!(images.to_string(), "/p/images");
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("封面图片.jpg").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
    }

    #[test]
    fn write_file_closes_handle_when_write_fails() {
        let sink = MemorySink::new();
        sink.fail_writes_to("broken.txt");
        let dir = sink.create_directory(&sink.root(), "d").unwrap();

        assert!(write_file(&sink, &dir, "broken.txt", b"x").is_err());
        assert_eq!(sink.open_handles(), 0);
        assert!(write_file(&sink, &dir, "ok.txt", b"x").is_ok());
        assert_eq!(sink.open_handles(), 0);
    }

    #[test]
    fn fatal_errors() {
        assert!(SinkError::PermissionDenied("x".into()).is_fatal());
        assert!(SinkError::Unavailable("x".into()).is_fatal());
        assert!(!SinkError::AccessDenied("x".into()).is_fatal());
        assert!(!SinkError::Backend("x".into()).is_fatal());
    }
}
