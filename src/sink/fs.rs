// pixmark/src/sink/fs.rs
use super::{validate_name, DirHandle, FileWriteHandle, SinkError, SinkResult, StorageSink};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

/// Sink rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    /// Creates the root directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> SinkResult<Self> {
        let root = root.into();

        if root.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(SinkError::InvalidName(format!(
                "path traversal detected in sink root: {}",
                root.display()
            )));
        }

        if root.exists() && !root.is_dir() {
            return Err(SinkError::InvalidName(format!(
                "sink root exists but is not a directory: {}",
                root.display()
            )));
        }

        fs::create_dir_all(&root).map_err(|e| map_io(e, &root, &root))?;
        Ok(Self { root })
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, dir: &DirHandle) -> SinkResult<PathBuf> {
        if !self.root.is_dir() {
            return Err(SinkError::Unavailable(format!(
                "sink root {} no longer exists",
                self.root.display()
            )));
        }

        let mut path = self.root.clone();
        for segment in dir.segments() {
            validate_name(segment)?;
            path.push(segment);
        }
        Ok(path)
    }
}

/// Permission errors on the root or its direct entries mean the root refuses writes;
/// deeper ones only affect that entry.
fn map_io(error: io::Error, path: &Path, root: &Path) -> SinkError {
    let at_root = path == root || path.parent() == Some(root);
    match error.kind() {
        io::ErrorKind::PermissionDenied if at_root => {
            SinkError::PermissionDenied(path.display().to_string())
        }
        _ => map_entry_io(error, path),
    }
}

fn map_entry_io(error: io::Error, path: &Path) -> SinkError {
    match error.kind() {
        io::ErrorKind::PermissionDenied => SinkError::AccessDenied(path.display().to_string()),
        io::ErrorKind::NotFound => SinkError::NotFound(path.display().to_string()),
        _ => SinkError::Io(error),
    }
}

impl StorageSink for FsSink {
    fn create_directory(&self, parent: &DirHandle, name: &str) -> SinkResult<DirHandle> {
        validate_name(name)?;
        let parent_path = self.resolve(parent)?;
        if !parent_path.is_dir() {
            return Err(SinkError::NotFound(parent_path.display().to_string()));
        }

        let path = parent_path.join(name);
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => {}
            Err(e) => return Err(map_io(e, &path, &self.root)),
        }

        log::debug!("Created directory {}", path.display());
        Ok(parent.child(name))
    }

    fn create_file(&self, dir: &DirHandle, name: &str) -> SinkResult<Box<dyn FileWriteHandle>> {
        validate_name(name)?;
        let path = self.resolve(dir)?.join(name);
        let file = File::create(&path).map_err(|e| map_io(e, &path, &self.root))?;

        Ok(Box::new(FsFile {
            writer: BufWriter::new(file),
            path,
        }))
    }
}

struct FsFile {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl FileWriteHandle for FsFile {
    fn write(&mut self, bytes: &[u8]) -> SinkResult<()> {
        self.writer
            .write_all(bytes)
            .map_err(|e| map_entry_io(e, &self.path))
    }

    fn close(self: Box<Self>) -> SinkResult<()> {
        let FsFile { writer, path } = *self;
        let file = writer
            .into_inner()
            .map_err(|e| map_entry_io(e.into_error(), &path))?;
        file.sync_all().map_err(|e| map_entry_io(e, &path))
    }
}

#[cfg(test)]
mod tests {
    use super::super::write_file;
    use super::*;

    #[test]
    fn writes_tree_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        let sink = FsSink::new(temp.path().join("out")).unwrap();

        let product = sink.create_directory(&sink.root(), "商品【店铺】").unwrap();
        let images = sink.create_directory(&product, "images").unwrap();
        write_file(&sink, &images, "cover.jpg", b"jpeg").unwrap();

        let written = temp.path().join("out/商品【店铺】/images/cover.jpg");
        assert_eq!(fs::read(written).unwrap(), b"jpeg");
    }

    #[test]
    fn existing_directory_is_reused() {
        let temp = tempfile::tempdir().unwrap();
        let sink = FsSink::new(temp.path()).unwrap();
        sink.create_directory(&sink.root(), "p").unwrap();
        assert!(sink.create_directory(&sink.root(), "p").is_ok());
    }

    #[test]
    fn rejects_traversal_names() {
        let temp = tempfile::tempdir().unwrap();
        let sink = FsSink::new(temp.path()).unwrap();
        assert!(sink.create_directory(&sink.root(), "..").is_err());
        assert!(sink.create_file(&sink.root(), "../x").is_err());
    }

    #[test]
    fn double_dots_inside_a_name_are_not_traversal() {
        let temp = tempfile::tempdir().unwrap();
        let sink = FsSink::new(temp.path().join("exports..2026")).unwrap();
        assert!(sink.root_path().is_dir());
        assert!(FsSink::new(temp.path().join("a/../b")).is_err());
    }

    #[test]
    fn permission_errors_are_fatal_only_at_root_level() {
        let root = Path::new("/srv/out");
        let denied = || io::Error::from(io::ErrorKind::PermissionDenied);

        assert!(map_io(denied(), root, root).is_fatal());
        assert!(map_io(denied(), &root.join("product"), root).is_fatal());

        let deep = map_io(denied(), &root.join("product/images/cover.jpg"), root);
        assert!(matches!(deep, SinkError::AccessDenied(_)));
        assert!(!deep.is_fatal());
        assert!(!map_entry_io(denied(), &root.join("product")).is_fatal());
    }

    #[test]
    fn vanished_root_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("gone");
        let sink = FsSink::new(&root).unwrap();
        fs::remove_dir(&root).unwrap();

        let err = sink.create_directory(&sink.root(), "p").unwrap_err();
        assert!(err.is_fatal());
    }
}
