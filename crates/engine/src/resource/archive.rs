use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Named container of extractable byte blobs, abstracting over plain
/// directories and packed container files.
pub trait Archive {
    fn list_names(&self) -> io::Result<Vec<String>>;
    /// Fails with `NotFound` when the archive does not hold `name`.
    fn extract(&self, name: &str) -> io::Result<Vec<u8>>;
}

/// A packed container format, recognized by its 4-byte magic prefix.
pub trait ContainerFormat {
    fn magic(&self) -> [u8; 4];
    fn open(&self, path: &Path) -> io::Result<Box<dyn Archive>>;
}

pub struct DirectoryArchive {
    path: PathBuf,
}

impl DirectoryArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Archive for DirectoryArchive {
    fn list_names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn extract(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path.join(name))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn directory_archive_lists_files_sorted() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("b.dat"), b"b").expect("write");
        fs::write(temp.path().join("a.dat"), b"a").expect("write");
        fs::create_dir(temp.path().join("nested")).expect("mkdir");

        let archive = DirectoryArchive::new(temp.path());
        let names = archive.list_names().expect("list");
        assert_eq!(names, vec!["a.dat".to_string(), "b.dat".to_string()]);
    }

    #[test]
    fn extract_of_absent_name_is_not_found() {
        let temp = TempDir::new().expect("tempdir");
        let archive = DirectoryArchive::new(temp.path());
        let error = archive.extract("ghost.dat").expect_err("missing");
        assert_eq!(error.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn extract_returns_file_contents() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("data.bin"), [1u8, 2, 3]).expect("write");
        let archive = DirectoryArchive::new(temp.path());
        assert_eq!(archive.extract("data.bin").expect("extract"), vec![1, 2, 3]);
    }
}
