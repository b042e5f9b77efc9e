//! # Image Storage
//!
//! File access used by [`ElfLoader::run_from_disk`](crate::ElfLoader::run_from_disk).
//! Every failure is the collaborator's own negative code, passed back
//! unchanged.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{LoadError, LoadResult};

/// Read-only file access
pub trait Storage {
    /// Open file handle
    type File;

    /// Open `path` for reading
    fn open(&mut self, path: &str) -> Result<Self::File, i32>;

    /// Size of the file in bytes
    fn size(&mut self, file: &Self::File) -> Result<usize, i32>;

    /// Read into `buf`, returning the number of bytes read
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, i32>;

    /// Close the file
    fn close(&mut self, file: Self::File);
}

/// Read a whole file with a single read call
///
/// The buffer is sized from the file size; a short read yields the bytes
/// actually read. The file is closed on every path past a successful open.
pub fn read_file<S: Storage + ?Sized>(storage: &mut S, path: &str) -> LoadResult<Vec<u8>> {
    let mut file = storage.open(path).map_err(LoadError::Storage)?;
    let result = read_open(storage, &mut file);
    storage.close(file);

    let buf = result?;
    log::info!("storage: read {} bytes from {}", buf.len(), path);
    Ok(buf)
}

fn read_open<S: Storage + ?Sized>(storage: &mut S, file: &mut S::File) -> LoadResult<Vec<u8>> {
    let size = storage.size(file).map_err(LoadError::Storage)?;
    let mut buf = vec![0u8; size];
    let read = storage.read(file, &mut buf).map_err(LoadError::Storage)?;
    buf.truncate(read);
    Ok(buf)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory file store with injectable failures
    #[derive(Default)]
    pub(crate) struct MemStorage {
        pub files: HashMap<String, Vec<u8>>,
        pub stat_error: Option<i32>,
        pub read_error: Option<i32>,
        pub short_read: Option<usize>,
        pub opened: usize,
        pub closed: usize,
    }

    impl MemStorage {
        pub fn with_file(path: &str, contents: Vec<u8>) -> Self {
            let mut storage = Self::default();
            storage.files.insert(path.into(), contents);
            storage
        }
    }

    impl Storage for MemStorage {
        type File = Vec<u8>;

        fn open(&mut self, path: &str) -> Result<Vec<u8>, i32> {
            let file = self.files.get(path).cloned().ok_or(-2)?;
            self.opened += 1;
            Ok(file)
        }

        fn size(&mut self, file: &Vec<u8>) -> Result<usize, i32> {
            match self.stat_error {
                Some(code) => Err(code),
                None => Ok(file.len()),
            }
        }

        fn read(&mut self, file: &mut Vec<u8>, buf: &mut [u8]) -> Result<usize, i32> {
            if let Some(code) = self.read_error {
                return Err(code);
            }
            let n = self.short_read.unwrap_or(buf.len()).min(file.len());
            buf[..n].copy_from_slice(&file[..n]);
            Ok(n)
        }

        fn close(&mut self, _file: Vec<u8>) {
            self.closed += 1;
        }
    }

    #[test]
    fn test_reads_whole_file() {
        let mut storage = MemStorage::with_file("uda:/xell.elf", vec![1, 2, 3, 4]);
        assert_eq!(read_file(&mut storage, "uda:/xell.elf"), Ok(vec![1, 2, 3, 4]));
        assert_eq!(storage.closed, 1);
    }

    #[test]
    fn test_open_failure_returns_code() {
        let mut storage = MemStorage::default();
        assert_eq!(read_file(&mut storage, "missing"), Err(LoadError::Storage(-2)));
        assert_eq!(storage.closed, 0);
    }

    #[test]
    fn test_read_failure_returns_code_and_closes() {
        let mut storage = MemStorage::with_file("a", vec![0; 8]);
        storage.read_error = Some(-5);
        assert_eq!(read_file(&mut storage, "a"), Err(LoadError::Storage(-5)));
        assert_eq!(storage.closed, 1);
    }

    #[test]
    fn test_stat_failure_returns_code() {
        let mut storage = MemStorage::with_file("a", vec![0; 8]);
        storage.stat_error = Some(-9);
        assert_eq!(read_file(&mut storage, "a"), Err(LoadError::Storage(-9)));
        assert_eq!(storage.closed, 1);
    }

    #[test]
    fn test_short_read_keeps_bytes_read() {
        let mut storage = MemStorage::with_file("a", vec![7; 16]);
        storage.short_read = Some(10);
        assert_eq!(read_file(&mut storage, "a").map(|b| b.len()), Ok(10));
    }
}
