//! Temporary storage for multi-stage signing
//!
//! Each stage of an LT/LTA profile writes into a temporary output which is
//! then reopened as the next stage's input. Outputs live in memory unless a
//! temporary directory is configured, in which case they are uniquely named
//! files that are deleted when the owning [`TempStorage`] is dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::{PadesError, Result};

const TEMP_FILE_PREFIX: &str = "tempPdfFile";

/// Shared by every session so concurrent sessions never pick the same name
static TEMP_FILE_COUNTER: Mutex<u64> = Mutex::new(0);

/// Destination of one intermediate stage
#[derive(Debug)]
pub enum TempOutput {
    Memory(Vec<u8>),
    File { path: PathBuf, file: File },
}

impl TempOutput {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Memory(_) => None,
            Self::File { path, .. } => Some(path),
        }
    }
}

impl Write for TempOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Memory(buffer) => buffer.write(buf),
            Self::File { file, .. } => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Memory(buffer) => buffer.flush(),
            Self::File { file, .. } => file.flush(),
        }
    }
}

/// Broker for the temporary outputs of one signing session
#[derive(Debug, Default)]
pub struct TempStorage {
    directory: Option<PathBuf>,
    files: Vec<PathBuf>,
}

impl TempStorage {
    pub fn new(directory: Option<PathBuf>) -> Self {
        Self {
            directory,
            files: Vec::new(),
        }
    }

    /// Files allocated so far and not yet deleted
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// A fresh destination for the next stage
    pub fn allocate(&mut self) -> Result<TempOutput> {
        let Some(directory) = &self.directory else {
            debug!("allocated in-memory temporary output");
            return Ok(TempOutput::Memory(Vec::new()));
        };

        // The counter lock covers the existence checks and the file creation.
        let mut counter = TEMP_FILE_COUNTER
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !directory.is_dir() {
            return Err(PadesError::Config(format!(
                "Path {} does not exist.",
                directory.display()
            )));
        }

        loop {
            *counter += 1;
            let path = directory.join(format!("{}{}.pdf", TEMP_FILE_PREFIX, *counter));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    debug!(path = %path.display(), "allocated temporary file");
                    self.files.push(path.clone());
                    return Ok(TempOutput::File { path, file });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Close `output` and return everything written to it
    pub fn reopen(&self, output: TempOutput) -> Result<Vec<u8>> {
        match output {
            TempOutput::Memory(buffer) => Ok(buffer),
            TempOutput::File { path, mut file } => {
                file.flush()?;
                drop(file);
                debug!(path = %path.display(), "reopened temporary file");
                Ok(fs::read(&path)?)
            }
        }
    }

    /// Delete every allocated file. Also runs on drop.
    pub fn delete_temp_files(&mut self) {
        for path in self.files.drain(..) {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to delete temporary file");
                }
            }
        }
    }
}

impl Drop for TempStorage {
    fn drop(&mut self) {
        self.delete_temp_files();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_memory_round_trip() {
        let mut storage = TempStorage::new(None);
        let mut output = storage.allocate().unwrap();
        output.write_all(b"%PDF-1.7").unwrap();
        assert!(output.path().is_none());
        assert_eq!(storage.reopen(output).unwrap(), b"%PDF-1.7".to_vec());
        assert!(storage.files().is_empty());
    }

    #[test]
    fn test_file_round_trip_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let mut storage = TempStorage::new(Some(dir.path().to_path_buf()));
            let mut output = storage.allocate().unwrap();
            path = output.path().unwrap().to_path_buf();
            output.write_all(b"stage one").unwrap();
            assert_eq!(storage.reopen(output).unwrap(), b"stage one".to_vec());
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_skips_existing_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = TempStorage::new(Some(dir.path().to_path_buf()));
        let first = storage.allocate().unwrap();
        let taken = first.path().unwrap().to_path_buf();

        let name = taken.file_name().unwrap().to_str().unwrap();
        let number: u64 = name
            .trim_start_matches(TEMP_FILE_PREFIX)
            .trim_end_matches(".pdf")
            .parse()
            .unwrap();
        // Occupy the next few names
        for n in number + 1..number + 4 {
            File::create(dir.path().join(format!("{}{}.pdf", TEMP_FILE_PREFIX, n))).unwrap();
        }

        let second = storage.allocate().unwrap();
        let second_path = second.path().unwrap();
        assert_ne!(second_path, taken.as_path());
        assert_eq!(storage.files().len(), 2);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let mut storage = TempStorage::new(Some(missing.clone()));
        let err = storage.allocate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains(&missing.display().to_string()));
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let dir = Arc::new(tempfile::tempdir().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dir = Arc::clone(&dir);
                thread::spawn(move || {
                    let mut storage = TempStorage::new(Some(dir.path().to_path_buf()));
                    let mut paths = Vec::new();
                    for _ in 0..16 {
                        let output = storage.allocate().unwrap();
                        paths.push(output.path().unwrap().to_path_buf());
                    }
                    let all_exist = paths.iter().all(|p| p.exists());
                    (paths, all_exist, storage)
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut storages = Vec::new();
        for handle in handles {
            let (paths, all_exist, storage) = handle.join().unwrap();
            assert!(all_exist);
            for path in paths {
                assert!(seen.insert(path));
            }
            storages.push(storage);
        }
        assert_eq!(seen.len(), 8 * 16);

        drop(storages);
        for path in &seen {
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_cleanup_after_failure() {
        fn failing_stage(storage: &mut TempStorage) -> Result<()> {
            let mut output = storage.allocate()?;
            output.write_all(b"partial")?;
            Err(PadesError::Domain("stage failed".to_string()))
        }

        let dir = tempfile::tempdir().unwrap();
        let allocated;
        {
            let mut storage = TempStorage::new(Some(dir.path().to_path_buf()));
            assert!(failing_stage(&mut storage).is_err());
            allocated = storage.files().to_vec();
        }
        assert_eq!(allocated.len(), 1);
        assert!(!allocated[0].exists());
    }
}
