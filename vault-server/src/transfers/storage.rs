//! Backup file storage
//!
//! Files live at `<root>/<client id hex>/<filename>`. Writes go to a unique
//! hidden temp file in the same directory, are synced, then renamed over the
//! final path, so a reader never observes a partially written file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rand::RngExt;
use tracing::{debug, error};
use vault_common::checksum::Crc32;
use vault_common::{ClientId, STREAM_BUFFER_SIZE};

/// Result of a completed atomic write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub size: u64,
    pub crc32: u32,
}

/// Removes the temp file unless the write reached the rename
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => error!(
                event = "temp_cleanup_failure",
                path = %self.path.display(),
                error = %e,
                "Failed to remove temp file"
            ),
        }
    }
}

/// Root directory for all stored backups
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding one client's files
    pub fn client_dir(&self, client_id: &ClientId) -> PathBuf {
        self.root.join(client_id.to_hex())
    }

    /// Final path of a stored file; `filename` must already be validated
    pub fn file_path(&self, client_id: &ClientId, filename: &str) -> PathBuf {
        self.client_dir(client_id).join(filename)
    }

    /// Write `data` to the client's file atomically, checksumming as it goes
    ///
    /// The CRC-32 is folded over the same bounded slices that are written, so
    /// the data is traversed once.
    ///
    /// # Errors
    ///
    /// Returns any I/O error; the temp file is removed on every failure path.
    pub fn write_atomic(
        &self,
        client_id: &ClientId,
        filename: &str,
        data: &[u8],
    ) -> io::Result<WrittenFile> {
        let dir = self.client_dir(client_id);
        fs::create_dir_all(&dir)?;

        let final_path = dir.join(filename);
        let (mut file, temp_path) = Self::create_temp(&dir, filename)?;
        let mut guard = TempFileGuard::new(temp_path.clone());

        let mut crc = Crc32::new();
        for slice in data.chunks(STREAM_BUFFER_SIZE) {
            file.write_all(slice).inspect_err(|e| {
                error!(
                    event = "storage_write_failure",
                    path = %temp_path.display(),
                    error = %e,
                    "Failed to write temp file"
                );
            })?;
            crc.update(slice);
        }
        file.sync_all()?;
        drop(file);

        match fs::remove_file(&final_path) {
            Ok(()) => debug!(path = %final_path.display(), "replacing existing file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        fs::rename(&temp_path, &final_path).inspect_err(|e| {
            error!(
                event = "storage_rename_failure",
                from = %temp_path.display(),
                to = %final_path.display(),
                error = %e,
                "Failed to rename temp file"
            );
        })?;
        guard.disarm();

        Ok(WrittenFile {
            path: final_path,
            size: crc.len(),
            crc32: crc.finalize(),
        })
    }

    /// Create a uniquely named hidden temp file next to the final path
    fn create_temp(dir: &Path, filename: &str) -> io::Result<(File, PathBuf)> {
        loop {
            let suffix: [u8; 4] = rand::rng().random();
            let path = dir.join(format!(".{filename}.{}.tmp", hex::encode(suffix)));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((file, path)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Delete a stored file
    ///
    /// Returns `false` if it did not exist.
    pub fn delete(&self, client_id: &ClientId, filename: &str) -> io::Result<bool> {
        match fs::remove_file(self.file_path(client_id, filename)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
