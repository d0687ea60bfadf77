// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local filesystem operations for the vault data directory.
//!
//! Everything written here is either already sealed by the cipher engine
//! (blob bytes) or non-sensitive metadata (sidecars, audit lines). This
//! module performs no cryptography of its own.
//!
//! Writes go through a uniquely named temp file followed by a rename so a
//! crash never leaves a half-written blob or sidecar behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{de::DeserializeOwned, Serialize};

use super::StoragePaths;

/// Error type for filesystem operations.
#[derive(Debug)]
pub enum FsError {
    /// I/O error during file operations
    Io(io::Error),
    /// JSON serialization/deserialization error
    Json(serde_json::Error),
    /// File or directory not found
    NotFound(String),
    /// Storage not initialized (or already closed)
    NotInitialized,
    /// Data read back does not match what was written
    IntegrityViolation(String),
}

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FsError::Io(e) => write!(f, "I/O error: {e}"),
            FsError::Json(e) => write!(f, "JSON error: {e}"),
            FsError::NotFound(entity) => write!(f, "Not found: {entity}"),
            FsError::NotInitialized => write!(f, "Storage not initialized"),
            FsError::IntegrityViolation(msg) => write!(f, "Integrity violation: {msg}"),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsError::Io(e) => Some(e),
            FsError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            FsError::NotFound(e.to_string())
        } else {
            FsError::Io(e)
        }
    }
}

impl From<serde_json::Error> for FsError {
    fn from(e: serde_json::Error) -> Self {
        FsError::Json(e)
    }
}

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Filesystem manager rooted at the vault data directory.
///
/// The lifecycle flag is atomic so a store shared behind an `Arc` can still
/// be closed during shutdown.
#[derive(Debug)]
pub struct LocalFs {
    paths: StoragePaths,
    initialized: AtomicBool,
}

impl LocalFs {
    /// Create a new LocalFs instance.
    ///
    /// Does NOT create the directory structure. Call `initialize()` first.
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths,
            initialized: AtomicBool::new(false),
        }
    }

    /// Get the storage paths.
    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Check if storage is initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Create the directory structure. Idempotent.
    pub fn initialize(&self) -> FsResult<()> {
        for dir in [self.paths.blobs_dir(), self.paths.audit_dir()] {
            fs::create_dir_all(&dir)?;
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Mark the storage closed; later operations fail with `NotInitialized`.
    pub fn close(&self) {
        self.initialized.store(false, Ordering::Release);
    }

    fn ensure_initialized(&self) -> FsResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(FsError::NotInitialized)
        }
    }

    /// Write-read-delete probe of the data directory.
    pub fn health_check(&self) -> FsResult<()> {
        self.ensure_initialized()?;

        let test_file = self.paths.root().join(".health_check");
        let test_data = b"health_check_data";

        fs::write(&test_file, test_data)?;
        let read_data = fs::read(&test_file)?;
        fs::remove_file(&test_file)?;

        if read_data != test_data {
            return Err(FsError::IntegrityViolation(
                "Health check data mismatch".to_string(),
            ));
        }

        Ok(())
    }

    // ========== Generic JSON Operations ==========

    /// Read a JSON file and deserialize it.
    pub fn read_json<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> FsResult<T> {
        self.ensure_initialized()?;

        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let value = serde_json::from_reader(reader)?;
        Ok(value)
    }

    /// Write a JSON file (atomic write via rename).
    pub fn write_json<T: Serialize>(&self, path: impl AsRef<Path>, value: &T) -> FsResult<()> {
        self.ensure_initialized()?;

        let path = path.as_ref();
        let temp_path = prepare_temp(path)?;
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }
        finish_temp(&temp_path, path)
    }

    /// Check if a file exists.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref().is_file()
    }

    /// Delete a file.
    pub fn delete(&self, path: impl AsRef<Path>) -> FsResult<()> {
        self.ensure_initialized()?;
        fs::remove_file(path.as_ref())?;
        Ok(())
    }

    /// List file stems in a directory with the given extension.
    pub fn list_files(&self, dir: impl AsRef<Path>, extension: &str) -> FsResult<Vec<String>> {
        self.ensure_initialized()?;

        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != extension) {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    // ========== Raw File Operations ==========

    /// Write raw bytes to a file (atomic write via rename).
    pub fn write_raw(&self, path: impl AsRef<Path>, data: &[u8]) -> FsResult<()> {
        self.ensure_initialized()?;

        let path = path.as_ref();
        let temp_path = prepare_temp(path)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        finish_temp(&temp_path, path)
    }

    /// Read raw bytes from a file.
    pub fn read_raw(&self, path: impl AsRef<Path>) -> FsResult<Vec<u8>> {
        self.ensure_initialized()?;

        let mut file = File::open(path.as_ref())?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Append one line to a text file, creating it if needed.
    pub fn append_line(&self, path: impl AsRef<Path>, line: &str) -> FsResult<()> {
        self.ensure_initialized()?;

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        file.write_all(&buf)?;
        Ok(())
    }
}

/// Temp file next to `path` with a unique suffix, parent created.
fn prepare_temp(path: &Path) -> FsResult<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    Ok(path.with_file_name(name))
}

fn finish_temp(temp_path: &Path, path: &Path) -> FsResult<()> {
    if let Err(e) = fs::rename(temp_path, path) {
        let _ = fs::remove_file(temp_path);
        return Err(e.into());
    }
    Ok(())
}
