//! Temporary destination file shared by the parts of one download.

use bytes::Bytes;
use dataquery_types::{ErrorKind, FetchError};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Suffix appended to the destination while a download is in progress.
pub const PART_SUFFIX: &str = ".part";

/// Returns the temporary path used while downloading to `destination`.
#[must_use]
pub fn temp_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// A preallocated file written at disjoint offsets by concurrent parts.
///
/// Writes are positional so parts never share a cursor; each blocking write
/// runs on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct PartFile {
    file: Arc<File>,
    path: PathBuf,
}

impl PartFile {
    /// Creates (or truncates) `path` and preallocates `size` bytes.
    pub async fn create(path: &Path, size: Option<u64>) -> Result<Self, FetchError> {
        let owned = path.to_path_buf();
        let file = tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&owned)?;
            if let Some(size) = size {
                file.set_len(size)?;
            }
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(join_error)??;

        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Path of the temporary file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `data` at `offset`.
    pub async fn write_at(&self, offset: u64, data: Bytes) -> Result<(), FetchError> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || write_all_at(&file, &data, offset))
            .await
            .map_err(join_error)?
            .map_err(FetchError::from)
    }

    /// Truncates to `len` bytes and flushes to disk.
    pub async fn finish(&self, len: u64) -> Result<(), FetchError> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || {
            file.set_len(len)?;
            file.sync_all()
        })
        .await
        .map_err(join_error)?
        .map_err(FetchError::from)
    }
}

fn join_error(err: tokio::task::JoinError) -> FetchError {
    FetchError::new(ErrorKind::FileSystem, format!("write task failed: {err}"))
}

#[cfg(unix)]
fn write_all_at(file: &File, data: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        let n = file.seek_write(data, offset)?;
        if n == 0 {
            return Err(std::io::ErrorKind::WriteZero.into());
        }
        data = &data[n..];
        offset += n as u64;
    }
    Ok(())
}
