use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::plan::Chunk;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes MD5 of `data` and returns the lowercase hex digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes MD5 of an entire file, reading `read_size` bytes at a time.
///
/// The token is checked between reads; a cancelled token aborts with
/// [`TransferError::Cancelled`]. A `read_size` of 0 falls back to
/// [`DEFAULT_CHUNK_SIZE`].
pub async fn calculate_file_checksum(
    path: &Path,
    read_size: usize,
    cancel: &CancellationToken,
) -> Result<String, TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let read_size = if read_size == 0 {
        DEFAULT_CHUNK_SIZE as usize
    } else {
        read_size
    };
    let mut buf = vec![0u8; read_size];

    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// SourceFile
// ---------------------------------------------------------------------------

/// A local file about to be uploaded.
///
/// Holds metadata only; every [`read_chunk`](Self::read_chunk) opens its own
/// handle so concurrent chunk reads never share a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: PathBuf,
    file_name: String,
    size: u64,
    modified: Option<SystemTime>,
}

impl SourceFile {
    /// Stats `path` and records its name, size and modification time.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(TransferError::InvalidFile(format!(
                "not a regular file: {}",
                path.display()
            )));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                TransferError::InvalidFile(format!("no file name: {}", path.display()))
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            size: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name sent to the server.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Reads the bytes of `chunk`. Blocking; run it off the async executor.
    pub fn read_chunk(&self, chunk: &Chunk) -> Result<Vec<u8>, TransferError> {
        if chunk.byte_end > self.size {
            return Err(TransferError::InvalidFile(format!(
                "chunk {} ends at {} past file size {}",
                chunk.index, chunk.byte_end, self.size
            )));
        }

        let mut file = std::fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(chunk.byte_start))?;
        let mut buf = vec![0u8; chunk.len() as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}
