use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

use bytes::Bytes;
use tokio::io::AsyncReadExt;

/// Enumerates the errors which can occur when loading a file into memory.
#[derive(Debug)]
pub enum LoadError {
    /// The file cannot be opened or isn't a regular file.
    NotFound,

    /// The file exists but doesn't contain any data. Empty files are never served nor cached.
    Empty,

    /// Reading the file failed.
    IOError(std::io::Error),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            LoadError::NotFound => write!(f, "File not found"),
            LoadError::Empty => write!(f, "No data found in file"),
            LoadError::IOError(error) => write!(f, "Failed to read file: {}", error),
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoadError::IOError(error) => Some(error),
            _ => None,
        }
    }
}

/// Reads the file at the given (already resolved) path completely into memory.
///
/// Anything but a regular file (a directory, a FIFO, a device) is reported as
/// [LoadError::NotFound] without being opened, as opening a FIFO would block until a writer
/// shows up. A read which yields zero bytes is reported as [LoadError::Empty]. There are no
/// retries, a failed read is final.
pub async fn load(path: &Path) -> Result<Bytes, LoadError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| LoadError::NotFound)?;
    if !metadata.is_file() {
        return Err(LoadError::NotFound);
    }

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|_| LoadError::NotFound)?;

    let mut buffer = Vec::with_capacity(metadata.len() as usize);
    let bytes_read = file
        .read_to_end(&mut buffer)
        .await
        .map_err(LoadError::IOError)?;

    if bytes_read == 0 {
        Err(LoadError::Empty)
    } else {
        Ok(Bytes::from(buffer))
    }
}
