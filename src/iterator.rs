//! Uniform traversal over the two containers a bag can live in: a directory, or a tar file.

mod filesystem;
mod tar;

pub use filesystem::FileSystemIterator;
pub use tar::TarIterator;

use crate::FileSummary;
use regex::Regex;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncSeek};

#[derive(thiserror::Error, Debug, PartialEq)]
/// Errors while walking a directory or a tar file
pub enum IteratorError {
    /// Bag path does not exist
    #[error("Path `{0}` does not exist")]
    RootNotFound(std::path::PathBuf),
    /// Only directories and `.tar` files hold bags
    #[error("Path `{0}` is neither a directory nor a tar file")]
    UnsupportedContainer(std::path::PathBuf),
    /// No member at this relative path
    #[error("File `{0}` not found in bag")]
    NotFound(String),
    /// Listing a directory failed
    #[error("Failed to list directory contents: {0}")]
    Walk(String),
    /// Tar file is unreadable or corrupt
    #[error("Failed to read archive")]
    ReadArchive(std::io::ErrorKind),
    /// Member could not be opened
    #[error("Failed to open file")]
    OpenFile(std::io::ErrorKind),
}

/// Reader over the bytes of one bag member
///
/// Readers from a tar archive can only move forward. Readers that can seek say so
/// through [`MemberRead::as_seekable()`], everyone else must be reopened with
/// [`ReadIterator::open_file()`] to read a member a second time.
pub trait MemberRead: AsyncRead + Unpin + Send {
    /// Seek access to the member, `None` when it can only be read once
    fn as_seekable(&mut self) -> Option<&mut (dyn AsyncSeek + Unpin + Send)> {
        None
    }
}

impl MemberRead for tokio::fs::File {
    fn as_seekable(&mut self) -> Option<&mut (dyn AsyncSeek + Unpin + Send)> {
        Some(self)
    }
}

/// One step of a traversal: directories and special files carry no reader
pub type Member = (FileSummary, Option<Box<dyn MemberRead>>);

#[async_trait::async_trait]
/// Walk over every member of a bag, whatever holds it
pub trait ReadIterator: Send {
    /// Next member of the container, `None` once every member has been visited.
    ///
    /// The returned reader must be dropped before calling `next()` again.
    async fn next(&mut self) -> Result<Option<Member>, IteratorError>;

    /// Fresh reader positioned at the start of the member at `rel_path`
    async fn open_file(&mut self, rel_path: &str) -> Result<Box<dyn MemberRead>, IteratorError>;

    /// Relative paths of regular files matching `pattern`
    async fn find_matching_files(&mut self, pattern: &Regex)
        -> Result<Vec<String>, IteratorError>;

    /// Distinct top-level directory names seen so far
    fn top_level_dir_names(&self) -> Vec<String>;
}

/// Open the iterator suitable for `path`: a directory, or a file ending in `.tar`
pub async fn open_iterator(
    path: impl AsRef<Path>,
) -> Result<Box<dyn ReadIterator>, IteratorError> {
    let path = path.as_ref();
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| IteratorError::RootNotFound(path.to_path_buf()))?;

    if metadata.is_dir() {
        return Ok(Box::new(FileSystemIterator::new(path).await?));
    }

    if metadata.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("tar") {
        return Ok(Box::new(TarIterator::new(path).await?));
    }

    Err(IteratorError::UnsupportedContainer(path.to_path_buf()))
}

/// Read a whole member into memory, used by tests and small tag files
#[cfg(test)]
pub(crate) async fn read_to_string(reader: &mut Box<dyn MemberRead>) -> String {
    use tokio::io::AsyncReadExt;

    let mut contents = String::new();
    reader.read_to_string(&mut contents).await.unwrap();
    contents
}
