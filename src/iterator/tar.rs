use super::{IteratorError, Member, MemberRead, ReadIterator};
use crate::FileSummary;
use futures::StreamExt;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::{fs, io::BufReader};
use tokio_tar::{Archive, Entries, Entry};

type ArchiveReader = BufReader<fs::File>;
type TarEntry = Entry<Archive<ArchiveReader>>;

// Tar entries share one underlying stream and can only move forward.
impl MemberRead for TarEntry {}

/// Walks the members of a tar file in archive order.
///
/// Every member path is reported relative to the archive's top-level directory,
/// so `my-bag/data/file.txt` is seen as `data/file.txt`. The top-level names
/// themselves are available from [`ReadIterator::top_level_dir_names()`].
pub struct TarIterator {
    path: PathBuf,
    entries: Entries<ArchiveReader>,
    top_level_dirs: BTreeSet<String>,
}

impl std::fmt::Debug for TarIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TarIterator")
            .field("path", &self.path)
            .field("top_level_dirs", &self.top_level_dirs)
            .finish_non_exhaustive()
    }
}

impl TarIterator {
    /// Start reading the tar file at `path`
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, IteratorError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(IteratorError::RootNotFound(path));
        }

        let entries = open_entries(&path).await?;
        Ok(Self {
            path,
            entries,
            top_level_dirs: BTreeSet::new(),
        })
    }

    /// Tar file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Independent stream over the archive, starting at its first member
async fn open_entries(path: &Path) -> Result<Entries<ArchiveReader>, IteratorError> {
    let file = fs::File::open(path)
        .await
        .map_err(|e| IteratorError::OpenFile(e.kind()))?;
    let mut archive = Archive::new(BufReader::new(file));
    archive
        .entries()
        .map_err(|e| IteratorError::ReadArchive(e.kind()))
}

async fn next_entry(
    entries: &mut Entries<ArchiveReader>,
) -> Result<Option<TarEntry>, IteratorError> {
    entries
        .next()
        .await
        .transpose()
        .map_err(|e| IteratorError::ReadArchive(e.kind()))
}

/// Split an archive path into its top-level name and the path below it
fn split_entry_path(entry: &TarEntry) -> Result<(String, String), IteratorError> {
    let raw = entry
        .path()
        .map_err(|e| IteratorError::ReadArchive(e.kind()))?
        .to_string_lossy()
        .replace('\\', "/");
    let raw = raw.trim_start_matches("./").trim_matches('/');

    Ok(match raw.split_once('/') {
        Some((top, rest)) => (top.to_string(), rest.to_string()),
        None => (raw.to_string(), String::new()),
    })
}

#[async_trait::async_trait]
impl ReadIterator for TarIterator {
    async fn next(&mut self) -> Result<Option<Member>, IteratorError> {
        loop {
            let Some(entry) = next_entry(&mut self.entries).await? else {
                return Ok(None);
            };

            let (top, rel_path) = split_entry_path(&entry)?;
            if !top.is_empty() {
                self.top_level_dirs.insert(top);
            }

            // The top-level directory itself is not a member of the bag
            if rel_path.is_empty() {
                continue;
            }

            let summary = FileSummary::from_tar_header(rel_path, entry.header());
            if !summary.is_regular_file {
                return Ok(Some((summary, None)));
            }
            return Ok(Some((summary, Some(Box::new(entry)))));
        }
    }

    async fn open_file(&mut self, rel_path: &str) -> Result<Box<dyn MemberRead>, IteratorError> {
        tracing::trace!(path = rel_path, archive = %self.path.display(), "reopening tar member");

        let mut entries = open_entries(&self.path).await?;
        while let Some(entry) = next_entry(&mut entries).await? {
            let (_, member_path) = split_entry_path(&entry)?;
            if member_path == rel_path && entry.header().entry_type().is_file() {
                return Ok(Box::new(entry));
            }
        }

        Err(IteratorError::NotFound(rel_path.to_string()))
    }

    async fn find_matching_files(
        &mut self,
        pattern: &Regex,
    ) -> Result<Vec<String>, IteratorError> {
        let mut matches = Vec::new();

        let mut entries = open_entries(&self.path).await?;
        while let Some(entry) = next_entry(&mut entries).await? {
            let (_, member_path) = split_entry_path(&entry)?;
            if !member_path.is_empty()
                && entry.header().entry_type().is_file()
                && pattern.is_match(&member_path)
            {
                matches.push(member_path);
            }
        }

        Ok(matches)
    }

    fn top_level_dir_names(&self) -> Vec<String> {
        self.top_level_dirs.iter().cloned().collect()
    }
}
