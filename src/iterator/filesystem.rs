use super::{IteratorError, Member, MemberRead, ReadIterator};
use crate::summary::{to_bag_path, FileSummary};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::{fs, task::spawn_blocking};

/// Walks a bag directory in sorted order
#[derive(Debug)]
pub struct FileSystemIterator {
    root: PathBuf,
    /// Every member below `root`, sorted by relative path
    summaries: Vec<FileSummary>,
    index: usize,
    top_level_dirs: BTreeSet<String>,
}

impl FileSystemIterator {
    /// List every member below `root`
    pub async fn new(root: impl AsRef<Path>) -> Result<Self, IteratorError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(IteratorError::RootNotFound(root));
        }

        let walk_root = root.clone();
        let summaries = spawn_blocking(move || list_members(&walk_root))
            .await
            .map_err(|e| IteratorError::Walk(e.to_string()))??;

        Ok(Self {
            root,
            summaries,
            index: 0,
            top_level_dirs: BTreeSet::new(),
        })
    }

    /// Bag directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn list_members(root: &Path) -> Result<Vec<FileSummary>, IteratorError> {
    let mut summaries = Vec::new();

    for entry in walkdir::WalkDir::new(root).min_depth(1).follow_links(true) {
        let entry = entry.map_err(|e| IteratorError::Walk(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| IteratorError::Walk(e.to_string()))?;
        let metadata = entry
            .metadata()
            .map_err(|e| IteratorError::Walk(e.to_string()))?;

        summaries.push(FileSummary::from_metadata(
            to_bag_path(relative),
            entry.path(),
            &metadata,
        ));
    }

    summaries.sort_by(|left, right| left.rel_path.cmp(&right.rel_path));
    Ok(summaries)
}

#[async_trait::async_trait]
impl ReadIterator for FileSystemIterator {
    async fn next(&mut self) -> Result<Option<Member>, IteratorError> {
        let Some(summary) = self.summaries.get(self.index).cloned() else {
            return Ok(None);
        };
        self.index += 1;

        if let Some(dir) = summary.top_level_dir() {
            self.top_level_dirs.insert(dir.to_string());
        }

        if !summary.is_regular_file {
            return Ok(Some((summary, None)));
        }

        let reader = self.open_file(&summary.rel_path).await?;
        Ok(Some((summary, Some(reader))))
    }

    async fn open_file(&mut self, rel_path: &str) -> Result<Box<dyn MemberRead>, IteratorError> {
        let path = self.root.join(rel_path);
        let file = fs::File::open(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IteratorError::NotFound(rel_path.to_string()),
            kind => IteratorError::OpenFile(kind),
        })?;
        Ok(Box::new(file))
    }

    async fn find_matching_files(
        &mut self,
        pattern: &Regex,
    ) -> Result<Vec<String>, IteratorError> {
        Ok(self
            .summaries
            .iter()
            .filter(|summary| summary.is_regular_file && pattern.is_match(&summary.rel_path))
            .map(|summary| summary.rel_path.clone())
            .collect())
    }

    fn top_level_dir_names(&self) -> Vec<String> {
        self.top_level_dirs.iter().cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::iterator::read_to_string;
    use tokio::io::AsyncSeekExt;

    fn sample_directory() -> tempfile::TempDir {
        let directory = tempfile::tempdir().unwrap();
        let root = directory.path();
        std::fs::create_dir_all(root.join("data/photos")).unwrap();
        std::fs::create_dir_all(root.join("custom-tags")).unwrap();
        std::fs::write(root.join("bagit.txt"), "BagIt-Version: 1.0\n").unwrap();
        std::fs::write(root.join("manifest-md5.txt"), "").unwrap();
        std::fs::write(root.join("data/photos/totebag.jpg"), "tote").unwrap();
        std::fs::write(root.join("data/rfc8493.txt"), "rfc").unwrap();
        std::fs::write(root.join("custom-tags/tags.txt"), "Tag: value\n").unwrap();
        directory
    }

    #[tokio::test]
    async fn sorted_traversal() {
        let directory = sample_directory();
        let mut iterator = FileSystemIterator::new(directory.path()).await.unwrap();

        let mut paths = Vec::new();
        while let Some((summary, reader)) = iterator.next().await.unwrap() {
            assert_eq!(summary.is_regular_file, reader.is_some());
            paths.push(summary.rel_path);
        }

        assert_eq!(
            paths,
            vec![
                "bagit.txt",
                "custom-tags",
                "custom-tags/tags.txt",
                "data",
                "data/photos",
                "data/photos/totebag.jpg",
                "data/rfc8493.txt",
                "manifest-md5.txt",
            ]
        );
        assert_eq!(iterator.top_level_dir_names(), vec!["custom-tags", "data"]);
    }

    #[tokio::test]
    async fn open_and_seek() {
        let directory = sample_directory();
        let mut iterator = FileSystemIterator::new(directory.path()).await.unwrap();

        let mut reader = iterator.open_file("data/rfc8493.txt").await.unwrap();
        assert_eq!(read_to_string(&mut reader).await, "rfc");

        let seekable = reader.as_seekable().expect("files on disk can seek");
        seekable.seek(std::io::SeekFrom::Start(0)).await.unwrap();
        assert_eq!(read_to_string(&mut reader).await, "rfc");

        assert!(matches!(
            iterator.open_file("data/missing.txt").await,
            Err(IteratorError::NotFound(path)) if path == "data/missing.txt"
        ));
    }

    #[tokio::test]
    async fn find_manifests() {
        let directory = sample_directory();
        let mut iterator = FileSystemIterator::new(directory.path()).await.unwrap();

        let pattern = Regex::new(r"^manifest-\w+\.txt$").unwrap();
        assert_eq!(
            iterator.find_matching_files(&pattern).await.unwrap(),
            vec!["manifest-md5.txt"]
        );
    }

    #[tokio::test]
    async fn missing_root() {
        let directory = tempfile::tempdir().unwrap();
        let missing = directory.path().join("nope");
        assert_eq!(
            FileSystemIterator::new(&missing).await.unwrap_err(),
            IteratorError::RootNotFound(missing)
        );
    }
}
