use std::path::Path;
use tokio::{fs, io::AsyncWriteExt};

#[derive(thiserror::Error, Debug, PartialEq)]
/// Errors while packing a bag into a tar file
pub enum SerializeError {
    /// Tar file could not be created
    #[error("Failed to create tar file")]
    CreateFile(std::io::ErrorKind),
    /// A member could not be added
    #[error("Failed to add bag directory to tar file")]
    Append(std::io::ErrorKind),
    /// Flushing the archive to disk failed
    #[error("Failed to finish tar file")]
    Finish(std::io::ErrorKind),
}

/// Pack `bag_directory` into `tar_path`, every member placed under `top_level_name/`.
///
/// BagIt expects a serialized bag to unpack into a single directory named like the
/// archive, so `top_level_name` is normally the tar file name without `.tar`.
pub async fn tar_directory(
    bag_directory: impl AsRef<Path>,
    tar_path: impl AsRef<Path>,
    top_level_name: &str,
) -> Result<(), SerializeError> {
    let tar_file = fs::File::create(tar_path.as_ref())
        .await
        .map_err(|e| SerializeError::CreateFile(e.kind()))?;

    let mut builder = tokio_tar::Builder::new(tar_file);
    builder
        .append_dir_all(top_level_name, bag_directory.as_ref())
        .await
        .map_err(|e| SerializeError::Append(e.kind()))?;

    let mut tar_file = builder
        .into_inner()
        .await
        .map_err(|e| SerializeError::Finish(e.kind()))?;
    tar_file
        .flush()
        .await
        .map_err(|e| SerializeError::Finish(e.kind()))?;

    tracing::debug!(
        source = %bag_directory.as_ref().display(),
        destination = %tar_path.as_ref().display(),
        "serialized bag"
    );

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::iterator::{ReadIterator, TarIterator};

    #[tokio::test]
    async fn tar_has_single_top_level_directory() {
        let directory = tempfile::tempdir().unwrap();
        let bag = directory.path().join("staging");
        std::fs::create_dir_all(bag.join("data")).unwrap();
        std::fs::write(bag.join("bagit.txt"), "BagIt-Version: 1.0\n").unwrap();
        std::fs::write(bag.join("data/handbag.txt"), "hand").unwrap();

        let tar_path = directory.path().join("handbag.tar");
        tar_directory(&bag, &tar_path, "handbag").await.unwrap();

        let mut iterator = TarIterator::new(&tar_path).await.unwrap();
        let mut paths = Vec::new();
        while let Some((summary, _)) = iterator.next().await.unwrap() {
            paths.push(summary.rel_path);
        }
        paths.sort();

        assert_eq!(paths, vec!["bagit.txt", "data", "data/handbag.txt"]);
        assert_eq!(iterator.top_level_dir_names(), vec!["handbag"]);
    }
}
