mod parse;
mod write;

pub use parse::{parse_manifest, parse_tag_file, ParseError};
pub use write::{wrap_tag, WriteError, MAX_LINE_LENGTH};

use crate::{Algorithm, Checksums, FileSummary, KeyValueCollection};
use std::path::Path;
use tokio::io::AsyncRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Role of a file inside a bag, derived from its path
pub enum FileType {
    /// Anything below `data/`
    Payload,
    /// `manifest-<algorithm>.txt`
    Manifest,
    /// `tagmanifest-<algorithm>.txt`
    TagManifest,
    /// Everything else
    TagFile,
}

#[derive(Debug, Clone, PartialEq)]
/// One member of a bag
pub struct File {
    /// What the container says about the file
    pub summary: FileSummary,
    /// Digests computed while copying or reading
    pub checksums: Checksums,
    /// Manifest entries (path to digest) or tags (label to value)
    pub parsed_data: KeyValueCollection,
    file_type: FileType,
}

impl File {
    /// Member with no checksum and no parsed data yet
    pub fn new(summary: FileSummary, file_type: FileType) -> Self {
        Self {
            summary,
            checksums: Checksums::new(),
            parsed_data: KeyValueCollection::new(),
            file_type,
        }
    }

    /// Role in the bag
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Path relative to the bag root
    pub fn rel_path(&self) -> &str {
        &self.summary.rel_path
    }

    /// Replace parsed data with the entries of a manifest read from `reader`
    pub async fn parse_as_manifest<R>(&mut self, reader: &mut R) -> Result<(), ParseError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.parsed_data = parse_manifest(reader, &self.summary.rel_path).await?;
        Ok(())
    }

    /// Replace parsed data with the tags read from `reader`
    pub async fn parse_as_tag_file<R>(&mut self, reader: &mut R) -> Result<(), ParseError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.parsed_data = parse_tag_file(reader, &self.summary.rel_path).await?;
        Ok(())
    }

    /// Text form of the parsed data, as written by [`File::write()`]
    pub fn render(&self) -> String {
        match self.file_type {
            FileType::Manifest | FileType::TagManifest => write::render_manifest(&self.parsed_data),
            FileType::TagFile | FileType::Payload => write::render_tags(&self.parsed_data),
        }
    }

    /// Write the parsed data to `path`, computing checksums over the bytes written.
    ///
    /// The checksums and the new size are stored on the file.
    pub async fn write(
        &mut self,
        path: impl AsRef<Path>,
        algorithms: &[Algorithm],
    ) -> Result<&Checksums, WriteError> {
        let contents = self.render();
        self.checksums = write::write_contents(path.as_ref(), &contents, algorithms).await?;
        self.summary.size = contents.len() as u64;
        Ok(&self.checksums)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checksum::Checksum;

    #[tokio::test]
    async fn write_tag_file_and_read_back() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("custom-tags/info.txt");

        let mut file = File::new(FileSummary::synthesized("custom-tags/info.txt"), FileType::TagFile);
        file.parsed_data.append("Source-Organization", "Bag Makers Inc.");
        file.parsed_data.append("External-Description", "word ".repeat(40).trim_end());

        let checksums = file.write(&path, &[Algorithm::Md5]).await.unwrap().clone();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(file.summary.size, written.len() as u64);
        let mut expected_md5 = written.as_slice();
        assert_eq!(
            checksums[&Algorithm::Md5],
            crate::checksum::hash_only(&mut expected_md5, &[Algorithm::Md5])
                .await
                .unwrap()[&Algorithm::Md5]
        );

        let mut reread = File::new(FileSummary::synthesized("custom-tags/info.txt"), FileType::TagFile);
        reread
            .parse_as_tag_file(&mut written.as_slice())
            .await
            .unwrap();
        assert_eq!(reread.parsed_data, file.parsed_data);
    }

    #[tokio::test]
    async fn write_manifest() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("manifest-md5.txt");

        let mut file = File::new(FileSummary::synthesized("manifest-md5.txt"), FileType::Manifest);
        file.parsed_data.append("data/a.txt", "0cc175b9c0f1b6a831c399e269772661");
        file.parsed_data.append("data/b c.txt", "92eb5ffee6ae2fec3ad71c777531578f");
        file.write(&path, &[]).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "0cc175b9c0f1b6a831c399e269772661 data/a.txt\n92eb5ffee6ae2fec3ad71c777531578f data/b c.txt\n"
        );
        assert!(file.checksums.is_empty());
        assert_eq!(
            file.parsed_data.first_value_for_key("data/a.txt"),
            Checksum::from("0CC175B9C0F1B6A831C399E269772661").to_string()
        );
    }
}
