use crate::file::{File, FileType};
use crate::manifest::{manifest_name, tagmanifest_name, ManifestKind, ManifestName};
use crate::metadata::{Oxum, PAYLOAD_DIRECTORY};
use crate::{Algorithm, FileSummary};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug, PartialEq)]
/// Errors when looking up data in a [`Bag`]
pub enum BagError {
    /// No manifest for the requested algorithm
    #[error("Bag has no manifest `{0}`")]
    ManifestNotFound(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Answer to "what does the bag say about this tag?"
pub struct TagValues {
    /// Every value, in the order found
    pub values: Vec<String>,
    /// The tag appears at least once
    pub is_present: bool,
    /// At least one value is not blank
    pub has_non_empty_value: bool,
}

impl TagValues {
    fn collect<'a>(values: impl Iterator<Item = &'a str>) -> Self {
        let values = values.map(str::to_string).collect::<Vec<_>>();
        Self {
            is_present: !values.is_empty(),
            has_non_empty_value: values.iter().any(|value| !value.trim().is_empty()),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// BagIt container: payload files, manifests, tag manifests and tag files.
///
/// `path` is either the bag directory or a tar file holding it. Members are keyed by their
/// path relative to the bag root, and every path lives in exactly one of the four maps.
pub struct Bag {
    path: PathBuf,
    /// Files below `data/`
    pub payload: BTreeMap<String, File>,
    /// Payload manifests
    pub manifests: BTreeMap<String, File>,
    /// Tag manifests
    pub tag_manifests: BTreeMap<String, File>,
    /// Every other file, `bagit.txt` included
    pub tag_files: BTreeMap<String, File>,
}

impl Bag {
    /// Empty bag at `path`, nothing is read or written yet
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            payload: BTreeMap::new(),
            manifests: BTreeMap::new(),
            tag_manifests: BTreeMap::new(),
            tag_files: BTreeMap::new(),
        }
    }

    /// Location of the bag: a directory or a tar file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the bag: the last path component, without `.tar`
    pub fn name(&self) -> String {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        match file_name.strip_suffix(".tar") {
            Some(stem) => stem.to_string(),
            None => file_name,
        }
    }

    /// The bag is a single file on disk
    pub fn is_serialized(&self) -> bool {
        self.path.is_file()
    }

    /// Role of a member, from its path relative to the bag root
    pub fn classify(rel_path: &str) -> FileType {
        match ManifestName::parse(rel_path) {
            Some(ManifestName {
                kind: ManifestKind::Tag,
                ..
            }) => FileType::TagManifest,
            Some(ManifestName {
                kind: ManifestKind::Payload,
                ..
            }) => FileType::Manifest,
            None if rel_path.starts_with(&format!("{PAYLOAD_DIRECTORY}/")) => FileType::Payload,
            None => FileType::TagFile,
        }
    }

    fn map_for(&mut self, file_type: FileType) -> &mut BTreeMap<String, File> {
        match file_type {
            FileType::Payload => &mut self.payload,
            FileType::Manifest => &mut self.manifests,
            FileType::TagManifest => &mut self.tag_manifests,
            FileType::TagFile => &mut self.tag_files,
        }
    }

    /// Insert a member, replacing any member already stored at the same path
    pub fn add_file_from_summary(&mut self, summary: FileSummary) -> (&mut File, FileType) {
        let rel_path = summary.rel_path.clone();
        let file_type = Self::classify(&rel_path);

        self.remove_file(&rel_path);
        let file = self
            .map_for(file_type)
            .entry(rel_path)
            .or_insert(File::new(summary, file_type));
        (file, file_type)
    }

    /// Forget a member, whatever its role
    pub fn remove_file(&mut self, rel_path: &str) -> Option<File> {
        [
            &mut self.payload,
            &mut self.manifests,
            &mut self.tag_manifests,
            &mut self.tag_files,
        ]
        .into_iter()
        .find_map(|map| map.remove(rel_path))
    }

    /// Member at `rel_path`, looked up in every map
    pub fn get_file(&self, rel_path: &str) -> Option<&File> {
        self.payload
            .get(rel_path)
            .or_else(|| self.manifests.get(rel_path))
            .or_else(|| self.tag_manifests.get(rel_path))
            .or_else(|| self.tag_files.get(rel_path))
    }

    /// Mutable member at `rel_path`
    pub fn get_file_mut(&mut self, rel_path: &str) -> Option<&mut File> {
        self.map_for(Self::classify(rel_path)).get_mut(rel_path)
    }

    /// Digest listed for `rel_path` in `manifest-<algorithm>.txt`, empty if not listed
    pub fn get_checksum_from_manifest(
        &self,
        algorithm: Algorithm,
        rel_path: &str,
    ) -> Result<String, BagError> {
        let name = manifest_name(algorithm);
        self.manifests
            .get(&name)
            .map(|manifest| manifest.parsed_data.first_value_for_key(rel_path).to_string())
            .ok_or(BagError::ManifestNotFound(name))
    }

    /// Digest listed for `rel_path` in `tagmanifest-<algorithm>.txt`, empty if not listed
    pub fn get_checksum_from_tag_manifest(
        &self,
        algorithm: Algorithm,
        rel_path: &str,
    ) -> Result<String, BagError> {
        let name = tagmanifest_name(algorithm);
        self.tag_manifests
            .get(&name)
            .map(|manifest| manifest.parsed_data.first_value_for_key(rel_path).to_string())
            .ok_or(BagError::ManifestNotFound(name))
    }

    /// Values of `tag_name` across every tag file
    pub fn get_tag_values(&self, tag_name: &str) -> TagValues {
        TagValues::collect(
            self.tag_files
                .values()
                .flat_map(|file| file.parsed_data.values_for_key(tag_name)),
        )
    }

    /// Values of `tag_name` in one tag file
    pub fn get_tag_values_from_file(&self, tag_file: &str, tag_name: &str) -> TagValues {
        match self.tag_files.get(tag_file) {
            Some(file) => TagValues::collect(file.parsed_data.values_for_key(tag_name).into_iter()),
            None => TagValues::default(),
        }
    }

    /// Rebuild the entries of every payload manifest from the payload checksums.
    ///
    /// Entries are sorted by path and replace whatever the manifest held before.
    pub fn add_checksums_to_manifests(&mut self) {
        for (name, manifest) in self.manifests.iter_mut() {
            let Some(algorithm) = ManifestName::parse(name).and_then(|name| name.algorithm().ok())
            else {
                continue;
            };

            manifest.parsed_data.clear();
            for (rel_path, file) in &self.payload {
                if let Some(checksum) = file.checksums.get(&algorithm) {
                    manifest.parsed_data.append(rel_path, checksum.to_string());
                }
            }
        }
    }

    /// Rebuild the entries of every tag manifest from the checksums of manifests and tag files.
    ///
    /// Payload files are not listed in tag manifests.
    pub fn add_checksums_to_tag_manifests(&mut self) {
        let mut covered = self
            .manifests
            .iter()
            .chain(self.tag_files.iter())
            .collect::<Vec<_>>();
        covered.sort_by(|(left, _), (right, _)| left.cmp(right));

        for (name, tag_manifest) in self.tag_manifests.iter_mut() {
            let Some(algorithm) = ManifestName::parse(name).and_then(|name| name.algorithm().ok())
            else {
                continue;
            };

            tag_manifest.parsed_data.clear();
            for (rel_path, file) in &covered {
                if let Some(checksum) = file.checksums.get(&algorithm) {
                    tag_manifest
                        .parsed_data
                        .append(rel_path.as_str(), checksum.to_string());
                }
            }
        }
    }

    /// Byte count and file count of the payload
    pub fn payload_oxum(&self) -> Oxum {
        self.payload
            .values()
            .fold(Oxum::default(), |oxum, file| Oxum {
                octet_count: oxum.octet_count + file.summary.size,
                stream_count: oxum.stream_count + 1,
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Checksum;

    fn summary(rel_path: &str, size: u64) -> FileSummary {
        let mut summary = FileSummary::synthesized(rel_path);
        summary.size = size;
        summary
    }

    fn sample_bag() -> Bag {
        let mut bag = Bag::new("/tmp/bags/sample");
        for (rel_path, size) in [
            ("data/b.txt", 2),
            ("data/a.txt", 1),
            ("bagit.txt", 55),
            ("bag-info.txt", 80),
            ("manifest-md5.txt", 0),
            ("manifest-sha256.txt", 0),
            ("tagmanifest-md5.txt", 0),
        ] {
            bag.add_file_from_summary(summary(rel_path, size));
        }

        for (rel_path, digest) in [
            ("data/a.txt", "0cc175b9c0f1b6a831c399e269772661"),
            ("data/b.txt", "92eb5ffee6ae2fec3ad71c777531578f"),
            ("bagit.txt", "4a8a08f09d37b73795649038408b5f33"),
            ("bag-info.txt", "8277e0910d750195b448797616e091ad"),
        ] {
            bag.get_file_mut(rel_path)
                .unwrap()
                .checksums
                .insert(Algorithm::Md5, Checksum::from(digest));
        }
        bag
    }

    #[test]
    fn classification() {
        for (input, output) in [
            ("data/a.txt", FileType::Payload),
            ("data/manifest-md5.txt", FileType::Payload),
            ("manifest-md5.txt", FileType::Manifest),
            ("tagmanifest-sha256.txt", FileType::TagManifest),
            ("bagit.txt", FileType::TagFile),
            ("dpn-tags/dpn-info.txt", FileType::TagFile),
            ("database/file.txt", FileType::TagFile),
        ] {
            assert_eq!(Bag::classify(input), output, "failing on input value `{input}`");
        }
    }

    #[test]
    fn re_adding_replaces() {
        let mut bag = sample_bag();
        let (file, file_type) = bag.add_file_from_summary(summary("data/a.txt", 10));
        assert_eq!(file_type, FileType::Payload);
        assert!(file.checksums.is_empty());

        assert_eq!(bag.payload.len(), 2);
        assert_eq!(bag.payload["data/a.txt"].summary.size, 10);
        assert_eq!(bag.tag_files.len(), 2);
        assert_eq!(bag.manifests.len(), 2);
        assert_eq!(bag.tag_manifests.len(), 1);
    }

    #[test]
    fn manifests_are_rebuilt_not_appended() {
        let mut bag = sample_bag();

        bag.add_checksums_to_manifests();
        let first = bag.manifests["manifest-md5.txt"].render();
        bag.add_checksums_to_manifests();
        let second = bag.manifests["manifest-md5.txt"].render();

        assert_eq!(first, second);
        assert_eq!(
            first,
            "0cc175b9c0f1b6a831c399e269772661 data/a.txt\n92eb5ffee6ae2fec3ad71c777531578f data/b.txt\n"
        );
        // No sha256 checksums were computed
        assert!(bag.manifests["manifest-sha256.txt"].parsed_data.is_empty());
    }

    #[test]
    fn tag_manifests_skip_payload() {
        let mut bag = sample_bag();
        bag.manifests
            .get_mut("manifest-md5.txt")
            .unwrap()
            .checksums
            .insert(Algorithm::Md5, Checksum::from("d41d8cd98f00b204e9800998ecf8427e"));

        bag.add_checksums_to_tag_manifests();
        bag.add_checksums_to_tag_manifests();

        let tag_manifest = &bag.tag_manifests["tagmanifest-md5.txt"];
        assert_eq!(
            tag_manifest.parsed_data.keys(),
            vec!["bag-info.txt", "bagit.txt", "manifest-md5.txt"]
        );
        assert_eq!(
            bag.get_checksum_from_tag_manifest(Algorithm::Md5, "bagit.txt"),
            Ok("4a8a08f09d37b73795649038408b5f33".to_string())
        );
        assert_eq!(
            bag.get_checksum_from_tag_manifest(Algorithm::Md5, "data/a.txt"),
            Ok(String::new())
        );
    }

    #[test]
    fn checksum_lookup() {
        let mut bag = sample_bag();
        bag.add_checksums_to_manifests();

        assert_eq!(
            bag.get_checksum_from_manifest(Algorithm::Md5, "data/b.txt"),
            Ok("92eb5ffee6ae2fec3ad71c777531578f".to_string())
        );
        assert_eq!(
            bag.get_checksum_from_manifest(Algorithm::Md5, "data/c.txt"),
            Ok(String::new())
        );
        assert_eq!(
            bag.get_checksum_from_manifest(Algorithm::Sha512, "data/b.txt"),
            Err(BagError::ManifestNotFound("manifest-sha512.txt".into()))
        );
    }

    #[test]
    fn tag_lookup() {
        let mut bag = sample_bag();
        let info = bag.get_file_mut("bag-info.txt").unwrap();
        info.parsed_data.append("Contact-Name", "Jo Doe");
        info.parsed_data.append("Internal-Sender-Description", "");
        let bagit = bag.get_file_mut("bagit.txt").unwrap();
        bagit.parsed_data.append("Contact-Name", "Sam Roe");

        assert_eq!(
            bag.get_tag_values_from_file("bag-info.txt", "Contact-Name"),
            TagValues {
                values: vec!["Jo Doe".into()],
                is_present: true,
                has_non_empty_value: true,
            }
        );
        assert_eq!(
            bag.get_tag_values_from_file("bag-info.txt", "Internal-Sender-Description"),
            TagValues {
                values: vec![String::new()],
                is_present: true,
                has_non_empty_value: false,
            }
        );
        assert_eq!(
            bag.get_tag_values_from_file("missing.txt", "Contact-Name"),
            TagValues::default()
        );
        assert_eq!(bag.get_tag_values("Contact-Name").values.len(), 2);
    }

    #[test]
    fn oxum_and_name() {
        let bag = sample_bag();
        assert_eq!(
            bag.payload_oxum(),
            Oxum {
                octet_count: 3,
                stream_count: 2
            }
        );
        assert_eq!(bag.name(), "sample");
        assert_eq!(Bag::new("/tmp/bags/sample.tar").name(), "sample");
    }
}
