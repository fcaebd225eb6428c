//! Check a bag, directory or tar file, against a [`BagItProfile`].

use crate::bag::{Bag, TagValues};
use crate::checksum::hash_only;
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::file::FileType;
use crate::iterator::{open_iterator, MemberRead, ReadIterator};
use crate::manifest::{
    manifest_name, tagmanifest_name, ManifestKind, ManifestName, MANIFEST_PATTERN,
    TAG_MANIFEST_PATTERN,
};
use crate::metadata::{
    Oxum, BAGIT_TXT, BAG_INFO_TXT, FETCH_TXT, KEY_OXUM, KEY_VERSION, PAYLOAD_DIRECTORY,
};
use crate::profile::{BagItProfile, Serialization, TagDefinition, TagKey, TagValueError};
use crate::Algorithm;
use std::collections::BTreeSet;
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::AsyncSeekExt;
use tracing::{debug, info, warn};

/// MIME types of a serialized bag, from its file extension
fn mime_types(extension: &str) -> &'static [&'static str] {
    match extension {
        "tar" => &["application/tar", "application/x-tar"],
        _ => &[],
    }
}

/// Problems with one profile tag, given what the bag says about it
pub(crate) fn check_tag(
    key: &TagKey,
    definition: &TagDefinition,
    values: &TagValues,
) -> Vec<Diagnostic> {
    if !values.is_present {
        if definition.required {
            return vec![Diagnostic::empty(format!(
                "Required tag `{}` is missing",
                key.tag_name
            ))
            .at(&key.tag_file, None)];
        }
        return Vec::new();
    }

    if !values.has_non_empty_value {
        if definition.empty_ok {
            return Vec::new();
        }
        return vec![
            Diagnostic::empty(TagValueError::Empty(key.tag_name.clone()).to_string())
                .at(&key.tag_file, None),
        ];
    }

    values
        .values
        .iter()
        .filter_map(|value| definition.value_is_allowed(value).err())
        .map(|error| {
            let diagnostic = match error {
                TagValueError::Empty(_) => Diagnostic::empty(error.to_string()),
                TagValueError::Value { .. } => Diagnostic::value(error.to_string()),
            };
            diagnostic.at(&key.tag_file, None)
        })
        .collect()
}

/// Validates one bag, then is discarded.
///
/// Every `validate_*` check reads the bag first if that has not happened yet, and returns
/// `true` when it found nothing wrong. Problems are collected in [`Validator::errors()`].
#[derive(Debug)]
pub struct Validator<'p> {
    bag: Bag,
    profile: &'p BagItProfile,
    errors: Diagnostics,
    /// Algorithms of the manifests found in the bag
    manifest_algorithms: BTreeSet<Algorithm>,
    /// Algorithms of the tag manifests found in the bag
    tag_manifest_algorithms: BTreeSet<Algorithm>,
    bag_read: bool,
    /// Top-level directories inside the bag
    top_level_dirs: BTreeSet<String>,
    /// Top-level directories of the tar file, the bag itself
    untarred_dir_names: Vec<String>,
    /// Payload and manifests disagree on which files exist
    payload_files_missing: bool,
}

impl<'p> Validator<'p> {
    /// Validate the bag at `path`, a directory or a `.tar` file
    pub fn new(path: impl AsRef<Path>, profile: &'p BagItProfile) -> Self {
        Self {
            bag: Bag::new(path),
            profile,
            errors: Diagnostics::default(),
            manifest_algorithms: BTreeSet::new(),
            tag_manifest_algorithms: BTreeSet::new(),
            bag_read: false,
            top_level_dirs: BTreeSet::new(),
            untarred_dir_names: Vec::new(),
            payload_files_missing: false,
        }
    }

    /// Bag as read so far
    pub fn bag(&self) -> &Bag {
        &self.bag
    }

    /// Problems found so far
    pub fn errors(&self) -> &Diagnostics {
        &self.errors
    }

    /// Run every check, returns `true` when the bag is valid
    pub async fn validate(&mut self) -> bool {
        info!(bag = %self.bag.path().display(), "validating bag");

        let problems = self.profile.validate();
        if !problems.is_empty() {
            self.errors.extend(problems);
            return false;
        }

        self.validate_serialization();
        self.read_bag().await;

        // A misnamed top-level directory makes every file look missing
        if let Some(mismatch) = self.untar_dir_mismatch() {
            warn!(bag = %self.bag.path().display(), "{mismatch}");
            self.errors.clear();
            self.errors.push(mismatch);
            return false;
        }

        self.validate_serialization_format().await;
        self.validate_top_level_files().await;
        self.validate_misc_directories().await;
        self.validate_bagit_version().await;
        self.validate_allow_fetch().await;
        self.validate_required_manifests().await;
        self.validate_tag_files().await;
        self.validate_checksums().await;
        // Files already reported as missing would also count against the oxum
        if !self.payload_files_missing {
            self.validate_payload_oxum().await;
        }

        if self.errors.is_empty() {
            info!(bag = %self.bag.path().display(), "bag is valid");
        } else {
            info!(
                bag = %self.bag.path().display(),
                errors = self.errors.len(),
                "bag is not valid"
            );
        }
        self.errors.is_empty()
    }

    fn record(&mut self, problems: Vec<Diagnostic>) -> bool {
        let valid = problems.is_empty();
        self.errors.extend(problems);
        valid
    }

    /// Read every member of the bag once, computing checksums and parsing text files
    pub async fn read_bag(&mut self) {
        if self.bag_read {
            return;
        }
        self.bag_read = true;

        if let Err(diagnostic) = self.read_members().await {
            self.errors.push(diagnostic);
        }
        debug!(
            bag = %self.bag.path().display(),
            payload_files = self.bag.payload.len(),
            tag_files = self.bag.tag_files.len(),
            "bag read"
        );
    }

    async fn read_members(&mut self) -> Result<(), Diagnostic> {
        let path = self.bag.path().to_path_buf();
        let read_error =
            |e: &dyn std::fmt::Display| Diagnostic::runtime(format!("Cannot read bag {}: {e}", path.display()));

        let mut iterator = open_iterator(&path).await.map_err(|e| read_error(&e))?;
        self.discover_algorithms(iterator.as_mut()).await?;

        let payload_algorithms = self
            .profile
            .manifest_algorithms()
            .unwrap_or_default()
            .into_iter()
            .chain(self.manifest_algorithms.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let tag_algorithms = self
            .profile
            .tag_manifest_algorithms()
            .unwrap_or_default()
            .into_iter()
            .chain(self.tag_manifest_algorithms.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();

        while let Some((summary, reader)) = iterator.next().await.map_err(|e| read_error(&e))? {
            if let Some(dir) = summary.top_level_dir() {
                self.top_level_dirs.insert(dir.to_string());
            }
            let Some(mut reader) = reader else {
                continue;
            };

            let rel_path = summary.rel_path.clone();
            let (file, file_type) = self.bag.add_file_from_summary(summary);
            let needs_parsing = match file_type {
                FileType::Payload => false,
                FileType::Manifest | FileType::TagManifest => true,
                FileType::TagFile => {
                    self.profile.requires_tag_file(&rel_path)
                        || self.profile.tags_in_file(&rel_path).next().is_some()
                }
            };
            let algorithms = match file_type {
                FileType::Payload => &payload_algorithms,
                _ => &tag_algorithms,
            };

            if !algorithms.is_empty() {
                match hash_only(&mut reader, algorithms).await {
                    Ok(checksums) => file.checksums = checksums,
                    Err(e) => {
                        self.errors.push(
                            Diagnostic::runtime(format!("Cannot compute checksums: {e}"))
                                .at(&rel_path, None),
                        );
                        continue;
                    }
                }

                if needs_parsing {
                    reader = rewind(reader, iterator.as_mut(), &rel_path).await?;
                }
            }

            if needs_parsing {
                let parsed = match file_type {
                    FileType::TagFile => file.parse_as_tag_file(&mut reader).await,
                    _ => file.parse_as_manifest(&mut reader).await,
                };
                if let Err(e) = parsed {
                    self.errors.push(Diagnostic::from(e));
                }
            }
        }

        if self.bag.is_serialized() {
            self.untarred_dir_names = iterator.top_level_dir_names();
        }
        Ok(())
    }

    /// Bags may carry more manifests than the profile requires
    async fn discover_algorithms(
        &mut self,
        iterator: &mut dyn ReadIterator,
    ) -> Result<(), Diagnostic> {
        let mut names = Vec::new();
        for pattern in [&*MANIFEST_PATTERN, &*TAG_MANIFEST_PATTERN] {
            names.extend(
                iterator
                    .find_matching_files(pattern)
                    .await
                    .map_err(|e| Diagnostic::runtime(format!("Cannot list manifests: {e}")))?,
            );
        }

        for name in &names {
            let Some(manifest) = ManifestName::parse(name) else {
                continue;
            };
            match manifest.algorithm() {
                Ok(algorithm) => {
                    let found = match manifest.kind {
                        ManifestKind::Payload => &mut self.manifest_algorithms,
                        ManifestKind::Tag => &mut self.tag_manifest_algorithms,
                    };
                    found.insert(algorithm);
                }
                Err(e) => {
                    self.errors.push(Diagnostic::value(e.to_string()).at(name, None));
                }
            }
        }
        Ok(())
    }

    /// Serialization of the bag matches the profile's requirement
    pub fn validate_serialization(&mut self) -> bool {
        let serialized = self.bag.is_serialized();
        let problem = match self.profile.serialization {
            Serialization::Required if !serialized => Some(
                "Profile requires serialization, but bag is a directory",
            ),
            Serialization::Forbidden if serialized => Some(
                "Profile prohibits serialization, but bag is a file",
            ),
            _ => None,
        };
        self.record(problem.map(Diagnostic::value).into_iter().collect())
    }

    /// File type of a serialized bag is one the profile accepts.
    ///
    /// An empty accept list does not restrict formats.
    pub async fn validate_serialization_format(&mut self) -> bool {
        self.read_bag().await;
        if !self.bag.is_serialized() || self.profile.accept_serialization.is_empty() {
            return true;
        }

        let extension = self
            .bag
            .path()
            .extension()
            .map(|extension| extension.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let accepted = mime_types(&extension)
            .iter()
            .any(|mime| self.profile.accept_serialization.iter().any(|a| a == mime));

        let mut problems = Vec::new();
        if !accepted {
            problems.push(Diagnostic::value(format!(
                "Serialization format `.{extension}` is not in the Accept-Serialization list of this profile"
            )));
        }
        self.record(problems)
    }

    /// Top-level files are manifests or tag files the profile requires
    pub async fn validate_top_level_files(&mut self) -> bool {
        self.read_bag().await;
        if self.profile.allow_misc_top_level_files {
            return true;
        }

        let problems = self
            .bag
            .tag_files
            .keys()
            .filter(|rel_path| !rel_path.contains('/'))
            .filter(|rel_path| {
                rel_path.as_str() != FETCH_TXT && !self.profile.requires_tag_file(rel_path)
            })
            .map(|rel_path| {
                Diagnostic::value(format!(
                    "Non-standard file '{rel_path}' is not allowed in the top-level directory when Allow-Misc-Top-Level-Files is false"
                ))
            })
            .collect();
        self.record(problems)
    }

    /// Top-level directories are `data` or hold tag files the profile requires
    pub async fn validate_misc_directories(&mut self) -> bool {
        self.read_bag().await;
        if self.profile.allow_misc_directories {
            return true;
        }

        let allowed = self
            .profile
            .required_tag_dirs()
            .iter()
            .filter_map(|dir| dir.split('/').next())
            .map(str::to_string)
            .chain([PAYLOAD_DIRECTORY.to_string()])
            .collect::<BTreeSet<_>>();

        let problems = self
            .top_level_dirs
            .difference(&allowed)
            .map(|dir| {
                Diagnostic::value(format!(
                    "Directory '{dir}' is not allowed in the top-level directory when Allow-Misc-Directories is false"
                ))
            })
            .collect();
        self.record(problems)
    }

    fn untar_dir_mismatch(&self) -> Option<Diagnostic> {
        let expected = self.bag.name();
        self.untarred_dir_names
            .iter()
            .find(|name| **name != expected)
            .map(|name| {
                Diagnostic::value(format!(
                    "Bag should untar to directory '{expected}', not '{name}'"
                ))
            })
    }

    /// A tar bag unpacks into one directory named like the tar file
    pub async fn validate_untar_dir_name(&mut self) -> bool {
        self.read_bag().await;
        let problems = self.untar_dir_mismatch().into_iter().collect();
        self.record(problems)
    }

    /// `bagit.txt` declares a version the profile accepts
    pub async fn validate_bagit_version(&mut self) -> bool {
        self.read_bag().await;

        let versions = self.bag.get_tag_values_from_file(BAGIT_TXT, KEY_VERSION);
        let mut problems = Vec::new();
        if !versions.has_non_empty_value {
            problems.push(
                Diagnostic::empty(format!("Tag `{KEY_VERSION}` is missing")).at(BAGIT_TXT, None),
            );
        }
        for version in versions.values.iter().map(|version| version.trim()) {
            if !version.is_empty() && !self.profile.accept_bagit_version.iter().any(|v| v == version)
            {
                problems.push(Diagnostic::value(format!(
                    "BagIt version {version} is not in the Accept-BagIt-Version list of this profile"
                )));
            }
        }
        self.record(problems)
    }

    /// No `fetch.txt` unless the profile allows it
    pub async fn validate_allow_fetch(&mut self) -> bool {
        self.read_bag().await;

        let mut problems = Vec::new();
        if !self.profile.allow_fetch_txt && self.bag.get_file(FETCH_TXT).is_some() {
            problems.push(Diagnostic::value(format!(
                "Bag includes {FETCH_TXT}, which this profile does not allow"
            )));
        }
        self.record(problems)
    }

    /// At least one manifest, and every manifest the profile requires
    pub async fn validate_required_manifests(&mut self) -> bool {
        self.read_bag().await;

        let mut problems = Vec::new();
        if self.bag.manifests.is_empty() {
            problems.push(Diagnostic::empty("Bag has no payload manifest"));
        }

        let required = self
            .profile
            .manifest_algorithms()
            .unwrap_or_default()
            .into_iter()
            .map(manifest_name)
            .filter(|name| !self.bag.manifests.contains_key(name));
        let required_tag = self
            .profile
            .tag_manifest_algorithms()
            .unwrap_or_default()
            .into_iter()
            .map(tagmanifest_name)
            .filter(|name| !self.bag.tag_manifests.contains_key(name));
        for name in required.chain(required_tag) {
            problems.push(Diagnostic::empty(format!(
                "Required manifest {name} is missing"
            )));
        }
        self.record(problems)
    }

    /// Required tag files exist, and every tag follows its definition
    pub async fn validate_tag_files(&mut self) -> bool {
        self.read_bag().await;

        let mut problems = Vec::new();
        let mut missing_files = BTreeSet::new();
        for tag_file in self.profile.tag_files_required() {
            if !self.bag.tag_files.contains_key(tag_file) {
                problems.push(Diagnostic::empty(format!(
                    "Required tag file {tag_file} is missing"
                )));
                missing_files.insert(tag_file);
            }
        }

        for (key, definition) in self.profile.tag_definitions() {
            if missing_files.contains(key.tag_file.as_str()) {
                continue;
            }
            problems.extend(self.tag_problems(key, definition));
        }
        self.record(problems)
    }

    /// Problems of a single profile tag
    pub fn validate_tag(&mut self, key: &TagKey, definition: &TagDefinition) -> bool {
        let problems = self.tag_problems(key, definition);
        self.record(problems)
    }

    fn tag_problems(&self, key: &TagKey, definition: &TagDefinition) -> Vec<Diagnostic> {
        let values = self
            .bag
            .get_tag_values_from_file(&key.tag_file, &key.tag_name);
        check_tag(key, definition, &values)
    }

    /// Digests in every manifest match the files, in both directions for payload
    pub async fn validate_checksums(&mut self) -> bool {
        self.read_bag().await;

        let mut problems = Vec::new();
        // Reported once, naming the first manifest that lists the file
        let mut not_on_disk = BTreeSet::new();
        let mut unlisted = false;
        for (manifest_path, manifest) in &self.bag.manifests {
            let Some(algorithm) = manifest_algorithm(manifest_path) else {
                continue;
            };

            for (rel_path, file) in &self.bag.payload {
                let expected = manifest.parsed_data.first_value_for_key(rel_path);
                if expected.is_empty() {
                    unlisted = true;
                    problems.push(Diagnostic::value(format!(
                        "File '{rel_path}' in the data directory is missing from {manifest_path}"
                    )));
                    continue;
                }
                problems.extend(compare_digest(manifest_path, rel_path, expected, file, algorithm));
            }

            for rel_path in manifest.parsed_data.keys() {
                if !self.bag.payload.contains_key(rel_path) && not_on_disk.insert(rel_path) {
                    problems.push(Diagnostic::value(format!(
                        "File '{rel_path}' in {manifest_path} is missing from the data directory"
                    )));
                }
            }
        }
        self.payload_files_missing = unlisted || !not_on_disk.is_empty();

        for (tag_manifest_path, tag_manifest) in &self.bag.tag_manifests {
            let Some(algorithm) = manifest_algorithm(tag_manifest_path) else {
                continue;
            };

            for (rel_path, file) in self.bag.manifests.iter().chain(&self.bag.tag_files) {
                let expected = tag_manifest.parsed_data.first_value_for_key(rel_path);
                // Tag files may be left out of tag manifests
                if expected.is_empty() {
                    continue;
                }
                problems.extend(compare_digest(
                    tag_manifest_path,
                    rel_path,
                    expected,
                    file,
                    algorithm,
                ));
            }

            for rel_path in tag_manifest.parsed_data.keys() {
                if self.bag.get_file(rel_path).is_none() {
                    problems.push(Diagnostic::value(format!(
                        "File '{rel_path}' in {tag_manifest_path} does not exist in the bag"
                    )));
                }
            }
        }

        self.record(problems)
    }

    /// `Payload-Oxum`, when present, matches the payload
    pub async fn validate_payload_oxum(&mut self) -> bool {
        self.read_bag().await;

        let declared = self.bag.get_tag_values_from_file(BAG_INFO_TXT, KEY_OXUM);
        let Some(value) = declared.values.first() else {
            return true;
        };

        let actual = self.bag.payload_oxum();
        let problem = match value.parse::<Oxum>() {
            Err(e) => Some(Diagnostic::value(e.to_string()).at(BAG_INFO_TXT, None)),
            Ok(oxum) if oxum != actual => Some(
                Diagnostic::value(format!(
                    "{KEY_OXUM} is {oxum}, but the payload is {actual}"
                ))
                .at(BAG_INFO_TXT, None),
            ),
            Ok(_) => None,
        };
        self.record(problem.into_iter().collect())
    }
}

/// Algorithm of a manifest found in the bag, unsupported ones were reported while reading
fn manifest_algorithm(rel_path: &str) -> Option<Algorithm> {
    ManifestName::parse(rel_path).and_then(|name| name.algorithm().ok())
}

fn compare_digest(
    manifest_path: &str,
    rel_path: &str,
    expected: &str,
    file: &crate::File,
    algorithm: Algorithm,
) -> Option<Diagnostic> {
    let actual = file
        .checksums
        .get(&algorithm)
        .map(ToString::to_string)
        .unwrap_or_default();
    (actual != expected).then(|| {
        Diagnostic::value(format!(
            "Digest for '{rel_path}' in {manifest_path} is {expected}, but the file digest is {actual}"
        ))
    })
}

/// Reader positioned back at the start of `rel_path`
async fn rewind(
    mut reader: Box<dyn MemberRead>,
    iterator: &mut dyn ReadIterator,
    rel_path: &str,
) -> Result<Box<dyn MemberRead>, Diagnostic> {
    let reopen_error = |e: &dyn std::fmt::Display| {
        Diagnostic::runtime(format!("Cannot read again: {e}")).at(rel_path, None)
    };

    if let Some(seekable) = reader.as_seekable() {
        seekable
            .seek(SeekFrom::Start(0))
            .await
            .map_err(|e| reopen_error(&e))?;
        return Ok(reader);
    }

    drop(reader);
    iterator
        .open_file(rel_path)
        .await
        .map_err(|e| reopen_error(&e))
}
