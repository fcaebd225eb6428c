//! BagIt profiles: declarative rules a bag must follow to be valid for a given purpose.
//!
//! Profiles are JSON documents. Tag rules are nested in JSON (tag file, then tag name),
//! and flattened here into one table keyed by [`TagKey`].

use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::metadata::{BAGIT_TXT, BAG_INFO_TXT};
use crate::Algorithm;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
/// Errors while loading or saving a profile
pub enum ProfileError {
    /// Profile file could not be read
    #[error("Failed to read profile: {0}")]
    Read(#[from] std::io::Error),
    /// Not a profile, or not JSON at all
    #[error("Failed to parse profile: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug, PartialEq)]
/// Tag value rejected by its [`TagDefinition`]
pub enum TagValueError {
    /// Blank value where one is needed
    #[error("Tag `{0}` must have a value")]
    Empty(String),
    /// Value not in the allowed list
    #[error("Value `{value}` is not allowed for tag `{label}`, valid values are: {allowed}")]
    Value {
        /// Tag label
        label: String,
        /// Rejected value
        value: String,
        /// Allowed values, comma-separated
        allowed: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Whether a bag must be packed into a single file
pub enum Serialization {
    /// Bag must be a single file
    Required,
    /// Bag may be either
    #[default]
    Optional,
    /// Bag must be a directory
    Forbidden,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Who wrote the profile and what it is for
pub struct ProfileInfo {
    /// URL of the profile itself
    #[serde(rename = "BagIt-Profile-Identifier", default)]
    pub identifier: String,
    /// Email of the person maintaining the profile
    #[serde(rename = "Contact-Email", default)]
    pub contact_email: String,
    /// Person maintaining the profile
    #[serde(rename = "Contact-Name", default)]
    pub contact_name: String,
    /// What the profile is for
    #[serde(rename = "External-Description", default)]
    pub external_description: String,
    /// Organization publishing the profile
    #[serde(rename = "Source-Organization", default)]
    pub source_organization: String,
    /// Version of the profile
    #[serde(rename = "Version", default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Rule for one tag in one tag file
pub struct TagDefinition {
    /// Tag name, taken from the JSON key
    #[serde(skip)]
    pub label: String,
    /// Tag must appear
    #[serde(default)]
    pub required: bool,
    /// Tag may be blank
    #[serde(rename = "emptyOk", default)]
    pub empty_ok: bool,
    /// Allowed values, any value is allowed when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl TagDefinition {
    /// Check one value against the blank and allowed-values rules
    pub fn value_is_allowed(&self, value: &str) -> Result<(), TagValueError> {
        if value.trim().is_empty() {
            if self.empty_ok {
                return Ok(());
            }
            return Err(TagValueError::Empty(self.label.clone()));
        }

        if !self.values.is_empty() && !self.values.iter().any(|allowed| allowed == value) {
            return Err(TagValueError::Value {
                label: self.label.clone(),
                value: value.to_string(),
                allowed: self.values.join(", "),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// A tag is identified by the tag file holding it and its name
pub struct TagKey {
    /// Path relative to the bag root
    pub tag_file: String,
    /// Tag label
    pub tag_name: String,
}

impl TagKey {
    /// Key for `tag_name` in `tag_file`
    pub fn new(tag_file: impl Into<String>, tag_name: impl Into<String>) -> Self {
        Self {
            tag_file: tag_file.into(),
            tag_name: tag_name.into(),
        }
    }
}

/// JSON shape of a profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawProfile {
    #[serde(rename = "Accept-BagIt-Version", default)]
    accept_bagit_version: Vec<String>,
    #[serde(rename = "Accept-Serialization", default)]
    accept_serialization: Vec<String>,
    #[serde(rename = "Allow-Fetch.txt", default)]
    allow_fetch_txt: bool,
    #[serde(rename = "Allow-Misc-Top-Level-Files", default)]
    allow_misc_top_level_files: bool,
    #[serde(rename = "Allow-Misc-Directories", default)]
    allow_misc_directories: bool,
    #[serde(rename = "BagIt-Profile-Info", default)]
    info: ProfileInfo,
    #[serde(rename = "Manifests-Required", default)]
    manifests_required: Vec<String>,
    #[serde(rename = "Serialization", default)]
    serialization: Serialization,
    #[serde(rename = "Tag-Files-Required", default)]
    tag_files_required: BTreeMap<String, BTreeMap<String, TagDefinition>>,
    #[serde(rename = "Tag-Manifests-Required", default)]
    tag_manifests_required: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawProfile", into = "RawProfile")]
/// Rules governing which bags are valid.
///
/// Profiles are read once and never modified: builders and validators borrow them.
pub struct BagItProfile {
    /// Who wrote the profile
    pub info: ProfileInfo,
    /// BagIt versions a bag may declare
    pub accept_bagit_version: Vec<String>,
    /// MIME types
    pub accept_serialization: Vec<String>,
    /// Bags may carry `fetch.txt`
    pub allow_fetch_txt: bool,
    /// Top-level files other than manifests and required tag files
    pub allow_misc_top_level_files: bool,
    /// Top-level directories other than `data` and those holding required tag files
    pub allow_misc_directories: bool,
    /// Algorithm names, every bag carries a manifest for each
    pub manifests_required: Vec<String>,
    /// Algorithm names, every bag carries a tag manifest for each
    pub tag_manifests_required: Vec<String>,
    /// Whether bags must be, may be or cannot be tar files
    pub serialization: Serialization,
    /// Tag files that must exist, even when they declare no tag
    tag_files_required: BTreeSet<String>,
    tags: BTreeMap<TagKey, TagDefinition>,
}

impl From<RawProfile> for BagItProfile {
    fn from(raw: RawProfile) -> Self {
        let mut tag_files_required = BTreeSet::new();
        let mut tags = BTreeMap::new();

        for (tag_file, definitions) in raw.tag_files_required {
            for (tag_name, mut definition) in definitions {
                definition.label = tag_name.clone();
                tags.insert(TagKey::new(&tag_file, tag_name), definition);
            }
            tag_files_required.insert(tag_file);
        }

        Self {
            info: raw.info,
            accept_bagit_version: raw.accept_bagit_version,
            accept_serialization: raw.accept_serialization,
            allow_fetch_txt: raw.allow_fetch_txt,
            allow_misc_top_level_files: raw.allow_misc_top_level_files,
            allow_misc_directories: raw.allow_misc_directories,
            manifests_required: raw.manifests_required,
            tag_manifests_required: raw.tag_manifests_required,
            serialization: raw.serialization,
            tag_files_required,
            tags,
        }
    }
}

impl From<BagItProfile> for RawProfile {
    fn from(profile: BagItProfile) -> Self {
        let mut tag_files_required = profile
            .tag_files_required
            .into_iter()
            .map(|tag_file| (tag_file, BTreeMap::new()))
            .collect::<BTreeMap<_, _>>();
        for (key, definition) in profile.tags {
            tag_files_required
                .entry(key.tag_file)
                .or_default()
                .insert(key.tag_name, definition);
        }

        Self {
            accept_bagit_version: profile.accept_bagit_version,
            accept_serialization: profile.accept_serialization,
            allow_fetch_txt: profile.allow_fetch_txt,
            allow_misc_top_level_files: profile.allow_misc_top_level_files,
            allow_misc_directories: profile.allow_misc_directories,
            info: profile.info,
            manifests_required: profile.manifests_required,
            serialization: profile.serialization,
            tag_files_required,
            tag_manifests_required: profile.tag_manifests_required,
        }
    }
}

impl BagItProfile {
    /// Read a profile from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&contents)
    }

    /// Parse a profile from JSON text
    pub fn from_json(json: &str) -> Result<Self, ProfileError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pretty-printed JSON, readable back with [`BagItProfile::from_json()`]
    pub fn to_json(&self) -> Result<String, ProfileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Every structural problem of the profile, empty when the profile is usable
    pub fn validate(&self) -> Diagnostics {
        let mut problems = Diagnostics::default();

        if self.accept_bagit_version.is_empty() {
            problems.push(Diagnostic::empty(
                "Profile must accept at least one BagIt version.",
            ));
        }
        if self.manifests_required.is_empty() {
            problems.push(Diagnostic::empty(
                "Profile must require at least one manifest.",
            ));
        }
        for required in [BAGIT_TXT, BAG_INFO_TXT] {
            if !self.tag_files_required.contains(required) {
                problems.push(Diagnostic::value(format!(
                    "Profile must require tag file {required}."
                )));
            }
        }
        for name in self
            .manifests_required
            .iter()
            .chain(self.tag_manifests_required.iter())
        {
            if let Err(unsupported) = name.parse::<Algorithm>() {
                problems.push(Diagnostic::value(format!("Profile: {unsupported}.")));
            }
        }
        if self.serialization == Serialization::Required && self.accept_serialization.is_empty() {
            problems.push(Diagnostic::value(
                "Profile requires serialization but accepts no serialization format.",
            ));
        }

        problems
    }

    /// [`BagItProfile::validate()`] found nothing wrong
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Algorithms of required manifests, fails on the first unsupported name
    pub fn manifest_algorithms(&self) -> Result<Vec<Algorithm>, crate::UnsupportedAlgorithm> {
        Algorithm::parse_all(&self.manifests_required)
    }

    /// Algorithms of required tag manifests, fails on the first unsupported name
    pub fn tag_manifest_algorithms(
        &self,
    ) -> Result<Vec<Algorithm>, crate::UnsupportedAlgorithm> {
        Algorithm::parse_all(&self.tag_manifests_required)
    }

    /// Tag files the profile requires, sorted
    pub fn tag_files_required(&self) -> impl Iterator<Item = &str> {
        self.tag_files_required.iter().map(String::as_str)
    }

    /// `tag_file` must exist in every bag
    pub fn requires_tag_file(&self, tag_file: &str) -> bool {
        self.tag_files_required.contains(tag_file)
    }

    /// Every tag rule, sorted by tag file then tag name
    pub fn tag_definitions(&self) -> impl Iterator<Item = (&TagKey, &TagDefinition)> {
        self.tags.iter()
    }

    /// Rules for the tags of one tag file
    pub fn tags_in_file<'a>(
        &'a self,
        tag_file: &'a str,
    ) -> impl Iterator<Item = &'a TagDefinition> + 'a {
        self.tags
            .iter()
            .filter(move |(key, _)| key.tag_file == tag_file)
            .map(|(_, definition)| definition)
    }

    /// Rule for `tag_name` in `tag_file`, if the profile has one
    pub fn find_tag_definition(&self, tag_file: &str, tag_name: &str) -> Option<&TagDefinition> {
        self.tags.get(&TagKey::new(tag_file, tag_name))
    }

    /// Directories holding required tag files, e.g. `dpn-tags` for `dpn-tags/dpn-info.txt`
    pub fn required_tag_dirs(&self) -> Vec<String> {
        self.tag_files_required
            .iter()
            .filter_map(|tag_file| tag_file.rsplit_once('/'))
            .map(|(directory, _)| directory.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE_PROFILE: &str = r#"{
        "Accept-BagIt-Version": ["0.97", "1.0"],
        "Accept-Serialization": ["application/tar"],
        "Allow-Fetch.txt": false,
        "Allow-Misc-Top-Level-Files": false,
        "Allow-Misc-Directories": true,
        "BagIt-Profile-Info": {
            "BagIt-Profile-Identifier": "https://example.org/profiles/sample.json",
            "Contact-Email": "bags@example.org",
            "Contact-Name": "Bag Keeper",
            "External-Description": "Sample profile",
            "Source-Organization": "example.org",
            "Version": "1.2"
        },
        "Manifests-Required": ["sha256"],
        "Serialization": "optional",
        "Tag-Files-Required": {
            "bagit.txt": {
                "BagIt-Version": { "required": true },
                "Tag-File-Character-Encoding": { "required": true }
            },
            "bag-info.txt": {
                "Source-Organization": { "required": true },
                "Access": { "required": true, "values": ["Consortia", "Institution", "Restricted"] },
                "Internal-Sender-Description": { "required": false, "emptyOk": true }
            },
            "dpn-tags/dpn-info.txt": {
                "Member-Id": { "required": true }
            },
            "custom-tags/empty.txt": {}
        },
        "Tag-Manifests-Required": ["md5"]
    }"#;

    #[test]
    fn load_from_json() {
        let profile = BagItProfile::from_json(SAMPLE_PROFILE).unwrap();

        assert_eq!(profile.accept_bagit_version, vec!["0.97", "1.0"]);
        assert_eq!(profile.serialization, Serialization::Optional);
        assert_eq!(profile.info.contact_name, "Bag Keeper");
        assert!(profile.allow_misc_directories);
        assert!(!profile.allow_fetch_txt);

        let access = profile.find_tag_definition("bag-info.txt", "Access").unwrap();
        assert_eq!(access.label, "Access");
        assert!(access.required);
        assert!(!access.empty_ok);
        assert_eq!(access.values.len(), 3);

        assert_eq!(
            profile.tag_files_required().collect::<Vec<_>>(),
            vec![
                "bag-info.txt",
                "bagit.txt",
                "custom-tags/empty.txt",
                "dpn-tags/dpn-info.txt"
            ]
        );
        assert_eq!(profile.tags_in_file("bag-info.txt").count(), 3);
        assert_eq!(profile.tag_definitions().count(), 6);
        assert_eq!(profile.manifest_algorithms(), Ok(vec![Algorithm::Sha256]));
        assert_eq!(profile.tag_manifest_algorithms(), Ok(vec![Algorithm::Md5]));
        assert!(profile.is_valid());
    }

    #[tokio::test]
    async fn load_fixture() {
        let mut path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("tests/fixtures/profile.json");

        let profile = BagItProfile::load(&path).await.unwrap();
        assert!(profile.is_valid(), "{:?}", profile.validate());
        assert_eq!(profile.info.version, "1.0");
        assert!(profile
            .find_tag_definition(BAG_INFO_TXT, "Payload-Oxum")
            .is_some_and(|definition| definition.required));

        assert!(matches!(
            BagItProfile::load(path.with_file_name("missing.json")).await,
            Err(ProfileError::Read(_))
        ));
    }

    #[test]
    fn json_round_trip() {
        let profile = BagItProfile::from_json(SAMPLE_PROFILE).unwrap();
        let reloaded = BagItProfile::from_json(&profile.to_json().unwrap()).unwrap();
        assert_eq!(profile, reloaded);
        assert!(reloaded.requires_tag_file("custom-tags/empty.txt"));
    }

    #[test]
    fn structural_problems_are_all_reported() {
        let profile = BagItProfile::from_json(
            r#"{
                "Manifests-Required": [],
                "Tag-Manifests-Required": ["crc32"],
                "Serialization": "required",
                "Tag-Files-Required": { "bagit.txt": {} }
            }"#,
        )
        .unwrap();

        assert_eq!(
            profile.validate().messages(),
            vec![
                "Profile must accept at least one BagIt version.",
                "Profile must require at least one manifest.",
                "Profile must require tag file bag-info.txt.",
                "Profile: Unsupported checksum algorithm `crc32`.",
                "Profile requires serialization but accepts no serialization format.",
            ]
        );
    }

    #[test]
    fn tag_dirs() {
        let profile = BagItProfile::from_json(SAMPLE_PROFILE).unwrap();
        assert_eq!(profile.required_tag_dirs(), vec!["custom-tags", "dpn-tags"]);
    }

    #[test]
    fn allowed_values() {
        let profile = BagItProfile::from_json(SAMPLE_PROFILE).unwrap();

        let access = profile.find_tag_definition("bag-info.txt", "Access").unwrap();
        assert_eq!(access.value_is_allowed("Institution"), Ok(()));
        assert_eq!(
            access.value_is_allowed("  "),
            Err(TagValueError::Empty("Access".into()))
        );
        assert_eq!(
            access.value_is_allowed("Public"),
            Err(TagValueError::Value {
                label: "Access".into(),
                value: "Public".into(),
                allowed: "Consortia, Institution, Restricted".into(),
            })
        );

        let description = profile
            .find_tag_definition("bag-info.txt", "Internal-Sender-Description")
            .unwrap();
        assert_eq!(description.value_is_allowed(""), Ok(()));
        assert_eq!(description.value_is_allowed("anything"), Ok(()));
    }
}
