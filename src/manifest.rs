//! Naming of manifests and tag manifests: `manifest-<algorithm>.txt` and `tagmanifest-<algorithm>.txt`.
//!
//! Every place that needs to know whether a path is a manifest, or which algorithm a
//! manifest uses, goes through [`ManifestName`].

use crate::algorithm::{Algorithm, UnsupportedAlgorithm};
use regex::Regex;
use std::sync::LazyLock;

/// Manifests live at the top level of the bag
pub(crate) static MANIFEST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^manifest-([^/]+)\.txt$").unwrap());

pub(crate) static TAG_MANIFEST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^tagmanifest-([^/]+)\.txt$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which files a manifest covers
pub enum ManifestKind {
    /// Checksums of payload files
    Payload,
    /// Checksums of tag files and payload manifests
    Tag,
}

impl ManifestKind {
    fn prefix(&self) -> &'static str {
        match self {
            ManifestKind::Payload => "manifest",
            ManifestKind::Tag => "tagmanifest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// File name of a manifest, split into its parts
pub struct ManifestName<'a> {
    /// Payload or tag manifest
    pub kind: ManifestKind,
    /// Algorithm as spelled in the file name, may be unsupported
    pub algorithm_name: &'a str,
}

impl<'a> ManifestName<'a> {
    /// Recognize a manifest from its path relative to the bag root
    pub fn parse(rel_path: &'a str) -> Option<Self> {
        let (kind, captures) = if let Some(captures) = TAG_MANIFEST_PATTERN.captures(rel_path) {
            (ManifestKind::Tag, captures)
        } else {
            (ManifestKind::Payload, MANIFEST_PATTERN.captures(rel_path)?)
        };

        let algorithm_name = captures.get(1)?.as_str();
        Some(Self {
            kind,
            algorithm_name,
        })
    }

    /// Algorithm named in the file name, if supported
    pub fn algorithm(&self) -> Result<Algorithm, UnsupportedAlgorithm> {
        self.algorithm_name.parse()
    }
}

/// `manifest-<algorithm>.txt`
pub fn manifest_name(algorithm: Algorithm) -> String {
    file_name(ManifestKind::Payload, algorithm)
}

/// `tagmanifest-<algorithm>.txt`
pub fn tagmanifest_name(algorithm: Algorithm) -> String {
    file_name(ManifestKind::Tag, algorithm)
}

fn file_name(kind: ManifestKind, algorithm: Algorithm) -> String {
    format!("{}-{}.txt", kind.prefix(), algorithm)
}
