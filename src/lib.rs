#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))] // https://stackoverflow.com/a/61417700/4809297

/*!

Rust library to create and validate BagIt containers against BagIt profiles, with the [Tokio async runtime](https://docs.rs/tokio).

# Learn about BagIt

Here are some resources to get started with BagIt containers:

- The [Wikipedia article](https://en.wikipedia.org/wiki/BagIt) to get started with the format or to get a brief explanation
- The spec of the container format: [RFC 8493](https://datatracker.ietf.org/doc/html/rfc8493)
- The [BagIt Profiles specification](https://bagit-profiles.github.io/bagit-profiles-specification/), for the JSON rules bags are checked against

A bag is either a directory or a `.tar` file unpacking into a single directory named like the file.
Checksums can be md4, md5, sha1, sha224, sha256, sha384 or sha512.

## Create a bag

```no_run
use async_bagit::{BagItProfile, Bagger};

# #[tokio::main]
# async fn main() -> Result<(), Box<dyn std::error::Error>> {
// Rules the bag must follow
let profile = BagItProfile::load("/somewhere/profile.json").await?;

// Ending the path with `.tar` makes a serialized bag
let mut bagger = Bagger::new("/somewhere/where/the/bag/will/be/placed", &profile);

// Add files inside bag
bagger.add_payload_directory("/my/documents").await?;
bagger.add_file("/my/handbag.jpg", "data/photos/handbag.jpg").await?;

// Tags go in tag files
bagger.add_tag("bag-info.txt", "Source-Organization", "Bag Makers Inc.")?;

// Write everything: payload, tag files, manifests
if !bagger.write_bag(false, true).await {
    for error in bagger.errors() {
        eprintln!("{error}");
    }
}

# Ok(())
# }
```

## Validate a bag

```no_run
use async_bagit::{BagItProfile, Validator};

# #[tokio::main]
# async fn main() -> Result<(), Box<dyn std::error::Error>> {
let profile = BagItProfile::load("/somewhere/profile.json").await?;

let mut validator = Validator::new("/somewhere/my-bag.tar", &profile);
if validator.validate().await {
    // This bag is complete and valid! You can use files knowing their data is safe to use.
    let bag = validator.bag();
    println!("{} payload files", bag.payload.len());
} else {
    for error in validator.errors() {
        eprintln!("{error}");
    }
}

# Ok(())
# }
```

*/

mod algorithm;
mod bag;
#[cfg(feature = "generate")]
#[cfg_attr(docsrs, doc(cfg(feature = "generate")))]
mod bagger;
mod checksum;
mod diagnostic;
mod file;
pub mod iterator;
mod key_value;
mod manifest;
pub mod metadata;
mod profile;
#[cfg(feature = "generate")]
#[cfg_attr(docsrs, doc(cfg(feature = "generate")))]
mod serialize;
mod summary;
mod validator;

/// Possible errors when manipulating BagIt containers
pub mod error {
    pub use crate::algorithm::UnsupportedAlgorithm;
    pub use crate::bag::BagError;
    #[cfg(feature = "generate")]
    pub use crate::bagger::BaggerError;
    pub use crate::checksum::ChecksumComputeError;
    pub use crate::file::{ParseError, WriteError};
    pub use crate::iterator::IteratorError;
    pub use crate::metadata::MetadataError;
    pub use crate::profile::{ProfileError, TagValueError};
    #[cfg(feature = "generate")]
    pub use crate::serialize::SerializeError;
}

pub use algorithm::{Algorithm, UnsupportedAlgorithm};
pub use bag::{Bag, TagValues};
#[cfg(feature = "generate")]
pub use bagger::{looks_safe_to_delete, Bagger};
pub use checksum::{hash_only, hash_while_copying, Checksum, Checksums};
pub use diagnostic::{Diagnostic, DiagnosticKind, Diagnostics, Locator};
pub use file::{File, FileType};
pub use iterator::{open_iterator, ReadIterator};
pub use key_value::{KeyValueCollection, KeyValuePair};
pub use manifest::{manifest_name, tagmanifest_name, ManifestKind, ManifestName};
pub use profile::{BagItProfile, ProfileInfo, Serialization, TagDefinition, TagKey};
#[cfg(feature = "generate")]
pub use serialize::tar_directory;
pub use summary::FileSummary;
pub use validator::Validator;

#[cfg(all(test, feature = "generate"))]
mod test {
    use crate::{BagItProfile, Bagger, Validator};
    use std::path::Path;

    const PROFILE: &str = r#"{
        "BagIt-Profile-Info": {
            "BagIt-Profile-Identifier": "https://example.org/profiles/round-trip.json",
            "Source-Organization": "example.org",
            "Version": "1.0"
        },
        "Accept-BagIt-Version": ["1.0"],
        "Accept-Serialization": ["application/tar", "application/x-tar"],
        "Allow-Fetch.txt": false,
        "Allow-Misc-Top-Level-Files": false,
        "Allow-Misc-Directories": false,
        "Manifests-Required": ["sha256", "md5"],
        "Tag-Manifests-Required": ["sha256"],
        "Serialization": "optional",
        "Tag-Files-Required": {
            "bagit.txt": {
                "BagIt-Version": { "required": true },
                "Tag-File-Character-Encoding": { "required": true }
            },
            "bag-info.txt": {
                "Source-Organization": { "required": true },
                "Bagging-Date": { "required": false },
                "Payload-Oxum": { "required": true },
                "Internal-Sender-Description": { "required": false, "emptyOk": true }
            },
            "custom-tags/rights.txt": {
                "Rights-Statement": { "required": true, "values": ["In Copyright", "No Known Copyright"] }
            }
        }
    }"#;

    fn write_sources(directory: &Path) {
        let data = directory.join("data");
        std::fs::create_dir_all(data.join("bags")).unwrap();
        std::fs::write(data.join("bagit.md"), "# BagIt\n\nHierarchical file packaging.\n").unwrap();
        std::fs::write(data.join("sources.csv"), "name,url\nrfc,https://www.rfc-editor.org/rfc/rfc8493\n").unwrap();
        std::fs::write(data.join("bags/paper_bag.txt"), "paper ".repeat(1000)).unwrap();
        std::fs::write(data.join("bags/totebag.txt"), "").unwrap();
    }

    async fn round_trip(bag_name: &str) {
        let temp_directory = async_tempfile::TempDir::new().await.unwrap();
        let temp_directory = temp_directory.to_path_buf();
        let profile = BagItProfile::from_json(PROFILE).unwrap();

        let sources = temp_directory.join("sources");
        write_sources(&sources);
        let bag_path = temp_directory.join("bags").join(bag_name);

        // Create the bag
        {
            let mut bagger = Bagger::new(&bag_path, &profile);
            assert_eq!(bagger.add_payload_directory(sources.join("data")).await, Ok(4));
            bagger
                .add_tag("bag-info.txt", "Source-Organization", "Bag Makers Inc.")
                .unwrap();
            bagger
                .add_tag(
                    "bag-info.txt",
                    "External-Description",
                    &"A bag made of many words, long enough to be folded. ".repeat(4),
                )
                .unwrap();
            bagger
                .add_tag("custom-tags/rights.txt", "Rights-Statement", "In Copyright")
                .unwrap();

            assert!(bagger.write_bag(false, true).await, "{:?}", bagger.errors());
        }

        // Start from a blank slate to validate the bag
        {
            let mut validator = Validator::new(&bag_path, &profile);
            assert!(validator.validate().await, "{:?}", validator.errors());

            let bag = validator.bag();
            assert_eq!(
                bag.payload.keys().collect::<Vec<_>>(),
                vec![
                    "data/bagit.md",
                    "data/bags/paper_bag.txt",
                    "data/bags/totebag.txt",
                    "data/sources.csv"
                ]
            );
            assert_eq!(bag.manifests.len(), 2);
            assert_eq!(bag.tag_manifests.len(), 1);
            assert_eq!(
                bag.get_tag_values_from_file("bag-info.txt", "Payload-Oxum").values,
                vec![bag.payload_oxum().to_string()]
            );
            assert_eq!(
                bag.get_tag_values_from_file("custom-tags/rights.txt", "Rights-Statement")
                    .values,
                vec!["In Copyright"]
            );
        }
    }

    #[tokio::test]
    async fn deleted_payload_file_is_reported_once() {
        let temp_directory = async_tempfile::TempDir::new().await.unwrap();
        let temp_directory = temp_directory.to_path_buf();
        let profile = BagItProfile::from_json(PROFILE).unwrap();

        let sources = temp_directory.join("sources");
        write_sources(&sources);
        let bag_path = temp_directory.join("bags").join("my-bag");

        let mut bagger = Bagger::new(&bag_path, &profile);
        bagger.add_payload_directory(sources.join("data")).await.unwrap();
        bagger
            .add_tag("bag-info.txt", "Source-Organization", "Bag Makers Inc.")
            .unwrap();
        bagger
            .add_tag("custom-tags/rights.txt", "Rights-Statement", "In Copyright")
            .unwrap();
        assert!(bagger.write_bag(false, true).await, "{:?}", bagger.errors());

        // Both manifests and Payload-Oxum disagree with the payload now
        std::fs::remove_file(bag_path.join("data/sources.csv")).unwrap();

        let mut validator = Validator::new(&bag_path, &profile);
        assert!(!validator.validate().await);
        assert_eq!(
            validator.errors().messages(),
            vec!["File 'data/sources.csv' in manifest-md5.txt is missing from the data directory"]
        );
    }

    #[tokio::test]
    async fn allowed_value_with_whitespace_runs() {
        const STATEMENT: &str = "In Copyright.  Rights are held by the creators of the payload,  \
                                 reuse needs their written consent.";

        let temp_directory = async_tempfile::TempDir::new().await.unwrap();
        let temp_directory = temp_directory.to_path_buf();
        let profile = BagItProfile::from_json(&PROFILE.replace(
            r#"["In Copyright", "No Known Copyright"]"#,
            &format!(r#"["{STATEMENT}"]"#),
        ))
        .unwrap();

        let sources = temp_directory.join("sources");
        write_sources(&sources);
        let bag_path = temp_directory.join("bags").join("my-bag");

        let mut bagger = Bagger::new(&bag_path, &profile);
        bagger.add_payload_directory(sources.join("data")).await.unwrap();
        bagger
            .add_tag("bag-info.txt", "Source-Organization", "Bag Makers Inc.")
            .unwrap();
        bagger
            .add_tag("custom-tags/rights.txt", "Rights-Statement", STATEMENT)
            .unwrap();
        assert!(bagger.write_bag(false, true).await, "{:?}", bagger.errors());

        let rights = std::fs::read_to_string(bag_path.join("custom-tags/rights.txt")).unwrap();
        assert!(rights.lines().count() > 1, "{rights}");

        let mut validator = Validator::new(&bag_path, &profile);
        assert!(validator.validate().await, "{:?}", validator.errors());
        assert_eq!(
            validator
                .bag()
                .get_tag_values_from_file("custom-tags/rights.txt", "Rights-Statement")
                .values,
            vec![STATEMENT]
        );
    }

    #[tokio::test]
    async fn round_trip_directory() {
        round_trip("my-bag").await;
    }

    #[tokio::test]
    async fn round_trip_tar() {
        round_trip("my-bag.tar").await;
    }
}
