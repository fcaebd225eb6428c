//! Well-known tag files and tags, and the formats of their values.

use std::{fmt::Display, str::FromStr};

/// Bag declaration, always at the top level
pub const BAGIT_TXT: &str = "bagit.txt";
/// Descriptive tags of the bag
pub const BAG_INFO_TXT: &str = "bag-info.txt";
/// Payload files to download, listed by URL
pub const FETCH_TXT: &str = "fetch.txt";
/// Directory holding the payload
pub const PAYLOAD_DIRECTORY: &str = "data";

/// Version of the BagIt format, in `bagit.txt`
pub const KEY_VERSION: &str = "BagIt-Version";
/// Encoding of tag files, in `bagit.txt`
pub const KEY_ENCODING: &str = "Tag-File-Character-Encoding";
/// Day the bag was written, `YYYY-MM-DD`
pub const KEY_DATE: &str = "Bagging-Date";
/// `<octet count>.<file count>` of the payload
pub const KEY_OXUM: &str = "Payload-Oxum";

/// Version written in new bags
pub const DEFAULT_VERSION: BagItVersion = BagItVersion { major: 1, minor: 0 };
/// Only encoding written in new bags
pub const DEFAULT_ENCODING: &str = "UTF-8";

#[derive(thiserror::Error, Debug, PartialEq)]
/// Errors with tag labels and well-known tag values
pub enum MetadataError {
    /// Tag labels must not be empty
    #[error("Invalid format")]
    Format,
    /// Some characters are forbidden for labels
    #[error("Metadata key contains forbidden character `:` or whitespace at its edges")]
    KeyForbiddenCharacter,
    /// Values are single logical lines
    #[error("Metadata value contains a line break")]
    ValueForbiddenCharacter,
    /// Value of a well-known tag does not follow its format
    #[error("Failed to parse metadata value for key `{0}`")]
    ValueParsing(&'static str),
}

/// Check a tag label and value can be written as `<label>: <value>`
pub fn validate_format(key: &str, value: &str) -> Result<(), MetadataError> {
    if key.is_empty() {
        return Err(MetadataError::Format);
    }

    if key.contains(':') || key.starts_with(char::is_whitespace) || key.ends_with(char::is_whitespace)
    {
        return Err(MetadataError::KeyForbiddenCharacter);
    }

    if value.contains(['\r', '\n']) {
        return Err(MetadataError::ValueForbiddenCharacter);
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Value of `BagIt-Version`
pub struct BagItVersion {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
}

impl FromStr for BagItVersion {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or(MetadataError::ValueParsing(KEY_VERSION))?;

        let major = major
            .parse()
            .map_err(|_| MetadataError::ValueParsing(KEY_VERSION))?;
        let minor = minor
            .parse()
            .map_err(|_| MetadataError::ValueParsing(KEY_VERSION))?;

        Ok(Self { major, minor })
    }
}

impl Display for BagItVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Payload octet stream summary, value of `Payload-Oxum`
pub struct Oxum {
    /// Count of bytes in all streams
    pub octet_count: u64,
    /// Number of streams (aka files)
    pub stream_count: u64,
}

impl FromStr for Oxum {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (octet_count, stream_count) = s
            .trim()
            .split_once('.')
            .ok_or(MetadataError::ValueParsing(KEY_OXUM))?;

        let octet_count = octet_count
            .parse()
            .map_err(|_| MetadataError::ValueParsing(KEY_OXUM))?;
        let stream_count = stream_count
            .parse()
            .map_err(|_| MetadataError::ValueParsing(KEY_OXUM))?;

        Ok(Self {
            octet_count,
            stream_count,
        })
    }
}

impl Display for Oxum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.octet_count, self.stream_count)
    }
}

/// Today's date as written in `Bagging-Date`
#[cfg(feature = "date")]
pub fn bagging_date_today() -> String {
    jiff::Zoned::now().date().to_string()
}
