use digest::DynDigest;
use std::{fmt::Display, str::FromStr};

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
#[error("Unsupported checksum algorithm `{0}`")]
/// Algorithm name not in [`Algorithm::ALL`]
pub struct UnsupportedAlgorithm(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Checksum algorithms usable in manifests and tag manifests
///
/// Names follow the BagIt convention: lowercase, no separator (`manifest-sha256.txt`).
pub enum Algorithm {
    /// MD4, kept for older bags
    Md4,
    /// MD5
    Md5,
    /// SHA-1
    Sha1,
    /// SHA-224
    Sha224,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl Algorithm {
    /// Every supported algorithm
    pub const ALL: [Algorithm; 7] = [
        Algorithm::Md4,
        Algorithm::Md5,
        Algorithm::Sha1,
        Algorithm::Sha224,
        Algorithm::Sha256,
        Algorithm::Sha384,
        Algorithm::Sha512,
    ];

    /// Name used in manifest file names and profiles
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Md4 => "md4",
            Algorithm::Md5 => "md5",
            Algorithm::Sha1 => "sha1",
            Algorithm::Sha224 => "sha224",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
        }
    }

    /// Fresh running hash for this algorithm
    pub(crate) fn hasher(&self) -> Box<dyn DynDigest + Send> {
        match self {
            Algorithm::Md4 => Box::new(md4::Md4::default()),
            Algorithm::Md5 => Box::new(md5::Md5::default()),
            Algorithm::Sha1 => Box::new(sha1::Sha1::default()),
            Algorithm::Sha224 => Box::new(sha2::Sha224::default()),
            Algorithm::Sha256 => Box::new(sha2::Sha256::default()),
            Algorithm::Sha384 => Box::new(sha2::Sha384::default()),
            Algorithm::Sha512 => Box::new(sha2::Sha512::default()),
        }
    }

    /// Parse a list of names, stopping at the first unsupported one
    pub fn parse_all<S: AsRef<str>>(
        names: impl IntoIterator<Item = S>,
    ) -> Result<Vec<Algorithm>, UnsupportedAlgorithm> {
        let mut algorithms = Vec::new();
        for name in names {
            let algorithm = name.as_ref().parse()?;
            if !algorithms.contains(&algorithm) {
                algorithms.push(algorithm);
            }
        }
        Ok(algorithms)
    }
}

impl FromStr for Algorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "SHA-256", "sha_256" and "sha256" are the same thing
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        Algorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.name() == normalized)
            .ok_or_else(|| UnsupportedAlgorithm(s.to_string()))
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
