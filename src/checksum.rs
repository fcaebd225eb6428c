pub use compute::{hash_only, hash_while_copying, ChecksumComputeError};
use crate::Algorithm;
use std::{collections::BTreeMap, fmt::Display};

/// Digests of one file, by algorithm
pub type Checksums = BTreeMap<Algorithm, Checksum>;

mod compute {
    use super::{Checksum, Checksums};
    use crate::Algorithm;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    const BUFFER_SIZE: usize = 64 * 1024;

    #[derive(thiserror::Error, Debug, PartialEq)]
    /// Errors while hashing or copying a file
    pub enum ChecksumComputeError {
        /// Reading the source failed
        #[error("Failed to read file")]
        ReadFile(std::io::ErrorKind),
        /// Writing the copy failed
        #[error("Failed to write file")]
        WriteFile(std::io::ErrorKind),
    }

    /// Copy `reader` into `writer`, feeding every chunk to one running hash per algorithm.
    ///
    /// The reader is consumed to EOF. Both bag creation and validation go through here,
    /// so digests written to manifests and digests verified against them cannot drift apart.
    pub async fn hash_while_copying<R, W>(
        reader: &mut R,
        writer: &mut W,
        algorithms: &[Algorithm],
    ) -> Result<Checksums, ChecksumComputeError>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut hashers = algorithms
            .iter()
            .map(|algorithm| (*algorithm, algorithm.hasher()))
            .collect::<Vec<_>>();

        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            let read_bytes = reader
                .read(&mut buffer)
                .await
                .map_err(|e| ChecksumComputeError::ReadFile(e.kind()))?;

            // EOF
            if read_bytes == 0 {
                break;
            }

            let chunk = &buffer[..read_bytes];
            writer
                .write_all(chunk)
                .await
                .map_err(|e| ChecksumComputeError::WriteFile(e.kind()))?;
            for (_, hasher) in hashers.iter_mut() {
                hasher.update(chunk);
            }
        }

        writer
            .flush()
            .await
            .map_err(|e| ChecksumComputeError::WriteFile(e.kind()))?;

        Ok(hashers
            .into_iter()
            .map(|(algorithm, mut hasher)| (algorithm, Checksum::from(&*hasher.finalize_reset())))
            .collect())
    }

    /// Checksums of everything left in `reader`, without keeping a copy
    pub async fn hash_only<R>(
        reader: &mut R,
        algorithms: &[Algorithm],
    ) -> Result<Checksums, ChecksumComputeError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        hash_while_copying(reader, &mut tokio::io::sink(), algorithms).await
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Lowercase hexadecimal digest
pub struct Checksum(String);

impl Checksum {
    /// No digest, e.g. a file missing from a manifest
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for Checksum {
    fn from(value: &[u8]) -> Self {
        Self(hex::encode(value))
    }
}

impl From<Vec<u8>> for Checksum {
    fn from(value: Vec<u8>) -> Self {
        Self(hex::encode(value))
    }
}

impl From<&str> for Checksum {
    fn from(value: &str) -> Checksum {
        Self(value.trim().to_ascii_lowercase())
    }
}

impl From<String> for Checksum {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Checksum {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
