use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Snapshot of one member of a bag, taken once when the member is visited.
///
/// Directory and tar members are normalized to the same shape so the rest of
/// the crate never needs to know which container a file came from.
pub struct FileSummary {
    /// Path relative to the bag root, `/`-separated
    pub rel_path: String,
    /// Location on disk, when the member exists as a standalone file
    pub abs_path: Option<PathBuf>,
    /// Permission bits
    pub mode: u32,
    /// Bytes, zero for directories
    pub size: u64,
    /// Last modification time
    pub mod_time: SystemTime,
    /// Directory member, carries no data
    pub is_dir: bool,
    /// Only regular files carry data
    pub is_regular_file: bool,
    /// Owner id, zero where the platform does not have one
    pub uid: u32,
    /// Group id, zero where the platform does not have one
    pub gid: u32,
}

impl FileSummary {
    /// Summary of a file on disk, stored at `rel_path` in the bag
    pub fn from_metadata(
        rel_path: impl Into<String>,
        abs_path: impl AsRef<Path>,
        metadata: &std::fs::Metadata,
    ) -> Self {
        #[cfg(unix)]
        let (mode, uid, gid) = {
            use std::os::unix::fs::MetadataExt;
            (metadata.mode(), metadata.uid(), metadata.gid())
        };
        #[cfg(not(unix))]
        let (mode, uid, gid) = (if metadata.is_dir() { 0o755 } else { 0o644 }, 0, 0);

        Self {
            rel_path: rel_path.into(),
            abs_path: Some(abs_path.as_ref().to_path_buf()),
            mode,
            size: metadata.len(),
            mod_time: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            is_dir: metadata.is_dir(),
            is_regular_file: metadata.is_file(),
            uid,
            gid,
        }
    }

    /// Summary of a tar member, `rel_path` already stripped of the archive's top-level directory
    pub fn from_tar_header(rel_path: impl Into<String>, header: &tokio_tar::Header) -> Self {
        let entry_type = header.entry_type();
        Self {
            rel_path: rel_path.into(),
            abs_path: None,
            mode: header.mode().unwrap_or(0),
            size: header.size().unwrap_or(0),
            mod_time: header
                .mtime()
                .map(|seconds| SystemTime::UNIX_EPOCH + Duration::from_secs(seconds))
                .unwrap_or(SystemTime::UNIX_EPOCH),
            is_dir: entry_type.is_dir(),
            is_regular_file: entry_type.is_file(),
            uid: header.uid().ok().and_then(|id| id.try_into().ok()).unwrap_or(0),
            gid: header.gid().ok().and_then(|id| id.try_into().ok()).unwrap_or(0),
        }
    }

    /// Summary of a file whose bytes will be generated rather than copied from disk
    pub(crate) fn synthesized(rel_path: impl Into<String>) -> Self {
        Self {
            rel_path: rel_path.into(),
            abs_path: None,
            mode: 0o644,
            size: 0,
            mod_time: SystemTime::now(),
            is_dir: false,
            is_regular_file: true,
            uid: 0,
            gid: 0,
        }
    }

    /// First segment of the relative path, if the member lives in a subdirectory
    pub fn top_level_dir(&self) -> Option<&str> {
        if self.is_dir {
            return self.rel_path.split('/').next();
        }
        self.rel_path.split_once('/').map(|(first, _)| first)
    }
}

/// Convert a path relative to a bag root into the `/`-separated form used inside bags
pub(crate) fn to_bag_path(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
