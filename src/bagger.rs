//! Build bags that follow a [`BagItProfile`].

use crate::bag::Bag;
use crate::checksum::hash_while_copying;
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::file::FileType;
use crate::manifest::{manifest_name, tagmanifest_name};
use crate::metadata::{
    self, MetadataError, BAGIT_TXT, BAG_INFO_TXT, DEFAULT_ENCODING, DEFAULT_VERSION,
    KEY_ENCODING, KEY_OXUM, KEY_VERSION, PAYLOAD_DIRECTORY,
};
use crate::profile::BagItProfile;
use crate::serialize::tar_directory;
use crate::summary::to_bag_path;
use crate::validator::check_tag;
use crate::{Algorithm, FileSummary};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tokio::{fs, task::spawn_blocking};
use tracing::{debug, info, warn};

/// Existing bags are only deleted when their absolute path is at least this long
pub const MIN_DELETE_PATH_LENGTH: usize = 12;
/// Existing bags are only deleted when their absolute path has at least this many separators
pub const MIN_DELETE_PATH_SEPARATORS: usize = 3;

#[derive(thiserror::Error, Debug, PartialEq)]
/// Possible errors when adding files and tags to a bag
pub enum BaggerError {
    /// Source file cannot be read
    #[error("Source file `{0}` not found")]
    SourceNotFound(PathBuf),
    /// Only regular files can be copied into a bag
    #[error("Source `{0}` is not a regular file")]
    NotAFile(PathBuf),
    /// Destination must be a relative path staying inside the bag
    #[error("Invalid destination path `{0}` inside bag")]
    InvalidDestination(String),
    /// Manifests are generated when the bag is written
    #[error("`{0}` is generated by the bagger and cannot be added")]
    ReservedPath(String),
    /// Tags only go in tag files
    #[error("`{0}` is not a tag file")]
    NotATagFile(String),
    /// See [`MetadataError`]
    #[error("Invalid tag: {0}")]
    Tag(#[from] MetadataError),
    /// Failed to list the files of a directory
    #[error("Failed to list directory contents: {0}")]
    Walk(String),
}

/// Builds one bag, then is discarded.
///
/// Files are added with [`Bagger::add_file()`] and tags with [`Bagger::add_tag()`], in any
/// order. Nothing is written until [`Bagger::write_bag()`].
#[derive(Debug)]
pub struct Bagger<'p> {
    bag: Bag,
    profile: &'p BagItProfile,
    /// Tag files rendered from their tags instead of copied from disk
    synthesized_tag_files: BTreeSet<String>,
    errors: Diagnostics,
}

impl<'p> Bagger<'p> {
    /// Prepare a bag at `path`, a directory, or a file ending in `.tar`
    pub fn new(path: impl AsRef<Path>, profile: &'p BagItProfile) -> Self {
        Self {
            bag: Bag::new(path),
            profile,
            synthesized_tag_files: BTreeSet::new(),
            errors: Diagnostics::default(),
        }
    }

    /// Bag as built so far
    pub fn bag(&self) -> &Bag {
        &self.bag
    }

    /// Bag with the checksums computed while writing
    pub fn into_bag(self) -> Bag {
        self.bag
    }

    /// Problems found so far
    pub fn errors(&self) -> &Diagnostics {
        &self.errors
    }

    /// Copy `source` into the bag at `rel_dest` when the bag is written.
    ///
    /// `rel_dest` below `data/` makes a payload file, anything else a tag file copied as-is.
    pub async fn add_file(
        &mut self,
        source: impl AsRef<Path>,
        rel_dest: &str,
    ) -> Result<(), BaggerError> {
        let source = source.as_ref();
        let metadata = fs::metadata(source)
            .await
            .map_err(|_| BaggerError::SourceNotFound(source.to_path_buf()))?;
        if !metadata.is_file() {
            return Err(BaggerError::NotAFile(source.to_path_buf()));
        }

        validate_destination(rel_dest)?;
        if matches!(
            Bag::classify(rel_dest),
            FileType::Manifest | FileType::TagManifest
        ) {
            return Err(BaggerError::ReservedPath(rel_dest.to_string()));
        }

        self.synthesized_tag_files.remove(rel_dest);
        self.bag
            .add_file_from_summary(FileSummary::from_metadata(rel_dest, source, &metadata));
        Ok(())
    }

    /// Add every regular file below `source_directory` to the payload, keeping the layout
    pub async fn add_payload_directory(
        &mut self,
        source_directory: impl AsRef<Path>,
    ) -> Result<usize, BaggerError> {
        let root = source_directory.as_ref().to_path_buf();
        let files = spawn_blocking(move || {
            walkdir::WalkDir::new(&root)
                .follow_links(true)
                .into_iter()
                .filter(|entry| entry.as_ref().map_or(true, |entry| entry.file_type().is_file()))
                .map(|entry| {
                    let entry = entry.map_err(|e| BaggerError::Walk(e.to_string()))?;
                    let relative = entry
                        .path()
                        .strip_prefix(&root)
                        .map_err(|e| BaggerError::Walk(e.to_string()))?;
                    Ok((entry.path().to_path_buf(), to_bag_path(relative)))
                })
                .collect::<Result<Vec<_>, BaggerError>>()
        })
        .await
        .map_err(|e| BaggerError::Walk(e.to_string()))??;

        for (source, relative) in &files {
            self.add_file(source, &format!("{PAYLOAD_DIRECTORY}/{relative}"))
                .await?;
        }
        Ok(files.len())
    }

    /// Append a tag to `tag_file`, which is then generated from its tags.
    ///
    /// The same tag may be added several times, order is preserved.
    pub fn add_tag(&mut self, tag_file: &str, name: &str, value: &str) -> Result<(), BaggerError> {
        metadata::validate_format(name, value)?;
        validate_destination(tag_file)?;
        if Bag::classify(tag_file) != FileType::TagFile {
            return Err(BaggerError::NotATagFile(tag_file.to_string()));
        }

        if !self.synthesized_tag_files.contains(tag_file) {
            if self.bag.tag_files.contains_key(tag_file) {
                warn!(tag_file, "replacing copied tag file with generated tags");
            }
            self.bag
                .add_file_from_summary(FileSummary::synthesized(tag_file));
            self.synthesized_tag_files.insert(tag_file.to_string());
        }

        if let Some(file) = self.bag.tag_files.get_mut(tag_file) {
            file.parsed_data.append(name, value);
        }
        Ok(())
    }

    /// Write the bag to disk, returns `true` when [`Bagger::errors()`] is empty.
    ///
    /// * `overwrite` - Replace whatever exists at the bag path
    /// * `check_required_tags` - Refuse to write a bag missing tags the profile requires
    pub async fn write_bag(&mut self, overwrite: bool, check_required_tags: bool) -> bool {
        info!(bag = %self.bag.path().display(), "writing bag");

        if let Err(diagnostic) = self.write_steps(overwrite, check_required_tags).await {
            self.errors.push(diagnostic);
        }

        if self.errors.is_empty() {
            info!(
                bag = %self.bag.path().display(),
                payload_files = self.bag.payload.len(),
                "bag written"
            );
        } else {
            warn!(
                bag = %self.bag.path().display(),
                errors = self.errors.len(),
                "failed to write bag"
            );
        }
        self.errors.is_empty()
    }

    async fn write_steps(
        &mut self,
        overwrite: bool,
        check_required_tags: bool,
    ) -> Result<(), Diagnostic> {
        let problems = self.profile.validate();
        if !problems.is_empty() {
            self.errors.extend(problems);
            return Ok(());
        }

        let manifest_algorithms = self
            .profile
            .manifest_algorithms()
            .map_err(|e| Diagnostic::value(e.to_string()))?;
        let tag_manifest_algorithms = self
            .profile
            .tag_manifest_algorithms()
            .map_err(|e| Diagnostic::value(e.to_string()))?;

        let target = self.bag.path().to_path_buf();
        let serialized = target.extension().and_then(|ext| ext.to_str()) == Some("tar");
        prepare_destination(&target, overwrite, serialized).await?;

        // Tar bags are assembled in a sibling directory, removed once packed
        let staging = if serialized {
            let parent = target
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            Some(
                tempfile::Builder::new()
                    .prefix(".bagging-")
                    .tempdir_in(parent)
                    .map_err(|e| {
                        Diagnostic::runtime(format!("Cannot create staging directory: {e}"))
                    })?,
            )
        } else {
            None
        };
        let bag_root = match &staging {
            Some(staging) => staging.path().join(self.bag.name()),
            None => target.clone(),
        };

        self.load_copied_tag_files().await?;
        self.add_default_tags()
            .map_err(|e| Diagnostic::value(e.to_string()))?;

        if check_required_tags {
            for (key, definition) in self.profile.tag_definitions() {
                let values = self
                    .bag
                    .get_tag_values_from_file(&key.tag_file, &key.tag_name);
                self.errors.extend(check_tag(key, definition, &values));
            }
            if !self.errors.is_empty() {
                return Ok(());
            }
        }

        for algorithm in &manifest_algorithms {
            self.ensure_file(manifest_name(*algorithm));
        }
        for algorithm in &tag_manifest_algorithms {
            self.ensure_file(tagmanifest_name(*algorithm));
        }

        self.copy_files(&bag_root, &manifest_algorithms, &tag_manifest_algorithms)
            .await?;
        self.write_tag_files(&bag_root, &tag_manifest_algorithms)
            .await?;
        self.write_manifests(&bag_root, &tag_manifest_algorithms)
            .await?;
        self.write_tag_manifests(&bag_root).await?;

        if staging.is_some() {
            tar_directory(&bag_root, &target, &self.bag.name())
                .await
                .map_err(|e| {
                    Diagnostic::runtime(format!("Cannot write {}: {e}", target.display()))
                })?;
        }

        Ok(())
    }

    /// Tags of copied tag files, so required tags can be checked
    async fn load_copied_tag_files(&mut self) -> Result<(), Diagnostic> {
        for (rel_path, file) in self.bag.tag_files.iter_mut() {
            if self.synthesized_tag_files.contains(rel_path)
                || self.profile.tags_in_file(rel_path).next().is_none()
            {
                continue;
            }
            let Some(source) = file.summary.abs_path.clone() else {
                continue;
            };

            let mut reader = fs::File::open(&source).await.map_err(|e| {
                Diagnostic::runtime(format!("Cannot read {}: {e}", source.display()))
            })?;
            file.parse_as_tag_file(&mut reader)
                .await
                .map_err(Diagnostic::from)?;
        }
        Ok(())
    }

    /// Fill in the tags every bag carries, unless the caller supplied them
    fn add_default_tags(&mut self) -> Result<(), BaggerError> {
        if self.tag_is_missing(BAGIT_TXT, KEY_VERSION) {
            let default_version = DEFAULT_VERSION.to_string();
            let version = if self.profile.accept_bagit_version.is_empty()
                || self.profile.accept_bagit_version.contains(&default_version)
            {
                default_version
            } else {
                self.profile.accept_bagit_version[0].clone()
            };
            self.add_tag(BAGIT_TXT, KEY_VERSION, &version)?;
        }

        if self.tag_is_missing(BAGIT_TXT, KEY_ENCODING) {
            self.add_tag(BAGIT_TXT, KEY_ENCODING, DEFAULT_ENCODING)?;
        }

        if self.profile.find_tag_definition(BAG_INFO_TXT, KEY_OXUM).is_some()
            && self.tag_is_missing(BAG_INFO_TXT, KEY_OXUM)
        {
            let oxum = self.bag.payload_oxum().to_string();
            self.add_tag(BAG_INFO_TXT, KEY_OXUM, &oxum)?;
        }

        #[cfg(feature = "date")]
        if self.tag_is_missing(BAG_INFO_TXT, metadata::KEY_DATE) {
            self.add_tag(BAG_INFO_TXT, metadata::KEY_DATE, &metadata::bagging_date_today())?;
        }

        Ok(())
    }

    /// Tag absent from a tag file the bagger generates
    fn tag_is_missing(&self, tag_file: &str, tag_name: &str) -> bool {
        if self.bag.tag_files.contains_key(tag_file)
            && !self.synthesized_tag_files.contains(tag_file)
        {
            return false;
        }
        !self
            .bag
            .get_tag_values_from_file(tag_file, tag_name)
            .is_present
    }

    fn ensure_file(&mut self, rel_path: String) {
        if self.bag.get_file(&rel_path).is_none() {
            self.bag
                .add_file_from_summary(FileSummary::synthesized(rel_path));
        }
    }

    /// Copy payload and copied tag files, computing checksums on the way
    async fn copy_files(
        &mut self,
        bag_root: &Path,
        manifest_algorithms: &[Algorithm],
        tag_manifest_algorithms: &[Algorithm],
    ) -> Result<(), Diagnostic> {
        let files = self
            .bag
            .payload
            .iter_mut()
            .chain(self.bag.tag_files.iter_mut());

        for (rel_path, file) in files {
            if self.synthesized_tag_files.contains(rel_path) {
                continue;
            }
            let source = file.summary.abs_path.clone().ok_or_else(|| {
                Diagnostic::runtime(format!("No source file for {rel_path}"))
            })?;
            let algorithms = match file.file_type() {
                FileType::Payload => manifest_algorithms,
                _ => tag_manifest_algorithms,
            };

            let destination = bag_root.join(rel_path);
            let copy_error = |e: &dyn std::fmt::Display| {
                Diagnostic::runtime(format!(
                    "Error copying {} to {}: {e}",
                    source.display(),
                    destination.display()
                ))
            };

            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).await.map_err(|e| copy_error(&e))?;
            }
            let mut reader = fs::File::open(&source).await.map_err(|e| copy_error(&e))?;
            let mut writer = fs::File::create(&destination)
                .await
                .map_err(|e| copy_error(&e))?;

            file.checksums = hash_while_copying(&mut reader, &mut writer, algorithms)
                .await
                .map_err(|e| copy_error(&e))?;
            debug!(file = %rel_path, "copied into bag");
        }

        Ok(())
    }

    async fn write_tag_files(
        &mut self,
        bag_root: &Path,
        tag_manifest_algorithms: &[Algorithm],
    ) -> Result<(), Diagnostic> {
        for (rel_path, file) in self.bag.tag_files.iter_mut() {
            if !self.synthesized_tag_files.contains(rel_path) {
                continue;
            }
            file.write(bag_root.join(rel_path), tag_manifest_algorithms)
                .await
                .map_err(|e| Diagnostic::runtime(format!("Error writing {rel_path}: {e}")))?;
            debug!(file = %rel_path, "wrote tag file");
        }
        Ok(())
    }

    async fn write_manifests(
        &mut self,
        bag_root: &Path,
        tag_manifest_algorithms: &[Algorithm],
    ) -> Result<(), Diagnostic> {
        self.bag.add_checksums_to_manifests();
        for (rel_path, manifest) in self.bag.manifests.iter_mut() {
            manifest
                .write(bag_root.join(rel_path), tag_manifest_algorithms)
                .await
                .map_err(|e| Diagnostic::runtime(format!("Error writing {rel_path}: {e}")))?;
        }
        Ok(())
    }

    async fn write_tag_manifests(&mut self, bag_root: &Path) -> Result<(), Diagnostic> {
        self.bag.add_checksums_to_tag_manifests();
        for (rel_path, tag_manifest) in self.bag.tag_manifests.iter_mut() {
            tag_manifest
                .write(bag_root.join(rel_path), &[])
                .await
                .map_err(|e| Diagnostic::runtime(format!("Error writing {rel_path}: {e}")))?;
        }
        Ok(())
    }
}

/// Relative, and never climbing out of the bag
fn validate_destination(rel_path: &str) -> Result<(), BaggerError> {
    let path = Path::new(rel_path);
    let escapes = path
        .components()
        .any(|component| !matches!(component, Component::Normal(_)));
    if rel_path.is_empty() || rel_path.contains('\\') || escapes {
        return Err(BaggerError::InvalidDestination(rel_path.to_string()));
    }
    Ok(())
}

/// Refuse to delete shallow paths such as `/` or `/home/user`
pub fn looks_safe_to_delete(path: &Path) -> bool {
    let Ok(absolute) = std::path::absolute(path) else {
        return false;
    };
    let text = absolute.to_string_lossy();
    text.len() >= MIN_DELETE_PATH_LENGTH
        && text.matches(std::path::MAIN_SEPARATOR).count() >= MIN_DELETE_PATH_SEPARATORS
}

/// Clear the way for a new bag at `target`
async fn prepare_destination(
    target: &Path,
    overwrite: bool,
    serialized: bool,
) -> Result<(), Diagnostic> {
    if let Ok(existing) = fs::symlink_metadata(target).await {
        if !overwrite {
            return Err(Diagnostic::runtime(format!(
                "Bag already exists at {}, set overwrite to replace it",
                target.display()
            )));
        }
        if !looks_safe_to_delete(target) {
            return Err(Diagnostic::runtime(format!(
                "Refusing to delete {}: path is too short to be a bag",
                target.display()
            )));
        }

        warn!(bag = %target.display(), "deleting existing bag");
        let removed = if existing.is_dir() {
            fs::remove_dir_all(target).await
        } else {
            fs::remove_file(target).await
        };
        removed.map_err(|e| {
            Diagnostic::runtime(format!("Cannot delete {}: {e}", target.display()))
        })?;
    }

    let directory = if serialized {
        target.parent().unwrap_or(Path::new(""))
    } else {
        target
    };
    if !directory.as_os_str().is_empty() {
        fs::create_dir_all(directory).await.map_err(|e| {
            Diagnostic::runtime(format!("Cannot create {}: {e}", directory.display()))
        })?;
    }
    Ok(())
}
