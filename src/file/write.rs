use crate::checksum::{hash_while_copying, ChecksumComputeError};
use crate::{Algorithm, Checksums, KeyValueCollection};
use std::path::Path;
use tokio::fs;

/// Tag lines longer than this are folded onto continuation lines
pub const MAX_LINE_LENGTH: usize = 79;
const CONTINUATION_INDENT: &str = "   ";

#[derive(thiserror::Error, Debug, PartialEq)]
/// Errors while writing a file into a bag
pub enum WriteError {
    /// Parent directory could not be created
    #[error("Failed to create parent directory")]
    CreateDirectory(std::io::ErrorKind),
    /// Destination could not be created
    #[error("Failed to create file")]
    CreateFile(std::io::ErrorKind),
    /// Copying or hashing the contents failed
    #[error("Failed to write file: {0}")]
    Write(#[from] ChecksumComputeError),
}

pub(super) fn render_manifest(entries: &KeyValueCollection) -> String {
    entries
        .iter()
        .map(|entry| format!("{} {}\n", entry.value, entry.key))
        .collect()
}

pub(super) fn render_tags(tags: &KeyValueCollection) -> String {
    tags.iter()
        .map(|tag| format!("{}\n", wrap_tag(&tag.key, &tag.value)))
        .collect()
}

/// Render `<key>: <value>`, folding on word boundaries when the line is too long.
///
/// Lines are only folded at a single space between two words, which readers put back
/// when joining continuation lines. Any other run of whitespace stays where it is.
/// Continuation lines are indented, a word longer than a whole line is never split.
pub fn wrap_tag(key: &str, value: &str) -> String {
    if value.is_empty() {
        return format!("{key}:");
    }

    let line = format!("{key}: {value}");
    if line.chars().count() <= MAX_LINE_LENGTH {
        return line;
    }

    let mut lines = Vec::new();
    let mut current = format!("{key}:");
    let mut current_length = current.chars().count();
    let mut has_word = false;

    for word in words(value) {
        let word_length = word.chars().count();
        if has_word && current_length + 1 + word_length > MAX_LINE_LENGTH {
            lines.push(std::mem::replace(
                &mut current,
                format!("{CONTINUATION_INDENT}{word}"),
            ));
            current_length = CONTINUATION_INDENT.len() + word_length;
            continue;
        }

        current.push(' ');
        current.push_str(word);
        current_length += 1 + word_length;
        has_word = true;
    }
    lines.push(current);

    lines.join("\n")
}

/// Pieces of `value` separated by a lone space between two non-whitespace characters
fn words(value: &str) -> Vec<&str> {
    let chars = value.char_indices().collect::<Vec<_>>();
    let mut words = Vec::new();
    let mut start = 0;

    for window in chars.windows(3) {
        let [(_, before), (index, ' '), (_, after)] = window else {
            continue;
        };
        if !before.is_whitespace() && !after.is_whitespace() {
            words.push(&value[start..*index]);
            start = index + 1;
        }
    }
    words.push(&value[start..]);

    words
}

pub(super) async fn write_contents(
    path: &Path,
    contents: &str,
    algorithms: &[Algorithm],
) -> Result<Checksums, WriteError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| WriteError::CreateDirectory(e.kind()))?;
    }

    let mut file = fs::File::create(path)
        .await
        .map_err(|e| WriteError::CreateFile(e.kind()))?;

    Ok(hash_while_copying(&mut contents.as_bytes(), &mut file, algorithms).await?)
}
