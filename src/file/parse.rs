use crate::diagnostic::Diagnostic;
use crate::{Checksum, KeyValueCollection};
use regex::Regex;
use std::sync::LazyLock;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// `<digest> <path>`, the path may contain spaces, trailing ones included
static MANIFEST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\S+)\s+(\S.*?)\r?$").unwrap());

/// `<label>: <value>`, the label starts at the first column
static TAG_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\s:][^:]*):(.*)$").unwrap());

#[derive(thiserror::Error, Debug, PartialEq)]
/// Errors while reading a manifest or a tag file
pub enum ParseError {
    /// Line does not follow the grammar of the file
    #[error("{file}:{line}: {message}")]
    Syntax {
        /// Path relative to the bag root
        file: String,
        /// 1-based
        line: usize,
        /// What is wrong with the line
        message: String,
    },
    /// File could not be read
    #[error("Failed to read `{0}`")]
    Read(String, std::io::ErrorKind),
}

impl From<ParseError> for Diagnostic {
    fn from(error: ParseError) -> Self {
        match error {
            ParseError::Syntax {
                file,
                line,
                message,
            } => Diagnostic::value(message).at(file, Some(line)),
            ParseError::Read(file, kind) => {
                Diagnostic::runtime(format!("Failed to read file: {kind}")).at(file, None)
            }
        }
    }
}

/// Parse manifest lines into path to digest entries
pub async fn parse_manifest<R>(
    reader: &mut R,
    file_name: &str,
) -> Result<KeyValueCollection, ParseError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut lines = BufReader::new(reader).lines();
    let mut entries = KeyValueCollection::new();
    let mut line_number = 0;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ParseError::Read(file_name.to_string(), e.kind()))?
    {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let captures = MANIFEST_LINE
            .captures(&line)
            .ok_or_else(|| ParseError::Syntax {
                file: file_name.to_string(),
                line: line_number,
                message: format!("Unable to parse manifest line `{line}`"),
            })?;

        let digest = Checksum::from(&captures[1]);
        entries.append(&captures[2], digest.to_string());
    }

    Ok(entries)
}

/// Parse tag lines, merging indented continuation lines into the value they extend
pub async fn parse_tag_file<R>(
    reader: &mut R,
    file_name: &str,
) -> Result<KeyValueCollection, ParseError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut lines = BufReader::new(reader).lines();
    let mut tags = KeyValueCollection::new();
    let mut open_tag: Option<(String, String)> = None;
    let mut line_number = 0;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ParseError::Read(file_name.to_string(), e.kind()))?
    {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        if let Some(captures) = TAG_LINE.captures(&line) {
            if let Some((key, value)) = open_tag.take() {
                tags.append(key, value);
            }
            open_tag = Some((
                captures[1].trim_end().to_string(),
                captures[2].trim().to_string(),
            ));
            continue;
        }

        match open_tag.as_mut() {
            Some((_, value)) => {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(line.trim());
            }
            None => {
                return Err(ParseError::Syntax {
                    file: file_name.to_string(),
                    line: line_number,
                    message: format!("Unable to parse tag data from line `{line}`"),
                })
            }
        }
    }

    if let Some((key, value)) = open_tag {
        tags.append(key, value);
    }

    Ok(tags)
}
