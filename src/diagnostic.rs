use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What went wrong, broadly
pub enum DiagnosticKind {
    /// Malformed or disallowed value
    Value,
    /// Required value is blank or missing
    Empty,
    /// Environment or I/O failure
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Where a problem was found
pub struct Locator {
    /// Path relative to the bag root
    pub file: String,
    /// 1-based
    pub line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One problem found while building or validating a bag
pub struct Diagnostic {
    /// Category of the problem
    pub kind: DiagnosticKind,
    /// File, and line when known
    pub locator: Option<Locator>,
    /// Human-readable description
    pub message: String,
}

impl Diagnostic {
    /// Problem without a location
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            locator: None,
            message: message.into(),
        }
    }

    /// [`DiagnosticKind::Value`] problem
    pub fn value(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Value, message)
    }

    /// [`DiagnosticKind::Empty`] problem
    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Empty, message)
    }

    /// [`DiagnosticKind::Runtime`] problem
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Runtime, message)
    }

    /// Locate the problem in `file`, at `line` when known
    pub fn at(mut self, file: impl Into<String>, line: Option<usize>) -> Self {
        self.locator = Some(Locator {
            file: file.into(),
            line,
        });
        self
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.locator {
            Some(Locator {
                file,
                line: Some(line),
            }) => write!(f, "{file}:{line}: {}", self.message),
            Some(Locator { file, line: None }) => write!(f, "{file}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Collected problems, in the order they were found.
///
/// The same message is never recorded twice: several passes over a bag may
/// stumble on the same root cause.
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Record `diagnostic`, returns `false` if an identical message was already there
    pub fn push(&mut self, diagnostic: Diagnostic) -> bool {
        let message = diagnostic.to_string();
        if self.0.iter().any(|known| known.to_string() == message) {
            return false;
        }
        self.0.push(diagnostic);
        true
    }

    /// Record every diagnostic, skipping known messages
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }

    /// Number of distinct problems
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Nothing wrong so far
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Forget every problem
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Problems in the order found
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    /// Rendered messages, with locations when known
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deduplicate_messages() {
        let mut diagnostics = Diagnostics::default();

        assert!(diagnostics.push(Diagnostic::value("Tag is not allowed")));
        assert!(!diagnostics.push(Diagnostic::empty("Tag is not allowed")));
        assert!(diagnostics.push(Diagnostic::value("Tag is not allowed").at("bag-info.txt", None)));

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(
            diagnostics.messages(),
            vec!["Tag is not allowed", "bag-info.txt: Tag is not allowed"]
        );
    }

    #[test]
    fn display_with_line() {
        let diagnostic = Diagnostic::value("Unable to parse line").at("manifest-md5.txt", Some(3));
        assert_eq!(
            diagnostic.to_string(),
            "manifest-md5.txt:3: Unable to parse line"
        );
    }
}
