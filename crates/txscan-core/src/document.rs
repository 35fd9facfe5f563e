//! Raw statement documents.

use std::path::Path;

/// An ordered, immutable sequence of text lines from one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    name: String,
    text: String,
    lines: Vec<String>,
}

impl RawDocument {
    /// Create a document from already extracted text.
    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let lines = text.lines().map(str::to_string).collect();
        Self {
            name: name.into(),
            text,
            lines,
        }
    }

    /// Create a document from individual lines.
    pub fn from_lines<I, S>(name: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        Self {
            name: name.into(),
            text: lines.join("\n"),
            lines,
        }
    }

    /// Read a text file extracted from a statement.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        Ok(Self::from_text(name, text))
    }

    /// Source file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full text, lines joined by `\n`.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Lines in source order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crlf_lines() {
        let doc = RawDocument::from_text("a.txt", "Kauf\r\nTitel: X\r\n");
        assert_eq!(doc.lines(), &["Kauf".to_string(), "Titel: X".to_string()]);
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_from_lines_joins_text() {
        let doc = RawDocument::from_lines("b.txt", ["one", "two"]);
        assert_eq!(doc.text(), "one\ntwo");
        assert_eq!(doc.name(), "b.txt");
    }
}
