//! OCR input documents and helpers for assembling their text.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::Result;

/// Raw OCR text plus the document-type tag that selects its schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub document_type: String,
    pub text: String,
}

impl Document {
    pub fn new(document_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            text: text.into(),
        }
    }

    /// Build a document from the numbered page files of an article folder.
    pub async fn from_article_dir(
        document_type: impl Into<String>,
        dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let text = combine_article_texts(dir).await?;
        Ok(Self::new(document_type, text))
    }
}

/// Trimmed, non-blank lines of `text`.
pub fn clean_lines(text: &str) -> Vec<&str> {
    text.trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Numeric prefix of names like `0003_page.txt`, without leading zeros.
///
/// Kept as digits so prefixes of any length order correctly: shorter first,
/// then lexically.
fn page_number(name: &str) -> Option<&str> {
    let digits_end = name.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 || !name[digits_end..].starts_with('_') {
        return None;
    }
    let digits = name[..digits_end].trim_start_matches('0');
    Some(if digits.is_empty() { "0" } else { digits })
}

/// Join the numbered `NNNN_*.txt` files of an article folder into one paragraph.
///
/// Files are ordered by their numeric prefix, each is trimmed, and they are
/// joined with single spaces. A folder without numbered files yields an empty
/// string.
pub async fn combine_article_texts(dir: impl AsRef<Path>) -> Result<String> {
    let dir = dir.as_ref();
    let mut pages: Vec<(String, PathBuf)> = Vec::new();

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let number = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(page_number)
            .map(str::to_string);
        if let Some(number) = number {
            pages.push((number, path));
        }
    }

    if pages.is_empty() {
        warn!(dir = %dir.display(), "No numbered text files found");
        return Ok(String::new());
    }

    pages.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    debug!(dir = %dir.display(), pages = pages.len(), "Combining article pages");

    let mut parts = Vec::with_capacity(pages.len());
    for (_, path) in &pages {
        let content = fs::read_to_string(path).await?;
        parts.push(content.trim().to_string());
    }
    Ok(parts.join(" ").trim().to_string())
}

/// Rule-based detection of article type and publishing source.
///
/// The type is the first `type_keywords` entry found in the first two cleaned
/// lines. The source is searched line by line in lines 2-3 when a type was
/// found, otherwise in lines 1-2, and is the first `source_keywords` entry
/// contained in a line.
pub fn detect_type_and_source<'k>(
    text: &str,
    type_keywords: &[&'k str],
    source_keywords: &[&'k str],
) -> (Option<&'k str>, Option<&'k str>) {
    let lines = clean_lines(text);
    let head = lines.iter().take(2).copied().collect::<Vec<_>>().join(" ");
    let article_type = type_keywords.iter().copied().find(|t| head.contains(t));

    let skip = usize::from(article_type.is_some());
    let source = lines
        .iter()
        .skip(skip)
        .take(2)
        .find_map(|line| source_keywords.iter().copied().find(|s| line.contains(s)));

    (article_type, source)
}
