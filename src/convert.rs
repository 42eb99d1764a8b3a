//! File-level textile → Markdown conversion.
//!
//! The engine in `textile_markdown` is pure and never fails; this module adds
//! the file boundary around it: reading (missing file, non-UTF-8 content),
//! link listing, and an atomic write of the result.

use crate::cache::write_atomic;
use crate::error::MigrateError;
use serde::Serialize;
use std::path::Path;
use textile_markdown::{convert_document, extract_links};
use tracing::{debug, info};

/// A `"label":url` reference, detached from its source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRef {
    pub label: String,
    pub url: String,
}

/// Result of converting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedDocument {
    pub markdown: String,
    /// Links of the source, in order of appearance.
    pub links: Vec<LinkRef>,
}

/// Convert textile `content`, listing its links first.
pub fn convert_text(content: &str) -> ConvertedDocument {
    let links = extract_links(content)
        .map(|l| LinkRef {
            label: l.label.to_string(),
            url: l.url.to_string(),
        })
        .collect();
    ConvertedDocument {
        markdown: convert_document(content),
        links,
    }
}

/// Read and convert a textile file.
///
/// # Errors
/// - [`MigrateError::FileNotFound`] if `path` does not exist.
/// - [`MigrateError::InvalidEncoding`] if the content is not UTF-8.
pub async fn convert_file(path: impl AsRef<Path>) -> Result<ConvertedDocument, MigrateError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| MigrateError::from_io(path, e))?;
    let content = String::from_utf8(bytes).map_err(|_| MigrateError::InvalidEncoding {
        path: path.to_path_buf(),
    })?;
    debug!("Read {} bytes from {}", content.len(), path.display());
    Ok(convert_text(&content))
}

/// Convert `input` and write the Markdown to `output`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<ConvertedDocument, MigrateError> {
    let converted = convert_file(input.as_ref()).await?;
    let output = output.as_ref();
    write_atomic(output, converted.markdown.as_bytes()).await?;
    info!(
        "Converted {} → {} ({} links)",
        input.as_ref().display(),
        output.display(),
        converted.links.len()
    );
    Ok(converted)
}
