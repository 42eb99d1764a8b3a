//! # textile-markdown
//!
//! Convert Redmine's textile-like wiki markup to Markdown, one line at a time.
//!
//! The engine is deliberately small. It recognises the constructs that show
//! up in Redmine wikis and issue bodies (nested lists, `hN.` headers,
//! `"label":url` links, simple tables and `*%{...}text%*` property spans) and
//! rewrites each with a single regex pass. Anything it does not recognise is
//! passed through verbatim, so conversion never fails.
//!
//! ## Pipeline
//!
//! ```text
//! document
//!  │
//!  ├─ split on the line separator (\r removed first)
//!  ├─ per line: bullets → numbered → links → properties → headers → tables
//!  ├─ table tracker: synthesize `| -- |` after the first row of each table
//!  └─ join, collapse "|\n\n|", terminate with one newline
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use textile_markdown::{convert_document, convert_line, extract_links};
//!
//! assert_eq!(convert_line("h2. Title"), "## Title");
//! assert_eq!(convert_document("h1. Title\n* a\n* b\n"), "# Title\n* a\n* b\n");
//!
//! let links: Vec<_> = extract_links(r#"see "spec":http://host/spec.pdf"#).collect();
//! assert_eq!(links[0].url, "http://host/spec.pdf");
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod document;
pub mod links;
pub mod rules;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use document::{convert_document, convert_document_with, TableState, DEFAULT_LINE_SEPARATOR};
pub use links::{extract_links, Link};
pub use rules::{convert_line, rules, MatchStrategy, Rule};
