//! Link extraction: list the `"label":url` references of a raw document.
//!
//! Runs on the textile source, before conversion, so callers can fetch the
//! referenced files from the source tracker and re-upload them elsewhere.

use crate::rules::LINK_PATTERN;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(LINK_PATTERN).unwrap());

/// A `"label":url` reference found in source markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link<'a> {
    pub label: &'a str,
    pub url: &'a str,
}

/// Iterate over the links of `content` in order of appearance.
///
/// The iterator is lazy and borrows `content`; calling again on the same
/// input yields the same sequence.
pub fn extract_links(content: &str) -> impl Iterator<Item = Link<'_>> + '_ {
    RE_LINK.captures_iter(content).map(|caps| {
        let (_, [label, url]) = caps.extract();
        Link { label, url }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_in_order() {
        let text = "Spec: \"spec\":http://h/files/spec.pdf\nImage \"logo\":/attachments/download/12/logo.png";
        let links: Vec<Link<'_>> = extract_links(text).collect();
        assert_eq!(
            links,
            vec![
                Link {
                    label: "spec",
                    url: "http://h/files/spec.pdf"
                },
                Link {
                    label: "logo",
                    url: "/attachments/download/12/logo.png"
                },
            ]
        );
    }

    #[test]
    fn test_no_links() {
        assert_eq!(extract_links("h1. nothing here").count(), 0);
    }

    #[test]
    fn test_restartable() {
        let text = r#""a":x "b":y"#;
        let first: Vec<_> = extract_links(text).collect();
        let second: Vec<_> = extract_links(text).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_extraction_ignores_conversion() {
        // Lists and headers around a link do not change what is extracted.
        let links: Vec<_> = extract_links(r#"* h2. "doc":http://h/d"#).collect();
        assert_eq!(links[0].label, "doc");
        assert_eq!(links[0].url, "http://h/d");
    }
}
