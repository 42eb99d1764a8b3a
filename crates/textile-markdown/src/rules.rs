//! Line rules: the ordered rewrite pipeline applied to every line.
//!
//! Each rule is a [`Rule`] value pairing a pattern with a [`MatchStrategy`]
//! and a rewrite. A rule that does not trigger returns its input untouched,
//! which keeps every step a total function over arbitrary text.
//!
//! ## Rule Order
//!
//! Bullets and numbered lists run before headers. Both numbered lists and
//! Markdown headers use a leading `#`: once `# item` has become `1. item`
//! the header rule can no longer mistake it for a heading. Links and
//! property spans run before tables so cell contents are already clean when
//! the cell markers are rewritten.

use once_cell::sync::Lazy;
use regex::{Captures, Regex, Replacer};
use std::borrow::Cow;

/// `"label":url`, shared with [`crate::links`].
pub(crate) const LINK_PATTERN: &str = r#""(.*?)":([A-Za-z0-9_/=?.:%-]+)"#;

/// How a rule's pattern is located in a line.
///
/// The strategy decides both whether the rule fires and how many matches
/// its rewrite touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// The pattern must match at the very start of the line.
    Anchored,
    /// The first match anywhere in the line fires the rule; only it is rewritten.
    FirstOccurrence,
    /// Any match fires the rule; every match is rewritten.
    AllOccurrences,
}

impl MatchStrategy {
    /// Whether `pattern` fires on `line` under this strategy.
    pub fn triggers(self, pattern: &Regex, line: &str) -> bool {
        match self {
            // Leftmost-first search returns a match at 0 whenever one exists.
            MatchStrategy::Anchored => pattern.find(line).is_some_and(|m| m.start() == 0),
            MatchStrategy::FirstOccurrence | MatchStrategy::AllOccurrences => {
                pattern.is_match(line)
            }
        }
    }
}

/// What a triggered rule does to the line.
enum Rewrite {
    /// Replace the match with a `$n` template.
    Template(&'static str),
    /// Replace the match with a value computed from its captures.
    Computed(fn(&Captures<'_>) -> String),
    /// Run follow-up substitutions over the whole line.
    Substitutions(Vec<(Regex, &'static str)>),
}

/// A single named rewrite rule.
pub struct Rule {
    name: &'static str,
    strategy: MatchStrategy,
    pattern: Regex,
    rewrite: Rewrite,
}

impl Rule {
    fn new(name: &'static str, strategy: MatchStrategy, pattern: &str, rewrite: Rewrite) -> Self {
        Self {
            name,
            strategy,
            pattern: Regex::new(pattern).unwrap(),
            rewrite,
        }
    }

    /// Stable identifier, e.g. `"bullet-2"` or `"table-body-cell"`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    /// Apply the rule to one line. Returns the input borrowed when the rule
    /// does not fire.
    pub fn apply<'a>(&self, line: &'a str) -> Cow<'a, str> {
        if !self.strategy.triggers(&self.pattern, line) {
            return Cow::Borrowed(line);
        }
        match &self.rewrite {
            Rewrite::Template(template) => self.replace(line, *template),
            Rewrite::Computed(compute) => self.replace(line, |caps: &Captures<'_>| compute(caps)),
            Rewrite::Substitutions(substitutions) => {
                let mut current = Cow::Borrowed(line);
                for (pattern, replacement) in substitutions {
                    let next = match pattern.replace_all(&current, *replacement) {
                        Cow::Owned(s) => Some(s),
                        Cow::Borrowed(_) => None,
                    };
                    if let Some(s) = next {
                        current = Cow::Owned(s);
                    }
                }
                current
            }
        }
    }

    fn replace<'a, R: Replacer>(&self, line: &'a str, replacer: R) -> Cow<'a, str> {
        match self.strategy {
            MatchStrategy::AllOccurrences => self.pattern.replace_all(line, replacer),
            MatchStrategy::Anchored | MatchStrategy::FirstOccurrence => {
                self.pattern.replace(line, replacer)
            }
        }
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("strategy", &self.strategy)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use MatchStrategy::*;
    vec![
        // 1. Bullet lists, most nested first.
        Rule::new("bullet-3", Anchored, r"^\*\*\* (.*)$", Rewrite::Template("\t\t* ${1}")),
        Rule::new("bullet-2", Anchored, r"^\*\* (.*)$", Rewrite::Template("\t* ${1}")),
        Rule::new("bullet-1", Anchored, r"^\* (.*)$", Rewrite::Template("* ${1}")),
        // 2. Numbered lists.
        Rule::new("numbered-3", Anchored, r"^### (.*)$", Rewrite::Template("\t\t1. ${1}")),
        Rule::new("numbered-2", Anchored, r"^## (.*)$", Rewrite::Template("\t1. ${1}")),
        Rule::new("numbered-1", Anchored, r"^# (.*)$", Rewrite::Template("1. ${1}")),
        // 3. Links.
        Rule::new("link", AllOccurrences, LINK_PATTERN, Rewrite::Template("[${1}](${2})")),
        // 4. Property spans.
        Rule::new(
            "property",
            Anchored,
            r"\*%\{.*?\}(.*?)%\*",
            Rewrite::Substitutions(vec![(
                Regex::new(r"\*%\{.*?\}(.*?)%\*").unwrap(),
                "${1}",
            )]),
        ),
        // 5. Headers: the prefix up to the last `hN.` becomes N hashes.
        Rule::new("header", FirstOccurrence, r"^.*h([0-9])\.", Rewrite::Computed(header_hashes)),
        // 6. Tables.
        Rule::new("table-header-cell", AllOccurrences, r"\|_\.", Rewrite::Template("| ")),
        Rule::new(
            "table-body-cell",
            Anchored,
            r"^\|",
            Rewrite::Substitutions(vec![
                (Regex::new(r"\|[=><]?\.").unwrap(), "| "),
                (Regex::new(r"\|/[0-9]\. ").unwrap(), "| "),
            ]),
        ),
    ]
});

fn header_hashes(caps: &Captures<'_>) -> String {
    let level = caps[1].bytes().next().map_or(0, |b| usize::from(b - b'0'));
    "#".repeat(level)
}

/// The full rule pipeline, in application order.
pub fn rules() -> &'static [Rule] {
    &RULES
}

/// Convert one line of textile markup to Markdown.
///
/// A single trailing `\n` is accepted and dropped. The result carries no
/// trailing whitespace.
pub fn convert_line(line: &str) -> String {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let mut current = Cow::Borrowed(line);
    for rule in rules() {
        let next = match rule.apply(&current) {
            Cow::Owned(s) => Some(s),
            Cow::Borrowed(_) => None,
        };
        if let Some(s) = next {
            current = Cow::Owned(s);
        }
    }
    current.trim_end().to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> &'static Rule {
        rules()
            .iter()
            .find(|r| r.name() == name)
            .unwrap_or_else(|| panic!("no rule named {name}"))
    }

    #[test]
    fn rule_order_is_fixed() {
        let names: Vec<&str> = rules().iter().map(Rule::name).collect();
        assert_eq!(
            names,
            vec![
                "bullet-3",
                "bullet-2",
                "bullet-1",
                "numbered-3",
                "numbered-2",
                "numbered-1",
                "link",
                "property",
                "header",
                "table-header-cell",
                "table-body-cell",
            ]
        );
    }

    #[test]
    fn unmatched_rules_borrow_their_input() {
        let line = "nothing to see here";
        for r in rules() {
            assert!(
                matches!(r.apply(line), Cow::Borrowed(_)),
                "rule {} rewrote a plain line",
                r.name()
            );
        }
    }

    #[test]
    fn test_anchored_strategy() {
        let re = Regex::new(r"\|").unwrap();
        assert!(MatchStrategy::Anchored.triggers(&re, "|a|"));
        assert!(!MatchStrategy::Anchored.triggers(&re, "a|b"));
        assert!(MatchStrategy::FirstOccurrence.triggers(&re, "a|b"));
        assert!(MatchStrategy::AllOccurrences.triggers(&re, "a|b"));
        assert!(!MatchStrategy::AllOccurrences.triggers(&re, "ab"));
    }

    #[test]
    fn test_bullets() {
        assert_eq!(convert_line("*** item"), "\t\t* item");
        assert_eq!(convert_line("** item"), "\t* item");
        assert_eq!(convert_line("* item"), "* item");
    }

    #[test]
    fn test_bullet_requires_space() {
        assert_eq!(rule("bullet-1").apply("*bold*"), "*bold*");
        assert_eq!(rule("bullet-2").apply("**strong** text"), "**strong** text");
    }

    #[test]
    fn test_numbered() {
        assert_eq!(convert_line("### item"), "\t\t1. item");
        assert_eq!(convert_line("## item"), "\t1. item");
        assert_eq!(convert_line("# item"), "1. item");
    }

    #[test]
    fn test_numbered_line_is_not_a_header() {
        assert_eq!(convert_line("# Title"), "1. Title");
    }

    #[test]
    fn test_headers() {
        assert_eq!(convert_line("h1. Title"), "# Title");
        assert_eq!(convert_line("h2. Title"), "## Title");
        assert_eq!(convert_line("h6. Deep"), "###### Deep");
    }

    #[test]
    fn test_header_consumes_prefix() {
        assert_eq!(rule("header").apply("  h3. Indented"), "### Indented");
    }

    #[test]
    fn test_single_link() {
        assert_eq!(
            convert_line(r#"see "docs":http://example.com/a.pdf for info"#),
            "see [docs](http://example.com/a.pdf) for info"
        );
    }

    #[test]
    fn test_every_link_keeps_its_own_target() {
        assert_eq!(
            convert_line(r#""a":http://x/1 and "b":http://x/2"#),
            "[a](http://x/1) and [b](http://x/2)"
        );
    }

    #[test]
    fn test_link_url_stops_at_space() {
        assert_eq!(
            rule("link").apply(r#""q":http://h/s?x=1%20y rest"#),
            "[q](http://h/s?x=1%20y) rest"
        );
    }

    #[test]
    fn test_property_span() {
        assert_eq!(convert_line("*%{color:red}Warning%* be careful"), "Warning be careful");
    }

    #[test]
    fn test_property_span_must_open_the_line() {
        let line = "note: *%{color:red}Warning%*";
        assert_eq!(rule("property").apply(line), line);
    }

    #[test]
    fn test_table_header_cells() {
        assert_eq!(convert_line("|_.A|_.B|"), "| A| B|");
    }

    #[test]
    fn test_table_body_alignment() {
        assert_eq!(convert_line("|=.a|>.b|<.c|"), "| a| b| c|");
    }

    #[test]
    fn test_table_body_span() {
        assert_eq!(convert_line("|/2. merged|x|"), "| merged|x|");
    }

    #[test]
    fn test_body_rule_needs_leading_pipe() {
        let line = "a |=. b";
        assert_eq!(rule("table-body-cell").apply(line), line);
    }

    #[test]
    fn test_trailing_newline_and_whitespace_dropped() {
        assert_eq!(convert_line("* item  \n"), "* item");
        assert_eq!(convert_line("plain\n"), "plain");
    }

    #[test]
    fn test_multibyte_text_survives() {
        assert_eq!(convert_line("h2. 概要"), "## 概要");
        assert_eq!(convert_line("* 日本語の項目"), "* 日本語の項目");
    }
}
