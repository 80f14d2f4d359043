//! Strip markers.
//!
//! Content which must not be touched by later passes is lifted out of the
//! working text and replaced by an opaque marker. Markers are swapped back
//! for their content as the last step before sanitization.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// The prefix of every strip marker.
const PREFIX: &str = "\x7fUNIQ-";
/// The suffix of every strip marker.
const SUFFIX: &str = "-QINU\x7f";

/// Matches any strip marker.
static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x7fUNIQ-([0-9a-f]{8})-QINU\x7f").unwrap());

/// The kind of content a strip marker stands for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Kind {
    /// Phrasing content which may appear inside a paragraph.
    Inline,
    /// Block-level content which must not be wrapped in a paragraph.
    Block,
}

/// Stripped content substitutions for one document.
#[derive(Debug, Default)]
pub(crate) struct StripMarkers {
    /// The stripped content, indexed by marker number.
    items: Vec<(Kind, String)>,
}

impl StripMarkers {
    /// Stores `content` and returns the marker which stands in for it.
    pub fn push(&mut self, kind: Kind, content: impl Into<String>) -> String {
        let index = self.items.len();
        self.items.push((kind, content.into()));
        format!("{PREFIX}{index:08x}{SUFFIX}")
    }

    /// Returns true if `line` consists of nothing but block markers.
    pub fn is_block(&self, line: &str) -> bool {
        let line = line.trim();
        let mut last = 0;
        let mut any = false;
        for captures in MARKER.captures_iter(line) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            if !line[last..whole.start()].trim().is_empty()
                || self.kind(&captures) != Some(Kind::Block)
            {
                return false;
            }
            last = whole.end();
            any = true;
        }
        any && line[last..].trim().is_empty()
    }

    /// Replaces every marker in `text` with its content. Content may itself
    /// contain markers.
    pub fn restore(&self, text: &str) -> String {
        let mut out = text.to_string();
        // Each round resolves one level of nesting, and a marker can only
        // refer to markers created before it
        for _ in 0..=self.items.len() {
            if !out.contains(PREFIX) {
                break;
            }
            out = MARKER
                .replace_all(&out, |captures: &Captures<'_>| {
                    self.content(captures).unwrap_or_default().to_string()
                })
                .into_owned();
        }
        out
    }

    /// Lifts verbatim content into markers and deletes comments.
    ///
    /// Verbatim content is fenced code blocks, `<pre>` blocks, and `<nowiki>`
    /// spans. Comments are removed afterwards so that comment syntax inside
    /// verbatim content is kept.
    pub fn lift_verbatim(&mut self, text: &str) -> String {
        static FENCE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?ms)^[ \t]*```[ \t]*([\w+-]*)[ \t]*\n(.*?)^[ \t]*```[ \t]*$").unwrap()
        });
        static PRE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(?is)<pre(\s[^>]*)?>(.*?)</pre\s*>").unwrap());
        static NOWIKI: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(?is)<nowiki\s*>(.*?)</nowiki\s*>").unwrap());
        static NOWIKI_EMPTY: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(?i)<nowiki\s*/>").unwrap());
        static COMMENT: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(?s)<!--.*?(?:-->|$)").unwrap());

        let text = FENCE.replace_all(text, |captures: &Captures<'_>| {
            let code = html_escape::encode_text(captures[2].trim_end_matches('\n'));
            let html = if captures[1].is_empty() {
                format!("<pre><code>{code}</code></pre>")
            } else {
                format!(
                    r#"<pre><code class="language-{}">{code}</code></pre>"#,
                    &captures[1]
                )
            };
            self.push(Kind::Block, html)
        });
        let text = PRE.replace_all(&text, |captures: &Captures<'_>| {
            let html = format!("<pre>{}</pre>", html_escape::encode_text(&captures[2]));
            self.push(Kind::Block, html)
        });
        let text = NOWIKI.replace_all(&text, |captures: &Captures<'_>| {
            self.push(Kind::Inline, html_escape::encode_text(&captures[1]))
        });
        let text = NOWIKI_EMPTY.replace_all(&text, "");
        COMMENT.replace_all(&text, "").into_owned()
    }

    /// Looks up the content for a captured marker.
    fn content(&self, captures: &Captures<'_>) -> Option<&str> {
        self.entry(captures).map(|(_, content)| content.as_str())
    }

    /// Looks up the kind of a captured marker.
    fn kind(&self, captures: &Captures<'_>) -> Option<Kind> {
        self.entry(captures).map(|(kind, _)| *kind)
    }

    /// Looks up the entry for a captured marker.
    fn entry(&self, captures: &Captures<'_>) -> Option<&(Kind, String)> {
        let index = usize::from_str_radix(&captures[1], 16).ok()?;
        let entry = self.items.get(index);
        if entry.is_none() {
            log::warn!("invalid strip marker {index}");
        }
        entry
    }
}
