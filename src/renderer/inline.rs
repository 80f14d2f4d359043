//! Inline markup and block structure.
//!
//! [`render_inline`] handles phrasing content: code spans, links, images,
//! and emphasis. [`render_blocks`] splits a document into lines and builds
//! headings, rules, lists, and paragraphs around inline content.

use super::{
    REFERENCES_SENTINEL, State, TOC_SENTINEL, links,
    strip::Kind,
    tables::find_outside_brackets,
};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Block-level elements. A line starting with one of these tags is never
/// wrapped in a paragraph.
static BLOCK_TAGS: phf::Set<&'static str> = phf::phf_set! {
    "address", "article", "aside", "blockquote", "caption", "center", "dd",
    "details", "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "summary", "table", "tbody", "td", "tfoot",
    "th", "thead", "tr", "ul",
};

/// Renders inline markup.
pub(crate) fn render_inline(state: &mut State<'_>, text: &str) -> String {
    static CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+)`").unwrap());

    let text = CODE.replace_all(text, |captures: &Captures<'_>| {
        let html = format!("<code>{}</code>", html_escape::encode_text(&captures[1]));
        state.strip.push(Kind::Inline, html)
    });
    let text = links::wiki_links(state, &text);
    let text = links::markdown_links(state, &text);
    let text = links::external_links(state, &text);
    emphasis(&text)
}

/// Converts wiki and markdown emphasis into HTML.
pub(super) fn emphasis(text: &str) -> String {
    static BOLD_ITALIC: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"'''''(.+?)'''''").unwrap());
    static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'''(.+?)'''").unwrap());
    static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"''(.+?)''").unwrap());
    static MD_BOLD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*\*([^*\s](?:[^*\n]*[^*\s])?)\*\*").unwrap());
    static MD_ITALIC: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*([^*\s](?:[^*\n]*[^*\s])?)\*").unwrap());

    if !text.contains(['\'', '*']) {
        return text.to_string();
    }

    let text = BOLD_ITALIC.replace_all(text, "<strong><em>$1</em></strong>");
    let text = BOLD.replace_all(&text, "<strong>$1</strong>");
    let text = ITALIC.replace_all(&text, "<em>$1</em>");
    let text = MD_BOLD.replace_all(&text, "<strong>$1</strong>");
    MD_ITALIC.replace_all(&text, "<em>$1</em>").into_owned()
}

/// Renders block structure.
pub(crate) fn render_blocks(state: &mut State<'_>, text: &str) -> String {
    static WIKI_HEADING: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(=+)(.+?)(=+)[ \t]*$").unwrap());
    static MD_HEADING: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(#{1,6})[ \t]+(.+?)[ \t]*$").unwrap());
    static RULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-{3,}[ \t]*$").unwrap());
    static LIST: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^([*#:;]+)[ \t]*(.*)$").unwrap());
    static STAR_EMPHASIS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\*{1,2}[^*\s][^*\n]*\*").unwrap());
    static NUMBERED: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[ \t]*\d+\.[ \t]+(.+)$").unwrap());
    static BLOCK_TAG: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[ \t]*</?([a-zA-Z][a-zA-Z0-9]*)\b").unwrap());

    let mut out = Blocks::default();

    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        let trimmed = line.trim();

        if trimmed.is_empty() {
            out.break_flow(state);
        } else if state.strip.is_block(trimmed)
            || trimmed == TOC_SENTINEL
            || trimmed == REFERENCES_SENTINEL
        {
            out.push_block(state, trimmed.to_string());
        } else if let Some(captures) = WIKI_HEADING.captures(line)
            && let Some((level, heading)) = wiki_heading(&captures)
        {
            let html = render_inline(state, &heading);
            out.push_block(state, format!("<h{level}>{html}</h{level}>"));
        } else if let Some(captures) = MD_HEADING.captures(line) {
            let level = captures[1].len();
            let html = render_inline(state, &captures[2]);
            out.push_block(state, format!("<h{level}>{html}</h{level}>"));
        } else if RULE.is_match(line) {
            out.push_block(state, "<hr>".into());
        } else if let Some(captures) = LIST.captures(line)
            && !STAR_EMPHASIS.is_match(line)
        {
            out.push_item(state, &captures[1], &captures[2]);
        } else if let Some(captures) = NUMBERED.captures(line) {
            out.push_item(state, "#", &captures[1]);
        } else if BLOCK_TAG
            .captures(line)
            .is_some_and(|captures| BLOCK_TAGS.contains(captures[1].to_ascii_lowercase().as_str()))
        {
            let html = render_inline(state, trimmed);
            out.push_block(state, html);
        } else {
            out.push_text(trimmed);
        }
    }

    out.finish(state)
}

/// Works out the level and text of a `== heading ==` line. Unbalanced `=`
/// runs are balanced by moving the excess into the heading text.
fn wiki_heading(captures: &Captures<'_>) -> Option<(usize, String)> {
    let open = captures[1].len();
    let close = captures[3].len();
    let level = open.min(close).min(6);
    let text = format!(
        "{}{}{}",
        "=".repeat(open - level),
        &captures[2],
        "=".repeat(close - level)
    );
    let text = text.trim();
    (!text.is_empty()).then(|| (level, text.to_string()))
}

/// Output builder for [`render_blocks`].
#[derive(Default)]
struct Blocks {
    /// Finished blocks.
    out: Vec<String>,
    /// Lines of the current paragraph.
    paragraph: Vec<String>,
    /// The currently open lists.
    list: ListEmitter,
    /// The HTML of the list being built.
    list_html: String,
}

impl Blocks {
    /// Ends any open paragraph or list.
    fn break_flow(&mut self, state: &mut State<'_>) {
        self.end_paragraph(state);
        self.end_list();
    }

    /// Adds a line which must not be wrapped.
    fn push_block(&mut self, state: &mut State<'_>, html: String) {
        self.break_flow(state);
        self.out.push(html);
    }

    /// Adds a list item. A definition term may carry its definition on the
    /// same line, after a `:`.
    fn push_item(&mut self, state: &mut State<'_>, bullets: &str, content: &str) {
        self.end_paragraph(state);

        if let Some(outer) = bullets.strip_suffix(';')
            && let Some(at) = find_outside_brackets(content, ":")
        {
            let term = render_inline(state, content[..at].trim());
            let detail = render_inline(state, content[at + 1..].trim());
            self.list.emit(&mut self.list_html, bullets);
            self.list_html += &term;
            self.list.emit(&mut self.list_html, &format!("{outer}:"));
            self.list_html += &detail;
        } else {
            let html = render_inline(state, content.trim());
            self.list.emit(&mut self.list_html, bullets);
            self.list_html += &html;
        }
    }

    /// Adds a line of paragraph text.
    fn push_text(&mut self, text: &str) {
        self.end_list();
        self.paragraph.push(text.to_string());
    }

    /// Formats and emits the current paragraph.
    fn end_paragraph(&mut self, state: &mut State<'_>) {
        if !self.paragraph.is_empty() {
            let text = self.paragraph.join("\n");
            self.paragraph.clear();
            let html = render_inline(state, &text);
            self.out.push(format!("<p>{}</p>", html.trim()));
        }
    }

    fn end_list(&mut self) {
        if !self.list.stack.is_empty() {
            self.list.finish(&mut self.list_html);
            self.out.push(core::mem::take(&mut self.list_html));
        }
    }

    /// Finishes the document.
    fn finish(mut self, state: &mut State<'_>) -> String {
        self.break_flow(state);
        self.out.join("\n")
    }
}

/// Nested list state.
#[derive(Debug, Default)]
struct ListEmitter {
    /// The stack of currently open list items.
    stack: Vec<ListKind>,
}

impl ListEmitter {
    /// Emits HTML to move from the current list state to the one given by
    /// `bullets`.
    fn emit(&mut self, out: &mut String, bullets: &str) {
        let kinds = bullets.bytes().filter_map(ListKind::new).collect::<Vec<_>>();
        let common = self
            .stack
            .iter()
            .zip(&kinds)
            .take_while(|(open, new)| open.same_parent(**new))
            .count();

        for kind in self.stack.drain(common..).rev() {
            kind.end(out, true);
        }

        if common != 0 && common == kinds.len() {
            // Sibling item in the innermost list
            let old = &mut self.stack[common - 1];
            let new = kinds[common - 1];
            old.end(out, false);
            new.start(out, false);
            *old = new;
        }

        for kind in &kinds[common..] {
            kind.start(out, true);
            self.stack.push(*kind);
        }
    }

    /// Closes every open list.
    fn finish(&mut self, out: &mut String) {
        for kind in self.stack.drain(..).rev() {
            kind.end(out, true);
        }
    }
}

/// A list kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ListKind {
    /// `#` or `1.`
    Ordered,
    /// `*`
    Unordered,
    /// `;`
    Term,
    /// `:`
    Detail,
}

impl ListKind {
    fn new(bullet: u8) -> Option<Self> {
        Some(match bullet {
            b'#' => Self::Ordered,
            b'*' => Self::Unordered,
            b';' => Self::Term,
            b':' => Self::Detail,
            _ => return None,
        })
    }

    /// Returns true if `self` and `other` are items of the same kind of list.
    fn same_parent(self, other: Self) -> bool {
        match self {
            Self::Ordered | Self::Unordered => self == other,
            Self::Term | Self::Detail => matches!(other, Self::Term | Self::Detail),
        }
    }

    fn list_tag(self) -> &'static str {
        match self {
            Self::Ordered => "ol",
            Self::Unordered => "ul",
            Self::Term | Self::Detail => "dl",
        }
    }

    fn item_tag(self) -> &'static str {
        match self {
            Self::Ordered | Self::Unordered => "li",
            Self::Term => "dt",
            Self::Detail => "dd",
        }
    }

    fn start(self, out: &mut String, start_of_list: bool) {
        if start_of_list {
            *out += &format!("<{}>", self.list_tag());
        }
        *out += &format!("<{}>", self.item_tag());
    }

    fn end(self, out: &mut String, end_of_list: bool) {
        *out += &format!("</{}>", self.item_tag());
        if end_of_list {
            *out += &format!("</{}>", self.list_tag());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emphasis_forms() {
        assert_eq!(emphasis("'''b''' and ''i''"), "<strong>b</strong> and <em>i</em>");
        assert_eq!(emphasis("'''''bi'''''"), "<strong><em>bi</em></strong>");
        assert_eq!(emphasis("**b** and *i*"), "<strong>b</strong> and <em>i</em>");
        assert_eq!(emphasis("a * b * c"), "a * b * c", "spaced asterisks are not emphasis");
        assert_eq!(emphasis("it's"), "it's");
    }

    #[test]
    fn lists() {
        let mut list = ListEmitter::default();
        let mut out = String::new();
        list.emit(&mut out, "*");
        out += "a";
        list.emit(&mut out, "**");
        out += "b";
        list.emit(&mut out, "*");
        out += "c";
        list.emit(&mut out, "#");
        out += "d";
        list.finish(&mut out);
        assert_eq!(
            out,
            "<ul><li>a<ul><li>b</li></ul></li><li>c</li></ul><ol><li>d</li></ol>"
        );
    }

    #[test]
    fn definition_lists() {
        let mut list = ListEmitter::default();
        let mut out = String::new();
        list.emit(&mut out, ";");
        out += "t";
        list.emit(&mut out, ":");
        out += "d";
        list.finish(&mut out);
        assert_eq!(out, "<dl><dt>t</dt><dd>d</dd></dl>");
    }

    #[test]
    fn heading_balance() {
        static RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(=+)(.+?)(=+)[ \t]*$").unwrap());
        let level = |line: &str| RE.captures(line).and_then(|c| wiki_heading(&c));
        assert_eq!(level("== Two =="), Some((2, "Two".into())));
        assert_eq!(level("=== Three =="), Some((2, "= Three".into())));
        assert_eq!(level("==  =="), None);
    }
}
