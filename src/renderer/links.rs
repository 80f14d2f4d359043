//! Link rendering: wiki links, bracketed external links, and markdown links
//! and images.
//!
//! Every rendered link is lifted into an inline strip marker, so later inline
//! passes never see the generated HTML.

use super::{
    State,
    inline::emphasis,
    outline::anchor_id,
    strip::Kind,
};
use crate::{common::url_encode, title::slugify};
use regex::{Captures, Regex};
use std::{borrow::Cow, sync::LazyLock};

/// A kind of link to render.
#[derive(Debug)]
enum LinkKind<'a> {
    /// A link to another site.
    External(Cow<'a, str>),
    /// A link to a wiki page, with an optional section.
    Internal {
        slug: String,
        fragment: Option<&'a str>,
    },
    /// A link to a section of the current page.
    Fragment(&'a str),
}

impl LinkKind<'_> {
    /// Converts the link to a URL suitable for an HTML `href` attribute.
    fn to_href(&self, wiki_base: &str) -> String {
        let href = match self {
            LinkKind::External(url) => url.to_string(),
            LinkKind::Internal { slug, fragment } => {
                let mut href = format!("{wiki_base}{}", url_encode(slug));
                if let Some(fragment) = fragment {
                    href.push('#');
                    href += &anchor_id(fragment);
                }
                href
            }
            LinkKind::Fragment(fragment) => format!("#{}", anchor_id(fragment)),
        };
        html_escape::encode_double_quoted_attribute(&href).into_owned()
    }
}

/// Escapes the visible text of a link and applies emphasis to it. Entities
/// in the source text are kept.
fn link_text(text: &str) -> String {
    emphasis(&html_escape::encode_text(&html_escape::decode_html_entities(text)))
}

/// Replaces `[[Page]]`, `[[Page|text]]`, `[[Page#Section]]`, and
/// `[[#Section]]` with links.
pub(super) fn wiki_links(state: &mut State<'_>, text: &str) -> String {
    static LINK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[\[([^\[\]|\n]+)(?:\|([^\]\n]*))?\]\]").unwrap());

    if !text.contains("[[") {
        return text.to_string();
    }

    LINK.replace_all(text, |captures: &Captures<'_>| {
        let target = captures[1].trim();
        let target = target.strip_prefix(':').unwrap_or(target).trim();
        let display = captures
            .get(2)
            .map(|m| m.as_str().trim())
            .filter(|display| !display.is_empty())
            .unwrap_or(target);

        let (page, fragment) = match target.split_once('#') {
            Some((page, fragment)) => (page.trim(), Some(fragment.trim())),
            None => (target, None),
        };

        let html = if page.is_empty() {
            let Some(fragment) = fragment.filter(|fragment| !fragment.is_empty()) else {
                return captures[0].to_string();
            };
            format!(
                r#"<a href="{}" class="wiki-link">{}</a>"#,
                LinkKind::Fragment(fragment).to_href(&state.ctx.wiki_base),
                link_text(display)
            )
        } else {
            let slug = slugify(page);
            if slug.is_empty() {
                return captures[0].to_string();
            }
            let class = if state.page_exists(&slug) {
                "wiki-link"
            } else {
                "wiki-link missing"
            };
            format!(
                r#"<a href="{}" class="{class}" title="{}">{}</a>"#,
                LinkKind::Internal { slug, fragment }.to_href(&state.ctx.wiki_base),
                html_escape::encode_double_quoted_attribute(page),
                link_text(display)
            )
        };
        state.strip.push(Kind::Inline, html)
    })
    .into_owned()
}

/// Replaces `[url text]` and `[url]` with external links. Unlabelled links
/// are numbered in document order.
pub(super) fn external_links(state: &mut State<'_>, text: &str) -> String {
    static LINK: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"\[((?:https?://|mailto:|//)[^\s\]\[<>"]+)(?:[ \t]+([^\]\n]*))?\]"#).unwrap()
    });

    if !text.contains('[') {
        return text.to_string();
    }

    LINK.replace_all(text, |captures: &Captures<'_>| {
        let href = LinkKind::External(Cow::Borrowed(&captures[1])).to_href(&state.ctx.wiki_base);
        let label = captures.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        let html = if label.is_empty() {
            state.external_links += 1;
            format!(
                r#"<a href="{href}" class="external autonumber">[{}]</a>"#,
                state.external_links
            )
        } else {
            format!(r#"<a href="{href}" class="external">{}</a>"#, link_text(label))
        };
        state.strip.push(Kind::Inline, html)
    })
    .into_owned()
}

/// Replaces markdown `![alt](src)` images and `[text](url)` links.
pub(super) fn markdown_links(state: &mut State<'_>, text: &str) -> String {
    static IMAGE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[([^\]\n]*)\]\(([^)\s]+)\)").unwrap());
    static LINK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]\n]+)\]\(([^)\s]+)\)").unwrap());

    if !text.contains("](") {
        return text.to_string();
    }

    let text = IMAGE.replace_all(text, |captures: &Captures<'_>| {
        let html = format!(
            r#"<img src="{}" alt="{}" class="post-image">"#,
            html_escape::encode_double_quoted_attribute(&captures[2]),
            html_escape::encode_double_quoted_attribute(&captures[1])
        );
        state.strip.push(Kind::Inline, html)
    });
    LINK.replace_all(&text, |captures: &Captures<'_>| {
        let href = LinkKind::External(Cow::Borrowed(&captures[2])).to_href(&state.ctx.wiki_base);
        let html = format!(r#"<a href="{href}">{}</a>"#, link_text(&captures[1]));
        state.strip.push(Kind::Inline, html)
    })
    .into_owned()
}
