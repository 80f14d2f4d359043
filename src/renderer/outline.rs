//! Document outline: heading collection and anchor ids.
//!
//! Headings come from exactly one of three sources, tried in order:
//!
//! 1. Markdown `#` heading lines in the expanded source text.
//! 2. `<h1>`…`<h6>` elements in the rendered body.
//! 3. A [`HeadingFallback`] strategy, which by default promotes bold text
//!    that looks like a section title.
//!
//! Every collected heading gets a unique anchor id, which is written into
//! the matching element of the body unless the element already has one.

use super::{globals::Heading, strip::StripMarkers};
use crate::{
    common::strip_tags,
    config::TRANSLITERATIONS,
    sanitize::parse_attributes,
};
use rand::{Rng as _, SeedableRng as _, rngs::SmallRng};
use regex::Regex;
use std::{collections::HashSet, sync::LazyLock};
use unicode_normalization::{UnicodeNormalization as _, char::is_combining_mark};

/// A place in a rendered body which could be a heading.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Candidate {
    /// The byte offset in the body where an ` id="…"` attribute can be
    /// inserted into the opening tag of the candidate.
    pub insert_at: usize,
    /// The plain text of the heading.
    pub text: String,
}

/// A strategy for finding headings in a document which has no explicit
/// heading markup.
pub trait HeadingFallback: Send + Sync {
    /// Returns the heading candidates in `body`, in document order. All
    /// candidates become level 2 headings.
    fn find(&self, body: &str) -> Vec<Candidate>;
}

/// The default heading fallback, which treats `<strong>` spans that read
/// like titles as headings.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoldTextHeuristic;

impl HeadingFallback for BoldTextHeuristic {
    fn find(&self, body: &str) -> Vec<Candidate> {
        static STRONG: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(?is)<strong\b([^>]*)>(.*?)</strong\s*>").unwrap());

        let mut seen = HashSet::new();
        STRONG
            .captures_iter(body)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                if parse_attributes(&captures[1]).iter().any(|(name, _)| name == "id") {
                    return None;
                }
                let text = plain_text(&captures[2]);
                (looks_like_title(&text) && seen.insert(text.clone())).then(|| Candidate {
                    insert_at: whole.start() + "<strong".len(),
                    text,
                })
            })
            .collect()
    }
}

/// Returns true if a bold span with the given text reads like a section
/// title rather than emphasis.
fn looks_like_title(text: &str) -> bool {
    let len = text.chars().count();
    if len <= 3 || len >= 100 {
        return false;
    }
    if text.chars().all(|c| c.is_ascii_lowercase() || c == ' ') {
        return false;
    }
    if len < 5 && text.chars().any(|c| is_arabic(c) || c == '-') {
        return false;
    }
    if text.len() < 10 && text.chars().all(|c| is_arabic(c) || c == '-') {
        return false;
    }
    text.chars().any(char::is_alphanumeric)
}

/// Returns true if `c` is in one of the Arabic script blocks.
fn is_arabic(c: char) -> bool {
    matches!(c,
        '\u{0600}'..='\u{06ff}'
        | '\u{0750}'..='\u{077f}'
        | '\u{08a0}'..='\u{08ff}'
        | '\u{fb50}'..='\u{fdff}'
        | '\u{fe70}'..='\u{feff}')
}

/// Converts heading text into an anchor id. The result may be empty.
pub(crate) fn anchor_id(text: &str) -> String {
    let stripped = strip_tags(text);
    let mut text = html_escape::decode_html_entities(&stripped).into_owned();
    for (term, latin) in TRANSLITERATIONS {
        if text.contains(term) {
            text = text.replace(term, latin);
        }
    }

    let mut id = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.trim().nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            if pending_space && !id.is_empty() {
                id.push('_');
            }
            pending_space = false;
            id.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() {
            pending_space = true;
        }
    }
    id
}

/// Hands out unique anchor ids.
#[derive(Default)]
struct Slugger {
    /// Ids already in use.
    used: HashSet<String>,
    /// Source of fallback ids, created on first use.
    rng: Option<SmallRng>,
}

impl Slugger {
    /// Marks an id which already exists in the body as used.
    fn reserve(&mut self, id: &str) {
        self.used.insert(id.to_string());
    }

    /// Returns a new unique id for the given heading text.
    fn claim(&mut self, text: &str) -> String {
        let mut base = anchor_id(text);
        if base.is_empty() {
            let rng = self.rng.get_or_insert_with(|| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let seed = time::OffsetDateTime::now_utc().unix_timestamp_nanos() as u64;
                SmallRng::seed_from_u64(seed)
            });
            base = format!("heading_{:08x}", rng.random::<u32>());
        }

        let mut id = base.clone();
        let mut n = 1;
        while !self.used.insert(id.clone()) {
            n += 1;
            id = format!("{base}_{n}");
        }
        id
    }
}

/// A heading element found in the rendered body.
struct HeadingTag {
    /// The heading level.
    level: u8,
    /// The byte offset just past the tag name of the opening tag.
    insert_at: usize,
    /// The plain text content.
    text: String,
    /// The existing id attribute, if any.
    id: Option<String>,
}

/// A heading found by one of the tiers, before it has an id.
struct Found {
    level: u8,
    text: String,
    insert_at: Option<usize>,
    id: Option<String>,
}

/// Collects the headings of a document and writes their anchor ids into
/// `body`.
///
/// `source` is the expanded source text, before block formatting. `body` is
/// the rendered HTML with strip markers already restored.
pub(crate) fn build(
    source: &str,
    body: &str,
    strip: &StripMarkers,
    fallback: &dyn HeadingFallback,
) -> (String, Vec<Heading>) {
    let tags = heading_tags(body);

    let mut found = markdown_headings(source, strip, &tags);
    if found.is_empty() {
        found = tags
            .into_iter()
            .map(|tag| Found {
                level: tag.level,
                text: tag.text,
                insert_at: tag.id.is_none().then_some(tag.insert_at),
                id: tag.id,
            })
            .collect();
    }
    if found.is_empty() {
        found = fallback
            .find(body)
            .into_iter()
            .map(|candidate| Found {
                level: 2,
                text: candidate.text,
                insert_at: Some(candidate.insert_at),
                id: None,
            })
            .collect();
    }

    let mut slugger = Slugger::default();
    for id in found.iter().filter_map(|heading| heading.id.as_deref()) {
        slugger.reserve(id);
    }

    let mut inserts = Vec::new();
    let headings = found
        .into_iter()
        .map(|heading| {
            let id = match heading.id {
                Some(id) => id,
                None => {
                    let id = slugger.claim(&heading.text);
                    if let Some(at) = heading.insert_at {
                        inserts.push((at, id.clone()));
                    }
                    id
                }
            };
            Heading {
                level: heading.level,
                text: heading.text,
                id,
            }
        })
        .collect::<Vec<_>>();

    log::debug!("collected {} headings", headings.len());
    (inject_ids(body, inserts), headings)
}

/// Finds every heading element in the body.
fn heading_tags(body: &str) -> Vec<HeadingTag> {
    static HEADING: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<h([1-6])\b([^>]*)>(.*?)</h[1-6]\s*>").unwrap());

    HEADING
        .captures_iter(body)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let level = captures[1].as_bytes()[0] - b'0';
            let id = parse_attributes(&captures[2])
                .into_iter()
                .find_map(|(name, value)| (name == "id" && !value.is_empty()).then_some(value));
            Some(HeadingTag {
                level,
                insert_at: whole.start() + "<h1".len(),
                text: plain_text(&captures[3]),
                id,
            })
        })
        .collect()
}

/// Collects markdown heading lines from the source, pairing each with the
/// heading element it became in the body.
fn markdown_headings(source: &str, strip: &StripMarkers, tags: &[HeadingTag]) -> Vec<Found> {
    static LINE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})[ \t]+(.+?)[ \t]*\r?$").unwrap());

    let mut cursor = 0;
    LINE.captures_iter(source)
        .filter_map(|captures| {
            if strip.is_block(&captures[2]) {
                return None;
            }
            let text = plain_text(&strip.restore(&captures[2]));
            if text.is_empty() {
                return None;
            }
            let level = u8::try_from(captures[1].len()).unwrap_or(6);

            let rest = tags.get(cursor..).unwrap_or_default();
            let matched = rest
                .iter()
                .position(|tag| tag.level == level && tag.text == text)
                .or_else(|| rest.iter().position(|tag| tag.level == level));
            let tag = matched.map(|offset| {
                cursor += offset + 1;
                &rest[offset]
            });

            Some(Found {
                level,
                text,
                insert_at: tag.filter(|tag| tag.id.is_none()).map(|tag| tag.insert_at),
                id: tag.and_then(|tag| tag.id.clone()),
            })
        })
        .collect()
}

/// Reduces inline HTML or wikitext to the plain text of a heading.
fn plain_text(html: &str) -> String {
    let stripped = strip_tags(html);
    let text = html_escape::decode_html_entities(&stripped);
    let text = text.replace("'''", "").replace("''", "");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Inserts id attributes at the given offsets.
fn inject_ids(body: &str, mut inserts: Vec<(usize, String)>) -> String {
    if inserts.is_empty() {
        return body.to_string();
    }

    inserts.sort_by_key(|(at, _)| *at);
    let mut out = String::with_capacity(body.len() + inserts.len() * 16);
    let mut last = 0;
    for (at, id) in inserts {
        out += &body[last..at];
        out += " id=\"";
        out += &html_escape::encode_double_quoted_attribute(&id);
        out.push('"');
        last = at;
    }
    out += &body[last..];
    out
}
