//! Code for handling the citation extension tags, `<ref>` and
//! `<references>`.
//!
//! References are collected in document order. Each `<ref>` is replaced by a
//! numbered superscript link, and the collected reference text is emitted as
//! an ordered list either where `<references/>` was written or at the end of
//! the document.
//!
//! A named reference is numbered once. Later uses of the same name link to
//! the same number. `<ref name="x"/>` before `x` has any text reserves a
//! number which the first `<ref name="x">text</ref>` fills in. A reserved
//! number which is never filled renders as an error marker in the list.

use super::{
    REFERENCES_SENTINEL, Result, State,
    inline::render_inline,
    strip::{Kind, StripMarkers},
};
use crate::sanitize::{parse_attributes, sanitize};
use core::fmt::Write as _;
use regex::{Captures, Regex};
use serde::Serialize;
use std::{collections::HashMap, sync::LazyLock};

/// A collected citation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Reference {
    /// The page-unique 1-based number of the reference.
    pub id: usize,
    /// The name given to the reference, if any.
    pub name: Option<String>,
    /// The rendered reference text. Empty if the reference was reserved by
    /// name but never given any text.
    pub content: String,
}

/// Stored citation references.
#[derive(Debug, Default)]
pub(crate) struct References {
    /// References in order of their numbers.
    items: Vec<Reference>,
    /// Named references. Value is an index into `items`.
    named: HashMap<String, usize>,
    /// How many times each reference has been cited. Indexes match `items`.
    uses: Vec<usize>,
}

impl References {
    /// Adds a named reference with the given text. If the reference already
    /// exists and contains text, the new text is ignored. Returns the index
    /// of the reference.
    fn insert_named(&mut self, name: &str, content: String) -> usize {
        if let Some(&index) = self.named.get(name) {
            let item = &mut self.items[index];
            if item.content.is_empty() {
                item.content = content;
            } else if item.content != content {
                log::debug!("reference '{name}' redefined with different text; keeping the first");
            }
            return index;
        }

        let index = self.push(Some(name.to_string()), content);
        self.named.insert(name.to_string(), index);
        index
    }

    /// Finds a named reference, or reserves a number for it. Returns the
    /// index of the reference.
    fn reserve_named(&mut self, name: &str) -> usize {
        self.insert_named(name, String::new())
    }

    /// Adds an unnamed reference. Returns the index of the reference.
    fn insert_unnamed(&mut self, content: String) -> usize {
        self.push(None, content)
    }

    /// Appends a reference.
    fn push(&mut self, name: Option<String>, content: String) -> usize {
        let index = self.items.len();
        self.items.push(Reference {
            id: index + 1,
            name,
            content,
        });
        self.uses.push(0);
        index
    }

    /// Records a citation of the reference at `index`. Returns the reference
    /// number and how many times it was cited before.
    fn cite(&mut self, index: usize) -> (usize, usize) {
        let uses = self.uses[index];
        self.uses[index] += 1;
        (self.items[index].id, uses)
    }

    /// Returns true if no references were collected.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the collected references with their text restored and
    /// sanitized for the given host.
    pub fn finish(&self, strip: &StripMarkers, host: &str) -> Vec<Reference> {
        self.items
            .iter()
            .map(|item| Reference {
                content: sanitize(&strip.restore(&item.content), host),
                ..item.clone()
            })
            .collect()
    }
}

/// Replaces every `<ref>` in `text` with a citation link and every
/// `<references>` with a sentinel marking where the reference list goes.
pub(crate) fn extract_references(state: &mut State<'_>, text: &str) -> String {
    static TAG: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?is)<references(?:\s[^>]*?)?(?:/>|>(.*?)</references\s*>)|<ref(\s[^>]*?)?(?:/>|>(.*?)</ref\s*>)",
        )
        .unwrap()
    });

    if !text.contains('<') {
        return text.to_string();
    }

    TAG.replace_all(text, |captures: &Captures<'_>| {
        if captures[0][1..].to_ascii_lowercase().starts_with("references") {
            // List-defined references are collected but render nothing
            // where they are written
            if let Some(body) = captures.get(1) {
                extract_references(state, body.as_str());
            }
            format!("\n{REFERENCES_SENTINEL}\n")
        } else {
            let attrs = captures.get(2).map_or("", |m| m.as_str());
            let content = captures.get(3).map_or("", |m| m.as_str()).trim();
            cite(state, attrs, content)
        }
    })
    .into_owned()
}

/// Records one `<ref>` and returns its citation link marker.
fn cite(state: &mut State<'_>, attrs: &str, content: &str) -> String {
    let name = parse_attributes(attrs)
        .into_iter()
        .find_map(|(key, value)| (key == "name").then(|| value.trim().to_string()))
        .filter(|name| !name.is_empty());

    let index = match (name, content.is_empty()) {
        (Some(name), false) => {
            let content = render_inline(state, content);
            state.references.insert_named(&name, content)
        }
        (Some(name), true) => state.references.reserve_named(&name),
        (None, false) => {
            let content = render_inline(state, content);
            state.references.insert_unnamed(content)
        }
        (None, true) => return String::new(),
    };

    let (id, uses) = state.references.cite(index);
    let anchor = if uses == 0 {
        format!("cite_ref-{id}")
    } else {
        format!("cite_ref-{id}-{uses}")
    };
    let html = format!(
        r##"<sup class="reference" id="{anchor}"><a href="#cite_note-{id}">[{id}]</a></sup>"##
    );
    state.strip.push(Kind::Inline, html)
}

/// Renders the reference list. Returns an empty string if there are no
/// references.
pub(crate) fn render_references(state: &State<'_>) -> Result<String> {
    if state.references.is_empty() {
        return Ok(String::new());
    }

    let mut out = String::new();
    write!(
        out,
        r#"<div class="wiki-references"><h2>{}</h2><ol class="references">"#,
        html_escape::encode_text(&state.options.references_heading)
    )?;
    for item in &state.references.items {
        let id = item.id;
        write!(
            out,
            r##"<li id="cite_note-{id}"><a href="#cite_ref-{id}">^</a> "##
        )?;
        if item.content.is_empty() {
            let name = item.name.as_deref().unwrap_or_default();
            write!(
                out,
                "{{{{Reference not defined: {}}}}}",
                html_escape::encode_text(name)
            )?;
        } else {
            out += &item.content;
        }
        out += "</li>";
    }
    out += "</ol></div>";
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering() {
        let mut refs = References::default();
        let a = refs.insert_unnamed("A".into());
        let b = refs.reserve_named("b");
        let c = refs.insert_named("c", "C".into());
        assert_eq!(refs.insert_named("b", "B".into()), b, "reserved slot is filled");
        assert_eq!(refs.reserve_named("c"), c, "named reference is reused");
        assert_eq!(refs.insert_named("c", "other".into()), c);

        assert_eq!(refs.cite(a), (1, 0));
        assert_eq!(refs.cite(c), (3, 0));
        assert_eq!(refs.cite(c), (3, 1));

        let items = refs.finish(&StripMarkers::default(), "localhost");
        let contents = items.iter().map(|item| item.content.as_str()).collect::<Vec<_>>();
        assert_eq!(contents, ["A", "B", "C"], "first text wins");
        assert_eq!(items[1].name.as_deref(), Some("b"));
    }
}
