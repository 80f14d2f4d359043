//! Types and functions for normalising page titles and turning them into
//! slugs.

use html_escape::decode_html_entities;
use std::borrow::Cow;
use unicase::UniCase;

/// A page namespace.
#[derive(Debug, Eq, PartialEq)]
pub struct Namespace {
    /// The namespace ID. Even IDs are subject namespaces, odd IDs are talk
    /// namespaces.
    pub id: i32,
    /// The display name of the namespace.
    pub name: &'static str,
}

impl Namespace {
    /// The main namespace ID.
    pub const MAIN: i32 = 0;
    /// The template namespace ID.
    pub const TEMPLATE: i32 = 10;

    /// Finds the namespace with the given numeric ID.
    pub fn find_by_id(id: i32) -> Option<&'static Self> {
        NAMESPACES.iter().find(|ns| ns.id == id)
    }

    /// Finds the namespace with the given case-insensitive name.
    pub fn find_by_name(name: &str) -> Option<&'static Self> {
        let name = normalize(name);
        let name = UniCase::new(name.as_ref());
        NAMESPACES
            .iter()
            .find(|ns| UniCase::new(ns.name) == name)
    }

    /// Returns the main namespace.
    pub fn main() -> &'static Self {
        &NAMESPACES[0]
    }

    /// Returns the talk namespace corresponding to this namespace.
    pub fn talk(&self) -> &'static Self {
        Self::find_by_id(self.id | 1).unwrap_or(&NAMESPACES[1])
    }

    /// Returns the subject namespace corresponding to this namespace.
    pub fn subject(&self) -> &'static Self {
        Self::find_by_id(self.id & !1).unwrap_or(&NAMESPACES[0])
    }
}

/// All known namespaces.
static NAMESPACES: &[Namespace] = &[
    Namespace { id: 0, name: "" },
    Namespace { id: 1, name: "Talk" },
    Namespace { id: 2, name: "User" },
    Namespace { id: 3, name: "User talk" },
    Namespace { id: 4, name: "Project" },
    Namespace { id: 5, name: "Project talk" },
    Namespace { id: 6, name: "File" },
    Namespace { id: 7, name: "File talk" },
    Namespace { id: 10, name: "Template" },
    Namespace { id: 11, name: "Template talk" },
    Namespace { id: 12, name: "Help" },
    Namespace { id: 13, name: "Help talk" },
    Namespace { id: 14, name: "Category" },
    Namespace { id: 15, name: "Category talk" },
    Namespace { id: 828, name: "Module" },
    Namespace { id: 829, name: "Module talk" },
];

/// A page title split into namespace and text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Title {
    /// The namespace of the title.
    namespace: &'static Namespace,
    /// The normalised title text, without namespace.
    text: String,
}

impl Title {
    /// Parses a title. A leading `Namespace:` prefix is only split off if it
    /// names a known namespace.
    pub fn new(title: &str) -> Self {
        let title = normalize(title);
        if let Some((prefix, rest)) = title.split_once(':')
            && let Some(namespace) = Namespace::find_by_name(prefix)
            && namespace.id != Namespace::MAIN
        {
            return Self {
                namespace,
                text: rest.trim().to_string(),
            };
        }

        Self {
            namespace: Namespace::main(),
            text: title.into_owned(),
        }
    }

    /// The namespace of the title.
    pub fn namespace(&self) -> &'static Namespace {
        self.namespace
    }

    /// The title text without namespace.
    ///
    /// ```text
    /// Namespace:Root/Sub/Page
    ///           ^^^^^^^^^^^^^
    /// ```
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The title text with namespace.
    pub fn full_text(&self) -> String {
        with_namespace(self.namespace, &self.text)
    }

    /// The first subpage segment.
    ///
    /// ```text
    /// Namespace:Root/Sub/Page
    ///           ^^^^
    /// ```
    pub fn root_text(&self) -> &str {
        self.text.split('/').next().unwrap_or(&self.text)
    }

    /// Everything but the last subpage segment.
    ///
    /// ```text
    /// Namespace:Root/Sub/Page
    ///           ^^^^^^^^
    /// ```
    pub fn base_text(&self) -> &str {
        self.text.rsplit_once('/').map_or(&self.text, |(base, _)| base)
    }

    /// The last subpage segment.
    ///
    /// ```text
    /// Namespace:Root/Sub/Page
    ///                    ^^^^
    /// ```
    pub fn sub_page_text(&self) -> &str {
        self.text.rsplit_once('/').map_or(&self.text, |(_, sub)| sub)
    }

    /// The full title of the associated talk page.
    pub fn talk_page(&self) -> String {
        with_namespace(self.namespace.talk(), &self.text)
    }

    /// The full title of the associated subject page.
    pub fn subject_page(&self) -> String {
        with_namespace(self.namespace.subject(), &self.text)
    }
}

impl core::fmt::Display for Title {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.full_text())
    }
}

/// Joins a namespace and title text.
fn with_namespace(namespace: &Namespace, text: &str) -> String {
    if namespace.name.is_empty() {
        text.to_string()
    } else {
        format!("{}:{text}", namespace.name)
    }
}

/// Normalises a title text part by decoding HTML entities and converting
/// runs of whitespace + underscore to a single space character.
pub fn normalize(text: &str) -> Cow<'_, str> {
    let decoded = decode_html_entities(text);
    let mut out = String::new();
    let mut flushed = 0;
    let mut iter = decoded.char_indices().peekable();

    while let Some((index, c)) = iter.next() {
        // Peek to avoid switching to owned-mode when encountering a single
        // space
        if trimmable(c) && (c != ' ' || matches!(iter.peek(), Some((_, c)) if trimmable(*c))) {
            while iter.next_if(|(_, c)| trimmable(*c)).is_some() {}

            // Acts like `trim` at the start and end of the text
            if let Some((next_index, _)) = iter.peek() {
                out += &decoded[flushed..index];
                flushed = *next_index;
                if index != 0 && spacelike(c) {
                    out.push(' ');
                }
            }
        }
    }

    if flushed == 0 {
        match decoded {
            Cow::Borrowed(b) => Cow::Borrowed(b.trim_matches(trimmable)),
            Cow::Owned(o) => Cow::Owned(o.trim_matches(trimmable).to_string()),
        }
    } else {
        out += decoded[flushed..].trim_end_matches(trimmable);
        Cow::Owned(out)
    }
}

/// Normalises the head of a template call into a template name. The
/// `Template:` prefix is optional.
pub fn template_name(head: &str) -> String {
    let name = normalize(head);
    match name.split_once(':') {
        Some((prefix, rest))
            if Namespace::find_by_name(prefix).is_some_and(|ns| ns.id == Namespace::TEMPLATE) =>
        {
            rest.trim().to_string()
        }
        _ => name.into_owned(),
    }
}

/// Converts a title to a URL-safe slug.
///
/// Letters and digits from any script are kept and lowercased. Every other
/// run of characters becomes a single `-`, and `-` is never leading or
/// trailing.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in decode_html_entities(title).chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Returns true if the given character `c` is a bidirectional text control
/// character.
fn bidi(c: char) -> bool {
    ('\u{200e}'..='\u{200f}').contains(&c) || ('\u{202a}'..='\u{202e}').contains(&c)
}

/// Returns true if the character `c` is considered like whitespace in title
/// text.
fn spacelike(c: char) -> bool {
    c == '_' || c.is_whitespace()
}

/// Returns true if the character `c` is trimmable in title text.
fn trimmable(c: char) -> bool {
    bidi(c) || spacelike(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize() {
        assert_eq!(super::normalize("A b"), Cow::Borrowed("A b"));
        assert_eq!(super::normalize("A_b"), "A b");
        assert_eq!(super::normalize("A__  __b"), "A b");
        assert_eq!(super::normalize("   A b   "), Cow::Borrowed("A b"));
        assert_eq!(super::normalize("\u{200e}A b   \u{202e}"), "A b");
    }

    #[test]
    fn slugify() {
        assert_eq!(super::slugify("Al-Andalus"), "al-andalus");
        assert_eq!(super::slugify("  The  Golden Age! "), "the-golden-age");
        assert_eq!(super::slugify("pp-semi-indef"), "pp-semi-indef");
        assert_eq!(super::slugify("Caf&eacute; Culture"), "café-culture");
        assert_eq!(super::slugify("تاريخ الأندلس"), "تاريخ-الأندلس");
        assert_eq!(super::slugify("!!!"), "");
    }

    #[test]
    fn template_name() {
        assert_eq!(super::template_name(" Cite_web "), "Cite web");
        assert_eq!(super::template_name("Template:Cite web"), "Cite web");
        assert_eq!(super::template_name("template: Infobox"), "Infobox");
        assert_eq!(
            super::template_name("Help:Contents"),
            "Help:Contents",
            "other namespaces should be kept"
        );
    }

    #[test]
    fn title_parts() {
        let title = Title::new("Help:Root/Sub/Page");
        assert_eq!(title.namespace().id, 12);
        assert_eq!(title.text(), "Root/Sub/Page");
        assert_eq!(title.full_text(), "Help:Root/Sub/Page");
        assert_eq!(title.root_text(), "Root");
        assert_eq!(title.base_text(), "Root/Sub");
        assert_eq!(title.sub_page_text(), "Page");
        assert_eq!(title.talk_page(), "Help talk:Root/Sub/Page");

        let title = Title::new("Talk:Main_Page");
        assert_eq!(title.text(), "Main Page");
        assert_eq!(title.subject_page(), "Main Page");

        let title = Title::new("Ratio 3:2");
        assert_eq!(title.namespace().id, Namespace::MAIN, "unknown prefix is text");
        assert_eq!(title.text(), "Ratio 3:2");
    }
}
