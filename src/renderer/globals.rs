//! Collections for semi-structured document data.

use super::{Result, State};
use core::fmt::Write as _;
use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::LazyLock;

/// Document-level flags set by behaviour switches.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Switches {
    /// `__NOTITLE__`: the page title should not be displayed.
    pub no_title: bool,
    /// `__NOCAT__`: the category list should not be displayed.
    pub no_category: bool,
}

/// Where the table of contents goes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TocPosition {
    /// Before the first heading.
    #[default]
    Auto,
    /// Where `__TOC__` was written.
    Manual,
}

/// Table of contents settings.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct TocSettings {
    /// False if `__NOTOC__` was used.
    pub enabled: bool,
    /// True if `__FORCETOC__` was used.
    pub forced: bool,
    /// The placement of the table of contents.
    pub position: TocPosition,
    /// The deepest heading level shown, from `{{TOC limit}}`.
    pub limit: Option<u8>,
}

impl Default for TocSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            forced: false,
            position: TocPosition::Auto,
            limit: None,
        }
    }
}

impl TocSettings {
    /// Returns true if a table of contents should be shown for a document
    /// with `count` headings.
    pub fn should_show(&self, count: usize, min_headings: usize) -> bool {
        self.enabled
            && count > 0
            && (self.forced || self.position == TocPosition::Manual || count >= min_headings)
    }
}

/// A document heading.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Heading {
    /// The heading level, from 1 to 6.
    pub level: u8,
    /// The plain text of the heading.
    pub text: String,
    /// The unique anchor ID of the heading.
    pub id: String,
}

/// Removes `[[Category:Name]]` links from `text` and records the names.
pub(crate) fn extract_categories(state: &mut State<'_>, text: &str) -> String {
    static CATEGORY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\[\[\s*Category\s*:([^\]|]*)(?:\|[^\]]*)?\]\]").unwrap()
    });

    CATEGORY
        .replace_all(text, |captures: &Captures<'_>| {
            let name = captures[1].trim();
            if name.is_empty() {
                captures[0].to_string()
            } else {
                state.categories.push(name.to_string());
                String::new()
            }
        })
        .into_owned()
}

/// Renders the table of contents for the given headings.
pub(crate) fn render_toc(
    headings: &[Heading],
    settings: &TocSettings,
    title: &str,
) -> Result<String> {
    let limit = settings.limit.unwrap_or(6);
    let mut out = String::new();
    write!(
        out,
        r#"<div class="wiki-toc"><div class="toc-header"><h2>{}</h2></div><div class="toc-content"><ul class="toc-list">"#,
        html_escape::encode_text(title)
    )?;
    for heading in headings.iter().filter(|heading| heading.level <= limit) {
        write!(
            out,
            r##"<li class="toc-level-{}"><a href="#{}">{}</a></li>"##,
            heading.level,
            html_escape::encode_double_quoted_attribute(&heading.id),
            html_escape::encode_text(&heading.text)
        )?;
    }
    out += "</ul></div></div>";
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_show() {
        let toc = TocSettings::default();
        assert!(!toc.should_show(2, 3));
        assert!(toc.should_show(3, 3));
        assert!(!toc.should_show(0, 0), "nothing to show");

        let forced = TocSettings {
            forced: true,
            ..<_>::default()
        };
        assert!(forced.should_show(1, 3));

        let disabled = TocSettings {
            enabled: false,
            forced: true,
            ..<_>::default()
        };
        assert!(!disabled.should_show(10, 3), "NOTOC wins over FORCETOC");
    }

    #[test]
    fn toc_limit() {
        let headings = [
            Heading {
                level: 2,
                text: "History & culture".into(),
                id: "history_culture".into(),
            },
            Heading {
                level: 3,
                text: "Cordoba".into(),
                id: "cordoba".into(),
            },
        ];
        let settings = TocSettings {
            limit: Some(2),
            ..<_>::default()
        };
        assert_eq!(
            render_toc(&headings, &settings, "Contents").unwrap(),
            r##"<div class="wiki-toc"><div class="toc-header"><h2>Contents</h2></div><div class="toc-content"><ul class="toc-list"><li class="toc-level-2"><a href="#history_culture">History &amp; culture</a></li></ul></div></div>"##
        );
    }
}
