//! Engine configuration.
//!
//! Static lookup tables live here alongside the runtime [`Options`], which
//! can be loaded from JSON.

use serde::{Deserialize, Serialize};

/// Runtime options for a [`Parser`](crate::Parser).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Options {
    /// Maximum nesting depth of template and module calls.
    pub max_depth: usize,
    /// Whether a missing template should be replaced by a stub created via
    /// [`TemplateStore::ensure_placeholder`](crate::store::TemplateStore::ensure_placeholder).
    pub auto_create_templates: bool,
    /// Minimum number of headings before an automatic TOC is shown.
    pub toc_min_headings: usize,
    /// Title of the generated references section.
    pub references_heading: String,
    /// Title of the generated table of contents.
    pub toc_heading: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_depth: 10,
            auto_create_templates: false,
            toc_min_headings: 3,
            references_heading: "References".into(),
            toc_heading: "Contents".into(),
        }
    }
}

impl Options {
    /// Loads options from a JSON file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Double-underscore behaviour switches which are recognised and removed from
/// the output. The ones with document-level effects are handled by name in
/// the magic word resolver.
pub(crate) static BEHAVIOR_SWITCHES: phf::Set<&'static str> = phf::phf_set! {
    "NOTOC", "FORCETOC", "TOC", "NOTITLE", "NOCAT", "NOEDITSECTION",
    "NEWSECTIONLINK", "NONEWSECTIONLINK", "NOGALLERY", "HIDDENCAT",
    "EXPECTUNUSEDCATEGORY", "NOCONTENTCONVERT", "NOCC", "NOTITLECONVERT",
    "NOTC", "INDEX", "NOINDEX", "STATICREDIRECT", "DISAMBIG", "NOGLOBAL",
    "EXPECTUNUSEDTEMPLATE", "ARCHIVEDTALK", "NOTALK",
};

/// Parser functions that are called without a leading `#`.
pub(crate) static FUNCTION_HOOKS: phf::Set<&'static str> = phf::phf_set! {
    "lc", "uc", "lcfirst", "ucfirst", "urlencode", "anchorencode",
};

/// Tags removed from output along with their content.
pub(crate) static DANGEROUS_TAGS: phf::Set<&'static str> = phf::phf_set! {
    "script", "style", "iframe", "object", "embed", "form", "textarea",
    "select", "button", "link", "meta", "base",
};

/// Event handler attributes stripped from every tag.
pub(crate) static EVENT_ATTRIBUTES: phf::Set<&'static str> = phf::phf_set! {
    "onload", "onerror", "onclick", "onmouseover", "onfocus", "onblur",
    "onchange", "onsubmit", "onreset", "onselect", "onkeydown", "onkeyup",
    "onkeypress", "onmousedown", "onmouseup", "onmousemove", "onmouseout",
    "onabort", "onbeforeunload", "onhashchange", "onpageshow", "onpagehide",
    "onresize", "onscroll", "onunload",
};

/// URL schemes permitted in links.
pub(crate) static LINK_SCHEMES: phf::Set<&'static str> = phf::phf_set! {
    "http", "https", "mailto",
};

/// File extensions permitted for external images.
pub(crate) static IMAGE_EXTENSIONS: phf::Set<&'static str> = phf::phf_set! {
    "jpg", "jpeg", "png", "gif", "webp", "svg",
};

/// Known non-Latin terms and their transliterations, used when generating
/// heading anchors.
pub(crate) static TRANSLITERATIONS: &[(&str, &str)] = &[
    ("إسلام", "islam"),
    ("الله", "allah"),
    ("القرآن", "quran"),
    ("محمد", "muhammad"),
    ("صلاة", "salah"),
    ("زكاة", "zakat"),
    ("صوم", "sawm"),
    ("حج", "hajj"),
    ("توحيد", "tawhid"),
    ("ملائكة", "malaika"),
    ("أنبياء", "anbiya"),
    ("قيامة", "qiyama"),
];

/// The version reported by `{{CURRENTVERSION}}`.
pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");
