//! Document rendering types and functions.
//!
//! Rendering a document is a fixed sequence of text-to-text passes over one
//! working string:
//!
//! 1. Verbatim content (`<nowiki>`, `<pre>`, fenced code) is lifted into
//!    strip markers and comments are deleted.
//! 2. Root inclusion control removes `<includeonly>` blocks and unwraps
//!    `<noinclude>` and `<onlyinclude>`.
//! 3. Behaviour switches (`__NOTOC__` and friends) are recorded and removed.
//! 4. Macros are expanded. One brace scanner handles template parameters,
//!    magic words, parser functions, module calls, and template calls. A
//!    template body gets the same treatment recursively, with its own
//!    parameters.
//! 5. References, categories, and tables are extracted. References and
//!    tables leave strip markers behind.
//! 6. Inline markup (links, emphasis, code) and block structure (headings,
//!    lists, rules, paragraphs) are converted to HTML.
//! 7. Strip markers are restored, headings are collected and given ids, and
//!    the table of contents and references section are placed.
//! 8. The result is sanitized.
//!
//! Each pass only ever sees the output of the pass before it. The only
//! re-entry is macro expansion, which runs the switch pass over template
//! output, and the inline formatter, which is called on table cells and
//! reference content.

use crate::{
    config::Options,
    context::Context,
    sanitize::sanitize,
    store::{self, PageOracle, TemplateStore},
};
use core::fmt;
pub(crate) use expand_templates::expand;
pub use extension_tags::Reference;
pub(crate) use globals::render_toc;
pub use globals::{Heading, Switches, TocPosition, TocSettings};
pub use outline::{BoldTextHeuristic, Candidate, HeadingFallback};
use regex::Regex;
use std::{
    collections::HashMap,
    rc::Rc,
    sync::LazyLock,
};
pub use stack::{ParamKey, Params};
use strip::StripMarkers;

mod expand_templates;
mod extension_tags;
mod globals;
mod inline;
mod links;
mod magic_words;
mod modules;
mod outline;
mod parser_fns;
mod stack;
mod strip;
mod tables;
mod template;
#[cfg(test)]
mod tests;

/// The sentinel left where `__TOC__` was written.
const TOC_SENTINEL: &str = "\x7fTOC\x7f";

/// The sentinel left where `<references/>` was written.
const REFERENCES_SENTINEL: &str = "\x7fREFERENCES\x7f";

/// A document rendering error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An arithmetic expression evaluation error.
    #[error("eval error: {0}")]
    Expr(#[from] crate::expr::Error),

    /// A write to a buffer failed.
    #[error("fmt error: {0}")]
    Fmt(#[from] fmt::Error),

    /// An `#invoke` call was missing the required function argument.
    #[error("script error: you must specify a function to call")]
    MissingFunctionName,

    /// A template could not be found.
    #[error("template not found: {0}")]
    NotFound(String),

    /// Too many nested template calls.
    #[error("template stack overflow: {0}")]
    RecursionLimit(String),

    /// A template store call failed.
    #[error("store error: {0}")]
    Store(#[from] store::Error),

    /// A template called back into itself.
    #[error("template loop detected: {0}")]
    TemplateLoop(String),

    /// An `#invoke` call named a module or function which does not exist.
    #[error("module not implemented: {0}")]
    UnknownModule(String),

    /// A `{{#name:…}}` call named a parser function which does not exist.
    #[error("unknown parser function: {0}")]
    UnknownParserFunction(String),
}

impl Error {
    /// Returns the text shown to readers in place of a failed macro, if this
    /// kind of error is shown to readers at all.
    pub fn marker(&self) -> Option<String> {
        let message = match self {
            Self::NotFound(name) => format!("Template not found: {name}"),
            Self::RecursionLimit(name) => format!("Template recursion limit exceeded: {name}"),
            Self::TemplateLoop(name) => format!("Template recursion detected: {name}"),
            Self::UnknownModule(name) => format!("Module not implemented: {name}"),
            Self::MissingFunctionName => "Module error: missing function name".to_string(),
            Self::UnknownParserFunction(name) => format!("Unknown parser function: {name}"),
            Self::Expr(_) | Self::Fmt(_) | Self::Store(_) => return None,
        };
        Some(format!("{{{{{}}}}}", html_escape::encode_text(&message)))
    }
}

/// The standard result type used by all fallible renderer functions.
pub type Result<T = (), E = Error> = core::result::Result<T, E>;

/// Renderer state for a single document.
pub(crate) struct State<'a> {
    /// The environment of the document.
    pub ctx: &'a Context,
    /// Runtime options.
    pub options: &'a Options,
    /// The template source.
    store: &'a dyn TemplateStore,
    /// The page existence source.
    pages: &'a dyn PageOracle,
    /// Prepared template bodies by requested name. `None` is a cached miss.
    templates: HashMap<String, Option<Rc<str>>>,
    /// Page existence answers by slug.
    page_exists: HashMap<String, bool>,
    /// Names of the templates and modules currently being expanded.
    pub stack: Vec<String>,
    /// The current expansion nesting level.
    pub nesting: usize,
    /// Stripped content substitutions.
    pub strip: StripMarkers,
    /// Collected references.
    pub references: extension_tags::References,
    /// Collected category names.
    pub categories: Vec<String>,
    /// Table of contents settings.
    pub toc: TocSettings,
    /// Other behaviour switches.
    pub switches: Switches,
    /// The last number used by an unlabelled external link.
    pub external_links: usize,
}

impl<'a> State<'a> {
    /// Creates fresh state for one document.
    pub fn new(
        ctx: &'a Context,
        options: &'a Options,
        store: &'a dyn TemplateStore,
        pages: &'a dyn PageOracle,
    ) -> Self {
        Self {
            ctx,
            options,
            store,
            pages,
            templates: HashMap::new(),
            page_exists: HashMap::new(),
            stack: Vec::new(),
            nesting: 0,
            strip: StripMarkers::default(),
            references: <_>::default(),
            categories: Vec::new(),
            toc: TocSettings::default(),
            switches: Switches::default(),
            external_links: 0,
        }
    }

    /// Returns true if the page with the given slug exists. Oracle failures
    /// are logged and treated as a missing page.
    pub fn page_exists(&mut self, slug: &str) -> bool {
        if let Some(exists) = self.page_exists.get(slug) {
            return *exists;
        }

        let exists = self.pages.exists(slug).unwrap_or_else(|err| {
            log::warn!("page existence check failed for '{slug}': {err}");
            false
        });
        self.page_exists.insert(slug.to_string(), exists);
        exists
    }
}

/// Renders a document to HTML. The collected headings are returned; all
/// other collected data is left in `state`.
pub(crate) fn render(
    state: &mut State<'_>,
    source: &str,
    fallback: &dyn HeadingFallback,
) -> Result<(String, Vec<Heading>)> {
    let text = state.strip.lift_verbatim(source);
    let text = root_inclusion(&text);
    let text = magic_words::apply_switches(state, &text);
    let text = expand(state, &text, &Params::new())?;
    log::trace!("expanded:\n{text}");
    let text = extension_tags::extract_references(state, &text);
    let text = globals::extract_categories(state, &text);
    let text = tables::render_tables(state, &text)?;
    let body = inline::render_blocks(state, &text);
    let body = state.strip.restore(&body);

    let (body, headings) = outline::build(&text, &body, &state.strip, fallback);

    let body = place_toc(state, &body, &headings)?;
    let body = place_references(state, &body)?;
    Ok((sanitize(&body, state.ctx.server_host()), headings))
}

/// Applies inclusion control to the root document, which is never being
/// transcluded.
fn root_inclusion(text: &str) -> String {
    static INCLUDE_ONLY: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<includeonly\s*>.*?(?:</includeonly\s*>|$)").unwrap());
    static TAGS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)</?(?:noinclude|onlyinclude)\s*/?>").unwrap());

    let text = INCLUDE_ONLY.replace_all(text, "");
    TAGS.replace_all(&text, "").into_owned()
}

/// Puts the table of contents in place, if it should be shown, and removes
/// any leftover `__TOC__` sentinels.
fn place_toc(state: &State<'_>, body: &str, headings: &[Heading]) -> Result<String> {
    let toc = if state.toc.should_show(headings.len(), state.options.toc_min_headings) {
        globals::render_toc(headings, &state.toc, &state.options.toc_heading)?
    } else {
        String::new()
    };

    if toc.is_empty() {
        return Ok(body.replace(TOC_SENTINEL, ""));
    }

    if state.toc.position == TocPosition::Manual && body.contains(TOC_SENTINEL) {
        return Ok(body.replacen(TOC_SENTINEL, &toc, 1).replace(TOC_SENTINEL, ""));
    }

    let body = body.replace(TOC_SENTINEL, "");
    Ok(if let Some(at) = first_heading(&body) {
        format!("{}{toc}{}", &body[..at], &body[at..])
    } else {
        format!("{toc}{body}")
    })
}

/// Finds the byte offset of the first heading tag.
fn first_heading(body: &str) -> Option<usize> {
    static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<h[1-6][\s>]").unwrap());
    HEADING.find(body).map(|m| m.start())
}

/// Puts the references section at the first `<references/>` position, or at
/// the end of the body.
fn place_references(state: &mut State<'_>, body: &str) -> Result<String> {
    let section = extension_tags::render_references(state)?;
    let section = state.strip.restore(&section);
    Ok(if body.contains(REFERENCES_SENTINEL) {
        body.replacen(REFERENCES_SENTINEL, &section, 1)
            .replace(REFERENCES_SENTINEL, "")
    } else if section.is_empty() {
        body.to_string()
    } else {
        format!("{body}\n{section}")
    })
}
