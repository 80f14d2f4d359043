//! A wiki markup transformation engine.
//!
//! [`Parser`] turns MediaWiki-flavoured markup into sanitized HTML. On the
//! way it expands templates, parser functions, and magic words, and collects
//! the headings, references, categories, and table of contents settings of
//! the document.
//!
//! The engine owns no persistent state. Templates come from a
//! [`TemplateStore`] and page existence answers come from a [`PageOracle`];
//! [`MemoryStore`] implements both.
//!
//! ```
//! use wiki_render::{Context, MemoryStore, Parser, Template};
//!
//! let store = MemoryStore::new();
//! store.insert(Template::new("Greeting", "{{{greeting|Hello}}}, {{{name}}}!")).unwrap();
//! let mut parser = Parser::new(&store, &store, Context::new("Sandbox"));
//! let html = parser.parse("{{Greeting|name=Amir}} [[Category:Tests]]");
//! assert_eq!(html, "<p>Hello, Amir!</p>");
//! assert_eq!(parser.categories(), ["Tests"]);
//! ```

pub mod common;
pub mod config;
pub mod context;
pub mod expr;
mod renderer;
pub mod sanitize;
pub mod store;
pub mod title;

pub use config::Options;
pub use context::{Context, Statistics};
pub use renderer::{
    BoldTextHeuristic, Candidate, Heading, HeadingFallback, ParamKey, Params, Reference, Switches,
    TocPosition, TocSettings,
};
pub use sanitize::sanitize;
use serde::Serialize;
pub use store::{MemoryStore, PageOracle, Template, TemplateStore, TemplateType};
pub use title::slugify;

/// The result of parsing one document.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Document {
    /// The sanitized HTML body.
    pub html: String,
    /// Category names, in the order they were found. Duplicates are kept.
    pub categories: Vec<String>,
    /// Document headings with their anchor ids.
    pub headings: Vec<Heading>,
    /// Citations, ordered by number.
    pub references: Vec<Reference>,
    /// Table of contents settings.
    pub toc: TocSettings,
    /// Other behaviour switches.
    pub switches: Switches,
}

/// A wiki markup parser bound to a template store, a page oracle, and the
/// context of the page being rendered.
pub struct Parser<'a> {
    /// The template source.
    store: &'a dyn TemplateStore,
    /// The page existence source.
    pages: &'a dyn PageOracle,
    /// The environment of the page.
    ctx: Context,
    /// Runtime options.
    options: Options,
    /// The heading strategy for documents with no heading markup.
    fallback: Box<dyn HeadingFallback>,
    /// The result of the last call to [`Parser::parse`].
    last: Document,
}

impl<'a> Parser<'a> {
    /// Creates a new parser with default options.
    pub fn new(store: &'a dyn TemplateStore, pages: &'a dyn PageOracle, ctx: Context) -> Self {
        Self {
            store,
            pages,
            ctx,
            options: Options::default(),
            fallback: Box::new(BoldTextHeuristic),
            last: Document::default(),
        }
    }

    /// Replaces the runtime options.
    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Replaces the heading fallback strategy.
    #[must_use]
    pub fn with_heading_fallback(mut self, fallback: Box<dyn HeadingFallback>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Parses a document to HTML. The collected document data is kept for the
    /// accessor methods until the next call.
    pub fn parse(&mut self, source: &str) -> String {
        self.last = self.parse_document(source);
        self.last.html.clone()
    }

    /// Parses a document, returning the HTML along with all collected data.
    ///
    /// This never fails. If rendering goes wrong in a way that cannot be
    /// reported inline, the error is logged and the source is returned as
    /// escaped text.
    pub fn parse_document(&self, source: &str) -> Document {
        let host = self.ctx.server_host();
        let mut state = renderer::State::new(&self.ctx, &self.options, self.store, self.pages);
        match renderer::render(&mut state, source, self.fallback.as_ref()) {
            Ok((html, headings)) => {
                let references = state.references.finish(&state.strip, host);
                Document {
                    html,
                    categories: state.categories,
                    headings,
                    references,
                    toc: state.toc,
                    switches: state.switches,
                }
            }
            Err(err) => {
                log::error!("failed to render '{}': {err}", self.ctx.title().full_text());
                Document {
                    html: sanitize(&html_escape::encode_text(source), host),
                    ..<_>::default()
                }
            }
        }
    }

    /// Expands macros in `text` using the given parameters, without any
    /// other processing.
    pub fn expand(&self, text: &str, params: &Params) -> String {
        let mut state = renderer::State::new(&self.ctx, &self.options, self.store, self.pages);
        match renderer::expand(&mut state, text, params) {
            Ok(expanded) => state.strip.restore(&expanded),
            Err(err) => {
                log::error!("failed to expand text: {err}");
                text.to_string()
            }
        }
    }

    /// The categories of the last parsed document.
    pub fn categories(&self) -> &[String] {
        &self.last.categories
    }

    /// The headings of the last parsed document.
    pub fn headings(&self) -> &[Heading] {
        &self.last.headings
    }

    /// The references of the last parsed document.
    pub fn references(&self) -> &[Reference] {
        &self.last.references
    }

    /// The table of contents settings of the last parsed document.
    pub fn toc(&self) -> &TocSettings {
        &self.last.toc
    }

    /// The behaviour switches of the last parsed document.
    pub fn switches(&self) -> &Switches {
        &self.last.switches
    }

    /// Renders the table of contents of the last parsed document, whether or
    /// not it was placed in the body. Returns an empty string if the table of
    /// contents is disabled or there are no headings.
    pub fn table_of_contents(&self) -> String {
        if !self.last.toc.enabled || self.last.headings.is_empty() {
            return String::new();
        }
        renderer::render_toc(&self.last.headings, &self.last.toc, &self.options.toc_heading)
            .unwrap_or_else(|err| {
                log::error!("failed to render table of contents: {err}");
                String::new()
            })
    }
}
