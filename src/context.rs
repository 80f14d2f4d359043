//! The immutable environment a document is rendered in.

use crate::title::Title;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Site-wide counters exposed through the `NUMBEROF*` magic words.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Statistics {
    /// Number of content pages.
    pub articles: u64,
    /// Number of uploaded files.
    pub files: u64,
    /// Number of edits.
    pub edits: u64,
    /// Number of page views.
    pub views: u64,
    /// Number of registered users.
    pub users: u64,
    /// Number of administrators.
    pub admins: u64,
    /// Number of pages of any kind.
    pub pages: u64,
}

/// Everything about the outside world that magic words and the sanitizer
/// need to know.
#[derive(Clone, Debug)]
pub struct Context {
    /// The page being rendered.
    pub(crate) title: Title,
    /// The name of the wiki.
    pub(crate) site_name: String,
    /// The host name of the current request.
    pub(crate) server_host: String,
    /// The URL scheme the site is served from.
    pub(crate) server_scheme: String,
    /// The current time.
    pub(crate) now: OffsetDateTime,
    /// The name of the current user, if any.
    pub(crate) user: Option<String>,
    /// The content language code.
    pub(crate) language: String,
    /// The revision ID of the page being rendered.
    pub(crate) revision_id: u64,
    /// The time the current revision was saved.
    pub(crate) revision_time: Option<OffsetDateTime>,
    /// Site-wide counters.
    pub(crate) statistics: Statistics,
    /// The path prefix for wiki article links.
    pub(crate) wiki_base: String,
}

impl Context {
    /// Creates a context for the given page name, with the current time and
    /// defaults for everything else.
    pub fn new(page_name: &str) -> Self {
        Self {
            title: Title::new(page_name),
            site_name: "Wiki".into(),
            server_host: "localhost".into(),
            server_scheme: "https".into(),
            now: OffsetDateTime::now_utc(),
            user: None,
            language: "en".into(),
            revision_id: 1,
            revision_time: None,
            statistics: Statistics::default(),
            wiki_base: "/wiki/".into(),
        }
    }

    /// Sets the name of the wiki.
    #[must_use]
    pub fn with_site_name(mut self, site_name: impl Into<String>) -> Self {
        self.site_name = site_name.into();
        self
    }

    /// Sets the host of the current request. Links to any other host are
    /// considered external.
    #[must_use]
    pub fn with_server_host(mut self, host: impl Into<String>) -> Self {
        self.server_host = host.into();
        self
    }

    /// Sets the current time.
    #[must_use]
    pub fn with_now(mut self, now: OffsetDateTime) -> Self {
        self.now = now;
        self
    }

    /// Sets the current user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the content language code.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Sets the current revision.
    #[must_use]
    pub fn with_revision(mut self, id: u64, saved: OffsetDateTime) -> Self {
        self.revision_id = id;
        self.revision_time = Some(saved);
        self
    }

    /// Sets the site-wide counters.
    #[must_use]
    pub fn with_statistics(mut self, statistics: Statistics) -> Self {
        self.statistics = statistics;
        self
    }

    /// Sets the path prefix for wiki links. A trailing `/` is added if
    /// missing.
    #[must_use]
    pub fn with_wiki_base(mut self, base: impl Into<String>) -> Self {
        let mut base = base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        self.wiki_base = base;
        self
    }

    /// The page being rendered.
    pub fn title(&self) -> &Title {
        &self.title
    }

    /// The host name of the current request.
    pub fn server_host(&self) -> &str {
        &self.server_host
    }

    /// The time the current revision was saved, or now.
    pub(crate) fn revision_time(&self) -> OffsetDateTime {
        self.revision_time.unwrap_or(self.now)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new("Main Page")
    }
}
