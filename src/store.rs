//! Collaborator interfaces for template storage and page existence checks,
//! plus an in-memory implementation of both.
//!
//! The engine never owns persistent state. Everything it needs to know about
//! the outside world arrives through [`TemplateStore`] and [`PageOracle`],
//! which are passed in by reference for each parser.

use crate::title::slugify;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path, sync::RwLock};

/// The result type for store operations.
pub type Result<T = (), E = Error> = core::result::Result<T, E>;

/// Errors that may occur when talking to a template store or page oracle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred reading a store file.
    #[error("{1}: I/O error: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    /// A store file was not valid JSON.
    #[error("invalid template data: {0}")]
    Json(#[from] serde_json::Error),

    /// Somebody panicked while holding the store lock.
    #[error("store lock poisoned")]
    Poisoned,

    /// The store does not support creating templates.
    #[error("store is read-only")]
    ReadOnly,

    /// A backend-specific failure.
    #[error("{0}")]
    Backend(String),
}

/// The broad kind of a template. This only affects how a placeholder is
/// described to authors; the engine expands every kind the same way.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    /// A general-purpose template.
    #[default]
    Other,
    /// An article sidebar.
    Infobox,
    /// A navigation footer.
    Navbox,
    /// A message box or notice.
    Message,
    /// A page protection banner.
    Protection,
}

/// A stored template.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Template {
    /// The display name of the template, without namespace.
    pub name: String,
    /// The URL-safe key of the template. Derived from `name` if absent.
    #[serde(default)]
    pub slug: String,
    /// The namespace the template lives in.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// The raw wiki markup of the template body.
    pub content: String,
    /// The kind of template.
    #[serde(default)]
    pub template_type: TemplateType,
}

impl Template {
    /// Creates a new template in the default namespace.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            namespace: default_namespace(),
            content: content.into(),
            template_type: TemplateType::Other,
        }
    }

    /// Sets the kind of the template.
    #[must_use]
    pub fn with_type(mut self, template_type: TemplateType) -> Self {
        self.template_type = template_type;
        self
    }

    /// Creates the stub template used when an author references a template
    /// that does not exist yet.
    pub fn placeholder(name: &str) -> Self {
        Self::new(
            name,
            format!(
                r#"<div class="template-placeholder">Template "{}" has no content yet.</div>"#,
                html_escape::encode_text(name)
            ),
        )
    }
}

/// The default namespace for templates.
fn default_namespace() -> String {
    "Template".into()
}

/// A source of templates.
///
/// Implementations should match `key` against the template name, the
/// underscore-normalised name, and the slug. The engine tries each of those
/// forms in turn and stops at the first hit.
pub trait TemplateStore: Sync {
    /// Finds a template by key.
    fn lookup(&self, key: &str) -> Result<Option<Template>>;

    /// Creates and stores a stub template for `name`, or returns the existing
    /// one if it was created in the meantime.
    ///
    /// Stores are read-only unless they say otherwise.
    fn ensure_placeholder(&self, name: &str) -> Result<Template> {
        let _ = name;
        Err(Error::ReadOnly)
    }
}

/// A source of truth about which pages exist.
pub trait PageOracle: Sync {
    /// Returns true if a page with the given slug exists.
    fn exists(&self, slug: &str) -> Result<bool>;
}

/// An in-memory template store and page oracle.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Templates, keyed by name.
    templates: RwLock<IndexMap<String, Template>>,
    /// Slugs of existing pages.
    pages: RwLock<HashSet<String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads templates from a JSON array of template records.
    pub fn from_json(json: &str) -> Result<Self> {
        let templates = serde_json::from_str::<Vec<Template>>(json)?;
        let store = Self::new();
        for template in templates {
            store.insert(template)?;
        }
        Ok(store)
    }

    /// Loads templates from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json =
            std::fs::read_to_string(path).map_err(|err| Error::Io(err, path.to_path_buf()))?;
        Self::from_json(&json)
    }

    /// Adds or replaces a template.
    pub fn insert(&self, mut template: Template) -> Result {
        if template.slug.is_empty() {
            template.slug = slugify(&template.name);
        }
        self.templates
            .write()
            .map_err(|_| Error::Poisoned)?
            .insert(template.name.clone(), template);
        Ok(())
    }

    /// Marks a page as existing. The title is converted to a slug.
    pub fn add_page(&self, title: &str) -> Result {
        self.pages
            .write()
            .map_err(|_| Error::Poisoned)?
            .insert(slugify(title));
        Ok(())
    }

    /// The number of stored templates.
    pub fn len(&self) -> usize {
        self.templates.read().map_or(0, |templates| templates.len())
    }

    /// Returns true if there are no stored templates.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TemplateStore for MemoryStore {
    fn lookup(&self, key: &str) -> Result<Option<Template>> {
        let templates = self.templates.read().map_err(|_| Error::Poisoned)?;
        if let Some(template) = templates.get(key) {
            return Ok(Some(template.clone()));
        }

        Ok(templates
            .values()
            .find(|template| template.name.replace(' ', "_") == key || template.slug == key)
            .cloned())
    }

    fn ensure_placeholder(&self, name: &str) -> Result<Template> {
        let mut templates = self.templates.write().map_err(|_| Error::Poisoned)?;
        let template = templates.entry(name.to_string()).or_insert_with(|| {
            log::debug!("Creating placeholder template '{name}'");
            Template::placeholder(name)
        });
        Ok(template.clone())
    }
}

impl PageOracle for MemoryStore {
    fn exists(&self, slug: &str) -> Result<bool> {
        Ok(self
            .pages
            .read()
            .map_err(|_| Error::Poisoned)?
            .contains(slug))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_keys() {
        let store = MemoryStore::new();
        store.insert(Template::new("Cite web", "{{{1}}}")).unwrap();
        assert!(store.lookup("Cite web").unwrap().is_some(), "by name");
        assert!(store.lookup("Cite_web").unwrap().is_some(), "by underscore name");
        assert!(store.lookup("cite-web").unwrap().is_some(), "by slug");
        assert!(store.lookup("Cite").unwrap().is_none(), "no partial match");
    }

    #[test]
    fn from_json() {
        let store = MemoryStore::from_json(
            r#"[
                {"name": "Pp-move", "content": "moved", "template_type": "protection"},
                {"name": "Note", "slug": "custom-note", "namespace": "Help", "content": "x"}
            ]"#,
        )
        .unwrap();
        assert_eq!(store.len(), 2);
        let pp = store.lookup("pp-move").unwrap().unwrap();
        assert_eq!(pp.template_type, TemplateType::Protection);
        assert_eq!(pp.namespace, "Template", "namespace should default");
        let note = store.lookup("custom-note").unwrap().unwrap();
        assert_eq!(note.namespace, "Help");
    }

    #[test]
    fn placeholder() {
        let store = MemoryStore::new();
        let first = store.ensure_placeholder("Missing <thing>").unwrap();
        assert!(first.content.contains("Missing &lt;thing&gt;"));
        assert_eq!(store.len(), 1);
        let second = store.ensure_placeholder("Missing <thing>").unwrap();
        assert_eq!(first, second, "placeholder should be created once");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn pages() {
        let store = MemoryStore::new();
        store.add_page("Al-Andalus").unwrap();
        assert!(store.exists("al-andalus").unwrap());
        assert!(!store.exists("andalusia").unwrap());
    }

    #[test]
    fn read_only_default() {
        struct Empty;
        impl TemplateStore for Empty {
            fn lookup(&self, _: &str) -> Result<Option<Template>> {
                Ok(None)
            }
        }
        assert!(matches!(Empty.ensure_placeholder("x"), Err(Error::ReadOnly)));
    }
}
