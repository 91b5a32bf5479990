//! Language providers.
//!
//! A provider translates between the neutral query vocabulary and one
//! language's concrete syntax tree: which node types a kind maps to, how to
//! extract a declaration's name, what counts as exported, how nodes with
//! multiple logical bindings expand, and where appended declarations land.
//!
//! Providers are registered in a [`ProviderRegistry`] keyed by canonical
//! language id, alias, and file extension. Registration is all-or-nothing:
//! any name or extension collision rejects the whole provider.

mod go;
mod javascript;
mod php;
mod typescript;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tree_sitter::{Language, Node, Tree};

use crate::error::{Error, Result};
use crate::query::{AgentQuery, QueryMatch};

pub use go::GoProvider;
pub use javascript::JavaScriptProvider;
pub use php::PhpProvider;
pub use typescript::TypeScriptProvider;

/// Per-language bundle of grammar binding, kind mapping, name extraction,
/// visibility rules, and match expansion.
pub trait LanguageProvider: Send + Sync {
    /// Canonical language id (`"go"`, `"typescript"`, ...).
    fn id(&self) -> &'static str;

    fn aliases(&self) -> &'static [&'static str];

    /// File extensions without the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    fn grammar(&self) -> Language;

    /// Concrete node types a canonical kind maps to. A kind the provider
    /// does not recognise comes back as a single literal node type, so
    /// callers can query raw grammar names as a best-effort pass-through.
    fn map_kind(&self, kind: &str) -> Vec<String>;

    /// Declaration name, or `"anonymous"` when the node has none.
    fn extract_name(&self, node: Node<'_>, source: &str) -> String;

    /// Secondary filter for kinds that share a node type (Go structs and
    /// interfaces both live under `type_declaration`).
    fn confirm_match(&self, _node: Node<'_>, _kind: &str, _source: &str) -> bool {
        true
    }

    /// Name-based visibility check.
    fn is_exported(&self, name: &str) -> bool;

    /// Node-based visibility check, for languages where visibility lives in
    /// modifiers rather than the name itself.
    fn is_exported_node(&self, node: Node<'_>, source: &str) -> bool {
        self.is_exported(&self.extract_name(node, source))
    }

    /// Expand a node carrying multiple logical bindings (destructuring
    /// patterns, multi-name specs) into one match per binding. `None` means
    /// the node is a single binding and the default path applies.
    fn expand_matches(
        &self,
        _node: Node<'_>,
        _source: &str,
        _query: &AgentQuery,
    ) -> Option<Vec<QueryMatch>> {
        None
    }

    /// Insertion point for appending `content` when it parses as a
    /// declaration: after the last sibling of the same kind (methods: same
    /// receiver). `None` falls back to end-of-file.
    fn append_anchor(&self, _tree: &Tree, _source: &str, _content: &str) -> Option<usize> {
        None
    }

    /// Extract a named attribute (`type`, `receiver`, `visibility`, ...)
    /// from a matched node for attribute-constrained queries.
    fn attribute(&self, _node: Node<'_>, _source: &str, _key: &str) -> Option<String> {
        None
    }
}

/// Raw text of a node. An invalid UTF-8 slice yields the empty string; all
/// morfx sources are read as UTF-8 so this only happens on truncated input.
pub(crate) fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Text of the node's `name` field, the common case for name extraction.
pub(crate) fn name_field(node: Node<'_>, source: &str) -> Option<String> {
    node.child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) const ANONYMOUS: &str = "anonymous";

/// Thread-safe provider registry keyed by id, alias, and extension.
pub struct ProviderRegistry {
    by_id: RwLock<HashMap<String, Arc<dyn LanguageProvider>>>,
    aliases: RwLock<HashMap<String, String>>,
    extensions: RwLock<HashMap<String, String>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            by_id: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            extensions: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the four built-in providers.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry
            .register(Arc::new(GoProvider))
            .expect("builtin go provider");
        registry
            .register(Arc::new(JavaScriptProvider))
            .expect("builtin javascript provider");
        registry
            .register(Arc::new(TypeScriptProvider))
            .expect("builtin typescript provider");
        registry
            .register(Arc::new(PhpProvider))
            .expect("builtin php provider");
        registry
    }

    /// Register a provider. Fails without side effects on any id, alias,
    /// or extension collision.
    pub fn register(&self, provider: Arc<dyn LanguageProvider>) -> Result<()> {
        let mut by_id = self.by_id.write();
        let mut aliases = self.aliases.write();
        let mut extensions = self.extensions.write();

        let id = provider.id().to_string();
        if by_id.contains_key(&id) || aliases.contains_key(&id) {
            return Err(Error::QueryResolution(format!(
                "language '{id}' is already registered"
            )));
        }
        for alias in provider.aliases() {
            if by_id.contains_key(*alias) || aliases.contains_key(*alias) {
                return Err(Error::QueryResolution(format!(
                    "language alias '{alias}' is already registered"
                )));
            }
        }
        for ext in provider.extensions() {
            if extensions.contains_key(*ext) {
                return Err(Error::QueryResolution(format!(
                    "file extension '.{ext}' is already registered"
                )));
            }
        }

        for alias in provider.aliases() {
            aliases.insert(alias.to_string(), id.clone());
        }
        for ext in provider.extensions() {
            extensions.insert(ext.to_string(), id.clone());
        }
        by_id.insert(id, provider);
        Ok(())
    }

    /// Resolve by canonical id or alias.
    pub fn get(&self, name: &str) -> Option<Arc<dyn LanguageProvider>> {
        let name = name.to_ascii_lowercase();
        let by_id = self.by_id.read();
        if let Some(provider) = by_id.get(&name) {
            return Some(provider.clone());
        }
        let id = self.aliases.read().get(&name)?.clone();
        by_id.get(&id).cloned()
    }

    /// Resolve by file extension.
    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn LanguageProvider>> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let id = self.extensions.read().get(&ext)?.clone();
        self.by_id.read().get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.by_id.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup_by_id_alias_and_extension() {
        let registry = ProviderRegistry::with_builtins();
        assert!(registry.get("go").is_some());
        assert!(registry.get("golang").is_some());
        assert!(registry.get("ts").is_some());
        assert!(registry.get("cobol").is_none());

        let go = registry.for_path(Path::new("main.go")).unwrap();
        assert_eq!(go.id(), "go");
        let php = registry.for_path(Path::new("src/User.php")).unwrap();
        assert_eq!(php.id(), "php");
        assert!(registry.for_path(Path::new("README.md")).is_none());
    }

    #[test]
    fn test_register_rejects_collisions() {
        let registry = ProviderRegistry::with_builtins();
        let err = registry.register(Arc::new(GoProvider)).unwrap_err();
        assert!(err.to_string().contains("already registered"));
        // The registry is unchanged.
        assert_eq!(registry.ids().len(), 4);
    }

    #[test]
    fn test_ids_sorted() {
        let registry = ProviderRegistry::with_builtins();
        assert_eq!(registry.ids(), vec!["go", "javascript", "php", "typescript"]);
    }
}
