//! PHP language provider.
//!
//! Visibility comes from the declaration's modifier list: `private` and
//! `protected` members are not exported, everything else is. Multi-property
//! declarations (`private $a, $b;`) expand into one match per property.

use tree_sitter::{Node, Parser, Tree};

use crate::lang::{ANONYMOUS, LanguageProvider, name_field, node_text};
use crate::query::{AgentQuery, QueryMatch};

pub struct PhpProvider;

impl LanguageProvider for PhpProvider {
    fn id(&self) -> &'static str {
        "php"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["php", "phtml"]
    }

    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_php::LANGUAGE_PHP.into()
    }

    fn map_kind(&self, kind: &str) -> Vec<String> {
        let types: &[&str] = match kind {
            "function" => &["function_definition"],
            "method" => &["method_declaration"],
            "class" => &["class_declaration"],
            "interface" => &["interface_declaration"],
            "trait" => &["trait_declaration"],
            "enum" => &["enum_declaration"],
            "constant" => &["const_declaration"],
            "field" => &["property_declaration"],
            "namespace" => &["namespace_definition"],
            other => return vec![other.to_string()],
        };
        types.iter().map(|t| t.to_string()).collect()
    }

    fn extract_name(&self, node: Node<'_>, source: &str) -> String {
        let name = match node.kind() {
            "const_declaration" => const_names(node)
                .first()
                .map(|n| node_text(*n, source).to_string()),
            "property_declaration" => property_names(node)
                .first()
                .map(|n| node_text(*n, source).trim_start_matches('$').to_string()),
            _ => name_field(node, source),
        };
        name.filter(|n| !n.is_empty())
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }

    fn is_exported(&self, name: &str) -> bool {
        !name.starts_with('_')
    }

    fn is_exported_node(&self, node: Node<'_>, source: &str) -> bool {
        match node.kind() {
            "method_declaration" | "property_declaration" | "const_declaration" => {
                !matches!(visibility(node, source).as_str(), "private" | "protected")
            }
            "variable_name" => node
                .parent()
                .and_then(|p| p.parent())
                .map(|decl| self.is_exported_node(decl, source))
                .unwrap_or(true),
            _ => self.is_exported(&self.extract_name(node, source)),
        }
    }

    fn expand_matches(
        &self,
        node: Node<'_>,
        source: &str,
        query: &AgentQuery,
    ) -> Option<Vec<QueryMatch>> {
        let (bindings, strip_dollar) = match node.kind() {
            "property_declaration" => (property_names(node), true),
            "const_declaration" => (const_names(node), false),
            _ => return None,
        };
        if bindings.len() < 2 {
            return None;
        }
        let exported = self.is_exported_node(node, source);
        Some(
            bindings
                .into_iter()
                .map(|binding| {
                    let raw = node_text(binding, source);
                    let name = if strip_dollar {
                        raw.trim_start_matches('$').to_string()
                    } else {
                        raw.to_string()
                    };
                    QueryMatch::from_node(&query.kind, name, binding, source, exported)
                })
                .collect(),
        )
    }

    fn append_anchor(&self, tree: &Tree, _source: &str, content: &str) -> Option<usize> {
        let mut parser = Parser::new();
        parser.set_language(&self.grammar()).ok()?;
        // Bare snippets lack the opening tag and would parse as HTML text.
        let wrapped = format!("<?php\n{content}");
        let content_tree = parser.parse(&wrapped, None)?;
        let root = content_tree.root_node();
        let mut cursor = root.walk();
        let decl = root
            .named_children(&mut cursor)
            .find(|n| n.kind() != "php_tag")?;

        if !matches!(
            decl.kind(),
            "function_definition"
                | "class_declaration"
                | "interface_declaration"
                | "trait_declaration"
        ) {
            return None;
        }
        let target_root = tree.root_node();
        let mut target_cursor = target_root.walk();
        target_root
            .named_children(&mut target_cursor)
            .filter(|n| n.kind() == decl.kind())
            .last()
            .map(|n| n.end_byte())
    }

    fn attribute(&self, node: Node<'_>, source: &str, key: &str) -> Option<String> {
        match key {
            "visibility" => Some(visibility(node, source)),
            "type" => node
                .child_by_field_name("type")
                .map(|t| node_text(t, source).to_string()),
            _ => None,
        }
    }
}

/// Modifier text of a class member; PHP defaults to public.
fn visibility(node: Node<'_>, source: &str) -> String {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "visibility_modifier" {
            return node_text(child, source).to_string();
        }
    }
    "public".to_string()
}

fn const_names(node: Node<'_>) -> Vec<Node<'_>> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for element in node.named_children(&mut cursor) {
        if element.kind() != "const_element" {
            continue;
        }
        let mut inner = element.walk();
        if let Some(name) = element
            .named_children(&mut inner)
            .find(|n| n.kind() == "name")
        {
            names.push(name);
        }
    }
    names
}

fn property_names(node: Node<'_>) -> Vec<Node<'_>> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for element in node.named_children(&mut cursor) {
        if element.kind() != "property_element" {
            continue;
        }
        let mut inner = element.walk();
        if let Some(var) = element
            .named_children(&mut inner)
            .find(|n| n.kind() == "variable_name")
        {
            names.push(var);
        }
    }
    names
}
