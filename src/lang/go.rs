//! Go language provider.
//!
//! Visibility follows the Go rule: identifiers starting with an upper-case
//! letter are exported. Multi-name specs (`var a, b int`) expand into one
//! match per binding.

use tree_sitter::{Node, Parser, Tree};

use crate::lang::{ANONYMOUS, LanguageProvider, name_field, node_text};
use crate::query::{AgentQuery, QueryMatch};

pub struct GoProvider;

impl LanguageProvider for GoProvider {
    fn id(&self) -> &'static str {
        "go"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["golang"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_go::LANGUAGE.into()
    }

    fn map_kind(&self, kind: &str) -> Vec<String> {
        let types: &[&str] = match kind {
            "function" => &["function_declaration"],
            "method" => &["method_declaration"],
            "struct" | "interface" | "type" => &["type_declaration"],
            "variable" => &["var_declaration", "short_var_declaration"],
            "constant" => &["const_declaration"],
            "field" => &["field_declaration"],
            "import" => &["import_declaration"],
            "parameter" => &["parameter_declaration"],
            other => return vec![other.to_string()],
        };
        types.iter().map(|t| t.to_string()).collect()
    }

    fn confirm_match(&self, node: Node<'_>, kind: &str, _source: &str) -> bool {
        match kind {
            "struct" => spec_type_kind(node) == Some("struct_type"),
            "interface" => spec_type_kind(node) == Some("interface_type"),
            _ => true,
        }
    }

    fn extract_name(&self, node: Node<'_>, source: &str) -> String {
        let name = match node.kind() {
            "type_declaration" => first_named(node).and_then(|spec| name_field(spec, source)),
            "var_declaration" | "const_declaration" => {
                first_named(node).and_then(|spec| first_field_name(spec, source))
            }
            "short_var_declaration" => node
                .child_by_field_name("left")
                .and_then(|left| left.named_child(0))
                .map(|id| node_text(id, source).to_string()),
            "import_declaration" => first_import_path(node, source),
            "field_declaration" => first_field_name(node, source),
            _ => name_field(node, source),
        };
        name.unwrap_or_else(|| ANONYMOUS.to_string())
    }

    fn is_exported(&self, name: &str) -> bool {
        name.chars().next().is_some_and(|c| c.is_uppercase())
    }

    fn expand_matches(
        &self,
        node: Node<'_>,
        source: &str,
        query: &AgentQuery,
    ) -> Option<Vec<QueryMatch>> {
        let bindings: Vec<Node<'_>> = match node.kind() {
            "var_declaration" | "const_declaration" => {
                let mut names = Vec::new();
                let mut cursor = node.walk();
                for spec in node.named_children(&mut cursor) {
                    collect_field_names(spec, &mut names);
                }
                names
            }
            "field_declaration" => {
                let mut names = Vec::new();
                collect_field_names(node, &mut names);
                names
            }
            _ => return None,
        };
        if bindings.len() < 2 {
            return None;
        }
        Some(
            bindings
                .into_iter()
                .map(|id| {
                    let name = node_text(id, source).to_string();
                    let exported = self.is_exported(&name);
                    QueryMatch::from_node(&query.kind, name, id, source, exported)
                })
                .collect(),
        )
    }

    fn append_anchor(&self, tree: &Tree, source: &str, content: &str) -> Option<usize> {
        let mut parser = Parser::new();
        parser.set_language(&self.grammar()).ok()?;
        let content_tree = parser.parse(content, None)?;
        let decl = first_named(content_tree.root_node())?;

        match decl.kind() {
            "function_declaration" | "type_declaration" => {
                last_top_level(tree, decl.kind()).map(|n| n.end_byte())
            }
            "method_declaration" => {
                let wanted = receiver_type(decl, content)?;
                let mut cursor = tree.root_node().walk();
                tree.root_node()
                    .named_children(&mut cursor)
                    .filter(|n| n.kind() == "method_declaration")
                    .filter(|n| receiver_type(*n, source).as_deref() == Some(wanted.as_str()))
                    .last()
                    .map(|n| n.end_byte())
            }
            _ => None,
        }
    }

    fn attribute(&self, node: Node<'_>, source: &str, key: &str) -> Option<String> {
        match key {
            "type" => {
                let holder = match node.kind() {
                    "var_declaration" | "const_declaration" | "type_declaration" => {
                        first_named(node)?
                    }
                    _ => node,
                };
                holder
                    .child_by_field_name("type")
                    .map(|t| node_text(t, source).to_string())
            }
            "receiver" => receiver_type(node, source),
            _ => None,
        }
    }
}

fn first_named(node: Node<'_>) -> Option<Node<'_>> {
    node.named_child(0)
}

/// Kind of the `type` child of the first spec under a `type_declaration`.
fn spec_type_kind(node: Node<'_>) -> Option<&'static str> {
    let spec = first_named(node)?;
    let ty = spec.child_by_field_name("type")?;
    match ty.kind() {
        "struct_type" => Some("struct_type"),
        "interface_type" => Some("interface_type"),
        _ => None,
    }
}

fn first_field_name(node: Node<'_>, source: &str) -> Option<String> {
    let mut names = Vec::new();
    collect_field_names(node, &mut names);
    names.first().map(|n| node_text(*n, source).to_string())
}

fn collect_field_names<'a>(node: Node<'a>, out: &mut Vec<Node<'a>>) {
    let mut cursor = node.walk();
    out.extend(node.children_by_field_name("name", &mut cursor));
}

fn first_import_path(node: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let spec = if child.kind() == "import_spec_list" {
            child.named_child(0)?
        } else {
            child
        };
        if spec.kind() == "import_spec" {
            let path = spec.child_by_field_name("path")?;
            return Some(node_text(path, source).trim_matches('"').to_string());
        }
    }
    None
}

/// Receiver base type of a method declaration, pointer stripped.
fn receiver_type(node: Node<'_>, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let param = receiver.named_child(0)?;
    let ty = param.child_by_field_name("type")?;
    Some(node_text(ty, source).trim_start_matches('*').to_string())
}

fn last_top_level<'a>(tree: &'a Tree, kind: &str) -> Option<Node<'a>> {
    let root = tree.root_node();
    let mut cursor = root.walk();
    root.named_children(&mut cursor)
        .filter(|n| n.kind() == kind)
        .last()
}
