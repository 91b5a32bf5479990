//! JavaScript language provider.
//!
//! Destructuring patterns (`const { a, b } = obj`) and multi-declarator
//! statements expand into one match per binding. A declaration counts as
//! exported when an `export_statement` encloses it.

use tree_sitter::{Node, Parser, Tree};

use crate::lang::{ANONYMOUS, LanguageProvider, name_field, node_text};
use crate::query::{AgentQuery, QueryMatch};

pub struct JavaScriptProvider;

impl LanguageProvider for JavaScriptProvider {
    fn id(&self) -> &'static str {
        "javascript"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["js", "ecmascript"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["js", "jsx", "mjs", "cjs"]
    }

    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_javascript::LANGUAGE.into()
    }

    fn map_kind(&self, kind: &str) -> Vec<String> {
        map_script_kind(kind)
    }

    fn confirm_match(&self, node: Node<'_>, kind: &str, source: &str) -> bool {
        confirm_script_match(node, kind, source)
    }

    fn extract_name(&self, node: Node<'_>, source: &str) -> String {
        extract_script_name(self, node, source)
    }

    fn is_exported(&self, name: &str) -> bool {
        name.chars().next().is_some_and(|c| c.is_uppercase())
    }

    fn is_exported_node(&self, node: Node<'_>, source: &str) -> bool {
        has_export_ancestor(node) || self.is_exported(&self.extract_name(node, source))
    }

    fn expand_matches(
        &self,
        node: Node<'_>,
        source: &str,
        query: &AgentQuery,
    ) -> Option<Vec<QueryMatch>> {
        expand_declarators(self, node, source, query)
    }

    fn append_anchor(&self, tree: &Tree, source: &str, content: &str) -> Option<usize> {
        script_append_anchor(&self.grammar(), tree, source, content)
    }
}

pub(super) fn map_script_kind(kind: &str) -> Vec<String> {
    let types: &[&str] = match kind {
        "function" => &["function_declaration", "generator_function_declaration"],
        "method" => &["method_definition"],
        "class" => &["class_declaration"],
        "variable" => &["lexical_declaration", "variable_declaration"],
        "constant" => &["lexical_declaration"],
        "field" => &["field_definition"],
        "import" => &["import_statement"],
        "export" => &["export_statement"],
        other => return vec![other.to_string()],
    };
    types.iter().map(|t| t.to_string()).collect()
}

pub(super) fn confirm_script_match(node: Node<'_>, kind: &str, source: &str) -> bool {
    match kind {
        // `constant` only matches `const` lexical declarations, not `let`.
        "constant" => node
            .child(0)
            .map(|tok| node_text(tok, source) == "const")
            .unwrap_or(false),
        _ => true,
    }
}

pub(super) fn extract_script_name(
    provider: &dyn LanguageProvider,
    node: Node<'_>,
    source: &str,
) -> String {
    let name = match node.kind() {
        "lexical_declaration" | "variable_declaration" => node
            .named_child(0)
            .and_then(|declarator| declarator.child_by_field_name("name"))
            .map(|binding| match binding.kind() {
                "identifier" => node_text(binding, source).to_string(),
                _ => first_binding_name(binding, source)
                    .unwrap_or_else(|| ANONYMOUS.to_string()),
            }),
        "import_statement" => node
            .child_by_field_name("source")
            .map(|s| node_text(s, source).trim_matches(['"', '\'']).to_string()),
        "export_statement" => node
            .child_by_field_name("declaration")
            .map(|decl| provider.extract_name(decl, source)),
        "field_definition" | "public_field_definition" => node
            .child_by_field_name("property")
            .or_else(|| node.child_by_field_name("name"))
            .map(|n| node_text(n, source).to_string()),
        _ => name_field(node, source),
    };
    name.filter(|n| !n.is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_string())
}

pub(super) fn has_export_ancestor(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.kind() == "export_statement" {
            return true;
        }
        current = parent.parent();
    }
    false
}

/// Expand a declaration statement into one match per binding. Returns
/// `None` for a single plain-identifier declarator, which the default
/// match path handles with the full statement as content.
pub(super) fn expand_declarators(
    provider: &dyn LanguageProvider,
    node: Node<'_>,
    source: &str,
    query: &AgentQuery,
) -> Option<Vec<QueryMatch>> {
    if !matches!(node.kind(), "lexical_declaration" | "variable_declaration") {
        return None;
    }

    let mut bindings = Vec::new();
    let mut saw_pattern = false;
    let mut cursor = node.walk();
    for declarator in node.named_children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(binding) = declarator.child_by_field_name("name") else {
            continue;
        };
        if binding.kind() == "identifier" {
            bindings.push(binding);
        } else {
            saw_pattern = true;
            collect_pattern_bindings(binding, &mut bindings);
        }
    }

    if bindings.len() < 2 && !saw_pattern {
        return None;
    }
    Some(
        bindings
            .into_iter()
            .map(|id| {
                let name = node_text(id, source).to_string();
                let exported = provider.is_exported_node(id, source);
                QueryMatch::from_node(&query.kind, name, id, source, exported)
            })
            .collect(),
    )
}

fn first_binding_name(pattern: Node<'_>, source: &str) -> Option<String> {
    let mut bindings = Vec::new();
    collect_pattern_bindings(pattern, &mut bindings);
    bindings.first().map(|n| node_text(*n, source).to_string())
}

/// Collect bound identifiers inside an object/array pattern. Property keys
/// are `property_identifier` nodes and never collected.
fn collect_pattern_bindings<'a>(pattern: Node<'a>, out: &mut Vec<Node<'a>>) {
    let mut stack = vec![pattern];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "identifier" | "shorthand_property_identifier_pattern" => out.push(node),
            _ => {
                for i in (0..node.named_child_count()).rev() {
                    if let Some(child) = node.named_child(i) {
                        stack.push(child);
                    }
                }
            }
        }
    }
}

pub(super) fn script_append_anchor(
    grammar: &tree_sitter::Language,
    tree: &Tree,
    _source: &str,
    content: &str,
) -> Option<usize> {
    let mut parser = Parser::new();
    parser.set_language(grammar).ok()?;
    let content_tree = parser.parse(content, None)?;
    let decl = content_tree.root_node().named_child(0)?;

    if !matches!(
        decl.kind(),
        "function_declaration"
            | "generator_function_declaration"
            | "class_declaration"
            | "interface_declaration"
            | "type_alias_declaration"
            | "enum_declaration"
    ) {
        return None;
    }
    let root = tree.root_node();
    let mut cursor = root.walk();
    root.named_children(&mut cursor)
        .filter(|n| n.kind() == decl.kind())
        .last()
        .map(|n| n.end_byte())
}

#[cfg(test)]
mod tests {
    use crate::lang::javascript::*;

    fn parse(source: &str) -> Tree {
        let mut parser = Parser::new();
        parser
            .set_language(&JavaScriptProvider.grammar())
            .unwrap();
        parser.parse(source, None).unwrap()
    }

    #[test]
    fn test_destructuring_expands_per_binding() {
        let source = "const { host, port } = config;\n";
        let tree = parse(source);
        let decl = tree.root_node().named_child(0).unwrap();
        assert_eq!(decl.kind(), "lexical_declaration");
        let query = AgentQuery::new("variable", "*");
        let matches = JavaScriptProvider
            .expand_matches(decl, source, &query)
            .unwrap();
        let names: Vec<_> = matches.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["host", "port"]);
    }

    #[test]
    fn test_single_identifier_does_not_expand() {
        let source = "let counter = 0;\n";
        let tree = parse(source);
        let decl = tree.root_node().named_child(0).unwrap();
        let query = AgentQuery::new("variable", "*");
        assert!(
            JavaScriptProvider
                .expand_matches(decl, source, &query)
                .is_none()
        );
    }

    #[test]
    fn test_const_confirms_constant_kind() {
        let source = "const A = 1;\nlet b = 2;\n";
        let tree = parse(source);
        let root = tree.root_node();
        let konst = root.named_child(0).unwrap();
        let lett = root.named_child(1).unwrap();
        assert!(JavaScriptProvider.confirm_match(konst, "constant", source));
        assert!(!JavaScriptProvider.confirm_match(lett, "constant", source));
    }

    #[test]
    fn test_export_ancestor_marks_exported() {
        let source = "export function handler() {}\nfunction local() {}\n";
        let tree = parse(source);
        let root = tree.root_node();
        let exported = root.named_child(0).unwrap();
        let func = exported.child_by_field_name("declaration").unwrap();
        assert!(JavaScriptProvider.is_exported_node(func, source));
        let local = root.named_child(1).unwrap();
        assert!(!JavaScriptProvider.is_exported_node(local, source));
    }

    #[test]
    fn test_extract_name_variants() {
        let source =
            "function greet() {}\nconst [first, second] = pair;\nimport x from './mod';\n";
        let tree = parse(source);
        let root = tree.root_node();
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            match node.kind() {
                "function_declaration" => {
                    assert_eq!(JavaScriptProvider.extract_name(node, source), "greet");
                }
                "lexical_declaration" => {
                    assert_eq!(JavaScriptProvider.extract_name(node, source), "first");
                }
                "import_statement" => {
                    assert_eq!(JavaScriptProvider.extract_name(node, source), "./mod");
                }
                _ => {}
            }
        }
    }
}
