//! TypeScript language provider.
//!
//! Shares the script-level behavior with the JavaScript provider and adds
//! the TypeScript-only declaration kinds (interfaces, type aliases, enums,
//! namespaces, decorators) plus `type=` attribute extraction from type
//! annotations.

use tree_sitter::{Node, Tree};

use crate::lang::javascript::{
    confirm_script_match, expand_declarators, extract_script_name, has_export_ancestor,
    map_script_kind, script_append_anchor,
};
use crate::lang::{ANONYMOUS, LanguageProvider, name_field, node_text};
use crate::query::{AgentQuery, QueryMatch};

pub struct TypeScriptProvider;

impl LanguageProvider for TypeScriptProvider {
    fn id(&self) -> &'static str {
        "typescript"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["ts"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ts", "mts", "cts"]
    }

    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    }

    fn map_kind(&self, kind: &str) -> Vec<String> {
        let types: &[&str] = match kind {
            "interface" => &["interface_declaration"],
            "type" => &["type_alias_declaration"],
            "enum" => &["enum_declaration"],
            "namespace" => &["internal_module", "module"],
            "decorator" => &["decorator"],
            "class" => &["class_declaration", "abstract_class_declaration"],
            "method" => &["method_definition", "method_signature"],
            "field" => &["public_field_definition", "property_signature"],
            "parameter" => &["required_parameter", "optional_parameter"],
            other => return map_script_kind(other),
        };
        types.iter().map(|t| t.to_string()).collect()
    }

    fn confirm_match(&self, node: Node<'_>, kind: &str, source: &str) -> bool {
        confirm_script_match(node, kind, source)
    }

    fn extract_name(&self, node: Node<'_>, source: &str) -> String {
        match node.kind() {
            "decorator" => decorator_name(node, source),
            "required_parameter" | "optional_parameter" => node
                .child_by_field_name("pattern")
                .map(|p| node_text(p, source).to_string())
                .unwrap_or_else(|| ANONYMOUS.to_string()),
            "property_signature" | "public_field_definition" => {
                name_field(node, source).unwrap_or_else(|| ANONYMOUS.to_string())
            }
            _ => extract_script_name(self, node, source),
        }
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

    fn attribute(&self, node: Node<'_>, source: &str, key: &str) -> Option<String> {
        match key {
            "type" => type_annotation(node, source),
            _ => None,
        }
    }
}

/// `@sealed` -> "sealed"; `@Component({...})` -> "Component".
fn decorator_name(node: Node<'_>, source: &str) -> String {
    let Some(inner) = node.named_child(0) else {
        return ANONYMOUS.to_string();
    };
    match inner.kind() {
        "call_expression" => inner
            .child_by_field_name("function")
            .map(|f| node_text(f, source).to_string())
            .unwrap_or_else(|| ANONYMOUS.to_string()),
        _ => node_text(inner, source).to_string(),
    }
}

/// Text of the `: T` annotation on the node (or its first declarator),
/// with the colon stripped.
fn type_annotation(node: Node<'_>, source: &str) -> Option<String> {
    let holder = match node.kind() {
        "lexical_declaration" | "variable_declaration" => node.named_child(0)?,
        _ => node,
    };
    let annotation = holder.child_by_field_name("type")?;
    Some(
        node_text(annotation, source)
            .trim_start_matches(':')
            .trim()
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use tree_sitter::Parser;

    use crate::lang::typescript::*;

    fn parse(source: &str) -> Tree {
        let mut parser = Parser::new();
        parser
            .set_language(&TypeScriptProvider.grammar())
            .unwrap();
        parser.parse(source, None).unwrap()
    }

    #[test]
    fn test_interface_and_type_alias_names() {
        let source = "interface User { id: number }\ntype Pair = [number, number];\n";
        let tree = parse(source);
        let root = tree.root_node();
        let iface = root.named_child(0).unwrap();
        assert_eq!(iface.kind(), "interface_declaration");
        assert_eq!(TypeScriptProvider.extract_name(iface, source), "User");
        let alias = root.named_child(1).unwrap();
        assert_eq!(alias.kind(), "type_alias_declaration");
        assert_eq!(TypeScriptProvider.extract_name(alias, source), "Pair");
    }

    #[test]
    fn test_type_attribute_from_annotation() {
        let source = "const config: string = 'x';\n";
        let tree = parse(source);
        let decl = tree.root_node().named_child(0).unwrap();
        assert_eq!(
            TypeScriptProvider.attribute(decl, source, "type"),
            Some("string".to_string())
        );
        assert_eq!(TypeScriptProvider.attribute(decl, source, "receiver"), None);
    }

    #[test]
    fn test_decorator_name() {
        let source = "@Component({ selector: 'app' })\nclass AppComponent {}\n";
        let tree = parse(source);
        let root = tree.root_node();
        let mut found = false;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.kind() == "decorator" {
                assert_eq!(TypeScriptProvider.extract_name(node, source), "Component");
                found = true;
                break;
            }
            for i in 0..node.named_child_count() {
                if let Some(child) = node.named_child(i) {
                    stack.push(child);
                }
            }
        }
        assert!(found, "no decorator node in tree");
    }

    #[test]
    fn test_exported_initial_capital() {
        assert!(TypeScriptProvider.is_exported("UserService"));
        assert!(!TypeScriptProvider.is_exported("userService"));
    }
}
