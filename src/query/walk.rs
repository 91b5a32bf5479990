//! The match engine: pre-order CST walk plus compound set algebra.

use std::collections::BTreeMap;

use regex::Regex;
use tree_sitter::{Node, Tree};

use crate::error::{Error, Result};
use crate::lang::LanguageProvider;
use crate::query::pattern::glob_match;
use crate::query::{AgentQuery, Expr, QueryMatch};

type MatchKey = (usize, usize, String);
type MatchSet = BTreeMap<MatchKey, QueryMatch>;

/// Find all matches for a single term query. The tree is walked pre-order;
/// at each node the provider decides whether the node type belongs to the
/// query's kind, then the extracted name is tested against the pattern.
pub fn find_matches(
    provider: &dyn LanguageProvider,
    tree: &Tree,
    source: &str,
    query: &AgentQuery,
) -> Result<Vec<QueryMatch>> {
    let node_types = provider.map_kind(&query.kind);
    let attributes = compile_attributes(query)?;

    let mut out = Vec::new();
    let mut stack = vec![tree.root_node()];
    while let Some(node) = stack.pop() {
        if node_types.iter().any(|t| t == node.kind())
            && provider.confirm_match(node, &query.kind, source)
        {
            if let Some(expanded) = provider.expand_matches(node, source, query) {
                for matched in expanded {
                    if glob_match(&query.name, &matched.name)
                        && attributes_match(provider, node, source, &attributes)
                    {
                        out.push(matched);
                    }
                }
            } else {
                let name = provider.extract_name(node, source);
                if glob_match(&query.name, &name)
                    && attributes_match(provider, node, source, &attributes)
                {
                    let exported = provider.is_exported_node(node, source);
                    out.push(QueryMatch::from_node(&query.kind, name, node, source, exported));
                }
            }
        }
        for i in (0..node.child_count()).rev() {
            if let Some(child) = node.child(i) {
                stack.push(child);
            }
        }
    }

    out.sort_by_key(|m| (m.byte_range.start, m.byte_range.end));
    Ok(out)
}

/// Evaluate a compound expression as set algebra over term match sets.
/// The universe for `!` complements is the union of `kind:*` over every
/// kind named anywhere in the expression.
pub fn evaluate(
    provider: &dyn LanguageProvider,
    tree: &Tree,
    source: &str,
    expr: &Expr,
) -> Result<Vec<QueryMatch>> {
    let mut universe = MatchSet::new();
    for kind in expr.kinds() {
        let all = AgentQuery::new(kind, "*");
        for matched in find_matches(provider, tree, source, &all)? {
            universe.insert(matched.key(), matched);
        }
    }

    let set = eval_expr(provider, tree, source, expr, &universe)?;
    // BTreeMap keys start with the byte offset, so values come out in
    // source order.
    Ok(set.into_values().collect())
}

fn eval_expr(
    provider: &dyn LanguageProvider,
    tree: &Tree,
    source: &str,
    expr: &Expr,
    universe: &MatchSet,
) -> Result<MatchSet> {
    match expr {
        Expr::Term(query) => {
            let mut set = MatchSet::new();
            for matched in find_matches(provider, tree, source, query)? {
                set.insert(matched.key(), matched);
            }
            Ok(set)
        }
        Expr::And(a, b) => {
            let left = eval_expr(provider, tree, source, a, universe)?;
            let right = eval_expr(provider, tree, source, b, universe)?;
            Ok(left
                .into_iter()
                .filter(|(key, _)| right.contains_key(key))
                .collect())
        }
        Expr::Or(a, b) => {
            let mut left = eval_expr(provider, tree, source, a, universe)?;
            left.extend(eval_expr(provider, tree, source, b, universe)?);
            Ok(left)
        }
        Expr::Not(inner) => {
            let excluded = eval_expr(provider, tree, source, inner, universe)?;
            Ok(universe
                .iter()
                .filter(|(key, _)| !excluded.contains_key(*key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect())
        }
    }
}

fn compile_attributes(query: &AgentQuery) -> Result<Vec<(String, Regex)>> {
    query
        .attributes
        .iter()
        .map(|(key, template)| {
            let regex = Regex::new(&format!("^(?:{template})$")).map_err(|e| {
                Error::QueryResolution(format!("bad attribute template '{template}': {e}"))
            })?;
            Ok((key.clone(), regex))
        })
        .collect()
}

fn attributes_match(
    provider: &dyn LanguageProvider,
    node: Node<'_>,
    source: &str,
    attributes: &[(String, Regex)],
) -> bool {
    attributes.iter().all(|(key, regex)| {
        provider
            .attribute(node, source, key)
            .is_some_and(|value| regex.is_match(&value))
    })
}
