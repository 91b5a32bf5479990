//! Compound query expressions.
//!
//! ```text
//! func:Test* & !func:TestHelper
//! class:User* | struct:User*
//! var:config[type=string]
//! ```
//!
//! Operators: `&`/`&&`/`and`, `|`/`||`/`or`, `!`. AND binds tighter than
//! OR, `!` binds tightest, terms associate left-to-right. Parentheses are
//! accepted for grouping.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::query::{AgentQuery, normalize_kind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Term(AgentQuery),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// All canonical kinds named anywhere in the expression. The engine
    /// uses them as the universe for `!` complements.
    pub fn kinds(&self) -> BTreeSet<String> {
        let mut kinds = BTreeSet::new();
        self.collect_kinds(&mut kinds);
        kinds
    }

    fn collect_kinds(&self, kinds: &mut BTreeSet<String>) {
        match self {
            Expr::Term(query) => {
                kinds.insert(query.kind.clone());
            }
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.collect_kinds(kinds);
                b.collect_kinds(kinds);
            }
            Expr::Not(inner) => inner.collect_kinds(kinds),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    And,
    Or,
    Not,
    Open,
    Close,
    Term(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                }
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                }
                tokens.push(Token::Or);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '&' | '|' | '!' | '(' | ')') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                    // Attribute blocks may contain operator characters and
                    // spaces; consume through the closing bracket.
                    if word.ends_with('[') {
                        for inner in chars.by_ref() {
                            word.push(inner);
                            if inner == ']' {
                                break;
                            }
                        }
                    }
                }
                match word.as_str() {
                    "and" | "AND" => tokens.push(Token::And),
                    "or" | "OR" => tokens.push(Token::Or),
                    _ => tokens.push(Token::Term(word)),
                }
            }
        }
    }

    Ok(tokens)
}

/// Parse a `kind:pattern[attr=template,...]` term.
fn parse_term(word: &str) -> Result<AgentQuery> {
    let Some((kind, rest)) = word.split_once(':') else {
        return Err(Error::QueryResolution(format!(
            "malformed term '{word}': expected kind:pattern"
        )));
    };
    if kind.is_empty() {
        return Err(Error::QueryResolution(format!(
            "malformed term '{word}': empty kind"
        )));
    }

    let mut query = AgentQuery::new(normalize_kind(kind), "");
    let (pattern, attrs) = match rest.split_once('[') {
        Some((pattern, attrs)) => {
            let attrs = attrs.strip_suffix(']').ok_or_else(|| {
                Error::QueryResolution(format!("malformed term '{word}': unclosed '['"))
            })?;
            (pattern, Some(attrs))
        }
        None => (rest, None),
    };
    query.name = pattern.to_string();

    if let Some(attrs) = attrs {
        for pair in attrs.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let Some((key, template)) = pair.split_once('=') else {
                return Err(Error::QueryResolution(format!(
                    "malformed attribute '{pair}': expected name=template"
                )));
            };
            query
                .attributes
                .insert(key.trim().to_string(), template.trim().to_string());
        }
    }

    Ok(query)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Not) => Ok(Expr::Not(Box::new(self.parse_unary()?))),
            Some(Token::Open) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(Error::QueryResolution("unclosed '(' in query".into())),
                }
            }
            Some(Token::Term(word)) => Ok(Expr::Term(parse_term(&word)?)),
            Some(token) => Err(Error::QueryResolution(format!(
                "unexpected token {token:?} in query"
            ))),
            None => Err(Error::QueryResolution("empty query expression".into())),
        }
    }
}

/// Parse a compound expression (a single `kind:pattern` term is the
/// degenerate case).
pub fn parse_expression(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::QueryResolution(format!(
            "trailing input in query expression '{input}'"
        )));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use crate::query::compound::*;

    fn term(kind: &str, name: &str) -> Expr {
        Expr::Term(AgentQuery::new(kind, name))
    }

    #[test]
    fn test_single_term() {
        let expr = parse_expression("func:Test*").unwrap();
        assert_eq!(expr, term("function", "Test*"));
    }

    #[test]
    fn test_and_not() {
        let expr = parse_expression("func:Test* & !func:TestHelper").unwrap();
        assert_eq!(
            expr,
            Expr::And(
                Box::new(term("function", "Test*")),
                Box::new(Expr::Not(Box::new(term("function", "TestHelper")))),
            )
        );
    }

    #[test]
    fn test_word_operators() {
        let a = parse_expression("func:A and func:B or func:C").unwrap();
        let b = parse_expression("func:A && func:B || func:C").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse_expression("class:A | struct:B & struct:C").unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                Box::new(term("class", "A")),
                Box::new(Expr::And(
                    Box::new(term("struct", "B")),
                    Box::new(term("struct", "C")),
                )),
            )
        );
    }

    #[test]
    fn test_parentheses_group() {
        let expr = parse_expression("(class:A | struct:B) & struct:C").unwrap();
        assert_eq!(
            expr,
            Expr::And(
                Box::new(Expr::Or(
                    Box::new(term("class", "A")),
                    Box::new(term("struct", "B")),
                )),
                Box::new(term("struct", "C")),
            )
        );
    }

    #[test]
    fn test_attributes() {
        let expr = parse_expression("var:config[type=string]").unwrap();
        let Expr::Term(query) = expr else {
            panic!("expected term");
        };
        assert_eq!(query.kind, "variable");
        assert_eq!(query.name, "config");
        assert_eq!(query.attributes.get("type").map(String::as_str), Some("string"));
    }

    #[test]
    fn test_malformed_terms_error() {
        assert!(parse_expression("TestHelper").is_err());
        assert!(parse_expression("func:A &").is_err());
        assert!(parse_expression("(func:A").is_err());
        assert!(parse_expression("var:x[type]").is_err());
    }

    #[test]
    fn test_kinds_collects_all() {
        let expr = parse_expression("func:A | class:B & !struct:C").unwrap();
        let kinds: Vec<_> = expr.kinds().into_iter().collect();
        assert_eq!(kinds, vec!["class", "function", "struct"]);
    }
}
