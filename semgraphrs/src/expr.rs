//! Small lexer for the SQL snippets stored in the semantic model.
//!
//! Metric, dimension and join-criteria expressions are opaque SQL strings.
//! The compiler only needs to find the column references inside them so it
//! can rebind them to the alias a relation gets in the generated statement;
//! everything else is carried through verbatim.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::error::{Result, SemgraphError};
use crate::model::Relation;

static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "ALL",
        "AND",
        "ANY",
        "AS",
        "ASC",
        "BETWEEN",
        "BY",
        "CASE",
        "CURRENT",
        "CURRENT_DATE",
        "CURRENT_TIME",
        "CURRENT_TIMESTAMP",
        "DESC",
        "DISTINCT",
        "ELSE",
        "END",
        "EXISTS",
        "FALSE",
        "FILTER",
        "FOLLOWING",
        "FROM",
        "ILIKE",
        "IN",
        "INTERVAL",
        "IS",
        "LIKE",
        "LOCALTIMESTAMP",
        "NOT",
        "NULL",
        "OR",
        "ORDER",
        "OVER",
        "PARTITION",
        "PRECEDING",
        "RANGE",
        "ROW",
        "ROWS",
        "SELECT",
        "SOME",
        "THEN",
        "TRUE",
        "UNBOUNDED",
        "WHEN",
        "WHERE",
    ]
    .into_iter()
    .collect()
});

/// A column reference found inside an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// Everything before the last dot, e.g. `orders` or `sales.orders`.
    pub qualifier: Option<String>,
    pub name: String,
    raw: String,
}

impl ColumnRef {
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Column(ColumnRef),
}

/// A parsed model expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    source: String,
    pieces: Vec<Piece>,
}

/// Part of an expression after column references were bound to SQL aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundPart {
    Text(String),
    Column { table: String, name: String },
}

/// An expression ready for rendering; column quoting is left to the dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundExpr {
    pub parts: Vec<BoundPart>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident { text: String, raw: String },
    Dot,
    OpenParen,
    Space(String),
    Other(String),
}

impl Expression {
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        Ok(Self {
            source: input.to_string(),
            pieces: classify(tokens),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn column_refs(&self) -> impl Iterator<Item = &ColumnRef> {
        self.pieces.iter().filter_map(|p| match p {
            Piece::Column(c) => Some(c),
            Piece::Text(_) => None,
        })
    }

    /// Whitespace-insensitive form used to compare two expressions.
    pub fn normalized(&self) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            let text = match piece {
                Piece::Text(t) => t.as_str(),
                Piece::Column(c) => c.raw.as_str(),
            };
            out.push_str(text);
        }
        out.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Rebind column references to the aliases of the relations in scope.
    ///
    /// Qualified references bind to the relation answering to the qualifier.
    /// Bare references bind to the first relation declaring the column, or to
    /// the only relation in scope when it declares no columns at all. Anything
    /// that does not bind is emitted as written.
    pub fn bind(&self, scope: &[(&Relation, &str)]) -> BoundExpr {
        let mut parts: Vec<BoundPart> = Vec::with_capacity(self.pieces.len());
        for piece in &self.pieces {
            let part = match piece {
                Piece::Text(t) => BoundPart::Text(t.clone()),
                Piece::Column(c) => match bind_column(c, scope) {
                    Some(alias) => BoundPart::Column {
                        table: alias.to_string(),
                        name: c.name.clone(),
                    },
                    None => BoundPart::Text(c.raw.clone()),
                },
            };
            if let (Some(BoundPart::Text(prev)), BoundPart::Text(next)) = (parts.last_mut(), &part) {
                prev.push_str(next);
                continue;
            }
            parts.push(part);
        }
        BoundExpr { parts }
    }
}

fn bind_column<'s>(column: &ColumnRef, scope: &[(&Relation, &'s str)]) -> Option<&'s str> {
    match &column.qualifier {
        Some(q) => scope
            .iter()
            .find(|(rel, _)| rel.answers_to(q))
            .map(|(_, alias)| *alias),
        None => {
            if let Some((_, alias)) = scope.iter().find(|(rel, _)| rel.has_column(&column.name)) {
                return Some(*alias);
            }
            match scope {
                [(rel, alias)] if rel.columns.is_empty() => Some(*alias),
                _ => None,
            }
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut depth: i32 = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            let end = scan_quoted(&chars, i, '\'').ok_or_else(|| {
                SemgraphError::Parse(format!("unterminated string literal in '{input}'"))
            })?;
            tokens.push(Token::Other(chars[i..=end].iter().collect()));
            i = end + 1;
        } else if c == '"' || c == '`' {
            let end = scan_quoted(&chars, i, c).ok_or_else(|| {
                SemgraphError::Parse(format!("unterminated quoted identifier in '{input}'"))
            })?;
            let raw: String = chars[i..=end].iter().collect();
            let doubled = format!("{c}{c}");
            let text = raw[1..raw.len() - 1].replace(&doubled, &c.to_string());
            tokens.push(Token::Ident { text, raw });
            i = end + 1;
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(Token::Ident {
                raw: text.clone(),
                text,
            });
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Other(chars[start..i].iter().collect()));
        } else if c.is_whitespace() {
            let start = i;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            tokens.push(Token::Space(chars[start..i].iter().collect()));
        } else {
            match c {
                '.' => tokens.push(Token::Dot),
                '(' => {
                    depth += 1;
                    tokens.push(Token::OpenParen);
                }
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(SemgraphError::Parse(format!(
                            "unbalanced ')' in '{input}'"
                        )));
                    }
                    tokens.push(Token::Other(")".to_string()));
                }
                other => tokens.push(Token::Other(other.to_string())),
            }
            i += 1;
        }
    }

    if depth != 0 {
        return Err(SemgraphError::Parse(format!("unbalanced '(' in '{input}'")));
    }
    Ok(tokens)
}

/// Index of the closing quote matching the one at `start`; doubled quotes escape.
fn scan_quoted(chars: &[char], start: usize, quote: char) -> Option<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

fn classify(tokens: Vec<Token>) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut previous_word: Option<String> = None;
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Ident { .. } => {
                // Gather a dotted path: ident (. ident)*
                let mut path: Vec<(String, String)> = Vec::new();
                let mut j = i;
                while let Some(Token::Ident { text, raw }) = tokens.get(j) {
                    path.push((text.clone(), raw.clone()));
                    if matches!(tokens.get(j + 1), Some(Token::Dot))
                        && matches!(tokens.get(j + 2), Some(Token::Ident { .. }))
                    {
                        j += 2;
                    } else {
                        j += 1;
                        break;
                    }
                }
                let raw = path
                    .iter()
                    .map(|(_, r)| r.as_str())
                    .collect::<Vec<_>>()
                    .join(".");

                let mut k = j;
                while matches!(tokens.get(k), Some(Token::Space(_))) {
                    k += 1;
                }
                let is_call = matches!(tokens.get(k), Some(Token::OpenParen));
                let first_raw = &path[0].1;
                let is_keyword = path.len() == 1
                    && !first_raw.starts_with('"')
                    && !first_raw.starts_with('`')
                    && KEYWORDS.contains(first_raw.to_ascii_uppercase().as_str());
                let after_as = previous_word.as_deref() == Some("AS");

                if is_call || is_keyword || after_as {
                    pieces.push(Piece::Text(raw.clone()));
                } else {
                    let name = path.pop().map(|(text, _)| text).unwrap_or_default();
                    let qualifier = if path.is_empty() {
                        None
                    } else {
                        Some(
                            path.iter()
                                .map(|(t, _)| t.as_str())
                                .collect::<Vec<_>>()
                                .join("."),
                        )
                    };
                    pieces.push(Piece::Column(ColumnRef {
                        qualifier,
                        name,
                        raw: raw.clone(),
                    }));
                }
                previous_word = Some(raw.to_ascii_uppercase());
                i = j;
            }
            Token::Space(s) => {
                pieces.push(Piece::Text(s.clone()));
                i += 1;
            }
            Token::Dot => {
                pieces.push(Piece::Text(".".to_string()));
                previous_word = None;
                i += 1;
            }
            Token::OpenParen => {
                pieces.push(Piece::Text("(".to_string()));
                previous_word = None;
                i += 1;
            }
            Token::Other(s) => {
                pieces.push(Piece::Text(s.clone()));
                previous_word = None;
                i += 1;
            }
        }
    }

    merge_text(pieces)
}

fn merge_text(pieces: Vec<Piece>) -> Vec<Piece> {
    let mut merged: Vec<Piece> = Vec::with_capacity(pieces.len());
    for piece in pieces {
        if let (Some(Piece::Text(prev)), Piece::Text(next)) = (merged.last_mut(), &piece) {
            prev.push_str(next);
            continue;
        }
        merged.push(piece);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Relation;

    fn refs(input: &str) -> Vec<(Option<String>, String)> {
        Expression::parse(input)
            .unwrap()
            .column_refs()
            .map(|c| (c.qualifier.clone(), c.name.clone()))
            .collect()
    }

    #[test]
    fn finds_bare_and_qualified_columns() {
        assert_eq!(refs("SUM(amount)"), vec![(None, "amount".to_string())]);
        assert_eq!(
            refs("orders.customer_id = customers.id"),
            vec![
                (Some("orders".to_string()), "customer_id".to_string()),
                (Some("customers".to_string()), "id".to_string()),
            ]
        );
        assert_eq!(
            refs("sales.orders.amount"),
            vec![(Some("sales.orders".to_string()), "amount".to_string())]
        );
    }

    #[test]
    fn skips_functions_keywords_literals_and_cast_types() {
        assert_eq!(
            refs("COUNT(DISTINCT customer_id)"),
            vec![(None, "customer_id".to_string())]
        );
        assert_eq!(
            refs("CASE WHEN status = 'it''s done' THEN 1 ELSE NULL END"),
            vec![(None, "status".to_string())]
        );
        assert_eq!(
            refs("CAST(amount AS DECIMAL)"),
            vec![(None, "amount".to_string())]
        );
        assert_eq!(refs("date_trunc ('month', created_at)").len(), 1);
    }

    #[test]
    fn quoted_identifiers_are_columns() {
        assert_eq!(
            refs(r#"SUM("Net Amount")"#),
            vec![(None, "Net Amount".to_string())]
        );
    }

    #[test]
    fn rejects_unbalanced_input() {
        assert!(Expression::parse("SUM(amount").is_err());
        assert!(Expression::parse("amount)").is_err());
        assert!(Expression::parse("'open").is_err());
    }

    #[test]
    fn binds_columns_to_aliases() {
        let orders = Relation::table("sales", "orders", &[("amount", "double")]);
        let expr = Expression::parse("SUM(amount) + SUM(sales.orders.amount) + missing").unwrap();
        let bound = expr.bind(&[(&orders, "o")]);
        assert_eq!(
            bound.parts,
            vec![
                BoundPart::Text("SUM(".to_string()),
                BoundPart::Column {
                    table: "o".to_string(),
                    name: "amount".to_string()
                },
                BoundPart::Text(") + SUM(".to_string()),
                BoundPart::Column {
                    table: "o".to_string(),
                    name: "amount".to_string()
                },
                BoundPart::Text(") + missing".to_string()),
            ]
        );
    }

    #[test]
    fn single_relation_without_columns_binds_everything() {
        let events = Relation::table("", "events", &[]);
        let bound = Expression::parse("COUNT(id)").unwrap().bind(&[(&events, "events")]);
        assert!(bound.parts.contains(&BoundPart::Column {
            table: "events".to_string(),
            name: "id".to_string()
        }));
    }

    #[test]
    fn normalized_ignores_whitespace() {
        let a = Expression::parse("a.id  =\n b.id").unwrap();
        let b = Expression::parse("a.id = b.id").unwrap();
        assert_eq!(a.normalized(), b.normalized());
    }
}
