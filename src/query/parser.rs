//! Query parsing.

use std::fmt;

use crate::error::{Error, Result};

/// Comparison operator of a filter segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Operator {
    const ALL: [(&'static str, Operator); 6] = [
        (">=", Operator::Ge),
        ("<=", Operator::Le),
        ("==", Operator::Eq),
        ("!=", Operator::Ne),
        (">", Operator::Gt),
        ("<", Operator::Lt),
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Right-hand side of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Bool(bool),
    String(String),
}

impl Literal {
    /// Numbers first, then `true`/`false`, otherwise a string with
    /// surrounding quotes trimmed.
    pub fn parse(text: &str) -> Self {
        if let Ok(number) = text.parse::<f64>() {
            return Literal::Number(number);
        }
        match text {
            "true" => Literal::Bool(true),
            "false" => Literal::Bool(false),
            _ => Literal::String(text.trim_matches(|c| c == '"' || c == '\'').to_string()),
        }
    }
}

/// `field <op> literal`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub value: Literal,
}

/// One step of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `name`
    Key(String),
    /// `*`
    Wildcard,
    /// `[N]`
    Index(usize),
    /// `[*]`
    ArrayWildcard,
    /// `[?field<op>value]`
    Filter(Filter),
}

fn syntax(query: &str, reason: impl Into<String>) -> Error {
    Error::QuerySyntax {
        query: query.to_string(),
        reason: reason.into(),
    }
}

/// Split a query into segments. The empty query and `/` yield no segments.
pub fn parse(query: &str) -> Result<Vec<Segment>> {
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let Some(body) = query.strip_prefix('/') else {
        return Err(syntax(query, "query must start with '/'"));
    };

    let mut segments = Vec::new();
    for part in body.split('/').filter(|part| !part.is_empty()) {
        segments.push(parse_segment(query, part)?);
    }
    Ok(segments)
}

fn parse_segment(query: &str, part: &str) -> Result<Segment> {
    if part == "*" {
        return Ok(Segment::Wildcard);
    }
    let Some(rest) = part.strip_prefix('[') else {
        return Ok(Segment::Key(part.to_string()));
    };
    let Some(inner) = rest.strip_suffix(']') else {
        return Err(syntax(query, format!("unterminated bracket in `{}`", part)));
    };

    if inner == "*" {
        return Ok(Segment::ArrayWildcard);
    }
    if let Some(condition) = inner.strip_prefix('?') {
        return parse_filter(query, condition).map(Segment::Filter);
    }
    inner
        .trim()
        .parse::<usize>()
        .map(Segment::Index)
        .map_err(|_| syntax(query, format!("invalid array index `{}`", inner)))
}

fn parse_filter(query: &str, condition: &str) -> Result<Filter> {
    // Earliest operator position wins; at that position the longest operator.
    let mut found: Option<(usize, &str, Operator)> = None;
    for (symbol, operator) in Operator::ALL {
        if let Some(at) = condition.find(symbol) {
            let better = match found {
                None => true,
                Some((best, best_symbol, _)) => {
                    at < best || (at == best && symbol.len() > best_symbol.len())
                }
            };
            if better {
                found = Some((at, symbol, operator));
            }
        }
    }

    let Some((at, symbol, operator)) = found else {
        return Err(syntax(query, format!("invalid filter condition `{}`", condition)));
    };
    let field = condition[..at].trim();
    if field.is_empty() {
        return Err(syntax(query, format!("filter `{}` has no field", condition)));
    }
    let value = condition[at + symbol.len()..].trim();

    Ok(Filter {
        field: field.to_string(),
        operator,
        value: Literal::parse(value),
    })
}
