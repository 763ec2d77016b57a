//! Pest-based parser for the simplified query text form.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use serde_json::Value;

use crate::error::{Result, SemgraphError};
use crate::request::{Filter, FilterOp, OrderItem, QueryRequest, SortDirection};

#[derive(Parser)]
#[grammar = "query.pest"]
struct QueryParser;

/// Parse `METRICS … [DIMENSIONS …] [WHERE …] [ORDER BY …] [LIMIT n] [OFFSET n] [DIALECT d]`.
pub fn parse_query(source: &str) -> Result<QueryRequest> {
    let mut pairs = QueryParser::parse(Rule::query, source)
        .map_err(|e| SemgraphError::Parse(e.to_string()))?;
    let query = pairs
        .next()
        .ok_or_else(|| SemgraphError::Parse("empty input".to_string()))?;

    let mut request = QueryRequest::default();
    for clause in query.into_inner() {
        match clause.as_rule() {
            Rule::metrics_clause => request.metrics = keys(clause),
            Rule::dimensions_clause => request.dimensions = keys(clause),
            Rule::where_clause => {
                for predicate in clause.into_inner() {
                    if predicate.as_rule() == Rule::predicate {
                        request.filters.push(parse_predicate(predicate)?);
                    }
                }
            }
            Rule::order_clause => {
                for item in clause.into_inner() {
                    if item.as_rule() == Rule::order_item {
                        request.order.push(parse_order_item(item));
                    }
                }
            }
            Rule::limit_clause => request.limit = Some(integer(clause)?),
            Rule::offset_clause => request.offset = Some(integer(clause)?),
            Rule::dialect_clause => {
                request.dialect = clause
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::key)
                    .map(|p| p.as_str().to_string());
            }
            _ => {}
        }
    }

    if request.metrics.is_empty() && request.dimensions.is_empty() {
        return Err(SemgraphError::Parse(
            "query needs a METRICS or DIMENSIONS clause".to_string(),
        ));
    }
    Ok(request)
}

fn keys(clause: Pair<Rule>) -> Vec<String> {
    clause
        .into_inner()
        .filter(|p| p.as_rule() == Rule::key_list)
        .flat_map(|list| list.into_inner())
        .map(|key| key.as_str().to_string())
        .collect()
}

fn integer(clause: Pair<Rule>) -> Result<u64> {
    let text = clause
        .into_inner()
        .find(|p| p.as_rule() == Rule::integer)
        .map(|p| p.as_str())
        .ok_or_else(|| SemgraphError::Parse("expected an integer".to_string()))?;
    text.parse::<u64>()
        .map_err(|e| SemgraphError::Parse(format!("invalid integer {text}: {e}")))
}

fn parse_predicate(pair: Pair<Rule>) -> Result<Filter> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| SemgraphError::Parse("empty predicate".to_string()))?;
    let rule = inner.as_rule();

    let mut field = String::new();
    let mut op = None;
    let mut negated = false;
    let mut values = Vec::new();
    for part in inner.into_inner() {
        match part.as_rule() {
            Rule::key => field = part.as_str().to_string(),
            Rule::kw_not => negated = true,
            Rule::comp_op => op = Some(comparison_op(part.as_str())?),
            Rule::literal => values.push(parse_literal(part)?),
            _ => {}
        }
    }

    let (op, value) = match rule {
        Rule::null_check if negated => (FilterOp::IsNotNull, Value::Null),
        Rule::null_check => (FilterOp::IsNull, Value::Null),
        Rule::in_list if negated => (FilterOp::NotIn, Value::Array(values)),
        Rule::in_list => (FilterOp::In, Value::Array(values)),
        _ => {
            let op = op.ok_or_else(|| SemgraphError::Parse("missing operator".to_string()))?;
            let value = values
                .pop()
                .ok_or_else(|| SemgraphError::Parse(format!("missing value for {field}")))?;
            (op, value)
        }
    };
    Ok(Filter { field, op, value })
}

fn comparison_op(text: &str) -> Result<FilterOp> {
    match text.to_ascii_lowercase().as_str() {
        "=" => Ok(FilterOp::Eq),
        "!=" | "<>" => Ok(FilterOp::Neq),
        ">" => Ok(FilterOp::Gt),
        ">=" => Ok(FilterOp::Gte),
        "<" => Ok(FilterOp::Lt),
        "<=" => Ok(FilterOp::Lte),
        "like" => Ok(FilterOp::Like),
        other => Err(SemgraphError::Parse(format!("unknown operator {other}"))),
    }
}

fn parse_literal(pair: Pair<Rule>) -> Result<Value> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| SemgraphError::Parse("empty literal".to_string()))?;
    match inner.as_rule() {
        Rule::string => {
            let text = inner
                .into_inner()
                .next()
                .map(|p| p.as_str())
                .unwrap_or_default();
            Ok(Value::String(text.replace("''", "'")))
        }
        Rule::number => serde_json::from_str(inner.as_str())
            .map_err(|e| SemgraphError::Parse(format!("invalid number {}: {e}", inner.as_str()))),
        Rule::boolean => Ok(Value::Bool(
            inner.as_str().eq_ignore_ascii_case("true"),
        )),
        _ => Err(SemgraphError::Parse(format!(
            "unexpected literal {}",
            inner.as_str()
        ))),
    }
}

fn parse_order_item(pair: Pair<Rule>) -> OrderItem {
    let mut field = String::new();
    let mut direction = SortDirection::Asc;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::key => field = part.as_str().to_string(),
            Rule::kw_desc => direction = SortDirection::Desc,
            _ => {}
        }
    }
    OrderItem { field, direction }
}
