//! Query-string translation.
//!
//! The raw query string is decoded into a parameter tree using bracket
//! notation (`averageCost[lte]=10000`, `careers[in][]=Business`), then walked
//! structurally into a [`StructuredQuery`]. Only map *keys* are inspected for
//! operator tokens, and only the five tokens in [`OPERATOR_TOKENS`] are ever
//! promoted to operators. Everything else is a literal.

use crate::errors::{Result, StoreError};
use crate::query::{
    default_sort, CmpOp, Condition, Filter, Page, Projection, SortKey, StructuredQuery,
    DEFAULT_LIMIT, DEFAULT_PAGE, MAX_LIMIT,
};
use serde_json::{Map, Value as JsonValue};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Keys that shape the response and are never filter terms.
pub const RESERVED_KEYS: [&str; 4] = ["select", "sort", "page", "limit"];

/// The only tokens promoted to store operators.
pub const OPERATOR_TOKENS: [&str; 5] = ["gt", "gte", "lt", "lte", "in"];

const MAX_KEY_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    List(Vec<String>),
    Map(ParamMap),
}

pub type ParamMap = BTreeMap<String, ParamValue>;

#[derive(Debug, PartialEq)]
enum Segment {
    Key(String),
    Push,
}

/// Decodes `application/x-www-form-urlencoded` input with bracket notation.
pub fn parse_query_string(raw: &str) -> Result<ParamMap> {
    let mut params = ParamMap::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        if key.is_empty() {
            continue;
        }
        let (head, rest) = split_key(&key)?;
        insert(&mut params, head, &rest, value.into_owned())?;
    }
    Ok(params)
}

fn split_key(key: &str) -> Result<(String, Vec<Segment>)> {
    let (head, mut tail) = match key.find('[') {
        Some(i) => (&key[..i], &key[i..]),
        None => (key, ""),
    };
    if head.is_empty() {
        return Err(StoreError::malformed(format!("empty field name in '{key}'")));
    }
    if head.contains(']') {
        return Err(StoreError::malformed(format!("unbalanced brackets in '{key}'")));
    }
    let mut segments = Vec::new();
    while !tail.is_empty() {
        let Some(inner) = tail.strip_prefix('[') else {
            return Err(StoreError::malformed(format!("unexpected text after ']' in '{key}'")));
        };
        let Some(close) = inner.find(']') else {
            return Err(StoreError::malformed(format!("unbalanced brackets in '{key}'")));
        };
        let name = &inner[..close];
        if name.contains('[') {
            return Err(StoreError::malformed(format!("unbalanced brackets in '{key}'")));
        }
        if matches!(segments.last(), Some(Segment::Push)) {
            return Err(StoreError::malformed(format!("'[]' must close the key in '{key}'")));
        }
        segments.push(if name.is_empty() {
            Segment::Push
        } else {
            Segment::Key(name.to_string())
        });
        tail = &inner[close + 1..];
    }
    if segments.len() > MAX_KEY_DEPTH {
        return Err(StoreError::malformed(format!("key '{key}' is nested too deeply")));
    }
    Ok((head.to_string(), segments))
}

fn shape_conflict(field: &str) -> StoreError {
    StoreError::malformed(format!(
        "'{field}' is used both as a value and as a nested object"
    ))
}

fn insert(map: &mut ParamMap, head: String, rest: &[Segment], value: String) -> Result<()> {
    match rest.first() {
        None | Some(Segment::Push) => {
            let push = rest.first().is_some();
            let field = head.clone();
            match map.entry(head) {
                Entry::Vacant(e) => {
                    e.insert(if push {
                        ParamValue::List(vec![value])
                    } else {
                        ParamValue::Text(value)
                    });
                }
                Entry::Occupied(mut e) => match e.get_mut() {
                    ParamValue::Text(prev) => {
                        let first = std::mem::take(prev);
                        e.insert(ParamValue::List(vec![first, value]));
                    }
                    ParamValue::List(items) => items.push(value),
                    ParamValue::Map(_) => return Err(shape_conflict(&field)),
                },
            }
            Ok(())
        }
        Some(Segment::Key(next)) => {
            let slot = map
                .entry(head.clone())
                .or_insert_with(|| ParamValue::Map(ParamMap::new()));
            match slot {
                ParamValue::Map(inner) => insert(inner, next.clone(), &rest[1..], value),
                _ => Err(shape_conflict(&head)),
            }
        }
    }
}

/// Translates a raw query string; `None` behaves like an empty string.
pub fn translate_query_string(raw: Option<&str>) -> Result<StructuredQuery> {
    translate(&parse_query_string(raw.unwrap_or_default())?)
}

pub fn translate(params: &ParamMap) -> Result<StructuredQuery> {
    let mut filter = Filter::all();
    for (field, value) in params {
        if RESERVED_KEYS.contains(&field.as_str()) {
            continue;
        }
        if field.split('.').any(|seg| seg.starts_with('$')) {
            return Err(StoreError::malformed(format!(
                "field name {field:?} may not start with '$'"
            )));
        }
        for condition in conditions_for(field, value)? {
            filter = filter.with_term(field.clone(), condition);
        }
    }

    let projection = params
        .get("select")
        .and_then(as_text)
        .map(|s| parse_select(&s))
        .unwrap_or_default();
    let sort = params
        .get("sort")
        .and_then(as_text)
        .map(|s| parse_sort(&s))
        .unwrap_or_else(default_sort);
    let page = parse_positive(params.get("page")).unwrap_or(DEFAULT_PAGE);
    let limit = parse_positive(params.get("limit"))
        .map(|l| l.min(MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT);

    Ok(StructuredQuery {
        filter,
        projection,
        sort,
        page: Page { page, limit },
    })
}

fn conditions_for(field: &str, value: &ParamValue) -> Result<Vec<Condition>> {
    match value {
        ParamValue::Text(s) => Ok(vec![Condition::Eq(JsonValue::String(s.clone()))]),
        ParamValue::List(items) => Ok(vec![Condition::Eq(strings(items))]),
        ParamValue::Map(m) => rewrite_operators(field, m),
    }
}

/// Structural rewrite of one field's bracket map. A map made only of
/// whitelisted tokens becomes operator conditions; a map with none of them
/// is an object literal; a mix is rejected.
fn rewrite_operators(field: &str, map: &ParamMap) -> Result<Vec<Condition>> {
    let (ops, literals): (Vec<_>, Vec<_>) = map
        .iter()
        .partition(|(k, _)| OPERATOR_TOKENS.contains(&k.as_str()));
    if ops.is_empty() {
        return Ok(vec![Condition::Eq(to_json(&ParamValue::Map(map.clone())))]);
    }
    if !literals.is_empty() {
        let names = |xs: &[(&String, &ParamValue)]| {
            xs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>().join(", ")
        };
        return Err(StoreError::malformed(format!(
            "'{field}' mixes operators ({}) with plain keys ({})",
            names(&ops),
            names(&literals)
        )));
    }
    ops.into_iter()
        .map(|(token, v)| match (CmpOp::from_token(token), v) {
            (None, ParamValue::Text(s)) => Ok(Condition::In(vec![JsonValue::String(s.clone())])),
            (None, ParamValue::List(items)) => Ok(Condition::In(
                items.iter().cloned().map(JsonValue::String).collect(),
            )),
            (Some(op), ParamValue::Text(s)) => Ok(Condition::Cmp {
                op,
                value: JsonValue::String(s.clone()),
            }),
            _ => Err(StoreError::malformed(format!(
                "operator '{token}' on '{field}' expects {}",
                if token == "in" { "a value or a list of values" } else { "a single value" }
            ))),
        })
        .collect()
}

fn strings(items: &[String]) -> JsonValue {
    JsonValue::Array(items.iter().cloned().map(JsonValue::String).collect())
}

fn to_json(value: &ParamValue) -> JsonValue {
    match value {
        ParamValue::Text(s) => JsonValue::String(s.clone()),
        ParamValue::List(items) => strings(items),
        ParamValue::Map(m) => JsonValue::Object(
            m.iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect::<Map<_, _>>(),
        ),
    }
}

fn as_text(value: &ParamValue) -> Option<String> {
    match value {
        ParamValue::Text(s) => Some(s.clone()),
        ParamValue::List(items) => Some(items.join(",")),
        ParamValue::Map(_) => None,
    }
}

fn parse_select(raw: &str) -> Projection {
    let fields: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect();
    if fields.is_empty() {
        Projection::All
    } else {
        Projection::Fields(fields)
    }
}

fn parse_sort(raw: &str) -> Vec<SortKey> {
    let keys: Vec<SortKey> = raw
        .split(',')
        .map(str::trim)
        .filter_map(|part| match part.strip_prefix('-') {
            Some(f) if !f.trim().is_empty() => Some(SortKey::desc(f.trim())),
            Some(_) => None,
            None if part.is_empty() => None,
            None => Some(SortKey::asc(part)),
        })
        .collect();
    if keys.is_empty() {
        default_sort()
    } else {
        keys
    }
}

fn parse_positive(value: Option<&ParamValue>) -> Option<u64> {
    value
        .and_then(as_text)
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
}
