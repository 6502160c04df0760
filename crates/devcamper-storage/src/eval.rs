//! Filter evaluation, sort comparison and projection over JSON documents.
//!
//! Query-string values always arrive as strings, so comparisons coerce a
//! string operand to the stored value's type (number or boolean) the way a
//! schema-aware store would cast them.

use devcamper_core::{
    CmpOp, Condition, Direction, Fields, Filter, GeoPoint, Projection, SortKey, ID_FIELD,
};
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;

const MAX_PATH_DEPTH: usize = 32;

pub fn matches(doc: &Fields, filter: &Filter) -> bool {
    filter
        .terms
        .iter()
        .all(|t| matches_condition(get_path(doc, &t.field), &t.condition))
}

fn matches_condition(value: Option<&JsonValue>, cond: &Condition) -> bool {
    match cond {
        Condition::Eq(expected) => match value {
            None => expected.is_null(),
            Some(v) => any_element(v, |x| loose_eq(x, expected)),
        },
        Condition::In(set) => value.is_some_and(|v| {
            any_element(v, |x| set.iter().any(|candidate| loose_eq(x, candidate)))
        }),
        Condition::Cmp { op, value: operand } => value.is_some_and(|v| {
            any_element(v, |x| match coerce_cmp(x, operand) {
                Some(ord) => match op {
                    CmpOp::Gt => ord == Ordering::Greater,
                    CmpOp::Gte => ord != Ordering::Less,
                    CmpOp::Lt => ord == Ordering::Less,
                    CmpOp::Lte => ord != Ordering::Greater,
                },
                None => false,
            })
        }),
        Condition::WithinSphere { center, radius } => value
            .and_then(as_lng_lat)
            .is_some_and(|p| GeoPoint::from_lng_lat(*center).angular_distance(&p) <= *radius),
    }
}

// Array fields match when the array itself or any element matches.
fn any_element(v: &JsonValue, pred: impl Fn(&JsonValue) -> bool) -> bool {
    if pred(v) {
        return true;
    }
    match v {
        JsonValue::Array(items) => items.iter().any(pred),
        _ => false,
    }
}

/// Accepts a `[lng, lat]` pair or a GeoJSON point object.
fn as_lng_lat(v: &JsonValue) -> Option<GeoPoint> {
    let pair = match v {
        JsonValue::Object(m) => m.get("coordinates")?.as_array()?,
        JsonValue::Array(a) => a,
        _ => return None,
    };
    match pair.as_slice() {
        [lng, lat] => Some(GeoPoint::from_lng_lat([lng.as_f64()?, lat.as_f64()?])),
        _ => None,
    }
}

pub fn get_path<'a>(doc: &'a Fields, path: &str) -> Option<&'a JsonValue> {
    if let Some(v) = doc.get(path) {
        return Some(v);
    }
    let mut parts = path.split('.');
    let mut cur = doc.get(parts.next()?)?;
    for (depth, part) in parts.enumerate() {
        if depth >= MAX_PATH_DEPTH {
            return None;
        }
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur)
}

fn loose_eq(a: &JsonValue, b: &JsonValue) -> bool {
    a == b || coerce_cmp(a, b) == Some(Ordering::Equal)
}

/// Orders two values of compatible types; `None` when they cannot be compared.
pub fn coerce_cmp(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    use JsonValue as J;
    match (a, b) {
        (J::Number(x), J::Number(y)) => Some(x.as_f64()?.total_cmp(&y.as_f64()?)),
        (J::Number(x), J::String(s)) => Some(x.as_f64()?.total_cmp(&s.trim().parse().ok()?)),
        (J::String(_), J::Number(_)) => coerce_cmp(b, a).map(Ordering::reverse),
        (J::String(x), J::String(y)) => Some(x.cmp(y)),
        (J::Bool(x), J::Bool(y)) => Some(x.cmp(y)),
        (J::Bool(x), J::String(s)) => Some(x.cmp(&s.trim().parse().ok()?)),
        (J::String(_), J::Bool(_)) => coerce_cmp(b, a).map(Ordering::reverse),
        (J::Null, J::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(v: &JsonValue) -> u8 {
    match v {
        JsonValue::Null => 0,
        JsonValue::Number(_) => 1,
        JsonValue::String(_) => 2,
        JsonValue::Object(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Bool(_) => 5,
    }
}

fn sort_value_cmp(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => coerce_cmp(x, y)
            .filter(|_| type_rank(x) == type_rank(y))
            .unwrap_or_else(|| type_rank(x).cmp(&type_rank(y))),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Compares by each sort key in turn. Equal documents compare `Equal`, so a
/// stable sort over insertion order keeps ties in insertion order.
pub fn compare_docs(a: &Fields, b: &Fields, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let ord = sort_value_cmp(get_path(a, &key.field), get_path(b, &key.field));
        if ord != Ordering::Equal {
            return match key.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
        }
    }
    Ordering::Equal
}

/// Applies a projection. `_id` is always kept; dotted paths rebuild the
/// nested objects they select from.
pub fn project(doc: &Fields, projection: &Projection) -> Fields {
    let fields = match projection {
        Projection::All => return doc.clone(),
        Projection::Fields(fields) => fields,
    };
    let mut out = Map::new();
    if let Some(id) = doc.get(ID_FIELD) {
        out.insert(ID_FIELD.to_string(), id.clone());
    }
    for f in fields {
        if let Some(v) = get_path(doc, f) {
            insert_path(&mut out, f, v.clone());
        }
    }
    out
}

fn insert_path(out: &mut Fields, path: &str, value: JsonValue) {
    match path.split_once('.') {
        None => {
            out.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = out
                .entry(head.to_string())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            if let JsonValue::Object(inner) = slot {
                insert_path(inner, rest, value);
            }
        }
    }
}
