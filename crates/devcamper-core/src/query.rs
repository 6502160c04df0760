use crate::model::CREATED_AT_FIELD;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 25;
pub const MAX_LIMIT: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }

    pub fn operator(&self) -> &'static str {
        match self {
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(JsonValue),
    Cmp { op: CmpOp, value: JsonValue },
    In(Vec<JsonValue>),
    /// Spherical containment. `center` is `[longitude, latitude]`, `radius` is in radians.
    WithinSphere { center: [f64; 2], radius: f64 },
}

impl Condition {
    fn operator(&self) -> &'static str {
        match self {
            Self::Eq(_) => "$eq",
            Self::Cmp { op, .. } => op.operator(),
            Self::In(_) => "$in",
            Self::WithinSphere { .. } => "$geoWithin",
        }
    }

    fn operand(&self) -> JsonValue {
        match self {
            Self::Eq(v) | Self::Cmp { value: v, .. } => v.clone(),
            Self::In(vs) => JsonValue::Array(vs.clone()),
            Self::WithinSphere { center, radius } => {
                json!({ "$centerSphere": [[center[0], center[1]], radius] })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterTerm {
    pub field: String,
    pub condition: Condition,
}

/// Conjunction of filter terms. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub terms: Vec<FilterTerm>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: JsonValue) -> Self {
        Self::all().with_term(field, Condition::Eq(value))
    }

    pub fn with_term(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.terms.push(FilterTerm {
            field: field.into(),
            condition,
        });
        self
    }

    pub fn and(mut self, other: Filter) -> Self {
        self.terms.extend(other.terms);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|t| t.field.as_str())
    }

    /// Canonical document-store form, e.g. `{"averageCost":{"$lte":"10000"}}`.
    /// Object literals are wrapped in `$eq` so a literal key can never read
    /// as an operator.
    pub fn to_json(&self) -> JsonValue {
        let mut out = Map::new();
        for term in &self.terms {
            let plain_eq = match &term.condition {
                Condition::Eq(v) if !v.is_object() => Some(v.clone()),
                _ => None,
            };
            let alone = self.terms.iter().filter(|t| t.field == term.field).count() == 1;
            match (plain_eq, alone) {
                (Some(v), true) => {
                    out.insert(term.field.clone(), v);
                }
                _ => {
                    let slot = out
                        .entry(term.field.clone())
                        .or_insert_with(|| JsonValue::Object(Map::new()));
                    if let JsonValue::Object(ops) = slot {
                        ops.insert(
                            term.condition.operator().to_string(),
                            term.condition.operand(),
                        );
                    }
                }
            }
        }
        JsonValue::Object(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Projection {
    #[default]
    All,
    Fields(Vec<String>),
}

impl Projection {
    pub fn includes(&self, field: &str) -> bool {
        match self {
            Self::All => true,
            Self::Fields(fs) => fs.iter().any(|f| f == field),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

pub fn default_sort() -> Vec<SortKey> {
    vec![SortKey::desc(CREATED_AT_FIELD)]
}

/// Page number (1-based) and page size. Also used as the `next`/`prev`
/// descriptor in pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u64,
    pub limit: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    pub fn start_index(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn end_index(&self) -> u64 {
        self.page.saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructuredQuery {
    pub filter: Filter,
    pub projection: Projection,
    pub sort: Vec<SortKey>,
    pub page: Page,
}

impl Default for StructuredQuery {
    fn default() -> Self {
        Self {
            filter: Filter::all(),
            projection: Projection::All,
            sort: default_sort(),
            page: Page::default(),
        }
    }
}
