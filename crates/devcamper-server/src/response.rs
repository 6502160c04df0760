use devcamper_core::Document;
use devcamper_storage::{PageResult, Pagination};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// Body shared by every endpoint: `{success, count?, pagination?, data, error}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    pub data: JsonValue,
    pub error: Option<String>,
}

impl Envelope {
    pub fn data(data: JsonValue) -> Self {
        Self {
            success: true,
            count: None,
            pagination: None,
            data,
            error: None,
        }
    }

    pub fn document(doc: Document) -> Self {
        Self::data(doc.into_json())
    }

    /// Delete responses carry an empty object.
    pub fn empty() -> Self {
        Self::data(JsonValue::Object(Map::new()))
    }

    /// Unpaginated list (radius search).
    pub fn items(items: Vec<JsonValue>) -> Self {
        let count = items.len();
        Self {
            count: Some(count),
            ..Self::data(JsonValue::Array(items))
        }
    }

    pub fn page(items: Vec<JsonValue>, pagination: Pagination) -> Self {
        Self {
            pagination: Some(pagination),
            ..Self::items(items)
        }
    }

    pub fn from_page(res: PageResult) -> Self {
        let items = res.items.into_iter().map(Document::into_json).collect();
        Self::page(items, res.pagination)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            count: None,
            pagination: None,
            data: JsonValue::Null,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devcamper_core::Page;
    use serde_json::json;

    #[test]
    fn list_envelope_shape() {
        let env = Envelope::page(
            vec![json!({"_id": "a"})],
            Pagination::compute(Page { page: 1, limit: 1 }, 2),
        );
        assert_eq!(
            serde_json::to_value(env).unwrap(),
            json!({
                "success": true,
                "count": 1,
                "pagination": {"total": 2, "next": {"page": 2, "limit": 1}},
                "data": [{"_id": "a"}],
                "error": null
            })
        );
    }

    #[test]
    fn error_and_empty_shapes() {
        assert_eq!(
            serde_json::to_value(Envelope::error("nope")).unwrap(),
            json!({"success": false, "data": null, "error": "nope"})
        );
        assert_eq!(
            serde_json::to_value(Envelope::empty()).unwrap(),
            json!({"success": true, "data": {}, "error": null})
        );
    }
}
