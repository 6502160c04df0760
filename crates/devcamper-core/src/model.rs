use crate::geo::GeoPoint;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use ulid::Ulid;

pub type DocumentId = String; // ULID string unless supplied by the caller
pub type Fields = Map<String, JsonValue>;

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT_FIELD: &str = "createdAt";

pub const BOOTCAMPS: &str = "bootcamps";
pub const COURSES: &str = "courses";

/// A stored document. `seq` is the store-wide insertion counter and is never
/// exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub collection: String,
    pub seq: u64,
    pub fields: Fields,
}

impl Document {
    /// Fills `_id` and `createdAt` when the caller did not supply them.
    pub fn new_with_seq(collection: &str, mut fields: Fields, seq: u64) -> Self {
        let has_id = matches!(fields.get(ID_FIELD), Some(JsonValue::String(s)) if !s.is_empty());
        if !has_id {
            fields.insert(ID_FIELD.into(), JsonValue::String(Ulid::new().to_string()));
        }
        if !fields.contains_key(CREATED_AT_FIELD) {
            fields.insert(CREATED_AT_FIELD.into(), JsonValue::String(now_rfc3339()));
        }
        Self {
            collection: collection.to_string(),
            seq,
            fields,
        }
    }

    pub fn id(&self) -> &str {
        self.fields
            .get(ID_FIELD)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    /// Shallow merge of `patch` into the document. `_id` and `createdAt` are
    /// immutable once stored.
    pub fn merge(&mut self, patch: Fields) {
        for (k, v) in patch {
            if k == ID_FIELD || k == CREATED_AT_FIELD {
                continue;
            }
            self.fields.insert(k, v);
        }
    }

    pub fn into_json(self) -> JsonValue {
        JsonValue::Object(self.fields)
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// GeoJSON point stored on bootcamps under `location`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(rename = "type")]
    pub kind: String,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zipcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Location {
    pub fn point(center: GeoPoint) -> Self {
        Self {
            kind: "Point".into(),
            coordinates: center.lng_lat(),
            formatted_address: None,
            street: None,
            city: None,
            state: None,
            zipcode: None,
            country: None,
        }
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::from_lng_lat(self.coordinates)
    }
}
