//! Typed views over the three hierarchy collections.
//!
//! Documents are written with camelCase keys. Reading first folds legacy
//! snake_case keys onto their camelCase counterparts; when a document carries
//! both spellings the camelCase value wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    error::{StoreError, StoreResult},
    store::{Collection, Document},
};

pub fn to_document<T: Serialize>(value: &T, collection: Collection) -> StoreResult<Document> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::malformed(
            collection.as_str(),
            format!("expected an object, got {other}"),
        )),
        Err(err) => Err(StoreError::malformed(collection.as_str(), err.to_string())),
    }
}

const LEGACY_KEYS: &[(&str, &str)] = &[
    ("owner_scope_id", "ownerScopeId"),
    ("region_id", "regionId"),
    ("sub_area_id", "subAreaId"),
    ("city_id", "cityId"),
    ("state_code", "stateCode"),
    ("residents_count", "residentsCount"),
    ("resident_name", "residentName"),
    ("google_maps_link", "mapLink"),
    ("waze_link", "navLink"),
    ("is_active", "isActive"),
    ("is_deaf", "isDeaf"),
    ("is_minor", "isMinor"),
    ("is_student", "isStudent"),
    ("is_neurodivergent", "isNeurodivergent"),
    ("visit_status", "visitStatus"),
    ("sort_order", "sortOrder"),
    ("created_at", "createdAt"),
    ("updated_at", "updatedAt"),
];

pub fn fold_legacy_keys(mut document: Document) -> Document {
    for (legacy, current) in LEGACY_KEYS {
        if let Some(value) = document.remove(*legacy) {
            document.entry(current.to_string()).or_insert(value);
        }
    }
    document
}

pub fn from_document<T: DeserializeOwned>(
    document: Document,
    collection: Collection,
) -> StoreResult<T> {
    serde_json::from_value(Value::Object(fold_legacy_keys(document)))
        .map_err(|err| StoreError::malformed(collection.as_str(), err.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state_code: String,
    pub owner_scope_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubArea {
    pub id: String,
    pub name: String,
    pub region_id: String,
    pub owner_scope_id: String,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_residents() -> i64 {
    crate::row::DEFAULT_RESIDENTS_COUNT
}

fn default_visit_status() -> String {
    crate::row::DEFAULT_VISIT_STATUS.to_string()
}

/// Everything the importer writes for an address; identity and timestamps live on [`LeafRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafFields {
    pub owner_scope_id: String,
    pub sub_area_id: String,
    pub city_id: String,
    pub street: String,
    pub residents_count: i64,
    pub resident_name: Option<String>,
    pub map_link: Option<String>,
    pub nav_link: Option<String>,
    pub is_active: bool,
    pub is_deaf: bool,
    pub is_minor: bool,
    pub is_student: bool,
    pub is_neurodivergent: bool,
    pub gender: Option<String>,
    pub observations: Option<String>,
    pub visit_status: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafRecord {
    pub id: String,
    #[serde(default)]
    pub owner_scope_id: String,
    pub sub_area_id: String,
    #[serde(default)]
    pub city_id: String,
    #[serde(default)]
    pub street: String,
    #[serde(default = "default_residents")]
    pub residents_count: i64,
    #[serde(default)]
    pub resident_name: Option<String>,
    #[serde(default)]
    pub map_link: Option<String>,
    #[serde(default)]
    pub nav_link: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_deaf: bool,
    #[serde(default)]
    pub is_minor: bool,
    #[serde(default)]
    pub is_student: bool,
    #[serde(default)]
    pub is_neurodivergent: bool,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default = "default_visit_status")]
    pub visit_status: String,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LeafRecord {
    pub fn new(id: String, fields: LeafFields, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_scope_id: fields.owner_scope_id,
            sub_area_id: fields.sub_area_id,
            city_id: fields.city_id,
            street: fields.street,
            residents_count: fields.residents_count,
            resident_name: fields.resident_name,
            map_link: fields.map_link,
            nav_link: fields.nav_link,
            is_active: fields.is_active,
            is_deaf: fields.is_deaf,
            is_minor: fields.is_minor,
            is_student: fields.is_student,
            is_neurodivergent: fields.is_neurodivergent,
            gender: fields.gender,
            observations: fields.observations,
            visit_status: fields.visit_status,
            sort_order: fields.sort_order,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Names of the change-detection fields whose value differs from `fields`.
    ///
    /// Only resident name, map link, gender and the active flag are compared;
    /// a row that changes nothing else but, say, `observations` is reported as
    /// unchanged.
    pub fn watched_changes(&self, fields: &LeafFields) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.resident_name != fields.resident_name {
            changed.push("residentName");
        }
        if self.map_link != fields.map_link {
            changed.push("mapLink");
        }
        if self.gender != fields.gender {
            changed.push("gender");
        }
        if self.is_active != fields.is_active {
            changed.push("isActive");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> LeafFields {
        LeafFields {
            owner_scope_id: "s1".into(),
            sub_area_id: "t1".into(),
            city_id: "c1".into(),
            street: "Elm Street".into(),
            residents_count: 1,
            resident_name: Some("Ned".into()),
            map_link: None,
            nav_link: None,
            is_active: true,
            is_deaf: false,
            is_minor: false,
            is_student: false,
            is_neurodivergent: false,
            gender: None,
            observations: None,
            visit_status: "not_contacted".into(),
            sort_order: 0,
        }
    }

    #[test]
    fn legacy_leaf_document_deserializes() {
        let doc = json!({
            "id": "a1",
            "sub_area_id": "t1",
            "city_id": "c1",
            "street": "Elm Street",
            "resident_name": "Ned",
            "google_maps_link": "https://maps/1",
            "is_active": false
        });
        let record: LeafRecord =
            from_document(doc.as_object().cloned().unwrap(), Collection::LeafRecords).unwrap();
        assert_eq!(record.sub_area_id, "t1");
        assert_eq!(record.map_link.as_deref(), Some("https://maps/1"));
        assert!(!record.is_active);
        assert_eq!(record.residents_count, 1);
        assert_eq!(record.visit_status, "not_contacted");
    }

    #[test]
    fn current_spelling_wins_over_stale_legacy_key() {
        let doc = json!({
            "id": "a1",
            "subAreaId": "t2",
            "sub_area_id": "t1",
            "street": "Elm Street"
        });
        let record: LeafRecord =
            from_document(doc.as_object().cloned().unwrap(), Collection::LeafRecords).unwrap();
        assert_eq!(record.sub_area_id, "t2");
    }

    #[test]
    fn watched_changes_ignore_unwatched_fields() {
        let now = Utc::now();
        let record = LeafRecord::new("a1".into(), fields(), now);
        let mut candidate = fields();
        candidate.sort_order = 9;
        candidate.observations = Some("new note".into());
        assert!(record.watched_changes(&candidate).is_empty());

        candidate.gender = Some("F".into());
        candidate.is_active = false;
        assert_eq!(record.watched_changes(&candidate), vec!["gender", "isActive"]);
    }

    #[test]
    fn documents_use_camel_case_keys() {
        let region = Region {
            id: "r1".into(),
            name: "Springfield".into(),
            state_code: "IL".into(),
            owner_scope_id: "s1".into(),
        };
        let doc = to_document(&region, Collection::Regions).unwrap();
        assert_eq!(doc["stateCode"], json!("IL"));
        assert_eq!(doc["ownerScopeId"], json!("s1"));
    }

    #[test]
    fn malformed_document_reports_collection() {
        let err = from_document::<SubArea>(Document::new(), Collection::SubAreas).unwrap_err();
        assert!(err.to_string().contains("subAreas"));
    }
}
