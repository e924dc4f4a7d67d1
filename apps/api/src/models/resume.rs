use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;

/// Contact block of a parsed resume. Every field is optional because the
/// parser routinely fails to find some of them.
///
/// Decoding is lenient: model replies and older cached rows use `null` for
/// lists and bare numbers for phones, and neither should make a result
/// undecodable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactInfo {
    #[serde(deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub phone: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub linkedin: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub github: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub website: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub location: Option<String>,
    #[serde(deserialize_with = "lenient_links")]
    pub links: Vec<String>,
}

/// Strings pass through, other scalars are rendered (`5550100199` becomes
/// `"5550100199"`), `null` and empty containers are absent. Non-empty
/// containers are kept as their JSON text so they still count as present.
fn text_of(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Array(ref items) if items.is_empty() => None,
        Value::Object(ref fields) if fields.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text_of(Value::deserialize(deserializer)?))
}

// A lone string is a one-element list; anything else that is not a list is empty.
fn lenient_links<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(text_of).collect(),
        Value::String(link) if !link.trim().is_empty() => vec![link],
        _ => Vec::new(),
    })
}

/// Structured output of resume parsing.
///
/// `contact` is the only part the cache reasons about. The remaining sections
/// (summary, experience, education, ...) are carried through untouched in
/// `sections` so a cached result round-trips exactly what the parser produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedResume {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactInfo>,
    #[serde(flatten)]
    pub sections: Map<String, Value>,
}

impl ParsedResume {
    pub fn with_contact(contact: ContactInfo) -> Self {
        Self {
            contact: Some(contact),
            sections: Map::new(),
        }
    }
}

/// Row of the `resume_parse_cache` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeCacheRow {
    pub fingerprint: String,
    pub owner_id: Uuid,
    pub result: Value,
    pub hit_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}
