//! Opaque continuation tokens for the history listing.
//!
//! A cursor is base64 over a JSON object `{"<sort field>": "<value>", "id": <row id>}`.
//! The value is always a string; `id` breaks ties between rows that share a
//! sort value and may be absent in cursors issued before it existed.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use memefeed_core::{CoreError, Meme, SortField};
use serde_json::{Map, Value};

const ID_KEY: &str = "id";

/// The value of a sort column, typed for binding.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Integer(i64),
    Timestamp(DateTime<Utc>),
}

impl SortValue {
    pub fn of(meme: &Meme, field: SortField) -> Self {
        match field {
            SortField::CreatedAt => SortValue::Timestamp(meme.created_at),
            SortField::RedditCreatedAt => SortValue::Timestamp(meme.reddit_created_at),
            SortField::Score => SortValue::Integer(meme.score),
            SortField::NumComments => SortValue::Integer(meme.num_comments),
        }
    }

    fn parse(field: SortField, raw: &str) -> Option<Self> {
        if field.is_timestamp() {
            parse_timestamp(raw).map(SortValue::Timestamp)
        } else {
            raw.trim().parse().ok().map(SortValue::Integer)
        }
    }

    fn to_cursor_string(&self) -> String {
        match self {
            SortValue::Integer(value) => value.to_string(),
            SortValue::Timestamp(value) => value.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.with_timezone(&Utc));
    }
    // Naive timestamps (no offset) are taken as UTC.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub field: SortField,
    pub value: SortValue,
    pub id: Option<i64>,
}

impl Cursor {
    /// Boundary just after `meme` in a listing sorted by `field`.
    pub fn after(meme: &Meme, field: SortField) -> Self {
        Self {
            field,
            value: SortValue::of(meme, field),
            id: Some(meme.id),
        }
    }

    pub fn encode(&self) -> String {
        let mut object = Map::new();
        object.insert(
            self.field.as_str().to_string(),
            Value::String(self.value.to_cursor_string()),
        );
        if let Some(id) = self.id {
            object.insert(ID_KEY.to_string(), Value::from(id));
        }
        STANDARD.encode(Value::Object(object).to_string())
    }

    /// Decodes a token for a listing sorted by `field`. Any malformation is
    /// reported as invalid input.
    pub fn decode(token: &str, field: SortField) -> Result<Self, CoreError> {
        let invalid = || CoreError::invalid_input("Invalid cursor");

        // Query-string decoding turns '+' into ' '.
        let token = token.trim().replace(' ', "+");
        let bytes = STANDARD.decode(token.as_bytes()).map_err(|_| invalid())?;
        let object: Map<String, Value> = serde_json::from_slice(&bytes).map_err(|_| invalid())?;

        let raw = match object.get(field.as_str()) {
            Some(Value::String(raw)) => raw.clone(),
            Some(Value::Number(raw)) => raw.to_string(),
            _ => return Err(invalid()),
        };
        let value = SortValue::parse(field, &raw).ok_or_else(invalid)?;

        let id = match object.get(ID_KEY) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_i64().ok_or_else(invalid)?),
        };

        Ok(Self { field, value, id })
    }
}
