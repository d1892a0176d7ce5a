//! Wire payloads of the remote catalog.
//!
//! Field names are matched case-insensitively: keys are folded to lowercase before the
//! payload is handed to serde, so `Name`, `NAME` and `name` all land in the same field.
use chrono::NaiveDate;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::model::{Person, Show, ShowId};

#[derive(Debug, Clone, Deserialize)]
pub struct ShowPayload {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub premiered: Option<NaiveDate>,
    #[serde(default)]
    pub ended: Option<NaiveDate>,
    #[serde(default)]
    pub updated: Option<i64>,
    #[serde(default, rename = "_embedded")]
    pub embedded: Option<EmbeddedPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddedPayload {
    #[serde(default)]
    pub cast: Vec<CastPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CastPayload {
    pub person: PersonPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonPayload {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub deathday: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl ShowPayload {
    /// Converts into the domain aggregate. The upstream cast can list the same person more
    /// than once (one entry per character played); only the first entry per person is kept.
    pub fn into_show(self) -> Show {
        let cast = self
            .embedded
            .map(|e| e.cast)
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.person)
            .unique_by(|p| p.id)
            .map(PersonPayload::into_person)
            .collect();
        Show {
            id: ShowId::new(self.id),
            name: self.name.unwrap_or_default(),
            genres: self.genres.unwrap_or_default(),
            premiered: self.premiered,
            ended: self.ended,
            updated: self.updated.unwrap_or_default(),
            cast,
        }
    }
}

impl PersonPayload {
    fn into_person(self) -> Person {
        Person {
            id: self.id,
            name: self.name.unwrap_or_default(),
            birthday: self.birthday,
            deathday: self.deathday,
            gender: self.gender.filter(|g| !g.trim().is_empty()),
        }
    }
}

/// Parses `body` as `T`, ignoring the case of every object key.
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, serde_json::Error> {
    let value: Value = serde_json::from_str(body)?;
    serde_json::from_value(fold_keys(value))
}

fn fold_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_lowercase(), fold_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(fold_keys).collect()),
        other => other,
    }
}
