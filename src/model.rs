//! Domain types shared by the catalog client, the sync pipeline and the store.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Last-modified marker reported by the remote catalog. Only ever compared for equality.
pub type Marker = i64;

const GENRE_SEPARATOR: char = ',';

/// Remote identifier of a show. Queued work carries this wrapper, never a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShowId(i64);

impl ShowId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ShowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ShowId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Show {
    pub id: ShowId,
    pub name: String,
    pub genres: Vec<String>,
    pub premiered: Option<NaiveDate>,
    pub ended: Option<NaiveDate>,
    pub updated: Marker,
    pub cast: Vec<Person>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub birthday: Option<NaiveDate>,
    pub deathday: Option<NaiveDate>,
    pub gender: Option<String>,
}

/// Encodes a genre list into the single text column used by the `shows` table.
pub fn join_genres(genres: &[String]) -> String {
    genres
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .collect::<Vec<_>>()
        .join(&GENRE_SEPARATOR.to_string())
}

pub fn split_genres(raw: &str) -> Vec<String> {
    raw.split(GENRE_SEPARATOR)
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}
