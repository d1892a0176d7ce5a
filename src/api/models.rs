// Read API response models (DTOs)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{Person, Show};

/// One page of results plus the size of the whole collection.
#[derive(Debug, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowDto {
    pub id: i64,
    pub name: String,
    pub genres: Vec<String>,
    pub premiered: Option<NaiveDate>,
    pub ended: Option<NaiveDate>,
    pub cast: Vec<CastMemberDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastMemberDto {
    pub id: i64,
    pub name: String,
    pub birthday: Option<NaiveDate>,
    pub deathday: Option<NaiveDate>,
    pub gender: Option<String>,
}

impl From<Person> for CastMemberDto {
    fn from(p: Person) -> Self {
        Self {
            id: p.id,
            name: p.name,
            birthday: p.birthday,
            deathday: p.deathday,
            gender: p.gender,
        }
    }
}

impl From<Show> for ShowDto {
    /// Cast is ordered youngest first; members without a birthday go last.
    fn from(show: Show) -> Self {
        let mut cast: Vec<CastMemberDto> = show.cast.into_iter().map(Into::into).collect();
        // None < Some, so a descending sort already puts unknown birthdays at the end.
        cast.sort_by(|a, b| b.birthday.cmp(&a.birthday).then(a.id.cmp(&b.id)));
        Self {
            id: show.id.get(),
            name: show.name,
            genres: show.genres,
            premiered: show.premiered,
            ended: show.ended,
            cast,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
