//! Show aggregate persistence: transactional upsert-with-cast, bulk upsert and reads.
use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

use super::db::Db;
use crate::model::{join_genres, split_genres, Marker, Person, Show, ShowId};
use crate::sync::ShowStore;

/// Write transactions hold the database write lock from their first statement, so a
/// read-then-write never has to upgrade a WAL snapshot another connection made stale.
const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(sqlx::FromRow)]
struct ShowRow {
    id: i64,
    name: String,
    genres: String,
    premiered: Option<NaiveDate>,
    ended: Option<NaiveDate>,
    updated: i64,
}

impl ShowRow {
    fn into_show(self, cast: Vec<Person>) -> Show {
        Show {
            id: ShowId::new(self.id),
            name: self.name,
            genres: split_genres(&self.genres),
            premiered: self.premiered,
            ended: self.ended,
            updated: self.updated,
            cast,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CastRow {
    show_id: i64,
    id: i64,
    name: String,
    birthday: Option<NaiveDate>,
    deathday: Option<NaiveDate>,
    gender: Option<String>,
}

/// Creates or updates `show` and replaces its cast links, all in one transaction.
///
/// Cast people are upserted by id (updated in place when they already exist, possibly
/// through another show). Every existing link of the show is then removed and the new
/// set linked, so nothing from a previous version of the cast survives. Any failure
/// rolls the whole write back.
#[instrument(skip(db, show), fields(show_id = %show.id, cast = show.cast.len()))]
pub async fn upsert_show_with_cast(db: &Db, show: &Show) -> Result<UpsertOutcome> {
    let mut tx = db.pool.begin_with(BEGIN_WRITE).await?;

    let outcome = if show_exists(&mut *tx, show.id).await? {
        update_show(&mut *tx, show).await?;
        UpsertOutcome::Updated
    } else {
        insert_show(&mut *tx, show).await?;
        UpsertOutcome::Created
    };

    upsert_people(&mut *tx, &show.cast).await?;

    sqlx::query("DELETE FROM show_cast WHERE show_id = ?")
        .bind(show.id.get())
        .execute(&mut *tx)
        .await?;
    link_cast(&mut *tx, show.id, &show.cast).await?;

    tx.commit().await?;
    debug!(?outcome, "show upserted");
    Ok(outcome)
}

/// Creates or updates a batch of shows in one transaction. Cast is left untouched.
#[instrument(skip(db, shows), fields(count = shows.len()))]
pub async fn upsert_shows(db: &Db, shows: &[Show]) -> Result<usize> {
    if shows.is_empty() {
        return Ok(0);
    }
    let mut tx = db.pool.begin_with(BEGIN_WRITE).await?;

    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT id FROM shows WHERE id IN (");
    {
        let mut ids = qb.separated(", ");
        for show in shows {
            ids.push_bind(show.id.get());
        }
    }
    qb.push(")");
    let mut existing: HashSet<i64> = qb
        .build_query_scalar::<i64>()
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

    for show in shows {
        if existing.contains(&show.id.get()) {
            update_show(&mut *tx, show).await?;
        } else {
            insert_show(&mut *tx, show).await?;
            existing.insert(show.id.get());
        }
    }

    tx.commit().await?;
    Ok(shows.len())
}

/// `{id: marker}` for every stored show.
#[instrument(skip(db))]
pub async fn last_updated_markers(db: &Db) -> Result<HashMap<ShowId, Marker>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as("SELECT id, updated FROM shows")
        .fetch_all(&db.pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(id, updated)| (ShowId::new(id), updated))
        .collect())
}

/// Highest stored show id, 0 when the table is empty.
pub async fn last_show_id(db: &Db) -> Result<i64> {
    let id: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM shows")
        .fetch_one(&db.pool)
        .await?;
    Ok(id)
}

pub async fn count_shows(db: &Db) -> Result<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shows")
        .fetch_one(&db.pool)
        .await?;
    Ok(total)
}

/// One page of shows ordered by id, each with its cast. `page` is 1-based.
#[instrument(skip(db))]
pub async fn shows_page(db: &Db, page: u32, page_size: u32) -> Result<Vec<Show>> {
    let offset = i64::from(page.max(1) - 1) * i64::from(page_size);
    let rows: Vec<ShowRow> = sqlx::query_as(
        "SELECT id, name, genres, premiered, ended, updated FROM shows ORDER BY id LIMIT ? OFFSET ?",
    )
    .bind(i64::from(page_size))
    .bind(offset)
    .fetch_all(&db.pool)
    .await?;
    with_cast(db, rows).await
}

pub async fn find_show(db: &Db, id: ShowId) -> Result<Option<Show>> {
    let row: Option<ShowRow> = sqlx::query_as(
        "SELECT id, name, genres, premiered, ended, updated FROM shows WHERE id = ?",
    )
    .bind(id.get())
    .fetch_optional(&db.pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(with_cast(db, vec![row]).await?.pop())
}

async fn with_cast(db: &Db, rows: Vec<ShowRow>) -> Result<Vec<Show>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "SELECT sc.show_id, p.id, p.name, p.birthday, p.deathday, p.gender \
         FROM show_cast sc JOIN people p ON p.id = sc.person_id \
         WHERE sc.show_id IN (",
    );
    {
        let mut ids = qb.separated(", ");
        for row in &rows {
            ids.push_bind(row.id);
        }
    }
    qb.push(") ORDER BY sc.show_id, p.id");
    let cast_rows: Vec<CastRow> = qb.build_query_as().fetch_all(&db.pool).await?;

    let mut cast_by_show: HashMap<i64, Vec<Person>> = HashMap::new();
    for c in cast_rows {
        cast_by_show.entry(c.show_id).or_default().push(Person {
            id: c.id,
            name: c.name,
            birthday: c.birthday,
            deathday: c.deathday,
            gender: c.gender,
        });
    }
    Ok(rows
        .into_iter()
        .map(|row| {
            let cast = cast_by_show.remove(&row.id).unwrap_or_default();
            row.into_show(cast)
        })
        .collect())
}

async fn show_exists(conn: &mut SqliteConnection, id: ShowId) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM shows WHERE id = ?)")
        .bind(id.get())
        .fetch_one(&mut *conn)
        .await?;
    Ok(exists)
}

async fn insert_show(conn: &mut SqliteConnection, show: &Show) -> Result<()> {
    sqlx::query(
        "INSERT INTO shows (id, name, genres, premiered, ended, updated) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(show.id.get())
    .bind(&show.name)
    .bind(join_genres(&show.genres))
    .bind(show.premiered)
    .bind(show.ended)
    .bind(show.updated)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_show(conn: &mut SqliteConnection, show: &Show) -> Result<()> {
    sqlx::query(
        "UPDATE shows SET name = ?, genres = ?, premiered = ?, ended = ?, updated = ? WHERE id = ?",
    )
    .bind(&show.name)
    .bind(join_genres(&show.genres))
    .bind(show.premiered)
    .bind(show.ended)
    .bind(show.updated)
    .bind(show.id.get())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_people(conn: &mut SqliteConnection, people: &[Person]) -> Result<()> {
    if people.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("INSERT INTO people (id, name, birthday, deathday, gender) ");
    qb.push_values(people, |mut b, p| {
        b.push_bind(p.id)
            .push_bind(p.name.clone())
            .push_bind(p.birthday)
            .push_bind(p.deathday)
            .push_bind(p.gender.clone());
    });
    qb.push(
        " ON CONFLICT (id) DO UPDATE SET name = excluded.name, \
                                         birthday = excluded.birthday, \
                                         deathday = excluded.deathday, \
                                         gender = excluded.gender",
    );
    qb.build().execute(&mut *conn).await?;
    Ok(())
}

async fn link_cast(conn: &mut SqliteConnection, show_id: ShowId, people: &[Person]) -> Result<()> {
    if people.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("INSERT INTO show_cast (show_id, person_id) ");
    qb.push_values(people, |mut b, p| {
        b.push_bind(show_id.get()).push_bind(p.id);
    });
    qb.push(" ON CONFLICT DO NOTHING");
    qb.build().execute(&mut *conn).await?;
    Ok(())
}

#[async_trait::async_trait]
impl ShowStore for Db {
    async fn last_updated_markers(&self) -> Result<HashMap<ShowId, Marker>> {
        last_updated_markers(self).await
    }

    async fn upsert_show_with_cast(&self, show: &Show) -> Result<UpsertOutcome> {
        upsert_show_with_cast(self, show).await
    }

    async fn upsert_shows(&self, shows: &[Show]) -> Result<usize> {
        upsert_shows(self, shows).await
    }

    async fn last_show_id(&self) -> Result<i64> {
        last_show_id(self).await
    }
}
