// HTTP request handlers for the read API

use crate::api::models::*;
use crate::database_ops::db::Db;
use crate::database_ops::shows;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

pub const PAGE_SIZE: u32 = 10;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

impl PageQuery {
    /// 1-based page; missing, zero and negative values all mean the first page.
    pub fn page(&self) -> u32 {
        self.page
            .unwrap_or(1)
            .clamp(1, i64::from(u32::MAX)) as u32
    }
}

/// Health check endpoint
pub async fn health_check(db: web::Data<Db>) -> HttpResponse {
    let database = if db.ping().await {
        "connected"
    } else {
        "disconnected"
    };
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        database: database.to_string(),
    })
}

/// Paginated list of shows with their cast
pub async fn list_shows(query: web::Query<PageQuery>, db: web::Data<Db>) -> HttpResponse {
    let page = query.page();
    match read_page(&db, page).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => {
            tracing::error!(page, error = ?e, "failed to read shows page");
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "failed to load shows".to_string(),
            })
        }
    }
}

pub async fn read_page(db: &Db, page: u32) -> anyhow::Result<PageResult<ShowDto>> {
    let total_count = shows::count_shows(db).await?;
    let items = shows::shows_page(db, page, PAGE_SIZE)
        .await?
        .into_iter()
        .map(ShowDto::from)
        .collect();
    Ok(PageResult { items, total_count })
}
