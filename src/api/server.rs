// API server implementation using actix-web

use crate::api::{middleware, routes};
use crate::database_ops::db::Db;
use crate::util::env::{env_opt, env_parse};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

pub struct ApiServer {
    pub host: String,
    pub port: u16,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Self {
        crate::util::env::init_env();
        Self {
            host: env_opt("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_parse("API_PORT", 8080u16),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Serve until `shutdown` fires, then drain in-flight requests and return.
    pub async fn run(self, db: Db, shutdown: CancellationToken) -> Result<()> {
        let bind_addr = self.bind_addr();
        tracing::info!(host = %self.host, port = %self.port, "api: starting read API");

        let db_data = web::Data::new(db);
        let server = HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            App::new()
                .app_data(db_data.clone())
                .wrap(logger)
                .wrap(compress)
                .configure(routes::configure_routes)
        })
        .disable_signals()
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run();

        let handle = server.handle();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            tracing::info!("api: shutdown");
            handle.stop(true).await;
        });

        server.await.context("HTTP server error")?;
        Ok(())
    }
}
