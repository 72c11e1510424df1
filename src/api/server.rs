// Admin HTTP server for the vendor sync

use crate::api::state::AppState;
use crate::api::auth::BearerAuth;
use crate::api::{middleware, routes};
use crate::database_ops::asbis::{AsbisClient, AsbisConfig};
use crate::database_ops::catalog::PgCatalogStore;
use crate::database_ops::db::Db;
use crate::sync::ledger::PgSyncLedger;
use crate::util::env::{env_opt, env_parse, env_req};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub api_secret: String,
    pub allowed_origins: Vec<String>,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        crate::util::env::init_env();

        let host = env_opt("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match env_opt("API_PORT") {
            Some(raw) => raw.parse().context("Invalid API_PORT")?,
            None => 8080,
        };
        let api_secret = env_req("API_SECRET")?;
        let allowed_origins = middleware::parse_origins(
            &env_opt("ALLOWED_ORIGINS")
                .unwrap_or_else(|| "http://localhost:3000,http://localhost:8000".to_string()),
        );

        Ok(Self {
            host,
            port,
            api_secret,
            allowed_origins,
        })
    }

    /// Wire the Postgres-backed store, ledger and vendor client.
    pub fn build_state(db: Db) -> Result<AppState> {
        let vendor = AsbisClient::new(AsbisConfig::from_env())?;
        Ok(AppState::new(
            Arc::new(vendor),
            Arc::new(PgCatalogStore::new(db.clone())),
            Arc::new(PgSyncLedger::new(db.clone())),
            Some(db),
        ))
    }

    /// Start the HTTP server
    pub async fn run(self, state: AppState) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);
        let workers = env_parse("API_WORKERS", 2usize).max(1);

        tracing::info!(
            host = %self.host,
            port = %self.port,
            workers,
            "Starting asbis sync API server"
        );

        let state = web::Data::new(state);
        let auth = BearerAuth::new(self.api_secret);
        let allowed_origins = self.allowed_origins;

        HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .wrap(auth.clone())
                .wrap(middleware::cors(&allowed_origins))
                .wrap(middleware::compression())
                .wrap(middleware::access_log())
                .configure(routes::configure_routes)
        })
        .workers(workers)
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}
