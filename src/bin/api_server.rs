// HTTP admin server for the Asbis catalog sync

use anyhow::Result;
use asbis_sync::api::ApiServer;
use asbis_sync::database_ops::db::Db;
use asbis_sync::util::env as env_util;

#[actix_web::main]
async fn main() -> Result<()> {
    env_util::init_env();
    asbis_sync::tracing::init_tracing(asbis_sync::tracing::DEFAULT_FILTER)?;

    tracing::info!("Initializing asbis sync API server");

    let server = ApiServer::from_env()?;
    env_util::preflight_check(
        "api_server",
        &["API_SECRET"],
        &["API_HOST", "API_PORT", "ALLOWED_ORIGINS", "DATABASE_URL", "ASBIS_API_URL"],
    )?;

    let database_url = env_util::db_url()?;
    let max_connections: u32 = env_util::env_parse("DB_MAX_CONNS", 10u32);
    let db = Db::connect(&database_url, max_connections).await?;
    tracing::info!("Database connected successfully");

    let state = ApiServer::build_state(db)?;
    server.run(state).await?;

    Ok(())
}
