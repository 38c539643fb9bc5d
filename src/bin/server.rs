//! Resource server: loads resource declarations, connects to PostgreSQL and serves the resource routes.

use scoped_resource_sdk::{
    app_router, load_from_path, sql::TypeHints, AppState, PgExecutor, QueryExecutor, RegistryBuilder, ScopePolicy,
    Settings,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scoped_resource_sdk=info,resource_server=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    if settings.scope_policy == ScopePolicy::Disabled {
        tracing::warn!("SCOPE_ENFORCEMENT=disabled: every caller sees every row; run only for trusted jobs");
    }

    let config = load_from_path(&settings.resources_path).await?;
    let hints = TypeHints::new(config.column_types.clone());
    let registry = RegistryBuilder::new(config).build()?;
    tracing::info!(resources = registry.len(), path = %settings.resources_path.display(), "registry loaded");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .connect(&settings.database_url)
        .await?;
    let executor = PgExecutor::new(pool)
        .with_schema(settings.db_schema.clone())
        .with_type_hints(hints)
        .discover_type_hints(&registry.tables())
        .await?;
    let executor: Arc<dyn QueryExecutor> = Arc::new(executor);

    let state = AppState::new(registry, executor, settings.scope_policy, settings.execution_mode);
    let app = app_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(settings.request_timeout));

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        mode = ?settings.execution_mode,
        "resource server listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
