//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, InMemoryDatabase},
    config::Config,
    error::ApiError,
    web::{self, auth::hash_password, rest::ApiDoc, state::AppState},
};
use axum::{extract::DefaultBodyLimit, Router};
use blood_alert_core::domain::Role;
use blood_alert_core::ports::{DatabaseService, PortError, SystemClock};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let db: Arc<dyn DatabaseService> = if config.uses_memory_store() {
        warn!("DATABASE_URL=memory: using the in-process store, data is lost on exit");
        Arc::new(InMemoryDatabase::new())
    } else {
        info!("Connecting to database...");
        let db_pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await?;
        let db_adapter = DbAdapter::new(db_pool);
        info!("Running database migrations...");
        db_adapter.run_migrations().await?;
        info!("Database migrations complete.");
        Arc::new(db_adapter)
    };

    // --- 3. Ensure the bootstrap administrator exists ---
    if let Some((email, password)) = &config.bootstrap_admin {
        let hashed = hash_password(password)
            .map_err(|e| ApiError::Internal(format!("Failed to hash admin password: {}", e)))?;
        match db
            .create_user_with_email(&email.trim().to_lowercase(), &hashed, Role::Admin)
            .await
        {
            Ok(user) => info!(user_id = %user.user_id, "Bootstrap administrator created"),
            Err(PortError::Conflict(_)) => info!("Bootstrap administrator already exists"),
            Err(e) => return Err(e.into()),
        }
    }

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(db, Arc::new(SystemClock), config.clone()));

    // --- 5. Create the Web Router ---
    let api_router = web::router(app_state).layer(DefaultBodyLimit::max(1024 * 1024));

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
