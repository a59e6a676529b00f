//! CourseHub - A course catalog and user directory service

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursehub::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{
            SqlxCategoryRepository, SqlxCourseRepository, SqlxSessionRepository,
            SqlxUserRepository,
        },
    },
    export::ExportConfig,
    services::{
        category::CategoryService, course::CourseService, nonce::NonceService, user::UserService,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursehub=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CourseHub...");

    // Load configuration
    let config = Config::load(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Create repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let course_repo = SqlxCourseRepository::boxed(pool.clone());
    let category_repo = SqlxCategoryRepository::boxed(pool.clone());

    // Initialize services
    let nonce_service = Arc::new(NonceService::new(&config.nonce));
    let user_service = Arc::new(UserService::new(user_repo.clone(), session_repo));
    let course_service = Arc::new(CourseService::new(course_repo, nonce_service.clone()));
    let category_service = Arc::new(CategoryService::new(category_repo));
    let export_config = Arc::new(ExportConfig::new(&config.export));

    // Build application state
    let state = AppState {
        pool: pool.clone(),
        user_service,
        user_repo,
        course_service,
        category_service,
        nonce_service,
        export_config,
    };

    // Periodic session cleanup (runs hourly)
    {
        let cleanup_service = state.user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));
            loop {
                interval.tick().await;
                match cleanup_service.cleanup_expired_sessions().await {
                    Ok(count) if count > 0 => {
                        tracing::debug!(count, "Cleaned up expired sessions")
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
            }
        });
    }

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
