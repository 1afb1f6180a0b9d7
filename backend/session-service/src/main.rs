use actix_middleware::{Logging, MetricsMiddleware, SessionMiddleware};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crypto_core::TokenSigner;
use session_service::{
    config::Settings,
    db::{InMemoryUserRepository, PgUserRepository, UserRepository},
    routes,
    security::{InMemoryRevocationStore, RedisRevocationStore, RevocationStore},
    services::{spawn_revocation_pruner, AuthService},
    AppState, AuthError,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "session_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Session Service");

    let settings = Settings::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    let signer = TokenSigner::new(
        &settings.jwt.secret,
        settings.jwt.issuer.clone(),
        settings.jwt.ttl_seconds,
    )
    .context("Failed to initialize token signer")?;
    let signer = Arc::new(signer);

    let users: Arc<dyn UserRepository> = match &settings.database {
        Some(db) => {
            let pool = PgPoolOptions::new()
                .max_connections(db.max_connections)
                .acquire_timeout(Duration::from_secs(db.acquire_timeout_secs))
                .connect(&db.url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            info!(
                "Database pool initialized with {} max connections",
                db.max_connections
            );

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;
            info!("Database migrations completed");

            Arc::new(PgUserRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; users are kept in memory");
            Arc::new(InMemoryUserRepository::new())
        }
    };

    let revocations: Arc<dyn RevocationStore> = match &settings.redis {
        Some(redis) => {
            let store = RedisRevocationStore::connect(
                &redis.url,
                settings.jwt.ttl_seconds,
                Duration::from_millis(redis.response_timeout_ms),
            )
            .await
            .context("Failed to connect to Redis")?;
            info!("Redis revocation store initialized");
            Arc::new(store)
        }
        None => {
            warn!("REDIS_URL not set; revocations are kept in memory");
            Arc::new(InMemoryRevocationStore::new(settings.jwt.ttl_seconds))
        }
    };

    let auth = Arc::new(AuthService::new(
        users,
        revocations,
        signer,
        settings.policy.clone(),
    ));

    if let Some(seed) = &settings.seed_user {
        match auth.create_user(&seed.email, &seed.password).await {
            Ok(user) => info!(user_id = %user.id, "Seed user created"),
            Err(AuthError::EmailAlreadyExists) => info!("Seed user already present"),
            Err(e) => return Err(e).context("Failed to create seed user"),
        }
    }

    spawn_revocation_pruner(
        auth.clone(),
        Duration::from_secs(settings.policy.revocation_prune_interval_secs),
    );

    let state = AppState::new(auth.clone());
    let bind_addr = (settings.server.host.clone(), settings.server.port);
    info!("Listening on {}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        App::new()
            .wrap(SessionMiddleware::new(auth.clone()))
            .wrap(MetricsMiddleware)
            .wrap(Logging)
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(bind_addr)
    .context("Failed to bind HTTP server")?
    .run()
    .await
    .context("HTTP server error")?;

    info!("Session Service stopped");
    Ok(())
}
