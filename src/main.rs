use actix_web::{web, App, HttpServer};
use realtime_messaging_service::{
    config::{self, StorageBackend},
    db, error, logging,
    repository::{ChatRepository, InMemoryChatRepository, PgChatRepository},
    routes,
    services::{InMemoryUserDirectory, PgUserDirectory, UserDirectory},
    state::AppState,
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    let cfg = config::Config::from_env()?;
    logging::init_tracing(cfg.log_format);

    let (repo, users): (Arc<dyn ChatRepository>, Arc<dyn UserDirectory>) = match cfg.storage {
        StorageBackend::Postgres => {
            let database_url = cfg
                .database_url
                .as_deref()
                .ok_or_else(|| error::AppError::Config("DATABASE_URL missing".into()))?;
            let pool = db::init_pool(database_url, cfg.db_max_connections)
                .await
                .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
            db::run_migrations(&pool).await?;
            (
                Arc::new(PgChatRepository::new(pool.clone())),
                Arc::new(PgUserDirectory::new(pool)),
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage, data is lost on restart");
            (
                Arc::new(InMemoryChatRepository::new()),
                Arc::new(InMemoryUserDirectory::new()),
            )
        }
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    let state = AppState::new(cfg, repo, users)?;

    tracing::info!(%bind_addr, "starting realtime-messaging-service");

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind REST: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("REST server: {e}")))
}
