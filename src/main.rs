use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::{App, HttpServer, cookie::Key, middleware, web};
use std::sync::Arc;

use crewdesk::config::{Config, StoreBackend};
use crewdesk::db;
use crewdesk::handlers;
use crewdesk::models::approval::DraftRegistry;
use crewdesk::store::{DocumentStore, MemoryStore, PgStore};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config = Config::from_env().map_err(|e| {
        log::error!("Invalid configuration: {e}");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;

    let store: Arc<dyn DocumentStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config.database_url.as_deref().unwrap_or_default();
            let pool = db::init_pool(url, config.db_max_connections)
                .await
                .map_err(std::io::Error::other)?;
            db::run_migrations(&pool).await.map_err(std::io::Error::other)?;
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            log::warn!("Using in-memory document store (data lost on restart)");
            Arc::new(MemoryStore::new())
        }
    };
    let store = web::Data::from(store);
    let drafts = web::Data::new(DraftRegistry::new());

    // Session encryption key: load from SESSION_KEY for sessions that survive restarts
    let secret_key = match config.session_key.as_deref() {
        Some(val) if val.len() >= 64 => {
            log::info!("Using SESSION_KEY from environment");
            Key::from(val.as_bytes())
        }
        Some(val) => {
            log::warn!("SESSION_KEY too short ({} bytes, need 64+), generating random key", val.len());
            Key::generate()
        }
        None => {
            log::warn!("No SESSION_KEY set, generating random key (sessions lost on restart)");
            Key::generate()
        }
    };

    log::info!("Starting server at http://{}", config.bind_addr);

    let cookie_secure = config.cookie_secure;
    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(
            CookieSessionStore::default(),
            secret_key.clone(),
        )
        .cookie_secure(cookie_secure)
        .cookie_http_only(true)
        .build();

        App::new()
            .wrap(session_mw)
            .wrap(middleware::Logger::default())
            .app_data(store.clone())
            .app_data(drafts.clone())
            .service(web::scope("/api/v1").configure(handlers::api_v1::configure))
            .default_service(web::to(|| async {
                actix_web::HttpResponse::NotFound()
                    .json(serde_json::json!({ "error": "Not found", "kind": "not_found" }))
            }))
    })
    .bind(config.bind_addr.as_str())?
    .run()
    .await
}
