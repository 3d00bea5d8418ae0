use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use fieldday_server::config::Config;
use fieldday_server::lifecycle::LifecycleScheduler;
use fieldday_server::moderation::{HttpClassifier, ModerationWorker};
use fieldday_server::routes::{create_routes, AppState};
use fieldday_server::store::{EventStore, PgEventStore};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let store = PgEventStore::new(pool);
    let shared_store: Arc<dyn EventStore> = Arc::new(store.clone());

    let classifier = Arc::new(HttpClassifier::new(
        config.classifier.url.clone(),
        config.classifier.call_timeout,
    ));
    let moderation = Arc::new(ModerationWorker::new(
        shared_store.clone(),
        classifier,
        config.classifier.call_timeout,
    ));

    let lifecycle = Arc::new(LifecycleScheduler::new(
        shared_store,
        config.lifecycle.tick_interval,
        config.lifecycle.grace_days,
    ));
    lifecycle.clone().start();

    let app: Router = create_routes(AppState {
        store,
        moderation,
        lifecycle,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
