use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eventprep::routes::router;
use eventprep::services::{ReminderScheduler, maintenance};
use eventprep::state::AppState;
use eventprep::telegram::{NoopNotifier, Notifier, TelegramConfig, TelegramHttpNotifier};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "eventprep=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://eventprep.db?mode=rwc".to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    // Catch up on archive retention missed while the server was down.
    maintenance::run(&pool).await?;

    let notifier: Arc<dyn Notifier> = match TelegramConfig::new_from_env() {
        Ok(config) => Arc::new(TelegramHttpNotifier::new(config)?),
        Err(_) => {
            info!("BOT_TOKEN not set, reminders will not be delivered");
            Arc::new(NoopNotifier)
        }
    };

    let interval_secs = std::env::var("REMINDER_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(300);
    tokio::spawn(ReminderScheduler::new(pool.clone(), notifier.clone(), interval_secs).start());

    let state = AppState {
        db: pool.clone(),
        notifier,
    };

    let app = router(state);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
