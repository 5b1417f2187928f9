use chrono::{Duration as ChronoDuration, Utc};
use game_server::app;
use game_server::config::Config;
use game_server::web_socket;
use std::time::Duration;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
/// Activates tracing, loads the environment configuration, wires the
/// runtime and serves the websocket plus the static client assets. A
/// watchdog task sweeps finished games so the in-memory store cannot grow
/// without bound.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "configuration error");
            panic!("configuration error: {err}");
        }
    };

    let app = app::build(config.clone());

    app.limiter.spawn_janitor();
    let watchdog = app.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1200)); // 20 min
        loop {
            interval.tick().await;
            let purged = watchdog
                .store
                .purge_finished(Utc::now() - ChronoDuration::hours(1));
            if purged > 0 {
                tracing::info!(purged, "swept finished games");
            }
        }
    });

    let index = format!("{}/index.html", config.asset_dir);
    let router = web_socket::router(app).fallback_service(
        ServeDir::new(&config.asset_dir).not_found_service(ServeFile::new(index)),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|err| panic!("cannot bind {}: {err}", config.bind_addr));
    tracing::info!(addr = %config.bind_addr, "game server listening");

    axum::serve(listener, router).await.unwrap();
}
