mod admin;
mod app;
mod auth;
mod chat;
mod config;
mod error;
mod mood;
mod pages;
mod places;
mod profile;
mod state;
mod web;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "vetmh=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    sqlx::migrate!("./migrations").run(&app_state.db).await?;
    tracing::info!(
        debug = app_state.config.debug,
        chat_configured = app_state.config.chat.api_key.is_some(),
        places_configured = app_state.places.is_configured(),
        "application state ready"
    );

    let app = app::build_app(app_state);
    app::serve(app).await
}
