use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    chat::client::{ChatBackend, OpenAiChat},
    config::AppConfig,
    places::client::{GooglePlaces, PlacesBackend},
    web::templates::Templates,
};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub templates: Arc<Templates>,
    pub chat: Arc<dyn ChatBackend>,
    pub places: Arc<dyn PlacesBackend>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("vetmh/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;

        let chat = Arc::new(OpenAiChat::new(http.clone(), config.chat.clone()));
        let places = Arc::new(GooglePlaces::new(http, config.places.clone()));

        Self::from_parts(db, config, chat, places)
    }

    pub fn from_parts(
        db: PgPool,
        config: Arc<AppConfig>,
        chat: Arc<dyn ChatBackend>,
        places: Arc<dyn PlacesBackend>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            db,
            config,
            templates: Arc::new(Templates::load().context("load templates")?),
            chat,
            places,
        })
    }

    pub fn secure_cookies(&self) -> bool {
        !self.config.debug
    }

    /// Calendar day in the configured local offset.
    pub fn today(&self) -> time::Date {
        time::OffsetDateTime::now_utc()
            .to_offset(self.config.local_offset)
            .date()
    }
}
