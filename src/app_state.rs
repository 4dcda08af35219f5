use anyhow::Result;

use crate::{
    config::Config,
    db::{self, DbPool},
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
}

impl AppState {
    pub async fn init(config: &Config) -> Result<Self> {
        let db_pool = db::init_pool(&config.database.url).await?;
        Ok(Self { db_pool })
    }
}
