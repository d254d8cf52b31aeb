use anyhow::Error;
use log::info;
use std::sync::Arc;

use crate::{calendar_reader::CalendarReader, config::Config, dbpool::DbPool};

/// Everything both front-ends share, built once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub pool: DbPool,
    pub calendar: Arc<CalendarReader>,
}

impl AppContext {
    /// Open the database, create the schema and load the calendar token.
    ///
    /// # Errors
    /// Return error if the database cannot be opened or initialized
    pub async fn new(config: Config) -> Result<Self, Error> {
        let path = config.sqlite_path()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let pool = DbPool::new(&path)?;
        pool.init_schema().await?;
        info!("database ready at {}", path.display());

        let calendar = CalendarReader::new(&config)?;
        let connected = calendar.load().await;
        info!("calendar connected: {connected}");

        Ok(Self {
            config,
            pool,
            calendar: Arc::new(calendar),
        })
    }
}
