use anyhow::{Error, format_err};
use deadpool_sqlite::{Config, Pool, Runtime};
use derive_more::Deref;
use log::debug;
use rusqlite::Connection;
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

const SCHEMA: &str = include_str!("../migrations/V1__create_todos.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Deref)]
pub struct DbPool {
    path: Arc<PathBuf>,
    #[deref]
    pool: Pool,
}

impl fmt::Debug for DbPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DbPool {}", self.path.display())
    }
}

impl DbPool {
    /// # Errors
    /// Returns error if pool setup fails
    pub fn new(path: &Path) -> Result<Self, Error> {
        let pool = Config::new(path).create_pool(Runtime::Tokio1)?;
        Ok(Self {
            path: Arc::new(path.to_path_buf()),
            pool,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on a pooled connection off the async runtime.
    ///
    /// # Errors
    /// Return error if no connection is available, the closure panics or
    /// the closure itself fails
    pub async fn interact<F, T>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await?;
        conn.interact(move |conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(conn)
        })
        .await
        .map_err(|e| format_err!("sqlite interaction failed: {e}"))?
        .map_err(Into::into)
    }

    /// Create the tables if they do not exist yet.
    ///
    /// # Errors
    /// Return error if the schema statements fail
    pub async fn init_schema(&self) -> Result<(), Error> {
        debug!("initializing schema in {}", self.path.display());
        self.interact(|conn| conn.execute_batch(SCHEMA)).await
    }
}
