use std::sync::Arc;
use std::time::Duration;

use migration::MigratorTrait;
use sea_orm::{ ConnectOptions, Database, DatabaseConnection };
use tokio::sync::OnceCell;

use crate::error::Result;

pub mod entity;
pub use entity::*;

mod price_store;
pub use price_store::{ aggregate_hourly, HourlyBucket, PriceRepository, PriceStore };

mod alert_store;
pub use alert_store::{ AlertRepository, AlertStore, NewSubscription };

pub mod memory;

/// Connection pool that is opened, and migrated, at most once.
///
/// Concurrent callers of [`Pool::get`] wait on the same initialization instead
/// of racing to connect or to create tables.
pub struct Pool {
    url: String,
    max_connections: u32,
    connection: OnceCell<Arc<DatabaseConnection>>,
}

impl Pool {
    pub fn new(url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            url: url.into(),
            max_connections,
            connection: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<Arc<DatabaseConnection>> {
        let db = self.connection.get_or_try_init(|| self.connect_and_migrate()).await?;
        Ok(db.clone())
    }

    async fn connect_and_migrate(&self) -> Result<Arc<DatabaseConnection>> {
        let mut options = ConnectOptions::new(self.url.clone());
        options
            .max_connections(self.max_connections)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let db = Database::connect(options).await?;
        tracing::info!("Database connected (pool size {})", self.max_connections);

        migration::Migrator::up(&db, None).await?;
        tracing::info!("Migrations completed successfully");

        Ok(Arc::new(db))
    }
}
