//! PostgreSQL access: pool construction and the batch repository.

pub mod repo;

pub use repo::{PostgresRepository, Repository};

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

use crate::error::{Error, Result};

/// Build a connection pool from a `postgres://` URL.
pub fn connect(database_url: &str, max_size: usize) -> Result<Pool> {
    let pg_config: tokio_postgres::Config = database_url.parse()?;
    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|err| Error::Config(format!("database pool: {err}")))
}
