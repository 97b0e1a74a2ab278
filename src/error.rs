//! Engine error types.
//!
//! Stage-level failures (model, geocoder, eligibility) are handled
//! locally inside the pipeline and never surface here; only input
//! validation, configuration and persistence problems abort a batch.

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The upload cannot be processed at all: missing description
    /// column, zero ticket rows. Nothing is enriched or persisted.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// A runtime setting update was rejected (out-of-set value).
    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    /// Missing or malformed environment configuration.
    #[error("configuration: {0}")]
    Config(String),

    /// A store error. Fatal to the batch: the transaction is rolled
    /// back and no session snapshot is written.
    #[error("database: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("database pool: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
}
