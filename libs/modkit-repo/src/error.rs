//! Error taxonomy of the repository layer.

use sea_orm::DbErr;
use thiserror::Error;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, RepoError>;

/// Typed error for repositories, connections and tenant provisioning.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Initial connect failed and the retry budget is exhausted.
    #[error("failed to connect after {attempts} attempt(s): {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: Box<RepoError>,
    },

    /// Schema synchronization failed. Callers treat this as fatal at startup.
    #[error("schema synchronization failed: {0}")]
    Sync(#[source] DbErr),

    /// The `on_init` hook rejected a freshly opened connection.
    #[error("connection init hook failed: {0}")]
    Init(#[source] DbErr),

    /// The engine rejected a write (constraint violation, bad value, connectivity).
    #[error("store rejected write: {0}")]
    Store(#[source] DbErr),

    /// A read statement failed at the engine.
    #[error("query failed: {0}")]
    Query(#[source] DbErr),

    /// A single-row operation matched zero rows.
    #[error("record not found")]
    NotFound,

    #[error("invalid field '{0}'")]
    InvalidField(String),

    /// A caller-supplied column name failed the identifier allow-list.
    #[error("invalid column name '{0}'")]
    InvalidColumn(String),

    #[error("invalid tenant identifier '{0}'")]
    InvalidTenant(String),

    /// Tenant database creation, connect or schema sync failed.
    #[error("failed to provision tenant '{tenant}': {source}")]
    Provision {
        tenant: String,
        #[source]
        source: Box<RepoError>,
    },

    /// Input could not be reconciled with the record type.
    #[error("field mapping failed: {0}")]
    Mapping(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown DSN: {0}")]
    UnknownDsn(String),

    #[error("Feature not enabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
    #[error(transparent)]
    Sqlx(#[from] sea_orm::sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RepoError {
    /// Whether a connect attempt that failed with this error is worth retrying.
    ///
    /// Driver errors other than bad configuration are, as are connection-level
    /// `DbErr`s (lost connection, pool acquire timeout).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
            RepoError::Sqlx(e) => !matches!(e, sea_orm::sqlx::Error::Configuration(_)),
            RepoError::Query(e) | RepoError::Store(e) | RepoError::Init(e) => {
                matches!(e, DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
            }
            _ => false,
        }
    }

    pub(crate) fn provision(tenant: &str, source: RepoError) -> Self {
        RepoError::Provision {
            tenant: tenant.to_owned(),
            source: Box::new(source),
        }
    }
}

/// Maps a failed write, keeping "row vanished" distinct from engine rejection.
pub(crate) fn store_err(e: DbErr) -> RepoError {
    match e {
        DbErr::RecordNotFound(_) | DbErr::RecordNotUpdated => RepoError::NotFound,
        other => RepoError::Store(other),
    }
}
