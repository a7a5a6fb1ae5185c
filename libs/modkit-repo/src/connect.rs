//! Opening connections: engine detection, pool setup, retry, init hook and schema sync.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use sea_orm::{DatabaseConnection, DbErr};
use tracing::{info, warn};

use crate::config::{ConnectConfig, PoolCfg, redact_credentials_in_dsn};
use crate::record::Record;
use crate::repository::Repository;
use crate::schema::SchemaSync;
use crate::{RepoError, Result};

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
use crate::pool_opts::ApplyPoolOpts;

/// Future returned by an [`OnInit`] hook.
pub type InitFuture = Pin<Box<dyn Future<Output = std::result::Result<(), DbErr>> + Send>>;

/// Hook run once on every freshly opened connection, before schema sync.
pub type OnInit = Arc<dyn Fn(DatabaseConnection) -> InitFuture + Send + Sync>;

/// Wraps an async closure into an [`OnInit`] hook.
#[must_use]
pub fn on_init<F, Fut>(f: F) -> OnInit
where
    F: Fn(DatabaseConnection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), DbErr>> + Send + 'static,
{
    Arc::new(move |conn| Box::pin(f(conn)))
}

/// Supported engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbEngine {
    Postgres,
    MySql,
    Sqlite,
}

/// An open connection pool plus what it was opened with.
#[derive(Debug, Clone)]
pub struct DbHandle {
    engine: DbEngine,
    dsn: String,
    sea: DatabaseConnection,
}

impl DbHandle {
    /// Detect engine by DSN scheme.
    ///
    /// # Errors
    /// Returns `RepoError::UnknownDsn` if the scheme is not recognized.
    pub fn detect(dsn: &str) -> Result<DbEngine> {
        let s = dsn.trim_start();
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(DbEngine::Postgres)
        } else if s.starts_with("mysql://") {
            Ok(DbEngine::MySql)
        } else if s.starts_with("sqlite:") {
            Ok(DbEngine::Sqlite)
        } else {
            Err(RepoError::UnknownDsn(redact_credentials_in_dsn(dsn)))
        }
    }

    /// Opens a pool for `dsn` (a single attempt).
    ///
    /// # Errors
    /// Returns `RepoError::Sqlx` if the engine is unreachable or the DSN is malformed,
    /// `RepoError::FeatureDisabled` if the engine's backend is not compiled in.
    pub async fn connect(dsn: &str, pool: &PoolCfg) -> Result<Self> {
        let engine = Self::detect(dsn)?;
        let sea = match engine {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => {
                let pool = sea_orm::sqlx::postgres::PgPoolOptions::new()
                    .apply(pool)
                    .connect(dsn)
                    .await?;
                sea_orm::SqlxPostgresConnector::from_sqlx_postgres_pool(pool)
            }
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => {
                return Err(RepoError::FeatureDisabled("PostgreSQL feature not enabled"));
            }
            #[cfg(feature = "mysql")]
            DbEngine::MySql => {
                let pool = sea_orm::sqlx::mysql::MySqlPoolOptions::new()
                    .apply(pool)
                    .connect(dsn)
                    .await?;
                sea_orm::SqlxMySqlConnector::from_sqlx_mysql_pool(pool)
            }
            #[cfg(not(feature = "mysql"))]
            DbEngine::MySql => return Err(RepoError::FeatureDisabled("MySQL feature not enabled")),
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => connect_sqlite(dsn, pool).await?,
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => {
                return Err(RepoError::FeatureDisabled("SQLite feature not enabled"));
            }
        };
        Ok(Self {
            engine,
            dsn: redact_credentials_in_dsn(dsn),
            sea,
        })
    }

    #[must_use]
    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    /// The DSN this handle was opened with, credentials masked.
    #[must_use]
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    #[must_use]
    pub fn conn(&self) -> &DatabaseConnection {
        &self.sea
    }

    #[must_use]
    pub fn into_conn(self) -> DatabaseConnection {
        self.sea
    }

    /// Repository for `E` over this connection.
    ///
    /// # Errors
    /// Returns `RepoError::Mapping` if the record's zero value cannot be described.
    pub fn repository<E: Record>(&self) -> Result<Repository<E>> {
        Repository::new(self.sea.clone())
    }

    /// Graceful pool close.
    ///
    /// # Errors
    /// Returns `RepoError::Query` if the engine reports a failure while closing.
    pub async fn close(self) -> Result<()> {
        self.sea.close().await.map_err(RepoError::Query)
    }
}

#[cfg(feature = "sqlite")]
async fn connect_sqlite(dsn: &str, pool: &PoolCfg) -> Result<DatabaseConnection> {
    use sea_orm::sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::str::FromStr;

    let mut opts = SqliteConnectOptions::from_str(dsn)?;
    let in_memory = dsn.contains(":memory:") || dsn.contains("mode=memory");
    if !in_memory {
        if !dsn.contains("mode=") {
            opts = opts.create_if_missing(true);
        }
        if let Some(parent) = opts.get_filename().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        opts = opts.journal_mode(SqliteJournalMode::Wal);
    }
    let pool = SqlitePoolOptions::new()
        .apply(pool)
        .connect_with(opts)
        .await?;
    Ok(sea_orm::SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

/// Opens a database from [`ConnectConfig`]: retries the initial connect, runs the
/// init hook, then creates missing tables when `sync` is on.
///
/// ```no_run
/// # async fn run() -> modkit_repo::Result<()> {
/// use modkit_repo::{ConnectConfig, Connector, SchemaSync};
///
/// let handle = Connector::new(ConnectConfig::new("sqlite://data/app.db"))
///     .with_schema(SchemaSync::new())
///     .on_init(|conn| async move {
///         use sea_orm::ConnectionTrait;
///         conn.execute_unprepared("PRAGMA foreign_keys = ON").await.map(|_| ())
///     })
///     .connect()
///     .await?;
/// # drop(handle);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connector {
    config: ConnectConfig,
    schema: SchemaSync,
    on_init: Option<OnInit>,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("dsn", &redact_credentials_in_dsn(&self.config.dsn))
            .field("sync", &self.config.sync)
            .field("retry", &self.config.retry)
            .field("schema", &self.schema)
            .field("on_init", &self.on_init.is_some())
            .finish_non_exhaustive()
    }
}

impl Connector {
    #[must_use]
    pub fn new(config: ConnectConfig) -> Self {
        Self {
            config,
            schema: SchemaSync::default(),
            on_init: None,
        }
    }

    /// Record types whose tables are created when `sync` is enabled.
    #[must_use]
    pub fn with_schema(mut self, schema: SchemaSync) -> Self {
        self.schema = schema;
        self
    }

    #[must_use]
    pub fn on_init<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(DatabaseConnection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), DbErr>> + Send + 'static,
    {
        self.on_init = Some(on_init(f));
        self
    }

    /// Connects, retrying up to `retry.max_retries` extra times `retry.delay` apart.
    ///
    /// A startup that gets an error here cannot serve correct data and should stop.
    ///
    /// # Errors
    /// - `RepoError::Connect` once retries are exhausted (or for non-retryable failures)
    /// - `RepoError::Init` if the init hook fails
    /// - `RepoError::Sync` if table creation fails
    pub async fn connect(&self) -> Result<DbHandle> {
        let dsn = self.config.resolved_dsn()?;
        let redacted = redact_credentials_in_dsn(&dsn);
        let retry = &self.config.retry;

        let mut attempts: u32 = 0;
        let handle = loop {
            attempts += 1;
            match DbHandle::connect(&dsn, &self.config.pool).await {
                Ok(handle) => break handle,
                Err(e) if e.is_transient() && attempts <= retry.max_retries => {
                    warn!(
                        dsn = %redacted,
                        attempt = attempts,
                        max_retries = retry.max_retries,
                        delay = ?retry.delay,
                        error = %e,
                        "database connect failed, retrying"
                    );
                    tokio::time::sleep(retry.delay).await;
                }
                Err(e) => {
                    return Err(RepoError::Connect {
                        attempts,
                        source: Box::new(e),
                    });
                }
            }
        };
        info!(dsn = %redacted, engine = ?handle.engine(), attempts, "database connected");

        if let Some(hook) = &self.on_init {
            hook(handle.conn().clone()).await.map_err(RepoError::Init)?;
        }
        if self.config.sync {
            self.schema
                .apply(handle.conn())
                .await
                .map_err(RepoError::Sync)?;
            info!(dsn = %redacted, tables = ?self.schema, "schema synchronized");
        }
        Ok(handle)
    }
}
