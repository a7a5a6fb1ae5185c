use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use tokio::sync::OnceCell;

use crate::config::{PoolCfg, TenancyConfig, TenancyEngine};
use crate::connect::DbHandle;
use crate::schema::SchemaSync;
use crate::{RepoError, Result};

/// Engine-specific steps for bringing a tenant database online.
///
/// Callers pass only validated tenant ids (see [`super::validate_tenant`]).
#[async_trait]
pub trait TenantProvisioner: Send + Sync {
    /// # Errors
    /// Returns an error if the engine cannot be asked.
    async fn database_exists(&self, tenant: &str) -> Result<bool>;

    /// # Errors
    /// Returns an error if the database cannot be created.
    async fn create_database(&self, tenant: &str) -> Result<()>;

    /// Opens a pool on the tenant's database.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable.
    async fn connect(&self, tenant: &str) -> Result<DatabaseConnection>;

    /// Creates missing tables in a freshly connected tenant database.
    ///
    /// # Errors
    /// Returns `RepoError::Sync` if a table cannot be created.
    async fn sync_schema(&self, conn: &DatabaseConnection, schema: &SchemaSync) -> Result<()> {
        schema.apply(conn).await.map_err(RepoError::Sync)
    }
}

/// One database per tenant on a `PostgreSQL` or `MySQL` server.
///
/// Existence checks and `CREATE DATABASE` go through a single admin
/// connection opened on first use.
pub struct ServerProvisioner {
    config: TenancyConfig,
    admin: OnceCell<DatabaseConnection>,
}

impl std::fmt::Debug for ServerProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerProvisioner")
            .field("engine", &self.config.engine)
            .field("host", &self.config.host)
            .field("port", &self.config.port_or_default())
            .field("admin_connected", &self.admin.initialized())
            .finish_non_exhaustive()
    }
}

impl ServerProvisioner {
    /// # Errors
    /// Returns `RepoError::InvalidConfig` for the `sqlite` engine or an empty host.
    pub fn new(config: TenancyConfig) -> Result<Self> {
        if config.engine == TenancyEngine::Sqlite {
            return Err(RepoError::InvalidConfig(
                "server provisioner does not handle sqlite".to_owned(),
            ));
        }
        if config.host.is_empty() {
            return Err(RepoError::InvalidConfig("tenancy requires 'host'".to_owned()));
        }
        Ok(Self {
            config,
            admin: OnceCell::new(),
        })
    }

    async fn admin(&self) -> Result<&DatabaseConnection> {
        self.admin
            .get_or_try_init(|| async {
                let dsn = self.config.server_dsn(self.config.admin_db_or_default())?;
                let pool = PoolCfg {
                    max_conns: Some(1),
                    ..self.config.pool.clone()
                };
                DbHandle::connect(&dsn, &pool).await.map(DbHandle::into_conn)
            })
            .await
    }

    fn backend(&self) -> DatabaseBackend {
        match self.config.engine {
            TenancyEngine::Mysql => DatabaseBackend::MySql,
            TenancyEngine::Postgres | TenancyEngine::Sqlite => DatabaseBackend::Postgres,
        }
    }
}

#[async_trait]
impl TenantProvisioner for ServerProvisioner {
    async fn database_exists(&self, tenant: &str) -> Result<bool> {
        let backend = self.backend();
        let sql = match backend {
            DatabaseBackend::MySql => {
                "SELECT 1 FROM INFORMATION_SCHEMA.SCHEMATA WHERE SCHEMA_NAME = ?"
            }
            _ => "SELECT 1 FROM pg_database WHERE datname = $1",
        };
        let stmt = Statement::from_sql_and_values(backend, sql, [tenant.into()]);
        let row = self
            .admin()
            .await?
            .query_one(stmt)
            .await
            .map_err(RepoError::Query)?;
        Ok(row.is_some())
    }

    async fn create_database(&self, tenant: &str) -> Result<()> {
        // Identifiers cannot be bound; the id has passed the allow-list.
        let sql = match self.backend() {
            DatabaseBackend::MySql => format!("CREATE DATABASE `{tenant}`"),
            _ => format!("CREATE DATABASE \"{tenant}\""),
        };
        self.admin()
            .await?
            .execute_unprepared(&sql)
            .await
            .map_err(RepoError::Store)?;
        Ok(())
    }

    async fn connect(&self, tenant: &str) -> Result<DatabaseConnection> {
        let dsn = self.config.server_dsn(tenant)?;
        Ok(DbHandle::connect(&dsn, &self.config.pool).await?.into_conn())
    }
}

/// One `SQLite` file per tenant: `<dir>/<tenant>.db`.
#[derive(Debug, Clone)]
pub struct SqliteProvisioner {
    dir: PathBuf,
    pool: PoolCfg,
}

impl SqliteProvisioner {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            pool: PoolCfg::default(),
        }
    }

    #[must_use]
    pub fn with_pool(mut self, pool: PoolCfg) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path(&self, tenant: &str) -> PathBuf {
        self.dir.join(format!("{tenant}.db"))
    }
}

#[async_trait]
impl TenantProvisioner for SqliteProvisioner {
    async fn database_exists(&self, tenant: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(tenant)).await?)
    }

    async fn create_database(&self, tenant: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.path(tenant))
            .await?;
        Ok(())
    }

    async fn connect(&self, tenant: &str) -> Result<DatabaseConnection> {
        let dsn = format!("sqlite://{}?mode=rwc", self.path(tenant).display());
        Ok(DbHandle::connect(&dsn, &self.pool).await?.into_conn())
    }
}
