//! Per-tenant connection cache.
//!
//! Each tenant id maps to one lazily provisioned connection. The first request
//! for a tenant checks for its database, creates it if missing, connects, runs
//! the init hook and (optionally) creates tables; everyone else for that
//! tenant waits on the same in-flight provisioning and then shares its result.
//! Ready tenants are read from a sharded map, so they never wait on a tenant
//! that is still provisioning. Entries live for the life of the cache.

mod provision;

use std::sync::Arc;

use dashmap::DashMap;
use http::HeaderName;
use sea_orm::{DatabaseConnection, DbErr};
use tokio::sync::OnceCell;
use tracing::info;

use crate::builder::{ColumnName, validate_column};
use crate::config::{TenancyConfig, TenancyEngine};
use crate::connect::{OnInit, on_init};
use crate::record::Record;
use crate::repository::Repository;
use crate::schema::SchemaSync;
use crate::{RepoError, Result};

pub use provision::{ServerProvisioner, SqliteProvisioner, TenantProvisioner};

/// Extracts the tenant id from an inbound request.
pub trait TenantIdSource<R: ?Sized>: Send + Sync {
    fn tenant_id(&self, request: &R) -> Option<String>;
}

impl<R: ?Sized, F> TenantIdSource<R> for F
where
    F: Fn(&R) -> Option<String> + Send + Sync,
{
    fn tenant_id(&self, request: &R) -> Option<String> {
        self(request)
    }
}

/// Reads the tenant id from a request header (`x-tenant-id` by default).
#[derive(Clone, Debug)]
pub struct HeaderTenantId {
    header: HeaderName,
}

impl HeaderTenantId {
    #[must_use]
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }

    fn read(&self, headers: &http::HeaderMap) -> Option<String> {
        headers
            .get(&self.header)?
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    }
}

impl Default for HeaderTenantId {
    fn default() -> Self {
        Self::new(HeaderName::from_static("x-tenant-id"))
    }
}

impl<B> TenantIdSource<http::Request<B>> for HeaderTenantId {
    fn tenant_id(&self, request: &http::Request<B>) -> Option<String> {
        self.read(request.headers())
    }
}

impl TenantIdSource<http::request::Parts> for HeaderTenantId {
    fn tenant_id(&self, request: &http::request::Parts) -> Option<String> {
        self.read(&request.headers)
    }
}

/// Tenant ids become database and file names, so they follow the identifier
/// allow-list and may not be qualified.
///
/// # Errors
/// Returns `RepoError::InvalidTenant` for anything else.
pub fn validate_tenant(tenant: &str) -> Result<&str> {
    match validate_column(tenant) {
        Ok(ColumnName::Plain(t)) => Ok(t),
        _ => Err(RepoError::InvalidTenant(tenant.to_owned())),
    }
}

type Slot = Arc<OnceCell<Arc<DatabaseConnection>>>;

/// Tenant id to connection map with single-flight provisioning.
pub struct TenantConnections<R: ?Sized> {
    source: Arc<dyn TenantIdSource<R>>,
    provisioner: Arc<dyn TenantProvisioner>,
    schema: SchemaSync,
    sync: bool,
    on_init: Option<OnInit>,
    slots: DashMap<String, Slot>,
}

impl<R: ?Sized> std::fmt::Debug for TenantConnections<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantConnections")
            .field("tenants", &self.slots.len())
            .field("schema", &self.schema)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

impl<R: ?Sized + Sync> TenantConnections<R> {
    #[must_use]
    pub fn new(
        source: impl TenantIdSource<R> + 'static,
        provisioner: Arc<dyn TenantProvisioner>,
    ) -> Self {
        Self {
            source: Arc::new(source),
            provisioner,
            schema: SchemaSync::default(),
            sync: false,
            on_init: None,
            slots: DashMap::new(),
        }
    }

    /// Builds the cache with the provisioner matching `config.engine`.
    ///
    /// # Errors
    /// Returns `RepoError::InvalidConfig` if the engine's required settings are missing.
    pub fn from_config(
        config: &TenancyConfig,
        source: impl TenantIdSource<R> + 'static,
    ) -> Result<Self> {
        let provisioner: Arc<dyn TenantProvisioner> = match config.engine {
            TenancyEngine::Sqlite => {
                let dir = config.dir.clone().ok_or_else(|| {
                    RepoError::InvalidConfig("sqlite tenancy requires 'dir'".to_owned())
                })?;
                Arc::new(SqliteProvisioner::new(dir).with_pool(config.pool.clone()))
            }
            TenancyEngine::Postgres | TenancyEngine::Mysql => {
                Arc::new(ServerProvisioner::new(config.clone())?)
            }
        };
        Ok(Self::new(source, provisioner).sync(config.sync))
    }

    /// Record types whose tables are created in each new tenant database when `sync` is on.
    #[must_use]
    pub fn with_schema(mut self, schema: SchemaSync) -> Self {
        self.schema = schema;
        self
    }

    #[must_use]
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
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

    /// Connection for the request's tenant, or `None` when the request names no tenant.
    ///
    /// # Errors
    /// `RepoError::InvalidTenant` for an unusable id, `RepoError::Provision` if
    /// provisioning fails. A failed provisioning is retried by the next request.
    pub async fn resolve(&self, request: &R) -> Result<Option<Arc<DatabaseConnection>>> {
        let Some(tenant) = self
            .source
            .tenant_id(request)
            .filter(|t| !t.is_empty())
        else {
            return Ok(None);
        };
        self.connection(&tenant).await.map(Some)
    }

    /// Repository for `E` on the request's tenant database.
    ///
    /// # Errors
    /// Same as [`TenantConnections::resolve`].
    pub async fn repository<E: Record>(&self, request: &R) -> Result<Option<Repository<E>>> {
        self.resolve(request)
            .await?
            .map(|conn| Repository::new(DatabaseConnection::clone(&conn)))
            .transpose()
    }

    /// Connection for `tenant`, provisioning it on first use.
    ///
    /// # Errors
    /// Same as [`TenantConnections::resolve`].
    pub async fn connection(&self, tenant: &str) -> Result<Arc<DatabaseConnection>> {
        if let Some(ready) = self
            .slots
            .get(tenant)
            .and_then(|slot| slot.value().get().cloned())
        {
            return Ok(ready);
        }
        validate_tenant(tenant)?;

        let slot = Arc::clone(self.slots.entry(tenant.to_owned()).or_default().value());
        let conn = slot.get_or_try_init(|| self.provision(tenant)).await?;
        Ok(Arc::clone(conn))
    }

    /// Tenants with a ready connection.
    #[must_use]
    pub fn ready_tenants(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|slot| slot.value().initialized())
            .map(|slot| slot.key().clone())
            .collect()
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant))]
    async fn provision(&self, tenant: &str) -> Result<Arc<DatabaseConnection>> {
        let fail = |e: RepoError| RepoError::provision(tenant, e);
        let p = &self.provisioner;

        if !p.database_exists(tenant).await.map_err(fail)? {
            p.create_database(tenant).await.map_err(fail)?;
            info!("tenant database created");
        }
        let conn = p.connect(tenant).await.map_err(fail)?;
        if let Some(hook) = &self.on_init {
            hook(conn.clone())
                .await
                .map_err(|e| fail(RepoError::Init(e)))?;
        }
        if self.sync {
            p.sync_schema(&conn, &self.schema).await.map_err(fail)?;
        }
        info!("tenant connection ready");
        Ok(Arc::new(conn))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn header_source_reads_and_trims() {
        let source = HeaderTenantId::default();
        let req = http::Request::builder()
            .header("X-Tenant-Id", " acme ")
            .body(())
            .unwrap();
        assert_eq!(source.tenant_id(&req).as_deref(), Some("acme"));

        let blank = http::Request::builder()
            .header("x-tenant-id", "  ")
            .body(())
            .unwrap();
        assert!(source.tenant_id(&blank).is_none());

        let (parts, ()) = http::Request::new(()).into_parts();
        assert!(source.tenant_id(&parts).is_none());
    }

    #[test]
    fn tenant_ids_must_be_plain_identifiers() {
        assert_eq!(validate_tenant("tenant_42").unwrap(), "tenant_42");
        for bad in ["", "a.b", "../etc", "x;DROP DATABASE y", "t\"q"] {
            assert!(
                matches!(validate_tenant(bad), Err(RepoError::InvalidTenant(_))),
                "'{bad}' should be rejected"
            );
        }
    }
}
