#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! `ModKit` generic repository crate.
//!
//! A thin, typed layer over `SeaORM` for services that mostly need CRUD on
//! plain records:
//! - [`Repository`]: create, find, update, delete, count and atomic
//!   increment/decrement for any entity implementing [`Record`]
//! - [`QueryBuilder`]: composable predicates with bound values and
//!   allow-listed column names
//! - [`FieldTable`]: cached field/column descriptors used to map loosely
//!   typed input (JSON, partial updates) onto records
//! - [`Connector`]: connect with retry, init hook and table creation
//! - [`TenantConnections`]: one lazily provisioned database per tenant
//!
//! # Features
//! - `pg`, `mysql`, `sqlite`: enable the matching `SQLx` backend (`sqlite` by default)
//! - `integration`: enables tests that need a running server
//!
//! # Example
//! ```rust,no_run
//! use modkit_repo::{ConnectConfig, Connector, FindOptions, Query, Record, SchemaSync, Sort};
//! use sea_orm::entity::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize, DeriveEntityModel, Record)]
//! #[sea_orm(table_name = "users")]
//! #[record(soft_delete_col = "deleted_at")]
//! pub struct Model {
//!     #[sea_orm(primary_key)]
//!     pub id: i64,
//!     pub email: String,
//!     pub deleted_at: Option<DateTimeUtc>,
//! }
//!
//! #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
//! pub enum Relation {}
//!
//! impl ActiveModelBehavior for ActiveModel {}
//!
//! # async fn run() -> modkit_repo::Result<()> {
//! let config = ConnectConfig {
//!     sync: true,
//!     ..ConnectConfig::new("sqlite://data/app.db")
//! };
//! let db = Connector::new(config)
//!     .with_schema(SchemaSync::new().entity::<Entity>())
//!     .connect()
//!     .await?;
//!
//! let users = db.repository::<Entity>()?;
//! users.create(&serde_json::json!({ "email": "a@example.com" })).await?;
//!
//! let page = users
//!     .find_all(
//!         Query::build(|q| {
//!             q.like("email", "%@example.com");
//!         }),
//!         FindOptions::new().order_by(Sort::desc("id")).limit(20),
//!     )
//!     .await?;
//! # drop(page);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(
    not(any(feature = "pg", feature = "mysql", feature = "sqlite")),
    allow(
        unused_imports,
        unused_variables,
        dead_code,
        unreachable_code,
        unused_lifetimes,
        clippy::unused_async,
    )
)]

pub mod builder;
pub mod config;
pub mod connect;
pub mod error;
pub mod mapper;
pub mod query;
pub mod record;
pub mod repository;
pub mod schema;
pub mod tenancy;

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
mod pool_opts;

pub use builder::{ColumnName, QueryBuilder, validate_column};
pub use config::{
    ConnectConfig, PoolCfg, RetryCfg, TenancyConfig, TenancyEngine, expand_env_vars,
    redact_credentials_in_dsn,
};
pub use connect::{Connector, DbEngine, DbHandle, InitFuture, OnInit, on_init};
pub use error::{RepoError, Result};
pub use mapper::{FieldDescriptor, FieldTable};
pub use query::{DeleteMode, FindOneOptions, FindOptions, Query, Sort, SortDir};
pub use record::Record;
pub use repository::{PrimaryKeyOf, Repository};
pub use schema::SchemaSync;
pub use tenancy::{
    HeaderTenantId, ServerProvisioner, SqliteProvisioner, TenantConnections, TenantIdSource,
    TenantProvisioner, validate_tenant,
};

/// Derives [`Record`] for a `SeaORM` entity from `#[record(...)]` attributes.
pub use modkit_repo_macros::Record;
