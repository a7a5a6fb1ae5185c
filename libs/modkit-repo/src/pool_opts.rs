//! Applies [`PoolCfg`] to each backend's sqlx pool builder.

use crate::config::PoolCfg;

pub trait ApplyPoolOpts: Sized {
    #[must_use]
    fn apply(self, cfg: &PoolCfg) -> Self;
}

macro_rules! impl_apply_pool_opts {
    ($feature:literal, $opts:ty) => {
        #[cfg(feature = $feature)]
        impl ApplyPoolOpts for $opts {
            fn apply(mut self, cfg: &PoolCfg) -> Self {
                if let Some(n) = cfg.max_conns {
                    self = self.max_connections(n);
                }
                if let Some(n) = cfg.min_conns {
                    self = self.min_connections(n);
                }
                if let Some(t) = cfg.acquire_timeout {
                    self = self.acquire_timeout(t);
                }
                // sqlx treats `None` as "never"; only override when configured.
                if cfg.idle_timeout.is_some() {
                    self = self.idle_timeout(cfg.idle_timeout);
                }
                if cfg.max_lifetime.is_some() {
                    self = self.max_lifetime(cfg.max_lifetime);
                }
                if cfg.test_before_acquire {
                    self = self.test_before_acquire(true);
                }
                self
            }
        }
    };
}

impl_apply_pool_opts!("pg", sea_orm::sqlx::postgres::PgPoolOptions);
impl_apply_pool_opts!("mysql", sea_orm::sqlx::mysql::MySqlPoolOptions);
impl_apply_pool_opts!("sqlite", sea_orm::sqlx::sqlite::SqlitePoolOptions);
