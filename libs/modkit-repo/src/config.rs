//! Configuration surface for connections and tenancy.
//!
//! Structures are plain `serde` types, usually pulled out of a [`Figment`]
//! with [`ConnectConfig::from_figment`] / [`TenancyConfig::from_figment`].
//! `${VAR}` placeholders in DSNs and passwords are expanded from the
//! environment when the value is used, never when it is parsed.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use figment::Figment;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{RepoError, Result};

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static ENV_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex should not panic")
});

/// Pool knobs; each driver applies the subset it supports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolCfg {
    pub max_conns: Option<u32>,
    pub min_conns: Option<u32>,
    #[serde(default, with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub max_lifetime: Option<Duration>,
    #[serde(default)]
    pub test_before_acquire: bool,
}

/// Retry policy for the initial connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryCfg {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Pause between attempts.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for RetryCfg {
    fn default() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::from_secs(1),
        }
    }
}

/// How to reach one database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectConfig {
    /// `postgres://`, `mysql://` or `sqlite:` URL; may contain `${VAR}` placeholders.
    pub dsn: String,
    /// Create tables for the registered record types after connecting.
    #[serde(default)]
    pub sync: bool,
    #[serde(default)]
    pub retry: RetryCfg,
    #[serde(default)]
    pub pool: PoolCfg,
}

impl ConnectConfig {
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            ..Self::default()
        }
    }

    /// Extracts the section at `key` (e.g. `"database"`) from a figment.
    ///
    /// # Errors
    /// Returns `RepoError::InvalidConfig` if the section is missing or malformed.
    pub fn from_figment(figment: &Figment, key: &str) -> Result<Self> {
        figment
            .extract_inner(key)
            .map_err(|e| RepoError::InvalidConfig(e.to_string()))
    }

    /// DSN with environment placeholders expanded.
    ///
    /// # Errors
    /// Returns `RepoError::EnvVar` if a referenced variable is not set.
    pub fn resolved_dsn(&self) -> Result<String> {
        expand_env_vars(&self.dsn)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenancyEngine {
    #[default]
    Postgres,
    Mysql,
    Sqlite,
}

/// Where tenant databases live. For server engines the tenant id becomes the
/// database name; for `SQLite` it becomes a file name under `dir`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenancyConfig {
    #[serde(default)]
    pub engine: TenancyEngine,
    #[serde(default)]
    pub host: String,
    pub port: Option<u16>,
    #[serde(default)]
    pub user: String,
    /// Plain value or `${VAR}` reference.
    #[serde(default)]
    pub password: Option<String>,
    /// Database used for existence checks and `CREATE DATABASE`.
    pub admin_db: Option<String>,
    /// Directory holding one `<tenant>.db` file per tenant (`SQLite` only).
    pub dir: Option<PathBuf>,
    /// Create tables for the registered record types in each new tenant database.
    #[serde(default)]
    pub sync: bool,
    #[serde(default)]
    pub pool: PoolCfg,
}

impl TenancyConfig {
    /// Extracts the section at `key` from a figment.
    ///
    /// # Errors
    /// Returns `RepoError::InvalidConfig` if the section is missing or malformed.
    pub fn from_figment(figment: &Figment, key: &str) -> Result<Self> {
        figment
            .extract_inner(key)
            .map_err(|e| RepoError::InvalidConfig(e.to_string()))
    }

    #[must_use]
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(match self.engine {
            TenancyEngine::Mysql => 3306,
            TenancyEngine::Postgres | TenancyEngine::Sqlite => 5432,
        })
    }

    #[must_use]
    pub fn admin_db_or_default(&self) -> &str {
        match (&self.admin_db, self.engine) {
            (Some(db), _) => db.as_str(),
            (None, TenancyEngine::Mysql) => "mysql",
            (None, TenancyEngine::Postgres | TenancyEngine::Sqlite) => "postgres",
        }
    }

    /// Server URL for `database`, with the password resolved and percent-encoded.
    ///
    /// # Errors
    /// Returns `RepoError::EnvVar` for an unset password variable,
    /// `RepoError::InvalidConfig` for an unusable host.
    pub fn server_dsn(&self, database: &str) -> Result<String> {
        let scheme = match self.engine {
            TenancyEngine::Postgres => "postgres",
            TenancyEngine::Mysql => "mysql",
            TenancyEngine::Sqlite => {
                return Err(RepoError::InvalidConfig(
                    "sqlite tenancy has no server DSN".to_owned(),
                ));
            }
        };
        let invalid = |what: &str| RepoError::InvalidConfig(format!("tenancy: invalid {what}"));

        let mut url = url::Url::parse(&format!("{scheme}://localhost"))
            .map_err(|e| RepoError::InvalidConfig(e.to_string()))?;
        url.set_host(Some(&self.host)).map_err(|_| invalid("host"))?;
        url.set_port(Some(self.port_or_default()))
            .map_err(|()| invalid("port"))?;
        if !self.user.is_empty() {
            url.set_username(&self.user).map_err(|()| invalid("user"))?;
        }
        if let Some(password) = &self.password {
            let password = expand_env_vars(password)?;
            url.set_password(Some(&password))
                .map_err(|()| invalid("password"))?;
        }
        url.set_path(&format!("/{database}"));
        Ok(url.into())
    }
}

/// Replaces every `${VAR}` with the variable's value.
///
/// # Errors
/// Returns `RepoError::EnvVar` if any referenced variable is not set.
pub fn expand_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_owned();
    for caps in ENV_VAR_RE.captures_iter(input) {
        let value = std::env::var(&caps[1])?;
        result = result.replace(&caps[0], &value);
    }
    Ok(result)
}

/// Masks the password of a URL-shaped DSN for logging.
#[must_use]
pub fn redact_credentials_in_dsn(dsn: &str) -> String {
    if !dsn.contains('@') {
        return dsn.to_owned();
    }
    match url::Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() && parsed.set_password(Some("***")).is_err() {
                return "***".to_owned();
            }
            parsed.into()
        }
        Err(_) => "***".to_owned(),
    }
}
