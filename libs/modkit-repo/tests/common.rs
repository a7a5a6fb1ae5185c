#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use modkit_repo::{ConnectConfig, Connector, DbHandle, PoolCfg, Repository, SchemaSync};

pub mod widget {
    use modkit_repo::Record;
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(
        Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize, DeriveEntityModel, Record,
    )]
    #[sea_orm(table_name = "widgets")]
    #[record(
        soft_delete_col = "deleted_at",
        created_at_col = "created_at",
        updated_at_col = "updated_at"
    )]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub name: String,
        pub status: String,
        pub priority: i32,
        pub stock: i64,
        pub created_at: Option<DateTimeUtc>,
        pub updated_at: Option<DateTimeUtc>,
        pub deleted_at: Option<DateTimeUtc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod item {
    use modkit_repo::Record;
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(
        Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize, DeriveEntityModel, Record,
    )]
    #[sea_orm(table_name = "items")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub name: String,
        pub priority: i32,
        pub note: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod author {
    use modkit_repo::Record;
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(
        Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize, DeriveEntityModel, Record,
    )]
    #[sea_orm(table_name = "authors")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        #[sea_orm(unique)]
        pub name: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::book::Entity")]
        Book,
    }

    impl Related<super::book::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Book.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Stamped with a naive `DateTime` column rather than `DateTimeUtc`.
pub mod book {
    use modkit_repo::Record;
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(
        Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize, DeriveEntityModel, Record,
    )]
    #[sea_orm(table_name = "books")]
    #[record(created_at_col = "created_at")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub author_id: i64,
        pub title: String,
        pub created_at: DateTime,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::author::Entity",
            from = "Column::AuthorId",
            to = "super::author::Column::Id"
        )]
        Author,
    }

    impl Related<super::author::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Author.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

fn single_conn() -> PoolCfg {
    PoolCfg {
        max_conns: Some(1),
        ..PoolCfg::default()
    }
}

/// Fresh in-memory database with every test table.
pub async fn memory_db() -> DbHandle {
    let config = ConnectConfig {
        sync: true,
        pool: single_conn(),
        ..ConnectConfig::new("sqlite::memory:")
    };
    Connector::new(config)
        .with_schema(
            SchemaSync::new()
                .entity::<widget::Entity>()
                .entity::<item::Entity>()
                .entity::<author::Entity>()
                .entity::<book::Entity>(),
        )
        .connect()
        .await
        .expect("failed to open in-memory database")
}

pub async fn widgets() -> Repository<widget::Entity> {
    memory_db().await.repository().unwrap()
}

pub async fn items() -> Repository<item::Entity> {
    memory_db().await.repository().unwrap()
}

/// A running Postgres server; the container stops when this is dropped.
#[cfg(all(feature = "pg", feature = "integration"))]
pub struct PgUnderTest {
    pub host: String,
    pub port: u16,
    _container: testcontainers::ContainerAsync<testcontainers_modules::postgres::Postgres>,
}

/// Starts a Postgres container with superuser `user`/`pass` and database `app`.
///
/// # Errors
/// Returns an error if the container fails to start or become ready.
#[cfg(all(feature = "pg", feature = "integration"))]
pub async fn bring_up_postgres() -> anyhow::Result<PgUnderTest> {
    use testcontainers::{ContainerRequest, ImageExt, runners::AsyncRunner};
    use testcontainers_modules::postgres::Postgres;

    let container = ContainerRequest::from(Postgres::default())
        .with_env_var("POSTGRES_PASSWORD", "pass")
        .with_env_var("POSTGRES_USER", "user")
        .with_env_var("POSTGRES_DB", "app")
        .start()
        .await?;
    let port = container.get_host_port_ipv4(5432).await?;
    wait_for_tcp("127.0.0.1", port, std::time::Duration::from_secs(20)).await?;

    Ok(PgUnderTest {
        host: "127.0.0.1".to_owned(),
        port,
        _container: container,
    })
}

#[cfg(all(feature = "pg", feature = "integration"))]
async fn wait_for_tcp(host: &str, port: u16, timeout: std::time::Duration) -> anyhow::Result<()> {
    use tokio::{
        net::TcpStream,
        time::{Instant, sleep},
    };
    let deadline = Instant::now() + timeout;
    loop {
        if TcpStream::connect((host, port)).await.is_ok() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            anyhow::bail!("Timeout waiting for {host}:{port}");
        }
        sleep(std::time::Duration::from_millis(200)).await;
    }
}
