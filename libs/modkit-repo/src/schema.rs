//! Table creation for registered record types.

use sea_orm::sea_query::TableCreateStatement;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};
use tracing::debug;

type TableFactory = fn(&Schema) -> TableCreateStatement;

/// Record types whose tables are created (if missing) when a database is synced.
///
/// This only creates what is absent; it never alters or drops existing tables.
#[derive(Clone, Default)]
pub struct SchemaSync {
    tables: Vec<(String, TableFactory)>,
}

impl std::fmt::Debug for SchemaSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tables())
            .finish()
    }
}

fn create_table<E: EntityTrait>(schema: &Schema) -> TableCreateStatement {
    let mut stmt = schema.create_table_from_entity(E::default());
    stmt.if_not_exists();
    stmt
}

impl SchemaSync {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record type; tables are created in registration order.
    #[must_use]
    pub fn entity<E: EntityTrait>(mut self) -> Self {
        self.tables
            .push((E::default().table_name().to_owned(), create_table::<E> as TableFactory));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Names of the registered tables.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|(name, _)| name.as_str())
    }

    /// Creates every registered table that does not exist yet.
    ///
    /// # Errors
    /// Returns the engine error of the first statement that fails.
    pub async fn apply<C: ConnectionTrait>(&self, conn: &C) -> Result<(), DbErr> {
        let backend = conn.get_database_backend();
        let schema = Schema::new(backend);
        for (_, factory) in &self.tables {
            let stmt = factory(&schema);
            conn.execute(backend.build(&stmt)).await?;
        }
        debug!(tables = self.tables.len(), "schema synchronized");
        Ok(())
    }
}
