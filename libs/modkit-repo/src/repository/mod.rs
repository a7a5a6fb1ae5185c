//! Generic CRUD/query facade over a record type.
//!
//! Every read goes through one planning step: joins, the compiled predicate,
//! soft-delete scoping, ordering, pagination and projection are applied to a
//! `Select<E>` in that order. Single-row mutations first locate their target
//! with that same plan, so "zero rows" becomes `RepoError::NotFound` instead
//! of a silent no-op.

mod find;
mod mutation;

use std::sync::Arc;

use sea_orm::sea_query::{Alias, Expr, SimpleExpr};
use sea_orm::{
    Condition, DatabaseConnection, EntityTrait, JoinType, Order, PrimaryKeyTrait, QueryFilter,
    QueryOrder, QuerySelect, Select,
};

use crate::builder::{ColumnName, ResolveColumn, validate_column};
use crate::mapper::FieldTable;
use crate::query::{FindOptions, Query, SortDir};
use crate::record::Record;
use crate::{RepoError, Result};

/// Primary identifier type of a record.
pub type PrimaryKeyOf<E> = <<E as EntityTrait>::PrimaryKey as PrimaryKeyTrait>::ValueType;

/// CRUD and query operations for one record type.
///
/// Cheap to clone: it holds a pooled connection handle and a shared field table.
pub struct Repository<E: Record> {
    conn: DatabaseConnection,
    fields: Arc<FieldTable<E>>,
}

impl<E: Record> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            fields: Arc::clone(&self.fields),
        }
    }
}

impl<E: Record> std::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &E::default().table_name())
            .finish_non_exhaustive()
    }
}

/// Statement ready to run, plus the fields to project when not materializing whole rows.
struct Plan<E: EntityTrait> {
    select: Select<E>,
    projection: Vec<E::Column>,
    distinct: bool,
}

impl<E: Record> Repository<E> {
    /// Creates a repository over an open connection.
    ///
    /// # Errors
    /// Returns `RepoError::Mapping` if the record's zero value cannot be described.
    pub fn new(conn: DatabaseConnection) -> Result<Self> {
        Ok(Self {
            conn,
            fields: FieldTable::shared()?,
        })
    }

    #[must_use]
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// The field descriptor table used to map input for this record type.
    #[must_use]
    pub fn fields(&self) -> &FieldTable<E> {
        &self.fields
    }

    fn plan(&self, base: Select<E>, query: &Query, options: FindOptions) -> Result<Plan<E>> {
        let FindOptions {
            select: selected,
            distinct,
            order,
            limit,
            offset,
            with_deleted,
            related,
        } = options;

        let mut select = base;
        for rel in related {
            select = select.join(JoinType::LeftJoin, rel);
        }
        if let Some(cond) = query.compile(&*self.fields)? {
            select = select.filter(cond);
        }
        if !with_deleted && let Some(live) = live_rows::<E>() {
            select = select.filter(live);
        }
        for sort in &order {
            let expr = self.fields.column_expr(&sort.column)?;
            let ord = match sort.dir {
                SortDir::Asc => Order::Asc,
                SortDir::Desc => Order::Desc,
            };
            select = select.order_by(expr, ord);
        }
        if let Some(n) = limit {
            select = select.limit(n);
        }
        if let Some(n) = offset {
            select = select.offset(n);
        }

        let mut projection: Vec<E::Column> = Vec::new();
        for name in distinct.iter().chain(&selected) {
            let column = self.projected(name)?;
            if !projection
                .iter()
                .any(|c| crate::record::same_column(c, &column))
            {
                projection.push(column);
            }
        }

        Ok(Plan {
            select,
            projection,
            distinct: !distinct.is_empty(),
        })
    }

    fn projected(&self, name: &str) -> Result<E::Column> {
        match validate_column(name)? {
            ColumnName::Plain(c) => self
                .fields
                .column(c)
                .ok_or_else(|| RepoError::InvalidField(name.to_owned())),
            ColumnName::Qualified { .. } => Err(RepoError::InvalidField(name.to_owned())),
        }
    }

    /// Predicate for statements that touch many rows. A missing predicate
    /// becomes an explicit `TRUE` so no statement goes out unconstrained.
    fn mass_condition(&self, query: &Query, live_only: bool) -> Result<Condition> {
        let mut cond = Condition::all().add(
            query
                .compile(&*self.fields)?
                .unwrap_or_else(|| Condition::all().add(Expr::value(true))),
        );
        if live_only && let Some(live) = live_rows::<E>() {
            cond = cond.add(live);
        }
        Ok(cond)
    }

    async fn fetch_all(&self, plan: Plan<E>) -> Result<Vec<E::Model>> {
        if plan.projection.is_empty() {
            return plan.select.all(&self.conn).await.map_err(RepoError::Query);
        }
        let rows = project(plan)
            .into_json()
            .all(&self.conn)
            .await
            .map_err(RepoError::Query)?;
        rows.iter()
            .map(|row| self.fields.partial_from_json(row, &[]).map(|p| p.model))
            .collect()
    }

    async fn fetch_one(&self, plan: Plan<E>) -> Result<Option<E::Model>> {
        if plan.projection.is_empty() {
            return plan.select.one(&self.conn).await.map_err(RepoError::Query);
        }
        let row = project(plan)
            .into_json()
            .one(&self.conn)
            .await
            .map_err(RepoError::Query)?;
        row.map(|r| self.fields.partial_from_json(&r, &[]).map(|p| p.model))
            .transpose()
    }

    /// Finds the single target of a one-row mutation.
    async fn locate(
        &self,
        base: Select<E>,
        query: &Query,
        with_deleted: bool,
    ) -> Result<E::Model> {
        let options = FindOptions {
            with_deleted,
            ..FindOptions::default()
        };
        let plan = self.plan(base, query, options)?;
        self.fetch_one(plan).await?.ok_or(RepoError::NotFound)
    }
}

fn project<E: EntityTrait>(plan: Plan<E>) -> Select<E> {
    let mut select = plan.select.select_only();
    for column in plan.projection {
        select = select.column(column);
    }
    if plan.distinct {
        select = select.distinct();
    }
    select
}

/// `deleted_at IS NULL` for record types with soft delete.
fn live_rows<E: Record>() -> Option<SimpleExpr> {
    E::soft_delete_col().map(|col| Expr::col((E::default(), col)).is_null())
}

impl<E: Record> ResolveColumn for FieldTable<E> {
    /// Plain names must be declared fields and resolve case-insensitively to the
    /// record's own, table-qualified column. `table.column` passes through as
    /// written so joined tables stay reachable.
    fn column_expr(&self, name: &str) -> Result<SimpleExpr> {
        Ok(match validate_column(name)? {
            ColumnName::Plain(c) => match self.column(c) {
                Some(col) => Expr::col((E::default(), col)).into(),
                None => return Err(RepoError::InvalidColumn(name.to_owned())),
            },
            ColumnName::Qualified { table, column } => {
                Expr::col((Alias::new(table), Alias::new(column))).into()
            }
        })
    }
}
