use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Iterable, QueryFilter};
use serde::Serialize;
use tracing::debug;

use super::{PrimaryKeyOf, Repository};
use crate::error::store_err;
use crate::query::{DeleteMode, Query};
use crate::record::{Record, primary_key_condition, timestamp_value};
use crate::{RepoError, Result};

fn create_stamps<E: Record>() -> Vec<E::Column> {
    E::created_at_col().into_iter().chain(E::updated_at_col()).collect()
}

fn update_stamps<E: Record>() -> Vec<E::Column> {
    E::updated_at_col().into_iter().collect()
}

#[derive(Clone, Copy, Debug)]
enum Shift {
    Up(i64),
    Down(i64),
}

/// Whether two insert rows set the same columns and can share one multi-row statement.
fn same_shape<E: Record>(a: &E::ActiveModel, b: &E::ActiveModel) -> bool {
    E::Column::iter().all(|c| a.is_not_set(c) == b.is_not_set(c))
}

impl<E: Record> Repository<E> {
    /// Maps `input` onto a fresh record and inserts it.
    ///
    /// Returns the stored row, including engine-assigned keys and defaults.
    ///
    /// # Errors
    /// `RepoError::Mapping` for unusable input, `RepoError::Store` if the engine rejects the row.
    pub async fn create<I>(&self, input: &I) -> Result<E::Model>
    where
        I: Serialize + Sync + ?Sized,
    {
        let row = self.fields.partial(input, &create_stamps::<E>())?.into_insert();
        let model = row.insert(&self.conn).await.map_err(RepoError::Store)?;
        debug!(table = E::default().table_name(), "record created");
        Ok(model)
    }

    /// Maps every element of a sequence input and inserts them `batch_size` rows
    /// per statement (`0` means all at once). Rows come back in input order.
    ///
    /// Chunks are not atomic as a group: a failing chunk stops the run and the
    /// chunks before it stay committed. Consecutive rows that set different
    /// column sets go out as separate statements. Engines without `RETURNING`
    /// insert row by row.
    ///
    /// # Errors
    /// `RepoError::Mapping` for unusable input, `RepoError::Store` for the first failing chunk.
    pub async fn batch_create<I>(&self, input: &I, batch_size: usize) -> Result<Vec<E::Model>>
    where
        I: Serialize + Sync + ?Sized,
    {
        let rows: Vec<E::ActiveModel> = self
            .fields
            .partials(input, &create_stamps::<E>())?
            .into_iter()
            .map(crate::mapper::Partial::into_insert)
            .collect();
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let chunk_size = if batch_size == 0 { rows.len() } else { batch_size };
        let returning = self.conn.support_returning();

        let mut inserted = Vec::with_capacity(rows.len());
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let mut chunk: Vec<E::ActiveModel> = Vec::with_capacity(chunk_size);
            while chunk.len() < chunk_size
                && let Some(next) =
                    rows.next_if(|r| chunk.last().is_none_or(|l| same_shape::<E>(l, r)))
            {
                chunk.push(next);
            }
            let len = chunk.len();
            if returning {
                let models = E::insert_many(chunk)
                    .exec_with_returning_many(&self.conn)
                    .await
                    .map_err(RepoError::Store)?;
                inserted.extend(models);
            } else {
                for row in chunk {
                    inserted.push(row.insert(&self.conn).await.map_err(RepoError::Store)?);
                }
            }
            debug!(table = E::default().table_name(), rows = len, "batch chunk inserted");
        }
        Ok(inserted)
    }

    /// Locates the single row matching `query` and applies the supplied fields to it.
    ///
    /// Returns the row as stored after the update. Input carrying no updatable
    /// field leaves the row untouched and returns it as located.
    ///
    /// # Errors
    /// `RepoError::NotFound` if nothing matches, `RepoError::Store` if the engine rejects the update.
    pub async fn update_one<Q, I>(&self, query: Q, input: &I) -> Result<E::Model>
    where
        Q: Into<Query> + Send,
        I: Serialize + Sync + ?Sized,
    {
        let query = query.into();
        let partial = self.fields.partial(input, &update_stamps::<E>())?;
        let located = self.locate(E::find(), &query, false).await?;
        self.apply_update(located, partial).await
    }

    /// [`Repository::update_one`] targeting a primary key.
    ///
    /// # Errors
    /// Same as [`Repository::update_one`].
    pub async fn update_by_id<K, I>(&self, id: K, input: &I) -> Result<E::Model>
    where
        K: Into<PrimaryKeyOf<E>> + Send,
        I: Serialize + Sync + ?Sized,
    {
        let partial = self.fields.partial(input, &update_stamps::<E>())?;
        let located = self.locate(E::find_by_id(id), &Query::All, false).await?;
        self.apply_update(located, partial).await
    }

    async fn apply_update(
        &self,
        located: E::Model,
        partial: crate::mapper::Partial<E>,
    ) -> Result<E::Model> {
        if !partial.has_updates() {
            return Ok(located);
        }
        let model = partial
            .apply_to(located)
            .update(&self.conn)
            .await
            .map_err(store_err)?;
        debug!(table = E::default().table_name(), "record updated");
        Ok(model)
    }

    /// Applies the supplied fields to every live row matching `query`
    /// (`Query::All` matches every live row). Returns the number of rows changed.
    ///
    /// # Errors
    /// `RepoError::InvalidColumn` for bad predicate names, `RepoError::Store` on engine failure.
    pub async fn update_many<Q, I>(&self, query: Q, input: &I) -> Result<u64>
    where
        Q: Into<Query> + Send,
        I: Serialize + Sync + ?Sized,
    {
        let query = query.into();
        let partial = self.fields.partial(input, &update_stamps::<E>())?;
        if !partial.has_updates() {
            return Ok(0);
        }
        let cond = self.mass_condition(&query, true)?;
        let res = E::update_many()
            .set(partial.into_changes())
            .filter(cond)
            .exec(&self.conn)
            .await
            .map_err(RepoError::Store)?;
        debug!(
            table = E::default().table_name(),
            rows = res.rows_affected,
            "records updated"
        );
        Ok(res.rows_affected)
    }

    /// Locates the single row matching `query` and deletes it.
    ///
    /// `DeleteMode::Force` also finds rows that are already soft-deleted, and removes them.
    ///
    /// # Errors
    /// `RepoError::NotFound` if nothing matches, `RepoError::Store` on engine failure.
    pub async fn delete_one<Q>(&self, query: Q, mode: DeleteMode) -> Result<()>
    where
        Q: Into<Query> + Send,
    {
        let query = query.into();
        let located = self
            .locate(E::find(), &query, mode == DeleteMode::Force)
            .await?;
        self.remove(&located, mode).await
    }

    /// [`Repository::delete_one`] targeting a primary key.
    ///
    /// # Errors
    /// Same as [`Repository::delete_one`].
    pub async fn delete_by_id<K>(&self, id: K, mode: DeleteMode) -> Result<()>
    where
        K: Into<PrimaryKeyOf<E>> + Send,
    {
        let located = self
            .locate(E::find_by_id(id), &Query::All, mode == DeleteMode::Force)
            .await?;
        self.remove(&located, mode).await
    }

    async fn remove(&self, located: &E::Model, mode: DeleteMode) -> Result<()> {
        let pk = primary_key_condition::<E>(located);
        let res = match (mode, E::soft_delete_col()) {
            (DeleteMode::Soft, Some(col)) => {
                E::update_many()
                    .col_expr(col, Expr::value(timestamp_value(&col, chrono::Utc::now())))
                    .filter(pk)
                    .exec(&self.conn)
                    .await
                    .map(|r| r.rows_affected)
            }
            _ => E::delete_many()
                .filter(pk)
                .exec(&self.conn)
                .await
                .map(|r| r.rows_affected),
        }
        .map_err(RepoError::Store)?;
        if res == 0 {
            return Err(RepoError::NotFound);
        }
        debug!(table = E::default().table_name(), ?mode, "record deleted");
        Ok(())
    }

    /// Deletes every row matching `query`. Zero matches is success.
    ///
    /// Soft mode stamps only live rows; force mode removes matching rows outright.
    ///
    /// # Errors
    /// `RepoError::InvalidColumn` for bad predicate names, `RepoError::Store` on engine failure.
    pub async fn delete_many<Q>(&self, query: Q, mode: DeleteMode) -> Result<u64>
    where
        Q: Into<Query> + Send,
    {
        let query = query.into();
        let rows = match (mode, E::soft_delete_col()) {
            (DeleteMode::Soft, Some(col)) => {
                let cond = self.mass_condition(&query, true)?;
                E::update_many()
                    .col_expr(col, Expr::value(timestamp_value(&col, chrono::Utc::now())))
                    .filter(cond)
                    .exec(&self.conn)
                    .await
                    .map_err(RepoError::Store)?
                    .rows_affected
            }
            _ => {
                let cond = self.mass_condition(&query, false)?;
                E::delete_many()
                    .filter(cond)
                    .exec(&self.conn)
                    .await
                    .map_err(RepoError::Store)?
                    .rows_affected
            }
        };
        debug!(table = E::default().table_name(), rows, ?mode, "records deleted");
        Ok(rows)
    }

    /// Atomically adds `amount` to a numeric column of the row with the given key.
    ///
    /// # Errors
    /// `RepoError::NotFound` for an unknown key, `RepoError::InvalidField` if `field`
    /// is not a column of the record, `RepoError::Store` on engine failure.
    pub async fn increment<K>(&self, id: K, field: &str, amount: i64) -> Result<()>
    where
        K: Into<PrimaryKeyOf<E>> + Send,
    {
        self.shift(id, field, Shift::Up(amount)).await
    }

    /// Atomically subtracts `amount` from a numeric column of the row with the given key.
    ///
    /// # Errors
    /// Same as [`Repository::increment`].
    pub async fn decrement<K>(&self, id: K, field: &str, amount: i64) -> Result<()>
    where
        K: Into<PrimaryKeyOf<E>> + Send,
    {
        self.shift(id, field, Shift::Down(amount)).await
    }

    async fn shift<K>(&self, id: K, field: &str, shift: Shift) -> Result<()>
    where
        K: Into<PrimaryKeyOf<E>> + Send,
    {
        let located = self.locate(E::find_by_id(id), &Query::All, false).await?;
        let column = self
            .fields
            .column(field)
            .ok_or_else(|| RepoError::InvalidField(field.to_owned()))?;
        let expr = match shift {
            Shift::Up(n) => Expr::col(column).add(n),
            Shift::Down(n) => Expr::col(column).sub(n),
        };
        E::update_many()
            .col_expr(column, expr)
            .filter(primary_key_condition::<E>(&located))
            .exec(&self.conn)
            .await
            .map_err(RepoError::Store)?;
        debug!(table = E::default().table_name(), field, ?shift, "counter shifted");
        Ok(())
    }
}
