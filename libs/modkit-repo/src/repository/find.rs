use sea_orm::{EntityTrait, LoaderTrait, PaginatorTrait, Related};

use super::{PrimaryKeyOf, Repository};
use crate::query::{FindOneOptions, FindOptions, Query};
use crate::record::Record;
use crate::{RepoError, Result};

impl<E: Record> Repository<E> {
    /// All rows matching `query`, decorated per `options`. No match is an empty list.
    ///
    /// # Errors
    /// `RepoError::InvalidColumn`/`InvalidField` for bad names, `RepoError::Query` on engine failure.
    pub async fn find_all<Q>(&self, query: Q, options: FindOptions) -> Result<Vec<E::Model>>
    where
        Q: Into<Query> + Send,
    {
        let plan = self.plan(E::find(), &query.into(), options)?;
        self.fetch_all(plan).await
    }

    /// First row matching `query` in `options.order`, or `None`.
    ///
    /// # Errors
    /// Same as [`Repository::find_all`].
    pub async fn find_one<Q>(&self, query: Q, options: FindOneOptions) -> Result<Option<E::Model>>
    where
        Q: Into<Query> + Send,
    {
        let plan = self.plan(E::find(), &query.into(), options.into())?;
        self.fetch_one(plan).await
    }

    /// Row with the given primary key, or `None`.
    ///
    /// # Errors
    /// Same as [`Repository::find_all`].
    pub async fn find_by_id<K>(&self, id: K, options: FindOneOptions) -> Result<Option<E::Model>>
    where
        K: Into<PrimaryKeyOf<E>> + Send,
    {
        let plan = self.plan(E::find_by_id(id), &Query::All, options.into())?;
        self.fetch_one(plan).await
    }

    /// Number of live rows matching `query`.
    ///
    /// # Errors
    /// Same as [`Repository::find_all`].
    pub async fn count<Q>(&self, query: Q) -> Result<u64>
    where
        Q: Into<Query> + Send,
    {
        let plan = self.plan(E::find(), &query.into(), FindOptions::default())?;
        plan.select
            .count(&self.conn)
            .await
            .map_err(RepoError::Query)
    }

    /// Whether [`Repository::find_one`] would return a row.
    ///
    /// # Errors
    /// Same as [`Repository::find_all`].
    pub async fn exist<Q>(&self, query: Q, options: FindOneOptions) -> Result<bool>
    where
        Q: Into<Query> + Send,
    {
        Ok(self.find_one(query, options).await?.is_some())
    }

    /// Like [`Repository::find_all`], then loads each row's has-many relation `R`
    /// with one follow-up query.
    ///
    /// # Errors
    /// Same as [`Repository::find_all`].
    pub async fn find_all_with_related<R, Q>(
        &self,
        query: Q,
        options: FindOptions,
    ) -> Result<Vec<(E::Model, Vec<R::Model>)>>
    where
        R: EntityTrait,
        R::Model: Send + Sync,
        E: Related<R>,
        Q: Into<Query> + Send,
    {
        let models = self.find_all(query, options).await?;
        let related = models
            .load_many(R::find(), &self.conn)
            .await
            .map_err(RepoError::Query)?;
        Ok(models.into_iter().zip(related).collect())
    }

    /// Like [`Repository::find_all`], then loads each row's belongs-to/has-one
    /// relation `R` with one follow-up query.
    ///
    /// # Errors
    /// Same as [`Repository::find_all`].
    pub async fn find_all_with_one<R, Q>(
        &self,
        query: Q,
        options: FindOptions,
    ) -> Result<Vec<(E::Model, Option<R::Model>)>>
    where
        R: EntityTrait,
        R::Model: Send + Sync,
        E: Related<R>,
        Q: Into<Query> + Send,
    {
        let models = self.find_all(query, options).await?;
        let related = models
            .load_one(R::find(), &self.conn)
            .await
            .map_err(RepoError::Query)?;
        Ok(models.into_iter().zip(related).collect())
    }
}
