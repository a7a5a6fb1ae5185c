//! Filter predicates and per-call query options.

use std::fmt;
use std::str::FromStr;

use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{Condition, RelationDef, Value};
use serde_json::Value as JsonValue;

use crate::builder::{QueryBuilder, ResolveColumn};
use crate::{RepoError, Result};

/// Which rows an operation targets.
#[derive(Clone, Debug, Default)]
pub enum Query {
    /// No predicate: every (live) row.
    #[default]
    All,
    /// Equality conjunction over named columns; `None` matches NULL.
    Matching(Vec<(String, Option<Value>)>),
    /// Typed condition over the entity's own columns.
    Condition(Condition),
    /// Clauses recorded through the predicate builder.
    Builder(QueryBuilder),
}

impl Query {
    #[must_use]
    pub fn all() -> Self {
        Query::All
    }

    /// Equality conjunction, e.g. `Query::matching([("name", "a"), ("status", "b")])`.
    #[must_use]
    pub fn matching<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Query::Matching(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        )
    }

    /// Builds a predicate through a builder callback.
    #[must_use]
    pub fn build(f: impl FnOnce(&mut QueryBuilder)) -> Self {
        let mut qb = QueryBuilder::new();
        f(&mut qb);
        Query::Builder(qb)
    }

    /// Equality conjunction from a JSON object; `null` values match NULL.
    ///
    /// # Errors
    /// Returns `RepoError::InvalidConfig` if `map` is not an object.
    pub fn from_json(map: &JsonValue) -> Result<Self> {
        let JsonValue::Object(obj) = map else {
            return Err(RepoError::InvalidConfig(
                "equality predicate must be a JSON object".to_owned(),
            ));
        };
        Ok(Query::Matching(
            obj.iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect(),
        ))
    }

    pub(crate) fn compile(&self, resolver: &impl ResolveColumn) -> Result<Option<Condition>> {
        match self {
            Query::All => Ok(None),
            Query::Matching(pairs) if pairs.is_empty() => Ok(None),
            Query::Matching(pairs) => {
                let mut cond = Condition::all();
                for (column, value) in pairs {
                    let col = Expr::expr(resolver.column_expr(column)?);
                    cond = cond.add(match value {
                        Some(v) => col.eq(v.clone()),
                        None => col.is_null(),
                    });
                }
                Ok(Some(cond))
            }
            Query::Condition(c) => Ok(Some(c.clone())),
            Query::Builder(qb) => qb.compile(resolver),
        }
    }
}

impl From<Condition> for Query {
    fn from(c: Condition) -> Self {
        Query::Condition(c)
    }
}

impl From<SimpleExpr> for Query {
    fn from(e: SimpleExpr) -> Self {
        Query::Condition(Condition::all().add(e))
    }
}

impl From<QueryBuilder> for Query {
    fn from(qb: QueryBuilder) -> Self {
        Query::Builder(qb)
    }
}

impl From<()> for Query {
    fn from((): ()) -> Self {
        Query::All
    }
}

fn json_to_value(v: &JsonValue) -> Option<Value> {
    match v {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some((*b).into()),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::from)
            .or_else(|| n.as_u64().map(Value::from))
            .or_else(|| n.as_f64().map(Value::from)),
        JsonValue::String(s) => Some(s.clone().into()),
        other => Some(Value::Json(Some(Box::new(other.clone())))),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// One sort clause; orders are applied in sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    pub column: String,
    pub dir: SortDir,
}

impl Sort {
    #[must_use]
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            dir: SortDir::Asc,
        }
    }

    #[must_use]
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            dir: SortDir::Desc,
        }
    }
}

impl FromStr for Sort {
    type Err = RepoError;

    /// Parses `"name"`, `"name asc"` or `"name desc"` (direction is case-insensitive).
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let (Some(column), dir, None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(RepoError::InvalidColumn(s.to_owned()));
        };
        let dir = match dir {
            None => SortDir::Asc,
            Some(d) if d.eq_ignore_ascii_case("asc") => SortDir::Asc,
            Some(d) if d.eq_ignore_ascii_case("desc") => SortDir::Desc,
            Some(_) => return Err(RepoError::InvalidColumn(s.to_owned())),
        };
        Ok(Self {
            column: column.to_owned(),
            dir,
        })
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dir {
            SortDir::Asc => write!(f, "{} asc", self.column),
            SortDir::Desc => write!(f, "{} desc", self.column),
        }
    }
}

/// Options accepted by list reads.
///
/// Every field is optional; the default means "engine default".
#[derive(Default)]
pub struct FindOptions {
    /// Restrict the projected fields; the rest come back as zero values.
    pub select: Vec<String>,
    /// Project and deduplicate on these fields.
    pub distinct: Vec<String>,
    pub order: Vec<Sort>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Include soft-deleted rows.
    pub with_deleted: bool,
    /// Relations joined into the same statement (LEFT JOIN).
    pub related: Vec<RelationDef>,
}

impl FindOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn distinct<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.distinct.extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn order_by(mut self, sort: Sort) -> Self {
        self.order.push(sort);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }

    #[must_use]
    pub fn join(mut self, rel: RelationDef) -> Self {
        self.related.push(rel);
        self
    }
}

/// Options accepted by single-row reads.
#[derive(Default)]
pub struct FindOneOptions {
    pub select: Vec<String>,
    pub order: Vec<Sort>,
    pub with_deleted: bool,
    pub related: Vec<RelationDef>,
}

impl FindOneOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn order_by(mut self, sort: Sort) -> Self {
        self.order.push(sort);
        self
    }

    #[must_use]
    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }

    #[must_use]
    pub fn join(mut self, rel: RelationDef) -> Self {
        self.related.push(rel);
        self
    }
}

impl From<FindOneOptions> for FindOptions {
    fn from(o: FindOneOptions) -> Self {
        Self {
            select: o.select,
            order: o.order,
            with_deleted: o.with_deleted,
            related: o.related,
            ..Self::default()
        }
    }
}

/// How a delete treats record types with a soft-delete column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeleteMode {
    /// Stamp the soft-delete column; hard delete when the type has none.
    #[default]
    Soft,
    /// Remove the row, including rows already soft-deleted.
    Force,
}
