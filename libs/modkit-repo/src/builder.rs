//! Chainable predicate builder.
//!
//! Clauses are recorded in call order and only turned into a `sea_query`
//! condition when a repository runs them, so column names can be resolved
//! against the target record type. Values are always bound parameters;
//! column names are the only caller text spliced into SQL and every one of
//! them passes through [`validate_column`] first.

use std::sync::LazyLock;

use regex::Regex;
use sea_orm::sea_query::{BinOper, Expr, Func, SimpleExpr};
use sea_orm::{Condition, Value};

use crate::{RepoError, Result};

/// Longest identifier segment accepted; matches the `PostgreSQL` limit.
const MAX_IDENT_LEN: usize = 63;

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("static regex should not panic")
});

/// A column reference that passed the allow-list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnName<'a> {
    Plain(&'a str),
    Qualified { table: &'a str, column: &'a str },
}

/// Checks a caller-supplied column name against the identifier allow-list.
///
/// Accepts `column` or `table.column`, each segment made of ASCII letters,
/// digits and underscores, not starting with a digit.
///
/// # Errors
/// Returns `RepoError::InvalidColumn` for anything else.
pub fn validate_column(name: &str) -> Result<ColumnName<'_>> {
    if !COLUMN_RE.is_match(name) {
        return Err(RepoError::InvalidColumn(name.to_owned()));
    }
    let parsed = match name.split_once('.') {
        Some((table, column)) => ColumnName::Qualified { table, column },
        None => ColumnName::Plain(name),
    };
    let too_long = match parsed {
        ColumnName::Plain(c) => c.len() > MAX_IDENT_LEN,
        ColumnName::Qualified { table, column } => {
            table.len() > MAX_IDENT_LEN || column.len() > MAX_IDENT_LEN
        }
    };
    if too_long {
        return Err(RepoError::InvalidColumn(name.to_owned()));
    }
    Ok(parsed)
}

/// Turns a validated column name into an SQL expression for a given record type.
pub(crate) trait ResolveColumn {
    fn column_expr(&self, name: &str) -> Result<SimpleExpr>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Join {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cmp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Clone, Debug, PartialEq)]
enum Clause {
    Compare { column: String, op: Cmp, value: Value },
    Not { column: String, value: Value },
    In { column: String, values: Vec<Value>, negated: bool },
    Like { column: String, pattern: String, case_insensitive: bool },
    Between { column: String, low: Value, high: Value },
    IsNull { column: String },
    Raw { sql: String, values: Vec<Value> },
}

/// Ordered list of filter clauses built through chained calls.
///
/// ```
/// use modkit_repo::QueryBuilder;
///
/// let mut qb = QueryBuilder::new();
/// qb.equal("status", "active").more_than("priority", 1).or("name", "pinned");
/// assert_eq!(qb.len(), 3);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuilder {
    clauses: Vec<(Join, Clause)>,
}

impl QueryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    fn push(&mut self, join: Join, clause: Clause) -> &mut Self {
        self.clauses.push((join, clause));
        self
    }

    fn compare(&mut self, column: &str, op: Cmp, value: impl Into<Value>) -> &mut Self {
        self.push(
            Join::And,
            Clause::Compare {
                column: column.to_owned(),
                op,
                value: value.into(),
            },
        )
    }

    /// `column = value`
    pub fn equal(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.compare(column, Cmp::Eq, value)
    }

    /// `column <> value`
    pub fn not_equal(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.compare(column, Cmp::Ne, value)
    }

    /// `NOT (column = value)`
    pub fn not(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.push(
            Join::And,
            Clause::Not {
                column: column.to_owned(),
                value: value.into(),
            },
        )
    }

    /// `(everything so far) OR column = value`
    pub fn or(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.push(
            Join::Or,
            Clause::Compare {
                column: column.to_owned(),
                op: Cmp::Eq,
                value: value.into(),
            },
        )
    }

    /// `column IN (...)`
    pub fn in_<I, V>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push(
            Join::And,
            Clause::In {
                column: column.to_owned(),
                values: values.into_iter().map(Into::into).collect(),
                negated: false,
            },
        )
    }

    /// `column NOT IN (...)`
    pub fn not_in<I, V>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push(
            Join::And,
            Clause::In {
                column: column.to_owned(),
                values: values.into_iter().map(Into::into).collect(),
                negated: true,
            },
        )
    }

    /// `column > value`
    pub fn more_than(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.compare(column, Cmp::Gt, value)
    }

    /// `column >= value`
    pub fn more_than_or_equal(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.compare(column, Cmp::Gte, value)
    }

    /// `column < value`
    pub fn less_than(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.compare(column, Cmp::Lt, value)
    }

    /// `column <= value`
    pub fn less_than_or_equal(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.compare(column, Cmp::Lte, value)
    }

    /// `column LIKE pattern`
    pub fn like(&mut self, column: &str, pattern: impl Into<String>) -> &mut Self {
        self.push(
            Join::And,
            Clause::Like {
                column: column.to_owned(),
                pattern: pattern.into(),
                case_insensitive: false,
            },
        )
    }

    /// Case-insensitive pattern match, rendered as `LOWER(column) LIKE LOWER(pattern)`.
    /// Both sides are folded by the engine, so a value always matches its own text.
    pub fn ilike(&mut self, column: &str, pattern: impl Into<String>) -> &mut Self {
        self.push(
            Join::And,
            Clause::Like {
                column: column.to_owned(),
                pattern: pattern.into(),
                case_insensitive: true,
            },
        )
    }

    /// `column BETWEEN low AND high`
    pub fn between(
        &mut self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> &mut Self {
        self.push(
            Join::And,
            Clause::Between {
                column: column.to_owned(),
                low: low.into(),
                high: high.into(),
            },
        )
    }

    /// `column IS NULL`
    pub fn is_null(&mut self, column: &str) -> &mut Self {
        self.push(
            Join::And,
            Clause::IsNull {
                column: column.to_owned(),
            },
        )
    }

    /// Custom expression with `?` placeholders, AND-ed in as-is.
    ///
    /// The expression text is trusted; only its values are bound.
    pub fn raw<I, V>(&mut self, sql: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push(
            Join::And,
            Clause::Raw {
                sql: sql.to_owned(),
                values: values.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// Folds the clauses left to right; `Or` wraps everything before it.
    ///
    /// Returns `None` for an empty builder. Fails on the first invalid column.
    pub(crate) fn compile(&self, resolver: &impl ResolveColumn) -> Result<Option<Condition>> {
        let mut acc: Option<Condition> = None;
        for (join, clause) in &self.clauses {
            let expr = clause_expr(clause, resolver)?;
            acc = Some(match (acc, join) {
                (None, _) => Condition::all().add(expr),
                (Some(prev), Join::And) => Condition::all().add(prev).add(expr),
                (Some(prev), Join::Or) => Condition::any().add(prev).add(expr),
            });
        }
        Ok(acc)
    }
}

fn clause_expr(clause: &Clause, resolver: &impl ResolveColumn) -> Result<Condition> {
    let col = |name: &str| resolver.column_expr(name).map(Expr::expr);
    let cond = match clause {
        Clause::Compare { column, op, value } => {
            let c = col(column)?;
            let value = value.clone();
            let e = match op {
                Cmp::Eq => c.eq(value),
                Cmp::Ne => c.ne(value),
                Cmp::Gt => c.gt(value),
                Cmp::Gte => c.gte(value),
                Cmp::Lt => c.lt(value),
                Cmp::Lte => c.lte(value),
            };
            Condition::all().add(e)
        }
        Clause::Not { column, value } => Condition::all().add(col(column)?.eq(value.clone())).not(),
        Clause::In {
            column,
            values,
            negated,
        } => {
            let c = col(column)?;
            let values = values.iter().cloned();
            Condition::all().add(if *negated {
                c.is_not_in(values)
            } else {
                c.is_in(values)
            })
        }
        Clause::Like {
            column,
            pattern,
            case_insensitive: false,
        } => Condition::all().add(col(column)?.like(pattern.as_str())),
        Clause::Like {
            column,
            pattern,
            case_insensitive: true,
        } => {
            let lowered = Expr::expr(Func::lower(resolver.column_expr(column)?));
            let folded = Func::lower(Expr::val(pattern.as_str()));
            Condition::all().add(lowered.binary(BinOper::Like, folded))
        }
        Clause::Between { column, low, high } => {
            Condition::all().add(col(column)?.between(low.clone(), high.clone()))
        }
        Clause::IsNull { column } => Condition::all().add(col(column)?.is_null()),
        Clause::Raw { sql, values } => {
            Condition::all().add(Expr::cust_with_values(sql.as_str(), values.iter().cloned()))
        }
    };
    Ok(cond)
}
