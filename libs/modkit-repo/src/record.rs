use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelBehavior, ColumnTrait, ColumnType, Condition, EntityTrait, IdenStatic,
    IntoActiveModel, Iterable, ModelTrait, PrimaryKeyToColumn, Value,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Binds a `SeaORM` entity to the repository layer.
///
/// The entity's `Model::default()` is the record's zero value: the field mapper
/// starts every create from it, and projections fill unselected fields with it.
/// The primary key columns are the record's immutable identifier.
///
/// Every hook defaults to "none", so a plain entity only needs an empty impl.
///
/// # Example (Using Derive Macro)
/// ```rust,ignore
/// use modkit_repo::Record;
///
/// #[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize, DeriveEntityModel, Record)]
/// #[sea_orm(table_name = "articles")]
/// #[record(soft_delete_col = "deleted_at", created_at_col = "created_at", updated_at_col = "updated_at")]
/// pub struct Model {
///     #[sea_orm(primary_key)]
///     pub id: i32,
///     pub title: String,
///     pub created_at: Option<DateTimeUtc>,
///     pub updated_at: Option<DateTimeUtc>,
///     pub deleted_at: Option<DateTimeUtc>,
/// }
/// ```
pub trait Record:
    EntityTrait<
        Model: Default
                   + Serialize
                   + DeserializeOwned
                   + IntoActiveModel<<Self as EntityTrait>::ActiveModel>
                   + Send
                   + Sync,
        ActiveModel: ActiveModelBehavior + Send,
    >
{
    /// Nullable timestamp column marking logical deletion.
    ///
    /// When set, default scans only see rows where the column is NULL and
    /// deletes stamp it instead of removing the row.
    fn soft_delete_col() -> Option<Self::Column> {
        None
    }

    /// Column stamped with the current UTC time on create, unless the input supplies it.
    fn created_at_col() -> Option<Self::Column> {
        None
    }

    /// Column stamped with the current UTC time on create and update, unless the input supplies it.
    fn updated_at_col() -> Option<Self::Column> {
        None
    }

    /// Non-key columns left out of inserts when the input omits them, so engine defaults apply.
    fn engine_default_cols() -> Vec<Self::Column> {
        Vec::new()
    }
}

pub(crate) fn same_column<C: IdenStatic>(a: &C, b: &C) -> bool {
    a.as_str() == b.as_str()
}

pub(crate) fn primary_key_cols<E: EntityTrait>() -> Vec<E::Column> {
    E::PrimaryKey::iter()
        .map(PrimaryKeyToColumn::into_column)
        .collect()
}

/// Columns the engine may assign on insert: the primary key plus declared defaults.
pub(crate) fn generated_cols<E: Record>() -> Vec<E::Column> {
    let mut cols = primary_key_cols::<E>();
    cols.extend(E::engine_default_cols());
    cols
}

/// Equality condition pinning a located model by its primary key.
pub(crate) fn primary_key_condition<E: EntityTrait>(model: &E::Model) -> Condition {
    primary_key_cols::<E>()
        .into_iter()
        .fold(Condition::all(), |cond, col| {
            cond.add(col.eq(model.get(col)))
        })
}

/// Whether a timestamp column stores naive UTC (`DateTime`) rather than an offset-aware value.
pub(crate) fn is_naive_timestamp<C: ColumnTrait>(column: &C) -> bool {
    matches!(
        column.def().get_column_type(),
        ColumnType::DateTime | ColumnType::Timestamp
    )
}

/// `now` as a bound value in the shape `column` stores.
pub(crate) fn timestamp_value<C: ColumnTrait>(column: &C, now: DateTime<Utc>) -> Value {
    if is_naive_timestamp(column) {
        now.naive_utc().into()
    } else {
        now.into()
    }
}
