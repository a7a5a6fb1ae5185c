//! Field mapper: reconciles loosely shaped input with a record type.
//!
//! Each record type gets a [`FieldTable`] built once from its zero value and
//! cached for the life of the process. Input of any `Serialize` shape (a DTO,
//! a reference to one, a map, a `serde_json::Value`) is matched against that
//! table by field name, exact match first, then case-insensitive. Keys the
//! record does not declare are ignored, and null values count as absent.

use std::any::{Any, TypeId};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use sea_orm::{ActiveModelTrait, EntityTrait, IdenStatic, IntoActiveModel, Iterable, ModelTrait};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::record::{Record, generated_cols, is_naive_timestamp, primary_key_cols, same_column};
use crate::{RepoError, Result};

type SharedTable = Arc<dyn Any + Send + Sync>;

static TABLES: LazyLock<DashMap<TypeId, SharedTable>> = LazyLock::new(DashMap::new);

/// One declared field of a record type.
#[derive(Clone, Debug)]
pub struct FieldDescriptor<E: EntityTrait> {
    name: String,
    column: Option<E::Column>,
    zero: JsonValue,
}

impl<E: EntityTrait> FieldDescriptor<E> {
    /// Serialized field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing column, `None` for fields the entity does not persist.
    #[must_use]
    pub fn column(&self) -> Option<E::Column> {
        self.column
    }

    /// The field's zero value, as found on `Model::default()`.
    #[must_use]
    pub fn zero(&self) -> &JsonValue {
        &self.zero
    }

    fn matches(&self, key: &str) -> bool {
        key == self.name || self.column.is_some_and(|c| key == c.as_str())
    }

    fn matches_ignore_case(&self, key: &str) -> bool {
        key.eq_ignore_ascii_case(&self.name)
            || self.column.is_some_and(|c| key.eq_ignore_ascii_case(c.as_str()))
    }
}

/// Descriptor table of a record type, in column declaration order.
#[derive(Debug)]
pub struct FieldTable<E: EntityTrait> {
    fields: Vec<FieldDescriptor<E>>,
}

/// A mapped model together with the columns the input actually supplied.
#[derive(Debug)]
pub(crate) struct Partial<E: EntityTrait> {
    pub(crate) model: E::Model,
    present: Vec<E::Column>,
    stamped: Vec<E::Column>,
}

impl<E: Record> FieldTable<E> {
    /// Returns the process-wide table for `E`, building it on first use.
    ///
    /// # Errors
    /// Returns `RepoError::Mapping` if `E::Model::default()` does not serialize
    /// to a JSON object.
    pub fn shared() -> Result<Arc<Self>> {
        let key = TypeId::of::<E>();
        if let Some(table) = TABLES
            .get(&key)
            .and_then(|t| Arc::clone(t.value()).downcast::<Self>().ok())
        {
            return Ok(table);
        }
        let table = Arc::new(Self::build()?);
        TABLES.insert(key, Arc::clone(&table) as SharedTable);
        Ok(table)
    }

    /// Builds the table from `E::Model::default()`.
    ///
    /// # Errors
    /// Returns `RepoError::Mapping` if the zero value is not a JSON object.
    pub fn build() -> Result<Self> {
        let JsonValue::Object(mut zero) = serde_json::to_value(E::Model::default())? else {
            return Err(RepoError::Mapping(serde::ser::Error::custom(
                "record model must serialize to an object",
            )));
        };

        let mut fields = Vec::with_capacity(zero.len());
        for column in E::Column::iter() {
            let key = zero
                .keys()
                .find(|k| *k == column.as_str())
                .or_else(|| {
                    zero.keys().find(|k| {
                        k.parse::<E::Column>()
                            .is_ok_and(|c| same_column(&c, &column))
                    })
                })
                .cloned();
            if let Some(key) = key
                && let Some(value) = zero.remove(&key)
            {
                fields.push(FieldDescriptor {
                    name: key,
                    column: Some(column),
                    zero: value,
                });
            }
        }
        // Serialized fields with no backing column keep their zero value.
        fields.extend(zero.into_iter().map(|(name, zero)| FieldDescriptor {
            name,
            column: None,
            zero,
        }));

        Ok(Self { fields })
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor<E>> {
        self.fields.iter()
    }

    /// Finds the column a caller-supplied name refers to.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<E::Column> {
        self.descriptor(name).and_then(FieldDescriptor::column)
    }

    fn descriptor(&self, name: &str) -> Option<&FieldDescriptor<E>> {
        self.fields
            .iter()
            .find(|f| f.matches(name))
            .or_else(|| self.fields.iter().find(|f| f.matches_ignore_case(name)))
    }

    fn descriptor_for(&self, column: E::Column) -> Option<&FieldDescriptor<E>> {
        self.fields
            .iter()
            .find(|f| f.column.is_some_and(|c| same_column(&c, &column)))
    }

    /// Maps one input onto a fresh record.
    ///
    /// Non-object input (including `None`/null) yields the zero value.
    ///
    /// # Errors
    /// Returns `RepoError::Mapping` if the input cannot be serialized or a
    /// supplied value does not fit its field's type.
    pub fn map_one<I: Serialize + ?Sized>(&self, input: &I) -> Result<E::Model> {
        Ok(self.partial(input, &[])?.model)
    }

    /// Maps every element of a sequence input; anything else yields an empty list.
    ///
    /// # Errors
    /// Same as [`FieldTable::map_one`], for any element.
    pub fn map_many<I: Serialize + ?Sized>(&self, input: &I) -> Result<Vec<E::Model>> {
        match serde_json::to_value(input)? {
            JsonValue::Array(items) => items
                .iter()
                .map(|item| self.partial_from_json(item, &[]).map(|p| p.model))
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    pub(crate) fn partial<I: Serialize + ?Sized>(
        &self,
        input: &I,
        stamps: &[E::Column],
    ) -> Result<Partial<E>> {
        self.partial_from_json(&serde_json::to_value(input)?, stamps)
    }

    pub(crate) fn partials<I: Serialize + ?Sized>(
        &self,
        input: &I,
        stamps: &[E::Column],
    ) -> Result<Vec<Partial<E>>> {
        match serde_json::to_value(input)? {
            JsonValue::Array(items) => items
                .iter()
                .map(|item| self.partial_from_json(item, stamps))
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    /// Overlays present, non-null input fields onto the zero value, then
    /// fills in `stamps` columns the input left out with the current time.
    pub(crate) fn partial_from_json(
        &self,
        input: &JsonValue,
        stamps: &[E::Column],
    ) -> Result<Partial<E>> {
        let mut out = Map::with_capacity(self.fields.len());
        let mut present = Vec::new();

        for field in &self.fields {
            let supplied = input.as_object().and_then(|obj| {
                obj.iter()
                    .find(|(k, _)| field.matches(k))
                    .or_else(|| obj.iter().find(|(k, _)| field.matches_ignore_case(k)))
                    .map(|(_, v)| v)
                    .filter(|v| !v.is_null())
            });
            match supplied {
                Some(value) => {
                    out.insert(field.name.clone(), value.clone());
                    if let Some(c) = field.column {
                        present.push(c);
                    }
                }
                None => {
                    out.insert(field.name.clone(), field.zero.clone());
                }
            }
        }

        let mut stamped = Vec::new();
        if !stamps.is_empty() {
            let now = chrono::Utc::now();
            for column in stamps {
                if present.iter().any(|p| same_column(p, column)) {
                    continue;
                }
                if let Some(field) = self.descriptor_for(*column) {
                    let value = if is_naive_timestamp(column) {
                        serde_json::to_value(now.naive_utc())?
                    } else {
                        serde_json::to_value(now)?
                    };
                    out.insert(field.name.clone(), value);
                    stamped.push(*column);
                }
            }
        }

        let model = serde_json::from_value(JsonValue::Object(out))?;
        Ok(Partial {
            model,
            present,
            stamped,
        })
    }
}

impl<E: Record> Partial<E> {
    fn is_present(&self, column: &E::Column) -> bool {
        self.present
            .iter()
            .chain(&self.stamped)
            .any(|p| same_column(p, column))
    }

    /// Whether the input itself supplied any non-key column; stamps do not count.
    pub(crate) fn has_updates(&self) -> bool {
        let pk = primary_key_cols::<E>();
        self.present
            .iter()
            .any(|p| !pk.iter().any(|k| same_column(k, p)))
    }

    /// Insert form: every column except engine-generated ones the input left out.
    pub(crate) fn into_insert(self) -> E::ActiveModel {
        let generated = generated_cols::<E>();
        let mut am = <E::ActiveModel as ActiveModelTrait>::default();
        for column in E::Column::iter() {
            let is_generated = generated.iter().any(|g| same_column(g, &column));
            if !is_generated || self.is_present(&column) {
                am.set(column, self.model.get(column));
            }
        }
        am
    }

    /// Field-level update of a located record; the primary key is never written.
    pub(crate) fn apply_to(self, located: E::Model) -> E::ActiveModel {
        let pk = primary_key_cols::<E>();
        let mut am = located.into_active_model();
        for column in self.present.iter().chain(&self.stamped) {
            if !pk.iter().any(|k| same_column(k, column)) {
                am.set(*column, self.model.get(*column));
            }
        }
        am
    }

    /// Update form for statements touching many rows: only supplied, non-key columns.
    pub(crate) fn into_changes(self) -> E::ActiveModel {
        let pk = primary_key_cols::<E>();
        let mut am = <E::ActiveModel as ActiveModelTrait>::default();
        for column in self.present.iter().chain(&self.stamped) {
            if !pk.iter().any(|k| same_column(k, column)) {
                am.set(*column, self.model.get(*column));
            }
        }
        am
    }
}
