//! Model metadata, hydration, and the per-model query helpers.
//!
//! A model is a zero-sized marker type implementing [`Model`]; everything the
//! query layer needs to know about it lives in a `static` [`ModelMeta`].
//! Rows fetched through a model-bound builder are hydrated into
//! [`ModelInstance`] values, which remember the model's hidden columns so
//! serialization can leave them out.
//!
//! # Examples
//!
//! ```
//! use strata_db::model::{Model, ModelMeta};
//!
//! struct Post;
//!
//! impl Model for Post {
//!     fn meta() -> &'static ModelMeta {
//!         static META: ModelMeta = ModelMeta::new("posts")
//!             .fillable(&["title", "body"])
//!             .guarded(&["id"])
//!             .hidden(&["secret"])
//!             .soft_deletes();
//!         &META
//!     }
//! }
//!
//! assert_eq!(Post::meta().table, "posts");
//! assert!(Post::meta().soft_delete);
//! ```

use std::marker::PhantomData;

use serde::ser::{Serialize, SerializeMap, Serializer};
use strata_core::{StrataError, StrataResult};

use crate::executor::DbExecutor;
use crate::query::builder::QueryBuilder;
use crate::row::{FromValue, Record, Row};
use crate::value::Value;

/// Keys that belong to model metadata and never to a hydrated instance.
const METADATA_KEYS: [&str; 4] = ["fillable", "guarded", "hidden", "timestamp"];

/// Static description of a model's table and assignment rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelMeta {
    /// The backing table.
    pub table: &'static str,
    /// Columns accepted by validated inserts and updates.
    pub fillable: &'static [&'static str],
    /// Columns always rejected by validated writes.
    pub guarded: &'static [&'static str],
    /// Columns omitted when an instance is serialized.
    pub hidden: &'static [&'static str],
    /// Whether the table carries `created_at` / `updated_at`.
    pub timestamp: bool,
    /// Whether deletes set `deleted_at` instead of removing rows.
    pub soft_delete: bool,
}

impl ModelMeta {
    /// Metadata for `table` with empty lists, timestamps on and soft deletes
    /// off.
    pub const fn new(table: &'static str) -> Self {
        Self {
            table,
            fillable: &[],
            guarded: &[],
            hidden: &[],
            timestamp: true,
            soft_delete: false,
        }
    }

    /// Sets the fillable columns.
    #[must_use]
    pub const fn fillable(mut self, columns: &'static [&'static str]) -> Self {
        self.fillable = columns;
        self
    }

    /// Sets the guarded columns.
    #[must_use]
    pub const fn guarded(mut self, columns: &'static [&'static str]) -> Self {
        self.guarded = columns;
        self
    }

    /// Sets the hidden columns.
    #[must_use]
    pub const fn hidden(mut self, columns: &'static [&'static str]) -> Self {
        self.hidden = columns;
        self
    }

    /// Turns timestamp columns off.
    #[must_use]
    pub const fn without_timestamps(mut self) -> Self {
        self.timestamp = false;
        self
    }

    /// Enables soft deletes.
    #[must_use]
    pub const fn soft_deletes(mut self) -> Self {
        self.soft_delete = true;
        self
    }
}

/// A database-backed model.
///
/// Implementors are usually unit structs; the trait only hands out the
/// static metadata and builder entry points.
pub trait Model: 'static {
    /// The model's metadata.
    fn meta() -> &'static ModelMeta;

    /// A fresh builder bound to this model.
    fn query(db: &dyn DbExecutor) -> StrataResult<QueryBuilder<'_, ModelInstance>> {
        QueryBuilder::for_model(db, Self::meta())
    }

    /// Record-level helpers (`find`, `create`, ...) for this model.
    fn eloquent(db: &dyn DbExecutor) -> Eloquent<'_, Self>
    where
        Self: Sized,
    {
        Eloquent::new(db)
    }
}

/// A row hydrated through a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInstance {
    attributes: Row,
    hidden: Vec<String>,
}

impl ModelInstance {
    /// Builds an instance from `row`, dropping any metadata-named columns.
    pub fn new(row: Row, hidden: &[&str]) -> Self {
        let attributes = if row.columns().iter().any(|c| METADATA_KEYS.contains(&c.as_str())) {
            Row::from_pairs(
                row.into_pairs()
                    .into_iter()
                    .filter(|(column, _)| !METADATA_KEYS.contains(&column.as_str())),
            )
        } else {
            row
        };
        Self {
            attributes,
            hidden: hidden.iter().map(|h| (*h).to_string()).collect(),
        }
    }

    /// Every column, hidden ones included.
    pub const fn attributes(&self) -> &Row {
        &self.attributes
    }

    /// The columns serialization leaves out.
    pub fn hidden(&self) -> &[String] {
        &self.hidden
    }

    /// Whether `column` is hidden from serialization.
    pub fn is_hidden(&self, column: &str) -> bool {
        self.hidden.iter().any(|h| h == column)
    }

    /// Typed access to a column.
    pub fn get<T: FromValue>(&self, column: &str) -> StrataResult<T> {
        self.attributes.get(column)
    }

    /// Raw access to a column.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.attributes.get_value(column)
    }

    /// The visible columns as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .attributes
            .iter()
            .filter(|(column, _)| !self.is_hidden(column))
            .map(|(column, value)| (column.to_string(), value.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Gives back the underlying row.
    pub fn into_row(self) -> Row {
        self.attributes
    }
}

impl Serialize for ModelInstance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let visible = self
            .attributes
            .iter()
            .filter(|(column, _)| !self.is_hidden(column))
            .count();
        let mut map = serializer.serialize_map(Some(visible))?;
        for (column, value) in self.attributes.iter() {
            if !self.is_hidden(column) {
                map.serialize_entry(column, &value.to_json())?;
            }
        }
        map.end()
    }
}

/// Conversion from a fetched row into a builder's output type.
pub trait Hydrate: Sized + Send {
    /// Converts `row`, given the metadata of the bound model if any.
    fn hydrate_row(row: Row, meta: Option<&ModelMeta>) -> Self;
}

impl Hydrate for Row {
    fn hydrate_row(row: Row, _meta: Option<&ModelMeta>) -> Self {
        row
    }
}

impl Hydrate for ModelInstance {
    fn hydrate_row(row: Row, meta: Option<&ModelMeta>) -> Self {
        Self::new(row, meta.map_or(&[][..], |m| m.hidden))
    }
}

/// Hydrates every row through `meta`.
pub fn hydrate(meta: &ModelMeta, rows: Vec<Row>) -> Vec<ModelInstance> {
    rows.into_iter()
        .map(|row| ModelInstance::new(row, meta.hidden))
        .collect()
}

/// Record-level operations on a model, keyed by its `id` column.
pub struct Eloquent<'a, M> {
    db: &'a dyn DbExecutor,
    _model: PhantomData<fn() -> M>,
}

impl<'a, M: Model> Eloquent<'a, M> {
    /// Creates the helper over `db`.
    pub fn new(db: &'a dyn DbExecutor) -> Self {
        Self {
            db,
            _model: PhantomData,
        }
    }

    fn query(&self) -> StrataResult<QueryBuilder<'a, ModelInstance>> {
        QueryBuilder::for_model(self.db, M::meta())
    }

    /// Every visible row.
    pub async fn all(&self) -> StrataResult<Vec<ModelInstance>> {
        self.query()?.get().await
    }

    /// The row with the given id. A null id finds nothing without querying.
    pub async fn find(&self, id: impl Into<Value>) -> StrataResult<Option<ModelInstance>> {
        let id = id.into();
        if id.is_null() {
            return Ok(None);
        }
        self.query()?.where_("id", id)?.first().await
    }

    /// Like [`find`](Self::find), failing with `DoesNotExist` on a miss.
    pub async fn find_or_fail(&self, id: impl Into<Value>) -> StrataResult<ModelInstance> {
        let id = id.into();
        self.find(id.clone()).await?.ok_or_else(|| {
            StrataError::DoesNotExist(format!(
                "{} not found with id: {id}",
                M::meta().table
            ))
        })
    }

    /// The first row where `column = value`.
    pub async fn where_first(
        &self,
        column: &str,
        value: impl Into<Value>,
    ) -> StrataResult<Option<ModelInstance>> {
        self.query()?.where_(column, value)?.first().await
    }

    /// Inserts `data` after mass-assignment validation; returns the new id.
    pub async fn create(&self, data: Record) -> StrataResult<Value> {
        self.query()?.insert(data, true).await
    }

    /// Updates the row with the given id. A null id updates nothing.
    pub async fn update(&self, id: impl Into<Value>, data: Record) -> StrataResult<bool> {
        let id = id.into();
        if id.is_null() {
            return Ok(false);
        }
        self.query()?.where_("id", id)?.update(data).await
    }
}
