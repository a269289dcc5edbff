//! Result rows and write payloads.
//!
//! [`Row`] is what drivers hand back for every selected row. [`Record`] is the
//! ordered column/value payload accepted by `insert` and `update`.

use strata_core::{StrataError, StrataResult};

use crate::value::Value;

/// A result row: column names paired with values, in select order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from column names and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Builds a row from `(column, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column name.
    pub fn get<T: FromValue>(&self, column: &str) -> StrataResult<T> {
        let value = self.get_value(column).ok_or_else(|| {
            StrataError::InvalidArgument(format!("Column '{column}' not found in row"))
        })?;
        T::from_value(value)
    }

    /// Gets a typed value by column index.
    pub fn get_by_index<T: FromValue>(&self, idx: usize) -> StrataResult<T> {
        let value = self.values.get(idx).ok_or_else(|| {
            StrataError::InvalidArgument(format!(
                "Column index {idx} out of bounds (row has {} columns)",
                self.values.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Returns the raw value for a column.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    /// Iterates over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Consumes the row into `(column, value)` pairs.
    pub fn into_pairs(self) -> Vec<(String, Value)> {
        self.columns.into_iter().zip(self.values).collect()
    }
}

/// Conversion from a [`Value`] to a concrete Rust type.
pub trait FromValue: Sized {
    /// Attempts the conversion.
    fn from_value(value: &Value) -> StrataResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> StrataError {
    StrataError::SerializationError(format!("Expected {expected}, got {value:?}"))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> StrataResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            // Aggregates come back as text from some drivers.
            Value::String(s) => s.trim().parse().map_err(|_| mismatch("Int", value)),
            _ => Err(mismatch("Int", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> StrataResult<Self> {
        let wide = i64::from_value(value)?;
        Self::try_from(wide).map_err(|e| {
            StrataError::SerializationError(format!("Int value out of i32 range: {e}"))
        })
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> StrataResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Ok(*i as Self),
            _ => Err(mismatch("Float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> StrataResult<Self> {
        value.as_bool().ok_or_else(|| mismatch("Bool", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> StrataResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> StrataResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for chrono::NaiveDateTime {
    fn from_value(value: &Value) -> StrataResult<Self> {
        match value {
            Value::DateTime(dt) => Ok(*dt),
            Value::DateTimeTz(dt) => Ok(dt.naive_utc()),
            Value::String(s) => chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .map_err(|_| mismatch("DateTime", value)),
            _ => Err(mismatch("DateTime", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> StrataResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// An ordered write payload.
///
/// Each entry is a column with an optional value. A `None` value marks a
/// column that was named without being given a value; inserts bind it as
/// NULL and the mass-assignment guard rejects it.
///
/// ```
/// use strata_db::row::Record;
///
/// let record = Record::new().set("name", "Ada").set("age", 36);
/// assert_eq!(record.keys().collect::<Vec<_>>(), vec!["name", "age"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Option<Value>)>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `column` to `value`, replacing an earlier entry in place.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(column.into(), Some(value.into()));
        self
    }

    /// Names `column` without giving it a value.
    #[must_use]
    pub fn declare(mut self, column: impl Into<String>) -> Self {
        self.put(column.into(), None);
        self
    }

    /// In-place variant of [`Record::set`].
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.put(column.into(), Some(value.into()));
    }

    fn put(&mut self, column: String, value: Option<Value>) {
        match self.entries.iter_mut().find(|(k, _)| *k == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    /// Returns the value for `column`; `Some(None)` for a declared column.
    pub fn get(&self, column: &str) -> Option<Option<&Value>> {
        self.entries
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_ref())
    }

    /// Returns `true` if `column` is present.
    pub fn contains(&self, column: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == column)
    }

    /// Iterates over column names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the record has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl From<Row> for Record {
    fn from(row: Row) -> Self {
        row.into_pairs().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        Row::from_pairs([("id", Value::Int(1)), ("name", Value::from("Ada")), ("bio", Value::Null)])
    }

    // ── Row ─────────────────────────────────────────────────────────

    #[test]
    fn test_row_typed_get() {
        let row = sample_row();
        assert_eq!(row.get::<i64>("id").unwrap(), 1);
        assert_eq!(row.get::<String>("name").unwrap(), "Ada");
        assert_eq!(row.get::<Option<String>>("bio").unwrap(), None);
        assert!(row.get::<i64>("missing").is_err());
        assert!(row.get::<i64>("name").is_err());
    }

    #[test]
    fn test_row_get_by_index() {
        let row = sample_row();
        assert_eq!(row.get_by_index::<i64>(0).unwrap(), 1);
        assert!(row.get_by_index::<i64>(9).is_err());
    }

    #[test]
    fn test_row_iter_and_pairs() {
        let row = sample_row();
        let cols: Vec<&str> = row.iter().map(|(c, _)| c).collect();
        assert_eq!(cols, vec!["id", "name", "bio"]);
        assert_eq!(row.len(), 3);
        assert_eq!(row.into_pairs()[1].1, Value::from("Ada"));
    }

    #[test]
    #[should_panic(expected = "Row column count must match value count")]
    fn test_row_new_mismatch_panics() {
        let _ = Row::new(vec!["a".into()], vec![]);
    }

    #[test]
    fn test_count_from_string() {
        assert_eq!(i64::from_value(&Value::String("12".into())).unwrap(), 12);
        assert!(i32::from_value(&Value::Int(i64::MAX)).is_err());
    }

    // ── Record ──────────────────────────────────────────────────────

    #[test]
    fn test_record_set_replaces_in_place() {
        let record = Record::new().set("a", 1).set("b", 2).set("a", 3);
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(record.get("a"), Some(Some(&Value::Int(3))));
    }

    #[test]
    fn test_record_declare() {
        let record = Record::new().declare("email");
        assert!(record.contains("email"));
        assert_eq!(record.get("email"), Some(None));
        assert_eq!(record.get("other"), None);
    }

    #[test]
    fn test_record_from_iter_and_row() {
        let record: Record = vec![("x", 1), ("y", 2)].into_iter().collect();
        assert_eq!(record.len(), 2);
        let from_row = Record::from(sample_row());
        assert_eq!(from_row.get("bio"), Some(Some(&Value::Null)));
    }
}
