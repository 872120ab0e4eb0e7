//! Values, records and the shapes record operations accept and return.
//!
//! Records are untyped here: a [`Record`] carries one [`Value`] per column of
//! the [`Table`] it was read from, decoded according to that column's
//! [`ColumnType`].

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::schema::{ColumnType, Table};
use crate::DbError;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Convert a JSON value into the [`Value`] a column of `kind` expects.
    ///
    /// `null` is accepted for every type; nullability is the database's call.
    pub fn from_json(
        column: &str,
        kind: &ColumnType,
        json: serde_json::Value,
    ) -> Result<Self, DbError> {
        use serde_json::Value as Json;

        let invalid = || DbError::InvalidValue {
            column: column.to_string(),
            expected: kind.describe(),
        };

        if json.is_null() {
            return Ok(Self::Null);
        }

        let value = match kind {
            ColumnType::Boolean => Self::Bool(json.as_bool().ok_or_else(invalid)?),
            ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt => {
                Self::Int(json.as_i64().ok_or_else(invalid)?)
            }
            ColumnType::Real | ColumnType::Double => Self::Float(json.as_f64().ok_or_else(invalid)?),
            ColumnType::Json | ColumnType::Jsonb => Self::Json(json),
            ColumnType::Uuid => {
                let raw = json.as_str().ok_or_else(invalid)?;
                Self::Uuid(Uuid::parse_str(raw).map_err(|_| invalid())?)
            }
            ColumnType::TimestampTz => {
                let raw = json.as_str().ok_or_else(invalid)?;
                let parsed = DateTime::parse_from_rfc3339(raw).map_err(|_| invalid())?;
                Self::Timestamp(parsed.with_timezone(&Utc))
            }
            ColumnType::Text | ColumnType::Email(_) => match json {
                Json::String(s) => Self::Text(s),
                _ => return Err(invalid()),
            },
            // Unknown types go over the wire as text; let Postgres parse them.
            ColumnType::Other(_) => match json {
                Json::String(s) => Self::Text(s),
                Json::Number(n) => Self::Text(n.to_string()),
                Json::Bool(b) => Self::Text(b.to_string()),
                other => Self::Text(other.to_string()),
            },
        };
        Ok(value)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Decode column `idx` of `row` as a column of `kind`.
pub(crate) fn decode_value(row: &PgRow, idx: usize, kind: &ColumnType) -> Result<Value, sqlx::Error> {
    let value = match kind {
        ColumnType::Boolean => row.try_get::<Option<bool>, _>(idx)?.into(),
        ColumnType::SmallInt => row.try_get::<Option<i16>, _>(idx)?.map(i64::from).into(),
        ColumnType::Integer => row.try_get::<Option<i32>, _>(idx)?.map(i64::from).into(),
        ColumnType::BigInt => row.try_get::<Option<i64>, _>(idx)?.into(),
        ColumnType::Real => row.try_get::<Option<f32>, _>(idx)?.map(f64::from).into(),
        ColumnType::Double => row.try_get::<Option<f64>, _>(idx)?.into(),
        ColumnType::Text | ColumnType::Email(_) | ColumnType::Other(_) => {
            row.try_get::<Option<String>, _>(idx)?.into()
        }
        ColumnType::Json | ColumnType::Jsonb => row.try_get::<Option<serde_json::Value>, _>(idx)?.into(),
        ColumnType::Uuid => row.try_get::<Option<Uuid>, _>(idx)?.into(),
        ColumnType::TimestampTz => row.try_get::<Option<DateTime<Utc>>, _>(idx)?.into(),
    };
    Ok(value)
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A row read back from a table: column names paired with values, in column
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Decode a full-width row selected with [`Table`]'s select list.
    pub(crate) fn from_row(table: &Table, row: &PgRow) -> Result<Self, sqlx::Error> {
        let fields = table
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| Ok((column.name.clone(), decode_value(row, idx, &column.kind)?)))
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok(Self { fields })
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    /// Values in column order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The record's primary-key value under `table`.
    pub fn primary_key<'a>(&'a self, table: &Table) -> Option<&'a Value> {
        self.get(&table.primary_key().name)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Record input
// ---------------------------------------------------------------------------

/// Field values for one record being written.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordData {
    /// One value per table column, in column order.
    Positional(Vec<Value>),
    /// Any subset of columns, by name.
    Named(Vec<(String, Value)>),
}

impl RecordData {
    /// Start an empty named record.
    pub fn named() -> Self {
        Self::Named(Vec::new())
    }

    /// Add a named field. No-op on a positional record.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Self::Named(fields) = &mut self {
            fields.push((column.into(), value.into()));
        }
        self
    }

    /// Build a named record from a JSON object, converting each field by the
    /// type of the column it names.
    pub fn from_json_object(
        table: &Table,
        object: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, DbError> {
        let fields = object
            .into_iter()
            .map(|(name, json)| {
                let column = table.column(&name).ok_or_else(|| DbError::UnknownColumn {
                    table: table.name().to_string(),
                    column: name.clone(),
                })?;
                let value = Value::from_json(&name, &column.kind, json)?;
                Ok((name, value))
            })
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(Self::Named(fields))
    }

    /// Resolve against `table`: (column index, value) pairs in the order given.
    ///
    /// # Errors
    /// - [`DbError::UnknownColumn`] for a name the table doesn't have.
    /// - [`DbError::ColumnCountMismatch`] for a positional record of the wrong width.
    pub(crate) fn resolve(self, table: &Table) -> Result<Vec<(usize, Value)>, DbError> {
        match self {
            Self::Positional(values) => {
                let expected = table.columns().len();
                if values.len() != expected {
                    return Err(DbError::ColumnCountMismatch {
                        table: table.name().to_string(),
                        expected,
                        got: values.len(),
                    });
                }
                Ok(values.into_iter().enumerate().collect())
            }
            Self::Named(fields) => fields
                .into_iter()
                .map(|(name, value)| {
                    table
                        .column_index(&name)
                        .map(|idx| (idx, value))
                        .ok_or_else(|| DbError::UnknownColumn {
                            table: table.name().to_string(),
                            column: name,
                        })
                })
                .collect(),
        }
    }
}

impl From<Vec<Value>> for RecordData {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

/// One record or a batch of them, for `create_record_or_records`.
#[derive(Debug, Clone, PartialEq)]
pub enum NewRecords {
    Single(RecordData),
    Batch(Vec<RecordData>),
}

impl From<RecordData> for NewRecords {
    fn from(record: RecordData) -> Self {
        Self::Single(record)
    }
}

impl From<Vec<RecordData>> for NewRecords {
    fn from(records: Vec<RecordData>) -> Self {
        Self::Batch(records)
    }
}

/// What `create_record_or_records` reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    /// The inserted row, re-read by primary key. `None` only if the row was
    /// gone again by the time it was re-read.
    Record(Option<Record>),
    /// Batches report only how many rows went in.
    Batch { inserted: u64 },
}
