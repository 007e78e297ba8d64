//! Row decoding into JSON.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! SQLite columns carry no reliable declared type for expressions, so the
//! SQLite decoder dispatches on the storage class of each value instead.

use crate::db::DatabaseType;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

/// Name and declared type of a result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Rows decoded from one statement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RowSet {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Map<String, JsonValue>>,
    /// More rows were available than the caller asked for.
    pub truncated: bool,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row, if any.
    pub fn scalar(&self) -> Option<&JsonValue> {
        let first = self.columns.first()?;
        self.rows.first()?.get(&first.name)
    }

    /// String value of `column` in every row.
    pub fn strings(&self, column: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).and_then(JsonValue::as_str))
            .map(str::to_string)
            .collect()
    }
}

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    match lower.as_str() {
        "timestamptz" => return TypeCategory::TimestampTz,
        "timestamp" | "datetime" => return TypeCategory::Timestamp,
        "date" => return TypeCategory::Date,
        "time" => return TypeCategory::Time,
        "bool" | "boolean" => return TypeCategory::Boolean,
        "json" | "jsonb" => return TypeCategory::Json,
        "uuid" => return TypeCategory::Uuid,
        "text" | "varchar" | "bpchar" | "char" | "name" | "citext" => {
            return TypeCategory::Text;
        }
        _ => {}
    }

    // Integer types ("interval" and "point" are not integers)
    if (lower.contains("int") && !lower.contains("interval") && !lower.contains("point"))
        || lower.contains("serial")
    {
        return TypeCategory::Integer;
    }

    // Float types
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    // Binary types
    if lower.contains("blob") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Binary values are returned base64-encoded.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> Map<String, JsonValue>;
    fn column_info(&self) -> Vec<ColumnInfo>;
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::Postgres);
                let value = postgres::decode_column(self, idx, category);
                (col.name().to_string(), value)
            })
            .collect()
    }

    fn column_info(&self) -> Vec<ColumnInfo> {
        column_info(self)
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let declared = categorize_type(col.type_info().name(), DatabaseType::SQLite);
                let value = sqlite::decode_column(self, idx, declared);
                (col.name().to_string(), value)
            })
            .collect()
    }

    fn column_info(&self) -> Vec<ColumnInfo> {
        column_info(self)
    }
}

fn column_info<R: Row>(row: &R) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo {
            name: col.name().to_string(),
            type_name: col.type_info().name().to_string(),
        })
        .collect()
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use sqlx::types::Uuid;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_as::<bool>(row, idx, JsonValue::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => {
                decode_as::<Vec<u8>>(row, idx, |v| encode_binary_value(&v))
            }
            TypeCategory::Json => decode_as::<JsonValue>(row, idx, |v| v),
            TypeCategory::Uuid => decode_as::<Uuid>(row, idx, |v| JsonValue::String(v.to_string())),
            TypeCategory::TimestampTz => {
                decode_as::<DateTime<Utc>>(row, idx, |v| JsonValue::String(v.to_rfc3339()))
            }
            TypeCategory::Timestamp => {
                decode_as::<NaiveDateTime>(row, idx, |v| JsonValue::String(v.to_string()))
            }
            TypeCategory::Date => {
                decode_as::<NaiveDate>(row, idx, |v| JsonValue::String(v.to_string()))
            }
            TypeCategory::Time => {
                decode_as::<NaiveTime>(row, idx, |v| JsonValue::String(v.to_string()))
            }
            TypeCategory::Text => decode_as::<String>(row, idx, JsonValue::String),
            TypeCategory::Unknown => decode_unchecked_text(row, idx),
        }
    }

    fn decode_as<T>(row: &PgRow, idx: usize, f: impl FnOnce(T) -> JsonValue) -> JsonValue
    where
        T: for<'r> Decode<'r, sqlx::Postgres> + Type<sqlx::Postgres>,
    {
        match row.try_get::<Option<T>, _>(idx) {
            Ok(Some(v)) => f(v),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::debug!(column = idx, error = %e, "Falling back to text decoding");
                decode_unchecked_text(row, idx)
            }
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.0),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        decode_unchecked_text(row, idx)
    }

    fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    /// Types without a dedicated decoder (enums, intervals, arrays) are returned as text when
    /// their wire representation is valid UTF-8.
    fn decode_unchecked_text(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get_unchecked::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, declared: TypeCategory) -> JsonValue {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return JsonValue::Null,
            Ok(raw) => raw.type_info().name().to_string(),
            Err(_) => return JsonValue::Null,
        };

        match storage.as_str() {
            "INTEGER" => decode_integer(row, idx, declared),
            "REAL" => row
                .try_get::<f64, _>(idx)
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            "BLOB" => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|v| encode_binary_value(&v))
                .unwrap_or(JsonValue::Null),
            _ => decode_text(row, idx, declared),
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize, declared: TypeCategory) -> JsonValue {
        match row.try_get::<i64, _>(idx) {
            Ok(v) if declared == TypeCategory::Boolean => JsonValue::Bool(v != 0),
            Ok(v) => JsonValue::Number(v.into()),
            Err(_) => JsonValue::Null,
        }
    }

    fn decode_text(row: &SqliteRow, idx: usize, declared: TypeCategory) -> JsonValue {
        match row.try_get_unchecked::<String, _>(idx) {
            Ok(v) if declared == TypeCategory::Json => {
                serde_json::from_str::<JsonValue>(&v).unwrap_or(JsonValue::String(v))
            }
            Ok(v) => JsonValue::String(v),
            Err(_) => JsonValue::Null,
        }
    }
}
