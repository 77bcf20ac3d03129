//! Driver row decoding.
//!
//! Rows leave the sqlx driver as [`JsonRow`]s so the executor can map them
//! onto caller types with serde, whatever the backend.
//!
//! Decoding is two-phase:
//! 1. `categorize_type` classifies the column's declared type
//! 2. a backend-specific decoder extracts the value for that category

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, JsonRow};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

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
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Checked before floats, "numeric" overlaps
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity stores floats
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // INTERVAL and POINT contain "int" but are not integers
    let is_integer = (lower.starts_with("int") && !lower.starts_with("interval"))
        || ["bigint", "smallint", "tinyint", "mediumint", "serial", " int"]
            .iter()
            .any(|p| lower.contains(p));
    if is_integer {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    TypeCategory::Text
}

/// DECIMAL/NUMERIC kept as the exact string the server sent.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

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

/// Binary columns are rendered as base64 strings.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Conversion of a driver row into a [`JsonRow`].
///
/// A column that cannot be decoded fails the whole row with a
/// [`DbError::Mapping`]; only SQL NULL becomes JSON null.
pub trait RowToJson {
    fn to_json_row(&self) -> DbResult<JsonRow>;
}

macro_rules! impl_row_to_json {
    ($row:ty, $db:expr, $decoder:path) => {
        impl RowToJson for $row {
            fn to_json_row(&self) -> DbResult<JsonRow> {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| -> DbResult<(String, JsonValue)> {
                        let type_name = col.type_info().name();
                        let category = categorize_type(type_name, $db);
                        let value = $decoder(self, idx, category)
                            .map_err(|e| column_error(col.name(), type_name, e))?;
                        Ok((col.name().to_string(), value))
                    })
                    .collect()
            }
        }
    };
}

impl_row_to_json!(MySqlRow, DatabaseType::MySQL, mysql::decode_column);
impl_row_to_json!(PgRow, DatabaseType::PostgreSQL, postgres::decode_column);
impl_row_to_json!(SqliteRow, DatabaseType::SQLite, sqlite::decode_column);

fn column_error(column: &str, type_name: &str, err: sqlx::Error) -> DbError {
    DbError::mapping(format!(
        "Cannot decode column '{}' of type {}: {} (cast it to text in the query)",
        column, type_name, err
    ))
}

type Decoded = Result<JsonValue, sqlx::Error>;

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Decoded {
        match category {
            TypeCategory::Decimal => opt(row.try_get::<Option<RawDecimal>, _>(idx), |v| {
                JsonValue::String(v.0)
            }),
            // Signed first, unsigned BIGINT only fits u64
            TypeCategory::Integer => row
                .try_get::<Option<i64>, _>(idx)
                .map(number)
                .or_else(|_| row.try_get::<Option<i32>, _>(idx).map(number))
                .or_else(|_| row.try_get::<Option<i8>, _>(idx).map(number))
                .or_else(|_| row.try_get::<Option<u64>, _>(idx).map(number)),
            TypeCategory::Boolean => opt(row.try_get::<Option<bool>, _>(idx), JsonValue::Bool),
            TypeCategory::Float => opt(row.try_get::<Option<f64>, _>(idx), float_value),
            TypeCategory::Binary => opt(row.try_get::<Option<Vec<u8>>, _>(idx), |v| {
                encode_binary(&v)
            }),
            TypeCategory::Json => opt(row.try_get::<Option<JsonValue>, _>(idx), |v| v),
            TypeCategory::Text => opt(row.try_get::<Option<String>, _>(idx), JsonValue::String),
        }
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> Decoded {
        match category {
            TypeCategory::Decimal => opt(row.try_get::<Option<RawDecimal>, _>(idx), |v| {
                JsonValue::String(v.0)
            }),
            // PostgreSQL checks the exact width, so try each one
            TypeCategory::Integer => row
                .try_get::<Option<i64>, _>(idx)
                .map(number)
                .or_else(|_| row.try_get::<Option<i32>, _>(idx).map(number))
                .or_else(|_| row.try_get::<Option<i16>, _>(idx).map(number)),
            TypeCategory::Boolean => opt(row.try_get::<Option<bool>, _>(idx), JsonValue::Bool),
            TypeCategory::Float => opt(row.try_get::<Option<f64>, _>(idx), float_value)
                .or_else(|_| opt(row.try_get::<Option<f32>, _>(idx), |v| float_value(v as f64))),
            TypeCategory::Binary => opt(row.try_get::<Option<Vec<u8>>, _>(idx), |v| {
                encode_binary(&v)
            }),
            TypeCategory::Json => opt(row.try_get::<Option<JsonValue>, _>(idx), |v| v),
            TypeCategory::Text => opt(row.try_get::<Option<String>, _>(idx), JsonValue::String),
        }
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> Decoded {
        match category {
            TypeCategory::Integer => opt(row.try_get::<Option<i64>, _>(idx), |v| {
                JsonValue::Number(v.into())
            }),
            TypeCategory::Boolean => opt(row.try_get::<Option<bool>, _>(idx), JsonValue::Bool),
            TypeCategory::Float | TypeCategory::Decimal => {
                opt(row.try_get::<Option<f64>, _>(idx), float_value)
            }
            TypeCategory::Binary => opt(row.try_get::<Option<Vec<u8>>, _>(idx), |v| {
                encode_binary(&v)
            }),
            TypeCategory::Json | TypeCategory::Text => decode_text(row, idx),
        }
    }

    fn decode_text(row: &SqliteRow, idx: usize) -> Decoded {
        // Expression columns report the storage class of the value, not a
        // declared type, so fall back through the other classes.
        opt(row.try_get::<Option<String>, _>(idx), JsonValue::String)
            .or_else(|_| row.try_get::<Option<i64>, _>(idx).map(number))
            .or_else(|_| opt(row.try_get::<Option<f64>, _>(idx), float_value))
            .or_else(|_| opt(row.try_get::<Option<Vec<u8>>, _>(idx), |v| encode_binary(&v)))
    }
}

/// Map a decoded optional value; SQL NULL becomes JSON null, errors pass through.
fn opt<T>(value: Result<Option<T>, sqlx::Error>, f: impl FnOnce(T) -> JsonValue) -> Decoded {
    Ok(value?.map(f).unwrap_or(JsonValue::Null))
}

fn number<T: Into<serde_json::Number>>(value: Option<T>) -> JsonValue {
    value
        .map(|v| JsonValue::Number(v.into()))
        .unwrap_or(JsonValue::Null)
}
