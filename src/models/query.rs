//! Statement parameter and result row models.

use crate::error::{DbError, DbResult};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// A result row as returned by the driver: column name to value.
pub type JsonRow = serde_json::Map<String, JsonValue>;

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// JSON document, bound natively where the backend supports it
    Json(JsonValue),
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<JsonValue> for QueryParam {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Conversion of one batch row into positional statement parameters.
pub trait IntoParams {
    fn into_params(self) -> Vec<QueryParam>;
}

impl IntoParams for Vec<QueryParam> {
    fn into_params(self) -> Vec<QueryParam> {
        self
    }
}

impl IntoParams for &[QueryParam] {
    fn into_params(self) -> Vec<QueryParam> {
        self.to_vec()
    }
}

impl<const N: usize> IntoParams for [QueryParam; N] {
    fn into_params(self) -> Vec<QueryParam> {
        self.into()
    }
}

/// Map a driver row onto a caller type.
///
/// The whole row is deserialized first (struct or map targets). When that
/// fails and the row has a single column, the column value alone is tried, so
/// `SELECT count(*)` or `RETURNING id` map straight onto scalars.
pub fn decode_row<T: DeserializeOwned>(row: JsonRow) -> DbResult<T> {
    let single = if row.len() == 1 {
        row.values().next().cloned()
    } else {
        None
    };

    match serde_json::from_value::<T>(JsonValue::Object(row)) {
        Ok(value) => Ok(value),
        Err(row_err) => match single {
            Some(value) => serde_json::from_value::<T>(value).map_err(|_| DbError::from(row_err)),
            None => Err(DbError::from(row_err)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn row(value: JsonValue) -> JsonRow {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        name: String,
    }

    #[test]
    fn test_query_param_from_rust_values() {
        assert_eq!(QueryParam::from(42), QueryParam::Int(42));
        assert_eq!(QueryParam::from("a"), QueryParam::String("a".to_string()));
        assert_eq!(QueryParam::from(b"hi".to_vec()), QueryParam::Bytes(b"hi".to_vec()));
        assert_eq!(QueryParam::from(json!({"k": 1})), QueryParam::Json(json!({"k": 1})));
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some(1.5)), QueryParam::Float(1.5));
    }

    #[test]
    fn test_into_params() {
        let params = [QueryParam::from(1), QueryParam::from("x")].into_params();
        assert_eq!(params.len(), 2);
        let slice: &[QueryParam] = &params;
        assert_eq!(slice.into_params(), params);
    }

    #[test]
    fn test_decode_row_struct() {
        let user: User = decode_row(row(json!({"id": 7, "name": "ada"}))).unwrap();
        assert_eq!(
            user,
            User {
                id: 7,
                name: "ada".to_string()
            }
        );
    }

    #[test]
    fn test_decode_row_single_column_scalar() {
        let id: i64 = decode_row(row(json!({"id": 12}))).unwrap();
        assert_eq!(id, 12);
    }

    #[test]
    fn test_decode_row_single_column_struct_still_maps() {
        #[derive(Debug, Deserialize)]
        struct Count {
            total: i64,
        }
        let count: Count = decode_row(row(json!({"total": 3}))).unwrap();
        assert_eq!(count.total, 3);
    }

    #[test]
    fn test_decode_row_mismatch_is_mapping_error() {
        let result: DbResult<User> = decode_row(row(json!({"id": "not a number", "name": 1})));
        assert!(matches!(result, Err(DbError::Mapping { .. })));
    }
}
