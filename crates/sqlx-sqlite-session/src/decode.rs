//! Decoding SQLite values and rows into JSON

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteRow, SqliteValueRef};
use sqlx::{Column, Row, TypeInfo, Value, ValueRef};

use crate::{Error, Result};

/// Convert a raw SQLite value to JSON.
///
/// Dispatches on the storage class of the value itself, not the declared
/// column type: integers stay `i64`, BLOBs become base64 strings.
pub(crate) fn to_json(value: SqliteValueRef<'_>) -> Result<JsonValue> {
   if value.is_null() {
      return Ok(JsonValue::Null);
   }

   let value = ValueRef::to_owned(&value);
   let type_name = value.type_info().name().to_string();

   match type_name.as_str() {
      "NULL" => Ok(JsonValue::Null),
      "TEXT" | "DATE" | "TIME" | "DATETIME" => {
         Ok(JsonValue::String(value.try_decode_unchecked::<String>()?))
      }
      "INTEGER" | "BOOLEAN" => Ok(JsonValue::from(value.try_decode_unchecked::<i64>()?)),
      "REAL" | "NUMERIC" => {
         let number = value.try_decode_unchecked::<f64>()?;
         Ok(serde_json::Number::from_f64(number)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null))
      }
      "BLOB" => {
         let bytes = value.try_decode_unchecked::<Vec<u8>>()?;
         Ok(JsonValue::String(BASE64.encode(bytes)))
      }
      other => Err(Error::UnsupportedDatatype(other.to_string())),
   }
}

/// Decode rows to JSON objects, preserving column order.
pub(crate) fn decode_rows(rows: Vec<SqliteRow>) -> Result<Vec<IndexMap<String, JsonValue>>> {
   let mut values = Vec::with_capacity(rows.len());
   for row in rows {
      let mut value = IndexMap::default();
      for (i, column) in row.columns().iter().enumerate() {
         let v = row.try_get_raw(i)?;
         let v = to_json(v)?;
         value.insert(column.name().to_string(), v);
      }
      values.push(value);
   }
   Ok(values)
}
