//! Commands executed through a session

use std::sync::Arc;

use db_session::Command;
use futures::{Stream, TryStreamExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::connection::Shared;
use crate::decode::decode_rows;
use crate::transaction::SqliteTransaction;
use crate::{Error, Result};

/// Result returned from write operations (e.g. INSERT, UPDATE, DELETE).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteQueryResult {
   /// The number of rows affected by the write operation.
   pub rows_affected: u64,
   /// The last inserted row ID (SQLite ROWID).
   ///
   /// Only set for INSERT operations on tables with a ROWID.
   /// Tables created with `WITHOUT ROWID` will not set this value (returns 0).
   pub last_insert_id: i64,
}

/// SQL text plus bind values, run on the connection it was created from.
///
/// Created by a session's `create_command`, which enlists it in the session's
/// transaction. A command can be executed any number of times; bind values are
/// kept between executions until [`SqliteCommand::clear_bindings`].
pub struct SqliteCommand {
   shared: Arc<Shared>,
   text: String,
   values: Vec<JsonValue>,
   transaction: Option<Uuid>,
}

impl SqliteCommand {
   pub(crate) fn new(shared: Arc<Shared>) -> Self {
      Self {
         shared,
         text: String::new(),
         values: Vec::new(),
         transaction: None,
      }
   }

   pub fn set_text(&mut self, text: impl Into<String>) -> &mut Self {
      self.text = text.into();
      self
   }

   pub fn text(&self) -> &str {
      &self.text
   }

   /// Append a positional bind value (`$1`, `$2`, ...).
   pub fn bind(&mut self, value: impl Into<JsonValue>) -> &mut Self {
      self.values.push(value.into());
      self
   }

   pub fn clear_bindings(&mut self) -> &mut Self {
      self.values.clear();
      self
   }

   /// Token of the transaction this command is enlisted in
   pub fn transaction_id(&self) -> Option<Uuid> {
      self.transaction
   }

   /// Execute a write statement (INSERT/UPDATE/DELETE/DDL)
   pub fn execute(&self) -> Result<WriteQueryResult> {
      self.shared.run(self.transaction, |runtime, conn| {
         let result = runtime.block_on(self.query().execute(&mut *conn))?;
         Ok(WriteQueryResult {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_rowid(),
         })
      })
   }

   /// Execute a SELECT query, possibly returning multiple rows
   pub fn fetch_all(&self) -> Result<Vec<IndexMap<String, JsonValue>>> {
      self.shared.run(self.transaction, |runtime, conn| {
         let rows = runtime.block_on(self.query().fetch_all(&mut *conn))?;
         decode_rows(rows)
      })
   }

   /// Execute a query expecting zero or one result
   ///
   /// The statement runs as written; at most two rows are read to detect a
   /// second one, which fails with [`Error::MultipleRowsReturned`].
   pub fn fetch_one(&self) -> Result<Option<IndexMap<String, JsonValue>>> {
      self.shared.run(self.transaction, |runtime, conn| {
         match runtime.block_on(single_row(self.query().fetch(&mut *conn)))? {
            Some(row) => Ok(decode_rows(vec![row])?.pop()),
            None => Ok(None),
         }
      })
   }

   fn query(&self) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
      let mut q = sqlx::query(&self.text);
      for value in &self.values {
         q = bind_value(q, value.clone());
      }
      q
   }
}

impl Command for SqliteCommand {
   type Transaction = SqliteTransaction;

   fn set_transaction(&mut self, transaction: &SqliteTransaction) {
      self.transaction = Some(transaction.transaction_id());
   }

   fn has_transaction(&self) -> bool {
      self.transaction.is_some()
   }
}

/// Read the only row of `rows`; a second row is an error.
async fn single_row<S>(mut rows: S) -> Result<Option<SqliteRow>>
where
   S: Stream<Item = std::result::Result<SqliteRow, sqlx::Error>> + Unpin,
{
   let Some(first) = rows.try_next().await? else {
      return Ok(None);
   };
   if rows.try_next().await?.is_some() {
      return Err(Error::MultipleRowsReturned(2));
   }
   Ok(Some(first))
}

/// Helper function to bind a JSON value to a SQLx query
fn bind_value<'a>(
   query: sqlx::query::Query<'a, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'a>>,
   value: JsonValue,
) -> sqlx::query::Query<'a, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'a>> {
   match value {
      JsonValue::Null => query.bind(None::<JsonValue>),
      JsonValue::String(s) => query.bind(s),
      JsonValue::Bool(b) => query.bind(b),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            query.bind(int_val)
         } else if let Some(uint_val) = number.as_u64() {
            // Try to fit u64 into i64 (SQLite's INTEGER type)
            match i64::try_from(uint_val) {
               Ok(int_val) => query.bind(int_val),
               // Value too large for i64, use f64 (will lose precision)
               Err(_) => query.bind(uint_val as f64),
            }
         } else {
            query.bind(number.as_f64().unwrap_or_default())
         }
      }
      value => query.bind(value),
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use db_session::{Connection, ReadOnlySession, Session};
   use serde_json::json;
   use tempfile::TempDir;

   use crate::SqliteConnection;

   fn create_test_db() -> (SqliteConnection, TempDir) {
      let temp_dir = TempDir::new().expect("Failed to create temp directory");
      let connection = SqliteConnection::from_path(temp_dir.path().join("test.db"), None)
         .expect("Failed to build test connection");
      (connection, temp_dir)
   }

   fn run(
      session: &Session<SqliteConnection>,
      sql: &str,
      values: Vec<JsonValue>,
   ) -> WriteQueryResult {
      let mut command = session.create_command().unwrap();
      command.set_text(sql);
      for value in values {
         command.bind(value);
      }
      command.execute().unwrap()
   }

   #[test]
   fn test_execute_and_write_result() {
      let (connection, _temp) = create_test_db();
      let session = Session::new(connection).unwrap();

      // DDL returns 0 rows affected
      let result = run(&session, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", vec![]);
      assert_eq!(result.rows_affected, 0);

      // INSERT returns rows_affected and last_insert_id
      let result = run(&session, "INSERT INTO t (name) VALUES ($1)", vec![json!("Alice")]);
      assert_eq!((result.rows_affected, result.last_insert_id), (1, 1));

      let result = run(&session, "INSERT INTO t (name) VALUES ($1)", vec![json!("Bob")]);
      assert_eq!((result.rows_affected, result.last_insert_id), (1, 2));

      // UPDATE affects multiple rows
      let result = run(&session, "UPDATE t SET name = 'X' WHERE id > 0", vec![]);
      assert_eq!(result.rows_affected, 2);

      session.save_changes().unwrap();
   }

   #[test]
   fn test_fetch_one() {
      let (connection, _temp) = create_test_db();
      let session = Session::new(connection).unwrap();
      run(&session, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", vec![]);

      let mut command = session.create_command().unwrap();
      command.set_text("SELECT * FROM t WHERE id = $1").bind(999);

      // No results returns None
      assert!(command.fetch_one().unwrap().is_none());

      run(
         &session,
         "INSERT INTO t (name) VALUES ($1), ($2)",
         vec![json!("Alice"), json!("Bob")],
      );

      // Single result returns Some
      command.clear_bindings().bind(1);
      let row = command.fetch_one().unwrap().unwrap();
      assert_eq!(row.get("name"), Some(&json!("Alice")));

      // Multiple results returns error
      command.set_text("SELECT * FROM t;").clear_bindings();
      let err = command.fetch_one().unwrap_err();
      assert!(err.to_string().contains("2 rows"));
   }

   #[test]
   fn test_fetch_one_runs_statement_as_written() {
      let (connection, _temp) = create_test_db();
      let session = Session::new(connection).unwrap();
      run(&session, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", vec![]);
      run(
         &session,
         "INSERT INTO t (name) VALUES ($1), ($2)",
         vec![json!("Alice"), json!("Bob")],
      );

      let mut command = session.create_command().unwrap();

      // Existing LIMIT
      command.set_text("SELECT name FROM t ORDER BY id DESC LIMIT 1");
      let row = command.fetch_one().unwrap().unwrap();
      assert_eq!(row.get("name"), Some(&json!("Bob")));

      // PRAGMA
      command.set_text("PRAGMA foreign_keys");
      let row = command.fetch_one().unwrap().unwrap();
      assert_eq!(row.get("foreign_keys"), Some(&json!(1)));

      // Connection stays usable after a stream stopped early
      command.set_text("SELECT name FROM t");
      assert_eq!(command.fetch_one().unwrap_err().error_code(), "MULTIPLE_ROWS_RETURNED");
      command.set_text("SELECT COUNT(*) AS count FROM t");
      let row = command.fetch_one().unwrap().unwrap();
      assert_eq!(row.get("count"), Some(&json!(2)));
   }

   #[test]
   fn test_type_binding_and_decoding() {
      let (connection, _temp) = create_test_db();
      let session = Session::new(connection).unwrap();
      run(
         &session,
         "CREATE TABLE t (id INTEGER PRIMARY KEY, txt TEXT, num REAL, big INTEGER, \
          flag BOOLEAN, data BLOB)",
         vec![],
      );

      let large_int: i64 = 9_007_199_254_740_992; // 2^53

      run(&session, "INSERT INTO t (txt) VALUES ($1)", vec![JsonValue::Null]);
      run(
         &session,
         "INSERT INTO t (txt, num) VALUES ($1, $2)",
         vec![json!("hello"), json!(1.23456)],
      );
      run(&session, "INSERT INTO t (big) VALUES ($1)", vec![json!(large_int)]);
      run(&session, "INSERT INTO t (flag) VALUES ($1)", vec![json!(true)]);

      // BLOB ("Hello" in hex)
      run(&session, "INSERT INTO t (data) VALUES (X'48656C6C6F')", vec![]);

      let mut command = session.create_command().unwrap();
      command.set_text("SELECT * FROM t ORDER BY id");
      let rows = command.fetch_all().unwrap();

      // NULL decoding
      assert_eq!(rows[0].get("txt"), Some(&JsonValue::Null));

      // Float decoding (with tolerance)
      let num = rows[1].get("num").unwrap().as_f64().unwrap();
      assert!((num - 1.23456).abs() < 0.0001);

      // Large integer precision
      assert_eq!(rows[2].get("big"), Some(&json!(large_int)));

      // Boolean stored as integer
      assert_eq!(rows[3].get("flag"), Some(&json!(1)));

      // BLOB as base64
      assert_eq!(rows[4].get("data").unwrap().as_str(), Some("SGVsbG8="));
   }

   #[test]
   fn test_column_order_preserved() {
      let (connection, _temp) = create_test_db();
      let session = Session::new(connection).unwrap();
      run(&session, "CREATE TABLE t (z TEXT, a TEXT, m TEXT)", vec![]);
      run(
         &session,
         "INSERT INTO t VALUES ($1, $2, $3)",
         vec![json!("z"), json!("a"), json!("m")],
      );

      let mut command = session.create_command().unwrap();
      command.set_text("SELECT z, a, m FROM t");
      let rows = command.fetch_all().unwrap();

      let keys: Vec<&String> = rows[0].keys().collect();
      assert_eq!(keys, vec!["z", "a", "m"]);
   }

   #[test]
   fn test_command_outliving_session_reports_closed_connection() {
      let (connection, _temp) = create_test_db();
      let session = ReadOnlySession::new(connection).unwrap();

      let mut command = session.create_command().unwrap();
      command.set_text("SELECT 1");
      assert!(session.connection().is_open());

      session.dispose();
      let err = command.fetch_all().unwrap_err();
      assert_eq!(err.error_code(), "CONNECTION_CLOSED");
   }
}
