//! Blocking SQLite connection implementing the db-session driver contract

use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use db_session::{Connection, FromConnectionString, IsolationLevel};
use parking_lot::Mutex;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection as _};
use tokio::runtime::Runtime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::command::SqliteCommand;
use crate::config::SqliteConnectionConfig;
use crate::transaction::{SqliteTransaction, begin_statement};
use crate::{Error, Result};

/// Single SQLite connection driven synchronously.
///
/// ## Architecture
///
/// - **`runtime`**: Current-thread tokio runtime; every driver call is a
///   `block_on` on it, so callers never need an async context
/// - **`state.conn`**: The sqlx connection, present only while open
/// - **`state.active`**: The pending transaction, if any. Commands check their
///   enlistment against it before running
///
/// Transactions and commands share this state through an `Arc`, so a command
/// that outlives its connection fails with [`Error::ConnectionClosed`] instead
/// of touching a closed handle.
///
/// ## Usage Pattern
///
/// ```text
/// 1. Build (from connect options, a path, or a connection string) - not yet open
/// 2. Hand to a db-session session, which opens it and begins the transaction
/// 3. Commands run on it through the session
/// 4. The session closes it on drop
/// ```
pub struct SqliteConnection {
   shared: Arc<Shared>,
}

pub(crate) struct Shared {
   runtime: Runtime,
   options: SqliteConnectOptions,
   state: Mutex<State>,
}

#[derive(Default)]
struct State {
   conn: Option<sqlx::SqliteConnection>,
   active: Option<ActiveTransaction>,
}

struct ActiveTransaction {
   id: Uuid,
   /// `PRAGMA read_uncommitted` was switched on for this transaction
   read_uncommitted: bool,
}

impl SqliteConnection {
   /// Build an unopened connection from sqlx connect options.
   ///
   /// `config` settings are applied on top of `options`; pass `None` for
   /// [`SqliteConnectionConfig::default`].
   pub fn new(
      options: SqliteConnectOptions,
      config: Option<SqliteConnectionConfig>,
   ) -> Result<Self> {
      let config = config.unwrap_or_default();
      let options = options
         .busy_timeout(config.busy_timeout)
         .foreign_keys(config.foreign_keys)
         .statement_cache_capacity(config.statement_cache_capacity);

      let runtime = tokio::runtime::Builder::new_current_thread()
         .enable_all()
         .build()
         .map_err(Error::Runtime)?;

      Ok(Self {
         shared: Arc::new(Shared {
            runtime,
            options,
            state: Mutex::new(State::default()),
         }),
      })
   }

   /// Build an unopened connection to a database file, creating it on open
   /// if it does not exist.
   pub fn from_path(
      path: impl AsRef<Path>,
      config: Option<SqliteConnectionConfig>,
   ) -> Result<Self> {
      let options = SqliteConnectOptions::new()
         .filename(path.as_ref())
         .create_if_missing(true);
      Self::new(options, config)
   }

   /// Path of the database file
   pub fn path(&self) -> &Path {
      self.shared.options.get_filename()
   }

   /// Whether a transaction is pending on this connection
   pub fn in_transaction(&self) -> bool {
      self.shared.state.lock().active.is_some()
   }
}

impl Connection for SqliteConnection {
   type Error = Error;
   type Transaction = SqliteTransaction;
   type Command = SqliteCommand;

   fn is_open(&self) -> bool {
      self.shared.state.lock().conn.is_some()
   }

   fn open(&self) -> Result<()> {
      let mut state = self.shared.state.lock();
      if state.conn.is_some() {
         return Err(Error::AlreadyOpen);
      }

      let conn = self.shared.block_on(self.shared.options.connect())?;
      state.conn = Some(conn);

      debug!("Connection opened for db: {}", self.path().display());
      Ok(())
   }

   fn begin_transaction(&self, level: IsolationLevel) -> Result<SqliteTransaction> {
      let (statement, read_uncommitted) = begin_statement(level)?;

      let mut guard = self.shared.state.lock();
      let State { conn, active } = &mut *guard;
      let conn = conn.as_mut().ok_or(Error::ConnectionClosed)?;

      if active.is_some() {
         return Err(Error::TransactionAlreadyActive);
      }

      if read_uncommitted {
         self
            .shared
            .block_on(sqlx::query("PRAGMA read_uncommitted = 1").execute(&mut *conn))?;
      }

      if let Err(e) = self
         .shared
         .block_on(sqlx::query(statement).execute(&mut *conn))
      {
         if read_uncommitted {
            self.shared.reset_read_uncommitted(conn);
         }
         return Err(e.into());
      }

      let id = Uuid::new_v4();
      *active = Some(ActiveTransaction {
         id,
         read_uncommitted,
      });

      debug!(
         "Transaction {} began ({}) for db: {}",
         id,
         level,
         self.path().display()
      );
      Ok(SqliteTransaction::new(Arc::clone(&self.shared), id, level))
   }

   fn create_command(&self) -> Result<SqliteCommand> {
      if !self.is_open() {
         return Err(Error::ConnectionClosed);
      }
      Ok(SqliteCommand::new(Arc::clone(&self.shared)))
   }

   fn close(&self) -> Result<()> {
      self.shared.close()
   }
}

impl FromConnectionString for SqliteConnection {
   type Error = Error;

   /// Parse a sqlx SQLite URL such as `sqlite://data.db?mode=rwc`.
   fn from_connection_string(connection_string: &str) -> Result<Self> {
      let options = SqliteConnectOptions::from_str(connection_string)?;
      Self::new(options, None)
   }
}

impl Drop for SqliteConnection {
   fn drop(&mut self) {
      if let Err(e) = self.shared.close() {
         warn!("Failed to close connection on drop: {}", e);
      }
   }
}

impl Shared {
   fn block_on<F: Future>(&self, future: F) -> F::Output {
      self.runtime.block_on(future)
   }

   fn close(&self) -> Result<()> {
      let mut state = self.state.lock();
      let Some(conn) = state.conn.take() else {
         return Ok(());
      };

      // Closing the handle rolls back anything still pending
      if state.active.take().is_some() {
         debug!("Closing connection with a pending transaction (will auto-rollback)");
      }

      self.block_on(conn.close())?;
      debug!("Connection closed for db: {}", self.options.get_filename().display());
      Ok(())
   }

   /// Run `statement` to end the pending transaction `id`.
   pub(crate) fn finish_transaction(&self, id: Uuid, statement: &'static str) -> Result<()> {
      let mut guard = self.state.lock();
      let State { conn, active } = &mut *guard;

      match active {
         Some(pending) if pending.id == id => {}
         _ => return Err(Error::TransactionAlreadyFinalized),
      }
      let conn = conn.as_mut().ok_or(Error::ConnectionClosed)?;

      self.block_on(sqlx::query(statement).execute(&mut *conn))?;

      if let Some(finished) = active.take()
         && finished.read_uncommitted
      {
         self.reset_read_uncommitted(conn);
      }
      Ok(())
   }

   /// Run `f` on the open connection once `enlisted` matches the pending
   /// transaction.
   pub(crate) fn run<T>(
      &self,
      enlisted: Option<Uuid>,
      f: impl FnOnce(&Runtime, &mut sqlx::SqliteConnection) -> Result<T>,
   ) -> Result<T> {
      let mut guard = self.state.lock();
      let State { conn, active } = &mut *guard;
      let conn = conn.as_mut().ok_or(Error::ConnectionClosed)?;

      match (active.as_ref().map(|pending| pending.id), enlisted) {
         (Some(_), None) => return Err(Error::TransactionRequired),
         (Some(pending), Some(enlisted)) if pending != enlisted => {
            return Err(Error::TransactionMismatch);
         }
         (None, Some(_)) => return Err(Error::TransactionMismatch),
         _ => {}
      }

      f(&self.runtime, conn)
   }

   fn reset_read_uncommitted(&self, conn: &mut sqlx::SqliteConnection) {
      let reset = sqlx::query("PRAGMA read_uncommitted = 0").execute(&mut *conn);
      if let Err(e) = self.block_on(reset) {
         warn!("Failed to reset read_uncommitted: {}", e);
      }
   }
}
