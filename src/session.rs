//! Read-only and read-write sessions
//!
//! A session owns one connection and at most one transaction for the length
//! of a unit of work:
//!
//! ```text
//! construct ──► open connection ──► begin transaction (unless Unspecified)
//!     │
//!     ├── create_command() × N   (each enlisted in the transaction)
//!     ├── save_changes()         (Session only: commit)
//!     ▼
//! drop / dispose ──► drop transaction (rolls back if uncommitted) ──► close connection
//! ```

use tracing::{debug, warn};

use crate::connection::{Command, Connection, Transaction};
use crate::error::{Error, Result};
use crate::isolation::IsolationLevel;

/// Command type vended by a session over connection `C`.
pub type CommandOf<C> = <C as Connection>::Command;

/// Options applied when a session is constructed.
///
/// | constructor                     | `isolation_level` |
/// |---------------------------------|-------------------|
/// | [`SessionOptions::read_only`]   | `Unspecified`     |
/// | [`SessionOptions::read_write`]  | `Serializable`    |
///
/// # Examples
///
/// ```
/// use db_session::{IsolationLevel, SessionOptions};
///
/// let options = SessionOptions::read_write().isolation_level(IsolationLevel::ReadCommitted);
/// assert_eq!(options.isolation_level, IsolationLevel::ReadCommitted);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
   /// Level of the transaction to begin; `Unspecified` begins none.
   pub isolation_level: IsolationLevel,
}

impl SessionOptions {
   /// Defaults for [`ReadOnlySession`]: no transaction.
   pub fn read_only() -> Self {
      Self {
         isolation_level: IsolationLevel::Unspecified,
      }
   }

   /// Defaults for [`Session`]: a serializable transaction.
   pub fn read_write() -> Self {
      Self {
         isolation_level: IsolationLevel::Serializable,
      }
   }

   pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
      self.isolation_level = level;
      self
   }
}

/// Session that opens a connection and, optionally, a transaction.
///
/// Construction opens the connection eagerly. Dropping the session (or calling
/// [`ReadOnlySession::dispose`]) drops the transaction first, which rolls back
/// anything uncommitted, and then closes the connection.
///
/// Not meant to be shared between threads; create one session per unit of
/// concurrency.
#[must_use = "dropping a session disposes it immediately"]
pub struct ReadOnlySession<C: Connection> {
   transaction: Option<C::Transaction>,
   connection: C,
   isolation_level: IsolationLevel,
}

impl<C: Connection> ReadOnlySession<C> {
   /// Open a session without a transaction.
   pub fn new(connection: C) -> Result<Self> {
      Self::with_options(connection, SessionOptions::read_only())
   }

   /// Open a session, beginning a transaction unless `level` is `Unspecified`.
   pub fn with_isolation_level(connection: C, level: IsolationLevel) -> Result<Self> {
      Self::with_options(connection, SessionOptions::read_only().isolation_level(level))
   }

   /// Open a session with explicit options.
   ///
   /// Fails with [`Error::InvalidArgument`] if `connection` is already open,
   /// before anything is acquired. If beginning the transaction fails, the
   /// connection is closed again before the error is returned.
   pub fn with_options(connection: C, options: SessionOptions) -> Result<Self> {
      let level = options.isolation_level;

      if connection.is_open() {
         return Err(Error::InvalidArgument(
            "connection is already open; a session opens the connection it is given".into(),
         ));
      }

      connection
         .open()
         .map_err(|e| Error::Connection(Box::new(e)))?;

      let transaction = if level.starts_transaction() {
         match connection.begin_transaction(level) {
            Ok(transaction) => Some(transaction),
            Err(e) => {
               if let Err(close_err) = connection.close() {
                  warn!(error = %close_err, "Failed to close connection after begin failure");
               }
               return Err(Error::BeginTransaction {
                  level,
                  source: Box::new(e),
               });
            }
         }
      } else {
         None
      };

      debug!(
         isolation_level = %level,
         transaction = transaction.is_some(),
         "Session opened"
      );

      Ok(Self {
         transaction,
         connection,
         isolation_level: level,
      })
   }

   /// Create a command on this session's connection.
   ///
   /// When a transaction is active the command is enlisted in it before it is
   /// returned. The caller owns the command; the session does not track it.
   pub fn create_command(&self) -> Result<CommandOf<C>> {
      let mut command = self
         .connection
         .create_command()
         .map_err(|e| Error::Command(Box::new(e)))?;

      if let Some(transaction) = &self.transaction {
         command.set_transaction(transaction);
      }

      Ok(command)
   }

   pub fn connection(&self) -> &C {
      &self.connection
   }

   /// Active transaction, if the session was opened with one.
   pub fn transaction(&self) -> Option<&C::Transaction> {
      self.transaction.as_ref()
   }

   /// Level requested at construction.
   pub fn isolation_level(&self) -> IsolationLevel {
      self.isolation_level
   }

   pub fn in_transaction(&self) -> bool {
      self.transaction.is_some()
   }

   /// Dispose the session now. Equivalent to dropping it.
   pub fn dispose(self) {
      drop(self);
   }
}

impl<C: Connection> Drop for ReadOnlySession<C> {
   fn drop(&mut self) {
      // The transaction must go while its connection is still open.
      if let Some(transaction) = self.transaction.take() {
         debug!(
            isolation_level = %transaction.isolation_level(),
            "Disposing session transaction"
         );
         drop(transaction);
      }

      if let Err(e) = self.connection.close() {
         warn!(error = %e, "Failed to close connection while disposing session");
      }

      debug!("Session disposed");
   }
}

/// Read-write session. Begins a serializable transaction by default.
///
/// Changes become durable only through [`Session::save_changes`]; a session
/// dropped without it rolls back.
#[must_use = "dropping a session disposes it immediately, rolling back its transaction"]
pub struct Session<C: Connection> {
   base: ReadOnlySession<C>,
}

impl<C: Connection> Session<C> {
   /// Open a session with a serializable transaction.
   pub fn new(connection: C) -> Result<Self> {
      Self::with_options(connection, SessionOptions::read_write())
   }

   /// Open a session at `level`. `Unspecified` opens it without a transaction,
   /// which turns [`Session::save_changes`] into a no-op.
   pub fn with_isolation_level(connection: C, level: IsolationLevel) -> Result<Self> {
      Self::with_options(connection, SessionOptions::read_write().isolation_level(level))
   }

   pub fn with_options(connection: C, options: SessionOptions) -> Result<Self> {
      Ok(Self {
         base: ReadOnlySession::with_options(connection, options)?,
      })
   }

   /// Commit the active transaction, if there is one.
   ///
   /// Failures are returned as [`Error::Commit`] and never retried here;
   /// retrying (for example after a serialization conflict) means disposing
   /// this session and running the unit of work again in a new one.
   pub fn save_changes(&self) -> Result<()> {
      match self.base.transaction() {
         Some(transaction) => {
            transaction
               .commit()
               .map_err(|e| Error::Commit(Box::new(e)))?;
            debug!(
               isolation_level = %transaction.isolation_level(),
               "Session changes committed"
            );
         }
         None => debug!("Session has no transaction; nothing to commit"),
      }
      Ok(())
   }

   pub fn create_command(&self) -> Result<CommandOf<C>> {
      self.base.create_command()
   }

   pub fn connection(&self) -> &C {
      self.base.connection()
   }

   pub fn transaction(&self) -> Option<&C::Transaction> {
      self.base.transaction()
   }

   pub fn isolation_level(&self) -> IsolationLevel {
      self.base.isolation_level()
   }

   pub fn in_transaction(&self) -> bool {
      self.base.in_transaction()
   }

   /// Dispose the session now, rolling back anything not saved.
   pub fn dispose(self) {
      drop(self);
   }
}

/// Access to a session from a type that wraps one.
///
/// Repository types hold a [`Session`] or [`ReadOnlySession`] privately and
/// implement this trait to get the command factory and transaction queries
/// without re-exposing the session itself.
///
/// # Examples
///
/// ```ignore
/// struct UserStore<C: Connection> {
///    session: Session<C>,
/// }
///
/// impl<C: Connection> SessionScope for UserStore<C> {
///    type Connection = C;
///
///    fn base(&self) -> &ReadOnlySession<C> {
///       self.session.base()
///    }
/// }
/// ```
pub trait SessionScope {
   type Connection: Connection;

   /// The read-only session underneath.
   fn base(&self) -> &ReadOnlySession<Self::Connection>;

   fn create_command(&self) -> Result<CommandOf<Self::Connection>> {
      self.base().create_command()
   }

   fn isolation_level(&self) -> IsolationLevel {
      self.base().isolation_level()
   }

   fn in_transaction(&self) -> bool {
      self.base().in_transaction()
   }
}

impl<C: Connection> SessionScope for ReadOnlySession<C> {
   type Connection = C;

   fn base(&self) -> &ReadOnlySession<C> {
      self
   }
}

impl<C: Connection> SessionScope for Session<C> {
   type Connection = C;

   fn base(&self) -> &ReadOnlySession<C> {
      &self.base
   }
}
