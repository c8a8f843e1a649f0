//! SQLite transactions

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use db_session::{IsolationLevel, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::connection::Shared;
use crate::{Error, Result};

/// Statement that begins a transaction at `level`, and whether it needs
/// `PRAGMA read_uncommitted` switched on first.
///
/// SQLite transactions are serializable. Weaker levels than serializable are
/// promoted, except `ReadUncommitted`, which SQLite supports for shared-cache
/// connections. `Snapshot` has no SQLite equivalent.
pub(crate) fn begin_statement(level: IsolationLevel) -> Result<(&'static str, bool)> {
   match level {
      IsolationLevel::ReadUncommitted => Ok(("BEGIN", true)),
      IsolationLevel::Unspecified
      | IsolationLevel::ReadCommitted
      | IsolationLevel::RepeatableRead
      | IsolationLevel::Serializable => Ok(("BEGIN IMMEDIATE", false)),
      IsolationLevel::Snapshot => Err(Error::UnsupportedIsolationLevel(level)),
   }
}

/// Pending transaction on a [`SqliteConnection`](crate::SqliteConnection).
///
/// Identified by a token that enlisted commands carry. Dropping it without
/// [`commit`](Transaction::commit) rolls back.
#[must_use = "if unused, the transaction is immediately rolled back"]
pub struct SqliteTransaction {
   shared: Arc<Shared>,
   transaction_id: Uuid,
   level: IsolationLevel,
   finalized: AtomicBool,
}

impl SqliteTransaction {
   pub(crate) fn new(shared: Arc<Shared>, transaction_id: Uuid, level: IsolationLevel) -> Self {
      Self {
         shared,
         transaction_id,
         level,
         finalized: AtomicBool::new(false),
      }
   }

   pub fn transaction_id(&self) -> Uuid {
      self.transaction_id
   }

   /// Roll back now instead of on drop.
   pub fn rollback(&self) -> Result<()> {
      self.finish("ROLLBACK")?;
      debug!("Transaction {} rolled back", self.transaction_id);
      Ok(())
   }

   fn finish(&self, statement: &'static str) -> Result<()> {
      if self.finalized.load(Ordering::SeqCst) {
         return Err(Error::TransactionAlreadyFinalized);
      }
      self.shared.finish_transaction(self.transaction_id, statement)?;
      self.finalized.store(true, Ordering::SeqCst);
      Ok(())
   }
}

impl Transaction for SqliteTransaction {
   type Error = Error;

   fn isolation_level(&self) -> IsolationLevel {
      self.level
   }

   fn commit(&self) -> Result<()> {
      self.finish("COMMIT")?;
      debug!("Transaction {} committed", self.transaction_id);
      Ok(())
   }
}

impl Drop for SqliteTransaction {
   fn drop(&mut self) {
      if self.finalized.load(Ordering::SeqCst) {
         return;
      }

      debug!(
         "Dropping transaction {} without commit (will auto-rollback)",
         self.transaction_id
      );

      match self.finish("ROLLBACK") {
         // Already ended by closing the connection
         Ok(()) | Err(Error::TransactionAlreadyFinalized) | Err(Error::ConnectionClosed) => {}
         Err(e) => warn!("Rollback of transaction {} failed: {}", self.transaction_id, e),
      }
   }
}
