//! Transaction isolation levels

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Isolation level requested when a session starts its transaction.
///
/// [`IsolationLevel::Unspecified`] is the sentinel for "no transaction". Every
/// other level is handed to the driver untouched; it is up to the driver to
/// honor, promote or reject it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
   /// No transaction is started.
   #[default]
   Unspecified,
   /// Dirty reads allowed.
   ReadUncommitted,
   ReadCommitted,
   RepeatableRead,
   /// Reads see a consistent snapshot taken when the transaction began.
   Snapshot,
   /// Strongest level; default for read-write sessions.
   Serializable,
}

impl IsolationLevel {
   /// Whether a session constructed with this level begins a transaction.
   pub fn starts_transaction(self) -> bool {
      self != IsolationLevel::Unspecified
   }

   /// Canonical snake_case name, matching the serde representation.
   pub fn as_str(self) -> &'static str {
      match self {
         IsolationLevel::Unspecified => "unspecified",
         IsolationLevel::ReadUncommitted => "read_uncommitted",
         IsolationLevel::ReadCommitted => "read_committed",
         IsolationLevel::RepeatableRead => "repeatable_read",
         IsolationLevel::Snapshot => "snapshot",
         IsolationLevel::Serializable => "serializable",
      }
   }
}

impl fmt::Display for IsolationLevel {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// Error returned when parsing an unknown isolation level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown isolation level: {0}")]
pub struct ParseIsolationLevelError(String);

impl FromStr for IsolationLevel {
   type Err = ParseIsolationLevelError;

   /// Accepts snake_case, kebab-case and the SQL spelling (`READ COMMITTED`),
   /// case-insensitively.
   fn from_str(s: &str) -> Result<Self, Self::Err> {
      let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
      match normalized.as_str() {
         "unspecified" | "none" => Ok(IsolationLevel::Unspecified),
         "read_uncommitted" => Ok(IsolationLevel::ReadUncommitted),
         "read_committed" => Ok(IsolationLevel::ReadCommitted),
         "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
         "snapshot" => Ok(IsolationLevel::Snapshot),
         "serializable" => Ok(IsolationLevel::Serializable),
         _ => Err(ParseIsolationLevelError(s.to_string())),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_only_unspecified_skips_transaction() {
      assert!(!IsolationLevel::Unspecified.starts_transaction());
      for level in [
         IsolationLevel::ReadUncommitted,
         IsolationLevel::ReadCommitted,
         IsolationLevel::RepeatableRead,
         IsolationLevel::Snapshot,
         IsolationLevel::Serializable,
      ] {
         assert!(level.starts_transaction(), "{level} should begin a transaction");
      }
   }

   #[test]
   fn test_default_is_unspecified() {
      assert_eq!(IsolationLevel::default(), IsolationLevel::Unspecified);
   }

   #[test]
   fn test_parse_accepts_sql_spelling() {
      assert_eq!(
         "READ COMMITTED".parse::<IsolationLevel>().unwrap(),
         IsolationLevel::ReadCommitted
      );
      assert_eq!(
         "repeatable-read".parse::<IsolationLevel>().unwrap(),
         IsolationLevel::RepeatableRead
      );
      assert_eq!(
         " Serializable ".parse::<IsolationLevel>().unwrap(),
         IsolationLevel::Serializable
      );
   }

   #[test]
   fn test_parse_rejects_unknown() {
      let err = "chaos".parse::<IsolationLevel>().unwrap_err();
      assert!(err.to_string().contains("chaos"));
   }

   #[test]
   fn test_serde_uses_snake_case() {
      let json = serde_json::to_string(&IsolationLevel::ReadUncommitted).unwrap();
      assert_eq!(json, "\"read_uncommitted\"");

      let level: IsolationLevel = serde_json::from_str("\"serializable\"").unwrap();
      assert_eq!(level, IsolationLevel::Serializable);
   }
}
