//! Error types for turf-sqlite

use thiserror::Error;

/// Errors raised by the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
   /// IO error when accessing database files. Standard library IO errors
   /// are converted to this variant.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),

   /// The database file is not a database, or its content is damaged.
   #[error("database corruption: {0}")]
   Corruption(String),

   /// A uniqueness, not-null, or check constraint was violated.
   #[error("constraint violation: {0}")]
   Constraint(String),

   /// Any other error from the underlying SQLite driver.
   #[error("sqlite error: {0}")]
   Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StorageError {
   fn from(err: rusqlite::Error) -> Self {
      if let rusqlite::Error::SqliteFailure(cause, ref message) = err {
         let detail = || {
            message
               .clone()
               .unwrap_or_else(|| cause.to_string())
         };
         match cause.code {
            rusqlite::ErrorCode::ConstraintViolation => {
               return StorageError::Constraint(detail());
            }
            rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase => {
               return StorageError::Corruption(detail());
            }
            _ => {}
         }
      }
      StorageError::Sqlite(err)
   }
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_io_error_converts() {
      let err: StorageError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
      assert!(matches!(err, StorageError::Io(_)));
   }

   #[test]
   fn test_constraint_failure_is_classified() {
      let cause = rusqlite::ffi::Error {
         code: rusqlite::ErrorCode::ConstraintViolation,
         extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY,
      };
      let err: StorageError =
         rusqlite::Error::SqliteFailure(cause, Some("UNIQUE constraint failed".into())).into();
      assert!(matches!(err, StorageError::Constraint(_)));
      assert!(err.to_string().contains("UNIQUE constraint failed"));
   }

   #[test]
   fn test_other_sqlite_errors_pass_through() {
      let err: StorageError = rusqlite::Error::QueryReturnedNoRows.into();
      assert!(matches!(err, StorageError::Sqlite(_)));
   }
}
