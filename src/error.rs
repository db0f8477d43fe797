//! Error types for the Turf engine.

use thiserror::Error;

pub use turf_sqlite::StorageError;

/// Errors that may occur when working with a Turf database.
#[derive(Error, Debug)]
pub enum Error {
   /// Error from the storage layer. Always aborts the containing transaction.
   #[error(transparent)]
   Storage(#[from] StorageError),

   /// A collection with this name is already registered with the database.
   #[error("collection `{0}` is already registered")]
   DuplicateCollection(String),

   /// An extension with this name is already registered for the collection.
   #[error("extension `{extension}` is already registered for collection `{collection}`")]
   DuplicateExtension {
      collection: String,
      extension: String,
   },

   /// The named collection has not been registered with this database.
   #[error("collection `{0}` is not registered with this database")]
   UnknownCollection(String),

   /// The stored schema version does not match the collection's declared
   /// version. Running the migration is the caller's responsibility.
   #[error("collection `{name}` requires migration from schema version {from} to {to}")]
   MigrationRequired { name: String, from: u64, to: u64 },

   /// A collection or indexed-property name is not a valid SQL identifier.
   #[error("`{0}` is not a valid name: must match [a-zA-Z_][a-zA-Z0-9_]*")]
   InvalidName(String),

   /// An indexed property collides with a column the engine reserves.
   #[error("indexed property `{0}` uses a reserved column name")]
   ReservedPropertyName(String),

   /// The collection's serializer rejected a value. Aborts the write.
   #[error("failed to serialize value for collection `{collection}`: {reason}")]
   Serialization { collection: String, reason: String },
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_migration_required_names_both_versions() {
      let err = Error::MigrationRequired {
         name: "users".into(),
         from: 1,
         to: 2,
      };
      let text = err.to_string();
      assert!(text.contains("users"));
      assert!(text.contains("from schema version 1 to 2"));
   }

   #[test]
   fn test_duplicate_extension_names_collection() {
      let err = Error::DuplicateExtension {
         collection: "users".into(),
         extension: "index".into(),
      };
      assert!(err.to_string().contains("`index`"));
      assert!(err.to_string().contains("`users`"));
   }
}
