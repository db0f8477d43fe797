//! Schema manager: system tables, per-collection value tables, and
//! per-index side tables.
//!
//! On-disk layout:
//!
//! ```text
//! __turf_collections(name TEXT PRIMARY KEY, schemaVersion INTEGER)
//! __turf_extensions(name TEXT, collection TEXT, version INTEGER,
//!                   PRIMARY KEY(name, collection))
//! collection_{name}(key TEXT PRIMARY KEY NOT NULL,
//!                   valueData BLOB NOT NULL,
//!                   rowVersion INTEGER NOT NULL)
//! index_{name}(key TEXT PRIMARY KEY NOT NULL, <one column per property>)
//! ```

use tracing::debug;
use turf_sqlite::{Scalar, SqlSession};

use crate::error::{Error, Result};

/// Creates the system tables if they do not exist yet.
pub(crate) fn create_system_tables(session: &SqlSession) -> Result<()> {
   session.exec(
      "CREATE TABLE IF NOT EXISTS __turf_collections (
         name TEXT PRIMARY KEY,
         schemaVersion INTEGER
      );
      CREATE TABLE IF NOT EXISTS __turf_extensions (
         name TEXT,
         collection TEXT,
         version INTEGER,
         PRIMARY KEY (name, collection)
      );",
   )?;
   Ok(())
}

/// Name of the value table backing a collection.
pub(crate) fn value_table(collection: &str) -> String {
   format!("collection_{collection}")
}

/// Name of the side table backing a collection's secondary index.
pub(crate) fn index_table(collection: &str) -> String {
   format!("index_{collection}")
}

/// Validates that a collection or property name is a plain identifier.
pub(crate) fn validate_name(name: &str) -> Result<()> {
   let mut chars = name.chars();
   let valid_first = chars
      .next()
      .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
   if valid_first && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
      Ok(())
   } else {
      Err(Error::InvalidName(name.to_string()))
   }
}

/// Quotes an identifier for interpolation into SQL.
///
/// Any embedded double quotes are doubled per SQL standard (`"` → `""`).
pub(crate) fn quote_identifier(name: &str) -> String {
   format!("\"{}\"", name.replace('"', "\"\""))
}

/// Installs a collection's value table, checking the stored schema version.
///
/// First registration creates the table and records the declared version.
/// On re-open with a matching version this is a no-op; a mismatch surfaces
/// [`Error::MigrationRequired`] and leaves the stored rows untouched.
pub(crate) fn install_collection(session: &SqlSession, name: &str, version: u64) -> Result<()> {
   let stored = session.query_scalar(
      "SELECT schemaVersion FROM __turf_collections WHERE name = ?",
      &[Scalar::Text(name.to_string())],
   )?;

   match stored.as_ref().and_then(Scalar::as_integer) {
      Some(v) if v as u64 == version => {}
      Some(v) => {
         return Err(Error::MigrationRequired {
            name: name.to_string(),
            from: v as u64,
            to: version,
         });
      }
      None => {
         debug!(collection = %name, version, "installing collection table");
         session.exec(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
               key TEXT PRIMARY KEY NOT NULL,
               valueData BLOB NOT NULL,
               rowVersion INTEGER NOT NULL
            )",
            quote_identifier(&value_table(name)),
         ))?;
         session.execute(
            "INSERT INTO __turf_collections (name, schemaVersion) VALUES (?, ?)",
            &[Scalar::Text(name.to_string()), Scalar::Integer(version as i64)],
         )?;
      }
   }
   Ok(())
}

/// The recorded version of an extension, if it was ever installed.
pub(crate) fn stored_extension_version(
   session: &SqlSession,
   extension: &str,
   collection: &str,
) -> Result<Option<u64>> {
   let stored = session.query_scalar(
      "SELECT version FROM __turf_extensions WHERE name = ? AND collection = ?",
      &[
         Scalar::Text(extension.to_string()),
         Scalar::Text(collection.to_string()),
      ],
   )?;
   Ok(stored.and_then(|s| s.as_integer()).map(|v| v as u64))
}

/// Records (or bumps) an extension's installed version.
pub(crate) fn record_extension_version(
   session: &SqlSession,
   extension: &str,
   collection: &str,
   version: u64,
) -> Result<()> {
   session.execute(
      "INSERT OR REPLACE INTO __turf_extensions (name, collection, version) VALUES (?, ?, ?)",
      &[
         Scalar::Text(extension.to_string()),
         Scalar::Text(collection.to_string()),
         Scalar::Integer(version as i64),
      ],
   )?;
   Ok(())
}
