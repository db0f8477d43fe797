//! Configuration for SQLite sessions

use std::time::Duration;

/// Configuration applied when a [`SqlSession`](crate::SqlSession) is opened.
///
/// # Examples
///
/// ```
/// use turf_sqlite::SessionConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = SessionConfig::default();
///
/// // Override just one field
/// let config = SessionConfig {
///    busy_timeout: Duration::from_secs(10),
///    ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
   /// How long a statement waits on a locked database before failing.
   ///
   /// A writer holding the file lock causes concurrent `BEGIN IMMEDIATE`
   /// attempts from other processes to block for up to this duration.
   ///
   /// Default: 5 seconds
   pub busy_timeout: Duration,

   /// Size of the prepared-statement cache, in statements.
   ///
   /// Default: 32
   pub statement_cache_capacity: usize,
}

impl Default for SessionConfig {
   fn default() -> Self {
      Self {
         busy_timeout: Duration::from_secs(5),
         statement_cache_capacity: 32,
      }
   }
}
