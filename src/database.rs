//! The database façade and the state shared by its connections.
//!
//! ## Architecture
//!
//! One [`Database`] owns a [`DatabaseCore`] shared (via `Arc`) with every
//! connection minted from it:
//!
//! - **`registry`**: which collections and extensions are registered
//! - **`writer`**: the single writer lock; also the home of the monotonic
//!   row-version and commit-sequence counters
//! - **`connections`**: weak handles used to fan out cache invalidations
//! - **`observers`**: weak handles to observing connections, dispatched to
//!   in registration order after every commit
//!
//! Opening a database creates the system tables and runs the container's
//! `set_up_collections` hook inside a write transaction.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;
use turf_sqlite::{SessionConfig, SqlSession};

use crate::cache::Invalidation;
use crate::changeset::ChangeSet;
use crate::collection::CollectionsContainer;
use crate::connection::{Connection, ConnectionCore};
use crate::error::Result;
use crate::observe::{ObserverHub, ObservingConnection, ObservingHandle};
use crate::registry::CollectionRegistry;
use crate::schema;

/// Configuration for a [`Database`].
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
   /// Settings applied to every SQL session the database opens.
   pub session: SessionConfig,
}

pub(crate) struct WriterState {
   /// Next row version handed to a mutation. Globally monotonic; seeded
   /// from the stored rows at registration.
   pub(crate) next_row_version: u64,
   /// Next commit sequence number; stamped onto published change sets.
   pub(crate) next_commit_seq: u64,
}

/// State shared by all connections of one database.
pub(crate) struct DatabaseCore {
   pub(crate) path: PathBuf,
   pub(crate) config: DatabaseConfig,
   pub(crate) registry: RwLock<CollectionRegistry>,
   pub(crate) writer: Mutex<WriterState>,
   connections: Mutex<Vec<std::sync::Weak<ConnectionCore>>>,
   observers: Mutex<Vec<std::sync::Weak<ObserverHub>>>,
   next_connection_id: AtomicU64,
}

impl DatabaseCore {
   fn register_connection(&self, core: &Arc<ConnectionCore>) {
      let mut connections = self.connections.lock();
      connections.retain(|weak| weak.strong_count() > 0);
      connections.push(Arc::downgrade(core));
   }

   fn register_observer(&self, hub: &Arc<ObserverHub>) {
      let mut observers = self.observers.lock();
      observers.retain(|weak| weak.strong_count() > 0);
      observers.push(Arc::downgrade(hub));
   }

   /// Distributes one commit: invalidation messages to every sibling
   /// connection, then the change set to every observing connection.
   ///
   /// Runs on the committing thread while it still holds the writer lock,
   /// so invalidation happens-before any snapshot that could see the new
   /// row versions, and observer callbacks finish before the next write
   /// transaction begins.
   pub(crate) fn fan_out(
      &self,
      origin: u64,
      invalidations: &[Invalidation],
      change_set: &ChangeSet,
   ) {
      let siblings: Vec<Arc<ConnectionCore>> = {
         let mut connections = self.connections.lock();
         connections.retain(|weak| weak.strong_count() > 0);
         connections.iter().filter_map(std::sync::Weak::upgrade).collect()
      };
      for sibling in siblings {
         if sibling.id != origin {
            sibling.push_invalidations(invalidations);
         }
      }

      let hubs: Vec<Arc<ObserverHub>> = {
         let mut observers = self.observers.lock();
         observers.retain(|weak| weak.strong_count() > 0);
         observers.iter().filter_map(std::sync::Weak::upgrade).collect()
      };
      for hub in hubs {
         hub.dispatch(self, change_set);
      }
   }

   pub(crate) fn open_session(&self) -> Result<SqlSession> {
      Ok(SqlSession::open(&self.path, &self.config.session)?)
   }
}

/// An embedded, typed, schemaless key/value store on a single SQLite file.
///
/// # Example
///
/// ```ignore
/// let db = Database::open("app.turf", AppCollections::new())?;
/// let connection = db.new_connection()?;
///
/// connection.read_write_transaction(|tx, collections| {
///    let users = tx.read_write(&collections.users)?;
///    users.set("BillMurray", User::new("Bill", "Murray"))
/// })?;
/// ```
pub struct Database<CC: CollectionsContainer> {
   core: Arc<DatabaseCore>,
   collections: Arc<CC>,
}

impl<CC: CollectionsContainer> Database<CC> {
   /// Opens (creating if necessary) the database at `path` and registers
   /// every collection of `collections` inside a write transaction.
   pub fn open(path: impl AsRef<Path>, collections: CC) -> Result<Self> {
      Self::open_with_config(path, collections, DatabaseConfig::default())
   }

   /// [`open`](Self::open) with explicit configuration.
   pub fn open_with_config(
      path: impl AsRef<Path>,
      collections: CC,
      config: DatabaseConfig,
   ) -> Result<Self> {
      let core = Arc::new(DatabaseCore {
         path: path.as_ref().to_path_buf(),
         config,
         registry: RwLock::new(CollectionRegistry::default()),
         writer: Mutex::new(WriterState {
            next_row_version: 1,
            next_commit_seq: 1,
         }),
         connections: Mutex::new(Vec::new()),
         observers: Mutex::new(Vec::new()),
         next_connection_id: AtomicU64::new(1),
      });

      {
         let session = core.open_session()?;
         schema::create_system_tables(&session)?;
      }

      let db = Self {
         core,
         collections: Arc::new(collections),
      };

      let setup = db.new_connection()?;
      setup.read_write_transaction(|tx, collections| collections.set_up_collections(tx))?;
      debug!(path = %db.core.path.display(), "database open");
      Ok(db)
   }

   /// A new connection for read and read/write transactions.
   pub fn new_connection(&self) -> Result<Connection<CC>> {
      let id = self.core.next_connection_id.fetch_add(1, Ordering::Relaxed);
      let session = self.core.open_session()?;
      let conn = Arc::new(ConnectionCore::new(id, session));
      self.core.register_connection(&conn);
      Ok(Connection {
         core: conn,
         db: Arc::clone(&self.core),
         collections: Arc::clone(&self.collections),
      })
   }

   /// A new connection dedicated to observation.
   ///
   /// Not usable for direct reads; its snapshot advances to each commit and
   /// is what observer callbacks see.
   pub fn new_observing_connection(&self) -> Result<ObservingConnection<CC>> {
      let id = self.core.next_connection_id.fetch_add(1, Ordering::Relaxed);
      let session = self.core.open_session()?;
      let conn = Arc::new(ConnectionCore::new(id, session));
      self.core.register_connection(&conn);

      let hub = Arc::new(ObserverHub::new(conn));
      self.core.register_observer(&hub);
      Ok(ObservingConnection::new(
         ObservingHandle::new(hub, Arc::clone(&self.core)),
         Arc::clone(&self.collections),
      ))
   }

   /// The container of this database's collections.
   pub fn collections(&self) -> &CC {
      &self.collections
   }

   /// Path of the backing file.
   pub fn path(&self) -> &Path {
      &self.core.path
   }
}
