//! # Turf
//!
//! An embedded, typed, schemaless key/value store layered on SQLite, with
//! secondary indexes and reactive change observation.
//!
//! ## Core Types
//!
//! - **[`Database`]**: One backing file plus the container of its
//!   collections; mints connections
//! - **[`Connection`]**: Read and read/write transactions over the shared
//!   file, with a per-connection value cache
//! - **[`TurfCollection`]** / **[`CollectionsContainer`]**: The typed
//!   namespaces an application declares and registers at open
//! - **[`SecondaryIndex`]** / **[`IndexedProperty`]** / **[`Predicate`]**:
//!   Typed projections into a side table and the query algebra over them
//! - **[`ObservingConnection`]** / **[`Observable`]**: Change-driven reads,
//!   one emission per commit, at the commit's own snapshot
//!
//! ## Architecture
//!
//! - **Single writer, concurrent readers**: WAL mode plus a database-wide
//!   writer lock; readers on other connections keep their snapshot
//! - **Synchronous transactions**: a transaction is a closure on the calling
//!   thread; blocking only happens when acquiring the writer lock
//! - **Transactional notifications**: a commit's change set reaches
//!   observers after the commit completes and before the next write begins

mod cache;
mod changeset;
mod collection;
mod connection;
mod database;
mod error;
mod index;
mod observe;
mod registry;
mod schema;
mod transaction;

pub use changeset::{Change, ChangeKind, ChangeSet, CollectionChangeSet};
pub use collection::{
   CollectionsContainer, DEFAULT_VALUE_CACHE_CAPACITY, IndexedCollection, SerializeError,
   TurfCollection,
};
pub use connection::Connection;
pub use database::{Database, DatabaseConfig};
pub use error::{Error, Result, StorageError};
pub use index::{
   AnyProperty, CollectionExtension, IndexScalar, IndexedProperty, Predicate,
   PreparedValuesQuery, SecondaryIndex,
};
pub use observe::{
   Callback, CollectionObservable, Disposable, FirstObservable, MapObservable, Observable,
   ObservingConnection, ObservingHandle, Prefilter, SharedObservable, ValuesObservable,
};
pub use transaction::{ReadCollection, ReadTransaction, ReadWriteTransaction, WriteCollection};

pub use turf_sqlite::{Scalar, ScalarKind, SessionConfig};
