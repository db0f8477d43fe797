//! Collection traits: the typed, named key/value namespaces an application
//! declares and registers with a [`Database`](crate::Database).
//!
//! A collection descriptor is a cheap, clonable value created once at
//! application start. It names the collection, carries its schema version and
//! cache policy, and supplies the `serialize`/`deserialize` pair shared by
//! every value in the namespace. Descriptors for all collections live in a
//! [`CollectionsContainer`], whose `set_up_collections` hook registers each of
//! them inside the write transaction that opens the database.

use crate::error::Result;
use crate::index::{CollectionExtension, SecondaryIndex};
use crate::transaction::ReadWriteTransaction;

/// LRU capacity used when a collection does not override
/// [`TurfCollection::value_cache_capacity`].
pub const DEFAULT_VALUE_CACHE_CAPACITY: usize = 50;

/// Error type produced by a collection's serializer.
pub type SerializeError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A typed, named key/value namespace.
///
/// Values are opaque to the engine: they travel as bytes produced by
/// [`serialize`](Self::serialize) and come back through
/// [`deserialize`](Self::deserialize). A deserializer returning `None` makes
/// the stored row read as absent; the row itself is left untouched.
pub trait TurfCollection: Send + Sync + 'static {
   /// The value type stored in this collection.
   type Value: Clone + Send + 'static;

   /// Unique name of the collection within its database.
   ///
   /// Must be a plain identifier; it becomes part of the backing table name.
   fn name(&self) -> &str;

   /// Monotonic schema version. A mismatch against the stored version at
   /// registration surfaces [`Error::MigrationRequired`](crate::Error).
   fn schema_version(&self) -> u64;

   /// LRU capacity of this collection's per-connection value cache.
   ///
   /// `None` disables caching for the collection entirely.
   fn value_cache_capacity(&self) -> Option<usize> {
      Some(DEFAULT_VALUE_CACHE_CAPACITY)
   }

   /// Encodes a value for storage.
   fn serialize(&self, value: &Self::Value) -> std::result::Result<Vec<u8>, SerializeError>;

   /// Decodes a stored value. `None` is treated as "value not found".
   fn deserialize(&self, bytes: &[u8]) -> Option<Self::Value>;

   /// Extensions maintained alongside this collection, notified of every
   /// mutation.
   fn extensions(&self) -> Vec<&dyn CollectionExtension<Value = Self::Value>> {
      Vec::new()
   }

   /// Registers the collection and its extensions with the database.
   ///
   /// Called from [`CollectionsContainer::set_up_collections`] inside the
   /// write transaction that opens the database.
   fn set_up(&self, tx: &ReadWriteTransaction<'_>) -> Result<()>
   where
      Self: Sized,
   {
      tx.register_collection(self)
   }
}

/// The static universe of collections known to one database.
///
/// Implementations are plain structs with one field per collection
/// descriptor; `set_up_collections` calls [`TurfCollection::set_up`] on each.
pub trait CollectionsContainer: Send + Sync + 'static {
   /// Registers every collection of the container. Invoked inside a write
   /// transaction when the database is opened.
   fn set_up_collections(&self, tx: &ReadWriteTransaction<'_>) -> Result<()>;
}

/// A collection carrying a secondary index.
///
/// Grants access to the indexed query surface (`count_values_where`,
/// `find_keys_where`, `find_values_where`, `remove_values_where`, prepared
/// queries).
pub trait IndexedCollection: TurfCollection + Sized {
   /// The secondary index maintained for this collection.
   fn index(&self) -> &SecondaryIndex<Self>;
}
