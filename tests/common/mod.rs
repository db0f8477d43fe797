//! Shared fixtures: a users collection with a secondary index, a plain
//! movies collection, and helpers to open a database on a temp file.

// Not every integration test uses every fixture.
#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use turf::{
   CollectionsContainer, Database, IndexedCollection, IndexedProperty, ReadWriteTransaction,
   SecondaryIndex, SerializeError, TurfCollection,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
   pub first_name: String,
   pub last_name: String,
   pub is_active: bool,
   pub is_current: bool,
   pub email: Option<String>,
   pub favourite_movies: Vec<String>,
}

impl User {
   pub fn new(first_name: &str, last_name: &str) -> Self {
      Self {
         first_name: first_name.to_string(),
         last_name: last_name.to_string(),
         is_active: true,
         is_current: false,
         email: None,
         favourite_movies: Vec::new(),
      }
   }

   pub fn active(mut self, is_active: bool) -> Self {
      self.is_active = is_active;
      self
   }

   pub fn current(mut self, is_current: bool) -> Self {
      self.is_current = is_current;
      self
   }

   pub fn email(mut self, email: &str) -> Self {
      self.email = Some(email.to_string());
      self
   }

   pub fn favourites(mut self, keys: &[&str]) -> Self {
      self.favourite_movies = keys.iter().map(|k| k.to_string()).collect();
      self
   }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
   pub name: String,
   pub year: i64,
}

impl Movie {
   pub fn new(name: &str, year: i64) -> Self {
      Self {
         name: name.to_string(),
         year,
      }
   }
}

#[derive(Clone)]
pub struct UsersCollection {
   pub is_active: IndexedProperty<UsersCollection, bool>,
   pub is_current: IndexedProperty<UsersCollection, bool>,
   pub email: IndexedProperty<UsersCollection, Option<String>>,
   pub last_name: IndexedProperty<UsersCollection, String>,
   schema_version: u64,
   index: SecondaryIndex<UsersCollection>,
}

impl UsersCollection {
   pub fn new() -> Self {
      Self::with_versions(1, 1)
   }

   /// Variant with explicit schema and index versions, for migration and
   /// backfill tests.
   pub fn with_versions(schema_version: u64, index_version: u64) -> Self {
      let is_active: IndexedProperty<UsersCollection, bool> =
         IndexedProperty::new("isActive", |user: &User| user.is_active);
      let is_current: IndexedProperty<UsersCollection, bool> =
         IndexedProperty::new("isCurrent", |user: &User| user.is_current);
      let email: IndexedProperty<UsersCollection, Option<String>> =
         IndexedProperty::new("email", |user: &User| user.email.clone());
      let last_name: IndexedProperty<UsersCollection, String> =
         IndexedProperty::new("lastName", |user: &User| user.last_name.clone());

      let index = SecondaryIndex::new(
         "users",
         index_version,
         vec![
            is_active.lift(),
            is_current.lift(),
            email.lift(),
            last_name.lift(),
         ],
      );
      Self {
         is_active,
         is_current,
         email,
         last_name,
         schema_version,
         index,
      }
   }
}

impl TurfCollection for UsersCollection {
   type Value = User;

   fn name(&self) -> &str {
      "users"
   }

   fn schema_version(&self) -> u64 {
      self.schema_version
   }

   fn serialize(&self, value: &User) -> Result<Vec<u8>, SerializeError> {
      serde_json::to_vec(value).map_err(Into::into)
   }

   fn deserialize(&self, bytes: &[u8]) -> Option<User> {
      serde_json::from_slice(bytes).ok()
   }

   fn extensions(&self) -> Vec<&dyn turf::CollectionExtension<Value = User>> {
      vec![&self.index]
   }
}

impl IndexedCollection for UsersCollection {
   fn index(&self) -> &SecondaryIndex<Self> {
      &self.index
   }
}

#[derive(Clone)]
pub struct MoviesCollection;

impl TurfCollection for MoviesCollection {
   type Value = Movie;

   fn name(&self) -> &str {
      "movies"
   }

   fn schema_version(&self) -> u64 {
      1
   }

   fn serialize(&self, value: &Movie) -> Result<Vec<u8>, SerializeError> {
      serde_json::to_vec(value).map_err(Into::into)
   }

   fn deserialize(&self, bytes: &[u8]) -> Option<Movie> {
      serde_json::from_slice(bytes).ok()
   }
}

pub struct AppCollections {
   pub users: UsersCollection,
   pub movies: MoviesCollection,
}

impl AppCollections {
   pub fn new() -> Self {
      Self {
         users: UsersCollection::new(),
         movies: MoviesCollection,
      }
   }

   pub fn with_versions(schema_version: u64, index_version: u64) -> Self {
      Self {
         users: UsersCollection::with_versions(schema_version, index_version),
         movies: MoviesCollection,
      }
   }
}

impl CollectionsContainer for AppCollections {
   fn set_up_collections(&self, tx: &ReadWriteTransaction<'_>) -> turf::Result<()> {
      self.users.set_up(tx)?;
      self.movies.set_up(tx)
   }
}

/// Opens a fresh database in its own temp directory.
pub fn open_db() -> (Database<AppCollections>, TempDir) {
   let dir = TempDir::new().unwrap();
   let db = Database::open(dir.path().join("test.turf"), AppCollections::new()).unwrap();
   (db, dir)
}

/// Seeds the three users of the index scenarios.
pub fn seed_users(db: &Database<AppCollections>) {
   let connection = db.new_connection().unwrap();
   connection
      .read_write_transaction(|tx, collections| {
         let users = tx.read_write(&collections.users)?;
         users.set("AmyAdams", User::new("Amy", "Adams").active(true))?;
         users.set("TomHanks", User::new("Tom", "Hanks").active(false))?;
         users.set("BillMurray", User::new("Bill", "Murray").active(true))?;
         Ok(())
      })
      .unwrap();
}
