//! Cache coherency across connections and isolation under real parallelism.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::*;

// ============================================================================
// Cache coherency
// ============================================================================

#[test]
fn test_sibling_connection_sees_updates_after_caching() {
   let (db, _dir) = open_db();
   let writer = db.new_connection().unwrap();
   let reader = db.new_connection().unwrap();

   writer
      .read_write_transaction(|tx, collections| {
         tx.read_write(&collections.users)?.set("AmyAdams", User::new("Amy", "Adams"))
      })
      .unwrap();

   // Prime the reader's cache.
   reader
      .read_transaction(|tx, collections| {
         let amy = tx.read_only(&collections.users)?.value_for("AmyAdams")?.unwrap();
         assert_eq!(amy.email, None);
         Ok(())
      })
      .unwrap();

   writer
      .read_write_transaction(|tx, collections| {
         tx.read_write(&collections.users)?
            .set("AmyAdams", User::new("Amy", "Adams").email("amy@example.com"))
      })
      .unwrap();

   // The invalidation mailbox is drained at the next transaction start, so
   // the cached pre-update value can never be served at the new snapshot.
   reader
      .read_transaction(|tx, collections| {
         let amy = tx.read_only(&collections.users)?.value_for("AmyAdams")?.unwrap();
         assert_eq!(amy.email.as_deref(), Some("amy@example.com"));
         Ok(())
      })
      .unwrap();
}

#[test]
fn test_sibling_connection_sees_removal_after_caching() {
   let (db, _dir) = open_db();
   let writer = db.new_connection().unwrap();
   let reader = db.new_connection().unwrap();

   writer
      .read_write_transaction(|tx, collections| {
         tx.read_write(&collections.users)?.set("AmyAdams", User::new("Amy", "Adams"))
      })
      .unwrap();
   reader
      .read_transaction(|tx, collections| {
         assert!(tx.read_only(&collections.users)?.value_for("AmyAdams")?.is_some());
         Ok(())
      })
      .unwrap();

   writer
      .read_write_transaction(|tx, collections| {
         tx.read_write(&collections.users)?.remove_value_for("AmyAdams")
      })
      .unwrap();
   reader
      .read_transaction(|tx, collections| {
         assert!(tx.read_only(&collections.users)?.value_for("AmyAdams")?.is_none());
         Ok(())
      })
      .unwrap();
}

#[test]
fn test_writer_reads_its_own_writes_from_cache() {
   let (db, _dir) = open_db();
   let connection = db.new_connection().unwrap();

   connection
      .read_write_transaction(|tx, collections| {
         let users = tx.read_write(&collections.users)?;
         users.set("AmyAdams", User::new("Amy", "Adams"))?;
         // Same transaction: the just-written value is readable.
         assert!(users.value_for("AmyAdams")?.is_some());
         Ok(())
      })
      .unwrap();

   // Post-commit reads on the writing connection are served from the cache
   // it populated during the write.
   connection
      .read_transaction(|tx, collections| {
         let amy = tx.read_only(&collections.users)?.value_for("AmyAdams")?;
         assert_eq!(amy.map(|u| u.first_name), Some("Amy".to_string()));
         Ok(())
      })
      .unwrap();
}

#[test]
fn test_aborted_writes_are_not_served_from_cache() {
   let (db, _dir) = open_db();
   let connection = db.new_connection().unwrap();

   connection
      .read_write_transaction(|tx, collections| {
         tx.read_write(&collections.users)?.set("AmyAdams", User::new("Amy", "Adams"))
      })
      .unwrap();

   let result: turf::Result<()> = connection.read_write_transaction(|tx, collections| {
      tx.read_write(&collections.users)?
         .set("AmyAdams", User::new("Amy", "Adams").email("stale@example.com"))?;
      Err(turf::Error::UnknownCollection("simulated failure".into()))
   });
   assert!(result.is_err());

   connection
      .read_transaction(|tx, collections| {
         let amy = tx.read_only(&collections.users)?.value_for("AmyAdams")?.unwrap();
         assert_eq!(amy.email, None, "rolled-back value must not linger in the cache");
         Ok(())
      })
      .unwrap();
}

// ============================================================================
// Isolation under parallelism
// ============================================================================

#[test]
fn test_concurrent_reader_keeps_pre_commit_snapshot() {
   let (db, _dir) = open_db();
   seed_users(&db);

   let reader = db.new_connection().unwrap();
   let before_write = Arc::new(Barrier::new(2));
   let after_commit = Arc::new(Barrier::new(2));

   let reader_barriers = (Arc::clone(&before_write), Arc::clone(&after_commit));
   let reader_thread = thread::spawn(move || {
      reader
         .read_transaction(|tx, collections| {
            let users = tx.read_only(&collections.users)?;
            let initial = users.count()?;
            reader_barriers.0.wait();
            // The writer commits here.
            reader_barriers.1.wait();
            assert_eq!(
               users.count()?,
               initial,
               "open read transaction must keep its snapshot",
            );
            assert!(users.value_for("GeneHackman")?.is_none());
            Ok(initial)
         })
         .unwrap()
   });

   before_write.wait();
   let writer = db.new_connection().unwrap();
   writer
      .read_write_transaction(|tx, collections| {
         tx.read_write(&collections.users)?.set("GeneHackman", User::new("Gene", "Hackman"))
      })
      .unwrap();
   after_commit.wait();

   let count_before = reader_thread.join().unwrap();
   assert_eq!(count_before, 3);

   // A fresh transaction sees the commit atomically.
   let reader = db.new_connection().unwrap();
   reader
      .read_transaction(|tx, collections| {
         let users = tx.read_only(&collections.users)?;
         assert_eq!(users.count()?, 4);
         assert!(users.value_for("GeneHackman")?.is_some());
         Ok(())
      })
      .unwrap();
}

#[test]
fn test_parallel_writers_serialize() {
   let (db, _dir) = open_db();
   let db = Arc::new(db);

   let mut handles = Vec::new();
   for writer_id in 0..4 {
      let db = Arc::clone(&db);
      handles.push(thread::spawn(move || {
         let connection = db.new_connection().unwrap();
         for i in 0..5 {
            let key = format!("user-{writer_id}-{i}");
            connection
               .read_write_transaction(|tx, collections| {
                  tx.read_write(&collections.users)?.set(&key, User::new("W", "W"))
               })
               .unwrap();
         }
      }));
   }
   for handle in handles {
      handle.join().unwrap();
   }

   let connection = db.new_connection().unwrap();
   connection
      .read_transaction(|tx, collections| {
         assert_eq!(tx.read_only(&collections.users)?.count()?, 20);
         Ok(())
      })
      .unwrap();
}

#[test]
fn test_observer_sees_every_commit_under_parallel_writers() {
   use std::sync::Mutex;
   use turf::Observable;

   let (db, _dir) = open_db();
   let observing = db.new_observing_connection().unwrap();
   let users_observable = observing.observe(&observing.collections().users);

   let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
   let sink = Arc::clone(&seen);
   let _subscription = users_observable.subscribe_next(move |_tx, changes| {
      for change in changes.changes() {
         sink.lock().unwrap().push(change.key.clone());
      }
   });

   let db = Arc::new(db);
   let mut handles = Vec::new();
   for writer_id in 0..3 {
      let db = Arc::clone(&db);
      handles.push(thread::spawn(move || {
         let connection = db.new_connection().unwrap();
         for i in 0..5 {
            let key = format!("user-{writer_id}-{i}");
            connection
               .read_write_transaction(|tx, collections| {
                  tx.read_write(&collections.users)?.set(&key, User::new("W", "W"))
               })
               .unwrap();
         }
      }));
   }
   for handle in handles {
      handle.join().unwrap();
   }

   let mut seen = seen.lock().unwrap().clone();
   seen.sort();
   let mut expected: Vec<String> = (0..3)
      .flat_map(|w| (0..5).map(move |i| format!("user-{w}-{i}")))
      .collect();
   expected.sort();
   assert_eq!(seen, expected, "no commit may be missed or duplicated");
}
