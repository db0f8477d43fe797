//! Observing connections and collection observables.
//!
//! An observing connection never serves user reads directly. The committing
//! thread, still holding the writer lock, hands each published change set to
//! the connection's [`ObserverHub`]; the hub drains the connection's
//! invalidation mailbox, opens a read transaction — whose snapshot is
//! exactly the state the commit produced, since no later writer can have
//! started — and delivers `(transaction, collection change set)` to every
//! collection observer with changes, in subscription order.

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::warn;

use crate::changeset::{ChangeSet, CollectionChangeSet};
use crate::collection::{CollectionsContainer, TurfCollection};
use crate::connection::ConnectionCore;
use crate::database::DatabaseCore;
use crate::error::Result;
use crate::transaction::{ReadCollection, ReadTransaction};

use super::observable::{Callback, Disposable, Observable, Subscriber};

/// Receives one collection's changes under the post-commit snapshot.
pub(crate) trait ChangeSink: Send + Sync {
   fn deliver(&self, tx: &ReadTransaction<'_>, changes: &CollectionChangeSet);
}

struct SinkEntry {
   collection: String,
   sink: Weak<dyn ChangeSink>,
}

/// Dispatch state of one observing connection.
pub(crate) struct ObserverHub {
   conn: Arc<ConnectionCore>,
   sinks: Mutex<Vec<SinkEntry>>,
}

impl ObserverHub {
   pub(crate) fn new(conn: Arc<ConnectionCore>) -> Self {
      Self {
         conn,
         sinks: Mutex::new(Vec::new()),
      }
   }

   fn register(&self, collection: String, sink: Weak<dyn ChangeSink>) {
      let mut sinks = self.sinks.lock();
      sinks.retain(|entry| entry.sink.strong_count() > 0);
      sinks.push(SinkEntry { collection, sink });
   }

   /// Delivers `change_set` to every observer whose collection it touched.
   ///
   /// Runs on the committing thread under the writer lock. Failures here
   /// are logged, never surfaced to the writer: the commit itself already
   /// succeeded.
   pub(crate) fn dispatch(&self, db: &DatabaseCore, change_set: &ChangeSet) {
      let targets: Vec<(Arc<dyn ChangeSink>, &CollectionChangeSet)> = {
         let mut sinks = self.sinks.lock();
         sinks.retain(|entry| entry.sink.strong_count() > 0);
         sinks
            .iter()
            .filter_map(|entry| {
               let changes = change_set.for_collection(&entry.collection)?;
               if changes.is_empty() {
                  return None;
               }
               Some((entry.sink.upgrade()?, changes))
            })
            .collect()
      };
      if targets.is_empty() {
         return;
      }

      let deliver = self.with_snapshot(db, |tx| {
         for (sink, changes) in &targets {
            sink.deliver(tx, changes);
         }
      });
      if let Err(error) = deliver {
         warn!(%error, "observer dispatch failed; change set dropped for this connection");
      }
   }

   /// Opens a read transaction on the observing connection and runs `f`
   /// under it.
   pub(crate) fn with_snapshot(
      &self,
      db: &DatabaseCore,
      f: impl FnOnce(&ReadTransaction<'_>),
   ) -> Result<()> {
      self.conn.drain_mailbox();
      let session_guard = self.conn.session.lock();
      let session = &*session_guard;
      if !session.is_autocommit() {
         session.rollback()?;
      }
      session.begin_deferred()?;
      let tx = ReadTransaction::new(session, &self.conn.caches, db);
      f(&tx);
      drop(tx);
      session.rollback()?;
      Ok(())
   }
}

/// A shared handle to the observing connection driving a pipeline.
pub struct ObservingHandle {
   pub(crate) hub: Arc<ObserverHub>,
   pub(crate) db: Arc<DatabaseCore>,
}

impl ObservingHandle {
   pub(crate) fn new(hub: Arc<ObserverHub>, db: Arc<DatabaseCore>) -> Self {
      Self { hub, db }
   }

   /// Runs `f` under a fresh snapshot of the observing connection. Used for
   /// replaying buffered values to late subscribers.
   pub(crate) fn with_snapshot(&self, f: impl FnOnce(&ReadTransaction<'_>)) -> Result<()> {
      self.hub.with_snapshot(&self.db, f)
   }
}

impl Clone for ObservingHandle {
   fn clone(&self) -> Self {
      Self {
         hub: Arc::clone(&self.hub),
         db: Arc::clone(&self.db),
      }
   }
}

/// A connection dedicated to change-driven reads.
///
/// Minted by [`Database::new_observing_connection`](crate::Database::new_observing_connection);
/// hand its observables out through [`observe`](Self::observe).
pub struct ObservingConnection<CC: CollectionsContainer> {
   handle: ObservingHandle,
   collections: Arc<CC>,
}

impl<CC: CollectionsContainer> ObservingConnection<CC> {
   pub(crate) fn new(handle: ObservingHandle, collections: Arc<CC>) -> Self {
      Self {
         handle,
         collections,
      }
   }

   /// The container of this database's collections.
   pub fn collections(&self) -> &CC {
      &self.collections
   }

   /// An observable of `collection`, emitting once per commit that touches
   /// it. Nothing is emitted at subscribe time.
   pub fn observe<Col>(&self, collection: &Col) -> CollectionObservable<Col>
   where
      Col: TurfCollection + Clone,
   {
      let inner = Arc::new(CollectionObservableInner {
         collection: collection.clone(),
         subscribers: Mutex::new(Vec::new()),
         next_subscriber_id: AtomicU64::new(0),
      });
      let dyn_inner: Arc<dyn ChangeSink> = inner.clone();
      let sink: Weak<dyn ChangeSink> = Arc::downgrade(&dyn_inner);
      self
         .handle
         .hub
         .register(collection.name().to_string(), sink);
      CollectionObservable {
         inner,
         handle: self.handle.clone(),
      }
   }
}

pub(crate) struct CollectionObservableInner<Col: TurfCollection> {
   pub(crate) collection: Col,
   subscribers: Mutex<Vec<Subscriber<CollectionChangeSet>>>,
   next_subscriber_id: AtomicU64,
}

impl<Col: TurfCollection> ChangeSink for CollectionObservableInner<Col> {
   fn deliver(&self, tx: &ReadTransaction<'_>, changes: &CollectionChangeSet) {
      // Snapshot the list first so a callback may subscribe or dispose
      // without deadlocking.
      let callbacks: Vec<_> = self
         .subscribers
         .lock()
         .iter()
         .map(|subscriber| Arc::clone(&subscriber.callback))
         .collect();
      for callback in callbacks {
         let mut callback = callback.lock();
         (*callback)(tx, changes);
      }
   }
}

/// The root observable of one collection on one observing connection.
///
/// Emits the collection's [`CollectionChangeSet`] once per commit that
/// touched the collection, under the post-commit snapshot.
pub struct CollectionObservable<Col: TurfCollection + Clone> {
   pub(crate) inner: Arc<CollectionObservableInner<Col>>,
   handle: ObservingHandle,
}

impl<Col: TurfCollection + Clone> CollectionObservable<Col> {
   /// The observed collection's descriptor.
   pub fn collection(&self) -> &Col {
      &self.inner.collection
   }

   /// Like [`subscribe_next`](Observable::subscribe_next), handing the
   /// subscriber a ready-made read view of the observed collection.
   pub fn subscribe_collection<F>(&self, mut f: F) -> Disposable
   where
      F: FnMut(ReadCollection<'_, Col>, &CollectionChangeSet) + Send + 'static,
   {
      let collection = self.inner.collection.clone();
      self.subscribe_next(move |tx, changes| match tx.read_only(&collection) {
         Ok(read) => f(read, changes),
         Err(error) => warn!(%error, "observed collection is not registered"),
      })
   }
}

impl<Col: TurfCollection + Clone> Clone for CollectionObservable<Col> {
   fn clone(&self) -> Self {
      Self {
         inner: Arc::clone(&self.inner),
         handle: self.handle.clone(),
      }
   }
}

impl<Col: TurfCollection + Clone> Observable for CollectionObservable<Col> {
   type Item = CollectionChangeSet;

   fn subscribe_with(&self, callback: Callback<Self::Item>) -> Disposable {
      let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
      self
         .inner
         .subscribers
         .lock()
         .push(Subscriber::new(id, callback));

      let weak = Arc::downgrade(&self.inner);
      Disposable::new(move || {
         if let Some(inner) = weak.upgrade() {
            inner.subscribers.lock().retain(|s| s.id != id);
         }
      })
   }

   fn connection(&self) -> ObservingHandle {
      self.handle.clone()
   }
}
