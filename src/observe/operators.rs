//! Derived observables: `map`, `first`, values-where, and multicast
//! sharing.
//!
//! `map` and `first` are cold: each subscriber gets its own chain down to
//! the root collection observable, and the returned [`Disposable`] is the
//! upstream subscription itself. [`SharedObservable`] is the multicasting
//! node: one upstream subscription fans out to a subscriber list and is
//! torn down when the list empties.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::changeset::CollectionChangeSet;
use crate::collection::IndexedCollection;
use crate::index::{Predicate, PreparedValuesQuery};
use crate::transaction::ReadTransaction;

use super::collection::{CollectionObservable, ObservingHandle};
use super::observable::{Callback, Disposable, Observable, Subscriber};

/// Observable emitting `transform(upstream)`.
pub struct MapObservable<S, U, F> {
   upstream: S,
   transform: Arc<F>,
   _output: PhantomData<fn() -> U>,
}

impl<S, U, F> MapObservable<S, U, F>
where
   S: Observable,
   U: Send + 'static,
   F: Fn(&ReadTransaction<'_>, &S::Item) -> U + Send + Sync + 'static,
{
   pub(crate) fn new(upstream: S, transform: F) -> Self {
      Self {
         upstream,
         transform: Arc::new(transform),
         _output: PhantomData,
      }
   }
}

impl<S, U, F> Observable for MapObservable<S, U, F>
where
   S: Observable,
   U: Send + 'static,
   F: Fn(&ReadTransaction<'_>, &S::Item) -> U + Send + Sync + 'static,
{
   type Item = U;

   fn subscribe_with(&self, mut callback: Callback<U>) -> Disposable {
      let transform = Arc::clone(&self.transform);
      self.upstream.subscribe_with(Box::new(move |tx, item| {
         let mapped = (*transform)(tx, item);
         callback(tx, &mapped);
      }))
   }

   fn connection(&self) -> ObservingHandle {
      self.upstream.connection()
   }
}

/// Observable emitting the first element of a collection-valued upstream.
pub struct FirstObservable<S> {
   upstream: S,
}

impl<S> FirstObservable<S> {
   pub(crate) fn new(upstream: S) -> Self {
      Self { upstream }
   }
}

impl<S, T> Observable for FirstObservable<S>
where
   S: Observable<Item = Vec<T>>,
   T: Clone + Send + Sync + 'static,
{
   type Item = Option<T>;

   fn subscribe_with(&self, mut callback: Callback<Option<T>>) -> Disposable {
      self.upstream.subscribe_with(Box::new(move |tx, items| {
         let first = items.first().cloned();
         callback(tx, &first);
      }))
   }

   fn connection(&self) -> ObservingHandle {
      self.upstream.connection()
   }
}

/// The prefilter of a values-where observable: given the triggering change
/// set and the previously emitted values, decides whether the query should
/// re-run.
pub type Prefilter<V> = dyn Fn(&CollectionChangeSet, &[V]) -> bool + Send + Sync;

/// Observable emitting the values matching a predicate, refreshed on each
/// commit that touches the collection.
pub struct ValuesObservable<Col: IndexedCollection + Clone> {
   source: CollectionObservable<Col>,
   query: Arc<PreparedValuesQuery<Col>>,
   prefilter: Arc<Prefilter<Col::Value>>,
}

impl<Col: IndexedCollection + Clone> CollectionObservable<Col> {
   /// Emits the values matching `predicate` after each commit touching the
   /// collection.
   pub fn values_where(&self, predicate: Predicate<Col>) -> ValuesObservable<Col> {
      let query = PreparedValuesQuery::new(self.collection(), predicate);
      self.values_where_prepared(query)
   }

   /// [`values_where`](Self::values_where) against a query prepared ahead
   /// of time.
   pub fn values_where_prepared(&self, query: PreparedValuesQuery<Col>) -> ValuesObservable<Col> {
      ValuesObservable {
         source: self.clone(),
         query: Arc::new(query),
         prefilter: Arc::new(|_, _| true),
      }
   }

   /// [`values_where`](Self::values_where) with a prefilter: when it
   /// returns false for a change set, the query is skipped and the previous
   /// list is re-emitted unchanged.
   pub fn values_where_prefiltered<F>(
      &self,
      predicate: Predicate<Col>,
      prefilter: F,
   ) -> ValuesObservable<Col>
   where
      F: Fn(&CollectionChangeSet, &[Col::Value]) -> bool + Send + Sync + 'static,
   {
      let query = PreparedValuesQuery::new(self.collection(), predicate);
      ValuesObservable {
         source: self.clone(),
         query: Arc::new(query),
         prefilter: Arc::new(prefilter),
      }
   }
}

impl<Col: IndexedCollection + Clone> Clone for ValuesObservable<Col> {
   fn clone(&self) -> Self {
      Self {
         source: self.source.clone(),
         query: Arc::clone(&self.query),
         prefilter: Arc::clone(&self.prefilter),
      }
   }
}

impl<Col: IndexedCollection + Clone> Observable for ValuesObservable<Col> {
   type Item = Vec<Col::Value>;

   fn subscribe_with(&self, mut callback: Callback<Vec<Col::Value>>) -> Disposable {
      let collection = self.source.collection().clone();
      let query = Arc::clone(&self.query);
      let prefilter = Arc::clone(&self.prefilter);
      let mut previous: Vec<Col::Value> = Vec::new();

      self.source.subscribe_with(Box::new(move |tx, changes| {
         if !(*prefilter)(changes, &previous) {
            callback(tx, &previous);
            return;
         }
         let refreshed = tx
            .read_only(&collection)
            .and_then(|read| read.find_values(&query));
         match refreshed {
            Ok(values) => {
               previous = values;
               callback(tx, &previous);
            }
            Err(error) => {
               // Query failures never reach the subscriber; emit the last
               // good value instead.
               warn!(
                  collection = %collection.name(),
                  %error,
                  "values query failed; re-emitting previous result"
               );
               callback(tx, &previous);
            }
         }
      }))
   }

   fn connection(&self) -> ObservingHandle {
      self.source.connection()
   }
}

struct SharedState<T> {
   subscribers: Vec<Subscriber<T>>,
   next_subscriber_id: u64,
   upstream: Option<Disposable>,
   replay: VecDeque<T>,
}

pub(crate) struct SharedInner<S: Observable> {
   source: S,
   buffer_size: usize,
   state: Mutex<SharedState<S::Item>>,
}

/// Multicasting observable: one upstream subscription shared by every
/// subscriber, with an optional replay buffer.
pub struct SharedObservable<S: Observable> {
   inner: Arc<SharedInner<S>>,
   handle: ObservingHandle,
}

impl<S: Observable> SharedObservable<S>
where
   S::Item: Clone,
{
   pub(crate) fn new(source: S, buffer_size: usize) -> Self {
      let handle = source.connection();
      Self {
         inner: Arc::new(SharedInner {
            source,
            buffer_size,
            state: Mutex::new(SharedState {
               subscribers: Vec::new(),
               next_subscriber_id: 0,
               upstream: None,
               replay: VecDeque::new(),
            }),
         }),
         handle,
      }
   }

   /// Number of currently attached subscribers.
   pub fn subscriber_count(&self) -> usize {
      self.inner.state.lock().subscribers.len()
   }
}

impl<S: Observable> Clone for SharedObservable<S> {
   fn clone(&self) -> Self {
      Self {
         inner: Arc::clone(&self.inner),
         handle: self.handle.clone(),
      }
   }
}

impl<S: Observable> Observable for SharedObservable<S>
where
   S::Item: Clone,
{
   type Item = S::Item;

   fn subscribe_with(&self, callback: Callback<S::Item>) -> Disposable {
      // Replay before attaching, under a fresh snapshot, so the new
      // subscriber never sees a replayed value after a live one.
      let replay: Vec<S::Item> = {
         let state = self.inner.state.lock();
         state.replay.iter().cloned().collect()
      };
      let subscriber = {
         let mut state = self.inner.state.lock();
         let id = state.next_subscriber_id;
         state.next_subscriber_id += 1;
         Subscriber::new(id, callback)
      };
      if !replay.is_empty() {
         let callback = Arc::clone(&subscriber.callback);
         let replayed = self.handle.with_snapshot(|tx| {
            let mut callback = callback.lock();
            for value in &replay {
               (*callback)(tx, value);
            }
         });
         if let Err(error) = replayed {
            warn!(%error, "replay to new subscriber failed");
         }
      }

      let id = subscriber.id;
      {
         let mut state = self.inner.state.lock();
         state.subscribers.push(subscriber);
         if state.upstream.is_none() {
            state.upstream = Some(self.subscribe_upstream());
         }
      }

      let weak = Arc::downgrade(&self.inner);
      Disposable::new(move || {
         let Some(inner) = weak.upgrade() else {
            return;
         };
         let upstream = {
            let mut state = inner.state.lock();
            state.subscribers.retain(|s| s.id != id);
            if state.subscribers.is_empty() {
               state.upstream.take()
            } else {
               None
            }
         };
         if let Some(mut upstream) = upstream {
            upstream.dispose();
         }
      })
   }

   fn connection(&self) -> ObservingHandle {
      self.handle.clone()
   }
}

impl<S: Observable> SharedObservable<S>
where
   S::Item: Clone,
{
   fn subscribe_upstream(&self) -> Disposable {
      let weak = Arc::downgrade(&self.inner);
      self.inner.source.subscribe_with(Box::new(move |tx, item| {
         let Some(inner) = weak.upgrade() else {
            return;
         };
         let callbacks: Vec<_> = {
            let mut state = inner.state.lock();
            if inner.buffer_size > 0 {
               if state.replay.len() == inner.buffer_size {
                  state.replay.pop_front();
               }
               state.replay.push_back(item.clone());
            }
            state
               .subscribers
               .iter()
               .map(|s| Arc::clone(&s.callback))
               .collect()
         };
         for callback in callbacks {
            let mut callback = callback.lock();
            (*callback)(tx, item);
         }
      }))
   }
}
