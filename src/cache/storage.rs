//! Cache storage trait and in-memory implementation.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use super::tags::Tag;
use super::traits::CacheKey;
use crate::api::ApiError;
use crate::query::QueryState;

/// What a caller should do after looking up a key.
#[derive(Debug)]
pub enum Acquire {
  /// The entry holds data; no network call needed
  Hit(Value),
  /// Another caller is fetching this key; wait on the receiver
  Wait(watch::Receiver<QueryState<Value>>),
  /// The entry is now `Loading` under this generation; the caller must fetch
  /// and report back with [`CacheStorage::complete`] or [`CacheStorage::abandon`]
  Fetch(u64),
}

/// Outcome of a fetch as reported to storage: the payload with its provided tags.
pub type FetchOutcome = Result<(Value, Vec<Tag>), ApiError>;

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Look up a key, claiming it for fetching when it holds no data.
  ///
  /// An entry in `Error` is claimed again: retry happens on re-invocation.
  fn acquire(&self, key: &CacheKey) -> Acquire;

  /// Record a fetch outcome. Ignored (returns false) when the entry has moved
  /// on to a newer generation since the fetch started, or when a tag it
  /// provides was invalidated while it was in flight. In the latter case the
  /// entry goes back to `Idle`.
  fn complete(&self, key: &CacheKey, generation: u64, outcome: FetchOutcome) -> bool;

  /// Give up on a fetch that will never complete, returning the entry to `Idle`.
  fn abandon(&self, key: &CacheKey, generation: u64);

  /// Reset every entry that provided a tag hit by any of `tags`.
  /// Returns the keys that were invalidated. Loading entries are not reset
  /// but remember `tags` for [`CacheStorage::complete`].
  fn invalidate(&self, tags: &[Tag]) -> Vec<CacheKey>;

  /// Watch the state of a key.
  fn subscribe(&self, key: &CacheKey) -> watch::Receiver<QueryState<Value>>;

  /// Current state of a key.
  fn state(&self, key: &CacheKey) -> QueryState<Value>;
}

/// Storage implementation that doesn't cache anything.
/// Every lookup misses and every outcome is discarded.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn acquire(&self, _key: &CacheKey) -> Acquire {
    Acquire::Fetch(0)
  }

  fn complete(&self, _key: &CacheKey, _generation: u64, _outcome: FetchOutcome) -> bool {
    false // Discard
  }

  fn abandon(&self, _key: &CacheKey, _generation: u64) {}

  fn invalidate(&self, _tags: &[Tag]) -> Vec<CacheKey> {
    Vec::new()
  }

  fn subscribe(&self, _key: &CacheKey) -> watch::Receiver<QueryState<Value>> {
    // Sender is dropped right away; the receiver only ever sees Idle
    watch::channel(QueryState::Idle).1
  }

  fn state(&self, _key: &CacheKey) -> QueryState<Value> {
    QueryState::Idle
  }
}

struct Entry {
  sender: watch::Sender<QueryState<Value>>,
  tags: Vec<Tag>,
  generation: u64,
  /// Tags invalidated while the entry was loading
  missed: Vec<Tag>,
}

impl Entry {
  fn new() -> Self {
    let (sender, _) = watch::channel(QueryState::Idle);
    Self {
      sender,
      tags: Vec::new(),
      generation: 0,
      missed: Vec::new(),
    }
  }

  /// Replace the state; subscribers are notified before this returns.
  fn set(&self, state: QueryState<Value>) {
    self.sender.send_replace(state);
  }

  /// Whether any invalidation seen during the fetch hits the outcome's tags.
  fn missed_any(&self, provided: &[Tag]) -> bool {
    provided
      .iter()
      .any(|provided| self.missed.iter().any(|tag| tag.invalidates(provided)))
  }
}

/// Process-wide in-memory cache.
///
/// Entries are never dropped, only reset to `Idle`, so subscribers keep
/// observing the same channel across invalidations.
pub struct MemoryStorage {
  entries: Mutex<HashMap<CacheKey, Entry>>,
  generations: AtomicU64,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      generations: AtomicU64::new(1),
    }
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn next_generation(&self) -> u64 {
    self.generations.fetch_add(1, Ordering::Relaxed)
  }
}

impl Default for MemoryStorage {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheStorage for MemoryStorage {
  fn acquire(&self, key: &CacheKey) -> Acquire {
    let mut entries = self.lock();
    let entry = entries.entry(key.clone()).or_insert_with(Entry::new);

    let loading = match &*entry.sender.borrow() {
      QueryState::Ready(value) => return Acquire::Hit(value.clone()),
      QueryState::Loading => true,
      QueryState::Idle | QueryState::Error(_) => false,
    };
    if loading {
      return Acquire::Wait(entry.sender.subscribe());
    }

    let generation = self.next_generation();
    entry.generation = generation;
    entry.tags.clear();
    entry.missed.clear();
    entry.set(QueryState::Loading);
    Acquire::Fetch(generation)
  }

  fn complete(&self, key: &CacheKey, generation: u64, outcome: FetchOutcome) -> bool {
    let mut entries = self.lock();
    let Some(entry) = entries.get_mut(key) else {
      return false;
    };
    if entry.generation != generation {
      return false;
    }

    let stale = matches!(&outcome, Ok((_, tags)) if entry.missed_any(tags));
    entry.missed.clear();
    if stale {
      // Read before a mutation that landed mid-flight; refetch on next call
      entry.generation = self.next_generation();
      entry.set(QueryState::Idle);
      return false;
    }

    match outcome {
      Ok((value, tags)) => {
        entry.tags = tags;
        entry.set(QueryState::Ready(value));
      }
      Err(err) => {
        entry.tags.clear();
        entry.set(QueryState::Error(err));
      }
    }
    true
  }

  fn abandon(&self, key: &CacheKey, generation: u64) {
    let mut entries = self.lock();
    if let Some(entry) = entries.get_mut(key) {
      if entry.generation == generation && entry.sender.borrow().is_loading() {
        entry.set(QueryState::Idle);
      }
    }
  }

  fn invalidate(&self, tags: &[Tag]) -> Vec<CacheKey> {
    let mut entries = self.lock();
    let mut invalidated = Vec::new();

    for (key, entry) in entries.iter_mut() {
      if entry.sender.borrow().is_loading() {
        // Checked against the outcome's tags once the fetch completes
        entry.missed.extend_from_slice(tags);
        continue;
      }

      let hit = entry
        .tags
        .iter()
        .any(|provided| tags.iter().any(|tag| tag.invalidates(provided)));
      if !hit {
        continue;
      }

      entry.tags.clear();
      entry.generation = self.next_generation();
      entry.set(QueryState::Idle);
      invalidated.push(key.clone());
    }

    invalidated
  }

  fn subscribe(&self, key: &CacheKey) -> watch::Receiver<QueryState<Value>> {
    let mut entries = self.lock();
    entries
      .entry(key.clone())
      .or_insert_with(Entry::new)
      .sender
      .subscribe()
  }

  fn state(&self, key: &CacheKey) -> QueryState<Value> {
    let entries = self.lock();
    entries
      .get(key)
      .map(|entry| entry.sender.borrow().clone())
      .unwrap_or(QueryState::Idle)
  }
}
