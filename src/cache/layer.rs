//! Cache layer that orchestrates caching logic with network fetching.

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use super::storage::{Acquire, CacheStorage, FetchOutcome};
use super::tags::Tag;
use super::traits::{CacheKey, CacheResult};
use crate::api::ApiError;
use crate::query::QueryState;

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the typed query handles and the network client.
/// It deduplicates concurrent fetches of the same key, files results under
/// their provided tags and resets entries when their tags are invalidated.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Cached data - return it without calling `fetcher`
  /// 2. Fetch already in flight for this key - wait for its outcome
  /// 3. Otherwise call `fetcher` and store the outcome under its tags
  ///
  /// Errors are stored too, so subscribers see them, but the next call for the
  /// key fetches again.
  pub async fn fetch<F, Fut>(&self, key: &CacheKey, fetcher: F) -> Result<CacheResult<Value>, ApiError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = FetchOutcome>,
  {
    loop {
      match self.storage.acquire(key) {
        Acquire::Hit(value) => {
          debug!(%key, "cache hit");
          return Ok(CacheResult::from_cache(value));
        }
        Acquire::Wait(rx) => {
          debug!(%key, "waiting for in-flight fetch");
          match wait_settled(rx).await {
            Some(outcome) => return outcome.map(CacheResult::from_cache),
            // Reset before settling; claim it again
            None => continue,
          }
        }
        Acquire::Fetch(generation) => {
          debug!(%key, generation, "cache miss, fetching");
          let pending = PendingFetch {
            storage: self.storage.as_ref(),
            key,
            generation,
            settled: false,
          };

          return match fetcher().await {
            Ok((value, tags)) => {
              debug!(%key, tags = ?tags, "fetched");
              pending.settle(Ok((value.clone(), tags)));
              Ok(CacheResult::from_network(value))
            }
            Err(err) => {
              debug!(%key, error = %err, "fetch failed");
              pending.settle(Err(err.clone()));
              Err(err)
            }
          };
        }
      }
    }
  }

  /// Reset every entry that provided a tag hit by `tags`.
  pub fn invalidate(&self, tags: &[Tag]) -> Vec<CacheKey> {
    let invalidated = self.storage.invalidate(tags);
    if !invalidated.is_empty() {
      debug!(tags = ?tags, count = invalidated.len(), "invalidated cache entries");
    }
    invalidated
  }

  /// Watch the state of a key. The receiver is notified on every transition.
  pub fn subscribe(&self, key: &CacheKey) -> watch::Receiver<QueryState<Value>> {
    self.storage.subscribe(key)
  }

  /// Current state of a key, without fetching.
  pub fn state(&self, key: &CacheKey) -> QueryState<Value> {
    self.storage.state(key)
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

/// Wait until a loading entry settles.
///
/// Returns `None` if the entry went back to `Idle` (abandoned or invalidated)
/// or its channel closed, so the caller can try again.
async fn wait_settled(
  mut rx: watch::Receiver<QueryState<Value>>,
) -> Option<Result<Value, ApiError>> {
  loop {
    match &*rx.borrow_and_update() {
      QueryState::Ready(value) => return Some(Ok(value.clone())),
      QueryState::Error(err) => return Some(Err(err.clone())),
      QueryState::Idle => return None,
      QueryState::Loading => {}
    }
    if rx.changed().await.is_err() {
      return None;
    }
  }
}

/// Claim on a key between `acquire` and reporting the outcome.
///
/// Dropping it unsettled (the caller's future was cancelled) returns the entry
/// to `Idle` so waiters are not stuck on `Loading`.
struct PendingFetch<'a, S: CacheStorage> {
  storage: &'a S,
  key: &'a CacheKey,
  generation: u64,
  settled: bool,
}

impl<S: CacheStorage> PendingFetch<'_, S> {
  fn settle(mut self, outcome: FetchOutcome) {
    self.settled = true;
    if !self.storage.complete(self.key, self.generation, outcome) {
      debug!(key = %self.key, "discarded outcome of superseded fetch");
    }
  }
}

impl<S: CacheStorage> Drop for PendingFetch<'_, S> {
  fn drop(&mut self) {
    if !self.settled {
      self.storage.abandon(self.key, self.generation);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::{MemoryStorage, NoopStorage};
  use crate::cache::tags::ResourceKind;
  use crate::cache::traits::CacheSource;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  fn tasks_key(project: i64) -> CacheKey {
    CacheKey::new("getTasks", project.to_string())
  }

  #[tokio::test]
  async fn test_second_fetch_is_served_from_cache() {
    let cache = CacheLayer::new(MemoryStorage::new());
    let calls = AtomicU32::new(0);
    let calls = &calls;
    let key = tasks_key(1);

    for _ in 0..3 {
      let result = cache
        .fetch(&key, move || async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok((json!([1, 2]), vec![Tag::Blanket(ResourceKind::Tasks)]))
        })
        .await
        .unwrap();
      assert_eq!(result.data, json!([1, 2]));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_errors_are_not_cached_for_the_next_call() {
    let cache = CacheLayer::new(MemoryStorage::new());
    let key = tasks_key(1);

    let err = cache
      .fetch(&key, || async { Err(ApiError::Transport("refused".into())) })
      .await
      .unwrap_err();
    assert_eq!(err, ApiError::Transport("refused".into()));
    assert!(cache.state(&key).is_error());

    let result = cache
      .fetch(&key, || async { Ok((json!([]), Vec::new())) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
  }

  #[tokio::test]
  async fn test_concurrent_fetches_share_one_request() {
    let cache = CacheLayer::new(MemoryStorage::new());
    let calls = AtomicU32::new(0);
    let calls = &calls;
    let key = tasks_key(1);

    let fetcher = move || async move {
      calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(20)).await;
      Ok((json!("shared"), Vec::new()))
    };

    let (a, b) = tokio::join!(cache.fetch(&key, fetcher), cache.fetch(&key, fetcher));
    assert_eq!(a.unwrap().data, json!("shared"));
    assert_eq!(b.unwrap().data, json!("shared"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_invalidation_forces_refetch() {
    let cache = CacheLayer::new(MemoryStorage::new());
    let key = tasks_key(1);

    cache
      .fetch(&key, || async {
        Ok((json!([]), vec![Tag::Blanket(ResourceKind::Tasks)]))
      })
      .await
      .unwrap();

    let invalidated = cache.invalidate(&[Tag::Blanket(ResourceKind::Tasks)]);
    assert_eq!(invalidated, vec![key.clone()]);

    let result = cache
      .fetch(&key, || async { Ok((json!([5]), Vec::new())) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, json!([5]));
  }

  #[tokio::test]
  async fn test_cancelled_fetch_does_not_leave_entry_loading() {
    let cache = CacheLayer::new(MemoryStorage::new());
    let key = tasks_key(1);

    let slow = cache.fetch(&key, || async {
      tokio::time::sleep(Duration::from_secs(60)).await;
      Ok((json!(1), Vec::new()))
    });
    let timed_out = tokio::time::timeout(Duration::from_millis(10), slow).await;
    assert!(timed_out.is_err());

    assert!(matches!(cache.state(&key), QueryState::Idle));
  }

  #[tokio::test]
  async fn test_noop_storage_always_fetches() {
    let cache = CacheLayer::new(NoopStorage);
    let calls = AtomicU32::new(0);
    let calls = &calls;
    let key = CacheKey::new("search", "alpha");

    for _ in 0..2 {
      cache
        .fetch(&key, move || async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok((json!({}), Vec::new()))
        })
        .await
        .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
