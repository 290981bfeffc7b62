//! Typed query and mutation handles on top of the tagged cache.
//!
//! Inspired by TanStack Query and RTK Query, a [`QueryClient`] owns the cache and
//! hands out handles; the handles are the only way to read or change it.
//!
//! # Example
//!
//! ```ignore
//! let client = QueryClient::new();
//! let projects = client.define_query(
//!     "getProjects",
//!     |_: &()| String::new(),
//!     |_: &Vec<Project>| vec![Tag::Blanket(ResourceKind::Projects)],
//!     move |()| { let http = http.clone(); async move { http.get("projects").await } },
//! );
//!
//! // First call fetches, later calls are served from the cache
//! let list = projects.fetch(()).await?.data;
//!
//! // Re-render whenever the entry changes
//! let mut sub = projects.subscribe(&());
//! while let Some(state) = sub.changed().await {
//!     match state {
//!         QueryState::Loading => render_spinner(),
//!         QueryState::Ready(data) => render_data(data),
//!         QueryState::Error(e) => render_error(e),
//!         QueryState::Idle => {} // invalidated, refetch on next render
//!     }
//! }
//! ```

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::ApiError;
use crate::cache::{CacheKey, CacheLayer, CacheResult, CacheStorage, MemoryStorage, NoopStorage, Tag};

/// The state of a query or mutation
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Not started, or invalidated since the last fetch
  Idle,
  /// Currently fetching data
  Loading,
  /// Completed successfully
  Ready(T),
  /// Failed; kept until the caller invokes it again
  Error(ApiError),
}

impl<T> QueryState<T> {
  pub fn is_idle(&self) -> bool {
    matches!(self, QueryState::Idle)
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_ready(&self) -> bool {
    matches!(self, QueryState::Ready(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Ready(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ApiError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

impl QueryState<Value> {
  /// Decode a cached JSON state into a typed one.
  fn decode<T: DeserializeOwned>(&self) -> QueryState<T> {
    match self {
      QueryState::Idle => QueryState::Idle,
      QueryState::Loading => QueryState::Loading,
      QueryState::Ready(value) => match serde_json::from_value(value.clone()) {
        Ok(data) => QueryState::Ready(data),
        Err(e) => QueryState::Error(e.into()),
      },
      QueryState::Error(e) => QueryState::Error(e.clone()),
    }
  }
}

/// A boxed future that returns a Result<T, ApiError>
type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send>>;

/// A factory function that creates futures performing the network call
type FetcherFn<A, T> = Arc<dyn Fn(A) -> BoxFuture<T> + Send + Sync>;

type KeyFn<A> = Arc<dyn Fn(&A) -> String + Send + Sync>;
type ProvidesFn<T> = Arc<dyn Fn(&T) -> Vec<Tag> + Send + Sync>;
type InvalidatesFn<A, T> = Arc<dyn Fn(&A, &T) -> Vec<Tag> + Send + Sync>;

/// Owner of the process-wide cache; defines queries and mutations against it.
#[derive(Clone)]
pub struct QueryClient {
  cache: CacheLayer<MemoryStorage>,
}

impl QueryClient {
  pub fn new() -> Self {
    Self {
      cache: CacheLayer::new(MemoryStorage::new()),
    }
  }

  /// Register a read operation.
  ///
  /// `key_fn` derives the per-call cache key from the argument, `provides`
  /// computes the tags a successful result is filed under, and `fetch`
  /// performs the network call.
  pub fn define_query<A, T, K, P, F, Fut>(
    &self,
    endpoint: &'static str,
    key_fn: K,
    provides: P,
    fetch: F,
  ) -> QueryHandle<A, T>
  where
    A: 'static,
    T: 'static,
    K: Fn(&A) -> String + Send + Sync + 'static,
    P: Fn(&T) -> Vec<Tag> + Send + Sync + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    QueryHandle {
      endpoint,
      cache: self.cache.clone(),
      key_fn: Arc::new(key_fn),
      provides: Arc::new(provides),
      fetcher: Arc::new(move |arg: A| -> BoxFuture<T> { Box::pin(fetch(arg)) }),
    }
  }

  /// Register a read operation whose results are never cached.
  pub fn define_uncached_query<A, T, K, F, Fut>(
    &self,
    endpoint: &'static str,
    key_fn: K,
    fetch: F,
  ) -> QueryHandle<A, T, NoopStorage>
  where
    A: 'static,
    T: 'static,
    K: Fn(&A) -> String + Send + Sync + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    QueryHandle {
      endpoint,
      cache: CacheLayer::new(NoopStorage),
      key_fn: Arc::new(key_fn),
      provides: Arc::new(|_: &T| Vec::new()),
      fetcher: Arc::new(move |arg: A| -> BoxFuture<T> { Box::pin(fetch(arg)) }),
    }
  }

  /// Register a write operation.
  ///
  /// On success every entry hit by the tags `invalidates` returns is reset,
  /// so subscribed queries refetch. On failure the cache is untouched.
  pub fn define_mutation<A, T, I, F, Fut>(
    &self,
    name: &'static str,
    invalidates: I,
    fetch: F,
  ) -> MutationHandle<A, T>
  where
    A: 'static,
    T: 'static,
    I: Fn(&A, &T) -> Vec<Tag> + Send + Sync + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let (state, _) = watch::channel(QueryState::Idle);
    MutationHandle {
      name,
      cache: self.cache.clone(),
      invalidates: Arc::new(invalidates),
      fetcher: Arc::new(move |arg: A| -> BoxFuture<T> { Box::pin(fetch(arg)) }),
      state: Arc::new(state),
    }
  }
}

impl Default for QueryClient {
  fn default() -> Self {
    Self::new()
  }
}

/// Handle to a registered read operation.
pub struct QueryHandle<A, T, S: CacheStorage = MemoryStorage> {
  endpoint: &'static str,
  cache: CacheLayer<S>,
  key_fn: KeyFn<A>,
  provides: ProvidesFn<T>,
  fetcher: FetcherFn<A, T>,
}

impl<A, T, S> QueryHandle<A, T, S>
where
  T: Serialize + DeserializeOwned,
  S: CacheStorage,
{
  /// Cache key for an argument.
  pub fn key(&self, arg: &A) -> CacheKey {
    CacheKey::new(self.endpoint, (self.key_fn)(arg))
  }

  /// Run the query: served from the cache when the key holds data,
  /// otherwise fetched (or joined, if another caller is already fetching it).
  pub async fn fetch(&self, arg: A) -> Result<CacheResult<T>, ApiError> {
    let key = self.key(&arg);
    let fetcher = Arc::clone(&self.fetcher);
    let provides = Arc::clone(&self.provides);

    let result = self
      .cache
      .fetch(&key, move || async move {
        let data = fetcher(arg).await?;
        let tags = provides(&data);
        let value = serde_json::to_value(&data)?;
        Ok::<_, ApiError>((value, tags))
      })
      .await?;

    let data = serde_json::from_value(result.data)?;
    Ok(CacheResult {
      data,
      source: result.source,
    })
  }

  /// Current state for an argument, without fetching.
  pub fn state(&self, arg: &A) -> QueryState<T> {
    self.cache.state(&self.key(arg)).decode()
  }

  /// Observe the entry for an argument.
  pub fn subscribe(&self, arg: &A) -> Subscription<T> {
    Subscription {
      rx: self.cache.subscribe(&self.key(arg)),
      _marker: PhantomData,
    }
  }
}

impl<A, T, S: CacheStorage> Clone for QueryHandle<A, T, S> {
  fn clone(&self) -> Self {
    Self {
      endpoint: self.endpoint,
      cache: self.cache.clone(),
      key_fn: Arc::clone(&self.key_fn),
      provides: Arc::clone(&self.provides),
      fetcher: Arc::clone(&self.fetcher),
    }
  }
}

/// Observer of one cache entry. All subscribers of a key see the same state.
pub struct Subscription<T> {
  rx: watch::Receiver<QueryState<Value>>,
  _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Subscription<T> {
  /// Current state.
  pub fn state(&self) -> QueryState<T> {
    self.rx.borrow().decode()
  }

  /// Wait for the next transition. Returns `None` once the cache is gone.
  pub async fn changed(&mut self) -> Option<QueryState<T>> {
    self.rx.changed().await.ok()?;
    let state = self.rx.borrow_and_update().decode();
    Some(state)
  }
}

/// Handle to a registered write operation.
///
/// Clones share the same mutation state.
pub struct MutationHandle<A, T> {
  name: &'static str,
  cache: CacheLayer<MemoryStorage>,
  invalidates: InvalidatesFn<A, T>,
  fetcher: FetcherFn<A, T>,
  state: Arc<watch::Sender<QueryState<T>>>,
}

impl<A: Clone, T: Clone> MutationHandle<A, T> {
  /// Perform the mutation and, on success, invalidate its tags.
  pub async fn run(&self, arg: A) -> Result<T, ApiError> {
    self.state.send_replace(QueryState::Loading);

    match (self.fetcher)(arg.clone()).await {
      Ok(data) => {
        let tags = (self.invalidates)(&arg, &data);
        let invalidated = self.cache.invalidate(&tags);
        info!(
          mutation = self.name,
          invalidated = invalidated.len(),
          "mutation succeeded"
        );
        self.state.send_replace(QueryState::Ready(data.clone()));
        Ok(data)
      }
      Err(err) => {
        warn!(mutation = self.name, error = %err, "mutation failed");
        self.state.send_replace(QueryState::Error(err.clone()));
        Err(err)
      }
    }
  }

  /// State of the most recent run.
  pub fn state(&self) -> QueryState<T> {
    self.state.borrow().clone()
  }

  /// Observe the mutation state.
  #[allow(dead_code)]
  pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
    self.state.subscribe()
  }
}

impl<A, T> Clone for MutationHandle<A, T> {
  fn clone(&self) -> Self {
    Self {
      name: self.name,
      cache: self.cache.clone(),
      invalidates: Arc::clone(&self.invalidates),
      fetcher: Arc::clone(&self.fetcher),
      state: Arc::clone(&self.state),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, ResourceKind};
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;

  /// A fake backend: a list of (id, name) rows and a request counter.
  #[derive(Clone, Default)]
  struct FakeBackend {
    rows: Arc<Mutex<Vec<(i64, String)>>>,
    requests: Arc<AtomicU32>,
    fail: Arc<Mutex<bool>>,
  }

  impl FakeBackend {
    fn requests(&self) -> u32 {
      self.requests.load(Ordering::SeqCst)
    }

    async fn list(&self, owner: i64) -> Result<Vec<(i64, String)>, ApiError> {
      self.requests.fetch_add(1, Ordering::SeqCst);
      if *self.fail.lock().unwrap() {
        return Err(ApiError::Transport("connection refused".into()));
      }
      Ok(
        self
          .rows
          .lock()
          .unwrap()
          .iter()
          .filter(|(id, _)| id % 10 == owner)
          .cloned()
          .collect(),
      )
    }

    async fn rename(&self, id: i64, name: String) -> Result<(i64, String), ApiError> {
      self.requests.fetch_add(1, Ordering::SeqCst);
      if *self.fail.lock().unwrap() {
        return Err(ApiError::Status {
          status: 500,
          message: "Error updating task : boom".into(),
        });
      }
      let mut rows = self.rows.lock().unwrap();
      let row = rows
        .iter_mut()
        .find(|(row_id, _)| *row_id == id)
        .ok_or_else(|| ApiError::Status {
          status: 500,
          message: "not found".into(),
        })?;
      row.1 = name;
      Ok(row.clone())
    }
  }

  fn list_query(client: &QueryClient, backend: &FakeBackend) -> QueryHandle<i64, Vec<(i64, String)>> {
    let backend = backend.clone();
    client.define_query(
      "list",
      |owner: &i64| owner.to_string(),
      |rows: &Vec<(i64, String)>| {
        Tag::per_id_or_blanket(ResourceKind::Tasks, rows.iter().map(|(id, _)| *id))
      },
      move |owner| {
        let backend = backend.clone();
        async move { backend.list(owner).await }
      },
    )
  }

  fn rename_mutation(client: &QueryClient, backend: &FakeBackend) -> MutationHandle<(i64, String), (i64, String)> {
    let backend = backend.clone();
    client.define_mutation(
      "rename",
      |(id, _): &(i64, String), _: &(i64, String)| vec![Tag::Scoped(ResourceKind::Tasks, *id)],
      move |(id, name)| {
        let backend = backend.clone();
        async move { backend.rename(id, name).await }
      },
    )
  }

  fn seeded() -> FakeBackend {
    let backend = FakeBackend::default();
    *backend.rows.lock().unwrap() = vec![(1, "a".into()), (11, "b".into()), (2, "c".into())];
    backend
  }

  #[tokio::test]
  async fn test_query_caches_per_key() {
    let backend = seeded();
    let client = QueryClient::new();
    let query = list_query(&client, &backend);

    let first = query.fetch(1).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data.len(), 2);

    let second = query.fetch(1).await.unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.data, first.data);
    assert_eq!(backend.requests(), 1);

    query.fetch(2).await.unwrap();
    assert_eq!(backend.requests(), 2);
  }

  #[tokio::test]
  async fn test_scoped_mutation_only_refetches_dependent_keys() {
    let backend = seeded();
    let client = QueryClient::new();
    let query = list_query(&client, &backend);
    let rename = rename_mutation(&client, &backend);

    query.fetch(1).await.unwrap();
    query.fetch(2).await.unwrap();
    assert_eq!(backend.requests(), 2);

    let renamed = rename.run((11, "renamed".into())).await.unwrap();
    assert_eq!(renamed, (11, "renamed".to_string()));
    assert!(rename.state().is_ready());

    // Key 1 provided Tasks:11 and is reset; key 2 only provided Tasks:2
    assert!(query.state(&1).is_idle());
    assert!(query.state(&2).is_ready());

    let refreshed = query.fetch(1).await.unwrap();
    assert_eq!(refreshed.source, CacheSource::Network);
    assert!(refreshed.data.contains(&(11, "renamed".to_string())));
    assert_eq!(query.fetch(2).await.unwrap().source, CacheSource::Cache);
  }

  #[tokio::test]
  async fn test_failed_mutation_leaves_cache_untouched() {
    let backend = seeded();
    let client = QueryClient::new();
    let query = list_query(&client, &backend);
    let rename = rename_mutation(&client, &backend);

    query.fetch(1).await.unwrap();
    *backend.fail.lock().unwrap() = true;

    let err = rename.run((1, "x".into())).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 500, .. }));
    assert!(rename.state().is_error());
    assert!(query.state(&1).is_ready());
  }

  #[tokio::test]
  async fn test_error_state_is_kept_until_reinvoked() {
    let backend = seeded();
    *backend.fail.lock().unwrap() = true;
    let client = QueryClient::new();
    let query = list_query(&client, &backend);

    assert!(query.fetch(1).await.is_err());
    assert_eq!(
      query.state(&1).error(),
      Some(&ApiError::Transport("connection refused".into()))
    );

    // Nothing retries on its own
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(backend.requests(), 1);

    *backend.fail.lock().unwrap() = false;
    assert!(query.fetch(1).await.is_ok());
    assert_eq!(backend.requests(), 2);
  }

  #[tokio::test]
  async fn test_subscribers_observe_transitions() {
    let backend = seeded();
    let client = QueryClient::new();
    let query = list_query(&client, &backend);
    let rename = rename_mutation(&client, &backend);

    let mut first = query.subscribe(&1);
    let mut second = query.subscribe(&1);
    assert!(first.state().is_idle());

    let fetching = tokio::spawn({
      let query = query.clone();
      async move { query.fetch(1).await }
    });

    assert!(first.changed().await.unwrap().is_loading() || first.state().is_ready());
    fetching.await.unwrap().unwrap();

    let seen = second.state();
    assert_eq!(seen.data().map(Vec::len), Some(2));
    assert!(first.state().is_ready());

    rename.run((1, "z".into())).await.unwrap();
    assert!(first.state().is_idle());
    assert!(second.changed().await.unwrap().is_idle());
  }

  #[tokio::test]
  async fn test_mutation_during_fetch_is_not_lost() {
    let backend = seeded();
    let client = QueryClient::new();
    let rename = rename_mutation(&client, &backend);

    // Reads the rows, then holds the response until released
    let release = Arc::new(tokio::sync::Notify::new());
    let query = client.define_query(
      "gated",
      |owner: &i64| owner.to_string(),
      |rows: &Vec<(i64, String)>| {
        Tag::per_id_or_blanket(ResourceKind::Tasks, rows.iter().map(|(id, _)| *id))
      },
      {
        let backend = backend.clone();
        let release = Arc::clone(&release);
        move |owner| {
          let backend = backend.clone();
          let release = Arc::clone(&release);
          async move {
            let rows = backend.list(owner).await?;
            release.notified().await;
            Ok(rows)
          }
        }
      },
    );

    let in_flight = tokio::spawn({
      let query = query.clone();
      async move { query.fetch(1).await }
    });
    while backend.requests() == 0 {
      tokio::task::yield_now().await;
    }

    let mut updates = rename.subscribe();
    rename.run((1, "renamed".into())).await.unwrap();
    assert!(updates.has_changed().unwrap());
    assert!(updates.borrow_and_update().is_ready());

    release.notify_one();
    let stale = in_flight.await.unwrap().unwrap();
    assert!(stale.data.contains(&(1, "a".to_string())));
    assert!(query.state(&1).is_idle());

    release.notify_one();
    let fresh = query.fetch(1).await.unwrap();
    assert_eq!(fresh.source, CacheSource::Network);
    assert!(fresh.data.contains(&(1, "renamed".to_string())));
  }

  #[tokio::test]
  async fn test_uncached_query_always_fetches() {
    let calls = Arc::new(AtomicU32::new(0));
    let client = QueryClient::new();
    let counter = Arc::clone(&calls);
    let search = client.define_uncached_query(
      "search",
      |q: &String| q.clone(),
      move |q: String| {
        let counter = Arc::clone(&counter);
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Ok::<_, ApiError>(q.len())
        }
      },
    );

    assert_eq!(search.fetch("abc".into()).await.unwrap().data, 3);
    assert_eq!(search.fetch("abc".into()).await.unwrap().data, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(search.state(&"abc".to_string()).is_idle());
  }
}
