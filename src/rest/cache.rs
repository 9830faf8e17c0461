use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;

use crate::error::Result;

type SharedFetch = Shared<BoxFuture<'static, Result<Option<Value>>>>;

enum Slot {
    Pending { id: u64, fetch: SharedFetch },
    Ready(Value),
}

/// URL-keyed response cache with in-flight de-duplication.
///
/// At most one fetch per key is outstanding; every caller that arrives while
/// it runs awaits the same future. Successful responses are kept until they
/// are invalidated. Failures and empty responses free the slot so
/// the next caller fetches again.
#[derive(Default)]
pub struct FetchCache {
    slots: Mutex<HashMap<String, Slot>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for FetchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots();
        let pending = slots
            .values()
            .filter(|s| matches!(s, Slot::Pending { .. }))
            .count();
        f.debug_struct("FetchCache")
            .field("entries", &slots.len())
            .field("pending", &pending)
            .finish()
    }
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // the map stays consistent even if a holder panicked
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drop every entry, resolved or in flight, whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.slots().retain(|key, _| !key.starts_with(prefix));
    }

    /// Return the cached value for `key`, join the fetch already running for
    /// it, or start `fetch` and share it with later callers.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Option<Value>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
    {
        let (id, shared) = {
            let mut slots = self.slots();
            match slots.get(key) {
                Some(Slot::Ready(value)) => return Ok(Some(value.clone())),
                Some(Slot::Pending { id, fetch }) => (*id, fetch.clone()),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let shared = fetch().boxed().shared();
                    slots.insert(
                        key.to_string(),
                        Slot::Pending {
                            id,
                            fetch: shared.clone(),
                        },
                    );
                    (id, shared)
                }
            }
        };

        let result = shared.await;
        self.settle(key, id, &result);
        result
    }

    /// Replace the pending slot `id` with its outcome. A slot that was
    /// invalidated or already settled by another waiter is left alone.
    fn settle(&self, key: &str, id: u64, result: &Result<Option<Value>>) {
        let mut slots = self.slots();
        let owned = matches!(
            slots.get(key),
            Some(Slot::Pending { id: pending, .. }) if *pending == id
        );
        if !owned {
            return;
        }
        match result {
            Ok(Some(value)) => {
                slots.insert(key.to_string(), Slot::Ready(value.clone()));
            }
            Ok(None) | Err(_) => {
                slots.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GerritError;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    impl FetchCache {
        fn get(&self, key: &str) -> Option<Value> {
            match self.slots().get(key) {
                Some(Slot::Ready(value)) => Some(value.clone()),
                _ => None,
            }
        }

        fn has(&self, key: &str) -> bool {
            matches!(self.slots().get(key), Some(Slot::Ready(_)))
        }

        fn is_pending(&self, key: &str) -> bool {
            matches!(self.slots().get(key), Some(Slot::Pending { .. }))
        }

        async fn fill(&self, key: &str, value: Value) {
            let stored = self
                .get_or_fetch(key, move || async move { Ok(Some(value)) })
                .await;
            assert!(matches!(stored, Ok(Some(_))));
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let cache = FetchCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<()>();

        let first = {
            let calls = Arc::clone(&calls);
            cache.get_or_fetch("/projects/?n=26", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = rx.await;
                Ok(Some(json!({"All-Projects": {}})))
            })
        };
        let second = {
            let calls = Arc::clone(&calls);
            cache.get_or_fetch("/projects/?n=26", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(json!("other")))
            })
        };

        let release = async move {
            tokio::task::yield_now().await;
            let _ = tx.send(());
        };
        let (a, b, ()) = tokio::join!(first, second, release);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), Some(json!({"All-Projects": {}})));
        assert_eq!(b.unwrap(), Some(json!({"All-Projects": {}})));
        assert!(cache.has("/projects/?n=26"));
    }

    #[tokio::test]
    async fn resolved_value_is_served_without_fetching() {
        let cache = FetchCache::new();
        cache
            .fill("/accounts/self/detail", json!({"name": "Jane"}))
            .await;
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let value = cache
            .get_or_fetch("/accounts/self/detail", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(json!({"name": "Someone else"})))
            })
            .await
            .unwrap();
        assert_eq!(value, Some(json!({"name": "Jane"})));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_frees_the_slot_for_retry() {
        let cache = FetchCache::new();
        let err = cache
            .get_or_fetch("/groups/?n=26", || async {
                Err::<Option<Value>, _>(GerritError::Http {
                    status: 500,
                    url: "/groups/?n=26".to_string(),
                })
            })
            .await;
        assert_eq!(err.unwrap_err().status(), Some(500));
        assert!(!cache.is_pending("/groups/?n=26"));
        assert!(!cache.has("/groups/?n=26"));

        let ok = cache
            .get_or_fetch("/groups/?n=26", || async { Ok(Some(json!({}))) })
            .await
            .unwrap();
        assert_eq!(ok, Some(json!({})));
        assert!(cache.has("/groups/?n=26"));
    }

    #[tokio::test]
    async fn empty_result_is_not_cached() {
        let cache = FetchCache::new();
        let value = cache
            .get_or_fetch("/Documentation/?q=x", || async { Ok::<_, GerritError>(None) })
            .await
            .unwrap();
        assert_eq!(value, None);
        assert!(!cache.has("/Documentation/?q=x"));
        assert!(!cache.is_pending("/Documentation/?q=x"));
    }

    #[tokio::test]
    async fn invalidated_pending_fetch_does_not_repopulate() {
        let cache = FetchCache::new();
        let (tx, rx) = oneshot::channel::<()>();

        let fetch = cache.get_or_fetch("/projects/?S=0", move || async move {
            let _ = rx.await;
            Ok(Some(json!("stale")))
        });
        let invalidate = async {
            tokio::task::yield_now().await;
            assert!(cache.is_pending("/projects/?S=0"));
            cache.invalidate_prefix("/projects/?");
            let _ = tx.send(());
        };
        let (value, ()) = tokio::join!(fetch, invalidate);

        assert_eq!(value.unwrap(), Some(json!("stale")));
        assert!(!cache.has("/projects/?S=0"));
    }

    #[tokio::test]
    async fn invalidate_prefix_keeps_other_entries() {
        let cache = FetchCache::new();
        cache.fill("/projects/?S=0", json!(1)).await;
        cache.fill("/projects/?S=25", json!(2)).await;
        cache.fill("/groups/?S=0", json!(3)).await;

        cache.invalidate_prefix("/projects/?");

        assert_eq!(cache.get("/projects/?S=0"), None);
        assert_eq!(cache.get("/projects/?S=25"), None);
        assert_eq!(cache.get("/groups/?S=0"), Some(json!(3)));
    }
}
