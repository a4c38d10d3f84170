//! Sequence id allocation and one-shot completion callbacks.
//!
//! Every originated request takes a fresh id and registers its callback in one
//! locked step. The only way to run a callback is to take it out of the table
//! first, so each one fires at most once and never under the lock.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::error::{MercuryError, Result};
use crate::protocol::{MercuryResponse, SequenceId};

/// One-shot completion callback for a request.
pub type ResponseCallback = Box<dyn FnOnce(Result<MercuryResponse>) + Send + 'static>;

/// An outstanding request.
struct PendingRequest {
    callback: ResponseCallback,
    /// Deadline timer, aborted when the entry is removed.
    timer: Option<AbortHandle>,
}

struct Inner {
    /// Next id to hand out; `None` once the id space is spent.
    next_id: Option<SequenceId>,
    pending: HashMap<SequenceId, PendingRequest>,
    /// Set once the connection is gone; no further registrations.
    closed: bool,
}

/// Table of outstanding requests keyed by sequence id.
pub struct CallbackRegistry {
    inner: Mutex<Inner>,
}

impl CallbackRegistry {
    /// Create a registry whose first id is 0.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a registry whose first id is `first`.
    pub fn starting_at(first: SequenceId) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: Some(first),
                pending: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Allocate the next sequence id and register `callback` under it.
    ///
    /// Ids are never reused. Once `u64::MAX` has been handed out every further
    /// call fails with [`MercuryError::SequenceExhausted`].
    pub fn allocate_and_register(&self, callback: ResponseCallback) -> Result<SequenceId> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(MercuryError::ConnectionClosed);
        }
        let id = inner.next_id.ok_or(MercuryError::SequenceExhausted)?;
        inner.next_id = id.checked_add(1);
        inner.pending.insert(
            id,
            PendingRequest {
                callback,
                timer: None,
            },
        );
        Ok(id)
    }

    /// Attach a deadline timer to a pending entry.
    ///
    /// If the entry is already gone the timer is aborted immediately.
    pub fn attach_timer(&self, id: SequenceId, timer: AbortHandle) {
        let mut inner = self.inner.lock();
        match inner.pending.get_mut(&id) {
            Some(entry) => entry.timer = Some(timer),
            None => timer.abort(),
        }
    }

    /// Remove and return the callback for `id`.
    ///
    /// Returns `None` for unknown or already completed ids.
    pub fn take_callback(&self, id: SequenceId) -> Option<ResponseCallback> {
        let entry = self.inner.lock().pending.remove(&id)?;
        if let Some(timer) = entry.timer {
            timer.abort();
        }
        Some(entry.callback)
    }

    /// Remove the entry for `id` without invoking it.
    ///
    /// Returns whether an entry was removed.
    pub fn cancel(&self, id: SequenceId) -> bool {
        self.take_callback(id).is_some()
    }

    /// Refuse further registrations and hand back every outstanding callback.
    pub fn close(&self) -> Vec<(SequenceId, ResponseCallback)> {
        let drained: Vec<_> = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.pending.drain().collect()
        };
        let mut callbacks: Vec<_> = drained
            .into_iter()
            .map(|(id, entry)| {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
                (id, entry.callback)
            })
            .collect();
        callbacks.sort_by_key(|(id, _)| *id);
        callbacks
    }

    /// Whether `id` is outstanding.
    pub fn contains(&self, id: SequenceId) -> bool {
        self.inner.lock().pending.contains_key(&id)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Whether no requests are outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn noop() -> ResponseCallback {
        Box::new(|_| {})
    }

    fn counting(counter: &Arc<AtomicUsize>) -> ResponseCallback {
        let counter = counter.clone();
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_ids_sequential_from_zero() {
        let registry = CallbackRegistry::new();
        let ids: Vec<_> = (0..5)
            .map(|_| registry.allocate_and_register(noop()).unwrap())
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_take_removes_entry() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = registry.allocate_and_register(counting(&counter)).unwrap();

        let callback = registry.take_callback(id).unwrap();
        assert!(!registry.contains(id));
        callback(Err(MercuryError::ConnectionClosed));

        assert!(registry.take_callback(id).is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_id_is_none() {
        let registry = CallbackRegistry::new();
        assert!(registry.take_callback(42).is_none());
        assert!(!registry.cancel(42));
    }

    #[test]
    fn test_cancel_does_not_invoke() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = registry.allocate_and_register(counting(&counter)).unwrap();

        assert!(registry.cancel(id));
        assert!(registry.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ids_not_reused_after_completion() {
        let registry = CallbackRegistry::new();
        let first = registry.allocate_and_register(noop()).unwrap();
        registry.cancel(first);
        let second = registry.allocate_and_register(noop()).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let registry = CallbackRegistry::starting_at(u64::MAX - 1);
        assert_eq!(registry.allocate_and_register(noop()).unwrap(), u64::MAX - 1);
        assert_eq!(registry.allocate_and_register(noop()).unwrap(), u64::MAX);
        assert!(matches!(
            registry.allocate_and_register(noop()),
            Err(MercuryError::SequenceExhausted)
        ));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_close_drains_and_rejects() {
        let registry = CallbackRegistry::new();
        for _ in 0..3 {
            registry.allocate_and_register(noop()).unwrap();
        }

        let drained = registry.close();
        let ids: Vec<_> = drained.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.allocate_and_register(noop()),
            Err(MercuryError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_concurrent_allocation_distinct() {
        let registry = Arc::new(CallbackRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let mut ids = Vec::new();
                    for _ in 0..250 {
                        ids.push(registry.allocate_and_register(Box::new(|_| {})).unwrap());
                    }
                    ids
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            all.extend(ids);
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 2000);
        assert_eq!(registry.len(), 2000);
    }

    #[tokio::test]
    async fn test_take_aborts_timer() {
        let registry = CallbackRegistry::new();
        let id = registry.allocate_and_register(noop()).unwrap();
        let timer = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        registry.attach_timer(id, timer.abort_handle());

        registry.take_callback(id).unwrap();
        assert!(timer.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_attach_timer_to_missing_entry_aborts() {
        let registry = CallbackRegistry::new();
        let timer = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        registry.attach_timer(7, timer.abort_handle());
        assert!(timer.await.unwrap_err().is_cancelled());
    }
}
