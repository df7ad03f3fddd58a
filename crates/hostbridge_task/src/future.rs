//! Shared table of result slots and the futures that observe them.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::{Condvar, Mutex};

use crate::value::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    Pending,
    Complete,
    /// No slot: never allocated, or every handle was dropped.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FutureHandle(u64);

impl FutureHandle {
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FutureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "future#{}", self.0)
    }
}

type Observer = Box<dyn FnOnce(&Outcome) + Send>;

#[derive(Default)]
struct Slot {
    outcome: Option<Arc<Outcome>>,
    handles: usize,
    observers: Vec<Observer>,
    wakers: Vec<Waker>,
}

struct Inner {
    slots: Mutex<AHashMap<u64, Slot>>,
    completed: Condvar,
    next_id: AtomicU64,
    keep_last_results: bool,
    last_results: Mutex<AHashMap<usize, FutureHandle>>,
}

/// Reference-counted table of result slots shared by every bridged call of
/// a product.
#[derive(Clone)]
pub struct FutureTable {
    inner: Arc<Inner>,
}

impl Default for FutureTable {
    fn default() -> Self {
        Self::with_last_results(true)
    }
}

impl fmt::Debug for FutureTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureTable")
            .field("slots", &self.inner.slots.lock().len())
            .finish()
    }
}

impl FutureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `keep` controls whether [`Self::alloc_for`] records the future as
    /// the last result of its function index.
    pub fn with_last_results(keep: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(AHashMap::new()),
                completed: Condvar::new(),
                next_id: AtomicU64::new(1),
                keep_last_results: keep,
                last_results: Mutex::new(AHashMap::new()),
            }),
        }
    }

    pub fn alloc(&self) -> TaskFuture {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.slots.lock().insert(
            id,
            Slot {
                handles: 1,
                ..Slot::default()
            },
        );
        TaskFuture {
            table: self.clone(),
            handle: FutureHandle(id),
        }
    }

    /// Allocates a future and remembers it as the last result of `fn_idx`.
    pub fn alloc_for(&self, fn_idx: usize) -> TaskFuture {
        let future = self.alloc();
        if self.inner.keep_last_results {
            self.retain(future.handle);
            let previous = self.inner.last_results.lock().insert(fn_idx, future.handle);
            if let Some(previous) = previous {
                self.release(previous);
            }
        }
        future
    }

    pub fn last_result(&self, fn_idx: usize) -> Option<TaskFuture> {
        let handle = *self.inner.last_results.lock().get(&fn_idx)?;
        self.retain(handle).then(|| TaskFuture {
            table: self.clone(),
            handle,
        })
    }

    /// Completes a slot. Returns `false` if the slot was already complete or
    /// no longer exists.
    pub fn complete(&self, handle: FutureHandle, outcome: Outcome) -> bool {
        let outcome = Arc::new(outcome);
        let (observers, wakers) = {
            let mut slots = self.inner.slots.lock();
            let Some(slot) = slots.get_mut(&handle.0) else {
                tracing::debug!(future = %handle, "future released before completion");
                return false;
            };
            if slot.outcome.is_some() {
                tracing::warn!(future = %handle, "future already completed");
                return false;
            }
            slot.outcome = Some(Arc::clone(&outcome));
            (
                std::mem::take(&mut slot.observers),
                std::mem::take(&mut slot.wakers),
            )
        };
        self.inner.completed.notify_all();
        tracing::debug!(future = %handle, "future completed");
        for observer in observers {
            observer(&*outcome);
        }
        for waker in wakers {
            waker.wake();
        }
        true
    }

    pub fn status(&self, handle: FutureHandle) -> FutureStatus {
        match self.inner.slots.lock().get(&handle.0) {
            Some(slot) if slot.outcome.is_some() => FutureStatus::Complete,
            Some(_) => FutureStatus::Pending,
            None => FutureStatus::Invalid,
        }
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn retain(&self, handle: FutureHandle) -> bool {
        match self.inner.slots.lock().get_mut(&handle.0) {
            Some(slot) => {
                slot.handles += 1;
                true
            }
            None => false,
        }
    }

    fn release(&self, handle: FutureHandle) {
        let removed = {
            let mut slots = self.inner.slots.lock();
            let remaining = slots.get_mut(&handle.0).map(|slot| {
                slot.handles = slot.handles.saturating_sub(1);
                slot.handles
            });
            match remaining {
                Some(0) => slots.remove(&handle.0),
                _ => None,
            }
        };
        drop(removed);
    }
}

/// Caller-side handle to one slot of a [`FutureTable`].
pub struct TaskFuture {
    table: FutureTable,
    handle: FutureHandle,
}

impl TaskFuture {
    pub fn handle(&self) -> FutureHandle {
        self.handle
    }

    pub fn status(&self) -> FutureStatus {
        self.table.status(self.handle)
    }

    pub fn is_complete(&self) -> bool {
        self.status() == FutureStatus::Complete
    }

    pub fn outcome(&self) -> Option<Outcome> {
        let shared = self.shared_outcome();
        shared.map(|outcome| (*outcome).clone())
    }

    /// The outcome is cloned by the caller, after the table lock is released.
    fn shared_outcome(&self) -> Option<Arc<Outcome>> {
        self.table
            .inner
            .slots
            .lock()
            .get(&self.handle.0)
            .and_then(|slot| slot.outcome.clone())
    }

    /// Runs `observer` once the future completes, immediately if it
    /// already has.
    pub fn on_completion<F>(&self, observer: F)
    where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        let ready = {
            let mut slots = self.table.inner.slots.lock();
            match slots.get_mut(&self.handle.0) {
                Some(slot) => match &slot.outcome {
                    Some(outcome) => Some(Arc::clone(outcome)),
                    None => {
                        slot.observers.push(Box::new(observer));
                        return;
                    }
                },
                None => return,
            }
        };
        if let Some(outcome) = ready {
            observer(&*outcome);
        }
    }

    /// Blocks until the future completes.
    pub fn wait(&self) -> Outcome {
        let shared = {
            let mut slots = self.table.inner.slots.lock();
            loop {
                match slots.get(&self.handle.0) {
                    Some(slot) => {
                        if let Some(outcome) = &slot.outcome {
                            break Arc::clone(outcome);
                        }
                    }
                    None => return Outcome::Cancelled,
                }
                self.table.inner.completed.wait(&mut slots);
            }
        };
        (*shared).clone()
    }

    /// Blocks until the future completes or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let deadline = Instant::now() + timeout;
        let shared = {
            let mut slots = self.table.inner.slots.lock();
            loop {
                let slot = slots.get(&self.handle.0);
                if let Some(outcome) = slot.and_then(|s| s.outcome.as_ref()) {
                    break Some(Arc::clone(outcome));
                }
                if self
                    .table
                    .inner
                    .completed
                    .wait_until(&mut slots, deadline)
                    .timed_out()
                {
                    break slots
                        .get(&self.handle.0)
                        .and_then(|slot| slot.outcome.clone());
                }
            }
        };
        shared.map(|outcome| (*outcome).clone())
    }
}

impl Clone for TaskFuture {
    fn clone(&self) -> Self {
        self.table.retain(self.handle);
        Self {
            table: self.table.clone(),
            handle: self.handle,
        }
    }
}

impl Drop for TaskFuture {
    fn drop(&mut self) {
        self.table.release(self.handle);
    }
}

impl fmt::Debug for TaskFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("handle", &self.handle)
            .field("status", &self.status())
            .finish()
    }
}

impl Future for TaskFuture {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let shared = {
            let mut slots = self.table.inner.slots.lock();
            let Some(slot) = slots.get_mut(&self.handle.0) else {
                return Poll::Ready(Outcome::Cancelled);
            };
            match &slot.outcome {
                Some(outcome) => Arc::clone(outcome),
                None => {
                    if !slot.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                        slot.wakers.push(cx.waker().clone());
                    }
                    return Poll::Pending;
                }
            }
        };
        Poll::Ready((*shared).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TaskValue;
    use hostbridge_testing::MockHost;

    #[test]
    fn test_complete_exactly_once() {
        let table = FutureTable::new();
        let future = table.alloc();
        assert_eq!(future.status(), FutureStatus::Pending);

        assert!(table.complete(future.handle(), Outcome::Cancelled));
        assert!(!table.complete(
            future.handle(),
            Outcome::Completed(TaskValue::Text("late".into()))
        ));
        assert_eq!(future.outcome(), Some(Outcome::Cancelled));
    }

    #[test]
    fn test_slot_dropped_with_last_handle() {
        let table = FutureTable::new();
        let future = table.alloc();
        let handle = future.handle();
        let copy = future.clone();
        drop(future);
        assert_eq!(table.status(handle), FutureStatus::Pending);
        drop(copy);
        assert_eq!(table.status(handle), FutureStatus::Invalid);
        assert!(!table.complete(handle, Outcome::Cancelled));
        assert!(table.is_empty());
    }

    #[test]
    fn test_last_result_tracks_function_index() {
        let table = FutureTable::new();
        let first = table.alloc_for(3);
        let second = table.alloc_for(3);
        let first_handle = first.handle();
        drop(first);
        assert_eq!(table.status(first_handle), FutureStatus::Invalid);

        let last = table.last_result(3).unwrap();
        assert_eq!(last.handle(), second.handle());
        assert!(table.last_result(4).is_none());

        let untracked = FutureTable::with_last_results(false);
        let _kept = untracked.alloc_for(1);
        assert!(untracked.last_result(1).is_none());
    }

    #[test]
    fn test_observer_runs_on_completion_and_late_registration() {
        let table = FutureTable::new();
        let future = table.alloc();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        future.on_completion(move |outcome| sink.lock().push(outcome.is_cancelled()));
        table.complete(future.handle(), Outcome::Cancelled);

        let sink = Arc::clone(&seen);
        future.on_completion(move |outcome| sink.lock().push(outcome.is_cancelled()));
        assert_eq!(*seen.lock(), vec![true, true]);
    }

    #[test]
    fn test_object_outcome_is_shared_until_read() {
        let host = MockHost::new();
        let ctx = host.context();
        let table = FutureTable::new();
        let future = table.alloc();
        let object = ctx.local(host.new_task()).to_durable();
        assert_eq!(host.live_global_refs(), 1);

        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);
        let observer_host = Arc::clone(&host);
        future.on_completion(move |_| *sink.lock() = Some(observer_host.live_global_refs()));
        assert!(table.complete(
            future.handle(),
            Outcome::Completed(TaskValue::Object(object))
        ));
        assert_eq!(*observed.lock(), Some(1));
        assert_eq!(host.live_global_refs(), 1);

        let read = future.outcome();
        assert_eq!(host.live_global_refs(), 2);
        drop(read);
        assert_eq!(host.live_global_refs(), 1);

        drop(future);
        assert_eq!(host.live_global_refs(), 0);
        assert_eq!(host.invalid_deletes(), 0);
    }

    #[test]
    fn test_wait_across_threads() {
        let table = FutureTable::new();
        let future = table.alloc();
        let handle = future.handle();
        let completer = table.clone();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            completer.complete(handle, Outcome::Completed(TaskValue::ByteCount(7)))
        });
        assert_eq!(
            future.wait(),
            Outcome::Completed(TaskValue::ByteCount(7))
        );
        assert!(worker.join().unwrap());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let table = FutureTable::new();
        let future = table.alloc();
        assert!(future.wait_timeout(Duration::from_millis(5)).is_none());
    }

    #[tokio::test]
    async fn test_await_completion() {
        let table = FutureTable::new();
        let future = table.alloc();
        let handle = future.handle();
        let completer = table.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            completer.complete(handle, Outcome::Completed(TaskValue::Void));
        });
        assert_eq!(future.await, Outcome::Completed(TaskValue::Void));
    }
}
