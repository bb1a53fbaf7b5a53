//! Generic multi-subscriber async notification.
//!
//! [`EventBus`] is the primitive behind the request, response and error log
//! hooks: a guarded subscriber list with three fan-out modes. Mutation takes
//! the lock; every fan-out snapshots the list under that lock first, so a
//! concurrent subscribe or unsubscribe never affects a notification already
//! in flight.
//!
//! Subscribers are isolated from each other. One returning an error is
//! logged and skipped, it neither aborts the fan-out nor reaches the caller.

use crate::BoxFuture;
use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::{task::JoinSet, time::timeout_at};

/// Errors a subscriber may surface. They are logged, never propagated.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// An async callback subscribed to an [`EventBus`].
///
/// Implemented for any `Fn(Arc<T>) -> impl Future<Output = Result<R,
/// CallbackError>>` closure, so plain async closures subscribe directly.
pub trait EventCallback<T, R = ()>: Send + Sync + 'static {
    fn call(&self, event: Arc<T>) -> BoxFuture<Result<R, CallbackError>>;
}

impl<T, R, F, Fut> EventCallback<T, R> for F
where
    T: 'static,
    R: 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, CallbackError>> + Send + 'static,
{
    fn call(&self, event: Arc<T>) -> BoxFuture<Result<R, CallbackError>> {
        Box::pin(self(event))
    }
}

/// Token returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// The id does not name a live subscription. Raised on ids that were
    /// never issued by this bus or were already unsubscribed.
    #[error("unknown subscription id {0:?}")]
    UnknownSubscription(SubscriptionId),
}

struct BusState<T, R> {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Arc<dyn EventCallback<T, R>>)>,
}

/// Thread-safe multi-subscriber notification bus.
///
/// `T` is the event payload, shared with subscribers behind an `Arc`. `R` is
/// what a subscriber produces; the log buses use the default `()`, while
/// [`notify_first`](EventBus::notify_first) races buses whose subscribers
/// answer with a value.
pub struct EventBus<T, R = ()> {
    state: Mutex<BusState<T, R>>,
}

impl<T, R> Default for EventBus<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> EventBus<T, R> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState {
                next_id: 0,
                subscribers: Vec::new(),
            }),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, BusState<T, R>> {
        // A subscriber list with a poisoned lock is still structurally
        // sound, the panic happened in application code.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Vec<(SubscriptionId, Arc<dyn EventCallback<T, R>>)> {
        self.locked().subscribers.clone()
    }

    /// Registers a callback. Subscribers are invoked in registration order
    /// by [`notify_all`](EventBus::notify_all).
    pub fn subscribe(&self, callback: impl EventCallback<T, R>) -> SubscriptionId {
        let mut state = self.locked();
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.subscribers.push((id, Arc::new(callback)));
        id
    }

    /// Removes a subscription. In-flight notifications that already took
    /// their snapshot still run the removed callback once.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), EventError> {
        let mut state = self.locked();
        match state.subscribers.iter().position(|(sid, _)| *sid == id) {
            Some(index) => {
                state.subscribers.remove(index);
                Ok(())
            }
            None => Err(EventError::UnknownSubscription(id)),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.locked().subscribers.len()
    }
}

impl<T, R> EventBus<T, R>
where
    T: Send + Sync + 'static,
    R: Send + 'static,
{
    /// Invokes every current subscriber sequentially, in registration
    /// order, awaiting each. A failing subscriber is logged and skipped.
    pub async fn notify_all(&self, event: Arc<T>) {
        for (id, callback) in self.snapshot() {
            if let Err(error) = callback.call(event.clone()).await {
                tracing::warn!(subscription = id.0, %error, "event subscriber failed");
            }
        }
    }

    /// Invokes every current subscriber concurrently and waits for all of
    /// them. No ordering is guaranteed; failures stay isolated.
    pub async fn notify_all_concurrently(&self, event: Arc<T>) {
        let mut tasks = JoinSet::new();
        for (id, callback) in self.snapshot() {
            let event = event.clone();
            tasks.spawn(async move { (id, callback.call(event).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((id, Err(error))) => {
                    tracing::warn!(subscription = id.0, %error, "event subscriber failed");
                }
                Err(error) => {
                    tracing::warn!(%error, "event subscriber task failed");
                }
            }
        }
    }

    /// Races every subscriber and returns the first answer accepted by
    /// `verify`. Rejected, failed and too-slow branches are skipped; when
    /// nothing qualifies before `wait` elapses (or no subscriber exists),
    /// `default` computes the answer from the elapsed time.
    ///
    /// Branches still running at the deadline are aborted, not revisited.
    pub async fn notify_first<V, D>(
        &self,
        event: Arc<T>,
        wait: Duration,
        verify: V,
        default: D,
    ) -> R
    where
        V: Fn(&R) -> bool,
        D: FnOnce(Duration) -> R,
    {
        let started = std::time::Instant::now();
        let deadline = tokio::time::Instant::now() + wait;

        let mut tasks = JoinSet::new();
        for (_, callback) in self.snapshot() {
            let event = event.clone();
            tasks.spawn(async move { callback.call(event).await });
        }

        while let Ok(Some(joined)) = timeout_at(deadline, tasks.join_next()).await {
            match joined {
                Ok(Ok(value)) if verify(&value) => return value,
                Ok(Ok(_)) | Ok(Err(_)) => {}
                Err(error) => {
                    tracing::warn!(%error, "event subscriber task failed");
                }
            }
        }

        default(started.elapsed())
    }
}

#[cfg(test)]
mod bus_self {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ok() -> Result<(), CallbackError> {
        Ok(())
    }

    #[tokio::test]
    async fn notify_all_runs_in_registration_order() {
        let bus: EventBus<u32> = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let order = order.clone();
            bus.subscribe(move |_: Arc<u32>| {
                let order = order.clone();
                async move {
                    order.lock().unwrap().push(tag);
                    ok()
                }
            });
        }

        bus.notify_all(Arc::new(7)).await;
        assert_eq!(*order.lock().unwrap(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn failing_subscriber_is_isolated() {
        let bus: EventBus<u32> = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let a = hits.clone();
        bus.subscribe(move |_: Arc<u32>| {
            let a = a.clone();
            async move {
                a.fetch_add(1, Ordering::SeqCst);
                ok()
            }
        });
        bus.subscribe(|_: Arc<u32>| async move {
            Err::<(), CallbackError>("always fails".into())
        });
        let c = hits.clone();
        bus.subscribe(move |_: Arc<u32>| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                ok()
            }
        });

        bus.notify_all(Arc::new(1)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        hits.store(0, Ordering::SeqCst);
        bus.notify_all_concurrently(Arc::new(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus: EventBus<u32> = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        let id = bus.subscribe(move |_: Arc<u32>| {
            let h = h.clone();
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                ok()
            }
        });

        bus.notify_all(Arc::new(1)).await;
        bus.unsubscribe(id).unwrap();
        bus.notify_all(Arc::new(2)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(
            bus.unsubscribe(id),
            Err(EventError::UnknownSubscription(id))
        );
    }

    #[tokio::test]
    async fn notify_first_returns_first_verified_answer() {
        let bus: EventBus<u32, u32> = EventBus::new();
        bus.subscribe(|_: Arc<u32>| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<u32, CallbackError>(1)
        });
        bus.subscribe(|_: Arc<u32>| async move { Ok::<u32, CallbackError>(42) });

        let answer = bus
            .notify_first(
                Arc::new(0),
                Duration::from_secs(1),
                |value| *value > 10,
                |_| 0,
            )
            .await;
        assert_eq!(answer, 42);
    }

    #[tokio::test]
    async fn notify_first_times_out_to_default() {
        let bus: EventBus<u32, u32> = EventBus::new();
        bus.subscribe(|_: Arc<u32>| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<u32, CallbackError>(1)
        });

        let answer = bus
            .notify_first(
                Arc::new(0),
                Duration::from_millis(50),
                |_| true,
                |elapsed| {
                    assert!(elapsed >= Duration::from_millis(40));
                    99
                },
            )
            .await;
        assert_eq!(answer, 99);
    }

    #[tokio::test]
    async fn notify_first_with_no_subscribers_returns_default() {
        let bus: EventBus<u32, u32> = EventBus::new();
        let answer = bus
            .notify_first(Arc::new(0), Duration::from_millis(10), |_| true, |_| 7)
            .await;
        assert_eq!(answer, 7);
    }
}
