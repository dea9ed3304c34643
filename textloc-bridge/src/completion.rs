use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use crate::error::BridgeError;
use crate::handle::{AsyncHandle, Listener, ListenerToken};

/// Write-once asynchronous result shared by a producer and any number of observers.
///
/// Every clone refers to the same state. The producer calls [`Completion::complete`]
/// from whichever thread finishes the work; listeners run on that thread.
pub struct Completion<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    next_token: AtomicU64,
}

struct State<T> {
    value: Option<T>,
    listeners: Vec<(ListenerToken, Listener<Completion<T>>)>,
    // Dispatch bookkeeping: listeners are moved out while they run so that
    // they can register or cancel listeners without deadlocking.
    dispatching: bool,
    pending_notifications: u32,
    in_flight: Vec<ListenerToken>,
    cancelled: Vec<ListenerToken>,
}

impl<T> Completion<T> {
    /// Create a handle that is not done yet
    pub fn pending() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    value: None,
                    listeners: Vec::new(),
                    dispatching: false,
                    pending_notifications: 0,
                    in_flight: Vec::new(),
                    cancelled: Vec::new(),
                }),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    /// Create a handle that is already done with `value`
    pub fn completed(value: T) -> Self {
        let handle = Self::pending();
        handle.lock().value = Some(value);
        handle
    }

    /// Complete the handle and notify every registered listener.
    ///
    /// A handle completes at most once; later calls leave the stored result untouched.
    pub fn complete(&self, value: T) -> Result<(), BridgeError> {
        {
            let mut state = self.lock();
            if state.value.is_some() {
                return Err(BridgeError::AlreadyCompleted);
            }
            state.value = Some(value);
        }
        trace!("Completion finished, notifying listeners");
        self.dispatch();
        Ok(())
    }

    /// Fire a completion notification without changing the done state
    pub fn notify(&self) {
        self.dispatch();
    }

    /// Number of listeners currently registered
    pub fn listener_count(&self) -> usize {
        let state = self.lock();
        state.listeners.len() + state.in_flight.len() - state.cancelled.len()
    }

    /// Whether both handles share the same state
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_cancelled(&self, token: ListenerToken) -> bool {
        self.lock().cancelled.contains(&token)
    }

    /// Run listeners for every outstanding notification.
    ///
    /// Only one thread dispatches at a time; notifications raised meanwhile are
    /// coalesced into another round run by the dispatching thread.
    fn dispatch(&self) {
        {
            let mut state = self.lock();
            state.pending_notifications += 1;
            if state.dispatching {
                return;
            }
            state.dispatching = true;
        }

        let mut running: Vec<(ListenerToken, Listener<Self>)> = Vec::new();
        loop {
            // Listeners leaving the handle are dropped only after the lock is
            // released; their captures may call back into this handle.
            let mut released: Vec<(ListenerToken, Listener<Self>)> = Vec::new();
            let finished = {
                let mut state = self.lock();
                let cancelled = std::mem::take(&mut state.cancelled);
                for entry in std::mem::take(&mut running) {
                    if cancelled.contains(&entry.0) {
                        released.push(entry);
                    } else {
                        running.push(entry);
                    }
                }
                running.append(&mut state.listeners);
                state.listeners = std::mem::take(&mut running);
                state.in_flight.clear();

                if state.pending_notifications == 0 {
                    state.dispatching = false;
                    if state.value.is_some() {
                        // Done is terminal, nothing left to tell these listeners.
                        released.append(&mut state.listeners);
                    }
                    true
                } else {
                    state.pending_notifications = 0;
                    running = std::mem::take(&mut state.listeners);
                    state.in_flight = running.iter().map(|(token, _)| *token).collect();
                    false
                }
            };
            drop(released);
            if finished {
                return;
            }

            for (token, listener) in &mut running {
                if self.is_cancelled(*token) {
                    continue;
                }
                listener(self);
            }
        }
    }
}

impl<T> Completion<T>
where
    T: Send + 'static,
{
    /// Run `future` on the current tokio runtime and complete the handle with its output.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let handle = Self::pending();
        let producer = handle.clone();
        tokio::spawn(async move {
            let value = future.await;
            if let Err(e) = producer.complete(value) {
                warn!("Spawned completion could not be delivered: {}", e);
            }
        });
        handle
    }
}

impl<T> AsyncHandle for Completion<T>
where
    T: Clone + Default,
{
    type Output = T;

    fn is_done(&self) -> bool {
        self.lock().value.is_some()
    }

    fn result(&self) -> T {
        self.lock().value.clone().unwrap_or_default()
    }

    fn on_completed(&self, listener: Listener<Self>) -> ListenerToken {
        let token = ListenerToken(self.inner.next_token.fetch_add(1, Ordering::Relaxed));
        let done = {
            let mut state = self.lock();
            state.listeners.push((token, listener));
            state.value.is_some()
        };
        trace!("Registered {}", token);

        // Late listeners on a finished handle hear about it straight away.
        if done {
            self.dispatch();
        }
        token
    }

    fn cancel_notification(&self, token: ListenerToken) -> bool {
        let mut state = self.lock();
        if let Some(index) = state.listeners.iter().position(|(t, _)| *t == token) {
            let removed = state.listeners.remove(index);
            drop(state);
            drop(removed);
            trace!("Cancelled {}", token);
            return true;
        }
        if state.in_flight.contains(&token) && !state.cancelled.contains(&token) {
            state.cancelled.push(token);
            trace!("Cancelled {} during dispatch", token);
            return true;
        }
        false
    }
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self::pending()
    }
}

impl<T: fmt::Debug> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Completion")
            .field("value", &state.value)
            .field("listeners", &(state.listeners.len() + state.in_flight.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_complete_only_once() {
        let handle = Completion::pending();
        assert!(!handle.is_done());
        assert_eq!(handle.result(), 0);

        handle.complete(7).unwrap();
        assert!(handle.is_done());
        assert_eq!(handle.complete(9), Err(BridgeError::AlreadyCompleted));
        assert_eq!(handle.result(), 7);
    }

    #[test]
    fn test_listeners_released_after_completion() {
        let handle = Completion::<u32>::pending();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        handle.on_completed(Box::new(move |_: &Completion<u32>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(handle.listener_count(), 1);

        handle.notify();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.listener_count(), 1);

        handle.complete(1).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(handle.listener_count(), 0);
    }

    #[test]
    fn test_listener_can_cancel_itself_during_dispatch() {
        let handle = Completion::<u32>::pending();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let token = Arc::new(Mutex::new(None));
        let own_token = Arc::clone(&token);
        let registered = handle.on_completed(Box::new(move |h: &Completion<u32>| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = *own_token.lock().unwrap() {
                assert!(h.cancel_notification(token));
            }
        }));
        *token.lock().unwrap() = Some(registered);

        handle.notify();
        handle.notify();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.listener_count(), 0);
        assert!(!handle.cancel_notification(registered));
    }

    #[test]
    fn test_late_listener_is_notified_immediately() {
        let handle = Completion::completed("ready".to_string());
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        handle.on_completed(Box::new(move |h: &Completion<String>| {
            *slot.lock().unwrap() = Some(h.result());
        }));
        assert_eq!(seen.lock().unwrap().as_deref(), Some("ready"));
    }

    #[test]
    fn test_clones_share_state() {
        let producer = Completion::pending();
        let observer = producer.clone();
        assert!(producer.ptr_eq(&observer));
        producer.complete(3u8).unwrap();
        assert!(observer.is_done());
        assert_eq!(observer.result(), 3);
    }

    /// Touches its handle when dropped, as a captured `WaitFor` would
    struct ReentrantDrop(Completion<u32>);

    impl Drop for ReentrantDrop {
        fn drop(&mut self) {
            self.0.cancel_notification(ListenerToken(u64::MAX));
        }
    }

    #[test]
    fn test_listener_captures_dropped_outside_lock() {
        let handle = Completion::<u32>::pending();

        let guard = ReentrantDrop(handle.clone());
        let token = handle.on_completed(Box::new(move |_: &Completion<u32>| {
            let _ = &guard;
        }));
        assert!(handle.cancel_notification(token));

        let guard = ReentrantDrop(handle.clone());
        handle.on_completed(Box::new(move |_: &Completion<u32>| {
            let _ = &guard;
        }));
        handle.complete(4).unwrap();
        assert_eq!(handle.listener_count(), 0);
    }

    #[test]
    fn test_listener_cancelled_mid_dispatch_dropped_outside_lock() {
        let handle = Completion::<u32>::pending();
        let guard = ReentrantDrop(handle.clone());
        let own_token = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&own_token);
        let token = handle.on_completed(Box::new(move |h: &Completion<u32>| {
            let _ = &guard;
            if let Some(token) = *slot.lock().unwrap() {
                h.cancel_notification(token);
            }
        }));
        *own_token.lock().unwrap() = Some(token);

        handle.notify();
        assert_eq!(handle.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_completes_from_runtime() {
        let handle = Completion::spawn(async { 40 + 2 });
        let value = crate::wait::wait_for(handle.clone()).await;
        assert_eq!(value, 42);
        assert!(handle.is_done());
    }
}
