use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use crate::handle::{AsyncHandle, ListenerToken};
use crate::scheduler::{FrameScheduler, TaskId};
use crate::wait::wait_for_ticks;

type Callback<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// State of one `bridge` call, shared with the listener it registers
struct Registration<T> {
    callback: Mutex<Option<Callback<T>>>,
    token: Mutex<Option<ListenerToken>>,
    delivered: AtomicBool,
    cancelled: AtomicBool,
}

impl<T> Registration<T> {
    fn new(callback: Callback<T>) -> Self {
        Self {
            callback: Mutex::new(Some(callback)),
            token: Mutex::new(None),
            delivered: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    fn take_callback(&self) -> Option<Callback<T>> {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Hand `value` to the callback unless it already ran or was cancelled.
    /// The callback runs after the slot lock is released.
    fn deliver(&self, value: T) -> bool {
        let Some(callback) = self.take_callback() else {
            return false;
        };
        self.delivered.store(true, Ordering::Release);
        callback(value);
        true
    }

    fn set_token(&self, token: ListenerToken) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn token(&self) -> Option<ListenerToken> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A pending or delivered `bridge` registration.
///
/// Dropping it does not cancel the callback; call [`Bridged::cancel`] for that.
pub struct Bridged<H: AsyncHandle> {
    handle: H,
    record: Arc<Registration<H::Output>>,
}

impl<H: AsyncHandle> Bridged<H> {
    /// The observed handle
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Whether the callback has been invoked
    pub fn is_delivered(&self) -> bool {
        self.record.delivered.load(Ordering::Acquire)
    }

    /// Whether the callback is still waiting for the handle
    pub fn is_pending(&self) -> bool {
        !self.is_delivered() && !self.is_cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.record.cancelled.load(Ordering::Acquire)
    }

    /// Listener registered on the handle, if the handle was pending at bridge time
    pub fn token(&self) -> Option<ListenerToken> {
        self.record.token()
    }

    /// Abandon the registration.
    ///
    /// The callback is dropped without being called and the listener removed.
    /// The handle itself keeps running. Returns `false` if the callback was
    /// already delivered or cancelled.
    pub fn cancel(&self) -> bool {
        let Some(callback) = self.record.take_callback() else {
            return false;
        };
        drop(callback);
        self.record.cancelled.store(true, Ordering::Release);
        if let Some(token) = self.record.token() {
            self.handle.cancel_notification(token);
        }
        debug!("Bridge registration cancelled");
        true
    }
}

impl<H: AsyncHandle> fmt::Debug for Bridged<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridged")
            .field("token", &self.token())
            .field("delivered", &self.is_delivered())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Deliver the result of `handle` to `on_complete` exactly once.
///
/// If the handle is already done the callback runs synchronously before this
/// returns. Otherwise a listener is registered; every notification re-checks
/// `is_done`, and the first one that observes completion delivers the result
/// and deregisters the listener. Further notifications are ignored.
///
/// Calling `bridge` again on a finished handle with a fresh callback delivers
/// the same result to that callback.
pub fn bridge<H, F>(handle: &H, on_complete: F) -> Bridged<H>
where
    H: AsyncHandle + Clone + 'static,
    H::Output: 'static,
    F: FnOnce(H::Output) + Send + 'static,
{
    let record = Arc::new(Registration::new(Box::new(on_complete)));
    let bridged = Bridged {
        handle: handle.clone(),
        record: Arc::clone(&record),
    };

    if handle.is_done() {
        trace!("Handle already done, delivering synchronously");
        record.deliver(handle.result());
        return bridged;
    }

    let listener_record = Arc::clone(&record);
    let token = handle.on_completed(Box::new(move |h: &H| {
        if !h.is_done() {
            trace!("Notification before completion, still waiting");
            return;
        }
        if listener_record.deliver(h.result()) {
            if let Some(token) = listener_record.token() {
                h.cancel_notification(token);
            }
        }
    }));
    record.set_token(token);

    // The handle may have finished between the first check and registration,
    // or notified the listener before its token was known.
    if handle.is_done() {
        record.deliver(handle.result());
    }
    if record.delivered.load(Ordering::Acquire) {
        handle.cancel_notification(token);
    } else {
        trace!("Waiting on {}", token);
    }

    bridged
}

/// Deliver the result of `handle` to `action` from a task on `scheduler`.
///
/// The task checks the handle once per tick, so `action` runs on the thread
/// that ticks the scheduler and never on the producer's thread. Use this over
/// [`bridge`] when the callback touches frame-bound state.
pub fn bridge_on<H, F>(scheduler: &mut FrameScheduler, handle: H, action: F) -> TaskId
where
    H: AsyncHandle + 'static,
    F: FnOnce(H::Output) + 'static,
{
    scheduler.spawn(async move {
        let value = wait_for_ticks(handle).await;
        action(value);
    })
}
