use std::fmt;

/// Listener invoked on every completion notification of a handle.
///
/// The handle passes itself so a listener can re-check `is_done` and
/// deregister without holding its own reference to the handle.
pub type Listener<H> = Box<dyn FnMut(&H) + Send + 'static>;

/// Token identifying one listener registered on a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerToken(pub u64);

impl fmt::Display for ListenerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Opaque reference to a pending or completed asynchronous computation.
///
/// Implementations must uphold:
/// - `is_done` goes from `false` to `true` at most once and never reverts.
/// - `result` is meaningful only once `is_done` is `true`; before that it
///   returns the default value.
/// - Listeners may be invoked on any thread, more than once, and possibly
///   before `is_done` reflects completion.
/// - Listeners are invoked without holding any lock that
///   `on_completed` or `cancel_notification` would take.
pub trait AsyncHandle: Sized {
    type Output: Clone;

    /// Whether the computation has finished
    fn is_done(&self) -> bool;

    /// The result of the computation, or the default value while pending
    fn result(&self) -> Self::Output;

    /// Register a listener for completion notifications
    fn on_completed(&self, listener: Listener<Self>) -> ListenerToken;

    /// Remove a previously registered listener. Returns `false` if the token
    /// is unknown or was already removed.
    fn cancel_notification(&self, token: ListenerToken) -> bool;
}
