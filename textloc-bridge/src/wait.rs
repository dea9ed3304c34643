use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::task::AtomicWaker;
use tracing::trace;

use crate::handle::{AsyncHandle, ListenerToken};
use crate::scheduler::next_tick;

/// Future resolving to the result of a handle once it reports done.
///
/// The task is woken by the handle's completion notification rather than
/// polled every frame.
#[must_use = "futures do nothing unless polled"]
pub struct WaitFor<H: AsyncHandle> {
    handle: H,
    waker: Arc<AtomicWaker>,
    token: Option<ListenerToken>,
}

/// Suspend until `handle` is done, then return its result
pub fn wait_for<H>(handle: H) -> WaitFor<H>
where
    H: AsyncHandle + Unpin + 'static,
{
    WaitFor {
        handle,
        waker: Arc::new(AtomicWaker::new()),
        token: None,
    }
}

impl<H> WaitFor<H>
where
    H: AsyncHandle + Unpin,
{
    fn finish(&mut self) -> H::Output {
        if let Some(token) = self.token.take() {
            self.handle.cancel_notification(token);
        }
        self.handle.result()
    }
}

impl<H> Future for WaitFor<H>
where
    H: AsyncHandle + Unpin + 'static,
{
    type Output = H::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<H::Output> {
        let this = self.get_mut();
        if this.handle.is_done() {
            return Poll::Ready(this.finish());
        }

        this.waker.register(cx.waker());
        if this.token.is_none() {
            let waker = Arc::clone(&this.waker);
            let token = this
                .handle
                .on_completed(Box::new(move |_: &H| waker.wake()));
            trace!("WaitFor registered {}", token);
            this.token = Some(token);
        }

        // Completion may have raced the registration above.
        if this.handle.is_done() {
            return Poll::Ready(this.finish());
        }
        Poll::Pending
    }
}

impl<H: AsyncHandle> Drop for WaitFor<H> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.handle.cancel_notification(token);
        }
    }
}

/// Suspend the calling task one scheduler tick at a time until `handle` is done.
///
/// This polls the done flag once per tick and is meant for tasks running on a
/// [`FrameScheduler`](crate::FrameScheduler) where frame granularity is wanted.
pub async fn wait_for_ticks<H: AsyncHandle>(handle: H) -> H::Output {
    while !handle.is_done() {
        next_tick().await;
    }
    handle.result()
}
