use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;
use futures::task::noop_waker_ref;
use futures::FutureExt;
use tracing::{debug, trace};

/// Identifier of a task spawned on a [`FrameScheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

struct ScheduledTask {
    id: TaskId,
    future: LocalBoxFuture<'static, ()>,
}

/// Cooperative per-frame executor.
///
/// Every call to [`FrameScheduler::tick`] polls each live task exactly once,
/// in spawn order, on the calling thread. Tasks are not woken in between;
/// a task that yields with [`next_tick`] resumes on the following tick.
#[derive(Default)]
pub struct FrameScheduler {
    tasks: Vec<ScheduledTask>,
    next_id: u64,
    frame: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task; it first runs on the next tick
    pub fn spawn<F>(&mut self, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.tasks.push(ScheduledTask {
            id,
            future: future.boxed_local(),
        });
        debug!("Spawned {} on frame {}", id, self.frame);
        id
    }

    /// Advance one frame. Returns the number of tasks still running.
    pub fn tick(&mut self) -> usize {
        self.frame += 1;
        let frame = self.frame;
        let mut cx = Context::from_waker(noop_waker_ref());

        self.tasks.retain_mut(|task| match task.future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                trace!("{} finished on frame {}", task.id, frame);
                false
            }
            Poll::Pending => true,
        });
        self.tasks.len()
    }

    /// Tick until no task is left or `max_ticks` frames have run.
    /// Returns `true` if the scheduler went idle.
    pub fn run_until_idle(&mut self, max_ticks: u64) -> bool {
        for _ in 0..max_ticks {
            if self.tasks.is_empty() {
                return true;
            }
            self.tick();
        }
        self.tasks.is_empty()
    }

    /// Number of frames ticked so far
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    pub fn is_running(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|task| task.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("frame", &self.frame)
            .field("tasks", &self.tasks.iter().map(|t| t.id).collect::<Vec<_>>())
            .finish()
    }
}

/// Future that stays pending for one poll, then completes.
///
/// Under a [`FrameScheduler`] this suspends the task until the next tick.
#[derive(Debug, Default)]
#[must_use = "futures do nothing unless polled"]
pub struct NextTick {
    yielded: bool,
}

/// Yield control back to the scheduler until the next tick
pub fn next_tick() -> NextTick {
    NextTick::default()
}

impl Future for NextTick {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        // Executors that only poll on wake-up must still come back.
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_tasks_run_once_per_tick() {
        let mut scheduler = FrameScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let task_log = Rc::clone(&log);
        let id = scheduler.spawn(async move {
            for step in 0..3 {
                task_log.borrow_mut().push(step);
                next_tick().await;
            }
        });

        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.tick(), 1);
        assert_eq!(*log.borrow(), vec![0]);
        assert_eq!(scheduler.tick(), 1);
        assert_eq!(*log.borrow(), vec![0, 1]);
        scheduler.tick();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(scheduler.is_running(id));
        assert_eq!(scheduler.tick(), 0);
        assert!(!scheduler.is_running(id));
        assert_eq!(scheduler.frame(), 4);
    }

    #[test]
    fn test_run_until_idle_respects_budget() {
        let mut scheduler = FrameScheduler::new();
        scheduler.spawn(async {
            loop {
                next_tick().await;
            }
        });
        assert!(!scheduler.run_until_idle(10));
        assert_eq!(scheduler.frame(), 10);

        let mut idle = FrameScheduler::new();
        idle.spawn(async {});
        assert!(idle.run_until_idle(10));
        assert_eq!(idle.frame(), 1);
    }
}
