//! Textloc Bridge
//!
//! This crate turns poll-based asynchronous handles into single-shot callbacks
//! and into tasks that a per-frame scheduler can suspend on.
//!
//! # Features
//!
//! - **AsyncHandle**: The capability a producer exposes (done flag, result, completion listeners)
//! - **Completion**: A cloneable, thread-safe handle that producers can complete from any thread
//! - **bridge**: At-most-once callback delivery, whether the handle is already done or not
//! - **bridge_on**: The same delivery, run from a scheduler task on the ticking thread
//! - **wait_for**: Readiness-driven and per-tick suspension until a handle completes
//! - **FrameScheduler**: Cooperative executor that polls every task once per tick
//!
//! # Example
//!
//! ```rust
//! use textloc_bridge::{bridge, Completion};
//!
//! let handle = Completion::completed("hello".to_string());
//! let registration = bridge(&handle, |text| println!("{text}"));
//! assert!(registration.is_delivered());
//! ```

pub mod bridge;
pub mod completion;
pub mod error;
pub mod handle;
pub mod scheduler;
pub mod wait;

// Re-export commonly used types
pub use bridge::{bridge, bridge_on, Bridged};
pub use completion::Completion;
pub use error::BridgeError;
pub use handle::{AsyncHandle, Listener, ListenerToken};
pub use scheduler::{next_tick, FrameScheduler, NextTick, TaskId};
pub use wait::{wait_for, wait_for_ticks, WaitFor};
