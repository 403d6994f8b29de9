//! Asynchronous task lifecycle.
//!
//! - [`TaskRunner`] turns a submitted problem into a persisted task and
//!   drives its solve on a bounded worker pool.
//! - [`cancel_task`] is the fire-and-forget cancellation protocol.
//! - [`ProgressPublisher`] streams task state to one subscriber.
//!
//! All three talk to each other only through the task store; both polling
//! loops share the cadence of a single [`Ticker`].

mod cancel;
mod clock;
mod publisher;
mod runner;
mod types;

pub use cancel::cancel_task;
pub use clock::Ticker;
pub use publisher::{ProgressEvent, ProgressPublisher};
pub use runner::TaskRunner;
pub use types::{CancelAck, RuntimeError, TaskStatus};
