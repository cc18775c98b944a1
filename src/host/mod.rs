//! Host boundary
//!
//! The host hands the bridge opaque tasks through a blocking queue and expects
//! exactly one completion per task. [`TaskHandle`] is the move-only capability
//! that carries that obligation through the bridge: completing consumes it, and
//! dropping it uncompleted answers the host with an error instead of leaving the
//! task hanging.

pub mod channel;
pub mod stdio;


use std::fmt;

use tracing::warn;

use crate::Result;

/// Completion status understood by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    Error = 1,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// One unit of work submitted by the host
pub trait HostTask: Send + 'static {
    /// Serialized command carried by the task
    fn payload(&self) -> &[u8];

    /// Deliver the completion. Called at most once, through [`TaskHandle`].
    fn respond(
        self: Box<Self>,
        status: Status,
        payload: &[u8],
    );
}

/// Blocking source of host tasks
pub trait TaskQueue: Send {
    /// Block until the next task arrives.
    ///
    /// `Ok(None)` is the shutdown sentinel: the host is tearing the bridge down
    /// and owes no further responses.
    fn dequeue(&mut self) -> Result<Option<Box<dyn HostTask>>>;
}

pub(crate) const ABANDONED_TASK: &str = "task abandoned";

/// Single-use completion capability for one host task
pub struct TaskHandle {
    task: Option<Box<dyn HostTask>>,
}

impl TaskHandle {
    pub fn new(task: Box<dyn HostTask>) -> Self {
        Self { task: Some(task) }
    }

    pub fn payload(&self) -> &[u8] {
        self.task.as_ref().map(|t| t.payload()).unwrap_or_default()
    }

    pub fn complete(
        mut self,
        status: Status,
        payload: impl AsRef<[u8]>,
    ) {
        if let Some(task) = self.task.take() {
            task.respond(status, payload.as_ref());
        }
    }

    pub fn succeed(
        self,
        payload: impl AsRef<[u8]>,
    ) {
        self.complete(Status::Success, payload)
    }

    pub fn fail(
        self,
        message: impl AsRef<[u8]>,
    ) {
        self.complete(Status::Error, message)
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            warn!("task dropped without completion, answering with error");
            task.respond(Status::Error, ABANDONED_TASK.as_bytes());
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("pending", &self.task.is_some())
            .finish()
    }
}
