//! In-process host built on channels.
//!
//! Lets a Rust program (or a test) drive the bridge the same way an embedding
//! host would: submit serialized commands, then read completions.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;

use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;

use super::HostTask;
use super::Status;
use super::TaskQueue;
use crate::Result;

/// A completion delivered back to the submitting side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: u64,
    pub status: Status,
    pub payload: Vec<u8>,
}

impl Completion {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

struct ChannelTask {
    id: u64,
    payload: Vec<u8>,
    completions: UnboundedSender<Completion>,
}

impl HostTask for ChannelTask {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn respond(
        self: Box<Self>,
        status: Status,
        payload: &[u8],
    ) {
        // Receiver gone means the host stopped listening
        let _ = self.completions.send(Completion {
            id: self.id,
            status,
            payload: payload.to_vec(),
        });
    }
}

/// Submitting side. Dropping every clone signals shutdown to the queue.
#[derive(Clone)]
pub struct Submitter {
    tasks: mpsc::Sender<ChannelTask>,
    completions: UnboundedSender<Completion>,
    next_id: Arc<AtomicU64>,
}

impl Submitter {
    /// Queue a serialized command and return the task id its completion
    /// will carry.
    pub fn submit(
        &self,
        payload: impl Into<Vec<u8>>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let task = ChannelTask {
            id,
            payload: payload.into(),
            completions: self.completions.clone(),
        };
        // A closed queue answers nothing; the caller observes that as a
        // missing completion.
        let _ = self.tasks.send(task);
        id
    }
}

/// Dequeuing side handed to the dispatch loop
pub struct ChannelQueue {
    tasks: mpsc::Receiver<ChannelTask>,
}

impl TaskQueue for ChannelQueue {
    fn dequeue(&mut self) -> Result<Option<Box<dyn HostTask>>> {
        Ok(self
            .tasks
            .recv()
            .ok()
            .map(|task| Box::new(task) as Box<dyn HostTask>))
    }
}

/// Create a connected submitter, queue, and completion receiver
pub fn channel() -> (Submitter, ChannelQueue, UnboundedReceiver<Completion>) {
    let (tasks_tx, tasks_rx) = mpsc::channel();
    let (completions_tx, completions_rx) = unbounded_channel();
    (
        Submitter {
            tasks: tasks_tx,
            completions: completions_tx,
            next_id: Arc::new(AtomicU64::new(0)),
        },
        ChannelQueue { tasks: tasks_rx },
        completions_rx,
    )
}
