use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use crate::host::channel;
use crate::host::channel::ChannelQueue;
use crate::host::channel::Completion;
use crate::host::channel::Submitter;
use crate::host::TaskHandle;
use crate::host::TaskQueue;

/// Hands out [`TaskHandle`]s backed by the channel host and collects their
/// completions
pub struct TestHost {
    submitter: Submitter,
    queue: ChannelQueue,
    completions: UnboundedReceiver<Completion>,
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHost {
    pub fn new() -> Self {
        let (submitter, queue, completions) = channel::channel();
        Self {
            submitter,
            queue,
            completions,
        }
    }

    /// A fresh task and the id its completion will carry
    pub fn task(&mut self) -> (u64, TaskHandle) {
        let id = self.submitter.submit(Vec::new());
        let task = self
            .queue
            .dequeue()
            .expect("channel queue never fails")
            .expect("task was just submitted");
        (id, TaskHandle::new(task))
    }

    pub async fn completion(&mut self) -> Completion {
        timeout(Duration::from_secs(5), self.completions.recv())
            .await
            .expect("no completion within 5s")
            .expect("completion channel closed")
    }

    pub fn try_completion(&mut self) -> Option<Completion> {
        self.completions.try_recv().ok()
    }
}
