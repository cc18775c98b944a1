use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tokio::sync::TryAcquireError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::host::Status;
use crate::host::TaskHandle;

/// A pending receive waiting for the next stream response.
///
/// The slot permit is declared first so it is released before the task
/// completes: once the host sees the completion, a new receive is accepted.
pub(crate) struct Token {
    slot: OwnedSemaphorePermit,
    task: TaskHandle,
}

impl Token {
    pub(crate) fn complete(
        self,
        status: Status,
        payload: impl AsRef<[u8]>,
    ) {
        let Token { slot, task } = self;
        drop(slot);
        task.complete(status, payload);
    }

    fn into_task(self) -> TaskHandle {
        let Token { slot, task } = self;
        drop(slot);
        task
    }
}

/// Outcome of offering a receive to a watch
#[derive(Debug)]
pub enum Offer {
    /// The forwarder owns the task now
    Accepted,
    /// A receive is already outstanding
    Busy(TaskHandle),
    /// The forwarder has exited
    Closed(TaskHandle),
}

/// Registry entry for one watch
pub(crate) struct Watch {
    slot: Arc<Semaphore>,
    tokens: mpsc::Sender<Token>,
    shutdown: CancellationToken,
    forwarder: JoinHandle<()>,
}

impl Watch {
    pub(crate) fn new(
        tokens: mpsc::Sender<Token>,
        shutdown: CancellationToken,
        forwarder: JoinHandle<()>,
    ) -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
            tokens,
            shutdown,
            forwarder,
        }
    }

    /// Atomically check the single slot and hand `task` to the forwarder.
    ///
    /// The slot stays taken until the forwarder completes the task, so a
    /// second receive is refused for the whole delivery, not only while the
    /// token sits in the channel.
    pub(crate) fn offer(
        &self,
        task: TaskHandle,
    ) -> Offer {
        let slot = match self.slot.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Offer::Busy(task),
            Err(TryAcquireError::Closed) => return Offer::Closed(task),
        };

        match self.tokens.try_send(Token { slot, task }) {
            Ok(()) => Offer::Accepted,
            Err(TrySendError::Full(token)) => Offer::Busy(token.into_task()),
            Err(TrySendError::Closed(token)) => Offer::Closed(token.into_task()),
        }
    }

    /// Stop intake, stop the source, and wait for the forwarder to finish.
    pub(crate) async fn close(self) {
        let Watch {
            slot: _,
            tokens,
            shutdown,
            forwarder,
        } = self;

        drop(tokens);
        shutdown.cancel();

        if let Err(e) = forwarder.await {
            warn!("watch forwarder ended abnormally: {:?}", e);
        }
    }
}

/// Per-connection watch map and id counter
#[derive(Default)]
pub(crate) struct WatchTable {
    next_id: u64,
    entries: HashMap<u64, Watch>,
    closed: bool,
}

impl WatchTable {
    /// Reserve the next watch id. Ids are never reused.
    pub(crate) fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn insert(
        &mut self,
        id: u64,
        watch: Watch,
    ) {
        self.entries.insert(id, watch);
    }

    pub(crate) fn get(
        &self,
        id: u64,
    ) -> Option<&Watch> {
        self.entries.get(&id)
    }

    pub(crate) fn remove(
        &mut self,
        id: u64,
    ) -> Option<Watch> {
        self.entries.remove(&id)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Mark the table closed and take every watch out of it
    pub(crate) fn close(&mut self) -> Vec<Watch> {
        self.closed = true;
        self.entries.drain().map(|(_, w)| w).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
