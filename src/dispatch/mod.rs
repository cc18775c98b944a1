//! Dispatch loop
//!
//! Pulls one task at a time off the host queue, decodes the envelope and
//! routes it. Receives are answered on the dispatch thread itself; every other
//! command runs on its own runtime task and owns that task's completion.

mod handlers;


use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::codec;
use crate::codec::CommandKind;
use crate::codec::Envelope;
use crate::host::TaskHandle;
use crate::host::TaskQueue;
use crate::metrics::COMMANDS_TOTAL;
use crate::metrics::RECEIVE_REJECTED_TOTAL;
use crate::registry::ConnectionRegistry;
use crate::registry::Offer;
use crate::registry::INVALID_CONNECTION;
use crate::registry::INVALID_WATCHER;
use crate::registry::WATCHER_CLOSED;
use crate::DispatchConfig;
use crate::Result;

pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    runtime: Handle,
    strict_envelope: bool,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        runtime: Handle,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            registry,
            runtime,
            strict_envelope: config.strict_envelope,
        }
    }

    /// Drive `queue` until the host sends the shutdown sentinel.
    ///
    /// Blocks the calling thread; run it on a thread that is not a runtime
    /// worker. Returns an error only when the loop cannot continue.
    pub fn run<Q: TaskQueue + ?Sized>(
        &self,
        queue: &mut Q,
    ) -> Result<()> {
        info!(strict_envelope = self.strict_envelope, "dispatch loop started");
        loop {
            let task = match queue.dequeue()? {
                Some(task) => task,
                None => {
                    info!("shutdown sentinel received, dispatch loop exiting");
                    return Ok(());
                }
            };
            self.dispatch(TaskHandle::new(task))?;
        }
    }

    /// Route a single task. Only a malformed envelope in strict mode is
    /// returned as an error; the task has been answered either way.
    pub fn dispatch(
        &self,
        task: TaskHandle,
    ) -> Result<()> {
        let envelope = match codec::decode_envelope(task.payload()) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("failed to decode envelope: {}", e);
                task.fail(e.to_string());
                if self.strict_envelope {
                    return Err(e.into());
                }
                return Ok(());
            }
        };

        let kind = match envelope.kind() {
            Some(kind) => kind,
            None => {
                warn!(cmd = envelope.cmd, "unknown command");
                COMMANDS_TOTAL.with_label_values(&["UNKNOWN"]).inc();
                task.fail(format!("unknown command {}", envelope.cmd));
                return Ok(());
            }
        };
        COMMANDS_TOTAL.with_label_values(&[kind.name()]).inc();
        trace!(%kind, connection_id = envelope.client, "dispatching command");

        let registry = self.registry.clone();
        match kind {
            CommandKind::ReceiveWatchEvent => self.receive(&envelope, task),
            CommandKind::NewConnection => {
                self.spawn(kind, task, handlers::new_connection(registry, envelope))
            }
            CommandKind::CloseConnection => {
                self.spawn(kind, task, handlers::close_connection(registry, envelope))
            }
            CommandKind::CreateWatch => {
                self.spawn(kind, task, handlers::create_watch(registry, envelope))
            }
            CommandKind::CloseWatch => {
                self.spawn(kind, task, handlers::close_watch(registry, envelope))
            }
            CommandKind::KvRange | CommandKind::KvPut => {
                debug!(%kind, "reserved command kind");
                task.fail(format!("unsupported command: {}", kind));
            }
        }
        Ok(())
    }

    /// Check-and-enqueue against the watch's single slot. Never blocks.
    fn receive(
        &self,
        envelope: &Envelope,
        task: TaskHandle,
    ) {
        let watch_id: u64 = match envelope.body(CommandKind::ReceiveWatchEvent) {
            Ok(watch_id) => watch_id,
            Err(e) => return task.fail(e.to_string()),
        };
        let connection_id = envelope.client;

        let connection = match self.registry.get(connection_id) {
            Some(connection) => connection,
            None => {
                debug!(connection_id, watch_id, "receive on unknown connection");
                return task.fail(INVALID_CONNECTION);
            }
        };

        match connection.receive(watch_id, task) {
            Ok(Offer::Accepted) => {
                trace!(connection_id, watch_id, "receive queued");
            }
            Ok(Offer::Busy(task)) => {
                RECEIVE_REJECTED_TOTAL.inc();
                debug!(connection_id, watch_id, "receive already pending");
                task.fail("");
            }
            Ok(Offer::Closed(task)) => task.fail(WATCHER_CLOSED),
            Err(task) => {
                debug!(connection_id, watch_id, "receive on unknown watch");
                task.fail(INVALID_WATCHER);
            }
        }
    }

    /// Run `handler` on the runtime and answer `task` with its outcome
    fn spawn<F>(
        &self,
        kind: CommandKind,
        task: TaskHandle,
        handler: F,
    ) where
        F: Future<Output = Result<String>> + Send + 'static,
    {
        self.runtime.spawn(async move {
            match handler.await {
                Ok(payload) => task.succeed(payload),
                Err(e) => {
                    warn!(%kind, "command failed: {}", e);
                    task.fail(e.to_string());
                }
            }
        });
    }
}
