//! Push-to-pull adapter for one watch.
//!
//! The forwarder takes one token at a time, then waits for exactly one stream
//! response and completes that token with it. Responses the store pushes in
//! between stay in the stream until the host asks for them.

use tokio::sync::mpsc;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::watch::Token;
use super::WATCHER_CLOSED;
use crate::codec;
use crate::host::Status;
use crate::store::WatchSubscription;
use crate::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Closed,
    Deadline,
    StreamEnded,
}

pub(crate) struct Forwarder {
    connection_id: u64,
    watch_id: u64,
    tokens: mpsc::Receiver<Token>,
    subscription: Box<dyn WatchSubscription>,
    shutdown: CancellationToken,
    deadline: Option<Instant>,
}

impl Forwarder {
    pub(crate) fn new(
        connection_id: u64,
        watch_id: u64,
        tokens: mpsc::Receiver<Token>,
        subscription: Box<dyn WatchSubscription>,
        shutdown: CancellationToken,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            connection_id,
            watch_id,
            tokens,
            subscription,
            shutdown,
            deadline,
        }
    }

    pub(crate) async fn run(mut self) {
        let (connection_id, watch_id) = (self.connection_id, self.watch_id);
        debug!(connection_id, watch_id, "watch forwarder started");

        let exit = self.forward().await;

        // Stop intake first, then the source
        self.tokens.close();
        if exit != Exit::StreamEnded {
            if let Err(e) = self.subscription.cancel().await {
                debug!(connection_id, watch_id, "failed to cancel store watch: {}", e);
            }
        }
        while let Ok(token) = self.tokens.try_recv() {
            token.complete(Status::Error, WATCHER_CLOSED);
        }

        debug!(connection_id, watch_id, ?exit, "watch forwarder stopped");
    }

    async fn forward(&mut self) -> Exit {
        let deadline = self.deadline;
        loop {
            let token = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Exit::Closed,
                _ = expired(deadline) => return Exit::Deadline,
                token = self.tokens.recv() => match token {
                    Some(token) => token,
                    None => return Exit::Closed,
                },
            };

            let message = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    token.complete(Status::Error, WATCHER_CLOSED);
                    return Exit::Closed;
                }
                _ = expired(deadline) => {
                    token.complete(Status::Error, StoreError::DeadlineExceeded.to_string());
                    return Exit::Deadline;
                }
                message = self.subscription.message() => message,
            };

            match message {
                Ok(Some(response)) => {
                    if let Some(err) = response.error() {
                        token.complete(Status::Error, err);
                        continue;
                    }
                    match codec::encode_watch_response(&response) {
                        Ok(payload) => {
                            trace!(
                                connection_id = self.connection_id,
                                watch_id = self.watch_id,
                                events = response.events.len(),
                                "watch response delivered"
                            );
                            token.complete(Status::Success, payload);
                        }
                        Err(e) => token.complete(Status::Error, e.to_string()),
                    }
                }
                Ok(None) => {
                    token.complete(Status::Error, StoreError::StreamClosed.to_string());
                    return Exit::StreamEnded;
                }
                Err(e) => {
                    warn!(
                        connection_id = self.connection_id,
                        watch_id = self.watch_id,
                        "watch stream error: {}",
                        e
                    );
                    token.complete(Status::Error, e.to_string());
                }
            }
        }
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
