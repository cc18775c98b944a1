use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::forwarder::Forwarder;
use super::watch::Watch;
use super::watch::WatchTable;
use super::Offer;
use super::INVALID_CONNECTION;
use crate::host::TaskHandle;
use crate::metrics;
use crate::store::ConnectionConfig;
use crate::store::StoreConnector;
use crate::store::StoreSession;
use crate::store::WatchOptions;
use crate::Result;
use crate::StoreError;

/// An open store session and the watches created on it
pub struct Connection {
    id: u64,
    session: Arc<dyn StoreSession>,
    watches: RwLock<WatchTable>,
}

impl Connection {
    fn new(
        id: u64,
        session: Arc<dyn StoreSession>,
    ) -> Self {
        Self {
            id,
            session,
            watches: RwLock::new(WatchTable::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Open a watch and start its forwarder.
    ///
    /// `timeout` bounds the watch's whole lifetime, not a single receive.
    /// A timeout too large to place on the clock means no deadline.
    pub async fn create_watch(
        &self,
        options: WatchOptions,
        timeout: Option<Duration>,
    ) -> Result<u64> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let subscription = self.session.watch(options).await?;
        let mut subscription = Some(subscription);

        let watch_id = {
            let mut table = self.watches.write();
            match subscription.take() {
                Some(opened) if !table.is_closed() => {
                    let watch_id = table.allocate_id();
                    let (tokens_tx, tokens_rx) = mpsc::channel(1);
                    let shutdown = CancellationToken::new();
                    let forwarder = Forwarder::new(
                        self.id,
                        watch_id,
                        tokens_rx,
                        opened,
                        shutdown.clone(),
                        deadline,
                    );
                    let handle = tokio::spawn(forwarder.run());
                    table.insert(watch_id, Watch::new(tokens_tx, shutdown, handle));
                    Some(watch_id)
                }
                unused => {
                    subscription = unused;
                    None
                }
            }
        };

        match watch_id {
            Some(watch_id) => {
                metrics::WATCHES.inc();
                info!(connection_id = self.id, watch_id, ?timeout, "watch created");
                Ok(watch_id)
            }
            None => {
                // The connection closed while the subscription was opening
                if let Some(mut subscription) = subscription {
                    let _ = subscription.cancel().await;
                }
                Err(StoreError::Other(INVALID_CONNECTION.to_string()).into())
            }
        }
    }

    /// Offer a receive to watch `watch_id`. Never blocks.
    ///
    /// Hands the task back when the watch is unknown.
    pub fn receive(
        &self,
        watch_id: u64,
        task: TaskHandle,
    ) -> std::result::Result<Offer, TaskHandle> {
        let table = self.watches.read();
        match table.get(watch_id) {
            Some(watch) => Ok(watch.offer(task)),
            None => Err(task),
        }
    }

    /// Close one watch. Returns whether it existed.
    pub async fn close_watch(
        &self,
        watch_id: u64,
    ) -> bool {
        let watch = self.watches.write().remove(watch_id);
        match watch {
            Some(watch) => {
                watch.close().await;
                metrics::WATCHES.dec();
                info!(connection_id = self.id, watch_id, "watch closed");
                true
            }
            None => false,
        }
    }

    pub fn watch_count(&self) -> usize {
        self.watches.read().len()
    }

    /// Close every watch, then the session
    async fn close(&self) {
        let watches = self.watches.write().close();
        let closed = watches.len();

        join_all(watches.into_iter().map(Watch::close)).await;
        metrics::WATCHES.sub(closed as i64);

        self.session.close().await;
        debug!(connection_id = self.id, watches = closed, "connection resources released");
    }
}

#[derive(Default)]
struct ConnectionTable {
    next_id: u64,
    entries: HashMap<u64, Arc<Connection>>,
}

/// Process-wide map of open connections
pub struct ConnectionRegistry {
    connector: Arc<dyn StoreConnector>,
    connections: RwLock<ConnectionTable>,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            connections: RwLock::new(ConnectionTable::default()),
        }
    }

    /// Open a session and register it.
    ///
    /// An id is only consumed when the session opens.
    pub async fn create(
        &self,
        config: &ConnectionConfig,
    ) -> Result<u64> {
        let session = self.connector.connect(config).await?;

        let id = {
            let mut table = self.connections.write();
            table.next_id += 1;
            let id = table.next_id;
            table.entries.insert(id, Arc::new(Connection::new(id, session)));
            id
        };

        metrics::CONNECTIONS.inc();
        info!(connection_id = id, endpoints = ?config.endpoints, "connection created");
        Ok(id)
    }

    pub fn get(
        &self,
        id: u64,
    ) -> Option<Arc<Connection>> {
        self.connections.read().entries.get(&id).cloned()
    }

    /// Close a connection and everything it owns. Returns whether it existed.
    pub async fn close(
        &self,
        id: u64,
    ) -> bool {
        let connection = self.connections.write().entries.remove(&id);
        match connection {
            Some(connection) => {
                connection.close().await;
                metrics::CONNECTIONS.dec();
                info!(connection_id = id, "connection closed");
                true
            }
            None => {
                debug!(connection_id = id, "close on unknown connection");
                false
            }
        }
    }

    /// Close every connection. Used when the bridge shuts down.
    pub async fn shutdown(&self) {
        let connections: Vec<Arc<Connection>> = {
            let mut table = self.connections.write();
            table.entries.drain().map(|(_, c)| c).collect()
        };
        if connections.is_empty() {
            return;
        }

        warn!(count = connections.len(), "closing connections on shutdown");
        let count = connections.len();
        join_all(connections.iter().map(|c| c.close())).await;
        metrics::CONNECTIONS.sub(count as i64);
    }

    pub fn len(&self) -> usize {
        self.connections.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
