//! Store adapter
//!
//! Thin seam over the store client library. The registries only see these
//! traits; [`EtcdConnector`] is the production implementation.

mod connection_config;
mod etcd;
mod event;

pub use connection_config::*;
pub use etcd::*;
pub use event::*;


use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Options for a single watch subscription
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
    pub key: Vec<u8>,
    /// Exclusive end of the watched range. `None` watches `key` alone.
    pub range_end: Option<Vec<u8>>,
    pub start_revision: Option<i64>,
    pub prev_kv: bool,
}

/// Opens store sessions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StoreConnector: Send + Sync + 'static {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn StoreSession>>;
}

/// One open client session
#[async_trait]
pub trait StoreSession: Send + Sync + 'static {
    async fn watch(
        &self,
        options: WatchOptions,
    ) -> Result<Box<dyn WatchSubscription>>;

    /// Release the session. Called once, after every watch is closed.
    async fn close(&self);
}

/// A live watch stream
#[async_trait]
pub trait WatchSubscription: Send + 'static {
    /// Next response from the stream; `Ok(None)` once the stream has ended.
    async fn message(&mut self) -> Result<Option<WatchResponse>>;

    /// Ask the store to stop the watch
    async fn cancel(&mut self) -> Result<()>;
}

/// End of the range covering every key that starts with `key`.
///
/// Trailing `0xff` bytes are dropped and the last remaining byte is
/// incremented. An empty key, or one made only of `0xff` bytes, has no
/// successor; the result is `[0]`, which the store reads as "every key
/// from `key` onward".
pub fn prefix_range_end(key: &[u8]) -> Vec<u8> {
    let mut end = key.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}
