use std::io;
use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use etcd_bridge::store::ConnectionConfig;
use etcd_bridge::store::Event;
use etcd_bridge::store::EventType;
use etcd_bridge::store::KeyValue;
use etcd_bridge::store::ResponseHeader;
use etcd_bridge::store::StoreConnector;
use etcd_bridge::store::StoreSession;
use etcd_bridge::store::WatchOptions;
use etcd_bridge::store::WatchResponse;
use etcd_bridge::store::WatchSubscription;
use etcd_bridge::Result;
use parking_lot::Mutex;
use tokio::sync::mpsc;

struct Watcher {
    options: WatchOptions,
    sender: mpsc::UnboundedSender<WatchResponse>,
}

impl Watcher {
    fn matches(
        &self,
        key: &[u8],
    ) -> bool {
        match &self.options.range_end {
            None => key == self.options.key.as_slice(),
            Some(end) => key >= self.options.key.as_slice() && key < end.as_slice(),
        }
    }
}

/// A single-node in-memory store that fans puts out to matching watchers
#[derive(Default)]
pub struct MemoryStore {
    revision: Mutex<i64>,
    watchers: Mutex<Vec<Watcher>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(
        &self,
        key: &str,
        value: &str,
    ) -> i64 {
        let revision = {
            let mut revision = self.revision.lock();
            *revision += 1;
            *revision
        };
        let response = WatchResponse {
            header: ResponseHeader {
                revision,
                ..Default::default()
            },
            events: vec![Event {
                event_type: EventType::Put,
                kv: Some(KeyValue {
                    key: key.as_bytes().to_vec(),
                    create_revision: revision,
                    mod_revision: revision,
                    version: 1,
                    value: value.as_bytes().to_vec(),
                    lease: 0,
                }),
                prev_kv: None,
            }],
            ..Default::default()
        };

        let mut watchers = self.watchers.lock();
        watchers.retain(|w| !w.sender.is_closed());
        for watcher in watchers.iter().filter(|w| w.matches(key.as_bytes())) {
            let _ = watcher.sender.send(response.clone());
        }
        revision
    }

    pub fn watcher_count(&self) -> usize {
        let mut watchers = self.watchers.lock();
        watchers.retain(|w| !w.sender.is_closed());
        watchers.len()
    }
}

pub struct MemoryConnector {
    store: Arc<MemoryStore>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self { store })
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn StoreSession>> {
        config.validate()?;
        Ok(Arc::new(MemorySession {
            store: self.store.clone(),
        }))
    }
}

struct MemorySession {
    store: Arc<MemoryStore>,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn watch(
        &self,
        options: WatchOptions,
    ) -> Result<Box<dyn WatchSubscription>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.store.watchers.lock().push(Watcher { options, sender });
        Ok(Box::new(MemoryWatch { receiver }))
    }

    async fn close(&self) {}
}

struct MemoryWatch {
    receiver: mpsc::UnboundedReceiver<WatchResponse>,
}

#[async_trait]
impl WatchSubscription for MemoryWatch {
    async fn message(&mut self) -> Result<Option<WatchResponse>> {
        Ok(self.receiver.recv().await)
    }

    async fn cancel(&mut self) -> Result<()> {
        self.receiver.close();
        Ok(())
    }
}

/// Clonable in-memory writer for the stdio host
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuf {
    fn write(
        &mut self,
        buf: &[u8],
    ) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
