use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::store::ConnectionConfig;
use crate::store::Event;
use crate::store::EventType;
use crate::store::KeyValue;
use crate::store::ResponseHeader;
use crate::store::StoreConnector;
use crate::store::StoreSession;
use crate::store::WatchOptions;
use crate::store::WatchResponse;
use crate::store::WatchSubscription;
use crate::Result;
use crate::StoreError;

type StreamItem = std::result::Result<WatchResponse, String>;

/// In-memory connector. Every successful connect yields a new [`FakeSession`].
#[derive(Default)]
pub struct FakeConnector {
    fail: Option<String>,
    attempts: AtomicUsize,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A connector whose every connect fails with `message`
    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            fail: Some(message.to_string()),
            ..Default::default()
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Session opened by the `index`th successful connect
    pub fn session(
        &self,
        index: usize,
    ) -> Arc<FakeSession> {
        self.sessions.lock()[index].clone()
    }
}

#[async_trait]
impl StoreConnector for FakeConnector {
    async fn connect(
        &self,
        _config: &ConnectionConfig,
    ) -> Result<Arc<dyn StoreSession>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail {
            return Err(StoreError::Other(message.clone()).into());
        }
        let session = Arc::new(FakeSession::default());
        self.sessions.lock().push(session.clone());
        Ok(session)
    }
}

struct FakeStream {
    options: WatchOptions,
    sender: Option<mpsc::UnboundedSender<StreamItem>>,
    cancelled: Arc<AtomicBool>,
}

/// Session whose watch streams are fed by the test
#[derive(Default)]
pub struct FakeSession {
    streams: Mutex<Vec<FakeStream>>,
    fail_watch: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl FakeSession {
    /// Make the next watch calls fail with `message`
    pub fn fail_watches(
        &self,
        message: &str,
    ) {
        *self.fail_watch.lock() = Some(message.to_string());
    }

    pub fn accept_watches(&self) {
        *self.fail_watch.lock() = None;
    }

    pub fn watch_calls(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn options(
        &self,
        stream: usize,
    ) -> WatchOptions {
        self.streams.lock()[stream].options.clone()
    }

    /// Push a response onto the `stream`th watch
    pub fn push(
        &self,
        stream: usize,
        response: WatchResponse,
    ) {
        self.send(stream, Ok(response));
    }

    /// Fail the next read on the `stream`th watch
    pub fn push_error(
        &self,
        stream: usize,
        message: &str,
    ) {
        self.send(stream, Err(message.to_string()));
    }

    /// End the `stream`th watch once its buffered responses are read
    pub fn end_stream(
        &self,
        stream: usize,
    ) {
        self.streams.lock()[stream].sender = None;
    }

    pub fn is_cancelled(
        &self,
        stream: usize,
    ) -> bool {
        self.streams.lock()[stream].cancelled.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn send(
        &self,
        stream: usize,
        item: StreamItem,
    ) {
        let streams = self.streams.lock();
        if let Some(sender) = &streams[stream].sender {
            let _ = sender.send(item);
        }
    }
}

#[async_trait]
impl StoreSession for FakeSession {
    async fn watch(
        &self,
        options: WatchOptions,
    ) -> Result<Box<dyn WatchSubscription>> {
        if let Some(message) = self.fail_watch.lock().clone() {
            return Err(StoreError::Other(message).into());
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        self.streams.lock().push(FakeStream {
            options,
            sender: Some(sender),
            cancelled: cancelled.clone(),
        });
        Ok(Box::new(FakeWatch { receiver, cancelled }))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct FakeWatch {
    receiver: mpsc::UnboundedReceiver<StreamItem>,
    cancelled: Arc<AtomicBool>,
}

#[async_trait]
impl WatchSubscription for FakeWatch {
    async fn message(&mut self) -> Result<Option<WatchResponse>> {
        match self.receiver.recv().await {
            Some(Ok(response)) => Ok(Some(response)),
            Some(Err(message)) => Err(StoreError::Other(message).into()),
            None => Ok(None),
        }
    }

    async fn cancel(&mut self) -> Result<()> {
        self.cancelled.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub fn key_value(
    key: &str,
    value: &str,
    revision: i64,
) -> KeyValue {
    KeyValue {
        key: key.as_bytes().to_vec(),
        create_revision: revision,
        mod_revision: revision,
        version: 1,
        value: value.as_bytes().to_vec(),
        lease: 0,
    }
}

pub fn put_response(
    key: &str,
    value: &str,
    revision: i64,
) -> WatchResponse {
    WatchResponse {
        header: ResponseHeader {
            revision,
            ..Default::default()
        },
        events: vec![Event {
            event_type: EventType::Put,
            kv: Some(key_value(key, value, revision)),
            prev_kv: None,
        }],
        ..Default::default()
    }
}

pub fn delete_response(
    key: &str,
    revision: i64,
) -> WatchResponse {
    WatchResponse {
        header: ResponseHeader {
            revision,
            ..Default::default()
        },
        events: vec![Event {
            event_type: EventType::Delete,
            kv: Some(key_value(key, "", revision)),
            prev_kv: None,
        }],
        ..Default::default()
    }
}

pub fn compacted_response(compact_revision: i64) -> WatchResponse {
    WatchResponse {
        compact_revision,
        canceled: true,
        ..Default::default()
    }
}
