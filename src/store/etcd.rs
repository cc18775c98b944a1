use std::sync::Arc;

use async_trait::async_trait;
use etcd_client::Certificate;
use etcd_client::Client;
use etcd_client::ConnectOptions;
use etcd_client::Identity;
use etcd_client::TlsOptions;
use etcd_client::WatchStream;
use etcd_client::Watcher;
use tracing::debug;

use super::ConnectionConfig;
use super::Event;
use super::EventType;
use super::KeyValue;
use super::ResolvedConnection;
use super::ResponseHeader;
use super::StoreConnector;
use super::StoreSession;
use super::TlsFiles;
use super::WatchOptions;
use super::WatchResponse;
use super::WatchSubscription;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::Error;
use crate::Result;
use crate::StoreConfig;
use crate::StoreError;

/// Opens sessions with the `etcd-client` crate
pub struct EtcdConnector {
    defaults: StoreConfig,
}

impl EtcdConnector {
    pub fn new(defaults: StoreConfig) -> Self {
        Self { defaults }
    }
}

#[async_trait]
impl StoreConnector for EtcdConnector {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn StoreSession>> {
        let resolved = config.resolve(&self.defaults)?;
        let options = connect_options(&resolved).await?;
        let endpoints = resolved.endpoints;

        let client = task_with_timeout_and_exponential_backoff(
            || {
                let endpoints = endpoints.clone();
                let options = options.clone();
                async move {
                    Client::connect(endpoints, Some(options))
                        .await
                        .map_err(|e| Error::from(StoreError::Client(e)))
                }
            },
            self.defaults.connect_retry,
        )
        .await?;

        Ok(Arc::new(EtcdSession { client }))
    }
}

async fn connect_options(resolved: &ResolvedConnection) -> Result<ConnectOptions> {
    let mut options = ConnectOptions::new().with_connect_timeout(resolved.dial_timeout);

    if let Some((user, password)) = &resolved.credentials {
        options = options.with_user(user.clone(), password.clone());
    }
    if let Some(timeout) = resolved.request_timeout {
        options = options.with_timeout(timeout);
    }
    if let Some((interval, timeout)) = resolved.keep_alive {
        options = options.with_keep_alive(interval, timeout);
    }
    if let Some(tls) = &resolved.tls {
        options = options.with_tls(tls_options(tls).await?);
    }

    Ok(options)
}

async fn tls_options(files: &TlsFiles) -> Result<TlsOptions> {
    let mut tls = TlsOptions::new();

    if let Some(ca) = &files.ca_file {
        tls = tls.ca_certificate(Certificate::from_pem(read_pem(ca).await?));
    }
    if let (Some(cert), Some(key)) = (&files.cert_file, &files.key_file) {
        tls = tls.identity(Identity::from_pem(read_pem(cert).await?, read_pem(key).await?));
    }
    if let Some(domain) = &files.domain {
        tls = tls.domain_name(domain.clone());
    }

    Ok(tls)
}

async fn read_pem(path: &str) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|source| {
        Error::from(StoreError::TlsFile {
            path: path.to_string(),
            source,
        })
    })
}

struct EtcdSession {
    client: Client,
}

#[async_trait]
impl StoreSession for EtcdSession {
    async fn watch(
        &self,
        options: WatchOptions,
    ) -> Result<Box<dyn WatchSubscription>> {
        let mut watch_options = etcd_client::WatchOptions::new();
        if let Some(end) = options.range_end {
            watch_options = watch_options.with_range(end);
        }
        if let Some(revision) = options.start_revision {
            watch_options = watch_options.with_start_revision(revision);
        }
        if options.prev_kv {
            watch_options = watch_options.with_prev_key();
        }

        // The client multiplexes over one channel; clones are cheap.
        let mut client = self.client.clone();
        let (watcher, stream) = client
            .watch(options.key, Some(watch_options))
            .await
            .map_err(StoreError::Client)?;

        debug!(watch_id = watcher.watch_id(), "store watch opened");
        Ok(Box::new(EtcdWatch { watcher, stream }))
    }

    async fn close(&self) {
        // The gRPC channel is released when the last client clone drops.
        debug!("store session closed");
    }
}

struct EtcdWatch {
    watcher: Watcher,
    stream: WatchStream,
}

#[async_trait]
impl WatchSubscription for EtcdWatch {
    async fn message(&mut self) -> Result<Option<WatchResponse>> {
        let message = self.stream.message().await.map_err(StoreError::Client)?;
        Ok(message.as_ref().map(convert_response))
    }

    async fn cancel(&mut self) -> Result<()> {
        self.watcher.cancel().await.map_err(StoreError::Client)?;
        Ok(())
    }
}

fn convert_response(response: &etcd_client::WatchResponse) -> WatchResponse {
    WatchResponse {
        header: response
            .header()
            .map(|h| ResponseHeader {
                cluster_id: h.cluster_id(),
                member_id: h.member_id(),
                revision: h.revision(),
                raft_term: h.raft_term(),
            })
            .unwrap_or_default(),
        events: response.events().iter().map(convert_event).collect(),
        compact_revision: response.compact_revision(),
        canceled: response.canceled(),
        created: response.created(),
        cancel_reason: response.cancel_reason().to_string(),
    }
}

fn convert_event(event: &etcd_client::Event) -> Event {
    Event {
        event_type: match event.event_type() {
            etcd_client::EventType::Put => EventType::Put,
            etcd_client::EventType::Delete => EventType::Delete,
        },
        kv: event.kv().map(convert_kv),
        prev_kv: event.prev_kv().map(convert_kv),
    }
}

fn convert_kv(kv: &etcd_client::KeyValue) -> KeyValue {
    KeyValue {
        key: kv.key().to_vec(),
        create_revision: kv.create_revision(),
        mod_revision: kv.mod_revision(),
        version: kv.version(),
        value: kv.value().to_vec(),
        lease: kv.lease(),
    }
}
