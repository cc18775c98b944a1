use std::sync::Arc;

use tracing::debug;

use crate::codec::CommandKind;
use crate::codec::CreateWatchRequest;
use crate::codec::Envelope;
use crate::registry::ConnectionRegistry;
use crate::registry::INVALID_CONNECTION;
use crate::store::ConnectionConfig;
use crate::Result;
use crate::StoreError;

pub(super) async fn new_connection(
    registry: Arc<ConnectionRegistry>,
    envelope: Envelope,
) -> Result<String> {
    let config: ConnectionConfig = envelope.body(CommandKind::NewConnection)?;
    let id = registry.create(&config).await?;
    Ok(id.to_string())
}

/// Unknown ids are a no-op success
pub(super) async fn close_connection(
    registry: Arc<ConnectionRegistry>,
    envelope: Envelope,
) -> Result<String> {
    registry.close(envelope.client).await;
    Ok(String::new())
}

pub(super) async fn create_watch(
    registry: Arc<ConnectionRegistry>,
    envelope: Envelope,
) -> Result<String> {
    let request: CreateWatchRequest = envelope.body(CommandKind::CreateWatch)?;
    let connection = registry
        .get(envelope.client)
        .ok_or_else(|| StoreError::Other(INVALID_CONNECTION.to_string()))?;

    let watch_id = connection
        .create_watch(request.watch_options(), request.lifetime())
        .await?;
    Ok(watch_id.to_string())
}

/// Unknown connections and watches are a no-op success
pub(super) async fn close_watch(
    registry: Arc<ConnectionRegistry>,
    envelope: Envelope,
) -> Result<String> {
    let watch_id: u64 = envelope.body(CommandKind::CloseWatch)?;
    match registry.get(envelope.client) {
        Some(connection) => {
            if !connection.close_watch(watch_id).await {
                debug!(connection_id = envelope.client, watch_id, "close on unknown watch");
            }
        }
        None => debug!(connection_id = envelope.client, watch_id, "close watch on unknown connection"),
    }
    Ok(String::new())
}
