//! Command codec
//!
//! Envelope: `{"cmd": <kind>, "client": <connection id>, "req": <body>}`.
//! Only the envelope is decoded by the dispatch loop; bodies are decoded by
//! the handler that owns the command.


use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::store::prefix_range_end;
use crate::store::WatchOptions;
use crate::store::WatchResponse;
use crate::ProtocolError;

/// Command kinds, numbered as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    NewConnection,
    CloseConnection,
    CreateWatch,
    ReceiveWatchEvent,
    CloseWatch,
    /// Reserved: key-range read
    KvRange,
    /// Reserved: single key write
    KvPut,
}

impl CommandKind {
    pub fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            0 => CommandKind::NewConnection,
            1 => CommandKind::CloseConnection,
            2 => CommandKind::CreateWatch,
            3 => CommandKind::ReceiveWatchEvent,
            4 => CommandKind::CloseWatch,
            5 => CommandKind::KvRange,
            6 => CommandKind::KvPut,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandKind::NewConnection => "NEW_CONNECTION",
            CommandKind::CloseConnection => "CLOSE_CONNECTION",
            CommandKind::CreateWatch => "CREATE_WATCH",
            CommandKind::ReceiveWatchEvent => "RECEIVE_WATCH_EVENT",
            CommandKind::CloseWatch => "CLOSE_WATCH",
            CommandKind::KvRange => "KV_RANGE",
            CommandKind::KvPut => "KV_PUT",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed envelope fields
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    pub cmd: u64,
    #[serde(default)]
    pub client: u64,
    #[serde(default)]
    pub req: Value,
}

impl Envelope {
    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::from_code(self.cmd)
    }

    /// Decode the body as `T`, attributing failures to `kind`
    pub fn body<T: DeserializeOwned>(
        &self,
        kind: CommandKind,
    ) -> Result<T, ProtocolError> {
        T::deserialize(&self.req).map_err(|source| ProtocolError::Body {
            kind: kind.name(),
            source,
        })
    }
}

pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    serde_json::from_slice(bytes).map_err(ProtocolError::Envelope)
}

/// Body of `CREATE_WATCH`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateWatchRequest {
    /// Lifetime of the watch in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
    pub key: String,
    #[serde(default)]
    pub is_prefix: Option<bool>,
    /// Explicit range end, wins over `is_prefix`
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub rev: Option<i64>,
    #[serde(default)]
    pub prev: Option<bool>,
}

impl CreateWatchRequest {
    pub fn watch_options(&self) -> WatchOptions {
        let key = self.key.as_bytes().to_vec();
        let range_end = match (&self.range, self.is_prefix) {
            (Some(range), _) => Some(range.as_bytes().to_vec()),
            (None, Some(true)) => Some(prefix_range_end(&key)),
            _ => None,
        };

        WatchOptions {
            key,
            range_end,
            start_revision: self.rev,
            prev_kv: self.prev.unwrap_or(false),
        }
    }

    pub fn lifetime(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

pub fn encode_watch_response(response: &WatchResponse) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(response).map_err(ProtocolError::Encode)
}
