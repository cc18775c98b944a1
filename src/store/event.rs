//! Watch responses as delivered to the host.
//!
//! Field names and layout follow the JSON encoding of the etcd Go client's
//! watch response, so existing host-side decoders keep working. Byte strings
//! are base64 encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde::Serializer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "DELETE")]
    Delete,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseHeader {
    pub cluster_id: u64,
    pub member_id: u64,
    pub revision: i64,
    pub raft_term: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyValue {
    #[serde(serialize_with = "as_base64")]
    pub key: Vec<u8>,
    pub create_revision: i64,
    pub mod_revision: i64,
    pub version: i64,
    #[serde(serialize_with = "as_base64")]
    pub value: Vec<u8>,
    pub lease: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub kv: Option<KeyValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_kv: Option<KeyValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WatchResponse {
    pub header: ResponseHeader,
    pub events: Vec<Event>,
    pub compact_revision: i64,
    pub canceled: bool,
    pub created: bool,
    #[serde(skip)]
    pub cancel_reason: String,
}

pub const ERR_COMPACTED: &str = "mvcc: required revision has been compacted";

impl WatchResponse {
    /// Error carried by the response itself, if any.
    ///
    /// A compacted start revision and a server-side cancel are both reported
    /// in-band by the store instead of failing the stream.
    pub fn error(&self) -> Option<String> {
        if self.compact_revision != 0 {
            return Some(ERR_COMPACTED.to_string());
        }
        if self.canceled {
            if self.cancel_reason.is_empty() {
                return Some("watch canceled".to_string());
            }
            return Some(self.cancel_reason.clone());
        }
        None
    }
}

fn as_base64<S: Serializer>(
    bytes: &[u8],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}
