use std::time::Duration;

use serde::Deserialize;

use crate::ProtocolError;
use crate::Result;
use crate::StoreConfig;

/// Body of a `NEW_CONNECTION` command.
///
/// Mirrors the JSON form of the etcd client configuration: dash-separated
/// field names and durations in nanoseconds. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub endpoints: Vec<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default, rename = "dial-timeout")]
    pub dial_timeout_ns: Option<u64>,

    #[serde(default, rename = "dial-keep-alive-time")]
    pub keep_alive_time_ns: Option<u64>,

    #[serde(default, rename = "dial-keep-alive-timeout")]
    pub keep_alive_timeout_ns: Option<u64>,

    #[serde(default, rename = "request-timeout")]
    pub request_timeout_ns: Option<u64>,

    #[serde(default)]
    pub tls: Option<TlsFiles>,
}

/// PEM files used to secure the session
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TlsFiles {
    #[serde(default)]
    pub ca_file: Option<String>,
    #[serde(default)]
    pub cert_file: Option<String>,
    #[serde(default)]
    pub key_file: Option<String>,
    /// Server name to verify instead of the endpoint host
    #[serde(default)]
    pub domain: Option<String>,
}

/// Connection settings after applying process-wide defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    pub endpoints: Vec<String>,
    pub credentials: Option<(String, String)>,
    pub dial_timeout: Duration,
    pub request_timeout: Option<Duration>,
    pub keep_alive: Option<(Duration, Duration)>,
    pub tls: Option<TlsFiles>,
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(ProtocolError::ConnectionConfig("no endpoints configured".into()).into());
        }
        if self.endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(ProtocolError::ConnectionConfig("empty endpoint".into()).into());
        }
        if let Some(tls) = &self.tls {
            if tls.cert_file.is_some() != tls.key_file.is_some() {
                return Err(ProtocolError::ConnectionConfig(
                    "tls cert_file and key_file must be set together".into(),
                )
                .into());
            }
        }
        Ok(())
    }

    /// Fill in unset fields from `defaults`. Zero durations count as unset,
    /// matching the etcd client.
    pub fn resolve(
        &self,
        defaults: &StoreConfig,
    ) -> Result<ResolvedConnection> {
        self.validate()?;

        let credentials = match (&self.username, &self.password) {
            (Some(user), password) if !user.is_empty() => {
                Some((user.clone(), password.clone().unwrap_or_default()))
            }
            _ => None,
        };

        let keep_alive = match nanos(self.keep_alive_time_ns) {
            Some(interval) => Some((
                interval,
                nanos(self.keep_alive_timeout_ns)
                    .unwrap_or_else(|| Duration::from_millis(defaults.keep_alive_timeout_ms)),
            )),
            None => defaults.keep_alive(),
        };

        Ok(ResolvedConnection {
            endpoints: self.endpoints.clone(),
            credentials,
            dial_timeout: nanos(self.dial_timeout_ns).unwrap_or_else(|| defaults.dial_timeout()),
            request_timeout: nanos(self.request_timeout_ns).or_else(|| defaults.request_timeout()),
            keep_alive,
            tls: self.tls.clone(),
        })
    }
}

fn nanos(value: Option<u64>) -> Option<Duration> {
    value.filter(|n| *n > 0).map(Duration::from_nanos)
}
