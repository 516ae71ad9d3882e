//! Data source seams.
//!
//! - `TelemetrySource`: request/response calls against the monitoring backend
//! - `LiveTransport` / `LiveChannel`: the streaming push channel
//!
//! The scheduler only talks to these traits, so tests swap in the mocks
//! from `crate::testing`.

mod komari;
mod ws;

pub use komari::KomariClient;
pub use ws::{WsChannel, WsTransport};

use crate::error::{SourceResult, TransportError};
use crate::latency::PingHistory;
use crate::model::{HostRecord, LiveUpdate, RawMetrics};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Public site settings (`GET /api/public`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicInfo {
    pub sitename: String,
    pub description: String,
    pub theme: String,
    pub theme_settings: Option<serde_json::Map<String, Value>>,
    pub private_site: bool,
    pub record_enabled: bool,
    pub record_preserve_time: u64,
    pub ping_record_preserve_time: u64,
}

impl PublicInfo {
    /// Typed theme setting with a fallback
    pub fn theme_setting<T: serde::de::DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.theme_settings
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(default)
    }
}

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Full host membership
    async fn list_hosts(&self) -> SourceResult<Vec<HostRecord>>;

    /// Latest report for one host; `None` means offline
    async fn current_metrics(&self, host_id: &str) -> SourceResult<Option<RawMetrics>>;

    /// Backend version, "" on any failure
    async fn server_version(&self) -> String;

    /// Ping records of the last `window_hours`; no tasks is an empty result
    async fn ping_history(&self, host_id: &str, window_hours: u32) -> SourceResult<PingHistory>;

    async fn public_info(&self) -> SourceResult<PublicInfo>;
}

#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open a push channel. `TransportError::Unsupported` means this
    /// transport can never work here.
    async fn open(&self) -> Result<Box<dyn LiveChannel>, TransportError>;
}

#[async_trait]
pub trait LiveChannel: Send {
    /// Ask the server for the current state
    async fn request_refresh(&mut self) -> Result<(), TransportError>;

    /// Next text frame; `None` once the channel is closed. Must be cancel safe.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self);
}

/// Fetch every host's latest report concurrently.
///
/// A host whose fetch fails or has no report is offline; one failure never
/// fails the whole snapshot.
pub async fn fetch_snapshot<S>(source: &S, hosts: &[HostRecord]) -> LiveUpdate
where
    S: TelemetrySource + ?Sized,
{
    let results = join_all(hosts.iter().map(|h| source.current_metrics(&h.uuid))).await;
    let mut update = LiveUpdate::default();
    for (host, result) in hosts.iter().zip(results) {
        match result {
            Ok(Some(metrics)) => update.insert(host.uuid.clone(), metrics),
            Ok(None) => {}
            Err(e) => debug!("Metrics fetch failed for {}: {}", host.uuid, e),
        }
    }
    update
}
