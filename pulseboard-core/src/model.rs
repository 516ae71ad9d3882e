//! Data model: backend wire records and the immutable dashboard views built from them.
//!
//! Wire records (`HostRecord`, `RawMetrics`, `LiveMessage`) mirror the
//! monitoring backend's JSON and default every missing field. View types
//! (`HostSnapshot`, `FleetSummary`, `HistoryEntry`) are what the store
//! publishes; once published they are shared through `Arc` and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Backend response envelope
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// One entry of the authoritative host list (`GET /api/nodes`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostRecord {
    pub uuid: String,
    pub name: String,
    pub cpu_name: String,
    pub virtualization: String,
    pub arch: String,
    pub cpu_cores: u32,
    pub os: String,
    pub kernel_version: String,
    pub gpu_name: String,
    pub region: String,
    pub public_remark: Option<String>,
    pub mem_total: u64,
    pub swap_total: u64,
    pub disk_total: u64,
    pub weight: i64,
    pub group: String,
    pub tags: String,
    pub hidden: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CpuReading {
    pub usage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UsageReading {
    pub total: u64,
    pub used: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoadReading {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetworkReading {
    pub up: u64,
    pub down: u64,
    #[serde(rename = "totalUp")]
    pub total_up: u64,
    #[serde(rename = "totalDown")]
    pub total_down: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionReading {
    pub tcp: u64,
    pub udp: u64,
}

/// One raw telemetry report for a host (`GET /api/recent/{uuid}` or a live frame)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawMetrics {
    pub cpu: CpuReading,
    pub ram: UsageReading,
    pub swap: UsageReading,
    pub load: LoadReading,
    pub disk: UsageReading,
    pub network: NetworkReading,
    pub connections: ConnectionReading,
    pub uptime: u64,
    pub process: u64,
    /// Agent version string
    pub message: String,
    pub updated_at: String,
}

/// Payload of one live frame (`{"status":"success","data":{...}}`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LiveData {
    pub online: Vec<String>,
    pub data: HashMap<String, RawMetrics>,
}

#[derive(Debug, Deserialize)]
pub struct LiveMessage {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: LiveData,
}

/// One update cycle's worth of telemetry, whatever transport delivered it
#[derive(Debug, Clone, Default)]
pub struct LiveUpdate {
    pub online: HashSet<String>,
    pub metrics: HashMap<String, RawMetrics>,
}

impl LiveUpdate {
    /// Decode a push frame. Non-success envelopes yield `None`.
    pub fn from_frame(frame: &str) -> Result<Option<Self>, serde_json::Error> {
        let msg: LiveMessage = serde_json::from_str(frame)?;
        if msg.status != "success" {
            return Ok(None);
        }
        Ok(Some(LiveUpdate {
            online: msg.data.online.into_iter().collect(),
            metrics: msg.data.data,
        }))
    }

    /// Record a host's latest report; a host with a report is online
    pub fn insert(&mut self, id: impl Into<String>, metrics: RawMetrics) {
        let id = id.into();
        self.online.insert(id.clone());
        self.metrics.insert(id, metrics);
    }
}

/// Static description of a host's hardware, copied from its `HostRecord`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostHardware {
    pub os: String,
    pub kernel: String,
    pub cpu: String,
    pub cpu_cores: u32,
    pub gpu: String,
    pub arch: String,
    pub virtualization: String,
    pub mem_total: u64,
    pub swap_total: u64,
    pub disk_total: u64,
}

/// Point-in-time gauges for a host. All zero when the host is offline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostStatus {
    pub cpu: f64,
    pub mem_used: u64,
    pub swap_used: u64,
    pub disk_used: u64,
    pub net_in_speed: u64,
    pub net_out_speed: u64,
    pub net_in_transfer: u64,
    pub net_out_transfer: u64,
    pub uptime: u64,
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    pub tcp_conn: u64,
    pub udp_conn: u64,
    pub process: u64,
}

/// One host's state at one instant
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostSnapshot {
    pub id: String,
    pub name: String,
    pub online: bool,
    pub group: String,
    pub tags: String,
    pub weight: i64,
    pub region: String,
    pub public_remark: Option<String>,
    pub hardware: HostHardware,
    pub status: HostStatus,
    pub updated_at: String,
    pub version: String,
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (used as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

impl HostSnapshot {
    pub fn mem_percent(&self) -> f64 {
        percent(self.status.mem_used, self.hardware.mem_total)
    }

    pub fn swap_percent(&self) -> f64 {
        percent(self.status.swap_used, self.hardware.swap_total)
    }

    pub fn disk_percent(&self) -> f64 {
        percent(self.status.disk_used, self.hardware.disk_total)
    }

    /// Combined instantaneous in+out rate
    pub fn total_speed(&self) -> u64 {
        self.status.net_in_speed.saturating_add(self.status.net_out_speed)
    }
}

/// Fleet-wide aggregate at one instant.
///
/// Invariant: `online + offline == total == servers.len()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub total_in_speed: u64,
    pub total_out_speed: u64,
    pub total_in_transfer: u64,
    pub total_out_transfer: u64,
    pub servers: Vec<Arc<HostSnapshot>>,
}

impl FleetSummary {
    pub fn host(&self, id: &str) -> Option<&Arc<HostSnapshot>> {
        self.servers.iter().find(|s| s.id == id)
    }
}

/// One retained summary for short-window charts
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub summary: Arc<FleetSummary>,
}

impl HistoryEntry {
    pub fn new(summary: Arc<FleetSummary>) -> Self {
        Self { timestamp: Utc::now(), summary }
    }
}

/// One host's gauges taken from one history entry, for per-host charts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostSample {
    pub timestamp: DateTime<Utc>,
    pub online: bool,
    pub cpu: f64,
    pub mem_used: u64,
    pub mem_percent: f64,
    pub swap_used: u64,
    pub disk_used: u64,
    pub disk_percent: f64,
    pub net_in_speed: u64,
    pub net_out_speed: u64,
    pub load1: f64,
    pub tcp_conn: u64,
    pub udp_conn: u64,
    pub process: u64,
}

impl HostSample {
    pub fn new(timestamp: DateTime<Utc>, host: &HostSnapshot) -> Self {
        let status = &host.status;
        Self {
            timestamp,
            online: host.online,
            cpu: status.cpu,
            mem_used: status.mem_used,
            mem_percent: host.mem_percent(),
            swap_used: status.swap_used,
            disk_used: status.disk_used,
            disk_percent: host.disk_percent(),
            net_in_speed: status.net_in_speed,
            net_out_speed: status.net_out_speed,
            load1: status.load1,
            tcp_conn: status.tcp_conn,
            udp_conn: status.udp_conn,
            process: status.process,
        }
    }
}
