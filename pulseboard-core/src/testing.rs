/*!
Scriptable doubles for the data source and the live transport

`MockSource` answers `TelemetrySource` calls from in-memory tables that tests
mutate between cycles. `MockTransport` hands out scripted `MockChannel`s; each
channel records refresh requests and lets tests inject inbound frames, either
directly through its `MockChannelHandle` or as scripted replies to refreshes.
*/

use crate::error::{SourceError, SourceResult, TransportError};
use crate::latency::PingHistory;
use crate::model::{CpuReading, HostRecord, NetworkReading, RawMetrics};
use crate::source::{LiveChannel, LiveTransport, PublicInfo, TelemetrySource};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Default)]
struct SourceTables {
    hosts: Vec<HostRecord>,
    metrics: HashMap<String, RawMetrics>,
    failing: HashSet<String>,
    list_error: Option<String>,
    version: String,
    ping: HashMap<String, PingHistory>,
    ping_error: Option<String>,
    public: Option<PublicInfo>,
}

/// In-memory `TelemetrySource`
#[derive(Clone, Default)]
pub struct MockSource {
    tables: Arc<Mutex<SourceTables>>,
    metric_calls: Arc<AtomicUsize>,
    public_calls: Arc<AtomicUsize>,
}

fn api_error(message: &str) -> SourceError {
    SourceError::Api { status: "error".into(), message: message.to_string() }
}

impl MockSource {
    pub fn new(hosts: Vec<HostRecord>) -> Self {
        let source = Self::default();
        source.tables.lock().hosts = hosts;
        source
    }

    /// Visible host record named after its id
    pub fn host(id: &str) -> HostRecord {
        HostRecord {
            uuid: id.to_string(),
            name: format!("host-{id}"),
            mem_total: 8 * 1024 * 1024 * 1024,
            disk_total: 100 * 1024 * 1024 * 1024,
            ..Default::default()
        }
    }

    /// Report with the given CPU usage and a fixed network reading
    pub fn metrics(cpu: f64) -> RawMetrics {
        RawMetrics {
            cpu: CpuReading { usage: cpu },
            network: NetworkReading { up: 100, down: 200, total_up: 1_000, total_down: 2_000 },
            uptime: 3_600,
            message: "1.0.0".to_string(),
            ..Default::default()
        }
    }

    pub fn hosts(&self) -> Vec<HostRecord> {
        self.tables.lock().hosts.clone()
    }

    pub fn set_metrics(&self, id: &str, metrics: RawMetrics) {
        let mut tables = self.tables.lock();
        tables.failing.remove(id);
        tables.metrics.insert(id.to_string(), metrics);
    }

    /// Host reports nothing, i.e. goes offline
    pub fn clear_metrics(&self, id: &str) {
        self.tables.lock().metrics.remove(id);
    }

    pub fn fail_metrics(&self, id: &str) {
        self.tables.lock().failing.insert(id.to_string());
    }

    pub fn fail_list_hosts(&self, message: &str) {
        self.tables.lock().list_error = Some(message.to_string());
    }

    pub fn set_version(&self, version: &str) {
        self.tables.lock().version = version.to_string();
    }

    pub fn set_ping_history(&self, id: &str, history: PingHistory) {
        self.tables.lock().ping.insert(id.to_string(), history);
    }

    pub fn fail_ping_history(&self, message: &str) {
        self.tables.lock().ping_error = Some(message.to_string());
    }

    pub fn set_public_info(&self, info: Option<PublicInfo>) {
        self.tables.lock().public = info;
    }

    /// Number of `current_metrics` calls so far
    pub fn metric_calls(&self) -> usize {
        self.metric_calls.load(Ordering::SeqCst)
    }

    pub fn public_calls(&self) -> usize {
        self.public_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySource for MockSource {
    async fn list_hosts(&self) -> SourceResult<Vec<HostRecord>> {
        let tables = self.tables.lock();
        match &tables.list_error {
            Some(message) => Err(api_error(message)),
            None => Ok(tables.hosts.clone()),
        }
    }

    async fn current_metrics(&self, host_id: &str) -> SourceResult<Option<RawMetrics>> {
        self.metric_calls.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.lock();
        if tables.failing.contains(host_id) {
            return Err(api_error("metrics unavailable"));
        }
        Ok(tables.metrics.get(host_id).cloned())
    }

    async fn server_version(&self) -> String {
        self.tables.lock().version.clone()
    }

    async fn ping_history(&self, host_id: &str, _window_hours: u32) -> SourceResult<PingHistory> {
        let tables = self.tables.lock();
        if let Some(message) = &tables.ping_error {
            return Err(api_error(message));
        }
        Ok(tables.ping.get(host_id).cloned().unwrap_or_default())
    }

    async fn public_info(&self) -> SourceResult<PublicInfo> {
        self.public_calls.fetch_add(1, Ordering::SeqCst);
        self.tables.lock().public.clone().ok_or_else(|| api_error("public info unavailable"))
    }
}

/// Push frame of `{status: success, data: {online, data}}` with one CPU reading per host
pub fn live_frame(online: &[&str], cpu: &[(&str, f64)]) -> String {
    let data: serde_json::Map<String, serde_json::Value> = cpu
        .iter()
        .map(|(id, usage)| {
            (
                id.to_string(),
                serde_json::json!({
                    "cpu": { "usage": usage },
                    "network": { "up": 100, "down": 200, "totalUp": 1000, "totalDown": 2000 },
                    "uptime": 3600,
                    "message": "1.0.0"
                }),
            )
        })
        .collect();
    serde_json::json!({ "status": "success", "data": { "online": online, "data": data } }).to_string()
}

/// What a `MockChannel` yields next
#[derive(Debug, Clone)]
pub enum MockFrame {
    Text(String),
    Error(TransportError),
    Close,
}

#[derive(Default)]
struct ChannelShared {
    refreshes: AtomicUsize,
    closed: AtomicBool,
    replies: Mutex<VecDeque<MockFrame>>,
    refresh_error: Mutex<Option<TransportError>>,
}

/// Scripted `LiveChannel`
pub struct MockChannel {
    rx: mpsc::UnboundedReceiver<MockFrame>,
    tx: mpsc::UnboundedSender<MockFrame>,
    shared: Arc<ChannelShared>,
    ended: bool,
}

/// Test-side handle of a `MockChannel`
#[derive(Clone)]
pub struct MockChannelHandle {
    tx: mpsc::UnboundedSender<MockFrame>,
    shared: Arc<ChannelShared>,
}

impl MockChannel {
    pub fn new() -> (Self, MockChannelHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ChannelShared::default());
        let handle = MockChannelHandle { tx: tx.clone(), shared: Arc::clone(&shared) };
        (Self { rx, tx, shared, ended: false }, handle)
    }
}

impl MockChannelHandle {
    /// Deliver a frame right away
    pub fn push(&self, frame: MockFrame) {
        if self.tx.send(frame).is_err() {
            debug!("[MOCK] channel dropped, frame discarded");
        }
    }

    /// Queue a frame to be delivered in answer to the next refresh request
    pub fn reply(&self, frame: MockFrame) {
        self.shared.replies.lock().push_back(frame);
    }

    /// Make the next refresh request fail with `error`
    pub fn fail_next_refresh(&self, error: TransportError) {
        *self.shared.refresh_error.lock() = Some(error);
    }

    pub fn refresh_count(&self) -> usize {
        self.shared.refreshes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveChannel for MockChannel {
    async fn request_refresh(&mut self) -> Result<(), TransportError> {
        if self.ended || self.shared.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if let Some(error) = self.shared.refresh_error.lock().take() {
            return Err(error);
        }
        self.shared.refreshes.fetch_add(1, Ordering::SeqCst);
        let reply = self.shared.replies.lock().pop_front();
        if let Some(frame) = reply {
            let _ = self.tx.send(frame);
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        if self.ended {
            return None;
        }
        match self.rx.recv().await {
            Some(MockFrame::Text(text)) => Some(Ok(text)),
            Some(MockFrame::Error(e)) => Some(Err(e)),
            Some(MockFrame::Close) | None => {
                self.ended = true;
                None
            }
        }
    }

    async fn close(&mut self) {
        self.ended = true;
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

/// Scripted `LiveTransport`: each `open` takes the next scripted result
pub struct MockTransport {
    script: Mutex<VecDeque<Result<MockChannel, TransportError>>>,
    exhausted: TransportError,
    opens: AtomicUsize,
}

impl MockTransport {
    /// Transport whose `open` fails with a connect error once the script runs out
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            exhausted: TransportError::Connect("connection refused".into()),
            opens: AtomicUsize::new(0),
        }
    }

    /// Transport that can never be used
    pub fn unsupported() -> Self {
        Self {
            exhausted: TransportError::Unsupported("mock transport unsupported".into()),
            ..Self::new()
        }
    }

    /// Script a successful open and return the handle of the new channel
    pub fn push_channel(&self) -> MockChannelHandle {
        let (channel, handle) = MockChannel::new();
        self.script.lock().push_back(Ok(channel));
        handle
    }

    pub fn push_error(&self, error: TransportError) {
        self.script.lock().push_back(Err(error));
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveTransport for MockTransport {
    async fn open(&self) -> Result<Box<dyn LiveChannel>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(channel)) => Ok(Box::new(channel)),
            Some(Err(e)) => Err(e),
            None => Err(self.exhausted.clone()),
        }
    }
}
