/**
 * LIVE UPDATE SCHEDULER - Drives reconciliation from the backend into the store
 *
 * ROLE: the single writer of the dashboard store. Bootstraps the first
 * summary, then keeps it current over the push channel, reconnecting after a
 * fixed backoff when the channel drops. A transport that can never work here
 * switches to fixed-interval polling for good.
 *
 * STATES: Connecting -> Live -> Reconnecting -> Live ...
 *         Connecting -> Polling (transport unsupported)
 *
 * TEARDOWN: `SchedulerHandle::cancel` takes the publish gate, so once it
 * returns no write can reach the store. The task then closes its channel.
 * Listeners run after the gate is released and may cancel the scheduler.
 */

use crate::aggregator::{append_history, reconcile_update};
use crate::config::LiveConfig;
use crate::model::{HistoryEntry, HostRecord, LiveUpdate};
use crate::source::{fetch_snapshot, LiveChannel, LiveTransport, TelemetrySource};
use crate::store::{DashboardState, DashboardStore, LinkState};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Cancellation plus the lock every store write is made under
#[derive(Clone, Default)]
struct Gate {
    cancel: CancellationToken,
    lock: Arc<Mutex<()>>,
}

impl Gate {
    fn close(&self) {
        let _guard = self.lock.lock();
        self.cancel.cancel();
    }
}

/// Why a push session ended
enum SessionEnd {
    Cancelled,
    Lost,
}

enum Step {
    Cancelled,
    Refresh,
    Frame(Option<Result<String, crate::error::TransportError>>),
}

pub struct Scheduler {
    source: Arc<dyn TelemetrySource>,
    transport: Arc<dyn LiveTransport>,
    store: DashboardStore,
    config: LiveConfig,
    gate: Gate,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        transport: Arc<dyn LiveTransport>,
        store: DashboardStore,
        config: LiveConfig,
    ) -> Self {
        Self { source, transport, store, config, gate: Gate::default() }
    }

    /// Run on the current runtime until cancelled
    pub fn spawn(self) -> SchedulerHandle {
        let gate = self.gate.clone();
        let join = tokio::spawn(self.run());
        SchedulerHandle { gate, join: Mutex::new(Some(join)) }
    }

    pub async fn run(self) {
        let cancel = self.gate.cancel.clone();
        let hosts = tokio::select! {
            _ = cancel.cancelled() => None,
            hosts = self.bootstrap() => hosts,
        };
        let Some(hosts) = hosts else {
            return;
        };

        loop {
            let opened = tokio::select! {
                _ = cancel.cancelled() => return,
                opened = self.transport.open() => opened,
            };

            match opened {
                Ok(mut channel) => {
                    info!("Live updates connected");
                    self.set_link(LinkState::Live);
                    let end = self.stream(&hosts, channel.as_mut()).await;
                    channel.close().await;
                    if let SessionEnd::Cancelled = end {
                        return;
                    }
                }
                Err(e) if e.is_unsupported() => {
                    info!("Live transport unavailable ({}), polling every {:?}", e, self.config.poll_interval());
                    self.poll(&hosts).await;
                    return;
                }
                Err(e) => debug!("Live transport failed: {}", e),
            }

            self.publish(|s| DashboardState {
                link: LinkState::Reconnecting,
                reconnects: s.reconnects.saturating_add(1),
                ..s.clone()
            });
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(self.config.reconnect_backoff()) => {}
            }
        }
    }

    /// Host list, server version and the first snapshot.
    ///
    /// A host list failure is terminal for the session.
    async fn bootstrap(&self) -> Option<Vec<HostRecord>> {
        let (hosts, version) = tokio::join!(self.source.list_hosts(), self.source.server_version());
        let hosts = match hosts {
            Ok(hosts) => hosts,
            Err(e) => {
                error!("Initial host list fetch failed: {}", e);
                self.publish(|s| DashboardState {
                    loading: false,
                    error: Some(e.to_string()),
                    server_version: version.clone(),
                    ..s.clone()
                });
                return None;
            }
        };

        let update = fetch_snapshot(self.source.as_ref(), &hosts).await;
        info!("Initial snapshot: {} hosts, {} online", hosts.len(), update.online.len());
        self.publish(|s| DashboardState { server_version: version.clone(), ..s.clone() });
        self.apply(&hosts, &update);
        Some(hosts)
    }

    async fn stream(&self, hosts: &[HostRecord], channel: &mut dyn LiveChannel) -> SessionEnd {
        let mut ticker = interval(self.config.refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                _ = self.gate.cancel.cancelled() => Step::Cancelled,
                _ = ticker.tick() => Step::Refresh,
                frame = channel.next_frame() => Step::Frame(frame),
            };

            match step {
                Step::Cancelled => return SessionEnd::Cancelled,
                Step::Refresh => {
                    if let Err(e) = channel.request_refresh().await {
                        debug!("Refresh request failed: {}", e);
                        return SessionEnd::Lost;
                    }
                }
                Step::Frame(None) => {
                    debug!("Live channel closed");
                    return SessionEnd::Lost;
                }
                Step::Frame(Some(Err(e))) => {
                    debug!("Live channel error: {}", e);
                    return SessionEnd::Lost;
                }
                Step::Frame(Some(Ok(text))) => match LiveUpdate::from_frame(&text) {
                    Ok(Some(update)) => self.apply(hosts, &update),
                    Ok(None) => debug!("Skipping non-success live frame"),
                    Err(e) => debug!("Skipping undecodable live frame: {}", e),
                },
            }
        }
    }

    async fn poll(&self, hosts: &[HostRecord]) {
        self.set_link(LinkState::Polling);
        let period = self.config.poll_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.gate.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let update = tokio::select! {
                _ = self.gate.cancel.cancelled() => return,
                update = fetch_snapshot(self.source.as_ref(), hosts) => update,
            };
            self.apply(hosts, &update);
        }
    }

    /// Reconcile one cycle and push it, with its history entry, to the store
    fn apply(&self, hosts: &[HostRecord], update: &LiveUpdate) {
        let capacity = self.config.history_capacity;
        self.publish(|s| {
            let summary = Arc::new(reconcile_update(hosts, update, s.summary.as_deref()));
            let history = append_history(&s.history, HistoryEntry::new(Arc::clone(&summary)), capacity);
            DashboardState {
                summary: Some(summary),
                history,
                loading: false,
                error: None,
                ..s.clone()
            }
        });
    }

    fn set_link(&self, link: LinkState) {
        if self.store.get().link != link {
            self.publish(|s| DashboardState { link, ..s.clone() });
        }
    }

    /// Write to the store unless cancelled, then notify outside the gate
    fn publish<F>(&self, f: F)
    where
        F: FnOnce(&DashboardState) -> DashboardState,
    {
        let next = {
            let _guard = self.gate.lock.lock();
            if self.gate.cancel.is_cancelled() {
                debug!("Scheduler cancelled, update dropped");
                return;
            }
            self.store.update_quiet(f)
        };
        self.store.notify(&next);
    }
}

/// Owner of a running scheduler
pub struct SchedulerHandle {
    gate: Gate,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerHandle {
    /// Stop delivering updates. Idempotent; no store write happens after it returns.
    ///
    /// Safe to call from a store listener.
    pub fn cancel(&self) {
        self.gate.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.cancel.is_cancelled()
    }

    /// Cancel and wait for the task to close its channel
    pub async fn shutdown(&self) {
        self.cancel();
        let join = self.join.lock().take();
        if let Some(join) = join {
            if let Err(e) = join.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.gate.close();
    }
}
