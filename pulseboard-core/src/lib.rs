/*!
pulseboard-core - live fleet telemetry for the pulseboard dashboard

Reconciles backend telemetry into immutable fleet summaries, keeps a bounded
history, publishes both through an observable store and smooths latency
charts. The `Scheduler` is the only writer; everything else reads.
*/

pub mod aggregator;
pub mod config;
pub mod error;
pub mod filter;
pub mod format;
pub mod latency;
pub mod model;
pub mod scheduler;
pub mod smoother;
pub mod source;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use aggregator::{append_history, host_series, reconcile, reconcile_update, DEFAULT_HISTORY_CAPACITY};
pub use config::{Config, LiveConfig, TransportMode};
pub use error::{ConfigError, SourceError, SourceResult, TransportError};
pub use filter::{FilterState, FilterStore, StatusFilter};
pub use model::{FleetSummary, HistoryEntry, HostRecord, HostSample, HostSnapshot, LiveUpdate, RawMetrics};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use smoother::{smooth, SmoothingParams};
pub use source::{KomariClient, LiveChannel, LiveTransport, PublicInfo, TelemetrySource, WsTransport};
pub use store::{DashboardState, DashboardStore, LinkState, Observable, Subscription};
