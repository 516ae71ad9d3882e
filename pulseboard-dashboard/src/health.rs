use pulseboard_core::{DashboardState, LinkState};
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Serialize)]
pub struct DashboardHealth {
    pub uptime_seconds: u64,
    pub hosts_tracked: usize,
    pub memory_usage_mb: Option<f32>,
    pub link: LinkState,
    pub reconnects: u32,
    pub loading: bool,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    pub fn get_health(&self, state: &DashboardState) -> DashboardHealth {
        DashboardHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            hosts_tracked: state.summary.as_ref().map_or(0, |s| s.total),
            memory_usage_mb: get_memory_usage_mb(),
            link: state.link,
            reconnects: state.reconnects,
            loading: state.loading,
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Resident set size from /proc; unknown elsewhere
fn get_memory_usage_mb() -> Option<f32> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let kb = status
            .lines()
            .find(|line| line.starts_with("VmRSS:"))?
            .split_whitespace()
            .nth(1)?
            .parse::<u64>()
            .ok()?;
        Some(kb as f32 / 1024.0)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
