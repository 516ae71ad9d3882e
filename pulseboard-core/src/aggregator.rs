/**
 * TELEMETRY AGGREGATOR - Fleet summary reconciliation
 *
 * ROLE: Turns the authoritative host list plus one cycle of raw telemetry
 * into a new immutable `FleetSummary`, and keeps the bounded history.
 *
 * IDENTITY: a host whose observable fields did not change keeps the exact
 * `Arc<HostSnapshot>` of the previous summary, so readers can detect change
 * with `Arc::ptr_eq` instead of comparing fields.
 */

use crate::model::{
    FleetSummary, HistoryEntry, HostHardware, HostRecord, HostSample, HostSnapshot, HostStatus, LiveUpdate,
    RawMetrics,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

fn gauge(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

/// Build a snapshot for one host. Offline hosts get zeroed status fields.
pub fn normalize_host(record: &HostRecord, recent: Option<&RawMetrics>, online: bool) -> HostSnapshot {
    let recent = if online { recent } else { None };
    let status = match recent {
        Some(r) => HostStatus {
            cpu: gauge(r.cpu.usage),
            mem_used: r.ram.used,
            swap_used: r.swap.used,
            disk_used: r.disk.used,
            net_in_speed: r.network.down,
            net_out_speed: r.network.up,
            net_in_transfer: r.network.total_down,
            net_out_transfer: r.network.total_up,
            uptime: r.uptime,
            load1: gauge(r.load.load1),
            load5: gauge(r.load.load5),
            load15: gauge(r.load.load15),
            tcp_conn: r.connections.tcp,
            udp_conn: r.connections.udp,
            process: r.process,
        },
        None => HostStatus::default(),
    };

    HostSnapshot {
        id: record.uuid.clone(),
        name: record.name.clone(),
        online,
        group: record.group.clone(),
        tags: record.tags.clone(),
        weight: record.weight,
        region: record.region.clone(),
        public_remark: record.public_remark.clone(),
        hardware: HostHardware {
            os: record.os.clone(),
            kernel: record.kernel_version.clone(),
            cpu: record.cpu_name.clone(),
            cpu_cores: record.cpu_cores,
            gpu: record.gpu_name.clone(),
            arch: record.arch.clone(),
            virtualization: record.virtualization.clone(),
            mem_total: record.mem_total,
            swap_total: record.swap_total,
            disk_total: record.disk_total,
        },
        status,
        updated_at: recent.map(|r| r.updated_at.clone()).unwrap_or_default(),
        version: recent.map(|r| r.message.clone()).unwrap_or_default(),
    }
}

fn same_f64(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits()
}

impl HostStatus {
    /// Field-by-field comparison of every gauge, floats compared bit for bit
    pub fn same_readings(&self, other: &HostStatus) -> bool {
        same_f64(self.cpu, other.cpu)
            && self.mem_used == other.mem_used
            && self.swap_used == other.swap_used
            && self.disk_used == other.disk_used
            && self.net_in_speed == other.net_in_speed
            && self.net_out_speed == other.net_out_speed
            && self.net_in_transfer == other.net_in_transfer
            && self.net_out_transfer == other.net_out_transfer
            && self.uptime == other.uptime
            && same_f64(self.load1, other.load1)
            && same_f64(self.load5, other.load5)
            && same_f64(self.load15, other.load15)
            && self.tcp_conn == other.tcp_conn
            && self.udp_conn == other.udp_conn
            && self.process == other.process
    }
}

impl HostSnapshot {
    /// True when every observable field matches, i.e. `other` can stand in for `self`.
    ///
    /// `updated_at` is part of the comparison and the backend stamps every
    /// report, so online hosts rarely keep their identity across live cycles.
    /// Offline hosts and repeated identical reports do.
    pub fn same_observation(&self, other: &HostSnapshot) -> bool {
        self.online == other.online
            && self.status.same_readings(&other.status)
            && self.id == other.id
            && self.name == other.name
            && self.group == other.group
            && self.tags == other.tags
            && self.weight == other.weight
            && self.region == other.region
            && self.public_remark == other.public_remark
            && self.hardware == other.hardware
            && self.updated_at == other.updated_at
            && self.version == other.version
    }
}

/// Rebuild the fleet summary for one update cycle.
///
/// Hidden hosts are skipped entirely. Counters and bandwidth sums are always
/// recomputed; only host snapshots may be carried over from `previous`.
pub fn reconcile(
    hosts: &[HostRecord],
    online_ids: &HashSet<String>,
    payload: &HashMap<String, RawMetrics>,
    previous: Option<&FleetSummary>,
) -> FleetSummary {
    let prev_by_id: HashMap<&str, &Arc<HostSnapshot>> = previous
        .map(|p| p.servers.iter().map(|s| (s.id.as_str(), s)).collect())
        .unwrap_or_default();

    let mut summary = FleetSummary::default();

    for record in hosts.iter().filter(|h| !h.hidden) {
        let online = online_ids.contains(&record.uuid);
        let candidate = normalize_host(record, payload.get(&record.uuid), online);

        let snapshot = match prev_by_id.get(record.uuid.as_str()) {
            Some(prev) if prev.same_observation(&candidate) => Arc::clone(prev),
            _ => Arc::new(candidate),
        };

        summary.total += 1;
        if snapshot.online {
            summary.online += 1;
            let status = &snapshot.status;
            summary.total_in_speed = summary.total_in_speed.saturating_add(status.net_in_speed);
            summary.total_out_speed = summary.total_out_speed.saturating_add(status.net_out_speed);
            summary.total_in_transfer = summary.total_in_transfer.saturating_add(status.net_in_transfer);
            summary.total_out_transfer = summary.total_out_transfer.saturating_add(status.net_out_transfer);
        } else {
            summary.offline += 1;
        }
        summary.servers.push(snapshot);
    }

    summary
}

/// `reconcile` driven by a decoded live update
pub fn reconcile_update(hosts: &[HostRecord], update: &LiveUpdate, previous: Option<&FleetSummary>) -> FleetSummary {
    reconcile(hosts, &update.online, &update.metrics, previous)
}

/// Prepend `entry` and keep at most `capacity` entries, newest first
pub fn append_history(history: &[HistoryEntry], entry: HistoryEntry, capacity: usize) -> Vec<HistoryEntry> {
    let mut next = Vec::with_capacity(capacity.min(history.len() + 1));
    if capacity == 0 {
        return next;
    }
    next.push(entry);
    next.extend(history.iter().take(capacity - 1).cloned());
    next
}

/// Time series of one host across `history`, oldest first.
///
/// Entries from before the host existed (or while it was hidden) are skipped.
pub fn host_series(history: &[HistoryEntry], id: &str) -> Vec<HostSample> {
    history
        .iter()
        .rev()
        .filter_map(|entry| entry.summary.host(id).map(|host| HostSample::new(entry.timestamp, host)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> HostRecord {
        HostRecord {
            uuid: id.to_string(),
            name: format!("host-{id}"),
            mem_total: 4096,
            ..Default::default()
        }
    }

    fn metrics(cpu: f64, down: u64, total_down: u64) -> RawMetrics {
        let mut m = RawMetrics::default();
        m.cpu.usage = cpu;
        m.network.down = down;
        m.network.up = down / 2;
        m.network.total_down = total_down;
        m.network.total_up = total_down / 2;
        m.updated_at = "2025-06-01T12:00:00Z".to_string();
        m
    }

    fn online(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_offline_host() {
        let summary = reconcile(&[record("a")], &HashSet::new(), &HashMap::new(), None);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.online, 0);
        assert_eq!(summary.offline, 1);
        let a = &summary.servers[0];
        assert_eq!(a.id, "a");
        assert!(!a.online);
        assert_eq!(a.status.cpu, 0.0);
        assert_eq!(a.status.net_in_transfer, 0);
        assert_eq!(a.updated_at, "");
    }

    #[test]
    fn test_hidden_hosts_are_invisible() {
        let mut hidden = record("h");
        hidden.hidden = true;
        let payload = HashMap::from([("h".to_string(), metrics(90.0, 1000, 1000))]);
        let summary = reconcile(&[record("a"), hidden], &online(&["a", "h"]), &payload, None);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.online + summary.offline, summary.total);
        assert!(summary.host("h").is_none());
        assert_eq!(summary.total_in_speed, 0);
    }

    #[test]
    fn test_bandwidth_sums_only_online_hosts() {
        let payload = HashMap::from([
            ("a".to_string(), metrics(10.0, 100, 1000)),
            ("b".to_string(), metrics(20.0, 300, 5000)),
        ]);
        // b has a payload but is not online: it must not contribute
        let summary = reconcile(&[record("a"), record("b")], &online(&["a"]), &payload, None);
        assert_eq!(summary.online, 1);
        assert_eq!(summary.offline, 1);
        assert_eq!(summary.total_in_speed, 100);
        assert_eq!(summary.total_out_speed, 50);
        assert_eq!(summary.total_in_transfer, 1000);
        assert_eq!(summary.total_out_transfer, 500);
        let b = summary.host("b").unwrap();
        assert!(!b.online);
        assert_eq!(b.status.cpu, 0.0);
    }

    #[test]
    fn test_online_without_payload_defaults_to_zero() {
        let summary = reconcile(&[record("a")], &online(&["a"]), &HashMap::new(), None);
        assert_eq!(summary.online, 1);
        assert!(summary.servers[0].online);
        assert_eq!(summary.servers[0].status.cpu, 0.0);
    }

    #[test]
    fn test_unchanged_host_keeps_identity() {
        let hosts = [record("a"), record("b")];
        let payload = HashMap::from([
            ("a".to_string(), metrics(50.0, 100, 1000)),
            ("b".to_string(), metrics(5.0, 10, 10)),
        ]);
        let first = reconcile(&hosts, &online(&["a", "b"]), &payload, None);

        let mut changed = payload.clone();
        changed.get_mut("b").unwrap().cpu.usage = 6.0;
        let second = reconcile(&hosts, &online(&["a", "b"]), &changed, Some(&first));

        assert!(Arc::ptr_eq(first.host("a").unwrap(), second.host("a").unwrap()));
        assert!(!Arc::ptr_eq(first.host("b").unwrap(), second.host("b").unwrap()));
        assert_eq!(second.host("b").unwrap().status.cpu, 6.0);
    }

    #[test]
    fn test_online_flip_breaks_identity() {
        let hosts = [record("a")];
        let first = reconcile(&hosts, &online(&["a"]), &HashMap::new(), None);
        let second = reconcile(&hosts, &HashSet::new(), &HashMap::new(), Some(&first));
        assert!(!Arc::ptr_eq(&first.servers[0], &second.servers[0]));
        assert!(!second.servers[0].online);
    }

    #[test]
    fn test_aggregates_recomputed_when_hosts_reused() {
        let hosts = [record("a")];
        let payload = HashMap::from([("a".to_string(), metrics(1.0, 100, 100))]);
        let first = reconcile(&hosts, &online(&["a"]), &payload, None);
        let second = reconcile(&hosts, &online(&["a"]), &payload, Some(&first));
        assert!(Arc::ptr_eq(&first.servers[0], &second.servers[0]));
        assert_eq!(second.total_in_speed, 100);
        assert_eq!(second.online, 1);
    }

    #[test]
    fn test_huge_counters_saturate() {
        let frame = r#"{"status":"success","data":{"online":["a","b"],"data":{
            "a":{"network":{"down":18446744073709551615,"totalDown":18446744073709551615}},
            "b":{"network":{"down":1,"totalDown":1}}}}"#;
        let update = LiveUpdate::from_frame(frame).unwrap().unwrap();
        let summary = reconcile_update(&[record("a"), record("b")], &update, None);
        assert_eq!(summary.online, 2);
        assert_eq!(summary.total_in_speed, u64::MAX);
        assert_eq!(summary.total_in_transfer, u64::MAX);
        assert_eq!(summary.total_out_transfer, 0);
    }

    #[test]
    fn test_negative_and_nan_gauges_are_zeroed() {
        let mut m = metrics(f64::NAN, 0, 0);
        m.load.load1 = -3.0;
        let snap = normalize_host(&record("a"), Some(&m), true);
        assert_eq!(snap.status.cpu, 0.0);
        assert_eq!(snap.status.load1, 0.0);
    }

    #[test]
    fn test_float_comparison_is_bitwise() {
        let a = HostStatus { cpu: 0.0, ..Default::default() };
        let b = HostStatus { cpu: -0.0, ..Default::default() };
        assert!(a.same_readings(&a.clone()));
        assert!(!a.same_readings(&b));
    }

    #[test]
    fn test_append_history_bounds_and_order() {
        let summary = Arc::new(FleetSummary::default());
        let mut history = Vec::new();
        for _ in 0..35 {
            history = append_history(&history, HistoryEntry::new(Arc::clone(&summary)), 30);
            assert!(history.len() <= 30);
        }
        assert_eq!(history.len(), 30);

        let newest = HistoryEntry::new(Arc::new(FleetSummary { total: 7, ..Default::default() }));
        let stamp = newest.timestamp;
        history = append_history(&history, newest, 30);
        assert_eq!(history.len(), 30);
        assert_eq!(history[0].summary.total, 7);
        assert_eq!(history[0].timestamp, stamp);
    }

    #[test]
    fn test_new_report_time_breaks_identity() {
        let hosts = [record("a")];
        let payload = HashMap::from([("a".to_string(), metrics(1.0, 100, 100))]);
        let first = reconcile(&hosts, &online(&["a"]), &payload, None);

        let mut restamped = payload.clone();
        restamped.get_mut("a").unwrap().updated_at = "2025-06-01T12:00:02Z".to_string();
        let second = reconcile(&hosts, &online(&["a"]), &restamped, Some(&first));
        assert!(!Arc::ptr_eq(&first.servers[0], &second.servers[0]));
        assert_eq!(second.servers[0].status.cpu, first.servers[0].status.cpu);
    }

    #[test]
    fn test_host_series_is_oldest_first_and_skips_missing() {
        let base = chrono::DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z").unwrap().with_timezone(&chrono::Utc);
        let at = |secs: i64, summary: FleetSummary| HistoryEntry {
            timestamp: base + chrono::Duration::seconds(secs),
            summary: Arc::new(summary),
        };
        let payload = |cpu: f64| HashMap::from([("a".to_string(), metrics(cpu, 100, 100))]);

        let oldest = reconcile(&[record("b")], &online(&["b"]), &HashMap::new(), None);
        let middle = reconcile(&[record("a"), record("b")], &online(&["a"]), &payload(10.0), None);
        let newest = reconcile(&[record("a"), record("b")], &HashSet::new(), &payload(20.0), None);
        let history = vec![at(4, newest), at(2, middle), at(0, oldest)];

        let series = host_series(&history, "a");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].timestamp, base + chrono::Duration::seconds(2));
        assert!(series[0].online);
        assert_eq!(series[0].cpu, 10.0);
        assert_eq!(series[0].net_in_speed, 100);
        assert_eq!(series[1].timestamp, base + chrono::Duration::seconds(4));
        assert!(!series[1].online);
        assert_eq!(series[1].cpu, 0.0);

        assert_eq!(host_series(&history, "b").len(), 3);
        assert!(host_series(&history, "missing").is_empty());
        assert!(host_series(&[], "a").is_empty());
    }

    #[test]
    fn test_host_series_follows_history_bound() {
        let summary = Arc::new(reconcile(&[record("a")], &online(&["a"]), &HashMap::new(), None));
        let mut history = Vec::new();
        for _ in 0..40 {
            history = append_history(&history, HistoryEntry::new(Arc::clone(&summary)), DEFAULT_HISTORY_CAPACITY);
        }
        let series = host_series(&history, "a");
        assert_eq!(series.len(), DEFAULT_HISTORY_CAPACITY);
        assert!(series.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(series[0].mem_percent, 0.0);
    }

    #[test]
    fn test_append_history_zero_capacity() {
        let entry = HistoryEntry::new(Arc::new(FleetSummary::default()));
        assert!(append_history(&[], entry, 0).is_empty());
    }
}
