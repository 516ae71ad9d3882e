//! Ping history: wire records, per-task series, chart points and stats.

use crate::smoother::{smooth, SmoothingParams};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Series key used by single-task charts
pub const DELAY_KEY: &str = "avg_delay";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingRecord {
    pub task_id: i64,
    pub time: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingTask {
    pub id: i64,
    pub interval: u64,
    pub name: String,
    pub loss: f64,
}

/// Body of `GET /api/records/ping`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingHistory {
    pub count: u64,
    pub records: Vec<PingRecord>,
    pub tasks: Vec<PingTask>,
}

impl PingHistory {
    /// No monitor task configured for the host: a normal empty state
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySample {
    /// Unix epoch milliseconds
    pub timestamp: i64,
    pub delay: f64,
    pub loss: Option<f64>,
}

/// All samples of one monitor task, ordered by timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSeries {
    pub name: String,
    pub samples: Vec<LatencySample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TaskStats {
    pub last: f64,
    pub min: f64,
    pub max: f64,
    pub loss: Option<f64>,
}

impl TaskSeries {
    pub fn stats(&self) -> TaskStats {
        let delays = self.samples.iter().map(|s| s.delay);
        TaskStats {
            last: self.samples.last().map(|s| s.delay).unwrap_or_default(),
            min: delays.clone().reduce(f64::min).unwrap_or_default(),
            max: delays.reduce(f64::max).unwrap_or_default(),
            loss: self.samples.iter().find_map(|s| s.loss),
        }
    }

    /// Chart points for this task alone, keyed `avg_delay`
    pub fn chart_points(&self) -> Vec<ChartPoint> {
        self.samples
            .iter()
            .map(|s| ChartPoint {
                created_at: s.timestamp,
                values: BTreeMap::from([(DELAY_KEY.to_string(), s.delay)]),
                packet_loss: s.loss,
            })
            .collect()
    }
}

/// One x-axis position of a latency chart; absent keys are gaps
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub created_at: i64,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_loss: Option<f64>,
}

impl ChartPoint {
    pub fn single(created_at: i64, key: &str, value: f64) -> Self {
        Self {
            created_at,
            values: BTreeMap::from([(key.to_string(), value)]),
            packet_loss: None,
        }
    }
}

/// Split ping records into per-task series, in the backend's task order.
///
/// Records of unknown tasks and records with unparsable times are dropped.
pub fn group_by_task(history: &PingHistory) -> Vec<TaskSeries> {
    let index: HashMap<i64, usize> = history.tasks.iter().enumerate().map(|(i, t)| (t.id, i)).collect();
    let mut series: Vec<TaskSeries> = history
        .tasks
        .iter()
        .map(|t| TaskSeries { name: t.name.clone(), samples: Vec::new() })
        .collect();

    for rec in &history.records {
        let Some(&slot) = index.get(&rec.task_id) else {
            continue;
        };
        let Ok(time) = DateTime::parse_from_rfc3339(&rec.time) else {
            debug!("Skipping ping record with bad time {:?}", rec.time);
            continue;
        };
        series[slot].samples.push(LatencySample {
            timestamp: time.timestamp_millis(),
            delay: rec.value,
            loss: Some(history.tasks[slot].loss),
        });
    }

    for s in &mut series {
        s.samples.sort_by_key(|x| x.timestamp);
    }
    series
}

/// Merge every task into one point per distinct timestamp.
///
/// A task without a sample at that timestamp contributes 0.
pub fn merge_all(series: &[TaskSeries]) -> Vec<ChartPoint> {
    let times: BTreeSet<i64> = series.iter().flat_map(|s| s.samples.iter().map(|x| x.timestamp)).collect();
    let lookup: Vec<HashMap<i64, f64>> = series
        .iter()
        .map(|s| s.samples.iter().map(|x| (x.timestamp, x.delay)).collect())
        .collect();

    times
        .into_iter()
        .map(|t| ChartPoint {
            created_at: t,
            values: series
                .iter()
                .zip(&lookup)
                .map(|(s, by_time)| (s.name.clone(), by_time.get(&t).copied().unwrap_or(0.0)))
                .collect(),
            packet_loss: None,
        })
        .collect()
}

/// Which tasks a latency chart shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LatencyView {
    All,
    Task(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub name: String,
    pub stats: TaskStats,
}

/// Everything a latency chart needs for one host
#[derive(Debug, Clone, Serialize)]
pub struct LatencyChart {
    pub tasks: Vec<TaskSummary>,
    pub keys: Vec<String>,
    pub points: Vec<ChartPoint>,
    pub smoothed: bool,
}

/// Build the chart for `view`, optionally smoothed.
///
/// Returns `None` when the requested task does not exist.
pub fn build_chart(history: &PingHistory, view: &LatencyView, smoothing: Option<SmoothingParams>) -> Option<LatencyChart> {
    let series = group_by_task(history);
    let tasks = series
        .iter()
        .map(|s| TaskSummary { name: s.name.clone(), stats: s.stats() })
        .collect();

    let (keys, points) = match view {
        LatencyView::All => (series.iter().map(|s| s.name.clone()).collect::<Vec<_>>(), merge_all(&series)),
        LatencyView::Task(name) => {
            let task = series.iter().find(|s| &s.name == name)?;
            (vec![DELAY_KEY.to_string()], task.chart_points())
        }
    };

    let points = match smoothing {
        Some(params) => smooth(&points, &keys, params),
        None => points,
    };

    Some(LatencyChart {
        tasks,
        keys,
        points,
        smoothed: smoothing.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> PingHistory {
        PingHistory {
            count: 5,
            tasks: vec![
                PingTask { id: 1, interval: 60, name: "tokyo".into(), loss: 0.5 },
                PingTask { id: 2, interval: 60, name: "frankfurt".into(), loss: 0.0 },
            ],
            records: vec![
                PingRecord { task_id: 1, time: "2025-06-01T00:01:00Z".into(), value: 42.0 },
                PingRecord { task_id: 1, time: "2025-06-01T00:00:00Z".into(), value: 40.0 },
                PingRecord { task_id: 2, time: "2025-06-01T00:00:00Z".into(), value: 12.0 },
                PingRecord { task_id: 9, time: "2025-06-01T00:00:00Z".into(), value: 1.0 },
                PingRecord { task_id: 2, time: "yesterday".into(), value: 1.0 },
            ],
        }
    }

    #[test]
    fn test_group_by_task_sorts_and_drops() {
        let series = group_by_task(&history());
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].name, "tokyo");
        assert_eq!(series[0].samples.len(), 2);
        assert!(series[0].samples[0].timestamp < series[0].samples[1].timestamp);
        assert_eq!(series[0].samples[0].delay, 40.0);
        assert_eq!(series[0].samples[0].loss, Some(0.5));
        assert_eq!(series[1].samples.len(), 1);
    }

    #[test]
    fn test_merge_all_fills_gaps_with_zero() {
        let merged = merge_all(&group_by_task(&history()));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].values["tokyo"], 40.0);
        assert_eq!(merged[0].values["frankfurt"], 12.0);
        assert_eq!(merged[1].values["tokyo"], 42.0);
        assert_eq!(merged[1].values["frankfurt"], 0.0);
    }

    #[test]
    fn test_stats() {
        let series = group_by_task(&history());
        let stats = series[0].stats();
        assert_eq!(stats.last, 42.0);
        assert_eq!(stats.min, 40.0);
        assert_eq!(stats.max, 42.0);
        assert_eq!(stats.loss, Some(0.5));

        let empty = TaskSeries { name: "x".into(), samples: vec![] };
        assert_eq!(empty.stats().last, 0.0);
        assert_eq!(empty.stats().loss, None);
    }

    #[test]
    fn test_build_chart_single_task() {
        let chart = build_chart(&history(), &LatencyView::Task("tokyo".into()), None).unwrap();
        assert_eq!(chart.keys, vec![DELAY_KEY.to_string()]);
        assert_eq!(chart.points.len(), 2);
        assert_eq!(chart.points[1].values[DELAY_KEY], 42.0);
        assert_eq!(chart.points[1].packet_loss, Some(0.5));
        assert_eq!(chart.tasks.len(), 2);
        assert!(!chart.smoothed);

        assert!(build_chart(&history(), &LatencyView::Task("nowhere".into()), None).is_none());
    }

    #[test]
    fn test_build_chart_all_smoothed_short_series_unchanged() {
        let plain = build_chart(&history(), &LatencyView::All, None).unwrap();
        let smoothed = build_chart(&history(), &LatencyView::All, Some(SmoothingParams::default())).unwrap();
        assert!(smoothed.smoothed);
        assert_eq!(plain.points, smoothed.points);
    }

    #[test]
    fn test_chart_point_serializes_flat() {
        let mut point = ChartPoint::single(1000, DELAY_KEY, 12.5);
        point.packet_loss = Some(1.0);
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["created_at"], 1000);
        assert_eq!(json["avg_delay"], 12.5);
        assert_eq!(json["packet_loss"], 1.0);
    }

    #[test]
    fn test_empty_history_is_no_data() {
        assert!(PingHistory::default().is_empty());
    }
}
