//! Host list filter state shared between the overview and the list views.
//!
//! Status filtering and network sorting are mutually exclusive toggles:
//! picking a status clears network sorting, enabling network sorting resets
//! the status to `All`.

use crate::model::{FleetSummary, HostSnapshot};
use crate::store::Observable;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Online,
    Offline,
}

impl StatusFilter {
    pub fn matches(self, host: &HostSnapshot) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Online => host.online,
            StatusFilter::Offline => !host.online,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    pub status: StatusFilter,
    pub network_sort: bool,
    /// Only hosts of this group; `None` shows every group
    pub group: Option<String>,
}

impl FilterState {
    pub fn with_status(&self, status: StatusFilter) -> Self {
        Self { status, network_sort: false, group: self.group.clone() }
    }

    pub fn with_network_sort(&self) -> Self {
        Self { status: StatusFilter::All, network_sort: true, group: self.group.clone() }
    }

    pub fn with_group(&self, group: Option<String>) -> Self {
        Self { group: group.filter(|g| !g.is_empty()), ..self.clone() }
    }
}

pub type FilterStore = Observable<FilterState>;

pub fn new_filter_store() -> FilterStore {
    Observable::new(FilterState::default())
}

fn by_weight(servers: &[Arc<HostSnapshot>]) -> Vec<Arc<HostSnapshot>> {
    let mut sorted = servers.to_vec();
    sorted.sort_by_key(|s| s.weight);
    sorted
}

fn by_network(a: &Arc<HostSnapshot>, b: &Arc<HostSnapshot>) -> Ordering {
    match (a.online, b.online) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        _ => b.total_speed().cmp(&a.total_speed()),
    }
}

/// Hosts to display, in display order
pub fn visible_hosts(summary: &FleetSummary, filter: &FilterState) -> Vec<Arc<HostSnapshot>> {
    let mut hosts: Vec<Arc<HostSnapshot>> = by_weight(&summary.servers)
        .into_iter()
        .filter(|s| filter.status.matches(s))
        .filter(|s| filter.group.as_ref().map_or(true, |g| &s.group == g))
        .collect();
    if filter.network_sort {
        hosts.sort_by(by_network);
    }
    hosts
}

/// Host count per non-empty group, over the status-filtered list
pub fn group_counts(summary: &FleetSummary, status: StatusFilter) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for host in summary.servers.iter().filter(|s| status.matches(s) && !s.group.is_empty()) {
        *counts.entry(host.group.clone()).or_insert(0) += 1;
    }
    counts
}
