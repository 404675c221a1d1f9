//! Hit/miss statistics for `wrap` calls
//!
//! Counters are only touched by the compute-if-absent path; manual `get` and
//! `set` calls are not tracked.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

/// Group every `wrap` call is accounted under.
pub const ALL_GROUP: &str = "all";

/// Counters for one stats group, with the hit ratio recomputed on read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    /// Number of `wrap` invocations.
    pub call: u64,
    /// Number of invocations satisfied without running the compute function.
    pub hit: u64,
    /// `hit / call` rounded to 2 decimals; 0 when `call` is 0.
    pub percent: f64,
}

/// Point-in-time view of all groups. Always contains [`ALL_GROUP`].
pub type StatsSnapshot = HashMap<String, GroupStats>;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    call: u64,
    hit: u64,
}

/// Per-store registry of call/hit counters.
#[derive(Debug)]
pub(crate) struct StatsRegistry {
    groups: Mutex<HashMap<String, Counters>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        let mut groups = HashMap::new();
        groups.insert(ALL_GROUP.to_string(), Counters::default());
        Self {
            groups: Mutex::new(groups),
        }
    }

    /// Records a `wrap` invocation, creating the group on first use.
    pub fn record_call(&self, group: &str) {
        let mut groups = self.groups.lock().unwrap();
        groups.entry(group.to_string()).or_default().call += 1;
    }

    /// Records a cache hit. A hit for a group that never saw a call is
    /// dropped; hits are always preceded by a call in the same wrap.
    pub fn record_hit(&self, group: &str) {
        let mut groups = self.groups.lock().unwrap();
        if let Some(counters) = groups.get_mut(group) {
            counters.hit += 1;
        }
    }

    /// Current counters with the hit ratio recomputed.
    pub fn snapshot(&self) -> StatsSnapshot {
        let groups = self.groups.lock().unwrap();
        groups
            .iter()
            .map(|(name, counters)| {
                let percent = if counters.call > 0 {
                    round2(counters.hit as f64 / counters.call as f64)
                } else {
                    0.0
                };
                (
                    name.clone(),
                    GroupStats {
                        call: counters.call,
                        hit: counters.hit,
                        percent,
                    },
                )
            })
            .collect()
    }
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
