//! Statistics, leak reports, and the operator-facing diagnostic report.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::handle::ResourceKind;

/// Aggregate counters for a resource tracker.
///
/// Invariant: `current_active == total_created - explicitly_disposed -
/// gc_cleaned - evicted`. When no eviction has occurred this reduces to the
/// three-term identity over created/disposed/collected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatistics {
    /// Resources ever registered
    pub total_created: u64,
    /// Resources currently tracked
    pub current_active: u64,
    /// Resources released through explicit disposal
    pub explicitly_disposed: u64,
    /// Resources whose wrapper was collected before explicit disposal
    pub gc_cleaned: u64,
    /// Live resources evicted by the capacity ceiling
    pub evicted: u64,
    /// Coarse memory estimate (fixed cost per tracked resource)
    pub estimated_memory_usage: u64,
}

/// A still-reachable resource that has outlived the leak threshold without
/// being disposed: a candidate for a forgotten dispose call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeakInfo {
    /// Tracker id of the resource
    pub id: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Raw native handle, when one was registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<i64>,
    /// Age since registration in milliseconds
    pub age_ms: u64,
    /// Diagnostic tags
    pub tags: Vec<String>,
    /// Stack captured at registration (if stack capture is enabled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// A point-in-time view of one live tracked resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    /// Tracker id of the resource
    pub id: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Raw native handle, when one was registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<i64>,
    /// Age since registration in milliseconds
    pub age_ms: u64,
    /// Registration time, epoch milliseconds
    pub registered_at_ms: i64,
    /// Diagnostic tags
    pub tags: Vec<String>,
}

/// Operator-facing debugging report: statistics, current leak candidates,
/// live resources grouped by kind, and the oldest live entries.
///
/// Intended for humans, not for programmatic control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    /// Report generation time, epoch milliseconds
    pub generated_at_ms: i64,
    /// Aggregate counters
    pub stats: TrackerStatistics,
    /// Current leak candidates
    pub leaks: Vec<LeakInfo>,
    /// Live resource counts grouped by kind
    pub by_kind: HashMap<String, usize>,
    /// The oldest live entries, age descending
    pub oldest: Vec<ResourceSnapshot>,
}

impl std::fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Resource Tracker Report ===")?;
        writeln!(
            f,
            "created={} active={} disposed={} collected={} evicted={} est_mem={}B",
            self.stats.total_created,
            self.stats.current_active,
            self.stats.explicitly_disposed,
            self.stats.gc_cleaned,
            self.stats.evicted,
            self.stats.estimated_memory_usage,
        )?;

        writeln!(f, "leak candidates: {}", self.leaks.len())?;
        for leak in &self.leaks {
            writeln!(
                f,
                "  {} kind={} age={}ms handle={:?}",
                leak.id, leak.kind, leak.age_ms, leak.handle
            )?;
        }

        writeln!(f, "live by kind:")?;
        let mut kinds: Vec<_> = self.by_kind.iter().collect();
        kinds.sort();
        for (kind, count) in kinds {
            writeln!(f, "  {}: {}", kind, count)?;
        }

        writeln!(f, "oldest live entries:")?;
        for snap in &self.oldest {
            writeln!(f, "  {} kind={} age={}ms", snap.id, snap.kind, snap.age_ms)?;
        }

        Ok(())
    }
}
