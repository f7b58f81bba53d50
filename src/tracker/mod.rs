//! Process-wide registry of live FFI resources.
//!
//! The tracker observes every [`FfiResource`](crate::resource::FfiResource)
//! through a weak reference: it never owns a resource and never extends its
//! lifetime. Explicit disposal unregisters an entry; a wrapper dropped
//! without disposal leaves a dead weak reference behind, which the next
//! sweep credits to `gc_cleaned`. Weak references power diagnostics only;
//! no native cleanup ever depends on a sweep running.

pub mod report;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::{FfiError, Result};
use crate::handle::{NativeHandle, ResourceKind};

pub use report::{DiagnosticReport, LeakInfo, ResourceSnapshot, TrackerStatistics};

/// Coarse per-resource cost used for the memory estimate
pub const ESTIMATED_RESOURCE_OVERHEAD_BYTES: u64 = 256;

/// How many oldest entries a diagnostic report lists
const DIAGNOSTIC_OLDEST_COUNT: usize = 10;

/// Liveness marker owned by a tracked resource.
///
/// The tracker holds only a `Weak` to it; when the owning resource is
/// dropped the weak reference dies, which is how the tracker notices a
/// wrapper that went away without explicit disposal.
#[derive(Debug, Default)]
pub struct LivenessToken(());

impl LivenessToken {
    /// Create a new liveness token
    pub fn new() -> Self {
        Self(())
    }
}

/// Per-resource options passed at registration
#[derive(Debug, Default)]
pub struct RegisterOptions {
    /// The native handle backing the resource, when known
    pub handle: Option<NativeHandle>,
    /// Diagnostic tags
    pub tags: Vec<String>,
}

/// One tracked resource. Lives only inside the tracker.
struct TrackingEntry {
    id: String,
    weak: Weak<LivenessToken>,
    kind: ResourceKind,
    handle: Option<NativeHandle>,
    tags: HashSet<String>,
    registered_at: Instant,
    registered_at_ms: i64,
    seq: u64,
    stack: Option<String>,
}

impl TrackingEntry {
    fn is_live(&self) -> bool {
        self.weak.strong_count() > 0
    }

    fn age(&self) -> Duration {
        self.registered_at.elapsed()
    }

    fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            handle: self.handle.map(NativeHandle::into_raw),
            age_ms: self.age().as_millis() as u64,
            registered_at_ms: self.registered_at_ms,
            tags: self.tags.iter().cloned().collect(),
        }
    }
}

/// Process-wide registry of live FFI resources.
///
/// Isolated instances can be constructed for tests; production code uses
/// the lazily-initialized [`global`](ResourceTracker::global) instance.
/// Configuration is fixed at construction.
pub struct ResourceTracker {
    config: TrackerConfig,
    entries: DashMap<String, TrackingEntry>,
    seq: AtomicU64,
    total_created: AtomicU64,
    explicitly_disposed: AtomicU64,
    gc_cleaned: AtomicU64,
    evicted: AtomicU64,
}

static GLOBAL_TRACKER: OnceCell<Arc<ResourceTracker>> = OnceCell::new();

impl ResourceTracker {
    /// Create an isolated tracker with the given configuration
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;

        info!(
            max_tracked = config.max_tracked_resources,
            leak_detection = config.enable_leak_detection,
            "Creating resource tracker"
        );

        Ok(Self {
            config,
            entries: DashMap::new(),
            seq: AtomicU64::new(0),
            total_created: AtomicU64::new(0),
            explicitly_disposed: AtomicU64::new(0),
            gc_cleaned: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        })
    }

    /// The process-wide tracker, created with defaults on first use.
    pub fn global() -> Arc<ResourceTracker> {
        Arc::clone(GLOBAL_TRACKER.get_or_init(|| {
            Arc::new(
                ResourceTracker::new(TrackerConfig::default())
                    .expect("default tracker config is valid"),
            )
        }))
    }

    /// Initialize the process-wide tracker with an explicit configuration.
    ///
    /// Fails once the global instance exists; the live global is never
    /// reconfigured or reset.
    pub fn try_init_global(config: TrackerConfig) -> Result<Arc<ResourceTracker>> {
        let tracker = Arc::new(ResourceTracker::new(config)?);
        GLOBAL_TRACKER
            .set(Arc::clone(&tracker))
            .map_err(|_| FfiError::invalid_config("global tracker", "already initialized"))?;
        Ok(tracker)
    }

    /// The configuration this tracker was built with
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Register a resource and return its tracker id.
    ///
    /// Registration always succeeds. If the live count then exceeds the
    /// configured ceiling, a forced-cleanup sweep runs immediately: dead
    /// entries are reclaimed first, then the oldest-registered live entries
    /// are evicted down to capacity (a soft bound).
    pub fn register(
        &self,
        token: &Arc<LivenessToken>,
        kind: ResourceKind,
        options: RegisterOptions,
    ) -> String {
        let seq = self.seq.fetch_add(1, Ordering::AcqRel);
        let now_ms = Utc::now().timestamp_millis();
        let id = format!("ffi_{}_{}", seq, now_ms);

        let stack = if self.config.capture_stack_traces {
            Some(std::backtrace::Backtrace::force_capture().to_string())
        } else {
            None
        };

        let entry = TrackingEntry {
            id: id.clone(),
            weak: Arc::downgrade(token),
            kind,
            handle: options.handle,
            tags: options.tags.into_iter().collect(),
            registered_at: Instant::now(),
            registered_at_ms: now_ms,
            seq,
            stack,
        };

        self.entries.insert(id.clone(), entry);
        self.total_created.fetch_add(1, Ordering::AcqRel);
        debug!(id = %id, kind = %kind, "Registered resource");

        if self.entries.len() > self.config.max_tracked_resources {
            self.enforce_capacity();
        }

        id
    }

    /// Unregister a resource by tracker id, counting it as explicitly
    /// disposed.
    ///
    /// Idempotent: unknown ids are a no-op, never an error. Returns whether
    /// an entry was removed.
    pub fn unregister(&self, id: &str) -> bool {
        if self.entries.remove(id).is_some() {
            self.explicitly_disposed.fetch_add(1, Ordering::AcqRel);
            debug!(id = %id, "Unregistered resource");
            true
        } else {
            false
        }
    }

    /// Scan for leak candidates: still-reachable resources older than the
    /// configured threshold that were never disposed.
    ///
    /// Dead-weak entries are not leak candidates; they are swept and
    /// reported through the `gc_cleaned` counter instead, as the distinct
    /// collected-without-disposal signal.
    pub fn detect_leaks(&self) -> Vec<LeakInfo> {
        if !self.config.enable_leak_detection {
            return Vec::new();
        }

        let threshold = Duration::from_millis(self.config.leak_threshold_ms);
        let mut leaks: Vec<LeakInfo> = self
            .entries
            .iter()
            .filter(|entry| entry.is_live() && entry.age() > threshold)
            .map(|entry| LeakInfo {
                id: entry.id.clone(),
                kind: entry.kind,
                handle: entry.handle.map(NativeHandle::into_raw),
                age_ms: entry.age().as_millis() as u64,
                tags: entry.tags.iter().cloned().collect(),
                stack: entry.stack.clone(),
            })
            .collect();

        leaks.sort_by(|a, b| b.age_ms.cmp(&a.age_ms));

        if !leaks.is_empty() {
            warn!(count = leaks.len(), "Leak candidates detected");
        }

        leaks
    }

    /// Live resources of one kind
    pub fn get_resources_by_type(&self, kind: ResourceKind) -> Vec<ResourceSnapshot> {
        self.entries
            .iter()
            .filter(|entry| entry.is_live() && entry.kind == kind)
            .map(|entry| entry.snapshot())
            .collect()
    }

    /// Live resources carrying a tag
    pub fn get_resources_by_tag(&self, tag: &str) -> Vec<ResourceSnapshot> {
        self.entries
            .iter()
            .filter(|entry| entry.is_live() && entry.tags.contains(tag))
            .map(|entry| entry.snapshot())
            .collect()
    }

    /// Current aggregate statistics
    pub fn get_stats(&self) -> TrackerStatistics {
        let active = self.entries.len() as u64;
        TrackerStatistics {
            total_created: self.total_created.load(Ordering::Acquire),
            current_active: active,
            explicitly_disposed: self.explicitly_disposed.load(Ordering::Acquire),
            gc_cleaned: self.gc_cleaned.load(Ordering::Acquire),
            evicted: self.evicted.load(Ordering::Acquire),
            estimated_memory_usage: active * ESTIMATED_RESOURCE_OVERHEAD_BYTES,
        }
    }

    /// Build the operator-facing diagnostic report
    pub fn generate_diagnostic_report(&self) -> DiagnosticReport {
        let mut by_kind = std::collections::HashMap::new();
        let mut live: Vec<ResourceSnapshot> = Vec::new();

        for entry in self.entries.iter() {
            if entry.is_live() {
                *by_kind.entry(entry.kind.to_string()).or_insert(0) += 1;
                live.push(entry.snapshot());
            }
        }

        live.sort_by(|a, b| b.age_ms.cmp(&a.age_ms));
        live.truncate(DIAGNOSTIC_OLDEST_COUNT);

        DiagnosticReport {
            generated_at_ms: Utc::now().timestamp_millis(),
            stats: self.get_stats(),
            leaks: self.detect_leaks(),
            by_kind,
            oldest: live,
        }
    }

    /// Sweep out entries whose wrapper has been collected.
    ///
    /// Each reclaimed entry is credited to `gc_cleaned` and logged: a
    /// wrapper collected before explicit disposal means caller code skipped
    /// a dispose call. Returns the number of entries reclaimed.
    pub fn force_cleanup(&self) -> usize {
        let dead: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_live())
            .map(|entry| entry.id.clone())
            .collect();

        let mut reclaimed = 0;
        for id in dead {
            if let Some((_, entry)) = self.entries.remove(&id) {
                self.gc_cleaned.fetch_add(1, Ordering::AcqRel);
                reclaimed += 1;
                warn!(
                    id = %entry.id,
                    kind = %entry.kind,
                    age_ms = entry.age().as_millis() as u64,
                    "Resource collected without explicit disposal"
                );
            }
        }

        if reclaimed > 0 {
            info!(reclaimed, "Cleanup sweep reclaimed collected resources");
        }

        reclaimed
    }

    /// Drop every entry and zero all counters. Test isolation only.
    pub fn clear_all(&self) {
        self.entries.clear();
        self.reset_stats();
    }

    /// Zero all counters. Test isolation only.
    pub fn reset_stats(&self) {
        self.total_created.store(0, Ordering::Release);
        self.explicitly_disposed.store(0, Ordering::Release);
        self.gc_cleaned.store(0, Ordering::Release);
        self.evicted.store(0, Ordering::Release);
    }

    /// Reclaim dead entries, then evict oldest-registered live entries
    /// until the ceiling holds.
    fn enforce_capacity(&self) {
        self.force_cleanup();

        let over = self
            .entries
            .len()
            .saturating_sub(self.config.max_tracked_resources);
        if over == 0 {
            return;
        }

        let mut by_age: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|entry| (entry.seq, entry.id.clone()))
            .collect();
        by_age.sort();

        for (_, id) in by_age.into_iter().take(over) {
            if let Some((_, entry)) = self.entries.remove(&id) {
                self.evicted.fetch_add(1, Ordering::AcqRel);
                warn!(
                    id = %entry.id,
                    kind = %entry.kind,
                    "Tracked-resource ceiling exceeded; evicting oldest entry"
                );
            }
        }
    }
}

impl std::fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTracker")
            .field("entries", &self.entries.len())
            .field("total_created", &self.total_created.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_tracker(config: TrackerConfig) -> ResourceTracker {
        ResourceTracker::new(config).unwrap()
    }

    fn register_one(tracker: &ResourceTracker, kind: ResourceKind) -> (Arc<LivenessToken>, String) {
        let token = Arc::new(LivenessToken::new());
        let id = tracker.register(&token, kind, RegisterOptions::default());
        (token, id)
    }

    #[test]
    fn test_id_format() {
        let tracker = create_tracker(TrackerConfig::default());
        let (_token, id) = register_one(&tracker, ResourceKind::Wallet);
        assert!(id.starts_with("ffi_0_"));

        let (_token2, id2) = register_one(&tracker, ResourceKind::Wallet);
        assert!(id2.starts_with("ffi_1_"));
    }

    #[test]
    fn test_register_unregister_stats() {
        let tracker = create_tracker(TrackerConfig::default());
        let (_t1, id1) = register_one(&tracker, ResourceKind::Wallet);
        let (_t2, _id2) = register_one(&tracker, ResourceKind::Transaction);

        assert!(tracker.unregister(&id1));

        let stats = tracker.get_stats();
        assert_eq!(stats.total_created, 2);
        assert_eq!(stats.current_active, 1);
        assert_eq!(stats.explicitly_disposed, 1);
        assert_eq!(stats.gc_cleaned, 0);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let tracker = create_tracker(TrackerConfig::default());
        assert!(!tracker.unregister("ffi_999_0"));
        assert!(!tracker.unregister("ffi_999_0"));
        assert_eq!(tracker.get_stats().explicitly_disposed, 0);
    }

    #[test]
    fn test_leak_detection_threshold() {
        let tracker = create_tracker(TrackerConfig::new().with_leak_threshold_ms(100));
        let (_token, _id) = register_one(&tracker, ResourceKind::Contact);

        assert!(tracker.detect_leaks().is_empty());

        std::thread::sleep(Duration::from_millis(120));

        let leaks = tracker.detect_leaks();
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].kind, ResourceKind::Contact);
        assert!(leaks[0].age_ms >= 100);
    }

    #[test]
    fn test_leak_detection_disabled() {
        let tracker =
            create_tracker(TrackerConfig::new().with_leak_detection(false).with_leak_threshold_ms(1));
        let (_token, _id) = register_one(&tracker, ResourceKind::Wallet);
        std::thread::sleep(Duration::from_millis(10));
        assert!(tracker.detect_leaks().is_empty());
    }

    #[test]
    fn test_collected_entries_are_not_leaks() {
        let tracker = create_tracker(TrackerConfig::new().with_leak_threshold_ms(1));
        let (token, _id) = register_one(&tracker, ResourceKind::Wallet);
        drop(token);
        std::thread::sleep(Duration::from_millis(10));

        assert!(tracker.detect_leaks().is_empty());
        assert_eq!(tracker.force_cleanup(), 1);
        assert_eq!(tracker.get_stats().gc_cleaned, 1);
    }

    #[test]
    fn test_gc_sweep_removes_entry() {
        let tracker = create_tracker(TrackerConfig::default());
        let (token, _id) = register_one(&tracker, ResourceKind::Address);
        assert_eq!(tracker.get_resources_by_type(ResourceKind::Address).len(), 1);

        drop(token);
        tracker.force_cleanup();

        assert!(tracker.get_resources_by_type(ResourceKind::Address).is_empty());
        let stats = tracker.get_stats();
        assert_eq!(stats.gc_cleaned, 1);
        assert_eq!(stats.current_active, 0);
    }

    #[test]
    fn test_capacity_eviction() {
        let tracker = create_tracker(TrackerConfig::new().with_max_tracked_resources(2));
        let (_t1, _) = register_one(&tracker, ResourceKind::Wallet);
        let (_t2, _) = register_one(&tracker, ResourceKind::Wallet);
        let (_t3, _) = register_one(&tracker, ResourceKind::Wallet);

        let stats = tracker.get_stats();
        assert!(stats.current_active <= 2);
        assert_eq!(stats.evicted, 1);
        assert_eq!(
            stats.current_active,
            stats.total_created - stats.explicitly_disposed - stats.gc_cleaned - stats.evicted
        );
    }

    #[test]
    fn test_eviction_prefers_dead_entries() {
        let tracker = create_tracker(TrackerConfig::new().with_max_tracked_resources(2));
        let (t1, _) = register_one(&tracker, ResourceKind::Wallet);
        let (_t2, _) = register_one(&tracker, ResourceKind::Wallet);
        drop(t1);

        let (_t3, _) = register_one(&tracker, ResourceKind::Wallet);

        // The dead entry was reclaimed; no live entry needed evicting
        let stats = tracker.get_stats();
        assert_eq!(stats.gc_cleaned, 1);
        assert_eq!(stats.evicted, 0);
        assert_eq!(stats.current_active, 2);
    }

    #[test]
    fn test_filter_by_type_and_tag() {
        let tracker = create_tracker(TrackerConfig::default());
        let token = Arc::new(LivenessToken::new());
        tracker.register(
            &token,
            ResourceKind::Wallet,
            RegisterOptions {
                handle: Some(NativeHandle::wrap(42).unwrap()),
                tags: vec!["primary".to_string()],
            },
        );
        let (_t2, _) = register_one(&tracker, ResourceKind::Transaction);

        let wallets = tracker.get_resources_by_type(ResourceKind::Wallet);
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].handle, Some(42));

        assert_eq!(tracker.get_resources_by_tag("primary").len(), 1);
        assert!(tracker.get_resources_by_tag("missing").is_empty());
    }

    #[test]
    fn test_diagnostic_report() {
        let tracker = create_tracker(TrackerConfig::new().with_leak_threshold_ms(1));
        let (_t1, _) = register_one(&tracker, ResourceKind::Wallet);
        let (_t2, _) = register_one(&tracker, ResourceKind::Wallet);
        std::thread::sleep(Duration::from_millis(10));

        let report = tracker.generate_diagnostic_report();
        assert_eq!(report.stats.current_active, 2);
        assert_eq!(report.by_kind.get("wallet"), Some(&2));
        assert_eq!(report.leaks.len(), 2);
        assert_eq!(report.oldest.len(), 2);
        assert!(report.oldest[0].age_ms >= report.oldest[1].age_ms);

        // Serializable for operators shipping it elsewhere
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("byKind"));
    }

    #[test]
    fn test_stack_capture() {
        let tracker = create_tracker(TrackerConfig::new().with_stack_traces(true).with_leak_threshold_ms(1));
        let (_token, _) = register_one(&tracker, ResourceKind::SeedWords);
        std::thread::sleep(Duration::from_millis(10));

        let leaks = tracker.detect_leaks();
        assert_eq!(leaks.len(), 1);
        assert!(leaks[0].stack.is_some());
    }

    #[test]
    fn test_clear_all_and_reset() {
        let tracker = create_tracker(TrackerConfig::default());
        let (_t, _) = register_one(&tracker, ResourceKind::Wallet);

        tracker.clear_all();
        let stats = tracker.get_stats();
        assert_eq!(stats, TrackerStatistics::default());
    }

    #[test]
    fn test_invariant_across_mixed_lifecycle() {
        let tracker = create_tracker(TrackerConfig::default());

        let (_kept, _) = register_one(&tracker, ResourceKind::Wallet);
        let (dropped, _) = register_one(&tracker, ResourceKind::Transaction);
        let (_held, disposed_id) = register_one(&tracker, ResourceKind::Contact);

        tracker.unregister(&disposed_id);
        drop(dropped);
        tracker.force_cleanup();

        let stats = tracker.get_stats();
        assert_eq!(
            stats.current_active,
            stats.total_created - stats.explicitly_disposed - stats.gc_cleaned - stats.evicted
        );
        assert_eq!(stats.current_active, 1);
        assert_eq!(
            stats.estimated_memory_usage,
            ESTIMATED_RESOURCE_OVERHEAD_BYTES
        );
    }
}
