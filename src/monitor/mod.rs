//! Memory pressure monitoring and cleanup dispatch.
//!
//! The monitor samples process memory on a fixed interval, classifies the
//! heap ratio into a pressure level, and notifies registered handlers on
//! level changes. Escalation into high or critical pressure triggers
//! cleanup handlers (which may force a tracker sweep or drop caches) with a
//! cooldown between rounds so repeated escalation cannot thrash. A rolling
//! window of samples feeds a regression-based growth-trend leak signal.

pub mod trend;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::Result;

pub use trend::MemoryTrend;

/// Classified memory pressure, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PressureLevel {
    /// Heap usage comfortably below thresholds
    Normal,
    /// Heap usage worth watching
    Moderate,
    /// Heap usage high enough to trigger cleanup
    High,
    /// Heap usage (or absolute RSS) at the ceiling
    Critical,
}

impl std::fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PressureLevel::Normal => write!(f, "normal"),
            PressureLevel::Moderate => write!(f, "moderate"),
            PressureLevel::High => write!(f, "high"),
            PressureLevel::Critical => write!(f, "critical"),
        }
    }
}

/// One process-memory observation.
#[derive(Debug, Clone, Copy)]
pub struct MemorySample {
    /// Heap bytes in use
    pub heap_used_bytes: u64,
    /// Resident set size in bytes
    pub rss_bytes: u64,
    /// When the sample was taken
    pub taken_at: Instant,
}

/// Source of process-memory samples.
///
/// Injected so tests can script deterministic memory curves.
pub trait MemorySampler: Send + Sync {
    /// Take one sample
    fn sample(&self) -> Result<MemorySample>;
}

/// Linux default page size; /proc/self/statm reports in pages.
const PAGE_SIZE_BYTES: u64 = 4096;

/// Sampler backed by `/proc/self/statm`.
pub struct ProcStatmSampler;

impl MemorySampler for ProcStatmSampler {
    fn sample(&self) -> Result<MemorySample> {
        let statm = std::fs::read_to_string("/proc/self/statm")?;
        let fields: Vec<u64> = statm
            .split_whitespace()
            .filter_map(|f| f.parse().ok())
            .collect();

        // Fields: size resident shared text lib data dirty (pages)
        if fields.len() < 2 {
            return Err(crate::error::BridgeError::Monitor(format!(
                "unexpected /proc/self/statm format: {:?}",
                statm
            )));
        }
        let resident = fields[1];
        let data = fields.get(5).copied().unwrap_or(resident);

        Ok(MemorySample {
            heap_used_bytes: data * PAGE_SIZE_BYTES,
            rss_bytes: resident * PAGE_SIZE_BYTES,
            taken_at: Instant::now(),
        })
    }
}

/// Callback invoked on every pressure-level change with (previous, current)
pub type PressureCallback = Box<dyn Fn(PressureLevel, PressureLevel) + Send + Sync>;

/// Cleanup handler invoked on escalation into high or critical pressure
pub type CleanupCallback = Box<dyn Fn(PressureLevel) -> anyhow::Result<()> + Send + Sync>;

struct MonitorState {
    level: PressureLevel,
    window: VecDeque<(f64, f64)>,
    last_cleanup: Option<Instant>,
}

/// Periodic memory pressure monitor.
pub struct MemoryPressureMonitor {
    config: MonitorConfig,
    sampler: Box<dyn MemorySampler>,
    state: Mutex<MonitorState>,
    pressure_handlers: RwLock<Vec<(Uuid, PressureCallback)>>,
    cleanup_handlers: RwLock<Vec<(Uuid, CleanupCallback)>>,
    running: AtomicBool,
    started: Instant,
}

impl MemoryPressureMonitor {
    /// Create a monitor over the process sampler
    pub fn new(config: MonitorConfig) -> Result<Self> {
        Self::with_sampler(config, Box::new(ProcStatmSampler))
    }

    /// Create a monitor over an injected sampler
    pub fn with_sampler(config: MonitorConfig, sampler: Box<dyn MemorySampler>) -> Result<Self> {
        config.validate()?;

        info!(
            interval_ms = config.sample_interval_ms,
            heap_limit = config.heap_limit_bytes,
            "Creating memory pressure monitor"
        );

        Ok(Self {
            config,
            sampler,
            state: Mutex::new(MonitorState {
                level: PressureLevel::Normal,
                window: VecDeque::new(),
                last_cleanup: None,
            }),
            pressure_handlers: RwLock::new(Vec::new()),
            cleanup_handlers: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            started: Instant::now(),
        })
    }

    /// The configuration this monitor was built with
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// The most recently classified pressure level
    pub fn current_level(&self) -> PressureLevel {
        self.state.lock().level
    }

    /// Register a pressure-change handler; returns its id
    pub fn on_pressure_change(
        &self,
        f: impl Fn(PressureLevel, PressureLevel) + Send + Sync + 'static,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.pressure_handlers.write().push((id, Box::new(f)));
        id
    }

    /// Register a cleanup handler; returns its id
    pub fn on_cleanup(
        &self,
        f: impl Fn(PressureLevel) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.cleanup_handlers.write().push((id, Box::new(f)));
        id
    }

    /// Remove a handler by id. Returns whether one was removed.
    pub fn remove_handler(&self, id: Uuid) -> bool {
        let mut pressure = self.pressure_handlers.write();
        let before = pressure.len();
        pressure.retain(|(hid, _)| *hid != id);
        if pressure.len() != before {
            return true;
        }
        drop(pressure);

        let mut cleanup = self.cleanup_handlers.write();
        let before = cleanup.len();
        cleanup.retain(|(hid, _)| *hid != id);
        cleanup.len() != before
    }

    /// Take one sample, classify it, notify handlers, and run cleanup if
    /// the level escalated past the cooldown.
    pub fn sample_once(&self) -> Result<PressureLevel> {
        let sample = self.sampler.sample()?;
        let level = self.classify(&sample);

        let previous = {
            let mut state = self.state.lock();

            state
                .window
                .push_back((self.started.elapsed().as_secs_f64(), sample.heap_used_bytes as f64));
            while state.window.len() > self.config.trend_window {
                state.window.pop_front();
            }

            let previous = state.level;
            state.level = level;
            previous
        };

        if previous != level {
            info!(previous = %previous, current = %level, "Memory pressure changed");
            for (_, handler) in self.pressure_handlers.read().iter() {
                handler(previous, level);
            }
        }

        if level >= PressureLevel::High {
            self.maybe_run_cleanup(level);
        }

        if let Some(trend) = self.trend() {
            if trend.is_leak_signal(
                self.config.growth_threshold_bytes_per_sec,
                self.config.min_trend_confidence,
            ) {
                warn!(
                    slope_bytes_per_sec = trend.slope_bytes_per_sec,
                    r_squared = trend.r_squared,
                    "Sustained heap growth detected"
                );
            }
        }

        Ok(level)
    }

    /// The current growth trend over the rolling window
    pub fn trend(&self) -> Option<MemoryTrend> {
        let state = self.state.lock();
        let points: Vec<(f64, f64)> = state.window.iter().copied().collect();
        trend::analyze(&points)
    }

    /// The current trend, only when it qualifies as a leak signal
    pub fn leak_signal(&self) -> Option<MemoryTrend> {
        self.trend().filter(|t| {
            t.is_leak_signal(
                self.config.growth_threshold_bytes_per_sec,
                self.config.min_trend_confidence,
            )
        })
    }

    /// Start the periodic sampling task.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::Release);
        let monitor = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(monitor.config.sample_interval_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                if !monitor.running.load(Ordering::Acquire) {
                    break;
                }
                if let Err(e) = monitor.sample_once() {
                    warn!(error = %e, "Memory sample failed");
                }
            }

            debug!("Memory pressure monitor stopped");
        })
    }

    /// Stop the periodic sampling task.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether the sampling task is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn classify(&self, sample: &MemorySample) -> PressureLevel {
        if let Some(ceiling) = self.config.rss_ceiling_bytes {
            if sample.rss_bytes >= ceiling {
                return PressureLevel::Critical;
            }
        }

        let ratio = sample.heap_used_bytes as f64 / self.config.heap_limit_bytes as f64;
        if ratio >= self.config.critical_ratio {
            PressureLevel::Critical
        } else if ratio >= self.config.high_ratio {
            PressureLevel::High
        } else if ratio >= self.config.moderate_ratio {
            PressureLevel::Moderate
        } else {
            PressureLevel::Normal
        }
    }

    fn maybe_run_cleanup(&self, level: PressureLevel) {
        let cooldown = Duration::from_millis(self.config.cleanup_cooldown_ms);
        {
            let mut state = self.state.lock();
            if let Some(last) = state.last_cleanup {
                if last.elapsed() < cooldown {
                    return;
                }
            }
            state.last_cleanup = Some(Instant::now());
        }

        let handlers = self.cleanup_handlers.read();
        info!(level = %level, handlers = handlers.len(), "Running cleanup handlers");
        for (id, handler) in handlers.iter() {
            if let Err(e) = handler(level) {
                // One failing handler must not stop the rest
                error!(handler = %id, error = %e, "Cleanup handler failed");
            }
        }
    }
}

impl std::fmt::Debug for MemoryPressureMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPressureMonitor")
            .field("level", &self.current_level())
            .field("running", &self.is_running())
            .finish()
    }
}
