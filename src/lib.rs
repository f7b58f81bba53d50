//! # Aurum FFI Bridge
//!
//! This library makes it safe to hold, use, and release references to
//! objects living in the native wallet library, which is reachable only
//! through opaque integer handles. The native side demands exactly one
//! destroy call per handle; this crate enforces that with an idempotent
//! disposal protocol, RAII, and a process-wide resource tracker.
//!
//! ## Architecture
//!
//! ```text
//! Wallet business logic
//!     │
//!     │ typed resources (FfiResource, SecureBuffer)
//!     ▼
//! FFI Bridge (this crate)
//!     │
//!     │ raw handles + destroy callbacks
//!     ▼
//! Native wallet library
//! ```
//!
//! ## Features
//!
//! - **Idempotent Disposal**: one native destroy per handle, on every exit
//!   path, including `Drop`
//! - **Branded Handles**: raw integers are validated once and never usable
//!   unvalidated again
//! - **Leak Diagnostics**: weak-reference tracking of every live resource,
//!   age-based leak candidates, collected-without-disposal accounting
//! - **Secure Buffers**: sensitive bytes are overwritten before release
//! - **Memory Pressure**: periodic sampling, cleanup dispatch, and a
//!   growth-trend leak signal

#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod dispose;
pub mod error;
pub mod handle;
pub mod monitor;
pub mod resource;
pub mod secure;
pub mod tracker;

// Re-export commonly used types
pub use config::{MonitorConfig, TrackerConfig};
pub use dispose::{Disposable, DisposeFlag, Teardown};
pub use error::{BridgeError, ErrorCode, FfiError, Result};
pub use handle::{
    unwrap_handle, wrap_handle, HandleFactory, NativeHandle, ResourceKind, ResourceMetadata,
    TrackedHandle,
};
pub use monitor::{MemoryPressureMonitor, MemorySampler, MemoryTrend, PressureLevel};
pub use resource::{FfiResource, ResourceInfo, ResourceOptions};
pub use secure::SecureBuffer;
pub use tracker::{
    DiagnosticReport, LeakInfo, ResourceSnapshot, ResourceTracker, TrackerStatistics,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for the bridge.
///
/// Reads `RUST_LOG` from the environment with the bridge at debug level by
/// default. Call once at process startup.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("aurum_ffi_bridge=debug".parse().expect("valid directive")),
        )
        .init();
}
