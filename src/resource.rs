//! The concrete resource unit handed to business logic.
//!
//! An [`FfiResource`] owns exactly one native handle and exactly one
//! teardown callback. The callback closes over the handle value captured at
//! construction time, so teardown never re-reads a field that disposal may
//! already have cleared. Construction registers the resource with a
//! [`ResourceTracker`]; explicit disposal unregisters it, while a resource
//! dropped without disposal still releases the native side through `Drop`
//! and is later swept by the tracker as collected-without-disposal.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::dispose::{detach_async_teardown, run_teardown_quietly, Disposable, DisposeFlag, Teardown};
use crate::error::{FfiError, Result};
use crate::handle::{NativeHandle, ResourceKind, ResourceMetadata, TrackedHandle};
use crate::tracker::{LivenessToken, RegisterOptions, ResourceTracker};

/// Per-resource construction options
#[derive(Debug, Default)]
pub struct ResourceOptions {
    /// Diagnostic tags attached to the handle and the tracker entry
    pub tags: Vec<String>,
}

/// Diagnostic view of one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// Tracker id
    pub id: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Raw native handle value
    pub handle: i64,
    /// Whether the resource has been disposed
    pub disposed: bool,
    /// Whether a teardown callback is still held
    pub has_teardown: bool,
    /// Age since construction in milliseconds
    pub age_ms: u64,
    /// Access metadata snapshot
    pub metadata: ResourceMetadata,
}

/// A typed object owning one native handle and one teardown callback.
pub struct FfiResource {
    handle: TrackedHandle,
    teardown: Mutex<Option<Teardown>>,
    flag: DisposeFlag,
    // Keeps the tracker's weak reference alive for exactly this resource's lifetime
    _liveness: Arc<LivenessToken>,
    tracker: Arc<ResourceTracker>,
    tracker_id: String,
    created: Instant,
}

impl FfiResource {
    /// Validate `raw`, capture the teardown, and register with the tracker.
    pub fn new(
        kind: ResourceKind,
        raw: i64,
        teardown: Teardown,
        tracker: &Arc<ResourceTracker>,
    ) -> Result<Self> {
        Self::with_options(kind, raw, teardown, tracker, ResourceOptions::default())
    }

    /// As [`new`](FfiResource::new), with tags.
    pub fn with_options(
        kind: ResourceKind,
        raw: i64,
        teardown: Teardown,
        tracker: &Arc<ResourceTracker>,
        options: ResourceOptions,
    ) -> Result<Self> {
        let native = NativeHandle::wrap(raw)?;
        let handle = TrackedHandle::new(kind, raw)?.with_tags(options.tags.iter().cloned());

        let token = Arc::new(LivenessToken::new());
        let tracker_id = tracker.register(
            &token,
            kind,
            RegisterOptions {
                handle: Some(native),
                tags: options.tags,
            },
        );

        debug!(id = %tracker_id, kind = %kind, handle = raw, "Constructed FFI resource");

        Ok(Self {
            handle,
            teardown: Mutex::new(Some(teardown)),
            flag: DisposeFlag::new(),
            _liveness: token,
            tracker: Arc::clone(tracker),
            tracker_id,
            created: Instant::now(),
        })
    }

    /// The resource kind
    pub fn kind(&self) -> ResourceKind {
        self.handle.kind()
    }

    /// The tracker id assigned at registration
    pub fn tracker_id(&self) -> &str {
        &self.tracker_id
    }

    /// The native handle, with access metadata updated.
    ///
    /// Fails with `ResourceDisposed` once disposed.
    pub fn handle(&self) -> Result<NativeHandle> {
        self.ensure_not_disposed()?;
        self.handle.value()
    }

    /// The raw handle value for a native call site, with access metadata
    /// updated.
    pub fn raw(&self) -> Result<i64> {
        self.ensure_not_disposed()?;
        self.handle.raw()
    }

    /// Age since construction
    pub fn age(&self) -> std::time::Duration {
        self.created.elapsed()
    }

    /// Diagnostic view of this resource
    pub fn resource_info(&self) -> ResourceInfo {
        ResourceInfo {
            id: self.tracker_id.clone(),
            kind: self.handle.kind(),
            handle: self.handle.peek_raw(),
            disposed: self.flag.is_disposed(),
            has_teardown: self.teardown.lock().is_some(),
            age_ms: self.age().as_millis() as u64,
            metadata: self.handle.metadata(),
        }
    }

    /// Dispose asynchronously, awaiting an async teardown.
    ///
    /// The idempotency check completes before the first suspension point:
    /// overlapping dispose calls cannot both pass it.
    pub async fn dispose_async(&mut self) -> Result<()> {
        if !self.flag.begin_dispose() {
            return Ok(());
        }

        let teardown = self.teardown.lock().take();
        let result = match teardown {
            Some(Teardown::Sync(f)) => f(),
            Some(Teardown::Async(f)) => f().await,
            None => Ok(()),
        };

        self.finish_dispose(result)
    }

    /// Shared tail of both dispose paths: mark the handle, unregister,
    /// log, and map a teardown failure for the caller.
    fn finish_dispose(&mut self, result: Result<()>) -> Result<()> {
        let kind = self.handle.kind();
        let _ = self.handle.dispose();
        let age_ms = self.created.elapsed().as_millis() as u64;
        self.tracker.unregister(&self.tracker_id);

        match result {
            Ok(()) => {
                debug!(id = %self.tracker_id, kind = %kind, age_ms, "Disposed FFI resource");
                Ok(())
            }
            Err(e) => {
                // The resource stays disposed: a handle whose destroy may
                // have partially run must never be reusable.
                error!(id = %self.tracker_id, kind = %kind, error = %e, "Native destroy failed");
                Err(FfiError::native_destroy_failed(kind, e.to_string()).into())
            }
        }
    }
}

impl Disposable for FfiResource {
    fn disposed_error(&self) -> FfiError {
        FfiError::resource_disposed(self.handle.kind())
    }

    fn is_disposed(&self) -> bool {
        self.flag.is_disposed()
    }

    /// Dispose synchronously.
    ///
    /// Runs the teardown exactly once; an async teardown is detached onto
    /// the current tokio runtime. A teardown failure is re-thrown, since
    /// the caller asked for teardown and must know it failed, but the
    /// resource is left disposed regardless.
    fn dispose(&mut self) -> Result<()> {
        if !self.flag.begin_dispose() {
            return Ok(());
        }

        let teardown = self.teardown.lock().take();
        let result = match teardown {
            Some(Teardown::Sync(f)) => f(),
            Some(Teardown::Async(f)) => {
                detach_async_teardown(self.handle.kind(), f());
                Ok(())
            }
            None => Ok(()),
        };

        self.finish_dispose(result)
    }
}

impl Drop for FfiResource {
    fn drop(&mut self) {
        if self.flag.begin_dispose() {
            warn!(
                id = %self.tracker_id,
                kind = %self.handle.kind(),
                "FFI resource dropped without explicit disposal"
            );
            if let Some(teardown) = self.teardown.lock().take() {
                run_teardown_quietly(self.handle.kind(), teardown);
            }
            // No unregister here: the tracker's next sweep observes the
            // dead weak reference and credits gc_cleaned, keeping the
            // dropped-without-disposal signal visible.
        }
    }
}

impl std::fmt::Debug for FfiResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfiResource")
            .field("id", &self.tracker_id)
            .field("kind", &self.handle.kind())
            .field("handle", &self.handle.peek_raw())
            .field("disposed", &self.flag.is_disposed())
            .finish()
    }
}
