//! The disposal protocol shared by every bridge resource.
//!
//! Disposal is idempotent: the first call performs teardown, every later
//! call is a no-op. The guard flag is flipped before the teardown body runs,
//! so a re-entrant or overlapping dispose attempt observes the resource as
//! already disposed. Once disposed, a resource stays dead: teardown is
//! never retried, even when it failed.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error};

use crate::error::{FfiError, Result};
use crate::handle::ResourceKind;

/// Synchronous teardown callback (typically a blocking native destroy call)
pub type SyncTeardown = Box<dyn FnOnce() -> Result<()> + Send>;

/// Asynchronous teardown callback
pub type AsyncTeardown =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send>;

/// The teardown a resource runs exactly once on disposal.
///
/// The callback must close over the handle value captured at construction
/// time; teardown never re-reads state that disposal may already have
/// cleared.
pub enum Teardown {
    /// Blocking teardown, e.g. a native `*_destroy` call
    Sync(SyncTeardown),
    /// Teardown that awaits an async native call
    Async(AsyncTeardown),
}

impl Teardown {
    /// Wrap a synchronous callback
    pub fn sync(f: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Teardown::Sync(Box::new(f))
    }

    /// Wrap an asynchronous callback
    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Teardown::Async(Box::new(move || Box::pin(f())))
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Teardown::Sync(_) => f.write_str("Teardown::Sync"),
            Teardown::Async(_) => f.write_str("Teardown::Async"),
        }
    }
}

/// Call-once disposal guard.
///
/// The flag is set before teardown runs; whichever caller wins the swap owns
/// the single teardown execution.
#[derive(Debug, Default)]
pub struct DisposeFlag {
    disposed: AtomicBool,
}

impl DisposeFlag {
    /// Create a new, not-yet-disposed flag
    pub fn new() -> Self {
        Self {
            disposed: AtomicBool::new(false),
        }
    }

    /// Whether disposal has begun (or completed)
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Attempt to begin disposal.
    ///
    /// Returns `true` for exactly one caller; all others see `false` and
    /// must treat dispose as a no-op.
    pub fn begin_dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }
}

/// Contract implemented by every disposable bridge resource.
pub trait Disposable {
    /// The error raised when the resource is used after disposal
    fn disposed_error(&self) -> FfiError;

    /// Whether this resource has been disposed
    fn is_disposed(&self) -> bool;

    /// Dispose the resource.
    ///
    /// Idempotent: the first call performs teardown, subsequent calls
    /// return `Ok(())` without side effects.
    fn dispose(&mut self) -> Result<()>;

    /// Fail with the disposed-state error when already disposed.
    ///
    /// Every non-disposal operation calls this first.
    fn ensure_not_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            Err(self.disposed_error().into())
        } else {
            Ok(())
        }
    }
}

/// Run a teardown on a best-effort cleanup path.
///
/// Failures are logged and swallowed: one resource's teardown failure must
/// not abort the sweep that invoked it. Async teardowns are detached onto
/// the current tokio runtime.
pub fn run_teardown_quietly(kind: ResourceKind, teardown: Teardown) {
    match teardown {
        Teardown::Sync(f) => {
            if let Err(e) = f() {
                error!(kind = %kind, error = %e, "Teardown failed during cleanup sweep");
            }
        }
        Teardown::Async(f) => detach_async_teardown(kind, f()),
    }
}

/// Detach an async teardown future onto the current tokio runtime.
///
/// Used when a synchronous path (sync dispose, `Drop`) must release a
/// resource whose teardown is async. The outcome is logged inside the
/// spawned task. Without a runtime the teardown cannot run; that is logged
/// at `error!` so operators see the skipped native release.
pub fn detach_async_teardown(
    kind: ResourceKind,
    fut: Pin<Box<dyn Future<Output = Result<()>> + Send>>,
) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                match fut.await {
                    Ok(()) => debug!(kind = %kind, "Detached async teardown completed"),
                    Err(e) => {
                        error!(kind = %kind, error = %e, "Detached async teardown failed")
                    }
                }
            });
        }
        Err(_) => {
            error!(
                kind = %kind,
                "No tokio runtime available, async teardown skipped; native resource may leak"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_flag_starts_undisposed() {
        let flag = DisposeFlag::new();
        assert!(!flag.is_disposed());
    }

    #[test]
    fn test_flag_single_winner() {
        let flag = DisposeFlag::new();
        assert!(flag.begin_dispose());
        assert!(flag.is_disposed());
        assert!(!flag.begin_dispose());
        assert!(!flag.begin_dispose());
    }

    #[test]
    fn test_flag_concurrent_single_winner() {
        let flag = Arc::new(DisposeFlag::new());
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flag = Arc::clone(&flag);
                let wins = Arc::clone(&wins);
                std::thread::spawn(move || {
                    if flag.begin_dispose() {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_quiet_teardown_swallows_errors() {
        let teardown = Teardown::sync(|| Err(FfiError::internal("boom").into()));
        // Must not panic or propagate
        run_teardown_quietly(ResourceKind::Wallet, teardown);
    }

    #[tokio::test]
    async fn test_detached_async_teardown_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        let teardown = Teardown::asynchronous(move || async move {
            ran_clone.store(true, Ordering::SeqCst);
            Ok(())
        });
        run_teardown_quietly(ResourceKind::Transaction, teardown);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
