//! Validated, branded wrappers around raw native handles.
//!
//! The native wallet library identifies every object by an opaque positive
//! integer. This module brands that integer as a [`NativeHandle`] at the FFI
//! boundary, resolves the destroy operation for each resource kind, and
//! tracks access metadata on every use of a handle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::dispose::{Disposable, DisposeFlag};
use crate::error::{FfiError, Result};

/// Opaque, validated reference to a native-side object.
///
/// A `NativeHandle` is not a pointer and carries no type information; it is
/// meaningful only as an argument to native calls. The constructor enforces
/// the positivity invariant: a zero or negative value never becomes a
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeHandle(i64);

impl NativeHandle {
    /// Validate and brand a raw handle value.
    ///
    /// Fails with an `InvalidConfig` error unless `raw > 0`.
    pub fn wrap(raw: i64) -> Result<Self> {
        if raw > 0 {
            Ok(Self(raw))
        } else {
            Err(FfiError::invalid_handle(raw).into())
        }
    }

    /// The raw integer value, for use at a native call site.
    pub fn raw(&self) -> i64 {
        self.0
    }

    /// Unwrap into the raw integer value.
    pub fn into_raw(self) -> i64 {
        self.0
    }

    /// Structural check only: is `raw` a value `wrap` would accept?
    ///
    /// This says nothing about whether the native object is still alive;
    /// the bridge cannot inspect native memory.
    pub fn is_valid_raw(raw: i64) -> bool {
        raw > 0
    }
}

impl std::fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handle({})", self.0)
    }
}

/// Validate and brand a raw handle value.
pub fn wrap_handle(raw: i64) -> Result<NativeHandle> {
    NativeHandle::wrap(raw)
}

/// Unwrap a handle back to its raw value. Pure and total.
pub fn unwrap_handle(handle: NativeHandle) -> i64 {
    handle.into_raw()
}

/// The closed set of native resource kinds.
///
/// Used to resolve the default native destroy operation and to group
/// resources in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    /// A wallet instance
    Wallet,
    /// A completed transaction
    Transaction,
    /// An address-book contact
    Contact,
    /// A wallet address
    Address,
    /// A recovery seed word list
    SeedWords,
    /// A comms/transport configuration object
    CommsConfig,
}

impl ResourceKind {
    /// All kinds, in diagnostic-grouping order
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Wallet,
        ResourceKind::Transaction,
        ResourceKind::Contact,
        ResourceKind::Address,
        ResourceKind::SeedWords,
        ResourceKind::CommsConfig,
    ];

    /// The default native destroy operation for this kind
    pub fn destroy_operation(&self) -> &'static str {
        match self {
            ResourceKind::Wallet => "wallet_destroy",
            ResourceKind::Transaction => "transaction_destroy",
            ResourceKind::Contact => "contact_destroy",
            ResourceKind::Address => "address_destroy",
            ResourceKind::SeedWords => "seed_words_destroy",
            ResourceKind::CommsConfig => "comms_config_destroy",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Wallet => write!(f, "wallet"),
            ResourceKind::Transaction => write!(f, "transaction"),
            ResourceKind::Contact => write!(f, "contact"),
            ResourceKind::Address => write!(f, "address"),
            ResourceKind::SeedWords => write!(f, "seed_words"),
            ResourceKind::CommsConfig => write!(f, "comms_config"),
        }
    }
}

/// Access metadata recorded for a handle.
///
/// `kind` and `created_at_ms` are immutable; the rest is updated on every
/// successful access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    /// The resource kind
    pub kind: ResourceKind,
    /// Creation time, epoch milliseconds
    pub created_at_ms: i64,
    /// Last successful access, epoch milliseconds
    pub last_accessed_at_ms: i64,
    /// Number of successful accesses
    pub access_count: u64,
    /// Diagnostic tags
    pub tags: HashSet<String>,
}

/// A validated handle plus per-handle access metadata and disposal state.
///
/// Every access through [`value`](TrackedHandle::value) or
/// [`raw`](TrackedHandle::raw) asserts the handle is not disposed, then
/// updates the access metadata before returning the value, so the metadata
/// update is ordered before the native call it accompanies.
#[derive(Debug)]
pub struct TrackedHandle {
    handle: NativeHandle,
    kind: ResourceKind,
    destroy_op: String,
    tags: HashSet<String>,
    created_at_ms: i64,
    created: Instant,
    last_accessed_at_ms: AtomicI64,
    access_count: AtomicU64,
    flag: DisposeFlag,
}

impl TrackedHandle {
    /// Validate `raw` and build a tracked handle with the kind's default
    /// destroy operation.
    pub fn new(kind: ResourceKind, raw: i64) -> Result<Self> {
        let handle = NativeHandle::wrap(raw)?;
        let now_ms = Utc::now().timestamp_millis();

        Ok(Self {
            handle,
            kind,
            destroy_op: kind.destroy_operation().to_string(),
            tags: HashSet::new(),
            created_at_ms: now_ms,
            created: Instant::now(),
            last_accessed_at_ms: AtomicI64::new(now_ms),
            access_count: AtomicU64::new(0),
            flag: DisposeFlag::new(),
        })
    }

    /// Override the destroy operation for this instance
    pub fn with_destroy_op(mut self, op: impl Into<String>) -> Self {
        self.destroy_op = op.into();
        self
    }

    /// Attach diagnostic tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// The handle value, with access metadata updated.
    ///
    /// Fails with `ResourceDisposed` once the handle has been disposed.
    pub fn value(&self) -> Result<NativeHandle> {
        self.ensure_not_disposed()?;
        self.record_access();
        Ok(self.handle)
    }

    /// The raw handle value, with access metadata updated.
    pub fn raw(&self) -> Result<i64> {
        self.value().map(NativeHandle::into_raw)
    }

    /// The resource kind
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The native destroy operation name for this handle
    pub fn destroy_op(&self) -> &str {
        &self.destroy_op
    }

    /// Diagnostic tags
    pub fn tags(&self) -> &HashSet<String> {
        &self.tags
    }

    /// Time since the handle was created
    pub fn age(&self) -> std::time::Duration {
        self.created.elapsed()
    }

    /// Snapshot the current access metadata
    pub fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata {
            kind: self.kind,
            created_at_ms: self.created_at_ms,
            last_accessed_at_ms: self.last_accessed_at_ms.load(Ordering::Acquire),
            access_count: self.access_count.load(Ordering::Acquire),
            tags: self.tags.clone(),
        }
    }

    /// The raw value without an access-metadata update or disposed check.
    ///
    /// Only for disposal paths and diagnostics; normal native calls go
    /// through [`value`](TrackedHandle::value).
    pub fn peek_raw(&self) -> i64 {
        self.handle.into_raw()
    }

    fn record_access(&self) {
        self.access_count.fetch_add(1, Ordering::AcqRel);
        self.last_accessed_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }
}

impl Disposable for TrackedHandle {
    fn disposed_error(&self) -> FfiError {
        FfiError::resource_disposed(self.kind)
    }

    fn is_disposed(&self) -> bool {
        self.flag.is_disposed()
    }

    fn dispose(&mut self) -> Result<()> {
        self.flag.begin_dispose();
        Ok(())
    }
}

impl PartialEq for TrackedHandle {
    /// Two wrappers are equal iff they brand the same raw value as the same
    /// kind.
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle && self.kind == other.kind
    }
}

impl Eq for TrackedHandle {}

/// Factory resolving the destroy operation per resource kind.
pub struct HandleFactory;

impl HandleFactory {
    /// Create a tracked handle for any kind
    pub fn create(kind: ResourceKind, raw: i64) -> Result<TrackedHandle> {
        TrackedHandle::new(kind, raw)
    }

    /// Create a wallet handle
    pub fn create_wallet(raw: i64) -> Result<TrackedHandle> {
        TrackedHandle::new(ResourceKind::Wallet, raw)
    }

    /// Create a transaction handle
    pub fn create_transaction(raw: i64) -> Result<TrackedHandle> {
        TrackedHandle::new(ResourceKind::Transaction, raw)
    }

    /// Create a contact handle
    pub fn create_contact(raw: i64) -> Result<TrackedHandle> {
        TrackedHandle::new(ResourceKind::Contact, raw)
    }

    /// Create an address handle
    pub fn create_address(raw: i64) -> Result<TrackedHandle> {
        TrackedHandle::new(ResourceKind::Address, raw)
    }

    /// Create a seed-words handle
    pub fn create_seed_words(raw: i64) -> Result<TrackedHandle> {
        TrackedHandle::new(ResourceKind::SeedWords, raw)
    }

    /// Create a handle with a per-instance destroy operation override
    pub fn create_with_destroy_op(
        kind: ResourceKind,
        raw: i64,
        op: impl Into<String>,
    ) -> Result<TrackedHandle> {
        Ok(TrackedHandle::new(kind, raw)?.with_destroy_op(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        for raw in [1i64, 42, 7_000_000_000] {
            let handle = wrap_handle(raw).unwrap();
            assert_eq!(unwrap_handle(handle), raw);
        }
    }

    #[test]
    fn test_wrap_rejects_non_positive() {
        for raw in [0i64, -1, -42, i64::MIN] {
            let err = wrap_handle(raw).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidConfig);
        }
    }

    #[test]
    fn test_validate_is_structural() {
        assert!(NativeHandle::is_valid_raw(1));
        assert!(!NativeHandle::is_valid_raw(0));
        assert!(!NativeHandle::is_valid_raw(-3));
    }

    #[test]
    fn test_destroy_operation_resolution() {
        assert_eq!(ResourceKind::Wallet.destroy_operation(), "wallet_destroy");
        assert_eq!(
            ResourceKind::SeedWords.destroy_operation(),
            "seed_words_destroy"
        );
    }

    #[test]
    fn test_access_updates_metadata() {
        let handle = HandleFactory::create_wallet(42).unwrap();
        assert_eq!(handle.metadata().access_count, 0);

        handle.value().unwrap();
        handle.raw().unwrap();

        let meta = handle.metadata();
        assert_eq!(meta.access_count, 2);
        assert_eq!(meta.kind, ResourceKind::Wallet);
        assert!(meta.last_accessed_at_ms >= meta.created_at_ms);
    }

    #[test]
    fn test_access_after_dispose_fails() {
        let mut handle = HandleFactory::create_wallet(42).unwrap();
        handle.dispose().unwrap();

        let err = handle.value().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResourceDisposed);

        // Still idempotent
        handle.dispose().unwrap();
    }

    #[test]
    fn test_handle_equality() {
        let a = HandleFactory::create_wallet(7).unwrap();
        let b = HandleFactory::create_wallet(7).unwrap();
        let c = HandleFactory::create_transaction(7).unwrap();
        let d = HandleFactory::create_wallet(8).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_destroy_op_override() {
        let handle =
            HandleFactory::create_with_destroy_op(ResourceKind::Wallet, 3, "wallet_destroy_v2")
                .unwrap();
        assert_eq!(handle.destroy_op(), "wallet_destroy_v2");
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&ResourceKind::SeedWords).unwrap();
        assert_eq!(json, "\"seedWords\"");
    }
}
