//! Secure byte container for sensitive material.
//!
//! Seeds, keys, and passphrases live in a [`SecureBuffer`]: an owned copy of
//! the bytes that is overwritten before release. Clearing first fills the
//! buffer with fresh random bytes and then zeroizes it, so no stale copy of
//! the content survives the wipe, even transiently. Once cleared, only
//! length and state queries remain legal; every accessor fails, and the
//! `Display`/`Debug` output never reveals content in either state.

use std::time::{Duration, Instant};

use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use zeroize::Zeroize;

use crate::dispose::Disposable;
use crate::error::{FfiError, Result};

/// A disposable byte container that wipes its content on release.
pub struct SecureBuffer {
    bytes: Vec<u8>,
    original_len: usize,
    created: Instant,
    cleared: bool,
}

impl SecureBuffer {
    /// Copy `bytes` into a new owned buffer.
    ///
    /// The caller's slice is never aliased; the buffer owns its only copy.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    /// Take ownership of `bytes`.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let original_len = bytes.len();
        Self {
            bytes,
            original_len,
            created: Instant::now(),
            cleared: false,
        }
    }

    /// Copy a UTF-8 string's bytes into a new buffer.
    pub fn from_string(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    /// Decode hex-encoded text into a new buffer.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| FfiError::invalid_config("hex input", e.to_string()))?;
        Ok(Self::from_vec(bytes))
    }

    /// Decode base64-encoded text into a new buffer.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| FfiError::invalid_config("base64 input", e.to_string()))?;
        Ok(Self::from_vec(bytes))
    }

    /// Allocate a zero-filled buffer of `len` bytes.
    pub fn alloc(len: usize) -> Self {
        Self::from_vec(vec![0u8; len])
    }

    /// Allocate a buffer of `len` cryptographically random bytes.
    pub fn random(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_vec(bytes)
    }

    /// Current length in bytes; 0 once cleared.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer is empty (a cleared buffer is empty).
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the content has been wiped.
    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    /// The length the buffer held before any clear.
    pub fn original_len(&self) -> usize {
        self.original_len
    }

    /// Time since the buffer was created.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Borrow the content, e.g. to hand to a native call.
    pub fn as_slice(&self) -> Result<&[u8]> {
        self.ensure_live("read")?;
        Ok(&self.bytes)
    }

    /// A fresh owned copy of this buffer.
    pub fn copy(&self) -> Result<SecureBuffer> {
        self.ensure_live("copy")?;
        Ok(Self::from_bytes(&self.bytes))
    }

    /// Hex-encode the content.
    pub fn to_hex(&self) -> Result<String> {
        self.ensure_live("hex-encode")?;
        Ok(hex::encode(&self.bytes))
    }

    /// Base64-encode the content.
    pub fn to_base64(&self) -> Result<String> {
        self.ensure_live("base64-encode")?;
        Ok(general_purpose::STANDARD.encode(&self.bytes))
    }

    /// Decode the content as UTF-8 text.
    ///
    /// Named unsafe because the returned `String` is an unprotected copy of
    /// sensitive content; callers own its lifetime.
    pub fn to_string_unsafe(&self) -> Result<String> {
        self.ensure_live("decode")?;
        String::from_utf8(self.bytes.clone())
            .map_err(|e| FfiError::invalid_config("utf-8 content", e.to_string()).into())
    }

    /// Copy the byte range `[start, end)` into a new buffer.
    pub fn slice(&self, start: usize, end: usize) -> Result<SecureBuffer> {
        self.ensure_live("slice")?;
        if start > end || end > self.bytes.len() {
            return Err(FfiError::invalid_config(
                "slice range",
                format!("{}..{} out of bounds for length {}", start, end, self.bytes.len()),
            )
            .into());
        }
        Ok(Self::from_bytes(&self.bytes[start..end]))
    }

    /// Concatenate this buffer with another into a new buffer.
    pub fn concat(&self, other: &SecureBuffer) -> Result<SecureBuffer> {
        self.ensure_live("concatenate")?;
        other.ensure_live("concatenate")?;
        let mut joined = Vec::with_capacity(self.bytes.len() + other.bytes.len());
        joined.extend_from_slice(&self.bytes);
        joined.extend_from_slice(&other.bytes);
        Ok(Self::from_vec(joined))
    }

    /// Overwrite every byte with `byte`.
    pub fn fill(&mut self, byte: u8) -> Result<()> {
        self.ensure_live("fill")?;
        for b in self.bytes.iter_mut() {
            *b = byte;
        }
        Ok(())
    }

    /// Constant-time equality with another buffer.
    ///
    /// Returns `false`, never an error, when either buffer is cleared.
    pub fn equals(&self, other: &SecureBuffer) -> bool {
        if self.cleared || other.cleared {
            return false;
        }
        constant_time_eq(&self.bytes, &other.bytes)
    }

    /// Constant-time equality with a raw byte slice.
    ///
    /// Returns `false`, never an error, when this buffer is cleared.
    pub fn equals_bytes(&self, raw: &[u8]) -> bool {
        if self.cleared {
            return false;
        }
        constant_time_eq(&self.bytes, raw)
    }

    /// Wipe the content: random-fill, then zeroize. Idempotent.
    pub fn clear(&mut self) {
        if self.cleared {
            return;
        }
        rand::thread_rng().fill_bytes(&mut self.bytes);
        self.bytes.zeroize();
        self.cleared = true;
    }

    fn ensure_live(&self, operation: &str) -> Result<()> {
        if self.cleared {
            Err(FfiError::buffer_cleared(operation).into())
        } else {
            Ok(())
        }
    }
}

/// XOR-accumulating comparison: the full length is always walked, so timing
/// does not depend on where the first mismatch sits. A length mismatch is
/// not secret and may return early.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

impl Disposable for SecureBuffer {
    fn disposed_error(&self) -> FfiError {
        FfiError::buffer_cleared("access")
    }

    fn is_disposed(&self) -> bool {
        self.cleared
    }

    fn dispose(&mut self) -> Result<()> {
        self.clear();
        Ok(())
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Display for SecureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cleared {
            f.write_str("[SecureBuffer: cleared]")
        } else {
            f.write_str("[SecureBuffer: ***]")
        }
    }
}

impl std::fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}
