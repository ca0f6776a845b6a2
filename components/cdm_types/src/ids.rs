//! Process-unique identifiers for media keys instances and key sessions.

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

/// Sentinel value used to pre-fill handle fields before allocation.
pub const UNSET_HANDLE: i32 = -1;

fn next_handle(counter: &AtomicI32) -> i32 {
    counter.fetch_add(1, Ordering::Relaxed)
}

/// Process-unique, monotonically increasing handle for a `MediaKeys` instance.
///
/// Allocated by the IPC layer on `createMediaKeys`. The wire ABI carries this
/// as a signed 32-bit integer with `-1` as the pre-fill sentinel.
///
/// # Examples
///
/// ```
/// use rialto_cdm_types::MediaKeysHandle;
///
/// let a = MediaKeysHandle::next();
/// let b = MediaKeysHandle::next();
/// assert_ne!(a, b);
/// assert_eq!(MediaKeysHandle::unset().as_i32(), -1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaKeysHandle(i32);

static MEDIA_KEYS_HANDLE_COUNTER: AtomicI32 = AtomicI32::new(0);

impl MediaKeysHandle {
    /// Allocates the next process-wide handle. Must only be called on the Main Thread.
    pub fn next() -> Self {
        Self(next_handle(&MEDIA_KEYS_HANDLE_COUNTER))
    }

    /// The pre-fill sentinel (`-1`).
    pub fn unset() -> Self {
        Self(UNSET_HANDLE)
    }

    /// Wraps a raw wire value without allocating.
    pub fn from_i32(value: i32) -> Self {
        Self(value)
    }

    /// Returns the raw wire representation.
    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for MediaKeysHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-unique, monotonically increasing identifier for a `KeySession`.
///
/// Valid only while its owning `MediaKeys` instance is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeySessionId(i32);

static KEY_SESSION_ID_COUNTER: AtomicI32 = AtomicI32::new(0);

impl KeySessionId {
    /// Allocates the next process-wide key session id. Must only be called on the Main Thread.
    pub fn next() -> Self {
        Self(next_handle(&KEY_SESSION_ID_COUNTER))
    }

    /// The pre-fill sentinel (`-1`).
    pub fn unset() -> Self {
        Self(UNSET_HANDLE)
    }

    /// Wraps a raw wire value without allocating.
    pub fn from_i32(value: i32) -> Self {
        Self(value)
    }

    /// Returns the raw wire representation.
    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for KeySessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-unique identifier for a connected IPC client, assigned by the
/// transport layer on connection and used to route disconnect cleanup back
/// to the `MediaKeysHandle`s that client owns (§4.4, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpcClientId(u64);

static IPC_CLIENT_ID_COUNTER: AtomicI32 = AtomicI32::new(0);

impl IpcClientId {
    /// Allocates the next process-wide client id.
    pub fn next() -> Self {
        Self(next_handle(&IPC_CLIENT_ID_COUNTER) as u64)
    }

    /// Wraps a raw id without allocating, e.g. to identify a client in tests.
    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for IpcClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque session id minted by the native DRM library.
///
/// Exposed to clients but never used as a lookup key on the Rust side;
/// [`KeySessionId`] fills that role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CdmKeySessionId(String);

impl CdmKeySessionId {
    /// Wraps a string minted by the native DRM library.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CdmKeySessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_keys_handles_are_monotonic_and_unique() {
        let a = MediaKeysHandle::next();
        let b = MediaKeysHandle::next();
        assert!(b.as_i32() > a.as_i32());
    }

    #[test]
    fn key_session_ids_are_monotonic_and_unique() {
        let a = KeySessionId::next();
        let b = KeySessionId::next();
        assert!(b.as_i32() > a.as_i32());
    }

    #[test]
    fn unset_sentinel_is_negative_one() {
        assert_eq!(MediaKeysHandle::unset().as_i32(), -1);
        assert_eq!(KeySessionId::unset().as_i32(), -1);
    }

    #[test]
    fn cdm_key_session_id_round_trips_string() {
        let id = CdmKeySessionId::new("abc-123");
        assert_eq!(id.as_str(), "abc-123");
    }

    #[test]
    fn ipc_client_ids_are_monotonic_and_unique() {
        let a = IpcClientId::next();
        let b = IpcClientId::next();
        assert_ne!(a, b);
    }
}
