//! Key status reporting, aggregated per session between `keyUpdated` bursts.

/// The status of an individual key, collapsed from a larger native
/// vocabulary (all downscaled/HW/internal variants collapse to
/// `InternalError`; HDCP variants collapse to `OutputRestricted`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyStatus {
    /// The key is usable for decryption.
    Usable,
    /// The key has expired.
    Expired,
    /// Output is restricted (e.g. HDCP requirements not met).
    OutputRestricted,
    /// The key status is still pending.
    Pending,
    /// An internal error occurred while determining the key's status.
    InternalError,
    /// The key has been released.
    Released,
}

/// An ordered sequence of `(keyId, KeyStatus)` pairs, accumulated per
/// session between `keyUpdated` notifications and flushed as a single
/// `keyStatusesChanged` event on `allKeysUpdated`.
pub type KeyStatusVector = Vec<(Vec<u8>, KeyStatus)>;
