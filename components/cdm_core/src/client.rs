//! The event surface a `KeySession` fans license/key events out through.

use rialto_cdm_types::{KeySessionId, KeyStatusVector};

/// Implemented by whatever owns the wire-facing event emitter for one IPC
/// client (`cdm_ipc::MediaKeysClient` in the full stack). A `KeySession`
/// holds this behind a `Weak` reference — it never keeps the client alive,
/// mirroring the adapter's own weak back-reference (§9 Design Notes).
pub trait IMediaKeysClient: Send + Sync {
    /// The first license/provisioning challenge for a session is ready.
    fn on_license_request(&self, key_session_id: KeySessionId, url: String, message: Vec<u8>);

    /// A subsequent challenge arrived for an already-constructed session
    /// (license renewal, or the Netflix-PlayReady manual fetch path).
    fn on_license_renewal(&self, key_session_id: KeySessionId, message: Vec<u8>);

    /// The accumulated key-status vector for a session, flushed once per
    /// `allKeysUpdated` burst.
    fn on_key_statuses_changed(&self, key_session_id: KeySessionId, statuses: KeyStatusVector);
}
