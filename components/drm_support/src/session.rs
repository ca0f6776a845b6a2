//! `OcdmSession`: the per-session native DRM handle and its callback
//! surface.

use crate::error::NativeStatus;
use crate::system::{NativeDrm, NativeSessionId};
use rialto_cdm_types::{CdmKeySessionId, KeyStatusVector, MediaKeyErrorStatus};
use std::sync::{Arc, OnceLock, Weak};

/// Callbacks the native DRM session delivers back up to the Key Session
/// layer. Implemented by whatever owns an `OcdmSession` (normally
/// `cdm_core::KeySession`).
///
/// Delivered via [`crate::NativeDrm::create_session`]'s `client` argument,
/// held as a `Weak` reference: the adapter never keeps its owner alive.
pub trait IOcdmSessionClient: Send + Sync {
    /// A license/provisioning request challenge is ready to be sent upstream,
    /// alongside the license server `url` the native library extracted from
    /// the challenge (empty if it didn't provide one).
    fn on_process_challenge(&self, url: String, challenge: Vec<u8>);

    /// A single key's status changed.
    fn on_key_updated(&self, key_id: Vec<u8>);

    /// All keys for the session have finished updating; `statuses` is the
    /// full snapshot delivered in the same callback.
    fn on_all_keys_updated(&self, statuses: KeyStatusVector);

    /// The native session reported an asynchronous error.
    fn on_error(&self, status: MediaKeyErrorStatus, system_code: u32);
}

/// Lazily resolved once per process: whether the legacy `decrypt` symbol
/// (as opposed to the preferred `decryptBuffer`) is present in the loaded
/// native library. Resolved on first use and never re-checked — the
/// native library does not change shape mid-process.
static LEGACY_DECRYPT_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Per-session wrapper over the native DRM library (`C1`).
///
/// Every method here forwards 1:1 to the matching native call and
/// translates the resulting [`NativeStatus`] into a [`MediaKeyErrorStatus`].
/// Callers are responsible for serializing access onto the Main Thread;
/// this type performs no locking of its own.
pub struct OcdmSession {
    backend: Arc<dyn NativeDrm>,
    handle: NativeSessionId,
    constructed: bool,
}

impl OcdmSession {
    pub(crate) fn new(backend: Arc<dyn NativeDrm>, handle: NativeSessionId) -> Self {
        Self {
            backend,
            handle,
            constructed: false,
        }
    }

    /// Registers `client` to receive this session's native callbacks.
    /// Typically called once, immediately after the owning type has a
    /// stable self-reference to hand out (e.g. from `Arc::new_cyclic`).
    pub fn bind_client(&self, client: Weak<dyn IOcdmSessionClient>) {
        self.backend.bind_session_client(self.handle, client);
    }

    /// Constructs the underlying native session state. Idempotent: calling
    /// this a second time on an already-constructed session is a no-op that
    /// reports success, it does not re-enter the native library.
    pub fn construct_session(
        &mut self,
        init_data_type: &str,
        init_data: &[u8],
        cdm_key_session_id: &CdmKeySessionId,
    ) -> MediaKeyErrorStatus {
        if self.constructed {
            return MediaKeyErrorStatus::Ok;
        }
        let status = self
            .backend
            .construct_session(self.handle, init_data_type, init_data, cdm_key_session_id.as_str());
        if status.is_ok() {
            self.constructed = true;
        }
        status.into_status()
    }

    /// Fetches a license/provisioning challenge via the native library's
    /// two-step size-then-fill protocol: first a call to size the buffer,
    /// then a call to fill it. Both calls are exposed on [`NativeDrm`]
    /// individually so this two-step texture is independently observable
    /// in tests.
    pub fn get_challenge_data(&self, is_ldl: bool) -> Result<Vec<u8>, MediaKeyErrorStatus> {
        let size = self
            .backend
            .get_challenge_data_size(self.handle, is_ldl)
            .map_err(NativeStatus::into_status)?;
        let mut buffer = vec![0u8; size];
        self.backend
            .fill_challenge_data(self.handle, is_ldl, &mut buffer)
            .ok_or_err()?;
        Ok(buffer)
    }

    /// Cancels an in-flight challenge request.
    pub fn cancel_challenge_data(&self) -> MediaKeyErrorStatus {
        self.backend.cancel_challenge_data(self.handle).into_status()
    }

    /// Stores license data returned by the server. Used for the
    /// Netflix-PlayReady manual two-step flow instead of [`Self::update`].
    pub fn store_license_data(&self, response: &[u8]) -> MediaKeyErrorStatus {
        self.backend.store_license_data(self.handle, response).into_status()
    }

    /// Loads a previously persisted session by its CDM key session id.
    pub fn load(&self) -> MediaKeyErrorStatus {
        self.backend.load(self.handle).into_status()
    }

    /// Feeds a license server response into the native session.
    pub fn update(&self, response: &[u8]) -> MediaKeyErrorStatus {
        self.backend.update(self.handle, response).into_status()
    }

    /// Removes all keys associated with the session.
    pub fn remove(&self) -> MediaKeyErrorStatus {
        self.backend.remove(self.handle).into_status()
    }

    /// Closes the native session without destroying it.
    pub fn close(&self) -> MediaKeyErrorStatus {
        self.backend.close(self.handle).into_status()
    }

    /// Releases resources held for the decrypt path without affecting
    /// session key state.
    pub fn clean_decrypt_context(&self) -> MediaKeyErrorStatus {
        self.backend.clean_decrypt_context(self.handle).into_status()
    }

    /// Unconditionally destroys the native session. Calling any other
    /// method on this `OcdmSession` afterwards is a logic error upstream;
    /// the adapter itself does not guard against it.
    pub fn destruct_session(&mut self) {
        self.backend.destruct_session(self.handle);
        self.constructed = false;
    }

    /// Decrypts `buffer` in place using the preferred `decryptBuffer`
    /// native entry point.
    pub fn decrypt_buffer(&self, buffer: &mut [u8], key_id: &[u8], iv: &[u8]) -> MediaKeyErrorStatus {
        self.backend
            .decrypt_buffer(self.handle, buffer, key_id, iv)
            .into_status()
    }

    /// Decrypts `buffer` in place via the deprecated legacy `decrypt` entry
    /// point. Whether the symbol exists at all is resolved once per
    /// process and cached in [`LEGACY_DECRYPT_AVAILABLE`]; if it's absent,
    /// returns [`MediaKeyErrorStatus::InterfaceNotImplemented`] without
    /// calling into the native library.
    pub fn decrypt(&self, buffer: &mut [u8], key_id: &[u8], iv: &[u8]) -> MediaKeyErrorStatus {
        let available = *LEGACY_DECRYPT_AVAILABLE.get_or_init(|| self.backend.has_legacy_decrypt());
        if !available {
            return MediaKeyErrorStatus::InterfaceNotImplemented;
        }
        self.backend.decrypt(self.handle, buffer, key_id, iv).into_status()
    }

    /// The native session's current key status snapshot, collapsed onto the
    /// neutral vocabulary (§3).
    pub fn get_status(&self, key_id: &[u8]) -> rialto_cdm_types::KeyStatus {
        self.backend.get_status(self.handle, key_id).into_status()
    }

    /// A cloneable, unlocked handle that can query `getStatus` without going
    /// through whatever lock guards this `OcdmSession`. Native `keyUpdated`
    /// callbacks fire synchronously from inside a DRM-forwarding call in this
    /// adapter's test double, so a session-level callback handler that needs
    /// to pull status in response must not re-enter that same lock.
    pub fn status_handle(&self) -> OcdmStatusHandle {
        OcdmStatusHandle {
            backend: Arc::clone(&self.backend),
            handle: self.handle,
        }
    }

    /// The CDM-assigned key session id, minted by the native library during
    /// construction.
    pub fn get_cdm_key_session_id(&self) -> CdmKeySessionId {
        CdmKeySessionId::new(self.backend.get_cdm_key_session_id(self.handle))
    }

    /// Selects which key id subsequent decrypt calls should use, for
    /// native libraries that multiplex several keys per session.
    pub fn select_key_id(&self, key_id: &[u8]) -> MediaKeyErrorStatus {
        self.backend.select_key_id(self.handle, key_id).into_status()
    }

    /// True if the session currently holds `key_id`.
    pub fn has_key_id(&self, key_id: &[u8]) -> bool {
        self.backend.has_key_id(self.handle, key_id)
    }

    /// Sets the DRM header blob (PlayReady-family sessions only; a no-op
    /// elsewhere is left to the caller to avoid).
    pub fn set_drm_header(&self, header: &[u8]) -> MediaKeyErrorStatus {
        self.backend.set_drm_header(self.handle, header).into_status()
    }

    /// Returns the last error the native session recorded, alongside a
    /// vendor-specific system code. This call always succeeds — any error
    /// information is carried in the returned status itself, never in the
    /// call's own outcome.
    pub fn get_last_drm_error(&self) -> (MediaKeyErrorStatus, u32) {
        let (status, system_code) = self.backend.get_last_drm_error(self.handle);
        (status.into_status(), system_code)
    }
}

/// A lock-free, `Clone`-able read-only view onto a session's `getStatus`
/// call. See [`OcdmSession::status_handle`].
#[derive(Clone)]
pub struct OcdmStatusHandle {
    backend: Arc<dyn NativeDrm>,
    handle: NativeSessionId,
}

impl OcdmStatusHandle {
    /// The native session's current key status snapshot for `key_id`,
    /// collapsed onto the neutral vocabulary (§3).
    pub fn get_status(&self, key_id: &[u8]) -> rialto_cdm_types::KeyStatus {
        self.backend.get_status(self.handle, key_id).into_status()
    }
}

impl NativeStatus {
    fn ok_or_err(self) -> Result<(), MediaKeyErrorStatus> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self.into_status())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedNativeDrm;
    use crate::system::OcdmSystem;

    fn new_session() -> OcdmSession {
        let backend = Arc::new(SimulatedNativeDrm::new());
        let system = OcdmSystem::new("com.widevine.alpha", backend).unwrap();
        system.create_session().unwrap()
    }

    #[test]
    fn construct_session_is_idempotent() {
        let mut session = new_session();
        let id = CdmKeySessionId::new("session-1".to_string());
        assert_eq!(
            session.construct_session("cenc", b"init", &id),
            MediaKeyErrorStatus::Ok
        );
        assert_eq!(
            session.construct_session("cenc", b"init", &id),
            MediaKeyErrorStatus::Ok
        );
    }

    #[test]
    fn get_challenge_data_performs_size_then_fill() {
        let session = new_session();
        let challenge = session.get_challenge_data(false).unwrap();
        assert!(!challenge.is_empty());
    }

    #[test]
    fn legacy_decrypt_reports_interface_not_implemented_when_unavailable() {
        let session = new_session();
        let mut buffer = vec![0u8; 16];
        let status = session.decrypt(&mut buffer, b"key", b"iv");
        assert_eq!(status, MediaKeyErrorStatus::InterfaceNotImplemented);
    }

    #[test]
    fn get_last_drm_error_always_succeeds() {
        let session = new_session();
        let (status, _code) = session.get_last_drm_error();
        assert_eq!(status, MediaKeyErrorStatus::Ok);
    }
}
