//! `OcdmSystem`: the per-key-system native DRM handle.

use crate::error::{NativeKeyStatus, NativeStatus};
use crate::session::{IOcdmSessionClient, OcdmSession};
use rialto_cdm_types::MediaKeyErrorStatus;
use std::sync::{Arc, Weak};

/// An opaque handle to a native `OpenCDMSystem` instance.
pub type NativeSystemId = u64;
/// An opaque handle to a native `OpenCDMSession` instance.
pub type NativeSessionId = u64;

/// The behaviour the native OCDM-style library must provide.
///
/// This is the FFI seam: a production build implements `NativeDrm` against
/// the real native library; [`crate::SimulatedNativeDrm`] is an in-process
/// stand-in used for development and testing.
#[cfg_attr(test, mockall::automock)]
pub trait NativeDrm: Send + Sync {
    /// Probes whether `key_system` is supported, without creating a system.
    fn is_type_supported(&self, key_system: &str) -> NativeStatus;

    /// Creates a native system for `key_system`, or `None` on failure.
    fn create_system(&self, key_system: &str) -> Option<NativeSystemId>;

    /// Unconditionally destroys a native system.
    fn destroy_system(&self, system: NativeSystemId);

    /// Returns the native library's version string.
    fn get_version(&self, system: NativeSystemId) -> String;

    /// Returns the maximum number of concurrent LDL sessions.
    fn get_ldl_sessions_limit(&self, system: NativeSystemId) -> u32;

    /// Deletes the persistent key store.
    fn delete_key_store(&self, system: NativeSystemId) -> NativeStatus;

    /// Deletes the persistent secure store.
    fn delete_secure_store(&self, system: NativeSystemId) -> NativeStatus;

    /// Fills `out` with a hash of the key store. `out` is always exactly
    /// 256 bytes on success.
    fn get_key_store_hash(&self, system: NativeSystemId, out: &mut [u8]) -> NativeStatus;

    /// Fills `out` with a hash of the secure store. `out` is always exactly
    /// 256 bytes on success.
    fn get_secure_store_hash(&self, system: NativeSystemId, out: &mut [u8]) -> NativeStatus;

    /// Returns the DRM library's notion of current time.
    fn get_drm_time(&self, system: NativeSystemId) -> u64;

    /// True if the native library supports server certificates for this system.
    fn supports_server_certificate(&self, system: NativeSystemId) -> bool;

    /// Appends metric/diagnostic data into `out`, sized to `out.len()`
    /// bytes of scratch capacity. Returns `BufferTooSmall` if the data
    /// doesn't fit.
    fn get_metric_system_data(&self, system: NativeSystemId, out: &mut Vec<u8>) -> NativeStatus;

    /// Creates a native session. The caller binds a callback client
    /// separately via [`Self::bind_session_client`] once it has a stable
    /// self-reference to hand out.
    fn create_session(&self, system: NativeSystemId) -> Option<NativeSessionId>;

    /// Binds the callback client a native session delivers events to.
    fn bind_session_client(&self, session: NativeSessionId, client: Weak<dyn IOcdmSessionClient>);

    /// Constructs native session state from initialization data.
    fn construct_session(
        &self,
        session: NativeSessionId,
        init_data_type: &str,
        init_data: &[u8],
        cdm_key_session_id: &str,
    ) -> NativeStatus;

    /// Sizes the challenge buffer the native library is about to produce.
    fn get_challenge_data_size(&self, session: NativeSessionId, is_ldl: bool) -> Result<usize, NativeStatus>;

    /// Fills a previously sized challenge buffer.
    fn fill_challenge_data(&self, session: NativeSessionId, is_ldl: bool, out: &mut [u8]) -> NativeStatus;

    /// Cancels an in-flight challenge request.
    fn cancel_challenge_data(&self, session: NativeSessionId) -> NativeStatus;

    /// Stores license data returned by the server directly, bypassing `update`.
    fn store_license_data(&self, session: NativeSessionId, response: &[u8]) -> NativeStatus;

    /// Loads a previously persisted session.
    fn load(&self, session: NativeSessionId) -> NativeStatus;

    /// Feeds a license server response into the native session.
    fn update(&self, session: NativeSessionId, response: &[u8]) -> NativeStatus;

    /// Removes all keys associated with the session.
    fn remove(&self, session: NativeSessionId) -> NativeStatus;

    /// Closes the native session without destroying it.
    fn close(&self, session: NativeSessionId) -> NativeStatus;

    /// Releases decrypt-path resources without affecting session key state.
    fn clean_decrypt_context(&self, session: NativeSessionId) -> NativeStatus;

    /// Unconditionally destroys the native session.
    fn destruct_session(&self, session: NativeSessionId);

    /// Decrypts `buffer` in place via the preferred entry point.
    fn decrypt_buffer(&self, session: NativeSessionId, buffer: &mut [u8], key_id: &[u8], iv: &[u8]) -> NativeStatus;

    /// True if the native library exposes the deprecated legacy `decrypt` symbol.
    fn has_legacy_decrypt(&self) -> bool;

    /// Decrypts `buffer` in place via the deprecated legacy entry point.
    fn decrypt(&self, session: NativeSessionId, buffer: &mut [u8], key_id: &[u8], iv: &[u8]) -> NativeStatus;

    /// The native session's current status for `key_id`, in the native
    /// (pre-collapse) vocabulary. Callers translate via
    /// [`NativeKeyStatus::into_status`].
    fn get_status(&self, session: NativeSessionId, key_id: &[u8]) -> NativeKeyStatus;

    /// The CDM-assigned key session id minted during construction.
    fn get_cdm_key_session_id(&self, session: NativeSessionId) -> String;

    /// Selects which key id subsequent decrypt calls should use.
    fn select_key_id(&self, session: NativeSessionId, key_id: &[u8]) -> NativeStatus;

    /// True if the session currently holds `key_id`.
    fn has_key_id(&self, session: NativeSessionId, key_id: &[u8]) -> bool;

    /// Sets the DRM header blob (PlayReady-family sessions).
    fn set_drm_header(&self, session: NativeSessionId, header: &[u8]) -> NativeStatus;

    /// Returns the last error the native session recorded, alongside a
    /// vendor-specific system code.
    fn get_last_drm_error(&self, session: NativeSessionId) -> (NativeStatus, u32);
}

/// Per-key-system wrapper over the native DRM library (`C1`).
///
/// Construction fails iff the native `create_system` call returns `None`.
/// Destruction unconditionally destroys the native system.
pub struct OcdmSystem {
    backend: Arc<dyn NativeDrm>,
    handle: NativeSystemId,
    key_system: String,
}

impl OcdmSystem {
    /// Creates a native system for `key_system`.
    ///
    /// # Errors
    ///
    /// Returns `Err` iff the native `createSystem` call returns null.
    pub fn new(key_system: impl Into<String>, backend: Arc<dyn NativeDrm>) -> Result<Self, MediaKeyErrorStatus> {
        let key_system = key_system.into();
        let handle = backend
            .create_system(&key_system)
            .ok_or(MediaKeyErrorStatus::Fail)?;
        Ok(Self {
            backend,
            handle,
            key_system,
        })
    }

    /// Probes whether `key_system` is supported without instantiating a system.
    pub fn is_type_supported(backend: &dyn NativeDrm, key_system: &str) -> MediaKeyErrorStatus {
        backend.is_type_supported(key_system).into_status()
    }

    /// The key system this instance wraps.
    pub fn key_system(&self) -> &str {
        &self.key_system
    }

    /// Returns the native library's version string.
    pub fn get_version(&self) -> String {
        self.backend.get_version(self.handle)
    }

    /// Returns the maximum number of concurrent LDL sessions.
    pub fn get_ldl_sessions_limit(&self) -> u32 {
        self.backend.get_ldl_sessions_limit(self.handle)
    }

    /// Deletes the persistent key store.
    pub fn delete_key_store(&self) -> MediaKeyErrorStatus {
        self.backend.delete_key_store(self.handle).into_status()
    }

    /// Deletes the persistent secure store.
    pub fn delete_secure_store(&self) -> MediaKeyErrorStatus {
        self.backend.delete_secure_store(self.handle).into_status()
    }

    /// Fills `out` (capacity determines requested size) with a store hash.
    pub fn get_key_store_hash(&self, out: &mut [u8]) -> MediaKeyErrorStatus {
        self.backend.get_key_store_hash(self.handle, out).into_status()
    }

    /// Fills `out` (capacity determines requested size) with a store hash.
    pub fn get_secure_store_hash(&self, out: &mut [u8]) -> MediaKeyErrorStatus {
        self.backend
            .get_secure_store_hash(self.handle, out)
            .into_status()
    }

    /// Returns the DRM library's notion of current time.
    pub fn get_drm_time(&self) -> u64 {
        self.backend.get_drm_time(self.handle)
    }

    /// True if the native library supports server certificates.
    pub fn supports_server_certificate(&self) -> bool {
        self.backend.supports_server_certificate(self.handle)
    }

    /// Appends metric/diagnostic data, sized to `out`'s capacity.
    pub fn get_metric_system_data(&self, out: &mut Vec<u8>) -> MediaKeyErrorStatus {
        self.backend.get_metric_system_data(self.handle, out).into_status()
    }

    /// Creates a new session. Use [`OcdmSession::bind_client`] once the
    /// caller has a stable self-reference to register for callbacks.
    pub fn create_session(&self) -> Result<OcdmSession, MediaKeyErrorStatus> {
        let session_handle = self.backend.create_session(self.handle).ok_or(MediaKeyErrorStatus::Fail)?;
        Ok(OcdmSession::new(Arc::clone(&self.backend), session_handle))
    }
}

impl Drop for OcdmSystem {
    fn drop(&mut self) {
        self.backend.destroy_system(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedNativeDrm;

    #[test]
    fn construction_fails_for_unsupported_key_system() {
        let backend = Arc::new(SimulatedNativeDrm::new());
        let result = OcdmSystem::new("com.unsupported.drm", backend);
        assert!(result.is_err());
    }

    #[test]
    fn construction_succeeds_for_supported_key_system() {
        let backend = Arc::new(SimulatedNativeDrm::new());
        let system = OcdmSystem::new("com.widevine.alpha", backend).unwrap();
        assert_eq!(system.key_system(), "com.widevine.alpha");
    }

    #[test]
    fn store_hash_is_256_bytes_on_success() {
        let backend = Arc::new(SimulatedNativeDrm::new());
        let system = OcdmSystem::new("com.widevine.alpha", backend).unwrap();
        let mut hash = vec![0u8; 256];
        let status = system.get_key_store_hash(&mut hash);
        assert_eq!(status, MediaKeyErrorStatus::Ok);
        assert_eq!(hash.len(), 256);
    }
}
