//! Decrypt-path operations the external media pipeline drives (§4.4, §4.5).

use crate::service::CdmService;
use rialto_cdm_types::{KeySessionId, MediaKeyErrorStatus, MediaKeysHandle};

/// The media-pipeline-facing decrypt API (§4.4), split out from
/// [`crate::ICdmService`] exactly as the original separates
/// `IDecryptionService` from the client-facing control API.
///
/// Every method here looks its owning `MediaKeysHandle` up by
/// `KeySessionId` rather than requiring the caller to carry one around, since
/// the media pipeline only ever learns about sessions, never handles.
pub trait IDecryptionService: Send + Sync {
    /// Decrypts `buffer` in place using the preferred native entry point.
    fn decrypt(
        &self,
        key_session_id: KeySessionId,
        buffer: Vec<u8>,
        key_id: Vec<u8>,
        iv: Vec<u8>,
    ) -> (MediaKeyErrorStatus, Vec<u8>);

    /// Decrypts `buffer` in place via the deprecated legacy entry point.
    fn decrypt_legacy(
        &self,
        key_session_id: KeySessionId,
        buffer: Vec<u8>,
        key_id: Vec<u8>,
        iv: Vec<u8>,
    ) -> (MediaKeyErrorStatus, Vec<u8>);

    /// True if `key_session_id` belongs to a Netflix-PlayReady `MediaKeys`.
    fn is_netflix_playready_key_system(&self, key_session_id: KeySessionId) -> bool;

    /// Selects which key id subsequent decrypt calls against
    /// `key_session_id` should use.
    fn select_key_id(
        &self,
        handle: MediaKeysHandle,
        key_session_id: KeySessionId,
        key_id: Vec<u8>,
    ) -> MediaKeyErrorStatus;

    /// Pins `key_session_id` open for an in-flight decrypt (§4.3, §4.4).
    fn increment_session_id_usage_counter(&self, key_session_id: KeySessionId);

    /// Unpins `key_session_id`, performing any close/release that was
    /// deferred while it was pinned (§4.3, Testable Property 3).
    fn decrement_session_id_usage_counter(&self, key_session_id: KeySessionId);
}

impl CdmService {
    fn handle_for_session(&self, key_session_id: KeySessionId) -> Option<MediaKeysHandle> {
        self.session_info
            .lock()
            .get(&key_session_id)
            .map(|info| info.media_keys_handle)
    }
}

impl IDecryptionService for CdmService {
    fn decrypt(
        &self,
        key_session_id: KeySessionId,
        buffer: Vec<u8>,
        key_id: Vec<u8>,
        iv: Vec<u8>,
    ) -> (MediaKeyErrorStatus, Vec<u8>) {
        let Some(handle) = self.handle_for_session(key_session_id) else {
            tracing::error!(%key_session_id, "Media keys handle for session does not exist");
            return (MediaKeyErrorStatus::BadSessionId, buffer);
        };
        match self.media_keys.lock().get(&handle).cloned() {
            Some(media_keys) => media_keys.decrypt(key_session_id, buffer, key_id, iv),
            None => (MediaKeyErrorStatus::Fail, buffer),
        }
    }

    fn decrypt_legacy(
        &self,
        key_session_id: KeySessionId,
        buffer: Vec<u8>,
        key_id: Vec<u8>,
        iv: Vec<u8>,
    ) -> (MediaKeyErrorStatus, Vec<u8>) {
        let Some(handle) = self.handle_for_session(key_session_id) else {
            tracing::error!(%key_session_id, "Media keys handle for session does not exist");
            return (MediaKeyErrorStatus::BadSessionId, buffer);
        };
        match self.media_keys.lock().get(&handle).cloned() {
            Some(media_keys) => media_keys.decrypt_legacy(key_session_id, buffer, key_id, iv),
            None => (MediaKeyErrorStatus::Fail, buffer),
        }
    }

    fn is_netflix_playready_key_system(&self, key_session_id: KeySessionId) -> bool {
        self.session_info
            .lock()
            .get(&key_session_id)
            .map(|info| info.is_netflix_playready)
            .unwrap_or(false)
    }

    fn select_key_id(
        &self,
        handle: MediaKeysHandle,
        key_session_id: KeySessionId,
        key_id: Vec<u8>,
    ) -> MediaKeyErrorStatus {
        self.media_keys
            .lock()
            .get(&handle)
            .map(|media_keys| media_keys.select_key_id(key_session_id, key_id))
            .unwrap_or(MediaKeyErrorStatus::Fail)
    }

    fn increment_session_id_usage_counter(&self, key_session_id: KeySessionId) {
        if let Some(info) = self.session_info.lock().get_mut(&key_session_id) {
            info.ref_counter += 1;
        }
    }

    fn decrement_session_id_usage_counter(&self, key_session_id: KeySessionId) {
        let mut session_info = self.session_info.lock();
        let Some(info) = session_info.get_mut(&key_session_id) else {
            return;
        };
        info.ref_counter = info.ref_counter.saturating_sub(1);
        if info.ref_counter != 0 {
            return;
        }
        let handle = info.media_keys_handle;
        let should_be_closed = info.should_be_closed;
        let should_be_released = info.should_be_released;
        if !should_be_closed && !should_be_released {
            return;
        }
        session_info.remove(&key_session_id);
        drop(session_info);
        self.session_clients.lock().remove(&key_session_id);

        let Some(media_keys) = self.media_keys.lock().get(&handle).cloned() else {
            return;
        };
        if should_be_closed {
            let status = media_keys.close_key_session(key_session_id);
            if status != MediaKeyErrorStatus::Ok {
                tracing::warn!(%key_session_id, ?status, "deferred close reported a non-OK status");
            }
        } else {
            let _ = media_keys.release_key_session(key_session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ICdmService;
    use rialto_cdm_core::IMediaKeysClient;
    use rialto_cdm_types::{KeySessionType, KeyStatusVector, KeySystem, MainThread};
    use std::sync::{Arc, Weak};

    struct NoopClient;
    impl IMediaKeysClient for NoopClient {
        fn on_license_request(&self, _key_session_id: KeySessionId, _url: String, _message: Vec<u8>) {}
        fn on_license_renewal(&self, _key_session_id: KeySessionId, _message: Vec<u8>) {}
        fn on_key_statuses_changed(&self, _key_session_id: KeySessionId, _statuses: KeyStatusVector) {}
    }

    fn new_service_with_session() -> (CdmService, MediaKeysHandle, KeySessionId) {
        let main_thread = MainThread::new();
        let backend = Arc::new(rialto_cdm_ocdm::SimulatedNativeDrm::new());
        let service = CdmService::new(main_thread, backend);
        service.switch_to_active();
        let handle = MediaKeysHandle::from_i32(0);
        service.create_media_keys(handle, KeySystem::new("com.widevine.alpha"));
        let client = Arc::new(NoopClient);
        let session_id = service
            .create_key_session(handle, KeySessionType::Temporary, Weak::clone(&(Arc::downgrade(&client) as Weak<dyn IMediaKeysClient>)))
            .unwrap();
        (service, handle, session_id)
    }

    #[test]
    fn decrypt_fails_for_unknown_session() {
        let (service, _handle, _session_id) = new_service_with_session();
        let bogus = KeySessionId::next();
        let (status, _) = service.decrypt(bogus, vec![1, 2, 3], vec![], vec![]);
        assert_eq!(status, MediaKeyErrorStatus::BadSessionId);
    }

    #[test]
    fn decrement_performs_deferred_close_once_ref_counter_drains() {
        let (service, _handle, session_id) = new_service_with_session();

        service.increment_session_id_usage_counter(session_id);
        service.increment_session_id_usage_counter(session_id);
        assert_eq!(service.close_key_session(session_id), MediaKeyErrorStatus::Ok);
        assert!(service.session_info.lock().contains_key(&session_id));

        service.decrement_session_id_usage_counter(session_id);
        assert!(service.session_info.lock().contains_key(&session_id));

        service.decrement_session_id_usage_counter(session_id);
        assert!(!service.session_info.lock().contains_key(&session_id));
    }

    #[test]
    fn decrement_on_unknown_session_is_a_safe_no_op() {
        let (service, _handle, _session_id) = new_service_with_session();
        service.decrement_session_id_usage_counter(KeySessionId::next());
    }
}
