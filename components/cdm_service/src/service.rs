//! `CdmService`: process-wide façade and the client-facing `ICdmService` role.

use parking_lot::Mutex;
use rialto_cdm_core::{IMediaKeysClient, MediaKeys, MediaKeysConstructError};
use rialto_cdm_ocdm::NativeDrm;
use rialto_cdm_types::{
    InitDataType, KeySessionId, KeySessionType, KeySystem, LimitedDurationLicense, MainThreadHandle,
    MediaKeyErrorStatus, MediaKeysHandle,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Per-session bookkeeping the service layer tracks independently of
/// `MediaKeys`'s own `bufCounter` (§3, §4.4): `refCounter` is pinned by the
/// media pipeline's decrypt usage counter, and `shouldBeClosed`/
/// `shouldBeReleased` arm a deferred close/release exactly like
/// `MediaKeys::KeySessionUsage` does one layer down.
pub(crate) struct MediaKeySessionInfo {
    pub(crate) media_keys_handle: MediaKeysHandle,
    pub(crate) is_netflix_playready: bool,
    pub(crate) ref_counter: u32,
    pub(crate) should_be_closed: bool,
    pub(crate) should_be_released: bool,
}

/// The `ICdmService` control-plane API (§4.4), driven by the IPC module on
/// behalf of connected application clients.
pub trait ICdmService: Send + Sync {
    /// Activates the service. Must precede any create operation (§4.4).
    fn switch_to_active(&self) -> bool;

    /// Deactivates the service and clears every tracked `MediaKeys`
    /// instance and session mapping. Outstanding handles become invalid.
    fn switch_to_inactive(&self);

    /// Creates a `MediaKeys` instance for `key_system` under `handle`.
    /// Fails if the service is inactive, `handle` is already in use, or the
    /// native system could not be created.
    fn create_media_keys(&self, handle: MediaKeysHandle, key_system: KeySystem) -> bool;

    /// Destroys the `MediaKeys` instance at `handle`, along with every
    /// session-info entry that pointed at it.
    fn destroy_media_keys(&self, handle: MediaKeysHandle) -> bool;

    /// Creates a key session under `handle`, registering `client` as the
    /// session's event sink and recording its service-level session info.
    fn create_key_session(
        &self,
        handle: MediaKeysHandle,
        session_type: KeySessionType,
        client: Weak<dyn IMediaKeysClient>,
    ) -> Result<KeySessionId, MediaKeyErrorStatus>;

    /// `generateRequest`, forwarded to the owning session.
    fn generate_request(
        &self,
        handle: MediaKeysHandle,
        key_session_id: KeySessionId,
        init_data_type: InitDataType,
        init_data: Vec<u8>,
        ldl: LimitedDurationLicense,
    ) -> MediaKeyErrorStatus;

    /// Loads a previously persisted session.
    fn load_session(&self, handle: MediaKeysHandle, key_session_id: KeySessionId) -> MediaKeyErrorStatus;

    /// Feeds a license server response to the owning session.
    fn update_session(
        &self,
        handle: MediaKeysHandle,
        key_session_id: KeySessionId,
        response: Vec<u8>,
    ) -> MediaKeyErrorStatus;

    /// Closes `key_session_id`, deferring if the service-level ref counter
    /// is still pinned (§4.4, Testable Property 3).
    fn close_key_session(&self, key_session_id: KeySessionId) -> MediaKeyErrorStatus;

    /// Removes all keys for `key_session_id` and erases its routing entry
    /// on success.
    fn remove_key_session(&self, handle: MediaKeysHandle, key_session_id: KeySessionId) -> MediaKeyErrorStatus;

    /// Releases `key_session_id`, deferring if the service-level ref
    /// counter is still pinned.
    fn release_key_session(&self, key_session_id: KeySessionId) -> MediaKeyErrorStatus;

    /// The CDM-assigned key session id for `key_session_id`.
    fn get_cdm_key_session_id(
        &self,
        handle: MediaKeysHandle,
        key_session_id: KeySessionId,
    ) -> Result<String, MediaKeyErrorStatus>;

    /// True if `key_session_id` currently holds `key_id`.
    fn contains_key(&self, handle: MediaKeysHandle, key_session_id: KeySessionId, key_id: Vec<u8>) -> bool;

    /// Sets the DRM header blob on `key_session_id`.
    fn set_drm_header(
        &self,
        handle: MediaKeysHandle,
        key_session_id: KeySessionId,
        request_data: Vec<u8>,
    ) -> MediaKeyErrorStatus;

    /// Deletes the persistent secure ("DRM") store for `handle`.
    fn delete_drm_store(&self, handle: MediaKeysHandle) -> MediaKeyErrorStatus;

    /// Deletes the persistent key store for `handle`.
    fn delete_key_store(&self, handle: MediaKeysHandle) -> MediaKeyErrorStatus;

    /// A 256-byte hash of the secure ("DRM") store for `handle`.
    fn get_drm_store_hash(&self, handle: MediaKeysHandle) -> Result<Vec<u8>, MediaKeyErrorStatus>;

    /// A 256-byte hash of the key store for `handle`.
    fn get_key_store_hash(&self, handle: MediaKeysHandle) -> Result<Vec<u8>, MediaKeyErrorStatus>;

    /// The maximum number of concurrent LDL sessions for `handle`.
    fn get_ldl_sessions_limit(&self, handle: MediaKeysHandle) -> Result<u32, MediaKeyErrorStatus>;

    /// The last DRM error code latched for `key_session_id`.
    fn get_last_drm_error(
        &self,
        handle: MediaKeysHandle,
        key_session_id: KeySessionId,
    ) -> Result<u32, MediaKeyErrorStatus>;

    /// The DRM library's notion of current time for `handle`.
    fn get_drm_time(&self, handle: MediaKeysHandle) -> Result<u64, MediaKeyErrorStatus>;

    /// Retrieves metric/diagnostic data for `handle`, retrying internally
    /// on `BufferTooSmall` (§4.3).
    fn get_metric_system_data(&self, handle: MediaKeysHandle) -> Result<Vec<u8>, MediaKeyErrorStatus>;
}

/// The process-wide façade described in §4.4 (C4).
///
/// Owns no IPC client identity of its own — [`Self::destroy_media_keys`] is
/// the hook the IPC layer calls once per handle a disconnecting client
/// owned.
pub struct CdmService {
    pub(crate) is_active: AtomicBool,
    pub(crate) main_thread: MainThreadHandle,
    pub(crate) backend: Arc<dyn NativeDrm>,
    pub(crate) media_keys: Mutex<HashMap<MediaKeysHandle, Arc<MediaKeys>>>,
    pub(crate) session_clients: Mutex<HashMap<KeySessionId, Weak<dyn IMediaKeysClient>>>,
    pub(crate) session_info: Mutex<HashMap<KeySessionId, MediaKeySessionInfo>>,
}

impl CdmService {
    /// Creates an inactive service bound to `backend` and `main_thread`.
    /// Every `MediaKeys` instance the service later creates shares this
    /// same native backend and Main Thread.
    pub fn new(main_thread: MainThreadHandle, backend: Arc<dyn NativeDrm>) -> Self {
        tracing::debug!("CdmService is constructed");
        Self {
            is_active: AtomicBool::new(false),
            main_thread,
            backend,
            media_keys: Mutex::new(HashMap::new()),
            session_clients: Mutex::new(HashMap::new()),
            session_info: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Acquire)
    }

    fn with_media_keys<R>(&self, handle: MediaKeysHandle, f: impl FnOnce(&Arc<MediaKeys>) -> R) -> Option<R> {
        self.media_keys.lock().get(&handle).map(f)
    }
}

impl ICdmService for CdmService {
    fn switch_to_active(&self) -> bool {
        tracing::info!("Switching SessionServer to Active state.");
        self.is_active.store(true, Ordering::Release);
        true
    }

    fn switch_to_inactive(&self) {
        tracing::info!("Switching SessionServer to Inactive state. Cleaning resources...");
        self.is_active.store(false, Ordering::Release);

        let mut media_keys = self.media_keys.lock();
        let mut session_clients = self.session_clients.lock();
        let mut session_info = self.session_info.lock();
        media_keys.clear();
        session_clients.clear();
        session_info.clear();
    }

    fn create_media_keys(&self, handle: MediaKeysHandle, key_system: KeySystem) -> bool {
        tracing::debug!(%handle, "CdmService requested to create new media keys handle");
        if !self.is_active() {
            tracing::error!(%handle, "Skip to create media keys handle - Session Server in Inactive state");
            return false;
        }

        let mut media_keys = self.media_keys.lock();
        if media_keys.contains_key(&handle) {
            tracing::error!(%handle, "Media keys handle already exists");
            return false;
        }

        match MediaKeys::new(key_system, Arc::clone(&self.main_thread), Arc::clone(&self.backend)) {
            Ok(instance) => {
                media_keys.insert(handle, Arc::new(instance));
                tracing::info!(%handle, "New media keys handle created");
                true
            }
            Err(MediaKeysConstructError(status)) => {
                tracing::error!(%handle, ?status, "Could not create MediaKeys for media keys handle");
                false
            }
        }
    }

    fn destroy_media_keys(&self, handle: MediaKeysHandle) -> bool {
        tracing::debug!(%handle, "CdmService requested to destroy media keys handle");

        let mut media_keys = self.media_keys.lock();
        if media_keys.remove(&handle).is_none() {
            tracing::error!(%handle, "Media keys handle does not exist");
            return false;
        }

        let mut session_info = self.session_info.lock();
        let mut session_clients = self.session_clients.lock();
        session_info.retain(|session_id, info| {
            if info.media_keys_handle == handle {
                session_clients.remove(session_id);
                false
            } else {
                true
            }
        });

        tracing::info!(%handle, "Media keys handle destroyed");
        true
    }

    fn create_key_session(
        &self,
        handle: MediaKeysHandle,
        session_type: KeySessionType,
        client: Weak<dyn IMediaKeysClient>,
    ) -> Result<KeySessionId, MediaKeyErrorStatus> {
        tracing::debug!(%handle, "CdmService requested to create key session");

        let media_keys = self.media_keys.lock();
        let Some(instance) = media_keys.get(&handle) else {
            tracing::error!(%handle, "Media keys handle does not exist");
            return Err(MediaKeyErrorStatus::Fail);
        };

        let key_session_id = instance.create_key_session(session_type, Weak::clone(&client))?;

        let mut session_info = self.session_info.lock();
        let mut session_clients = self.session_clients.lock();
        if session_clients.contains_key(&key_session_id) {
            tracing::error!(%key_session_id, "Media keys client for key session already exists");
            let _ = instance.remove_key_session(key_session_id);
            return Err(MediaKeyErrorStatus::Fail);
        }
        session_info.insert(
            key_session_id,
            MediaKeySessionInfo {
                media_keys_handle: handle,
                is_netflix_playready: instance.is_netflix_key_system(key_session_id),
                ref_counter: 0,
                should_be_closed: false,
                should_be_released: false,
            },
        );
        session_clients.insert(key_session_id, client);

        Ok(key_session_id)
    }

    fn generate_request(
        &self,
        handle: MediaKeysHandle,
        key_session_id: KeySessionId,
        init_data_type: InitDataType,
        init_data: Vec<u8>,
        ldl: LimitedDurationLicense,
    ) -> MediaKeyErrorStatus {
        tracing::debug!(%handle, "CdmService requested to generate request");
        self.with_media_keys(handle, |mk| mk.generate_request(key_session_id, init_data_type, init_data, ldl))
            .unwrap_or_else(|| {
                tracing::error!(%handle, "Media keys handle does not exist");
                MediaKeyErrorStatus::Fail
            })
    }

    fn load_session(&self, handle: MediaKeysHandle, key_session_id: KeySessionId) -> MediaKeyErrorStatus {
        tracing::debug!(%handle, "CdmService requested to load session");
        self.with_media_keys(handle, |mk| mk.load_session(key_session_id))
            .unwrap_or(MediaKeyErrorStatus::Fail)
    }

    fn update_session(
        &self,
        handle: MediaKeysHandle,
        key_session_id: KeySessionId,
        response: Vec<u8>,
    ) -> MediaKeyErrorStatus {
        tracing::debug!(%handle, "CdmService requested to update session");
        self.with_media_keys(handle, |mk| mk.update_session(key_session_id, response))
            .unwrap_or(MediaKeyErrorStatus::Fail)
    }

    fn close_key_session(&self, key_session_id: KeySessionId) -> MediaKeyErrorStatus {
        tracing::debug!(%key_session_id, "CdmService requested to close key session");

        let mut session_info = self.session_info.lock();
        let Some(info) = session_info.get_mut(&key_session_id) else {
            tracing::error!(%key_session_id, "Media keys handle for session does not exist");
            return MediaKeyErrorStatus::Fail;
        };
        if info.ref_counter > 0 {
            tracing::info!(%key_session_id, "Deferring closing of key session");
            info.should_be_closed = true;
            return MediaKeyErrorStatus::Ok;
        }
        let handle = info.media_keys_handle;
        session_info.remove(&key_session_id);
        drop(session_info);
        self.session_clients.lock().remove(&key_session_id);
        self.with_media_keys(handle, |mk| mk.close_key_session(key_session_id))
            .unwrap_or(MediaKeyErrorStatus::Fail)
    }

    fn remove_key_session(&self, handle: MediaKeysHandle, key_session_id: KeySessionId) -> MediaKeyErrorStatus {
        tracing::debug!(%handle, "CdmService requested to remove key session");
        let status = self
            .with_media_keys(handle, |mk| mk.remove_key_session(key_session_id))
            .unwrap_or_else(|| {
                tracing::error!(%handle, "Media keys handle does not exist");
                MediaKeyErrorStatus::Fail
            });
        if status == MediaKeyErrorStatus::Ok {
            self.session_clients.lock().remove(&key_session_id);
        }
        status
    }

    fn release_key_session(&self, key_session_id: KeySessionId) -> MediaKeyErrorStatus {
        tracing::debug!(%key_session_id, "CdmService requested to release key session");

        let mut session_info = self.session_info.lock();
        let Some(info) = session_info.get_mut(&key_session_id) else {
            tracing::error!(%key_session_id, "Media keys handle for session does not exist");
            return MediaKeyErrorStatus::Fail;
        };
        if info.ref_counter > 0 {
            tracing::info!(%key_session_id, "Deferring releasing of key session");
            info.should_be_released = true;
            return MediaKeyErrorStatus::Ok;
        }
        let handle = info.media_keys_handle;
        session_info.remove(&key_session_id);
        drop(session_info);
        self.session_clients.lock().remove(&key_session_id);
        self.with_media_keys(handle, |mk| mk.release_key_session(key_session_id))
            .unwrap_or(MediaKeyErrorStatus::Fail)
    }

    fn get_cdm_key_session_id(
        &self,
        handle: MediaKeysHandle,
        key_session_id: KeySessionId,
    ) -> Result<String, MediaKeyErrorStatus> {
        self.with_media_keys(handle, |mk| mk.get_cdm_key_session_id(key_session_id))
            .flatten()
            .ok_or(MediaKeyErrorStatus::Fail)
    }

    fn contains_key(&self, handle: MediaKeysHandle, key_session_id: KeySessionId, key_id: Vec<u8>) -> bool {
        self.with_media_keys(handle, |mk| mk.contains_key(key_session_id, key_id))
            .unwrap_or(false)
    }

    fn set_drm_header(
        &self,
        handle: MediaKeysHandle,
        key_session_id: KeySessionId,
        request_data: Vec<u8>,
    ) -> MediaKeyErrorStatus {
        self.with_media_keys(handle, |mk| mk.set_drm_header(key_session_id, request_data))
            .unwrap_or(MediaKeyErrorStatus::Fail)
    }

    fn delete_drm_store(&self, handle: MediaKeysHandle) -> MediaKeyErrorStatus {
        self.with_media_keys(handle, |mk| mk.delete_drm_store())
            .unwrap_or(MediaKeyErrorStatus::Fail)
    }

    fn delete_key_store(&self, handle: MediaKeysHandle) -> MediaKeyErrorStatus {
        self.with_media_keys(handle, |mk| mk.delete_key_store())
            .unwrap_or(MediaKeyErrorStatus::Fail)
    }

    fn get_drm_store_hash(&self, handle: MediaKeysHandle) -> Result<Vec<u8>, MediaKeyErrorStatus> {
        self.with_media_keys(handle, |mk| mk.get_drm_store_hash())
            .unwrap_or(Err(MediaKeyErrorStatus::Fail))
    }

    fn get_key_store_hash(&self, handle: MediaKeysHandle) -> Result<Vec<u8>, MediaKeyErrorStatus> {
        self.with_media_keys(handle, |mk| mk.get_key_store_hash())
            .unwrap_or(Err(MediaKeyErrorStatus::Fail))
    }

    fn get_ldl_sessions_limit(&self, handle: MediaKeysHandle) -> Result<u32, MediaKeyErrorStatus> {
        self.with_media_keys(handle, |mk| mk.get_ldl_sessions_limit())
            .ok_or(MediaKeyErrorStatus::Fail)
    }

    fn get_last_drm_error(
        &self,
        handle: MediaKeysHandle,
        key_session_id: KeySessionId,
    ) -> Result<u32, MediaKeyErrorStatus> {
        self.with_media_keys(handle, |mk| mk.get_last_drm_error(key_session_id))
            .ok_or(MediaKeyErrorStatus::Fail)
    }

    fn get_drm_time(&self, handle: MediaKeysHandle) -> Result<u64, MediaKeyErrorStatus> {
        self.with_media_keys(handle, |mk| mk.get_drm_time())
            .ok_or(MediaKeyErrorStatus::Fail)
    }

    fn get_metric_system_data(&self, handle: MediaKeysHandle) -> Result<Vec<u8>, MediaKeyErrorStatus> {
        self.with_media_keys(handle, |mk| mk.get_metric_system_data())
            .unwrap_or(Err(MediaKeyErrorStatus::Fail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rialto_cdm_types::{KeyStatusVector, MainThread};

    struct NoopClient;
    impl IMediaKeysClient for NoopClient {
        fn on_license_request(&self, _key_session_id: KeySessionId, _url: String, _message: Vec<u8>) {}
        fn on_license_renewal(&self, _key_session_id: KeySessionId, _message: Vec<u8>) {}
        fn on_key_statuses_changed(&self, _key_session_id: KeySessionId, _statuses: KeyStatusVector) {}
    }

    fn new_service() -> CdmService {
        let main_thread = MainThread::new();
        let backend = Arc::new(rialto_cdm_ocdm::SimulatedNativeDrm::new());
        CdmService::new(main_thread, backend)
    }

    #[test]
    fn create_media_keys_requires_active_service() {
        let service = new_service();
        assert!(!service.create_media_keys(MediaKeysHandle::from_i32(0), KeySystem::new("com.widevine.alpha")));
        service.switch_to_active();
        assert!(service.create_media_keys(MediaKeysHandle::from_i32(0), KeySystem::new("com.widevine.alpha")));
    }

    #[test]
    fn switch_to_inactive_clears_every_map() {
        let service = new_service();
        service.switch_to_active();
        let handle = MediaKeysHandle::from_i32(0);
        service.create_media_keys(handle, KeySystem::new("com.widevine.alpha"));
        let client = Arc::new(NoopClient);
        let session_id = service
            .create_key_session(handle, KeySessionType::Temporary, Arc::downgrade(&client) as Weak<dyn IMediaKeysClient>)
            .unwrap();

        service.switch_to_inactive();

        assert_eq!(service.close_key_session(session_id), MediaKeyErrorStatus::Fail);
        assert!(!service.media_keys.lock().contains_key(&handle));
    }

    #[test]
    fn close_key_session_defers_while_pinned() {
        let service = new_service();
        service.switch_to_active();
        let handle = MediaKeysHandle::from_i32(0);
        service.create_media_keys(handle, KeySystem::new("com.widevine.alpha"));
        let client = Arc::new(NoopClient);
        let session_id = service
            .create_key_session(handle, KeySessionType::Temporary, Arc::downgrade(&client) as Weak<dyn IMediaKeysClient>)
            .unwrap();

        service.session_info.lock().get_mut(&session_id).unwrap().ref_counter = 1;
        assert_eq!(service.close_key_session(session_id), MediaKeyErrorStatus::Ok);
        assert!(service.session_info.lock()[&session_id].should_be_closed);
    }

    #[test]
    fn destroy_media_keys_erases_owned_session_info() {
        let service = new_service();
        service.switch_to_active();
        let handle = MediaKeysHandle::from_i32(0);
        service.create_media_keys(handle, KeySystem::new("com.widevine.alpha"));
        let client = Arc::new(NoopClient);
        let session_id = service
            .create_key_session(handle, KeySessionType::Temporary, Arc::downgrade(&client) as Weak<dyn IMediaKeysClient>)
            .unwrap();

        assert!(service.destroy_media_keys(handle));
        assert!(!service.session_info.lock().contains_key(&session_id));
    }

    #[test]
    fn close_key_session_erases_session_info_when_unpinned() {
        let service = new_service();
        service.switch_to_active();
        let handle = MediaKeysHandle::from_i32(0);
        service.create_media_keys(handle, KeySystem::new("com.widevine.alpha"));
        let client = Arc::new(NoopClient);
        let session_id = service
            .create_key_session(handle, KeySessionType::Temporary, Arc::downgrade(&client) as Weak<dyn IMediaKeysClient>)
            .unwrap();

        assert_eq!(service.close_key_session(session_id), MediaKeyErrorStatus::Ok);
        assert!(!service.session_info.lock().contains_key(&session_id));
        assert!(!service.session_clients.lock().contains_key(&session_id));
    }
}
