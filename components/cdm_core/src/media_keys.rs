//! `MediaKeys`: the per-key-system session container (C3).

use crate::client::IMediaKeysClient;
use crate::key_session::KeySession;
use parking_lot::Mutex;
use rialto_cdm_ocdm::{NativeDrm, OcdmSystem};
use rialto_cdm_types::{
    InitDataType, KeySessionId, KeySessionType, KeySystem, KeySystemFamily, LimitedDurationLicense,
    MainThreadHandle, MediaKeyErrorStatus,
};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// The initial scratch buffer size [`MediaKeys::get_metric_system_data`]
/// probes with.
const METRIC_DATA_INITIAL_CAPACITY: usize = 1024;
/// The capacity the retry loop never doubles past.
const METRIC_DATA_MAX_CAPACITY: usize = 65536;
/// The number of `BufferTooSmall` retries before giving up (§4.3).
const METRIC_DATA_MAX_RETRIES: u32 = 6;
/// Fixed output size for the store-hash operations (§4.1, §4.3).
const STORE_HASH_LEN: usize = 256;

/// Failure to create the native `OcdmSystem` backing a `MediaKeys`
/// instance — the only throwing path in construction (§4.3).
#[derive(Debug, thiserror::Error)]
#[error("failed to create the native DRM system for key system: {0}")]
pub struct MediaKeysConstructError(pub MediaKeyErrorStatus);

struct KeySessionUsage {
    session: Arc<KeySession>,
    buf_counter: u32,
    should_be_destroyed: bool,
    should_be_released: bool,
}

struct MediaKeysInner {
    system: OcdmSystem,
    sessions: Mutex<HashMap<KeySessionId, KeySessionUsage>>,
}

/// One logical EME `MediaKeys` object: owns a DRM `System` handle and a
/// collection of key sessions, allocating ids and enforcing the session
/// pin/deferred-close protocol described in §4.3.
pub struct MediaKeys {
    key_system: KeySystem,
    main_thread: MainThreadHandle,
    main_thread_client_id: u32,
    inner: Arc<MediaKeysInner>,
}

impl MediaKeys {
    /// Creates the native `OcdmSystem` for `key_system` on the Main Thread.
    ///
    /// # Errors
    ///
    /// Returns `Err` iff the native system could not be created.
    pub fn new(
        key_system: KeySystem,
        main_thread: MainThreadHandle,
        backend: Arc<dyn NativeDrm>,
    ) -> Result<Self, MediaKeysConstructError> {
        let main_thread_client_id = main_thread.register_client();
        let key_system_name = key_system.as_str().to_string();
        let system = main_thread
            .enqueue_task_and_wait(move || OcdmSystem::new(key_system_name, backend))
            .map_err(MediaKeysConstructError)?;

        Ok(Self {
            key_system,
            main_thread,
            main_thread_client_id,
            inner: Arc::new(MediaKeysInner {
                system,
                sessions: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// The key system this instance was created for.
    pub fn key_system(&self) -> &KeySystem {
        &self.key_system
    }

    /// The number of sessions currently reachable via the id map — live
    /// plus deferred-but-not-yet-destroyed (Testable Property 1).
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Creates a new key session, allocating the next process-wide id.
    pub fn create_key_session(
        &self,
        session_type: KeySessionType,
        client: Weak<dyn IMediaKeysClient>,
    ) -> Result<KeySessionId, MediaKeyErrorStatus> {
        let inner = Arc::clone(&self.inner);
        let key_system_family = self.key_system.family();
        self.main_thread
            .enqueue_task_and_wait(move || Self::create_key_session_internal(&inner, key_system_family, session_type, client))
    }

    fn create_key_session_internal(
        inner: &MediaKeysInner,
        key_system_family: KeySystemFamily,
        session_type: KeySessionType,
        client: Weak<dyn IMediaKeysClient>,
    ) -> Result<KeySessionId, MediaKeyErrorStatus> {
        let key_session_id = KeySessionId::next();
        let session = KeySession::new(key_session_id, session_type, key_system_family, client, &inner.system)?;
        inner.sessions.lock().insert(
            key_session_id,
            KeySessionUsage {
                session,
                buf_counter: 0,
                should_be_destroyed: false,
                should_be_released: false,
            },
        );
        Ok(key_session_id)
    }

    fn with_session<R>(
        &self,
        key_session_id: KeySessionId,
        f: impl FnOnce(&Arc<KeySession>) -> R + Send + 'static,
    ) -> MediaKeyErrorStatus
    where
        R: Into<MediaKeyErrorStatus>,
    {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || match inner.sessions.lock().get(&key_session_id) {
            Some(usage) => f(&usage.session).into(),
            None => MediaKeyErrorStatus::BadSessionId,
        })
    }

    /// `generateRequest`: forwards to the session's own state machine.
    pub fn generate_request(
        &self,
        key_session_id: KeySessionId,
        init_data_type: InitDataType,
        init_data: Vec<u8>,
        ldl: LimitedDurationLicense,
    ) -> MediaKeyErrorStatus {
        self.with_session(key_session_id, move |session| {
            session.generate_request(init_data_type, &init_data, ldl)
        })
    }

    /// Loads a previously persisted session.
    pub fn load_session(&self, key_session_id: KeySessionId) -> MediaKeyErrorStatus {
        self.with_session(key_session_id, |session| session.load_session())
    }

    /// Feeds a license server response into the named session.
    pub fn update_session(&self, key_session_id: KeySessionId, response: Vec<u8>) -> MediaKeyErrorStatus {
        self.with_session(key_session_id, move |session| session.update_session(&response))
    }

    /// Sets the DRM header blob on the named session.
    pub fn set_drm_header(&self, key_session_id: KeySessionId, header: Vec<u8>) -> MediaKeyErrorStatus {
        self.with_session(key_session_id, move |session| session.set_drm_header(&header))
    }

    /// Selects a key id on the named session.
    pub fn select_key_id(&self, key_session_id: KeySessionId, key_id: Vec<u8>) -> MediaKeyErrorStatus {
        self.with_session(key_session_id, move |session| session.select_key_id(&key_id))
    }

    /// True if `key_session_id` currently holds `key_id`.
    pub fn contains_key(&self, key_session_id: KeySessionId, key_id: Vec<u8>) -> bool {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || {
            inner
                .sessions
                .lock()
                .get(&key_session_id)
                .is_some_and(|usage| usage.session.contains_key(&key_id))
        })
    }

    /// The CDM-assigned key session id for `key_session_id`, if it exists.
    pub fn get_cdm_key_session_id(&self, key_session_id: KeySessionId) -> Option<String> {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || {
            inner
                .sessions
                .lock()
                .get(&key_session_id)
                .map(|usage| usage.session.get_cdm_key_session_id().to_string())
        })
    }

    /// The last DRM error code latched for `key_session_id`.
    pub fn get_last_drm_error(&self, key_session_id: KeySessionId) -> u32 {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || {
            inner
                .sessions
                .lock()
                .get(&key_session_id)
                .map(|usage| usage.session.get_last_drm_error())
                .unwrap_or(0)
        })
    }

    /// Removes all keys for `key_session_id`.
    pub fn remove_key_session(&self, key_session_id: KeySessionId) -> MediaKeyErrorStatus {
        self.with_session(key_session_id, |session| session.remove_key_session())
    }

    /// Closes `key_session_id`. If no decrypt has pinned it
    /// (`bufCounter == 0`), closes and erases it immediately; otherwise
    /// marks it for deferred close and returns `Ok` (§4.3, Testable
    /// Property 3).
    pub fn close_key_session(&self, key_session_id: KeySessionId) -> MediaKeyErrorStatus {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || {
            let mut sessions = inner.sessions.lock();
            let Some(usage) = sessions.get_mut(&key_session_id) else {
                return MediaKeyErrorStatus::BadSessionId;
            };
            if usage.buf_counter == 0 {
                let status = usage.session.close_key_session();
                sessions.remove(&key_session_id);
                status
            } else {
                usage.should_be_destroyed = true;
                MediaKeyErrorStatus::Ok
            }
        })
    }

    /// Releases `key_session_id`. Like [`Self::close_key_session`] but
    /// marks `shouldBeReleased` instead of `shouldBeDestroyed` when pinned,
    /// per the MediaKeys entity's independent release/destroy flags (§3).
    pub fn release_key_session(&self, key_session_id: KeySessionId) -> MediaKeyErrorStatus {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || {
            let mut sessions = inner.sessions.lock();
            let Some(usage) = sessions.get_mut(&key_session_id) else {
                return MediaKeyErrorStatus::BadSessionId;
            };
            if usage.buf_counter == 0 {
                sessions.remove(&key_session_id);
                MediaKeyErrorStatus::Ok
            } else {
                usage.should_be_released = true;
                MediaKeyErrorStatus::Ok
            }
        })
    }

    /// Pins `key_session_id` open for an in-flight decrypt. A no-op for an
    /// unknown id.
    pub fn increment_session_id_usage_counter(&self, key_session_id: KeySessionId) {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || {
            if let Some(usage) = inner.sessions.lock().get_mut(&key_session_id) {
                usage.buf_counter += 1;
            }
        });
    }

    /// Unpins `key_session_id`. Never wraps below zero; a no-op for an
    /// unknown id. Performs the deferred close/release if the counter
    /// reaches zero and it was armed (§4.3, Testable Property 3).
    pub fn decrement_session_id_usage_counter(&self, key_session_id: KeySessionId) {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || {
            let mut sessions = inner.sessions.lock();
            let Some(usage) = sessions.get_mut(&key_session_id) else {
                return;
            };
            usage.buf_counter = usage.buf_counter.saturating_sub(1);
            if usage.buf_counter != 0 {
                return;
            }
            if usage.should_be_destroyed {
                let status = usage.session.close_key_session();
                if status != MediaKeyErrorStatus::Ok {
                    tracing::warn!(?key_session_id, ?status, "deferred close reported a non-OK status");
                }
                sessions.remove(&key_session_id);
            } else if usage.should_be_released {
                sessions.remove(&key_session_id);
            }
        });
    }

    /// Decrypts `buffer` in place using the preferred native entry point.
    pub fn decrypt(&self, key_session_id: KeySessionId, mut buffer: Vec<u8>, key_id: Vec<u8>, iv: Vec<u8>) -> (MediaKeyErrorStatus, Vec<u8>) {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || {
            let status = match inner.sessions.lock().get(&key_session_id) {
                Some(usage) => usage.session.decrypt(&mut buffer, &key_id, &iv),
                None => MediaKeyErrorStatus::BadSessionId,
            };
            (status, buffer)
        })
    }

    /// Decrypts `buffer` in place via the deprecated legacy entry point.
    pub fn decrypt_legacy(
        &self,
        key_session_id: KeySessionId,
        mut buffer: Vec<u8>,
        key_id: Vec<u8>,
        iv: Vec<u8>,
    ) -> (MediaKeyErrorStatus, Vec<u8>) {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || {
            let status = match inner.sessions.lock().get(&key_session_id) {
                Some(usage) => usage.session.decrypt_legacy(&mut buffer, &key_id, &iv),
                None => MediaKeyErrorStatus::BadSessionId,
            };
            (status, buffer)
        })
    }

    /// True if this instance's key system is any PlayReady family.
    pub fn is_playready_key_system(&self) -> bool {
        self.key_system.is_playready()
    }

    /// True if `key_session_id` belongs to a Netflix-PlayReady `MediaKeys`.
    pub fn is_netflix_key_system(&self, key_session_id: KeySessionId) -> bool {
        self.key_system.is_netflix_playready() && self.inner.sessions.lock().contains_key(&key_session_id)
    }

    /// Deletes the persistent secure ("DRM") store.
    pub fn delete_drm_store(&self) -> MediaKeyErrorStatus {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || inner.system.delete_secure_store())
    }

    /// Deletes the persistent key store.
    pub fn delete_key_store(&self) -> MediaKeyErrorStatus {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || inner.system.delete_key_store())
    }

    /// Returns a 256-byte hash of the secure ("DRM") store.
    pub fn get_drm_store_hash(&self) -> Result<Vec<u8>, MediaKeyErrorStatus> {
        self.get_store_hash(|system, out| system.get_secure_store_hash(out))
    }

    /// Returns a 256-byte hash of the key store.
    pub fn get_key_store_hash(&self) -> Result<Vec<u8>, MediaKeyErrorStatus> {
        self.get_store_hash(|system, out| system.get_key_store_hash(out))
    }

    fn get_store_hash(
        &self,
        call: impl Fn(&OcdmSystem, &mut [u8]) -> MediaKeyErrorStatus + Send + 'static,
    ) -> Result<Vec<u8>, MediaKeyErrorStatus> {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || {
            let mut hash = vec![0u8; STORE_HASH_LEN];
            let status = call(&inner.system, &mut hash);
            if status == MediaKeyErrorStatus::Ok {
                Ok(hash)
            } else {
                Err(status)
            }
        })
    }

    /// The maximum number of concurrent LDL sessions the native system reports.
    pub fn get_ldl_sessions_limit(&self) -> u32 {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || inner.system.get_ldl_sessions_limit())
    }

    /// The DRM library's notion of current time.
    pub fn get_drm_time(&self) -> u64 {
        let inner = Arc::clone(&self.inner);
        self.main_thread.enqueue_task_and_wait(move || inner.system.get_drm_time())
    }

    /// Retrieves metric/diagnostic data, retrying with a doubled buffer on
    /// `BufferTooSmall` up to [`METRIC_DATA_MAX_RETRIES`] times, each retry
    /// a fresh enqueue on the Main Thread (§4.3).
    pub fn get_metric_system_data(&self) -> Result<Vec<u8>, MediaKeyErrorStatus> {
        let mut capacity = METRIC_DATA_INITIAL_CAPACITY;
        for _ in 0..METRIC_DATA_MAX_RETRIES {
            let inner = Arc::clone(&self.inner);
            let (status, data) = self.main_thread.enqueue_task_and_wait(move || {
                let mut buf = Vec::with_capacity(capacity);
                let status = inner.system.get_metric_system_data(&mut buf);
                (status, buf)
            });
            match status {
                MediaKeyErrorStatus::Ok => return Ok(data),
                MediaKeyErrorStatus::BufferTooSmall => {
                    capacity = (capacity * 2).min(METRIC_DATA_MAX_CAPACITY);
                }
                other => return Err(other),
            }
        }
        Err(MediaKeyErrorStatus::Fail)
    }
}

impl Drop for MediaKeys {
    fn drop(&mut self) {
        self.main_thread.unregister_client(self.main_thread_client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rialto_cdm_types::MainThread;

    struct NoopClient;
    impl IMediaKeysClient for NoopClient {
        fn on_license_request(&self, _key_session_id: KeySessionId, _url: String, _message: Vec<u8>) {}
        fn on_license_renewal(&self, _key_session_id: KeySessionId, _message: Vec<u8>) {}
        fn on_key_statuses_changed(&self, _key_session_id: KeySessionId, _statuses: rialto_cdm_types::KeyStatusVector) {}
    }

    fn new_media_keys(key_system: &str) -> MediaKeys {
        let main_thread = MainThread::new();
        let backend = Arc::new(rialto_cdm_ocdm::SimulatedNativeDrm::new());
        MediaKeys::new(KeySystem::new(key_system), main_thread, backend).unwrap()
    }

    #[test]
    fn construction_fails_for_unsupported_key_system() {
        let main_thread = MainThread::new();
        let backend = Arc::new(rialto_cdm_ocdm::SimulatedNativeDrm::new());
        assert!(MediaKeys::new(KeySystem::new("org.w3.clearkey"), main_thread, backend).is_err());
    }

    #[test]
    fn create_and_close_session_updates_session_count() {
        let media_keys = new_media_keys("com.widevine.alpha");
        let client = Arc::new(NoopClient);
        let id = media_keys
            .create_key_session(KeySessionType::Temporary, Arc::downgrade(&client) as Weak<dyn IMediaKeysClient>)
            .unwrap();
        assert_eq!(media_keys.session_count(), 1);
        assert_eq!(media_keys.close_key_session(id), MediaKeyErrorStatus::Ok);
        assert_eq!(media_keys.session_count(), 0);
    }

    #[test]
    fn deferred_close_waits_for_usage_counter_to_drain() {
        let media_keys = new_media_keys("com.widevine.alpha");
        let client = Arc::new(NoopClient);
        let id = media_keys
            .create_key_session(KeySessionType::Temporary, Arc::downgrade(&client) as Weak<dyn IMediaKeysClient>)
            .unwrap();

        media_keys.increment_session_id_usage_counter(id);
        media_keys.increment_session_id_usage_counter(id);
        assert_eq!(media_keys.close_key_session(id), MediaKeyErrorStatus::Ok);
        assert_eq!(media_keys.session_count(), 1);

        media_keys.decrement_session_id_usage_counter(id);
        assert_eq!(media_keys.session_count(), 1);

        media_keys.decrement_session_id_usage_counter(id);
        assert_eq!(media_keys.session_count(), 0);
    }

    #[test]
    fn unknown_session_id_operations_are_safe_no_ops() {
        let media_keys = new_media_keys("com.widevine.alpha");
        let bogus = KeySessionId::next();
        media_keys.increment_session_id_usage_counter(bogus);
        media_keys.decrement_session_id_usage_counter(bogus);
        assert_eq!(media_keys.close_key_session(bogus), MediaKeyErrorStatus::BadSessionId);
    }

    #[test]
    fn store_hash_is_256_bytes() {
        let media_keys = new_media_keys("com.widevine.alpha");
        let hash = media_keys.get_key_store_hash().unwrap();
        assert_eq!(hash.len(), STORE_HASH_LEN);
    }
}
