//! `KeySession`: the per-session state machine (C2).

use crate::client::IMediaKeysClient;
use crate::error_trap::ErrorTrap;
use parking_lot::Mutex;
use rialto_cdm_ocdm::{IOcdmSessionClient, OcdmSession, OcdmStatusHandle, OcdmSystem};
use rialto_cdm_types::{
    CdmKeySessionId, InitDataType, KeySessionId, KeySessionType, KeyStatusVector, KeySystemFamily,
    LimitedDurationLicense, MediaKeyErrorStatus,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// One logical EME key session: owns a DRM `Session` handle, tracks its
/// construction/challenge/update/close phases, and aggregates key-status
/// updates before fanning them out as a single event.
pub struct KeySession {
    key_session_id: KeySessionId,
    session_type: KeySessionType,
    key_system_family: KeySystemFamily,
    is_ldl: AtomicBool,
    client: Weak<dyn IMediaKeysClient>,
    ocdm: Mutex<OcdmSession>,
    status_handle: OcdmStatusHandle,
    is_session_constructed: AtomicBool,
    license_requested: AtomicBool,
    selected_key_id: Mutex<Option<Vec<u8>>>,
    accumulated_statuses: Mutex<KeyStatusVector>,
    error_trap: ErrorTrap,
}

impl KeySession {
    /// Creates the underlying DRM session and returns the owning `KeySession`.
    ///
    /// # Errors
    ///
    /// Returns `Err` iff the native adapter fails to create a session — the
    /// only throwing path in the construction sequence (§4.2).
    pub fn new(
        key_session_id: KeySessionId,
        session_type: KeySessionType,
        key_system_family: KeySystemFamily,
        client: Weak<dyn IMediaKeysClient>,
        system: &OcdmSystem,
    ) -> Result<Arc<Self>, MediaKeyErrorStatus> {
        let ocdm_session = system.create_session()?;
        let status_handle = ocdm_session.status_handle();

        let session = Arc::new_cyclic(|weak_self| {
            let callback_client: Weak<dyn IOcdmSessionClient> = weak_self.clone();
            ocdm_session.bind_client(callback_client);
            KeySession {
                key_session_id,
                session_type,
                key_system_family,
                is_ldl: AtomicBool::new(false),
                client,
                ocdm: Mutex::new(ocdm_session),
                status_handle,
                is_session_constructed: AtomicBool::new(false),
                license_requested: AtomicBool::new(false),
                selected_key_id: Mutex::new(None),
                accumulated_statuses: Mutex::new(Vec::new()),
                error_trap: ErrorTrap::new(),
            }
        });

        Ok(session)
    }

    /// This session's process-unique id.
    pub fn key_session_id(&self) -> KeySessionId {
        self.key_session_id
    }

    /// The session's immutable type.
    pub fn session_type(&self) -> KeySessionType {
        self.session_type
    }

    /// True once the DRM session has been successfully constructed.
    pub fn is_constructed(&self) -> bool {
        self.is_session_constructed.load(Ordering::Acquire)
    }

    /// Runs `f` against the live `OcdmSession`, wrapped in the error trap:
    /// arms it, runs the DRM-forwarding call, and rewrites a successful
    /// return to `Fail` if a callback reported an error mid-call (§4.2).
    fn guarded<F>(&self, f: F) -> MediaKeyErrorStatus
    where
        F: FnOnce(&mut OcdmSession) -> MediaKeyErrorStatus,
    {
        self.error_trap.arm();
        let status = f(&mut self.ocdm.lock());
        if self.error_trap.disarm_and_check() {
            return MediaKeyErrorStatus::Fail;
        }
        status
    }

    /// `generateRequest`: constructs the session on first call; on later
    /// calls, performs the Netflix-PlayReady manual two-step challenge
    /// fetch, or fails for every other key system (§4.2, resolved per the
    /// newer behavior the scenario S2 describes).
    pub fn generate_request(
        &self,
        init_data_type: InitDataType,
        init_data: &[u8],
        ldl: LimitedDurationLicense,
    ) -> MediaKeyErrorStatus {
        if self.is_constructed() {
            return self.generate_request_on_constructed_session();
        }

        if !self.key_system_family.is_netflix_playready() {
            self.license_requested.store(true, Ordering::Release);
        }

        self.is_ldl.store(ldl.as_bool(), Ordering::Release);
        let cdm_key_session_id = CdmKeySessionId::new(self.key_session_id.to_string());
        let init_data_type_name = init_data_type_name(init_data_type);
        let status = self.guarded(|ocdm| ocdm.construct_session(init_data_type_name, init_data, &cdm_key_session_id));
        if status == MediaKeyErrorStatus::Ok {
            self.is_session_constructed.store(true, Ordering::Release);
        }
        status
    }

    fn generate_request_on_constructed_session(&self) -> MediaKeyErrorStatus {
        if !self.key_system_family.is_netflix_playready() {
            return MediaKeyErrorStatus::Fail;
        }

        let challenge = {
            let ocdm = self.ocdm.lock();
            self.error_trap.arm();
            let result = ocdm.get_challenge_data(self.is_ldl.load(Ordering::Acquire));
            let trapped = self.error_trap.disarm_and_check();
            match (result, trapped) {
                (_, true) => return MediaKeyErrorStatus::Fail,
                (Ok(challenge), false) => challenge,
                (Err(status), false) => return status,
            }
        };

        if let Some(client) = self.client.upgrade() {
            // `getChallengeData` has no url output parameter in the native
            // API (unlike the `onProcessChallenge` callback), so the manual
            // fetch path has no native url to forward.
            client.on_license_request(self.key_session_id, String::new(), challenge);
        }
        MediaKeyErrorStatus::Ok
    }

    /// Loads a previously persisted session.
    pub fn load_session(&self) -> MediaKeyErrorStatus {
        self.guarded(|ocdm| ocdm.load())
    }

    /// Feeds a license server response to the DRM, branching by key-system
    /// family: Netflix-PlayReady calls `storeLicenseData`, everyone else
    /// calls `update` (§4.2, Testable Property 5).
    pub fn update_session(&self, response: &[u8]) -> MediaKeyErrorStatus {
        self.guarded(|ocdm| {
            if self.key_system_family.is_netflix_playready() {
                ocdm.store_license_data(response)
            } else {
                ocdm.update(response)
            }
        })
    }

    /// Sets the DRM header blob (PlayReady-family sessions).
    pub fn set_drm_header(&self, header: &[u8]) -> MediaKeyErrorStatus {
        self.guarded(|ocdm| ocdm.set_drm_header(header))
    }

    /// Selects a key id. Deduplicates: re-selecting the currently selected
    /// id returns `Ok` without calling into the DRM (Testable Property 6).
    pub fn select_key_id(&self, key_id: &[u8]) -> MediaKeyErrorStatus {
        let mut selected = self.selected_key_id.lock();
        if selected.as_deref() == Some(key_id) {
            return MediaKeyErrorStatus::Ok;
        }
        let status = self.guarded(|ocdm| ocdm.select_key_id(key_id));
        if status == MediaKeyErrorStatus::Ok {
            *selected = Some(key_id.to_vec());
        }
        status
    }

    /// True if the session currently holds `key_id`.
    pub fn contains_key(&self, key_id: &[u8]) -> bool {
        self.ocdm.lock().has_key_id(key_id)
    }

    /// The CDM-assigned key session id.
    pub fn get_cdm_key_session_id(&self) -> CdmKeySessionId {
        self.ocdm.lock().get_cdm_key_session_id()
    }

    /// The last DRM error code. Always returns `Ok` as the call's own
    /// status; the out parameter carries the actual latched error code,
    /// independent of the return (§9 Open Questions).
    pub fn get_last_drm_error(&self) -> u32 {
        let (_, system_code) = self.ocdm.lock().get_last_drm_error();
        system_code
    }

    /// Removes all keys for this session.
    pub fn remove_key_session(&self) -> MediaKeyErrorStatus {
        self.guarded(|ocdm| ocdm.remove())
    }

    /// Runs the close state machine (§4.2): Netflix-PlayReady sessions
    /// cancel any in-flight challenge and clean the decrypt context before
    /// destruction; all others close directly. Each step short-circuits on
    /// the first non-`Ok` status.
    pub fn close_key_session(&self) -> MediaKeyErrorStatus {
        if !self.is_constructed() {
            return MediaKeyErrorStatus::Ok;
        }

        let status = if self.key_system_family.is_netflix_playready() {
            self.guarded(|ocdm| ocdm.cancel_challenge_data())
                .then_ok(|| self.guarded(|ocdm| ocdm.clean_decrypt_context()))
        } else {
            self.guarded(|ocdm| ocdm.close())
        };

        if status != MediaKeyErrorStatus::Ok {
            return status;
        }

        self.ocdm.lock().destruct_session();
        self.is_session_constructed.store(false, Ordering::Release);
        MediaKeyErrorStatus::Ok
    }

    /// Decrypts `buffer` in place via the preferred native entry point.
    pub fn decrypt(&self, buffer: &mut [u8], key_id: &[u8], iv: &[u8]) -> MediaKeyErrorStatus {
        self.guarded(|ocdm| ocdm.decrypt_buffer(buffer, key_id, iv))
    }

    /// Decrypts `buffer` in place via the deprecated legacy entry point.
    pub fn decrypt_legacy(&self, buffer: &mut [u8], key_id: &[u8], iv: &[u8]) -> MediaKeyErrorStatus {
        self.guarded(|ocdm| ocdm.decrypt(buffer, key_id, iv))
    }
}

/// Extension used only to chain the close state machine's short-circuiting
/// two-step sequence without duplicating the `ocdm.lock()` dance.
trait ThenOk {
    fn then_ok(self, next: impl FnOnce() -> MediaKeyErrorStatus) -> MediaKeyErrorStatus;
}

impl ThenOk for MediaKeyErrorStatus {
    fn then_ok(self, next: impl FnOnce() -> MediaKeyErrorStatus) -> MediaKeyErrorStatus {
        if self == MediaKeyErrorStatus::Ok {
            next()
        } else {
            self
        }
    }
}

fn init_data_type_name(init_data_type: InitDataType) -> &'static str {
    match init_data_type {
        InitDataType::Cenc => "cenc",
        InitDataType::KeyIds => "keyids",
        InitDataType::Webm => "webm",
        InitDataType::DrmHeader => "drmheader",
    }
}

impl IOcdmSessionClient for KeySession {
    fn on_process_challenge(&self, url: String, challenge: Vec<u8>) {
        let Some(client) = self.client.upgrade() else {
            return;
        };
        if self.license_requested.swap(false, Ordering::AcqRel) {
            client.on_license_request(self.key_session_id, url, challenge);
        } else {
            client.on_license_renewal(self.key_session_id, challenge);
        }
    }

    fn on_key_updated(&self, key_id: Vec<u8>) {
        // Uses `status_handle` rather than locking `self.ocdm`: this callback
        // can fire synchronously from inside a call already holding that
        // lock (e.g. a native `update` that resolves key status inline), and
        // `Mutex` is not reentrant.
        let status = self.status_handle.get_status(&key_id);
        self.accumulated_statuses.lock().push((key_id, status));
    }

    fn on_all_keys_updated(&self, _statuses: KeyStatusVector) {
        let flushed: KeyStatusVector = std::mem::take(&mut self.accumulated_statuses.lock());
        if let Some(client) = self.client.upgrade() {
            client.on_key_statuses_changed(self.key_session_id, flushed);
        }
    }

    fn on_error(&self, _status: MediaKeyErrorStatus, _system_code: u32) {
        self.error_trap.record_error();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rialto_cdm_ocdm::SimulatedNativeDrm;

    struct RecordingClient {
        requests: Mutex<Vec<(KeySessionId, String, Vec<u8>)>>,
        renewals: Mutex<Vec<(KeySessionId, Vec<u8>)>>,
        statuses: Mutex<Vec<(KeySessionId, KeyStatusVector)>>,
    }

    impl RecordingClient {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                renewals: Mutex::new(Vec::new()),
                statuses: Mutex::new(Vec::new()),
            })
        }
    }

    impl IMediaKeysClient for RecordingClient {
        fn on_license_request(&self, key_session_id: KeySessionId, url: String, message: Vec<u8>) {
            self.requests.lock().push((key_session_id, url, message));
        }

        fn on_license_renewal(&self, key_session_id: KeySessionId, message: Vec<u8>) {
            self.renewals.lock().push((key_session_id, message));
        }

        fn on_key_statuses_changed(&self, key_session_id: KeySessionId, statuses: KeyStatusVector) {
            self.statuses.lock().push((key_session_id, statuses));
        }
    }

    fn new_system() -> OcdmSystem {
        let backend = Arc::new(SimulatedNativeDrm::new());
        OcdmSystem::new("com.widevine.alpha", backend).unwrap()
    }

    #[test]
    fn generate_request_constructs_then_fails_on_second_call_for_widevine() {
        let system = new_system();
        let client = RecordingClient::new();
        let session = KeySession::new(
            KeySessionId::next(),
            KeySessionType::Temporary,
            KeySystemFamily::Widevine,
            Arc::downgrade(&client) as Weak<dyn IMediaKeysClient>,
            &system,
        )
        .unwrap();

        let first = session.generate_request(InitDataType::Cenc, b"\x01\x02\x03", LimitedDurationLicense::Disabled);
        assert_eq!(first, MediaKeyErrorStatus::Ok);
        assert!(session.is_constructed());

        let second = session.generate_request(InitDataType::Cenc, b"\x01\x02\x03", LimitedDurationLicense::Disabled);
        assert_eq!(second, MediaKeyErrorStatus::Fail);

        let requests = client.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1, "http://");
    }

    #[test]
    fn update_session_routes_to_store_license_data_for_netflix_playready() {
        let system = new_system();
        let client = RecordingClient::new();
        let session = KeySession::new(
            KeySessionId::next(),
            KeySessionType::Temporary,
            KeySystemFamily::NetflixPlayready,
            Arc::downgrade(&client) as Weak<dyn IMediaKeysClient>,
            &system,
        )
        .unwrap();
        session.generate_request(InitDataType::Cenc, b"\x01\x02", LimitedDurationLicense::NotSpecified);

        assert_eq!(session.update_session(b"response"), MediaKeyErrorStatus::Ok);
    }

    #[test]
    fn update_session_delivers_key_status_without_deadlocking_on_synchronous_callback() {
        let system = new_system();
        let client = RecordingClient::new();
        let session = KeySession::new(
            KeySessionId::next(),
            KeySessionType::Temporary,
            KeySystemFamily::Widevine,
            Arc::downgrade(&client) as Weak<dyn IMediaKeysClient>,
            &system,
        )
        .unwrap();
        session.generate_request(InitDataType::Cenc, b"\x01\x02", LimitedDurationLicense::Disabled);

        // The simulated backend delivers `keyUpdated`/`allKeysUpdated`
        // synchronously from within this very call, while `guarded` still
        // holds the session's own `ocdm` lock.
        assert_eq!(session.update_session(b"response"), MediaKeyErrorStatus::Ok);

        let statuses = client.statuses.lock();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].1.len(), 1);
    }

    #[test]
    fn select_key_id_is_idempotent() {
        let system = new_system();
        let client = RecordingClient::new();
        let session = KeySession::new(
            KeySessionId::next(),
            KeySessionType::Temporary,
            KeySystemFamily::Widevine,
            Arc::downgrade(&client) as Weak<dyn IMediaKeysClient>,
            &system,
        )
        .unwrap();

        assert_eq!(session.select_key_id(b"key-a"), MediaKeyErrorStatus::Ok);
        assert_eq!(session.select_key_id(b"key-a"), MediaKeyErrorStatus::Ok);
    }

    #[test]
    fn key_status_aggregation_flushes_in_order() {
        let system = new_system();
        let client = RecordingClient::new();
        let session = KeySession::new(
            KeySessionId::next(),
            KeySessionType::Temporary,
            KeySystemFamily::Widevine,
            Arc::downgrade(&client) as Weak<dyn IMediaKeysClient>,
            &system,
        )
        .unwrap();

        IOcdmSessionClient::on_key_updated(&*session, b"\x11".to_vec());
        IOcdmSessionClient::on_key_updated(&*session, b"\x22".to_vec());
        IOcdmSessionClient::on_all_keys_updated(&*session, Vec::new());

        let statuses = client.statuses.lock();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].1.len(), 2);
        assert_eq!(statuses[0].1[0].0, b"\x11".to_vec());
        assert_eq!(statuses[0].1[1].0, b"\x22".to_vec());
    }
}
