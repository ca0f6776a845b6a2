//! An in-process stand-in for the native OCDM-style library.
//!
//! Production deployments bind [`crate::NativeDrm`] to the real native
//! library via FFI. This simulation exists so the adapter, the key
//! session layer, and the CDM service can be built and exercised without
//! a platform CDM present; it is not a substitute for one.

use crate::error::{NativeKeyStatus, NativeStatus};
use crate::session::IOcdmSessionClient;
use crate::system::{NativeDrm, NativeSessionId, NativeSystemId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

const SUPPORTED_KEY_SYSTEMS: &[&str] = &[
    "com.widevine.alpha",
    "com.microsoft.playready",
    "com.netflix.playready",
];

/// The fixed challenge payload this simulation hands back everywhere a real
/// adapter would deliver native-generated challenge bytes.
const CHALLENGE_DATA: &[u8] = &[0x64, 0x65, 0x66];

/// The fixed license server url this simulation hands back alongside every
/// challenge it delivers.
const CHALLENGE_URL: &str = "http://";

struct SimulatedSession {
    constructed: bool,
    cdm_key_session_id: String,
    key_ids: Vec<Vec<u8>>,
    selected_key_id: Option<Vec<u8>>,
    client: Option<Weak<dyn IOcdmSessionClient>>,
    is_netflix_playready: bool,
}

fn is_netflix_playready(key_system: &str) -> bool {
    let lower = key_system.to_ascii_lowercase();
    lower.contains("netflix") && lower.contains("playready")
}

/// An in-process simulation of a native OCDM-style library.
///
/// Tracks enough state — constructed systems and sessions, key ids, a
/// monotonic version string — to make the adapter and everything above it
/// testable end-to-end. Never route production traffic through this.
pub struct SimulatedNativeDrm {
    next_handle: AtomicU64,
    systems: Mutex<HashMap<NativeSystemId, String>>,
    sessions: Mutex<HashMap<NativeSessionId, SimulatedSession>>,
}

impl Default for SimulatedNativeDrm {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedNativeDrm {
    /// Creates a fresh simulated backend with no systems or sessions.
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            systems: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}

impl NativeDrm for SimulatedNativeDrm {
    fn is_type_supported(&self, key_system: &str) -> NativeStatus {
        if SUPPORTED_KEY_SYSTEMS.contains(&key_system) {
            NativeStatus::None
        } else {
            NativeStatus::KeysystemNotSupported
        }
    }

    fn create_system(&self, key_system: &str) -> Option<NativeSystemId> {
        if SUPPORTED_KEY_SYSTEMS.contains(&key_system) {
            let handle = self.next_handle();
            self.systems.lock().insert(handle, key_system.to_string());
            Some(handle)
        } else {
            None
        }
    }

    fn destroy_system(&self, _system: NativeSystemId) {}

    fn get_version(&self, _system: NativeSystemId) -> String {
        "simulated-ocdm-1.0".to_string()
    }

    fn get_ldl_sessions_limit(&self, _system: NativeSystemId) -> u32 {
        16
    }

    fn delete_key_store(&self, _system: NativeSystemId) -> NativeStatus {
        NativeStatus::None
    }

    fn delete_secure_store(&self, _system: NativeSystemId) -> NativeStatus {
        NativeStatus::None
    }

    fn get_key_store_hash(&self, _system: NativeSystemId, out: &mut [u8]) -> NativeStatus {
        out.fill(0xAB);
        NativeStatus::None
    }

    fn get_secure_store_hash(&self, _system: NativeSystemId, out: &mut [u8]) -> NativeStatus {
        out.fill(0xCD);
        NativeStatus::None
    }

    fn get_drm_time(&self, _system: NativeSystemId) -> u64 {
        0
    }

    fn supports_server_certificate(&self, _system: NativeSystemId) -> bool {
        true
    }

    fn get_metric_system_data(&self, _system: NativeSystemId, out: &mut Vec<u8>) -> NativeStatus {
        let payload = b"simulated-metric-data";
        if out.capacity() < payload.len() {
            return NativeStatus::BufferTooSmall;
        }
        out.clear();
        out.extend_from_slice(payload);
        NativeStatus::None
    }

    fn create_session(&self, system: NativeSystemId) -> Option<NativeSessionId> {
        let handle = self.next_handle();
        let is_netflix_playready = self
            .systems
            .lock()
            .get(&system)
            .map(|key_system| is_netflix_playready(key_system))
            .unwrap_or(false);
        self.sessions.lock().insert(
            handle,
            SimulatedSession {
                constructed: false,
                cdm_key_session_id: format!("simulated-session-{handle}"),
                key_ids: Vec::new(),
                selected_key_id: None,
                client: None,
                is_netflix_playready,
            },
        );
        Some(handle)
    }

    fn bind_session_client(&self, session: NativeSessionId, client: Weak<dyn IOcdmSessionClient>) {
        if let Some(s) = self.sessions.lock().get_mut(&session) {
            s.client = Some(client);
        }
    }

    fn construct_session(
        &self,
        session: NativeSessionId,
        _init_data_type: &str,
        _init_data: &[u8],
        cdm_key_session_id: &str,
    ) -> NativeStatus {
        let client = {
            let mut sessions = self.sessions.lock();
            match sessions.get_mut(&session) {
                Some(s) => {
                    s.constructed = true;
                    if !cdm_key_session_id.is_empty() {
                        s.cdm_key_session_id = cdm_key_session_id.to_string();
                    }
                    // Netflix-PlayReady never delivers a challenge off the
                    // back of construction alone; the caller fetches it
                    // explicitly through the two-step generateRequest path.
                    if s.is_netflix_playready {
                        None
                    } else {
                        s.client.clone()
                    }
                }
                None => return NativeStatus::InvalidSession,
            }
        };
        // Real native libraries deliver the first challenge asynchronously,
        // on their own thread, some time after construction succeeds. This
        // simulation delivers it synchronously and immediately, since it has
        // no thread of its own to deliver it from later.
        if let Some(client) = client.and_then(|weak| weak.upgrade()) {
            client.on_process_challenge(CHALLENGE_URL.to_string(), CHALLENGE_DATA.to_vec());
        }
        NativeStatus::None
    }

    fn get_challenge_data_size(&self, session: NativeSessionId, _is_ldl: bool) -> Result<usize, NativeStatus> {
        if self.sessions.lock().contains_key(&session) {
            Ok(CHALLENGE_DATA.len())
        } else {
            Err(NativeStatus::InvalidSession)
        }
    }

    fn fill_challenge_data(&self, session: NativeSessionId, _is_ldl: bool, out: &mut [u8]) -> NativeStatus {
        if self.sessions.lock().contains_key(&session) {
            out.copy_from_slice(CHALLENGE_DATA);
            NativeStatus::None
        } else {
            NativeStatus::InvalidSession
        }
    }

    fn cancel_challenge_data(&self, session: NativeSessionId) -> NativeStatus {
        if self.sessions.lock().contains_key(&session) {
            NativeStatus::None
        } else {
            NativeStatus::InvalidSession
        }
    }

    fn store_license_data(&self, session: NativeSessionId, _response: &[u8]) -> NativeStatus {
        let (client, new_key_id) = {
            let mut sessions = self.sessions.lock();
            match sessions.get_mut(&session) {
                Some(s) => {
                    let new_key_id = if s.key_ids.is_empty() {
                        let key_id = vec![0x01, 0x02, 0x03, 0x04];
                        s.key_ids.push(key_id.clone());
                        Some(key_id)
                    } else {
                        None
                    };
                    (s.client.clone(), new_key_id)
                }
                None => return NativeStatus::InvalidSession,
            }
        };
        if let (Some(key_id), Some(client)) = (new_key_id, client.and_then(|weak| weak.upgrade())) {
            client.on_key_updated(key_id);
            client.on_all_keys_updated(Vec::new());
        }
        NativeStatus::None
    }

    fn load(&self, session: NativeSessionId) -> NativeStatus {
        if self.sessions.lock().contains_key(&session) {
            NativeStatus::None
        } else {
            NativeStatus::InvalidSession
        }
    }

    fn update(&self, session: NativeSessionId, _response: &[u8]) -> NativeStatus {
        let (client, new_key_id) = {
            let mut sessions = self.sessions.lock();
            match sessions.get_mut(&session) {
                Some(s) => {
                    let new_key_id = if s.key_ids.is_empty() {
                        let key_id = vec![0x01, 0x02, 0x03, 0x04];
                        s.key_ids.push(key_id.clone());
                        Some(key_id)
                    } else {
                        None
                    };
                    (s.client.clone(), new_key_id)
                }
                None => return NativeStatus::InvalidSession,
            }
        };
        // Real native libraries deliver `keyUpdated`/`allKeysUpdated` on
        // their own thread some time after `update` returns. This
        // simulation delivers them synchronously, matching how
        // `construct_session` already stands in for asynchronous delivery.
        if let (Some(key_id), Some(client)) = (new_key_id, client.and_then(|weak| weak.upgrade())) {
            client.on_key_updated(key_id);
            client.on_all_keys_updated(Vec::new());
        }
        NativeStatus::None
    }

    fn remove(&self, session: NativeSessionId) -> NativeStatus {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&session) {
            Some(s) => {
                s.key_ids.clear();
                NativeStatus::None
            }
            None => NativeStatus::InvalidSession,
        }
    }

    fn close(&self, session: NativeSessionId) -> NativeStatus {
        if self.sessions.lock().contains_key(&session) {
            NativeStatus::None
        } else {
            NativeStatus::InvalidSession
        }
    }

    fn clean_decrypt_context(&self, session: NativeSessionId) -> NativeStatus {
        if self.sessions.lock().contains_key(&session) {
            NativeStatus::None
        } else {
            NativeStatus::InvalidSession
        }
    }

    fn destruct_session(&self, session: NativeSessionId) {
        self.sessions.lock().remove(&session);
    }

    fn decrypt_buffer(&self, session: NativeSessionId, buffer: &mut [u8], _key_id: &[u8], _iv: &[u8]) -> NativeStatus {
        if self.sessions.lock().contains_key(&session) {
            for byte in buffer.iter_mut() {
                *byte ^= 0xFF;
            }
            NativeStatus::None
        } else {
            NativeStatus::InvalidSession
        }
    }

    fn has_legacy_decrypt(&self) -> bool {
        false
    }

    fn decrypt(&self, _session: NativeSessionId, _buffer: &mut [u8], _key_id: &[u8], _iv: &[u8]) -> NativeStatus {
        NativeStatus::InterfaceNotImplemented
    }

    fn get_status(&self, session: NativeSessionId, key_id: &[u8]) -> NativeKeyStatus {
        let sessions = self.sessions.lock();
        match sessions.get(&session) {
            Some(s) if s.key_ids.iter().any(|k| k == key_id) => NativeKeyStatus::Usable,
            Some(_) => NativeKeyStatus::StatusPending,
            None => NativeKeyStatus::InternalError,
        }
    }

    fn get_cdm_key_session_id(&self, session: NativeSessionId) -> String {
        self.sessions
            .lock()
            .get(&session)
            .map(|s| s.cdm_key_session_id.clone())
            .unwrap_or_default()
    }

    fn select_key_id(&self, session: NativeSessionId, key_id: &[u8]) -> NativeStatus {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&session) {
            Some(s) => {
                s.selected_key_id = Some(key_id.to_vec());
                NativeStatus::None
            }
            None => NativeStatus::InvalidSession,
        }
    }

    fn has_key_id(&self, session: NativeSessionId, key_id: &[u8]) -> bool {
        self.sessions
            .lock()
            .get(&session)
            .map(|s| s.key_ids.iter().any(|k| k == key_id))
            .unwrap_or(false)
    }

    fn set_drm_header(&self, session: NativeSessionId, _header: &[u8]) -> NativeStatus {
        if self.sessions.lock().contains_key(&session) {
            NativeStatus::None
        } else {
            NativeStatus::InvalidSession
        }
    }

    fn get_last_drm_error(&self, _session: NativeSessionId) -> (NativeStatus, u32) {
        (NativeStatus::None, 0)
    }
}
