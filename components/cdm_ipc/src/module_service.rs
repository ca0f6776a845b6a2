//! `MediaKeysModuleService` (§4.5): the stateful RPC dispatcher for every
//! `ICdmService` operation, plus the client-lifecycle hooks that make
//! `clientDisconnected` destroy every handle that client owned.

use crate::event_client::{IpcEventSink, MediaKeysClient};
use parking_lot::Mutex;
use rialto_cdm_core::IMediaKeysClient;
use rialto_cdm_proto::{
    CloseKeySessionRequest, CloseKeySessionResponse, ContainsKeyRequest, ContainsKeyResponse, CreateKeySessionRequest,
    CreateKeySessionResponse, CreateMediaKeysRequest, CreateMediaKeysResponse, DeleteDrmStoreRequest,
    DeleteDrmStoreResponse, DeleteKeyStoreRequest, DeleteKeyStoreResponse, DestroyMediaKeysRequest,
    DestroyMediaKeysResponse, GenerateRequestRequest, GenerateRequestResponse, GetCdmKeySessionIdRequest,
    GetCdmKeySessionIdResponse, GetDrmStoreHashRequest, GetDrmStoreHashResponse, GetDrmTimeRequest, GetDrmTimeResponse,
    GetKeyStoreHashRequest, GetKeyStoreHashResponse, GetLastDrmErrorRequest, GetLastDrmErrorResponse,
    GetLdlSessionsLimitRequest, GetLdlSessionsLimitResponse, GetMetricSystemDataRequest, GetMetricSystemDataResponse,
    LoadSessionRequest, LoadSessionResponse, ProtoInitDataType, ProtoKeySessionType, ProtoLimitedDurationLicense,
    ProtoMediaKeyErrorStatus, ReleaseKeySessionRequest, ReleaseKeySessionResponse, RemoveKeySessionRequest,
    RemoveKeySessionResponse, SetDrmHeaderRequest, SetDrmHeaderResponse, UpdateSessionRequest, UpdateSessionResponse,
};
use rialto_cdm_service::ICdmService;
use rialto_cdm_types::{InitDataType, KeySessionId, KeySessionType, KeySystem, LimitedDurationLicense, MediaKeyErrorStatus, MediaKeysHandle};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

fn decode_key_session_type(raw: i32) -> Option<KeySessionType> {
    ProtoKeySessionType::try_from(raw).ok().map(Into::into)
}

fn decode_init_data_type(raw: i32) -> Option<InitDataType> {
    ProtoInitDataType::try_from(raw).ok().map(Into::into)
}

fn decode_ldl(raw: i32) -> Option<LimitedDurationLicense> {
    ProtoLimitedDurationLicense::try_from(raw).ok().map(Into::into)
}

fn status_code(status: MediaKeyErrorStatus) -> i32 {
    ProtoMediaKeyErrorStatus::from(status) as i32
}

/// The stateful RPC dispatcher for every `ICdmService` operation (§4.5).
///
/// Tracks `client → set<MediaKeysHandle>` so that [`Self::client_disconnected`]
/// can destroy every handle a disconnecting client owned, and
/// `keySessionId → MediaKeysClient` so the event emitter registered at
/// `createKeySession` stays alive for the life of the session (the session
/// itself only ever holds it weakly, per §9 Design Notes).
pub struct MediaKeysModuleService {
    cdm_service: Arc<dyn ICdmService>,
    client_handles: Mutex<HashMap<IpcClientIdKey, HashSet<MediaKeysHandle>>>,
    session_clients: Mutex<HashMap<KeySessionId, Arc<MediaKeysClient>>>,
}

use rialto_cdm_types::IpcClientId as IpcClientIdKey;

impl MediaKeysModuleService {
    /// Binds the dispatcher to the process-wide `CdmService`.
    pub fn new(cdm_service: Arc<dyn ICdmService>) -> Self {
        Self {
            cdm_service,
            client_handles: Mutex::new(HashMap::new()),
            session_clients: Mutex::new(HashMap::new()),
        }
    }

    /// Records a freshly connected client. The actual service export onto
    /// the IPC transport is the transport's responsibility (§1).
    pub fn client_connected(&self, client: IpcClientIdKey) {
        tracing::info!(%client, "Client Connected!");
        self.client_handles.lock().entry(client).or_default();
    }

    /// Destroys every `MediaKeys` handle `client` owned. Other clients are
    /// unaffected (§4.4, Testable scenario S4).
    pub fn client_disconnected(&self, client: IpcClientIdKey) {
        tracing::info!(%client, "Client disconnected!");
        let Some(handles) = self.client_handles.lock().remove(&client) else {
            tracing::error!(%client, "unknown client disconnected");
            return;
        };
        for handle in handles {
            self.cdm_service.destroy_media_keys(handle);
        }
    }

    pub fn create_media_keys(&self, client: IpcClientIdKey, request: &CreateMediaKeysRequest) -> CreateMediaKeysResponse {
        tracing::debug!("createMediaKeys requested.");
        let handle = MediaKeysHandle::next();
        if self.cdm_service.create_media_keys(handle, KeySystem::new(request.key_system.clone())) {
            self.client_handles.lock().entry(client).or_default().insert(handle);
            CreateMediaKeysResponse {
                media_keys_handle: handle.as_i32(),
                error_status: status_code(MediaKeyErrorStatus::Ok),
            }
        } else {
            tracing::error!("Create media keys failed");
            CreateMediaKeysResponse {
                media_keys_handle: MediaKeysHandle::unset().as_i32(),
                error_status: status_code(MediaKeyErrorStatus::Fail),
            }
        }
    }

    pub fn destroy_media_keys(&self, client: IpcClientIdKey, request: &DestroyMediaKeysRequest) -> DestroyMediaKeysResponse {
        tracing::debug!("destroyMediaKeys requested.");
        let handle = MediaKeysHandle::from_i32(request.media_keys_handle);
        if !self.cdm_service.destroy_media_keys(handle) {
            tracing::error!("Destroy session failed");
            return DestroyMediaKeysResponse {
                error_status: status_code(MediaKeyErrorStatus::Fail),
            };
        }
        if let Some(handles) = self.client_handles.lock().get_mut(&client) {
            handles.remove(&handle);
        }
        DestroyMediaKeysResponse {
            error_status: status_code(MediaKeyErrorStatus::Ok),
        }
    }

    /// Creates a key session and registers a fresh [`MediaKeysClient`] event
    /// emitter for it, bound to `sink`.
    pub fn create_key_session(
        &self,
        request: &CreateKeySessionRequest,
        sink: Arc<dyn IpcEventSink>,
    ) -> CreateKeySessionResponse {
        tracing::debug!("createKeySession requested.");
        let Some(session_type) = decode_key_session_type(request.session_type) else {
            tracing::error!("rejecting createKeySession: unrecognized session type on the wire");
            return CreateKeySessionResponse {
                key_session_id: KeySessionId::unset().as_i32(),
                error_status: status_code(MediaKeyErrorStatus::Fail),
            };
        };
        let handle = MediaKeysHandle::from_i32(request.media_keys_handle);
        let client = Arc::new(MediaKeysClient::new(handle, sink));
        let weak_client = Arc::downgrade(&client) as std::sync::Weak<dyn IMediaKeysClient>;

        match self.cdm_service.create_key_session(handle, session_type, weak_client) {
            Ok(key_session_id) => {
                self.session_clients.lock().insert(key_session_id, client);
                CreateKeySessionResponse {
                    key_session_id: key_session_id.as_i32(),
                    error_status: status_code(MediaKeyErrorStatus::Ok),
                }
            }
            Err(status) => CreateKeySessionResponse {
                key_session_id: KeySessionId::unset().as_i32(),
                error_status: status_code(status),
            },
        }
    }

    pub fn generate_request(&self, request: &GenerateRequestRequest) -> GenerateRequestResponse {
        tracing::debug!("generateRequest requested.");
        let Some(init_data_type) = decode_init_data_type(request.init_data_type) else {
            return GenerateRequestResponse {
                error_status: status_code(MediaKeyErrorStatus::Fail),
            };
        };
        let Some(ldl) = decode_ldl(request.ldl) else {
            return GenerateRequestResponse {
                error_status: status_code(MediaKeyErrorStatus::Fail),
            };
        };
        let status = self.cdm_service.generate_request(
            MediaKeysHandle::from_i32(request.media_keys_handle),
            KeySessionId::from_i32(request.key_session_id),
            init_data_type,
            request.init_data.clone(),
            ldl,
        );
        GenerateRequestResponse { error_status: status_code(status) }
    }

    pub fn load_session(&self, request: &LoadSessionRequest) -> LoadSessionResponse {
        tracing::debug!("loadSession requested.");
        let status = self.cdm_service.load_session(
            MediaKeysHandle::from_i32(request.media_keys_handle),
            KeySessionId::from_i32(request.key_session_id),
        );
        LoadSessionResponse { error_status: status_code(status) }
    }

    pub fn update_session(&self, request: &UpdateSessionRequest) -> UpdateSessionResponse {
        tracing::debug!("updateSession requested.");
        let status = self.cdm_service.update_session(
            MediaKeysHandle::from_i32(request.media_keys_handle),
            KeySessionId::from_i32(request.key_session_id),
            request.response_data.clone(),
        );
        UpdateSessionResponse { error_status: status_code(status) }
    }

    pub fn set_drm_header(&self, request: &SetDrmHeaderRequest) -> SetDrmHeaderResponse {
        tracing::debug!("setDrmHeader requested.");
        let status = self.cdm_service.set_drm_header(
            MediaKeysHandle::from_i32(request.media_keys_handle),
            KeySessionId::from_i32(request.key_session_id),
            request.request_data.clone(),
        );
        SetDrmHeaderResponse { error_status: status_code(status) }
    }

    pub fn close_key_session(&self, request: &CloseKeySessionRequest) -> CloseKeySessionResponse {
        tracing::debug!("closeKeySession requested.");
        let status = self.cdm_service.close_key_session(KeySessionId::from_i32(request.key_session_id));
        CloseKeySessionResponse { error_status: status_code(status) }
    }

    pub fn remove_key_session(&self, request: &RemoveKeySessionRequest) -> RemoveKeySessionResponse {
        tracing::debug!("removeKeySession requested.");
        let status = self.cdm_service.remove_key_session(
            MediaKeysHandle::from_i32(request.media_keys_handle),
            KeySessionId::from_i32(request.key_session_id),
        );
        if status == MediaKeyErrorStatus::Ok {
            self.session_clients.lock().remove(&KeySessionId::from_i32(request.key_session_id));
        }
        RemoveKeySessionResponse { error_status: status_code(status) }
    }

    pub fn release_key_session(&self, request: &ReleaseKeySessionRequest) -> ReleaseKeySessionResponse {
        tracing::debug!("releaseKeySession requested.");
        let key_session_id = KeySessionId::from_i32(request.key_session_id);
        let status = self.cdm_service.release_key_session(key_session_id);
        if status == MediaKeyErrorStatus::Ok {
            self.session_clients.lock().remove(&key_session_id);
        }
        ReleaseKeySessionResponse { error_status: status_code(status) }
    }

    pub fn get_cdm_key_session_id(&self, request: &GetCdmKeySessionIdRequest) -> GetCdmKeySessionIdResponse {
        tracing::debug!("getCdmKeySessionId requested.");
        match self.cdm_service.get_cdm_key_session_id(
            MediaKeysHandle::from_i32(request.media_keys_handle),
            KeySessionId::from_i32(request.key_session_id),
        ) {
            Ok(id) => GetCdmKeySessionIdResponse {
                cdm_key_session_id: id,
                error_status: status_code(MediaKeyErrorStatus::Ok),
            },
            Err(status) => GetCdmKeySessionIdResponse {
                cdm_key_session_id: String::new(),
                error_status: status_code(status),
            },
        }
    }

    pub fn contains_key(&self, request: &ContainsKeyRequest) -> ContainsKeyResponse {
        tracing::debug!("containsKey requested.");
        let result = self.cdm_service.contains_key(
            MediaKeysHandle::from_i32(request.media_keys_handle),
            KeySessionId::from_i32(request.key_session_id),
            request.key_id.clone(),
        );
        ContainsKeyResponse { contains_key: result }
    }

    pub fn delete_drm_store(&self, request: &DeleteDrmStoreRequest) -> DeleteDrmStoreResponse {
        tracing::debug!("deleteDrmStore requested.");
        let status = self.cdm_service.delete_drm_store(MediaKeysHandle::from_i32(request.media_keys_handle));
        DeleteDrmStoreResponse { error_status: status_code(status) }
    }

    pub fn delete_key_store(&self, request: &DeleteKeyStoreRequest) -> DeleteKeyStoreResponse {
        tracing::debug!("deleteKeyStore requested.");
        let status = self.cdm_service.delete_key_store(MediaKeysHandle::from_i32(request.media_keys_handle));
        DeleteKeyStoreResponse { error_status: status_code(status) }
    }

    pub fn get_drm_store_hash(&self, request: &GetDrmStoreHashRequest) -> GetDrmStoreHashResponse {
        tracing::debug!("getDrmStoreHash requested.");
        match self.cdm_service.get_drm_store_hash(MediaKeysHandle::from_i32(request.media_keys_handle)) {
            Ok(hash) => GetDrmStoreHashResponse { drm_store_hash: hash, error_status: status_code(MediaKeyErrorStatus::Ok) },
            Err(status) => GetDrmStoreHashResponse { drm_store_hash: Vec::new(), error_status: status_code(status) },
        }
    }

    pub fn get_key_store_hash(&self, request: &GetKeyStoreHashRequest) -> GetKeyStoreHashResponse {
        tracing::debug!("getKeyStoreHash requested.");
        match self.cdm_service.get_key_store_hash(MediaKeysHandle::from_i32(request.media_keys_handle)) {
            Ok(hash) => GetKeyStoreHashResponse { key_store_hash: hash, error_status: status_code(MediaKeyErrorStatus::Ok) },
            Err(status) => GetKeyStoreHashResponse { key_store_hash: Vec::new(), error_status: status_code(status) },
        }
    }

    pub fn get_ldl_sessions_limit(&self, request: &GetLdlSessionsLimitRequest) -> GetLdlSessionsLimitResponse {
        tracing::debug!("getLdlSessionsLimit requested.");
        match self.cdm_service.get_ldl_sessions_limit(MediaKeysHandle::from_i32(request.media_keys_handle)) {
            Ok(limit) => GetLdlSessionsLimitResponse { ldl_limit: limit, error_status: status_code(MediaKeyErrorStatus::Ok) },
            Err(status) => GetLdlSessionsLimitResponse { ldl_limit: 0, error_status: status_code(status) },
        }
    }

    pub fn get_last_drm_error(&self, request: &GetLastDrmErrorRequest) -> GetLastDrmErrorResponse {
        tracing::debug!("getLastDrmError requested.");
        match self.cdm_service.get_last_drm_error(
            MediaKeysHandle::from_i32(request.media_keys_handle),
            KeySessionId::from_i32(request.key_session_id),
        ) {
            Ok(code) => GetLastDrmErrorResponse { error_code: code, error_status: status_code(MediaKeyErrorStatus::Ok) },
            Err(status) => GetLastDrmErrorResponse { error_code: 0, error_status: status_code(status) },
        }
    }

    pub fn get_drm_time(&self, request: &GetDrmTimeRequest) -> GetDrmTimeResponse {
        tracing::debug!("getDrmTime requested.");
        match self.cdm_service.get_drm_time(MediaKeysHandle::from_i32(request.media_keys_handle)) {
            Ok(time) => GetDrmTimeResponse { drm_time: time, error_status: status_code(MediaKeyErrorStatus::Ok) },
            Err(status) => GetDrmTimeResponse { drm_time: 0, error_status: status_code(status) },
        }
    }

    pub fn get_metric_system_data(&self, request: &GetMetricSystemDataRequest) -> GetMetricSystemDataResponse {
        tracing::debug!("getMetricSystemData requested.");
        match self.cdm_service.get_metric_system_data(MediaKeysHandle::from_i32(request.media_keys_handle)) {
            Ok(data) => GetMetricSystemDataResponse { metric_system_data: data, error_status: status_code(MediaKeyErrorStatus::Ok) },
            Err(status) => GetMetricSystemDataResponse { metric_system_data: Vec::new(), error_status: status_code(status) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rialto_cdm_proto::{LicenseRenewalEvent, LicenseRequestEvent, KeyStatusesChangedEvent};
    use rialto_cdm_service::CdmService;
    use rialto_cdm_types::MainThread;

    struct DiscardingSink;
    impl IpcEventSink for DiscardingSink {
        fn send_license_request_event(&self, _event: LicenseRequestEvent) {}
        fn send_license_renewal_event(&self, _event: LicenseRenewalEvent) {}
        fn send_key_statuses_changed_event(&self, _event: KeyStatusesChangedEvent) {}
    }

    fn new_dispatcher() -> MediaKeysModuleService {
        let main_thread = MainThread::new();
        let backend = Arc::new(rialto_cdm_ocdm::SimulatedNativeDrm::new());
        let service: Arc<dyn ICdmService> = Arc::new(CdmService::new(main_thread, backend));
        service.switch_to_active();
        MediaKeysModuleService::new(service)
    }

    #[test]
    fn create_media_keys_tracks_the_handle_for_its_client() {
        let dispatcher = new_dispatcher();
        let client = IpcClientIdKey::from_u64(1);
        dispatcher.client_connected(client);

        let response = dispatcher.create_media_keys(client, &CreateMediaKeysRequest { key_system: "com.widevine.alpha".to_string() });
        assert_eq!(response.error_status, status_code(MediaKeyErrorStatus::Ok));
        assert!(dispatcher.client_handles.lock()[&client].contains(&MediaKeysHandle::from_i32(response.media_keys_handle)));
    }

    #[test]
    fn client_disconnected_destroys_only_its_own_handles() {
        let dispatcher = new_dispatcher();
        let client_a = IpcClientIdKey::from_u64(1);
        let client_b = IpcClientIdKey::from_u64(2);
        dispatcher.client_connected(client_a);
        dispatcher.client_connected(client_b);

        let response_a = dispatcher.create_media_keys(client_a, &CreateMediaKeysRequest { key_system: "com.widevine.alpha".to_string() });
        let response_b = dispatcher.create_media_keys(client_b, &CreateMediaKeysRequest { key_system: "com.widevine.alpha".to_string() });

        dispatcher.client_disconnected(client_a);

        let destroy_a_again = dispatcher.destroy_media_keys(client_a, &DestroyMediaKeysRequest { media_keys_handle: response_a.media_keys_handle });
        assert_eq!(destroy_a_again.error_status, status_code(MediaKeyErrorStatus::Fail));

        let contains_b = dispatcher.contains_key(&ContainsKeyRequest {
            media_keys_handle: response_b.media_keys_handle,
            key_session_id: 0,
            key_id: vec![],
        });
        assert!(!contains_b.contains_key);
    }

    #[test]
    fn create_key_session_rejects_an_unrecognized_wire_session_type() {
        let dispatcher = new_dispatcher();
        let response = dispatcher.create_key_session(
            &CreateKeySessionRequest { media_keys_handle: 0, session_type: 99 },
            Arc::new(DiscardingSink),
        );
        assert_eq!(response.error_status, status_code(MediaKeyErrorStatus::Fail));
    }
}
