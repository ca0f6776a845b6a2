//! `MediaKeysCapabilitiesModuleService` (§4.5): the stateless dispatcher for
//! the capability-probe RPCs, independent of any connected client's handles.

use rialto_cdm_proto::{
    GetSupportedKeySystemVersionRequest, GetSupportedKeySystemVersionResponse, GetSupportedKeySystemsRequest,
    GetSupportedKeySystemsResponse, IsServerCertificateSupportedRequest, IsServerCertificateSupportedResponse,
    SupportsKeySystemRequest, SupportsKeySystemResponse,
};
use rialto_cdm_service::ICdmServiceCapabilities;
use std::sync::Arc;

/// The stateless RPC dispatcher for every `ICdmServiceCapabilities` probe.
pub struct MediaKeysCapabilitiesModuleService {
    capabilities: Arc<dyn ICdmServiceCapabilities>,
}

impl MediaKeysCapabilitiesModuleService {
    /// Binds the dispatcher to the process-wide `CdmService`.
    pub fn new(capabilities: Arc<dyn ICdmServiceCapabilities>) -> Self {
        Self { capabilities }
    }

    pub fn get_supported_key_systems(&self, _request: &GetSupportedKeySystemsRequest) -> GetSupportedKeySystemsResponse {
        tracing::debug!("getSupportedKeySystems requested.");
        GetSupportedKeySystemsResponse {
            key_systems: self.capabilities.get_supported_key_systems(),
        }
    }

    pub fn supports_key_system(&self, request: &SupportsKeySystemRequest) -> SupportsKeySystemResponse {
        tracing::debug!("supportsKeySystem requested.");
        SupportsKeySystemResponse {
            is_supported: self.capabilities.supports_key_system(&request.key_system),
        }
    }

    pub fn get_supported_key_system_version(
        &self,
        request: &GetSupportedKeySystemVersionRequest,
    ) -> GetSupportedKeySystemVersionResponse {
        tracing::debug!("getSupportedKeySystemVersion requested.");
        match self.capabilities.get_supported_key_system_version(&request.key_system) {
            Ok(version) => GetSupportedKeySystemVersionResponse { version, is_supported: true },
            Err(_) => GetSupportedKeySystemVersionResponse { version: String::new(), is_supported: false },
        }
    }

    pub fn is_server_certificate_supported(
        &self,
        request: &IsServerCertificateSupportedRequest,
    ) -> IsServerCertificateSupportedResponse {
        tracing::debug!("isServerCertificateSupported requested.");
        let is_supported = self
            .capabilities
            .is_server_certificate_supported(&request.key_system)
            .unwrap_or(false);
        IsServerCertificateSupportedResponse { is_supported }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rialto_cdm_service::{CdmService, ICdmService};
    use rialto_cdm_types::MainThread;

    fn new_dispatcher() -> MediaKeysCapabilitiesModuleService {
        let main_thread = MainThread::new();
        let backend = Arc::new(rialto_cdm_ocdm::SimulatedNativeDrm::new());
        let service: Arc<CdmService> = Arc::new(CdmService::new(main_thread, backend));
        service.switch_to_active();
        MediaKeysCapabilitiesModuleService::new(service)
    }

    #[test]
    fn widevine_is_reported_supported() {
        let dispatcher = new_dispatcher();
        let response = dispatcher.supports_key_system(&SupportsKeySystemRequest { key_system: "com.widevine.alpha".to_string() });
        assert!(response.is_supported);
    }

    #[test]
    fn unsupported_key_system_version_probe_fails_closed() {
        let dispatcher = new_dispatcher();
        let response = dispatcher.get_supported_key_system_version(&GetSupportedKeySystemVersionRequest {
            key_system: "org.w3.clearkey".to_string(),
        });
        assert!(!response.is_supported);
        assert!(response.version.is_empty());
    }

    #[test]
    fn get_supported_key_systems_lists_widevine() {
        let dispatcher = new_dispatcher();
        let response = dispatcher.get_supported_key_systems(&GetSupportedKeySystemsRequest {});
        assert!(response.key_systems.contains(&"com.widevine.alpha".to_string()));
    }
}
