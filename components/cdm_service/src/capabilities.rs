//! Capability probes: `getSupportedKeySystems` and friends (§4.1, §4.4).

use crate::service::CdmService;
use rialto_cdm_ocdm::OcdmSystem;
use rialto_cdm_types::{MediaKeyErrorStatus, KNOWN_KEY_SYSTEMS};
use std::sync::Arc;

/// Capability probes an IPC client may issue before creating any
/// `MediaKeys` instance. Every probe requires the service to be active,
/// matching [`crate::ICdmService`]'s own gating.
pub trait ICdmServiceCapabilities: Send + Sync {
    /// The subset of [`KNOWN_KEY_SYSTEMS`] the native backend supports, in
    /// the order they're statically known.
    fn get_supported_key_systems(&self) -> Vec<String>;

    /// True if `key_system` is supported by the native backend.
    fn supports_key_system(&self, key_system: &str) -> bool;

    /// The native backend's version string for `key_system`.
    fn get_supported_key_system_version(&self, key_system: &str) -> Result<String, MediaKeyErrorStatus>;

    /// True if `key_system` accepts a server certificate.
    fn is_server_certificate_supported(&self, key_system: &str) -> Result<bool, MediaKeyErrorStatus>;
}

impl ICdmServiceCapabilities for CdmService {
    fn get_supported_key_systems(&self) -> Vec<String> {
        if !self.is_active() {
            tracing::error!("Skip to get supported key systems - Session Server in Inactive state");
            return Vec::new();
        }
        KNOWN_KEY_SYSTEMS
            .iter()
            .filter(|key_system| self.supports_key_system(key_system))
            .map(|key_system| key_system.to_string())
            .collect()
    }

    fn supports_key_system(&self, key_system: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        let backend = Arc::clone(&self.backend);
        let key_system = key_system.to_string();
        self.main_thread
            .enqueue_task_and_wait(move || OcdmSystem::is_type_supported(backend.as_ref(), &key_system))
            .is_ok()
    }

    fn get_supported_key_system_version(&self, key_system: &str) -> Result<String, MediaKeyErrorStatus> {
        if !self.is_active() {
            return Err(MediaKeyErrorStatus::Fail);
        }
        let backend = Arc::clone(&self.backend);
        let key_system = key_system.to_string();
        self.main_thread.enqueue_task_and_wait(move || {
            let system = OcdmSystem::new(key_system, backend)?;
            Ok(system.get_version())
        })
    }

    fn is_server_certificate_supported(&self, key_system: &str) -> Result<bool, MediaKeyErrorStatus> {
        if !self.is_active() {
            return Err(MediaKeyErrorStatus::Fail);
        }
        let backend = Arc::clone(&self.backend);
        let key_system = key_system.to_string();
        self.main_thread.enqueue_task_and_wait(move || {
            let system = OcdmSystem::new(key_system, backend)?;
            Ok(system.supports_server_certificate())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ICdmService;
    use rialto_cdm_types::MainThread;

    fn new_service() -> CdmService {
        let main_thread = MainThread::new();
        let backend = Arc::new(rialto_cdm_ocdm::SimulatedNativeDrm::new());
        CdmService::new(main_thread, backend)
    }

    #[test]
    fn capability_probes_require_active_service() {
        let service = new_service();
        assert!(service.get_supported_key_systems().is_empty());
        assert!(!service.supports_key_system("com.widevine.alpha"));
    }

    #[test]
    fn widevine_is_reported_as_supported_once_active() {
        let service = new_service();
        service.switch_to_active();
        assert!(service.supports_key_system("com.widevine.alpha"));
        assert!(service.get_supported_key_systems().contains(&"com.widevine.alpha".to_string()));
    }

    #[test]
    fn unsupported_key_system_is_rejected() {
        let service = new_service();
        service.switch_to_active();
        assert!(!service.supports_key_system("org.w3.clearkey"));
    }

    #[test]
    fn version_probe_succeeds_for_a_supported_key_system() {
        let service = new_service();
        service.switch_to_active();
        let version = service.get_supported_key_system_version("com.widevine.alpha").unwrap();
        assert!(!version.is_empty());
    }
}
