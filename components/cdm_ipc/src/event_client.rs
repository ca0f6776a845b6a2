//! `MediaKeysClient`: the per-`(mediaKeysHandle, ipcClient)` event emitter (§4.5).

use rialto_cdm_core::IMediaKeysClient;
use rialto_cdm_proto::{KeyStatusPair, KeyStatusesChangedEvent, LicenseRenewalEvent, LicenseRequestEvent};
use rialto_cdm_types::{KeySessionId, KeyStatusVector, MediaKeysHandle};
use std::sync::Arc;

/// The transport-facing half of the event path: publishes a wire event to
/// the one IPC client that owns a session. A production build implements
/// this over the IPC transport's outbound channel; transport framing,
/// socket lifecycle, and client export are external collaborators (§1).
pub trait IpcEventSink: Send + Sync {
    /// Publishes a `LicenseRequestEvent`.
    fn send_license_request_event(&self, event: LicenseRequestEvent);

    /// Publishes a `LicenseRenewalEvent`.
    fn send_license_renewal_event(&self, event: LicenseRenewalEvent);

    /// Publishes a `KeyStatusesChangedEvent`.
    fn send_key_statuses_changed_event(&self, event: KeyStatusesChangedEvent);
}

/// Registered as a session's [`IMediaKeysClient`] on `createKeySession` (§4.5).
///
/// Holds the handle its owning `MediaKeys` instance was created under, since
/// `IMediaKeysClient`'s callbacks only ever carry a `KeySessionId` — the wire
/// events need both.
pub struct MediaKeysClient {
    media_keys_handle: MediaKeysHandle,
    sink: Arc<dyn IpcEventSink>,
}

impl MediaKeysClient {
    /// Binds a new emitter to `media_keys_handle`, publishing through `sink`.
    pub fn new(media_keys_handle: MediaKeysHandle, sink: Arc<dyn IpcEventSink>) -> Self {
        Self { media_keys_handle, sink }
    }
}

impl IMediaKeysClient for MediaKeysClient {
    fn on_license_request(&self, key_session_id: KeySessionId, url: String, message: Vec<u8>) {
        self.sink.send_license_request_event(LicenseRequestEvent {
            media_keys_handle: self.media_keys_handle.as_i32(),
            key_session_id: key_session_id.as_i32(),
            url,
            license_request_message: message,
        });
    }

    fn on_license_renewal(&self, key_session_id: KeySessionId, message: Vec<u8>) {
        self.sink.send_license_renewal_event(LicenseRenewalEvent {
            media_keys_handle: self.media_keys_handle.as_i32(),
            key_session_id: key_session_id.as_i32(),
            license_renewal_message: message,
        });
    }

    fn on_key_statuses_changed(&self, key_session_id: KeySessionId, statuses: KeyStatusVector) {
        self.sink.send_key_statuses_changed_event(KeyStatusesChangedEvent {
            media_keys_handle: self.media_keys_handle.as_i32(),
            key_session_id: key_session_id.as_i32(),
            key_statuses: statuses.into_iter().map(KeyStatusPair::from_internal).collect(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rialto_cdm_types::KeyStatus;

    #[derive(Default)]
    struct RecordingSink {
        license_requests: Mutex<Vec<LicenseRequestEvent>>,
        key_statuses: Mutex<Vec<KeyStatusesChangedEvent>>,
    }

    impl IpcEventSink for RecordingSink {
        fn send_license_request_event(&self, event: LicenseRequestEvent) {
            self.license_requests.lock().push(event);
        }
        fn send_license_renewal_event(&self, _event: LicenseRenewalEvent) {}
        fn send_key_statuses_changed_event(&self, event: KeyStatusesChangedEvent) {
            self.key_statuses.lock().push(event);
        }
    }

    #[test]
    fn license_request_event_carries_the_bound_handle() {
        let sink = Arc::new(RecordingSink::default());
        let client = MediaKeysClient::new(MediaKeysHandle::from_i32(7), sink.clone());

        client.on_license_request(KeySessionId::from_i32(3), "http://license".to_string(), vec![1, 2, 3]);

        let events = sink.license_requests.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].media_keys_handle, 7);
        assert_eq!(events[0].key_session_id, 3);
        assert_eq!(events[0].url, "http://license");
    }

    #[test]
    fn key_statuses_changed_event_preserves_order() {
        let sink = Arc::new(RecordingSink::default());
        let client = MediaKeysClient::new(MediaKeysHandle::from_i32(0), sink.clone());

        client.on_key_statuses_changed(
            KeySessionId::from_i32(0),
            vec![(vec![0x11], KeyStatus::Usable), (vec![0x22], KeyStatus::Expired)],
        );

        let events = sink.key_statuses.lock();
        assert_eq!(events[0].key_statuses.len(), 2);
        assert_eq!(events[0].key_statuses[0].key_id, vec![0x11]);
        assert_eq!(events[0].key_statuses[1].key_id, vec![0x22]);
    }
}
