//! # cdm_proto
//!
//! The wire schema (§6): protobuf request/response/event messages generated
//! from `proto/cdm.proto`, plus the bidirectional enum conversions between
//! the wire vocabulary and [`rialto_cdm_types`]'s internal vocabulary.
//!
//! Conversions live here rather than in `rialto_cdm_ipc` because the orphan
//! rule requires at least one of the two types in a `From` impl to be local
//! to this crate — the generated proto enums are.

#![warn(missing_docs)]
#![deny(unsafe_code)]

/// Generated protobuf types for `rialto.cdm`.
pub mod rialto_cdm {
    include!(concat!(env!("OUT_DIR"), "/rialto.cdm.rs"));
}

pub use rialto_cdm::*;

pub use prost;

use rialto_cdm_types::{InitDataType, KeySessionType, KeyStatus, LimitedDurationLicense, MediaKeyErrorStatus};

impl From<MediaKeyErrorStatus> for ProtoMediaKeyErrorStatus {
    fn from(status: MediaKeyErrorStatus) -> Self {
        match status {
            MediaKeyErrorStatus::Ok => Self::Ok,
            MediaKeyErrorStatus::BadSessionId => Self::BadSessionId,
            MediaKeyErrorStatus::NotSupported => Self::NotSupported,
            MediaKeyErrorStatus::InvalidState => Self::InvalidState,
            MediaKeyErrorStatus::Fail => Self::Fail,
            MediaKeyErrorStatus::BufferTooSmall => Self::BufferTooSmall,
            MediaKeyErrorStatus::InterfaceNotImplemented => Self::InterfaceNotImplemented,
        }
    }
}

impl From<ProtoMediaKeyErrorStatus> for MediaKeyErrorStatus {
    fn from(status: ProtoMediaKeyErrorStatus) -> Self {
        match status {
            ProtoMediaKeyErrorStatus::Ok => Self::Ok,
            ProtoMediaKeyErrorStatus::BadSessionId => Self::BadSessionId,
            ProtoMediaKeyErrorStatus::NotSupported => Self::NotSupported,
            ProtoMediaKeyErrorStatus::InvalidState => Self::InvalidState,
            ProtoMediaKeyErrorStatus::Fail => Self::Fail,
            ProtoMediaKeyErrorStatus::BufferTooSmall => Self::BufferTooSmall,
            ProtoMediaKeyErrorStatus::InterfaceNotImplemented => Self::InterfaceNotImplemented,
        }
    }
}

impl From<KeySessionType> for ProtoKeySessionType {
    fn from(session_type: KeySessionType) -> Self {
        match session_type {
            KeySessionType::Temporary => Self::Temporary,
            KeySessionType::PersistentLicence => Self::PersistentLicence,
            KeySessionType::PersistentReleaseMessage => Self::PersistentReleaseMessage,
        }
    }
}

impl From<ProtoKeySessionType> for KeySessionType {
    fn from(session_type: ProtoKeySessionType) -> Self {
        match session_type {
            ProtoKeySessionType::Temporary => Self::Temporary,
            ProtoKeySessionType::PersistentLicence => Self::PersistentLicence,
            ProtoKeySessionType::PersistentReleaseMessage => Self::PersistentReleaseMessage,
        }
    }
}

impl From<InitDataType> for ProtoInitDataType {
    fn from(init_data_type: InitDataType) -> Self {
        match init_data_type {
            InitDataType::Cenc => Self::Cenc,
            InitDataType::KeyIds => Self::KeyIds,
            InitDataType::Webm => Self::Webm,
            InitDataType::DrmHeader => Self::DrmHeader,
        }
    }
}

impl From<ProtoInitDataType> for InitDataType {
    fn from(init_data_type: ProtoInitDataType) -> Self {
        match init_data_type {
            ProtoInitDataType::Cenc => Self::Cenc,
            ProtoInitDataType::KeyIds => Self::KeyIds,
            ProtoInitDataType::Webm => Self::Webm,
            ProtoInitDataType::DrmHeader => Self::DrmHeader,
        }
    }
}

impl From<LimitedDurationLicense> for ProtoLimitedDurationLicense {
    fn from(ldl: LimitedDurationLicense) -> Self {
        match ldl {
            LimitedDurationLicense::NotSpecified => Self::NotSpecified,
            LimitedDurationLicense::Disabled => Self::LdlDisabled,
            LimitedDurationLicense::Enabled => Self::LdlEnabled,
        }
    }
}

impl From<ProtoLimitedDurationLicense> for LimitedDurationLicense {
    fn from(ldl: ProtoLimitedDurationLicense) -> Self {
        match ldl {
            ProtoLimitedDurationLicense::NotSpecified => Self::NotSpecified,
            ProtoLimitedDurationLicense::LdlDisabled => Self::Disabled,
            ProtoLimitedDurationLicense::LdlEnabled => Self::Enabled,
        }
    }
}

impl From<KeyStatus> for ProtoKeyStatus {
    fn from(status: KeyStatus) -> Self {
        match status {
            KeyStatus::Usable => Self::Usable,
            KeyStatus::Expired => Self::Expired,
            KeyStatus::OutputRestricted => Self::OutputRestricted,
            KeyStatus::Pending => Self::Pending,
            KeyStatus::InternalError => Self::InternalError,
            KeyStatus::Released => Self::Released,
        }
    }
}

impl From<ProtoKeyStatus> for KeyStatus {
    fn from(status: ProtoKeyStatus) -> Self {
        match status {
            ProtoKeyStatus::Usable => Self::Usable,
            ProtoKeyStatus::Expired => Self::Expired,
            ProtoKeyStatus::OutputRestricted => Self::OutputRestricted,
            ProtoKeyStatus::Pending => Self::Pending,
            ProtoKeyStatus::InternalError => Self::InternalError,
            ProtoKeyStatus::Released => Self::Released,
        }
    }
}

impl KeyStatusPair {
    /// Builds a wire pair from an internal `(keyId, KeyStatus)` tuple.
    pub fn from_internal(pair: (Vec<u8>, KeyStatus)) -> Self {
        Self {
            key_id: pair.0,
            key_status: ProtoKeyStatus::from(pair.1) as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_key_error_status_round_trips() {
        for status in [
            MediaKeyErrorStatus::Ok,
            MediaKeyErrorStatus::BadSessionId,
            MediaKeyErrorStatus::NotSupported,
            MediaKeyErrorStatus::InvalidState,
            MediaKeyErrorStatus::Fail,
            MediaKeyErrorStatus::BufferTooSmall,
            MediaKeyErrorStatus::InterfaceNotImplemented,
        ] {
            let wire: ProtoMediaKeyErrorStatus = status.into();
            assert_eq!(MediaKeyErrorStatus::from(wire), status);
        }
    }

    #[test]
    fn key_session_type_round_trips() {
        for session_type in [
            KeySessionType::Temporary,
            KeySessionType::PersistentLicence,
            KeySessionType::PersistentReleaseMessage,
        ] {
            let wire: ProtoKeySessionType = session_type.into();
            assert_eq!(KeySessionType::from(wire), session_type);
        }
    }

    #[test]
    fn init_data_type_round_trips() {
        for init_data_type in [InitDataType::Cenc, InitDataType::KeyIds, InitDataType::Webm, InitDataType::DrmHeader] {
            let wire: ProtoInitDataType = init_data_type.into();
            assert_eq!(InitDataType::from(wire), init_data_type);
        }
    }

    #[test]
    fn limited_duration_license_round_trips() {
        for ldl in [
            LimitedDurationLicense::NotSpecified,
            LimitedDurationLicense::Disabled,
            LimitedDurationLicense::Enabled,
        ] {
            let wire: ProtoLimitedDurationLicense = ldl.into();
            assert_eq!(LimitedDurationLicense::from(wire), ldl);
        }
    }

    #[test]
    fn key_status_round_trips() {
        for status in [
            KeyStatus::Usable,
            KeyStatus::Expired,
            KeyStatus::OutputRestricted,
            KeyStatus::Pending,
            KeyStatus::InternalError,
            KeyStatus::Released,
        ] {
            let wire: ProtoKeyStatus = status.into();
            assert_eq!(KeyStatus::from(wire), status);
        }
    }
}
