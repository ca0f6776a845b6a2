//! Native error and key-status codes and their collapse onto the neutral
//! [`MediaKeyErrorStatus`] and [`rialto_cdm_types::KeyStatus`] vocabularies.

use rialto_cdm_types::MediaKeyErrorStatus;

/// A status code as reported by the native DRM library, before translation.
///
/// Mirrors the OCDM native error vocabulary: `ERROR_NONE`,
/// `ERROR_INVALID_SESSION`, `ERROR_KEYSYSTEM_NOT_SUPPORTED`,
/// `ERROR_INTERFACE_NOT_IMPLEMENTED`, `ERROR_BUFFER_TOO_SMALL`, and
/// everything else folded into `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeStatus {
    /// `ERROR_NONE`
    None,
    /// `ERROR_INVALID_SESSION`
    InvalidSession,
    /// `ERROR_KEYSYSTEM_NOT_SUPPORTED`
    KeysystemNotSupported,
    /// `ERROR_INTERFACE_NOT_IMPLEMENTED`
    InterfaceNotImplemented,
    /// `ERROR_BUFFER_TOO_SMALL`
    BufferTooSmall,
    /// Any other native code, preserved for logging.
    Unknown(i32),
}

impl NativeStatus {
    /// Maps a native status onto the neutral [`MediaKeyErrorStatus`], per
    /// the adapter's error mapping table (§4.1). This is a one-way
    /// translation: callers never see native codes past this boundary.
    pub fn into_status(self) -> MediaKeyErrorStatus {
        match self {
            NativeStatus::None => MediaKeyErrorStatus::Ok,
            NativeStatus::InvalidSession => MediaKeyErrorStatus::BadSessionId,
            NativeStatus::KeysystemNotSupported => MediaKeyErrorStatus::NotSupported,
            NativeStatus::InterfaceNotImplemented => MediaKeyErrorStatus::InterfaceNotImplemented,
            NativeStatus::BufferTooSmall => MediaKeyErrorStatus::BufferTooSmall,
            NativeStatus::Unknown(code) => {
                tracing::debug!(code, "Unmapped native DRM status, collapsing to Fail");
                MediaKeyErrorStatus::Fail
            }
        }
    }

    /// True for `ERROR_NONE`.
    pub fn is_ok(&self) -> bool {
        matches!(self, NativeStatus::None)
    }
}

/// A key status as reported by the native DRM library, before collapse.
///
/// Mirrors OCDM's `KeyStatus` vocabulary (`wrappers/source/OcdmSession.cpp`'s
/// `convertKeyStatus`): `Usable`, `Expired`, `Released`, `OutputRestricted`,
/// `OutputRestrictedHdcp22`, `StatusPending`, `OutputDownscaled`,
/// `InternalError`, `HwError`, and anything else native and unrecognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKeyStatus {
    /// `Usable`
    Usable,
    /// `Expired`
    Expired,
    /// `Released`
    Released,
    /// `OutputRestricted`
    OutputRestricted,
    /// `OutputRestrictedHDCP22`
    OutputRestrictedHdcp22,
    /// `StatusPending`
    StatusPending,
    /// `OutputDownscaled`
    OutputDownscaled,
    /// `InternalError`
    InternalError,
    /// `HWError`
    HwError,
    /// Any other native code, preserved for logging.
    Unknown(i32),
}

impl NativeKeyStatus {
    /// Collapses the native key-status vocabulary onto the neutral
    /// [`rialto_cdm_types::KeyStatus`], per §3: the HDCP variant folds into
    /// `OutputRestricted`, and every downscaled/HW/internal/unknown variant
    /// folds into `InternalError`.
    pub fn into_status(self) -> rialto_cdm_types::KeyStatus {
        use rialto_cdm_types::KeyStatus;
        match self {
            NativeKeyStatus::Usable => KeyStatus::Usable,
            NativeKeyStatus::Expired => KeyStatus::Expired,
            NativeKeyStatus::Released => KeyStatus::Released,
            NativeKeyStatus::OutputRestricted | NativeKeyStatus::OutputRestrictedHdcp22 => KeyStatus::OutputRestricted,
            NativeKeyStatus::StatusPending => KeyStatus::Pending,
            NativeKeyStatus::OutputDownscaled | NativeKeyStatus::InternalError | NativeKeyStatus::HwError => {
                KeyStatus::InternalError
            }
            NativeKeyStatus::Unknown(code) => {
                tracing::debug!(code, "Unmapped native key status, collapsing to InternalError");
                KeyStatus::InternalError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_codes() {
        assert_eq!(NativeStatus::None.into_status(), MediaKeyErrorStatus::Ok);
        assert_eq!(
            NativeStatus::InvalidSession.into_status(),
            MediaKeyErrorStatus::BadSessionId
        );
        assert_eq!(
            NativeStatus::KeysystemNotSupported.into_status(),
            MediaKeyErrorStatus::NotSupported
        );
        assert_eq!(
            NativeStatus::InterfaceNotImplemented.into_status(),
            MediaKeyErrorStatus::InterfaceNotImplemented
        );
        assert_eq!(
            NativeStatus::BufferTooSmall.into_status(),
            MediaKeyErrorStatus::BufferTooSmall
        );
    }

    #[test]
    fn unknown_codes_collapse_to_fail() {
        assert_eq!(
            NativeStatus::Unknown(-99).into_status(),
            MediaKeyErrorStatus::Fail
        );
    }

    #[test]
    fn hdcp_variant_collapses_to_output_restricted() {
        use rialto_cdm_types::KeyStatus;
        assert_eq!(NativeKeyStatus::OutputRestricted.into_status(), KeyStatus::OutputRestricted);
        assert_eq!(NativeKeyStatus::OutputRestrictedHdcp22.into_status(), KeyStatus::OutputRestricted);
    }

    #[test]
    fn downscaled_hw_internal_and_unknown_collapse_to_internal_error() {
        use rialto_cdm_types::KeyStatus;
        assert_eq!(NativeKeyStatus::OutputDownscaled.into_status(), KeyStatus::InternalError);
        assert_eq!(NativeKeyStatus::HwError.into_status(), KeyStatus::InternalError);
        assert_eq!(NativeKeyStatus::InternalError.into_status(), KeyStatus::InternalError);
        assert_eq!(NativeKeyStatus::Unknown(7).into_status(), KeyStatus::InternalError);
    }

    #[test]
    fn usable_expired_released_pending_pass_through() {
        use rialto_cdm_types::KeyStatus;
        assert_eq!(NativeKeyStatus::Usable.into_status(), KeyStatus::Usable);
        assert_eq!(NativeKeyStatus::Expired.into_status(), KeyStatus::Expired);
        assert_eq!(NativeKeyStatus::Released.into_status(), KeyStatus::Released);
        assert_eq!(NativeKeyStatus::StatusPending.into_status(), KeyStatus::Pending);
    }
}
