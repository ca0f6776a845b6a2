//! The stable error vocabulary surfaced across every CDM operation.

use thiserror::Error;

/// The internal error taxonomy (§7). Every public CDM operation returns one
/// of these; there are no exceptions on the operational path. Construction
/// is the only place the core signals failure any other way (it returns a
/// `Result` whose `Err` wraps an irrecoverable native-resource failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MediaKeyErrorStatus {
    /// Success.
    #[error("ok")]
    Ok,
    /// The session id was not found in the owning map at the point of lookup.
    #[error("bad session id")]
    BadSessionId,
    /// The key system is not supported by the native layer.
    #[error("key system not supported")]
    NotSupported,
    /// The native layer refused the call based on session/system state.
    #[error("invalid state")]
    InvalidState,
    /// The caller-supplied buffer was too small; used only by the metric and
    /// store-hash retry loops.
    #[error("buffer too small")]
    BufferTooSmall,
    /// The requested interface is not implemented by the native layer.
    #[error("interface not implemented")]
    InterfaceNotImplemented,
    /// Catch-all: unknown native error, unexpected disconnect, or an error
    /// trap firing during the call.
    #[error("operation failed")]
    Fail,
}

impl MediaKeyErrorStatus {
    /// True for `Ok`.
    pub fn is_ok(&self) -> bool {
        matches!(self, MediaKeyErrorStatus::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ok_reports_is_ok() {
        assert!(MediaKeyErrorStatus::Ok.is_ok());
        assert!(!MediaKeyErrorStatus::Fail.is_ok());
        assert!(!MediaKeyErrorStatus::BadSessionId.is_ok());
    }
}
