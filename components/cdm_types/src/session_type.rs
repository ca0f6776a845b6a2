//! EME session and initialization data enumerations.

/// The type of key session, immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeySessionType {
    /// Keys are not persisted.
    #[default]
    Temporary,
    /// Keys can be stored for offline use.
    PersistentLicence,
    /// Session is used only to carry a release message.
    PersistentReleaseMessage,
}

/// The format of the initialization data handed to `generateRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitDataType {
    /// Common Encryption (ISOBMFF `pssh` box).
    Cenc,
    /// A raw list of key ids.
    KeyIds,
    /// WebM-style initialization data.
    Webm,
    /// A PlayReady DRM header.
    DrmHeader,
}

/// Tri-state flag controlling whether a session requests a Limited
/// Duration License, surfaced to the DRM challenge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LimitedDurationLicense {
    /// The caller did not specify a preference.
    #[default]
    NotSpecified,
    /// LDL is explicitly disabled.
    Disabled,
    /// LDL is explicitly enabled.
    Enabled,
}

impl LimitedDurationLicense {
    /// Resolves the flag to the boolean the DRM challenge call expects.
    /// `NotSpecified` is treated as not-LDL.
    pub fn as_bool(&self) -> bool {
        matches!(self, LimitedDurationLicense::Enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ldl_not_specified_resolves_to_false() {
        assert!(!LimitedDurationLicense::NotSpecified.as_bool());
    }

    #[test]
    fn ldl_enabled_resolves_to_true() {
        assert!(LimitedDurationLicense::Enabled.as_bool());
    }

    #[test]
    fn ldl_disabled_resolves_to_false() {
        assert!(!LimitedDurationLicense::Disabled.as_bool());
    }
}
