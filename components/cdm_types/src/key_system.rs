//! Key system identification and family classification.

use std::fmt;

/// Statically known key systems the capability probes enumerate, in the
/// fixed order `getSupportedKeySystems` must preserve.
pub const KNOWN_KEY_SYSTEMS: [&str; 3] = [
    "com.widevine.alpha",
    "com.microsoft.playready",
    "com.netflix.playready",
];

/// An opaque key system identifier (e.g. `"com.widevine.alpha"`).
///
/// Family membership is derived once at construction time by a
/// name-substring match and stays stable for the lifetime of the value, as
/// required by a `MediaKeys` instance whose branching behaviour depends on
/// it.
///
/// # Examples
///
/// ```
/// use rialto_cdm_types::{KeySystem, KeySystemFamily};
///
/// let ks = KeySystem::new("com.netflix.playready");
/// assert_eq!(ks.family(), KeySystemFamily::NetflixPlayready);
/// assert!(ks.family().is_playready());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeySystem {
    name: String,
    family: KeySystemFamily,
}

/// The three key system families the CDM core branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySystemFamily {
    /// `com.widevine.*`
    Widevine,
    /// `com.microsoft.playready*`
    MicrosoftPlayready,
    /// `com.netflix.playready*`
    NetflixPlayready,
    /// Anything else.
    Other,
}

impl KeySystemFamily {
    fn classify(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("netflix") && lower.contains("playready") {
            KeySystemFamily::NetflixPlayready
        } else if lower.contains("widevine") {
            KeySystemFamily::Widevine
        } else if lower.contains("playready") {
            KeySystemFamily::MicrosoftPlayready
        } else {
            KeySystemFamily::Other
        }
    }

    /// True for either PlayReady family (Microsoft or Netflix).
    pub fn is_playready(&self) -> bool {
        matches!(
            self,
            KeySystemFamily::MicrosoftPlayready | KeySystemFamily::NetflixPlayready
        )
    }

    /// True only for the Netflix-flavoured PlayReady family, which takes the
    /// `storeLicenseData`/manual-challenge-fetch branch throughout §4.2/§4.3.
    pub fn is_netflix_playready(&self) -> bool {
        matches!(self, KeySystemFamily::NetflixPlayready)
    }
}

impl KeySystem {
    /// Classifies a key system identifier by name-substring match.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let family = KeySystemFamily::classify(&name);
        Self { name, family }
    }

    /// The key system identifier as supplied by the client.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The statically determined family.
    pub fn family(&self) -> KeySystemFamily {
        self.family
    }

    /// Convenience for `family().is_netflix_playready()`.
    pub fn is_netflix_playready(&self) -> bool {
        self.family.is_netflix_playready()
    }

    /// Convenience for `family().is_playready()`.
    pub fn is_playready(&self) -> bool {
        self.family.is_playready()
    }
}

impl fmt::Display for KeySystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widevine_is_classified() {
        assert_eq!(
            KeySystem::new("com.widevine.alpha").family(),
            KeySystemFamily::Widevine
        );
    }

    #[test]
    fn microsoft_playready_is_classified() {
        let ks = KeySystem::new("com.microsoft.playready");
        assert_eq!(ks.family(), KeySystemFamily::MicrosoftPlayready);
        assert!(!ks.is_netflix_playready());
    }

    #[test]
    fn netflix_playready_is_classified() {
        let ks = KeySystem::new("com.netflix.playready");
        assert_eq!(ks.family(), KeySystemFamily::NetflixPlayready);
        assert!(ks.is_netflix_playready());
        assert!(ks.is_playready());
    }

    #[test]
    fn unknown_key_system_is_other() {
        assert_eq!(
            KeySystem::new("org.w3.clearkey").family(),
            KeySystemFamily::Other
        );
    }
}
