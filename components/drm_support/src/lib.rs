//! # drm_support (the DRM Adapter, C1)
//!
//! A thin, stateful wrapper over the native OCDM-style DRM library.
//! Translates native error codes into [`rialto_cdm_types::MediaKeyErrorStatus`]
//! and marshals native callbacks into the language-neutral [`IOcdmSessionClient`]
//! trait.
//!
//! This crate performs no synchronization of its own — callers (the Key
//! Session layer) are responsible for serializing calls onto the Main
//! Thread, per §5 of the design.
//!
//! # Native backend
//!
//! [`NativeDrm`] is the seam between this adapter and the actual native
//! library. A production build binds it to the real OCDM C ABI via FFI;
//! this crate ships [`SimulatedNativeDrm`], an in-process simulation used
//! for development and testing in the absence of a native CDM.
//!
//! # Examples
//!
//! ```
//! use rialto_cdm_ocdm::{OcdmSystem, SimulatedNativeDrm};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(SimulatedNativeDrm::new());
//! let system = OcdmSystem::new("com.widevine.alpha", backend).unwrap();
//! assert_eq!(system.get_version(), "simulated-ocdm-1.0");
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod error;
mod session;
mod simulated;
mod system;

pub use error::{NativeKeyStatus, NativeStatus};
pub use session::{IOcdmSessionClient, OcdmSession, OcdmStatusHandle};
pub use simulated::SimulatedNativeDrm;
pub use system::{NativeDrm, NativeSessionId, NativeSystemId, OcdmSystem};
