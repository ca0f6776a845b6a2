//! # cdm_service (CDM Service, C4)
//!
//! `CdmService` is the process-wide façade described in §4.4: it aggregates
//! every `MediaKeys` instance live across every connected IPC client, owns
//! the active/inactive lifecycle, and is the entry point the media pipeline
//! calls into for in-band decrypt.
//!
//! It implements two roles, split into two traits exactly as the original
//! splits `ICdmService` (client-facing control API) from `IDecryptionService`
//! (media-pipeline-facing decrypt API):
//!
//! - [`ICdmService`]: everything an IPC client drives — create/destroy
//!   `MediaKeys`, create/close/update sessions, capability probes.
//! - [`IDecryptionService`]: everything the external media pipeline drives —
//!   `decrypt`, the session-id usage counter, key selection.
//!
//! `CdmService` itself holds no notion of an IPC client's identity; that
//! belongs to the IPC layer (`rialto-cdm-ipc`), which tracks
//! `client → set<MediaKeysHandle>` and calls [`CdmService::destroy_media_keys`]
//! once per owned handle on disconnect (§4.4, §4.5).

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod capabilities;
mod decryption;
mod service;

pub use capabilities::ICdmServiceCapabilities;
pub use decryption::IDecryptionService;
pub use service::{CdmService, ICdmService};
