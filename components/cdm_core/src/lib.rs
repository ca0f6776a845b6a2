//! # cdm_core (Key Session + Media Keys, C2 + C3)
//!
//! `KeySession` is the per-session state machine described in §4.2:
//! construction, challenge delivery, key-status aggregation, and the
//! Netflix-PlayReady-aware close sequence. `MediaKeys` is its owning
//! container (§4.3): one per key system, holding the DRM `System` handle
//! and enforcing the `bufCounter`/deferred-close protocol that lets the
//! media pipeline pin a session open across an in-flight decrypt.
//!
//! `MediaKeys` owns the hop onto the server's Main Thread
//! (`rialto_cdm_types::MainThread`) itself: every public method enqueues
//! its work and blocks for the result, so callers never need to reason
//! about which thread they're on. `KeySession`'s methods assume they are
//! already running on the Main Thread, since `MediaKeys` is always the one
//! that gets them there.

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod client;
mod error_trap;
mod key_session;
mod media_keys;

pub use client::IMediaKeysClient;
pub use key_session::KeySession;
pub use media_keys::{MediaKeys, MediaKeysConstructError};
