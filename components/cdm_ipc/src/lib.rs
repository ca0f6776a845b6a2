//! # cdm_ipc
//!
//! The IPC Module (§4.5, C5): protobuf RPC dispatch for the two service
//! facades exposed to connected application clients, plus the per-session
//! event emitter that publishes `IMediaKeysClient` callbacks back onto the
//! wire. The transport itself — socket lifecycle, framing, service export —
//! is out of scope (§1) and is represented here only by the [`IpcEventSink`]
//! seam and the `IpcClientId` the transport assigns on connect.

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod capabilities_module_service;
mod event_client;
mod module_service;

pub use capabilities_module_service::MediaKeysCapabilitiesModuleService;
pub use event_client::{IpcEventSink, MediaKeysClient};
pub use module_service::MediaKeysModuleService;
