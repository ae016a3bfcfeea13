//! The process logic of protocol layers.
//!
//! Each protocol layer is split into two parts; the packet logic contained in
//! `wire` and the processing part in this module. The only processing layer
//! this crate ships is [`tcp`]: the per-connection state machine. The layers
//! below it (framing, routing, device access) and the event loop above it
//! belong to the surrounding stack and appear here solely as the collaborator
//! ports the state machine consumes.
//!
//! [`tcp`]: tcp/index.html

pub mod tcp;
