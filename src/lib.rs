//! A per-connection TCP engine for user-space networking and unikernels.
//!
//! This crate implements the hard kernel of a TCP stack: the validation of
//! every arriving segment, the eleven-state automaton of RFC 793 (with the
//! RFC 1122 corrections), the Transmission Control Block, the production of
//! control segments, and the duplicate-ACK recognition of RFC 5681. It does
//! *not* ship a network interface, an event loop or buffer allocators;
//! those belong to the surrounding stack and are reached through the narrow
//! port traits of the [`layer::tcp`] module.
//!
//! ## Table of contents
//!
//! 1. [The wire module](wire/index.html) — segment access and construction.
//! 2. [The tcp layer](layer/tcp/index.html) — the state machine itself.
//! 3. [Time structures](time/index.html).
//!
//! ## Design
//!
//! Nothing in this crate ever dynamically allocates memory and there is no
//! arbitrary recursion. Resources a connection competes for (packet buffers,
//! queue slots, timers) are owned by the caller and handed in explicitly.
//! A connection is driven to completion for every input: each arriving
//! segment, user command and timer callback runs as one synchronous handler
//! invocation on the exclusively borrowed connection. If the host runs one
//! event loop per core, pin each connection to one loop; the core shares no
//! mutable state between connections.
//!
//! Large parts of the wire representation would not have been possible
//! without lessons learned from studying @whitequark's [`smoltcp`].
//!
//! [`smoltcp`]: https://github.com/m-labs/smoltcp
#![warn(missing_docs)]
#![warn(unreachable_pub)]

// tests should be able to use `std`
#![cfg_attr(all(
    not(feature = "std"),
    not(test)),
no_std)]

#[macro_use] mod macros;
pub mod layer;
pub mod time;
pub mod wire;
