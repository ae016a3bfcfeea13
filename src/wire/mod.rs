/*! Low-level segment access and construction.

The `wire` module deals with the packet *representation*. It provides two
levels of functionality.

 * First, a wrapper around sequences of octets valid as a TCP segment, the
   [`Packet`] family, with field accessors and setters over the raw buffer.
 * Second, a compact high-level representation of the header, [`Repr`], that
   can be parsed from and emitted into a sequence of octets. `Repr` is the
   value-typed segment builder of this crate: the state machine constructs
   one from its control block, the owner emits it and submits the buffer.

[`Packet`]: tcp/struct.Packet.html
[`Repr`]: tcp/struct.Repr.html

When parsing untrusted input it is necessary to use [`Packet::new_checked`]
(or `Repr::parse`); so long as the buffer is not modified afterwards, no
accessor will panic. When emitting output the buffer must be exactly
`Repr::buffer_len()` octets long, which a zeroed buffer of that size always
satisfies.

[`Packet::new_checked`]: tcp/struct.Packet.html#method.new_checked
*/
// Copyright (C) 2016 whitequark@whitequark.org
//
// in parts from `smoltcp` originally distributed under 0-clause BSD
#![allow(missing_docs)]

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
}

mod error;
pub(crate) mod ip;
pub(crate) mod tcp;

pub use self::error::{
    Error,
    Result};

pub use self::ip::{
    Address as IpAddress,
    Ipv4Address,
    Ipv6Address,
    Protocol as IpProtocol};

pub use self::tcp::{
    Checksum as TcpChecksum,
    Flags as TcpFlags,
    Packet as TcpPacket,
    Repr as TcpRepr,
    SeqNumber as TcpSeqNumber,
    TcpOption};
