//! The TCP connection layer.
//!
//! This layer drives one connection: it validates every arriving segment
//! against the Transmission Control Block, walks the RFC 793 automaton over
//! the eleven connection states, produces the outgoing control segments
//! (pure ACKs, SYN/ACK, FIN, RST), and surfaces the user-visible signals.
//!
//! Relevant material for reading:
//! Main TCP rfc (skip if confident): <https://tools.ietf.org/html/rfc793>
//! Errata and comments: <https://tools.ietf.org/html/rfc1122#section-4.2>,
//!     notably still assuming some good-faith on hosts
//! TCP congestion control: <https://tools.ietf.org/html/rfc5681>
//! ISN generation: <https://tools.ietf.org/html/rfc6528>
//!
//! ## Structure
//!
//! A [`Connection`] exclusively owns its control block and state tags. It
//! reaches everything else through the port traits of this module: the
//! packet I/O port submits finished segment representations, the
//! retransmission-queue and write-queue ports command the buffers owned by
//! the surrounding stack, the timer port arms the 2·MSL and RTT timers, and
//! the event port calls back into user code. One owner object usually
//! implements all five, which the blanket [`Host`] trait captures.
//!
//! Incoming segments enter through [`Connection::handle`]; user commands
//! through [`Connection::open`], [`Connection::send`], [`Connection::recv`],
//! [`Connection::close`] and [`Connection::abort`]. All of them run to
//! completion synchronously, there are no suspension points.
//!
//! ## Deviations
//!
//! An incoming packet in the Closed state is simply dropped if it had RST
//! set. Packets with RST should *never* be answered with a packet with RST,
//! but the only specified answers would set that flag. RFC 793 is clear
//! about this [in section Reset Generation](https://tools.ietf.org/html/rfc793#page-36):
//!
//! > 1.  If the connection does not exist (CLOSED) then a reset is sent in
//! response to any incoming segment except another reset.
//!
//! A listening connection is a factory: the accept signal lets the owner
//! decide per SYN whether to take the connection, so backlog policy stays a
//! question for user code instead of this layer.
use core::fmt;

mod connection;
mod isn;
mod ports;
mod reno;

#[cfg(test)]
mod tests;

pub use connection::{
    Connection,
    FourTuple,
    Receive,
    Segment,
    SegmentResult,
    Send,
    State,
    Tcb};

pub use ports::{
    Events,
    Host,
    PacketIo,
    RetransmitQueue,
    Timers,
    WriteQueue};

pub use reno::Reno;

// publically exposed for initialization.
pub use isn::IsnGenerator;

/// Errors surfaced through the user command interface and the error signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// The connection exists, an OPEN cannot create it again.
    AlreadyExists,

    /// An active OPEN needs a remote endpoint.
    NoRemoteHost,

    /// The connection does not exist (commands in the Closed state).
    DoesNotExist,

    /// The connection is closing and takes no further commands.
    Closing,

    /// Data cannot be sent on a listening connection.
    ListenerSend,

    /// Not enough resources to queue the request.
    Exhausted,

    /// The connection was reset by the remote.
    Reset,
}

/// The reason for a disconnect signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Disconnect {
    /// The remote closed its half of the connection in an orderly fashion.
    Closing,

    /// The connection was torn down by a reset.
    Reset,

    /// The connection attempt was refused by the remote.
    Refused,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::AlreadyExists => write!(f, "connection already exists"),
            Error::NoRemoteHost => write!(f, "no remote host set"),
            Error::DoesNotExist => write!(f, "connection does not exist"),
            Error::Closing => write!(f, "connection closing"),
            Error::ListenerSend => write!(f, "cannot send on listening connection"),
            Error::Exhausted => write!(f, "insufficient resources"),
            Error::Reset => write!(f, "connection reset"),
        }
    }
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Disconnect::Closing => write!(f, "closing"),
            Disconnect::Reset => write!(f, "reset"),
            Disconnect::Refused => write!(f, "refused"),
        }
    }
}
