//! The collaborator ports of the connection core.
//!
//! The state machine never touches the network, the timer wheel or user
//! buffers directly. Everything it needs from the surrounding stack is one
//! of the five narrow traits below. They must be non-blocking and safe to
//! re-enter from within the event loop; a handler invocation may call any
//! number of them before returning.
//!
//! A single owner object (a socket, a connection slot of an endpoint table)
//! usually implements all five; the [`Host`] supertrait and its blanket impl
//! capture that without forcing separate port objects on anyone.
use crate::wire::{TcpRepr, TcpSeqNumber};

use super::{Disconnect, Error};

/// The packet I/O port.
///
/// Receives finished segment representations for emission. Segments
/// submitted by a single handler invocation must go out in submission order.
pub trait PacketIo {
    /// Queue one segment for transmission on the connection's four-tuple.
    ///
    /// The representation carries everything the emit path needs except the
    /// checksum, which is filled (or offloaded) while serializing.
    fn transmit(&mut self, segment: TcpRepr);
}

/// The retransmission queue port.
///
/// The queue itself is filled by the data sender, which is not part of this
/// core; the state machine only acknowledges, flushes and stops it.
pub trait RetransmitQueue {
    /// Drop all queue entries that are entirely acknowledged by `ack`.
    fn rt_ack_queue(&mut self, ack: TcpSeqNumber);

    /// Drop every queue entry, acknowledged or not.
    fn rt_flush(&mut self);

    /// Stop the retransmission timer.
    fn rt_stop(&mut self);
}

/// The write-buffer port.
///
/// Wraps the queue of user data waiting for segmentization. Like the
/// retransmission queue, the queue contents are managed by the data sender;
/// the state machine inspects and schedules it.
pub trait WriteQueue {
    /// Whether no user data is queued at all.
    fn write_queue_empty(&self) -> bool;

    /// Whether queued data could be transmitted right now.
    ///
    /// This is narrower than the inverse of [`write_queue_empty`]: data may
    /// be queued but unsendable when the usable window is zero.
    ///
    /// [`write_queue_empty`]: #tymethod.write_queue_empty
    fn has_pending(&self) -> bool;

    /// Whether the connection is already scheduled for the egress pass.
    fn is_queued(&self) -> bool;

    /// Schedule the connection for the egress pass.
    fn write_queue_push(&mut self);

    /// Drop all queued user data.
    fn write_queue_reset(&mut self);

    /// Attempt a direct send of `data`, bypassing the queue.
    ///
    /// Returns the number of octets taken; `0` asks the caller to queue.
    fn send(&mut self, data: &[u8]) -> usize;
}

/// The clock and timer port.
pub trait Timers {
    /// Pick a fresh initial send sequence number.
    ///
    /// Any policy suffices as long as successive incarnations of the same
    /// connection pair do not collide within 2·MSL; a clock-seeded keyed
    /// hash as in [`IsnGenerator`] is the recommended one.
    ///
    /// [`IsnGenerator`]: ../struct.IsnGenerator.html
    fn initial_seq_number(&mut self) -> TcpSeqNumber;

    /// Arm the 2·MSL one-shot.
    ///
    /// When it fires the owner calls [`Connection::time_wait_timeout`].
    /// Re-arming an armed timer restarts it.
    ///
    /// [`Connection::time_wait_timeout`]: ../struct.Connection.html#method.time_wait_timeout
    fn start_time_wait_timeout(&mut self);

    /// Whether a round-trip-time measurement is in flight.
    fn rttm_active(&self) -> bool;

    /// Stop the round-trip-time measurement.
    ///
    /// With `karn` set the sample is discarded instead of folded into the
    /// smoothed estimate (Karn's algorithm, for ambiguous acknowledgments).
    fn rttm_stop(&mut self, karn: bool);
}

/// The user-callback port.
///
/// These are the asynchronous "signals" of the original specification,
/// delivered as synchronous calls. A callback may not reach back into the
/// exclusively borrowed connection; anything it wants done it records in its
/// own state (for instance by queueing data), which the handler re-inspects
/// after the callback returns.
pub trait Events {
    /// A SYN arrived on a listening connection. Take it?
    fn signal_accept(&mut self) -> bool;

    /// The connection reached the Established state.
    fn signal_connect(&mut self);

    /// The connection is going away, with the reason why.
    fn signal_disconnect(&mut self, reason: Disconnect);

    /// An error the remote caused, such as a reset of a connection attempt.
    fn signal_error(&mut self, error: Error);

    /// Deliver received payload to the read buffer.
    ///
    /// Returns the number of octets accepted, bounded by the remaining
    /// buffer capacity. Sequence space only advances over accepted octets.
    fn receive(&mut self, data: &[u8], push: bool) -> usize;

    /// The remote finished sending while delivered data is still unread.
    fn receive_disconnect(&mut self);

    /// Whether the read buffer holds delivered-but-unread octets.
    fn undelivered(&self) -> bool;

    /// Drain delivered octets into a user buffer, returning the count.
    fn read(&mut self, buffer: &mut [u8]) -> usize;
}

/// Everything a connection needs from its owner, in one bound.
pub trait Host: PacketIo + RetransmitQueue + WriteQueue + Timers + Events {}

impl<T> Host for T
    where T: PacketIo + RetransmitQueue + WriteQueue + Timers + Events
{ }
