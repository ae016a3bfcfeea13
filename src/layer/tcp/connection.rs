//! The per-connection state machine.
//!
//! The handlers in this module follow the "segment arrives" processing of
//! RFC 793 (pages 65-76), one handler per connection state, with the shared
//! steps factored out the way the RFC spells them: sequence check, reset
//! check, SYN check, acknowledgment check, payload processing, FIN
//! processing. The corrections of RFC 1122 §4.2 are applied where they amend
//! the original text.
use core::fmt;

use crate::wire::{IpAddress, TcpFlags, TcpPacket, TcpRepr, TcpSeqNumber};

use super::{Disconnect, Error};
use super::ports::Host;
use super::reno::Reno;

/// The default maximum segment size of RFC 1122 §4.2.2.6.
///
/// Used as the sender MSS until the remote announces one.
const DEFAULT_MSS: u32 = 536;

/// The connection four-tuple: both endpoint addresses and ports.
///
/// On a listening connection the remote half stays unspecified until the
/// first SYN fills it in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FourTuple {
    /// Our address.
    pub local: IpAddress,
    /// The peer address.
    pub remote: IpAddress,
    /// Our port.
    pub local_port: u16,
    /// The peer port.
    pub remote_port: u16,
}

/// The sending state.
///
/// In RFC 793 this is referred to as `SND`.
#[derive(Clone, Copy, Debug, Default, Hash)]
pub struct Send {
    /// The oldest not yet acknowledged sequence number, `SND.UNA`.
    pub unacked: TcpSeqNumber,

    /// The next sequence number to use for transmission, `SND.NXT`.
    pub next: TcpSeqNumber,

    /// The send window size indicated by the receiver, `SND.WND`.
    ///
    /// Must not send a segment containing a sequence number beyond
    /// `unacked + window`.
    pub window: u32,

    /// The send urgent pointer, `SND.UP`.
    ///
    /// Kept for completeness; the urgent mechanism is deprecated and this is
    /// never set.
    pub urgent_pointer: u16,

    /// Sequence number of the last segment used to update `window`, `SND.WL1`.
    pub wl1: TcpSeqNumber,

    /// Acknowledgment number of the last segment used to update `window`,
    /// `SND.WL2`.
    ///
    /// Together with `wl1` this prevents old segments from updating the
    /// window.
    pub wl2: TcpSeqNumber,

    /// The initial send sequence number, `ISS`.
    ///
    /// Read-only after the control block is initialized; provides a way of
    /// tracking the sent data.
    pub initial_seq: TcpSeqNumber,
}

/// The receiving state.
///
/// In RFC 793 this is referred to as `RCV`.
#[derive(Clone, Copy, Debug, Default, Hash)]
pub struct Receive {
    /// The next expected sequence number, `RCV.NXT`.
    pub next: TcpSeqNumber,

    /// The receive window size indicated by us, `RCV.WND`.
    ///
    /// The total of `next + window` never moves to the left while the
    /// connection is open.
    pub window: u32,

    /// The receive urgent pointer, `RCV.UP`. Unused, see [`Send`].
    ///
    /// [`Send`]: struct.Send.html#structfield.urgent_pointer
    pub urgent_pointer: u16,

    /// The initial receive sequence number, `IRS`.
    pub initial_seq: TcpSeqNumber,
}

/// The Transmission Control Block.
///
/// All per-connection control variables of RFC 793, plus the flow control
/// variables of RFC 5681. Only the owning connection's handler invocations
/// mutate it; callbacks observe it at rest.
#[derive(Clone, Copy, Debug, Default)]
pub struct Tcb {
    /// The sending state, `SND`.
    pub send: Send,

    /// The receiving state, `RCV`.
    pub recv: Receive,

    /// The flow control state: `cwnd`, `ssthresh` and friends.
    pub flow: Reno,

    /// The SMSS, the size of the largest segment the sender can transmit.
    ///
    /// Taken from the MSS option announced by the remote, or the RFC 1122
    /// default of 536 octets when the option was absent. The size does not
    /// include the TCP/IP headers and options.
    pub send_mss: u32,
}

impl Tcb {
    /// Initialize the block for a fresh connection incarnation.
    ///
    /// Selects `iss` as the initial send sequence (the generator policy is
    /// the clock/timer port's choice), resets the flow control variables to
    /// one segment of congestion window with an unbounded slow-start
    /// threshold, and installs the configured receive window. The receiving
    /// half (`RCV.NXT`, `IRS`) is left alone, a passive open fills it before
    /// calling here.
    pub fn init(&mut self, iss: TcpSeqNumber, recv_window: u32) {
        if self.send_mss == 0 {
            self.send_mss = DEFAULT_MSS;
        }
        self.send.initial_seq = iss;
        self.send.unacked = iss;
        self.send.next = iss;
        self.send.wl1 = TcpSeqNumber::default();
        self.send.wl2 = TcpSeqNumber::default();
        self.recv.window = recv_window;
        self.flow = Reno::new(self.send_mss, iss);
    }
}

/// State enum of the statemachine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// Marker state for an unintended/uninitialized connection state.
    Closed,

    /// A listening connection.
    ///
    /// Akin to an open server socket. Can either be turned into SynSent or
    /// SynReceived depending on whether we receive a SYN or decide to open a
    /// connection.
    Listen,

    /// An open connection request.
    SynSent,

    /// Connection request we intend to answer, waiting on ack.
    SynReceived,

    /// An open connection.
    Established,

    /// Closed our side of the connection.
    FinWait1,

    /// Closing connection nicely, initiated by us and acknowledged.
    FinWait2,

    /// Other side closed its connection.
    CloseWait,

    /// Closed both sides but we don't know the other knows.
    Closing,

    /// Connection closes after the other side closed its already.
    LastAck,

    /// Both sides recognized connection as closed.
    TimeWait,
}

/// What the owner must do after a segment was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentResult {
    /// Processing is complete, the connection lives on.
    Ok,

    /// Continue operating but schedule the close-side bookkeeping.
    Close,

    /// The connection is gone; destroy it after the call returns.
    Closed,
}

/// A borrowed view over one inbound segment.
///
/// Couples the parsed header representation with the payload octets of the
/// same underlying network buffer. The view lives for the duration of one
/// handler invocation; afterwards the buffer is either consumed or dropped.
#[derive(Clone, Copy, Debug)]
pub struct Segment<'a> {
    repr: TcpRepr,
    payload: &'a [u8],
}

impl<'a> Segment<'a> {
    /// Assemble a segment view from its parts.
    ///
    /// The payload must be the octets the representation was parsed over.
    pub fn new(repr: TcpRepr, payload: &'a [u8]) -> Self {
        debug_assert_eq!(usize::from(repr.payload_len), payload.len());
        Segment { repr, payload }
    }

    /// View a checked packet as a segment.
    pub fn from_packet(packet: &TcpPacket<&'a [u8]>) -> Self {
        Segment {
            repr: packet.repr(),
            payload: packet.payload_slice(),
        }
    }

    /// The parsed header representation.
    pub fn repr(&self) -> TcpRepr {
        self.repr
    }

    /// The payload octets.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// The segment length in sequence space, `SEG.LEN`.
    ///
    /// Counts payload octets plus one for SYN and FIN each.
    pub fn sequence_len(&self) -> usize {
        self.repr.sequence_len()
    }

    /// Whether any payload octets are present.
    pub fn has_payload(&self) -> bool {
        !self.payload.is_empty()
    }
}

/// The state of one connection.
///
/// Exclusively owns the control block and the state tags. Buffers, queues,
/// timers and user callbacks stay with the owner and are commanded through
/// the [`Host`] ports handed into each call.
///
/// [`Host`]: trait.Host.html
#[derive(Clone, Copy, Debug)]
pub struct Connection {
    /// The current state of the state machine.
    current: State,

    /// The previous state of the state machine.
    ///
    /// Required to correctly handle a reset while the connection is forming:
    /// it is necessary to track *how* we ended up in a half-open state.
    previous: State,

    /// The control block.
    pub tcb: Tcb,

    /// The endpoint pair this connection is bound to.
    tuple: FourTuple,

    /// The configured receive window, installed into the control block on
    /// every (re-)initialization.
    recv_window: u32,

    /// The maximum segment size we announce on SYN and SYN|ACK.
    mss: u16,
}

impl Connection {
    /// A closed connection for the given endpoint pair.
    ///
    /// `recv_window` is the receive window installed on initialization and
    /// `mss` the maximum segment size announced to the remote.
    pub fn new(tuple: FourTuple, recv_window: u32, mss: u16) -> Self {
        Connection {
            current: State::Closed,
            previous: State::Closed,
            tcb: Tcb::default(),
            tuple,
            recv_window,
            mss,
        }
    }

    /// The current state tag.
    pub fn state(&self) -> State {
        self.current
    }

    /// The state tag before the last transition.
    pub fn previous_state(&self) -> State {
        self.previous
    }

    /// The endpoint pair.
    pub fn four_tuple(&self) -> FourTuple {
        self.tuple
    }

    /// Transition to `next`, remembering where we came from.
    ///
    /// This is the only place the state tags change.
    pub fn set_state(&mut self, next: State) {
        net_trace!("tcp {}:{}: {} -> {}",
                   self.tuple.remote, self.tuple.remote_port, self.current, next);
        self.previous = core::mem::replace(&mut self.current, next);
    }

    /// The 2·MSL one-shot fired.
    pub fn time_wait_timeout(&mut self) {
        if let State::TimeWait = self.current {
            self.set_state(State::Closed);
        }
    }

    // Outgoing segment construction. A representation is built from the
    // control block and finalized by the packet I/O port on transmit.

    fn outgoing(&self, flags: TcpFlags) -> TcpRepr {
        TcpRepr {
            src_port: self.tuple.local_port,
            dst_port: self.tuple.remote_port,
            flags,
            seq_number: self.tcb.send.next,
            ack_number: None,
            window_len: self.window_len(),
            max_seg_size: None,
            payload_len: 0,
        }
    }

    /// The reply `<SEQ=SND.NXT><ACK=RCV.NXT><CTL=ACK>`.
    fn ack_reply(&self) -> TcpRepr {
        let mut reply = self.outgoing(TcpFlags::ack_only());
        reply.ack_number = Some(self.tcb.recv.next);
        reply
    }

    /// The reply `<SEQ=seq><CTL=RST>`.
    fn rst_reply(&self, seq: TcpSeqNumber) -> TcpRepr {
        let mut reply = self.outgoing(TcpFlags::rst_only());
        reply.seq_number = seq;
        reply.window_len = 0;
        reply
    }

    fn window_len(&self) -> u16 {
        self.tcb.recv.window.min(u32::from(u16::max_value())) as u16
    }

    /////////////////////////////////////////////////////////////////////
    // Common state functions, used by more than one state handler.
    /////////////////////////////////////////////////////////////////////

    /// 1. Check sequence number.
    ///
    /// The four-case acceptability test of RFC 793 p. 69:
    ///
    /// ```text
    /// Segment Receive  Test
    /// Length  Window
    /// ------- -------  -------------------------------------------
    ///    0       0     SEG.SEQ = RCV.NXT
    ///    0      >0     RCV.NXT =< SEG.SEQ < RCV.NXT+RCV.WND
    ///   >0       0     not acceptable
    ///   >0      >0     RCV.NXT =< SEG.SEQ < RCV.NXT+RCV.WND
    ///                  or RCV.NXT =< SEG.SEQ+SEG.LEN-1 < RCV.NXT+RCV.WND
    /// ```
    ///
    /// An unacceptable segment is answered `<SEQ=SND.NXT><ACK=RCV.NXT>
    /// <CTL=ACK>` and dropped, unless it carried RST, then it is dropped
    /// silently.
    fn check_seq<H: Host>(&mut self, host: &mut H, segment: &Segment) -> bool {
        let seq = segment.repr().seq_number;
        let len = segment.sequence_len();
        let next = self.tcb.recv.next;
        let window = self.tcb.recv.window;

        let acceptable = match (len, window) {
            (0, 0) => seq == next,
            (0, _) => seq.in_window(next, window),
            (_, 0) => false,
            (_, _) => seq.in_window(next, window)
                || (seq + (len - 1)).in_window(next, window),
        };

        if !acceptable {
            if !segment.repr().flags.rst() {
                host.transmit(self.ack_reply());
            }
            net_debug!("tcp: unacceptable seq {} len {}, rcv.nxt {} rcv.wnd {}",
                       seq, len, next, window);
            return false;
        }
        true
    }

    /// 5. Check ACK.
    ///
    /// Process the acknowledgment if present, else drop the segment. An ACK
    /// for something not yet sent is answered with a bare ACK and dropped.
    /// Inside `SND.UNA =< SEG.ACK =< SND.NXT` (the RFC 1122 p. 94 reading)
    /// the acknowledgment advances `SND.UNA` or, when it stands still, is
    /// tested against the RFC 5681 duplicate predicate.
    fn check_ack<H: Host>(&mut self, host: &mut H, segment: &Segment) -> bool {
        let repr = segment.repr();
        let ack = match repr.ack_number {
            Some(ack) => ack,
            None => {
                net_debug!("tcp: segment without ack in {}", self.current);
                return false;
            },
        };

        if ack > self.tcb.send.next {
            host.transmit(self.ack_reply());
            net_debug!("tcp: ack {} beyond snd.nxt {}", ack, self.tcb.send.next);
            return false;
        }

        // Condition (e) of the duplicate predicate compares against the
        // window before this segment updates it.
        let window_unchanged = u32::from(repr.window_len) == self.tcb.send.window;

        if self.tcb.send.unacked <= ack {
            if self.tcb.send.unacked < ack {
                // A new ACK.
                self.tcb.send.unacked = ack;
                host.rt_ack_queue(ack);
                if host.rttm_active() {
                    host.rttm_stop(false);
                }
                self.tcb.flow.new_ack();
            } else if self.tcb.send.next != self.tcb.send.unacked
                && repr.payload_len == 0
                && !repr.flags.syn()
                && !repr.flags.fin()
                && window_unchanged
            {
                // RFC 5681: (a) outstanding data, (b) no data, (c) neither
                // SYN nor FIN, (d) SEG.ACK = SND.UNA, (e) window unchanged.
                let send_next = self.tcb.send.next;
                let send_mss = self.tcb.send_mss;
                self.tcb.flow.duplicate_ack(ack, send_next, send_mss);
            }

            // The send window update, guarded against old segments:
            // SND.WL1 < SEG.SEQ or (SND.WL1 = SEG.SEQ and SND.WL2 =< SEG.ACK).
            if self.tcb.send.wl1 < repr.seq_number
                || (self.tcb.send.wl1 == repr.seq_number && self.tcb.send.wl2 <= ack)
            {
                self.tcb.send.window = repr.window_len.into();
                self.tcb.send.wl1 = repr.seq_number;
                self.tcb.send.wl2 = ack;
            }
        }
        // SEG.ACK < SND.UNA: an old duplicate, ignored.

        true
    }

    /// 7. Process the segment text.
    ///
    /// Deliver payload beginning at `RCV.NXT` to the read buffer, bounded by
    /// its remaining capacity; sequence space advances over the accepted
    /// octets only. Octets before `RCV.NXT` were received already and are
    /// trimmed, a segment starting beyond it is held back for retransmission.
    ///
    /// With `ack_now` the acknowledgment
    /// `<SEQ=SND.NXT><ACK=RCV.NXT><CTL=ACK>` goes out immediately; a caller
    /// that processes a FIN of the same segment right after leaves it to the
    /// FIN processing instead so the segment is answered exactly once.
    fn process_segment<H: Host>(&mut self, host: &mut H, segment: &Segment, ack_now: bool) {
        debug_assert!(segment.has_payload());
        let repr = segment.repr();

        // The SYN occupies the sequence slot before the first payload octet.
        let data_start = repr.seq_number + usize::from(repr.flags.syn());

        if data_start > self.tcb.recv.next {
            // A hole precedes this data; answer what we have.
            if ack_now {
                host.transmit(self.ack_reply());
            }
            return;
        }

        let already_received = self.tcb.recv.next - data_start;
        if already_received < segment.payload().len() {
            let fresh = &segment.payload()[already_received..];
            let accepted = host.receive(fresh, repr.flags.psh());
            self.tcb.recv.next += accepted;
        }

        if ack_now {
            host.transmit(self.ack_reply());
        }

        // Piggyback opportunity for queued user data.
        if host.has_pending() && !host.is_queued() {
            host.write_queue_push();
        }
    }

    /// 8. Process FIN.
    ///
    /// A FIN is only consumed when it sits exactly at `RCV.NXT` (any payload
    /// of the same segment was accepted first): signal the user that the
    /// remote is closing, advance `RCV.NXT` over the FIN and acknowledge it.
    /// A FIN beyond the expected sequence is left to a retransmission, a
    /// duplicate one is answered with a bare ACK; in both cases the state
    /// must not change, which the `false` return tells the caller.
    fn process_fin<H: Host>(&mut self, host: &mut H, segment: &Segment) -> bool {
        let repr = segment.repr();
        debug_assert!(repr.flags.fin());

        let fin_seq = repr.seq_number
            + usize::from(repr.flags.syn())
            + usize::from(repr.payload_len);
        if fin_seq != self.tcb.recv.next {
            host.transmit(self.ack_reply());
            net_debug!("tcp: fin at {}, expected {}", fin_seq, self.tcb.recv.next);
            return false;
        }

        host.signal_disconnect(Disconnect::Closing);
        // The FIN consumes one sequence number.
        self.tcb.recv.next += 1;
        host.transmit(self.ack_reply());
        // FIN implies PUSH for anything not yet delivered to the user.
        if host.undelivered() {
            host.receive_disconnect();
        }
        true
    }

    /// An in-window SYN is an error; reset the connection.
    ///
    /// RFC 793 p. 71: send a reset, flush the queues, signal the user an
    /// unsolicited "connection reset". The queue flushing happens in the
    /// dispatcher once we report [`SegmentResult::Closed`].
    ///
    /// [`SegmentResult::Closed`]: enum.SegmentResult.html#variant.Closed
    fn unallowed_syn_reset<H: Host>(&mut self, host: &mut H, segment: &Segment) {
        debug_assert!(segment.repr().flags.syn());
        let seq = segment.repr().ack_number.unwrap_or_default();
        host.transmit(self.rst_reply(seq));
        host.signal_disconnect(Disconnect::Reset);
    }

    /// Send `<SEQ=SND.NXT><CTL=RST>` and flush all queued work.
    ///
    /// Used when aborting a connection; the caller enters the Closed state
    /// after the emitter returns.
    fn send_reset<H: Host>(&mut self, host: &mut H) {
        host.write_queue_reset();
        host.rt_flush();
        host.transmit(self.rst_reply(self.tcb.send.next));
    }

    /////////////////////////////////////////////////////////////////////
    // Segment arrives.
    /////////////////////////////////////////////////////////////////////

    /// Handle one inbound segment in the current state.
    ///
    /// Segments of one connection must be handed in arrival order. Whatever
    /// the handler emits through the packet I/O port is transmitted in
    /// emission order. When [`SegmentResult::Closed`] comes back the write
    /// and retransmission queues have been flushed and the owner deletes the
    /// connection (once no retransmission entries remain in flight).
    ///
    /// [`SegmentResult::Closed`]: enum.SegmentResult.html#variant.Closed
    pub fn handle<H: Host>(&mut self, host: &mut H, segment: &Segment) -> SegmentResult {
        let result = match self.current {
            State::Closed => self.on_closed(host, segment),
            State::Listen => self.on_listen(host, segment),
            State::SynSent => self.on_syn_sent(host, segment),
            State::SynReceived => self.on_syn_received(host, segment),
            State::Established => self.on_established(host, segment),
            State::FinWait1 => self.on_fin_wait1(host, segment),
            State::FinWait2 => self.on_fin_wait2(host, segment),
            State::CloseWait => self.on_close_wait(host, segment),
            State::Closing => self.on_closing(host, segment),
            State::LastAck => self.on_last_ack(host, segment),
            State::TimeWait => self.on_time_wait(host, segment),
        };

        if let SegmentResult::Closed = result {
            if self.current != State::Closed {
                host.write_queue_reset();
                host.rt_flush();
                self.set_state(State::Closed);
            }
        }
        result
    }

    /// RFC 793 p. 65, "If the state is CLOSED".
    ///
    /// All segment data is discarded. An incoming RST is discarded too; a
    /// reset must never answer a reset. Anything else is answered with a
    /// reset that makes the sequence numbers plausible to the remote.
    fn on_closed<H: Host>(&mut self, host: &mut H, segment: &Segment) -> SegmentResult {
        let repr = segment.repr();
        if repr.flags.rst() {
            return SegmentResult::Ok;
        }

        let answer = match repr.ack_number {
            Some(ack) => self.rst_reply(ack),
            None => {
                let mut flags = TcpFlags::rst_only();
                flags.set_ack(true);
                let mut answer = self.outgoing(flags);
                answer.seq_number = TcpSeqNumber(0);
                answer.ack_number = Some(repr.seq_number + segment.sequence_len());
                answer.window_len = 0;
                answer
            },
        };
        host.transmit(answer);
        SegmentResult::Ok
    }

    /// RFC 793 p. 65, "If the state is LISTEN".
    ///
    /// An RST is ignored, an ACK cannot belong to anything yet and is
    /// answered with a reset. A SYN is offered to the owner through the
    /// accept signal; refusal deletes this connection. Acceptance fills the
    /// receive half of the control block, initializes the rest and answers
    /// `<SEQ=ISS><ACK=RCV.NXT><CTL=SYN,ACK>` with our MSS stamped.
    fn on_listen<H: Host>(&mut self, host: &mut H, segment: &Segment) -> SegmentResult {
        let repr = segment.repr();
        if repr.flags.rst() {
            return SegmentResult::Ok;
        }
        if let Some(ack) = repr.ack_number {
            host.transmit(self.rst_reply(ack));
            return SegmentResult::Ok;
        }
        if repr.flags.syn() {
            if !host.signal_accept() {
                return SegmentResult::Closed;
            }

            self.tcb.recv.next = repr.seq_number + 1;
            self.tcb.recv.initial_seq = repr.seq_number;
            if let Some(mss) = repr.max_seg_size {
                self.tcb.send_mss = mss.into();
            }
            let iss = host.initial_seq_number();
            self.tcb.init(iss, self.recv_window);
            self.tcb.send.unacked = iss;
            self.tcb.send.next = iss + 1;

            let mut answer = self.outgoing(TcpFlags::syn_ack());
            answer.seq_number = iss;
            answer.ack_number = Some(self.tcb.recv.next);
            answer.max_seg_size = Some(self.mss);
            host.transmit(answer);

            self.set_state(State::SynReceived);
            return SegmentResult::Ok;
        }
        SegmentResult::Ok
    }

    /// RFC 793 p. 66, "If the state is SYN-SENT".
    ///
    /// The one state with its own processing order: the ACK is judged
    /// against `ISS < SEG.ACK =< SND.NXT` before anything else, an
    /// acceptable RST kills the connection attempt, and a SYN either
    /// completes the handshake (our SYN was acknowledged) or degrades it to
    /// a simultaneous open.
    fn on_syn_sent<H: Host>(&mut self, host: &mut H, segment: &Segment) -> SegmentResult {
        let repr = segment.repr();

        // first check the ACK bit
        if let Some(ack) = repr.ack_number {
            if ack <= self.tcb.send.initial_seq || ack > self.tcb.send.next {
                if repr.flags.rst() {
                    // (unless the RST bit is set, if so drop the segment)
                    return SegmentResult::Ok;
                }
                host.transmit(self.rst_reply(ack));
                return SegmentResult::Ok;
            }
            // If SND.UNA =< SEG.ACK =< SND.NXT then the ACK is acceptable.
            if host.rttm_active() {
                host.rttm_stop(true);
            }
        }

        // second check the RST bit
        if repr.flags.rst() {
            if repr.ack_number.is_some() {
                host.signal_error(Error::Reset);
                return SegmentResult::Closed;
            }
            return SegmentResult::Ok;
        }

        // (third, security and precedence, are not processed)

        // fourth check the SYN bit
        if repr.flags.syn() {
            self.tcb.recv.next = repr.seq_number + 1;
            self.tcb.recv.initial_seq = repr.seq_number;
            if let Some(mss) = repr.max_seg_size {
                self.tcb.send_mss = mss.into();
            }
            if let Some(ack) = repr.ack_number {
                self.tcb.send.unacked = ack;
                host.rt_ack_queue(ack);
            }

            if self.tcb.send.unacked > self.tcb.send.initial_seq {
                // Our SYN has been ACKed.
                self.set_state(State::Established);
                // Correction of RFC 1122 p. 94: this segment initializes the
                // send window.
                self.tcb.send.window = repr.window_len.into();
                self.tcb.send.wl1 = repr.seq_number;
                self.tcb.send.wl2 = self.tcb.send.unacked;

                host.signal_connect();

                // The callback may have queued user data; then the egress
                // pass carries the acknowledgment and a bare ACK would be
                // redundant. Payload or FIN on this segment produce their
                // own acknowledgment below.
                let answered_below = segment.has_payload() || repr.flags.fin();
                if host.write_queue_empty() {
                    if !answered_below {
                        host.transmit(self.ack_reply());
                    }
                } else if !host.is_queued() {
                    host.write_queue_push();
                }

                if segment.has_payload() {
                    self.process_segment(host, segment, !repr.flags.fin());
                }
                if repr.flags.fin() && self.process_fin(host, segment) {
                    self.set_state(State::CloseWait);
                }
                return SegmentResult::Ok;
            }

            // Simultaneous open: enter SYN-RECEIVED and acknowledge the
            // remote SYN with `<SEQ=ISS><ACK=RCV.NXT><CTL=SYN,ACK>`. Payload
            // is not consumed here, the remote retransmits it once the
            // handshake completes.
            let mut answer = self.outgoing(TcpFlags::syn_ack());
            answer.seq_number = self.tcb.send.initial_seq;
            answer.ack_number = Some(self.tcb.recv.next);
            answer.max_seg_size = Some(self.mss);
            host.transmit(answer);
            self.set_state(State::SynReceived);
            return SegmentResult::Ok;
        }

        // fifth, if neither of the SYN or RST bits is set then drop the
        // segment and return.
        SegmentResult::Ok
    }

    /// RFC 793 p. 69ff, "Otherwise", for SYN-RECEIVED.
    ///
    /// A reset answers the question how this connection came to be: from
    /// LISTEN it dies silently (the listener itself lives on elsewhere),
    /// from SYN-SENT the connection attempt was refused. An acceptable ACK
    /// completes the handshake and continues processing in ESTABLISHED
    /// fashion.
    fn on_syn_received<H: Host>(&mut self, host: &mut H, segment: &Segment) -> SegmentResult {
        if !self.check_seq(host, segment) {
            return SegmentResult::Ok;
        }
        let repr = segment.repr();

        if repr.flags.rst() {
            if self.previous == State::SynSent {
                host.signal_disconnect(Disconnect::Refused);
            }
            return SegmentResult::Closed;
        }

        if repr.flags.syn() {
            self.unallowed_syn_reset(host, segment);
            return SegmentResult::Closed;
        }

        let ack = match repr.ack_number {
            Some(ack) => ack,
            None => {
                net_debug!("tcp: segment without ack in {}", self.current);
                return SegmentResult::Ok;
            },
        };

        // If SND.UNA =< SEG.ACK =< SND.NXT then enter ESTABLISHED state and
        // continue processing.
        if self.tcb.send.unacked <= ack && ack <= self.tcb.send.next {
            if host.rttm_active() {
                host.rttm_stop(false);
            }
            self.set_state(State::Established);
            self.tcb.send.unacked = ack;
            host.rt_ack_queue(ack);
            // The acknowledgment of our SYN|ACK initializes the send window.
            self.tcb.send.window = repr.window_len.into();
            self.tcb.send.wl1 = repr.seq_number;
            self.tcb.send.wl2 = ack;

            if segment.has_payload() {
                self.process_segment(host, segment, !repr.flags.fin());
            }

            host.signal_connect();

            if repr.flags.fin() && self.process_fin(host, segment) {
                self.set_state(State::CloseWait);
                return SegmentResult::Close;
            }
            return SegmentResult::Ok;
        }

        // If the segment acknowledgment is not acceptable, form a reset
        // segment `<SEQ=SEG.ACK><CTL=RST>` and send it.
        host.transmit(self.rst_reply(ack));
        SegmentResult::Ok
    }

    /// The full ladder for ESTABLISHED.
    fn on_established<H: Host>(&mut self, host: &mut H, segment: &Segment) -> SegmentResult {
        if !self.check_seq(host, segment) {
            return SegmentResult::Ok;
        }
        let repr = segment.repr();

        if repr.flags.rst() {
            host.signal_disconnect(Disconnect::Reset);
            return SegmentResult::Closed;
        }

        if repr.flags.syn() {
            self.unallowed_syn_reset(host, segment);
            return SegmentResult::Closed;
        }

        if !self.check_ack(host, segment) {
            return SegmentResult::Ok;
        }

        if segment.has_payload() {
            self.process_segment(host, segment, !repr.flags.fin());
        }

        if repr.flags.fin() && self.process_fin(host, segment) {
            self.set_state(State::CloseWait);
            return SegmentResult::Close;
        }

        SegmentResult::Ok
    }

    /// FIN-WAIT-1: like ESTABLISHED, watching for the ACK of our FIN.
    ///
    /// Once our FIN is acknowledged and the segment itself carries no FIN,
    /// processing continues in FIN-WAIT-2 with the same segment. If it does
    /// carry one, both sides close at once: TIME-WAIT when our FIN was
    /// acknowledged (turn off the other timers, start the 2·MSL wait),
    /// CLOSING otherwise.
    fn on_fin_wait1<H: Host>(&mut self, host: &mut H, segment: &Segment) -> SegmentResult {
        if !self.check_seq(host, segment) {
            return SegmentResult::Ok;
        }
        let repr = segment.repr();

        if repr.flags.rst() {
            host.signal_disconnect(Disconnect::Reset);
            return SegmentResult::Closed;
        }

        if repr.flags.syn() {
            self.unallowed_syn_reset(host, segment);
            return SegmentResult::Closed;
        }

        if !self.check_ack(host, segment) {
            return SegmentResult::Ok;
        }

        let fin_acked = repr.ack_number == Some(self.tcb.send.next);

        if fin_acked && !repr.flags.fin() {
            self.set_state(State::FinWait2);
            return self.handle(host, segment);
        }

        if segment.has_payload() {
            self.process_segment(host, segment, !repr.flags.fin());
        }

        if repr.flags.fin() && self.process_fin(host, segment) {
            if fin_acked {
                self.set_state(State::TimeWait);
                host.rt_stop();
                host.start_time_wait_timeout();
            } else {
                self.set_state(State::Closing);
            }
        }
        SegmentResult::Ok
    }

    /// FIN-WAIT-2: our FIN is acknowledged, drain the remote.
    fn on_fin_wait2<H: Host>(&mut self, host: &mut H, segment: &Segment) -> SegmentResult {
        if !self.check_seq(host, segment) {
            return SegmentResult::Ok;
        }
        let repr = segment.repr();

        if repr.flags.rst() {
            host.signal_disconnect(Disconnect::Reset);
            return SegmentResult::Closed;
        }

        if repr.flags.syn() {
            self.unallowed_syn_reset(host, segment);
            return SegmentResult::Closed;
        }

        if !self.check_ack(host, segment) {
            return SegmentResult::Ok;
        }

        if segment.has_payload() {
            self.process_segment(host, segment, !repr.flags.fin());
        }

        if repr.flags.fin() && self.process_fin(host, segment) {
            self.set_state(State::TimeWait);
            host.rt_stop();
            host.start_time_wait_timeout();
        }
        SegmentResult::Ok
    }

    /// CLOSE-WAIT: the remote finished sending.
    ///
    /// Segment text cannot arrive anymore and is ignored; a FIN that shows
    /// up regardless is acknowledged again without changing state.
    fn on_close_wait<H: Host>(&mut self, host: &mut H, segment: &Segment) -> SegmentResult {
        if !self.check_seq(host, segment) {
            return SegmentResult::Ok;
        }
        let repr = segment.repr();

        if repr.flags.rst() {
            host.signal_disconnect(Disconnect::Reset);
            return SegmentResult::Closed;
        }

        if repr.flags.syn() {
            self.unallowed_syn_reset(host, segment);
            return SegmentResult::Closed;
        }

        if !self.check_ack(host, segment) {
            return SegmentResult::Ok;
        }

        if repr.flags.fin() {
            let _ = self.process_fin(host, segment);
        }
        SegmentResult::Ok
    }

    /// CLOSING: waiting for the acknowledgment of our FIN.
    fn on_closing<H: Host>(&mut self, host: &mut H, segment: &Segment) -> SegmentResult {
        if !self.check_seq(host, segment) {
            return SegmentResult::Ok;
        }
        let repr = segment.repr();

        if repr.flags.rst() {
            return SegmentResult::Closed;
        }

        if repr.flags.syn() {
            self.unallowed_syn_reset(host, segment);
            return SegmentResult::Closed;
        }

        if !self.check_ack(host, segment) {
            return SegmentResult::Ok;
        }

        if repr.ack_number == Some(self.tcb.send.next) {
            self.set_state(State::TimeWait);
            host.start_time_wait_timeout();
        }

        if repr.flags.fin() {
            let _ = self.process_fin(host, segment);
        }
        SegmentResult::Ok
    }

    /// LAST-ACK: only the acknowledgment of our FIN can arrive.
    fn on_last_ack<H: Host>(&mut self, host: &mut H, segment: &Segment) -> SegmentResult {
        if !self.check_seq(host, segment) {
            return SegmentResult::Ok;
        }
        let repr = segment.repr();

        if repr.flags.rst() {
            return SegmentResult::Closed;
        }

        if repr.flags.syn() {
            self.unallowed_syn_reset(host, segment);
            return SegmentResult::Closed;
        }

        if repr.ack_number == Some(self.tcb.send.next) {
            return SegmentResult::Closed;
        }
        SegmentResult::Ok
    }

    /// TIME-WAIT: absorb straggling segments for 2·MSL.
    ///
    /// Acknowledgment processing is skipped entirely. A FIN re-acknowledges
    /// and restarts the wait.
    fn on_time_wait<H: Host>(&mut self, host: &mut H, segment: &Segment) -> SegmentResult {
        if !self.check_seq(host, segment) {
            return SegmentResult::Ok;
        }
        let repr = segment.repr();

        if repr.flags.rst() {
            return SegmentResult::Closed;
        }

        if repr.flags.syn() {
            self.unallowed_syn_reset(host, segment);
            return SegmentResult::Closed;
        }

        if repr.flags.fin() {
            let _ = self.process_fin(host, segment);
            host.start_time_wait_timeout();
        }
        SegmentResult::Ok
    }

    /////////////////////////////////////////////////////////////////////
    // User commands: OPEN, SEND, RECEIVE, CLOSE, ABORT.
    /////////////////////////////////////////////////////////////////////

    /// The OPEN command.
    ///
    /// A passive open turns a closed connection into a listener (and is
    /// idempotent on one). An active open requires the remote endpoint to be
    /// set, initializes the control block and sends
    /// `<SEQ=ISS><CTL=SYN>` with our MSS stamped.
    pub fn open<H: Host>(&mut self, host: &mut H, active: bool) -> Result<(), Error> {
        match (self.current, active) {
            (State::Closed, false) => {
                self.set_state(State::Listen);
                Ok(())
            },
            (State::Listen, false) => Ok(()),
            (State::Closed, true) | (State::Listen, true) => {
                if !self.tuple.remote.is_specified() || self.tuple.remote_port == 0 {
                    return Err(Error::NoRemoteHost);
                }
                let iss = host.initial_seq_number();
                self.tcb.init(iss, self.recv_window);

                let mut syn = self.outgoing(TcpFlags::syn_only());
                syn.seq_number = iss;
                syn.max_seg_size = Some(self.mss);

                self.tcb.send.unacked = iss;
                self.tcb.send.next = iss + 1;
                host.transmit(syn);
                self.set_state(State::SynSent);
                Ok(())
            },
            _ => Err(Error::AlreadyExists),
        }
    }

    /// The SEND command.
    ///
    /// Data is accepted for direct transmission only in ESTABLISHED and
    /// CLOSE-WAIT with an empty write queue; a return of `Ok(0)` asks the
    /// caller to queue (also the answer while the handshake is in flight).
    pub fn send<H: Host>(&mut self, host: &mut H, data: &[u8]) -> Result<usize, Error> {
        match self.current {
            State::Closed => Err(Error::DoesNotExist),
            State::Listen => Err(Error::ListenerSend),
            // Queue the data for transmission after entering ESTABLISHED.
            State::SynSent | State::SynReceived => Ok(0),
            State::Established | State::CloseWait => {
                if host.write_queue_empty() {
                    Ok(host.send(data))
                } else {
                    Ok(0)
                }
            },
            _ => Err(Error::Closing),
        }
    }

    /// The RECEIVE command.
    ///
    /// Forwards to the owner read buffer while receiving is still possible.
    pub fn recv<H: Host>(&mut self, host: &mut H, buffer: &mut [u8]) -> Result<usize, Error> {
        match self.current {
            State::Established
            | State::FinWait1
            | State::FinWait2
            | State::CloseWait => Ok(host.read(buffer)),
            _ => Err(Error::Closing),
        }
    }

    /// The CLOSE command.
    ///
    /// Emits at most one FIN per connection: SYN-RECEIVED and ESTABLISHED
    /// enter FIN-WAIT-1, CLOSE-WAIT enters LAST-ACK (the RFC 1122 p. 93
    /// correction of the original CLOSING transition). In FIN-WAIT-1 and
    /// FIN-WAIT-2 a second CLOSE is accepted silently, as long as a second
    /// FIN is not emitted.
    pub fn close<H: Host>(&mut self, host: &mut H) -> Result<(), Error> {
        match self.current {
            State::Listen | State::SynSent => {
                self.set_state(State::Closed);
                Ok(())
            },
            State::SynReceived | State::Established => {
                self.emit_fin(host);
                self.set_state(State::FinWait1);
                Ok(())
            },
            State::CloseWait => {
                self.emit_fin(host);
                self.set_state(State::LastAck);
                Ok(())
            },
            State::FinWait1 | State::FinWait2 => Ok(()),
            _ => Err(Error::Closing),
        }
    }

    /// The ABORT command.
    ///
    /// Tears the connection down with a reset wherever a peer could still
    /// hold state for it; a no-op everywhere else.
    pub fn abort<H: Host>(&mut self, host: &mut H) {
        match self.current {
            State::SynReceived
            | State::Established
            | State::FinWait1
            | State::FinWait2
            | State::CloseWait => {
                self.send_reset(host);
                self.set_state(State::Closed);
            },
            _ => (),
        }
    }

    /// `<SEQ=SND.NXT><ACK=RCV.NXT><CTL=FIN,ACK>`, consuming one sequence
    /// number.
    fn emit_fin<H: Host>(&mut self, host: &mut H) {
        let mut fin = self.outgoing(TcpFlags::fin_ack());
        fin.ack_number = Some(self.tcb.recv.next);
        host.transmit(fin);
        self.tcb.send.next += 1;
    }
}

impl Default for State {
    fn default() -> Self {
        State::Closed
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            State::Closed => "CLOSED",
            State::Listen => "LISTEN",
            State::SynSent => "SYN-SENT",
            State::SynReceived => "SYN-RECEIVED",
            State::Established => "ESTABLISHED",
            State::FinWait1 => "FIN-WAIT-1",
            State::FinWait2 => "FIN-WAIT-2",
            State::CloseWait => "CLOSE-WAIT",
            State::Closing => "CLOSING",
            State::LastAck => "LAST-ACK",
            State::TimeWait => "TIME-WAIT",
        };
        f.write_str(name)
    }
}
