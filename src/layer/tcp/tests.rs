use crate::wire::{Ipv4Address, TcpFlags, TcpRepr, TcpSeqNumber};

use super::{Connection, Disconnect, Error, FourTuple, Segment, SegmentResult, State};
use super::ports::{Events, PacketIo, RetransmitQueue, Timers, WriteQueue};

const LOCAL_PORT: u16 = 80;
const REMOTE_PORT: u16 = 49500;

const RECV_WINDOW: u32 = 8192;
const LOCAL_MSS: u16 = 1460;

/// Our deterministic initial send sequence.
const ISS: u32 = 1000;
/// The peer's initial sequence.
const PEER_ISS: u32 = 5000;
const PEER_WINDOW: u16 = 64240;

/// A host recording everything the connection commands.
#[derive(Default)]
struct Mock {
    sent: Vec<TcpRepr>,

    accept: bool,
    accepts: usize,
    connects: usize,
    disconnects: Vec<Disconnect>,
    errors: Vec<Error>,
    received: Vec<u8>,
    receive_capacity: usize,
    undelivered: bool,
    receive_disconnects: usize,

    write_queue_len: usize,
    pending: bool,
    queued: bool,
    pushes: usize,
    write_resets: usize,

    rt_acked: Vec<TcpSeqNumber>,
    rt_flushes: usize,
    rt_stops: usize,

    rttm_running: bool,
    rttm_stops: Vec<bool>,

    isn: TcpSeqNumber,
    time_wait_arms: usize,
}

impl Mock {
    fn new() -> Self {
        Mock {
            accept: true,
            receive_capacity: usize::max_value(),
            isn: TcpSeqNumber(ISS),
            ..Mock::default()
        }
    }

    fn take_sent(&mut self) -> Vec<TcpRepr> {
        core::mem::replace(&mut self.sent, Vec::new())
    }
}

impl PacketIo for Mock {
    fn transmit(&mut self, segment: TcpRepr) {
        self.sent.push(segment);
    }
}

impl RetransmitQueue for Mock {
    fn rt_ack_queue(&mut self, ack: TcpSeqNumber) {
        self.rt_acked.push(ack);
    }

    fn rt_flush(&mut self) {
        self.rt_flushes += 1;
    }

    fn rt_stop(&mut self) {
        self.rt_stops += 1;
    }
}

impl WriteQueue for Mock {
    fn write_queue_empty(&self) -> bool {
        self.write_queue_len == 0
    }

    fn has_pending(&self) -> bool {
        self.pending
    }

    fn is_queued(&self) -> bool {
        self.queued
    }

    fn write_queue_push(&mut self) {
        self.pushes += 1;
        self.queued = true;
    }

    fn write_queue_reset(&mut self) {
        self.write_queue_len = 0;
        self.pending = false;
        self.write_resets += 1;
    }

    fn send(&mut self, data: &[u8]) -> usize {
        data.len()
    }
}

impl Timers for Mock {
    fn initial_seq_number(&mut self) -> TcpSeqNumber {
        self.isn
    }

    fn start_time_wait_timeout(&mut self) {
        self.time_wait_arms += 1;
    }

    fn rttm_active(&self) -> bool {
        self.rttm_running
    }

    fn rttm_stop(&mut self, karn: bool) {
        self.rttm_running = false;
        self.rttm_stops.push(karn);
    }
}

impl Events for Mock {
    fn signal_accept(&mut self) -> bool {
        self.accepts += 1;
        self.accept
    }

    fn signal_connect(&mut self) {
        self.connects += 1;
    }

    fn signal_disconnect(&mut self, reason: Disconnect) {
        self.disconnects.push(reason);
    }

    fn signal_error(&mut self, error: Error) {
        self.errors.push(error);
    }

    fn receive(&mut self, data: &[u8], _push: bool) -> usize {
        let accepted = data.len().min(self.receive_capacity);
        self.received.extend_from_slice(&data[..accepted]);
        accepted
    }

    fn receive_disconnect(&mut self) {
        self.receive_disconnects += 1;
    }

    fn undelivered(&self) -> bool {
        self.undelivered
    }

    fn read(&mut self, buffer: &mut [u8]) -> usize {
        let count = buffer.len().min(self.received.len());
        buffer[..count].copy_from_slice(&self.received[..count]);
        count
    }
}

fn tuple() -> FourTuple {
    FourTuple {
        local: Ipv4Address::new(192, 168, 1, 1).into(),
        remote: Ipv4Address::new(192, 168, 1, 2).into(),
        local_port: LOCAL_PORT,
        remote_port: REMOTE_PORT,
    }
}

fn connection() -> Connection {
    Connection::new(tuple(), RECV_WINDOW, LOCAL_MSS)
}

fn ingress(seq: u32, ack: Option<u32>, window: u16, flags: TcpFlags) -> TcpRepr {
    TcpRepr {
        src_port: REMOTE_PORT,
        dst_port: LOCAL_PORT,
        flags,
        seq_number: TcpSeqNumber(seq),
        ack_number: ack.map(TcpSeqNumber),
        window_len: window,
        max_seg_size: None,
        payload_len: 0,
    }
}

fn control(seq: u32, ack: Option<u32>, window: u16, flags: TcpFlags) -> Segment<'static> {
    Segment::new(ingress(seq, ack, window, flags), &[])
}

fn data_segment(seq: u32, ack: u32, payload: &[u8]) -> Segment {
    let mut repr = ingress(seq, Some(ack), PEER_WINDOW, TcpFlags::ack_only());
    repr.payload_len = payload.len() as u16;
    Segment::new(repr, payload)
}

/// Properties every handler invocation must preserve.
fn check_invariants(connection: &Connection) {
    let send = &connection.tcb.send;
    // The send space is never behind its unacknowledged edge.
    assert!(send.next.0.wrapping_sub(send.unacked.0) <= 0x8000_0000);
}

/// Drive the passive three-way handshake to ESTABLISHED.
fn established() -> (Connection, Mock) {
    let mut connection = connection();
    let mut host = Mock::new();

    connection.open(&mut host, false).unwrap();
    let syn = control(PEER_ISS, None, PEER_WINDOW, TcpFlags::syn_only());
    assert_eq!(connection.handle(&mut host, &syn), SegmentResult::Ok);
    let ack = control(PEER_ISS + 1, Some(ISS + 1), PEER_WINDOW, TcpFlags::ack_only());
    assert_eq!(connection.handle(&mut host, &ack), SegmentResult::Ok);

    assert_eq!(connection.state(), State::Established);
    host.take_sent();
    (connection, host)
}

#[test]
fn passive_handshake() {
    let mut connection = connection();
    let mut host = Mock::new();

    connection.open(&mut host, false).unwrap();
    assert_eq!(connection.state(), State::Listen);

    let syn = control(PEER_ISS, None, PEER_WINDOW, TcpFlags::syn_only());
    assert_eq!(connection.handle(&mut host, &syn), SegmentResult::Ok);
    check_invariants(&connection);

    assert_eq!(connection.state(), State::SynReceived);
    assert_eq!(host.accepts, 1);

    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    let syn_ack = sent[0];
    assert!(syn_ack.flags.syn());
    assert_eq!(syn_ack.src_port, LOCAL_PORT);
    assert_eq!(syn_ack.dst_port, REMOTE_PORT);
    assert_eq!(syn_ack.seq_number, TcpSeqNumber(ISS));
    assert_eq!(syn_ack.ack_number, Some(TcpSeqNumber(PEER_ISS + 1)));
    assert_eq!(syn_ack.window_len, RECV_WINDOW as u16);
    assert_eq!(syn_ack.max_seg_size, Some(LOCAL_MSS));

    // The handshake acknowledgment also stops the RTT measurement.
    host.rttm_running = true;
    let ack = control(PEER_ISS + 1, Some(ISS + 1), PEER_WINDOW, TcpFlags::ack_only());
    assert_eq!(connection.handle(&mut host, &ack), SegmentResult::Ok);
    check_invariants(&connection);

    assert_eq!(connection.state(), State::Established);
    assert_eq!(connection.tcb.send.unacked, TcpSeqNumber(ISS + 1));
    assert_eq!(connection.tcb.send.next, TcpSeqNumber(ISS + 1));
    assert_eq!(connection.tcb.recv.next, TcpSeqNumber(PEER_ISS + 1));
    assert_eq!(connection.tcb.send.window, u32::from(PEER_WINDOW));
    assert_eq!(host.connects, 1);
    assert_eq!(host.rt_acked, vec![TcpSeqNumber(ISS + 1)]);
    assert_eq!(host.rttm_stops, vec![false]);
    assert!(host.take_sent().is_empty());
}

#[test]
fn active_handshake() {
    let mut connection = connection();
    let mut host = Mock::new();

    connection.open(&mut host, true).unwrap();
    assert_eq!(connection.state(), State::SynSent);

    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].flags.syn());
    assert!(!sent[0].flags.ack());
    assert_eq!(sent[0].seq_number, TcpSeqNumber(ISS));
    assert_eq!(sent[0].max_seg_size, Some(LOCAL_MSS));

    // The SYN retransmission timer measures the round trip; its sample is
    // ambiguous once the answer arrives and is discarded per Karn.
    host.rttm_running = true;
    let syn_ack = control(PEER_ISS, Some(ISS + 1), PEER_WINDOW, TcpFlags::syn_ack());
    assert_eq!(connection.handle(&mut host, &syn_ack), SegmentResult::Ok);
    check_invariants(&connection);

    assert_eq!(connection.state(), State::Established);
    assert_eq!(host.connects, 1);
    assert_eq!(host.rttm_stops, vec![true]);
    assert_eq!(connection.tcb.send.window, u32::from(PEER_WINDOW));

    // The reverse SYN is acknowledged with a bare ACK.
    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].seq_number, TcpSeqNumber(ISS + 1));
    assert_eq!(sent[0].ack_number, Some(TcpSeqNumber(PEER_ISS + 1)));
    assert_eq!(sent[0].flags.syn(), false);
}

#[test]
fn simultaneous_open() {
    let mut connection = connection();
    let mut host = Mock::new();

    connection.open(&mut host, true).unwrap();
    host.take_sent();

    // A SYN without the matching ACK crossed ours on the wire.
    let syn = control(PEER_ISS, None, PEER_WINDOW, TcpFlags::syn_only());
    assert_eq!(connection.handle(&mut host, &syn), SegmentResult::Ok);

    assert_eq!(connection.state(), State::SynReceived);
    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].flags.syn() && sent[0].flags.ack());
    assert_eq!(sent[0].seq_number, TcpSeqNumber(ISS));
    assert_eq!(sent[0].ack_number, Some(TcpSeqNumber(PEER_ISS + 1)));

    // The acknowledgment of our SYN completes the handshake.
    let ack = control(PEER_ISS + 1, Some(ISS + 1), PEER_WINDOW, TcpFlags::ack_only());
    assert_eq!(connection.handle(&mut host, &ack), SegmentResult::Ok);
    assert_eq!(connection.state(), State::Established);
    assert_eq!(host.connects, 1);
}

#[test]
fn unacceptable_seq_is_acked() {
    let (mut connection, mut host) = established();

    let stray = data_segment(14_000, ISS + 1, &[0u8; 10]);
    assert_eq!(connection.handle(&mut host, &stray), SegmentResult::Ok);
    check_invariants(&connection);

    assert_eq!(connection.state(), State::Established);
    assert_eq!(connection.tcb.recv.next, TcpSeqNumber(PEER_ISS + 1));
    assert!(host.received.is_empty());

    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].seq_number, TcpSeqNumber(ISS + 1));
    assert_eq!(sent[0].ack_number, Some(TcpSeqNumber(PEER_ISS + 1)));
    assert_eq!(sent[0].payload_len, 0);
}

#[test]
fn duplicate_acks_invoke_reno_hook() {
    let (mut connection, mut host) = established();

    // Pretend a kilobyte is in flight.
    connection.tcb.send.next = TcpSeqNumber(2001);
    connection.tcb.send.window = RECV_WINDOW;

    for _ in 0..3 {
        let dup = control(PEER_ISS + 1, Some(ISS + 1), RECV_WINDOW as u16, TcpFlags::ack_only());
        assert_eq!(connection.handle(&mut host, &dup), SegmentResult::Ok);
        check_invariants(&connection);
    }

    assert_eq!(connection.tcb.flow.duplicate_acks, 3);
    assert!(connection.tcb.flow.in_fast_recovery());
    assert_eq!(connection.tcb.flow.recover, TcpSeqNumber(2001));
    assert_eq!(connection.tcb.send.unacked, TcpSeqNumber(ISS + 1));
    // No corrective segments for duplicate acknowledgments.
    assert!(host.take_sent().is_empty());

    // An advancing ACK ends the duplicate run.
    let fresh = control(PEER_ISS + 1, Some(1501), RECV_WINDOW as u16, TcpFlags::ack_only());
    assert_eq!(connection.handle(&mut host, &fresh), SegmentResult::Ok);
    assert_eq!(connection.tcb.flow.duplicate_acks, 0);
    assert_eq!(connection.tcb.send.unacked, TcpSeqNumber(1501));
}

#[test]
fn active_close_to_time_wait() {
    let (mut connection, mut host) = established();

    connection.close(&mut host).unwrap();
    assert_eq!(connection.state(), State::FinWait1);

    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].flags.fin() && sent[0].flags.ack());
    assert_eq!(sent[0].seq_number, TcpSeqNumber(ISS + 1));
    assert_eq!(sent[0].ack_number, Some(TcpSeqNumber(PEER_ISS + 1)));
    assert_eq!(connection.tcb.send.next, TcpSeqNumber(ISS + 2));

    // Our FIN is acknowledged without a remote FIN.
    let ack = control(PEER_ISS + 1, Some(ISS + 2), PEER_WINDOW, TcpFlags::ack_only());
    assert_eq!(connection.handle(&mut host, &ack), SegmentResult::Ok);
    check_invariants(&connection);
    assert_eq!(connection.state(), State::FinWait2);
    assert!(host.take_sent().is_empty());

    // The remote closes too.
    let fin = control(PEER_ISS + 1, Some(ISS + 2), PEER_WINDOW, TcpFlags::fin_ack());
    assert_eq!(connection.handle(&mut host, &fin), SegmentResult::Ok);
    check_invariants(&connection);

    assert_eq!(connection.state(), State::TimeWait);
    assert_eq!(host.time_wait_arms, 1);
    assert_eq!(host.rt_stops, 1);
    assert_eq!(host.disconnects, vec![Disconnect::Closing]);

    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].ack_number, Some(TcpSeqNumber(PEER_ISS + 2)));
    assert_eq!(sent[0].flags.fin(), false);

    // The 2·MSL one-shot fires.
    connection.time_wait_timeout();
    assert_eq!(connection.state(), State::Closed);
}

#[test]
fn reset_in_syn_sent() {
    let mut connection = connection();
    let mut host = Mock::new();

    connection.open(&mut host, true).unwrap();
    host.take_sent();

    let mut flags = TcpFlags::rst_only();
    flags.set_ack(true);
    let rst = control(0, Some(ISS + 1), 0, flags);
    assert_eq!(connection.handle(&mut host, &rst), SegmentResult::Closed);

    assert_eq!(connection.state(), State::Closed);
    assert_eq!(host.errors, vec![Error::Reset]);
    assert!(host.take_sent().is_empty());
    // Queues are gone once the connection reports Closed.
    assert_eq!(host.write_resets, 1);
    assert_eq!(host.rt_flushes, 1);
}

#[test]
fn close_wait_closes_via_last_ack() {
    let (mut connection, mut host) = established();

    // The remote closes its half.
    let fin = control(PEER_ISS + 1, Some(ISS + 1), PEER_WINDOW, TcpFlags::fin_ack());
    assert_eq!(connection.handle(&mut host, &fin), SegmentResult::Close);
    assert_eq!(connection.state(), State::CloseWait);
    assert_eq!(host.disconnects, vec![Disconnect::Closing]);
    host.take_sent();

    // Our CLOSE answers with a FIN and waits for exactly one ACK.
    connection.close(&mut host).unwrap();
    assert_eq!(connection.state(), State::LastAck);
    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].flags.fin());

    let ack = control(PEER_ISS + 2, Some(ISS + 2), PEER_WINDOW, TcpFlags::ack_only());
    assert_eq!(connection.handle(&mut host, &ack), SegmentResult::Closed);
    assert_eq!(connection.state(), State::Closed);
    assert!(host.take_sent().is_empty());
}

#[test]
fn duplicate_fin_is_reacked() {
    let (mut connection, mut host) = established();

    let fin = control(PEER_ISS + 1, Some(ISS + 1), PEER_WINDOW, TcpFlags::fin_ack());
    assert_eq!(connection.handle(&mut host, &fin), SegmentResult::Close);
    assert_eq!(connection.state(), State::CloseWait);
    assert_eq!(connection.tcb.recv.next, TcpSeqNumber(PEER_ISS + 2));
    host.take_sent();

    // The ACK was lost, the remote retransmits its FIN.
    let fin = control(PEER_ISS + 1, Some(ISS + 1), PEER_WINDOW, TcpFlags::fin_ack());
    assert_eq!(connection.handle(&mut host, &fin), SegmentResult::Ok);

    assert_eq!(connection.state(), State::CloseWait);
    assert_eq!(connection.tcb.recv.next, TcpSeqNumber(PEER_ISS + 2));
    assert_eq!(host.disconnects, vec![Disconnect::Closing]);

    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].ack_number, Some(TcpSeqNumber(PEER_ISS + 2)));
}

#[test]
fn payload_is_delivered_and_acked() {
    let (mut connection, mut host) = established();
    // A writer has queued data it could piggyback on the reply.
    host.pending = true;

    let payload = b"hello world";
    let data = data_segment(PEER_ISS + 1, ISS + 1, payload);
    assert_eq!(connection.handle(&mut host, &data), SegmentResult::Ok);
    check_invariants(&connection);

    assert_eq!(host.received, payload);
    let next = PEER_ISS + 1 + payload.len() as u32;
    assert_eq!(connection.tcb.recv.next, TcpSeqNumber(next));
    assert_eq!(host.pushes, 1);

    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].ack_number, Some(TcpSeqNumber(next)));

    // A retransmission of the same segment advances nothing, and the
    // connection is already scheduled for the egress pass.
    let data = data_segment(PEER_ISS + 1, ISS + 1, payload);
    assert_eq!(connection.handle(&mut host, &data), SegmentResult::Ok);
    assert_eq!(connection.tcb.recv.next, TcpSeqNumber(next));
    assert_eq!(host.received, payload);
    assert_eq!(host.pushes, 1);
}

#[test]
fn overlapping_retransmission_is_trimmed() {
    let (mut connection, mut host) = established();

    let data = data_segment(PEER_ISS + 1, ISS + 1, b"abcdef");
    connection.handle(&mut host, &data);
    host.take_sent();

    // Partially old, partially new data.
    let data = data_segment(PEER_ISS + 4, ISS + 1, b"defghi");
    connection.handle(&mut host, &data);

    assert_eq!(host.received, b"abcdefghi");
    assert_eq!(connection.tcb.recv.next, TcpSeqNumber(PEER_ISS + 10));
}

#[test]
fn receive_capacity_bounds_progress() {
    let (mut connection, mut host) = established();
    host.receive_capacity = 4;

    let data = data_segment(PEER_ISS + 1, ISS + 1, b"abcdef");
    connection.handle(&mut host, &data);

    assert_eq!(host.received, b"abcd");
    assert_eq!(connection.tcb.recv.next, TcpSeqNumber(PEER_ISS + 5));
    let sent = host.take_sent();
    assert_eq!(sent[0].ack_number, Some(TcpSeqNumber(PEER_ISS + 5)));
}

#[test]
fn out_of_order_fin_is_not_consumed() {
    let (mut connection, mut host) = established();

    // A FIN whose data predecessor is missing: in the window, but not next.
    let mut repr = ingress(PEER_ISS + 3, Some(ISS + 1), PEER_WINDOW, TcpFlags::fin_ack());
    repr.payload_len = 2;
    let fin = Segment::new(repr, b"zz");
    assert_eq!(connection.handle(&mut host, &fin), SegmentResult::Ok);

    // Not consumed: no disconnect, no sequence advance, one duplicate ACK.
    assert_eq!(connection.state(), State::Established);
    assert_eq!(connection.tcb.recv.next, TcpSeqNumber(PEER_ISS + 1));
    assert!(host.disconnects.is_empty());
    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].ack_number, Some(TcpSeqNumber(PEER_ISS + 1)));
}

#[test]
fn fin_with_undelivered_data_signals_receive_disconnect() {
    let (mut connection, mut host) = established();
    host.undelivered = true;

    let fin = control(PEER_ISS + 1, Some(ISS + 1), PEER_WINDOW, TcpFlags::fin_ack());
    connection.handle(&mut host, &fin);
    assert_eq!(host.receive_disconnects, 1);
}

#[test]
fn syn_in_established_resets_connection() {
    let (mut connection, mut host) = established();

    let syn = control(PEER_ISS + 10, Some(ISS + 1), PEER_WINDOW, TcpFlags::syn_ack());
    assert_eq!(connection.handle(&mut host, &syn), SegmentResult::Closed);

    assert_eq!(connection.state(), State::Closed);
    assert_eq!(host.disconnects, vec![Disconnect::Reset]);
    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].flags.rst());
    assert_eq!(sent[0].seq_number, TcpSeqNumber(ISS + 1));
    // Queue teardown happened before the owner saw Closed.
    assert_eq!(host.write_resets, 1);
    assert_eq!(host.rt_flushes, 1);
}

#[test]
fn reset_in_established_signals_disconnect() {
    let (mut connection, mut host) = established();

    let rst = control(PEER_ISS + 1, None, 0, TcpFlags::rst_only());
    assert_eq!(connection.handle(&mut host, &rst), SegmentResult::Closed);

    assert_eq!(connection.state(), State::Closed);
    assert_eq!(host.disconnects, vec![Disconnect::Reset]);
    assert!(host.take_sent().is_empty());
}

#[test]
fn closed_connection_answers_with_reset() {
    let mut connection = connection();
    let mut host = Mock::new();

    // With an ACK the reset takes its sequence from it.
    let stray = control(7000, Some(4242), PEER_WINDOW, TcpFlags::ack_only());
    assert_eq!(connection.handle(&mut host, &stray), SegmentResult::Ok);
    let sent = host.take_sent();
    assert!(sent[0].flags.rst());
    assert_eq!(sent[0].seq_number, TcpSeqNumber(4242));

    // Without one it acknowledges the whole segment from sequence zero.
    let mut repr = ingress(7000, None, PEER_WINDOW, TcpFlags::default());
    repr.payload_len = 5;
    let stray = Segment::new(repr, b"stray");
    connection.handle(&mut host, &stray);
    let sent = host.take_sent();
    assert!(sent[0].flags.rst() && sent[0].flags.ack());
    assert_eq!(sent[0].seq_number, TcpSeqNumber(0));
    assert_eq!(sent[0].ack_number, Some(TcpSeqNumber(7005)));

    // A reset is never answered.
    let rst = control(7000, None, 0, TcpFlags::rst_only());
    connection.handle(&mut host, &rst);
    assert!(host.take_sent().is_empty());
}

#[test]
fn listener_may_refuse() {
    let mut connection = connection();
    let mut host = Mock::new();
    host.accept = false;

    connection.open(&mut host, false).unwrap();
    let syn = control(PEER_ISS, None, PEER_WINDOW, TcpFlags::syn_only());
    assert_eq!(connection.handle(&mut host, &syn), SegmentResult::Closed);
    assert_eq!(connection.state(), State::Closed);
    assert!(host.take_sent().is_empty());
}

#[test]
fn listener_answers_stray_ack_with_reset() {
    let mut connection = connection();
    let mut host = Mock::new();

    connection.open(&mut host, false).unwrap();
    let stray = control(PEER_ISS, Some(4242), PEER_WINDOW, TcpFlags::ack_only());
    assert_eq!(connection.handle(&mut host, &stray), SegmentResult::Ok);

    assert_eq!(connection.state(), State::Listen);
    let sent = host.take_sent();
    assert!(sent[0].flags.rst());
    assert_eq!(sent[0].seq_number, TcpSeqNumber(4242));
}

#[test]
fn refused_connection_signals_refused() {
    let mut connection = connection();
    let mut host = Mock::new();

    // Simultaneous open leads through SYN-SENT into SYN-RECEIVED.
    connection.open(&mut host, true).unwrap();
    let syn = control(PEER_ISS, None, PEER_WINDOW, TcpFlags::syn_only());
    connection.handle(&mut host, &syn);
    assert_eq!(connection.state(), State::SynReceived);
    host.take_sent();

    let rst = control(PEER_ISS + 1, None, 0, TcpFlags::rst_only());
    assert_eq!(connection.handle(&mut host, &rst), SegmentResult::Closed);
    assert_eq!(host.disconnects, vec![Disconnect::Refused]);
}

#[test]
fn passive_syn_received_dies_silently_on_reset() {
    let mut connection = connection();
    let mut host = Mock::new();

    connection.open(&mut host, false).unwrap();
    let syn = control(PEER_ISS, None, PEER_WINDOW, TcpFlags::syn_only());
    connection.handle(&mut host, &syn);
    host.take_sent();

    let rst = control(PEER_ISS + 1, None, 0, TcpFlags::rst_only());
    assert_eq!(connection.handle(&mut host, &rst), SegmentResult::Closed);
    assert!(host.disconnects.is_empty());
}

#[test]
fn open_command_errors() {
    let mut host = Mock::new();

    let mut listener = connection();
    listener.open(&mut host, false).unwrap();
    assert_eq!(listener.open(&mut host, false), Ok(()));

    let (mut open, _) = established();
    assert_eq!(open.open(&mut host, false), Err(Error::AlreadyExists));
    assert_eq!(open.open(&mut host, true), Err(Error::AlreadyExists));

    let unbound = FourTuple {
        remote: Default::default(),
        remote_port: 0,
        ..tuple()
    };
    let mut unbound = Connection::new(unbound, RECV_WINDOW, LOCAL_MSS);
    assert_eq!(unbound.open(&mut host, true), Err(Error::NoRemoteHost));
}

#[test]
fn send_command_table() {
    let mut host = Mock::new();

    let mut closed = connection();
    assert_eq!(closed.send(&mut host, b"x"), Err(Error::DoesNotExist));

    let mut listener = connection();
    listener.open(&mut host, false).unwrap();
    assert_eq!(listener.send(&mut host, b"x"), Err(Error::ListenerSend));

    let mut opening = connection();
    opening.open(&mut host, true).unwrap();
    assert_eq!(opening.send(&mut host, b"x"), Ok(0));

    let (mut open, mut host) = established();
    assert_eq!(open.send(&mut host, b"data"), Ok(4));
    // With a non-empty queue the data must queue behind it.
    host.write_queue_len = 1;
    assert_eq!(open.send(&mut host, b"data"), Ok(0));

    open.close(&mut host).unwrap();
    assert_eq!(open.send(&mut host, b"data"), Err(Error::Closing));
}

#[test]
fn recv_command_table() {
    let mut host = Mock::new();

    let mut closed = connection();
    let mut buffer = [0u8; 8];
    assert_eq!(closed.recv(&mut host, &mut buffer), Err(Error::Closing));

    let (mut open, mut host) = established();
    host.received = b"abc".to_vec();
    assert_eq!(open.recv(&mut host, &mut buffer), Ok(3));
    assert_eq!(&buffer[..3], b"abc");
}

#[test]
fn close_is_not_repeatable_with_a_second_fin() {
    let (mut connection, mut host) = established();

    connection.close(&mut host).unwrap();
    assert_eq!(host.take_sent().len(), 1);

    // Further closes in the FIN-WAIT states are silent no-ops.
    connection.close(&mut host).unwrap();
    assert!(host.take_sent().is_empty());
    assert_eq!(connection.state(), State::FinWait1);
    assert_eq!(connection.tcb.send.next, TcpSeqNumber(ISS + 2));
}

#[test]
fn abort_sends_reset_and_flushes() {
    let (mut connection, mut host) = established();

    connection.abort(&mut host);
    assert_eq!(connection.state(), State::Closed);
    assert_eq!(host.write_resets, 1);
    assert_eq!(host.rt_flushes, 1);

    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].flags.rst());
    assert_eq!(sent[0].seq_number, TcpSeqNumber(ISS + 1));

    // Everywhere else the command is a no-op.
    let mut listener = self::connection();
    listener.open(&mut host, false).unwrap();
    listener.abort(&mut host);
    assert_eq!(listener.state(), State::Listen);
    assert!(host.take_sent().is_empty());
}

#[test]
fn old_segment_does_not_update_send_window() {
    let (mut connection, mut host) = established();
    assert_eq!(connection.tcb.send.window, u32::from(PEER_WINDOW));

    // An ACK with an older sequence number must not shrink the window.
    let old = control(PEER_ISS, Some(ISS + 1), 123, TcpFlags::ack_only());
    // Out of window; only a duplicate ACK comes back.
    connection.handle(&mut host, &old);
    assert_eq!(connection.tcb.send.window, u32::from(PEER_WINDOW));

    // In-window, newer sequence: the update applies.
    let fresh = control(PEER_ISS + 1, Some(ISS + 1), 123, TcpFlags::ack_only());
    connection.handle(&mut host, &fresh);
    assert_eq!(connection.tcb.send.window, 123);
}

#[test]
fn ack_beyond_send_next_is_answered() {
    let (mut connection, mut host) = established();

    let future = control(PEER_ISS + 1, Some(ISS + 100), PEER_WINDOW, TcpFlags::ack_only());
    assert_eq!(connection.handle(&mut host, &future), SegmentResult::Ok);

    assert_eq!(connection.tcb.send.unacked, TcpSeqNumber(ISS + 1));
    let sent = host.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].ack_number, Some(TcpSeqNumber(PEER_ISS + 1)));
}

#[test]
fn fin_in_time_wait_restarts_timer() {
    let (mut connection, mut host) = established();

    connection.close(&mut host).unwrap();
    let ack = control(PEER_ISS + 1, Some(ISS + 2), PEER_WINDOW, TcpFlags::ack_only());
    connection.handle(&mut host, &ack);
    let fin = control(PEER_ISS + 1, Some(ISS + 2), PEER_WINDOW, TcpFlags::fin_ack());
    connection.handle(&mut host, &fin);
    assert_eq!(connection.state(), State::TimeWait);
    assert_eq!(host.time_wait_arms, 1);
    host.take_sent();

    // A new FIN in the wait restarts the 2·MSL timer.
    let fin = control(PEER_ISS + 2, Some(ISS + 2), PEER_WINDOW, TcpFlags::fin_ack());
    connection.handle(&mut host, &fin);
    assert_eq!(connection.state(), State::TimeWait);
    assert_eq!(host.time_wait_arms, 2);
}

#[test]
fn both_sides_close_at_once() {
    let (mut connection, mut host) = established();

    // We close, but the remote FIN arrives before the ACK of ours.
    connection.close(&mut host).unwrap();
    host.take_sent();

    let fin = control(PEER_ISS + 1, Some(ISS + 1), PEER_WINDOW, TcpFlags::fin_ack());
    assert_eq!(connection.handle(&mut host, &fin), SegmentResult::Ok);
    assert_eq!(connection.state(), State::Closing);

    // Now the acknowledgment of our FIN arrives.
    let ack = control(PEER_ISS + 2, Some(ISS + 2), PEER_WINDOW, TcpFlags::ack_only());
    assert_eq!(connection.handle(&mut host, &ack), SegmentResult::Ok);
    assert_eq!(connection.state(), State::TimeWait);
    assert_eq!(host.time_wait_arms, 1);
}

#[test]
fn receive_window_right_edge_is_monotonic() {
    let (mut connection, mut host) = established();

    let mut right_edge = connection.tcb.recv.next + connection.tcb.recv.window as usize;
    for &(seq, payload) in &[(PEER_ISS + 1, &b"abc"[..]), (PEER_ISS + 4, &b"defg"[..])] {
        let data = data_segment(seq, ISS + 1, payload);
        connection.handle(&mut host, &data);
        let edge = connection.tcb.recv.next + connection.tcb.recv.window as usize;
        assert!(edge == right_edge || edge > right_edge);
        right_edge = edge;
    }
}
