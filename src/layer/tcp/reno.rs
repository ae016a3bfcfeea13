//! TCP Reno flow control, as far as the segment pipeline drives it.
//!
//! Only the receive-side half lives here: recognizing duplicate
//! acknowledgements per RFC 5681 and maintaining the variables that the
//! sender consults for fast retransmit and congestion avoidance. The sender
//! itself, with its pacing and retransmission decisions, is not part of this
//! crate.
use crate::wire::TcpSeqNumber;

/// Models TCP Reno flow control and congestion avoidance.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Reno {
    /// The window dictated by congestion, `cwnd`.
    pub congestion_window: u32,

    /// Decider between slow-start and congestion avoidance, `ssthresh`.
    ///
    /// Set to MAX initially, then updated on occurrence of congestion.
    pub ssthresh: u32,

    /// Sender side end flag to fast recover.
    ///
    /// When in fast recovery, declares the sent sequence number that must be
    /// acknowledged to end fast recovery. Initially set to the initial
    /// sequence number (ISS).
    pub recover: TcpSeqNumber,

    /// Consecutive duplicate acknowledgements seen for `SND.UNA`.
    pub duplicate_acks: u8,
}

impl Reno {
    /// Flow control state at connection start.
    ///
    /// The congestion window begins at one sender maximum segment size and
    /// the slow-start threshold effectively unbounded.
    pub fn new(smss: u32, initial_seq: TcpSeqNumber) -> Self {
        Reno {
            congestion_window: smss,
            ssthresh: u32::max_value(),
            recover: initial_seq,
            duplicate_acks: 0,
        }
    }

    /// The duplicate-acknowledgement entry point.
    ///
    /// Called once per acknowledgement that matched the RFC 5681 duplicate
    /// predicate, with the acknowledged number, the current `SND.NXT` and
    /// the sender maximum segment size. The third consecutive duplicate
    /// enters fast retransmit:
    ///
    /// > ssthresh = max (FlightSize / 2, 2*SMSS)
    ///
    /// and inflates the congestion window by three segments; every further
    /// duplicate inflates it by one more, accounting for the segments that
    /// left the network.
    pub fn duplicate_ack(&mut self, ack: TcpSeqNumber, send_next: TcpSeqNumber, smss: u32) {
        self.duplicate_acks = self.duplicate_acks.saturating_add(1);

        if self.duplicate_acks == 3 {
            let flight_size = (send_next - ack) as u32;
            self.ssthresh = (flight_size / 2).max(2 * smss);
            self.congestion_window = self.ssthresh + 3 * smss;
            self.recover = send_next;
        } else if self.duplicate_acks > 3 {
            self.congestion_window = self.congestion_window.saturating_add(smss);
        }
    }

    /// An acknowledgement advanced `SND.UNA`; the duplicate run is over.
    pub fn new_ack(&mut self) {
        self.duplicate_acks = 0;
    }

    /// Whether fast recovery is in progress.
    pub fn in_fast_recovery(&self) -> bool {
        self.duplicate_acks >= 3
    }
}

impl Default for Reno {
    fn default() -> Self {
        Reno::new(0, TcpSeqNumber::default())
    }
}
