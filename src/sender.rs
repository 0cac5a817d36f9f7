//! The sliding-window sender (spec §4.2). Fragments application bytes into
//! segments, assigns monotonically increasing sequence numbers, tracks
//! unacknowledged segments in a send buffer, and retransmits on timeout.

use std::time::Instant;

use crate::host::{Application, InputStatus, Substrate};
use crate::list::List;
use crate::segment::{Flags, Segment, MSS};
use crate::seq::wrapping_lt;

/// A segment fragment awaiting acknowledgement, or still waiting for send
/// window to open up. `encoded` and `time_sent` are only meaningful once
/// `sent_flag` is true.
struct SentSegment {
    payload: Vec<u8>,
    fin: bool,
    seqno: u32,
    /// Number of sequence-space bytes this entry occupies: `payload.len()`
    /// for data, or 1 for a bare FIN.
    seq_len: u32,
    encoded: Vec<u8>,
    time_sent: Option<Instant>,
    retransmit_count: u32,
    sent_flag: bool,
}

impl SentSegment {
    fn end(&self) -> u32 {
        self.seqno.wrapping_add(self.seq_len)
    }
}

pub struct Sender {
    send_base: u32,
    next_seqno: u32,
    send_window_avail: u32,
    advertised_window: u32,
    fin_sent: bool,
    fin_sent_acked: bool,
    sent: List<SentSegment>,
    send_window: u32,
}

/// Raised when a segment's retransmit count exceeds the configured cap;
/// the connection that owns this sender must be destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitCapExceeded;

impl Sender {
    pub fn new(initial_seqno: u32, send_window: u32) -> Self {
        Sender {
            send_base: initial_seqno,
            next_seqno: initial_seqno,
            send_window_avail: send_window,
            advertised_window: 0,
            fin_sent: false,
            fin_sent_acked: false,
            sent: List::new(),
            send_window,
        }
    }

    pub fn fin_sent(&self) -> bool {
        self.fin_sent
    }

    pub fn fin_sent_acked(&self) -> bool {
        self.fin_sent_acked
    }

    /// `true` once every outstanding segment (including a sent FIN) has
    /// been acknowledged and there is nothing left to retransmit.
    pub fn is_quiescent(&self) -> bool {
        self.sent.is_empty()
    }

    /// Spec §4.2 `on_application_readable`, steps 1-5: pulls bytes from the
    /// application and enqueues them (and a FIN on EOF) without
    /// transmitting anything yet. Returns `true` if a FIN was newly
    /// enqueued.
    pub fn on_application_readable(&mut self, app: &mut dyn Application) -> bool {
        if self.fin_sent {
            return false;
        }
        if self.send_window_avail == 0 {
            return false;
        }

        let cap = self.send_window_avail as usize;
        let mut buf = vec![0u8; cap];
        match app.input(&mut buf) {
            InputStatus::Eof => {
                self.fin_sent = true;
                self.sent.push_back(SentSegment {
                    payload: Vec::new(),
                    fin: true,
                    seqno: 0,
                    seq_len: 1,
                    encoded: Vec::new(),
                    time_sent: None,
                    retransmit_count: 0,
                    sent_flag: false,
                });
                true
            }
            InputStatus::WouldBlock => false,
            InputStatus::Ready(n) => {
                buf.truncate(n);
                for chunk in buf.chunks(MSS) {
                    self.send_window_avail -= chunk.len() as u32;
                    self.sent.push_back(SentSegment {
                        payload: chunk.to_vec(),
                        fin: false,
                        seqno: 0,
                        seq_len: chunk.len() as u32,
                        encoded: Vec::new(),
                        time_sent: None,
                        retransmit_count: 0,
                        sent_flag: false,
                    });
                }
                false
            }
        }
    }

    /// Spec §4.2 step 6: walks the send buffer from the first unsent entry,
    /// transmitting as long as the peer's advertised window allows.
    /// `ackno`/`window` are the values to piggyback on newly-sent segments;
    /// once a segment is sent its encoded bytes are frozen and retransmits
    /// reuse them verbatim.
    pub fn transmit_pending(&mut self, ackno: u32, window: u16, substrate: &mut dyn Substrate) {
        let mut window_budget = self.advertised_window;
        let now = Instant::now();

        let mut cur = self.sent.front();
        while let Some(id) = cur {
            cur = self.sent.next(id);
            let entry = self.sent.get_mut(id);

            if entry.sent_flag {
                continue;
            }
            if window_budget == 0 {
                break;
            }

            entry.seqno = self.next_seqno;
            self.next_seqno = self.next_seqno.wrapping_add(entry.seq_len);

            let seg = Segment {
                seqno: entry.seqno,
                ackno,
                flags: if entry.fin {
                    Flags::ACK | Flags::FIN
                } else {
                    Flags::ACK
                },
                window,
                data: entry.payload.clone(),
            };
            entry.encoded = seg.encode();

            let _ = substrate.send(&entry.encoded);
            entry.time_sent = Some(now);
            entry.retransmit_count += 1;
            entry.sent_flag = true;

            log::debug!(
                "tx seqno={} len={} fin={}",
                entry.seqno,
                entry.seq_len,
                entry.fin
            );

            window_budget = window_budget.saturating_sub(entry.payload.len() as u32);
        }
    }

    /// Spec §4.2 `on_ack`. Returns `true` if this ack newly acknowledges
    /// our FIN (send-side half of teardown completing).
    pub fn on_ack(&mut self, ackno: u32, peer_window: u16) -> bool {
        self.advertised_window = peer_window as u32;

        if wrapping_lt(self.send_base, ackno) {
            log::debug!("ack processed: send_base {} -> {}", self.send_base, ackno);
            self.send_base = ackno;

            while let Some(id) = self.sent.front() {
                let entry = self.sent.get(id);
                if entry.sent_flag && !wrapping_lt(self.send_base, entry.end()) {
                    let entry = self.sent.remove(id);
                    self.send_window_avail += entry.payload.len() as u32;
                } else {
                    break;
                }
            }
        }
        // ackno == send_base: no new data acked, rely on the timer.
        // ackno < send_base: stale, ignore (wrapping_lt above is false either way).

        if self.fin_sent && !self.fin_sent_acked && self.sent.is_empty() {
            self.fin_sent_acked = true;
            true
        } else {
            false
        }
    }

    /// Spec §4.6 `on_tick`, restricted to the send side: ages in-flight
    /// segments and resends those that have timed out. `Err` means the
    /// retransmit cap was breached and the connection must be destroyed.
    pub fn on_tick(
        &mut self,
        now: Instant,
        rt_timeout: std::time::Duration,
        max_retransmits: u32,
        substrate: &mut dyn Substrate,
    ) -> Result<(), RetransmitCapExceeded> {
        for id in self.sent.iter_ids() {
            let entry = self.sent.get_mut(id);
            if !entry.sent_flag {
                continue;
            }
            if entry.retransmit_count > max_retransmits {
                log::warn!(
                    "seqno={} exceeded {max_retransmits} retransmits, destroying connection",
                    entry.seqno
                );
                return Err(RetransmitCapExceeded);
            }
            let age = now.duration_since(entry.time_sent.unwrap_or(now));
            if age > rt_timeout {
                log::debug!(
                    "retransmitting seqno={} (attempt {})",
                    entry.seqno,
                    entry.retransmit_count + 1
                );
                let _ = substrate.send(&entry.encoded);
                entry.time_sent = Some(now);
                entry.retransmit_count += 1;
            }
        }
        Ok(())
    }

    pub fn send_base(&self) -> u32 {
        self.send_base
    }

    pub fn next_seqno(&self) -> u32 {
        self.next_seqno
    }

    pub fn send_window_avail(&self) -> u32 {
        self.send_window_avail
    }

    /// Checks the §8 invariants that this module is responsible for.
    /// Panics on violation; called after every callback in debug builds.
    pub fn check_invariants(&self) {
        debug_assert!(!wrapping_lt(self.next_seqno, self.send_base));

        for entry in self.sent.iter() {
            debug_assert!(!entry.sent_flag || !wrapping_lt(entry.seqno, self.send_base));
        }

        let payload_sum: u32 = self.sent.iter().map(|s| s.payload.len() as u32).sum();
        debug_assert_eq!(self.send_window_avail + payload_sum, self.send_window);
    }

    #[cfg(test)]
    fn unsent_count(&self) -> usize {
        self.sent.iter().filter(|s| !s.sent_flag).count()
    }

    #[cfg(test)]
    fn entries(&self) -> usize {
        self.sent.len()
    }

    #[cfg(test)]
    fn retransmit_counts(&self) -> Vec<u32> {
        self.sent.iter().map(|s| s.retransmit_count).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::{FakeApplication, FakeSubstrate};
    use std::time::Duration;

    #[test]
    fn fragments_payload_at_mss_boundary() {
        let mut sender = Sender::new(0, 1 << 20);
        let mut app = FakeApplication::with_input(vec![0u8; MSS]);
        sender.on_application_readable(&mut app);
        assert_eq!(sender.entries(), 1);

        let mut sender = Sender::new(0, 1 << 20);
        let mut app = FakeApplication::with_input(vec![0u8; MSS + 1]);
        sender.on_application_readable(&mut app);
        assert_eq!(sender.entries(), 2);
    }

    #[test]
    fn zero_window_holds_back_transmission() {
        let mut sender = Sender::new(0, 1 << 20);
        let mut app = FakeApplication::with_input(b"hello".to_vec());
        sender.on_application_readable(&mut app);
        assert_eq!(sender.unsent_count(), 1);

        let mut substrate = FakeSubstrate::default();
        sender.transmit_pending(0, 4096, &mut substrate);
        // advertised_window starts at 0: nothing should be sent.
        assert_eq!(sender.unsent_count(), 1);
        assert!(substrate.sent.is_empty());
    }

    #[test]
    fn ack_advances_send_base_and_frees_entries() {
        let mut sender = Sender::new(0, 1 << 20);
        let mut app = FakeApplication::with_input(b"hello\n".to_vec());
        sender.on_application_readable(&mut app);

        sender.on_ack(0, 4096); // learn a non-zero window
        let mut substrate = FakeSubstrate::default();
        sender.transmit_pending(0, 4096, &mut substrate);
        assert_eq!(substrate.sent.len(), 1);

        assert!(!sender.on_ack(7, 4096));
        assert!(sender.is_quiescent());
    }

    #[test]
    fn stale_ack_is_ignored() {
        let mut sender = Sender::new(0, 1 << 20);
        let mut app = FakeApplication::with_input(b"hi".to_vec());
        sender.on_application_readable(&mut app);
        sender.on_ack(0, 4096);
        let mut substrate = FakeSubstrate::default();
        sender.transmit_pending(0, 4096, &mut substrate);

        sender.on_ack(2, 4096);
        assert!(sender.is_quiescent());

        // A stale/duplicate ack for already-acked data must not panic or
        // regress send_base.
        sender.on_ack(2, 4096);
        sender.on_ack(1, 4096);
        assert!(sender.is_quiescent());
    }

    #[test]
    fn fin_consumes_one_seqno_and_is_acked_at_fin_seqno_plus_one() {
        let mut sender = Sender::new(0, 1 << 20);
        let mut app = FakeApplication::eof();
        assert!(sender.on_application_readable(&mut app));
        assert!(sender.fin_sent());

        sender.on_ack(0, 4096);
        let mut substrate = FakeSubstrate::default();
        sender.transmit_pending(0, 4096, &mut substrate);

        assert!(!sender.fin_sent_acked());
        assert!(sender.on_ack(1, 4096));
        assert!(sender.fin_sent_acked());
    }

    #[test]
    fn fin_ack_does_not_inflate_send_window_avail() {
        // The FIN's SentSegment occupies one seqno but carries no payload
        // bytes; freeing it on ack must not credit send_window_avail for
        // that phantom seqno byte, or check_invariants panics on the most
        // ordinary teardown path.
        let mut sender = Sender::new(0, 1 << 20);
        let mut app = FakeApplication::eof();
        sender.on_application_readable(&mut app);
        sender.on_ack(0, 4096);
        let mut substrate = FakeSubstrate::default();
        sender.transmit_pending(0, 4096, &mut substrate);

        assert!(sender.on_ack(1, 4096));
        assert!(sender.is_quiescent());
        assert_eq!(sender.send_window_avail(), 1 << 20);
        sender.check_invariants();
    }

    #[test]
    fn timeout_triggers_retransmission_and_cap_is_enforced() {
        let mut sender = Sender::new(0, 1 << 20);
        let mut app = FakeApplication::with_input(b"x".to_vec());
        sender.on_application_readable(&mut app);
        sender.on_ack(0, 4096);
        let mut substrate = FakeSubstrate::default();
        sender.transmit_pending(0, 4096, &mut substrate);
        assert_eq!(substrate.sent.len(), 1);

        let timeout = Duration::from_millis(10);
        let mut now = Instant::now();
        for _ in 0..5 {
            now += Duration::from_millis(20);
            sender.on_tick(now, timeout, 5, &mut substrate).unwrap();
        }
        assert_eq!(sender.retransmit_counts(), vec![6]);

        now += Duration::from_millis(20);
        let result = sender.on_tick(now, timeout, 5, &mut substrate);
        assert_eq!(result, Err(RetransmitCapExceeded));
    }
}
