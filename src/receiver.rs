//! The reorder buffer / receiver (spec §4.3) and application delivery
//! (spec §4.4). Accepts inbound segments out of order, discards duplicates
//! and out-of-window data, and hands in-order byte ranges to the
//! application as they become contiguous.

use crate::host::Application;
use crate::list::List;
use crate::seq::wrapping_lt;

struct ReceivedSegment {
    seqno: u32,
    data: Vec<u8>,
}

pub struct Receiver {
    ackno: u32,
    next_byte_consume: u32,
    recv_window_avail: u32,
    recv_window: u32,
    received: List<ReceivedSegment>,
    fin_recv: bool,
}

/// Outcome of placing one inbound segment's payload, used by the caller to
/// decide whether to drive application delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// No payload to place (bare ACK or FIN-only segment).
    None,
    /// Payload landed in order and `received` was advanced; delivery
    /// should be attempted.
    InOrder,
    /// Payload queued out of order, or dropped as a duplicate / for lack
    /// of window. Nothing new is deliverable yet.
    Queued,
}

impl Receiver {
    pub fn new(initial_ackno: u32, recv_window: u32) -> Self {
        Receiver {
            ackno: initial_ackno,
            next_byte_consume: initial_ackno,
            recv_window_avail: recv_window,
            recv_window,
            received: List::new(),
            fin_recv: false,
        }
    }

    pub fn ackno(&self) -> u32 {
        self.ackno
    }

    pub fn recv_window_avail(&self) -> u16 {
        self.recv_window_avail.min(u16::MAX as u32) as u16
    }

    pub fn fin_recv(&self) -> bool {
        self.fin_recv
    }

    /// Spec §4.5's FIN teardown hook, dispatched before the ordinary
    /// payload-placement logic runs (step 3 ahead of step 4/7). A
    /// retransmitted peer FIN must not re-advance `ackno`, hence the
    /// `fin_recv` guard.
    pub fn observe_fin(&mut self) {
        if !self.fin_recv {
            self.fin_recv = true;
            self.ackno = self.ackno.wrapping_add(1);
        }
    }

    /// Spec §4.3 steps 5-7: places a data segment's payload into the
    /// reorder buffer (or drops it), per the three ordering cases.
    pub fn place(&mut self, seqno: u32, data: &[u8]) -> Placement {
        if data.is_empty() {
            return Placement::None;
        }
        let data_len = data.len() as u32;

        if seqno == self.ackno {
            if self.recv_window_avail < data_len {
                log::warn!("dropping in-order seqno={seqno} len={data_len}: recv window full");
                return Placement::Queued;
            }
            let head = self.received.push_front(ReceivedSegment {
                seqno,
                data: data.to_vec(),
            });
            self.ackno = self.ackno.wrapping_add(data_len);
            self.recv_window_avail -= data_len;
            self.absorb_contiguous_from(head);
            Placement::InOrder
        } else if wrapping_lt(self.ackno, seqno) {
            if self.received.iter().any(|seg| seg.seqno == seqno) {
                log::debug!("dropping duplicate queued segment seqno={seqno}");
                return Placement::Queued; // duplicate
            }
            if self.recv_window_avail < data_len {
                log::warn!("dropping out-of-order seqno={seqno} len={data_len}: recv window full");
                return Placement::Queued;
            }

            let mut cur = self.received.front();
            while let Some(id) = cur {
                if wrapping_lt(seqno, self.received.get(id).seqno) {
                    break;
                }
                cur = self.received.next(id);
            }
            match cur {
                Some(id) => {
                    self.received.insert_before(
                        id,
                        ReceivedSegment {
                            seqno,
                            data: data.to_vec(),
                        },
                    );
                }
                None => {
                    self.received.push_back(ReceivedSegment {
                        seqno,
                        data: data.to_vec(),
                    });
                }
            }
            self.recv_window_avail -= data_len;
            Placement::Queued
        } else {
            // seqno < ackno: duplicate of already-delivered data.
            log::debug!("dropping already-delivered duplicate seqno={seqno}");
            Placement::Queued
        }
    }

    /// Spec §4.3 step 7's "walk `received` in order advancing `ackno`":
    /// after inserting a new in-order segment at `from`, folds in any
    /// entries that were already queued out of order and are now
    /// contiguous. These entries stay in `received` — only `ackno` moves —
    /// so `deliver` can still hand them to the application in order once
    /// it catches up with `next_byte_consume`.
    fn absorb_contiguous_from(&mut self, from: crate::list::NodeId) {
        let mut cur = self.received.next(from);
        while let Some(id) = cur {
            let seg = self.received.get(id);
            if seg.seqno != self.ackno {
                break;
            }
            self.ackno = self.ackno.wrapping_add(seg.data.len() as u32);
            cur = self.received.next(id);
        }
    }

    /// Spec §4.4 `deliver`: walks `received` from the head while it is
    /// contiguous with `next_byte_consume`, handing bytes to the
    /// application until a gap or application back-pressure stops it.
    pub fn deliver(&mut self, app: &mut dyn Application) {
        loop {
            let Some(id) = self.received.front() else {
                break;
            };
            let seqno = self.received.get(id).seqno;
            if seqno != self.next_byte_consume {
                break;
            }
            let data_len = self.received.get(id).data.len();
            if app.free_space() < data_len {
                break;
            }

            let entry = self.received.remove(id);
            app.output(&entry.data);
            self.next_byte_consume = self.next_byte_consume.wrapping_add(data_len as u32);
            self.recv_window_avail += data_len as u32;
        }
    }

    pub fn check_invariants(&self) {
        debug_assert!(!wrapping_lt(self.ackno, self.next_byte_consume));

        let queued_sum: u32 = self.received.iter().map(|s| s.data.len() as u32).sum();
        debug_assert_eq!(self.recv_window_avail + queued_sum, self.recv_window);

        let mut prev: Option<u32> = None;
        for seg in self.received.iter() {
            if let Some(p) = prev {
                debug_assert!(wrapping_lt(p, seg.seqno));
            }
            prev = Some(seg.seqno);
        }
    }
}
