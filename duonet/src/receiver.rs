//! Reliable receiver: reorder buffer, contiguous delivery, and
//! cumulative/SACK feedback generation. Keyed-by-sequence storage, using a
//! `BTreeMap` rather than a fixed-size ring since the reorder buffer here
//! holds full payloads and needs ordered iteration to build merged SACK
//! ranges.
use crate::util::{sequence_greater_than, sequence_less_than};
use std::collections::BTreeMap;

/// Reassembles one reliable byte stream out of out-of-order DATA segments.
pub struct ReliableReceiver {
    rcv_base: u32,
    reorder: BTreeMap<u32, Vec<u8>>,
    delivery: Vec<u8>,
    window: u32,
    sack_enabled: bool,
    sack_max_blocks: usize,
    feedback_due: bool,
}

/// One merged, contiguous, out-of-order range held in the reorder buffer.
pub type SackBlock = (u32, u32);

/// Feedback the receiver wants emitted after processing a DATA packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub ack_no: u32,
    pub recv_window: u16,
    pub sack_blocks: Vec<SackBlock>,
}

impl ReliableReceiver {
    pub fn new(window: u32, sack_enabled: bool, sack_max_blocks: usize) -> Self {
        Self {
            rcv_base: 0,
            reorder: BTreeMap::new(),
            delivery: Vec::new(),
            window,
            sack_enabled,
            sack_max_blocks,
            feedback_due: false,
        }
    }

    /// Processes one arriving reliable DATA segment. Always schedules a
    /// feedback emission (duplicates included, to keep the peer's view of
    /// `rcv_base` current even when nothing new was absorbed).
    pub fn on_data(&mut self, seq_no: u32, payload: &[u8]) {
        self.feedback_due = true;

        if sequence_less_than(seq_no, self.rcv_base) {
            return; // duplicate below the frontier
        }

        if seq_no == self.rcv_base {
            self.delivery.extend_from_slice(payload);
            self.rcv_base = self.rcv_base.wrapping_add(1);
            while let Some(next) = self.reorder.remove(&self.rcv_base) {
                self.delivery.extend_from_slice(&next);
                self.rcv_base = self.rcv_base.wrapping_add(1);
            }
            return;
        }

        let distance = seq_no.wrapping_sub(self.rcv_base);
        if sequence_greater_than(seq_no, self.rcv_base) && distance < self.window {
            self.reorder.entry(seq_no).or_insert_with(|| payload.to_vec());
        }
        // otherwise outside the receive window: dropped
    }

    /// Returns up to `max_bytes` of contiguously delivered application bytes.
    pub fn recv(&mut self, max_bytes: usize) -> Vec<u8> {
        let take = max_bytes.min(self.delivery.len());
        self.delivery.drain(..take).collect()
    }

    /// Builds the single feedback packet due after the last `on_data` call,
    /// if any, and clears the pending flag.
    pub fn take_feedback(&mut self) -> Option<Feedback> {
        if !self.feedback_due {
            return None;
        }
        self.feedback_due = false;

        let recv_window = self.window.saturating_sub(self.reorder.len() as u32).min(u16::MAX as u32) as u16;

        if !self.sack_enabled || self.reorder.is_empty() {
            return Some(Feedback {
                ack_no: self.rcv_base,
                recv_window,
                sack_blocks: Vec::new(),
            });
        }

        let sack_blocks = self.build_sack_blocks();
        Some(Feedback {
            ack_no: self.rcv_base,
            recv_window,
            sack_blocks,
        })
    }

    /// Merges the reorder buffer's keys into closed ranges, strictly above
    /// `rcv_base`, sorted and non-overlapping (I5), capped to
    /// `sack_max_blocks` by keeping the highest-sequence ranges — the ranges
    /// most likely to still be useful to the sender's fast-repair logic.
    fn build_sack_blocks(&self) -> Vec<SackBlock> {
        let mut blocks: Vec<SackBlock> = Vec::new();
        for &seq in self.reorder.keys() {
            match blocks.last_mut() {
                Some((_, end)) if seq == end.wrapping_add(1) => {
                    *end = seq;
                }
                _ => blocks.push((seq, seq)),
            }
        }
        if blocks.len() > self.sack_max_blocks {
            let drop = blocks.len() - self.sack_max_blocks;
            blocks.drain(0..drop);
        }
        blocks
    }

    pub fn rcv_base(&self) -> u32 {
        self.rcv_base
    }

    pub fn reorder_buffer_occupancy(&self) -> usize {
        self.reorder.len()
    }

    pub fn pending_delivery_bytes(&self) -> usize {
        self.delivery.len()
    }
}
