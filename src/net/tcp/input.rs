//! `pcb_input`: per-segment processing against an active PCB (spec §4.4
//! Input processing).

use heapless::Vec;

use crate::config::NetConfig;
use crate::log_macros::core_debug;
use crate::net::tcp::pcb::{OosSeg, Pcb, PcbFlags};
use crate::net::tcp::{is_seq_acceptable, seq_ge, seq_gt, TcpFlags, TcpHeader, TcpState};
use crate::time::Instant;

/// What the caller must do after processing one inbound segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputOutcome {
    /// New in-sequence bytes became available for the application to read.
    pub data_ready: bool,
    /// A FIN was consumed in-sequence (half-close signaled to the app).
    pub fin_received: bool,
    /// Caller should drive `pcb_output` (new ack advanced send window,
    /// or fast retransmit needs a segment sent immediately).
    pub trigger_output: bool,
    /// Fast retransmit was entered this call.
    pub entered_fast_rtx: bool,
    /// An in-window RST was accepted; the PCB moved straight to CLOSED and
    /// nothing else in this segment was processed.
    pub reset_received: bool,
}

/// Processes one inbound segment against `pcb`. `seg_len` is the segment's
/// data length (payload bytes, FIN counts as one extra sequence number
/// handled separately by the caller via `has_fin`). `now` is only
/// consulted when the segment drives a transition that arms a timer
/// (entering TIME_WAIT).
pub fn pcb_input<C: NetConfig, const OOSEQ: usize>(
    pcb: &mut Pcb<OOSEQ>,
    hdr: &TcpHeader,
    seg_len: u32,
    now: Instant,
) -> InputOutcome {
    let mut outcome = InputOutcome::default();
    let has_fin = hdr.flags.contains(TcpFlags::FIN);
    let effective_len = seg_len + has_fin as u32;

    if hdr.flags.contains(TcpFlags::RST) && is_seq_acceptable(hdr.seq, 0, pcb.rcv_nxt, pcb.rcv_wnd) {
        pcb.reset_to_closed();
        outcome.reset_received = true;
        core_debug!("tcp: accepted in-window RST, pcb -> CLOSED");
        return outcome;
    }

    if !is_seq_acceptable(hdr.seq, effective_len, pcb.rcv_nxt, pcb.rcv_wnd) {
        return outcome;
    }

    if hdr.flags.contains(TcpFlags::ACK) {
        process_ack::<C, OOSEQ>(pcb, hdr.ack, now, &mut outcome);
    }

    if hdr.seq == pcb.rcv_nxt {
        pcb.rcv_nxt = pcb.rcv_nxt.wrapping_add(seg_len);
        if seg_len > 0 {
            outcome.data_ready = true;
        }
        drain_ooseq_from_rcv_nxt(pcb, &mut outcome);
        if has_fin && hdr.seq.wrapping_add(seg_len) == pcb.rcv_nxt {
            pcb.rcv_nxt = pcb.rcv_nxt.wrapping_add(1);
            outcome.fin_received = true;
        }
    } else if seg_len > 0 || has_fin {
        insert_ooseq::<OOSEQ>(pcb, hdr.seq, effective_len, has_fin);
    }

    if outcome.fin_received {
        apply_fin_transition::<C, OOSEQ>(pcb, now);
    }

    outcome
}

/// Drives the FIN-received half of the state machine (spec §4.4 State
/// machine: `ESTABLISHED -> CLOSE_WAIT`, `FIN_WAIT_1 -> CLOSING`/`TIME_WAIT`,
/// `FIN_WAIT_2 -> TIME_WAIT`). A FIN arriving in any other state is a
/// retransmission of one already processed and is ignored.
fn apply_fin_transition<C: NetConfig, const OOSEQ: usize>(pcb: &mut Pcb<OOSEQ>, now: Instant) {
    match pcb.state {
        TcpState::Established => pcb.state = TcpState::CloseWait,
        TcpState::FinWait1 => {
            if pcb.our_fin_acked() {
                pcb.enter_time_wait::<C>(now);
            } else {
                pcb.state = TcpState::Closing;
            }
        }
        TcpState::FinWait2 => pcb.enter_time_wait::<C>(now),
        _ => {}
    }
}

/// Records an out-of-order range, merging with any overlapping/adjacent
/// existing range (spec §4.4 Out-of-sequence buffer).
fn insert_ooseq<const OOSEQ: usize>(pcb: &mut Pcb<OOSEQ>, seq: u32, len: u32, fin: bool) {
    let start = seq;
    let end = seq.wrapping_add(len);
    let mut merged = OosSeg { start, end, fin };
    let mut kept: Vec<OosSeg, OOSEQ> = Vec::new();
    for existing in pcb.ooseq.iter() {
        let overlaps = seq_ge(merged.end, existing.start) && seq_ge(existing.end, merged.start);
        if overlaps {
            merged.start = if seq_gt(existing.start, merged.start) { merged.start } else { existing.start };
            merged.end = if seq_gt(existing.end, merged.end) { existing.end } else { merged.end };
            merged.fin |= existing.fin;
        } else if kept.push(*existing).is_err() {
            return;
        }
    }
    if kept.push(merged).is_err() {
        // Buffer is full and the merged range can't fit: drop the new
        // segment (spec §4.4: "Overflow drops the new segment").
        return;
    }
    pcb.ooseq = kept;
}

/// Consumes any ooseq ranges that now abut `rcv_nxt`, possibly draining
/// through several merged ranges in one call.
fn drain_ooseq_from_rcv_nxt<const OOSEQ: usize>(pcb: &mut Pcb<OOSEQ>, outcome: &mut InputOutcome) {
    loop {
        let Some(pos) = pcb.ooseq.iter().position(|r| r.start == pcb.rcv_nxt) else {
            break;
        };
        let range = pcb.ooseq[pos];
        pcb.rcv_nxt = range.end;
        outcome.data_ready = true;
        if range.fin {
            pcb.rcv_nxt = pcb.rcv_nxt.wrapping_add(1);
            outcome.fin_received = true;
        }
        let _ = remove_ooseq_at(pcb, pos);
    }
}

fn remove_ooseq_at<const OOSEQ: usize>(pcb: &mut Pcb<OOSEQ>, pos: usize) -> OosSeg {
    let len = pcb.ooseq.len();
    let removed = pcb.ooseq[pos];
    for i in pos..len - 1 {
        pcb.ooseq[i] = pcb.ooseq[i + 1];
    }
    pcb.ooseq.pop();
    removed
}

/// Advances `snd_una` on new data being acknowledged, tracks duplicate
/// ACKs, enters fast retransmit once the threshold is reached, and drives
/// the ACK-triggered half of the state machine: `SYN_RCVD -> ESTABLISHED`
/// on the handshake's final ACK, `FIN_WAIT_1 -> FIN_WAIT_2`,
/// `CLOSING -> TIME_WAIT`, and `LAST_ACK -> CLOSED` once our own FIN is
/// acknowledged (spec §4.4 Input processing, State machine).
fn process_ack<C: NetConfig, const OOSEQ: usize>(pcb: &mut Pcb<OOSEQ>, ack: u32, now: Instant, outcome: &mut InputOutcome) {
    let dup_ack_limit = (1u32 << C::DUP_ACK_BITS) - 1;
    if seq_gt(ack, pcb.snd_una) && !seq_gt(ack, pcb.snd_nxt) {
        let newly_acked = ack.wrapping_sub(pcb.snd_una);
        pcb.snd_una = ack;
        pcb.snd_buf_len = pcb.snd_buf_len.saturating_sub(newly_acked);
        pcb.num_dupack = 0;
        outcome.trigger_output = true;

        if pcb.flags.contains(PcbFlags::RTT_PENDING) && seq_ge(ack, pcb.rtt_seq) {
            pcb.flags.remove(PcbFlags::RTT_PENDING);
        }

        if pcb.flags.contains(PcbFlags::RECOVER) {
            if seq_ge(ack, pcb.recover) {
                pcb.flags.remove(PcbFlags::RECOVER);
            } else {
                // Partial ACK below `recover`: retransmit one segment
                // each time (handled by the caller's output step, which
                // checks `RECOVER` plus a freshly-reduced `snd_una`).
            }
        } else if pcb.cwnd < pcb.ssthresh {
            pcb.cwnd += pcb.snd_mss as u32;
        } else {
            pcb.cwnd_acked += newly_acked;
            if pcb.cwnd_acked >= pcb.cwnd {
                pcb.cwnd_acked -= pcb.cwnd;
                pcb.cwnd += pcb.snd_mss as u32;
            }
        }

        if pcb.state == TcpState::SynRcvd {
            pcb.complete_passive_open();
        } else if pcb.our_fin_acked() {
            match pcb.state {
                TcpState::FinWait1 => pcb.state = TcpState::FinWait2,
                TcpState::Closing => pcb.enter_time_wait::<C>(now),
                TcpState::LastAck => pcb.reset_to_closed(),
                _ => {}
            }
        }
    } else if ack == pcb.snd_una && pcb.snd_una != pcb.snd_nxt {
        pcb.num_dupack = pcb.num_dupack.saturating_add(1).min(dup_ack_limit as u8);
        if pcb.num_dupack as u32 >= C::FAST_RTX_DUP_ACKS as u32 && !pcb.flags.contains(PcbFlags::RECOVER) {
            pcb.ssthresh = (pcb.cwnd / 2).max(2 * pcb.snd_mss as u32);
            pcb.cwnd = pcb.ssthresh + 3 * pcb.snd_mss as u32;
            pcb.recover = pcb.snd_nxt;
            pcb.flags.insert(PcbFlags::RECOVER);
            outcome.entered_fast_rtx = true;
            outcome.trigger_output = true;
            core_debug!(
                "tcp: entering fast retransmit, cwnd={} ssthresh={} recover={}",
                pcb.cwnd, pcb.ssthresh, pcb.recover
            );
        }
    }
}

/// Handles a retransmission timeout (spec §4.4 Congestion control: "On RTO").
pub fn on_rto<const OOSEQ: usize>(pcb: &mut Pcb<OOSEQ>) {
    pcb.ssthresh = (pcb.cwnd / 2).max(2 * pcb.snd_mss as u32);
    pcb.cwnd = pcb.snd_mss as u32;
    pcb.cwnd_acked = 0;
    pcb.flags.remove(PcbFlags::RECOVER);
    pcb.snd_nxt = pcb.snd_una;
}
