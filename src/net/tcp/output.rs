//! `pcb_output` and retransmission (spec §4.4 Output, Retransmission).

use crate::config::NetConfig;
use crate::net::tcp::pcb::{Pcb, PcbFlags};
use crate::net::tcp::{seq_ge, TcpFlags};
use crate::time::Duration;

/// One segment's worth of output instructions; the caller builds and
/// sends the actual wire bytes (this module never touches buffers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentToSend {
    pub seq: u32,
    pub len: u32,
    pub flags: TcpFlags,
    pub is_retransmit: bool,
}

/// Decides the next segment (if any) `pcb_output` should emit, honoring
/// the window, `snd_mss`, and Nagle's delay condition (spec §4.4 Output).
///
/// `sending_open` is true while the application may still append to the
/// send buffer (false once a FIN has been queued).
pub fn next_segment<const OOSEQ: usize>(
    pcb: &Pcb<OOSEQ>,
    fin_queued: bool,
    sending_open: bool,
) -> Option<SegmentToSend> {
    let in_flight = pcb.snd_nxt.wrapping_sub(pcb.snd_una);
    let window = pcb.snd_wnd.min(pcb.cwnd);
    if in_flight >= window && window > 0 {
        return None;
    }
    let avail = pcb.snd_buf_len.saturating_sub(pcb.snd_nxt.wrapping_sub(pcb.snd_una));
    if avail == 0 {
        if fin_queued && !fin_already_sent(pcb) {
            return Some(SegmentToSend {
                seq: pcb.snd_nxt,
                len: 0,
                flags: TcpFlags::ACK | TcpFlags::FIN,
                is_retransmit: false,
            });
        }
        if window == 0 && in_flight == 0 {
            // Zero-window probe: 1-byte segment to elicit a window update.
            return Some(SegmentToSend {
                seq: pcb.snd_nxt,
                len: 1,
                flags: TcpFlags::ACK,
                is_retransmit: false,
            });
        }
        return None;
    }

    let window_allowed = window.saturating_sub(in_flight);
    let len = avail.min(pcb.snd_mss as u32).min(window_allowed);
    if len == 0 {
        return None;
    }

    let nagle_holds = pcb.snd_buf_len < pcb.snd_mss as u32
        && pcb.snd_psh_index <= pcb.snd_offset
        && sending_open
        && in_flight > 0;
    if nagle_holds {
        return None;
    }

    let mut flags = TcpFlags::ACK;
    let seg_end = pcb.snd_nxt.wrapping_add(len);
    if seq_ge(pcb.snd_una.wrapping_add(pcb.snd_psh_index), pcb.snd_nxt)
        && !seq_ge(pcb.snd_una.wrapping_add(pcb.snd_psh_index), seg_end)
    {
        flags |= TcpFlags::PSH;
    }
    if fin_queued && len == avail && !sending_open {
        flags |= TcpFlags::FIN;
    }

    Some(SegmentToSend {
        seq: pcb.snd_nxt,
        len,
        flags,
        is_retransmit: false,
    })
}

fn fin_already_sent<const OOSEQ: usize>(pcb: &Pcb<OOSEQ>) -> bool {
    matches!(
        pcb.state,
        crate::net::tcp::TcpState::FinWait1
            | crate::net::tcp::TcpState::FinWait2
            | crate::net::tcp::TcpState::Closing
            | crate::net::tcp::TcpState::LastAck
            | crate::net::tcp::TcpState::TimeWait
    )
}

/// Starts an RTT measurement against the current `snd_nxt` if none is
/// already pending (spec §4.4 Output).
pub fn maybe_start_rtt_measurement<const OOSEQ: usize>(pcb: &mut Pcb<OOSEQ>) {
    if !pcb.flags.contains(PcbFlags::RTT_PENDING) {
        pcb.flags.insert(PcbFlags::RTT_PENDING);
        pcb.rtt_seq = pcb.snd_nxt;
    }
}

/// Updates `srtt`/`rttvar`/`rto` from one completed RTT sample using the
/// classic Jacobson/Karels smoothed estimator in fixed-point (spec §4.4
/// Output: "scaled units, no float"). `srtt`/`rttvar` are kept left-shifted
/// by 3 and 2 respectively (the usual RFC 6298 scaling), so the update is
/// pure integer add/shift, no division.
pub fn update_rtt_estimate<C: NetConfig, const OOSEQ: usize>(pcb: &mut Pcb<OOSEQ>, sample: Duration) {
    let m = sample.ticks() as i32;
    if pcb.srtt == 0 && pcb.rttvar == 0 {
        pcb.srtt = m << 3;
        pcb.rttvar = m << 1;
    } else {
        let mut m = m;
        m -= pcb.srtt >> 3;
        pcb.srtt += m;
        if m < 0 {
            m = -m;
        }
        m -= pcb.rttvar >> 2;
        pcb.rttvar += m;
    }
    let rto_ticks = (pcb.srtt >> 3) + (pcb.rttvar).max(1);
    let rto = Duration::from_ticks(rto_ticks.max(0) as u32);
    pcb.rto = clamp_rto::<C>(rto);
}

fn clamp_rto<C: NetConfig>(rto: Duration) -> Duration {
    if rto.ticks() < C::MIN_RTX_TIME.ticks() {
        C::MIN_RTX_TIME
    } else if rto.ticks() > C::MAX_RTX_TIME.ticks() {
        C::MAX_RTX_TIME
    } else {
        rto
    }
}

/// Builds the single retransmitted segment on RTO (spec §4.4
/// Retransmission): `min(snd_mss, max(1, snd_wnd))` bytes from `snd_una`,
/// doubling `rto` (saturating at `MaxRtxTime`) for the re-arm.
pub fn retransmit_on_timeout<C: NetConfig, const OOSEQ: usize>(pcb: &mut Pcb<OOSEQ>) -> SegmentToSend {
    let len = (pcb.snd_mss as u32).min(pcb.snd_wnd.max(1));
    pcb.rto = clamp_rto::<C>(pcb.rto.saturating_double());
    SegmentToSend {
        seq: pcb.snd_una,
        len,
        flags: TcpFlags::ACK,
        is_retransmit: true,
    }
}
