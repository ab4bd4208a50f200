//! TCP protocol control block (spec §4.4 PCB allocation, State machine).

use heapless::Vec;

use crate::config::{DefaultSizes, NetConfig};
use crate::net::addr::Ip4Addr;
use crate::net::tcp::TcpState;
use crate::time::{Duration, Instant};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PcbFlags: u8 {
        /// Fast-retransmit recovery in progress (spec §4.4 Input processing).
        const RECOVER = 0x01;
        /// An RTT measurement is currently outstanding against `rtt_seq`.
        const RTT_PENDING = 0x02;
    }
}

/// One contiguous out-of-sequence range held in a PCB's `ooseq` list
/// (spec §4.4 Out-of-sequence buffer). `fin` records whether this range's
/// end coincides with a FIN the sender has not yet had acknowledged
/// in-sequence (the dedicated `OOSEQ_FIN` condition).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OosSeg {
    pub start: u32,
    pub end: u32,
    pub fin: bool,
}

pub struct Pcb<const OOSEQ: usize> {
    pub state: TcpState,
    pub local_ip: Ip4Addr,
    pub local_port: u16,
    pub remote_ip: Ip4Addr,
    pub remote_port: u16,

    // Send side.
    pub snd_una: u32,
    pub snd_nxt: u32,
    pub snd_wnd: u32,
    pub snd_mss: u16,
    pub base_snd_mss: u16,
    pub snd_buf_len: u32,
    pub snd_psh_index: u32,
    pub snd_offset: u32,
    /// Bytes the application has queued via [`Pcb::copy_send`] but `pcb_output`
    /// hasn't sent yet; `snd_buf_len` mirrors its length for the window/Nagle
    /// arithmetic in [`crate::net::tcp::output`], which never reads the bytes.
    pub snd_buf: Vec<u8, { DefaultSizes::TCP_SEND_BUF_BYTES }>,

    // Receive side.
    pub rcv_nxt: u32,
    pub rcv_wnd: u32,
    pub rcv_mss: u16,

    // Congestion control / RTT (spec §4.4 Congestion control, Output).
    pub cwnd: u32,
    pub ssthresh: u32,
    pub cwnd_acked: u32,
    pub srtt: i32,
    pub rttvar: i32,
    pub rto: Duration,
    pub rtt_seq: u32,
    pub flags: PcbFlags,

    // Fast retransmit (spec §4.4 Input processing).
    pub num_dupack: u8,
    pub recover: u32,

    // Timers.
    pub rtx_timer_armed: bool,
    pub rtx_deadline: Instant,
    pub abort_timer_armed: bool,
    pub abort_deadline: Instant,

    // Out-of-sequence segments.
    pub ooseq: Vec<OosSeg, OOSEQ>,

    /// Set once the application has called `close`/`abort` or the peer's
    /// FIN has committed us to a FIN of our own (spec §4.4 State machine).
    /// `fin_seq` is the sequence number our FIN occupies, valid only while
    /// `fin_queued` is set.
    pub fin_queued: bool,
    pub fin_seq: u32,

    /// Application reference count; an unreferenced PCB is eligible for
    /// forced teardown under allocation pressure.
    pub referenced: bool,
    pub last_active: Instant,
    pub in_use: bool,
}

impl<const OOSEQ: usize> Pcb<OOSEQ> {
    pub const fn empty() -> Self {
        Pcb {
            state: TcpState::Closed,
            local_ip: Ip4Addr::UNSPECIFIED,
            local_port: 0,
            remote_ip: Ip4Addr::UNSPECIFIED,
            remote_port: 0,
            snd_una: 0,
            snd_nxt: 0,
            snd_wnd: 0,
            snd_mss: 0,
            base_snd_mss: 0,
            snd_buf_len: 0,
            snd_psh_index: 0,
            snd_offset: 0,
            snd_buf: Vec::new(),
            rcv_nxt: 0,
            rcv_wnd: 0,
            rcv_mss: 0,
            cwnd: 0,
            ssthresh: u32::MAX,
            cwnd_acked: 0,
            srtt: 0,
            rttvar: 0,
            rto: Duration::ZERO,
            rtt_seq: 0,
            flags: PcbFlags::empty(),
            num_dupack: 0,
            recover: 0,
            rtx_timer_armed: false,
            rtx_deadline: Instant::ZERO,
            abort_timer_armed: false,
            abort_deadline: Instant::ZERO,
            ooseq: Vec::new(),
            fin_queued: false,
            fin_seq: 0,
            referenced: false,
            last_active: Instant::ZERO,
            in_use: false,
        }
    }

    /// Establishes a connection's MSS and initial congestion window
    /// (spec §4.4 `SYN_SENT -> ESTABLISHED`).
    pub fn establish<C: NetConfig>(&mut self, peer_mss: Option<u16>, iface_mss: u16) {
        self.base_snd_mss = peer_mss.unwrap_or(536).min(iface_mss).max(C::MIN_ALLOWED_MSS);
        self.snd_mss = self.base_snd_mss;
        self.cwnd = C::INITIAL_CWND_SEGS * self.snd_mss as u32;
        self.ssthresh = u32::MAX;
        self.rto = C::MIN_RTX_TIME;
        self.state = TcpState::Established;
    }

    /// Clamps `snd_mss` downward in response to a path-MTU signal,
    /// never below `MinAllowedMss` nor above `base_snd_mss`.
    pub fn apply_mtu_signal<C: NetConfig>(&mut self, suggested_mss: u16) {
        self.snd_mss = suggested_mss.clamp(C::MIN_ALLOWED_MSS, self.base_snd_mss);
    }

    /// Transitions into `TIME_WAIT` (spec §4.4).
    pub fn enter_time_wait<C: NetConfig>(&mut self, now: Instant) {
        self.snd_nxt = self.snd_una;
        self.rtx_timer_armed = false;
        self.state = TcpState::TimeWait;
        self.abort_timer_armed = true;
        self.abort_deadline = now + C::TIME_WAIT_TIME;
    }

    /// `true` once our own FIN (queued by [`Pcb::active_close`]) has been
    /// fully acknowledged by the peer.
    pub fn our_fin_acked(&self) -> bool {
        self.fin_queued && crate::net::tcp::seq_ge(self.snd_una, self.fin_seq.wrapping_add(1))
    }

    /// Application-initiated close (spec §4.4 State machine: active close).
    /// `ESTABLISHED -> FIN_WAIT_1`, `CLOSE_WAIT -> LAST_ACK`. Queues a FIN
    /// at the current end of the send buffer; any later `copy_send` calls
    /// are rejected once `fin_queued` is set.
    pub fn active_close(&mut self) {
        match self.state {
            TcpState::Established => self.state = TcpState::FinWait1,
            TcpState::CloseWait => self.state = TcpState::LastAck,
            _ => return,
        }
        self.fin_seq = self.snd_una.wrapping_add(self.snd_buf_len);
        self.fin_queued = true;
    }

    /// Completes a passive open on the final handshake ACK (spec §4.4
    /// `SYN_RCVD -> ESTABLISHED`). Lighter than [`Pcb::establish`]: MSS and
    /// the initial congestion window were already set up when the listener
    /// accepted the connection.
    pub fn complete_passive_open(&mut self) {
        if self.state == TcpState::SynRcvd {
            self.state = TcpState::Established;
        }
    }

    /// Forces the PCB to CLOSED: either a received RST, or `LAST_ACK`
    /// completing once our own FIN is acknowledged (spec §4.4: "RST ->
    /// CLOSED", "LAST_ACK -> CLOSED").
    pub fn reset_to_closed(&mut self) {
        self.state = TcpState::Closed;
        self.rtx_timer_armed = false;
        self.abort_timer_armed = false;
    }

    /// Handles `close()` on an abandoned PCB (spec §4.4 `close from abandoned`).
    /// Returns `true` if the caller must emit an RST instead of a FIN.
    pub fn close_abandoned<C: NetConfig>(&mut self, now: Instant) -> bool {
        if self.snd_buf_len > 0 || self.state == TcpState::SynSent {
            return true;
        }
        // Push FIN: advance snd_nxt past end-of-buffer happens in output;
        // here we just arm the linger timer and ensure the window is
        // advertised large enough to let the peer finish.
        self.abort_timer_armed = true;
        self.abort_deadline = now + C::ABANDONED_TIMEOUT;
        if self.rcv_wnd < self.rcv_mss as u32 {
            self.rcv_wnd = self.rcv_mss as u32;
        }
        false
    }

    pub fn is_unreferenced_and_free(&self) -> bool {
        self.in_use && !self.referenced && self.state == TcpState::Closed
    }

    /// Spec §6 `get_send_buffer_space()`: room left for [`Pcb::copy_send`].
    /// Zero once a FIN has been queued — sending is closed.
    pub fn send_buffer_space(&self) -> usize {
        if self.fin_queued {
            0
        } else {
            self.snd_buf.capacity() - self.snd_buf.len()
        }
    }

    /// Spec §6 `copy_send(data, len)`: copies as much of `data` as fits
    /// into the remaining send-buffer space and returns the number of
    /// bytes actually accepted. Never blocks and never errors; a caller
    /// that needs all of `data` queued checks [`Pcb::send_buffer_space`]
    /// first.
    pub fn copy_send(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.send_buffer_space());
        let _ = self.snd_buf.extend_from_slice(&data[..n]);
        self.snd_buf_len = self.snd_buf.len() as u32;
        n
    }

    /// Spec §6 `poke_sending()`: forces the push index to the end of the
    /// send buffer, so `next_segment`'s Nagle check stops delaying on the
    /// next call.
    pub fn poke_sending(&mut self) {
        self.snd_psh_index = self.snd_buf_len;
    }

    /// Spec §6 `receive_more(n_bytes_accepted)`: the application has
    /// drained that many bytes from its own receive buffer, so the
    /// advertised window can grow back by the same amount.
    pub fn receive_more(&mut self, n_bytes_accepted: u32) {
        self.rcv_wnd = self.rcv_wnd.saturating_add(n_bytes_accepted);
    }
}

impl<const OOSEQ: usize> Default for Pcb<OOSEQ> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Fixed pool of `N` PCBs, each with an `OOSEQ`-entry out-of-sequence
/// list. Allocation follows spec §4.4: reuse an unreferenced CLOSED PCB
/// (most-recently-used first, to keep cache-warm reuse), else force out
/// the oldest unreferenced non-protected PCB with an RST.
pub struct PcbPool<const N: usize, const OOSEQ: usize> {
    pcbs: [Pcb<OOSEQ>; N],
    /// MRU-ordered list of in-use slot indices; unused slots aren't listed.
    mru: Vec<u8, N>,
}

pub enum AllocOutcome {
    /// A free slot, ready to use, no RST required.
    Reused(usize),
    /// The oldest unreferenced PCB was forced closed; caller must send
    /// an RST to that PCB's peer (unless its state suppressed it) before
    /// reusing the slot.
    ForcedOut { index: usize, send_rst: bool },
    /// No PCB is available for allocation at all (spec: `NoPcbAvail`).
    Exhausted,
}

impl<const N: usize, const OOSEQ: usize> PcbPool<N, OOSEQ> {
    pub fn new() -> Self {
        PcbPool {
            pcbs: core::array::from_fn(|_| Pcb::empty()),
            mru: Vec::new(),
        }
    }

    pub fn get(&self, idx: usize) -> &Pcb<OOSEQ> {
        &self.pcbs[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Pcb<OOSEQ> {
        &mut self.pcbs[idx]
    }

    fn touch_mru(&mut self, idx: u8) {
        if let Some(pos) = self.mru.iter().position(|&x| x == idx) {
            let len = self.mru.len();
            for i in pos..len - 1 {
                self.mru[i] = self.mru[i + 1];
            }
            self.mru.pop();
        }
        let _ = self.mru.push(idx);
        let len = self.mru.len();
        for i in (1..len).rev() {
            self.mru[i] = self.mru[i - 1];
        }
        self.mru[0] = idx;
    }

    /// Finds a slot for a new connection per spec §4.4 PCB allocation.
    pub fn allocate(&mut self) -> AllocOutcome {
        if let Some(i) = self.pcbs.iter().position(|p| !p.in_use) {
            return AllocOutcome::Reused(i);
        }
        // Among in-use PCBs, find the MRU-most unreferenced CLOSED one first.
        for &idx in self.mru.iter() {
            if self.pcbs[idx as usize].is_unreferenced_and_free() {
                return AllocOutcome::Reused(idx as usize);
            }
        }
        // Tear down the oldest (LRU tail) unreferenced PCB.
        for &idx in self.mru.iter().rev() {
            let pcb = &self.pcbs[idx as usize];
            if !pcb.referenced {
                return AllocOutcome::ForcedOut {
                    index: idx as usize,
                    send_rst: !pcb.state.suppresses_forced_rst(),
                };
            }
        }
        AllocOutcome::Exhausted
    }

    pub fn bind(&mut self, idx: usize) {
        self.pcbs[idx].in_use = true;
        self.touch_mru(idx as u8);
    }

    pub fn release(&mut self, idx: usize) {
        self.pcbs[idx] = Pcb::empty();
        if let Some(pos) = self.mru.iter().position(|&x| x as usize == idx) {
            let len = self.mru.len();
            for i in pos..len - 1 {
                self.mru[i] = self.mru[i + 1];
            }
            self.mru.pop();
        }
    }

    pub fn touch(&mut self, idx: usize) {
        self.touch_mru(idx as u8);
    }

    pub fn find_by_tuple(
        &self,
        local_ip: Ip4Addr,
        local_port: u16,
        remote_ip: Ip4Addr,
        remote_port: u16,
    ) -> Option<usize> {
        self.pcbs.iter().position(|p| {
            p.in_use
                && p.local_ip == local_ip
                && p.local_port == local_port
                && p.remote_ip == remote_ip
                && p.remote_port == remote_port
        })
    }
}

impl<const N: usize, const OOSEQ: usize> Default for PcbPool<N, OOSEQ> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultConfig;

    #[test]
    fn establish_clamps_mss_to_configured_minimum() {
        let mut pcb: Pcb<4> = Pcb::empty();
        pcb.establish::<DefaultConfig>(Some(100), 1500);
        assert_eq!(pcb.snd_mss, DefaultConfig::MIN_ALLOWED_MSS);
    }

    #[test]
    fn allocate_reuses_free_slot_before_forcing_anything() {
        let mut pool: PcbPool<2, 2> = PcbPool::new();
        match pool.allocate() {
            AllocOutcome::Reused(_) => {}
            _ => panic!("expected a free slot"),
        }
    }

    #[test]
    fn allocate_forces_out_oldest_unreferenced_when_full() {
        let mut pool: PcbPool<2, 2> = PcbPool::new();
        pool.bind(0);
        pool.get_mut(0).state = TcpState::Established;
        pool.bind(1);
        pool.get_mut(1).state = TcpState::Established;
        match pool.allocate() {
            AllocOutcome::ForcedOut { index, send_rst } => {
                assert_eq!(index, 0);
                assert!(send_rst);
            }
            _ => panic!("expected forced eviction"),
        }
    }

    #[test]
    fn active_close_from_established_queues_fin_at_buffer_end() {
        let mut pcb: Pcb<4> = Pcb::empty();
        pcb.state = TcpState::Established;
        pcb.snd_una = 1000;
        pcb.snd_buf_len = 50;
        pcb.active_close();
        assert_eq!(pcb.state, TcpState::FinWait1);
        assert_eq!(pcb.fin_seq, 1050);
        assert!(pcb.fin_queued);
    }

    #[test]
    fn active_close_from_close_wait_goes_to_last_ack() {
        let mut pcb: Pcb<4> = Pcb::empty();
        pcb.state = TcpState::CloseWait;
        pcb.active_close();
        assert_eq!(pcb.state, TcpState::LastAck);
    }

    #[test]
    fn our_fin_acked_requires_ack_past_fin_sequence() {
        let mut pcb: Pcb<4> = Pcb::empty();
        pcb.state = TcpState::Established;
        pcb.snd_una = 1000;
        pcb.snd_buf_len = 0;
        pcb.active_close();
        assert!(!pcb.our_fin_acked());
        pcb.snd_una = 1001;
        assert!(pcb.our_fin_acked());
    }

    #[test]
    fn complete_passive_open_only_applies_from_syn_rcvd() {
        let mut pcb: Pcb<4> = Pcb::empty();
        pcb.state = TcpState::SynRcvd;
        pcb.complete_passive_open();
        assert_eq!(pcb.state, TcpState::Established);

        let mut other: Pcb<4> = Pcb::empty();
        other.state = TcpState::Listen;
        other.complete_passive_open();
        assert_eq!(other.state, TcpState::Listen);
    }

    #[test]
    fn copy_send_fills_up_to_remaining_capacity() {
        let mut pcb: Pcb<4> = Pcb::empty();
        let cap = pcb.send_buffer_space();
        let data = [7u8; 16];
        assert_eq!(pcb.copy_send(&data), 16);
        assert_eq!(pcb.snd_buf_len, 16);
        assert_eq!(pcb.send_buffer_space(), cap - 16);
        assert_eq!(&pcb.snd_buf[..], &data[..]);
    }

    #[test]
    fn copy_send_is_rejected_once_fin_is_queued() {
        let mut pcb: Pcb<4> = Pcb::empty();
        pcb.state = TcpState::Established;
        pcb.active_close();
        assert_eq!(pcb.send_buffer_space(), 0);
        assert_eq!(pcb.copy_send(&[1, 2, 3]), 0);
    }

    #[test]
    fn poke_sending_moves_push_index_to_buffer_end() {
        let mut pcb: Pcb<4> = Pcb::empty();
        pcb.copy_send(&[1, 2, 3, 4]);
        assert_eq!(pcb.snd_psh_index, 0);
        pcb.poke_sending();
        assert_eq!(pcb.snd_psh_index, 4);
    }

    #[test]
    fn receive_more_grows_the_advertised_window() {
        let mut pcb: Pcb<4> = Pcb::empty();
        pcb.rcv_wnd = 100;
        pcb.receive_more(50);
        assert_eq!(pcb.rcv_wnd, 150);
    }

    #[test]
    fn syn_sent_suppresses_forced_rst() {
        let mut pool: PcbPool<1, 2> = PcbPool::new();
        pool.bind(0);
        pool.get_mut(0).state = TcpState::SynSent;
        match pool.allocate() {
            AllocOutcome::ForcedOut { send_rst, .. } => assert!(!send_rst),
            _ => panic!("expected forced eviction"),
        }
    }
}
