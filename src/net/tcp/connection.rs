//! `TcpConnection`: the application-facing handle over a live PCB
//! (spec §6 Application API).
//!
//! Kept deliberately thin (spec §5 Cancellation: "all handles ...
//! support synchronous reset/deinit"); all durable state lives in the
//! `Pcb` slot it points at, so the handle itself is just a pool
//! reference plus an index and can be dropped and re-acquired freely.

use crate::config::NetConfig;
use crate::net::addr::Ip4Addr;
use crate::net::error::{NetError, NetResult};
use crate::net::ip::MIN_HEADER_LEN as IP_HEADER_LEN;
use crate::net::tcp::pcb::{AllocOutcome, Pcb, PcbPool};
use crate::net::tcp::{TcpState, HEADER_LEN as TCP_HEADER_LEN};

pub struct TcpConnection<'a, const N: usize, const OOSEQ: usize> {
    pool: &'a mut PcbPool<N, OOSEQ>,
    idx: usize,
}

impl<'a, const N: usize, const OOSEQ: usize> TcpConnection<'a, N, OOSEQ> {
    /// Active open (spec §6 `TcpConnection::connect(remote, rcv_buf_size)`).
    ///
    /// `iface_mtu` is the outgoing interface's MTU; the MSS it leaves room
    /// for must clear `MinAllowedMss` or the connection never starts
    /// (spec §7 `NO_HEADER_SPACE`, grounded on `create_connection`'s
    /// `iface_mss < Constants::MinAllowedMss` check).
    pub fn connect<C: NetConfig>(
        pool: &'a mut PcbPool<N, OOSEQ>,
        local_ip: Ip4Addr,
        local_port: u16,
        remote_ip: Ip4Addr,
        remote_port: u16,
        iface_mtu: usize,
        rcv_buf_size: u32,
        iss: u32,
    ) -> NetResult<Self> {
        let iface_mss = iface_mtu.saturating_sub(IP_HEADER_LEN).saturating_sub(TCP_HEADER_LEN);
        if iface_mss < C::MIN_ALLOWED_MSS as usize {
            return Err(NetError::NoHeaderSpace);
        }
        let idx = alloc_slot(pool)?;
        let pcb = pool.get_mut(idx);
        *pcb = Pcb::empty();
        pcb.in_use = true;
        pcb.referenced = true;
        pcb.local_ip = local_ip;
        pcb.local_port = local_port;
        pcb.remote_ip = remote_ip;
        pcb.remote_port = remote_port;
        pcb.state = TcpState::SynSent;
        pcb.snd_una = iss;
        pcb.snd_nxt = iss.wrapping_add(1);
        pcb.rcv_wnd = rcv_buf_size;
        pcb.base_snd_mss = iface_mss as u16;
        Ok(TcpConnection { pool, idx })
    }

    /// Wraps an already-live slot, e.g. one [`super::listener::TcpListener::accept`]
    /// just promoted out of its queue.
    pub fn from_index(pool: &'a mut PcbPool<N, OOSEQ>, idx: usize) -> Self {
        TcpConnection { pool, idx }
    }

    pub fn index(&self) -> usize {
        self.idx
    }

    pub fn pcb(&self) -> &Pcb<OOSEQ> {
        self.pool.get(self.idx)
    }

    pub fn pcb_mut(&mut self) -> &mut Pcb<OOSEQ> {
        self.pool.get_mut(self.idx)
    }

    pub fn state(&self) -> TcpState {
        self.pcb().state
    }

    /// Spec §6 `receive_more(n_bytes_accepted)`.
    pub fn receive_more(&mut self, n_bytes_accepted: u32) {
        self.pcb_mut().receive_more(n_bytes_accepted);
    }

    /// Spec §6 `get_send_buffer_space()`.
    pub fn get_send_buffer_space(&self) -> usize {
        self.pcb().send_buffer_space()
    }

    /// Spec §6 `copy_send(data, len)`.
    pub fn copy_send(&mut self, data: &[u8]) -> usize {
        self.pcb_mut().copy_send(data)
    }

    /// Spec §6 `poke_sending()`.
    pub fn poke_sending(&mut self) {
        self.pcb_mut().poke_sending();
    }

    /// Spec §6 `close`: application-initiated close (spec §4.4 state
    /// machine, active close).
    pub fn close(&mut self) {
        self.pcb_mut().active_close();
    }

    /// Spec §6 `abort`: forces the PCB to CLOSED immediately. The caller
    /// is responsible for sending the RST this implies (spec §4.4
    /// `close from abandoned`); this only updates local state.
    pub fn abort(&mut self) {
        self.pcb_mut().reset_to_closed();
    }
}

fn alloc_slot<const N: usize, const OOSEQ: usize>(pool: &mut PcbPool<N, OOSEQ>) -> NetResult<usize> {
    match pool.allocate() {
        AllocOutcome::Exhausted => Err(NetError::NoPcbAvail),
        AllocOutcome::Reused(idx) => {
            pool.bind(idx);
            Ok(idx)
        }
        AllocOutcome::ForcedOut { index, .. } => {
            pool.bind(index);
            Ok(index)
        }
    }
}
