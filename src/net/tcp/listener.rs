//! `TcpListener` and its accept queue (spec §4.4 Listener and accept queue).

use heapless::Vec;

use crate::config::NetConfig;
use crate::net::addr::Ip4Addr;
use crate::net::error::{NetError, NetResult};
use crate::net::tcp::connection::TcpConnection;
use crate::net::tcp::pcb::{AllocOutcome, Pcb, PcbPool};
use crate::net::tcp::TcpState;
use crate::time::{Duration, Instant};

/// A SYN_RCVD connection waiting for the application to accept it, or
/// for its queue slot to time out.
#[derive(Debug, Clone, Copy)]
pub struct QueuedConn {
    pub remote_ip: Ip4Addr,
    pub remote_port: u16,
    pub irs: u32,
    pub iss: u32,
    pub enqueued_at: Instant,
}

/// `local_ip = None` means "bound to all interfaces" (spec's `local_ip=0`).
pub struct TcpListener<const QUEUE: usize> {
    pub local_ip: Option<Ip4Addr>,
    pub local_port: u16,
    pub max_pcbs: u16,
    pub live_pcbs: u16,
    queue: Vec<QueuedConn, QUEUE>,
    pub queue_timeout: Duration,
    pub in_use: bool,
}

impl<const QUEUE: usize> TcpListener<QUEUE> {
    pub const fn empty() -> Self {
        TcpListener {
            local_ip: None,
            local_port: 0,
            max_pcbs: 0,
            live_pcbs: 0,
            queue: Vec::new(),
            queue_timeout: Duration::ZERO,
            in_use: false,
        }
    }

    pub fn accepts(&self, local_ip: Ip4Addr, local_port: u16) -> bool {
        self.in_use
            && self.local_port == local_port
            && self.local_ip.map_or(true, |ip| ip == local_ip)
    }

    /// Enqueues a new SYN whose live-PCB accept wasn't taken synchronously.
    /// Returns `false` if the queue is full (caller must drop the SYN).
    pub fn enqueue(&mut self, conn: QueuedConn) -> bool {
        self.queue.push(conn).is_ok()
    }

    /// Dequeues the oldest queued connection (spec: "the oldest is
    /// dequeued first on a dequeue event").
    pub fn dequeue_oldest(&mut self) -> Option<QueuedConn> {
        if self.queue.is_empty() {
            return None;
        }
        let conn = self.queue[0];
        let len = self.queue.len();
        for i in 0..len - 1 {
            self.queue[i] = self.queue[i + 1];
        }
        self.queue.pop();
        Some(conn)
    }

    /// Drops queue entries older than `queue_timeout`.
    pub fn expire_queue(&mut self, now: Instant) {
        let timeout = self.queue_timeout;
        let mut kept: Vec<QueuedConn, QUEUE> = Vec::new();
        for c in self.queue.iter() {
            if now.wrapping_duration_since(c.enqueued_at) < timeout {
                let _ = kept.push(*c);
            }
        }
        self.queue = kept;
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Spec §6 `TcpListener::accept(conn)`, "called from accept callback
    /// or from dequeue callback". Promotes `conn` into a live SYN_RCVD
    /// PCB and raises `rcv_wnd` to `rcv_buf_size` (spec §4.4 Listener:
    /// "Converting a queued entry into a live connection raises rcv_wnd
    /// to the requested size"). `iface_mss` gets the same floor
    /// [`TcpConnection::connect`] enforces on the active side.
    pub fn accept<'a, C: NetConfig, const N: usize, const OOSEQ: usize>(
        &mut self,
        pool: &'a mut PcbPool<N, OOSEQ>,
        conn: QueuedConn,
        local_ip: Ip4Addr,
        rcv_buf_size: u32,
        iface_mss: u16,
    ) -> NetResult<TcpConnection<'a, N, OOSEQ>> {
        if iface_mss < C::MIN_ALLOWED_MSS {
            return Err(NetError::NoHeaderSpace);
        }
        let idx = match pool.allocate() {
            AllocOutcome::Exhausted => return Err(NetError::NoPcbAvail),
            AllocOutcome::Reused(idx) => idx,
            AllocOutcome::ForcedOut { index, .. } => index,
        };
        pool.bind(idx);
        let pcb = pool.get_mut(idx);
        *pcb = Pcb::empty();
        pcb.in_use = true;
        pcb.referenced = true;
        pcb.local_ip = local_ip;
        pcb.local_port = self.local_port;
        pcb.remote_ip = conn.remote_ip;
        pcb.remote_port = conn.remote_port;
        pcb.state = TcpState::SynRcvd;
        pcb.rcv_nxt = conn.irs.wrapping_add(1);
        pcb.rcv_wnd = rcv_buf_size;
        pcb.snd_una = conn.iss;
        pcb.snd_nxt = conn.iss.wrapping_add(1);
        pcb.base_snd_mss = iface_mss;
        self.live_pcbs += 1;
        Ok(TcpConnection::from_index(pool, idx))
    }
}

impl<const QUEUE: usize> Default for TcpListener<QUEUE> {
    fn default() -> Self {
        Self::empty()
    }
}
