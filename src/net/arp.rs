//! ARP cache and resolution (spec §3 ARP entry, §4.2).
//!
//! `ArpCache<N, W>` holds `N` fixed entry slots and up to `W` queued
//! send-retry waiters per entry. Every entry is on exactly one of two
//! logical lists — `free` (a stack of free slot indices) or `used` (an
//! MRU-ordered vector of slot indices, index 0 = most recently used) —
//! which is the array-of-indices translation of the source's intrusive
//! doubly linked list (spec §9 REDESIGN FLAGS).

use heapless::Vec;

use crate::log_macros::core_debug;
use crate::net::addr::Ip4Addr;
use crate::net::error::NetError;
use crate::net::eth::MacAddr;
use crate::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpState {
    Free,
    Query,
    Valid,
    Refreshing,
}

/// Opaque handle a caller attaches to a queued send so it can recognize
/// its own retry notification when [`ArpCache::poll_timer`] or
/// [`ArpCache::handle_reply`] reports resolution (spec §4.2: "append
/// caller's retry request to the entry's waiter list").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendRetryHandle(pub u32);

struct ArpEntry<const W: usize> {
    state: ArpState,
    weak: bool,
    ip: Ip4Addr,
    mac: MacAddr,
    attempts_left: u8,
    timer_time: Instant,
    timer_active: bool,
    waiters: Vec<SendRetryHandle, W>,
}

impl<const W: usize> ArpEntry<W> {
    const fn new() -> Self {
        ArpEntry {
            state: ArpState::Free,
            weak: true,
            ip: Ip4Addr::UNSPECIFIED,
            mac: MacAddr::ZERO,
            attempts_left: 0,
            timer_time: Instant::ZERO,
            timer_active: false,
            waiters: Vec::new(),
        }
    }
}

/// Outcome of [`ArpCache::resolve`].
pub enum Resolution {
    /// Cached MAC address is available right now.
    Resolved(MacAddr),
    /// No entry existed; one was allocated and a query started. The
    /// caller's `waiter` was queued (or dropped if the waiter list was
    /// full — spec doesn't define backpressure here beyond "queue").
    QueryStarted,
    /// An entry already exists and is mid-query; the waiter was queued
    /// onto it.
    AlreadyPending,
    /// The next hop can never be resolved to a MAC address: `0.0.0.0`, or
    /// an address outside the interface's subnet (spec §4.2 step 2).
    Failed(NetError),
}

/// An action the embedder must perform as a result of cache bookkeeping
/// (broadcasting or unicasting an ARP request). The cache never touches
/// the driver itself (spec §5: user state is owned by the event loop,
/// not by timer-internal bookkeeping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpAction {
    BroadcastRequest { target: Ip4Addr },
    UnicastRequest { target: Ip4Addr, target_mac: MacAddr },
}

pub struct ArpCache<const N: usize, const W: usize> {
    entries: [ArpEntry<W>; N],
    free: Vec<u8, N>,
    /// MRU-ordered; `used[0]` is most recently used.
    used: Vec<u8, N>,
    protect_count: usize,
}

impl<const N: usize, const W: usize> ArpCache<N, W> {
    pub fn new(protect_count: usize) -> Self {
        let mut free = Vec::new();
        for i in 0..N {
            let _ = free.push(i as u8);
        }
        ArpCache {
            entries: core::array::from_fn(|_| ArpEntry::new()),
            free,
            used: Vec::new(),
            protect_count: protect_count.min(N),
        }
    }

    /// Removes the element at `pos`, shifting the tail left (heapless
    /// `Vec` has no `remove`, only `swap_remove`, which would disturb MRU
    /// order).
    fn remove_at(&mut self, pos: usize) -> u8 {
        let len = self.used.len();
        for i in pos..len - 1 {
            self.used[i] = self.used[i + 1];
        }
        self.used.pop().unwrap()
    }

    /// Inserts `idx` at the front, shifting everything else right
    /// (heapless `Vec` has no `insert`).
    fn push_front(&mut self, idx: u8) {
        let _ = self.used.push(idx);
        let len = self.used.len();
        for i in (1..len).rev() {
            self.used[i] = self.used[i - 1];
        }
        self.used[0] = idx;
    }

    fn touch_mru(&mut self, idx: u8) {
        if let Some(pos) = self.used.iter().position(|&x| x == idx) {
            self.remove_at(pos);
        }
        // used is bounded by N and idx was either already present (just
        // removed, freeing a slot) or came from `free`, so this always fits.
        self.push_front(idx);
    }

    fn num_hard(&self) -> usize {
        self.used
            .iter()
            .filter(|&&i| !self.entries[i as usize].weak)
            .count()
    }

    fn num_weak(&self) -> usize {
        self.used
            .iter()
            .filter(|&&i| self.entries[i as usize].weak)
            .count()
    }

    /// Finds the LRU (tail-most) used entry matching `weak`, if any.
    fn find_lru_by_class(&self, weak: bool) -> Option<usize> {
        self.used
            .iter()
            .rev()
            .position(|&i| self.entries[i as usize].weak == weak)
            .map(|rev_pos| self.used.len() - 1 - rev_pos)
    }

    fn free_entry(&mut self, pos_in_used: usize) -> u8 {
        let idx = self.remove_at(pos_in_used);
        let entry = &mut self.entries[idx as usize];
        entry.state = ArpState::Free;
        entry.weak = true;
        entry.timer_active = false;
        entry.waiters.clear();
        let _ = self.free.push(idx);
        idx
    }

    /// Allocates a slot for a new entry of class `hard`, evicting per
    /// the two-tier policy of spec §4.2 if no free slot exists.
    fn allocate(&mut self, hard: bool, non_protect_count: usize) -> Option<u8> {
        if let Some(idx) = self.free.pop() {
            return Some(idx);
        }
        let weak = !hard;
        if weak {
            let num_hard = self.num_hard();
            let hard_candidate = self.find_lru_by_class(false);
            let weak_candidate = self.find_lru_by_class(true);
            let evict_hard = num_hard > self.protect_count || weak_candidate.is_none();
            let pos = if evict_hard { hard_candidate } else { weak_candidate };
            pos.map(|p| self.free_entry(p))
        } else {
            let num_weak = self.num_weak();
            let weak_candidate = self.find_lru_by_class(true);
            let hard_candidate = self.find_lru_by_class(false);
            let evict_weak = num_weak > non_protect_count || hard_candidate.is_none();
            let pos = if evict_weak { weak_candidate } else { hard_candidate };
            pos.map(|p| self.free_entry(p))
        }
    }

    fn find_used(&self, ip: Ip4Addr) -> Option<usize> {
        self.used
            .iter()
            .position(|&i| self.entries[i as usize].ip == ip && self.entries[i as usize].state != ArpState::Free)
    }

    /// Fast path: does the MRU entry match `ip` and carry a usable MAC?
    pub fn fast_path_lookup(&mut self, ip: Ip4Addr) -> Option<MacAddr> {
        let &idx = self.used.first()?;
        let entry = &mut self.entries[idx as usize];
        if entry.ip == ip && entry.state != ArpState::Free {
            entry.weak = false;
            if matches!(entry.state, ArpState::Valid | ArpState::Refreshing) {
                return Some(entry.mac);
            }
        }
        None
    }

    /// Resolves `ip` to a MAC address, starting a query if necessary
    /// (spec §4.2 steps 1–5). `non_protect_count` is `N - protect_count`
    /// (`ArpNonProtectCount`); `iface_netaddr`/`iface_netmask` identify the
    /// interface the lookup is made on, for the special-cased next-hop
    /// values of step 2 (handled before any cache lookup: the broadcast
    /// address and the local subnet broadcast resolve to the broadcast
    /// MAC without ever touching an entry, and `0.0.0.0` or an address
    /// outside the interface's subnet can never be resolved).
    pub fn resolve(
        &mut self,
        ip: Ip4Addr,
        waiter: Option<SendRetryHandle>,
        now: Instant,
        base_timeout: Duration,
        query_attempts: u8,
        refresh_attempts: u8,
        non_protect_count: usize,
        iface_netaddr: Ip4Addr,
        iface_netmask: Ip4Addr,
    ) -> (Resolution, Option<ArpAction>) {
        if ip.is_broadcast() || ip.is_subnet_broadcast(iface_netaddr, iface_netmask) {
            return (Resolution::Resolved(MacAddr::BROADCAST), None);
        }
        if ip.is_unspecified() || !ip.is_in_subnet(iface_netaddr, iface_netmask) {
            return (Resolution::Failed(NetError::NoHwRoute), None);
        }
        if let Some(pos) = self.find_used(ip) {
            let idx = self.used[pos];
            self.touch_mru(idx);
            let entry = &mut self.entries[idx as usize];
            match entry.state {
                ArpState::Valid if entry.attempts_left == 0 => {
                    entry.state = ArpState::Refreshing;
                    entry.attempts_left = refresh_attempts;
                    entry.timer_time = now + base_timeout;
                    entry.timer_active = true;
                    let mac = entry.mac;
                    (
                        Resolution::Resolved(mac),
                        Some(ArpAction::UnicastRequest {
                            target: ip,
                            target_mac: mac,
                        }),
                    )
                }
                ArpState::Valid | ArpState::Refreshing => {
                    (Resolution::Resolved(entry.mac), None)
                }
                ArpState::Query => {
                    if let Some(w) = waiter {
                        let _ = entry.waiters.push(w);
                    }
                    (Resolution::AlreadyPending, None)
                }
                ArpState::Free => unreachable!("find_used excludes Free entries"),
            }
        } else {
            match self.allocate(true, non_protect_count) {
                None => (Resolution::QueryStarted, None),
                Some(idx) => {
                    let entry = &mut self.entries[idx as usize];
                    entry.state = ArpState::Query;
                    entry.weak = false;
                    entry.ip = ip;
                    entry.mac = MacAddr::ZERO;
                    entry.attempts_left = query_attempts;
                    entry.timer_time = now + base_timeout;
                    entry.timer_active = true;
                    entry.waiters.clear();
                    if let Some(w) = waiter {
                        let _ = entry.waiters.push(w);
                    }
                    self.touch_mru(idx);
                    (Resolution::QueryStarted, Some(ArpAction::BroadcastRequest { target: ip }))
                }
            }
        }
    }

    /// Learns (or refreshes) a **weak** mapping from any received ARP
    /// frame with a non-broadcast sender MAC (spec §4.2 "Learning").
    /// Hard-ness is only ever raised by `resolve`/`fast_path_lookup`.
    pub fn learn(&mut self, ip: Ip4Addr, mac: MacAddr, non_protect_count: usize) {
        if mac.is_broadcast() {
            return;
        }
        if let Some(pos) = self.find_used(ip) {
            let idx = self.used[pos];
            let entry = &mut self.entries[idx as usize];
            entry.mac = mac;
            if matches!(entry.state, ArpState::Query) {
                // Learning doesn't resolve a pending query by itself in
                // the source; only an explicit reply does (handle_reply).
            }
            self.touch_mru(idx);
            return;
        }
        if let Some(idx) = self.allocate(false, non_protect_count) {
            let entry = &mut self.entries[idx as usize];
            entry.state = ArpState::Valid;
            entry.weak = true;
            entry.ip = ip;
            entry.mac = mac;
            entry.attempts_left = 1;
            entry.timer_active = false;
            self.touch_mru(idx);
        }
    }

    /// Handles a resolved reply for a pending query: transitions the
    /// entry to VALID and drains its waiter list for the caller to
    /// notify (dispatched-once, re-entrancy safe per spec §4.2/§5).
    pub fn handle_reply(
        &mut self,
        ip: Ip4Addr,
        mac: MacAddr,
        now: Instant,
        valid_timeout: Duration,
    ) -> Vec<SendRetryHandle, W> {
        self.learn_resolving(ip, mac, now, valid_timeout)
    }

    fn learn_resolving(
        &mut self,
        ip: Ip4Addr,
        mac: MacAddr,
        now: Instant,
        valid_timeout: Duration,
    ) -> Vec<SendRetryHandle, W> {
        let Some(pos) = self.find_used(ip) else {
            return Vec::new();
        };
        let idx = self.used[pos];
        let entry = &mut self.entries[idx as usize];
        if !matches!(entry.state, ArpState::Query | ArpState::Refreshing) {
            entry.mac = mac;
            return Vec::new();
        }
        entry.state = ArpState::Valid;
        entry.mac = mac;
        entry.attempts_left = 1;
        entry.timer_time = now + valid_timeout;
        entry.timer_active = true;
        core_debug!("arp: {:?} resolved to {:?}", ip, mac);
        let mut waiters = Vec::new();
        core::mem::swap(&mut waiters, &mut entry.waiters);
        self.touch_mru(idx);
        waiters
    }

    /// Dispatches every entry whose timer is due, per spec §4.2's
    /// per-state dispatch table. Returns the actions the embedder must
    /// perform (retransmitting ARP requests).
    pub fn poll_timer(
        &mut self,
        now: Instant,
        base_timeout: Duration,
        query_attempts: u8,
        refresh_attempts: u8,
        out: &mut Vec<ArpAction, N>,
    ) {
        for i in 0..N {
            if !self.entries[i].timer_active || now.is_before(self.entries[i].timer_time) {
                continue;
            }
            match self.entries[i].state {
                ArpState::Query => {
                    self.entries[i].attempts_left -= 1;
                    if self.entries[i].attempts_left == 0 {
                        self.entries[i].timer_active = false;
                        core_debug!("arp: query for {:?} exhausted, giving up", self.entries[i].ip);
                        self.free_used_entry_by_index(i);
                    } else {
                        let total = query_attempts;
                        let remaining = self.entries[i].attempts_left;
                        let backoff = base_timeout.saturating_mul(1u32 << (total - remaining));
                        self.entries[i].timer_time = now + backoff;
                        let _ = out.push(ArpAction::BroadcastRequest {
                            target: self.entries[i].ip,
                        });
                    }
                }
                ArpState::Refreshing => {
                    self.entries[i].attempts_left -= 1;
                    if self.entries[i].attempts_left == 0 {
                        self.entries[i].state = ArpState::Query;
                        self.entries[i].attempts_left = refresh_attempts;
                        self.entries[i].timer_time = now + base_timeout;
                        let _ = out.push(ArpAction::BroadcastRequest {
                            target: self.entries[i].ip,
                        });
                    } else {
                        let total = refresh_attempts;
                        let remaining = self.entries[i].attempts_left;
                        let backoff = base_timeout.saturating_mul(1u32 << (total - remaining));
                        self.entries[i].timer_time = now + backoff;
                        let _ = out.push(ArpAction::UnicastRequest {
                            target: self.entries[i].ip,
                            target_mac: self.entries[i].mac,
                        });
                    }
                }
                ArpState::Valid => {
                    self.entries[i].attempts_left = 0;
                    self.entries[i].timer_active = false;
                }
                ArpState::Free => {}
            }
        }
    }

    fn free_used_entry_by_index(&mut self, entry_idx: usize) {
        if let Some(pos) = self.used.iter().position(|&x| x as usize == entry_idx) {
            self.free_entry(pos);
        }
    }

    /// Handles an inbound request targeting one of our own addresses:
    /// just learns the sender (reply construction is the caller's job,
    /// since it needs our MAC/IP which the cache doesn't hold).
    pub fn on_request_received(&mut self, sender_ip: Ip4Addr, sender_mac: MacAddr, non_protect_count: usize) {
        self.learn(sender_ip, sender_mac, non_protect_count);
    }

    #[cfg(test)]
    fn state_of(&self, ip: Ip4Addr) -> Option<ArpState> {
        self.find_used(ip).map(|pos| self.entries[self.used[pos] as usize].state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: usize = 4;
    const W: usize = 2;
    const PROTECT: usize = 2;
    const NON_PROTECT: usize = N - PROTECT;

    fn now() -> Instant {
        Instant::from_ticks(1000)
    }

    /// A netaddr/netmask pair that places every test IP "in subnet" and
    /// restricts the subnet-broadcast special case to the global
    /// broadcast address, for tests not exercising routing itself.
    const ANY_SUBNET: (Ip4Addr, Ip4Addr) = (Ip4Addr::UNSPECIFIED, Ip4Addr::UNSPECIFIED);

    #[test]
    fn resolve_starts_query_and_broadcasts() {
        let mut cache: ArpCache<N, W> = ArpCache::new(PROTECT);
        let (res, action) = cache.resolve(
            Ip4Addr::new(192, 168, 0, 5),
            Some(SendRetryHandle(1)),
            now(),
            Duration::from_ticks(100),
            3,
            3,
            NON_PROTECT,
            ANY_SUBNET.0,
            ANY_SUBNET.1,
        );
        assert!(matches!(res, Resolution::QueryStarted));
        assert_eq!(
            action,
            Some(ArpAction::BroadcastRequest {
                target: Ip4Addr::new(192, 168, 0, 5)
            })
        );
        assert_eq!(cache.state_of(Ip4Addr::new(192, 168, 0, 5)), Some(ArpState::Query));
    }

    #[test]
    fn reply_resolves_and_drains_waiters() {
        let mut cache: ArpCache<N, W> = ArpCache::new(PROTECT);
        let ip = Ip4Addr::new(192, 168, 0, 5);
        cache.resolve(
            ip,
            Some(SendRetryHandle(7)),
            now(),
            Duration::from_ticks(100),
            3,
            3,
            NON_PROTECT,
            ANY_SUBNET.0,
            ANY_SUBNET.1,
        );
        let mac = MacAddr([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let waiters = cache.handle_reply(ip, mac, now(), Duration::from_ticks(60_000));
        assert_eq!(waiters.as_slice(), &[SendRetryHandle(7)]);
        assert_eq!(cache.fast_path_lookup(ip), Some(mac));
    }

    #[test]
    fn broadcast_address_resolves_without_an_entry() {
        let mut cache: ArpCache<N, W> = ArpCache::new(PROTECT);
        let (res, action) = cache.resolve(
            Ip4Addr::BROADCAST,
            None,
            now(),
            Duration::from_ticks(100),
            3,
            3,
            NON_PROTECT,
            ANY_SUBNET.0,
            ANY_SUBNET.1,
        );
        assert!(matches!(res, Resolution::Resolved(mac) if mac == MacAddr::BROADCAST));
        assert!(action.is_none());
        assert_eq!(cache.free.len(), N, "no entry was allocated for the broadcast address");
    }

    #[test]
    fn local_subnet_broadcast_resolves_to_broadcast_mac() {
        let mut cache: ArpCache<N, W> = ArpCache::new(PROTECT);
        let netaddr = Ip4Addr::new(192, 168, 1, 0);
        let netmask = Ip4Addr::new(255, 255, 255, 0);
        let (res, _) = cache.resolve(
            Ip4Addr::new(192, 168, 1, 255),
            None,
            now(),
            Duration::from_ticks(100),
            3,
            3,
            NON_PROTECT,
            netaddr,
            netmask,
        );
        assert!(matches!(res, Resolution::Resolved(mac) if mac == MacAddr::BROADCAST));
    }

    #[test]
    fn unspecified_next_hop_fails_no_hw_route() {
        let mut cache: ArpCache<N, W> = ArpCache::new(PROTECT);
        let (res, action) = cache.resolve(
            Ip4Addr::UNSPECIFIED,
            None,
            now(),
            Duration::from_ticks(100),
            3,
            3,
            NON_PROTECT,
            Ip4Addr::new(192, 168, 1, 0),
            Ip4Addr::new(255, 255, 255, 0),
        );
        assert!(matches!(res, Resolution::Failed(NetError::NoHwRoute)));
        assert!(action.is_none());
    }

    #[test]
    fn next_hop_outside_interface_subnet_fails_no_hw_route() {
        let mut cache: ArpCache<N, W> = ArpCache::new(PROTECT);
        let (res, _) = cache.resolve(
            Ip4Addr::new(10, 0, 0, 5),
            None,
            now(),
            Duration::from_ticks(100),
            3,
            3,
            NON_PROTECT,
            Ip4Addr::new(192, 168, 1, 0),
            Ip4Addr::new(255, 255, 255, 0),
        );
        assert!(matches!(res, Resolution::Failed(NetError::NoHwRoute)));
    }

    #[test]
    fn learning_never_raises_weak_to_hard() {
        let mut cache: ArpCache<N, W> = ArpCache::new(PROTECT);
        let ip = Ip4Addr::new(10, 0, 0, 9);
        cache.learn(ip, MacAddr([1, 1, 1, 1, 1, 1]), NON_PROTECT);
        assert_eq!(cache.state_of(ip), Some(ArpState::Valid));
        assert!(cache.entries[cache.used[0] as usize].weak);
    }

    #[test]
    fn query_exhaustion_frees_the_entry() {
        let mut cache: ArpCache<N, W> = ArpCache::new(PROTECT);
        let ip = Ip4Addr::new(1, 2, 3, 4);
        cache.resolve(ip, None, now(), Duration::from_ticks(10), 1, 1, NON_PROTECT, ANY_SUBNET.0, ANY_SUBNET.1);
        let mut out = Vec::new();
        cache.poll_timer(now() + Duration::from_ticks(10), Duration::from_ticks(10), 1, 1, &mut out);
        assert_eq!(cache.state_of(ip), None);
        assert_eq!(cache.free.len(), N);
    }

    #[test]
    fn weak_eviction_prefers_lru_weak_when_hard_protected() {
        let mut cache: ArpCache<N, W> = ArpCache::new(PROTECT);
        // Fill all N slots with weak entries.
        for i in 0..N as u8 {
            cache.learn(Ip4Addr::new(10, 0, 0, i), MacAddr([i; 6]), NON_PROTECT);
        }
        // Allocating one more weak entry must evict the LRU weak one (ip 10.0.0.0),
        // not a hard one (there are none yet).
        cache.learn(Ip4Addr::new(10, 0, 0, 99), MacAddr([9; 6]), NON_PROTECT);
        assert_eq!(cache.state_of(Ip4Addr::new(10, 0, 0, 0)), None);
        assert!(cache.state_of(Ip4Addr::new(10, 0, 0, 99)).is_some());
    }
}
