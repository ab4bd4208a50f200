//! Drives `ArpCache` end to end the way an embedder's event loop would:
//! resolve an unknown address, receive the reply, and confirm the
//! fast path serves it afterward (spec §8: ARP query/reply/timeout).

use aistack_core::net::addr::Ip4Addr;
use aistack_core::net::arp::{ArpAction, ArpCache, Resolution, SendRetryHandle};
use aistack_core::net::eth::MacAddr;
use aistack_core::time::{Duration, Instant};

const N: usize = 4;
const W: usize = 2;
const PROTECT: usize = 2;
const NON_PROTECT: usize = N - PROTECT;
const ANY_SUBNET: (Ip4Addr, Ip4Addr) = (Ip4Addr::UNSPECIFIED, Ip4Addr::UNSPECIFIED);

#[test]
fn resolve_reply_and_fast_path_round_trip() {
    let mut cache: ArpCache<N, W> = ArpCache::new(PROTECT);
    let peer = Ip4Addr::new(192, 168, 1, 2);
    let start = Instant::from_ticks(0);
    let base_timeout = Duration::from_ticks(500);

    let (res, action) = cache.resolve(
        peer,
        Some(SendRetryHandle(42)),
        start,
        base_timeout,
        3,
        3,
        NON_PROTECT,
        ANY_SUBNET.0,
        ANY_SUBNET.1,
    );
    assert!(matches!(res, Resolution::QueryStarted));
    assert_eq!(action, Some(ArpAction::BroadcastRequest { target: peer }));
    assert!(cache.fast_path_lookup(peer).is_none(), "no MAC known until the reply arrives");

    // A second caller asking before the reply arrives just queues up.
    let (res2, action2) = cache.resolve(
        peer,
        Some(SendRetryHandle(43)),
        start,
        base_timeout,
        3,
        3,
        NON_PROTECT,
        ANY_SUBNET.0,
        ANY_SUBNET.1,
    );
    assert!(matches!(res2, Resolution::AlreadyPending));
    assert!(action2.is_none());

    let mac = MacAddr([0xaa, 0xbb, 0xcc, 0x11, 0x22, 0x33]);
    let waiters = cache.handle_reply(peer, mac, start, Duration::from_ticks(60_000));
    assert_eq!(waiters.as_slice(), &[SendRetryHandle(42), SendRetryHandle(43)]);

    assert_eq!(cache.fast_path_lookup(peer), Some(mac));
    let (res3, action3) = cache.resolve(peer, None, start, base_timeout, 3, 3, NON_PROTECT, ANY_SUBNET.0, ANY_SUBNET.1);
    assert!(matches!(res3, Resolution::Resolved(m) if m == mac));
    assert!(action3.is_none());
}

#[test]
fn query_exhaustion_is_reported_through_poll_timer() {
    let mut cache: ArpCache<N, W> = ArpCache::new(PROTECT);
    let peer = Ip4Addr::new(10, 0, 0, 50);
    let start = Instant::from_ticks(0);
    let base_timeout = Duration::from_ticks(100);

    cache.resolve(peer, None, start, base_timeout, 1, 1, NON_PROTECT, ANY_SUBNET.0, ANY_SUBNET.1);

    let mut actions = heapless::Vec::<ArpAction, N>::new();
    cache.poll_timer(start + base_timeout, base_timeout, 1, 1, &mut actions);

    // The single attempt was exhausted: the entry is freed rather than
    // rebroadcasting, and a fresh resolve for the same address starts over.
    let (res, action) = cache.resolve(peer, None, start, base_timeout, 1, 1, NON_PROTECT, ANY_SUBNET.0, ANY_SUBNET.1);
    assert!(matches!(res, Resolution::QueryStarted));
    assert_eq!(action, Some(ArpAction::BroadcastRequest { target: peer }));
}

#[test]
fn learned_entries_stay_weak_until_explicitly_resolved() {
    let mut cache: ArpCache<N, W> = ArpCache::new(PROTECT);
    let peer = Ip4Addr::new(10, 0, 0, 77);
    let mac = MacAddr([1, 2, 3, 4, 5, 6]);

    cache.learn(peer, mac, NON_PROTECT);
    assert_eq!(cache.fast_path_lookup(peer), Some(mac), "learning alone is enough to populate the fast path");
}
