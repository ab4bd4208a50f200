//! Network core error kinds (spec §7).

/// Error kinds surfaced from the network core. Value-returned, never
/// raised (spec §7): no component in `net` panics on bad input or a
/// full pool, it returns one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NetError {
    #[error("no route to the destination network")]
    NoIpRoute,
    #[error("no hardware route (next hop unreachable at the link layer)")]
    NoHwRoute,
    #[error("insufficient header space reserved before the payload")]
    NoHeaderSpace,
    #[error("packet exceeds the maximum IPv4 datagram size")]
    PktTooLarge,
    /// Non-fatal: the caller's send has been queued pending ARP
    /// resolution and the retry callback will be invoked once resolved.
    #[error("ARP resolution pending, send queued for retry")]
    ArpQuery,
    #[error("no free TCP protocol control block available")]
    NoPcbAvail,
    #[error("no free local port available")]
    NoPortAvail,
    #[error("no path-MTU estimate available for this destination")]
    NoIpMtuAvail,
    #[error("a fixed-capacity buffer or pool is full")]
    BufferFull,
}

pub type NetResult<T> = Result<T, NetError>;
