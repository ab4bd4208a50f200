//! IPv4 engine: header codec, fragmentation, receive validation (spec §4.3).

pub mod icmp;
pub mod reassembly;

use crate::log_macros::core_trace;
use crate::net::addr::Ip4Addr;
use crate::net::checksum;
use crate::net::error::{NetError, NetResult};

pub const MIN_HEADER_LEN: usize = 20;
pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

pub const FLAG_DF: u16 = 0x4000;
pub const FLAG_MF: u16 = 0x2000;
pub const FRAG_OFFSET_MASK: u16 = 0x1fff;

/// A parsed IPv4 header (no options support, matching spec's IHL=5 path).
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Header {
    pub ttl: u8,
    pub proto: u8,
    pub src: Ip4Addr,
    pub dst: Ip4Addr,
    pub ident: u16,
    pub flags_frag_offset: u16,
    pub total_len: u16,
}

impl Ipv4Header {
    pub fn mf(&self) -> bool {
        self.flags_frag_offset & FLAG_MF != 0
    }

    pub fn frag_offset_bytes(&self) -> usize {
        (self.flags_frag_offset & FRAG_OFFSET_MASK) as usize * 8
    }

    /// Parses a header from `data`, validating IHL, version and checksum
    /// (spec §4.3 Receive). Options beyond the 20-byte minimum are
    /// skipped but not interpreted.
    pub fn parse(data: &[u8]) -> Option<(Ipv4Header, usize)> {
        if data.len() < MIN_HEADER_LEN {
            return None;
        }
        let version = data[0] >> 4;
        let ihl = (data[0] & 0x0f) as usize;
        if version != 4 || ihl < 5 {
            return None;
        }
        let header_len = ihl * 4;
        if data.len() < header_len {
            return None;
        }
        if checksum::checksum(&data[..header_len]) != 0 {
            return None;
        }
        let total_len = u16::from_be_bytes([data[2], data[3]]);
        let ident = u16::from_be_bytes([data[4], data[5]]);
        let flags_frag_offset = u16::from_be_bytes([data[6], data[7]]);
        let ttl = data[8];
        let proto = data[9];
        let src = Ip4Addr([data[12], data[13], data[14], data[15]]);
        let dst = Ip4Addr([data[16], data[17], data[18], data[19]]);
        core_trace!("ip: parsed {:?} -> {:?} proto={} ident={} len={}", src, dst, proto, ident, total_len);
        Some((
            Ipv4Header {
                ttl,
                proto,
                src,
                dst,
                ident,
                flags_frag_offset,
                total_len,
            },
            header_len,
        ))
    }

    /// Writes a 20-byte header (no options) into `out`, recomputing the checksum.
    pub fn write(&self, out: &mut [u8]) {
        assert!(out.len() >= MIN_HEADER_LEN);
        out[0] = 0x45;
        out[1] = 0;
        out[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        out[4..6].copy_from_slice(&self.ident.to_be_bytes());
        out[6..8].copy_from_slice(&self.flags_frag_offset.to_be_bytes());
        out[8] = self.ttl;
        out[9] = self.proto;
        out[10] = 0;
        out[11] = 0;
        out[12..16].copy_from_slice(&self.src.0);
        out[16..20].copy_from_slice(&self.dst.0);
        let sum = checksum::checksum(&out[..MIN_HEADER_LEN]);
        out[10..12].copy_from_slice(&sum.to_be_bytes());
    }

    /// Rejects datagrams spec §4.3 Receive says must be dropped: a
    /// spoofed all-ones or local-broadcast source, or a destination that
    /// doesn't match our unicast/broadcast addresses.
    pub fn is_acceptable(&self, our_addr: Ip4Addr, netaddr: Ip4Addr, netmask: Ip4Addr) -> bool {
        if self.src.is_broadcast() || self.src.is_subnet_broadcast(netaddr, netmask) {
            return false;
        }
        self.dst == our_addr || self.dst.is_broadcast() || self.dst.is_subnet_broadcast(netaddr, netmask)
    }
}

/// Splits `payload_len` bytes of payload, sent behind a 20-byte header,
/// into fragments that fit within `mtu` (spec §4.3 Send step 4): each
/// fragment's payload portion is a multiple of 8 bytes except the last.
pub fn fragment_plan(payload_len: usize, mtu: usize) -> FragmentPlanIter {
    let max_payload_per_frag = ((mtu.saturating_sub(MIN_HEADER_LEN)) / 8) * 8;
    FragmentPlanIter {
        remaining: payload_len,
        offset: 0,
        max_payload_per_frag: max_payload_per_frag.max(8),
    }
}

pub struct FragmentPlanIter {
    remaining: usize,
    offset: usize,
    max_payload_per_frag: usize,
}

/// One fragment's payload offset/length and whether more follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub offset: usize,
    pub len: usize,
    pub more_fragments: bool,
}

impl Iterator for FragmentPlanIter {
    type Item = Fragment;

    fn next(&mut self) -> Option<Fragment> {
        if self.remaining == 0 && self.offset != 0 {
            return None;
        }
        if self.remaining == 0 {
            // Single zero-length payload still emits exactly one fragment.
            self.offset = usize::MAX;
            return Some(Fragment {
                offset: 0,
                len: 0,
                more_fragments: false,
            });
        }
        let take = self.remaining.min(self.max_payload_per_frag);
        let offset = self.offset;
        self.offset += take;
        self.remaining -= take;
        let more = self.remaining > 0;
        Some(Fragment {
            offset,
            len: take,
            more_fragments: more,
        })
    }
}

/// Checks the total datagram size against spec §4.3 Send step 2.
pub fn check_total_len(header_len: usize, payload_len: usize) -> NetResult<()> {
    if header_len + payload_len > 65535 {
        return Err(NetError::PktTooLarge);
    }
    Ok(())
}

/// One configured IP interface (spec §3 IP interface). The source stores
/// the driver object directly; a `no_std`/no-alloc fixed array can't hold
/// a `dyn EthernetDriver` trait object, so interfaces carry a small
/// caller-assigned `driver_id` the embedder uses to look its driver up
/// instead.
#[derive(Debug, Clone, Copy)]
pub struct IpInterface {
    pub mtu: usize,
    pub ip_addr: Ip4Addr,
    pub netmask: Ip4Addr,
    pub netaddr: Ip4Addr,
    pub bcastaddr: Ip4Addr,
    pub gateway: Option<Ip4Addr>,
    pub driver_id: u8,
    pub in_use: bool,
}

impl IpInterface {
    pub const fn empty() -> Self {
        IpInterface {
            mtu: 0,
            ip_addr: Ip4Addr::UNSPECIFIED,
            netmask: Ip4Addr::UNSPECIFIED,
            netaddr: Ip4Addr::UNSPECIFIED,
            bcastaddr: Ip4Addr::UNSPECIFIED,
            gateway: None,
            driver_id: 0,
            in_use: false,
        }
    }
}

impl Default for IpInterface {
    fn default() -> Self {
        Self::empty()
    }
}

/// A fixed, ordered list of interfaces (spec §3: "multiple interfaces
/// form an ordered list").
pub struct IpInterfaceTable<const N: usize> {
    ifaces: [IpInterface; N],
}

impl<const N: usize> IpInterfaceTable<N> {
    pub fn new() -> Self {
        IpInterfaceTable {
            ifaces: [IpInterface::empty(); N],
        }
    }

    pub fn set(&mut self, idx: usize, iface: IpInterface) {
        self.ifaces[idx] = iface;
    }

    pub fn get(&self, idx: usize) -> &IpInterface {
        &self.ifaces[idx]
    }

    /// Routes `dst` to an interface index per spec §4.3 Send step 1: the
    /// most-specific local-subnet match across interfaces, else the first
    /// interface with a configured gateway.
    pub fn route(&self, dst: Ip4Addr) -> NetResult<usize> {
        route(&self.ifaces, dst)
    }
}

impl<const N: usize> Default for IpInterfaceTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Selects the outbound interface for `dst` (spec §4.3 Send step 1).
/// "Most specific" means the narrowest matching subnet (largest netmask).
pub fn route(interfaces: &[IpInterface], dst: Ip4Addr) -> NetResult<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (i, iface) in interfaces.iter().enumerate() {
        if !iface.in_use || !dst.is_in_subnet(iface.netaddr, iface.netmask) {
            continue;
        }
        let specificity = iface.netmask.to_u32();
        if best.map_or(true, |(_, best_mask)| specificity > best_mask) {
            best = Some((i, specificity));
        }
    }
    if let Some((i, _)) = best {
        return Ok(i);
    }
    interfaces
        .iter()
        .position(|iface| iface.in_use && iface.gateway.is_some())
        .ok_or(NetError::NoIpRoute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrips_with_valid_checksum() {
        let hdr = Ipv4Header {
            ttl: 64,
            proto: PROTO_TCP,
            src: Ip4Addr::new(192, 168, 0, 1),
            dst: Ip4Addr::new(192, 168, 0, 2),
            ident: 0x1234,
            flags_frag_offset: 0,
            total_len: 40,
        };
        let mut buf = [0u8; MIN_HEADER_LEN];
        hdr.write(&mut buf);
        let (parsed, len) = Ipv4Header::parse(&buf).unwrap();
        assert_eq!(len, MIN_HEADER_LEN);
        assert_eq!(parsed.src, hdr.src);
        assert_eq!(parsed.dst, hdr.dst);
        assert_eq!(parsed.ident, hdr.ident);
    }

    #[test]
    fn parse_rejects_bad_checksum() {
        let hdr = Ipv4Header {
            ttl: 1,
            proto: PROTO_ICMP,
            src: Ip4Addr::new(1, 2, 3, 4),
            dst: Ip4Addr::new(5, 6, 7, 8),
            ident: 1,
            flags_frag_offset: 0,
            total_len: 20,
        };
        let mut buf = [0u8; MIN_HEADER_LEN];
        hdr.write(&mut buf);
        buf[11] ^= 0xff;
        assert!(Ipv4Header::parse(&buf).is_none());
    }

    #[test]
    fn fragment_plan_rounds_to_multiple_of_eight() {
        let frags: heapless::Vec<Fragment, 8> = fragment_plan(3000, 576).collect();
        for (i, f) in frags.iter().enumerate() {
            if i + 1 < frags.len() {
                assert_eq!(f.len % 8, 0);
            }
        }
        let total: usize = frags.iter().map(|f| f.len).sum();
        assert_eq!(total, 3000);
        assert!(!frags.last().unwrap().more_fragments);
    }

    #[test]
    fn fragment_plan_single_fragment_when_it_fits() {
        let frags: heapless::Vec<Fragment, 8> = fragment_plan(100, 1500).collect();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0], Fragment { offset: 0, len: 100, more_fragments: false });
    }

    #[test]
    fn total_len_over_65535_is_rejected() {
        assert_eq!(check_total_len(20, 70000), Err(NetError::PktTooLarge));
    }

    fn iface(ip: (u8, u8, u8, u8), mask: (u8, u8, u8, u8), gateway: Option<Ip4Addr>) -> IpInterface {
        let ip_addr = Ip4Addr::new(ip.0, ip.1, ip.2, ip.3);
        let netmask = Ip4Addr::new(mask.0, mask.1, mask.2, mask.3);
        IpInterface {
            mtu: 1500,
            ip_addr,
            netmask,
            netaddr: Ip4Addr::from_u32(ip_addr.to_u32() & netmask.to_u32()),
            bcastaddr: Ip4Addr::from_u32(ip_addr.to_u32() & netmask.to_u32() | !netmask.to_u32()),
            gateway,
            driver_id: 0,
            in_use: true,
        }
    }

    #[test]
    fn routes_to_the_most_specific_local_subnet() {
        let mut table: IpInterfaceTable<2> = IpInterfaceTable::new();
        table.set(0, iface((10, 0, 0, 1), (255, 0, 0, 0), None));
        table.set(1, iface((10, 0, 0, 2), (255, 255, 255, 0), None));
        let idx = table.route(Ip4Addr::new(10, 0, 0, 200)).unwrap();
        assert_eq!(idx, 1, "the /24 interface is more specific than the /8");
    }

    #[test]
    fn falls_back_to_first_interface_with_a_reachable_gateway() {
        let mut table: IpInterfaceTable<2> = IpInterfaceTable::new();
        table.set(0, iface((192, 168, 1, 2), (255, 255, 255, 0), None));
        table.set(1, iface((192, 168, 2, 2), (255, 255, 255, 0), Some(Ip4Addr::new(192, 168, 2, 1))));
        let idx = table.route(Ip4Addr::new(8, 8, 8, 8)).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn unroutable_destination_fails_no_ip_route() {
        let mut table: IpInterfaceTable<2> = IpInterfaceTable::new();
        table.set(0, iface((192, 168, 1, 2), (255, 255, 255, 0), None));
        assert_eq!(table.route(Ip4Addr::new(8, 8, 8, 8)), Err(NetError::NoIpRoute));
    }
}
