//! End-to-end ICMP echo request/reply over a hand-built IPv4 datagram
//! (spec §8 testable property: echo round trip).

use aistack_core::net::addr::Ip4Addr;
use aistack_core::net::ip::icmp::EchoMessage;
use aistack_core::net::ip::Ipv4Header;

#[test]
fn echo_request_produces_a_well_formed_reply_datagram() {
    let our_addr = Ip4Addr::new(192, 168, 1, 10);
    let peer = Ip4Addr::new(192, 168, 1, 20);

    let payload = [0xde, 0xad, 0xbe, 0xef];
    let mut icmp_req = [0u8; 12];
    icmp_req[0] = aistack_core::net::ip::icmp::TYPE_ECHO_REQUEST;
    icmp_req[4..8].copy_from_slice(&0x0001_002au32.to_be_bytes());
    icmp_req[8..].copy_from_slice(&payload);
    let sum = aistack_core::net::checksum::checksum(&icmp_req);
    icmp_req[2..4].copy_from_slice(&sum.to_be_bytes());

    let in_header = Ipv4Header {
        ttl: 64,
        proto: aistack_core::net::ip::PROTO_ICMP,
        src: peer,
        dst: our_addr,
        ident: 7,
        flags_frag_offset: 0,
        total_len: 20 + icmp_req.len() as u16,
    };
    let mut in_buf = [0u8; 20];
    in_header.write(&mut in_buf);
    let (parsed, header_len) = Ipv4Header::parse(&in_buf).expect("valid header");
    assert_eq!(header_len, 20);
    assert!(parsed.is_acceptable(our_addr, Ip4Addr::new(192, 168, 1, 0), Ip4Addr::new(255, 255, 255, 0)));

    let msg = EchoMessage::parse(&icmp_req).expect("valid echo request");
    assert!(msg.is_echo_request());

    let mut reply_icmp = [0u8; 12];
    let n = msg.build_reply(&mut reply_icmp);
    assert_eq!(aistack_core::net::checksum::checksum(&reply_icmp[..n]), 0);
    assert_eq!(&reply_icmp[8..n], &payload);

    let out_header = Ipv4Header {
        ttl: 64,
        proto: aistack_core::net::ip::PROTO_ICMP,
        src: our_addr,
        dst: peer,
        ident: 1,
        flags_frag_offset: 0,
        total_len: 20 + n as u16,
    };
    let mut out_buf = [0u8; 20];
    out_header.write(&mut out_buf);
    let (parsed_out, _) = Ipv4Header::parse(&out_buf).expect("our own header checksums correctly");
    assert_eq!(parsed_out.src, our_addr);
    assert_eq!(parsed_out.dst, peer);
}
