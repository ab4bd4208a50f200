//! TCP engine: PCBs, state machine, input/output processing, listeners
//! (spec §4.4).

pub mod connection;
pub mod input;
pub mod listener;
pub mod output;
pub mod pcb;

use crate::net::addr::Ip4Addr;

/// RFC 793 connection states, plus the two extensions spec §4.4 calls
/// for: queued SYN_RCVD entries living on a listener's accept queue
/// rather than as a full PCB, and an explicit time-wait index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynRcvd,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

impl TcpState {
    /// PCBs in these states suppress an RST on forced teardown (spec §4.4
    /// PCB allocation).
    pub fn suppresses_forced_rst(self) -> bool {
        matches!(self, TcpState::SynSent | TcpState::SynRcvd | TcpState::TimeWait)
    }

    pub fn is_synchronized(self) -> bool {
        !matches!(self, TcpState::Closed | TcpState::Listen | TcpState::SynSent)
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TcpFlags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
    }
}

pub const HEADER_LEN: usize = 20;

/// A parsed TCP segment header (no options beyond MSS support).
#[derive(Debug, Clone, Copy)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub mss_option: Option<u16>,
}

impl TcpHeader {
    pub fn parse(data: &[u8]) -> Option<(TcpHeader, usize)> {
        if data.len() < HEADER_LEN {
            return None;
        }
        let data_offset = ((data[12] >> 4) as usize) * 4;
        if data.len() < data_offset || data_offset < HEADER_LEN {
            return None;
        }
        let mut mss_option = None;
        let mut i = HEADER_LEN;
        while i + 1 < data_offset {
            match data[i] {
                0 => break,
                1 => i += 1,
                2 if i + 3 < data_offset => {
                    mss_option = Some(u16::from_be_bytes([data[i + 2], data[i + 3]]));
                    i += 4;
                }
                kind => {
                    if i + 1 >= data_offset {
                        break;
                    }
                    let len = data[i + 1].max(2) as usize;
                    let _ = kind;
                    i += len;
                }
            }
        }
        Some((
            TcpHeader {
                src_port: u16::from_be_bytes([data[0], data[1]]),
                dst_port: u16::from_be_bytes([data[2], data[3]]),
                seq: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
                ack: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
                flags: TcpFlags::from_bits_truncate(data[13]),
                window: u16::from_be_bytes([data[14], data[15]]),
                mss_option,
            },
            data_offset,
        ))
    }

    /// Writes a 20-byte header (plus an optional 4-byte MSS option on
    /// SYN segments) into `out`. TCP checksum is left to the caller
    /// (needs the pseudo-header + payload).
    pub fn write(&self, out: &mut [u8]) -> usize {
        let has_mss = self.mss_option.is_some();
        let len = if has_mss { HEADER_LEN + 4 } else { HEADER_LEN };
        assert!(out.len() >= len);
        out[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        out[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        out[4..8].copy_from_slice(&self.seq.to_be_bytes());
        out[8..12].copy_from_slice(&self.ack.to_be_bytes());
        out[12] = ((len / 4) as u8) << 4;
        out[13] = self.flags.bits();
        out[14..16].copy_from_slice(&self.window.to_be_bytes());
        out[16..18].copy_from_slice(&[0, 0]); // checksum, filled by caller
        out[18..20].copy_from_slice(&[0, 0]); // urgent ptr, unused
        if let Some(mss) = self.mss_option {
            out[20] = 2;
            out[21] = 4;
            out[22..24].copy_from_slice(&mss.to_be_bytes());
        }
        len
    }
}

/// Wrap-aware sequence comparison, the TCP analogue of [`crate::time::time_ge`].
#[inline]
pub fn seq_ge(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b)) < (1u32 << 31)
}

#[inline]
pub fn seq_gt(a: u32, b: u32) -> bool {
    a != b && seq_ge(a, b)
}

/// Checks RFC 793 §3.9 sequence acceptability for a segment of `seg_len`
/// bytes starting at `seq`, given the receiver's window `[rcv_nxt, rcv_nxt+rcv_wnd)`.
pub fn is_seq_acceptable(seq: u32, seg_len: u32, rcv_nxt: u32, rcv_wnd: u32) -> bool {
    if rcv_wnd == 0 {
        return seg_len == 0 && seq == rcv_nxt;
    }
    if seg_len == 0 {
        return seq_ge(seq, rcv_nxt) && !seq_ge(seq, rcv_nxt.wrapping_add(rcv_wnd));
    }
    let seg_end = seq.wrapping_add(seg_len - 1);
    let in_front = seq_ge(seq, rcv_nxt) && !seq_ge(seq, rcv_nxt.wrapping_add(rcv_wnd));
    let in_back = seq_ge(seg_end, rcv_nxt) && !seq_ge(seg_end, rcv_nxt.wrapping_add(rcv_wnd));
    in_front || in_back
}

/// Four-tuple identifying one TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpTuple {
    pub local_ip: Ip4Addr,
    pub local_port: u16,
    pub remote_ip: Ip4Addr,
    pub remote_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip_without_options() {
        let hdr = TcpHeader {
            src_port: 1234,
            dst_port: 80,
            seq: 1000,
            ack: 0,
            flags: TcpFlags::SYN,
            window: 4096,
            mss_option: None,
        };
        let mut buf = [0u8; HEADER_LEN];
        let len = hdr.write(&mut buf);
        assert_eq!(len, HEADER_LEN);
        let (parsed, data_offset) = TcpHeader::parse(&buf).unwrap();
        assert_eq!(data_offset, HEADER_LEN);
        assert_eq!(parsed.seq, 1000);
        assert_eq!(parsed.flags, TcpFlags::SYN);
    }

    #[test]
    fn header_roundtrip_with_mss_option() {
        let hdr = TcpHeader {
            src_port: 1,
            dst_port: 2,
            seq: 0,
            ack: 0,
            flags: TcpFlags::SYN,
            window: 0,
            mss_option: Some(1460),
        };
        let mut buf = [0u8; HEADER_LEN + 4];
        hdr.write(&mut buf);
        let (parsed, data_offset) = TcpHeader::parse(&buf).unwrap();
        assert_eq!(data_offset, HEADER_LEN + 4);
        assert_eq!(parsed.mss_option, Some(1460));
    }

    #[test]
    fn sequence_acceptability_rejects_out_of_window() {
        assert!(is_seq_acceptable(1000, 10, 1000, 100));
        assert!(!is_seq_acceptable(2000, 10, 1000, 100));
    }

    #[test]
    fn zero_window_accepts_only_empty_probe_at_rcv_nxt() {
        assert!(is_seq_acceptable(500, 0, 500, 0));
        assert!(!is_seq_acceptable(500, 1, 500, 0));
    }
}
