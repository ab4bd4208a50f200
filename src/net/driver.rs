//! External Ethernet driver contract (spec §6).
//!
//! The core never owns the NIC; it is handed a `&mut dyn EthernetDriver`
//! for the duration of a send, mirroring spec §3's "producer retains
//! ownership for the duration of a call". CRC is the driver's concern;
//! frames exchanged here are whole Ethernet II frames.

use crate::net::eth::MacAddr;
use crate::net::error::NetError;

pub trait EthernetDriver {
    /// The driver's own hardware address.
    fn mac(&self) -> MacAddr;

    /// Current Ethernet MTU, including the 14-byte header; must be at
    /// least `14 + 20 + 8` (spec §6).
    fn eth_mtu(&self) -> usize;

    /// Hands a whole Ethernet II frame to the driver for transmission.
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), NetError>;

    /// Link state, as last observed by the driver.
    fn link_up(&self) -> bool;
}

pub const MIN_ETH_MTU: usize = 14 + 20 + 8;
