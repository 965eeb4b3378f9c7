//! Hardware address discovery and Wake-on-LAN

use super::RemoteError;
use std::fmt;
use std::net::UdpSocket;
use std::str::FromStr;
use tracing::debug;

const ARP_TABLE: &str = "/proc/net/arp";
const WAKE_PORT: u16 = 9;

/// Six byte hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }

    /// Six `0xFF` bytes followed by the address repeated sixteen times
    pub fn magic_packet(&self) -> [u8; 102] {
        let mut packet = [0xFF; 102];
        for chunk in packet[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&self.0);
        }
        packet
    }
}

impl FromStr for MacAddress {
    type Err = RemoteError;

    /// Accepts `aa:bb:cc:dd:ee:ff`, `aa-bb-cc-dd-ee-ff` and `aabbccddeeff`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RemoteError::InvalidHardwareAddress(s.to_string());
        let hex: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        if hex.len() != 12 || !hex.is_ascii() {
            return Err(invalid());
        }
        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

/// Network access needed by the remote bridge
pub trait NetworkHelper: Send + Sync {
    /// Hardware address of `host` on the local network, if known
    fn resolve_mac(&self, host: &str) -> Result<Option<MacAddress>, RemoteError>;

    fn send_wake_packet(&self, mac: &MacAddress, broadcast: &str) -> Result<(), RemoteError>;
}

/// Linux implementation backed by the kernel ARP table and a UDP broadcast socket
#[derive(Debug, Default, Clone)]
pub struct SystemNetwork;

impl SystemNetwork {
    pub fn new() -> Self {
        Self
    }
}

/// Looks up `host` in the text of `/proc/net/arp`
fn parse_arp_table(table: &str, host: &str) -> Option<MacAddress> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            match columns.as_slice() {
                [ip, _, _, mac, ..] if *ip == host => mac.parse::<MacAddress>().ok(),
                _ => None,
            }
        })
        .find(|mac| !mac.is_zero())
}

impl NetworkHelper for SystemNetwork {
    fn resolve_mac(&self, host: &str) -> Result<Option<MacAddress>, RemoteError> {
        // Any datagram makes the kernel resolve the neighbor if it is not cached yet
        if let Ok(socket) = UdpSocket::bind("0.0.0.0:0") {
            let _ = socket.send_to(&[], (host, WAKE_PORT));
        }
        let table = std::fs::read_to_string(ARP_TABLE)?;
        let mac = parse_arp_table(&table, host);
        debug!("arp lookup for {}: {:?}", host, mac);
        Ok(mac)
    }

    fn send_wake_packet(&self, mac: &MacAddress, broadcast: &str) -> Result<(), RemoteError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_broadcast(true)?;
        socket.send_to(&mac.magic_packet(), (broadcast, WAKE_PORT))?;
        Ok(())
    }
}
