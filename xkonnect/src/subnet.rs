use std::io;
use std::net::{IpAddr, Ipv4Addr};

use getifs::Flags;
use ipnet::Ipv4Net;
use tracing::debug;

/// Directed broadcast address of the Internet-Connection-Sharing bridge
/// subnet.
pub const ICS_BRIDGE_BROADCAST: Ipv4Addr = Ipv4Addr::new(192, 168, 137, 255);

/// A local interface paired with the /24 it can reach by directed broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetEntry {
    /// Interface name, e.g. `eth0`
    pub interface: String,
    /// The /24 network of the interface's unicast address
    pub net: Ipv4Net,
    /// Whether the link was operationally up at enumeration time
    pub link_up: bool,
}

impl SubnetEntry {
    pub(crate) fn new(interface: String, addr: Ipv4Addr, link_up: bool) -> Self {
        // 24 is always a valid IPv4 prefix length; the fallback never runs
        let net = Ipv4Net::new(addr, 24).unwrap_or_else(|_| Ipv4Net::from(addr));
        Self { interface, net, link_up }
    }

    /// Directed broadcast address for the subnet.
    pub fn broadcast(&self) -> Ipv4Addr {
        self.net.broadcast()
    }

    /// Whether `addr` lives inside this subnet.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.net.contains(&addr)
    }

    /// Whether this entry covers the ICS bridge subnet.
    pub fn is_bridged(&self) -> bool {
        self.broadcast() == ICS_BRIDGE_BROADCAST
    }
}

/// Enumerates every non-loopback IPv4 interface and derives the /24 directed
/// broadcast for each unicast address. Only administratively-up interfaces
/// are considered; `link_up` snapshots the RUNNING flag so the broadcaster
/// can skip entries whose link has gone down since.
///
/// When `include_ics_bridge` is set and enumeration produced no entry for
/// the bridge subnet, one is appended unconditionally; on some platforms the
/// bridge adapter does not show up reliably.
pub fn enumerate_subnets(include_ics_bridge: bool) -> io::Result<Vec<SubnetEntry>> {
    let mut entries: Vec<SubnetEntry> = Vec::new();
    for iface in getifs::interfaces()? {
        let flags = iface.flags();
        if flags.contains(Flags::LOOPBACK) || !flags.contains(Flags::UP) {
            continue;
        }
        let addrs = match iface.addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!(interface = %iface.name(), error = %e, "address lookup failed, skipping interface");
                continue;
            }
        };
        for addr in addrs {
            let IpAddr::V4(v4) = addr.addr() else {
                continue;
            };
            let entry =
                SubnetEntry::new(iface.name().to_string(), v4, flags.contains(Flags::RUNNING));
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
    }
    if include_ics_bridge && !entries.iter().any(SubnetEntry::is_bridged) {
        entries.push(SubnetEntry::new(
            "ics-bridge".to_string(),
            Ipv4Addr::new(192, 168, 137, 1),
            true,
        ));
    }
    Ok(entries)
}
