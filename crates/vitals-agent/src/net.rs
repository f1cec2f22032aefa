//! Local address discovery for the `X-Real-IP` header and gRPC metadata.

use anyhow::{bail, Result};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Returns this host's first non-loopback IPv4 address.
///
/// The primary path "connects" a UDP socket to a public address (nothing is
/// sent) and reads the interface the OS picked. When the host has no route,
/// the interface list is scanned instead.
pub fn local_ip() -> Result<Ipv4Addr> {
    if let Ok(socket) = UdpSocket::bind("0.0.0.0:0") {
        if socket.connect("8.8.8.8:80").is_ok() {
            if let Ok(addr) = socket.local_addr() {
                if let IpAddr::V4(ip) = addr.ip() {
                    if !ip.is_loopback() && !ip.is_unspecified() {
                        return Ok(ip);
                    }
                }
            }
        }
    }

    let networks = sysinfo::Networks::new_with_refreshed_list();
    for (_name, data) in &networks {
        for network in data.ip_networks() {
            if let IpAddr::V4(ip) = network.addr {
                if !ip.is_loopback() && !ip.is_unspecified() {
                    return Ok(ip);
                }
            }
        }
    }

    bail!("no non-loopback IPv4 interface found")
}
