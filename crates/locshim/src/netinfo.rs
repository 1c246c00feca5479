#![forbid(unsafe_code)]

//! Best-effort discovery of the device's outbound IP address.
//!
//! Connecting a UDP socket sends no traffic; it only asks the OS which
//! source address it would route from for the given destination. That
//! address is the one a remote client on the same network should target,
//! so it is what the control service shows on `/getip`.

use std::net::{IpAddr, UdpSocket};

/// The address the OS would use for outbound traffic, or `None` when no
/// suitable interface or route exists.
#[must_use]
pub fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    // Destination only seeds route selection; nothing is sent.
    socket.connect(("8.8.8.8", 80)).ok()?;
    let addr = socket.local_addr().ok()?;
    if addr.ip().is_unspecified() {
        None
    } else {
        Some(addr.ip())
    }
}
