// src/exec/port.rs

//! Port parsing and nearby-port allocation.

use std::net::{Ipv4Addr, TcpListener};

use tracing::{debug, warn};

use crate::errors::{Result, SupervisorError};

/// How far from the desired port the allocator searches, in each direction.
pub const PORT_SEARCH_RADIUS: u16 = 10;

/// Parse a port string such as `"3000"` or `":3000"`.
pub fn parse_port(raw: &str) -> Result<u16> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix(':').unwrap_or(trimmed);
    match digits.parse::<u16>() {
        Ok(0) | Err(_) => Err(SupervisorError::InvalidPort(raw.to_string())),
        Ok(port) => Ok(port),
    }
}

/// True if nothing currently listens on `port`, on either the wildcard or
/// the loopback address.
///
/// The probe listeners are dropped immediately.
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
        && TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}

/// Candidate ports in search order: `desired`, `desired+1`, `desired-1`,
/// `desired+2`, ... up to `radius`, skipping values outside `1..=65535`.
pub fn candidate_ports(desired: u16, radius: u16) -> Vec<u16> {
    let mut out = Vec::with_capacity(1 + 2 * radius as usize);
    out.push(desired);
    for offset in 1..=radius {
        if let Some(up) = desired.checked_add(offset) {
            out.push(up);
        }
        if let Some(down) = desired.checked_sub(offset).filter(|p| *p > 0) {
            out.push(down);
        }
    }
    out
}

/// Pick the nearest port to `desired` for which `available` holds.
///
/// Returns `None` if no candidate within `radius` is available.
pub fn find_port_with<F>(desired: u16, radius: u16, mut available: F) -> Option<u16>
where
    F: FnMut(u16) -> bool,
{
    candidate_ports(desired, radius)
        .into_iter()
        .find(|p| available(*p))
}

/// Resolve the port a new instance should bind.
///
/// Prefers `desired` if free, else the nearest free port within
/// [`PORT_SEARCH_RADIUS`]. If everything nearby is busy the desired port is
/// returned anyway; the launch may then fail and be retried.
pub fn select_port(desired: u16) -> u16 {
    match find_port_with(desired, PORT_SEARCH_RADIUS, is_port_available) {
        Some(port) if port == desired => port,
        Some(port) => {
            debug!(desired, port, "desired port busy; using nearby port");
            port
        }
        None => {
            warn!(
                desired,
                radius = PORT_SEARCH_RADIUS,
                "no free port near the desired one; trying the desired port anyway"
            );
            desired
        }
    }
}
