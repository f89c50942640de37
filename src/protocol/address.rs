//! Data connection address encoding
//!
//! Handles the `h1,h2,h3,h4,p1,p2` form used by PORT/PASV and the
//! `|proto|addr|port|` form used by EPRT/EPSV.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::error::AddressError;

/// Encodes an IPv4 socket address as `h1,h2,h3,h4,p1,p2`.
pub fn encode_host_port(addr: SocketAddrV4) -> String {
    let [h1, h2, h3, h4] = addr.ip().octets();
    let port = addr.port();
    format!("{},{},{},{},{},{}", h1, h2, h3, h4, port >> 8, port & 0xff)
}

/// Decodes `h1,h2,h3,h4,p1,p2`, tolerating surrounding parentheses and spaces.
pub fn decode_host_port(arg: &str) -> Result<SocketAddr, AddressError> {
    let trimmed = arg.trim().trim_start_matches('(').trim_end_matches(')');
    let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(AddressError::Malformed(arg.to_string()));
    }

    let mut octets = [0u8; 6];
    for (slot, field) in octets.iter_mut().zip(&fields) {
        *slot = field
            .parse::<u8>()
            .map_err(|_| AddressError::Malformed(arg.to_string()))?;
    }

    let ip = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
    let port = u16::from(octets[4]) << 8 | u16::from(octets[5]);
    if port == 0 {
        return Err(AddressError::InvalidPort(arg.to_string()));
    }
    Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
}

/// Encodes an EPRT-style argument, `|1|addr|port|` or `|2|addr|port|`.
pub fn encode_extended(addr: SocketAddr) -> String {
    let proto = match addr.ip() {
        IpAddr::V4(_) => 1,
        IpAddr::V6(_) => 2,
    };
    format!("|{}|{}|{}|", proto, addr.ip(), addr.port())
}

/// Decodes an EPRT argument. The first character is the field delimiter.
pub fn decode_extended(arg: &str) -> Result<SocketAddr, AddressError> {
    let arg = arg.trim();
    let delimiter = arg
        .chars()
        .next()
        .ok_or_else(|| AddressError::Malformed(arg.to_string()))?;
    let fields: Vec<&str> = arg.split(delimiter).collect();
    // A well-formed argument yields: "", proto, addr, port, ""
    if fields.len() != 5 || !fields[0].is_empty() || !fields[4].is_empty() {
        return Err(AddressError::Malformed(arg.to_string()));
    }

    let ip: IpAddr = fields[2]
        .parse()
        .map_err(|_| AddressError::Malformed(arg.to_string()))?;
    match (fields[1], ip) {
        ("1", IpAddr::V4(_)) | ("2", IpAddr::V6(_)) => {}
        ("1", _) | ("2", _) => return Err(AddressError::FamilyMismatch(arg.to_string())),
        (other, _) => return Err(AddressError::UnsupportedFamily(other.to_string())),
    }

    let port: u16 = fields[3]
        .parse()
        .map_err(|_| AddressError::InvalidPort(arg.to_string()))?;
    if port == 0 {
        return Err(AddressError::InvalidPort(arg.to_string()));
    }
    Ok(SocketAddr::new(ip, port))
}

/// Text of a 229 reply for the given passive port.
pub fn epsv_reply_text(port: u16) -> String {
    format!("Entering Extended Passive Mode (|||{port}|)")
}

/// Text of a 227 reply for the given passive address.
pub fn pasv_reply_text(addr: SocketAddrV4) -> String {
    format!("Entering Passive Mode ({})", encode_host_port(addr))
}
