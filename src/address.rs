//! Bind address handling
//!
//! Addresses are `host:port` strings. An empty host (`:3000`) means every
//! IPv4 interface. Hostnames are resolved at bind time.

use crate::error::BindError;

const ALL_INTERFACES: &str = "0.0.0.0";

/// Check `addr` and fill in the wildcard host if it was omitted
pub fn normalize_bind_addr(addr: &str) -> Result<String, BindError> {
    let addr = addr.trim();
    let invalid = |reason: String| BindError::InvalidAddress {
        addr: addr.to_string(),
        reason,
    };

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| invalid("expected host:port".to_string()))?;

    port.parse::<u16>()
        .map_err(|e| invalid(format!("bad port '{}': {}", port, e)))?;

    let host = if host.is_empty() { ALL_INTERFACES } else { host };
    Ok(format!("{}:{}", host, port))
}

/// Replace the port of a `host:port` string, keeping the host
pub fn replace_port(addr: &str, port: u16) -> String {
    match addr.rsplit_once(':') {
        Some((host, _)) => format!("{}:{}", host, port),
        None => format!("{}:{}", addr, port),
    }
}
