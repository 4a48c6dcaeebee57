use std::net::{IpAddr, SocketAddr};

use anyhow::{anyhow, Result};

use crate::transport::ServerSpec;

/// Default DNS port used when an address omits one
pub const DEFAULT_DNS_PORT: u16 = 53;

/// Resolve a configured server address to a socket address.
///
/// Anything `SocketAddr` accepts is taken as-is. Otherwise the input must be
/// a bare IP, optionally in brackets, and gets [`DEFAULT_DNS_PORT`].
pub fn parse_address(input: &str) -> Result<SocketAddr> {
	let input = input.trim();
	if input.is_empty() {
		return Err(anyhow!("empty server address"));
	}
	if let Ok(addr) = input.parse::<SocketAddr>() {
		return Ok(addr);
	}

	let host = input
		.strip_prefix('[')
		.and_then(|rest| rest.strip_suffix(']'))
		.unwrap_or(input);
	host.parse::<IpAddr>()
		.map(|ip| SocketAddr::new(ip, DEFAULT_DNS_PORT))
		.map_err(|e| anyhow!("invalid server address '{}': {}", input, e))
}

/// Build a named server from its configured name and address.
pub fn parse_server(name: &str, address: &str) -> Result<ServerSpec> {
	let name = name.trim();
	if name.is_empty() {
		return Err(anyhow!("empty server name"));
	}
	let addr = parse_address(address)?;
	Ok(ServerSpec { name: name.to_string(), addr })
}
