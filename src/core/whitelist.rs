//! Address whitelisting with CIDR support.
//!
//! A director's whitelist is evaluated against every resolved address during
//! reconciliation; rejected addresses are never acquired as backends.

use std::{net::IpAddr, str::FromStr};

/// CIDR network representation
#[derive(Debug, Clone)]
pub struct IpNetwork {
    /// Base IP address
    addr: IpAddr,
    /// Prefix length (e.g., 24 for /24)
    prefix_len: u8,
}

impl IpNetwork {
    /// Create a new IP network from an address and prefix length
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, String> {
        match addr {
            IpAddr::V4(_) if prefix_len > 32 => {
                return Err("IPv4 prefix length must be <= 32".to_string());
            }
            IpAddr::V6(_) if prefix_len > 128 => {
                return Err("IPv6 prefix length must be <= 128".to_string());
            }
            _ => {}
        }

        Ok(Self { addr, prefix_len })
    }

    /// Parse from CIDR notation (e.g., "192.168.1.0/24")
    pub fn parse(s: &str) -> Result<Self, String> {
        if let Some((ip_str, prefix_str)) = s.split_once('/') {
            let addr = IpAddr::from_str(ip_str).map_err(|e| format!("Invalid IP address: {e}"))?;
            let prefix_len: u8 = prefix_str
                .parse()
                .map_err(|e| format!("Invalid prefix length: {e}"))?;
            Self::new(addr, prefix_len)
        } else {
            // No prefix, treat as single IP (/32 or /128)
            let addr = IpAddr::from_str(s).map_err(|e| format!("Invalid IP address: {e}"))?;
            let prefix_len = match addr {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            };
            Ok(Self { addr, prefix_len })
        }
    }

    /// Check if an IP address is contained in this network
    pub fn contains(&self, ip: IpAddr) -> bool {
        // IPs must be same version
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let net_bits = u32::from(net);
                let addr_bits = u32::from(addr);
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    !0u32 << (32 - self.prefix_len)
                };
                (net_bits & mask) == (addr_bits & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let net_bits = u128::from(net);
                let addr_bits = u128::from(addr);
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    !0u128 << (128 - self.prefix_len)
                };
                (net_bits & mask) == (addr_bits & mask)
            }
            _ => false,
        }
    }
}

/// ACL filtering resolved addresses before acquisition.
#[derive(Debug, Clone)]
pub struct Whitelist {
    networks: Vec<IpNetwork>,
}

impl Whitelist {
    /// Parse a list of CIDR entries. Any malformed entry fails the whole
    /// list, carrying the offending entry in the message.
    pub fn parse(entries: &[String]) -> Result<Self, String> {
        let mut networks = Vec::with_capacity(entries.len());
        for entry in entries {
            let network = IpNetwork::parse(entry).map_err(|e| format!("'{entry}': {e}"))?;
            networks.push(network);
        }
        Ok(Self { networks })
    }

    /// Whether `ip` is permitted by any configured network.
    pub fn permits(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|network| network.contains(ip))
    }
}
