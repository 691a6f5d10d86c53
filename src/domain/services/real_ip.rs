//! Real client IP resolution
//!
//! Recovers the client address from a forwarding header when the direct
//! peer is a trusted proxy.

use crate::domain::entities::ConnectionInfo;
use crate::domain::ports::HttpRequest;
use serde::Deserialize;
use std::net::IpAddr;

fn default_header() -> String {
    "X-Real-IP".to_string()
}

/// Options accepted by the resolver, usually taken from load balancer
/// options.
#[derive(Debug, Clone, Deserialize)]
pub struct RealIpConfig {
    /// Header carrying the client address.
    #[serde(default = "default_header")]
    pub header: String,
    /// Trusted proxy networks. Empty trusts every peer.
    #[serde(default)]
    pub from: Vec<String>,
    /// Walk the header right to left, skipping trusted addresses.
    #[serde(default)]
    pub recursive: bool,
}

impl Default for RealIpConfig {
    fn default() -> Self {
        Self {
            header: default_header(),
            from: Vec::new(),
            recursive: false,
        }
    }
}

/// An IPv4 or IPv6 network in CIDR notation. A bare address is a host
/// network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr.parse::<IpAddr>().ok()?, Some(prefix.parse::<u8>().ok()?)),
            None => (s.parse::<IpAddr>().ok()?, None),
        };

        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = prefix.unwrap_or(max);
        if prefix > max {
            return None;
        }
        Some(Self {
            network: addr,
            prefix,
        })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

/// Header based client IP resolver.
#[derive(Debug, Clone)]
pub struct RealIpResolver {
    header: String,
    from: Vec<Cidr>,
    recursive: bool,
}

impl RealIpResolver {
    /// Build a resolver. Invalid networks are skipped with a warning.
    pub fn new(config: RealIpConfig) -> Self {
        let from = config
            .from
            .iter()
            .filter_map(|s| {
                let cidr = Cidr::parse(s);
                if cidr.is_none() {
                    tracing::warn!("ignoring invalid trusted network {:?}", s);
                }
                cidr
            })
            .collect();

        Self {
            header: config.header,
            from,
            recursive: config.recursive,
        }
    }

    fn trusted(&self, ip: IpAddr) -> bool {
        self.from.is_empty() || self.from.iter().any(|net| net.contains(ip))
    }

    /// Client address for `req`.
    ///
    /// Falls back to the connection's peer address when the header is
    /// missing, unparsable, or the peer is not trusted.
    pub fn resolve(&self, req: &HttpRequest) -> Option<IpAddr> {
        let peer = ConnectionInfo::from_request(req).map(|info| info.remote_addr.ip());

        if let Some(peer) = peer {
            if !self.trusted(peer) {
                return Some(peer);
            }
        }

        let candidates: Vec<IpAddr> = req
            .headers()
            .get_all(self.header.as_str())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .filter_map(|s| s.trim().parse::<IpAddr>().ok())
            .collect();

        let resolved = if self.recursive {
            candidates
                .iter()
                .rev()
                .find(|ip| !self.trusted(**ip))
                .or_else(|| candidates.first())
                .copied()
        } else {
            candidates.last().copied()
        };

        resolved.or(peer)
    }
}
