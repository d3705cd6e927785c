use axum::http::HeaderMap;
use ipnet::IpNet;
use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Sentinel identifier for requests whose origin cannot be resolved.
/// Every such request shares one reputation and rate bucket.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Canonical client key used by the reputation and rate stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Normalize a raw address string into a client id.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::unknown();
        }
        if let Ok(ip) = trimmed.parse::<IpAddr>() {
            return Self::from(ip);
        }
        // Not a parseable address; strip the mapped prefix textually so
        // "::ffff:foo" and "foo" still land in the same bucket.
        let stripped = trimmed
            .strip_prefix("::ffff:")
            .or_else(|| trimmed.strip_prefix("::FFFF:"))
            .unwrap_or(trimmed);
        if stripped.is_empty() {
            Self::unknown()
        } else {
            Self(stripped.to_string())
        }
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_CLIENT.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_CLIENT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier as an IP address, when it is one.
    pub fn ip(&self) -> Option<IpAddr> {
        self.0.parse().ok()
    }
}

impl From<IpAddr> for ClientId {
    fn from(ip: IpAddr) -> Self {
        Self(normalize_ip(ip).to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize an IP address: IPv4-mapped IPv6 becomes IPv4 and the IPv6
/// loopback becomes 127.0.0.1, so one client cannot hold two buckets.
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) if v6.is_loopback() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        other => other,
    }
}

/// Derives the client id from transport info and proxy headers.
#[derive(Debug, Clone, Default)]
pub struct ClientIdentityResolver {
    /// Peers allowed to speak for the client via forwarding headers.
    /// Empty means every peer is trusted.
    trusted_proxies: Vec<IpNet>,
}

impl ClientIdentityResolver {
    pub fn new(trusted_proxies: Vec<IpNet>) -> Self {
        Self { trusted_proxies }
    }

    /// Resolution order: first `X-Forwarded-For` entry, `X-Real-IP`, socket
    /// peer, RFC 7239 `Forwarded: for=`, then the `unknown` sentinel.
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> ClientId {
        if self.honors_forwarding(peer) {
            if let Some(id) = header_str(headers, "x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
            {
                return ClientId::parse(id);
            }
            if let Some(id) = header_str(headers, "x-real-ip")
                .map(str::trim)
                .filter(|v| !v.is_empty())
            {
                return ClientId::parse(id);
            }
        }
        if let Some(ip) = peer {
            return ClientId::from(ip);
        }
        if let Some(id) = header_str(headers, "forwarded").and_then(forwarded_for) {
            return ClientId::parse(&id);
        }
        ClientId::unknown()
    }

    fn honors_forwarding(&self, peer: Option<IpAddr>) -> bool {
        if self.trusted_proxies.is_empty() {
            return true;
        }
        match peer {
            Some(ip) => {
                let ip = normalize_ip(ip);
                self.trusted_proxies.iter().any(|net| net.contains(&ip))
            }
            None => false,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Extract the first `for=` node of an RFC 7239 `Forwarded` header.
fn forwarded_for(value: &str) -> Option<String> {
    let first = value.split(',').next()?;
    first.split(';').find_map(|pair| {
        let (key, node) = pair.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("for") {
            return None;
        }
        let node = node.trim().trim_matches('"');
        // "[2001:db8::1]:4711" or "192.0.2.43:47011"
        let host = if let Some(rest) = node.strip_prefix('[') {
            rest.split(']').next().unwrap_or(rest)
        } else if node.matches(':').count() == 1 {
            node.split(':').next().unwrap_or(node)
        } else {
            node
        };
        if host.is_empty() || host.starts_with('_') || host.eq_ignore_ascii_case("unknown") {
            None
        } else {
            Some(host.to_string())
        }
    })
}
