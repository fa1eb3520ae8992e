use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};

use tracing::trace;

/// Turns a host name or dotted-quad string into a numeric IPv4 address.
///
/// Returns `0` when the input can not be resolved; callers treat that as an
/// ordinary empty outcome rather than an error.
pub trait AddressResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, host: &str) -> u32;
}

/// Resolver backed by IPv4 literal parsing and the operating system's
/// name lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl AddressResolver for SystemResolver {
    fn resolve(&self, host: &str) -> u32 {
        let host = host.trim();
        if host.is_empty() {
            return 0;
        }
        if let Ok(addr) = host.parse::<Ipv4Addr>() {
            return u32::from(addr);
        }

        // only a name can go through DNS; reject other address-looking input
        if host.parse::<std::net::IpAddr>().is_ok() {
            return 0;
        }

        let ipnum = match (host, 0u16).to_socket_addrs() {
            Ok(addrs) => addrs
                .filter_map(|a| match a {
                    SocketAddr::V4(v4) => Some(u32::from(*v4.ip())),
                    SocketAddr::V6(_) => None,
                })
                .next()
                .unwrap_or(0),
            Err(_) => 0,
        };
        trace!(host, ipnum, "resolved host");
        ipnum
    }
}

/// Bound `host` to at most `max` bytes without splitting a character.
pub(crate) fn bounded(host: &str, max: usize) -> String {
    if host.len() <= max {
        return host.to_owned();
    }
    let mut end = max;
    while !host.is_char_boundary(end) {
        end -= 1;
    }
    host[..end].to_owned()
}
