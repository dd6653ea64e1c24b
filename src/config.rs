//! Resolver configuration.
//!
//! ```
//! use hostresolv::config::{AddressFamily, ResolverConfig};
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! let config = ResolverConfig::default()
//!     .with_family(AddressFamily::V4)
//!     .with_hostname("sensor")
//!     .with_local_addrs(vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))])
//!     .with_link_layer_addr(vec![0x02, 0x00, 0x5e, 0x10, 0x20, 0x30]);
//! assert_eq!(config.capacity, 4);
//! ```

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    time::Duration,
};

use crate::packet::Type;

/// Default number of cache entries.
pub const DEFAULT_CAPACITY: usize = 4;

/// Default retry limit for unicast queries.
pub const DEFAULT_MAX_RETRIES: u8 = 8;

/// Default retry limit for multicast queries.
pub const DEFAULT_MAX_MDNS_RETRIES: u8 = 4;

/// Hostname claimed when none is configured.
pub const DEFAULT_HOSTNAME: &str = "device";

const DEFAULT_PROBE_JITTER: Duration = Duration::from_millis(250);

/// The address family the resolver queries for and announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    #[default]
    V4,
    V6,
}

impl AddressFamily {
    /// Returns the address record type for this family.
    pub fn record_type(self) -> Type {
        match self {
            AddressFamily::V4 => Type::A,
            AddressFamily::V6 => Type::AAAA,
        }
    }

    /// Returns the size of an address in bytes.
    pub fn addr_len(self) -> usize {
        match self {
            AddressFamily::V4 => 4,
            AddressFamily::V6 => 16,
        }
    }

    /// Returns the mDNS multicast group.
    pub fn mdns_group(self) -> IpAddr {
        match self {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::new(224, 0, 0, 251)),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb)),
        }
    }

    pub fn loopback(self) -> IpAddr {
        match self {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::LOCALHOST),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::LOCALHOST),
        }
    }

    /// Returns the unicast server used when none is configured.
    pub fn default_dns_server(self) -> IpAddr {
        match self {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::new(0x2001, 0x470, 0x20, 0, 0, 0, 0, 2)),
        }
    }

    /// Returns the unspecified address, for binding sockets.
    pub fn unspecified(self) -> IpAddr {
        match self {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    /// Returns whether `addr` belongs to this family.
    pub fn contains(self, addr: &IpAddr) -> bool {
        matches!(
            (self, addr),
            (AddressFamily::V4, IpAddr::V4(_)) | (AddressFamily::V6, IpAddr::V6(_))
        )
    }
}

/// Configuration of a [`Resolver`][crate::resolver::Resolver].
///
/// Built from [`ResolverConfig::default`] with the `with_*` methods.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Address family queried for and announced. Default: [`AddressFamily::V4`].
    pub family: AddressFamily,
    /// Number of cache entries. Fixed for the resolver's lifetime. Default: 4.
    pub capacity: usize,
    /// Retry limit for queries sent to the unicast server. Default: 8.
    pub max_retries: u8,
    /// Retry limit for multicast queries. Default: 4.
    pub max_mdns_retries: u8,
    /// Unicast DNS server. Default: the family's [`AddressFamily::default_dns_server`].
    pub dns_server: Option<IpAddr>,
    /// Resolve names under `.local` over multicast. Default: `true`.
    pub mdns: bool,
    /// Claim [`hostname`](Self::hostname) and answer queries for it. Default: `true`.
    ///
    /// Has no effect unless [`mdns`](Self::mdns) is enabled.
    pub responder: bool,
    /// Local hostname, without the `.local` suffix. Default: `"device"`.
    pub hostname: String,
    /// Addresses announced for the hostname. Addresses of the other family are ignored.
    pub local_addrs: Vec<IpAddr>,
    /// Announce routable IPv6 addresses in addition to link-local ones. Default: `false`.
    pub include_global_v6: bool,
    /// Link-layer address, used to derive a new hostname after a conflict.
    pub link_layer_addr: Vec<u8>,
    /// Answer `localhost` lookups with the loopback address. Default: `true`.
    pub loopback_shortcut: bool,
    /// Upper bound of the random delay before a probe is sent. Default: 250ms.
    pub probe_jitter: Duration,
    /// Seed for the probe jitter. Default: random.
    pub rng_seed: Option<u64>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            family: AddressFamily::V4,
            capacity: DEFAULT_CAPACITY,
            max_retries: DEFAULT_MAX_RETRIES,
            max_mdns_retries: DEFAULT_MAX_MDNS_RETRIES,
            dns_server: None,
            mdns: true,
            responder: true,
            hostname: DEFAULT_HOSTNAME.to_string(),
            local_addrs: Vec::new(),
            include_global_v6: false,
            link_layer_addr: Vec::new(),
            loopback_shortcut: true,
            probe_jitter: DEFAULT_PROBE_JITTER,
            rng_seed: None,
        }
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_family(mut self, family: AddressFamily) -> Self {
        self.family = family;
        self
    }

    /// Sets the number of cache entries. Must be at least 1.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_retries(mut self, unicast: u8, multicast: u8) -> Self {
        self.max_retries = unicast;
        self.max_mdns_retries = multicast;
        self
    }

    pub fn with_dns_server(mut self, server: IpAddr) -> Self {
        self.dns_server = Some(server);
        self
    }

    pub fn with_mdns(mut self, enabled: bool) -> Self {
        self.mdns = enabled;
        self
    }

    pub fn with_responder(mut self, enabled: bool) -> Self {
        self.responder = enabled;
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_local_addrs(mut self, addrs: Vec<IpAddr>) -> Self {
        self.local_addrs = addrs;
        self
    }

    pub fn with_include_global_v6(mut self, include: bool) -> Self {
        self.include_global_v6 = include;
        self
    }

    pub fn with_link_layer_addr(mut self, addr: Vec<u8>) -> Self {
        self.link_layer_addr = addr;
        self
    }

    pub fn with_loopback_shortcut(mut self, enabled: bool) -> Self {
        self.loopback_shortcut = enabled;
        self
    }

    pub fn with_probe_jitter(mut self, jitter: Duration) -> Self {
        self.probe_jitter = jitter;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Returns whether the resolver claims a hostname and answers for it.
    pub fn is_responder(&self) -> bool {
        self.mdns && self.responder
    }

    /// Returns the configured unicast server, or the family default.
    pub fn dns_server(&self) -> IpAddr {
        self.dns_server
            .unwrap_or_else(|| self.family.default_dns_server())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.capacity, 4);
        assert_eq!(config.max_retries, 8);
        assert_eq!(config.max_mdns_retries, 4);
        assert_eq!(config.hostname, "device");
        assert!(config.is_responder());
        assert_eq!(config.dns_server(), IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)));

        let v6 = config.with_family(AddressFamily::V6);
        assert_eq!(v6.dns_server().to_string(), "2001:470:20::2");
        assert_eq!(v6.family.mdns_group().to_string(), "ff02::fb");
        assert_eq!(v6.family.record_type(), Type::AAAA);
    }

    #[test]
    fn responder_requires_mdns() {
        let config = ResolverConfig::default().with_mdns(false);
        assert!(config.responder);
        assert!(!config.is_responder());
    }
}
