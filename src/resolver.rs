//! The sans-I/O resolver engine.
//!
//! [`Resolver`] performs no I/O of its own. The caller feeds it received datagrams
//! ([`Resolver::handle_datagram`]) and timer expirations ([`Resolver::handle_timeout`]), and
//! drains the datagrams it wants sent ([`Resolver::poll_transmit`]) and the events it raised
//! ([`Resolver::poll_event`]). [`SyncResolver`][crate::socket::SyncResolver] is a ready-made
//! driver over a blocking socket.
//!
//! ```
//! use hostresolv::{config::ResolverConfig, resolver::Resolver, cache::ResolvStatus};
//! use std::time::Instant;
//!
//! let now = Instant::now();
//! let mut resolver = Resolver::new(ResolverConfig::default().with_responder(false), now)?;
//! resolver.query("example.com", now)?;
//! resolver.handle_timeout(now);
//!
//! let transmit = resolver.poll_transmit().unwrap();
//! assert_eq!(transmit.destination.port(), 53);
//! assert_eq!(resolver.lookup("example.com", now).0, ResolvStatus::Resolving);
//! # Ok::<(), hostresolv::Error>(())
//! ```

mod identity;
mod query;
mod response;

use std::{
    collections::VecDeque,
    net::{IpAddr, SocketAddr},
    time::Instant,
};

use crate::{
    cache::{Cache, EntryName, ResolvStatus},
    config::ResolverConfig,
    Error,
};

use self::identity::Identity;

pub use self::identity::{encode_announcement, IdentityState};
pub use self::query::encode_query;

/// A datagram the resolver wants sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    pub destination: SocketAddr,
    pub payload: Vec<u8>,
}

/// Notifications raised by the [`Resolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverEvent {
    /// Resolution of `name` finished, successfully or not.
    ///
    /// This only signals that something changed; [`Resolver::lookup`] reports the current state.
    Found { name: String, addr: Option<IpAddr> },
    /// Nobody else answered for our hostname, so it is ours now and is being announced.
    HostnameReady(String),
    /// Another host answered for our hostname. Probing restarts with the renamed hostname.
    HostnameConflict { previous: String, renamed: String },
}

/// Resolver context: the cache, the mDNS identity, and the outgoing queues.
pub struct Resolver {
    config: ResolverConfig,
    cache: Cache,
    dns_server: IpAddr,
    identity: Identity,
    /// When the query scheduler should run next.
    next_tick: Option<Instant>,
    write_outs: VecDeque<Transmit>,
    event_outs: VecDeque<ResolverEvent>,
}

impl Resolver {
    /// Creates a resolver with an empty cache.
    ///
    /// When the configuration makes this resolver an mDNS responder, probing for the configured
    /// hostname is scheduled right away. Fails if that hostname is unusable, and with
    /// [`Error::InvalidValue`] if the cache has no room for a single entry.
    pub fn new(config: ResolverConfig, now: Instant) -> Result<Self, Error> {
        if config.capacity == 0 {
            return Err(Error::InvalidValue);
        }
        let identity = Identity::new(&config)?;
        let mut this = Self {
            cache: Cache::new(config.capacity),
            dns_server: config.dns_server(),
            identity,
            next_tick: None,
            write_outs: VecDeque::new(),
            event_outs: VecDeque::new(),
            config,
        };
        this.start_probe(now);
        Ok(this)
    }

    /// Starts resolving `name`.
    ///
    /// Names under `.local` are resolved over mDNS (if enabled), everything else is sent to the
    /// configured DNS server. Progress is reported through [`Resolver::poll_event`] and
    /// [`Resolver::lookup`].
    pub fn query(&mut self, name: &str, now: Instant) -> Result<(), Error> {
        let name = EntryName::new(name)?;
        name.to_domain()?;

        let index = self.cache.claim(name, self.config.mdns, now);
        log::debug!("query for {} claimed entry {}", name, index);
        self.next_tick = Some(now);
        Ok(())
    }

    /// Reports what is currently known about `name`.
    pub fn lookup(&self, name: &str, now: Instant) -> (ResolvStatus, Option<IpAddr>) {
        let Ok(name) = EntryName::new(name) else {
            return (ResolvStatus::Uncached, None);
        };
        if self.config.loopback_shortcut && name.as_bytes().eq_ignore_ascii_case(b"localhost") {
            return (ResolvStatus::Cached, Some(self.config.family.loopback()));
        }
        self.cache.lookup(&name, now)
    }

    /// Changes the local hostname (without `.local`) and, as a responder, probes for it.
    pub fn set_hostname(&mut self, hostname: &str, now: Instant) -> Result<(), Error> {
        self.identity.set_hostname(hostname)?;
        self.start_probe(now);
        Ok(())
    }

    /// Returns the local hostname, without `.local`.
    pub fn hostname(&self) -> &str {
        self.identity.hostname()
    }

    pub fn identity_state(&self) -> IdentityState {
        self.identity.state()
    }

    /// Sets the server that unicast queries are sent to.
    pub fn configure_dns_server(&mut self, server: IpAddr) {
        log::debug!("using DNS server {}", server);
        self.dns_server = server;
    }

    pub fn dns_server(&self) -> IpAddr {
        self.dns_server
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Read-only view of the cache table.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Runs everything that has come due: a pending announcement, a scheduled probe, and the
    /// query scheduler.
    pub fn handle_timeout(&mut self, now: Instant) {
        if self.identity.take_announce(now) && self.identity.state() == IdentityState::Ready {
            self.announce();
        }
        if self.identity.take_probe(now) {
            self.send_probe(now);
        }
        if self.next_tick.map_or(false, |tick| tick <= now) {
            self.next_tick = None;
            self.check_entries(now);
        }
    }

    /// Returns when [`Resolver::handle_timeout`] should be called next.
    pub fn poll_timeout(&self) -> Option<Instant> {
        [
            self.next_tick,
            self.identity.probe_at(),
            self.identity.announce_at(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Returns the next datagram to send.
    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.write_outs.pop_front()
    }

    /// Returns the next event.
    pub fn poll_event(&mut self) -> Option<ResolverEvent> {
        self.event_outs.pop_front()
    }

    /// Reports a finished resolution, unless it is the outcome of our own hostname probe.
    fn notify(&mut self, name: EntryName, addr: Option<IpAddr>, now: Instant) {
        if self.identity_result(&name, addr, now) {
            return;
        }

        match addr {
            Some(addr) => log::debug!("found address for {}: {}", name, addr),
            None => log::debug!("unable to resolve {}", name),
        }
        self.event_outs.push_back(ResolverEvent::Found {
            name: name.as_str().into_owned(),
            addr,
        });
    }
}
