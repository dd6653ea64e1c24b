//! Blocking driver: runs a [`Resolver`] over a UDP socket.

use std::{
    io,
    net::{IpAddr, SocketAddr, UdpSocket},
    time::{Duration, Instant},
};

use socket2::{Domain, Protocol, Socket, Type};

use crate::{
    cache::{EntryState, ResolvStatus},
    config::{AddressFamily, ResolverConfig},
    resolver::{Resolver, ResolverEvent},
    MDNS_BUFFER_SIZE, MDNS_PORT,
};

/// Opens the mDNS socket for `family`: bound to port 5353 on all interfaces, shared with other
/// responders on the host, and joined to the mDNS group.
pub fn bind_mdns_socket(family: AddressFamily) -> io::Result<UdpSocket> {
    let domain = match family {
        AddressFamily::V4 => Domain::IPV4,
        AddressFamily::V6 => Domain::IPV6,
    };
    let sock = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    sock.set_reuse_address(true)?;
    if family == AddressFamily::V6 {
        sock.set_only_v6(true)?;
    }
    sock.bind(&SocketAddr::new(family.unspecified(), MDNS_PORT).into())?;

    let sock = UdpSocket::from(sock);
    match family.mdns_group() {
        IpAddr::V4(group) => sock.join_multicast_v4(&group, &std::net::Ipv4Addr::UNSPECIFIED)?,
        IpAddr::V6(group) => sock.join_multicast_v6(&group, 0)?,
    }
    Ok(sock)
}

/// A [`Resolver`] driven over a blocking UDP socket.
pub struct SyncResolver {
    resolver: Resolver,
    sock: UdpSocket,
}

impl SyncResolver {
    const POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Binds the mDNS socket for the configured family and starts the engine.
    pub fn new(config: ResolverConfig) -> io::Result<Self> {
        let sock = bind_mdns_socket(config.family)?;
        Self::with_socket(config, sock)
    }

    /// Runs the engine over an already configured socket.
    pub fn with_socket(config: ResolverConfig, sock: UdpSocket) -> io::Result<Self> {
        let resolver = Resolver::new(config, Instant::now())?;
        Ok(Self { resolver, sock })
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut Resolver {
        &mut self.resolver
    }

    /// Starts resolving `name` in the background. Use [`SyncResolver::poll`] to make progress.
    pub fn query(&mut self, name: &str) -> io::Result<()> {
        self.resolver.query(name, Instant::now())?;
        self.resolver.handle_timeout(Instant::now());
        self.flush();
        Ok(())
    }

    /// Returns the next event raised by the engine.
    pub fn poll_event(&mut self) -> Option<ResolverEvent> {
        self.resolver.poll_event()
    }

    /// Resolves `name`, blocking until an answer arrives or resolution fails.
    ///
    /// Returns `Ok(None)` if the name could not be resolved. A cached address is returned
    /// without touching the network.
    pub fn resolve(&mut self, name: &str) -> io::Result<Option<IpAddr>> {
        if let (ResolvStatus::Cached, Some(addr)) = self.resolver.lookup(name, Instant::now()) {
            return Ok(Some(addr));
        }

        self.query(name)?;
        loop {
            match self.resolver.lookup(name, Instant::now()) {
                (ResolvStatus::Cached | ResolvStatus::Expired, addr) => return Ok(addr),
                (ResolvStatus::NotFound, _) => return Ok(None),
                (ResolvStatus::Resolving, _) => {}
                (ResolvStatus::Uncached, _) => {
                    // Failed within its negative-cache window, or evicted by other queries.
                    let pending = self
                        .resolver
                        .cache()
                        .get(name)
                        .map_or(false, |e| e.state() != EntryState::Error);
                    if !pending {
                        return Ok(None);
                    }
                }
            }
            self.poll(Self::POLL_INTERVAL)?;
        }
    }

    /// Runs one iteration: sends queued datagrams, waits up to `max_wait` (or until the engine's
    /// next timer) for a packet, and handles whatever came due.
    pub fn poll(&mut self, max_wait: Duration) -> io::Result<()> {
        self.flush();

        let now = Instant::now();
        let mut wait = max_wait;
        if let Some(deadline) = self.resolver.poll_timeout() {
            wait = wait.min(deadline.saturating_duration_since(now));
        }
        // A zero timeout is rejected by the socket.
        self.sock
            .set_read_timeout(Some(wait.max(Duration::from_millis(1))))?;

        let mut buf = [0; MDNS_BUFFER_SIZE];
        match self.sock.recv_from(&mut buf) {
            Ok((len, source)) => {
                self.resolver
                    .handle_datagram(source, &buf[..len], Instant::now());
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => return Err(e),
        }

        self.resolver.handle_timeout(Instant::now());
        self.flush();
        Ok(())
    }

    fn flush(&mut self) {
        while let Some(transmit) = self.resolver.poll_transmit() {
            if let Err(e) = self.sock.send_to(&transmit.payload, transmit.destination) {
                log::warn!("failed to send to {}: {}", transmit.destination, e);
            }
        }
    }
}
