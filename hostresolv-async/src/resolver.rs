//! Hostname resolution over an `async-io` socket.

use std::{
    io,
    net::{IpAddr, UdpSocket},
    time::{Duration, Instant},
};

use async_io::{Async, Timer};
use futures_lite::future;
use hostresolv::{
    cache::{EntryState, ResolvStatus},
    config::ResolverConfig,
    resolver::Resolver,
    socket::bind_mdns_socket,
    MDNS_BUFFER_SIZE,
};

pub use hostresolv::resolver::{IdentityState, ResolverEvent};

/// A [`Resolver`] driven over an asynchronous UDP socket.
///
/// The engine only makes progress while one of the `async` methods is being awaited. To keep
/// answering mDNS requests in the background, spawn a task that calls
/// [`AsyncResolver::run_once`] in a loop.
pub struct AsyncResolver {
    resolver: Resolver,
    sock: Async<UdpSocket>,
}

impl AsyncResolver {
    /// Upper bound on how long a single [`AsyncResolver::run_once`] waits for a packet.
    const POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Binds the mDNS socket for the configured family and starts the engine.
    pub fn new(config: ResolverConfig) -> io::Result<Self> {
        let sock = bind_mdns_socket(config.family)?;
        Self::with_socket(config, sock)
    }

    /// Runs the engine over an already configured socket.
    pub fn with_socket(config: ResolverConfig, sock: UdpSocket) -> io::Result<Self> {
        let resolver = Resolver::new(config, Instant::now())?;
        Ok(Self {
            resolver,
            sock: Async::new(sock)?,
        })
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut Resolver {
        &mut self.resolver
    }

    /// Returns the next event raised by the engine.
    pub fn poll_event(&mut self) -> Option<ResolverEvent> {
        self.resolver.poll_event()
    }

    /// Resolves `name`, returning `Ok(None)` if it could not be resolved.
    ///
    /// A cached address is returned without touching the network.
    pub async fn resolve(&mut self, name: &str) -> io::Result<Option<IpAddr>> {
        if let (ResolvStatus::Cached, Some(addr)) = self.resolver.lookup(name, Instant::now()) {
            return Ok(Some(addr));
        }

        self.resolver.query(name, Instant::now())?;
        self.resolver.handle_timeout(Instant::now());
        loop {
            match self.resolver.lookup(name, Instant::now()) {
                (ResolvStatus::Cached | ResolvStatus::Expired, addr) => return Ok(addr),
                (ResolvStatus::NotFound, _) => return Ok(None),
                (ResolvStatus::Resolving, _) => {}
                (ResolvStatus::Uncached, _) => {
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
            self.run_once().await?;
        }
    }

    /// Sends queued datagrams, waits for one packet or the engine's next timer, and handles
    /// whatever came due.
    pub async fn run_once(&mut self) -> io::Result<()> {
        self.flush().await;

        let now = Instant::now();
        let wait = match self.resolver.poll_timeout() {
            Some(deadline) => Self::POLL_INTERVAL.min(deadline.saturating_duration_since(now)),
            None => Self::POLL_INTERVAL,
        };

        let mut buf = [0; MDNS_BUFFER_SIZE];
        let timeout = async {
            Timer::after(wait).await;
            Ok(None)
        };
        let recv = async { self.sock.recv_from(&mut buf).await.map(Some) };
        if let Some((len, source)) = future::or(recv, timeout).await? {
            self.resolver
                .handle_datagram(source, &buf[..len], Instant::now());
        }

        self.resolver.handle_timeout(Instant::now());
        self.flush().await;
        Ok(())
    }

    async fn flush(&mut self) {
        while let Some(transmit) = self.resolver.poll_transmit() {
            if let Err(e) = self
                .sock
                .send_to(&transmit.payload, transmit.destination)
                .await
            {
                log::warn!("failed to send to {}: {}", transmit.destination, e);
            }
        }
    }
}
