//! mDNS identity: claiming the local hostname and announcing it.
//!
//! Before answering for `<hostname>.local` the resolver asks the network whether anyone else
//! already uses that name. If somebody answers, the hostname gets a suffix derived from the
//! link-layer address and the probe starts over. If the probe times out, the name is ours.

use std::{
    net::{IpAddr, SocketAddr},
    time::{Duration, Instant},
};

use crate::{
    cache::{EntryName, MAX_NAME_LEN},
    config::{AddressFamily, ResolverConfig},
    hex::{self, Hex},
    packet::{
        encoder::{MessageEncoder, ResourceRecord},
        name::DomainName,
        records::{Record, NSEC},
        Header,
    },
    Error, MDNS_BUFFER_SIZE, MDNS_PORT,
};

use super::{Resolver, ResolverEvent, Transmit};

/// TTL of the records in our announcements, in seconds.
pub(crate) const ANNOUNCE_TTL: u32 = 120;

const LOCAL_SUFFIX: &str = ".local";

/// Longest hostname that still fits a cache entry once `.local` is appended.
const MAX_HOSTNAME_LEN: usize = MAX_NAME_LEN - LOCAL_SUFFIX.len();

/// Where the resolver stands in claiming its hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityState {
    /// A probe is scheduled but has not been sent.
    WaitBeforeProbe,
    /// The probe query is out and nobody has answered yet.
    Probing,
    /// The hostname is ours.
    Ready,
}

pub(super) struct Identity {
    hostname: String,
    state: IdentityState,
    probe_at: Option<Instant>,
    /// Set while an announcement is pending. Further requests before it goes out are coalesced.
    announce_at: Option<Instant>,
    rng: fastrand::Rng,
}

fn validate_hostname(hostname: &str) -> Result<(), Error> {
    if hostname.is_empty() {
        return Err(Error::InvalidEmptyLabel);
    }
    if hostname.len() > MAX_HOSTNAME_LEN {
        return Err(Error::NameTooLong);
    }
    EntryName::new(&format!("{}{}", hostname, LOCAL_SUFFIX))?.to_domain()?;
    Ok(())
}

impl Identity {
    pub(super) fn new(config: &ResolverConfig) -> Result<Self, Error> {
        validate_hostname(&config.hostname)?;
        Ok(Self {
            hostname: config.hostname.clone(),
            state: IdentityState::WaitBeforeProbe,
            probe_at: None,
            announce_at: None,
            rng: match config.rng_seed {
                Some(seed) => fastrand::Rng::with_seed(seed),
                None => fastrand::Rng::new(),
            },
        })
    }

    pub(super) fn set_hostname(&mut self, hostname: &str) -> Result<(), Error> {
        validate_hostname(hostname)?;
        self.hostname = hostname.to_string();
        Ok(())
    }

    pub(super) fn hostname(&self) -> &str {
        &self.hostname
    }

    pub(super) fn state(&self) -> IdentityState {
        self.state
    }

    pub(super) fn probe_at(&self) -> Option<Instant> {
        self.probe_at
    }

    pub(super) fn announce_at(&self) -> Option<Instant> {
        self.announce_at
    }

    fn fqdn(&self) -> String {
        format!("{}{}", self.hostname, LOCAL_SUFFIX)
    }

    /// Clears and reports a probe that has come due.
    pub(super) fn take_probe(&mut self, now: Instant) -> bool {
        take_due(&mut self.probe_at, now)
    }

    /// Clears and reports an announcement that has come due.
    pub(super) fn take_announce(&mut self, now: Instant) -> bool {
        take_due(&mut self.announce_at, now)
    }

    /// Appends the conflict suffix, shortening the hostname so the result still fits.
    fn rename(&mut self, link_layer_addr: &[u8]) {
        let suffix = if link_layer_addr.is_empty() {
            let mut random = [0; 3];
            self.rng.fill(&mut random);
            hex::conflict_suffix(&random)
        } else {
            hex::conflict_suffix(link_layer_addr)
        };

        let mut keep = self.hostname.len().min(MAX_HOSTNAME_LEN - suffix.len());
        while !self.hostname.is_char_boundary(keep) {
            keep -= 1;
        }
        self.hostname.truncate(keep);
        self.hostname.push_str(&suffix);
    }
}

fn take_due(at: &mut Option<Instant>, now: Instant) -> bool {
    match *at {
        Some(due) if due <= now => {
            *at = None;
            true
        }
        _ => false,
    }
}

fn is_link_local_v6(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V6(v6) => v6.segments()[0] & 0xffc0 == 0xfe80,
        IpAddr::V4(_) => false,
    }
}

/// Writes an announcement of `hostname.local` into `buf`.
///
/// The message carries one answer per address and an NSEC record in the additional section
/// asserting that the family's address type is the only one we have.
pub fn encode_announcement(
    buf: &mut [u8],
    id: u16,
    fqdn: &str,
    family: AddressFamily,
    addrs: &[IpAddr],
) -> Result<usize, Error> {
    let name = DomainName::from_str(fqdn)?;
    let answers = addrs
        .iter()
        .map(|addr| Record::from_addr(*addr))
        .collect::<Vec<_>>();
    let nsec = Record::NSEC(NSEC::new(name.clone(), [family.record_type()]));

    let mut enc = MessageEncoder::new(buf);
    let mut header = Header::default();
    header.set_id(id);
    header.set_response(true);
    header.set_authority(true);
    enc.set_header(header);

    let mut enc = enc.answers();
    for rdata in &answers {
        enc.add_record(
            ResourceRecord::new(&name, rdata)
                .ttl(ANNOUNCE_TTL)
                .cache_flush(true),
        );
    }
    let mut enc = enc.additional();
    enc.add_record(
        ResourceRecord::new(&name, &nsec)
            .ttl(ANNOUNCE_TTL)
            .cache_flush(true),
    );
    enc.finish()
}

impl Resolver {
    /// Schedules a probe for the current hostname after a random delay.
    pub(super) fn start_probe(&mut self, now: Instant) {
        // Whatever was about to be announced belongs to a name we no longer hold.
        self.identity.announce_at = None;
        if !self.config.is_responder() {
            return;
        }

        let max_jitter = u64::try_from(self.config.probe_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = Duration::from_millis(self.identity.rng.u64(0..=max_jitter));
        self.identity.state = IdentityState::WaitBeforeProbe;
        self.identity.probe_at = Some(now + jitter);
        log::debug!(
            "probing for {} in {}ms",
            self.identity.fqdn(),
            jitter.as_millis()
        );
    }

    pub(super) fn send_probe(&mut self, now: Instant) {
        let fqdn = self.identity.fqdn();
        if let Err(e) = self.query(&fqdn, now) {
            log::warn!("cannot probe for {}: {}", fqdn, e);
            return;
        }
        self.identity.state = IdentityState::Probing;
    }

    /// Returns whether `name` is our own hostname and a probe is underway or done.
    pub(super) fn is_own_name(&self, name: &EntryName) -> bool {
        self.config.is_responder()
            && self.identity.state != IdentityState::WaitBeforeProbe
            && EntryName::new(&self.identity.fqdn()).map_or(false, |own| own == *name)
    }

    /// Consumes the outcome of a resolution of our own hostname.
    ///
    /// An address means someone else holds the name (unless it is one of ours, which happens when
    /// our own announcement loops back). No address means the probe went unanswered. Returns
    /// `false` if `name` is not ours, so the caller reports it as a normal result.
    pub(super) fn identity_result(
        &mut self,
        name: &EntryName,
        addr: Option<IpAddr>,
        now: Instant,
    ) -> bool {
        if !self.is_own_name(name) {
            return false;
        }

        match addr {
            Some(addr) if self.config.local_addrs.contains(&addr) => {
                log::trace!("ignoring our own record for {}", name);
            }
            Some(addr) => {
                let previous = self.identity.hostname.clone();
                self.identity.rename(&self.config.link_layer_addr);
                log::info!(
                    "name collision for {}.local ({} claims it), renaming to {}",
                    previous,
                    addr,
                    self.identity.hostname,
                );
                self.event_outs.push_back(ResolverEvent::HostnameConflict {
                    previous,
                    renamed: self.identity.hostname.clone(),
                });
                self.start_probe(now);
            }
            None => {
                log::info!("claimed hostname {}", name);
                self.identity.state = IdentityState::Ready;
                self.request_announce(now);
                self.event_outs
                    .push_back(ResolverEvent::HostnameReady(self.identity.hostname.clone()));
            }
        }
        true
    }

    pub(super) fn request_announce(&mut self, now: Instant) {
        if self.identity.announce_at.is_none() {
            self.identity.announce_at = Some(now);
        }
    }

    /// Addresses that go into announcements.
    fn announced_addrs(&self) -> Vec<IpAddr> {
        let family = self.config.family;
        self.config
            .local_addrs
            .iter()
            .filter(|addr| family.contains(addr))
            .filter(|addr| {
                family == AddressFamily::V4
                    || self.config.include_global_v6
                    || is_link_local_v6(addr)
            })
            .copied()
            .collect()
    }

    /// Multicasts our announcement.
    pub(super) fn announce(&mut self) {
        let group = SocketAddr::new(self.config.family.mdns_group(), MDNS_PORT);
        self.send_announcement(group, 0);
    }

    /// Sends our announcement to `destination`, carrying transaction ID `id`.
    pub(super) fn send_announcement(&mut self, destination: SocketAddr, id: u16) {
        let fqdn = self.identity.fqdn();
        let addrs = self.announced_addrs();
        let mut buf = [0; MDNS_BUFFER_SIZE];
        let len = match encode_announcement(&mut buf, id, &fqdn, self.config.family, &addrs) {
            Ok(len) => len,
            Err(e) => {
                log::warn!("failed to encode announcement for {}: {}", fqdn, e);
                return;
            }
        };

        log::debug!(
            "announcing {} ({} addresses) to {}",
            fqdn,
            addrs.len(),
            destination
        );
        log::trace!("raw announcement: {}", Hex(&buf[..len]));
        self.write_outs.push_back(Transmit {
            destination,
            payload: buf[..len].to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    fn identity(hostname: &str) -> Identity {
        Identity::new(&ResolverConfig::default().with_hostname(hostname)).unwrap()
    }

    #[test]
    fn hostname_bounds() {
        assert_eq!(validate_hostname(""), Err(Error::InvalidEmptyLabel));
        assert_eq!(
            validate_hostname(&"h".repeat(MAX_HOSTNAME_LEN + 1)),
            Err(Error::NameTooLong)
        );
        assert_eq!(validate_hostname(&"h".repeat(MAX_HOSTNAME_LEN)), Ok(()));
        assert_eq!(validate_hostname("a..b"), Err(Error::InvalidEmptyLabel));
    }

    #[test]
    fn rename_appends_link_layer_suffix() {
        let mut id = identity("device");
        id.rename(&[0x02, 0x00, 0x5e, 0x0a, 0xbc, 0xff]);
        assert_eq!(id.hostname(), "device-0a-bc-ff");
    }

    #[test]
    fn rename_truncates_to_fit() {
        let mut id = identity(&"h".repeat(MAX_HOSTNAME_LEN));
        id.rename(&[1, 2, 3]);
        assert_eq!(id.hostname().len(), MAX_HOSTNAME_LEN);
        assert!(id.hostname().ends_with("-01-02-03"));
        validate_hostname(id.hostname()).unwrap();
    }

    #[test]
    fn rename_without_link_layer_addr() {
        let mut id = Identity::new(
            &ResolverConfig::default()
                .with_hostname("device")
                .with_rng_seed(7),
        )
        .unwrap();
        id.rename(&[]);
        assert_ne!(id.hostname(), "device");
        assert_eq!(id.hostname().len(), "device".len() + 9);
    }

    #[test]
    fn link_local_filter() {
        assert!(is_link_local_v6(&IpAddr::V6(Ipv6Addr::new(
            0xfe80, 0, 0, 0, 0, 0, 0, 1
        ))));
        assert!(!is_link_local_v6(&IpAddr::V6(Ipv6Addr::new(
            0x2001, 0xdb8, 0, 0, 0, 0, 0, 1
        ))));
        assert!(!is_link_local_v6(&IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }
}
