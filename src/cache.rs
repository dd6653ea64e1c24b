//! The fixed-capacity resolution cache.
//!
//! Every name the resolver knows about occupies one [`CacheEntry`]. The table never grows: when
//! all entries are taken, claiming a new name evicts one (see [`Cache::claim`]).

use std::{
    fmt,
    net::IpAddr,
    time::{Duration, Instant},
};

use crate::{packet::name::DomainName, packet::RCode, Error};

/// Maximum length of a name stored in the cache, in bytes.
pub const MAX_NAME_LEN: usize = 32;

/// How long a failed resolution is remembered before the name may be queried again.
pub const NEGATIVE_CACHE_TIME: Duration = Duration::from_secs(30);

const MDNS_SUFFIX: &[u8] = b".local";

/// A bounded, case-insensitive host name as stored in a cache entry.
///
/// Trailing dots are stripped on construction, so `"example.com."` and `"EXAMPLE.com"` name the
/// same entry.
#[derive(Clone, Copy)]
pub struct EntryName {
    buf: [u8; MAX_NAME_LEN],
    len: u8,
}

impl EntryName {
    /// Normalizes `name` and stores it.
    ///
    /// Returns [`Error::InvalidEmptyLabel`] if nothing is left after stripping trailing dots, or
    /// [`Error::NameTooLong`] if the name exceeds [`MAX_NAME_LEN`] bytes.
    pub fn new(name: &str) -> Result<Self, Error> {
        Self::from_bytes(name.trim_end_matches('.').as_bytes())
    }

    /// Converts a decoded domain name into an entry name.
    pub fn from_domain(name: &DomainName) -> Result<Self, Error> {
        Self::from_bytes(&name.to_dotted())
    }

    fn from_bytes(name: &[u8]) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::InvalidEmptyLabel);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(Error::NameTooLong);
        }
        let mut buf = [0; MAX_NAME_LEN];
        buf[..name.len()].copy_from_slice(name);
        Ok(Self {
            buf,
            len: name.len() as u8,
        })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..usize::from(self.len)]
    }

    /// Returns the name as a string, replacing invalid UTF-8.
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Returns whether this name lies in the `.local` multicast domain.
    pub fn is_multicast(&self) -> bool {
        let name = self.as_bytes();
        name.len() > MDNS_SUFFIX.len()
            && name[name.len() - MDNS_SUFFIX.len()..].eq_ignore_ascii_case(MDNS_SUFFIX)
    }

    /// Parses this name into a [`DomainName`] for encoding.
    pub fn to_domain(&self) -> Result<DomainName, Error> {
        std::str::from_utf8(self.as_bytes())
            .map_err(|_| Error::InvalidValue)?
            .parse()
    }
}

impl PartialEq for EntryName {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes().eq_ignore_ascii_case(other.as_bytes())
    }
}

impl Eq for EntryName {}

impl fmt::Debug for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r#""{}""#, self.as_bytes().escape_ascii())
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_bytes().escape_ascii(), f)
    }
}

/// Resolution state of a [`CacheEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// The slot holds nothing.
    Unused,
    /// Claimed, waiting for its first query to go out.
    New,
    /// At least one query was sent and no answer has arrived yet.
    Asking,
    /// Resolved. The address is valid until the entry's expiration.
    Done,
    /// Resolution failed. The failure is remembered until the entry's expiration.
    Error,
}

/// What [`Cache::lookup`] knows about a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvStatus {
    /// Nothing is known, or a recent failure is still being held back.
    Uncached,
    /// A query is in flight.
    Resolving,
    /// Resolved and within its TTL.
    Cached,
    /// Resolved, but the TTL has run out.
    Expired,
    /// Resolution failed and the negative-cache window has passed.
    NotFound,
}

/// One slot of the cache table.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub(crate) name: Option<EntryName>,
    pub(crate) state: EntryState,
    pub(crate) address: Option<IpAddr>,
    pub(crate) expiration: Option<Instant>,
    pub(crate) err: RCode,
    pub(crate) retries: u8,
    pub(crate) backoff: u8,
    pub(crate) sequence: u8,
    pub(crate) is_multicast: bool,
}

impl CacheEntry {
    const UNUSED: Self = Self {
        name: None,
        state: EntryState::Unused,
        address: None,
        expiration: None,
        err: RCode::NO_ERROR,
        retries: 0,
        backoff: 0,
        sequence: 0,
        is_multicast: false,
    };

    #[inline]
    pub fn name(&self) -> Option<&EntryName> {
        self.name.as_ref()
    }

    #[inline]
    pub fn state(&self) -> EntryState {
        self.state
    }

    #[inline]
    pub fn address(&self) -> Option<IpAddr> {
        self.address
    }

    /// Returns when a `Done` entry's TTL or an `Error` entry's negative-cache window ends.
    #[inline]
    pub fn expiration(&self) -> Option<Instant> {
        self.expiration
    }

    /// Returns the last response code reported by a server for this entry.
    #[inline]
    pub fn rcode(&self) -> RCode {
        self.err
    }

    #[inline]
    pub fn retries(&self) -> u8 {
        self.retries
    }

    #[inline]
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Returns whether this entry is resolved over mDNS instead of unicast DNS.
    #[inline]
    pub fn is_multicast(&self) -> bool {
        self.is_multicast
    }

    fn has_name(&self, name: &EntryName) -> bool {
        self.state != EntryState::Unused && self.name.as_ref() == Some(name)
    }

    /// `Done` and `Error` entries past their expiration can be reclaimed without losing anything
    /// current.
    fn is_stale(&self, now: Instant) -> bool {
        matches!(self.state, EntryState::Done | EntryState::Error)
            && self.expiration.map_or(true, |exp| exp <= now)
    }

    pub(crate) fn resolved(&mut self, addr: IpAddr, ttl: u32, now: Instant) {
        self.state = EntryState::Done;
        self.address = Some(addr);
        self.err = RCode::NO_ERROR;
        self.expiration = Some(deadline(now, Duration::from_secs(u64::from(ttl))));
    }

    pub(crate) fn failed(&mut self, err: RCode, now: Instant) {
        self.state = EntryState::Error;
        self.err = err;
        self.expiration = Some(deadline(now, NEGATIVE_CACHE_TIME));
    }
}

fn deadline(now: Instant, after: Duration) -> Instant {
    // Only unrepresentable on platforms with a narrow `Instant`, treat as "already passed".
    now.checked_add(after).unwrap_or(now)
}

/// The resolver's table of [`CacheEntry`]s.
pub struct Cache {
    entries: Box<[CacheEntry]>,
    seqno: u8,
}

impl Cache {
    /// Creates a table with `capacity` unused entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![CacheEntry::UNUSED; capacity].into_boxed_slice(),
            seqno: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter()
    }

    /// Returns the entry currently holding `name`, if any.
    pub fn get(&self, name: &str) -> Option<&CacheEntry> {
        let name = EntryName::new(name).ok()?;
        self.position(&name).map(|i| &self.entries[i])
    }

    pub(crate) fn entry(&self, index: usize) -> Option<&CacheEntry> {
        self.entries.get(index)
    }

    pub(crate) fn entry_mut(&mut self, index: usize) -> Option<&mut CacheEntry> {
        self.entries.get_mut(index)
    }

    pub(crate) fn position(&self, name: &EntryName) -> Option<usize> {
        self.entries.iter().position(|e| e.has_name(name))
    }

    /// Claims an entry for `name` and marks it [`EntryState::New`].
    ///
    /// The entry already holding `name` is reused. Otherwise the victim is the first unused
    /// entry, else the first `Done`/`Error` entry past its expiration, else the entry stamped
    /// longest ago. Returns the index of the claimed entry.
    pub(crate) fn claim(&mut self, name: EntryName, mdns: bool, now: Instant) -> usize {
        let index = self
            .position(&name)
            .or_else(|| self.free_slot(now))
            .unwrap_or_else(|| self.oldest());

        let seqno = self.seqno;
        self.seqno = self.seqno.wrapping_add(1);

        let entry = &mut self.entries[index];
        if entry.name != Some(name) {
            entry.address = None;
        }
        *entry = CacheEntry {
            name: Some(name),
            state: EntryState::New,
            address: entry.address,
            expiration: None,
            err: RCode::NO_ERROR,
            retries: 0,
            backoff: 0,
            sequence: seqno,
            is_multicast: mdns && name.is_multicast(),
        };
        index
    }

    /// Finds a slot for an answer nobody asked for.
    ///
    /// Unlike [`Cache::claim`], this never evicts an active entry: it reuses the entry with the
    /// same name, or takes an unused or stale one, and gives up otherwise.
    pub(crate) fn claim_unsolicited(&mut self, name: EntryName, now: Instant) -> Option<usize> {
        if let Some(index) = self.position(&name) {
            return Some(index);
        }

        let index = self.free_slot(now)?;
        let seqno = self.seqno;
        self.seqno = self.seqno.wrapping_add(1);
        self.entries[index] = CacheEntry {
            name: Some(name),
            sequence: seqno,
            is_multicast: true,
            ..CacheEntry::UNUSED
        };
        Some(index)
    }

    fn free_slot(&self, now: Instant) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.state == EntryState::Unused)
            .or_else(|| self.entries.iter().position(|e| e.is_stale(now)))
    }

    fn oldest(&self) -> usize {
        let mut victim = 0;
        let mut max_age = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            let age = self.seqno.wrapping_sub(entry.sequence);
            if age > max_age {
                max_age = age;
                victim = i;
            }
        }
        victim
    }

    /// Reports what is known about `name`.
    pub fn lookup(&self, name: &EntryName, now: Instant) -> (ResolvStatus, Option<IpAddr>) {
        let Some(entry) = self.position(name).map(|i| &self.entries[i]) else {
            return (ResolvStatus::Uncached, None);
        };

        let expired = entry.expiration.map_or(true, |exp| exp <= now);
        match entry.state {
            EntryState::Unused => (ResolvStatus::Uncached, None),
            EntryState::New | EntryState::Asking => (ResolvStatus::Resolving, None),
            EntryState::Done if expired => (ResolvStatus::Expired, entry.address),
            EntryState::Done => (ResolvStatus::Cached, entry.address),
            // A failed entry still carries the last address it resolved to, if any.
            EntryState::Error if expired => (ResolvStatus::NotFound, entry.address),
            EntryState::Error => (ResolvStatus::Uncached, entry.address),
        }
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("seqno", &self.seqno)
            .field("entries", &self.entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn name(s: &str) -> EntryName {
        EntryName::new(s).unwrap()
    }

    const ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

    #[test]
    fn entry_names() {
        assert_eq!(name("Example.COM."), name("example.com"));
        assert_ne!(name("example.com"), name("example.org"));
        assert_eq!(EntryName::new("..."), Err(Error::InvalidEmptyLabel));
        assert_eq!(
            EntryName::new("a-very-long-host-name-that.does-not-fit"),
            Err(Error::NameTooLong)
        );
        assert_eq!(name(&"x".repeat(MAX_NAME_LEN)).as_bytes().len(), MAX_NAME_LEN);

        assert!(name("printer.LOCAL").is_multicast());
        assert!(!name(".local").is_multicast());
        assert!(!name("local").is_multicast());
        assert!(!name("example.com").is_multicast());
    }

    #[test]
    fn claim_reuses_case_insensitive() {
        let now = Instant::now();
        let mut cache = Cache::new(4);
        let a = cache.claim(name("Host.local"), true, now);
        let b = cache.claim(name("host.LOCAL."), true, now);
        assert_eq!(a, b);
        assert_eq!(
            cache
                .iter()
                .filter(|e| e.state() != EntryState::Unused)
                .count(),
            1
        );
        let entry = cache.get("HOST.local").unwrap();
        assert_eq!(entry.state(), EntryState::New);
        assert!(entry.is_multicast());
        assert_eq!(entry.sequence(), 1);

        let c = cache.claim(name("host.local"), false, now);
        assert!(!cache.entry(c).unwrap().is_multicast(), "mDNS disabled");
    }

    #[test]
    fn eviction_priority() {
        let now = Instant::now();
        let mut cache = Cache::new(3);
        let a = cache.claim(name("a.com"), true, now);
        let b = cache.claim(name("b.com"), true, now);
        let c = cache.claim(name("c.com"), true, now);
        assert_eq!((a, b, c), (0, 1, 2));

        // All active: the least recently stamped entry goes.
        assert_eq!(cache.claim(name("d.com"), true, now), 0);

        // An expired `Done` entry is preferred over the oldest active one.
        cache.entry_mut(2).unwrap().resolved(ADDR, 10, now);
        let later = now + Duration::from_secs(11);
        assert_eq!(cache.claim(name("e.com"), true, later), 2);
        assert_eq!(cache.entry(2).unwrap().address(), None);

        // A `Done` entry within its TTL is not.
        cache.entry_mut(2).unwrap().resolved(ADDR, 100, later);
        assert_eq!(cache.claim(name("f.com"), true, later), 1);

        // Expired `Error` entries are reclaimable too.
        cache.entry_mut(0).unwrap().failed(RCode::NX_DOMAIN, later);
        let much_later = later + NEGATIVE_CACHE_TIME;
        assert_eq!(cache.claim(name("g.com"), true, much_later), 0);
    }

    #[test]
    fn oldest_is_wrap_safe() {
        let now = Instant::now();
        let mut cache = Cache::new(2);
        cache.seqno = 254;
        cache.claim(name("a.com"), true, now); // stamped 254
        cache.claim(name("b.com"), true, now); // stamped 255
        assert_eq!(cache.seqno, 0);
        assert_eq!(cache.claim(name("c.com"), true, now), 0);
        assert_eq!(cache.claim(name("d.com"), true, now), 1);
    }

    #[test]
    fn reclaiming_same_name_keeps_address() {
        let now = Instant::now();
        let mut cache = Cache::new(1);
        let i = cache.claim(name("a.com"), true, now);
        cache.entry_mut(i).unwrap().resolved(ADDR, 0, now);
        cache.claim(name("a.com"), true, now);
        assert_eq!(cache.entry(i).unwrap().address(), Some(ADDR));
        assert_eq!(cache.entry(i).unwrap().state(), EntryState::New);
    }

    #[test]
    fn unsolicited_never_evicts_active() {
        let now = Instant::now();
        let mut cache = Cache::new(2);
        cache.claim(name("a.com"), true, now);
        cache.claim(name("b.com"), true, now);
        assert_eq!(cache.claim_unsolicited(name("c.local"), now), None);
        assert_eq!(cache.claim_unsolicited(name("B.com"), now), Some(1));

        cache.entry_mut(0).unwrap().resolved(ADDR, 1, now);
        let later = now + Duration::from_secs(1);
        let i = cache.claim_unsolicited(name("c.local"), later).unwrap();
        assert_eq!(i, 0);
        assert_eq!(cache.entry(i).unwrap().state(), EntryState::Unused);
    }

    #[test]
    fn lookup_status() {
        let now = Instant::now();
        let mut cache = Cache::new(2);
        assert_eq!(
            cache.lookup(&name("a.com"), now),
            (ResolvStatus::Uncached, None)
        );

        let i = cache.claim(name("a.com"), false, now);
        assert_eq!(
            cache.lookup(&name("a.com"), now),
            (ResolvStatus::Resolving, None)
        );

        cache.entry_mut(i).unwrap().resolved(ADDR, 60, now);
        assert_eq!(
            cache.lookup(&name("A.com."), now),
            (ResolvStatus::Cached, Some(ADDR))
        );
        let later = now + Duration::from_secs(60);
        assert_eq!(
            cache.lookup(&name("a.com"), later),
            (ResolvStatus::Expired, Some(ADDR))
        );

        cache.entry_mut(i).unwrap().failed(RCode::SERV_FAIL, later);
        assert_eq!(
            cache.lookup(&name("a.com"), later),
            (ResolvStatus::Uncached, Some(ADDR))
        );
        assert_eq!(
            cache.lookup(&name("a.com"), later + NEGATIVE_CACHE_TIME),
            (ResolvStatus::NotFound, Some(ADDR))
        );
        assert_eq!(cache.entry(i).unwrap().rcode(), RCode::SERV_FAIL);

        let j = cache.claim(name("b.com"), false, now);
        cache.entry_mut(j).unwrap().failed(RCode::NX_DOMAIN, now);
        assert_eq!(
            cache.lookup(&name("b.com"), now + NEGATIVE_CACHE_TIME),
            (ResolvStatus::NotFound, None)
        );
    }
}
