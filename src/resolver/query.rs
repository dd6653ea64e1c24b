//! Query scheduling: retry/backoff and query encoding.

use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use crate::{
    cache::EntryState,
    config::AddressFamily,
    hex::Hex,
    packet::{
        encode_id,
        encoder::{MessageEncoder, Question},
        name::DomainName,
        Header, QClass,
    },
    Error, DNS_BUFFER_SIZE, DNS_PORT, MDNS_PORT,
};

use super::{Resolver, Transmit};

/// Interval between scheduler ticks while any entry is waiting for an answer.
const TICK: Duration = Duration::from_secs(1);

/// Writes the query for the entry at `index` into `buf` and returns its length.
///
/// The transaction ID is derived from `index`. Recursion is requested only from unicast
/// servers.
pub fn encode_query(
    buf: &mut [u8],
    index: usize,
    name: &DomainName,
    family: AddressFamily,
    multicast: bool,
) -> Result<usize, Error> {
    let mut enc = MessageEncoder::new(buf);
    let mut header = Header::default();
    header.set_id(encode_id(index));
    header.set_recursion_desired(!multicast);
    enc.set_header(header);
    enc.question(
        Question::new(name)
            .ty(family.record_type().into())
            .class(QClass::IN),
    );
    enc.finish()
}

impl Resolver {
    /// Advances the first entry that needs attention and sends at most one query.
    ///
    /// Entries that exhaust their retries along the way are failed and skipped. Another tick is
    /// scheduled as long as anything is still pending.
    pub(super) fn check_entries(&mut self, now: Instant) {
        let (max_mdns, max_unicast) = (self.config.max_mdns_retries, self.config.max_retries);
        for index in 0..self.cache.capacity() {
            let Some(entry) = self.cache.entry_mut(index) else {
                break;
            };
            match entry.state {
                EntryState::New => {
                    entry.state = EntryState::Asking;
                    entry.backoff = 1;
                    entry.retries = 0;
                }
                EntryState::Asking => {
                    entry.backoff = entry.backoff.saturating_sub(1);
                    if entry.backoff != 0 {
                        self.next_tick = Some(now + TICK);
                        continue;
                    }

                    entry.retries = entry.retries.saturating_add(1);
                    let max = if entry.is_multicast {
                        max_mdns
                    } else {
                        max_unicast
                    };
                    if entry.retries >= max {
                        let err = entry.err;
                        entry.failed(err, now);
                        let name = entry.name;
                        log::debug!("giving up on entry {} after {} retries", index, max);
                        self.next_tick = Some(now + TICK);
                        if let Some(name) = name {
                            self.notify(name, None, now);
                        }
                        continue;
                    }
                    entry.backoff = entry.retries;
                }
                _ => continue,
            }

            self.next_tick = Some(now + TICK);
            self.send_query(index);
            break;
        }
    }

    fn send_query(&mut self, index: usize) {
        let Some(entry) = self.cache.entry(index) else {
            return;
        };
        let Some(name) = entry.name else {
            return;
        };
        let multicast = entry.is_multicast;

        let domain = match name.to_domain() {
            Ok(domain) => domain,
            Err(e) => {
                log::warn!("cannot encode query for {}: {}", name, e);
                return;
            }
        };

        let mut buf = [0; DNS_BUFFER_SIZE];
        let len = match encode_query(&mut buf, index, &domain, self.config.family, multicast) {
            Ok(len) => len,
            Err(e) => {
                log::warn!("failed to encode query for {}: {}", name, e);
                return;
            }
        };

        let destination = if multicast {
            SocketAddr::new(self.config.family.mdns_group(), MDNS_PORT)
        } else {
            SocketAddr::new(self.dns_server, DNS_PORT)
        };
        log::debug!(
            "(i={}) sent {} request for {} to {}",
            index,
            if multicast { "mDNS" } else { "DNS" },
            name,
            destination,
        );
        log::trace!("raw query: {}", Hex(&buf[..len]));

        self.write_outs.push_back(Transmit {
            destination,
            payload: buf[..len].to_vec(),
        });
    }
}
