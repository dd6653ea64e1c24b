//! Inbound datagram processing.
//!
//! Datagrams whose flag bytes are both zero are requests, everything else is treated as a
//! response. Responses to unicast queries are matched to their cache entry through the
//! transaction ID, multicast responses (ID 0, from the mDNS port) by the name in each answer.

use std::{
    net::{IpAddr, SocketAddr},
    time::Instant,
};

use crate::{
    cache::{EntryName, EntryState},
    hex::Hex,
    packet::{
        decode_id,
        decoder::{MessageDecoder, ResourceRecord},
        records::Record,
        section, Class, QClass, QType, RCode, Type,
    },
    Error, MDNS_PORT,
};

use super::{IdentityState, Resolver};

impl Resolver {
    /// Processes a datagram received from `source`.
    ///
    /// Malformed and unrelated packets are logged and dropped.
    pub fn handle_datagram(&mut self, source: SocketAddr, data: &[u8], now: Instant) {
        log::trace!("recv from {}: {}", source, Hex(data));

        let res = MessageDecoder::new(data).and_then(|dec| {
            if dec.header().is_plain_query() {
                self.handle_request(source, dec, now)
            } else {
                self.handle_response(source, dec, now)
            }
        });
        if let Err(e) = res {
            log::debug!("dropping packet from {}: {}", source, e);
        }
    }

    fn handle_request(
        &mut self,
        source: SocketAddr,
        mut dec: MessageDecoder<'_, section::Question>,
        now: Instant,
    ) -> Result<(), Error> {
        if !self.config.is_responder() || self.identity.state() != IdentityState::Ready {
            return Ok(());
        }

        let header = *dec.header();
        if header.question_count() == 0 || header.answer_count() != 0 {
            log::debug!(
                "ignoring request with {} questions and {} answers",
                header.question_count(),
                header.answer_count(),
            );
            return Ok(());
        }

        let fqdn = format!("{}.local", self.identity.hostname());
        while let Some(question) = dec.next() {
            let question = question?;
            log::trace!("question: {}", question);

            if question.qclass() != QClass::IN {
                continue;
            }
            if ![QType::ALL, QType::A, QType::AAAA].contains(&question.qtype()) {
                continue;
            }
            if !question.qname().matches(&fqdn) {
                continue;
            }

            if source.port() == MDNS_PORT {
                // Multicast querier: answer with one announcement, however many ask.
                self.request_announce(now);
            } else {
                self.send_announcement(source, header.id());
            }
            return Ok(());
        }
        Ok(())
    }

    fn handle_response(
        &mut self,
        source: SocketAddr,
        mut dec: MessageDecoder<'_, section::Question>,
        now: Instant,
    ) -> Result<(), Error> {
        let header = *dec.header();
        if header.answer_count() == 0 {
            log::debug!("ignoring response without answers from {}", source);
            return Ok(());
        }

        if self.config.mdns && source.port() == MDNS_PORT && header.id() == 0 {
            let mut dec = dec.answers()?;
            while let Some(rr) = dec.next() {
                self.unsolicited_answer(&rr?, now);
            }
            return Ok(());
        }

        let index = decode_id(header.id(), self.cache.capacity())
            .filter(|&i| {
                self.cache
                    .entry(i)
                    .map_or(false, |e| e.state == EntryState::Asking)
            })
            .ok_or(Error::UnknownId)?;
        let Some(name) = self.cache.entry(index).and_then(|e| e.name) else {
            return Err(Error::UnknownId);
        };

        let rcode = header.rcode();
        if rcode != RCode::NO_ERROR {
            log::debug!("server reported {} for {}", rcode, name);
            if let Some(entry) = self.cache.entry_mut(index) {
                entry.failed(rcode, now);
            }
            self.notify(name, None, now);
            return Ok(());
        }

        let queried = name.to_domain()?;
        while let Some(question) = dec.next() {
            let question = question?;
            if !question.qname().eq_ignore_ascii_case(&queried) {
                log::debug!(
                    "response for entry {} asks about {}, not {}",
                    index,
                    question.qname(),
                    name
                );
                return Ok(());
            }
        }

        // Aliases of the queried name seen so far in CNAME records.
        let mut aliases = vec![queried];
        let mut found = None;
        let mut dec = dec.answers()?;
        while let Some(rr) = dec.next() {
            let rr = rr?;
            if rr.class() != Class::IN
                || !aliases.iter().any(|alias| alias.eq_ignore_ascii_case(rr.name()))
            {
                continue;
            }
            if rr.type_() == Type::CNAME {
                if let Some(Ok(Record::CNAME(cname))) = rr.as_enum() {
                    aliases.push(cname.cname().clone());
                }
                continue;
            }
            if let Some(addr) = self.answer_addr(&rr) {
                found = Some((addr, rr.ttl()));
                break;
            }
        }

        let Some(entry) = self.cache.entry_mut(index) else {
            return Ok(());
        };
        match found {
            Some((addr, ttl)) => {
                entry.resolved(addr, ttl, now);
                self.notify(name, Some(addr), now);
            }
            None => {
                log::debug!("no usable answer for {}", name);
                entry.failed(RCode::NO_ERROR, now);
                self.notify(name, None, now);
            }
        }
        Ok(())
    }

    /// Caches a multicast answer under its own name.
    fn unsolicited_answer(&mut self, rr: &ResourceRecord<'_>, now: Instant) {
        if rr.class() != Class::IN {
            return;
        }
        let Some(addr) = self.answer_addr(rr) else {
            return;
        };
        let name = match EntryName::from_domain(rr.name()) {
            Ok(name) => name,
            Err(e) => {
                log::debug!("cannot cache {}: {}", rr.name(), e);
                return;
            }
        };
        let Some(index) = self.cache.claim_unsolicited(name, now) else {
            log::debug!("no room to keep track of unsolicited answer for {}", name);
            return;
        };
        if let Some(entry) = self.cache.entry_mut(index) {
            entry.resolved(addr, rr.ttl(), now);
        }
        self.notify(name, Some(addr), now);
    }

    /// Extracts the address from an answer of the configured family.
    fn answer_addr(&self, rr: &ResourceRecord<'_>) -> Option<IpAddr> {
        let family = self.config.family;
        if rr.type_() != family.record_type() || rr.rdata().len() != family.addr_len() {
            return None;
        }
        match rr.as_enum()? {
            Ok(Record::A(a)) => Some(IpAddr::V4(a.addr())),
            Ok(Record::AAAA(aaaa)) => Some(IpAddr::V6(aaaa.addr())),
            _ => None,
        }
    }
}
