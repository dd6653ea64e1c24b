//! Message encoding into caller-provided buffers.

use core::marker::PhantomData;

use bytemuck::{NoUninit, Zeroable};

use crate::num;

use super::{
    name::DomainName,
    records::{Record, ResourceRecordEncoder},
    section::{self, Followed, RecordSection, Section},
    Class, Error, Header, QClass, QType,
};

/// Top bit of the class field: the cache-flush bit of mDNS answers.
const CACHE_FLUSH: u16 = 0x8000;

/// Cursor over an output buffer.
///
/// Writes past the end are cut off and remembered, and reported by [`Writer::finish`].
pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    pub(crate) pos: usize,
    trunc: bool,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            trunc: false,
        }
    }

    /// The header at the start of the buffer, if the buffer can hold one.
    fn header_mut(&mut self) -> Option<&mut Header> {
        self.buf
            .get_mut(..Header::LEN)
            .map(bytemuck::from_bytes_mut)
    }

    pub(crate) fn write_slice(&mut self, data: &[u8]) {
        let room = self.buf.len() - self.pos;
        let n = data.len().min(room);
        self.buf[self.pos..self.pos + n].copy_from_slice(&data[..n]);
        self.pos += n;
        self.trunc |= n < data.len();
    }

    pub(crate) fn write_obj<T: NoUninit>(&mut self, obj: T) {
        self.write_slice(bytemuck::bytes_of(&obj))
    }

    pub(crate) fn write_u8(&mut self, b: u8) {
        self.write_slice(&[b]);
    }

    pub(crate) fn write_u16(&mut self, v: u16) {
        self.write_slice(&v.to_be_bytes());
    }

    /// Overwrites two already written bytes at `at`.
    fn patch_u16(&mut self, at: usize, v: u16) {
        if let Some(bytes) = self.buf.get_mut(at..at + 2) {
            bytes.copy_from_slice(&v.to_be_bytes());
        }
    }

    /// Writes a TTL as its high and low 16-bit halves.
    pub(crate) fn write_ttl(&mut self, ttl: u32) {
        let (high, low) = num::split_halves(ttl);
        self.write_u16(high);
        self.write_u16(low);
    }

    /// Writes an uncompressed name.
    pub(crate) fn write_domain_name(&mut self, name: &DomainName) {
        for label in name.labels() {
            let bytes = label.as_bytes();
            // Labels are at most 63 bytes.
            self.write_u8(bytes.len() as u8);
            self.write_slice(bytes);
        }
        self.write_u8(0);
    }

    /// Returns the number of bytes written, or [`Error::Truncated`] if anything did not fit.
    pub(crate) fn finish(self) -> Result<usize, Error> {
        if self.trunc {
            Err(Error::Truncated)
        } else {
            Ok(self.pos)
        }
    }
}

struct EncoderInner<'a> {
    w: Writer<'a>,
    /// Entries written so far, per section.
    counts: [u16; 4],
}

impl<'a> Drop for EncoderInner<'a> {
    fn drop(&mut self) {
        let (counts, trunc) = (self.counts, self.w.trunc);
        if let Some(h) = self.w.header_mut() {
            h.set_counts(counts);
            h.set_truncated(trunc);
        }
    }
}

/// Streaming encoder for DNS messages.
///
/// Tracks the section being written as a type parameter, like
/// [`MessageDecoder`][super::decoder::MessageDecoder] does, so entries go out in wire order.
/// Section counts and the TC bit are written into the header when the encoder goes away.
pub struct MessageEncoder<'a, S: Section> {
    inner: EncoderInner<'a>,
    _p: PhantomData<S>,
}

impl<'a> MessageEncoder<'a, section::Question> {
    /// Creates an encoder writing to `buf`, starting with an all-zero header.
    pub fn new(buf: &'a mut [u8]) -> Self {
        let mut w = Writer::new(buf);
        w.write_obj(Header::zeroed());
        Self {
            inner: EncoderInner { w, counts: [0; 4] },
            _p: PhantomData,
        }
    }

    pub fn question(&mut self, question: Question<'_>) {
        let w = &mut self.inner.w;
        w.write_domain_name(question.name);
        w.write_u16(question.ty.0);
        w.write_u16(question.class.0);
        self.bump();
    }

    #[inline]
    pub fn answers(self) -> MessageEncoder<'a, section::Answer> {
        self.advance()
    }
}

impl<'a> MessageEncoder<'a, section::Answer> {
    #[inline]
    pub fn authority(self) -> MessageEncoder<'a, section::Authority> {
        self.advance()
    }

    #[inline]
    pub fn additional(self) -> MessageEncoder<'a, section::Additional> {
        self.advance().advance()
    }
}

impl<'a> MessageEncoder<'a, section::Authority> {
    #[inline]
    pub fn additional(self) -> MessageEncoder<'a, section::Additional> {
        self.advance()
    }
}

impl<'a, S: Section> MessageEncoder<'a, S> {
    /// Replaces the header.
    ///
    /// Counts and the TC bit are overwritten again once encoding ends.
    pub fn set_header(&mut self, header: Header) {
        if let Some(h) = self.inner.w.header_mut() {
            *h = header;
        }
    }

    /// Returns the encoded length, or [`Error::Truncated`] if the buffer was too small. A
    /// truncated message still gets its TC bit set.
    pub fn finish(self) -> Result<usize, Error> {
        if self.inner.w.trunc {
            Err(Error::Truncated)
        } else {
            Ok(self.inner.w.pos)
        }
    }

    fn bump(&mut self) {
        self.inner.counts[S::INDEX] += 1;
    }
}

impl<'a, S: Followed> MessageEncoder<'a, S> {
    fn advance(self) -> MessageEncoder<'a, S::Next> {
        MessageEncoder {
            inner: self.inner,
            _p: PhantomData,
        }
    }
}

impl<'a, S: RecordSection> MessageEncoder<'a, S> {
    /// Appends a record to the current section.
    pub fn add_record(&mut self, rr: ResourceRecord<'_>) {
        let w = &mut self.inner.w;
        w.write_domain_name(rr.name);
        w.write_u16(rr.rdata.record_type().0);
        let class = if rr.cache_flush {
            rr.class.0 | CACHE_FLUSH
        } else {
            rr.class.0
        };
        w.write_u16(class);
        w.write_ttl(rr.ttl);

        // RDLENGTH is patched once the data is written.
        let len_at = w.pos;
        w.write_u16(0);
        let start = w.pos;
        rr.rdata.encode(&mut ResourceRecordEncoder { w: &mut *w });
        if !w.trunc {
            // Bounded by the buffer, which never exceeds one datagram.
            w.patch_u16(len_at, (w.pos - start) as u16);
        }
        self.bump();
    }
}

/// A question to encode. Defaults to `ALL` records in class `IN`.
pub struct Question<'a> {
    name: &'a DomainName,
    class: QClass,
    ty: QType,
}

impl<'a> Question<'a> {
    #[inline]
    pub fn new(name: &'a DomainName) -> Self {
        Self {
            name,
            class: QClass::IN,
            ty: QType::ALL,
        }
    }

    #[inline]
    pub fn class(self, class: QClass) -> Self {
        Self { class, ..self }
    }

    #[inline]
    pub fn ty(self, ty: QType) -> Self {
        Self { ty, ..self }
    }
}

/// A record to encode, in class `IN` with a TTL of 0 unless set otherwise.
pub struct ResourceRecord<'a> {
    name: &'a DomainName,
    class: Class,
    cache_flush: bool,
    ttl: u32,
    rdata: &'a Record,
}

impl<'a> ResourceRecord<'a> {
    pub fn new(name: &'a DomainName, rdata: &'a Record) -> Self {
        Self {
            name,
            class: Class::IN,
            cache_flush: false,
            ttl: 0,
            rdata,
        }
    }

    #[inline]
    pub fn class(self, class: Class) -> Self {
        Self { class, ..self }
    }

    /// Sets the mDNS cache-flush bit, marking this record as the sole owner of its name.
    #[inline]
    pub fn cache_flush(self, cache_flush: bool) -> Self {
        Self {
            cache_flush,
            ..self
        }
    }

    #[inline]
    pub fn ttl(self, ttl: u32) -> Self {
        Self { ttl, ..self }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use expect_test::expect;

    use crate::{
        hex::Hex,
        packet::{decoder::MessageDecoder, records::A},
    };

    use super::*;

    #[test]
    fn encode_query() {
        let name = DomainName::from_str("example.com").unwrap();
        let mut buf = [0; 512];
        let mut enc = MessageEncoder::new(&mut buf);
        let mut h = Header::default();
        h.set_id(0xf0b0);
        h.set_recursion_desired(true);
        enc.set_header(h);
        enc.question(Question::new(&name).ty(QType::A));
        let len = enc.finish().unwrap();

        expect![[r#"f0b001000001000000000000076578616d706c6503636f6d0000010001"#]]
            .assert_eq(&Hex(&buf[..len]).to_string());
    }

    #[test]
    fn encode_answer_with_cache_flush() {
        let name = DomainName::from_str("device.local").unwrap();
        let rdata = Record::A(A::new(Ipv4Addr::new(10, 0, 0, 7)));
        let mut buf = [0; 512];
        let mut enc = MessageEncoder::new(&mut buf).answers();
        enc.add_record(
            ResourceRecord::new(&name, &rdata)
                .ttl(120)
                .cache_flush(true),
        );
        let len = enc.finish().unwrap();

        expect![[r#"00000000000000010000000006646576696365056c6f63616c00000180010000007800040a000007"#]]
            .assert_eq(&Hex(&buf[..len]).to_string());

        let mut dec = MessageDecoder::new(&buf[..len]).unwrap().answers().unwrap();
        let rr = dec.next().unwrap().unwrap();
        assert!(rr.cache_flush());
        assert_eq!(rr.class(), Class::IN);
        assert_eq!(rr.ttl(), 120);
    }

    #[test]
    fn counts_follow_sections() {
        let name = DomainName::from_str("a").unwrap();
        let rdata = Record::A(A::new(Ipv4Addr::LOCALHOST));
        let mut buf = [0; 512];
        let mut enc = MessageEncoder::new(&mut buf).answers();
        enc.add_record(ResourceRecord::new(&name, &rdata));
        enc.add_record(ResourceRecord::new(&name, &rdata));
        let mut enc = enc.additional();
        enc.add_record(ResourceRecord::new(&name, &rdata));
        let len = enc.finish().unwrap();

        let h = *MessageDecoder::new(&buf[..len]).unwrap().header();
        assert_eq!(h.question_count(), 0);
        assert_eq!(h.answer_count(), 2);
        assert_eq!(h.authoritative_count(), 0);
        assert_eq!(h.additional_count(), 1);
    }

    #[test]
    fn encode_truncated() {
        let name = DomainName::from_str("example.com").unwrap();
        let mut buf = [0; 20];
        let mut enc = MessageEncoder::new(&mut buf);
        enc.question(Question::new(&name));
        assert_eq!(enc.finish(), Err(Error::Truncated));

        let h = *MessageDecoder::new(&buf).unwrap().header();
        assert!(h.is_truncated());
        assert_eq!(h.question_count(), 1);
    }
}
