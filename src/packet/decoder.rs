//! Bounds-checked message decoding.

use std::{fmt, marker::PhantomData, mem::size_of};

use bytemuck::AnyBitPattern;

use crate::num::{self, U16};

use super::{
    name::{DomainName, Label},
    records::Record,
    section::{self, Followed, RecordSection, Section},
    Class, Error, Header, QClass, QType, Type,
};

/// Top bit of the class field. In mDNS questions it requests a unicast response, in answers it
/// is the cache-flush bit.
const CLASS_TOP_BIT: u16 = 0x8000;

/// Cursor over a received message.
///
/// Keeps the whole message around, since compressed names point back into it.
#[derive(Debug, Clone)]
pub(crate) struct Reader<'a> {
    msg: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(msg: &'a [u8]) -> Self {
        Self { msg, pos: 0 }
    }

    /// Everything from the cursor to the end of the message.
    pub(crate) fn buf(&self) -> &'a [u8] {
        self.msg.get(self.pos..).unwrap_or_default()
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn seek(&mut self, pos: usize) -> Result<(), Error> {
        if pos > self.msg.len() {
            return Err(Error::Eof);
        }
        self.pos = pos;
        Ok(())
    }

    pub(crate) fn read_slice(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self.pos.checked_add(len).ok_or(Error::Eof)?;
        let slice = self.msg.get(self.pos..end).ok_or(Error::Eof)?;
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_obj<T: AnyBitPattern>(&mut self) -> Result<T, Error> {
        self.read_slice(size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
    }

    pub(crate) fn read_array<const LEN: usize>(&mut self) -> Result<[u8; LEN], Error> {
        let mut out = [0; LEN];
        out.copy_from_slice(self.read_slice(LEN)?);
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, Error> {
        self.read_obj()
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, Error> {
        self.read_obj::<U16>().map(U16::get)
    }

    /// Reads a TTL, which is transmitted as two 16-bit halves.
    pub(crate) fn read_ttl(&mut self) -> Result<u32, Error> {
        let high = self.read_u16()?;
        let low = self.read_u16()?;
        Ok(num::join_halves(high, low))
    }

    /// Reads a possibly compressed domain name.
    ///
    /// Every pointer must go strictly backwards from the last one (or from where the name
    /// starts), so a message cannot make this loop.
    pub(crate) fn read_domain_name(&mut self) -> Result<DomainName, Error> {
        let mut name = DomainName::ROOT;
        let mut pos = self.pos;
        let mut limit = self.pos;
        // Where the name ends in the original stream, fixed by the first pointer.
        let mut end = None;

        loop {
            let len = *self.msg.get(pos).ok_or(Error::Eof)?;
            match len >> 6 {
                0b00 if len == 0 => {
                    pos += 1;
                    break;
                }
                0b00 => {
                    let start = pos + 1;
                    let label = self
                        .msg
                        .get(start..start + usize::from(len))
                        .ok_or(Error::Eof)?;
                    name.push_label(Label::try_new(label)?);
                    pos = start + usize::from(len);
                }
                0b11 => {
                    let low = *self.msg.get(pos + 1).ok_or(Error::Eof)?;
                    let target = usize::from(u16::from_be_bytes([len & 0x3f, low]));
                    if target >= limit {
                        return Err(Error::PointerLoop);
                    }
                    end.get_or_insert(pos + 2);
                    limit = target;
                    pos = target;
                }
                // 01 and 10 label types are reserved.
                _ => return Err(Error::InvalidValue),
            }
        }

        self.pos = end.unwrap_or(pos);
        Ok(name)
    }

    fn read_question(&mut self) -> Result<Question, Error> {
        let qname = self.read_domain_name()?;
        let qtype = QType(self.read_u16()?);
        let class = self.read_u16()?;
        Ok(Question {
            qname,
            qtype,
            qclass: QClass(class & !CLASS_TOP_BIT),
            unicast_response: class & CLASS_TOP_BIT != 0,
        })
    }

    fn read_resource_record(&mut self) -> Result<ResourceRecord<'a>, Error> {
        let name = self.read_domain_name()?;
        let type_ = Type(self.read_u16()?);
        let class = self.read_u16()?;
        let ttl = self.read_ttl()?;
        let rdlength = usize::from(self.read_u16()?);

        // The record data gets a reader that ends with it, but can still see earlier names.
        let start = self.pos;
        self.read_slice(rdlength)?;
        let rdata = Reader {
            msg: &self.msg[..self.pos],
            pos: start,
        };

        Ok(ResourceRecord {
            name,
            type_,
            class: Class(class & !CLASS_TOP_BIT),
            cache_flush: class & CLASS_TOP_BIT != 0,
            ttl,
            rdata,
        })
    }
}

/// Streaming decoder for DNS messages.
///
/// The section being read is the `S` type parameter. A new decoder starts in
/// [`section::Question`], and the section methods (`answers`, `authority`, `additional`) skip
/// forward. Once an entry fails to decode, the rest of the message is treated as empty.
pub struct MessageDecoder<'a, S: Section> {
    header: Header,
    /// Entries left to read, per section.
    remaining: [u16; 4],
    r: Reader<'a>,
    has_errored: bool,
    section: PhantomData<S>,
}

impl<'a> MessageDecoder<'a, section::Question> {
    /// Creates a decoder reading from `buf`.
    ///
    /// Fails with [`Error::Eof`] if `buf` is shorter than a header.
    pub fn new(buf: &'a [u8]) -> Result<Self, Error> {
        let mut r = Reader::new(buf);
        let header = r.read_obj::<Header>()?;
        Ok(Self {
            header,
            remaining: header.counts(),
            r,
            has_errored: false,
            section: PhantomData,
        })
    }
}

impl<'a, S: Section> MessageDecoder<'a, S> {
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    fn remaining(&mut self) -> &mut u16 {
        &mut self.remaining[S::INDEX]
    }

    /// Reads one entry of the current section with `read`, unless the section is exhausted or
    /// an earlier entry failed.
    fn next_with<T>(
        &mut self,
        read: impl FnOnce(&mut Reader<'a>) -> Result<T, Error>,
    ) -> Option<Result<T, Error>> {
        if self.has_errored || *self.remaining() == 0 {
            return None;
        }
        match read(&mut self.r) {
            Ok(entry) => {
                *self.remaining() -= 1;
                Some(Ok(entry))
            }
            Err(e) => {
                log::trace!("malformed entry in {} section: {}", S::NAME, e);
                self.has_errored = true;
                Some(Err(e))
            }
        }
    }
}

impl<'a, S: Followed> MessageDecoder<'a, S> {
    /// Skips what is left of this section and moves to the next one.
    fn skip_section(mut self) -> Result<MessageDecoder<'a, S::Next>, Error> {
        let is_question = S::INDEX == section::Question::INDEX;
        while let Some(res) = self.next_with(|r| {
            if is_question {
                r.read_question().map(drop)
            } else {
                r.read_resource_record().map(drop)
            }
        }) {
            res?;
        }

        Ok(MessageDecoder {
            header: self.header,
            remaining: self.remaining,
            r: self.r,
            has_errored: self.has_errored,
            section: PhantomData,
        })
    }
}

impl<'a> MessageDecoder<'a, section::Question> {
    /// Reads the next [`Question`].
    pub fn next(&mut self) -> Option<Result<Question, Error>> {
        self.next_with(Reader::read_question)
    }

    pub fn iter(&mut self) -> QuestionIter<'_, 'a> {
        QuestionIter { dec: self }
    }

    /// Skips the remaining questions.
    pub fn answers(self) -> Result<MessageDecoder<'a, section::Answer>, Error> {
        self.skip_section()
    }

    pub fn additional(self) -> Result<MessageDecoder<'a, section::Additional>, Error> {
        self.answers()?.additional()
    }
}

impl<'a> MessageDecoder<'a, section::Answer> {
    pub fn authority(self) -> Result<MessageDecoder<'a, section::Authority>, Error> {
        self.skip_section()
    }

    /// Skips the remaining answers and the whole *Authority* section.
    pub fn additional(self) -> Result<MessageDecoder<'a, section::Additional>, Error> {
        self.authority()?.skip_section()
    }
}

impl<'a> MessageDecoder<'a, section::Authority> {
    pub fn additional(self) -> Result<MessageDecoder<'a, section::Additional>, Error> {
        self.skip_section()
    }
}

impl<'a, S: RecordSection> MessageDecoder<'a, S> {
    /// Reads the next [`ResourceRecord`] of this section.
    pub fn next(&mut self) -> Option<Result<ResourceRecord<'a>, Error>> {
        self.next_with(Reader::read_resource_record)
    }

    pub fn iter(&mut self) -> ResourceRecordIter<'_, 'a, S> {
        ResourceRecordIter { dec: self }
    }
}

/// Iterator over the resource records of one section.
pub struct ResourceRecordIter<'dec, 'data, S: RecordSection> {
    dec: &'dec mut MessageDecoder<'data, S>,
}

impl<'dec, 'data, S: RecordSection> Iterator for ResourceRecordIter<'dec, 'data, S> {
    type Item = Result<ResourceRecord<'data>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.dec.next()
    }
}

/// Iterator over the *Question* section.
pub struct QuestionIter<'dec, 'data> {
    dec: &'dec mut MessageDecoder<'data, section::Question>,
}

impl<'dec, 'data> Iterator for QuestionIter<'dec, 'data> {
    type Item = Result<Question, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.dec.next()
    }
}

/// A resource record, with its data left undecoded until [`ResourceRecord::as_enum`].
pub struct ResourceRecord<'a> {
    name: DomainName,
    type_: Type,
    class: Class,
    cache_flush: bool,
    ttl: u32,
    /// Positioned at the RDATA, and ending with it.
    pub(crate) rdata: Reader<'a>,
}

impl<'a> ResourceRecord<'a> {
    #[inline]
    pub fn name(&self) -> &DomainName {
        &self.name
    }

    #[inline]
    pub fn type_(&self) -> Type {
        self.type_
    }

    /// Returns the class with the cache-flush bit masked off.
    #[inline]
    pub fn class(&self) -> Class {
        self.class
    }

    #[inline]
    pub fn cache_flush(&self) -> bool {
        self.cache_flush
    }

    /// Time to live in seconds. 0 means the record is being withdrawn.
    #[inline]
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    #[inline]
    pub fn rdata(&self) -> &[u8] {
        self.rdata.buf()
    }

    /// Decodes the record data, or returns `None` for types without a codec.
    pub fn as_enum(&self) -> Option<Result<Record, Error>> {
        Record::from_rr(self)
    }
}

impl<'a> fmt::Debug for ResourceRecord<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("ResourceRecord");
        dbg.field("name", &self.name)
            .field("type_", &self.type_)
            .field("class", &self.class)
            .field("cache_flush", &self.cache_flush)
            .field("ttl", &self.ttl);
        match self.as_enum() {
            Some(rec) => dbg.field("rdata", &rec),
            None => dbg.field("rdata", &self.rdata()),
        };
        dbg.finish()
    }
}

impl<'a> fmt::Display for ResourceRecord<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {} ", self.name, self.ttl, self.class, self.type_)?;
        match self.as_enum() {
            Some(Ok(rec)) => write!(f, "{}", rec),
            Some(Err(e)) => write!(f, "<{}>", e),
            None => write!(f, "{:02x?}", self.rdata()),
        }
    }
}

/// An entry of the *Question* section.
#[derive(Debug)]
pub struct Question {
    qname: DomainName,
    qtype: QType,
    qclass: QClass,
    unicast_response: bool,
}

impl Question {
    #[inline]
    pub fn qname(&self) -> &DomainName {
        &self.qname
    }

    #[inline]
    pub fn qtype(&self) -> QType {
        self.qtype
    }

    /// Returns the class with the QU bit masked off.
    #[inline]
    pub fn qclass(&self) -> QClass {
        self.qclass
    }

    /// Returns whether the mDNS QU bit asks for a unicast reply.
    #[inline]
    pub fn unicast_response(&self) -> bool {
        self.unicast_response
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.qname, self.qclass, self.qtype)?;
        if self.unicast_response {
            f.write_str(" (QU)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::hex;

    use super::*;

    fn name_at(msg: &[u8], pos: usize) -> Result<(String, usize), Error> {
        let mut r = Reader::new(msg);
        r.seek(pos)?;
        let name = r.read_domain_name()?;
        Ok((name.to_string(), r.pos()))
    }

    #[test]
    fn plain_names() {
        let msg = hex::parse("076578616d706c6503636f6d00");
        assert_eq!(name_at(&msg, 0), Ok(("example.com.".into(), msg.len())));
        assert_eq!(name_at(&[0], 0), Ok((".".into(), 1)));
    }

    #[test]
    fn compressed_names() {
        // "com." at 1, then "example" followed by a pointer back to 1
        let msg = hex::parse("ff03636f6d00076578616d706c65c001");
        assert_eq!(name_at(&msg, 1), Ok(("com.".into(), 6)));
        assert_eq!(name_at(&msg, 6), Ok(("example.com.".into(), msg.len())));
    }

    #[test]
    fn pointers_must_go_backwards() {
        assert_eq!(name_at(&[0xff, 0xff], 0), Err(Error::PointerLoop));
        assert_eq!(name_at(&[0xc0, 0x00], 0), Err(Error::PointerLoop));
        // label, then a pointer back to that same label
        assert_eq!(name_at(&[1, b'a', 0xc0, 0x00], 2), Err(Error::PointerLoop));
        // pointer back to a pointer that points forward again
        assert_eq!(
            name_at(&[0xc0, 0x04, 0, 0, 0xc0, 0x00], 4),
            Err(Error::PointerLoop)
        );
    }

    #[test]
    fn malformed_names() {
        assert_eq!(name_at(&[0x41, b'a', 0], 0), Err(Error::InvalidValue));
        assert_eq!(name_at(&[3, b'a', b'b'], 0), Err(Error::Eof));
        assert_eq!(name_at(&[1, b'a'], 0), Err(Error::Eof));
        assert_eq!(name_at(&[0xc0], 0), Err(Error::Eof));
    }

    #[test]
    fn decode_truncated_header() {
        assert!(matches!(MessageDecoder::new(&[0; 11]), Err(Error::Eof)));
    }

    #[test]
    fn decode_mdns_question_bits() {
        // id 0, no flags, one question: "host.local" ANY, class IN with QU bit
        let msg = hex::parse(concat!(
            "000000000001000000000000",
            "04686f7374056c6f63616c00",
            "00ff8001",
        ));
        let mut dec = MessageDecoder::new(&msg).unwrap();
        assert!(dec.header().is_plain_query());
        let q = dec.next().unwrap().unwrap();
        assert!(q.qname().matches("host.local"));
        assert_eq!(q.qtype(), QType::ALL);
        assert_eq!(q.qclass(), QClass::IN);
        assert!(q.unicast_response());
        assert_eq!(q.to_string(), "host.local. IN ALL (QU)");
        assert!(dec.next().is_none());
    }

    #[test]
    fn decode_answer_with_pointer_and_split_ttl() {
        // response with the question "a.local" A IN and one answer whose owner name is a
        // pointer to the question name
        let msg = hex::parse(concat!(
            "f0b081800001000100000000",
            "0161056c6f63616c00",
            "00010001",
            "c00c",
            "0001",
            "8001",
            "00010002",
            "0004",
            "c0a80001",
        ));
        let dec = MessageDecoder::new(&msg).unwrap();
        assert_eq!(dec.header().id(), 0xf0b0);
        let mut dec = dec.answers().unwrap();
        let rr = dec.next().unwrap().unwrap();
        assert!(rr.name().matches("a.local"));
        assert_eq!(rr.type_(), Type::A);
        assert_eq!(rr.class(), Class::IN);
        assert!(rr.cache_flush());
        assert_eq!(rr.ttl(), 65538);
        assert_eq!(rr.rdata(), &[192, 168, 0, 1]);
        assert_eq!(rr.to_string(), "a.local. 65538 IN A 192.168.0.1");
        assert!(dec.next().is_none());
    }

    #[test]
    fn skip_to_additional() {
        // no questions, one answer and one additional record, both A records for "a"
        let msg = hex::parse(concat!(
            "000084000000000100000001",
            "016100000180010000007800040a000001",
            "016100000180010000007800040a000002",
        ));
        let mut dec = MessageDecoder::new(&msg).unwrap().additional().unwrap();
        let rr = dec.next().unwrap().unwrap();
        assert_eq!(rr.rdata(), &[10, 0, 0, 2]);
        assert!(dec.next().is_none());
    }

    #[test]
    fn decode_rdata_past_end() {
        let msg = hex::parse(concat!(
            "000084000000000100000000",
            "0161000001000100000078",
            "0004c0a8",
        ));
        let mut dec = MessageDecoder::new(&msg).unwrap().answers().unwrap();
        assert_eq!(dec.next().unwrap().unwrap_err(), Error::Eof);
        assert!(dec.next().is_none(), "decoder stops after an error");
    }
}
