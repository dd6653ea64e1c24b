//! DNS resource records.
//!
//! This module contains types representing the resource record types the resolver understands
//! and their associated record data. Also refer to [`encoder::ResourceRecord`] and
//! [`decoder::ResourceRecord`].
//!
//! [`encoder::ResourceRecord`]: super::encoder::ResourceRecord
//! [`decoder::ResourceRecord`]: super::decoder::ResourceRecord

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};

use crate::Error;

use super::{
    decoder::{self, Reader},
    encoder::Writer,
    name::DomainName,
    Type,
};

pub struct ResourceRecordEncoder<'w, 'a> {
    pub(crate) w: &'w mut Writer<'a>,
}

pub struct ResourceRecordDecoder<'a> {
    pub(crate) r: Reader<'a>,
}

/// Trait implemented by all resource record types.
pub trait ResourceRecordData: Sized {
    /// The associated resource record type.
    const TYPE: Type;

    /// Writes the data of this resource record to the given encoder.
    fn encode(&self, enc: &mut ResourceRecordEncoder<'_, '_>);

    /// Attempts to decode an instance of this resource record from an RDATA field.
    fn decode(r: &mut ResourceRecordDecoder<'_>) -> Result<Self, Error>;
}

macro_rules! records {
    (
        $($record:ident),+ $(,)?
    ) => {
        /// Enumeration of all supported Resource Record types.
        #[non_exhaustive]
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum Record {
            $( $record($record), )+
        }

        impl Record {
            pub(crate) fn from_rr(rr: &decoder::ResourceRecord<'_>) -> Option<Result<Self, Error>> {
                let r = &mut ResourceRecordDecoder {
                    r: rr.rdata.clone(),
                };
                Some(match rr.type_() {
                    $( Type::$record => $record::decode(r).map(Self::$record), )+
                    _ => return None,
                })
            }

            pub(crate) fn encode(&self, enc: &mut ResourceRecordEncoder<'_, '_>) {
                match self {
                    $( Record::$record(rr) => rr.encode(enc), )+
                }
            }

            pub fn record_type(&self) -> Type {
                match self {
                    $( Record::$record(_) => $record::TYPE, )+
                }
            }
        }

        impl fmt::Display for Record {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $( Record::$record(r) => fmt::Display::fmt(r, f), )+
                }
            }
        }
    };
}

records!(A, AAAA, CNAME, NSEC);

impl Record {
    /// Builds an address record of the family matching `addr`.
    pub fn from_addr(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(addr) => Record::A(A::new(addr)),
            IpAddr::V6(addr) => Record::AAAA(AAAA::new(addr)),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct A {
    addr: Ipv4Addr,
}

impl ResourceRecordData for A {
    const TYPE: Type = Type::A;

    fn encode(&self, enc: &mut ResourceRecordEncoder<'_, '_>) {
        enc.w.write_slice(&self.addr.octets())
    }

    fn decode(dec: &mut ResourceRecordDecoder<'_>) -> Result<Self, Error> {
        Ok(Self {
            addr: Ipv4Addr::from(dec.r.read_array::<4>()?),
        })
    }
}

impl A {
    #[inline]
    pub fn new(addr: Ipv4Addr) -> Self {
        Self { addr }
    }

    #[inline]
    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }
}

impl fmt::Display for A {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.addr, f)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AAAA {
    addr: Ipv6Addr,
}

impl ResourceRecordData for AAAA {
    const TYPE: Type = Type::AAAA;

    fn encode(&self, enc: &mut ResourceRecordEncoder<'_, '_>) {
        enc.w.write_slice(&self.addr.octets());
    }

    fn decode(dec: &mut ResourceRecordDecoder<'_>) -> Result<Self, Error> {
        Ok(Self {
            addr: Ipv6Addr::from(dec.r.read_array::<16>()?),
        })
    }
}

impl AAAA {
    #[inline]
    pub fn new(addr: Ipv6Addr) -> Self {
        Self { addr }
    }

    #[inline]
    pub fn addr(&self) -> Ipv6Addr {
        self.addr
    }
}

impl fmt::Display for AAAA {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.addr, f)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CNAME {
    name: DomainName,
}

impl ResourceRecordData for CNAME {
    const TYPE: Type = Type::CNAME;

    fn encode(&self, enc: &mut ResourceRecordEncoder<'_, '_>) {
        enc.w.write_domain_name(&self.name);
    }

    fn decode(dec: &mut ResourceRecordDecoder<'_>) -> Result<Self, Error> {
        Ok(Self {
            name: dec.r.read_domain_name()?,
        })
    }
}

impl CNAME {
    pub fn new(name: DomainName) -> Self {
        Self { name }
    }

    #[inline]
    pub fn cname(&self) -> &DomainName {
        &self.name
    }
}

impl fmt::Display for CNAME {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.name, f)
    }
}

/// Authenticated denial of existence.
///
/// mDNS responders attach one of these to their announcements to assert which record types exist
/// for a name (and by omission, which do not). Only the type bitmap is interpreted.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NSEC {
    next: DomainName,
    types: Vec<Type>,
}

impl ResourceRecordData for NSEC {
    const TYPE: Type = Type::NSEC;

    fn encode(&self, enc: &mut ResourceRecordEncoder<'_, '_>) {
        enc.w.write_domain_name(&self.next);

        // Window blocks, in ascending window order. Each bitmap is trimmed to its last non-zero
        // octet.
        let mut types = self.types.iter().map(|ty| ty.0).collect::<Vec<_>>();
        types.sort_unstable();
        types.dedup();
        let mut i = 0;
        while i < types.len() {
            let window = (types[i] >> 8) as u8;
            let mut bitmap = [0u8; 32];
            let mut len = 0;
            while i < types.len() && (types[i] >> 8) as u8 == window {
                let low = (types[i] & 0xff) as usize;
                bitmap[low / 8] |= 0x80 >> (low % 8);
                len = low / 8 + 1;
                i += 1;
            }
            enc.w.write_u8(window);
            enc.w.write_u8(len as u8);
            enc.w.write_slice(&bitmap[..len]);
        }
    }

    fn decode(dec: &mut ResourceRecordDecoder<'_>) -> Result<Self, Error> {
        let next = dec.r.read_domain_name()?;
        let mut types = Vec::new();
        while !dec.r.buf().is_empty() {
            let window = dec.r.read_u8()?;
            let len = dec.r.read_u8()?;
            if len == 0 || len > 32 {
                return Err(Error::InvalidValue);
            }
            let bitmap = dec.r.read_slice(len.into())?;
            for (byte_idx, byte) in bitmap.iter().enumerate() {
                for bit in 0..8 {
                    if byte & (0x80 >> bit) != 0 {
                        let low = (byte_idx * 8 + bit) as u16;
                        types.push(Type(u16::from(window) << 8 | low));
                    }
                }
            }
        }
        Ok(Self { next, types })
    }
}

impl NSEC {
    pub fn new(next: DomainName, types: impl IntoIterator<Item = Type>) -> Self {
        Self {
            next,
            types: types.into_iter().collect(),
        }
    }

    #[inline]
    pub fn next_domain_name(&self) -> &DomainName {
        &self.next
    }

    /// Returns the record types asserted to exist.
    #[inline]
    pub fn types(&self) -> &[Type] {
        &self.types
    }
}

impl fmt::Display for NSEC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.next, f)?;
        for ty in &self.types {
            write!(f, " {}", ty)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::hex::Hex;

    use super::*;

    fn encode<R: ResourceRecordData>(rr: &R, buf: &mut [u8]) -> usize {
        let mut w = Writer::new(buf);
        rr.encode(&mut ResourceRecordEncoder { w: &mut w });
        w.pos
    }

    fn decode<R: ResourceRecordData>(buf: &[u8]) -> Result<R, Error> {
        R::decode(&mut ResourceRecordDecoder {
            r: Reader::new(buf),
        })
    }

    fn domain(s: &str) -> DomainName {
        s.parse().unwrap()
    }

    #[test]
    fn address_records() {
        let mut buf = [0; 64];
        let len = encode(&A::new(Ipv4Addr::new(9, 4, 78, 210)), &mut buf);
        assert_eq!(&buf[..len], &[9, 4, 78, 210]);
        assert_eq!(
            decode::<A>(&buf[..len]).unwrap().addr(),
            Ipv4Addr::new(9, 4, 78, 210)
        );

        let len = encode(&AAAA::new(Ipv6Addr::LOCALHOST), &mut buf);
        assert_eq!(len, 16);
        assert_eq!(decode::<AAAA>(&buf[..len]).unwrap().addr(), Ipv6Addr::LOCALHOST);

        assert_eq!(decode::<A>(&[1, 2, 3]), Err(Error::Eof));
    }

    #[test]
    fn cname() {
        let mut buf = [0; 64];
        let rr = CNAME::new(domain("a.b.c"));
        let len = encode(&rr, &mut buf);
        assert_eq!(decode::<CNAME>(&buf[..len]).unwrap(), rr);
    }

    #[test]
    fn nsec_bitmaps() {
        let mut buf = [0; 64];

        let len = encode(&NSEC::new(domain("h.local"), [Type::A]), &mut buf);
        assert_eq!(
            Hex(&buf[..len]).to_string(),
            "0168056c6f63616c00000140",
            "A is bit 1 of window 0"
        );

        let len = encode(&NSEC::new(domain("h.local"), [Type::AAAA]), &mut buf);
        assert_eq!(Hex(&buf[..len]).to_string(), "0168056c6f63616c0000040000000008");

        let rr = NSEC::new(domain("h.local"), [Type::AAAA, Type::A, Type::NSEC]);
        let len = encode(&rr, &mut buf);
        let decoded = decode::<NSEC>(&buf[..len]).unwrap();
        assert_eq!(decoded.types(), &[Type::A, Type::AAAA, Type::NSEC]);
        assert_eq!(decoded.next_domain_name(), &domain("h.local"));
    }

    #[test]
    fn nsec_rejects_empty_window() {
        assert_eq!(
            decode::<NSEC>(&[0, 0x00, 0x00]),
            Err(Error::InvalidValue)
        );
    }

    #[test]
    fn record_from_addr() {
        let rec = Record::from_addr(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(rec.record_type(), Type::A);
        let rec = Record::from_addr(IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(rec.record_type(), Type::AAAA);
        assert_eq!(rec.to_string(), "::1");
    }
}
