//! DNS and mDNS wire codec.
//!
//! Messages consist of a fixed 12-byte [`Header`] followed by the *Question*, *Answer*,
//! *Authority* and *Additional Records* sections. The [`decoder`] and [`encoder`] modules
//! provide bounds-checked streaming access to those sections.

#[macro_use]
mod macros;
pub mod decoder;
pub mod encoder;
mod error;
pub mod name;
pub mod records;
pub mod section;

use core::fmt;

use bitflags::bitflags;

use crate::num::U16;

pub use error::Error;

/// Fixed offset added to a cache slot index to form the 16-bit transaction ID of a query.
pub const ID_OFFSET: u16 = 61616;

/// Maps a cache slot index to the transaction ID used for its queries.
#[inline]
pub fn encode_id(index: usize) -> u16 {
    (index as u16).wrapping_add(ID_OFFSET)
}

/// Maps a transaction ID back to a cache slot index.
///
/// Returns [`None`] if the decoded index is not below `capacity`.
#[inline]
pub fn decode_id(id: u16, capacity: usize) -> Option<usize> {
    let index = usize::from(id.wrapping_sub(ID_OFFSET));
    if index < capacity {
        Some(index)
    } else {
        None
    }
}

ffi_enum! {
    /// Kind of operation a message performs. Only `QUERY` is ever sent.
    pub enum Opcode: u8 {
        QUERY = 0,
        IQUERY = 1,
        STATUS = 2,
        NOTIFY = 4,
        UPDATE = 5,
    }
}

ffi_enum! {
    /// Response code in the low 4 bits of the header flags.
    pub enum RCode: u8 {
        NO_ERROR = 0,
        /// The server could not interpret the query.
        FORM_ERR = 1,
        SERV_FAIL = 2,
        /// The name does not exist.
        NX_DOMAIN = 3,
        NOT_IMP = 4,
        REFUSED = 5,
    }
}

ffi_enum! {
    /// Resource record types.
    ///
    /// Only addresses, `CNAME` and `NSEC` have record codecs (see [`records`]). The others are
    /// named so that they show up readably in logs.
    pub enum Type: u16 {
        A = 1,
        NS = 2,
        CNAME = 5,
        SOA = 6,
        PTR = 12,
        MX = 15,
        TXT = 16,
        AAAA = 28,
        SRV = 33,
        NSEC = 47,
    }
}

ffi_enum! {
    /// Record type asked for by a question.
    ///
    /// Shares its values with [`Type`], plus the `ALL` wildcard.
    pub enum QType: u16 {
        A = 1,
        CNAME = 5,
        TXT = 16,
        AAAA = 28,
        NSEC = 47,
        ALL = 255,
    }
}

impl From<Type> for QType {
    fn from(ty: Type) -> Self {
        QType(ty.0)
    }
}

ffi_enum! {
    /// Record classes. Everything this crate sends or accepts is `IN`.
    pub enum Class: u16 {
        IN = 1,
        CS = 2,
        CH = 3,
        HS = 4,
    }
}

ffi_enum! {
    /// Class asked for by a question, with the top (QU) bit already stripped.
    pub enum QClass: u16 {
        IN = 1,
        CH = 3,
        ANY = 255,
    }
}

bitflags! {
    /// The flags word, in host bit order.
    ///
    /// RFC 1035 numbers bits from the most significant end, so `QR` is the top bit.
    #[derive(Debug)]
    #[repr(transparent)]
    struct HeaderFlags: u16 {
        /// Message is a response.
        const QR = 0x8000;
        const OPCODE = 0x7800;
        /// Authoritative answer. mDNS responders always set it.
        const AA = 0x0400;
        /// Truncated.
        const TC = 0x0200;
        /// Recursion desired. Only unicast queries carry it.
        const RD = 0x0100;
        const RA = 0x0080;
        const RCODE = 0x000f;
    }
}

impl HeaderFlags {
    fn opcode(&self) -> Opcode {
        Opcode(((self.bits() & Self::OPCODE.bits()) >> 11) as u8)
    }

    fn rcode(&self) -> RCode {
        RCode((self.bits() & Self::RCODE.bits()) as u8)
    }
}

/// The fixed 12-byte message header.
///
/// Section counts are kept in wire order: question, answer, authority, additional.
#[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C, packed)]
pub struct Header {
    id: U16,
    flags: U16,
    counts: [U16; 4],
}

impl Header {
    /// Size of the encoded header in bytes.
    pub const LEN: usize = 12;

    fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_retain(self.flags.get())
    }

    fn set_flag(&mut self, flag: HeaderFlags, on: bool) {
        let mut flags = self.flags();
        flags.set(flag, on);
        self.flags = flags.bits().into();
    }

    /// Returns the transaction ID.
    ///
    /// Unicast servers echo it, which is how responses are matched to cache slots. mDNS
    /// responses carry 0.
    #[inline]
    pub fn id(&self) -> u16 {
        self.id.get()
    }

    #[inline]
    pub fn set_id(&mut self, id: u16) {
        self.id = id.into();
    }

    /// Returns whether the whole flags word is zero.
    ///
    /// mDNS queries and probes look like this. Anything with a flag set is processed as a
    /// response.
    #[inline]
    pub fn is_plain_query(&self) -> bool {
        self.flags.get() == 0
    }

    #[inline]
    pub fn is_query(&self) -> bool {
        !self.is_response()
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.flags().contains(HeaderFlags::QR)
    }

    pub fn set_response(&mut self, is_response: bool) {
        self.set_flag(HeaderFlags::QR, is_response);
    }

    pub fn is_truncated(&self) -> bool {
        self.flags().contains(HeaderFlags::TC)
    }

    pub fn set_truncated(&mut self, trunc: bool) {
        self.set_flag(HeaderFlags::TC, trunc);
    }

    pub fn is_recursion_desired(&self) -> bool {
        self.flags().contains(HeaderFlags::RD)
    }

    pub fn set_recursion_desired(&mut self, rd: bool) {
        self.set_flag(HeaderFlags::RD, rd);
    }

    pub fn is_authority(&self) -> bool {
        self.flags().contains(HeaderFlags::AA)
    }

    pub fn set_authority(&mut self, aa: bool) {
        self.set_flag(HeaderFlags::AA, aa);
    }

    pub fn opcode(&self) -> Opcode {
        self.flags().opcode()
    }

    pub fn rcode(&self) -> RCode {
        self.flags().rcode()
    }

    pub fn set_rcode(&mut self, rcode: RCode) {
        let bits = (self.flags.get() & !HeaderFlags::RCODE.bits()) | u16::from(rcode.0 & 0xf);
        self.flags = bits.into();
    }

    pub fn question_count(&self) -> u16 {
        self.counts()[0]
    }

    pub fn answer_count(&self) -> u16 {
        self.counts()[1]
    }

    pub fn authoritative_count(&self) -> u16 {
        self.counts()[2]
    }

    pub fn additional_count(&self) -> u16 {
        self.counts()[3]
    }

    /// All four section counts, in wire order.
    pub(crate) fn counts(&self) -> [u16; 4] {
        self.counts.map(|c| c.get())
    }

    pub(crate) fn set_counts(&mut self, counts: [u16; 4]) {
        self.counts = counts.map(U16::from);
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("id", &self.id())
            .field("flags", &self.flags())
            .field("counts", &self.counts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header() {
        let mut h = Header::default();
        assert!(h.is_query());
        assert!(h.is_plain_query());
        assert!(!h.is_authority());
        assert!(!h.is_recursion_desired());
        assert_eq!(h.opcode(), Opcode::QUERY);

        h.set_rcode(RCode::NX_DOMAIN);
        assert_eq!(h.rcode(), RCode::NX_DOMAIN);
        assert!(!h.is_plain_query());
        assert!(h.is_query());
        h.set_rcode(RCode::NO_ERROR);
        assert!(h.is_plain_query());

        h.set_response(true);
        h.set_authority(true);
        h.set_counts([1, 2, 0, 3]);
        let bytes = bytemuck::bytes_of(&h);
        assert_eq!(bytes, &[0, 0, 0x84, 0, 0, 1, 0, 2, 0, 0, 0, 3]);
        assert_eq!(h.answer_count(), 2);
        assert_eq!(h.additional_count(), 3);
    }

    #[test]
    fn header_size() {
        assert_eq!(std::mem::size_of::<Header>(), Header::LEN);
    }

    #[test]
    fn transaction_ids() {
        assert_eq!(encode_id(0), 61616);
        assert_eq!(encode_id(3), 61619);
        assert_eq!(decode_id(61616, 4), Some(0));
        assert_eq!(decode_id(61619, 4), Some(3));
        assert_eq!(decode_id(61620, 4), None);
        assert_eq!(decode_id(0, 4), None);
        assert_eq!(decode_id(1, 4), None);
        assert_eq!(decode_id(61615, 4), None);
    }

    #[test]
    fn enum_names() {
        assert_eq!(Type::AAAA.to_string(), "AAAA");
        assert_eq!(QType::ALL.name(), Some("ALL"));
        assert_eq!(format!("{:?}", RCode::NX_DOMAIN), "NX_DOMAIN");
        assert_eq!(Type(999).name(), None);
        assert_eq!(Type(999).to_string(), "(unknown Type: 0x3e7)");
    }
}
