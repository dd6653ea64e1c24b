//! Domain names and labels.

use std::{
    fmt::{self, Write},
    str::FromStr,
};

use super::{decoder::Reader, encoder::Writer, Error};

/// One `.`-separated component of a [`DomainName`].
///
/// Holds between 1 and [`Label::MAX_LEN`] arbitrary bytes. Equality is byte-exact, DNS name
/// matching goes through [`Label::eq_ignore_ascii_case`] instead.
#[derive(Clone, PartialEq, Eq)]
pub struct Label(Box<[u8]>);

impl Label {
    /// Longest label the wire format can express.
    pub const MAX_LEN: usize = 63;

    pub fn try_new(label: impl AsRef<[u8]>) -> Result<Self, Error> {
        match label.as_ref() {
            [] => Err(Error::InvalidEmptyLabel),
            bytes if bytes.len() > Self::MAX_LEN => Err(Error::LabelTooLong),
            bytes => Ok(Self(bytes.into())),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn eq_ignore_ascii_case(&self, other: &[u8]) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.escape_ascii(), f)
    }
}

/// A domain name as a list of [`Label`]s, without the terminating root label.
#[derive(PartialEq, Eq, Clone)]
pub struct DomainName {
    labels: Vec<Label>,
}

impl DomainName {
    /// The root domain `.`.
    pub const ROOT: Self = Self { labels: Vec::new() };

    /// Parses `.`-separated labels. A single trailing `.` is accepted.
    pub fn from_str(s: &str) -> Result<Self, Error> {
        s.parse()
    }

    #[inline]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    #[inline]
    pub fn push_label(&mut self, label: Label) {
        self.labels.push(label);
    }

    /// Compares against a dotted name, ignoring ASCII case and trailing dots on `name`.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.trim_end_matches('.');
        if name.is_empty() {
            return self.labels.is_empty();
        }
        let mut parts = name.split('.');
        self.labels.iter().all(|label| {
            parts
                .next()
                .map_or(false, |part| label.eq_ignore_ascii_case(part.as_bytes()))
        }) && parts.next().is_none()
    }

    /// Compares two names label by label, ignoring ASCII case.
    pub fn eq_ignore_ascii_case(&self, other: &DomainName) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(&other.labels)
                .all(|(a, b)| a.eq_ignore_ascii_case(b.as_bytes()))
    }

    /// Joins the labels with `.`, without a trailing dot. The root domain gives an empty
    /// string.
    pub fn to_dotted(&self) -> Vec<u8> {
        self.labels
            .iter()
            .map(Label::as_bytes)
            .collect::<Vec<_>>()
            .join(&b'.')
    }

    /// Encoded length, counting the length bytes and the root label.
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.0.len() + 1).sum::<usize>() + 1
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return f.write_char('.');
        }
        for label in &self.labels {
            write!(f, "{}.", label)?;
        }
        Ok(())
    }
}

impl FromStr for DomainName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "." {
            return Ok(Self::ROOT);
        }
        let s = s.strip_suffix('.').unwrap_or(s);
        let labels = s
            .split('.')
            .map(Label::try_new)
            .collect::<Result<_, _>>()?;
        Ok(Self { labels })
    }
}

/// Writes `name` into `buf` as length-prefixed labels followed by the empty root label.
///
/// Returns the number of bytes written, or [`Error::Truncated`] if `buf` is too small.
pub fn encode_name(buf: &mut [u8], name: &DomainName) -> Result<usize, Error> {
    let mut w = Writer::new(buf);
    w.write_domain_name(name);
    w.finish()
}

/// Reads a label-encoded name starting at `offset` within the message `msg`.
///
/// Compression pointers are followed as long as they point to an earlier part of `msg`. Returns
/// the decoded name and the offset of the first byte after it.
pub fn decode_name(msg: &[u8], offset: usize) -> Result<(DomainName, usize), Error> {
    let mut r = Reader::new(msg);
    r.seek(offset)?;
    let name = r.read_domain_name()?;
    Ok((name, r.pos()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_limits() {
        assert_eq!(Label::try_new(""), Err(Error::InvalidEmptyLabel));
        assert_eq!(Label::try_new([b'a'; 64]), Err(Error::LabelTooLong));
        assert_eq!(Label::try_new([b'a'; 63]).unwrap().as_bytes().len(), 63);
    }

    #[test]
    fn display_label() {
        assert_eq!(Label::try_new("\0").unwrap().to_string(), r"\x00");
        assert_eq!(format!("{:?}", Label::try_new("a\n").unwrap()), r#""a\n""#);
    }

    #[test]
    fn domain_name_string_conversion() {
        assert_eq!("..".parse::<DomainName>(), Err(Error::InvalidEmptyLabel));
        assert_eq!(".com".parse::<DomainName>(), Err(Error::InvalidEmptyLabel));
        assert_eq!("a..b".parse::<DomainName>(), Err(Error::InvalidEmptyLabel));
        assert_eq!(".".parse::<DomainName>(), Ok(DomainName::ROOT));
        assert_eq!("com.".parse::<DomainName>().unwrap().to_string(), "com.");
        assert_eq!("com.".parse::<DomainName>().unwrap().labels().len(), 1);
    }

    #[test]
    fn matches_ignores_case_and_trailing_dots() {
        let name = DomainName::from_str("Device.local").unwrap();
        assert!(name.matches("device.LOCAL"));
        assert!(name.matches("device.local.."));
        assert!(!name.matches("device"));
        assert!(!name.matches("device.local.com"));
        assert!(!name.matches("devic.local"));
        assert!(DomainName::ROOT.matches("."));
        assert_eq!(name.to_dotted(), b"Device.local");
        assert_eq!(DomainName::ROOT.to_dotted(), b"");
        assert_eq!(name.wire_len(), 14);
        assert!(name.eq_ignore_ascii_case(&DomainName::from_str("DEVICE.local.").unwrap()));
        assert!(!name.eq_ignore_ascii_case(&DomainName::from_str("device").unwrap()));
    }

    #[test]
    fn name_roundtrip() {
        for s in ["example.com", "a", "host.local", "x.y.z.example.org", "UPPER.lower"] {
            let name = DomainName::from_str(s).unwrap();
            let mut buf = [0; 64];
            let len = encode_name(&mut buf, &name).unwrap();
            assert_eq!(len, name.wire_len());
            let (decoded, end) = decode_name(&buf[..len], 0).unwrap();
            assert_eq!(end, len);
            assert_eq!(decoded.to_dotted(), s.as_bytes());
        }
    }

    #[test]
    fn encode_name_into_small_buffer() {
        let name = DomainName::from_str("example.com").unwrap();
        let mut buf = [0; 4];
        assert_eq!(encode_name(&mut buf, &name), Err(Error::Truncated));
    }
}
