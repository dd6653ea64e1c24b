use std::fmt;

pub(crate) struct Hex<'a>(pub &'a [u8]);

impl<'a> fmt::Display for Hex<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Builds the `-xx-xx-xx` suffix appended to a hostname after a name conflict, from the last
/// three bytes of the link-layer address.
///
/// Addresses shorter than three bytes contribute what they have.
pub(crate) fn conflict_suffix(link_layer_addr: &[u8]) -> String {
    let tail = &link_layer_addr[link_layer_addr.len().saturating_sub(3)..];
    tail.iter().map(|byte| format!("-{:02x}", byte)).collect()
}

/// Decodes a hex string, for test fixtures.
#[cfg(test)]
pub(crate) fn parse(s: &str) -> Vec<u8> {
    assert_eq!(s.len() % 2, 0, "odd number of hex digits");
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).unwrap();
            u8::from_str_radix(pair, 16).unwrap()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_both_ways() {
        let bytes = parse("00abFF");
        assert_eq!(bytes, &[0x00, 0xab, 0xff]);
        assert_eq!(Hex(&bytes).to_string(), "00abff");
    }

    #[test]
    fn suffix() {
        assert_eq!(conflict_suffix(&[0x02, 0x00, 0x5e, 0x0a, 0xbc, 0xff]), "-0a-bc-ff");
        assert_eq!(conflict_suffix(&[0x7f]), "-7f");
        assert_eq!(conflict_suffix(&[]), "");
    }
}
