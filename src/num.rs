/// A big-endian `u16` as it appears on the wire.
#[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(transparent)]
pub(crate) struct U16(u16);

impl U16 {
    pub(crate) fn get(self) -> u16 {
        u16::from_be(self.0)
    }
}

impl From<u16> for U16 {
    fn from(value: u16) -> Self {
        Self(value.to_be())
    }
}

/// Reassembles a 32-bit TTL from the two 16-bit halves it is transmitted as.
#[inline]
pub(crate) fn join_halves(high: u16, low: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

/// Splits a 32-bit TTL into its high and low 16-bit halves.
#[inline]
pub(crate) fn split_halves(value: u32) -> (u16, u16) {
    ((value >> 16) as u16, value as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_halves() {
        assert_eq!(join_halves(0, 120), 120);
        assert_eq!(join_halves(1, 0), 65536);
        assert_eq!(split_halves(0x0001_0078), (1, 0x78));
        assert_eq!(U16::from(0x1234).get(), 0x1234);
    }
}
