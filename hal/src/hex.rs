//! # Fixed-Width Hexadecimal
//!
//! Integer to upper-case hex text with no loss of leading zeros. Digits above
//! the requested width are dropped, matching a `W`-nibble register dump.

/// Render the low `W` nibbles of `n` as upper-case hex
#[inline(always)]
pub fn to_hex<const W: usize>(n: u64) -> [u8; W] {
    let mut out = [b'0'; W];
    let mut i = 0;
    while i < W {
        let shift = (i as u32) * 4;
        let digit = if shift < 64 { ((n >> shift) & 0xF) as u8 } else { 0 };
        out[W - 1 - i] = if digit <= 9 { b'0' + digit } else { b'A' + digit - 10 };
        i += 1;
    }
    out
}

/// Eight-digit form used for addresses and sizes in the boot trace
#[inline(always)]
pub fn hex32(n: u64) -> [u8; 8] {
    to_hex::<8>(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_zeros_kept() {
        assert_eq!(&hex32(0x1000), b"00001000");
        assert_eq!(&hex32(0), b"00000000");
    }

    #[test]
    fn test_upper_case_digits() {
        assert_eq!(&hex32(0x87FF_00AB), b"87FF00AB");
        assert_eq!(&to_hex::<4>(0xBEEF), b"BEEF");
    }

    #[test]
    fn test_truncates_to_width() {
        assert_eq!(&to_hex::<4>(0x1_2345), b"2345");
        assert_eq!(&hex32(0x1_8000_1000), b"80001000");
    }

    #[test]
    fn test_wide_output() {
        assert_eq!(&to_hex::<20>(u64::MAX), b"0000FFFFFFFFFFFFFFFF");
    }
}
