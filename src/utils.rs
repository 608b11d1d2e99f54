//! Small shared helpers: constant-time comparison, buffer checksums.

use subtle::ConstantTimeEq;

/// Compares two byte strings in constant time.  Lengths must already
/// match; unequal lengths compare unequal without a timing guarantee.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Additive two-term cascade checksum over a byte string, composable by
/// passing the previous result as `initial`.  This is an integrity
/// check against faults and stray writes, not a MAC.
pub fn checksum_bytes(data: &[u8], initial: u32) -> u32 {
    let mut sum1: u32 = data.len() as u32;
    let mut sum2: u32 = initial;
    for &b in data {
        sum1 = sum1.wrapping_add(b as u32);
        sum2 = sum2.wrapping_add(sum1);
    }
    sum2.wrapping_add(sum1)
}

/// XORs `in_` into `out`, up to the shorter length.
#[inline]
pub(crate) fn xor_buf(out: &mut [u8], in_: &[u8]) {
    let len = std::cmp::min(out.len(), in_.len());
    for i in 0..len {
        out[i] ^= in_[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abcd", b"abcd"));
        assert!(!constant_time_eq(b"abcd", b"abce"));
        assert!(!constant_time_eq(b"abcd", b"abc"));
    }

    #[test]
    fn test_checksum_sensitive_to_order_and_content() {
        let a = checksum_bytes(b"hello", 0);
        assert_eq!(a, checksum_bytes(b"hello", 0));
        assert_ne!(a, checksum_bytes(b"hellp", 0));
        assert_ne!(a, checksum_bytes(b"olleh", 0));
        // Chaining folds both pieces in.
        let chained = checksum_bytes(b"world", a);
        assert_ne!(chained, a);
        assert_ne!(chained, checksum_bytes(b"world", 0));
    }

    #[test]
    fn test_xor_buf() {
        let mut out = [0xffu8; 4];
        xor_buf(&mut out, &[0x0f, 0xf0, 0x00, 0xff]);
        assert_eq!(out, [0xf0, 0x0f, 0xff, 0x00]);
    }
}
