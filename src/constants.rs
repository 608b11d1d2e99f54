//! Constant value definitions.
//!
//! Size floors and ceilings for keys, IVs, hash values and big-integer
//! key components, plus the policy defaults used by key derivation.
//! All byte quantities unless noted otherwise.

/// Largest conventional-cipher or MAC key, in bytes.
pub const MAX_KEYSIZE: usize = 64;
/// Smallest conventional-cipher or MAC key accepted for loading.
pub const MIN_KEYSIZE: usize = 8;
/// Largest cipher block / IV, in bytes.
pub const MAX_IVSIZE: usize = 32;
/// Largest hash or MAC output, in bytes.
pub const MAX_HASHSIZE: usize = 64;
/// Largest text attribute (label), in bytes.
pub const MAX_TEXTSIZE: usize = 64;

/// Largest public-key component, in bytes (4096 bits).
pub const MAX_PKCSIZE: usize = 512;
/// Smallest secure public-key modulus, in bytes (1024 bits).
pub const MIN_PKCSIZE: usize = 128;
/// Smallest secure ECC field element, in bytes (192 bits).
pub const MIN_PKCSIZE_ECC: usize = 24;
/// Lower edge of the "too short to be secure" window for standard PKC
/// keys, in bytes (512 bits).  A key in `MIN_PKCSIZE_THRESHOLD..MIN_PKCSIZE`
/// is well-formed but insecure; anything below is treated as malformed.
pub const MIN_PKCSIZE_THRESHOLD: usize = 64;
/// Lower edge of the "too short to be secure" window for ECC keys, in
/// bytes (120 bits).
pub const MIN_PKCSIZE_ECC_THRESHOLD: usize = 15;

/// Smallest DLP subgroup order, in bytes (128 bits).
pub const MIN_DLP_QSIZE: usize = 16;
/// Surplus random bits folded into a DLP nonce before reduction, so that
/// the reduced value is free of modular bias.
pub const DLP_OVERFLOW_BITS: usize = 32;

/// Smallest RSA public exponent encoding, in bytes.
pub const RSA_MIN_ESIZE: usize = 1;
/// Largest RSA public exponent encoding, in bytes.
pub const RSA_MAX_ESIZE: usize = 4;

/// Smallest generic-secret value, in bytes.
pub const MIN_GENERIC_SECRET: usize = 16;

/// Key-derivation salt size, in bytes.
pub const KDF_SALT_SIZE: usize = 8;
/// Default key-derivation iteration count when the user sets none.
pub const KDF_DEFAULT_ITERATIONS: u32 = 10_000;
/// Upper bound on a user-supplied iteration count.
pub const KDF_MAX_ITERATIONS: u32 = 1 << 24;

/// Size of a public-key identifier (an SHA-1 hash), in bytes.
pub const KEYID_SIZE: usize = 20;

/// Largest cached encoded public-key blob, in bytes.
pub const MAX_ENCODED_KEYSIZE: usize = 2 * MAX_PKCSIZE + 64;

/// Most zero bytes that may legitimately be stripped from the leading end
/// of a value presented to a private-key operation.
pub const MAX_LEADING_ZEROES: usize = 16;

#[inline]
pub(crate) const fn bits_to_bytes(bits: usize) -> usize {
    (bits + 7) / 8
}
