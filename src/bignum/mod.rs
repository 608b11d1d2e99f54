//! Fixed-capacity big integers.
//!
//! Every [`Bignum`] owns a fixed word array sized for the largest key
//! component the library handles (4096 bits plus guard words), so no
//! arithmetic operation ever allocates.  Values are wiped on drop, and
//! scratch values live in a fixed pool with stack discipline (see
//! [`arena`]).
//!
//! ```
//! use cryptoctx::bignum::Bignum;
//!
//! let a = Bignum::from_bytes(&[0x01, 0x00]).unwrap();
//! let b = Bignum::from_word(255);
//! let mut sum = Bignum::default();
//! sum.set_add(&a, &b).unwrap();
//! assert_eq!(sum.word(0), 511);
//! ```

pub mod arena;
pub mod mont;
pub mod prime;

use std::cmp::Ordering;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{MAX_PKCSIZE, MIN_PKCSIZE, MIN_PKCSIZE_ECC, MIN_PKCSIZE_ECC_THRESHOLD,
                       MIN_PKCSIZE_THRESHOLD};
use crate::error::{ErrorKind, Result};

/// The limb type.  32-bit words keep every intermediate product within
/// native 64-bit arithmetic on all targets.
pub(crate) type Word = u32;
const WORD_BITS: usize = 32;
const WORD_BYTES: usize = 4;

/// Largest value handled, in bytes.
pub const BN_MAX_BYTES: usize = MAX_PKCSIZE;
/// Fixed per-value word capacity, with guard words for carries in
/// modular arithmetic.
pub const BN_WORDS: usize = BN_MAX_BYTES / WORD_BYTES + 4;
const BN_DOUBLE_WORDS: usize = 2 * BN_WORDS + 2;

/// What key-size policy applies when importing a key component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySizeCheck {
    /// No key-size policy, plain range check only.
    None,
    /// Standard PKC component: sizes in the short-key window fail as
    /// insecure rather than malformed.
    Pkc,
    /// ECC component, with the ECC short-key window.
    Ecc,
}

/// A fixed-capacity multi-precision integer.
///
/// Invariant: `d[top..]` is zero, and `d[top - 1] != 0` whenever
/// `top > 0`.  Zero is represented as `top == 0`, never negative.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Bignum {
    neg: bool,
    top: usize,
    d: [Word; BN_WORDS],
}

impl Default for Bignum {
    fn default() -> Self {
        Bignum {
            neg: false,
            top: 0,
            d: [0; BN_WORDS],
        }
    }
}

impl PartialEq for Bignum {
    fn eq(&self, other: &Self) -> bool {
        self.neg == other.neg && self.top == other.top && self.d[..self.top] == other.d[..other.top]
    }
}

impl Eq for Bignum {}

impl std::fmt::Debug for Bignum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.neg {
            write!(f, "-")?;
        }
        write!(f, "0x")?;
        if self.top == 0 {
            return write!(f, "0");
        }
        for i in (0..self.top).rev() {
            if i == self.top - 1 {
                write!(f, "{:x}", self.d[i])?;
            } else {
                write!(f, "{:08x}", self.d[i])?;
            }
        }
        Ok(())
    }
}

/// Double-width scratch used for products before reduction.  Stack
/// allocated, wiped on drop.
struct DoubleTmp {
    d: [Word; BN_DOUBLE_WORDS],
}

impl DoubleTmp {
    fn new() -> Self {
        DoubleTmp {
            d: [0; BN_DOUBLE_WORDS],
        }
    }

    fn len(&self) -> usize {
        word_len(&self.d)
    }
}

impl Drop for DoubleTmp {
    fn drop(&mut self) {
        self.d.zeroize();
    }
}

impl Bignum {
    /// Creates a zero-valued bignum.
    pub fn new() -> Self {
        Bignum::default()
    }

    /// Creates a bignum holding a single word.
    pub fn from_word(w: Word) -> Self {
        let mut bn = Bignum::default();
        bn.set_word(w);
        bn
    }

    /// Resets this value to zero, wiping the stored words.
    pub fn set_zero(&mut self) {
        self.d.zeroize();
        self.top = 0;
        self.neg = false;
    }

    /// Sets this value to a single word.
    pub fn set_word(&mut self, w: Word) {
        self.set_zero();
        if w != 0 {
            self.d[0] = w;
            self.top = 1;
        }
    }

    /// Copies the value of `other` into `self`.
    pub fn copy_from(&mut self, other: &Bignum) {
        self.d = other.d;
        self.top = other.top;
        self.neg = other.neg;
    }

    /// Reads the `i`th word, zero beyond the current length.
    pub fn word(&self, i: usize) -> Word {
        if i < self.top { self.d[i] } else { 0 }
    }

    /// True when the value is zero.
    pub fn is_zero(&self) -> bool {
        self.top == 0
    }

    /// True when the value is one.
    pub fn is_one(&self) -> bool {
        self.top == 1 && self.d[0] == 1 && !self.neg
    }

    /// True when the low bit is set.
    pub fn is_odd(&self) -> bool {
        self.top > 0 && (self.d[0] & 1) == 1
    }

    /// True when the value is negative.
    pub fn is_negative(&self) -> bool {
        self.neg
    }

    /// Number of significant bits.
    pub fn bit_count(&self) -> usize {
        if self.top == 0 {
            return 0;
        }
        self.top * WORD_BITS - self.d[self.top - 1].leading_zeros() as usize
    }

    /// Number of significant bytes.
    pub fn byte_count(&self) -> usize {
        (self.bit_count() + 7) / 8
    }

    /// Reads bit `i` (LSB is bit 0).
    pub fn bit(&self, i: usize) -> bool {
        let word = i / WORD_BITS;
        word < self.top && (self.d[word] >> (i % WORD_BITS)) & 1 == 1
    }

    /// Sets bit `i`, growing the value as needed.
    pub fn set_bit(&mut self, i: usize) -> Result<()> {
        let word = i / WORD_BITS;
        ensure_internal!(word < BN_WORDS);
        self.d[word] |= 1 << (i % WORD_BITS);
        if word >= self.top {
            self.top = word + 1;
        }
        Ok(())
    }

    fn normalize(&mut self) {
        while self.top > 0 && self.d[self.top - 1] == 0 {
            self.top -= 1;
        }
        if self.top == 0 {
            self.neg = false;
        }
    }

    /// Magnitude comparison, ignoring signs.
    pub fn ucmp(&self, other: &Bignum) -> Ordering {
        word_cmp(&self.d[..self.top], &other.d[..other.top])
    }

    /// Signed comparison.
    pub fn cmp_signed(&self, other: &Bignum) -> Ordering {
        match (self.neg, other.neg) {
            (false, false) => self.ucmp(other),
            (true, true) => other.ucmp(self),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        }
    }

    /// Compares against a single word.
    pub fn cmp_word(&self, w: Word) -> Ordering {
        if self.neg {
            return Ordering::Less;
        }
        if self.top > 1 {
            return Ordering::Greater;
        }
        self.word(0).cmp(&w)
    }

    // --- import/export ---

    /// Imports a big-endian byte string.  Leading zeroes are stripped;
    /// the effective length must fit the fixed capacity.
    pub fn from_bytes(bytes: &[u8]) -> Result<Bignum> {
        let mut skip = 0;
        while skip < bytes.len() && bytes[skip] == 0 {
            skip += 1;
        }
        let src = &bytes[skip..];
        if src.len() > BN_WORDS * WORD_BYTES {
            return Err(ErrorKind::Overflow.into());
        }
        let mut bn = Bignum::default();
        for (i, &b) in src.iter().rev().enumerate() {
            bn.d[i / WORD_BYTES] |= (b as Word) << (8 * (i % WORD_BYTES));
        }
        bn.top = (src.len() + WORD_BYTES - 1) / WORD_BYTES;
        bn.normalize();
        Ok(bn)
    }

    /// Imports a key component with range and key-size policy checks.
    ///
    /// Values of zero or one are always rejected as malformed.  With a
    /// key-size check selected, a well-formed value inside the short-key
    /// window fails as [`ErrorKind::Insecure`], which callers must never
    /// remap; genuinely undersized or oversized values are malformed.
    pub fn from_bytes_checked(
        bytes: &[u8],
        min_bytes: usize,
        max_bytes: usize,
        max_range: Option<&Bignum>,
        check: KeySizeCheck,
    ) -> Result<Bignum> {
        let bn = Bignum::from_bytes(bytes)?;
        if bn.cmp_word(1) != Ordering::Greater {
            return Err(ErrorKind::BadData.into());
        }
        let len = bn.byte_count();
        match check {
            KeySizeCheck::Pkc if len >= MIN_PKCSIZE_THRESHOLD && len < MIN_PKCSIZE => {
                return Err(ErrorKind::Insecure.into());
            }
            KeySizeCheck::Ecc if len >= MIN_PKCSIZE_ECC_THRESHOLD && len < MIN_PKCSIZE_ECC => {
                return Err(ErrorKind::Insecure.into());
            }
            _ => {}
        }
        if len < min_bytes || len > max_bytes {
            return Err(ErrorKind::BadData.into());
        }
        if let Some(limit) = max_range {
            if bn.ucmp(limit) != Ordering::Less {
                return Err(ErrorKind::BadData.into());
            }
        }
        Ok(bn)
    }

    /// Exports as a minimal-length big-endian byte string, returning the
    /// number of bytes written.
    pub fn to_bytes(&self, out: &mut [u8]) -> Result<usize> {
        let len = self.byte_count();
        if len > out.len() {
            return Err(ErrorKind::Overflow.into());
        }
        self.write_bytes(&mut out[..len]);
        Ok(len)
    }

    /// Exports as a fixed-length big-endian byte string, left-padded
    /// with zeroes.
    pub fn to_bytes_padded(&self, out: &mut [u8]) -> Result<()> {
        let len = self.byte_count();
        if len > out.len() {
            return Err(ErrorKind::Overflow.into());
        }
        let pad = out.len() - len;
        for b in &mut out[..pad] {
            *b = 0;
        }
        self.write_bytes(&mut out[pad..]);
        Ok(())
    }

    fn write_bytes(&self, out: &mut [u8]) {
        let len = out.len();
        for (i, b) in out.iter_mut().rev().enumerate() {
            *b = (self.word(i / WORD_BYTES) >> (8 * (i % WORD_BYTES))) as u8;
        }
        debug_assert!(len == self.byte_count());
    }

    /// Fills this value with `bits` random bits (the top bit is left to
    /// chance, so the result is uniform in `[0, 2^bits)`).
    pub fn set_random_bits(&mut self, bits: usize) -> Result<()> {
        ensure_internal!(bits > 0 && bits <= BN_WORDS * WORD_BITS);
        let bytes = (bits + 7) / 8;
        let mut buf = [0u8; BN_MAX_BYTES + WORD_BYTES * 4];
        crate::rng::copy_randombytes(&mut buf[..bytes]);
        if bits % 8 != 0 {
            buf[0] &= (1u8 << (bits % 8)) - 1;
        }
        let imported = Bignum::from_bytes(&buf[..bytes])?;
        buf.zeroize();
        self.copy_from(&imported);
        Ok(())
    }

    // --- addition and subtraction ---

    fn uadd_assign(&mut self, other: &Bignum) -> Result<()> {
        let mut carry: u64 = 0;
        let n = self.top.max(other.top);
        ensure_internal!(n < BN_WORDS);
        for i in 0..n {
            let s = self.word(i) as u64 + other.word(i) as u64 + carry;
            self.d[i] = s as Word;
            carry = s >> WORD_BITS;
        }
        self.d[n] = carry as Word;
        self.top = n + 1;
        self.normalize();
        Ok(())
    }

    // Magnitude subtract; requires |self| >= |other|.
    fn usub_assign(&mut self, other: &Bignum) -> Result<()> {
        ensure_internal!(word_cmp(&self.d[..self.top], &other.d[..other.top]) != Ordering::Less);
        let mut borrow: u64 = 0;
        for i in 0..self.top {
            let (s, o) = (self.word(i) as u64, other.word(i) as u64);
            let t = s.wrapping_sub(o).wrapping_sub(borrow);
            self.d[i] = t as Word;
            borrow = (t >> 63) & 1;
        }
        self.normalize();
        Ok(())
    }

    /// `self += other`, signed.
    pub fn add_assign(&mut self, other: &Bignum) -> Result<()> {
        if self.neg == other.neg {
            return self.uadd_assign(other);
        }
        match self.ucmp(other) {
            Ordering::Less => {
                let mut t = other.clone();
                t.usub_assign(self)?;
                self.copy_from(&t);
            }
            _ => self.usub_assign(other)?,
        }
        self.normalize();
        Ok(())
    }

    /// `self -= other`, signed.
    pub fn sub_assign(&mut self, other: &Bignum) -> Result<()> {
        if self.neg != other.neg {
            return self.uadd_assign(other);
        }
        match self.ucmp(other) {
            Ordering::Less => {
                let mut t = other.clone();
                t.usub_assign(self)?;
                t.neg = !other.neg && !t.is_zero();
                self.copy_from(&t);
            }
            _ => self.usub_assign(other)?,
        }
        self.normalize();
        Ok(())
    }

    /// `self = a + b`, signed.
    pub fn set_add(&mut self, a: &Bignum, b: &Bignum) -> Result<()> {
        self.copy_from(a);
        self.add_assign(b)
    }

    /// `self = a - b`, signed.
    pub fn set_sub(&mut self, a: &Bignum, b: &Bignum) -> Result<()> {
        self.copy_from(a);
        self.sub_assign(b)
    }

    /// `self += w`; only valid for non-negative values.
    pub fn add_word_assign(&mut self, w: Word) -> Result<()> {
        ensure_internal!(!self.neg);
        let mut carry = w as u64;
        let mut i = 0;
        while carry != 0 {
            ensure_internal!(i < BN_WORDS);
            let s = self.word(i) as u64 + carry;
            self.d[i] = s as Word;
            carry = s >> WORD_BITS;
            i += 1;
        }
        if i > self.top {
            self.top = i;
        }
        self.normalize();
        Ok(())
    }

    /// `self -= w`; only valid for non-negative values at least `w`.
    pub fn sub_word_assign(&mut self, w: Word) -> Result<()> {
        ensure_internal!(!self.neg && self.cmp_word(w) != Ordering::Less);
        let t = Bignum::from_word(w);
        self.usub_assign(&t)
    }

    // --- shifts ---

    /// `self <<= n`.
    pub fn shl_assign(&mut self, n: usize) -> Result<()> {
        if self.top == 0 || n == 0 {
            return Ok(());
        }
        let words = n / WORD_BITS;
        let bits = n % WORD_BITS;
        let new_top = self.top + words + if bits > 0 { 1 } else { 0 };
        ensure_internal!(new_top <= BN_WORDS);
        for i in (0..new_top).rev() {
            let src = i as isize - words as isize;
            let hi = if src >= 0 { self.word(src as usize) } else { 0 };
            let lo = if src >= 1 { self.word(src as usize - 1) } else { 0 };
            self.d[i] = if bits == 0 {
                hi
            } else {
                (hi << bits) | (lo >> (WORD_BITS - bits))
            };
        }
        self.top = new_top;
        self.normalize();
        Ok(())
    }

    /// `self >>= n`.
    pub fn shr_assign(&mut self, n: usize) {
        let words = n / WORD_BITS;
        let bits = n % WORD_BITS;
        if words >= self.top {
            self.set_zero();
            return;
        }
        let new_top = self.top - words;
        for i in 0..new_top {
            let lo = self.word(i + words);
            let hi = self.word(i + words + 1);
            self.d[i] = if bits == 0 {
                lo
            } else {
                (lo >> bits) | hi.checked_shl((WORD_BITS - bits) as u32).unwrap_or(0)
            };
        }
        for i in new_top..self.top {
            self.d[i] = 0;
        }
        self.top = new_top;
        self.normalize();
    }

    // --- multiplication ---

    /// `self = a * b`, signed.  The product must fit the fixed capacity.
    pub fn set_mul(&mut self, a: &Bignum, b: &Bignum) -> Result<()> {
        let mut tmp = DoubleTmp::new();
        mul_into(&mut tmp, a, b);
        let len = tmp.len();
        if len > BN_WORDS {
            return Err(ErrorKind::Overflow.into());
        }
        self.set_zero();
        self.d[..len].copy_from_slice(&tmp.d[..len]);
        self.top = len;
        self.neg = a.neg != b.neg && self.top > 0;
        Ok(())
    }

    /// `self = a * a`.
    pub fn set_sqr(&mut self, a: &Bignum) -> Result<()> {
        self.set_mul(a, &a.clone())
    }

    /// `self *= w`; only valid for non-negative values.
    pub fn mul_word_assign(&mut self, w: Word) -> Result<()> {
        ensure_internal!(!self.neg);
        let mut carry: u64 = 0;
        for i in 0..self.top {
            let p = self.d[i] as u64 * w as u64 + carry;
            self.d[i] = p as Word;
            carry = p >> WORD_BITS;
        }
        if carry != 0 {
            ensure_internal!(self.top < BN_WORDS);
            self.d[self.top] = carry as Word;
            self.top += 1;
        }
        self.normalize();
        Ok(())
    }

    // --- division and modular arithmetic ---

    /// `q = a / d`, `r = a mod d` (truncated division on magnitudes;
    /// both inputs must be non-negative).
    pub fn div_rem(a: &Bignum, d: &Bignum, q: &mut Bignum, r: &mut Bignum) -> Result<()> {
        ensure_internal!(!a.neg && !d.neg && !d.is_zero());
        let mut num = DoubleTmp::new();
        num.d[..a.top].copy_from_slice(&a.d[..a.top]);
        q.set_zero();
        r.set_zero();
        div_core(&mut num.d, a.top, &d.d[..d.top], Some(&mut q.d))?;
        q.top = word_len(&q.d);
        r.d[..d.top].copy_from_slice(&num.d[..d.top]);
        r.top = word_len(&r.d[..d.top]);
        Ok(())
    }

    /// `self = a mod m`, with the result in `[0, m)` for signed `a`.
    pub fn set_mod(&mut self, a: &Bignum, m: &Bignum) -> Result<()> {
        ensure_internal!(!m.neg && !m.is_zero());
        let mut num = DoubleTmp::new();
        num.d[..a.top].copy_from_slice(&a.d[..a.top]);
        div_core(&mut num.d, a.top, &m.d[..m.top], None)?;
        self.set_zero();
        self.d[..m.top].copy_from_slice(&num.d[..m.top]);
        self.top = word_len(&self.d[..m.top]);
        if a.neg && !self.is_zero() {
            // a was negative: fold the magnitude remainder back into range
            let mut t = m.clone();
            t.usub_assign(&self.clone())?;
            self.copy_from(&t);
        }
        Ok(())
    }

    /// Remainder of division by a single word.
    pub fn mod_word(&self, w: Word) -> Result<Word> {
        ensure_internal!(w != 0);
        let mut rem: u64 = 0;
        for i in (0..self.top).rev() {
            rem = ((rem << WORD_BITS) | self.d[i] as u64) % w as u64;
        }
        Ok(rem as Word)
    }

    /// `self = (a + b) mod m`; `a` and `b` must already be in `[0, m)`.
    pub fn set_mod_add(&mut self, a: &Bignum, b: &Bignum, m: &Bignum) -> Result<()> {
        self.set_add(a, b)?;
        if self.ucmp(m) != Ordering::Less {
            self.usub_assign(m)?;
        }
        Ok(())
    }

    /// `self = (a * b) mod m` through a double-width product.
    pub fn set_mod_mul(&mut self, a: &Bignum, b: &Bignum, m: &Bignum) -> Result<()> {
        ensure_internal!(!m.neg && !m.is_zero());
        let mut tmp = DoubleTmp::new();
        mul_into(&mut tmp, a, b);
        let len = tmp.len();
        div_core(&mut tmp.d, len, &m.d[..m.top], None)?;
        self.set_zero();
        self.d[..m.top].copy_from_slice(&tmp.d[..m.top]);
        self.top = word_len(&self.d[..m.top]);
        if (a.neg != b.neg) && !self.is_zero() {
            let mut t = m.clone();
            t.usub_assign(&self.clone())?;
            self.copy_from(&t);
        }
        Ok(())
    }

    /// `self = a^-1 mod m` for odd `m`, binary extended-Euclid.  Fails
    /// with [`ErrorKind::BadData`] when no inverse exists.
    pub fn set_mod_inverse(&mut self, a: &Bignum, m: &Bignum) -> Result<()> {
        ensure_internal!(m.is_odd() && !m.is_one());
        let mut u = Bignum::default();
        u.set_mod(a, m)?;
        if u.is_zero() {
            return Err(ErrorKind::BadData.into());
        }
        let mut v = m.clone();
        let mut x1 = Bignum::from_word(1);
        let mut x2 = Bignum::default();
        while !u.is_one() && !v.is_one() {
            while !u.is_odd() {
                if u.is_zero() {
                    return Err(ErrorKind::BadData.into());
                }
                u.shr_assign(1);
                if x1.is_odd() {
                    x1.uadd_assign(m)?;
                }
                x1.shr_assign(1);
            }
            while !v.is_odd() {
                if v.is_zero() {
                    return Err(ErrorKind::BadData.into());
                }
                v.shr_assign(1);
                if x2.is_odd() {
                    x2.uadd_assign(m)?;
                }
                x2.shr_assign(1);
            }
            if u.ucmp(&v) != Ordering::Less {
                u.usub_assign(&v)?;
                mod_sub_in_place(&mut x1, &x2, m)?;
            } else {
                v.usub_assign(&u)?;
                mod_sub_in_place(&mut x2, &x1, m)?;
            }
        }
        if u.is_one() {
            self.set_mod(&x1, m)
        } else {
            self.set_mod(&x2, m)
        }
    }

    /// Greatest common divisor of two non-negative values.
    pub fn set_gcd(&mut self, a: &Bignum, b: &Bignum) -> Result<()> {
        ensure_internal!(!a.neg && !b.neg);
        if a.is_zero() {
            self.copy_from(b);
            return Ok(());
        }
        if b.is_zero() {
            self.copy_from(a);
            return Ok(());
        }
        let mut u = a.clone();
        let mut v = b.clone();
        let mut shift = 0;
        while !u.is_odd() && !v.is_odd() {
            u.shr_assign(1);
            v.shr_assign(1);
            shift += 1;
        }
        while !u.is_odd() {
            u.shr_assign(1);
        }
        loop {
            while !v.is_odd() {
                v.shr_assign(1);
            }
            if u.ucmp(&v) == Ordering::Greater {
                std::mem::swap(&mut u, &mut v);
            }
            v.usub_assign(&u)?;
            if v.is_zero() {
                break;
            }
        }
        self.copy_from(&u);
        self.shl_assign(shift)
    }

    // --- integrity ---

    /// Folds this value into a running checksum: an additive two-term
    /// cascade over the length and live words, composable across key
    /// components by passing the previous result as `initial`.
    pub fn checksum(&self, initial: u32) -> u32 {
        let mut sum1: u32 = self.top as u32 ^ (self.neg as u32) << 16;
        let mut sum2: u32 = initial;
        for i in 0..self.top {
            sum1 = sum1.wrapping_add(self.d[i]);
            sum2 = sum2.wrapping_add(sum1);
        }
        sum2.wrapping_add(sum1)
    }

    // Flips bits in one stored word.  Fault-injection hook for the
    // checksum self-tests.
    pub(crate) fn corrupt_word(&mut self, i: usize, mask: Word) {
        self.d[i] ^= mask;
    }
}

// Length of a word slice ignoring high zeroes.
fn word_len(d: &[Word]) -> usize {
    let mut n = d.len();
    while n > 0 && d[n - 1] == 0 {
        n -= 1;
    }
    n
}

fn word_cmp(a: &[Word], b: &[Word]) -> Ordering {
    let (la, lb) = (word_len(a), word_len(b));
    if la != lb {
        return la.cmp(&lb);
    }
    for i in (0..la).rev() {
        if a[i] != b[i] {
            return a[i].cmp(&b[i]);
        }
    }
    Ordering::Equal
}

// x1 = (x1 - x2) mod m, all values in [0, m).
fn mod_sub_in_place(x1: &mut Bignum, x2: &Bignum, m: &Bignum) -> Result<()> {
    if x1.ucmp(x2) == Ordering::Less {
        x1.uadd_assign(m)?;
    }
    x1.usub_assign(x2)
}

// Schoolbook product of two magnitudes into the double-width scratch.
fn mul_into(tmp: &mut DoubleTmp, a: &Bignum, b: &Bignum) {
    tmp.d.zeroize();
    if a.top == 0 || b.top == 0 {
        return;
    }
    for i in 0..a.top {
        let ai = a.d[i] as u64;
        let mut carry: u64 = 0;
        for j in 0..b.top {
            let t = ai * b.d[j] as u64 + tmp.d[i + j] as u64 + carry;
            tmp.d[i + j] = t as Word;
            carry = t >> WORD_BITS;
        }
        tmp.d[i + b.top] = carry as Word;
    }
}

// Knuth algorithm D on raw word arrays.  On return the low `den` words
// of `num` hold the remainder, the rest is cleared; the quotient, when
// requested, lands in `quot` (which must hold at least
// `nlen - den.len() + 1` words).
fn div_core(
    num: &mut [Word],
    nlen: usize,
    den: &[Word],
    mut quot: Option<&mut [Word; BN_WORDS]>,
) -> Result<()> {
    let n = word_len(den);
    ensure_internal!(n > 0 && nlen <= num.len());
    let mut m = word_len(&num[..nlen]);
    if let Some(q) = quot.as_deref_mut() {
        q.zeroize();
    }

    // Single-word divisor: simple short division.
    if n == 1 {
        let d = den[0] as u64;
        let mut rem: u64 = 0;
        for i in (0..m).rev() {
            let cur = (rem << WORD_BITS) | num[i] as u64;
            let qw = cur / d;
            rem = cur % d;
            if let Some(q) = quot.as_deref_mut() {
                if qw != 0 {
                    ensure_internal!(i < BN_WORDS);
                    q[i] = qw as Word;
                }
            }
            num[i] = 0;
        }
        num[0] = rem as Word;
        return Ok(());
    }

    if word_cmp(&num[..m], den) == Ordering::Less {
        // Quotient zero, remainder already in place.
        return Ok(());
    }

    // Normalise so the divisor's high bit is set.
    let shift = den[n - 1].leading_zeros() as usize;
    let mut v = [0 as Word; BN_WORDS];
    for i in (0..n).rev() {
        let hi = den[i];
        let lo = if i > 0 { den[i - 1] } else { 0 };
        v[i] = if shift == 0 {
            hi
        } else {
            (hi << shift) | (lo >> (WORD_BITS - shift))
        };
    }
    if shift > 0 {
        ensure_internal!(m + 1 <= num.len());
        let mut prev: Word = 0;
        for i in 0..=m {
            let cur = if i < m { num[i] } else { 0 };
            num[i] = (cur << shift) | (prev >> (WORD_BITS - shift));
            prev = cur;
        }
        m = word_len(&num[..m + 1]);
    }
    ensure_internal!(m < num.len());
    // One extra high word for the trial subtraction.
    num[m] = 0;

    for j in (0..=m - n).rev() {
        // Estimate the quotient word from the top three dividend words
        // and top two divisor words, then refine.
        let u2 = num[j + n] as u64;
        let u1 = num[j + n - 1] as u64;
        let u0 = if j + n >= 2 { num[j + n - 2] as u64 } else { 0 };
        let vn1 = v[n - 1] as u64;
        let vn2 = v[n - 2] as u64;
        let top = (u2 << WORD_BITS) | u1;
        let mut qhat = if u2 >= vn1 { (1u64 << WORD_BITS) - 1 } else { top / vn1 };
        let mut rhat = top.wrapping_sub(qhat.wrapping_mul(vn1));
        while rhat >> WORD_BITS == 0 && qhat * vn2 > (rhat << WORD_BITS | u0) {
            qhat -= 1;
            rhat += vn1;
        }

        // num[j..j+n+1] -= qhat * v
        let mut k: u64 = 0;
        for i in 0..n {
            let p = qhat * v[i] as u64 + k;
            k = p >> WORD_BITS;
            let pl = p & ((1u64 << WORD_BITS) - 1);
            let ui = num[j + i] as u64;
            if ui < pl {
                num[j + i] = (ui + (1u64 << WORD_BITS) - pl) as Word;
                k += 1;
            } else {
                num[j + i] = (ui - pl) as Word;
            }
        }
        let ui = num[j + n] as u64;
        let borrow = ui < k;
        num[j + n] = ui.wrapping_sub(k) as Word;

        let mut qw = qhat;
        if borrow {
            // Went one too far; add the divisor back.
            qw -= 1;
            let mut carry: u64 = 0;
            for i in 0..n {
                let s = num[j + i] as u64 + v[i] as u64 + carry;
                num[j + i] = s as Word;
                carry = s >> WORD_BITS;
            }
            num[j + n] = (num[j + n] as u64).wrapping_add(carry) as Word;
        }
        if let Some(q) = quot.as_deref_mut() {
            if qw != 0 {
                ensure_internal!(j < BN_WORDS);
                q[j] = qw as Word;
            }
        }
    }

    // Denormalise the remainder and clear the quotient area.
    if shift > 0 {
        for i in 0..n {
            let lo = num[i];
            let hi = if i + 1 < num.len() { num[i + 1] } else { 0 };
            num[i] = (lo >> shift)
                | hi.checked_shl((WORD_BITS - shift) as u32).unwrap_or(0);
        }
    }
    for w in num.iter_mut().skip(n) {
        *w = 0;
    }
    Ok(())
}
