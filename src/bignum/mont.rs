//! Montgomery reduction caches and modular exponentiation.
//!
//! Each key object caches one [`MontCtx`] per modulus it exponentiates
//! under.  The cache is derived once when the key is loaded and lives
//! until the key changes; operations only ever read it.

use subtle::{Choice, ConditionallySelectable};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{word_len, Bignum, Word, BN_WORDS, WORD_BITS};
use crate::error::Result;

/// Cached Montgomery parameters for one odd modulus: the modulus, the
/// word inverse `-n^-1 mod 2^32`, and `R^2 mod n`.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct MontCtx {
    ready: bool,
    n0: Word,
    n: Bignum,
    rr: Bignum,
}

impl MontCtx {
    /// Derives the cache for `modulus`, which must be odd and greater
    /// than one.
    pub fn set(&mut self, modulus: &Bignum) -> Result<()> {
        ensure_internal!(modulus.is_odd() && !modulus.is_one() && !modulus.is_negative());
        self.reset();
        self.n.copy_from(modulus);

        // Word inverse by Newton iteration, five rounds for 32 bits.
        let mut inv: Word = 1;
        for _ in 0..5 {
            inv = inv.wrapping_mul(2u32.wrapping_sub(modulus.word(0).wrapping_mul(inv)));
        }
        self.n0 = inv.wrapping_neg();

        // R^2 mod n, computed as (R mod n)^2 mod n.
        let mut r = Bignum::default();
        r.set_bit(self.n.top * WORD_BITS)?;
        let mut r_mod = Bignum::default();
        r_mod.set_mod(&r, modulus)?;
        self.rr.set_mod_mul(&r_mod, &r_mod, modulus)?;
        self.ready = true;
        Ok(())
    }

    /// True once [`set`](Self::set) has run.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Wipes the cache.
    pub fn reset(&mut self) {
        self.n.set_zero();
        self.rr.set_zero();
        self.n0 = 0;
        self.ready = false;
    }

    /// The cached modulus.
    pub fn modulus(&self) -> &Bignum {
        &self.n
    }

    /// Folds the whole cache into a running integrity checksum.
    pub fn checksum(&self, initial: u32) -> u32 {
        let sum = self.n.checksum(initial.wrapping_add(self.n0));
        self.rr.checksum(sum)
    }

    /// `r = a * b * R^-1 mod n` (CIOS).  Both inputs must already be
    /// reduced mod n.
    pub fn mont_mul(&self, r: &mut Bignum, a: &Bignum, b: &Bignum) -> Result<()> {
        let nw = self.n.top;
        ensure_internal!(self.ready && a.top <= nw && b.top <= nw);
        let mut t = [0 as Word; BN_WORDS + 2];
        for i in 0..nw {
            let ai = a.word(i) as u64;
            let mut carry: u64 = 0;
            for j in 0..nw {
                let s = t[j] as u64 + ai * b.word(j) as u64 + carry;
                t[j] = s as Word;
                carry = s >> WORD_BITS;
            }
            let s = t[nw] as u64 + carry;
            t[nw] = s as Word;
            t[nw + 1] = t[nw + 1].wrapping_add((s >> WORD_BITS) as Word);

            let m = t[0].wrapping_mul(self.n0) as u64;
            let s = t[0] as u64 + m * self.n.d[0] as u64;
            let mut carry = s >> WORD_BITS;
            for j in 1..nw {
                let s = t[j] as u64 + m * self.n.d[j] as u64 + carry;
                t[j - 1] = s as Word;
                carry = s >> WORD_BITS;
            }
            let s = t[nw] as u64 + carry;
            t[nw - 1] = s as Word;
            let s2 = t[nw + 1] as u64 + (s >> WORD_BITS);
            t[nw] = s2 as Word;
            t[nw + 1] = (s2 >> WORD_BITS) as Word;
        }

        // Reduce into [0, n).
        let needs_sub = t[nw] != 0
            || super::word_cmp(&t[..nw], &self.n.d[..nw]) != std::cmp::Ordering::Less;
        if needs_sub {
            let mut borrow: u64 = 0;
            for i in 0..nw {
                let v = (t[i] as u64)
                    .wrapping_sub(self.n.d[i] as u64)
                    .wrapping_sub(borrow);
                t[i] = v as Word;
                borrow = (v >> 63) & 1;
            }
            t[nw] = (t[nw] as u64).wrapping_sub(borrow) as Word;
        }
        r.set_zero();
        r.d[..nw].copy_from_slice(&t[..nw]);
        r.top = word_len(&r.d[..nw]);
        t.zeroize();
        Ok(())
    }

    /// Converts into Montgomery form.
    pub fn to_mont(&self, r: &mut Bignum, a: &Bignum) -> Result<()> {
        self.mont_mul(r, a, &self.rr)
    }

    /// Converts out of Montgomery form.
    pub fn from_mont(&self, r: &mut Bignum, a: &Bignum) -> Result<()> {
        self.mont_mul(r, a, &Bignum::from_word(1))
    }

    /// `r = base^exp mod n`.
    ///
    /// With `consttime` set, the exponent is walked with a
    /// square-and-always-multiply ladder and a constant-time select, so
    /// the schedule of multiplications doesn't depend on exponent bits.
    /// Private exponents always take this path.
    pub fn mod_exp(&self, r: &mut Bignum, base: &Bignum, exp: &Bignum, consttime: bool) -> Result<()> {
        ensure_internal!(self.ready && !exp.is_negative());
        let bits = exp.bit_count();
        if bits == 0 {
            r.set_word(1);
            return Ok(());
        }
        let mut reduced = Bignum::default();
        reduced.set_mod(base, &self.n)?;
        let mut am = Bignum::default();
        self.to_mont(&mut am, &reduced)?;
        let mut acc = Bignum::default();
        self.to_mont(&mut acc, &Bignum::from_word(1))?;
        let mut sq = Bignum::default();
        let mut mu = Bignum::default();
        for i in (0..bits).rev() {
            self.mont_mul(&mut sq, &acc, &acc)?;
            acc.copy_from(&sq);
            let bit = exp.bit(i);
            if consttime {
                self.mont_mul(&mut mu, &acc, &am)?;
                conditional_copy(&mut acc, &mu, bit);
            } else if bit {
                self.mont_mul(&mut mu, &acc, &am)?;
                acc.copy_from(&mu);
            }
        }
        self.from_mont(r, &acc)
    }
}

// Constant-time overwrite of dst with src when `cond` holds.
fn conditional_copy(dst: &mut Bignum, src: &Bignum, cond: bool) {
    let choice = Choice::from(cond as u8);
    for i in 0..BN_WORDS {
        dst.d[i] = Word::conditional_select(&dst.d[i], &src.d[i], choice);
    }
    let top = u64::conditional_select(&(dst.top as u64), &(src.top as u64), choice);
    dst.top = top as usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bn(hex_str: &str) -> Bignum {
        let mut s = String::from(hex_str);
        if s.len() % 2 == 1 {
            s.insert(0, '0');
        }
        Bignum::from_bytes(&hex::decode(s).unwrap()).unwrap()
    }

    #[test]
    fn test_mont_roundtrip() {
        let n = bn("f123456789abcdef123456789abcdef1");
        let mut mont = MontCtx::default();
        mont.set(&n).unwrap();
        let a = bn("0123456789abcdef");
        let mut am = Bignum::default();
        mont.to_mont(&mut am, &a).unwrap();
        let mut back = Bignum::default();
        mont.from_mont(&mut back, &am).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn test_small_exponentiation() {
        let n = bn("0101"); // 257
        let mut mont = MontCtx::default();
        mont.set(&n).unwrap();
        let mut r = Bignum::default();
        mont.mod_exp(&mut r, &Bignum::from_word(3), &Bignum::from_word(5), false)
            .unwrap();
        assert_eq!(r.word(0), 243);
        mont.mod_exp(&mut r, &Bignum::from_word(3), &Bignum::default(), false)
            .unwrap();
        assert!(r.is_one());
    }

    #[test]
    fn test_exp_matches_naive() {
        let n = bn("c5a1f9d2b37e64810fedcba987654321fedcba987654321fedcba98765432103");
        let mut mont = MontCtx::default();
        mont.set(&n).unwrap();
        let base = bn("1234567890abcdef1234567890abcdef");
        let exp = bn("1f3a5c7e9b");
        let mut fast = Bignum::default();
        mont.mod_exp(&mut fast, &base, &exp, false).unwrap();

        // Plain square-and-multiply through set_mod_mul.
        let mut naive = Bignum::from_word(1);
        for i in (0..exp.bit_count()).rev() {
            let t = naive.clone();
            naive.set_mod_mul(&t, &t, &n).unwrap();
            if exp.bit(i) {
                let t = naive.clone();
                naive.set_mod_mul(&t, &base, &n).unwrap();
            }
        }
        assert_eq!(fast, naive);
    }

    #[test]
    fn test_consttime_ladder_matches_plain() {
        let n = bn("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
        let mut mont = MontCtx::default();
        mont.set(&n).unwrap();
        let base = bn("deadbeefcafebabe");
        let exp = bn("0123456789abcdef0123");
        let mut a = Bignum::default();
        let mut b = Bignum::default();
        mont.mod_exp(&mut a, &base, &exp, false).unwrap();
        mont.mod_exp(&mut b, &base, &exp, true).unwrap();
        assert_eq!(a, b);
    }
}
