//! Prime sieving, testing and generation.

use lazy_static::lazy_static;

use super::mont::MontCtx;
use super::Bignum;
use crate::error::{ErrorKind, Result};

lazy_static! {
    // Odd primes below 1000, built once with a plain sieve.
    static ref SMALL_PRIMES: Vec<u32> = {
        let mut composite = [false; 1000];
        let mut primes = Vec::new();
        for n in 3..1000usize {
            if !composite[n] {
                primes.push(n as u32);
                let mut m = n * n;
                while m < 1000 {
                    composite[m] = true;
                    m += n;
                }
            }
        }
        primes
    };
}

// Upper bound on candidates examined before declaring the search broken.
const MAX_PRIME_CANDIDATES: usize = 100_000;

/// Quick compositeness screen by trial division against the small-prime
/// table.  Returns `true` when the value has no small factor (or is
/// itself one of the table primes), `false` when it's clearly composite.
pub fn sieve_check(value: &Bignum) -> Result<bool> {
    if !value.is_odd() {
        return Ok(value.cmp_word(2) == std::cmp::Ordering::Equal);
    }
    for &p in SMALL_PRIMES.iter() {
        if value.mod_word(p)? == 0 {
            return Ok(value.cmp_word(p) == std::cmp::Ordering::Equal);
        }
    }
    Ok(true)
}

// Rounds of Miller-Rabin by candidate size, following the usual
// error-bound tables for randomly chosen candidates.
fn mr_rounds(bits: usize) -> usize {
    if bits < 256 {
        25
    } else if bits < 512 {
        15
    } else if bits < 1024 {
        8
    } else {
        5
    }
}

/// Miller-Rabin probabilistic primality test with size-appropriate
/// round counts.  The candidate must be odd and greater than two.
pub fn is_prime(candidate: &Bignum) -> Result<bool> {
    if candidate.cmp_word(3) == std::cmp::Ordering::Less {
        return Ok(candidate.cmp_word(2) == std::cmp::Ordering::Equal);
    }
    if !candidate.is_odd() {
        return Ok(false);
    }

    // candidate - 1 = r * 2^s with r odd
    let mut n_minus_1 = candidate.clone();
    n_minus_1.sub_word_assign(1)?;
    let mut r = n_minus_1.clone();
    let mut s = 0usize;
    while !r.is_odd() {
        r.shr_assign(1);
        s += 1;
    }

    let bits = candidate.bit_count();
    let mut mont = MontCtx::default();
    mont.set(candidate)?;

    let mut base = Bignum::default();
    let mut x = Bignum::default();
    let mut x2 = Bignum::default();
    'witness: for _ in 0..mr_rounds(bits) {
        // Uniform-enough base in [2, candidate - 2].
        base.set_random_bits(bits)?;
        base.set_mod(&base.clone(), &n_minus_1)?;
        if base.cmp_word(2) == std::cmp::Ordering::Less {
            base.set_word(2);
        }
        mont.mod_exp(&mut x, &base, &r, false)?;
        if x.is_one() || x == n_minus_1 {
            continue;
        }
        for _ in 0..s - 1 {
            x2.set_mod_mul(&x.clone(), &x.clone(), candidate)?;
            x.copy_from(&x2);
            if x == n_minus_1 {
                continue 'witness;
            }
            if x.is_one() {
                return Ok(false);
            }
        }
        return Ok(false);
    }
    Ok(true)
}

/// Generates a random prime of exactly `bits` bits with the top two bits
/// set, so products of two such primes reach their full size.  When
/// `coprime_to` is given (an RSA public exponent), candidates where
/// `gcd(p - 1, e) != 1` are rejected.
pub fn generate_prime(bits: usize, coprime_to: Option<&Bignum>) -> Result<Bignum> {
    ensure_internal!(bits >= 64 && bits <= super::BN_MAX_BYTES * 8 / 2 + 8);
    let mut candidate = Bignum::default();
    let mut p_minus_1 = Bignum::default();
    let mut g = Bignum::default();
    for _ in 0..MAX_PRIME_CANDIDATES {
        candidate.set_random_bits(bits)?;
        candidate.set_bit(bits - 1)?;
        candidate.set_bit(bits - 2)?;
        candidate.set_bit(0)?;
        if !sieve_check(&candidate)? {
            continue;
        }
        if let Some(e) = coprime_to {
            p_minus_1.copy_from(&candidate);
            p_minus_1.sub_word_assign(1)?;
            g.set_gcd(&p_minus_1, e)?;
            if !g.is_one() {
                continue;
            }
        }
        if is_prime(&candidate)? {
            p_minus_1.set_zero();
            return Ok(candidate);
        }
    }
    Err(ErrorKind::Internal.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sieve_check() {
        assert!(sieve_check(&Bignum::from_word(17)).unwrap());
        assert!(sieve_check(&Bignum::from_word(65537)).unwrap());
        assert!(!sieve_check(&Bignum::from_word(15)).unwrap());
        assert!(!sieve_check(&Bignum::from_word(9 * 1009)).unwrap());
    }

    #[test]
    fn test_known_primes_and_composites() {
        // 2^127 - 1 is prime (Mersenne), 2^128 + 1 isn't.
        let mut m127 = Bignum::default();
        m127.set_bit(127).unwrap();
        m127.sub_word_assign(1).unwrap();
        assert!(is_prime(&m127).unwrap());

        let mut f128 = Bignum::default();
        f128.set_bit(128).unwrap();
        f128.add_word_assign(1).unwrap();
        assert!(!is_prime(&f128).unwrap());

        assert!(is_prime(&Bignum::from_word(65537)).unwrap());
        assert!(!is_prime(&Bignum::from_word(65535)).unwrap());
    }

    #[test]
    fn test_generate_prime() {
        let e = Bignum::from_word(65537);
        let p = generate_prime(256, Some(&e)).unwrap();
        assert_eq!(p.bit_count(), 256);
        assert!(p.bit(255) && p.bit(254));
        assert!(is_prime(&p).unwrap());
    }
}
