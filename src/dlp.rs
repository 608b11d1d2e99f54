//! Shared discrete-log machinery for DSA, Elgamal and DH.
//!
//! The three algorithms differ only in how they combine the group
//! elements; the domain parameters, their validation, native key
//! generation and the signing-nonce discipline are identical, so they
//! live here.  Domain generation follows the Lim-Lee shape: a prime
//! subgroup order q, then a search for p = 2jq + 1, then a generator
//! of the order-q subgroup.  Nonces are drawn with 32 surplus bits and
//! folded mod q so the reduction bias vanishes, with the message hash
//! mixed into the candidate so a broken RNG still doesn't repeat a
//! nonce for distinct messages.

use std::cmp::Ordering;

use zeroize::Zeroize;

use crate::bignum::mont::MontCtx;
use crate::bignum::prime::{generate_prime, is_prime, sieve_check};
use crate::bignum::{Bignum, KeySizeCheck};
use crate::capability::NonceSource;
use crate::constants::{
    bits_to_bytes, DLP_OVERFLOW_BITS, MAX_PKCSIZE, MIN_PKCSIZE, MIN_PKCSIZE_THRESHOLD,
};
use crate::context::{ContextInfo, PkcInfo};
use crate::error::{ErrorKind, Result};
use crate::keyload::DlpComponents;

// A reduced nonce this small means the RNG is broken.
const MIN_NONCE_BYTES: usize = 8;

// Search bound for the p = 2jq + 1 walk; at ~1/ln(p) prime density a
// 4096-bit search succeeds with overwhelming probability long before
// this.
const MAX_DOMAIN_CANDIDATES: usize = 100_000;

/// Subgroup order size matched to the modulus size, following the
/// usual 1024/160, 2048/224, larger/256 pairing.
pub(crate) fn subgroup_bits(p_bits: usize) -> usize {
    if p_bits <= 1024 {
        160
    } else if p_bits <= 2048 {
        224
    } else {
        256
    }
}

/// Imports DLP components into the context's parameter slots:
/// p, g, q, y, x in param1..param5.
pub(crate) fn import_dlp_components(pkc: &mut PkcInfo, c: &DlpComponents) -> Result<()> {
    pkc.param1 = Bignum::from_bytes_checked(
        &c.p,
        MIN_PKCSIZE_THRESHOLD,
        MAX_PKCSIZE,
        None,
        KeySizeCheck::Pkc,
    )?;
    pkc.param2 =
        Bignum::from_bytes_checked(&c.g, 1, MAX_PKCSIZE, Some(&pkc.param1), KeySizeCheck::None)?;
    if !c.q.is_empty() {
        pkc.param3 = Bignum::from_bytes_checked(
            &c.q,
            16,
            MAX_PKCSIZE,
            Some(&pkc.param1),
            KeySizeCheck::None,
        )?;
    }
    if !c.y.is_empty() {
        pkc.param4 = Bignum::from_bytes_checked(
            &c.y,
            1,
            MAX_PKCSIZE,
            Some(&pkc.param1),
            KeySizeCheck::None,
        )?;
    }
    if !c.x.is_empty() {
        pkc.param5 = Bignum::from_bytes_checked(
            &c.x,
            1,
            MAX_PKCSIZE,
            Some(&pkc.param1),
            KeySizeCheck::None,
        )?;
    }
    Ok(())
}

/// Validates the loaded domain and key values, derives the public
/// value when only the private one was supplied, and binds the
/// Montgomery cache and checksum.  Called both after a component load
/// and after native generation.
pub(crate) fn init_dlp_key(ctx: &mut ContextInfo) -> Result<()> {
    let algo = ctx.capability.algo;
    let pkc = ctx.pkc_mut()?;
    let private;
    {
        let PkcInfo {
            param1: p,
            param2: g,
            param3: q,
            param4: y,
            param5: x,
            mont1,
            tmp1,
            tmp2,
            key_size_bits,
            ..
        } = &mut *pkc;

        if !p.is_odd() || !sieve_check(p)? {
            return Err(ErrorKind::BadData.into());
        }
        // g must lie in [2, p - 2].
        tmp1.copy_from(p);
        tmp1.sub_word_assign(1)?;
        if g.cmp_word(2) == Ordering::Less || g.ucmp(tmp1) != Ordering::Less {
            return Err(ErrorKind::BadData.into());
        }
        *key_size_bits = p.bit_count();
        mont1.set(p)?;

        if !q.is_zero() {
            // q defines the subgroup: it must divide p - 1 and g must
            // have order q.
            tmp2.set_mod(tmp1, q)?;
            if !tmp2.is_zero() {
                return Err(ErrorKind::BadData.into());
            }
            mont1.mod_exp(tmp2, g, q, false)?;
            if !tmp2.is_one() {
                return Err(ErrorKind::BadData.into());
            }
        }

        private = !x.is_zero();
        if private {
            if !q.is_zero() && x.ucmp(q) != Ordering::Less {
                return Err(ErrorKind::BadData.into());
            }
            // Derive y = g^x, or verify a supplied y against it.
            mont1.mod_exp(tmp2, g, x, false)?;
            if y.is_zero() {
                y.copy_from(tmp2);
            } else if *y != *tmp2 {
                return Err(ErrorKind::BadData.into());
            }
        } else {
            if y.is_zero() {
                return Err(ErrorKind::BadData.into());
            }
            if y.cmp_word(1) != Ordering::Greater || y.ucmp(p) != Ordering::Less {
                return Err(ErrorKind::BadData.into());
            }
        }
    }
    pkc.update_checksum(algo, private);
    Ok(())
}

// Generates a fresh (p, g, q) domain: prime q, then p = 2jq + 1 until
// p is prime at the requested size, then the smallest h whose
// (p-1)/q power isn't one as g.
fn generate_domain(p_bits: usize) -> Result<(Bignum, Bignum, Bignum)> {
    let q_bits = subgroup_bits(p_bits);
    ensure_internal!(p_bits > q_bits + 64);
    let q = generate_prime(q_bits, None)?;

    let j_bits = p_bits - q_bits - 1;
    let mut j = Bignum::new();
    let mut p = Bignum::new();
    let mut found = false;
    for _ in 0..MAX_DOMAIN_CANDIDATES {
        j.set_random_bits(j_bits)?;
        j.set_bit(j_bits - 1)?;
        p.set_mul(&j, &q)?;
        p.shl_assign(1)?;
        p.add_word_assign(1)?;
        if p.bit_count() != p_bits || !sieve_check(&p)? {
            continue;
        }
        if is_prime(&p)? {
            found = true;
            break;
        }
    }
    if !found {
        return Err(ErrorKind::Internal.into());
    }
    j.set_zero();

    let mut mont = MontCtx::default();
    mont.set(&p)?;
    let mut exp = Bignum::new();
    let mut rem = Bignum::new();
    let mut pm1 = Bignum::new();
    pm1.copy_from(&p);
    pm1.sub_word_assign(1)?;
    Bignum::div_rem(&pm1, &q, &mut exp, &mut rem)?;
    ensure_internal!(rem.is_zero());
    let mut g = Bignum::new();
    for h in 2u32..1000 {
        mont.mod_exp(&mut g, &Bignum::from_word(h), &exp, false)?;
        if !g.is_one() {
            break;
        }
    }
    ensure_internal!(!g.is_one() && !g.is_zero());
    Ok((p, g, q))
}

/// Generates a native DLP key pair, creating the domain first when the
/// context holds none.  The private value lands in param5 and
/// `init_dlp_key` fills in the rest.
pub(crate) fn generate_dlp_key(ctx: &mut ContextInfo) -> Result<()> {
    let default_bits = ctx.capability.key_size * 8;
    let have_domain = !ctx.pkc()?.param1.is_zero();
    if !have_domain {
        let bits = {
            let pkc = ctx.pkc_mut()?;
            if pkc.key_size_bits == 0 {
                default_bits
            } else {
                pkc.key_size_bits
            }
        };
        if bits < MIN_PKCSIZE * 8 || bits > MAX_PKCSIZE * 8 {
            return Err(ErrorKind::Argument.into());
        }
        let (p, g, q) = generate_domain(bits)?;
        let pkc = ctx.pkc_mut()?;
        pkc.param1 = p;
        pkc.param2 = g;
        pkc.param3 = q;
    }

    {
        let pkc = ctx.pkc_mut()?;
        let PkcInfo {
            param1: p,
            param3: q,
            param4: y,
            param5: x,
            ..
        } = &mut *pkc;
        if q.is_zero() {
            // No subgroup order (Elgamal-style domain): draw x just
            // under the modulus size.
            x.set_random_bits(p.bit_count() - 1)?;
            if x.cmp_word(2) == Ordering::Less {
                x.set_word(2);
            }
        } else {
            loop {
                x.set_random_bits(q.bit_count())?;
                if x.cmp_word(2) != Ordering::Less && x.ucmp(q) == Ordering::Less {
                    break;
                }
            }
        }
        // y is derived inside init_dlp_key.
        y.set_zero();
    }
    init_dlp_key(ctx)
}

/// Converts a hash value to an integer of at most q's bit length by
/// shifting out the surplus low bits, as FIPS 186 prescribes.
pub(crate) fn hash_to_bignum(r: &mut Bignum, hash: &[u8], q: &Bignum) -> Result<()> {
    let h_bits = hash.len() * 8;
    let q_bits = q.bit_count();
    let imported = Bignum::from_bytes(hash)?;
    r.copy_from(&imported);
    if h_bits > q_bits {
        r.shr_assign(h_bits - q_bits);
    }
    Ok(())
}

/// Draws a signing nonce k in [1, q).  The random candidate carries
/// 32 bits beyond q's length so the mod-q fold is uniform, and the
/// message hash is XORed into it before the fold.  A test source
/// bypasses the draw and must already be a canonical value below q.
pub(crate) fn generate_nonce(
    k: &mut Bignum,
    q: &Bignum,
    hash: &[u8],
    source: &NonceSource<'_>,
) -> Result<()> {
    match source {
        NonceSource::Test(bytes) => {
            let imported = Bignum::from_bytes(bytes)?;
            if imported.is_zero() || imported.ucmp(q) != Ordering::Less {
                return Err(ErrorKind::BadData.into());
            }
            k.copy_from(&imported);
            Ok(())
        }
        NonceSource::Random => {
            let len = bits_to_bytes(q.bit_count() + DLP_OVERFLOW_BITS);
            ensure_internal!(len <= MAX_PKCSIZE + 8);
            let mut buf = [0u8; MAX_PKCSIZE + 8];
            loop {
                crate::rng::copy_randombytes(&mut buf[..len]);
                for (b, h) in buf[..len].iter_mut().zip(hash.iter()) {
                    *b ^= h;
                }
                let candidate = Bignum::from_bytes(&buf[..len])?;
                k.set_mod(&candidate, q)?;
                // A tiny k after the fold can only mean broken entropy.
                if k.byte_count() > MIN_NONCE_BYTES {
                    break;
                }
            }
            buf.zeroize();
            Ok(())
        }
    }
}

// 1024-bit FIPS 186-style test key shared by the DLP self-tests; the
// 512-bit FIPS sample key itself is below the loadable minimum.
pub(crate) mod test_key {
    pub const P: &str =
        "044CDD5DB6ED23AEB2A759E6F83DA62785F2FEE2E8F3DAA37BD648D444CA6E10\
         976C1D6C39A70C888E1FDDF75969DA36DDB83E1AD2913E30B1B5C2BCA9A3A5DE\
         C7CF512C1B89D071E371BB508626329FF54A9CB1787B471F19C72622156271AB\
         D725A5E46871935D1F2901059C573A09B0B8E4D23790362FBF1E74B46BE46607";
    pub const Q: &str = "FDD9C85F7362C979EFD5090702E7F2909713261D";
    pub const G: &str =
        "024EDD0D7F4DB1420150E79A65738B31246BC674A7682611063C96A9A6231279\
         C4EE2188DDE3F037CE3E5453570330E4D3AB394E39DCA28882F6E8BAACF57D2F\
         239A0994B289A2C97CBE4D480E5951B87D998879A8130E12569D4B2EE0E13778\
         6FCC4D97A9020ED24383EC4FC270EF16DEBFBAD16C8A36EE4241E9E766AE463B";
    pub const X: &str = "D94129F740320971B8E2B8CB74460BD4F2AB54A1";
    pub const Y: &str =
        "017E165B65510ADA821AD9F41E666D7D23A6282FE6C2038E8CABC20887C9E851\
         0A371ED4417FA2C54826B7F6C26FB2F8F94343F9DAABA25927BAC91C8CABC490\
         27E110396FD2CD7CD10BFA28D27A7B528AA05A0F10F7BAFD330C3CCEE5F2F692\
         ED04BFD3F83D39CCAACC0BB26BD8B28A5CCEDAF9E1A72350DCCEA4D5A54F080F";
    /// SHA-1 of "abc".
    pub const SHA_M: &str = "A9993E364706816ABA3E25717850C26C9CD0D89D";
    /// Fixed nonce for the known-answer signature.
    pub const K_VAL: &str = "358DAD571462710F50E254CF1A376B2BDEAADFBF";
}

pub(crate) fn test_key_bytes(s: &str) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; s.len() / 2];
    let n = crate::hash::hex_decode(s, &mut buf)?;
    buf.truncate(n);
    Ok(buf)
}

/// Loads the shared 1024-bit test key into a DLP context, with or
/// without the private value.
pub(crate) fn load_test_key(ctx: &mut ContextInfo, private: bool) -> Result<()> {
    let mut c = DlpComponents::domain(
        test_key_bytes(test_key::P)?,
        test_key_bytes(test_key::G)?,
        test_key_bytes(test_key::Q)?,
    );
    c.y = test_key_bytes(test_key::Y)?;
    if private {
        c.x = test_key_bytes(test_key::X)?;
    }
    ctx.load_key_components(&crate::keyload::PkcComponents::Dlp(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Algorithm;
    use crate::hash::hex_decode;

    fn hex(s: &str) -> Vec<u8> {
        let mut buf = vec![0u8; s.len() / 2];
        let n = hex_decode(s, &mut buf).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn test_subgroup_sizing() {
        assert_eq!(subgroup_bits(1024), 160);
        assert_eq!(subgroup_bits(2048), 224);
        assert_eq!(subgroup_bits(3072), 256);
    }

    #[test]
    fn test_hash_truncation() {
        // A 32-byte hash against a 160-bit q keeps only the top 160
        // bits.
        let q = Bignum::from_bytes(&hex("FDD9C85F7362C979EFD5090702E7F2909713261D")).unwrap();
        let hash = [0xffu8; 32];
        let mut r = Bignum::new();
        hash_to_bignum(&mut r, &hash, &q).unwrap();
        assert_eq!(r.bit_count(), 160);
    }

    #[test]
    fn test_nonce_rejects_out_of_range_test_value() {
        let q = Bignum::from_word(0x10001);
        let mut k = Bignum::new();
        assert!(generate_nonce(&mut k, &q, &[], &NonceSource::Test(&[0x01, 0x00, 0x01])).is_err());
        assert!(generate_nonce(&mut k, &q, &[], &NonceSource::Test(&[])).is_err());
    }

    #[test]
    fn test_random_nonce_below_q() {
        let q = Bignum::from_bytes(&hex("FDD9C85F7362C979EFD5090702E7F2909713261D")).unwrap();
        let mut k = Bignum::new();
        generate_nonce(&mut k, &q, &[0xab; 20], &NonceSource::Random).unwrap();
        assert!(k.ucmp(&q) == Ordering::Less);
        assert!(k.byte_count() > MIN_NONCE_BYTES);
    }

    #[test]
    fn test_domain_generation_small() {
        // Smallest permitted modulus keeps the test fast.
        let (p, g, q) = generate_domain(1024).unwrap();
        assert_eq!(p.bit_count(), 1024);
        assert_eq!(q.bit_count(), 160);
        // g^q == 1 mod p.
        let mut mont = MontCtx::default();
        mont.set(&p).unwrap();
        let mut t = Bignum::new();
        mont.mod_exp(&mut t, &g, &q, false).unwrap();
        assert!(t.is_one());
    }

    #[test]
    fn test_generated_key_verifies_checksum() {
        let mut ctx = ContextInfo::new(Algorithm::Dsa).unwrap();
        ctx.generate_key().unwrap();
        let pkc = ctx.pkc().unwrap();
        pkc.verify_checksum(Algorithm::Dsa, true).unwrap();
    }
}
