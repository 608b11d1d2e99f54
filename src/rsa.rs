//! RSA with the full side-channel defence path.
//!
//! The public operation is a straight modular exponentiation.  The
//! private operation runs blinded CRT: the ciphertext is multiplied by
//! a cached r^e factor, the CRT result is unblinded with r^-1,
//! re-encrypted and compared against the original input to catch
//! glitched computations, and the blinding pair is squared after every
//! use so no factor is ever reused.  Key install validates the
//! component relationships, swaps the primes so p > q, and builds the
//! Montgomery caches the operations run on.

use std::cmp::Ordering;

use crate::bignum::prime::{generate_prime, sieve_check};
use crate::bignum::{Bignum, KeySizeCheck};
use crate::capability::{
    get_default_info, Algorithm, CapabilityInfo, KeyPayload, EMPTY_CAPABILITY,
};
use crate::constants::{
    bits_to_bytes, MAX_LEADING_ZEROES, MAX_PKCSIZE, MIN_PKCSIZE, MIN_PKCSIZE_THRESHOLD,
    RSA_MAX_ESIZE,
};
use crate::context::{ContextFlags, ContextInfo, PkcInfo};
use crate::error::{ErrorKind, Result};
use crate::keyload::{PkcComponents, RsaComponents};

const DEFAULT_KEY_BITS: usize = 2048;
const F4: u32 = 65537;

// Minimum bit distance between the primes; closer pairs fall to
// Fermat factorisation.
const MIN_PRIME_DISTANCE_BITS: usize = 128;

// Inverse of odd `a` modulo even `m`, where the binary inverse does
// not apply.  From a*x = 1 + m*y: reducing mod a gives
// y = -(m^-1) mod a, and x follows by exact division.
fn inverse_odd_mod_even(r: &mut Bignum, a: &Bignum, m: &Bignum) -> Result<()> {
    ensure_internal!(a.is_odd() && !m.is_odd());
    let mut t1 = Bignum::new();
    let mut t2 = Bignum::new();
    let mut rem = Bignum::new();
    t1.set_mod(m, a)?;
    t2.set_mod_inverse(&t1, a)?;
    t1.set_sub(a, &t2)?; // y
    t2.set_mul(m, &t1)?;
    t2.add_word_assign(1)?;
    Bignum::div_rem(&t2, a, r, &mut rem)?;
    ensure_internal!(rem.is_zero());
    Ok(())
}

fn import_rsa_components(pkc: &mut PkcInfo, c: &RsaComponents) -> Result<()> {
    pkc.param1 = Bignum::from_bytes_checked(
        &c.n,
        MIN_PKCSIZE_THRESHOLD,
        MAX_PKCSIZE,
        None,
        KeySizeCheck::Pkc,
    )?;
    pkc.param2 =
        Bignum::from_bytes_checked(&c.e, 1, RSA_MAX_ESIZE, Some(&pkc.param1), KeySizeCheck::None)?;
    if c.has_private() {
        if !c.d.is_empty() {
            pkc.param3 = Bignum::from_bytes_checked(
                &c.d,
                1,
                MAX_PKCSIZE,
                Some(&pkc.param1),
                KeySizeCheck::None,
            )?;
        }
        pkc.param4 =
            Bignum::from_bytes_checked(&c.p, 1, MAX_PKCSIZE, Some(&pkc.param1), KeySizeCheck::None)?;
        pkc.param5 =
            Bignum::from_bytes_checked(&c.q, 1, MAX_PKCSIZE, Some(&pkc.param1), KeySizeCheck::None)?;
        if !c.u.is_empty() {
            pkc.param6 = Bignum::from_bytes_checked(
                &c.u,
                1,
                MAX_PKCSIZE,
                Some(&pkc.param4),
                KeySizeCheck::None,
            )?;
        }
        if !c.e1.is_empty() {
            pkc.param7 = Bignum::from_bytes_checked(
                &c.e1,
                1,
                MAX_PKCSIZE,
                Some(&pkc.param4),
                KeySizeCheck::None,
            )?;
            pkc.param8 = Bignum::from_bytes_checked(
                &c.e2,
                1,
                MAX_PKCSIZE,
                Some(&pkc.param5),
                KeySizeCheck::None,
            )?;
        }
    }
    Ok(())
}

// Validates the loaded components, fills in derivable CRT pieces,
// enforces p > q and spins up the Montgomery caches, the blinding
// pair and the key checksum.
fn init_check_rsa_key(ctx: &mut ContextInfo) -> Result<()> {
    let pkc = ctx.pkc_mut()?;
    let private = !pkc.param4.is_zero();
    let PkcInfo {
        param1: n,
        param2: e,
        param3: d,
        param4: p,
        param5: q,
        param6: u,
        param7: e1,
        param8: e2,
        blind1,
        blind2,
        mont1,
        mont2,
        mont3,
        tmp1,
        tmp2,
        tmp3,
        arena,
        key_size_bits,
        ..
    } = &mut *pkc;

    // Public screen: e must be a small odd prime (or one of the
    // standard Fermat values, which the sieve admits), n must survive
    // the small-prime sieve.
    if e.bit_count() > RSA_MAX_ESIZE * 8 - 1 || e.cmp_word(3) == Ordering::Less {
        return Err(ErrorKind::BadData.into());
    }
    if !sieve_check(e)? || !sieve_check(n)? {
        return Err(ErrorKind::BadData.into());
    }

    if private {
        if !sieve_check(p)? || !sieve_check(q)? {
            return Err(ErrorKind::BadData.into());
        }
        // Primes too close together make n factorable.
        tmp1.set_sub(p, q)?;
        if tmp1.bit_count() <= MIN_PRIME_DISTANCE_BITS {
            return Err(ErrorKind::BadData.into());
        }
        tmp1.set_mul(p, q)?;
        if *tmp1 != *n {
            return Err(ErrorKind::BadData.into());
        }
        // Derive the CRT exponents from d when they weren't supplied.
        if e1.is_zero() {
            if d.is_zero() {
                return Err(ErrorKind::BadData.into());
            }
            tmp1.copy_from(p);
            tmp1.sub_word_assign(1)?;
            e1.set_mod(d, &tmp1)?;
            tmp1.copy_from(q);
            tmp1.sub_word_assign(1)?;
            e2.set_mod(d, &tmp1)?;
        }
        // The CRT runs with p as the larger prime.
        if p.ucmp(q) == Ordering::Less {
            std::mem::swap(p, q);
            std::mem::swap(e1, e2);
            // A supplied u no longer matches after the swap.
            u.set_zero();
        }
        if u.is_zero() {
            u.set_mod_inverse(q, p)?;
        } else {
            tmp1.set_mod_mul(u, q, p)?;
            if !tmp1.is_one() {
                return Err(ErrorKind::BadData.into());
            }
        }
        // e and the per-prime exponents must be mutual inverses; the
        // same must hold for d when it was supplied.
        tmp1.copy_from(p);
        tmp1.sub_word_assign(1)?;
        tmp2.set_mod_mul(e, e1, &tmp1)?;
        if !tmp2.is_one() {
            return Err(ErrorKind::BadData.into());
        }
        if !d.is_zero() {
            tmp2.set_mod_mul(e, d, &tmp1)?;
            if !tmp2.is_one() {
                return Err(ErrorKind::BadData.into());
            }
        }
        tmp1.copy_from(q);
        tmp1.sub_word_assign(1)?;
        tmp2.set_mod_mul(e, e2, &tmp1)?;
        if !tmp2.is_one() {
            return Err(ErrorKind::BadData.into());
        }
        if !d.is_zero() {
            tmp2.set_mod_mul(e, d, &tmp1)?;
            if !tmp2.is_one() {
                return Err(ErrorKind::BadData.into());
            }
        }
    }

    *key_size_bits = n.bit_count();
    mont1.set(n)?;
    if private {
        mont2.set(p)?;
        mont3.set(q)?;

        // Blinding pair: a random r coprime to n gives r^e (applied
        // before the private op) and r^-1 (applied after).
        let mut frame = arena.frame();
        let [r, t] = frame.get_many::<2>()?;
        loop {
            t.set_random_bits(n.bit_count())?;
            r.set_mod(t, n)?;
            if r.cmp_word(1) != Ordering::Greater {
                continue;
            }
            t.set_gcd(r, n)?;
            if t.is_one() {
                break;
            }
        }
        blind2.set_mod_inverse(r, n)?;
        mont1.mod_exp(blind1, r, e, false)?;
        drop(frame);
    }

    let private_flag = private;
    ctx.pkc_mut()?.update_checksum(Algorithm::Rsa, private_flag);
    Ok(())
}

fn init_key(ctx: &mut ContextInfo, payload: KeyPayload<'_>) -> Result<()> {
    match payload {
        KeyPayload::Components(PkcComponents::Rsa(c)) => {
            import_rsa_components(ctx.pkc_mut()?, c)?;
            init_check_rsa_key(ctx)
        }
        // Components already sit in the context (native generation).
        KeyPayload::Internal => init_check_rsa_key(ctx),
        _ => Err(ErrorKind::Argument.into()),
    }
}

fn generate_key(ctx: &mut ContextInfo) -> Result<()> {
    let bits = {
        let pkc = ctx.pkc_mut()?;
        if pkc.key_size_bits == 0 {
            DEFAULT_KEY_BITS
        } else {
            pkc.key_size_bits
        }
    };
    if bits < MIN_PKCSIZE * 8 || bits > MAX_PKCSIZE * 8 {
        return Err(ErrorKind::Argument.into());
    }

    let e = Bignum::from_word(F4);
    let p_bits = bits / 2;
    let q_bits = bits - p_bits;
    let mut p = generate_prime(p_bits, Some(&e))?;
    let mut q;
    let mut n = Bignum::new();
    let mut diff = Bignum::new();
    loop {
        q = generate_prime(q_bits, Some(&e))?;
        diff.set_sub(&p, &q)?;
        if diff.bit_count() <= MIN_PRIME_DISTANCE_BITS {
            continue;
        }
        n.set_mul(&p, &q)?;
        if n.bit_count() == bits {
            break;
        }
    }
    if p.ucmp(&q) == Ordering::Less {
        std::mem::swap(&mut p, &mut q);
    }

    // d = e^-1 mod (p-1)(q-1), with the per-prime exponents and the
    // CRT coefficient from the same identities.
    let mut pm1 = Bignum::new();
    let mut qm1 = Bignum::new();
    pm1.copy_from(&p);
    pm1.sub_word_assign(1)?;
    qm1.copy_from(&q);
    qm1.sub_word_assign(1)?;
    let mut phi = Bignum::new();
    phi.set_mul(&pm1, &qm1)?;
    let mut d = Bignum::new();
    inverse_odd_mod_even(&mut d, &e, &phi)?;
    let mut e1 = Bignum::new();
    let mut e2 = Bignum::new();
    e1.set_mod(&d, &pm1)?;
    e2.set_mod(&d, &qm1)?;
    let mut u = Bignum::new();
    u.set_mod_inverse(&q, &p)?;

    {
        let pkc = ctx.pkc_mut()?;
        pkc.param1 = n;
        pkc.param2 = e;
        pkc.param3 = d;
        pkc.param4 = p;
        pkc.param5 = q;
        pkc.param6 = u;
        pkc.param7 = e1;
        pkc.param8 = e2;
    }
    init_check_rsa_key(ctx)?;

    // Pairwise consistency check before the key is released.
    let pkc = ctx.pkc_mut()?;
    let PkcInfo {
        param2: e,
        param3: d,
        mont1,
        tmp1,
        tmp2,
        tmp3,
        ..
    } = &mut *pkc;
    tmp1.set_word(0x1234_5678);
    mont1.mod_exp(tmp2, tmp1, e, false)?;
    mont1.mod_exp(tmp3, tmp2, d, true)?;
    if tmp3 != tmp1 {
        return Err(ErrorKind::Failed.into());
    }
    Ok(())
}

// Raw public-key operation: buf holds exactly one key-sized value.
fn rsa_encrypt(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    let pkc = ctx.pkc_mut()?;
    let key_bytes = bits_to_bytes(pkc.key_size_bits);
    if buf.len() != key_bytes {
        return Err(ErrorKind::Argument.into());
    }
    let PkcInfo {
        param2: e,
        mont1,
        tmp1,
        tmp2,
        ..
    } = &mut *pkc;
    *tmp1 = Bignum::from_bytes(buf)?;
    if tmp1.ucmp(mont1.modulus()) != Ordering::Less {
        return Err(ErrorKind::BadData.into());
    }
    mont1.mod_exp(tmp2, tmp1, e, false)?;
    tmp2.to_bytes_padded(buf)
}

// Raw private-key operation: blinded CRT with the verify-by-encrypt
// fault check.
fn rsa_decrypt(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    let side_channel = ctx
        .flags()
        .contains(ContextFlags::SIDECHANNEL_PROTECTION);
    let pkc = ctx.pkc_mut()?;
    let key_bytes = bits_to_bytes(pkc.key_size_bits);
    if buf.len() != key_bytes {
        return Err(ErrorKind::Argument.into());
    }
    let PkcInfo {
        param2: e,
        param4: p,
        param5: q,
        param6: u,
        param7: e1,
        param8: e2,
        blind1,
        blind2,
        mont1,
        mont2,
        mont3,
        tmp1,
        tmp2,
        tmp3,
        arena,
        ..
    } = &mut *pkc;

    *tmp3 = Bignum::from_bytes(buf)?;
    if tmp3.ucmp(mont1.modulus()) != Ordering::Less {
        return Err(ErrorKind::BadData.into());
    }

    let mut frame = arena.frame();
    let [work, m1, m2, h] = frame.get_many::<4>()?;

    if side_channel {
        work.set_mod_mul(tmp3, blind1, mont1.modulus())?;
    } else {
        work.copy_from(tmp3);
    }

    // CRT: m1 = c^e1 mod p, m2 = c^e2 mod q, recombined through u.
    h.set_mod(work, p)?;
    mont2.mod_exp(m1, h, e1, side_channel)?;
    h.set_mod(work, q)?;
    mont3.mod_exp(m2, h, e2, side_channel)?;
    // Compensated subtraction: m2 < q < p, so adding p first keeps the
    // value positive without a data-dependent branch.
    h.set_add(m1, p)?;
    h.sub_assign(m2)?;
    tmp1.set_mod(h, p)?;
    h.set_mod_mul(tmp1, u, p)?;
    tmp1.set_mul(h, q)?;
    tmp2.set_add(tmp1, m2)?;

    if side_channel {
        tmp1.set_mod_mul(tmp2, blind2, mont1.modulus())?;
        // Verify by re-encrypting; a fault in the CRT leaks a factor
        // of n if the bad result escapes.
        mont1.mod_exp(work, tmp1, e, false)?;
        if work != tmp3 {
            return Err(ErrorKind::Failed.into());
        }
        // Square the blinding pair so the factors never repeat.
        work.set_mod_mul(blind1, blind1, mont1.modulus())?;
        blind1.copy_from(work);
        work.set_mod_mul(blind2, blind2, mont1.modulus())?;
        blind2.copy_from(work);
    } else {
        tmp1.copy_from(tmp2);
    }

    // A plaintext with a run of stripped leading zeroes far beyond
    // formatting overhead indicates garbage rather than data.
    if key_bytes - tmp1.byte_count() > MAX_LEADING_ZEROES {
        return Err(ErrorKind::BadData.into());
    }
    tmp1.to_bytes_padded(buf)
}

fn rsa_self_test() -> Result<()> {
    let mut ctx = ContextInfo::with_capability(&RSA_CAPABILITY)?;
    ctx.pkc_mut()?.key_size_bits = 1024;
    ctx.set_sidechannel_protection(true);
    ctx.generate_key()?;

    let key_bytes = bits_to_bytes(ctx.pkc_mut()?.key_size_bits);
    let mut buf = [0u8; MAX_PKCSIZE];
    crate::rng::copy_randombytes(&mut buf[1..key_bytes]);
    buf[0] = 0x01;
    let reference = buf;
    ctx.encrypt(&mut buf[..key_bytes])?;
    if buf[..key_bytes] == reference[..key_bytes] {
        return Err(ErrorKind::Failed.into());
    }
    ctx.decrypt(&mut buf[..key_bytes])?;
    if buf[..key_bytes] != reference[..key_bytes] {
        return Err(ErrorKind::Failed.into());
    }
    Ok(())
}

/// RSA capability.  Raw signatures run through the encrypt/decrypt
/// slots, so the sign slots stay empty.
pub static RSA_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::Rsa,
    name: "RSA",
    block_size: 0,
    min_key_size: MIN_PKCSIZE,
    key_size: 256,
    max_key_size: MAX_PKCSIZE,
    self_test: Some(rsa_self_test),
    get_info: Some(get_default_info),
    init_key: Some(init_key),
    generate_key: Some(generate_key),
    encrypt: Some(rsa_encrypt),
    decrypt: Some(rsa_decrypt),
    ..EMPTY_CAPABILITY
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LifecycleState;

    fn generated_ctx(bits: usize) -> ContextInfo {
        let mut ctx = ContextInfo::new(Algorithm::Rsa).unwrap();
        ctx.pkc_mut().unwrap().key_size_bits = bits;
        ctx.set_sidechannel_protection(true);
        ctx.generate_key().unwrap();
        ctx
    }

    fn random_plaintext(key_bytes: usize) -> [u8; MAX_PKCSIZE] {
        let mut buf = [0u8; MAX_PKCSIZE];
        crate::rng::copy_randombytes(&mut buf[1..key_bytes]);
        buf[0] = 0x01;
        buf
    }

    #[test]
    fn test_generate_and_roundtrip() {
        let mut ctx = generated_ctx(1024);
        assert_eq!(ctx.lifecycle(), LifecycleState::Keyed);
        assert!(ctx.flags().contains(ContextFlags::PRIVATE_KEY));
        let key_bytes = 128;
        let reference = random_plaintext(key_bytes);
        let mut buf = reference;
        ctx.encrypt(&mut buf[..key_bytes]).unwrap();
        ctx.decrypt(&mut buf[..key_bytes]).unwrap();
        assert_eq!(buf[..key_bytes], reference[..key_bytes]);
    }

    #[test]
    fn test_blinding_pair_advances() {
        let mut ctx = generated_ctx(1024);
        let before = ctx.pkc_mut().unwrap().blind1.clone();
        let key_bytes = 128;
        let mut buf = random_plaintext(key_bytes);
        ctx.encrypt(&mut buf[..key_bytes]).unwrap();
        let ciphertext = buf;
        ctx.decrypt(&mut buf[..key_bytes]).unwrap();
        assert_ne!(ctx.pkc_mut().unwrap().blind1, before);

        // The blinding pair mutated between calls, but the result of a
        // repeated private-key operation must not.
        let first = buf;
        buf = ciphertext;
        ctx.decrypt(&mut buf[..key_bytes]).unwrap();
        assert_eq!(buf[..key_bytes], first[..key_bytes]);
    }

    #[test]
    fn test_component_reload_roundtrips() {
        // Export the generated key and reload it through the
        // component path, in the minimal {p, q, d} form.
        let mut src = generated_ctx(1024);
        let export = |bn: &Bignum| {
            let mut out = [0u8; MAX_PKCSIZE];
            let len = bn.to_bytes(&mut out).unwrap();
            out[..len].to_vec()
        };
        let comps = {
            let pkc = src.pkc_mut().unwrap();
            let mut c = RsaComponents::public(export(&pkc.param1), export(&pkc.param2));
            c.d = export(&pkc.param3);
            c.p = export(&pkc.param4);
            c.q = export(&pkc.param5);
            c
        };
        let mut ctx = ContextInfo::new(Algorithm::Rsa).unwrap();
        ctx.set_sidechannel_protection(true);
        ctx.load_key_components(&PkcComponents::Rsa(comps)).unwrap();

        let key_bytes = 128;
        let reference = random_plaintext(key_bytes);
        let mut buf = reference;
        src.encrypt(&mut buf[..key_bytes]).unwrap();
        ctx.decrypt(&mut buf[..key_bytes]).unwrap();
        assert_eq!(buf[..key_bytes], reference[..key_bytes]);
    }

    #[test]
    fn test_corrupted_key_is_refused() {
        let mut ctx = generated_ctx(1024);
        ctx.pkc_mut().unwrap().param4.corrupt_word(0, 0x0011);
        let mut buf = random_plaintext(128);
        assert_eq!(
            ctx.decrypt(&mut buf[..128]).unwrap_err().kind(),
            ErrorKind::Failed
        );
    }

    #[test]
    fn test_garbage_plaintext_rejected() {
        // A decrypt that produces a tiny value means the ciphertext
        // never came from a properly formatted message.
        let mut ctx = generated_ctx(1024);
        let mut buf = [0u8; 128];
        buf[127] = 0x02;
        ctx.encrypt(&mut buf).unwrap();
        assert_eq!(ctx.decrypt(&mut buf).unwrap_err().kind(), ErrorKind::BadData);
    }

    #[test]
    fn test_oversized_input_rejected() {
        let mut ctx = generated_ctx(1024);
        let mut buf = [0xffu8; 128];
        let err = ctx.encrypt(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadData);
    }

    #[test]
    fn test_inverse_odd_mod_even() {
        let a = Bignum::from_word(65537);
        let m = Bignum::from_word(42945061u32 * 2);
        let mut inv = Bignum::new();
        inverse_odd_mod_even(&mut inv, &a, &m).unwrap();
        let mut check = Bignum::new();
        check.set_mod_mul(&a, &inv, &m).unwrap();
        assert!(check.is_one());
    }
}
