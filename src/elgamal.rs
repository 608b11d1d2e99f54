//! Elgamal encryption.
//!
//! A ciphertext is the pair (r, s) = (g^k, y^k * M) mod p, carried as
//! two key-sized halves of one buffer: encryption reads M from the
//! first half and fills both halves in place, decryption reads both
//! halves and leaves M in the first.  The session exponent k is drawn
//! with the same surplus-bit fold as the DSA nonce, reduced mod p - 1
//! and nudged until it is coprime to p - 1 so the exponent
//! distribution stays near-uniform.

use std::cmp::Ordering;

use zeroize::Zeroize;

use crate::bignum::{Bignum, KeySizeCheck};
use crate::capability::{
    get_default_info, Algorithm, CapabilityInfo, KeyPayload, EMPTY_CAPABILITY,
};
use crate::constants::{
    bits_to_bytes, DLP_OVERFLOW_BITS, MAX_LEADING_ZEROES, MAX_PKCSIZE, MIN_PKCSIZE,
};
use crate::context::{ContextFlags, ContextInfo, PkcInfo};
use crate::dlp::{import_dlp_components, init_dlp_key};
use crate::error::{ErrorKind, Result};
use crate::keyload::PkcComponents;

// Tolerance for k values sharing a factor with p - 1; since (p-1)/2 is
// prime for generated domains, two decrements settle it in practice.
const MAX_COPRIME_FIXUPS: usize = 100;

fn init_key(ctx: &mut ContextInfo, payload: KeyPayload<'_>) -> Result<()> {
    match payload {
        KeyPayload::Components(PkcComponents::Dlp(c)) => {
            import_dlp_components(ctx.pkc_mut()?, c)?;
            init_dlp_key(ctx)
        }
        KeyPayload::Internal => init_dlp_key(ctx),
        _ => Err(ErrorKind::Argument.into()),
    }
}

fn generate_key(ctx: &mut ContextInfo) -> Result<()> {
    crate::dlp::generate_dlp_key(ctx)
}

// Draws the session exponent: length + 32 surplus bits with the
// plaintext mixed in, folded mod p - 1, then stepped down until
// coprime to p - 1.
fn generate_session_exponent(
    k: &mut Bignum,
    scratch: &mut Bignum,
    phi_p: &Bignum,
    mixin: &[u8],
) -> Result<()> {
    let len = bits_to_bytes(phi_p.bit_count() + DLP_OVERFLOW_BITS);
    ensure_internal!(len <= MAX_PKCSIZE + 8);
    let mut buf = [0u8; MAX_PKCSIZE + 8];
    loop {
        crate::rng::copy_randombytes(&mut buf[..len]);
        for (b, m) in buf[..len].iter_mut().zip(mixin.iter()) {
            *b ^= m;
        }
        let candidate = Bignum::from_bytes(&buf[..len])?;
        k.set_mod(&candidate, phi_p)?;
        // An exponent this small means the RNG is broken.
        if k.byte_count() > 8 {
            break;
        }
    }
    buf.zeroize();

    let mut fixups = 0;
    loop {
        scratch.set_gcd(k, phi_p)?;
        if scratch.is_one() {
            return Ok(());
        }
        k.sub_word_assign(1)?;
        fixups += 1;
        if k.cmp_word(2) == Ordering::Less || fixups > MAX_COPRIME_FIXUPS {
            return Err(ErrorKind::Failed.into());
        }
    }
}

/// Encrypts in place: M in `buf[..length]`, (r, s) across the whole
/// buffer afterwards.
fn elgamal_encrypt(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    let side_channel = ctx.flags().contains(ContextFlags::SIDECHANNEL_PROTECTION);
    let pkc = ctx.pkc_mut()?;
    let length = bits_to_bytes(pkc.key_size_bits);
    if buf.len() != 2 * length {
        return Err(ErrorKind::Argument.into());
    }
    // Cheap screen before the expensive exponent draw: mostly-zero
    // input cannot be a properly formatted message.
    let lead = buf[..length].iter().take_while(|&&b| b == 0).count();
    if length - lead < MIN_PKCSIZE - 8 {
        return Err(ErrorKind::BadData.into());
    }
    let PkcInfo {
        param1: p,
        param2: g,
        param4: y,
        mont1,
        tmp1,
        tmp2,
        tmp3,
        arena,
        ..
    } = &mut *pkc;

    let mut frame = arena.frame();
    let [k, phi_p, m] = frame.get_many::<3>()?;
    phi_p.copy_from(p);
    phi_p.sub_word_assign(1)?;
    generate_session_exponent(k, tmp1, phi_p, &buf[..length])?;

    let imported = Bignum::from_bytes_checked(
        &buf[..length],
        MIN_PKCSIZE - 8,
        MAX_PKCSIZE,
        Some(p),
        KeySizeCheck::None,
    )?;
    m.copy_from(&imported);

    // s = (y^k * M) mod p, r = g^k mod p
    mont1.mod_exp(tmp2, y, k, side_channel)?;
    tmp3.set_mod_mul(tmp2, m, p)?;
    mont1.mod_exp(tmp2, g, k, side_channel)?;

    tmp2.to_bytes_padded(&mut buf[..length])?;
    tmp3.to_bytes_padded(&mut buf[length..])?;
    Ok(())
}

/// Decrypts in place: (r, s) across the buffer, M left in the first
/// half with the second half zeroed.
fn elgamal_decrypt(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    let side_channel = ctx.flags().contains(ContextFlags::SIDECHANNEL_PROTECTION);
    let pkc = ctx.pkc_mut()?;
    let length = bits_to_bytes(pkc.key_size_bits);
    if buf.len() != 2 * length {
        return Err(ErrorKind::Argument.into());
    }
    let PkcInfo {
        param1: p,
        param5: x,
        mont1,
        tmp1,
        tmp2,
        tmp3,
        arena,
        ..
    } = &mut *pkc;

    let mut frame = arena.frame();
    let [r, s] = frame.get_many::<2>()?;
    let imported =
        Bignum::from_bytes_checked(&buf[..length], 1, MAX_PKCSIZE, Some(p), KeySizeCheck::None)?;
    r.copy_from(&imported);
    let imported =
        Bignum::from_bytes_checked(&buf[length..], 1, MAX_PKCSIZE, Some(p), KeySizeCheck::None)?;
    s.copy_from(&imported);

    // M = s * (r^x)^-1 mod p
    mont1.mod_exp(tmp1, r, x, side_channel)?;
    tmp2.set_mod_inverse(tmp1, p)?;
    tmp3.set_mod_mul(s, tmp2, p)?;

    // Far more stripped leading zeroes than formatting overhead allows
    // means the pair never came from this key.
    if length - tmp3.byte_count() > MAX_LEADING_ZEROES {
        return Err(ErrorKind::BadData.into());
    }
    tmp3.to_bytes_padded(&mut buf[..length])?;
    buf[length..].iter_mut().for_each(|b| *b = 0);
    Ok(())
}

fn elgamal_self_test() -> Result<()> {
    let mut ctx = ContextInfo::with_capability(&ELGAMAL_CAPABILITY)?;
    ctx.set_sidechannel_protection(true);
    crate::dlp::load_test_key(&mut ctx, true)?;

    let length = bits_to_bytes(ctx.pkc()?.key_size_bits);
    let mut buf = [0u8; 2 * MAX_PKCSIZE];
    crate::rng::copy_randombytes(&mut buf[1..length]);
    buf[0] = 0x01;
    let reference: Vec<u8> = buf[..length].to_vec();
    ctx.encrypt(&mut buf[..2 * length])?;
    ctx.decrypt(&mut buf[..2 * length])?;
    if buf[..length] != reference[..] {
        return Err(ErrorKind::Failed.into());
    }

    // A flipped key word must trip the checksum.
    ctx.pkc_mut()?.param1.corrupt_word(8, 0x0011);
    buf[..length].copy_from_slice(&reference);
    match ctx.encrypt(&mut buf[..2 * length]) {
        Err(e) if e.kind() == ErrorKind::Failed => Ok(()),
        _ => Err(ErrorKind::Failed.into()),
    }
}

/// Elgamal capability.  Signatures were removed from the algorithm's
/// deployed form long ago; only encryption is offered.
pub static ELGAMAL_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::Elgamal,
    name: "Elgamal",
    block_size: 0,
    min_key_size: MIN_PKCSIZE,
    key_size: 192,
    max_key_size: MAX_PKCSIZE,
    self_test: Some(elgamal_self_test),
    get_info: Some(get_default_info),
    init_key: Some(init_key),
    generate_key: Some(generate_key),
    encrypt: Some(elgamal_encrypt),
    decrypt: Some(elgamal_decrypt),
    ..EMPTY_CAPABILITY
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LifecycleState;

    fn test_ctx() -> ContextInfo {
        let mut ctx = ContextInfo::new(Algorithm::Elgamal).unwrap();
        crate::dlp::load_test_key(&mut ctx, true).unwrap();
        ctx
    }

    fn plaintext(length: usize) -> Vec<u8> {
        let mut m = vec![0u8; length];
        crate::rng::copy_randombytes(&mut m[1..]);
        m[0] = 0x01;
        m
    }

    #[test]
    fn test_self_test() {
        elgamal_self_test().unwrap();
    }

    #[test]
    fn test_roundtrip() {
        let mut ctx = test_ctx();
        assert_eq!(ctx.lifecycle(), LifecycleState::Keyed);
        let length = 128;
        let reference = plaintext(length);
        let mut buf = vec![0u8; 2 * length];
        buf[..length].copy_from_slice(&reference);
        ctx.encrypt(&mut buf).unwrap();
        assert_ne!(&buf[..length], &reference[..]);
        ctx.decrypt(&mut buf).unwrap();
        assert_eq!(&buf[..length], &reference[..]);
        assert!(buf[length..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_randomised_ciphertexts() {
        // Same plaintext twice must give different pairs.
        let mut ctx = test_ctx();
        let length = 128;
        let reference = plaintext(length);
        let mut a = vec![0u8; 2 * length];
        a[..length].copy_from_slice(&reference);
        let mut b = a.clone();
        ctx.encrypt(&mut a).unwrap();
        ctx.encrypt(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_public_only_context_encrypts() {
        let mut public = ContextInfo::new(Algorithm::Elgamal).unwrap();
        crate::dlp::load_test_key(&mut public, false).unwrap();
        let mut private = test_ctx();

        let length = 128;
        let reference = plaintext(length);
        let mut buf = vec![0u8; 2 * length];
        buf[..length].copy_from_slice(&reference);
        public.encrypt(&mut buf).unwrap();
        assert!(public.decrypt(&mut buf.clone()).is_err());
        private.decrypt(&mut buf).unwrap();
        assert_eq!(&buf[..length], &reference[..]);
    }

    #[test]
    fn test_mostly_zero_input_rejected() {
        let mut ctx = test_ctx();
        let mut buf = vec![0u8; 256];
        buf[120] = 0x5a;
        assert_eq!(ctx.encrypt(&mut buf).unwrap_err().kind(), ErrorKind::BadData);
    }

    #[test]
    fn test_wrong_buffer_size_rejected() {
        let mut ctx = test_ctx();
        let mut buf = vec![0u8; 128];
        assert!(ctx.encrypt(&mut buf).is_err());
    }
}
