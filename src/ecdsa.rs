//! ECDSA signatures over P-256.
//!
//! The structure mirrors DSA with the group exponentiation replaced by
//! scalar multiplication: the nonce k comes through
//! [`crate::dlp::generate_nonce`] with the same surplus-bit fold and
//! message mixing, r is the x coordinate of kG reduced mod n, and the
//! hash-to-integer step carries the extra single compare-subtract the
//! X9.62 form prescribes.  Signatures travel as r || s, each
//! zero-padded to the field size.

use std::cmp::Ordering;

use crate::bignum::Bignum;
use crate::capability::{
    get_default_info, Algorithm, CapabilityInfo, DlpParams, KeyPayload, NonceSource,
    EMPTY_CAPABILITY,
};
use crate::context::{ContextInfo, PkcInfo};
use crate::dlp::generate_nonce;
use crate::ecc::{init_ecc_key, p256, Point, P256_SIZE};
use crate::error::{ErrorKind, Result};
use crate::keyload::PkcComponents;

// The smallest hash a signature may cover.
const MIN_HASHSIZE: usize = 20;

fn init_key(ctx: &mut ContextInfo, payload: KeyPayload<'_>) -> Result<()> {
    match payload {
        KeyPayload::Components(PkcComponents::Ecc(c)) => {
            crate::ecc::import_ecc_components(ctx.pkc_mut()?, c)?;
            init_ecc_key(ctx)
        }
        KeyPayload::Internal => init_ecc_key(ctx),
        _ => Err(ErrorKind::Argument.into()),
    }
}

fn generate_key(ctx: &mut ContextInfo) -> Result<()> {
    crate::ecc::generate_ecc_key(ctx)
}

// Hash-to-integer as X9.62 has it: truncate to n's bit length, then a
// single compare-subtract rather than a full reduction.
fn hash_to_bignum(r: &mut Bignum, hash: &[u8], n: &Bignum) -> Result<()> {
    crate::dlp::hash_to_bignum(r, hash, n)?;
    if r.ucmp(n) != Ordering::Less {
        r.sub_assign(n)?;
    }
    Ok(())
}

fn sign(ctx: &mut ContextInfo, params: &mut DlpParams<'_, '_>) -> Result<()> {
    if params.input.len() < MIN_HASHSIZE || params.input.len() > crate::constants::MAX_HASHSIZE {
        return Err(ErrorKind::Argument.into());
    }
    if params.output.len() < 2 * P256_SIZE {
        return Err(ErrorKind::Overflow.into());
    }
    let curve = p256()?;
    let n = &curve.n;
    let pkc = ctx.pkc_mut()?;
    let PkcInfo {
        param3: d,
        tmp1,
        tmp2,
        arena,
        ..
    } = &mut *pkc;

    let mut frame = arena.frame();
    let [k, r, s, h] = frame.get_many::<4>()?;
    generate_nonce(k, n, params.input, &params.nonce)?;
    hash_to_bignum(h, params.input, n)?;

    // r = (kG).x mod n
    let kg = curve.scalar_mul(k, &curve.generator())?;
    if kg.infinity {
        return Err(ErrorKind::Failed.into());
    }
    r.set_mod(&kg.x, n)?;

    // s = k^-1 * (hash + d*r) mod n
    tmp1.set_mod_inverse(k, n)?;
    tmp2.set_mod_mul(d, r, n)?;
    tmp2.add_assign(h)?;
    if tmp2.ucmp(n) != Ordering::Less {
        tmp2.sub_assign(n)?;
    }
    s.set_mod_mul(tmp1, tmp2, n)?;

    if r.is_zero() || s.is_zero() {
        return Err(ErrorKind::Failed.into());
    }

    r.to_bytes_padded(&mut params.output[..P256_SIZE])?;
    s.to_bytes_padded(&mut params.output[P256_SIZE..2 * P256_SIZE])?;
    params.out_len = 2 * P256_SIZE;
    Ok(())
}

fn sig_check(ctx: &mut ContextInfo, params: &mut DlpParams<'_, '_>) -> Result<()> {
    if params.input.len() < MIN_HASHSIZE || params.input.len() > crate::constants::MAX_HASHSIZE {
        return Err(ErrorKind::Argument.into());
    }
    if params.sig.len() != 2 * P256_SIZE {
        return Err(ErrorKind::BadData.into());
    }
    let curve = p256()?;
    let n = &curve.n;
    let pkc = ctx.pkc_mut()?;
    let q = Point::new(pkc.param1.clone(), pkc.param2.clone());
    let PkcInfo {
        tmp1, tmp2, arena, ..
    } = &mut *pkc;

    let mut frame = arena.frame();
    let [r, s, u1, u2] = frame.get_many::<4>()?;
    let imported = Bignum::from_bytes(&params.sig[..P256_SIZE])?;
    r.copy_from(&imported);
    let imported = Bignum::from_bytes(&params.sig[P256_SIZE..])?;
    s.copy_from(&imported);
    // r, s must lie in [1, n - 1].
    if r.is_zero() || s.is_zero() || r.ucmp(n) != Ordering::Less || s.ucmp(n) != Ordering::Less {
        return Err(ErrorKind::BadData.into());
    }

    hash_to_bignum(u1, params.input, n)?;

    // w = s^-1 mod n, u1 = hash*w mod n, u2 = r*w mod n
    tmp1.set_mod_inverse(s, n)?;
    tmp2.set_mod_mul(u1, tmp1, n)?;
    u1.copy_from(tmp2);
    u2.set_mod_mul(r, tmp1, n)?;

    // v = (u1*G + u2*Q).x mod n
    let x = curve.mul_add(u1, u2, &q)?;
    if x.infinity {
        return Err(ErrorKind::Failed.into());
    }
    tmp1.set_mod(&x.x, n)?;

    if *tmp1 != *r {
        return Err(ErrorKind::Failed.into());
    }
    Ok(())
}

fn ecdsa_self_test() -> Result<()> {
    let mut ctx = ContextInfo::with_capability(&ECDSA_CAPABILITY)?;
    crate::ecc::load_test_key(&mut ctx, true)?;

    let mut hash = [0u8; 32];
    crate::hash::hex_decode(test_vectors::SHA_M, &mut hash)?;
    let mut k = [0u8; 32];
    crate::hash::hex_decode(test_vectors::K_VAL, &mut k)?;

    // Known-answer: the fixed nonce must reproduce the published
    // signature exactly.
    let mut expected = [0u8; 64];
    crate::hash::hex_decode(test_vectors::R, &mut expected[..32])?;
    crate::hash::hex_decode(test_vectors::S, &mut expected[32..])?;
    let mut sig = [0u8; 64];
    let mut params = DlpParams::new_sign(&hash, &mut sig);
    params.nonce = NonceSource::Test(&k);
    ctx.sign(&mut params)?;
    if params.out_len != 64 || sig != expected {
        return Err(ErrorKind::Failed.into());
    }

    let mut out = [0u8; 0];
    let mut params = DlpParams::new_check(&hash, &sig, &mut out);
    ctx.sig_check(&mut params)?;

    // A flipped key word must trip the checksum before any further
    // operation runs.
    ctx.pkc_mut()?.param1.corrupt_word(1, 0x1001);
    let mut params = DlpParams::new_check(&hash, &sig, &mut out);
    match ctx.sig_check(&mut params) {
        Err(e) if e.kind() == ErrorKind::Failed => Ok(()),
        _ => Err(ErrorKind::Failed.into()),
    }
}

// X9.62 L.4.2 known-answer signature over SHA-256("Example of ECDSA
// with ansip256r1 and SHA-256").
mod test_vectors {
    pub const SHA_M: &str = "1BD4ED430B0F384B4E8D458EFF1A8A553286D7AC21CB2F6806172EF5F94A06AD";
    pub const K_VAL: &str = "A0640D4957F27D091AB1AEBC69949D96E5AC2BB283ED5284A5674758B12F08DF";
    pub const R: &str = "D73CD3722BAE6CC0B39065BB4003D8ECE1EF2F7A8A55BFD677234B0B3B902650";
    pub const S: &str = "D9C88297FEFED8441E08DDA69554A6452B8A0BD4A0EA1DDB750499F0C2298C2F";
}

/// ECDSA capability.
pub static ECDSA_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::Ecdsa,
    name: "ECDSA",
    block_size: 0,
    min_key_size: crate::constants::MIN_PKCSIZE_ECC,
    key_size: P256_SIZE,
    max_key_size: P256_SIZE,
    self_test: Some(ecdsa_self_test),
    get_info: Some(get_default_info),
    init_key: Some(init_key),
    generate_key: Some(generate_key),
    sign: Some(sign),
    sig_check: Some(sig_check),
    ..EMPTY_CAPABILITY
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextFlags, LifecycleState};

    fn test_ctx() -> ContextInfo {
        let mut ctx = ContextInfo::new(Algorithm::Ecdsa).unwrap();
        crate::ecc::load_test_key(&mut ctx, true).unwrap();
        ctx
    }

    fn sha_m() -> [u8; 32] {
        let mut hash = [0u8; 32];
        crate::hash::hex_decode(test_vectors::SHA_M, &mut hash).unwrap();
        hash
    }

    #[test]
    fn test_self_test() {
        ecdsa_self_test().unwrap();
    }

    #[test]
    fn test_fixed_key_loads() {
        let ctx = test_ctx();
        assert_eq!(ctx.lifecycle(), LifecycleState::Keyed);
        assert!(ctx.flags().contains(ContextFlags::PRIVATE_KEY));
        assert_eq!(ctx.pkc().unwrap().key_size_bits, 256);
    }

    #[test]
    fn test_sign_verify_random_nonce() {
        let mut ctx = test_ctx();
        let hash = sha_m();
        let mut sig = [0u8; 64];
        let mut params = DlpParams::new_sign(&hash, &mut sig);
        ctx.sign(&mut params).unwrap();
        assert_eq!(params.out_len, 64);
        let mut out = [0u8; 0];
        let mut params = DlpParams::new_check(&hash, &sig, &mut out);
        ctx.sig_check(&mut params).unwrap();
    }

    #[test]
    fn test_public_only_context_verifies() {
        let mut signer = test_ctx();
        let hash = sha_m();
        let mut sig = [0u8; 64];
        let mut params = DlpParams::new_sign(&hash, &mut sig);
        signer.sign(&mut params).unwrap();

        let mut verifier = ContextInfo::new(Algorithm::Ecdsa).unwrap();
        crate::ecc::load_test_key(&mut verifier, false).unwrap();
        let mut out = [0u8; 0];
        let mut params = DlpParams::new_check(&hash, &sig, &mut out);
        verifier.sig_check(&mut params).unwrap();
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let mut ctx = test_ctx();
        let hash = sha_m();
        let mut sig = [0u8; 64];
        let mut params = DlpParams::new_sign(&hash, &mut sig);
        ctx.sign(&mut params).unwrap();
        sig[11] ^= 0x20;
        let mut out = [0u8; 0];
        let mut params = DlpParams::new_check(&hash, &sig, &mut out);
        assert_eq!(
            ctx.sig_check(&mut params).unwrap_err().kind(),
            ErrorKind::Failed
        );
    }

    #[test]
    fn test_out_of_range_signature_values_rejected() {
        let mut ctx = test_ctx();
        let hash = sha_m();
        let mut out = [0u8; 0];
        // r = 0.
        let sig = [0u8; 64];
        let mut params = DlpParams::new_check(&hash, &sig, &mut out);
        assert_eq!(
            ctx.sig_check(&mut params).unwrap_err().kind(),
            ErrorKind::BadData
        );
        // r >= n.
        let mut sig = [0xffu8; 64];
        sig[63] = 0x01;
        let mut params = DlpParams::new_check(&hash, &sig, &mut out);
        assert_eq!(
            ctx.sig_check(&mut params).unwrap_err().kind(),
            ErrorKind::BadData
        );
    }

    #[test]
    fn test_short_output_buffer_rejected() {
        let mut ctx = test_ctx();
        let hash = sha_m();
        let mut sig = [0u8; 63];
        let mut params = DlpParams::new_sign(&hash, &mut sig);
        assert_eq!(
            ctx.sign(&mut params).unwrap_err().kind(),
            ErrorKind::Overflow
        );
    }
}
