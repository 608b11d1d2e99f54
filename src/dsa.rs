//! DSA signatures over the shared discrete-log machinery.
//!
//! Signing follows FIPS 186 with the usual hardening: the nonce k is
//! drawn through [`crate::dlp::generate_nonce`] (surplus-bit fold plus
//! message mixing), the g^k exponentiation runs constant-time when
//! side-channel protection is enabled, and the s computation performs
//! a dummy subtraction on the branch not taken so both paths cost the
//! same.  Signatures travel as r || s, each zero-padded to the size of
//! q.

use std::cmp::Ordering;

use crate::bignum::Bignum;
use crate::capability::{
    get_default_info, Algorithm, CapabilityInfo, DlpParams, KeyPayload, NonceSource,
    EMPTY_CAPABILITY,
};
use crate::constants::{bits_to_bytes, MAX_HASHSIZE, MAX_PKCSIZE, MIN_PKCSIZE};
use crate::context::{ContextFlags, ContextInfo, PkcInfo};
use crate::dlp::{generate_nonce, hash_to_bignum, import_dlp_components, init_dlp_key};
use crate::error::{ErrorKind, Result};
use crate::keyload::PkcComponents;

// The smallest hash a signature may cover.
const MIN_HASHSIZE: usize = 20;

fn init_key(ctx: &mut ContextInfo, payload: KeyPayload<'_>) -> Result<()> {
    match payload {
        KeyPayload::Components(PkcComponents::Dlp(c)) => {
            if c.q.is_empty() {
                return Err(ErrorKind::BadData.into());
            }
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

fn sign(ctx: &mut ContextInfo, params: &mut DlpParams<'_, '_>) -> Result<()> {
    let side_channel = ctx.flags().contains(ContextFlags::SIDECHANNEL_PROTECTION);
    if params.input.len() < MIN_HASHSIZE || params.input.len() > MAX_HASHSIZE {
        return Err(ErrorKind::Argument.into());
    }
    let pkc = ctx.pkc_mut()?;
    let q_len = bits_to_bytes(pkc.param3.bit_count());
    if params.output.len() < 2 * q_len {
        return Err(ErrorKind::Overflow.into());
    }
    let PkcInfo {
        param2: g,
        param3: q,
        param5: x,
        mont1,
        tmp1,
        tmp2,
        tmp3,
        arena,
        ..
    } = &mut *pkc;

    let mut frame = arena.frame();
    let [k, r, s, h] = frame.get_many::<4>()?;
    generate_nonce(k, q, params.input, &params.nonce)?;
    hash_to_bignum(h, params.input, q)?;

    // r = (g^k mod p) mod q
    mont1.mod_exp(tmp1, g, k, side_channel)?;
    r.set_mod(tmp1, q)?;

    // s = k^-1 * (hash + x*r) mod q
    tmp1.set_mod_inverse(k, q)?;
    tmp2.set_mod_mul(x, r, q)?;
    tmp2.add_assign(h)?;
    if tmp2.ucmp(q) != Ordering::Less {
        tmp2.sub_assign(q)?;
    } else {
        // Balance the timing of the branch not taken; k is dead here.
        k.sub_assign(q)?;
    }
    tmp3.set_mod_mul(tmp1, tmp2, q)?;
    s.copy_from(tmp3);

    if r.is_zero() || s.is_zero() {
        return Err(ErrorKind::Failed.into());
    }
    // Values far below q's size indicate a miscomputation rather than
    // the ordinary short-value chance; with only ~160 bits to work
    // with, 80 bits of slack is the usable threshold.
    if r.byte_count() < q_len - 10 || s.byte_count() < q_len - 10 {
        return Err(ErrorKind::BadData.into());
    }

    r.to_bytes_padded(&mut params.output[..q_len])?;
    s.to_bytes_padded(&mut params.output[q_len..2 * q_len])?;
    params.out_len = 2 * q_len;
    Ok(())
}

fn sig_check(ctx: &mut ContextInfo, params: &mut DlpParams<'_, '_>) -> Result<()> {
    if params.input.len() < MIN_HASHSIZE || params.input.len() > MAX_HASHSIZE {
        return Err(ErrorKind::Argument.into());
    }
    let pkc = ctx.pkc_mut()?;
    let q_len = bits_to_bytes(pkc.param3.bit_count());
    if params.sig.len() != 2 * q_len {
        return Err(ErrorKind::BadData.into());
    }
    let PkcInfo {
        param2: g,
        param3: q,
        param4: y,
        mont1,
        tmp1,
        tmp2,
        tmp3,
        arena,
        ..
    } = &mut *pkc;

    let mut frame = arena.frame();
    let [r, s, u1, u2] = frame.get_many::<4>()?;
    let imported = Bignum::from_bytes(&params.sig[..q_len])?;
    r.copy_from(&imported);
    let imported = Bignum::from_bytes(&params.sig[q_len..])?;
    s.copy_from(&imported);
    // r, s must lie in [1, q - 1].
    if r.is_zero() || s.is_zero() || r.ucmp(q) != Ordering::Less || s.ucmp(q) != Ordering::Less {
        return Err(ErrorKind::BadData.into());
    }

    hash_to_bignum(u1, params.input, q)?;

    // w = s^-1 mod q, u1 = hash*w mod q, u2 = r*w mod q
    tmp1.set_mod_inverse(s, q)?;
    tmp2.set_mod_mul(u1, tmp1, q)?;
    u1.copy_from(tmp2);
    u2.set_mod_mul(r, tmp1, q)?;

    // v = ((g^u1 * y^u2) mod p) mod q
    mont1.mod_exp(tmp1, g, u1, false)?;
    mont1.mod_exp(tmp2, y, u2, false)?;
    tmp3.set_mod_mul(tmp1, tmp2, mont1.modulus())?;
    tmp1.set_mod(tmp3, q)?;

    if *tmp1 != *r {
        return Err(ErrorKind::Failed.into());
    }
    Ok(())
}

fn dsa_self_test() -> Result<()> {
    let mut ctx = ContextInfo::with_capability(&DSA_CAPABILITY)?;
    ctx.set_sidechannel_protection(true);
    crate::dlp::load_test_key(&mut ctx, true)?;

    let mut hash = [0u8; 20];
    crate::hash::hex_decode(crate::dlp::test_key::SHA_M, &mut hash)?;
    let mut k = [0u8; 20];
    crate::hash::hex_decode(crate::dlp::test_key::K_VAL, &mut k)?;

    // Sign with the fixed nonce twice; a nondeterministic result means
    // the nonce path is broken.
    let mut sig = [0u8; MAX_PKCSIZE];
    let mut params = DlpParams::new_sign(&hash, &mut sig);
    params.nonce = NonceSource::Test(&k);
    ctx.sign(&mut params)?;
    let sig_len = params.out_len;
    let mut sig2 = [0u8; MAX_PKCSIZE];
    let mut params = DlpParams::new_sign(&hash, &mut sig2);
    params.nonce = NonceSource::Test(&k);
    ctx.sign(&mut params)?;
    if params.out_len != sig_len || sig[..sig_len] != sig2[..sig_len] {
        return Err(ErrorKind::Failed.into());
    }

    let mut out = [0u8; 0];
    let mut params = DlpParams::new_check(&hash, &sig[..sig_len], &mut out);
    ctx.sig_check(&mut params)?;

    // A flipped key word must trip the checksum before any further
    // operation runs.
    ctx.pkc_mut()?.param2.corrupt_word(8, 0x0011);
    let mut params = DlpParams::new_check(&hash, &sig[..sig_len], &mut out);
    match ctx.sig_check(&mut params) {
        Err(e) if e.kind() == ErrorKind::Failed => Ok(()),
        _ => Err(ErrorKind::Failed.into()),
    }
}

/// DSA capability.
pub static DSA_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::Dsa,
    name: "DSA",
    block_size: 0,
    min_key_size: MIN_PKCSIZE,
    key_size: 128,
    max_key_size: MAX_PKCSIZE,
    self_test: Some(dsa_self_test),
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
    use crate::context::LifecycleState;

    fn test_ctx() -> ContextInfo {
        let mut ctx = ContextInfo::new(Algorithm::Dsa).unwrap();
        crate::dlp::load_test_key(&mut ctx, true).unwrap();
        ctx
    }

    fn sha_m() -> [u8; 20] {
        let mut hash = [0u8; 20];
        crate::hash::hex_decode(crate::dlp::test_key::SHA_M, &mut hash).unwrap();
        hash
    }

    #[test]
    fn test_self_test() {
        dsa_self_test().unwrap();
    }

    #[test]
    fn test_fixed_key_loads() {
        let ctx = test_ctx();
        assert_eq!(ctx.lifecycle(), LifecycleState::Keyed);
        assert!(ctx.flags().contains(ContextFlags::PRIVATE_KEY));
        assert_eq!(ctx.pkc().unwrap().key_size_bits, 1019);
    }

    #[test]
    fn test_sign_verify_random_nonce() {
        let mut ctx = test_ctx();
        let hash = sha_m();
        let mut sig = [0u8; MAX_PKCSIZE];
        let mut params = DlpParams::new_sign(&hash, &mut sig);
        ctx.sign(&mut params).unwrap();
        let sig_len = params.out_len;
        assert_eq!(sig_len, 40);
        let mut out = [0u8; 0];
        let mut params = DlpParams::new_check(&hash, &sig[..sig_len], &mut out);
        ctx.sig_check(&mut params).unwrap();
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let mut ctx = test_ctx();
        let hash = sha_m();
        let mut sig = [0u8; MAX_PKCSIZE];
        let mut params = DlpParams::new_sign(&hash, &mut sig);
        ctx.sign(&mut params).unwrap();
        let sig_len = params.out_len;
        sig[5] ^= 0x40;
        let mut out = [0u8; 0];
        let mut params = DlpParams::new_check(&hash, &sig[..sig_len], &mut out);
        assert_eq!(
            ctx.sig_check(&mut params).unwrap_err().kind(),
            ErrorKind::Failed
        );
    }

    #[test]
    fn test_wrong_hash_rejected() {
        let mut ctx = test_ctx();
        let hash = sha_m();
        let mut sig = [0u8; MAX_PKCSIZE];
        let mut params = DlpParams::new_sign(&hash, &mut sig);
        ctx.sign(&mut params).unwrap();
        let sig_len = params.out_len;
        let mut other = hash;
        other[0] ^= 0x01;
        let mut out = [0u8; 0];
        let mut params = DlpParams::new_check(&other, &sig[..sig_len], &mut out);
        assert!(ctx.sig_check(&mut params).is_err());
    }

    #[test]
    fn test_side_channel_flag_doesnt_change_signature() {
        let hash = sha_m();
        let mut k = [0u8; 20];
        crate::hash::hex_decode(crate::dlp::test_key::K_VAL, &mut k).unwrap();

        let mut plain = test_ctx();
        let mut hardened = test_ctx();
        hardened.set_sidechannel_protection(true);

        let mut sig_a = [0u8; MAX_PKCSIZE];
        let mut params = DlpParams::new_sign(&hash, &mut sig_a);
        params.nonce = NonceSource::Test(&k);
        plain.sign(&mut params).unwrap();
        let len_a = params.out_len;

        let mut sig_b = [0u8; MAX_PKCSIZE];
        let mut params = DlpParams::new_sign(&hash, &mut sig_b);
        params.nonce = NonceSource::Test(&k);
        hardened.sign(&mut params).unwrap();
        assert_eq!(len_a, params.out_len);
        assert_eq!(sig_a[..len_a], sig_b[..len_a]);
    }

    #[test]
    fn test_short_output_buffer_rejected() {
        let mut ctx = test_ctx();
        let hash = sha_m();
        let mut sig = [0u8; 39];
        let mut params = DlpParams::new_sign(&hash, &mut sig);
        assert_eq!(
            ctx.sign(&mut params).unwrap_err().kind(),
            ErrorKind::Overflow
        );
    }

    #[test]
    fn test_domain_without_q_refused() {
        let mut ctx = ContextInfo::new(Algorithm::Dsa).unwrap();
        let hex = |s: &str| {
            let mut buf = vec![0u8; s.len() / 2];
            let n = crate::hash::hex_decode(s, &mut buf).unwrap();
            buf.truncate(n);
            buf
        };
        let mut c = crate::keyload::DlpComponents::default();
        c.p = hex(crate::dlp::test_key::P);
        c.g = hex(crate::dlp::test_key::G);
        c.y = hex(crate::dlp::test_key::Y);
        assert!(ctx.load_key_components(&PkcComponents::Dlp(c)).is_err());
    }
}
