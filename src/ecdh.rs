//! ECDH key agreement over P-256.
//!
//! As with DH, the two halves of an agreement ride the PKC
//! encrypt/decrypt slots: phase one writes this side's public point as
//! qx || qy into the buffer, phase two reads the peer's point from it,
//! validates it against the curve, and leaves the x coordinate of the
//! shared point behind in the first half with the rest zeroed.

use crate::bignum::{Bignum, KeySizeCheck};
use crate::capability::{
    get_default_info, Algorithm, CapabilityInfo, KeyPayload, EMPTY_CAPABILITY,
};
use crate::context::{ContextInfo, PkcInfo};
use crate::ecc::{init_ecc_key, p256, Point, P256_SIZE};
use crate::error::{ErrorKind, Result};
use crate::keyload::PkcComponents;

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

/// Phase one: exports this side's public point into `buf`.
fn ecdh_phase1(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    if buf.len() != 2 * P256_SIZE {
        return Err(ErrorKind::Argument.into());
    }
    let pkc = ctx.pkc_mut()?;
    if pkc.param3.is_zero() {
        return Err(ErrorKind::NotInited.into());
    }
    pkc.param1.to_bytes_padded(&mut buf[..P256_SIZE])?;
    pkc.param2.to_bytes_padded(&mut buf[P256_SIZE..])
}

/// Phase two: replaces the peer's public point in `buf` with the
/// shared secret.
fn ecdh_phase2(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    if buf.len() != 2 * P256_SIZE {
        return Err(ErrorKind::Argument.into());
    }
    let curve = p256()?;
    let pkc = ctx.pkc_mut()?;
    let PkcInfo { param3: d, .. } = &mut *pkc;
    if d.is_zero() {
        return Err(ErrorKind::NotInited.into());
    }

    // The peer's point must be a group element, not merely a pair of
    // field values; an off-curve point leaks the private scalar a few
    // bits at a time.
    let qx = Bignum::from_bytes_checked(
        &buf[..P256_SIZE],
        1,
        P256_SIZE,
        Some(&curve.p),
        KeySizeCheck::None,
    )?;
    let qy = Bignum::from_bytes_checked(
        &buf[P256_SIZE..],
        1,
        P256_SIZE,
        Some(&curve.p),
        KeySizeCheck::None,
    )?;
    let peer = Point::new(qx, qy);
    if !curve.contains(&peer)? {
        return Err(ErrorKind::BadData.into());
    }

    let shared = curve.scalar_mul(d, &peer)?;
    if shared.infinity {
        return Err(ErrorKind::BadData.into());
    }
    shared.x.to_bytes_padded(&mut buf[..P256_SIZE])?;
    buf[P256_SIZE..].fill(0);
    Ok(())
}

fn ecdh_self_test() -> Result<()> {
    let mut alice = ContextInfo::with_capability(&ECDH_CAPABILITY)?;
    alice.generate_key()?;
    let mut bob = ContextInfo::with_capability(&ECDH_CAPABILITY)?;
    crate::ecc::load_test_key(&mut bob, true)?;

    let mut pub_a = [0u8; 2 * P256_SIZE];
    alice.encrypt(&mut pub_a)?;
    let mut pub_b = [0u8; 2 * P256_SIZE];
    bob.encrypt(&mut pub_b)?;

    let mut shared_a = pub_b;
    alice.decrypt(&mut shared_a)?;
    let mut shared_b = pub_a;
    bob.decrypt(&mut shared_b)?;
    if shared_a != shared_b {
        return Err(ErrorKind::Failed.into());
    }

    // A flipped key word must trip the checksum.
    alice.pkc_mut()?.param1.corrupt_word(1, 0x1001);
    let mut buf = pub_b;
    match alice.decrypt(&mut buf) {
        Err(e) if e.kind() == ErrorKind::Failed => Ok(()),
        _ => Err(ErrorKind::Failed.into()),
    }
}

/// ECDH capability.  The encrypt/decrypt slots carry the two agreement
/// phases.
pub static ECDH_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::Ecdh,
    name: "ECDH",
    block_size: 0,
    min_key_size: crate::constants::MIN_PKCSIZE_ECC,
    key_size: P256_SIZE,
    max_key_size: P256_SIZE,
    self_test: Some(ecdh_self_test),
    get_info: Some(get_default_info),
    init_key: Some(init_key),
    generate_key: Some(generate_key),
    encrypt: Some(ecdh_phase1),
    decrypt: Some(ecdh_phase2),
    ..EMPTY_CAPABILITY
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextFlags, LifecycleState};

    fn generated_ctx() -> ContextInfo {
        let mut ctx = ContextInfo::new(Algorithm::Ecdh).unwrap();
        ctx.generate_key().unwrap();
        ctx
    }

    #[test]
    fn test_self_test() {
        ecdh_self_test().unwrap();
    }

    #[test]
    fn test_generated_key_state() {
        let ctx = generated_ctx();
        assert_eq!(ctx.lifecycle(), LifecycleState::Keyed);
        assert!(ctx.flags().contains(ContextFlags::PRIVATE_KEY));
        assert!(!ctx.pkc().unwrap().param3.is_zero());
    }

    #[test]
    fn test_agreement_matches() {
        let mut a = generated_ctx();
        let mut b = generated_ctx();
        let mut qa = [0u8; 64];
        a.encrypt(&mut qa).unwrap();
        let mut qb = [0u8; 64];
        b.encrypt(&mut qb).unwrap();
        assert_ne!(qa, qb);

        let mut sa = qb;
        a.decrypt(&mut sa).unwrap();
        let mut sb = qa;
        b.decrypt(&mut sb).unwrap();
        assert_eq!(sa, sb);
        // Second half is cleared, first half carries the secret.
        assert_eq!(sa[32..], [0u8; 32]);
        assert_ne!(sa[..32], [0u8; 32]);
    }

    #[test]
    fn test_off_curve_peer_point_rejected() {
        let mut fixed = ContextInfo::new(Algorithm::Ecdh).unwrap();
        crate::ecc::load_test_key(&mut fixed, true).unwrap();
        let mut eph = generated_ctx();
        let mut peer = [0u8; 64];
        eph.encrypt(&mut peer).unwrap();
        peer[40] ^= 0x08;
        assert_eq!(
            fixed.decrypt(&mut peer).unwrap_err().kind(),
            ErrorKind::BadData
        );
    }

    #[test]
    fn test_public_only_context_cannot_agree() {
        let mut pub_only = ContextInfo::new(Algorithm::Ecdh).unwrap();
        crate::ecc::load_test_key(&mut pub_only, false).unwrap();
        let mut eph = generated_ctx();
        let mut peer = [0u8; 64];
        eph.encrypt(&mut peer).unwrap();
        assert!(pub_only.decrypt(&mut peer).is_err());
    }

    #[test]
    fn test_wrong_buffer_size_rejected() {
        let mut ctx = generated_ctx();
        let mut buf = [0u8; 32];
        assert!(ctx.encrypt(&mut buf).is_err());
        assert!(ctx.decrypt(&mut buf).is_err());
    }
}
