//! Diffie-Hellman key agreement over a prime-order subgroup.
//!
//! The two halves of an agreement ride the PKC encrypt/decrypt slots:
//! phase one writes this side's public value y = g^x mod p into the
//! buffer, phase two reads the peer's public value from it and leaves
//! the raw shared secret y'^x mod p behind.  A context loaded with
//! domain parameters alone completes the load by generating an
//! ephemeral pair, which is the usual lifetime of a DH key.

use std::cmp::Ordering;

use crate::bignum::{Bignum, KeySizeCheck};
use crate::capability::{
    get_default_info, Algorithm, CapabilityInfo, KeyPayload, EMPTY_CAPABILITY,
};
use crate::constants::{bits_to_bytes, MAX_PKCSIZE, MIN_PKCSIZE};
use crate::context::{ContextFlags, ContextInfo, PkcInfo};
use crate::dlp::{import_dlp_components, init_dlp_key};
use crate::error::{ErrorKind, Result};
use crate::keyload::PkcComponents;

fn init_key(ctx: &mut ContextInfo, payload: KeyPayload<'_>) -> Result<()> {
    match payload {
        KeyPayload::Components(PkcComponents::Dlp(c)) => {
            if c.q.is_empty() {
                return Err(ErrorKind::BadData.into());
            }
            import_dlp_components(ctx.pkc_mut()?, c)?;
            if c.x.is_empty() && c.y.is_empty() {
                // Domain only: generate the ephemeral pair in place.
                return crate::dlp::generate_dlp_key(ctx);
            }
            init_dlp_key(ctx)
        }
        KeyPayload::Internal => init_dlp_key(ctx),
        _ => Err(ErrorKind::Argument.into()),
    }
}

fn generate_key(ctx: &mut ContextInfo) -> Result<()> {
    crate::dlp::generate_dlp_key(ctx)
}

/// Phase one: exports this side's public value into `buf`.
fn dh_phase1(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    let pkc = ctx.pkc_mut()?;
    let length = bits_to_bytes(pkc.key_size_bits);
    if buf.len() != length {
        return Err(ErrorKind::Argument.into());
    }
    if pkc.param5.is_zero() {
        return Err(ErrorKind::NotInited.into());
    }
    pkc.param4.to_bytes_padded(buf)
}

/// Phase two: replaces the peer's public value in `buf` with the
/// shared secret.
fn dh_phase2(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    let side_channel = ctx.flags().contains(ContextFlags::SIDECHANNEL_PROTECTION);
    let pkc = ctx.pkc_mut()?;
    let length = bits_to_bytes(pkc.key_size_bits);
    if buf.len() != length {
        return Err(ErrorKind::Argument.into());
    }
    let PkcInfo {
        param1: p,
        param5: x,
        mont1,
        tmp1,
        tmp2,
        ..
    } = &mut *pkc;
    if x.is_zero() {
        return Err(ErrorKind::NotInited.into());
    }

    // The peer's value must be a group element in [2, p - 1).
    let imported =
        Bignum::from_bytes_checked(buf, 1, MAX_PKCSIZE, Some(p), KeySizeCheck::None)?;
    *tmp1 = imported;
    tmp2.copy_from(p);
    tmp2.sub_word_assign(1)?;
    if tmp1.ucmp(tmp2) != Ordering::Less {
        return Err(ErrorKind::BadData.into());
    }

    mont1.mod_exp(tmp2, tmp1, x, side_channel)?;
    // A degenerate shared value means the peer sent a small-subgroup
    // element.
    if tmp2.cmp_word(1) != Ordering::Greater {
        return Err(ErrorKind::BadData.into());
    }
    tmp2.to_bytes_padded(buf)
}

fn dh_self_test() -> Result<()> {
    let domain = || -> Result<PkcComponents> {
        Ok(PkcComponents::Dlp(crate::keyload::DlpComponents::domain(
            crate::dlp::test_key_bytes(crate::dlp::test_key::P)?,
            crate::dlp::test_key_bytes(crate::dlp::test_key::G)?,
            crate::dlp::test_key_bytes(crate::dlp::test_key::Q)?,
        )))
    };
    let mut alice = ContextInfo::with_capability(&DH_CAPABILITY)?;
    alice.set_sidechannel_protection(true);
    alice.load_key_components(&domain()?)?;
    let mut bob = ContextInfo::with_capability(&DH_CAPABILITY)?;
    bob.load_key_components(&domain()?)?;

    let length = bits_to_bytes(alice.pkc()?.key_size_bits);
    let mut pub_a = [0u8; MAX_PKCSIZE];
    alice.encrypt(&mut pub_a[..length])?;
    let mut pub_b = [0u8; MAX_PKCSIZE];
    bob.encrypt(&mut pub_b[..length])?;

    let mut shared_a = pub_b;
    alice.decrypt(&mut shared_a[..length])?;
    let mut shared_b = pub_a;
    bob.decrypt(&mut shared_b[..length])?;
    if shared_a[..length] != shared_b[..length] {
        return Err(ErrorKind::Failed.into());
    }

    // A flipped key word must trip the checksum.
    alice.pkc_mut()?.param1.corrupt_word(8, 0x0011);
    let mut buf = pub_b;
    match alice.decrypt(&mut buf[..length]) {
        Err(e) if e.kind() == ErrorKind::Failed => Ok(()),
        _ => Err(ErrorKind::Failed.into()),
    }
}

/// DH capability.  The encrypt/decrypt slots carry the two agreement
/// phases.
pub static DH_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::Dh,
    name: "Diffie-Hellman",
    block_size: 0,
    min_key_size: MIN_PKCSIZE,
    key_size: 256,
    max_key_size: MAX_PKCSIZE,
    self_test: Some(dh_self_test),
    get_info: Some(get_default_info),
    init_key: Some(init_key),
    generate_key: Some(generate_key),
    encrypt: Some(dh_phase1),
    decrypt: Some(dh_phase2),
    ..EMPTY_CAPABILITY
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LifecycleState;

    fn domain_ctx() -> ContextInfo {
        let mut ctx = ContextInfo::new(Algorithm::Dh).unwrap();
        let c = crate::keyload::DlpComponents::domain(
            crate::dlp::test_key_bytes(crate::dlp::test_key::P).unwrap(),
            crate::dlp::test_key_bytes(crate::dlp::test_key::G).unwrap(),
            crate::dlp::test_key_bytes(crate::dlp::test_key::Q).unwrap(),
        );
        ctx.load_key_components(&PkcComponents::Dlp(c)).unwrap();
        ctx
    }

    #[test]
    fn test_self_test() {
        dh_self_test().unwrap();
    }

    #[test]
    fn test_domain_load_generates_ephemeral_pair() {
        let ctx = domain_ctx();
        assert_eq!(ctx.lifecycle(), LifecycleState::Keyed);
        assert!(ctx.flags().contains(ContextFlags::PRIVATE_KEY));
        let pkc = ctx.pkc().unwrap();
        assert!(!pkc.param5.is_zero());
        assert!(!pkc.param4.is_zero());
    }

    #[test]
    fn test_agreement_matches() {
        let mut a = domain_ctx();
        let mut b = domain_ctx();
        let length = 128;
        let mut ya = [0u8; 128];
        a.encrypt(&mut ya).unwrap();
        let mut yb = [0u8; 128];
        b.encrypt(&mut yb).unwrap();
        // Distinct ephemeral draws.
        assert_ne!(ya, yb);

        let mut sa = yb;
        a.decrypt(&mut sa[..length]).unwrap();
        let mut sb = ya;
        b.decrypt(&mut sb[..length]).unwrap();
        assert_eq!(sa, sb);
    }

    #[test]
    fn test_degenerate_peer_value_rejected() {
        let mut ctx = domain_ctx();
        let mut buf = [0u8; 128];
        buf[127] = 0x01;
        assert!(ctx.decrypt(&mut buf).is_err());
        // p - 1 is likewise outside the accepted range.
        let mut pm1 = crate::dlp::test_key_bytes(crate::dlp::test_key::P).unwrap();
        let last = pm1.len() - 1;
        pm1[last] -= 1;
        let mut ctx = domain_ctx();
        assert!(ctx.decrypt(&mut pm1).is_err());
    }

    #[test]
    fn test_loaded_static_key_agrees_with_ephemeral() {
        // One static side (the fixed test key), one ephemeral side.
        let mut fixed = ContextInfo::new(Algorithm::Dh).unwrap();
        crate::dlp::load_test_key(&mut fixed, true).unwrap();
        let mut eph = domain_ctx();

        let length = 128;
        let mut y_fixed = [0u8; 128];
        fixed.encrypt(&mut y_fixed).unwrap();
        let mut y_eph = [0u8; 128];
        eph.encrypt(&mut y_eph).unwrap();

        let mut s1 = y_eph;
        fixed.decrypt(&mut s1[..length]).unwrap();
        let mut s2 = y_fixed;
        eph.decrypt(&mut s2[..length]).unwrap();
        assert_eq!(s1, s2);
    }
}
