//! HMAC plug-ins over SHA-1 and SHA-256.
//!
//! A MAC context is keyed first, then follows the same
//! `Hashing -> Finished` flow as the hash plug-ins.  The loaded key is
//! checksummed and re-verified each time a fresh HMAC state is spun up
//! from it.

use hmac::{Hmac, Mac, NewMac};
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::capability::{
    get_default_info, Algorithm, CapabilityInfo, KeyPayload, EMPTY_CAPABILITY,
};
use crate::constants::{MAX_KEYSIZE, MIN_KEYSIZE};
use crate::context::{ContextInfo, LifecycleState};
use crate::error::{Error, ErrorKind, Result};
use crate::utils::checksum_bytes;

/// Live keyed-digest state for the registered MAC algorithms.
pub enum MacState {
    /// HMAC-SHA1.
    HmacSha1(Hmac<Sha1>),
    /// HMAC-SHA256.
    HmacSha2(Hmac<Sha256>),
}

impl MacState {
    fn new(algo: Algorithm, key: &[u8]) -> Result<MacState> {
        Ok(match algo {
            Algorithm::HmacSha1 => MacState::HmacSha1(
                Hmac::new_from_slice(key).map_err(|_| Error::from(ErrorKind::Argument))?,
            ),
            Algorithm::HmacSha2 => MacState::HmacSha2(
                Hmac::new_from_slice(key).map_err(|_| Error::from(ErrorKind::Argument))?,
            ),
            _ => return Err(int_error!()),
        })
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            MacState::HmacSha1(m) => m.update(data),
            MacState::HmacSha2(m) => m.update(data),
        }
    }

    fn finalize_into(&mut self, out: &mut [u8]) -> usize {
        match self {
            MacState::HmacSha1(m) => {
                let d = m.finalize_reset().into_bytes();
                out[..d.len()].copy_from_slice(&d);
                d.len()
            }
            MacState::HmacSha2(m) => {
                let d = m.finalize_reset().into_bytes();
                out[..d.len()].copy_from_slice(&d);
                d.len()
            }
        }
    }
}

fn init_key(ctx: &mut ContextInfo, payload: KeyPayload<'_>) -> Result<()> {
    let key = match payload {
        KeyPayload::Bytes(key) => key,
        _ => return Err(ErrorKind::Argument.into()),
    };
    let info = ctx.mac_info_mut()?;
    info.user_key[..key.len()].copy_from_slice(key);
    info.user_key_len = key.len();
    info.key_checksum = checksum_bytes(key, 0);
    Ok(())
}

fn generate_key(ctx: &mut ContextInfo) -> Result<()> {
    let default_size = ctx.capability.key_size;
    let size = ctx.mac_info_mut()?.key_size.unwrap_or(default_size);
    let mut key = [0u8; MAX_KEYSIZE];
    crate::rng::copy_randombytes(&mut key[..size]);
    let result = init_key(ctx, KeyPayload::Bytes(&key[..size]));
    key.zeroize();
    result
}

// Spins up a fresh HMAC state from the stored key, re-verifying the
// key checksum first.
fn start(ctx: &mut ContextInfo) -> Result<()> {
    let algo = ctx.capability.algo;
    let info = ctx.mac_info_mut()?;
    if checksum_bytes(&info.user_key[..info.user_key_len], 0) != info.key_checksum {
        return Err(ErrorKind::Failed.into());
    }
    info.state = Some(MacState::new(algo, &info.user_key[..info.user_key_len])?);
    Ok(())
}

/// Feeds data into a MAC context.
pub(crate) fn update(ctx: &mut ContextInfo, data: &[u8]) -> Result<()> {
    match ctx.state {
        LifecycleState::Unkeyed => Err(ErrorKind::NotInited.into()),
        LifecycleState::Keyed => {
            start(ctx)?;
            let info = ctx.mac_info_mut()?;
            if let Some(state) = info.state.as_mut() {
                state.update(data);
            }
            ctx.state = LifecycleState::Hashing;
            Ok(())
        }
        LifecycleState::Hashing => {
            let info = ctx.mac_info_mut()?;
            match info.state.as_mut() {
                Some(state) => state.update(data),
                None => return Err(int_error!()),
            }
            Ok(())
        }
        LifecycleState::Finished => Err(ErrorKind::Complete.into()),
    }
}

/// Completes the MAC and latches the result.  Idempotent once
/// finished.
pub(crate) fn finalize(ctx: &mut ContextInfo) -> Result<()> {
    match ctx.state {
        LifecycleState::Finished => Ok(()),
        LifecycleState::Unkeyed => Err(ErrorKind::NotInited.into()),
        LifecycleState::Keyed | LifecycleState::Hashing => {
            if ctx.state == LifecycleState::Keyed {
                // MAC of the empty string.
                start(ctx)?;
            }
            let info = ctx.mac_info_mut()?;
            if let Some(state) = info.state.as_mut() {
                state.finalize_into(&mut info.mac);
            }
            ctx.state = LifecycleState::Finished;
            Ok(())
        }
    }
}

/// Discards the in-progress or latched MAC, keeping the key loaded.
pub(crate) fn reset(ctx: &mut ContextInfo) -> Result<()> {
    let info = ctx.mac_info_mut()?;
    info.state = None;
    info.mac.zeroize();
    ctx.state = LifecycleState::Keyed;
    Ok(())
}

fn process_data(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    update(ctx, buf)
}

fn mac_self_test(
    cap: &'static CapabilityInfo,
    key: &[u8],
    input: &[u8],
    expected: &str,
) -> Result<()> {
    let mut ctx = ContextInfo::with_capability(cap)?;
    ctx.load_key(key)?;
    ctx.hash_data(input)?;
    finalize(&mut ctx)?;
    let mut expected_raw = [0u8; crate::constants::MAX_HASHSIZE];
    let len = crate::hash::hex_decode(expected, &mut expected_raw)?;
    ensure_internal!(len == cap.block_size);
    if !ctx.compare_hash(&expected_raw[..len])? {
        return Err(ErrorKind::Failed.into());
    }
    // A corrupted key must be caught when the next state is spun up.
    reset(&mut ctx)?;
    ctx.mac_info_mut()?.user_key[0] ^= 0x01;
    if ctx.hash_data(input).is_ok() {
        return Err(ErrorKind::Failed.into());
    }
    Ok(())
}

fn hmac_sha1_self_test() -> Result<()> {
    mac_self_test(
        &HMAC_SHA1_CAPABILITY,
        &[0x0b; 20],
        b"Hi There",
        "b617318655057264e28bc0b6fb378c8ef146be00",
    )
}

fn hmac_sha2_self_test() -> Result<()> {
    mac_self_test(
        &HMAC_SHA2_CAPABILITY,
        &[0x0b; 20],
        b"Hi There",
        "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7",
    )
}

/// HMAC-SHA1 capability.
pub static HMAC_SHA1_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::HmacSha1,
    name: "HMAC-SHA1",
    block_size: 20,
    min_key_size: MIN_KEYSIZE,
    key_size: 20,
    max_key_size: MAX_KEYSIZE,
    self_test: Some(hmac_sha1_self_test),
    get_info: Some(get_default_info),
    init_key: Some(init_key),
    generate_key: Some(generate_key),
    encrypt: Some(process_data),
    decrypt: Some(process_data),
    ..EMPTY_CAPABILITY
};

/// HMAC-SHA2 (HMAC-SHA256) capability.
pub static HMAC_SHA2_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::HmacSha2,
    name: "HMAC-SHA2",
    block_size: 32,
    min_key_size: MIN_KEYSIZE,
    key_size: 32,
    max_key_size: MAX_KEYSIZE,
    self_test: Some(hmac_sha2_self_test),
    get_info: Some(get_default_info),
    init_key: Some(init_key),
    generate_key: Some(generate_key),
    encrypt: Some(process_data),
    decrypt: Some(process_data),
    ..EMPTY_CAPABILITY
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_answers() {
        hmac_sha1_self_test().unwrap();
        hmac_sha2_self_test().unwrap();
    }

    #[test]
    fn test_mac_requires_key() {
        let mut ctx = ContextInfo::new(Algorithm::HmacSha1).unwrap();
        assert_eq!(
            ctx.hash_data(b"data").unwrap_err().kind(),
            ErrorKind::NotInited
        );
    }

    #[test]
    fn test_reset_keeps_key() {
        let mut ctx = ContextInfo::new(Algorithm::HmacSha2).unwrap();
        ctx.load_key(&[0x0b; 20]).unwrap();
        ctx.hash_data(b"something else entirely").unwrap();
        finalize(&mut ctx).unwrap();
        reset(&mut ctx).unwrap();
        ctx.hash_data(b"Hi There").unwrap();
        finalize(&mut ctx).unwrap();
        let mut expected = [0u8; 32];
        crate::hash::hex_decode(
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7",
            &mut expected,
        )
        .unwrap();
        assert!(ctx.compare_hash(&expected).unwrap());
    }

    #[test]
    fn test_generated_key_macs() {
        let mut ctx = ContextInfo::new(Algorithm::HmacSha1).unwrap();
        ctx.generate_key().unwrap();
        ctx.hash_data(b"data").unwrap();
        finalize(&mut ctx).unwrap();
        assert_eq!(ctx.lifecycle(), LifecycleState::Finished);
    }
}
