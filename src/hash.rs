//! Hash-function plug-ins: MD5, SHA-1, SHA-2 and RIPEMD-160 over the
//! `digest` trait family.
//!
//! A hash context moves `Unkeyed -> Hashing -> Finished`; reading the
//! hash value latches the result, and deleting the hash-value attribute
//! resets the context for reuse.

use digest::Digest;
use md5::Md5;
use ripemd160::Ripemd160;
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::capability::{get_default_info, Algorithm, CapabilityInfo, EMPTY_CAPABILITY};
use crate::context::{ContextInfo, LifecycleState};
use crate::error::{ErrorKind, Result};

/// Live digest state for the registered hash algorithms.
pub enum HashState {
    /// MD5.
    Md5(Md5),
    /// SHA-1.
    Sha1(Sha1),
    /// SHA-256.
    Sha2(Sha256),
    /// RIPEMD-160.
    Ripemd160(Ripemd160),
}

impl HashState {
    fn new(algo: Algorithm) -> Result<HashState> {
        Ok(match algo {
            Algorithm::Md5 => HashState::Md5(Md5::new()),
            Algorithm::Sha1 => HashState::Sha1(Sha1::new()),
            Algorithm::Sha2 => HashState::Sha2(Sha256::new()),
            Algorithm::Ripemd160 => HashState::Ripemd160(Ripemd160::new()),
            _ => return Err(int_error!()),
        })
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            HashState::Md5(h) => h.update(data),
            HashState::Sha1(h) => h.update(data),
            HashState::Sha2(h) => h.update(data),
            HashState::Ripemd160(h) => h.update(data),
        }
    }

    // Writes the digest into `out` and returns its length; the inner
    // state is reset.
    fn finalize_into(&mut self, out: &mut [u8]) -> usize {
        match self {
            HashState::Md5(h) => {
                let d = h.finalize_reset();
                out[..d.len()].copy_from_slice(&d);
                d.len()
            }
            HashState::Sha1(h) => {
                let d = h.finalize_reset();
                out[..d.len()].copy_from_slice(&d);
                d.len()
            }
            HashState::Sha2(h) => {
                let d = h.finalize_reset();
                out[..d.len()].copy_from_slice(&d);
                d.len()
            }
            HashState::Ripemd160(h) => {
                let d = h.finalize_reset();
                out[..d.len()].copy_from_slice(&d);
                d.len()
            }
        }
    }
}

/// Feeds data into a hash context.
pub(crate) fn update(ctx: &mut ContextInfo, data: &[u8]) -> Result<()> {
    match ctx.state {
        LifecycleState::Unkeyed => {
            let algo = ctx.capability.algo;
            let info = ctx.hash_info_mut()?;
            info.state = Some(HashState::new(algo)?);
            if let Some(state) = info.state.as_mut() {
                state.update(data);
            }
            ctx.state = LifecycleState::Hashing;
            Ok(())
        }
        LifecycleState::Hashing => {
            let info = ctx.hash_info_mut()?;
            match info.state.as_mut() {
                Some(state) => state.update(data),
                None => return Err(int_error!()),
            }
            Ok(())
        }
        // The result is latched; the context must be reset first.
        _ => Err(ErrorKind::Complete.into()),
    }
}

/// Completes the hash and latches the result.  Idempotent once
/// finished.
pub(crate) fn finalize(ctx: &mut ContextInfo) -> Result<()> {
    match ctx.state {
        LifecycleState::Finished => Ok(()),
        LifecycleState::Unkeyed | LifecycleState::Hashing => {
            let algo = ctx.capability.algo;
            let info = ctx.hash_info_mut()?;
            if info.state.is_none() {
                // Hash of the empty string.
                info.state = Some(HashState::new(algo)?);
            }
            if let Some(state) = info.state.as_mut() {
                state.finalize_into(&mut info.hash);
            }
            ctx.state = LifecycleState::Finished;
            Ok(())
        }
        LifecycleState::Keyed => Err(int_error!()),
    }
}

/// Discards any in-progress or latched hash and readies the context.
pub(crate) fn reset(ctx: &mut ContextInfo) -> Result<()> {
    let info = ctx.hash_info_mut()?;
    info.state = None;
    info.hash.zeroize();
    ctx.state = LifecycleState::Unkeyed;
    Ok(())
}

// Capability process-data slot; hashing reads the buffer only.
fn process_data(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    update(ctx, buf)
}

fn hash_self_test(cap: &'static CapabilityInfo, input: &[u8], expected: &str) -> Result<()> {
    let mut ctx = ContextInfo::with_capability(cap)?;
    // Feed in two pieces to exercise the incremental path.
    let split = input.len() / 2;
    ctx.hash_data(&input[..split])?;
    ctx.hash_data(&input[split..])?;
    finalize(&mut ctx)?;
    let mut expected_raw = [0u8; crate::constants::MAX_HASHSIZE];
    let len = hex_decode(expected, &mut expected_raw)?;
    ensure_internal!(len == cap.block_size);
    if !ctx.compare_hash(&expected_raw[..len])? {
        return Err(ErrorKind::Failed.into());
    }
    Ok(())
}

// Minimal hex decoder for test-vector literals.
pub(crate) fn hex_decode(s: &str, out: &mut [u8]) -> Result<usize> {
    ensure_internal!(s.len() % 2 == 0 && s.len() / 2 <= out.len());
    fn nibble(c: u8) -> Result<u8> {
        match c {
            b'0'..=b'9' => Ok(c - b'0'),
            b'a'..=b'f' => Ok(c - b'a' + 10),
            b'A'..=b'F' => Ok(c - b'A' + 10),
            _ => Err(int_error!()),
        }
    }
    let bytes = s.as_bytes();
    for i in 0..s.len() / 2 {
        out[i] = (nibble(bytes[2 * i])? << 4) | nibble(bytes[2 * i + 1])?;
    }
    Ok(s.len() / 2)
}

fn md5_self_test() -> Result<()> {
    hash_self_test(&MD5_CAPABILITY, b"abc", "900150983cd24fb0d6963f7d28e17f72")
}

fn sha1_self_test() -> Result<()> {
    hash_self_test(
        &SHA1_CAPABILITY,
        b"abc",
        "a9993e364706816aba3e25717850c26c9cd0d89d",
    )
}

fn sha2_self_test() -> Result<()> {
    hash_self_test(
        &SHA2_CAPABILITY,
        b"abc",
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
    )
}

fn ripemd160_self_test() -> Result<()> {
    hash_self_test(
        &RIPEMD160_CAPABILITY,
        b"abc",
        "8eb208f7e05d987a9b044a8e98c6b087f15a0bfc",
    )
}

/// MD5 capability.  Kept only for legacy verification paths.
pub static MD5_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::Md5,
    name: "MD5",
    block_size: 16,
    self_test: Some(md5_self_test),
    get_info: Some(get_default_info),
    encrypt: Some(process_data),
    decrypt: Some(process_data),
    ..EMPTY_CAPABILITY
};

/// SHA-1 capability.
pub static SHA1_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::Sha1,
    name: "SHA-1",
    block_size: 20,
    self_test: Some(sha1_self_test),
    get_info: Some(get_default_info),
    encrypt: Some(process_data),
    decrypt: Some(process_data),
    ..EMPTY_CAPABILITY
};

/// SHA-2 (SHA-256) capability.
pub static SHA2_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::Sha2,
    name: "SHA-2",
    block_size: 32,
    self_test: Some(sha2_self_test),
    get_info: Some(get_default_info),
    encrypt: Some(process_data),
    decrypt: Some(process_data),
    ..EMPTY_CAPABILITY
};

/// RIPEMD-160 capability.
pub static RIPEMD160_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::Ripemd160,
    name: "RIPEMD-160",
    block_size: 20,
    self_test: Some(ripemd160_self_test),
    get_info: Some(get_default_info),
    encrypt: Some(process_data),
    decrypt: Some(process_data),
    ..EMPTY_CAPABILITY
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_answers() {
        md5_self_test().unwrap();
        sha1_self_test().unwrap();
        sha2_self_test().unwrap();
        ripemd160_self_test().unwrap();
    }

    #[test]
    fn test_data_after_latch_is_refused() {
        let mut ctx = ContextInfo::new(Algorithm::Sha1).unwrap();
        ctx.hash_data(b"abc").unwrap();
        finalize(&mut ctx).unwrap();
        assert_eq!(
            ctx.hash_data(b"more").unwrap_err().kind(),
            ErrorKind::Complete
        );
    }

    #[test]
    fn test_reset_allows_reuse() {
        let mut ctx = ContextInfo::new(Algorithm::Sha2).unwrap();
        ctx.hash_data(b"first").unwrap();
        finalize(&mut ctx).unwrap();
        reset(&mut ctx).unwrap();
        ctx.hash_data(b"abc").unwrap();
        finalize(&mut ctx).unwrap();
        let mut expected = [0u8; 32];
        hex_decode(
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
            &mut expected,
        )
        .unwrap();
        assert!(ctx.compare_hash(&expected).unwrap());
    }

    #[test]
    fn test_empty_hash() {
        // SHA-256 of the empty string.
        let mut ctx = ContextInfo::new(Algorithm::Sha2).unwrap();
        finalize(&mut ctx).unwrap();
        let mut expected = [0u8; 32];
        hex_decode(
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            &mut expected,
        )
        .unwrap();
        assert!(ctx.compare_hash(&expected).unwrap());
    }
}
