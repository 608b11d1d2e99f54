//! Conventional-cipher plug-ins: 3DES and AES with ECB, CBC, CFB and
//! OFB chaining.
//!
//! The block primitives come from the `des` and `aes` crates; the
//! chaining modes are implemented here over the context's rolling IV
//! so that a stream can be continued across calls.  CFB and OFB are
//! byte-granular, with `iv_count` tracking the position within the
//! current keystream block.

use aes::{Aes128, Aes192, Aes256};
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, NewBlockCipher};
use des::TdesEde3;
use zeroize::Zeroize;

use crate::capability::{
    get_default_info, Algorithm, CapabilityInfo, KeyPayload, EMPTY_CAPABILITY,
};
use crate::constants::MAX_KEYSIZE;
use crate::context::{ContextInfo, ConvInfo};
use crate::error::{Error, ErrorClass, ErrorKind, Result};
use crate::utils::{checksum_bytes, xor_buf};

/// A scheduled block-cipher key.
pub enum CipherState {
    /// Three-key triple DES.
    Des3(Box<TdesEde3>),
    /// AES-128.
    Aes128(Box<Aes128>),
    /// AES-192.
    Aes192(Box<Aes192>),
    /// AES-256.
    Aes256(Box<Aes256>),
}

impl CipherState {
    fn encrypt_block(&self, block: &mut [u8]) {
        match self {
            CipherState::Des3(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            CipherState::Aes128(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            CipherState::Aes192(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            CipherState::Aes256(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        match self {
            CipherState::Des3(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            CipherState::Aes128(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            CipherState::Aes192(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            CipherState::Aes256(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
        }
    }
}

fn bad_key_size() -> Error {
    Error::new(ErrorKind::Argument)
        .with_report(crate::attribute::AttributeId::Key, ErrorClass::AttributeSize)
}

fn schedule_des3(key: &[u8]) -> Result<CipherState> {
    // Two-key form is expanded to K1 K2 K1.
    let mut full = [0u8; 24];
    match key.len() {
        24 => full.copy_from_slice(key),
        16 => {
            full[..16].copy_from_slice(key);
            full[16..].copy_from_slice(&key[..8]);
        }
        _ => return Err(bad_key_size()),
    }
    let cipher = TdesEde3::new_from_slice(&full).map_err(|_| bad_key_size());
    full.zeroize();
    Ok(CipherState::Des3(Box::new(cipher?)))
}

fn schedule_aes(key: &[u8]) -> Result<CipherState> {
    Ok(match key.len() {
        16 => CipherState::Aes128(Box::new(
            Aes128::new_from_slice(key).map_err(|_| bad_key_size())?,
        )),
        24 => CipherState::Aes192(Box::new(
            Aes192::new_from_slice(key).map_err(|_| bad_key_size())?,
        )),
        32 => CipherState::Aes256(Box::new(
            Aes256::new_from_slice(key).map_err(|_| bad_key_size())?,
        )),
        _ => return Err(bad_key_size()),
    })
}

fn init_key(ctx: &mut ContextInfo, payload: KeyPayload<'_>) -> Result<()> {
    let key = match payload {
        KeyPayload::Bytes(key) => key,
        _ => return Err(ErrorKind::Argument.into()),
    };
    let algo = ctx.capability.algo;
    let cipher = match algo {
        Algorithm::TripleDes => schedule_des3(key)?,
        Algorithm::Aes => schedule_aes(key)?,
        _ => return Err(int_error!()),
    };
    let conv = ctx.conv_mut()?;
    conv.user_key[..key.len()].copy_from_slice(key);
    conv.user_key_len = key.len();
    conv.key_checksum = checksum_bytes(key, 0);
    conv.cipher = Some(cipher);
    Ok(())
}

fn generate_key(ctx: &mut ContextInfo) -> Result<()> {
    let default_size = ctx.capability.key_size;
    let size = ctx.conv_mut()?.key_size.unwrap_or(default_size);
    let mut key = [0u8; MAX_KEYSIZE];
    crate::rng::copy_randombytes(&mut key[..size]);
    let result = init_key(ctx, KeyPayload::Bytes(&key[..size]));
    key.zeroize();
    result
}

// Borrows the scheduled cipher alongside the chaining state.
fn cipher_parts(conv: &mut ConvInfo) -> Result<(&CipherState, &mut [u8], &mut usize)> {
    let ConvInfo {
        cipher,
        current_iv,
        iv_count,
        ..
    } = conv;
    match cipher.as_ref() {
        Some(c) => Ok((c, &mut current_iv[..], iv_count)),
        None => Err(int_error!()),
    }
}

fn encrypt_ecb(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    let block_size = ctx.capability.block_size;
    let (cipher, _, _) = cipher_parts(ctx.conv_mut()?)?;
    for block in buf.chunks_exact_mut(block_size) {
        cipher.encrypt_block(block);
    }
    Ok(())
}

fn decrypt_ecb(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    let block_size = ctx.capability.block_size;
    let (cipher, _, _) = cipher_parts(ctx.conv_mut()?)?;
    for block in buf.chunks_exact_mut(block_size) {
        cipher.decrypt_block(block);
    }
    Ok(())
}

fn encrypt_cbc(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    let block_size = ctx.capability.block_size;
    let (cipher, current_iv, _) = cipher_parts(ctx.conv_mut()?)?;
    for block in buf.chunks_exact_mut(block_size) {
        xor_buf(block, &current_iv[..block_size]);
        cipher.encrypt_block(block);
        current_iv[..block_size].copy_from_slice(block);
    }
    Ok(())
}

fn decrypt_cbc(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    let block_size = ctx.capability.block_size;
    let (cipher, current_iv, _) = cipher_parts(ctx.conv_mut()?)?;
    let mut saved = [0u8; crate::constants::MAX_IVSIZE];
    for block in buf.chunks_exact_mut(block_size) {
        saved[..block_size].copy_from_slice(block);
        cipher.decrypt_block(block);
        xor_buf(block, &current_iv[..block_size]);
        current_iv[..block_size].copy_from_slice(&saved[..block_size]);
    }
    saved.zeroize();
    Ok(())
}

fn encrypt_cfb(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    let block_size = ctx.capability.block_size;
    let (cipher, current_iv, iv_count) = cipher_parts(ctx.conv_mut()?)?;
    for byte in buf.iter_mut() {
        if *iv_count == 0 {
            // The IV slot now holds keystream, rebuilt below from the
            // ciphertext to become the next feedback block.
            cipher.encrypt_block(&mut current_iv[..block_size]);
        }
        *byte ^= current_iv[*iv_count];
        current_iv[*iv_count] = *byte;
        *iv_count = (*iv_count + 1) % block_size;
    }
    Ok(())
}

fn decrypt_cfb(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    let block_size = ctx.capability.block_size;
    let (cipher, current_iv, iv_count) = cipher_parts(ctx.conv_mut()?)?;
    for byte in buf.iter_mut() {
        if *iv_count == 0 {
            cipher.encrypt_block(&mut current_iv[..block_size]);
        }
        let ciphertext = *byte;
        *byte ^= current_iv[*iv_count];
        current_iv[*iv_count] = ciphertext;
        *iv_count = (*iv_count + 1) % block_size;
    }
    Ok(())
}

// OFB keystream does not depend on the data, so one function serves
// both directions.
fn process_ofb(ctx: &mut ContextInfo, buf: &mut [u8]) -> Result<()> {
    let block_size = ctx.capability.block_size;
    let (cipher, current_iv, iv_count) = cipher_parts(ctx.conv_mut()?)?;
    for byte in buf.iter_mut() {
        if *iv_count == 0 {
            cipher.encrypt_block(&mut current_iv[..block_size]);
        }
        *byte ^= current_iv[*iv_count];
        *iv_count = (*iv_count + 1) % block_size;
    }
    Ok(())
}

fn conv_self_test(
    cap: &'static CapabilityInfo,
    key: &[u8],
    plain: &[u8],
    expected: &str,
) -> Result<()> {
    use crate::capability::CryptMode;

    let mut ctx = ContextInfo::with_capability(cap)?;
    ctx.conv_mut()?.mode = CryptMode::Ecb;
    ctx.load_key(key)?;
    let mut buf = [0u8; crate::constants::MAX_IVSIZE];
    let len = plain.len();
    buf[..len].copy_from_slice(plain);
    ctx.encrypt(&mut buf[..len])?;
    let mut expected_raw = [0u8; crate::constants::MAX_IVSIZE];
    crate::hash::hex_decode(expected, &mut expected_raw[..len])?;
    if buf[..len] != expected_raw[..len] {
        return Err(ErrorKind::Failed.into());
    }
    ctx.decrypt(&mut buf[..len])?;
    if buf[..len] != plain[..] {
        return Err(ErrorKind::Failed.into());
    }
    Ok(())
}

fn des3_self_test() -> Result<()> {
    // Degenerate single-DES vector (all three keys equal), then a
    // distinct-key roundtrip.
    conv_self_test(
        &DES3_CAPABILITY,
        &[
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
            0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef,
        ],
        b"Now is t",
        "3fa40e8a984d4815",
    )?;
    let mut ctx = ContextInfo::with_capability(&DES3_CAPABILITY)?;
    ctx.conv_mut()?.mode = crate::capability::CryptMode::Ecb;
    let key: [u8; 24] = [
        0x10, 0x46, 0x91, 0x34, 0x89, 0x98, 0x01, 0x31, 0x10, 0x07, 0x10, 0x01, 0x54, 0x0a, 0x51,
        0x6b, 0x10, 0x71, 0x03, 0x04, 0x89, 0x98, 0x02, 0x01,
    ];
    ctx.load_key(&key)?;
    let mut buf = *b"Talk9pm!";
    ctx.encrypt(&mut buf)?;
    if buf == *b"Talk9pm!" {
        return Err(ErrorKind::Failed.into());
    }
    ctx.decrypt(&mut buf)?;
    if buf != *b"Talk9pm!" {
        return Err(ErrorKind::Failed.into());
    }
    Ok(())
}

fn aes_self_test() -> Result<()> {
    let key: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f,
    ];
    let plain: [u8; 16] = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
        0xff,
    ];
    conv_self_test(
        &AES_CAPABILITY,
        &key,
        &plain,
        "69c4e0d86a7b0430d8cdb78070b4c55a",
    )
}

/// Three-key triple DES capability.
pub static DES3_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::TripleDes,
    name: "3DES",
    block_size: 8,
    min_key_size: 16,
    key_size: 24,
    max_key_size: 24,
    self_test: Some(des3_self_test),
    get_info: Some(get_default_info),
    init_key: Some(init_key),
    generate_key: Some(generate_key),
    encrypt: Some(encrypt_ecb),
    decrypt: Some(decrypt_ecb),
    encrypt_cbc: Some(encrypt_cbc),
    decrypt_cbc: Some(decrypt_cbc),
    encrypt_cfb: Some(encrypt_cfb),
    decrypt_cfb: Some(decrypt_cfb),
    encrypt_ofb: Some(process_ofb),
    decrypt_ofb: Some(process_ofb),
    ..EMPTY_CAPABILITY
};

/// AES capability (128-, 192- and 256-bit keys).
pub static AES_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::Aes,
    name: "AES",
    block_size: 16,
    min_key_size: 16,
    key_size: 16,
    max_key_size: 32,
    self_test: Some(aes_self_test),
    get_info: Some(get_default_info),
    init_key: Some(init_key),
    generate_key: Some(generate_key),
    encrypt: Some(encrypt_ecb),
    decrypt: Some(decrypt_ecb),
    encrypt_cbc: Some(encrypt_cbc),
    decrypt_cbc: Some(decrypt_cbc),
    encrypt_cfb: Some(encrypt_cfb),
    decrypt_cfb: Some(decrypt_cfb),
    encrypt_ofb: Some(process_ofb),
    decrypt_ofb: Some(process_ofb),
    ..EMPTY_CAPABILITY
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CryptMode;

    fn keyed_ctx(algo: Algorithm, mode: CryptMode, key: &[u8], iv: &[u8]) -> ContextInfo {
        let mut ctx = ContextInfo::new(algo).unwrap();
        ctx.conv_mut().unwrap().mode = mode;
        ctx.load_key(key).unwrap();
        if mode.needs_iv() {
            ctx.load_iv(iv).unwrap();
        }
        ctx
    }

    #[test]
    fn test_known_answers() {
        des3_self_test().unwrap();
        aes_self_test().unwrap();
    }

    #[test]
    fn test_cbc_roundtrip_and_chaining() {
        let key = [0x42u8; 16];
        let iv = [0x07u8; 16];
        let plain = *b"a 32 byte message for the test!!";
        let mut buf = plain;

        // One 32-byte call must equal two chained 16-byte calls.
        let mut enc = keyed_ctx(Algorithm::Aes, CryptMode::Cbc, &key, &iv);
        enc.encrypt(&mut buf).unwrap();
        let mut split = plain;
        let mut enc2 = keyed_ctx(Algorithm::Aes, CryptMode::Cbc, &key, &iv);
        enc2.encrypt(&mut split[..16]).unwrap();
        enc2.encrypt(&mut split[16..]).unwrap();
        assert_eq!(buf, split);

        let mut dec = keyed_ctx(Algorithm::Aes, CryptMode::Cbc, &key, &iv);
        dec.decrypt(&mut buf).unwrap();
        assert_eq!(buf, plain);
    }

    #[test]
    fn test_cfb_partial_blocks() {
        let key = [0x13u8; 24];
        let iv = [0xa5u8; 8];
        let plain = *b"an odd-length sample";
        let mut buf = plain;

        let mut enc = keyed_ctx(Algorithm::TripleDes, CryptMode::Cfb, &key, &iv);
        // Deliberately misaligned chunks.
        enc.encrypt(&mut buf[..3]).unwrap();
        enc.encrypt(&mut buf[3..11]).unwrap();
        enc.encrypt(&mut buf[11..]).unwrap();

        let mut dec = keyed_ctx(Algorithm::TripleDes, CryptMode::Cfb, &key, &iv);
        dec.decrypt(&mut buf).unwrap();
        assert_eq!(buf, plain);
    }

    #[test]
    fn test_ofb_is_symmetric() {
        let key = [0x99u8; 32];
        let iv = [0x55u8; 16];
        let plain = *b"ofb keystream does not feed back";
        let mut buf = plain;

        let mut enc = keyed_ctx(Algorithm::Aes, CryptMode::Ofb, &key, &iv);
        enc.encrypt(&mut buf).unwrap();
        // Decryption is the same transform.
        let mut dec = keyed_ctx(Algorithm::Aes, CryptMode::Ofb, &key, &iv);
        dec.encrypt(&mut buf).unwrap();
        assert_eq!(buf, plain);
    }

    #[test]
    fn test_two_key_des3_expands() {
        let mut ctx = ContextInfo::new(Algorithm::TripleDes).unwrap();
        ctx.conv_mut().unwrap().mode = CryptMode::Ecb;
        ctx.load_key(&[0x23u8; 16]).unwrap();
        let mut buf = [0u8; 8];
        ctx.encrypt(&mut buf).unwrap();
        assert_ne!(buf, [0u8; 8]);
    }

    #[test]
    fn test_bad_key_length_reports_locus() {
        let mut ctx = ContextInfo::new(Algorithm::Aes).unwrap();
        let err = ctx.load_key(&[0u8; 17]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
    }

    #[test]
    fn test_corrupted_key_blocks_operation() {
        let key = [0x42u8; 16];
        let iv = [0x07u8; 16];
        let mut ctx = keyed_ctx(Algorithm::Aes, CryptMode::Cbc, &key, &iv);
        ctx.conv_mut().unwrap().user_key[0] ^= 1;
        let mut buf = [0u8; 16];
        assert_eq!(ctx.encrypt(&mut buf).unwrap_err().kind(), ErrorKind::Failed);
    }
}
