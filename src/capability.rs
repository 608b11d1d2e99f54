//! Algorithm capability tables.
//!
//! Every algorithm plugs into the library through one [`CapabilityInfo`]:
//! a table of size policy plus optional operation slots.  An absent slot
//! is the capability statement "this algorithm doesn't do that", and the
//! dispatch layer turns it into [`ErrorKind::NotAvailable`] without the
//! plug-in being consulted.  Tables are sanity-checked once, when the
//! registry is first touched; a malformed table is a programming error
//! and poisons the registry rather than surfacing per call.

use lazy_static::lazy_static;

use crate::constants::{MAX_HASHSIZE, MAX_IVSIZE, MAX_KEYSIZE, MAX_TEXTSIZE, MIN_GENERIC_SECRET,
                       MIN_KEYSIZE, MIN_PKCSIZE, MIN_PKCSIZE_ECC};
use crate::context::ContextInfo;
use crate::error::{ErrorKind, Result};
use crate::keyload::PkcComponents;

/// Algorithm identifiers, spanning every functionality class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Triple DES in EDE formation.
    TripleDes,
    /// AES-128/192/256.
    Aes,
    /// MD5 (legacy verification only).
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-2 (256-bit form).
    Sha2,
    /// RIPEMD-160.
    Ripemd160,
    /// HMAC over SHA-1.
    HmacSha1,
    /// HMAC over SHA-2.
    HmacSha2,
    /// An opaque keying secret for composite mechanisms.
    GenericSecret,
    /// RSA.
    Rsa,
    /// DSA.
    Dsa,
    /// Elgamal.
    Elgamal,
    /// Diffie-Hellman key agreement.
    Dh,
    /// ECDSA over P-256.
    Ecdsa,
    /// ECDH over P-256.
    Ecdh,
}

/// The five functionality classes a context can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgoClass {
    /// Conventional (symmetric block) encryption.
    Conv,
    /// Public-key encryption/signing/agreement.
    Pkc,
    /// Unkeyed hashing.
    Hash,
    /// Keyed hashing.
    Mac,
    /// Generic-secret container.
    Generic,
}

impl Algorithm {
    /// The functionality class this algorithm belongs to.
    pub fn class(self) -> AlgoClass {
        match self {
            Algorithm::TripleDes | Algorithm::Aes => AlgoClass::Conv,
            Algorithm::Md5 | Algorithm::Sha1 | Algorithm::Sha2 | Algorithm::Ripemd160 => {
                AlgoClass::Hash
            }
            Algorithm::HmacSha1 | Algorithm::HmacSha2 => AlgoClass::Mac,
            Algorithm::GenericSecret => AlgoClass::Generic,
            Algorithm::Rsa
            | Algorithm::Dsa
            | Algorithm::Elgamal
            | Algorithm::Dh
            | Algorithm::Ecdsa
            | Algorithm::Ecdh => AlgoClass::Pkc,
        }
    }

    /// True for the discrete-log family sharing DLP domain parameters.
    pub fn is_dlp(self) -> bool {
        matches!(self, Algorithm::Dsa | Algorithm::Elgamal | Algorithm::Dh)
    }

    /// True for the elliptic-curve family.
    pub fn is_ecc(self) -> bool {
        matches!(self, Algorithm::Ecdsa | Algorithm::Ecdh)
    }
}

/// Block-cipher chaining modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMode {
    /// Electronic codebook.
    Ecb,
    /// Cipher block chaining.  The default.
    Cbc,
    /// Cipher feedback (stream).
    Cfb,
    /// Output feedback (stream).
    Ofb,
}

impl CryptMode {
    /// True for the stream-shaped modes that need no padding and carry
    /// per-byte IV state.
    pub fn is_stream(self) -> bool {
        matches!(self, CryptMode::Cfb | CryptMode::Ofb)
    }

    /// True when the mode consumes an IV.
    pub fn needs_iv(self) -> bool {
        !matches!(self, CryptMode::Ecb)
    }
}

/// Where a signing nonce comes from: fresh entropy, or an injected
/// value for known-answer tests.  Test injection exists so KATs never
/// have to smuggle magic values through data-length fields.
pub enum NonceSource<'a> {
    /// Draw the nonce from the OS generator with overflow bits.
    Random,
    /// Use exactly these bytes (tests only).
    Test(&'a [u8]),
}

/// Parameter block for sign, signature-check and key-agreement
/// operations.
pub struct DlpParams<'a, 'b> {
    /// Data being signed or verified (usually a hash), or the peer's
    /// public value for key agreement.
    pub input: &'a [u8],
    /// Signature to verify; empty when signing.
    pub sig: &'a [u8],
    /// Nonce policy for signing.
    pub nonce: NonceSource<'a>,
    /// Receives the signature or agreed value.
    pub output: &'b mut [u8],
    /// Bytes written to `output`.
    pub out_len: usize,
}

impl<'a, 'b> DlpParams<'a, 'b> {
    /// Builds a signing parameter block.
    pub fn new_sign(input: &'a [u8], output: &'b mut [u8]) -> Self {
        DlpParams {
            input,
            sig: &[],
            nonce: NonceSource::Random,
            output,
            out_len: 0,
        }
    }

    /// Builds a verification parameter block.
    pub fn new_check(input: &'a [u8], sig: &'a [u8], output: &'b mut [u8]) -> Self {
        DlpParams {
            input,
            sig,
            nonce: NonceSource::Random,
            output,
            out_len: 0,
        }
    }
}

/// Key material handed to a capability's `init_key` slot.
pub enum KeyPayload<'a> {
    /// Raw key bytes (conventional, MAC, generic classes).
    Bytes(&'a [u8]),
    /// Public-key components.
    Components(&'a PkcComponents),
    /// Re-derive internal state from components already present in the
    /// context (used after native key generation).
    Internal,
}

/// Capability metadata queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoQuery {
    /// Round a requested key size (bytes; zero means "default") to the
    /// nearest size the algorithm supports.
    KeySize(usize),
}

/// Runs an algorithm's known-answer self-test.
pub type SelfTestFn = fn() -> Result<()>;
/// Answers capability metadata queries.
pub type GetInfoFn = fn(&CapabilityInfo, InfoQuery) -> Result<usize>;
/// Handles algorithm-specific parameters at setup time.
pub type InitParamsFn = fn(&mut ContextInfo) -> Result<()>;
/// Installs key material into a context.
pub type InitKeyFn = fn(&mut ContextInfo, KeyPayload<'_>) -> Result<()>;
/// Generates a native key into a context.
pub type GenerateKeyFn = fn(&mut ContextInfo) -> Result<()>;
/// Transforms a buffer in place (encrypt, decrypt, hash- or MAC-data).
pub type ProcessFn = fn(&mut ContextInfo, &mut [u8]) -> Result<()>;
/// Signs, verifies or agrees keys through a [`DlpParams`] block.
pub type SignFn = fn(&mut ContextInfo, &mut DlpParams<'_, '_>) -> Result<()>;

/// One algorithm's complete capability statement.
#[derive(Clone, Copy)]
pub struct CapabilityInfo {
    /// The algorithm this table describes.
    pub algo: Algorithm,
    /// Human-readable algorithm name.
    pub name: &'static str,
    /// Cipher block size or hash output size; zero for PKC and generic
    /// classes.
    pub block_size: usize,
    /// Smallest loadable key, in bytes.
    pub min_key_size: usize,
    /// Default key size, in bytes.
    pub key_size: usize,
    /// Largest loadable key, in bytes.
    pub max_key_size: usize,
    /// Known-answer self-test; mandatory.
    pub self_test: Option<SelfTestFn>,
    /// Metadata queries; mandatory.
    pub get_info: Option<GetInfoFn>,
    /// Algorithm-specific setup parameters.
    pub init_params: Option<InitParamsFn>,
    /// Key installation.
    pub init_key: Option<InitKeyFn>,
    /// Native key generation.
    pub generate_key: Option<GenerateKeyFn>,
    /// Raw/ECB encryption, PKC public-op, hash- or MAC-data.
    pub encrypt: Option<ProcessFn>,
    /// Raw/ECB decryption, PKC private-op, hash- or MAC-data.
    pub decrypt: Option<ProcessFn>,
    /// CBC-mode encryption.
    pub encrypt_cbc: Option<ProcessFn>,
    /// CBC-mode decryption.
    pub decrypt_cbc: Option<ProcessFn>,
    /// CFB-mode encryption.
    pub encrypt_cfb: Option<ProcessFn>,
    /// CFB-mode decryption.
    pub decrypt_cfb: Option<ProcessFn>,
    /// OFB-mode encryption.
    pub encrypt_ofb: Option<ProcessFn>,
    /// OFB-mode decryption.
    pub decrypt_ofb: Option<ProcessFn>,
    /// Signature creation (or DLP/ECDLP private-value operation).
    pub sign: Option<SignFn>,
    /// Signature verification.
    pub sig_check: Option<SignFn>,
}

/// A capability table with every slot empty, for building concrete
/// tables by struct update.
pub const EMPTY_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::Sha1,
    name: "",
    block_size: 0,
    min_key_size: 0,
    key_size: 0,
    max_key_size: 0,
    self_test: None,
    get_info: None,
    init_params: None,
    init_key: None,
    generate_key: None,
    encrypt: None,
    decrypt: None,
    encrypt_cbc: None,
    decrypt_cbc: None,
    encrypt_cfb: None,
    decrypt_cfb: None,
    encrypt_ofb: None,
    decrypt_ofb: None,
    sign: None,
    sig_check: None,
};

/// Shared metadata handler: clamps a requested key size into the
/// capability's range, using the default for zero.
pub fn get_default_info(cap: &CapabilityInfo, query: InfoQuery) -> Result<usize> {
    match query {
        InfoQuery::KeySize(0) => Ok(cap.key_size),
        InfoQuery::KeySize(requested) => {
            if requested < cap.min_key_size || requested > cap.max_key_size {
                return Err(ErrorKind::Argument.into());
            }
            Ok(requested)
        }
    }
}

fn check_mode_pairs(cap: &CapabilityInfo) -> bool {
    let pairs = [
        (cap.encrypt.is_some(), cap.decrypt.is_some()),
        (cap.encrypt_cbc.is_some(), cap.decrypt_cbc.is_some()),
        (cap.encrypt_cfb.is_some(), cap.decrypt_cfb.is_some()),
        (cap.encrypt_ofb.is_some(), cap.decrypt_ofb.is_some()),
    ];
    pairs.iter().all(|&(e, d)| e == d) && pairs.iter().any(|&(e, _)| e)
}

fn has_mode_functions(cap: &CapabilityInfo) -> bool {
    cap.encrypt_cbc.is_some()
        || cap.decrypt_cbc.is_some()
        || cap.encrypt_cfb.is_some()
        || cap.decrypt_cfb.is_some()
        || cap.encrypt_ofb.is_some()
        || cap.decrypt_ofb.is_some()
}

/// Validates one capability table.  Any failure here is a programming
/// error in the table, not a runtime condition.
pub fn check_capability(cap: &CapabilityInfo) -> Result<()> {
    ensure_internal!(cap.name.len() >= 3 && cap.name.len() < MAX_TEXTSIZE);
    ensure_internal!(cap.self_test.is_some() && cap.get_info.is_some());
    ensure_internal!(cap.min_key_size <= cap.key_size && cap.key_size <= cap.max_key_size);

    match cap.algo.class() {
        AlgoClass::Conv => {
            ensure_internal!(cap.block_size >= 1 && cap.block_size <= MAX_IVSIZE);
            ensure_internal!(cap.min_key_size >= MIN_KEYSIZE && cap.max_key_size <= MAX_KEYSIZE);
            ensure_internal!(cap.init_key.is_some());
            ensure_internal!(check_mode_pairs(cap));
            ensure_internal!(cap.sign.is_none() && cap.sig_check.is_none());
        }
        AlgoClass::Pkc => {
            ensure_internal!(cap.block_size == 0);
            let floor = if cap.algo.is_ecc() { MIN_PKCSIZE_ECC } else { MIN_PKCSIZE };
            ensure_internal!(cap.min_key_size >= floor);
            ensure_internal!(cap.init_key.is_some());
            ensure_internal!(
                cap.encrypt.is_some()
                    || cap.decrypt.is_some()
                    || cap.sign.is_some()
                    || cap.sig_check.is_some()
            );
            ensure_internal!(!has_mode_functions(cap));
        }
        AlgoClass::Hash => {
            ensure_internal!(cap.block_size >= 1 && cap.block_size <= MAX_HASHSIZE);
            ensure_internal!(
                cap.min_key_size == 0 && cap.key_size == 0 && cap.max_key_size == 0
            );
            ensure_internal!(cap.encrypt.is_some() && cap.decrypt.is_some());
            ensure_internal!(!has_mode_functions(cap));
            ensure_internal!(cap.sign.is_none() && cap.sig_check.is_none());
        }
        AlgoClass::Mac => {
            ensure_internal!(cap.block_size >= 1 && cap.block_size <= MAX_HASHSIZE);
            ensure_internal!(cap.min_key_size >= MIN_KEYSIZE && cap.max_key_size <= MAX_KEYSIZE);
            ensure_internal!(cap.init_key.is_some());
            ensure_internal!(cap.encrypt.is_some() && cap.decrypt.is_some());
            ensure_internal!(!has_mode_functions(cap));
            ensure_internal!(cap.sign.is_none() && cap.sig_check.is_none());
        }
        AlgoClass::Generic => {
            ensure_internal!(cap.block_size == 0);
            ensure_internal!(
                cap.min_key_size >= MIN_GENERIC_SECRET && cap.max_key_size <= MAX_KEYSIZE
            );
            ensure_internal!(cap.init_key.is_some());
            ensure_internal!(cap.sign.is_none() && cap.sig_check.is_none());
        }
    }
    Ok(())
}

fn build_registry() -> Result<Vec<&'static CapabilityInfo>> {
    let list: Vec<&'static CapabilityInfo> = vec![
        &crate::conv::DES3_CAPABILITY,
        &crate::conv::AES_CAPABILITY,
        &crate::hash::MD5_CAPABILITY,
        &crate::hash::SHA1_CAPABILITY,
        &crate::hash::SHA2_CAPABILITY,
        &crate::hash::RIPEMD160_CAPABILITY,
        &crate::mac::HMAC_SHA1_CAPABILITY,
        &crate::mac::HMAC_SHA2_CAPABILITY,
        &crate::generic::GENERIC_SECRET_CAPABILITY,
        &crate::rsa::RSA_CAPABILITY,
        &crate::dsa::DSA_CAPABILITY,
        &crate::elgamal::ELGAMAL_CAPABILITY,
        &crate::dh::DH_CAPABILITY,
        &crate::ecdsa::ECDSA_CAPABILITY,
        &crate::ecdh::ECDH_CAPABILITY,
    ];
    for cap in &list {
        check_capability(cap)?;
        // No algorithm may register twice.
        ensure_internal!(list.iter().filter(|c| c.algo == cap.algo).count() == 1);
    }
    Ok(list)
}

lazy_static! {
    static ref REGISTRY: Result<Vec<&'static CapabilityInfo>> = build_registry();
}

/// Looks up the capability table for an algorithm.  Fails with
/// [`ErrorKind::NotAvailable`] for unregistered algorithms, or with the
/// registry's own configuration error if any table failed validation.
pub fn find_capability(algo: Algorithm) -> Result<&'static CapabilityInfo> {
    match &*REGISTRY {
        Ok(list) => list
            .iter()
            .find(|cap| cap.algo == algo)
            .copied()
            .ok_or_else(|| ErrorKind::NotAvailable.into()),
        Err(e) => Err(*e),
    }
}

/// All registered capabilities, for the self-test harness.
pub fn registered_capabilities() -> Result<&'static [&'static CapabilityInfo]> {
    match &*REGISTRY {
        Ok(list) => Ok(list.as_slice()),
        Err(e) => Err(*e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_well_formed() {
        let list = registered_capabilities().unwrap();
        assert!(!list.is_empty());
        for cap in list {
            check_capability(cap).unwrap();
        }
    }

    #[test]
    fn test_find_capability() {
        let cap = find_capability(Algorithm::Rsa).unwrap();
        assert_eq!(cap.algo, Algorithm::Rsa);
        assert_eq!(cap.block_size, 0);
        assert!(cap.sign.is_none()); // raw RSA signs through decrypt
    }

    #[test]
    fn test_check_rejects_missing_selftest() {
        let mut cap = CapabilityInfo {
            algo: Algorithm::Sha1,
            name: "SHA-1",
            block_size: 20,
            ..EMPTY_CAPABILITY
        };
        cap.get_info = Some(get_default_info);
        assert_eq!(
            check_capability(&cap).unwrap_err().kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_check_rejects_unmatched_mode_pair() {
        let good = find_capability(Algorithm::Aes).unwrap();
        let bad = CapabilityInfo {
            decrypt_cbc: None,
            ..*good
        };
        assert_eq!(
            check_capability(&bad).unwrap_err().kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_default_info_key_size() {
        let cap = find_capability(Algorithm::Aes).unwrap();
        assert_eq!(get_default_info(cap, InfoQuery::KeySize(0)).unwrap(), cap.key_size);
        assert!(get_default_info(cap, InfoQuery::KeySize(MAX_KEYSIZE + 1)).is_err());
    }
}
