//! Encryption contexts.
//!
//! A [`ContextInfo`] binds one algorithm capability to per-instance
//! state: key material, chaining state, lifecycle and error reports.
//! The context layer owns everything algorithm-independent — lifecycle
//! gating, IV bookkeeping, key-data integrity checks, constant-time
//! compares — and forwards the actual work through the capability's
//! operation slots.
//!
//! ```
//! use cryptoctx::capability::Algorithm;
//! use cryptoctx::context::ContextInfo;
//!
//! let mut ctx = ContextInfo::new(Algorithm::Sha2).unwrap();
//! ctx.hash_data(b"abc").unwrap();
//! let mut digest = [0u8; 32];
//! ctx.get_attribute_bytes(cryptoctx::attribute::AttributeId::HashValue, &mut digest).unwrap();
//! ```

use bitflags::bitflags;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::attribute::AttributeId;
use crate::bignum::arena::BnArena;
use crate::bignum::mont::MontCtx;
use crate::bignum::Bignum;
use crate::capability::{find_capability, Algorithm, AlgoClass, CapabilityInfo, CryptMode,
                        DlpParams};
use crate::constants::{KEYID_SIZE, MAX_HASHSIZE, MAX_IVSIZE, MAX_KEYSIZE, MAX_TEXTSIZE};
use crate::error::{Error, ErrorClass, ErrorKind, Result};

bitflags! {
    /// Non-lifecycle per-context state bits.
    pub struct ContextFlags: u32 {
        /// An IV has been installed.
        const IV_SET = 0x0001;
        /// The context holds a public key.
        const PUBLIC_KEY = 0x0002;
        /// The context holds a private key.
        const PRIVATE_KEY = 0x0004;
        /// Side-channel protection (blinding, constant-time exponents,
        /// verification of private-key results) is enabled.
        const SIDECHANNEL_PROTECTION = 0x0008;
        /// The key persists outside this context and needs a label.
        const PERSISTENT = 0x0010;
        /// The context fronts key material held elsewhere and performs
        /// no crypto itself.
        const DUMMY = 0x0020;
        /// Perform the pairwise consistency check on generated keys.
        const PBO = 0x0040;
    }
}

/// Where a context is in its life.  Transitions are one-way except for
/// hash/MAC reset via deleting the hash value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No key loaded (for hash contexts: ready to hash).
    Unkeyed,
    /// Key installed, data operations permitted.
    Keyed,
    /// Hashing in progress.
    Hashing,
    /// Hash result latched; no more data accepted.
    Finished,
}

/// State for conventional-cipher contexts.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ConvInfo {
    /// Chaining mode.
    #[zeroize(skip)]
    pub(crate) mode: CryptMode,
    /// The mode attribute is one-shot; set when explicitly configured.
    pub(crate) mode_set: bool,
    /// Explicitly configured key size, if any.
    pub(crate) key_size: Option<usize>,
    pub(crate) user_key: [u8; MAX_KEYSIZE],
    pub(crate) user_key_len: usize,
    pub(crate) salt: [u8; MAX_HASHSIZE],
    pub(crate) salt_len: usize,
    #[zeroize(skip)]
    pub(crate) kdf_algo: Option<Algorithm>,
    pub(crate) kdf_iterations: Option<u32>,
    /// The loaded IV and the rolling copy the mode functions advance.
    pub(crate) iv: [u8; MAX_IVSIZE],
    pub(crate) current_iv: [u8; MAX_IVSIZE],
    /// Byte position within the current IV block for stream modes.
    pub(crate) iv_count: usize,
    /// Scheduled cipher state.
    #[zeroize(skip)]
    pub(crate) cipher: Option<crate::conv::CipherState>,
    pub(crate) key_checksum: u32,
}

impl ConvInfo {
    fn new() -> Self {
        ConvInfo {
            mode: CryptMode::Cbc,
            mode_set: false,
            key_size: None,
            user_key: [0; MAX_KEYSIZE],
            user_key_len: 0,
            salt: [0; MAX_HASHSIZE],
            salt_len: 0,
            kdf_algo: None,
            kdf_iterations: None,
            iv: [0; MAX_IVSIZE],
            current_iv: [0; MAX_IVSIZE],
            iv_count: 0,
            cipher: None,
            key_checksum: 0,
        }
    }
}

/// State for public-key contexts: the generic big-integer parameter
/// slots (their meaning is fixed per algorithm family), named scratch
/// values, blinding state, Montgomery caches and the scratch pool.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PkcInfo {
    pub(crate) key_size_bits: usize,
    pub(crate) key_id: [u8; KEYID_SIZE],
    pub(crate) key_id_set: bool,
    /// RSA: n, e, d, p, q, u, e1, e2.  DLP: p, g, q, y, x.  ECC: qx,
    /// qy, d.
    pub(crate) param1: Bignum,
    pub(crate) param2: Bignum,
    pub(crate) param3: Bignum,
    pub(crate) param4: Bignum,
    pub(crate) param5: Bignum,
    pub(crate) param6: Bignum,
    pub(crate) param7: Bignum,
    pub(crate) param8: Bignum,
    /// Operation-lifetime scratch, wiped after every operation.
    pub(crate) tmp1: Bignum,
    pub(crate) tmp2: Bignum,
    pub(crate) tmp3: Bignum,
    /// Blinding pair: r^e mod n and r^-1 mod n, squared after each use.
    pub(crate) blind1: Bignum,
    pub(crate) blind2: Bignum,
    /// Montgomery caches: modulus (n or p), and the CRT factors.
    pub(crate) mont1: MontCtx,
    pub(crate) mont2: MontCtx,
    pub(crate) mont3: MontCtx,
    pub(crate) arena: BnArena,
    /// Cached canonical public-key encoding.
    pub(crate) pub_key_blob: Vec<u8>,
    pub(crate) checksum: u32,
}

impl PkcInfo {
    fn new() -> Self {
        PkcInfo {
            key_size_bits: 0,
            key_id: [0; KEYID_SIZE],
            key_id_set: false,
            param1: Bignum::default(),
            param2: Bignum::default(),
            param3: Bignum::default(),
            param4: Bignum::default(),
            param5: Bignum::default(),
            param6: Bignum::default(),
            param7: Bignum::default(),
            param8: Bignum::default(),
            tmp1: Bignum::default(),
            tmp2: Bignum::default(),
            tmp3: Bignum::default(),
            blind1: Bignum::default(),
            blind2: Bignum::default(),
            mont1: MontCtx::default(),
            mont2: MontCtx::default(),
            mont3: MontCtx::default(),
            arena: BnArena::new(),
            pub_key_blob: Vec::new(),
            checksum: 0,
        }
    }

    /// Wipes the operation-lifetime scratch values and the pool.  Runs
    /// after every public-key operation, success or failure.
    pub(crate) fn clear_temp_bignums(&mut self) {
        self.tmp1.set_zero();
        self.tmp2.set_zero();
        self.tmp3.set_zero();
        self.arena.clear();
    }

    // Folds the long-lived key components into the running checksum.
    // Which slots participate is fixed per algorithm family, so a
    // public RSA key and a private one cover different sets.
    fn compute_checksum(&self, algo: Algorithm, private: bool) -> u32 {
        let mut sum = 0u32;
        if algo.is_dlp() {
            sum = self.param1.checksum(sum); // p
            sum = self.param2.checksum(sum); // g
            sum = self.param3.checksum(sum); // q
            sum = self.param4.checksum(sum); // y
            if private {
                sum = self.param5.checksum(sum); // x
            }
            sum = self.mont1.checksum(sum);
        } else if algo.is_ecc() {
            sum = self.param1.checksum(sum); // qx
            sum = self.param2.checksum(sum); // qy
            if private {
                sum = self.param3.checksum(sum); // d
            }
        } else {
            sum = self.param1.checksum(sum); // n
            sum = self.param2.checksum(sum); // e
            sum = self.mont1.checksum(sum);
            if private {
                sum = self.param3.checksum(sum); // d
                sum = self.param4.checksum(sum); // p
                sum = self.param5.checksum(sum); // q
                sum = self.param6.checksum(sum); // u
                sum = self.param7.checksum(sum); // e1
                sum = self.param8.checksum(sum); // e2
                sum = self.mont2.checksum(sum);
                sum = self.mont3.checksum(sum);
            }
        }
        sum
    }

    /// Records the current key-data checksum.
    pub(crate) fn update_checksum(&mut self, algo: Algorithm, private: bool) {
        self.checksum = self.compute_checksum(algo, private);
    }

    /// Verifies the key data against the recorded checksum.  A mismatch
    /// means the key was corrupted (fault attack or memory error) and
    /// the operation must be refused.
    pub(crate) fn verify_checksum(&self, algo: Algorithm, private: bool) -> Result<()> {
        if self.checksum != self.compute_checksum(algo, private) {
            return Err(ErrorKind::Failed.into());
        }
        Ok(())
    }
}

/// State for hash contexts.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct HashInfo {
    #[zeroize(skip)]
    pub(crate) state: Option<crate::hash::HashState>,
    /// The latched result, valid in the `Finished` state.
    pub(crate) hash: [u8; MAX_HASHSIZE],
}

/// State for MAC contexts.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MacInfo {
    pub(crate) user_key: [u8; MAX_KEYSIZE],
    pub(crate) user_key_len: usize,
    pub(crate) key_size: Option<usize>,
    pub(crate) salt: [u8; MAX_HASHSIZE],
    pub(crate) salt_len: usize,
    #[zeroize(skip)]
    pub(crate) kdf_algo: Option<Algorithm>,
    pub(crate) kdf_iterations: Option<u32>,
    #[zeroize(skip)]
    pub(crate) state: Option<crate::mac::MacState>,
    /// The latched result, valid in the `Finished` state.
    pub(crate) mac: [u8; MAX_HASHSIZE],
    pub(crate) key_checksum: u32,
}

impl MacInfo {
    fn new() -> Self {
        MacInfo {
            user_key: [0; MAX_KEYSIZE],
            user_key_len: 0,
            key_size: None,
            salt: [0; MAX_HASHSIZE],
            salt_len: 0,
            kdf_algo: None,
            kdf_iterations: None,
            state: None,
            mac: [0; MAX_HASHSIZE],
            key_checksum: 0,
        }
    }
}

/// State for generic-secret contexts used by composite mechanisms.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct GenericInfo {
    pub(crate) secret: [u8; MAX_KEYSIZE],
    pub(crate) secret_len: usize,
    /// Opaque KDF / encryption / MAC parameter blobs carried for the
    /// mechanism layer.
    pub(crate) kdf_params: Vec<u8>,
    pub(crate) enc_params: Vec<u8>,
    pub(crate) mac_params: Vec<u8>,
}

/// Per-class context state.
pub enum ContextData {
    /// Conventional-cipher state.
    Conv(Box<ConvInfo>),
    /// Public-key state.
    Pkc(Box<PkcInfo>),
    /// Hash state.
    Hash(Box<HashInfo>),
    /// MAC state.
    Mac(Box<MacInfo>),
    /// Generic-secret state.
    Generic(Box<GenericInfo>),
}

/// One encryption context.
pub struct ContextInfo {
    pub(crate) capability: &'static CapabilityInfo,
    pub(crate) flags: ContextFlags,
    pub(crate) state: LifecycleState,
    pub(crate) label: [u8; MAX_TEXTSIZE],
    pub(crate) label_len: usize,
    pub(crate) error_locus: Option<AttributeId>,
    pub(crate) error_class: ErrorClass,
    pub(crate) data: ContextData,
}

impl ContextInfo {
    /// Creates a context for a registered algorithm.
    pub fn new(algo: Algorithm) -> Result<ContextInfo> {
        ContextInfo::with_capability(find_capability(algo)?)
    }

    /// Creates a context directly over a capability table, bypassing
    /// the registry.  Used by the self-test harness so a half-broken
    /// registry can still be diagnosed.
    pub fn with_capability(capability: &'static CapabilityInfo) -> Result<ContextInfo> {
        let data = match capability.algo.class() {
            AlgoClass::Conv => ContextData::Conv(Box::new(ConvInfo::new())),
            AlgoClass::Pkc => ContextData::Pkc(Box::new(PkcInfo::new())),
            AlgoClass::Hash => ContextData::Hash(Box::new(HashInfo {
                state: None,
                hash: [0; MAX_HASHSIZE],
            })),
            AlgoClass::Mac => ContextData::Mac(Box::new(MacInfo::new())),
            AlgoClass::Generic => ContextData::Generic(Box::new(GenericInfo {
                secret: [0; MAX_KEYSIZE],
                secret_len: 0,
                kdf_params: Vec::new(),
                enc_params: Vec::new(),
                mac_params: Vec::new(),
            })),
        };
        Ok(ContextInfo {
            capability,
            flags: ContextFlags::empty(),
            state: LifecycleState::Unkeyed,
            label: [0; MAX_TEXTSIZE],
            label_len: 0,
            error_locus: None,
            error_class: ErrorClass::None,
            data,
        })
    }

    /// The capability this context was created over.
    pub fn capability(&self) -> &'static CapabilityInfo {
        self.capability
    }

    /// The algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.capability.algo
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> LifecycleState {
        self.state
    }

    /// Current flag word.
    pub fn flags(&self) -> ContextFlags {
        self.flags
    }

    /// Enables or disables side-channel protection for private-key
    /// operations.
    pub fn set_sidechannel_protection(&mut self, enabled: bool) {
        self.flags.set(ContextFlags::SIDECHANNEL_PROTECTION, enabled);
    }

    // --- typed access to the per-class data ---

    pub(crate) fn conv(&self) -> Result<&ConvInfo> {
        match &self.data {
            ContextData::Conv(c) => Ok(c),
            _ => Err(int_error!()),
        }
    }

    pub(crate) fn conv_mut(&mut self) -> Result<&mut ConvInfo> {
        match &mut self.data {
            ContextData::Conv(c) => Ok(c),
            _ => Err(int_error!()),
        }
    }

    pub(crate) fn pkc(&self) -> Result<&PkcInfo> {
        match &self.data {
            ContextData::Pkc(p) => Ok(p),
            _ => Err(int_error!()),
        }
    }

    pub(crate) fn pkc_mut(&mut self) -> Result<&mut PkcInfo> {
        match &mut self.data {
            ContextData::Pkc(p) => Ok(p),
            _ => Err(int_error!()),
        }
    }

    pub(crate) fn hash_info_mut(&mut self) -> Result<&mut HashInfo> {
        match &mut self.data {
            ContextData::Hash(h) => Ok(h),
            _ => Err(int_error!()),
        }
    }

    pub(crate) fn mac_info(&self) -> Result<&MacInfo> {
        match &self.data {
            ContextData::Mac(m) => Ok(m),
            _ => Err(int_error!()),
        }
    }

    pub(crate) fn mac_info_mut(&mut self) -> Result<&mut MacInfo> {
        match &mut self.data {
            ContextData::Mac(m) => Ok(m),
            _ => Err(int_error!()),
        }
    }

    pub(crate) fn generic(&self) -> Result<&GenericInfo> {
        match &self.data {
            ContextData::Generic(g) => Ok(g),
            _ => Err(int_error!()),
        }
    }

    pub(crate) fn generic_mut(&mut self) -> Result<&mut GenericInfo> {
        match &mut self.data {
            ContextData::Generic(g) => Ok(g),
            _ => Err(int_error!()),
        }
    }

    // --- error reporting ---

    /// Latches an extended error report on the context and passes the
    /// error through.
    pub(crate) fn latch_error(&mut self, e: Error) -> Error {
        if let Some(locus) = e.locus() {
            self.error_locus = Some(locus);
            self.error_class = e.class();
        }
        e
    }

    /// The last latched error locus and class.
    pub fn error_report(&self) -> (Option<AttributeId>, ErrorClass) {
        (self.error_locus, self.error_class)
    }

    // --- data operations ---

    fn conv_mode_fn(&self, decrypt: bool) -> Result<crate::capability::ProcessFn> {
        let conv = self.conv()?;
        let cap = self.capability;
        let slot = match (conv.mode, decrypt) {
            (CryptMode::Ecb, false) => cap.encrypt,
            (CryptMode::Ecb, true) => cap.decrypt,
            (CryptMode::Cbc, false) => cap.encrypt_cbc,
            (CryptMode::Cbc, true) => cap.decrypt_cbc,
            (CryptMode::Cfb, false) => cap.encrypt_cfb,
            (CryptMode::Cfb, true) => cap.decrypt_cfb,
            (CryptMode::Ofb, false) => cap.encrypt_ofb,
            (CryptMode::Ofb, true) => cap.decrypt_ofb,
        };
        slot.ok_or_else(|| {
            Error::new(ErrorKind::NotAvailable)
                .with_report(AttributeId::Mode, ErrorClass::AttributeValue)
        })
    }

    fn check_conv_op(&self, buf_len: usize) -> Result<()> {
        ensure_internal!(self.capability.algo.class() == AlgoClass::Conv);
        if self.state != LifecycleState::Keyed {
            return Err(Error::new(ErrorKind::NotInited)
                .with_report(AttributeId::Key, ErrorClass::AttributeAbsent));
        }
        let conv = self.conv()?;
        if conv.mode.needs_iv() && !self.flags.contains(ContextFlags::IV_SET) {
            return Err(Error::new(ErrorKind::NotInited)
                .with_report(AttributeId::Iv, ErrorClass::AttributeAbsent));
        }
        if !conv.mode.is_stream() && buf_len % self.capability.block_size != 0 {
            return Err(ErrorKind::Argument.into());
        }
        // Guard against key state corrupted since load.
        if conv.key_checksum != crate::utils::checksum_bytes(&conv.user_key[..conv.user_key_len], 0)
        {
            return Err(ErrorKind::Failed.into());
        }
        Ok(())
    }

    /// Encrypts `buf` in place (conventional ciphers), or applies the
    /// public-key transformation (PKC).
    pub fn encrypt(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.capability.algo.class() {
            AlgoClass::Conv => {
                self.check_conv_op(buf.len()).map_err(|e| self.latch_error(e))?;
                let f = self.conv_mode_fn(false).map_err(|e| self.latch_error(e))?;
                f(self, buf)
            }
            AlgoClass::Pkc => {
                self.check_pkc_op(false)?;
                let f = self
                    .capability
                    .encrypt
                    .ok_or_else(|| Error::new(ErrorKind::NotAvailable))?;
                let result = f(self, buf);
                self.finish_pkc_op(result)
            }
            _ => Err(ErrorKind::NotAvailable.into()),
        }
    }

    /// Decrypts `buf` in place (conventional ciphers), or applies the
    /// private-key transformation (PKC).
    pub fn decrypt(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.capability.algo.class() {
            AlgoClass::Conv => {
                self.check_conv_op(buf.len()).map_err(|e| self.latch_error(e))?;
                let f = self.conv_mode_fn(true).map_err(|e| self.latch_error(e))?;
                f(self, buf)
            }
            AlgoClass::Pkc => {
                self.check_pkc_op(true)?;
                let f = self
                    .capability
                    .decrypt
                    .ok_or_else(|| Error::new(ErrorKind::NotAvailable))?;
                let result = f(self, buf);
                self.finish_pkc_op(result)
            }
            _ => Err(ErrorKind::NotAvailable.into()),
        }
    }

    /// Signs through the capability's sign slot.
    pub fn sign(&mut self, params: &mut DlpParams<'_, '_>) -> Result<()> {
        self.check_pkc_op(true)?;
        let f = self
            .capability
            .sign
            .ok_or_else(|| Error::new(ErrorKind::NotAvailable))?;
        let result = f(self, params);
        self.finish_pkc_op(result)
    }

    /// Verifies a signature through the capability's sig-check slot.
    pub fn sig_check(&mut self, params: &mut DlpParams<'_, '_>) -> Result<()> {
        self.check_pkc_op(false)?;
        let f = self
            .capability
            .sig_check
            .ok_or_else(|| Error::new(ErrorKind::NotAvailable))?;
        let result = f(self, params);
        self.finish_pkc_op(result)
    }

    fn check_pkc_op(&self, private: bool) -> Result<()> {
        ensure_internal!(self.capability.algo.class() == AlgoClass::Pkc);
        if self.state != LifecycleState::Keyed {
            return Err(Error::new(ErrorKind::NotInited)
                .with_report(AttributeId::Key, ErrorClass::AttributeAbsent));
        }
        if private && !self.flags.contains(ContextFlags::PRIVATE_KEY) {
            return Err(ErrorKind::NotAvailable.into());
        }
        // Every operation re-verifies the key data first, so a faulted
        // key never produces output an attacker can use.
        let pkc = self.pkc()?;
        pkc.verify_checksum(
            self.capability.algo,
            self.flags.contains(ContextFlags::PRIVATE_KEY),
        )
    }

    // Scratch never survives an operation, whichever way it ended.
    fn finish_pkc_op(&mut self, result: Result<()>) -> Result<()> {
        self.pkc_mut()?.clear_temp_bignums();
        result.map_err(|e| self.latch_error(e))
    }

    /// Feeds data to a hash or MAC context.
    pub fn hash_data(&mut self, data: &[u8]) -> Result<()> {
        match self.capability.algo.class() {
            AlgoClass::Hash => crate::hash::update(self, data),
            AlgoClass::Mac => crate::mac::update(self, data),
            _ => Err(ErrorKind::NotAvailable.into()),
        }
    }

    /// Compares a hash/MAC result against `value` in constant time.
    /// Only valid once the result has been latched.
    pub fn compare_hash(&mut self, value: &[u8]) -> Result<bool> {
        if self.state != LifecycleState::Finished {
            return Err(ErrorKind::Incomplete.into());
        }
        let size = self.capability.block_size;
        if value.len() != size {
            return Ok(false);
        }
        let stored = match &self.data {
            ContextData::Hash(h) => &h.hash[..size],
            ContextData::Mac(m) => &m.mac[..size],
            _ => return Err(ErrorKind::NotAvailable.into()),
        };
        Ok(crate::utils::constant_time_eq(stored, value))
    }

    /// Compares a public-key identifier against this context's key ID
    /// in constant time.
    pub fn compare_key_id(&self, key_id: &[u8]) -> Result<bool> {
        let pkc = self.pkc()?;
        if !pkc.key_id_set {
            return Err(ErrorKind::NotInited.into());
        }
        if key_id.len() != KEYID_SIZE {
            return Ok(false);
        }
        Ok(crate::utils::constant_time_eq(&pkc.key_id, key_id))
    }

    /// Runs the algorithm's known-answer self-test.
    pub fn self_test(&self) -> Result<()> {
        match self.capability.self_test {
            Some(f) => f(),
            None => Err(int_error!()),
        }
    }
}

impl Drop for ContextInfo {
    fn drop(&mut self) {
        self.label.zeroize();
        self.label_len = 0;
    }
}
