//! The context attribute protocol.
//!
//! Everything a caller configures or queries on a context goes through
//! the attribute surface: algorithm metadata, keying setup, key
//! material, IVs, labels and the latched error report.  Setup
//! attributes are one-shot; writing one twice fails with the
//! already-initialised report rather than silently reconfiguring a
//! live context.
//!
//! ```
//! use cryptoctx::attribute::{AttrValue, AttributeId};
//! use cryptoctx::capability::Algorithm;
//! use cryptoctx::context::ContextInfo;
//!
//! let mut ctx = ContextInfo::new(Algorithm::Aes).unwrap();
//! ctx.set_attribute(AttributeId::KeySize, AttrValue::Size(32)).unwrap();
//! ctx.set_attribute_bytes(AttributeId::Key, &[0x2b; 32]).unwrap();
//! assert_eq!(ctx.get_attribute(AttributeId::BlockSize).unwrap(), AttrValue::Size(16));
//! ```

use zeroize::Zeroize;

use crate::capability::{Algorithm, AlgoClass, CryptMode, InfoQuery};
use crate::constants::{bits_to_bytes, KDF_MAX_ITERATIONS, MAX_HASHSIZE, MAX_TEXTSIZE};
use crate::context::{ContextFlags, ContextInfo, LifecycleState};
use crate::error::{Error, ErrorClass, ErrorKind, Result};

/// Identifies one context attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeId {
    /// The context's algorithm (read-only).
    Algorithm,
    /// Chaining mode, conventional ciphers only.
    Mode,
    /// Key size in bytes.
    KeySize,
    /// Cipher block size or digest size (read-only).
    BlockSize,
    /// IV size in bytes (read-only).
    IvSize,
    /// PRF for passphrase derivation.
    KeyingAlgo,
    /// Iteration count for passphrase derivation.
    KeyingIterations,
    /// Salt for passphrase derivation.
    KeyingSalt,
    /// Passphrase; writing it triggers derivation.
    KeyingValue,
    /// Raw key bytes.
    Key,
    /// Public-key components (error locus only; loading goes through
    /// [`ContextInfo::load_key_components`]).
    KeyComponents,
    /// Initialisation vector.
    Iv,
    /// Hash or MAC result; reading it finalises the operation.
    HashValue,
    /// Key label for persistent contexts.
    Label,
    /// Public-key fingerprint (read-only).
    KeyId,
    /// Canonical public-key encoding (read-only).
    PublicKeyInfo,
    /// The key persists outside this context.
    Persistent,
    /// Side-channel protection for private-key operations.
    SideChannelProtection,
    /// Locus of the last latched error (read-only).
    ErrorLocus,
    /// Class of the last latched error (read-only).
    ErrorType,
}

/// A typed attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrValue {
    /// An algorithm identifier.
    Algo(Algorithm),
    /// A chaining mode.
    Mode(CryptMode),
    /// A size in bytes.
    Size(usize),
    /// An iteration or similar count.
    Count(u32),
    /// A boolean flag.
    Flag(bool),
    /// An error locus.
    Locus(AttributeId),
    /// An error class.
    Class(ErrorClass),
}

fn one_shot(id: AttributeId) -> Error {
    Error::new(ErrorKind::Inited).with_report(id, ErrorClass::AttributePresent)
}

fn absent(id: AttributeId) -> Error {
    Error::new(ErrorKind::NotInited).with_report(id, ErrorClass::AttributeAbsent)
}

fn wrong_value(id: AttributeId) -> Error {
    Error::new(ErrorKind::Argument).with_report(id, ErrorClass::AttributeValue)
}

impl ContextInfo {
    /// Reads a scalar attribute.
    pub fn get_attribute(&mut self, id: AttributeId) -> Result<AttrValue> {
        let result = self.get_attribute_inner(id);
        result.map_err(|e| self.latch_error(e))
    }

    fn get_attribute_inner(&mut self, id: AttributeId) -> Result<AttrValue> {
        let cap = self.capability;
        match id {
            AttributeId::Algorithm => Ok(AttrValue::Algo(cap.algo)),
            AttributeId::Mode => Ok(AttrValue::Mode(self.conv()?.mode)),
            AttributeId::KeySize => Ok(AttrValue::Size(self.effective_key_size()?)),
            AttributeId::BlockSize => {
                let size = match cap.algo.class() {
                    AlgoClass::Conv if self.conv()?.mode.is_stream() => 1,
                    AlgoClass::Pkc => bits_to_bytes(self.pkc()?.key_size_bits),
                    _ => cap.block_size,
                };
                Ok(AttrValue::Size(size))
            }
            AttributeId::IvSize => {
                if !self.conv()?.mode.needs_iv() {
                    return Err(Error::new(ErrorKind::NotAvailable)
                        .with_report(AttributeId::Mode, ErrorClass::AttributeValue));
                }
                Ok(AttrValue::Size(cap.block_size))
            }
            AttributeId::KeyingAlgo => match self.kdf_setup()?.0 {
                Some(algo) => Ok(AttrValue::Algo(algo)),
                None => Err(absent(id)),
            },
            AttributeId::KeyingIterations => match self.kdf_setup()?.1 {
                Some(n) => Ok(AttrValue::Count(n)),
                None => Err(absent(id)),
            },
            AttributeId::Persistent => {
                Ok(AttrValue::Flag(self.flags.contains(ContextFlags::PERSISTENT)))
            }
            AttributeId::SideChannelProtection => Ok(AttrValue::Flag(
                self.flags.contains(ContextFlags::SIDECHANNEL_PROTECTION),
            )),
            AttributeId::ErrorLocus => match self.error_locus {
                Some(locus) => Ok(AttrValue::Locus(locus)),
                None => Err(ErrorKind::NotFound.into()),
            },
            AttributeId::ErrorType => {
                if self.error_locus.is_none() {
                    return Err(ErrorKind::NotFound.into());
                }
                Ok(AttrValue::Class(self.error_class))
            }
            _ => Err(ErrorKind::NotAvailable.into()),
        }
    }

    // The key size the context would use right now: the configured
    // override, the loaded key's size, or the capability default.
    fn effective_key_size(&self) -> Result<usize> {
        Ok(match self.capability.algo.class() {
            AlgoClass::Conv => {
                let c = self.conv()?;
                c.key_size.unwrap_or(if c.user_key_len > 0 {
                    c.user_key_len
                } else {
                    self.capability.key_size
                })
            }
            AlgoClass::Mac => {
                let m = self.mac_info()?;
                m.key_size.unwrap_or(if m.user_key_len > 0 {
                    m.user_key_len
                } else {
                    self.capability.key_size
                })
            }
            AlgoClass::Pkc => {
                let bits = self.pkc()?.key_size_bits;
                if bits > 0 {
                    bits_to_bytes(bits)
                } else {
                    self.capability.key_size
                }
            }
            AlgoClass::Generic => {
                let g = self.generic()?;
                if g.secret_len > 0 {
                    g.secret_len
                } else {
                    self.capability.key_size
                }
            }
            AlgoClass::Hash => return Err(ErrorKind::NotAvailable.into()),
        })
    }

    fn kdf_setup(&self) -> Result<(Option<Algorithm>, Option<u32>)> {
        match self.capability.algo.class() {
            AlgoClass::Conv => {
                let c = self.conv()?;
                Ok((c.kdf_algo, c.kdf_iterations))
            }
            AlgoClass::Mac => {
                let m = self.mac_info()?;
                Ok((m.kdf_algo, m.kdf_iterations))
            }
            _ => Err(ErrorKind::NotAvailable.into()),
        }
    }

    /// Reads a byte-string attribute into `out`, returning the length
    /// written.  Reading the hash value finalises the hash or MAC.
    pub fn get_attribute_bytes(&mut self, id: AttributeId, out: &mut [u8]) -> Result<usize> {
        let result = self.get_attribute_bytes_inner(id, out);
        result.map_err(|e| self.latch_error(e))
    }

    fn get_attribute_bytes_inner(&mut self, id: AttributeId, out: &mut [u8]) -> Result<usize> {
        match id {
            AttributeId::HashValue => {
                let size = self.capability.block_size;
                if out.len() < size {
                    return Err(ErrorKind::Overflow.into());
                }
                match self.capability.algo.class() {
                    AlgoClass::Hash => {
                        crate::hash::finalize(self)?;
                        out[..size].copy_from_slice(&self.hash_info_mut()?.hash[..size]);
                    }
                    AlgoClass::Mac => {
                        crate::mac::finalize(self)?;
                        out[..size].copy_from_slice(&self.mac_info_mut()?.mac[..size]);
                    }
                    _ => return Err(ErrorKind::NotAvailable.into()),
                }
                Ok(size)
            }
            AttributeId::KeyingSalt => {
                let (salt, salt_len) = match self.capability.algo.class() {
                    AlgoClass::Conv => {
                        let c = self.conv()?;
                        (&c.salt, c.salt_len)
                    }
                    AlgoClass::Mac => {
                        let m = self.mac_info()?;
                        (&m.salt, m.salt_len)
                    }
                    _ => return Err(ErrorKind::NotAvailable.into()),
                };
                if salt_len == 0 {
                    return Err(absent(id));
                }
                if out.len() < salt_len {
                    return Err(ErrorKind::Overflow.into());
                }
                out[..salt_len].copy_from_slice(&salt[..salt_len]);
                Ok(salt_len)
            }
            AttributeId::Iv => {
                let size = self.capability.block_size;
                if !self.flags.contains(ContextFlags::IV_SET) {
                    return Err(absent(id));
                }
                if out.len() < size {
                    return Err(ErrorKind::Overflow.into());
                }
                out[..size].copy_from_slice(&self.conv()?.iv[..size]);
                Ok(size)
            }
            AttributeId::Label => {
                if self.label_len == 0 {
                    return Err(absent(id));
                }
                if out.len() < self.label_len {
                    return Err(ErrorKind::Overflow.into());
                }
                out[..self.label_len].copy_from_slice(&self.label[..self.label_len]);
                Ok(self.label_len)
            }
            AttributeId::KeyId => {
                let pkc = self.pkc()?;
                if !pkc.key_id_set {
                    return Err(absent(id));
                }
                if out.len() < pkc.key_id.len() {
                    return Err(ErrorKind::Overflow.into());
                }
                out[..pkc.key_id.len()].copy_from_slice(&pkc.key_id);
                Ok(pkc.key_id.len())
            }
            AttributeId::PublicKeyInfo => {
                let pkc = self.pkc()?;
                if pkc.pub_key_blob.is_empty() {
                    return Err(absent(id));
                }
                if out.len() < pkc.pub_key_blob.len() {
                    return Err(ErrorKind::Overflow.into());
                }
                out[..pkc.pub_key_blob.len()].copy_from_slice(&pkc.pub_key_blob);
                Ok(pkc.pub_key_blob.len())
            }
            _ => Err(ErrorKind::NotAvailable.into()),
        }
    }

    /// Writes a scalar attribute.  Setup attributes are one-shot.
    pub fn set_attribute(&mut self, id: AttributeId, value: AttrValue) -> Result<()> {
        let result = self.set_attribute_inner(id, value);
        result.map_err(|e| self.latch_error(e))
    }

    fn set_attribute_inner(&mut self, id: AttributeId, value: AttrValue) -> Result<()> {
        match (id, value) {
            (AttributeId::Mode, AttrValue::Mode(mode)) => {
                if self.state != LifecycleState::Unkeyed {
                    return Err(one_shot(id));
                }
                let conv = self.conv_mut()?;
                if conv.mode_set {
                    return Err(one_shot(id));
                }
                conv.mode = mode;
                conv.mode_set = true;
                Ok(())
            }
            (AttributeId::KeySize, AttrValue::Size(size)) => {
                if self.state != LifecycleState::Unkeyed {
                    return Err(one_shot(id));
                }
                let get_info = self.capability.get_info.ok_or_else(|| int_error!())?;
                let size = get_info(self.capability, InfoQuery::KeySize(size))?;
                match self.capability.algo.class() {
                    AlgoClass::Conv => {
                        let c = self.conv_mut()?;
                        if c.key_size.is_some() {
                            return Err(one_shot(id));
                        }
                        c.key_size = Some(size);
                    }
                    AlgoClass::Mac => {
                        let m = self.mac_info_mut()?;
                        if m.key_size.is_some() {
                            return Err(one_shot(id));
                        }
                        m.key_size = Some(size);
                    }
                    AlgoClass::Pkc => {
                        let pkc = self.pkc_mut()?;
                        if pkc.key_size_bits != 0 {
                            return Err(one_shot(id));
                        }
                        pkc.key_size_bits = size * 8;
                    }
                    _ => return Err(ErrorKind::NotAvailable.into()),
                }
                Ok(())
            }
            (AttributeId::KeyingAlgo, AttrValue::Algo(algo)) => {
                if !matches!(algo, Algorithm::HmacSha1 | Algorithm::HmacSha2) {
                    return Err(wrong_value(id));
                }
                match self.kdf_setup()?.0 {
                    Some(_) => Err(one_shot(id)),
                    None => {
                        self.set_kdf_algo(algo)?;
                        Ok(())
                    }
                }
            }
            (AttributeId::KeyingIterations, AttrValue::Count(n)) => {
                if n == 0 || n > KDF_MAX_ITERATIONS {
                    return Err(wrong_value(id));
                }
                match self.kdf_setup()?.1 {
                    Some(_) => Err(one_shot(id)),
                    None => {
                        self.set_kdf_iterations(n)?;
                        Ok(())
                    }
                }
            }
            (AttributeId::Persistent, AttrValue::Flag(on)) => {
                if self.state != LifecycleState::Unkeyed {
                    return Err(one_shot(id));
                }
                self.flags.set(ContextFlags::PERSISTENT, on);
                Ok(())
            }
            (AttributeId::SideChannelProtection, AttrValue::Flag(on)) => {
                self.set_sidechannel_protection(on);
                Ok(())
            }
            _ => Err(ErrorKind::NotAvailable.into()),
        }
    }

    fn set_kdf_algo(&mut self, algo: Algorithm) -> Result<()> {
        match self.capability.algo.class() {
            AlgoClass::Conv => self.conv_mut()?.kdf_algo = Some(algo),
            AlgoClass::Mac => self.mac_info_mut()?.kdf_algo = Some(algo),
            _ => return Err(ErrorKind::NotAvailable.into()),
        }
        Ok(())
    }

    fn set_kdf_iterations(&mut self, n: u32) -> Result<()> {
        match self.capability.algo.class() {
            AlgoClass::Conv => self.conv_mut()?.kdf_iterations = Some(n),
            AlgoClass::Mac => self.mac_info_mut()?.kdf_iterations = Some(n),
            _ => return Err(ErrorKind::NotAvailable.into()),
        }
        Ok(())
    }

    /// Writes a byte-string attribute.  Writing the keying value
    /// derives and installs the key.
    pub fn set_attribute_bytes(&mut self, id: AttributeId, value: &[u8]) -> Result<()> {
        let result = self.set_attribute_bytes_inner(id, value);
        result.map_err(|e| self.latch_error(e))
    }

    fn set_attribute_bytes_inner(&mut self, id: AttributeId, value: &[u8]) -> Result<()> {
        match id {
            AttributeId::Key => self.load_key(value),
            AttributeId::Iv => self.load_iv(value),
            AttributeId::KeyingValue => self.derive_key(value),
            AttributeId::KeyingSalt => {
                if value.is_empty() || value.len() > MAX_HASHSIZE {
                    return Err(Error::new(ErrorKind::Argument)
                        .with_report(id, ErrorClass::AttributeSize));
                }
                let (salt, salt_len) = match self.capability.algo.class() {
                    AlgoClass::Conv => {
                        let c = self.conv_mut()?;
                        (&mut c.salt, &mut c.salt_len)
                    }
                    AlgoClass::Mac => {
                        let m = self.mac_info_mut()?;
                        (&mut m.salt, &mut m.salt_len)
                    }
                    _ => return Err(ErrorKind::NotAvailable.into()),
                };
                if *salt_len != 0 {
                    return Err(one_shot(id));
                }
                salt[..value.len()].copy_from_slice(value);
                *salt_len = value.len();
                Ok(())
            }
            AttributeId::Label => {
                if value.is_empty() || value.len() > MAX_TEXTSIZE {
                    return Err(Error::new(ErrorKind::Argument)
                        .with_report(id, ErrorClass::AttributeSize));
                }
                if self.label_len != 0 {
                    return Err(one_shot(id));
                }
                self.label[..value.len()].copy_from_slice(value);
                self.label_len = value.len();
                Ok(())
            }
            _ => Err(ErrorKind::NotAvailable.into()),
        }
    }

    /// Deletes a deletable attribute, zeroising its storage.  Deleting
    /// the hash value resets a finished hash or MAC for reuse.
    pub fn delete_attribute(&mut self, id: AttributeId) -> Result<()> {
        let result = self.delete_attribute_inner(id);
        result.map_err(|e| self.latch_error(e))
    }

    fn delete_attribute_inner(&mut self, id: AttributeId) -> Result<()> {
        match id {
            AttributeId::KeyingAlgo => {
                if self.kdf_setup()?.0.is_none() {
                    return Err(ErrorKind::NotFound.into());
                }
                match self.capability.algo.class() {
                    AlgoClass::Conv => self.conv_mut()?.kdf_algo = None,
                    AlgoClass::Mac => self.mac_info_mut()?.kdf_algo = None,
                    _ => return Err(ErrorKind::NotAvailable.into()),
                }
                Ok(())
            }
            AttributeId::KeyingIterations => {
                if self.kdf_setup()?.1.is_none() {
                    return Err(ErrorKind::NotFound.into());
                }
                match self.capability.algo.class() {
                    AlgoClass::Conv => self.conv_mut()?.kdf_iterations = None,
                    AlgoClass::Mac => self.mac_info_mut()?.kdf_iterations = None,
                    _ => return Err(ErrorKind::NotAvailable.into()),
                }
                Ok(())
            }
            AttributeId::KeyingSalt => {
                let (salt, salt_len) = match self.capability.algo.class() {
                    AlgoClass::Conv => {
                        let c = self.conv_mut()?;
                        (&mut c.salt, &mut c.salt_len)
                    }
                    AlgoClass::Mac => {
                        let m = self.mac_info_mut()?;
                        (&mut m.salt, &mut m.salt_len)
                    }
                    _ => return Err(ErrorKind::NotAvailable.into()),
                };
                if *salt_len == 0 {
                    return Err(ErrorKind::NotFound.into());
                }
                salt.zeroize();
                *salt_len = 0;
                Ok(())
            }
            AttributeId::Iv => {
                if !self.flags.contains(ContextFlags::IV_SET) {
                    return Err(ErrorKind::NotFound.into());
                }
                let conv = self.conv_mut()?;
                conv.iv.zeroize();
                conv.current_iv.zeroize();
                conv.iv_count = 0;
                self.flags.remove(ContextFlags::IV_SET);
                Ok(())
            }
            AttributeId::Label => {
                if self.label_len == 0 {
                    return Err(ErrorKind::NotFound.into());
                }
                self.label.zeroize();
                self.label_len = 0;
                Ok(())
            }
            AttributeId::HashValue => match self.capability.algo.class() {
                AlgoClass::Hash => {
                    if !matches!(
                        self.state,
                        LifecycleState::Hashing | LifecycleState::Finished
                    ) {
                        return Err(ErrorKind::NotFound.into());
                    }
                    crate::hash::reset(self)
                }
                AlgoClass::Mac => {
                    if !matches!(
                        self.state,
                        LifecycleState::Hashing | LifecycleState::Finished
                    ) {
                        return Err(ErrorKind::NotFound.into());
                    }
                    crate::mac::reset(self)
                }
                _ => Err(ErrorKind::NotAvailable.into()),
            },
            _ => Err(ErrorKind::NotAvailable.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_is_one_shot() {
        let mut ctx = ContextInfo::new(Algorithm::Aes).unwrap();
        ctx.set_attribute(AttributeId::Mode, AttrValue::Mode(CryptMode::Cfb))
            .unwrap();
        let err = ctx
            .set_attribute(AttributeId::Mode, AttrValue::Mode(CryptMode::Ecb))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inited);
        assert_eq!(
            ctx.get_attribute(AttributeId::Mode).unwrap(),
            AttrValue::Mode(CryptMode::Cfb)
        );
    }

    #[test]
    fn test_key_size_range_checked() {
        let mut ctx = ContextInfo::new(Algorithm::Aes).unwrap();
        assert!(ctx
            .set_attribute(AttributeId::KeySize, AttrValue::Size(64))
            .is_err());
        ctx.set_attribute(AttributeId::KeySize, AttrValue::Size(24))
            .unwrap();
        assert_eq!(
            ctx.get_attribute(AttributeId::KeySize).unwrap(),
            AttrValue::Size(24)
        );
    }

    #[test]
    fn test_block_size_is_one_for_stream_modes() {
        let mut ctx = ContextInfo::new(Algorithm::Aes).unwrap();
        ctx.set_attribute(AttributeId::Mode, AttrValue::Mode(CryptMode::Ofb))
            .unwrap();
        assert_eq!(
            ctx.get_attribute(AttributeId::BlockSize).unwrap(),
            AttrValue::Size(1)
        );
    }

    #[test]
    fn test_hash_value_read_finalises() {
        let mut ctx = ContextInfo::new(Algorithm::Sha1).unwrap();
        ctx.hash_data(b"abc").unwrap();
        let mut digest = [0u8; 20];
        assert_eq!(
            ctx.get_attribute_bytes(AttributeId::HashValue, &mut digest)
                .unwrap(),
            20
        );
        assert_eq!(ctx.lifecycle(), LifecycleState::Finished);
        assert_eq!(
            ctx.hash_data(b"more").unwrap_err().kind(),
            ErrorKind::Complete
        );
    }

    #[test]
    fn test_delete_hash_value_resets() {
        let mut ctx = ContextInfo::new(Algorithm::Sha2).unwrap();
        ctx.hash_data(b"abc").unwrap();
        let mut digest = [0u8; 32];
        ctx.get_attribute_bytes(AttributeId::HashValue, &mut digest)
            .unwrap();
        ctx.delete_attribute(AttributeId::HashValue).unwrap();
        assert_eq!(ctx.lifecycle(), LifecycleState::Unkeyed);
        ctx.hash_data(b"again").unwrap();
    }

    #[test]
    fn test_delete_missing_salt_not_found() {
        let mut ctx = ContextInfo::new(Algorithm::Aes).unwrap();
        assert_eq!(
            ctx.delete_attribute(AttributeId::KeyingSalt).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        ctx.set_attribute_bytes(AttributeId::KeyingSalt, b"salty!!!")
            .unwrap();
        ctx.delete_attribute(AttributeId::KeyingSalt).unwrap();
        assert_eq!(
            ctx.delete_attribute(AttributeId::KeyingSalt).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_error_report_latched_and_readable() {
        let mut ctx = ContextInfo::new(Algorithm::Aes).unwrap();
        assert_eq!(
            ctx.get_attribute(AttributeId::ErrorLocus).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        let _ = ctx.load_key(&[0u8; 3]).unwrap_err();
        assert_eq!(
            ctx.get_attribute(AttributeId::ErrorLocus).unwrap(),
            AttrValue::Locus(AttributeId::Key)
        );
        assert_eq!(
            ctx.get_attribute(AttributeId::ErrorType).unwrap(),
            AttrValue::Class(ErrorClass::AttributeSize)
        );
    }

    #[test]
    fn test_label_one_shot_and_delete() {
        let mut ctx = ContextInfo::new(Algorithm::HmacSha2).unwrap();
        ctx.set_attribute_bytes(AttributeId::Label, b"signing key")
            .unwrap();
        assert!(ctx
            .set_attribute_bytes(AttributeId::Label, b"other")
            .is_err());
        let mut buf = [0u8; 64];
        let len = ctx.get_attribute_bytes(AttributeId::Label, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"signing key");
        ctx.delete_attribute(AttributeId::Label).unwrap();
        ctx.set_attribute_bytes(AttributeId::Label, b"reused").unwrap();
    }

    #[test]
    fn test_keying_setup_drives_derivation() {
        let mut ctx = ContextInfo::new(Algorithm::Aes).unwrap();
        ctx.set_attribute(AttributeId::KeyingAlgo, AttrValue::Algo(Algorithm::HmacSha1))
            .unwrap();
        ctx.set_attribute(AttributeId::KeyingIterations, AttrValue::Count(50))
            .unwrap();
        ctx.set_attribute_bytes(AttributeId::KeyingSalt, b"12345678")
            .unwrap();
        ctx.set_attribute_bytes(AttributeId::KeyingValue, b"hunter2")
            .unwrap();
        assert_eq!(ctx.lifecycle(), LifecycleState::Keyed);
    }
}
