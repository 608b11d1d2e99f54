//! # cryptoctx: algorithm-agnostic cryptographic contexts
//!
//! A pure-Rust cryptographic context toolkit: every algorithm — block
//! ciphers, hashes, MACs and public-key schemes — is driven through
//! one polymorphic [`context::ContextInfo`] object whose behaviour is
//! defined entirely by a static [`capability::CapabilityInfo`] table.
//! A capability's operation slots say what the algorithm can do; a
//! missing slot *is* the statement that the operation is unsupported.
//!
//! Callers configure and query contexts through the attribute protocol
//! in [`attribute`], load or generate keys through [`keyload`], and
//! push data through the encrypt/decrypt/sign entry points on the
//! context itself.
//!
//! ```
//! use cryptoctx::capability::Algorithm;
//! use cryptoctx::context::ContextInfo;
//!
//! let mut ctx = ContextInfo::new(Algorithm::Aes).unwrap();
//! ctx.load_key(&[0x2b; 16]).unwrap();
//! ctx.load_iv(&[0x00; 16]).unwrap();
//! let mut block = *b"sixteen byte blk";
//! ctx.encrypt(&mut block).unwrap();
//! ```
//!
//! # Security notes
//!
//! The public-key paths carry the usual hardening — RSA blinding and a
//! CRT fault check, bias-free DLP nonces, key-data checksums verified
//! before every private-key operation — but the big-number arithmetic
//! is not constant-time except where noted.  Run
//! [`selftest::self_test_all`] at startup to catch a miscompiled or
//! faulted build.

#![warn(missing_docs)]

#[macro_use]
pub mod error;

mod conv;
mod dh;
mod dlp;
mod dsa;
mod ecc;
mod ecdh;
mod ecdsa;
mod elgamal;
mod generic;
mod hash;
mod mac;
mod rsa;

/// The context attribute protocol
pub mod attribute;
/// Fixed-capacity big-number arithmetic
pub mod bignum;
/// Capability tables and the algorithm registry
pub mod capability;
/// Constant value definitions
pub mod constants;
/// The context object and its dispatch layer
pub mod context;
/// Key loading, generation and derivation
pub mod keyload;
/// Random number generation utilities
pub mod rng;
/// The whole-library self-test harness
pub mod selftest;
/// Small shared helpers
pub mod utils;

pub use crate::capability::Algorithm;
pub use crate::context::ContextInfo;
pub use crate::error::{Error, ErrorKind, Result};
