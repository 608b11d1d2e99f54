//! The generic-secret container "algorithm".
//!
//! A generic-secret context performs no crypto itself; it holds an
//! opaque master secret plus the parameter blobs a composite mechanism
//! (encrypt-then-MAC key bundles and the like) needs to split it into
//! per-purpose keys.

use crate::capability::{
    get_default_info, Algorithm, CapabilityInfo, KeyPayload, EMPTY_CAPABILITY,
};
use crate::constants::{MAX_KEYSIZE, MIN_GENERIC_SECRET};
use crate::context::ContextInfo;
use crate::error::{ErrorKind, Result};

fn init_key(ctx: &mut ContextInfo, payload: KeyPayload<'_>) -> Result<()> {
    let secret = match payload {
        KeyPayload::Bytes(secret) => secret,
        _ => return Err(ErrorKind::Argument.into()),
    };
    let info = ctx.generic_mut()?;
    info.secret[..secret.len()].copy_from_slice(secret);
    info.secret_len = secret.len();
    Ok(())
}

fn self_test() -> Result<()> {
    // No transform to test; verify the container stores and gates.
    let mut ctx = ContextInfo::with_capability(&GENERIC_SECRET_CAPABILITY)?;
    let secret = [0x5au8; 32];
    ctx.load_key(&secret)?;
    let info = ctx.generic_mut()?;
    if info.secret_len != secret.len() || info.secret[..32] != secret {
        return Err(ErrorKind::Failed.into());
    }
    Ok(())
}

/// Generic-secret capability.
pub static GENERIC_SECRET_CAPABILITY: CapabilityInfo = CapabilityInfo {
    algo: Algorithm::GenericSecret,
    name: "Generic secret",
    block_size: 0,
    min_key_size: MIN_GENERIC_SECRET,
    key_size: 32,
    max_key_size: MAX_KEYSIZE,
    self_test: Some(self_test),
    get_info: Some(get_default_info),
    init_key: Some(init_key),
    ..EMPTY_CAPABILITY
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LifecycleState;

    #[test]
    fn test_store_and_gate() {
        self_test().unwrap();
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut ctx = ContextInfo::new(Algorithm::GenericSecret).unwrap();
        assert!(ctx.load_key(&[0u8; 8]).is_err());
    }

    #[test]
    fn test_no_data_operations() {
        let mut ctx = ContextInfo::new(Algorithm::GenericSecret).unwrap();
        ctx.load_key(&[0x11u8; 16]).unwrap();
        assert_eq!(ctx.lifecycle(), LifecycleState::Keyed);
        let mut buf = [0u8; 16];
        assert!(ctx.encrypt(&mut buf).is_err());
    }
}
