//! Whole-library self-test harness.
//!
//! Every registered capability carries its own known-answer self-test;
//! this module just walks the registry and runs them all, reporting
//! the first failure with the algorithm that caused it.

use crate::capability::registered_capabilities;
use crate::error::Result;

/// Runs every registered capability's known-answer self-test.  The
/// public-key tests generate and exercise real keys, so a full run
/// takes a noticeable fraction of a second.
pub fn self_test_all() -> Result<()> {
    for cap in registered_capabilities()? {
        if let Some(test) = cap.self_test {
            test()?;
        }
    }
    Ok(())
}
