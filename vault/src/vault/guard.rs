//! Per-vault reentrancy lock.
//!
//! Mutating entry points hold a [`ReentrancyGuard`] for their whole body,
//! including every external call they make. Read-only entry points call
//! [`ensure_unlocked`], which checks the flag without setting it: views may
//! run from nested frames, but never while a mutation is in flight further
//! up the same call stack.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::VaultError;

/// Holds a vault's lock flag until dropped.
#[derive(Debug)]
pub(crate) struct ReentrancyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ReentrancyGuard<'a> {
    /// Sets the flag.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::ReentrancyDetected`] if it was already set.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Result<Self, VaultError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| VaultError::ReentrancyDetected)?;
        Ok(Self { flag })
    }
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Fails if a mutation currently holds the flag.
pub(crate) fn ensure_unlocked(flag: &AtomicBool) -> Result<(), VaultError> {
    if flag.load(Ordering::Acquire) {
        return Err(VaultError::ReentrancyDetected);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let flag = AtomicBool::new(false);
        let guard = ReentrancyGuard::acquire(&flag).unwrap();
        assert!(matches!(
            ReentrancyGuard::acquire(&flag),
            Err(VaultError::ReentrancyDetected)
        ));
        assert!(ensure_unlocked(&flag).is_err());

        drop(guard);
        assert!(ensure_unlocked(&flag).is_ok());
        assert!(ReentrancyGuard::acquire(&flag).is_ok());
    }
}
