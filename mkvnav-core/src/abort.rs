// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cooperative cancellation of long running scans.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{cancelled_error, Result};

/// A cloneable flag that long running operations (segment preloading, index building, seeking)
/// poll between elements. Once aborted, those operations return [`Error::Cancelled`].
///
/// [`Error::Cancelled`]: crate::errors::Error::Cancelled
#[derive(Clone, Debug, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Default::default()
    }

    /// Request all operations sharing this handle to stop.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Clear a previous abort request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Returns a cancellation error if an abort was requested.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            return cancelled_error();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::AbortHandle;
    use crate::errors::Error;

    #[test]
    fn verify_abort_is_shared_between_clones() {
        let handle = AbortHandle::new();
        let other = handle.clone();

        assert!(handle.check().is_ok());
        other.abort();
        assert!(handle.is_aborted());
        assert!(matches!(handle.check(), Err(Error::Cancelled)));

        handle.reset();
        assert!(other.check().is_ok());
    }
}
