//! RAII guards returned by scope acquisition.
//!
//! A guard restores the previous scope value exactly once, either through an
//! explicit [`release`](NameScopeGuard::release), which reports tampering as
//! an error, or on drop. A drop that detects tampering aborts the build with
//! a panic; while already unwinding it only logs, leaving the state as found.

use embedgraph_common::{DeviceSpec, Result};
use tracing::error;

use crate::context::ScopeContext;

/// Active name scope. Restores the previous prefix when released.
#[derive(Debug)]
#[must_use = "dropping the guard immediately leaves the name scope"]
pub struct NameScopeGuard {
    ctx: ScopeContext,
    pushed: String,
    previous: Option<String>,
}

impl NameScopeGuard {
    pub(crate) fn new(ctx: ScopeContext, pushed: String, previous: String) -> Self {
        Self { ctx, pushed, previous: Some(previous) }
    }

    /// The suffix this scope appended (`"prefix/"`, or empty).
    pub fn pushed(&self) -> &str {
        &self.pushed
    }

    /// Leave the scope, reporting an `InvariantViolation` if the active
    /// prefix no longer ends with the pushed value.
    pub fn release(mut self) -> Result<()> {
        self.restore()
    }

    fn restore(&mut self) -> Result<()> {
        match self.previous.take() {
            Some(previous) => self.ctx.restore_name(&self.pushed, previous),
            None => Ok(()),
        }
    }
}

impl Drop for NameScopeGuard {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            error!(%err, "name scope released out of order");
            if !std::thread::panicking() {
                panic!("{err}");
            }
        }
    }
}

/// Active device scope. Restores the previous placement when released.
#[derive(Debug)]
#[must_use = "dropping the guard immediately leaves the device scope"]
pub struct DeviceScopeGuard {
    ctx: ScopeContext,
    pushed: DeviceSpec,
    previous: Option<Option<DeviceSpec>>,
}

impl DeviceScopeGuard {
    pub(crate) fn new(ctx: ScopeContext, pushed: DeviceSpec, previous: Option<DeviceSpec>) -> Self {
        Self { ctx, pushed, previous: Some(previous) }
    }

    /// The placement this scope made active.
    pub fn pushed(&self) -> DeviceSpec {
        self.pushed
    }

    /// Leave the scope, reporting an `InvariantViolation` if another
    /// placement is active.
    pub fn release(mut self) -> Result<()> {
        self.restore()
    }

    fn restore(&mut self) -> Result<()> {
        match self.previous.take() {
            Some(previous) => self.ctx.restore_device(self.pushed, previous),
            None => Ok(()),
        }
    }
}

impl Drop for DeviceScopeGuard {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            error!(%err, "device scope released out of order");
            if !std::thread::panicking() {
                panic!("{err}");
            }
        }
    }
}
