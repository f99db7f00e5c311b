//! Scope state and the [`ScopeContext`] handle.

use std::cell::RefCell;
use std::rc::Rc;

use embedgraph_common::{DeviceSpec, GraphError, NAMESCOPE_SEPARATOR, Result, ScopeKind};
use tracing::trace;

use crate::guard::{DeviceScopeGuard, NameScopeGuard};

/// The two independently stacked values. Only the top of each stack is
/// materialised; guards carry the values to restore.
#[derive(Debug, Default)]
pub(crate) struct ScopeState {
    pub(crate) name: String,
    pub(crate) device: Option<DeviceSpec>,
}

thread_local! {
    static THREAD_DEFAULT: ScopeContext = ScopeContext::new();
}

/// Naming and device-placement context for one graph-construction session.
///
/// Cloning yields another handle onto the same state; contexts created with
/// [`ScopeContext::new`] are isolated from each other. The handle is `!Send`:
/// a session's scope stack never leaves the thread that builds the graph.
#[derive(Debug, Clone, Default)]
pub struct ScopeContext {
    state: Rc<RefCell<ScopeState>>,
}

impl ScopeContext {
    /// Create a fresh context with an empty name scope and no device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to this thread's lazily created default context.
    pub fn thread_default() -> Self {
        THREAD_DEFAULT.with(Clone::clone)
    }

    /// Whether both handles refer to the same underlying state.
    pub fn same_context(&self, other: &ScopeContext) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Active name prefix; empty when no name scope is active.
    pub fn current_name_scope(&self) -> String {
        self.state.borrow().name.clone()
    }

    /// Active device placement, if any.
    pub fn current_device_scope(&self) -> Option<DeviceSpec> {
        self.state.borrow().device
    }

    /// `base` prefixed with the active name scope.
    pub fn scoped_name(&self, base: &str) -> String {
        let state = self.state.borrow();
        let mut name = String::with_capacity(state.name.len() + base.len());
        name.push_str(&state.name);
        name.push_str(base);
        name
    }

    /// Push a name scope.
    ///
    /// A non-empty `prefix` is pushed as `prefix/`. With `reset` the pushed
    /// value replaces the active prefix instead of extending it. The returned
    /// guard restores the previous prefix when released or dropped.
    pub fn enter_name_scope(&self, prefix: &str, reset: bool) -> Result<NameScopeGuard> {
        validate_prefix(prefix)?;

        let pushed =
            if prefix.is_empty() { String::new() } else { format!("{prefix}{NAMESCOPE_SEPARATOR}") };

        let previous = {
            let mut state = self.state.borrow_mut();
            let previous = state.name.clone();
            if reset {
                state.name = pushed.clone();
            } else {
                state.name.push_str(&pushed);
            }
            trace!(scope = %state.name, reset, "entered name scope");
            previous
        };

        Ok(NameScopeGuard::new(self.clone(), pushed, previous))
    }

    /// Push a device placement. The returned guard restores the previous
    /// placement when released or dropped.
    pub fn enter_device_scope(&self, spec: DeviceSpec) -> DeviceScopeGuard {
        let previous = self.state.borrow_mut().device.replace(spec);
        trace!(device = %spec, "entered device scope");
        DeviceScopeGuard::new(self.clone(), spec, previous)
    }

    /// Run `f` inside a name scope.
    ///
    /// The scope is released on every exit path of `f`; a release failure
    /// takes precedence over the result of `f`.
    pub fn with_name_scope<T>(
        &self,
        prefix: &str,
        reset: bool,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let guard = self.enter_name_scope(prefix, reset)?;
        let result = f();
        guard.release()?;
        result
    }

    /// Run `f` inside a device scope; same release semantics as
    /// [`ScopeContext::with_name_scope`].
    pub fn with_device_scope<T>(
        &self,
        spec: DeviceSpec,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let guard = self.enter_device_scope(spec);
        let result = f();
        guard.release()?;
        result
    }

    /// Pop a name scope, verifying that the active prefix still ends with the
    /// value pushed on entry. On violation the state is left untouched.
    pub(crate) fn restore_name(&self, pushed: &str, previous: String) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.name.ends_with(pushed) {
            return Err(GraphError::InvariantViolation {
                kind: ScopeKind::Name,
                expected: pushed.to_string(),
                found: state.name.clone(),
            });
        }
        trace!(from = %state.name, to = %previous, "left name scope");
        state.name = previous;
        Ok(())
    }

    /// Pop a device scope, verifying the active placement is the pushed one.
    pub(crate) fn restore_device(
        &self,
        pushed: DeviceSpec,
        previous: Option<DeviceSpec>,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.device != Some(pushed) {
            return Err(GraphError::InvariantViolation {
                kind: ScopeKind::Device,
                expected: pushed.to_string(),
                found: state.device.map_or_else(|| "none".to_string(), |d| d.to_string()),
            });
        }
        trace!(from = %pushed, "left device scope");
        state.device = previous;
        Ok(())
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Ok(());
    }
    if prefix.split(NAMESCOPE_SEPARATOR).any(str::is_empty) {
        return Err(GraphError::invalid_argument(format!(
            "name scope '{prefix}' has an empty component around '{NAMESCOPE_SEPARATOR}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_empty() {
        let ctx = ScopeContext::new();
        assert_eq!(ctx.current_name_scope(), "");
        assert_eq!(ctx.current_device_scope(), None);
        assert_eq!(ctx.scoped_name("w"), "w");
    }

    #[test]
    fn nested_name_scopes_compose() {
        let ctx = ScopeContext::new();
        let outer = ctx.enter_name_scope("tower", false).unwrap();
        let inner = ctx.enter_name_scope("lookup", false).unwrap();
        assert_eq!(ctx.current_name_scope(), "tower/lookup/");
        assert_eq!(ctx.scoped_name("w"), "tower/lookup/w");
        inner.release().unwrap();
        assert_eq!(ctx.current_name_scope(), "tower/");
        outer.release().unwrap();
        assert_eq!(ctx.current_name_scope(), "");
    }

    #[test]
    fn reset_ignores_current_prefix() {
        let ctx = ScopeContext::new();
        let _outer = ctx.enter_name_scope("tower", false).unwrap();
        {
            let _inner = ctx.enter_name_scope("shared", true).unwrap();
            assert_eq!(ctx.current_name_scope(), "shared/");
        }
        assert_eq!(ctx.current_name_scope(), "tower/");
    }

    #[test]
    fn empty_prefix_pushes_nothing() {
        let ctx = ScopeContext::new();
        let _outer = ctx.enter_name_scope("a", false).unwrap();
        let inner = ctx.enter_name_scope("", false).unwrap();
        assert_eq!(ctx.current_name_scope(), "a/");
        inner.release().unwrap();

        let reset = ctx.enter_name_scope("", true).unwrap();
        assert_eq!(ctx.current_name_scope(), "");
        reset.release().unwrap();
        assert_eq!(ctx.current_name_scope(), "a/");
    }

    #[test]
    fn interior_separator_is_allowed() {
        let ctx = ScopeContext::new();
        let _g = ctx.enter_name_scope("a/b", false).unwrap();
        assert_eq!(ctx.current_name_scope(), "a/b/");
    }

    #[test]
    fn malformed_prefixes_are_rejected() {
        let ctx = ScopeContext::new();
        for bad in ["/a", "a/", "a//b", "/"] {
            let err = ctx.enter_name_scope(bad, false).unwrap_err();
            assert!(matches!(err, GraphError::InvalidArgument(_)), "{bad}: {err}");
        }
        assert_eq!(ctx.current_name_scope(), "");
    }

    #[test]
    fn device_scope_nests_and_restores() {
        let ctx = ScopeContext::new();
        let gpu = ctx.enter_device_scope(DeviceSpec::cuda(1));
        {
            let _cpu = ctx.enter_device_scope(DeviceSpec::cpu());
            assert_eq!(ctx.current_device_scope(), Some(DeviceSpec::cpu()));
        }
        assert_eq!(ctx.current_device_scope(), Some(DeviceSpec::cuda(1)));
        gpu.release().unwrap();
        assert_eq!(ctx.current_device_scope(), None);
    }

    #[test]
    fn name_and_device_stacks_are_independent() {
        let ctx = ScopeContext::new();
        let name = ctx.enter_name_scope("x", false).unwrap();
        let device = ctx.enter_device_scope(DeviceSpec::cuda(0));
        name.release().unwrap();
        assert_eq!(ctx.current_device_scope(), Some(DeviceSpec::cuda(0)));
        device.release().unwrap();
    }

    #[test]
    fn clones_share_state_and_new_contexts_do_not() {
        let ctx = ScopeContext::new();
        let alias = ctx.clone();
        let other = ScopeContext::new();
        let _g = ctx.enter_name_scope("shared", false).unwrap();

        assert!(ctx.same_context(&alias));
        assert!(!ctx.same_context(&other));
        assert_eq!(alias.current_name_scope(), "shared/");
        assert_eq!(other.current_name_scope(), "");
    }

    #[test]
    fn thread_default_is_per_thread() {
        let here = ScopeContext::thread_default();
        assert!(here.same_context(&ScopeContext::thread_default()));
        let _g = here.enter_name_scope("main_thread", false).unwrap();

        let seen = std::thread::spawn(|| ScopeContext::thread_default().current_name_scope())
            .join()
            .unwrap();
        assert_eq!(seen, "");
        assert_eq!(ScopeContext::thread_default().current_name_scope(), "main_thread/");
    }
}
