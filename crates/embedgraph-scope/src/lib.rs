//! Hierarchical name and device scopes for graph construction.
//!
//! Provides [`ScopeContext`], which carries two independently stacked values
//! for a graph-construction session:
//!
//! - a **name prefix** (`"tower/lookup/"`) applied to every blob name reserved
//!   while the scope is active, and
//! - an optional **device placement** stamped onto every operator created
//!   while the scope is active.
//!
//! Scopes are acquired through RAII guards ([`NameScopeGuard`],
//! [`DeviceScopeGuard`]) or the closure forms
//! [`ScopeContext::with_name_scope`] / [`ScopeContext::with_device_scope`].
//! Release verifies that nothing outside the scope changed the value it
//! pushed; tampering is reported as `GraphError::InvariantViolation`.
//!
//! # Example
//!
//! ```
//! use embedgraph_common::DeviceSpec;
//! use embedgraph_scope::ScopeContext;
//!
//! let ctx = ScopeContext::new();
//! let tower = ctx.enter_name_scope("tower", false)?;
//! let gpu = ctx.enter_device_scope(DeviceSpec::cuda(0));
//! assert_eq!(ctx.scoped_name("w"), "tower/w");
//! assert_eq!(ctx.current_device_scope(), Some(DeviceSpec::cuda(0)));
//! gpu.release()?;
//! tower.release()?;
//! assert_eq!(ctx.current_name_scope(), "");
//! # Ok::<(), embedgraph_common::GraphError>(())
//! ```

mod context;
mod guard;

pub use context::ScopeContext;
pub use guard::{DeviceScopeGuard, NameScopeGuard};
