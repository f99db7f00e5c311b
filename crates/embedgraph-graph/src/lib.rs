//! Operator descriptors and a scope-aware graph builder.
//!
//! - [`BlobRef`]: name of a tensor slot.
//! - [`OperatorDef`] / [`OpType`]: one operator and its closed set of types.
//! - [`NetBuilder`]: appends operators in order, reserves unique scoped blob
//!   names and stamps the active device scope onto new operators.

mod blob;
mod net;
mod operator;

pub use blob::BlobRef;
pub use net::NetBuilder;
pub use operator::{Argument, OpType, OperatorDef, RangeReduction, create_operator};
