//! Sparse embedding lookup layers.
//!
//! A [`SparseLookup`] turns an id-list feature into an embedding table plus
//! the operators that look rows up and reduce them per segment. Naming and
//! device placement follow the [`ScopeContext`](embedgraph_scope::ScopeContext)
//! shared with the [`ModelBuilder`].
//!
//! ```
//! use embedgraph_common::{BuilderConfig, DeviceSpec};
//! use embedgraph_layers::{IdList, Metadata, ModelBuilder, Reducer, SparseLookup};
//!
//! # fn main() -> embedgraph_common::Result<()> {
//! let mut model = ModelBuilder::new(BuilderConfig::default());
//! let scope = model.scope().clone();
//!
//! let input = IdList::new("user/lengths", "user/items")
//!     .with_item_metadata(Metadata::categorical(1000));
//!
//! let layer = scope.with_name_scope("user", false, || {
//!     let _gpu = scope.enter_device_scope(DeviceSpec::cuda(0));
//!     SparseLookup::new(&mut model, input.into(), 16_usize, Reducer::Sum)
//! })?;
//! model.add_layer(&layer)?;
//!
//! assert_eq!(layer.weight().as_str(), "user/sparse_lookup_w");
//! assert_eq!(layer.memory_usage(), 64_000);
//! assert_eq!(model.net().len(), 1);
//! # Ok(())
//! # }
//! ```

mod model;
mod parameter;
mod reducer;
mod schema;
mod sparse_lookup;

pub use model::{ModelBuilder, ModelLayer};
pub use parameter::{
    Initializer, LayerParameter, Optimizer, OptimizerHandle, ParameterRegistry, ParameterStore,
    PsParam,
};
pub use reducer::{LookupOperands, LookupStrategy, Reducer, plan};
pub use schema::{
    DataType, FeatureSpec, IdList, IdScoreList, InputRecord, InputShapeKind, Metadata, Record,
    Scalar,
};
pub use sparse_lookup::{InnerShape, SparseLookup, SparseLookupBuilder, SparseLookupConfig};
