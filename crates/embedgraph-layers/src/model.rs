//! Model builder: the graph, its parameters and the scope they are named in.

use std::collections::HashSet;

use embedgraph_common::{BuilderConfig, Result};
use embedgraph_graph::{BlobRef, NetBuilder, OperatorDef};
use embedgraph_scope::ScopeContext;
use tracing::debug;

use crate::parameter::{LayerParameter, ParameterRegistry, ParameterStore};
use crate::schema::Scalar;

/// A layer that can append its operators to a graph.
pub trait ModelLayer {
    fn name(&self) -> &str;

    /// Output record exposed to downstream layers.
    fn output_schema(&self) -> &Scalar;

    /// Append the layer's compute operators to `net`.
    fn emit_ops(&self, net: &mut NetBuilder) -> Result<()>;

    /// Bytes needed by the layer's dense parameters.
    fn memory_usage(&self) -> u64;

    /// Parameters that may be stored at reduced precision.
    fn fp16_compatible_parameters(&self) -> Vec<BlobRef>;
}

/// Owns the training graph and parameter registry layers are built against.
#[derive(Debug)]
pub struct ModelBuilder {
    config: BuilderConfig,
    scope: ScopeContext,
    net: NetBuilder,
    params: ParameterStore,
    layer_names: HashSet<String>,
}

impl ModelBuilder {
    /// A builder with a fresh, private scope context.
    pub fn new(config: BuilderConfig) -> Self {
        Self::with_scope(config, ScopeContext::new())
    }

    /// A builder sharing `scope` with the caller, so scopes the caller
    /// enters apply to every layer built here.
    pub fn with_scope(config: BuilderConfig, scope: ScopeContext) -> Self {
        let net = NetBuilder::new(config.net_name.clone(), scope.clone());
        debug!(net = %config.net_name, request_only = config.request_only, "created model builder");
        Self { config, scope, net, params: ParameterStore::new(), layer_names: HashSet::new() }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn scope(&self) -> &ScopeContext {
        &self.scope
    }

    pub fn net(&self) -> &NetBuilder {
        &self.net
    }

    pub fn net_mut(&mut self) -> &mut NetBuilder {
        &mut self.net
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn request_only(&self) -> bool {
        self.config.request_only
    }

    /// Reserve a unique layer name under the active name scope. Repeated
    /// names get `_auto_0`, `_auto_1`, ... appended.
    pub fn next_layer_name(&mut self, prefix: &str) -> String {
        let base = self.scope.scoped_name(prefix);
        let mut name = base.clone();
        let mut index = 0;
        while self.layer_names.contains(&name) {
            name = format!("{base}_auto_{index}");
            index += 1;
        }
        self.layer_names.insert(name.clone());
        name
    }

    /// Reserve a unique blob name under the active name scope.
    pub fn next_scoped_blob(&mut self, base: &str) -> BlobRef {
        self.net.next_scoped_blob(base)
    }

    pub fn register_parameter(&mut self, param: LayerParameter) -> Result<()> {
        debug!(
            parameter = %param.parameter,
            shape = ?param.shape,
            sharded = param.ps_param.is_some(),
            "registered parameter"
        );
        self.params.register(param)
    }

    /// Append `layer`'s operators to the model's graph.
    pub fn add_layer(&mut self, layer: &dyn ModelLayer) -> Result<()> {
        layer.emit_ops(&mut self.net)
    }

    /// Initialiser operators, in parameter registration order.
    pub fn init_ops(&self) -> impl Iterator<Item = &OperatorDef> {
        self.params.init_ops()
    }

    pub fn into_parts(self) -> (NetBuilder, ParameterStore) {
        (self.net, self.params)
    }
}
