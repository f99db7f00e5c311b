//! Sparse embedding lookup layer.
//!
//! Construction validates the input's id metadata, sizes the embedding table
//! as `[categorical_limit] ++ inner_shape`, reserves scoped blob names and
//! registers the table (plus a positional weight vector for
//! [`Reducer::PositionWeighted`]). [`SparseLookup::emit_ops`] later appends
//! the reducer's operator sequence to a graph.

use std::fmt;

use embedgraph_common::{GraphError, Result};
use embedgraph_graph::{BlobRef, NetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::model::{ModelBuilder, ModelLayer};
use crate::parameter::{Initializer, LayerParameter, OptimizerHandle, PsParam};
use crate::reducer::{LookupOperands, LookupStrategy, Reducer};
use crate::schema::{DataType, InputRecord, Metadata, Scalar};

/// Bytes per table element; tables are sized as dense `f32`.
const ELEMENT_BYTES: u64 = 4;

// ── Inner shape ─────────────────────────────────────────────────────────────

/// Per-entry embedding shape: a single width or a non-empty list of
/// positive dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "InnerShapeRepr", into = "Vec<usize>")]
pub struct InnerShape(Vec<usize>);

#[derive(Deserialize)]
#[serde(untagged)]
enum InnerShapeRepr {
    Width(usize),
    Dims(Vec<usize>),
}

impl From<InnerShapeRepr> for InnerShape {
    fn from(value: InnerShapeRepr) -> Self {
        match value {
            InnerShapeRepr::Width(width) => Self(vec![width]),
            InnerShapeRepr::Dims(dims) => Self(dims),
        }
    }
}

impl From<InnerShape> for Vec<usize> {
    fn from(value: InnerShape) -> Self {
        value.0
    }
}

impl InnerShape {
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(GraphError::invalid_argument("inner_shape must not be empty"));
        }
        if self.0.contains(&0) {
            return Err(GraphError::invalid_argument(format!(
                "inner_shape dimensions must be positive, got {:?}",
                self.0
            )));
        }
        Ok(())
    }
}

impl From<usize> for InnerShape {
    fn from(width: usize) -> Self {
        Self(vec![width])
    }
}

impl From<Vec<usize>> for InnerShape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for InnerShape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for InnerShape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

// ── Declarative description ─────────────────────────────────────────────────

/// Serializable description of a lookup layer, e.g. from a model config:
///
/// ```toml
/// inner_shape = 16
/// reducer = "PositionWeighted"
/// name = "user_ids"
/// weight_init = { type = "gaussian", mean = 0.0, std = 0.01 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseLookupConfig {
    pub inner_shape: InnerShape,
    pub reducer: Reducer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_init: Option<Initializer>,
}

// ── Builder ─────────────────────────────────────────────────────────────────

/// Optional construction arguments for [`SparseLookup`].
#[derive(Debug)]
pub struct SparseLookupBuilder {
    input_record: InputRecord,
    inner_shape: InnerShape,
    reducer: Reducer,
    weight_init: Option<Initializer>,
    weight_optim: Option<OptimizerHandle>,
    name: Option<String>,
}

impl SparseLookupBuilder {
    #[must_use]
    pub fn weight_init(mut self, init: Initializer) -> Self {
        self.weight_init = Some(init);
        self
    }

    #[must_use]
    pub fn weight_optim(mut self, optim: OptimizerHandle) -> Self {
        self.weight_optim = Some(optim);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn build(self, model: &mut ModelBuilder) -> Result<SparseLookup> {
        SparseLookup::construct(model, self)
    }
}

// ── Layer ───────────────────────────────────────────────────────────────────

/// Embedding lookup over a sparse categorical input.
#[derive(Debug, Clone)]
pub struct SparseLookup {
    name: String,
    input_record: InputRecord,
    reducer: Reducer,
    shape: Vec<usize>,
    output_schema: Scalar,
    weight: BlobRef,
    positional_weight: Option<BlobRef>,
    params: Vec<LayerParameter>,
    engine: String,
}

impl SparseLookup {
    /// Build a lookup with default initializer, no optimizer and the
    /// configured default name.
    pub fn new(
        model: &mut ModelBuilder,
        input_record: InputRecord,
        inner_shape: impl Into<InnerShape>,
        reducer: Reducer,
    ) -> Result<Self> {
        Self::builder(input_record, inner_shape, reducer).build(model)
    }

    pub fn builder(
        input_record: InputRecord,
        inner_shape: impl Into<InnerShape>,
        reducer: Reducer,
    ) -> SparseLookupBuilder {
        SparseLookupBuilder {
            input_record,
            inner_shape: inner_shape.into(),
            reducer,
            weight_init: None,
            weight_optim: None,
            name: None,
        }
    }

    /// Build from a declarative description.
    pub fn from_config(
        model: &mut ModelBuilder,
        input_record: InputRecord,
        config: SparseLookupConfig,
    ) -> Result<Self> {
        let mut builder = Self::builder(input_record, config.inner_shape, config.reducer);
        builder.weight_init = config.weight_init;
        builder.name = config.name;
        builder.build(model)
    }

    fn construct(model: &mut ModelBuilder, args: SparseLookupBuilder) -> Result<Self> {
        let SparseLookupBuilder {
            input_record,
            inner_shape,
            reducer,
            weight_init,
            weight_optim,
            name,
        } = args;

        let base_name = name.unwrap_or_else(|| model.config().default_layer_name.clone());
        if base_name.is_empty() {
            return Err(GraphError::invalid_argument("layer name must not be empty"));
        }
        inner_shape.validate()?;
        let vocab = vocabulary_size(&input_record)?;
        let weight_init = weight_init.unwrap_or_else(|| Initializer::default_for_embedding(vocab));
        weight_init.validate()?;

        let layer_name = model.next_layer_name(&base_name);
        let request_only = model.request_only() || input_record.is_request_only();

        let mut shape = Vec::with_capacity(inner_shape.dims().len() + 1);
        shape.push(vocab);
        shape.extend_from_slice(inner_shape.dims());

        let output_blob = model.next_scoped_blob(&format!("{base_name}_output"));
        let mut output_schema =
            Scalar::new(DataType::Float32, output_blob).with_shape(inner_shape.dims().to_vec());
        if request_only {
            output_schema = output_schema.with_metadata(Metadata::request_only());
        }

        let weight = model.next_scoped_blob(&format!("{base_name}_w"));
        let average_length = input_record.lengths().metadata.as_ref().and_then(|m| m.expected_value);
        let mut params = vec![LayerParameter {
            parameter: weight.clone(),
            shape: shape.clone(),
            initializer: weight_init.fill_op(model.scope(), &weight, &shape),
            optimizer: weight_optim.clone(),
            ps_param: Some(PsParam {
                sparse_key: input_record.ids().blob.clone(),
                average_length,
            }),
        }];

        let positional_weight = if reducer == Reducer::PositionWeighted {
            let pos_w = model.next_scoped_blob(&format!("{base_name}_pos_w"));
            let pos_shape = vec![vocab];
            params.push(LayerParameter {
                parameter: pos_w.clone(),
                initializer: Initializer::Constant { value: 1.0 }.fill_op(
                    model.scope(),
                    &pos_w,
                    &pos_shape,
                ),
                shape: pos_shape,
                optimizer: weight_optim,
                ps_param: None,
            });
            Some(pos_w)
        } else {
            None
        };

        for param in &params {
            model.register_parameter(param.clone())?;
        }

        debug!(
            layer = %layer_name,
            reducer = %reducer,
            input = %input_record.kind(),
            shape = ?shape,
            request_only,
            "constructed sparse lookup"
        );

        Ok(Self {
            name: layer_name,
            input_record,
            reducer,
            shape,
            output_schema,
            weight,
            positional_weight,
            params,
            engine: model.config().lookup_engine.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reducer(&self) -> Reducer {
        self.reducer
    }

    /// `[categorical_limit] ++ inner_shape`.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Parameters registered by this layer, table first.
    pub fn params(&self) -> &[LayerParameter] {
        &self.params
    }

    pub fn output_schema(&self) -> &Scalar {
        &self.output_schema
    }

    pub fn input_record(&self) -> &InputRecord {
        &self.input_record
    }

    /// The embedding table.
    pub fn weight(&self) -> &BlobRef {
        &self.weight
    }

    /// Per-position weights; only set for `PositionWeighted`.
    pub fn positional_weight(&self) -> Option<&BlobRef> {
        self.positional_weight.as_ref()
    }

    /// Dense table size in bytes. Counts every row whether or not it is ever
    /// looked up.
    pub fn memory_usage(&self) -> u64 {
        self.shape
            .iter()
            .fold(ELEMENT_BYTES, |acc, &dim| acc.saturating_mul(dim as u64))
    }

    /// Parameters that may be stored at reduced precision: the table only.
    pub fn fp16_compatible_parameters(&self) -> Vec<BlobRef> {
        vec![self.weight.clone()]
    }

    /// Append the reducer's operators to `net`.
    #[instrument(level = "debug", skip_all, fields(layer = %self.name, reducer = %self.reducer))]
    pub fn emit_ops(&self, net: &mut NetBuilder) -> Result<()> {
        let strategy = LookupStrategy::select(self.input_record.kind(), self.reducer)?;
        let operands = LookupOperands {
            table: &self.weight,
            positional_weights: self.positional_weight.as_ref(),
            output: &self.output_schema.blob,
            engine: &self.engine,
        };
        let before = net.len();
        strategy.emit(&self.input_record, &operands, net)?;
        debug!(ops = net.len() - before, net = %net.name(), "emitted sparse lookup");
        Ok(())
    }
}

impl ModelLayer for SparseLookup {
    fn name(&self) -> &str {
        SparseLookup::name(self)
    }

    fn output_schema(&self) -> &Scalar {
        SparseLookup::output_schema(self)
    }

    fn emit_ops(&self, net: &mut NetBuilder) -> Result<()> {
        SparseLookup::emit_ops(self, net)
    }

    fn memory_usage(&self) -> u64 {
        SparseLookup::memory_usage(self)
    }

    fn fp16_compatible_parameters(&self) -> Vec<BlobRef> {
        SparseLookup::fp16_compatible_parameters(self)
    }
}

impl fmt::Display for SparseLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SparseLookup({}, {}, {:?})", self.name, self.reducer, self.shape)
    }
}

/// Table row count taken from the id field's metadata.
fn vocabulary_size(input: &InputRecord) -> Result<usize> {
    let ids = input.ids();
    let field = || format!("{}:{}", input.ids_field_name(), ids.blob);
    let metadata = ids
        .metadata
        .as_ref()
        .ok_or_else(|| GraphError::MissingMetadata { field: field() })?;
    let limit = metadata
        .categorical_limit
        .ok_or_else(|| GraphError::UnboundedVocabulary { field: field() })?;
    if limit == 0 {
        return Err(GraphError::invalid_argument(format!(
            "categorical_limit of `{}` must be positive",
            field()
        )));
    }
    usize::try_from(limit).map_err(|_| {
        GraphError::invalid_argument(format!("categorical_limit {limit} does not fit in memory"))
    })
}
