//! Trainable parameters, their initialisers and the registry that owns them.

use std::fmt;
use std::sync::Arc;

use embedgraph_common::{GraphError, Result};
use embedgraph_graph::{BlobRef, OpType, OperatorDef, create_operator};
use embedgraph_scope::ScopeContext;
use serde::{Deserialize, Serialize};

/// How a parameter is filled before training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Initializer {
    Uniform { min: f32, max: f32 },
    Constant { value: f32 },
    Gaussian { mean: f32, std: f32 },
    Xavier,
}

impl Initializer {
    /// Uniform in `±sqrt(1 / vocab)` for a table with `vocab` rows.
    pub fn default_for_embedding(vocab: usize) -> Self {
        let scale = (1.0 / vocab as f64).sqrt() as f32;
        Self::Uniform { min: -scale, max: scale }
    }

    pub fn op_type(&self) -> OpType {
        match self {
            Self::Uniform { .. } => OpType::UniformFill,
            Self::Constant { .. } => OpType::ConstantFill,
            Self::Gaussian { .. } => OpType::GaussianFill,
            Self::Xavier => OpType::XavierFill,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Uniform { min, max } if min.is_nan() || max.is_nan() || min > max => {
                Err(GraphError::invalid_argument(format!(
                    "uniform initializer needs min <= max, got [{min}, {max}]"
                )))
            }
            Self::Gaussian { std, .. } if std.is_nan() || std < 0.0 => {
                Err(GraphError::invalid_argument(format!(
                    "gaussian initializer needs a non-negative std, got {std}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// The fill operator producing `blob` with `shape`, placed on the active
    /// device scope of `scope`.
    pub fn fill_op(&self, scope: &ScopeContext, blob: &BlobRef, shape: &[usize]) -> OperatorDef {
        let dims: Vec<i64> = shape.iter().map(|&d| d as i64).collect();
        let op = OperatorDef::new(self.op_type(), Vec::new(), vec![blob.clone()])
            .with_arg("shape", dims);
        let op = match *self {
            Self::Uniform { min, max } => op.with_arg("min", min).with_arg("max", max),
            Self::Constant { value } => op.with_arg("value", value),
            Self::Gaussian { mean, std } => op.with_arg("mean", mean).with_arg("std", std),
            Self::Xavier => op,
        };
        create_operator(scope, op)
    }
}

/// Opaque optimiser attached to a parameter; implementations live with the
/// training loop.
pub trait Optimizer: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
}

pub type OptimizerHandle = Arc<dyn Optimizer>;

/// Sharding hint for a parameter-server deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct PsParam {
    /// Blob carrying the ids used to shard lookups.
    pub sparse_key: BlobRef,
    /// Expected segment length, when known.
    pub average_length: Option<f32>,
}

/// A registered trainable parameter.
#[derive(Debug, Clone)]
pub struct LayerParameter {
    pub parameter: BlobRef,
    pub shape: Vec<usize>,
    pub initializer: OperatorDef,
    pub optimizer: Option<OptimizerHandle>,
    pub ps_param: Option<PsParam>,
}

impl LayerParameter {
    pub fn optimizer_name(&self) -> Option<&str> {
        self.optimizer.as_deref().map(Optimizer::name)
    }
}

/// Sink for parameters declared by layers.
pub trait ParameterRegistry {
    fn register(&mut self, param: LayerParameter) -> Result<()>;
}

/// In-memory parameter registry preserving registration order.
#[derive(Debug, Default)]
pub struct ParameterStore {
    params: Vec<LayerParameter>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&LayerParameter> {
        self.params.iter().find(|p| p.parameter == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerParameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Initialiser operators for every parameter, in registration order.
    pub fn init_ops(&self) -> impl Iterator<Item = &OperatorDef> {
        self.params.iter().map(|p| &p.initializer)
    }
}

impl ParameterRegistry for ParameterStore {
    fn register(&mut self, param: LayerParameter) -> Result<()> {
        if self.get(param.parameter.as_str()).is_some() {
            return Err(GraphError::invalid_argument(format!(
                "parameter `{}` is already registered",
                param.parameter
            )));
        }
        if !param.initializer.op_type.is_fill() || !param.initializer.outputs.contains(&param.parameter) {
            return Err(GraphError::invalid_argument(format!(
                "parameter `{}` must be initialised by a fill operator writing it, got {}",
                param.parameter, param.initializer.op_type
            )));
        }
        self.params.push(param);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedgraph_common::DeviceSpec;
    use embedgraph_graph::Argument;

    #[derive(Debug)]
    struct Sgd;

    impl Optimizer for Sgd {
        fn name(&self) -> &str {
            "sgd"
        }
    }

    #[test]
    fn default_embedding_initializer_scales_with_dim() {
        assert_eq!(
            Initializer::default_for_embedding(4),
            Initializer::Uniform { min: -0.5, max: 0.5 }
        );
    }

    #[test]
    fn fill_op_carries_shape_and_device() {
        let scope = ScopeContext::new();
        let _gpu = scope.enter_device_scope(DeviceSpec::cuda(1));
        let op = Initializer::Constant { value: 1.0 }.fill_op(&scope, &"pos_w".into(), &[8]);

        assert_eq!(op.op_type, OpType::ConstantFill);
        assert_eq!(op.outputs, vec![BlobRef::from("pos_w")]);
        assert_eq!(op.arg("shape").and_then(Argument::as_ints), Some(&[8_i64][..]));
        assert_eq!(op.arg("value").and_then(Argument::as_float), Some(1.0));
        assert_eq!(op.device, Some(DeviceSpec::cuda(1)));
    }

    #[test]
    fn invalid_initializers_are_rejected() {
        assert!(Initializer::Uniform { min: 1.0, max: -1.0 }.validate().is_err());
        assert!(Initializer::Gaussian { mean: 0.0, std: -0.1 }.validate().is_err());
        assert!(Initializer::Uniform { min: f32::NAN, max: 1.0 }.validate().is_err());
        assert!(Initializer::Xavier.validate().is_ok());
    }

    #[test]
    fn initializer_deserializes_from_tagged_table() {
        let init: Initializer = serde_json::from_str(r#"{"type":"gaussian","mean":0.0,"std":0.01}"#).unwrap();
        assert_eq!(init, Initializer::Gaussian { mean: 0.0, std: 0.01 });
    }

    #[test]
    fn store_rejects_duplicates_and_keeps_order() {
        let scope = ScopeContext::new();
        let mut store = ParameterStore::new();
        let make = |name: &str| LayerParameter {
            parameter: name.into(),
            shape: vec![2],
            initializer: Initializer::Xavier.fill_op(&scope, &name.into(), &[2]),
            optimizer: Some(Arc::new(Sgd) as OptimizerHandle),
            ps_param: None,
        };

        store.register(make("a")).unwrap();
        store.register(make("b")).unwrap();
        assert!(store.register(make("a")).is_err());

        let names: Vec<_> = store.iter().map(|p| p.parameter.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(store.get("b").and_then(LayerParameter::optimizer_name), Some("sgd"));
        assert_eq!(store.init_ops().count(), 2);
    }

    #[test]
    fn store_rejects_non_fill_initializers() {
        let scope = ScopeContext::new();
        let mut store = ParameterStore::new();
        let gather = OperatorDef::new(OpType::Gather, Vec::new(), vec!["w".into()]);
        let param = LayerParameter {
            parameter: "w".into(),
            shape: vec![2],
            initializer: gather,
            optimizer: None,
            ps_param: None,
        };
        let err = store.register(param.clone()).unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument(_)), "{err}");

        let elsewhere = LayerParameter {
            initializer: Initializer::Xavier.fill_op(&scope, &"other".into(), &[2]),
            ..param
        };
        assert!(store.register(elsewhere).is_err());
        assert!(store.is_empty());
    }
}
