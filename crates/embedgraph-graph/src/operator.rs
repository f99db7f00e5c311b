//! Operator descriptors.
//!
//! The set of operator types is closed: these are the primitives the layers
//! in this workspace emit. Kernels themselves live in the execution engine.

use std::collections::BTreeMap;
use std::fmt;

use embedgraph_common::DeviceSpec;
use embedgraph_scope::ScopeContext;

use crate::blob::BlobRef;

// ── Operator types ──────────────────────────────────────────────────────────

/// Reduction applied by a `SortedSegmentRange*` operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeReduction {
    LogMeanExp,
    LogSumExp,
    Max,
    Mean,
}

impl fmt::Display for RangeReduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LogMeanExp => write!(f, "LogMeanExp"),
            Self::LogSumExp => write!(f, "LogSumExp"),
            Self::Max => write!(f, "Max"),
            Self::Mean => write!(f, "Mean"),
        }
    }
}

/// Type of operation a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    /// `(table, indices, lengths) -> per-segment row sums`.
    SparseLengthsSum,
    /// `(table, weights, indices, lengths) -> per-segment weighted row sums`.
    SparseLengthsWeightedSum,
    /// `lengths -> 0..len` for every segment, concatenated.
    LengthsRangeFill,
    /// `(data, indices) -> data[indices]`.
    Gather,
    /// `lengths -> per-item weight len^-power`.
    LengthsToWeights,
    /// `lengths -> per-item segment id`.
    LengthsToSegmentIds,
    /// `(rows, segment_ids) -> per-segment reduction`.
    SortedSegmentRange(RangeReduction),
    UniformFill,
    ConstantFill,
    GaussianFill,
    XavierFill,
}

impl OpType {
    /// Whether this operator initialises a parameter rather than computing.
    pub const fn is_fill(self) -> bool {
        matches!(self, Self::UniformFill | Self::ConstantFill | Self::GaussianFill | Self::XavierFill)
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SparseLengthsSum => write!(f, "SparseLengthsSum"),
            Self::SparseLengthsWeightedSum => write!(f, "SparseLengthsWeightedSum"),
            Self::LengthsRangeFill => write!(f, "LengthsRangeFill"),
            Self::Gather => write!(f, "Gather"),
            Self::LengthsToWeights => write!(f, "LengthsToWeights"),
            Self::LengthsToSegmentIds => write!(f, "LengthsToSegmentIds"),
            Self::SortedSegmentRange(reduction) => write!(f, "SortedSegmentRange{reduction}"),
            Self::UniformFill => write!(f, "UniformFill"),
            Self::ConstantFill => write!(f, "ConstantFill"),
            Self::GaussianFill => write!(f, "GaussianFill"),
            Self::XavierFill => write!(f, "XavierFill"),
        }
    }
}

// ── Arguments ───────────────────────────────────────────────────────────────

/// Keyword attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Int(i64),
    Float(f32),
    Ints(Vec<i64>),
    Str(String),
}

impl Argument {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Self::Ints(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for Argument {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for Argument {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<i64>> for Argument {
    fn from(value: Vec<i64>) -> Self {
        Self::Ints(value)
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

// ── Operator definition ─────────────────────────────────────────────────────

/// A single operator appended to a graph.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorDef {
    pub op_type: OpType,
    pub inputs: Vec<BlobRef>,
    /// Empty until the graph builder assigns auto-generated names.
    pub outputs: Vec<BlobRef>,
    pub args: BTreeMap<String, Argument>,
    /// Execution-mode tag (e.g. `"fp16"`).
    pub engine: Option<String>,
    pub device: Option<DeviceSpec>,
}

impl OperatorDef {
    pub fn new(op_type: OpType, inputs: Vec<BlobRef>, outputs: Vec<BlobRef>) -> Self {
        Self {
            op_type,
            inputs,
            outputs,
            args: BTreeMap::new(),
            engine: None,
            device: None,
        }
    }

    #[must_use]
    pub fn with_arg(mut self, name: &str, value: impl Into<Argument>) -> Self {
        self.args.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: DeviceSpec) -> Self {
        self.device = Some(device);
        self
    }

    pub fn arg(&self, name: &str) -> Option<&Argument> {
        self.args.get(name)
    }
}

/// Build an operator placed on the active device scope of `scope`, unless a
/// device was already set.
pub fn create_operator(scope: &ScopeContext, mut op: OperatorDef) -> OperatorDef {
    if op.device.is_none() {
        op.device = scope.current_device_scope();
    }
    op
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_type_display_matches_kernel_names() {
        assert_eq!(OpType::SparseLengthsSum.to_string(), "SparseLengthsSum");
        assert_eq!(
            OpType::SortedSegmentRange(RangeReduction::LogMeanExp).to_string(),
            "SortedSegmentRangeLogMeanExp"
        );
        assert!(OpType::ConstantFill.is_fill());
        assert!(!OpType::Gather.is_fill());
    }

    #[test]
    fn create_operator_picks_up_device_scope() {
        let scope = ScopeContext::new();
        let op = OperatorDef::new(OpType::Gather, vec![], vec![]);
        assert_eq!(create_operator(&scope, op.clone()).device, None);

        let _gpu = scope.enter_device_scope(DeviceSpec::cuda(2));
        assert_eq!(create_operator(&scope, op.clone()).device, Some(DeviceSpec::cuda(2)));

        let pinned = op.with_device(DeviceSpec::cpu());
        assert_eq!(create_operator(&scope, pinned).device, Some(DeviceSpec::cpu()));
    }

    #[test]
    fn argument_accessors() {
        let op = OperatorDef::new(OpType::UniformFill, vec![], vec!["w".into()])
            .with_arg("shape", vec![10_i64, 4])
            .with_arg("min", -0.5_f32)
            .with_arg("grad_on_weights", 1_i64);
        assert_eq!(op.arg("shape").and_then(Argument::as_ints), Some(&[10_i64, 4][..]));
        assert_eq!(op.arg("min").and_then(Argument::as_float), Some(-0.5));
        assert_eq!(op.arg("grad_on_weights").and_then(Argument::as_int), Some(1));
        assert!(op.arg("missing").is_none());
    }
}
