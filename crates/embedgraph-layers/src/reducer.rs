//! Reducers and the strategy table mapping `(input shape, reducer)` to the
//! operator sequence that implements the lookup.
//!
//! | input         | reducer                          | operators                                               |
//! |---------------|----------------------------------|---------------------------------------------------------|
//! | `IdList`      | `Sum`                            | `SparseLengthsSum`                                      |
//! | `IdList`      | `PositionWeighted`               | `LengthsRangeFill`, `Gather`, `SparseLengthsWeightedSum` |
//! | `IdList`      | `Sqrt`                           | `LengthsToWeights`, `SparseLengthsWeightedSum`          |
//! | `IdList`      | `LogMeanExp`, `LogSumExp`, `Max`, `Mean` | `Gather`, `LengthsToSegmentIds`, `SortedSegmentRange*` |
//! | `IdScoreList` | `Sum`                            | `SparseLengthsWeightedSum`                              |
//!
//! Every other combination is rejected with
//! [`GraphError::UnsupportedReducer`].

use std::fmt;
use std::str::FromStr;

use embedgraph_common::{GraphError, Result};
use embedgraph_graph::{BlobRef, NetBuilder, OpType, OperatorDef, RangeReduction};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::schema::{InputRecord, InputShapeKind};

/// How the rows selected for one segment are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Reducer {
    PositionWeighted,
    LogMeanExp,
    LogSumExp,
    Max,
    Mean,
    Sum,
    Sqrt,
}

impl Reducer {
    pub const ALL: [Reducer; 7] = [
        Reducer::PositionWeighted,
        Reducer::LogMeanExp,
        Reducer::LogSumExp,
        Reducer::Max,
        Reducer::Mean,
        Reducer::Sum,
        Reducer::Sqrt,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PositionWeighted => "PositionWeighted",
            Self::LogMeanExp => "LogMeanExp",
            Self::LogSumExp => "LogSumExp",
            Self::Max => "Max",
            Self::Mean => "Mean",
            Self::Sum => "Sum",
            Self::Sqrt => "Sqrt",
        }
    }

    /// The segment-range reduction this reducer maps to, if it is one.
    pub const fn range_reduction(self) -> Option<RangeReduction> {
        match self {
            Self::LogMeanExp => Some(RangeReduction::LogMeanExp),
            Self::LogSumExp => Some(RangeReduction::LogSumExp),
            Self::Max => Some(RangeReduction::Max),
            Self::Mean => Some(RangeReduction::Mean),
            Self::PositionWeighted | Self::Sum | Self::Sqrt => None,
        }
    }

    /// Whether the reducer has an entry in the strategy table for `kind`.
    pub fn supports(self, kind: InputShapeKind) -> bool {
        LookupStrategy::select(kind, self).is_ok()
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reducer {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        Reducer::ALL.into_iter().find(|r| r.as_str() == s).ok_or_else(|| {
            let known: Vec<_> = Reducer::ALL.iter().map(|r| r.as_str()).collect();
            GraphError::UnsupportedReducer {
                reducer: s.to_string(),
                reason: format!("expected one of {}", known.join(", ")),
            }
        })
    }
}

impl TryFrom<String> for Reducer {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Reducer> for String {
    fn from(value: Reducer) -> Self {
        value.as_str().to_string()
    }
}

// ── Strategy table ──────────────────────────────────────────────────────────

/// One row of the strategy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupStrategy {
    /// `IdList` + `Sum`.
    LengthsSum,
    /// `IdList` + `PositionWeighted`.
    PositionWeighted,
    /// `IdList` + `Sqrt`.
    SqrtLengthWeighted,
    /// `IdList` + one of the range reducers.
    SegmentRange(RangeReduction),
    /// `IdScoreList` + `Sum`.
    ScoreWeightedSum,
}

/// Blobs a strategy reads and writes, plus the execution-mode tag put on the
/// reducing operator.
#[derive(Debug, Clone, Copy)]
pub struct LookupOperands<'a> {
    pub table: &'a BlobRef,
    pub positional_weights: Option<&'a BlobRef>,
    pub output: &'a BlobRef,
    pub engine: &'a str,
}

impl LookupStrategy {
    /// Look up the strategy for `(kind, reducer)`.
    pub fn select(kind: InputShapeKind, reducer: Reducer) -> Result<Self> {
        match (kind, reducer) {
            (InputShapeKind::IdList, Reducer::Sum) => Ok(Self::LengthsSum),
            (InputShapeKind::IdList, Reducer::PositionWeighted) => Ok(Self::PositionWeighted),
            (InputShapeKind::IdList, Reducer::Sqrt) => Ok(Self::SqrtLengthWeighted),
            (InputShapeKind::IdList, Reducer::LogMeanExp) => {
                Ok(Self::SegmentRange(RangeReduction::LogMeanExp))
            }
            (InputShapeKind::IdList, Reducer::LogSumExp) => {
                Ok(Self::SegmentRange(RangeReduction::LogSumExp))
            }
            (InputShapeKind::IdList, Reducer::Max) => Ok(Self::SegmentRange(RangeReduction::Max)),
            (InputShapeKind::IdList, Reducer::Mean) => Ok(Self::SegmentRange(RangeReduction::Mean)),
            (InputShapeKind::IdScoreList, Reducer::Sum) => Ok(Self::ScoreWeightedSum),
            (
                InputShapeKind::IdScoreList,
                Reducer::PositionWeighted
                | Reducer::LogMeanExp
                | Reducer::LogSumExp
                | Reducer::Max
                | Reducer::Mean
                | Reducer::Sqrt,
            ) => Err(unsupported(kind, reducer)),
        }
    }

    /// Operator types emitted by this strategy, in order.
    pub fn op_types(self) -> Vec<OpType> {
        match self {
            Self::LengthsSum => vec![OpType::SparseLengthsSum],
            Self::PositionWeighted => vec![
                OpType::LengthsRangeFill,
                OpType::Gather,
                OpType::SparseLengthsWeightedSum,
            ],
            Self::SqrtLengthWeighted => {
                vec![OpType::LengthsToWeights, OpType::SparseLengthsWeightedSum]
            }
            Self::SegmentRange(reduction) => vec![
                OpType::Gather,
                OpType::LengthsToSegmentIds,
                OpType::SortedSegmentRange(reduction),
            ],
            Self::ScoreWeightedSum => vec![OpType::SparseLengthsWeightedSum],
        }
    }

    /// Whether the strategy reads a positional-weight parameter.
    pub fn needs_positional_weights(self) -> bool {
        matches!(self, Self::PositionWeighted)
    }

    /// Append the strategy's operators to `net`.
    pub fn emit(
        self,
        input: &InputRecord,
        operands: &LookupOperands<'_>,
        net: &mut NetBuilder,
    ) -> Result<()> {
        let lengths = &input.lengths().blob;
        let ids = &input.ids().blob;
        let table = operands.table;
        let output = operands.output;

        match self {
            Self::LengthsSum => {
                net.add_op(
                    OperatorDef::new(
                        OpType::SparseLengthsSum,
                        vec![table.clone(), ids.clone(), lengths.clone()],
                        vec![output.clone()],
                    )
                    .with_engine(operands.engine),
                );
            }
            Self::PositionWeighted => {
                let pos_w = operands.positional_weights.ok_or_else(|| {
                    GraphError::invalid_argument(
                        "position-weighted lookup requires a positional weight parameter",
                    )
                })?;
                let seq = net.add_op(OperatorDef::new(
                    OpType::LengthsRangeFill,
                    vec![lengths.clone()],
                    vec![lengths.with_suffix("_seq")],
                ));
                let mut gather_inputs = vec![pos_w.clone()];
                gather_inputs.extend(seq);
                let weights = net.add_op(OperatorDef::new(
                    OpType::Gather,
                    gather_inputs,
                    vec![pos_w.with_suffix("_gather")],
                ));
                net.add_op(
                    OperatorDef::new(
                        OpType::SparseLengthsWeightedSum,
                        weighted_sum_inputs(table, weights, ids, lengths),
                        vec![output.clone()],
                    )
                    .with_arg("grad_on_weights", 1_i64)
                    .with_engine(operands.engine),
                );
            }
            Self::SqrtLengthWeighted => {
                let weights = net.add_op(
                    OperatorDef::new(
                        OpType::LengthsToWeights,
                        vec![lengths.clone()],
                        vec![lengths.with_suffix("_sqrt")],
                    )
                    .with_arg("power", 0.5_f32),
                );
                net.add_op(
                    OperatorDef::new(
                        OpType::SparseLengthsWeightedSum,
                        weighted_sum_inputs(table, weights, ids, lengths),
                        vec![output.clone()],
                    )
                    .with_engine(operands.engine),
                );
            }
            Self::SegmentRange(reduction) => {
                let mut inputs = net.add_op(OperatorDef::new(
                    OpType::Gather,
                    vec![table.clone(), ids.clone()],
                    Vec::new(),
                ));
                inputs.extend(net.add_op(OperatorDef::new(
                    OpType::LengthsToSegmentIds,
                    vec![lengths.clone()],
                    vec![lengths.with_suffix("_sid")],
                )));
                net.add_op(
                    OperatorDef::new(
                        OpType::SortedSegmentRange(reduction),
                        inputs,
                        vec![output.clone()],
                    )
                    .with_engine(operands.engine),
                );
            }
            Self::ScoreWeightedSum => {
                let values = input.values().ok_or_else(|| GraphError::UnsupportedInputSchema {
                    schema: format!("{} has no `values` field", input.kind()),
                })?;
                net.add_op(
                    OperatorDef::new(
                        OpType::SparseLengthsWeightedSum,
                        vec![table.clone(), values.blob.clone(), ids.clone(), lengths.clone()],
                        vec![output.clone()],
                    )
                    .with_engine(operands.engine),
                );
            }
        }

        trace!(strategy = ?self, output = %output, "emitted lookup");
        Ok(())
    }
}

/// `(table, weights, ids, lengths)`, the operand order of a weighted sum.
fn weighted_sum_inputs(
    table: &BlobRef,
    weights: Vec<BlobRef>,
    ids: &BlobRef,
    lengths: &BlobRef,
) -> Vec<BlobRef> {
    let mut inputs = Vec::with_capacity(weights.len() + 3);
    inputs.push(table.clone());
    inputs.extend(weights);
    inputs.push(ids.clone());
    inputs.push(lengths.clone());
    inputs
}

fn unsupported(kind: InputShapeKind, reducer: Reducer) -> GraphError {
    GraphError::UnsupportedReducer {
        reducer: reducer.to_string(),
        reason: format!("not supported for {kind} inputs"),
    }
}

/// Operator types the table prescribes for `(kind, reducer)`.
pub fn plan(kind: InputShapeKind, reducer: Reducer) -> Result<Vec<OpType>> {
    LookupStrategy::select(kind, reducer).map(LookupStrategy::op_types)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_reducer_name() {
        for reducer in Reducer::ALL {
            assert_eq!(reducer.as_str().parse::<Reducer>().unwrap(), reducer);
        }
    }

    #[test]
    fn unknown_name_is_unsupported() {
        let err = "Median".parse::<Reducer>().unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedReducer { ref reducer, .. } if reducer == "Median"));
        assert!("sum".parse::<Reducer>().is_err());
    }

    #[test]
    fn id_list_supports_everything() {
        for reducer in Reducer::ALL {
            assert!(reducer.supports(InputShapeKind::IdList), "{reducer}");
        }
    }

    #[test]
    fn id_score_list_supports_only_sum() {
        let supported: Vec<_> = Reducer::ALL
            .into_iter()
            .filter(|r| r.supports(InputShapeKind::IdScoreList))
            .collect();
        assert_eq!(supported, [Reducer::Sum]);
    }

    #[test]
    fn plan_lists_operators_in_order() {
        assert_eq!(
            plan(InputShapeKind::IdList, Reducer::Max).unwrap(),
            [
                OpType::Gather,
                OpType::LengthsToSegmentIds,
                OpType::SortedSegmentRange(RangeReduction::Max)
            ]
        );
        assert_eq!(
            plan(InputShapeKind::IdScoreList, Reducer::Sum).unwrap(),
            [OpType::SparseLengthsWeightedSum]
        );
        assert!(plan(InputShapeKind::IdScoreList, Reducer::Mean).is_err());
    }

    #[test]
    fn only_position_weighted_needs_positional_weights() {
        for reducer in Reducer::ALL {
            let strategy = LookupStrategy::select(InputShapeKind::IdList, reducer).unwrap();
            assert_eq!(strategy.needs_positional_weights(), reducer == Reducer::PositionWeighted);
        }
    }

    #[test]
    fn serde_uses_canonical_names() {
        let json = serde_json::to_string(&Reducer::LogSumExp).unwrap();
        assert_eq!(json, "\"LogSumExp\"");
        let back: Reducer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Reducer::LogSumExp);
        assert!(serde_json::from_str::<Reducer>("\"Avg\"").is_err());
    }
}
