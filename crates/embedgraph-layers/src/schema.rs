//! Record schemas consumed by the lookup layers.
//!
//! A generic [`Record`] is a set of named scalar fields. The two shapes a
//! sparse lookup accepts are modelled as the closed [`InputRecord`] sum type;
//! converting a `Record` into it is the structural schema check.

use std::fmt;

use embedgraph_common::{GraphError, Result};
use embedgraph_graph::BlobRef;

/// Element type of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Int64,
    Float32,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32 => write!(f, "Int32"),
            Self::Int64 => write!(f, "Int64"),
            Self::Float32 => write!(f, "Float32"),
        }
    }
}

/// Per-feature serving annotations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSpec {
    /// The feature is only available at request (serving) time.
    pub feature_is_request_only: bool,
}

/// Metadata attached to a scalar field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Vocabulary size bound for categorical ids.
    pub categorical_limit: Option<u64>,
    /// Mean segment length; a sizing hint only.
    pub expected_value: Option<f32>,
    pub feature_specs: Option<FeatureSpec>,
}

impl Metadata {
    /// Metadata for ids drawn from a vocabulary of `limit` entries.
    pub fn categorical(limit: u64) -> Self {
        Self { categorical_limit: Some(limit), ..Self::default() }
    }

    /// Metadata carrying only an expected value.
    pub fn expected(value: f32) -> Self {
        Self { expected_value: Some(value), ..Self::default() }
    }

    /// Output metadata for request-only layers: limits cleared, flagged.
    pub fn request_only() -> Self {
        Self {
            categorical_limit: None,
            expected_value: None,
            feature_specs: Some(FeatureSpec { feature_is_request_only: true }),
        }
    }
}

/// A typed field backed by one blob.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub dtype: DataType,
    /// Per-row shape; empty for a flat field.
    pub shape: Vec<usize>,
    pub blob: BlobRef,
    pub metadata: Option<Metadata>,
}

impl Scalar {
    pub fn new(dtype: DataType, blob: impl Into<BlobRef>) -> Self {
        Self { dtype, shape: Vec::new(), blob: blob.into(), metadata: None }
    }

    #[must_use]
    pub fn with_shape(mut self, shape: Vec<usize>) -> Self {
        self.shape = shape;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether the field is flagged as available only at request time.
    pub fn is_request_only(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.feature_specs.as_ref())
            .is_some_and(|spec| spec.feature_is_request_only)
    }
}

/// A generic record: named scalar fields in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Scalar)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, scalar: Scalar) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = scalar,
            None => self.fields.push((name, scalar)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.fields.iter().find(|(field, _)| field == name).map(|(_, scalar)| scalar)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when the record has exactly these `(name, dtype)` fields.
    fn matches(&self, expected: &[(&str, DataType)]) -> bool {
        self.fields.len() == expected.len()
            && expected
                .iter()
                .all(|(name, dtype)| self.get(name).is_some_and(|s| s.dtype == *dtype))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Struct(")?;
        for (i, (name, scalar)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {}", scalar.dtype)?;
        }
        write!(f, ")")
    }
}

// ── Known input shapes ──────────────────────────────────────────────────────

const ID_LIST_FIELDS: [(&str, DataType); 2] =
    [("lengths", DataType::Int32), ("items", DataType::Int64)];

const ID_SCORE_LIST_FIELDS: [(&str, DataType); 3] =
    [("lengths", DataType::Int32), ("keys", DataType::Int64), ("values", DataType::Float32)];

/// Which of the two accepted shapes a record has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputShapeKind {
    IdList,
    IdScoreList,
}

impl fmt::Display for InputShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdList => write!(f, "IdList"),
            Self::IdScoreList => write!(f, "IdScoreList"),
        }
    }
}

/// Variable-length lists of categorical ids.
#[derive(Debug, Clone, PartialEq)]
pub struct IdList {
    pub lengths: Scalar,
    pub items: Scalar,
}

impl IdList {
    pub fn new(lengths: impl Into<BlobRef>, items: impl Into<BlobRef>) -> Self {
        Self {
            lengths: Scalar::new(DataType::Int32, lengths),
            items: Scalar::new(DataType::Int64, items),
        }
    }

    #[must_use]
    pub fn with_item_metadata(mut self, metadata: Metadata) -> Self {
        self.items.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn with_lengths_metadata(mut self, metadata: Metadata) -> Self {
        self.lengths.metadata = Some(metadata);
        self
    }
}

/// Variable-length lists of `(id, weight)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct IdScoreList {
    pub lengths: Scalar,
    pub keys: Scalar,
    pub values: Scalar,
}

impl IdScoreList {
    pub fn new(
        lengths: impl Into<BlobRef>,
        keys: impl Into<BlobRef>,
        values: impl Into<BlobRef>,
    ) -> Self {
        Self {
            lengths: Scalar::new(DataType::Int32, lengths),
            keys: Scalar::new(DataType::Int64, keys),
            values: Scalar::new(DataType::Float32, values),
        }
    }

    #[must_use]
    pub fn with_key_metadata(mut self, metadata: Metadata) -> Self {
        self.keys.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn with_lengths_metadata(mut self, metadata: Metadata) -> Self {
        self.lengths.metadata = Some(metadata);
        self
    }
}

/// Input of a sparse lookup: exactly one of the two known shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum InputRecord {
    IdList(IdList),
    IdScoreList(IdScoreList),
}

impl InputRecord {
    pub fn kind(&self) -> InputShapeKind {
        match self {
            Self::IdList(_) => InputShapeKind::IdList,
            Self::IdScoreList(_) => InputShapeKind::IdScoreList,
        }
    }

    /// Segment lengths.
    pub fn lengths(&self) -> &Scalar {
        match self {
            Self::IdList(list) => &list.lengths,
            Self::IdScoreList(list) => &list.lengths,
        }
    }

    /// The categorical id field (`items` or `keys`).
    pub fn ids(&self) -> &Scalar {
        match self {
            Self::IdList(list) => &list.items,
            Self::IdScoreList(list) => &list.keys,
        }
    }

    /// Field name of [`InputRecord::ids`].
    pub fn ids_field_name(&self) -> &'static str {
        match self {
            Self::IdList(_) => "items",
            Self::IdScoreList(_) => "keys",
        }
    }

    /// Every field of the record.
    pub fn all_scalars(&self) -> Vec<&Scalar> {
        match self {
            Self::IdList(list) => vec![&list.lengths, &list.items],
            Self::IdScoreList(list) => vec![&list.lengths, &list.keys, &list.values],
        }
    }

    /// True when every field is request-only.
    pub fn is_request_only(&self) -> bool {
        self.all_scalars().iter().all(|s| s.is_request_only())
    }

    /// Per-id weights; only present on `IdScoreList`.
    pub fn values(&self) -> Option<&Scalar> {
        match self {
            Self::IdList(_) => None,
            Self::IdScoreList(list) => Some(&list.values),
        }
    }
}

impl From<IdList> for InputRecord {
    fn from(value: IdList) -> Self {
        Self::IdList(value)
    }
}

impl From<IdScoreList> for InputRecord {
    fn from(value: IdScoreList) -> Self {
        Self::IdScoreList(value)
    }
}

impl TryFrom<&Record> for InputRecord {
    type Error = GraphError;

    fn try_from(record: &Record) -> Result<Self> {
        let take = |name: &str| {
            record.get(name).cloned().ok_or_else(|| GraphError::UnsupportedInputSchema {
                schema: record.to_string(),
            })
        };

        if record.matches(&ID_LIST_FIELDS) {
            return Ok(Self::IdList(IdList { lengths: take("lengths")?, items: take("items")? }));
        }
        if record.matches(&ID_SCORE_LIST_FIELDS) {
            return Ok(Self::IdScoreList(IdScoreList {
                lengths: take("lengths")?,
                keys: take("keys")?,
                values: take("values")?,
            }));
        }
        Err(GraphError::UnsupportedInputSchema { schema: record.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_list_record() -> Record {
        Record::new()
            .field("lengths", Scalar::new(DataType::Int32, "f/lengths"))
            .field("items", Scalar::new(DataType::Int64, "f/items"))
    }

    #[test]
    fn id_list_record_is_recognised() {
        let input = InputRecord::try_from(&id_list_record()).unwrap();
        assert_eq!(input.kind(), InputShapeKind::IdList);
        assert_eq!(input.ids().blob, "f/items");
        assert_eq!(input.ids_field_name(), "items");
        assert!(input.values().is_none());
    }

    #[test]
    fn field_order_does_not_matter() {
        let record = Record::new()
            .field("values", Scalar::new(DataType::Float32, "v"))
            .field("keys", Scalar::new(DataType::Int64, "k"))
            .field("lengths", Scalar::new(DataType::Int32, "l"));
        let input = InputRecord::try_from(&record).unwrap();
        assert_eq!(input.kind(), InputShapeKind::IdScoreList);
        assert_eq!(input.values().map(|s| s.blob.as_str()), Some("v"));
    }

    #[test]
    fn wrong_dtype_is_rejected() {
        let record = id_list_record().field("items", Scalar::new(DataType::Float32, "f/items"));
        let err = InputRecord::try_from(&record).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnsupportedInputSchema {
                schema: "Struct(lengths: Int32, items: Float32)".to_string()
            }
        );
    }

    #[test]
    fn extra_field_is_rejected() {
        let record = id_list_record().field("extra", Scalar::new(DataType::Int32, "x"));
        assert!(matches!(
            InputRecord::try_from(&record),
            Err(GraphError::UnsupportedInputSchema { .. })
        ));
    }

    #[test]
    fn metadata_is_carried_through() {
        let record = Record::new()
            .field("lengths", Scalar::new(DataType::Int32, "l").with_metadata(Metadata::expected(3.5)))
            .field("items", Scalar::new(DataType::Int64, "i").with_metadata(Metadata::categorical(10)));
        let input = InputRecord::try_from(&record).unwrap();
        assert_eq!(input.ids().metadata, Some(Metadata::categorical(10)));
        assert_eq!(input.lengths().metadata.as_ref().and_then(|m| m.expected_value), Some(3.5));
    }

    #[test]
    fn record_is_request_only_when_every_field_is() {
        let flagged = Metadata {
            feature_specs: Some(FeatureSpec { feature_is_request_only: true }),
            ..Metadata::categorical(5)
        };
        let list = IdList::new("l", "i").with_item_metadata(flagged.clone());
        assert!(!InputRecord::from(list.clone()).is_request_only());

        let list = list.with_lengths_metadata(flagged);
        assert!(InputRecord::from(list).is_request_only());
    }

    #[test]
    fn request_only_metadata_clears_limits() {
        let meta = Metadata::request_only();
        assert!(meta.categorical_limit.is_none());
        assert!(meta.expected_value.is_none());
        assert_eq!(meta.feature_specs, Some(FeatureSpec { feature_is_request_only: true }));
    }
}
