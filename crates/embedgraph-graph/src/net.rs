//! Scope-aware graph builder.

use std::collections::HashSet;

use embedgraph_scope::ScopeContext;
use tracing::trace;

use crate::blob::BlobRef;
use crate::operator::{OpType, OperatorDef, create_operator};

/// Ordered list of operators plus the blob names reserved in it.
///
/// Operators are kept in the exact order they were appended; downstream
/// execution order depends on it.
#[derive(Debug)]
pub struct NetBuilder {
    name: String,
    scope: ScopeContext,
    ops: Vec<OperatorDef>,
    reserved: HashSet<String>,
    next_auto_index: usize,
}

impl NetBuilder {
    /// Create an empty graph that names and places nodes through `scope`.
    pub fn new(name: impl Into<String>, scope: ScopeContext) -> Self {
        Self {
            name: name.into(),
            scope,
            ops: Vec::new(),
            reserved: HashSet::new(),
            next_auto_index: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &ScopeContext {
        &self.scope
    }

    pub fn ops(&self) -> &[OperatorDef] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Operators of the given type, in emission order.
    pub fn ops_of_type(&self, op_type: OpType) -> impl Iterator<Item = &OperatorDef> {
        self.ops.iter().filter(move |op| op.op_type == op_type)
    }

    /// Whether `name` has been reserved or produced in this graph.
    pub fn has_blob(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    /// Reserve a name unique within this graph, starting from `base`.
    ///
    /// The first request for a name returns it unchanged; later requests get
    /// `_1`, `_2`, ... appended.
    pub fn next_blob(&mut self, base: &str) -> BlobRef {
        let mut candidate = base.to_string();
        let mut index = 1;
        while self.reserved.contains(&candidate) {
            candidate = format!("{base}_{index}");
            index += 1;
        }
        self.reserved.insert(candidate.clone());
        BlobRef::new(candidate)
    }

    /// [`NetBuilder::next_blob`] applied to `base` prefixed with the active
    /// name scope.
    pub fn next_scoped_blob(&mut self, base: &str) -> BlobRef {
        let scoped = self.scope.scoped_name(base);
        self.next_blob(&scoped)
    }

    /// Append an operator and return its outputs.
    ///
    /// An operator without outputs gets one auto-named output. The operator
    /// is placed on the active device scope unless it already has a device.
    pub fn add_op(&mut self, op: OperatorDef) -> Vec<BlobRef> {
        let mut op = create_operator(&self.scope, op);

        if op.outputs.is_empty() {
            let base = format!("{}_blob_{}", self.name, self.next_auto_index);
            self.next_auto_index += 1;
            op.outputs.push(self.next_scoped_blob(&base));
        }
        for output in &op.outputs {
            self.reserved.insert(output.as_str().to_string());
        }

        trace!(
            net = %self.name,
            op = %op.op_type,
            inputs = op.inputs.len(),
            outputs = op.outputs.len(),
            "appended operator"
        );

        let outputs = op.outputs.clone();
        self.ops.push(op);
        outputs
    }
}
