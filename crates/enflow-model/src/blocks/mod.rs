//! Constraint blocks, one per component family.
//!
//! Each block declares the decision variables, equality/inequality
//! constraints and objective contribution for all instances of its family,
//! given the shared time index and flow-variable space. Blocks keep their
//! variables in block-local tables; nothing is cached on the shared
//! component records.

mod chp;
mod flows;
mod storage;

pub use chp::{ChpVars, ExtractionTurbineBlock, GenericChpBlock, TurbineIndices};
pub use flows::{BusBlock, FlowBlock, InvestmentFlowBlock, TransformerBlock};
pub use storage::{InvestmentStorageBlock, StorageBlock};

use enflow_core::{EnergySystem, EnflowResult, Node, NodeIndex};

use crate::model::ModelSpace;
use crate::problem::{LinExpr, Problem};

/// The closed set of constraint-block families, in creation order.
///
/// `Flow` and `InvestmentFlow` operate on the edge space and are always
/// instantiated; the node families receive the matching node subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Bus,
    Flow,
    InvestmentFlow,
    Transformer,
    Storage,
    InvestmentStorage,
    GenericChp,
    ExtractionTurbine,
}

impl BlockKind {
    /// Fixed creation order of the block families.
    pub const ORDER: [BlockKind; 8] = [
        BlockKind::Bus,
        BlockKind::Flow,
        BlockKind::InvestmentFlow,
        BlockKind::Transformer,
        BlockKind::Storage,
        BlockKind::InvestmentStorage,
        BlockKind::GenericChp,
        BlockKind::ExtractionTurbine,
    ];
}

/// Map a node to the constraint block responsible for it.
///
/// Sources and sinks carry no constraints of their own; their flows are
/// handled by the bus balances and the flow bounds.
pub fn component_grouping(node: &Node) -> Option<BlockKind> {
    match node {
        Node::Bus(_) => Some(BlockKind::Bus),
        Node::Transformer(_) => Some(BlockKind::Transformer),
        Node::Storage(storage) => Some(if storage.investment.is_some() {
            BlockKind::InvestmentStorage
        } else {
            BlockKind::Storage
        }),
        Node::GenericChp(_) => Some(BlockKind::GenericChp),
        Node::ExtractionTurbineChp(_) => Some(BlockKind::ExtractionTurbine),
        Node::Source(_) | Node::Sink(_) => None,
    }
}

/// One constraint block: variable/constraint creation against a node group
/// plus an objective contribution gathered by the assembler.
pub trait ConstraintBlock {
    /// Create variables and constraints for all group members. An empty
    /// group is a no-op.
    fn create(
        &mut self,
        system: &EnergySystem,
        space: &ModelSpace,
        problem: &mut Problem,
        group: &[NodeIndex],
    ) -> EnflowResult<()>;

    /// This block's part of the objective function.
    fn objective_expression(&self) -> EnflowResult<LinExpr> {
        Ok(LinExpr::new())
    }
}

pub(crate) fn edge_label(system: &EnergySystem, source: NodeIndex, target: NodeIndex) -> String {
    format!(
        "{}:{}",
        system.node(source).label(),
        system.node(target).label()
    )
}
