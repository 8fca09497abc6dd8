//! Operational model assembly.
//!
//! [`OperationalModel`] orchestrates the whole build: it constructs the
//! global flow-variable space from the topology, computes the time-index
//! bookkeeping, instantiates every constraint block in a fixed order,
//! aggregates the objective and exposes solve/results/relax operations.

use std::collections::HashMap;

use enflow_core::{EnergySystem, EnflowError, EnflowResult, NodeIndex};
use tracing::{debug, info};

use crate::blocks::{
    component_grouping, BlockKind, BusBlock, ConstraintBlock, ExtractionTurbineBlock, FlowBlock,
    GenericChpBlock, InvestmentFlowBlock, InvestmentStorageBlock, StorageBlock, TransformerBlock,
};
use crate::problem::{LinExpr, ObjectiveSense, Problem, VarId};
use crate::solver::{self, SolverBackend};
use crate::time::TimeIndex;

/// The shared variable space every constraint block reads: flow variables
/// per edge and step, invest variables for investment-sized flows, and
/// gradient variables for ramp-limited flows.
#[derive(Debug)]
pub struct ModelSpace {
    pub time: TimeIndex,
    flow_vars: HashMap<(NodeIndex, NodeIndex), Vec<VarId>>,
    invest_vars: HashMap<(NodeIndex, NodeIndex), VarId>,
    positive_gradient_vars: HashMap<(NodeIndex, NodeIndex), Vec<VarId>>,
    negative_gradient_vars: HashMap<(NodeIndex, NodeIndex), Vec<VarId>>,
}

impl ModelSpace {
    /// The flow variable of edge `(source, target)` at step `t`.
    pub fn flow(&self, source: NodeIndex, target: NodeIndex, t: usize) -> EnflowResult<VarId> {
        self.flow_vars
            .get(&(source, target))
            .map(|series| series[t])
            .ok_or_else(|| {
                EnflowError::Network(format!(
                    "no flow variable for edge {:?} -> {:?}",
                    source, target
                ))
            })
    }

    /// The invest variable of an investment-sized flow.
    pub fn invest(&self, source: NodeIndex, target: NodeIndex) -> Option<VarId> {
        self.invest_vars.get(&(source, target)).copied()
    }

    pub fn positive_gradient(&self, source: NodeIndex, target: NodeIndex) -> Option<&[VarId]> {
        self.positive_gradient_vars
            .get(&(source, target))
            .map(|v| v.as_slice())
    }

    pub fn negative_gradient(&self, source: NodeIndex, target: NodeIndex) -> Option<&[VarId]> {
        self.negative_gradient_vars
            .get(&(source, target))
            .map(|v| v.as_slice())
    }
}

/// The instantiated constraint blocks, dispatched over the closed
/// [`BlockKind`] set.
#[derive(Debug)]
enum BlockInstance {
    Bus(BusBlock),
    Flow(FlowBlock),
    InvestmentFlow(InvestmentFlowBlock),
    Transformer(TransformerBlock),
    Storage(StorageBlock),
    InvestmentStorage(InvestmentStorageBlock),
    GenericChp(GenericChpBlock),
    ExtractionTurbine(ExtractionTurbineBlock),
}

impl BlockInstance {
    fn new(kind: BlockKind) -> Self {
        match kind {
            BlockKind::Bus => BlockInstance::Bus(BusBlock::new()),
            BlockKind::Flow => BlockInstance::Flow(FlowBlock::new()),
            BlockKind::InvestmentFlow => BlockInstance::InvestmentFlow(InvestmentFlowBlock::new()),
            BlockKind::Transformer => BlockInstance::Transformer(TransformerBlock::new()),
            BlockKind::Storage => BlockInstance::Storage(StorageBlock::new()),
            BlockKind::InvestmentStorage => {
                BlockInstance::InvestmentStorage(InvestmentStorageBlock::new())
            }
            BlockKind::GenericChp => BlockInstance::GenericChp(GenericChpBlock::new()),
            BlockKind::ExtractionTurbine => {
                BlockInstance::ExtractionTurbine(ExtractionTurbineBlock::new())
            }
        }
    }

    fn as_block_mut(&mut self) -> &mut dyn ConstraintBlock {
        match self {
            BlockInstance::Bus(b) => b,
            BlockInstance::Flow(b) => b,
            BlockInstance::InvestmentFlow(b) => b,
            BlockInstance::Transformer(b) => b,
            BlockInstance::Storage(b) => b,
            BlockInstance::InvestmentStorage(b) => b,
            BlockInstance::GenericChp(b) => b,
            BlockInstance::ExtractionTurbine(b) => b,
        }
    }

    fn as_block(&self) -> &dyn ConstraintBlock {
        match self {
            BlockInstance::Bus(b) => b,
            BlockInstance::Flow(b) => b,
            BlockInstance::InvestmentFlow(b) => b,
            BlockInstance::Transformer(b) => b,
            BlockInstance::Storage(b) => b,
            BlockInstance::InvestmentStorage(b) => b,
            BlockInstance::GenericChp(b) => b,
            BlockInstance::ExtractionTurbine(b) => b,
        }
    }
}

/// Results of a solved model.
///
/// Flow series are keyed by `(source, target)`; a storage node additionally
/// exposes its level series under the self-referential `(node, node)` key.
#[derive(Debug, Clone)]
pub struct ModelResults {
    pub objective: f64,
    pub flows: HashMap<(NodeIndex, NodeIndex), Vec<f64>>,
    pub flow_invest: HashMap<(NodeIndex, NodeIndex), f64>,
    pub storage_invest: HashMap<NodeIndex, f64>,
}

impl ModelResults {
    pub fn flow(&self, source: NodeIndex, target: NodeIndex) -> Option<&[f64]> {
        self.flows.get(&(source, target)).map(|v| v.as_slice())
    }

    /// Level series of a storage node.
    pub fn storage_level(&self, node: NodeIndex) -> Option<&[f64]> {
        self.flows.get(&(node, node)).map(|v| v.as_slice())
    }
}

/// An energy system model for operational simulation with optimized
/// dispatch (and, where investment descriptors are present, sizing).
#[derive(Debug)]
pub struct OperationalModel {
    system: EnergySystem,
    space: ModelSpace,
    problem: Problem,
    blocks: Vec<BlockInstance>,
    values: Option<Vec<f64>>,
    objective_value: Option<f64>,
}

impl OperationalModel {
    /// Assemble the full problem for `system` over `time`.
    ///
    /// Fails on contradictory component configuration, inconsistent derived
    /// coefficients and missing economic data; an empty component family is
    /// not an error.
    pub fn new(system: EnergySystem, time: TimeIndex) -> EnflowResult<Self> {
        let mut problem = Problem::new();
        let mut space = ModelSpace {
            time,
            flow_vars: HashMap::new(),
            invest_vars: HashMap::new(),
            positive_gradient_vars: HashMap::new(),
            negative_gradient_vars: HashMap::new(),
        };

        // Global flow-variable space: one non-negative variable per edge
        // and timestep, bounded (or fixed) by the flow's declaration.
        for (source, target, flow) in system.flows() {
            let label = format!(
                "{}:{}",
                system.node(source).label(),
                system.node(target).label()
            );
            let series: Vec<VarId> = time
                .steps()
                .map(|t| {
                    let (mut lower, mut upper) = (0.0, f64::INFINITY);
                    if let Some(nominal) = flow.nominal_value {
                        lower = nominal * flow.min.value(t);
                        upper = nominal * flow.max.value(t);
                    }
                    let var = problem.add_var(format!("flow[{},{}]", label, t), lower, upper);
                    if flow.fixed {
                        if let (Some(actual), Some(nominal)) = (&flow.actual_value, flow.nominal_value)
                        {
                            problem.fix(var, actual.value(t) * nominal);
                        }
                    }
                    var
                })
                .collect();
            space.flow_vars.insert((source, target), series);

            if let Some(investment) = &flow.investment {
                let var = problem.add_var(
                    format!("invest_flow[{}]", label),
                    0.0,
                    investment.maximum,
                );
                space.invest_vars.insert((source, target), var);
            }

            // Gradient variables only over the subset of flows declaring a
            // ramp limit.
            let mut gradient_series = |limit: &enflow_core::Sequence, name: &str| {
                time.steps()
                    .map(|t| {
                        let upper = match flow.nominal_value {
                            Some(nominal) => limit.value(t) * nominal,
                            None => f64::INFINITY,
                        };
                        problem.add_var(format!("{}[{},{}]", name, label, t), 0.0, upper)
                    })
                    .collect::<Vec<_>>()
            };
            if let Some(limit) = &flow.positive_gradient {
                let series = gradient_series(limit, "positive_gradient");
                space.positive_gradient_vars.insert((source, target), series);
            }
            if let Some(limit) = &flow.negative_gradient {
                let series = gradient_series(limit, "negative_gradient");
                space.negative_gradient_vars.insert((source, target), series);
            }
        }
        debug!(
            flows = space.flow_vars.len(),
            vars = problem.num_vars(),
            "flow variable space built"
        );

        // Group nodes by component family.
        let mut groups: HashMap<BlockKind, Vec<NodeIndex>> = HashMap::new();
        for index in system.graph.node_indices() {
            if let Some(kind) = component_grouping(&system.graph[index]) {
                groups.entry(kind).or_default().push(index);
            }
        }

        // Instantiate the blocks in their fixed declared order.
        let mut blocks = Vec::with_capacity(BlockKind::ORDER.len());
        for kind in BlockKind::ORDER {
            let group = groups.remove(&kind).unwrap_or_default();
            let mut block = BlockInstance::new(kind);
            block
                .as_block_mut()
                .create(&system, &space, &mut problem, &group)?;
            blocks.push(block);
        }

        let mut model = Self {
            system,
            space,
            problem,
            blocks,
            values: None,
            objective_value: None,
        };
        model.rebuild_objective()?;
        debug!(stats = %model.problem.stats(), "operational model assembled");
        Ok(model)
    }

    /// Re-aggregate the objective from every block's contribution,
    /// discarding the previous objective component first.
    pub fn rebuild_objective(&mut self) -> EnflowResult<()> {
        let mut expr = LinExpr::new();
        for block in &self.blocks {
            expr += block.as_block().objective_expression()?;
        }
        self.problem.set_objective(expr, ObjectiveSense::Minimize);
        Ok(())
    }

    pub fn system(&self) -> &EnergySystem {
        &self.system
    }

    pub fn timesteps(&self) -> &TimeIndex {
        &self.space.time
    }

    pub fn space(&self) -> &ModelSpace {
        &self.space
    }

    /// The assembled problem description.
    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// Level variables of a storage node, whichever block variant owns it.
    pub fn storage_capacity_vars(&self, n: NodeIndex) -> Option<&[VarId]> {
        self.blocks.iter().find_map(|block| match block {
            BlockInstance::Storage(b) => b.capacity_series(n),
            BlockInstance::InvestmentStorage(b) => b.capacity_series(n),
            _ => None,
        })
    }

    /// Invest variable of an investment-sized storage.
    pub fn storage_invest_var(&self, n: NodeIndex) -> Option<VarId> {
        self.blocks.iter().find_map(|block| match block {
            BlockInstance::InvestmentStorage(b) => b.invest_var(n),
            _ => None,
        })
    }

    /// Block-local variable tables of a generic CHP.
    pub fn chp_vars(&self, n: NodeIndex) -> Option<&crate::blocks::ChpVars> {
        self.blocks.iter().find_map(|block| match block {
            BlockInstance::GenericChp(b) => b.chp_vars(n),
            _ => None,
        })
    }

    /// Derived per-timestep indices of an extraction turbine.
    pub fn turbine_indices(&self, n: NodeIndex) -> Option<&crate::blocks::TurbineIndices> {
        self.blocks.iter().find_map(|block| match block {
            BlockInstance::ExtractionTurbine(b) => b.turbine_indices(n),
            _ => None,
        })
    }

    /// Relax all integer/binary domains to continuous ones, in place.
    pub fn relax_problem(&mut self) -> &mut Self {
        self.problem.relax();
        self
    }

    /// Delegate to the solver backend and load the solution into the model.
    pub fn solve(&mut self, backend: SolverBackend) -> EnflowResult<()> {
        info!(backend = ?backend, stats = %self.problem.stats(), "solving");
        let outcome = solver::solve(&self.problem, backend)?;
        self.objective_value = Some(self.problem.objective().eval(&outcome.values));
        self.values = Some(outcome.values);
        Ok(())
    }

    /// Per-edge flow series, storage levels and invested sizes of the last
    /// solve.
    pub fn results(&self) -> EnflowResult<ModelResults> {
        let values = self
            .values
            .as_ref()
            .ok_or_else(|| EnflowError::Solver("the model has not been solved yet".into()))?;
        let read = |var: VarId| values[var.value()];

        let mut flows: HashMap<(NodeIndex, NodeIndex), Vec<f64>> = HashMap::new();
        for (&edge, series) in &self.space.flow_vars {
            flows.insert(edge, series.iter().map(|&v| read(v)).collect());
        }
        let flow_invest = self
            .space
            .invest_vars
            .iter()
            .map(|(&edge, &var)| (edge, read(var)))
            .collect();

        let mut storage_invest = HashMap::new();
        for block in &self.blocks {
            match block {
                BlockInstance::Storage(b) => {
                    for (n, series) in b.storages() {
                        flows.insert((n, n), series.iter().map(|&v| read(v)).collect());
                    }
                }
                BlockInstance::InvestmentStorage(b) => {
                    for (n, series) in b.storages() {
                        flows.insert((n, n), series.iter().map(|&v| read(v)).collect());
                    }
                    for (n, var) in b.investments() {
                        storage_invest.insert(n, read(var));
                    }
                }
                _ => {}
            }
        }

        Ok(ModelResults {
            objective: self.objective_value.unwrap_or(0.0),
            flows,
            flow_invest,
            storage_invest,
        })
    }
}
