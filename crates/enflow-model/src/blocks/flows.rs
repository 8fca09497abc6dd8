//! Blocks acting on buses and the flow-variable space itself: bus
//! balances, flow gradients and costs, investment-sized flows, and plain
//! linear transformers.

use enflow_core::{EnergySystem, EnflowError, EnflowResult, Node, NodeIndex};
use tracing::debug;

use super::{edge_label, ConstraintBlock};
use crate::model::ModelSpace;
use crate::problem::{LinExpr, Problem, Relation};

/// Balance of every bus: the sum of inflows equals the sum of outflows,
/// per timestep.
#[derive(Debug, Default)]
pub struct BusBlock;

impl BusBlock {
    pub fn new() -> Self {
        Self
    }
}

impl ConstraintBlock for BusBlock {
    fn create(
        &mut self,
        system: &EnergySystem,
        space: &ModelSpace,
        problem: &mut Problem,
        group: &[NodeIndex],
    ) -> EnflowResult<()> {
        for &bus in group {
            let label = system.node(bus).label().to_owned();
            for t in space.time.steps() {
                let mut expr = LinExpr::new();
                for (source, _) in system.inputs(bus) {
                    expr += LinExpr::from(space.flow(source, bus, t)?);
                }
                for (target, _) in system.outputs(bus) {
                    expr -= LinExpr::from(space.flow(bus, target, t)?);
                }
                problem.add_constraint(format!("bus_balance[{},{}]", label, t), expr, Relation::Eq);
            }
        }
        debug!(buses = group.len(), "bus balances created");
        Ok(())
    }
}

/// Per-flow constraints that need no component: ramping limits on flows
/// that declare a gradient, and the variable-cost part of the objective.
#[derive(Debug, Default)]
pub struct FlowBlock {
    variable_costs: LinExpr,
}

impl FlowBlock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConstraintBlock for FlowBlock {
    fn create(
        &mut self,
        system: &EnergySystem,
        space: &ModelSpace,
        problem: &mut Problem,
        _group: &[NodeIndex],
    ) -> EnflowResult<()> {
        let tau = space.time.timeincrement();
        for (source, target, flow) in system.flows() {
            let label = edge_label(system, source, target);

            if let Some(costs) = &flow.variable_costs {
                for t in space.time.steps() {
                    self.variable_costs +=
                        costs.value(t) * tau * space.flow(source, target, t)?;
                }
            }

            if flow.positive_gradient.is_some() {
                let grads = space
                    .positive_gradient(source, target)
                    .expect("gradient variables exist for declared limits");
                for t in 1..space.time.len() {
                    let expr = LinExpr::from(space.flow(source, target, t)?)
                        - space.flow(source, target, t - 1)?
                        - grads[t];
                    problem.add_constraint(
                        format!("positive_gradient[{},{}]", label, t),
                        expr,
                        Relation::Le,
                    );
                }
            }

            if flow.negative_gradient.is_some() {
                let grads = space
                    .negative_gradient(source, target)
                    .expect("gradient variables exist for declared limits");
                for t in 1..space.time.len() {
                    let expr = LinExpr::from(space.flow(source, target, t - 1)?)
                        - space.flow(source, target, t)?
                        - grads[t];
                    problem.add_constraint(
                        format!("negative_gradient[{},{}]", label, t),
                        expr,
                        Relation::Le,
                    );
                }
            }
        }
        Ok(())
    }

    fn objective_expression(&self) -> EnflowResult<LinExpr> {
        Ok(self.variable_costs.clone())
    }
}

/// Constraints and costs of investment-sized flows: the flow is bounded by
/// the invested size, priced at the investment's periodical cost.
#[derive(Debug, Default)]
pub struct InvestmentFlowBlock {
    investment_costs: LinExpr,
}

impl InvestmentFlowBlock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConstraintBlock for InvestmentFlowBlock {
    fn create(
        &mut self,
        system: &EnergySystem,
        space: &ModelSpace,
        problem: &mut Problem,
        _group: &[NodeIndex],
    ) -> EnflowResult<()> {
        for (source, target, flow) in system.flows() {
            let Some(investment) = &flow.investment else {
                continue;
            };
            let invest = space.invest(source, target).ok_or_else(|| {
                EnflowError::Network(format!(
                    "no invest variable for flow {}",
                    edge_label(system, source, target)
                ))
            })?;
            let label = edge_label(system, source, target);
            for t in space.time.steps() {
                let expr = LinExpr::from(space.flow(source, target, t)?)
                    - flow.max.value(t) * invest;
                problem.add_constraint(
                    format!("invest_flow_max[{},{}]", label, t),
                    expr,
                    Relation::Le,
                );
            }
            // Storage-coupled flow investments carry no own cost; the
            // sizing cost lives on the storage.
            if let Some(ep_costs) = investment.ep_costs {
                self.investment_costs += ep_costs * invest;
            }
        }
        Ok(())
    }

    fn objective_expression(&self) -> EnflowResult<LinExpr> {
        Ok(self.investment_costs.clone())
    }
}

/// Linear conversion: every output flow is the input flow scaled by the
/// per-timestep conversion factor of its bus.
#[derive(Debug, Default)]
pub struct TransformerBlock;

impl TransformerBlock {
    pub fn new() -> Self {
        Self
    }
}

impl ConstraintBlock for TransformerBlock {
    fn create(
        &mut self,
        system: &EnergySystem,
        space: &ModelSpace,
        problem: &mut Problem,
        group: &[NodeIndex],
    ) -> EnflowResult<()> {
        for &n in group {
            let Node::Transformer(transformer) = system.node(n) else {
                continue;
            };
            let (input, _) = *system.inputs(n).first().ok_or_else(|| {
                EnflowError::Network(format!(
                    "transformer '{}' has no input flow",
                    transformer.label
                ))
            })?;

            for (bus, factor) in &transformer.conversion_factors {
                let output = system.output_to_bus(n, *bus).ok_or_else(|| {
                    EnflowError::Network(format!(
                        "transformer '{}' is not connected to its output bus {}",
                        transformer.label,
                        bus.value()
                    ))
                })?;
                let label = edge_label(system, n, output);
                for t in space.time.steps() {
                    let expr = LinExpr::from(space.flow(n, output, t)?)
                        - factor.value(t) * space.flow(input, n, t)?;
                    problem.add_constraint(
                        format!("transformer_relation[{},{}]", label, t),
                        expr,
                        Relation::Eq,
                    );
                }
            }
        }
        Ok(())
    }
}
