//! Storage constraint blocks, in two variants: fixed nominal capacity and
//! investment-sized capacity.
//!
//! Both enforce the defining physical law of a storage: the level is a
//! leaky integrator of net energy flow,
//!
//! ```text
//! level[t] = level[previous(t)] * (1 - loss[t])
//!          + inflow[t]  * eta_in[t]  * tau
//!          - outflow[t] / eta_out[t] * tau
//! ```
//!
//! with `previous(0)` wrapping to the last timestep (cyclic horizon).

use std::collections::HashMap;

use enflow_core::{EnergySystem, EnflowError, EnflowResult, Node, NodeIndex, Storage};
use tracing::debug;

use super::ConstraintBlock;
use crate::model::ModelSpace;
use crate::problem::{LinExpr, Problem, Relation, VarId};

/// Resolve the single inflow and outflow connection of a storage; the
/// first encountered edge on each side is used.
fn storage_connections(
    system: &EnergySystem,
    n: NodeIndex,
    label: &str,
) -> EnflowResult<(NodeIndex, NodeIndex)> {
    let (input, _) = *system.inputs(n).first().ok_or_else(|| {
        EnflowError::Network(format!("storage '{}' has no input flow", label))
    })?;
    let (output, _) = *system.outputs(n).first().ok_or_else(|| {
        EnflowError::Network(format!("storage '{}' has no output flow", label))
    })?;
    Ok((input, output))
}

/// The balance expression shared by both block variants.
fn balance_expr(
    space: &ModelSpace,
    storage: &Storage,
    capacity: &[VarId],
    input: NodeIndex,
    n: NodeIndex,
    output: NodeIndex,
    t: usize,
) -> EnflowResult<LinExpr> {
    let tau = space.time.timeincrement();
    let mut expr = LinExpr::from(capacity[t]);
    expr -= (1.0 - storage.capacity_loss.value(t)) * capacity[space.time.previous(t)];
    expr -= storage.inflow_conversion_factor.value(t) * tau * space.flow(input, n, t)?;
    expr += tau / storage.outflow_conversion_factor.value(t) * space.flow(n, output, t)?;
    Ok(expr)
}

/// Storages with a fixed nominal capacity.
///
/// The level variable is bounded directly by the nominal capacity times the
/// min/max fraction series; `initial_capacity` fixes the level at the last
/// timestep, which the cyclic balance propagates to the start of the
/// horizon.
#[derive(Debug, Default)]
pub struct StorageBlock {
    capacity: HashMap<NodeIndex, Vec<VarId>>,
}

impl StorageBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level variables of a storage, in time order.
    pub fn capacity_series(&self, n: NodeIndex) -> Option<&[VarId]> {
        self.capacity.get(&n).map(|v| v.as_slice())
    }

    pub(crate) fn storages(&self) -> impl Iterator<Item = (NodeIndex, &[VarId])> {
        self.capacity.iter().map(|(n, v)| (*n, v.as_slice()))
    }
}

impl ConstraintBlock for StorageBlock {
    fn create(
        &mut self,
        system: &EnergySystem,
        space: &ModelSpace,
        problem: &mut Problem,
        group: &[NodeIndex],
    ) -> EnflowResult<()> {
        for &n in group {
            let Node::Storage(storage) = system.node(n) else {
                continue;
            };
            let (input, output) = storage_connections(system, n, &storage.label)?;
            let nominal = storage.nominal_capacity.ok_or_else(|| {
                EnflowError::Config(format!(
                    "storage '{}' needs a nominal capacity (or an investment \
                     descriptor)",
                    storage.label
                ))
            })?;

            let capacity: Vec<VarId> = space
                .time
                .steps()
                .map(|t| {
                    problem.add_var(
                        format!("capacity[{},{}]", storage.label, t),
                        nominal * storage.capacity_min.value(t),
                        nominal * storage.capacity_max.value(t),
                    )
                })
                .collect();

            // The fixed last-step level doubles as the initial level via the
            // cyclic balance.
            if let Some(initial) = storage.initial_capacity {
                problem.fix(capacity[space.time.last()], initial * nominal);
            }

            for t in space.time.steps() {
                let expr = balance_expr(space, storage, &capacity, input, n, output, t)?;
                problem.add_constraint(
                    format!("storage_balance[{},{}]", storage.label, t),
                    expr,
                    Relation::Eq,
                );
            }

            self.capacity.insert(n, capacity);
        }
        debug!(storages = group.len(), "storage balances created");
        Ok(())
    }

    // Variable costs are already covered by the flow block; a plain storage
    // adds nothing to the objective.
}

/// Storages whose nominal capacity is chosen by the optimizer.
///
/// The level bounds become decision-dependent and move from variable bounds
/// into constraints against the invest variable; the storage's sizing is
/// coupled to its connecting flows' sizing through the capacity ratios.
#[derive(Debug, Default)]
pub struct InvestmentStorageBlock {
    capacity: HashMap<NodeIndex, Vec<VarId>>,
    invest: HashMap<NodeIndex, VarId>,
    costs: Vec<(VarId, Option<f64>, String)>,
}

impl InvestmentStorageBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity_series(&self, n: NodeIndex) -> Option<&[VarId]> {
        self.capacity.get(&n).map(|v| v.as_slice())
    }

    pub fn invest_var(&self, n: NodeIndex) -> Option<VarId> {
        self.invest.get(&n).copied()
    }

    pub(crate) fn storages(&self) -> impl Iterator<Item = (NodeIndex, &[VarId])> {
        self.capacity.iter().map(|(n, v)| (*n, v.as_slice()))
    }

    pub(crate) fn investments(&self) -> impl Iterator<Item = (NodeIndex, VarId)> + '_ {
        self.invest.iter().map(|(n, v)| (*n, *v))
    }
}

impl ConstraintBlock for InvestmentStorageBlock {
    fn create(
        &mut self,
        system: &EnergySystem,
        space: &ModelSpace,
        problem: &mut Problem,
        group: &[NodeIndex],
    ) -> EnflowResult<()> {
        for &n in group {
            let Node::Storage(storage) = system.node(n) else {
                continue;
            };
            let investment = storage.investment.as_ref().ok_or_else(|| {
                EnflowError::Config(format!(
                    "storage '{}' grouped as investment storage without an \
                     investment descriptor",
                    storage.label
                ))
            })?;
            let (input, output) = storage_connections(system, n, &storage.label)?;

            let invest = problem.add_var(
                format!("invest[{}]", storage.label),
                0.0,
                investment.maximum,
            );

            // Bounds live in the max/min capacity constraints below, not on
            // the variable: the bound itself depends on the invest decision.
            let capacity: Vec<VarId> = space
                .time
                .steps()
                .map(|t| {
                    problem.add_var(
                        format!("capacity[{},{}]", storage.label, t),
                        0.0,
                        f64::INFINITY,
                    )
                })
                .collect();

            for t in space.time.steps() {
                let expr = balance_expr(space, storage, &capacity, input, n, output, t)?;
                problem.add_constraint(
                    format!("storage_balance[{},{}]", storage.label, t),
                    expr,
                    Relation::Eq,
                );
            }

            if let Some(initial) = storage.initial_capacity {
                let expr = LinExpr::from(capacity[space.time.last()]) - initial * invest;
                problem.add_constraint(
                    format!("initial_capacity[{}]", storage.label),
                    expr,
                    Relation::Eq,
                );
            }

            // Couple the storage sizing to the connecting flows' sizing.
            if let Some(ratio) = storage.nominal_input_capacity_ratio {
                let flow_invest = space.invest(input, n).ok_or_else(|| {
                    EnflowError::Network(format!(
                        "input flow of storage '{}' carries no investment",
                        storage.label
                    ))
                })?;
                let expr = LinExpr::from(flow_invest) - ratio * invest;
                problem.add_constraint(
                    format!("storage_capacity_inflow[{}]", storage.label),
                    expr,
                    Relation::Eq,
                );
            }
            if let Some(ratio) = storage.nominal_output_capacity_ratio {
                let flow_invest = space.invest(n, output).ok_or_else(|| {
                    EnflowError::Network(format!(
                        "output flow of storage '{}' carries no investment",
                        storage.label
                    ))
                })?;
                let expr = LinExpr::from(flow_invest) - ratio * invest;
                problem.add_constraint(
                    format!("storage_capacity_outflow[{}]", storage.label),
                    expr,
                    Relation::Eq,
                );
            }

            for t in space.time.steps() {
                let expr =
                    LinExpr::from(capacity[t]) - storage.capacity_max.value(t) * invest;
                problem.add_constraint(
                    format!("max_capacity[{},{}]", storage.label, t),
                    expr,
                    Relation::Le,
                );
            }

            // A lower bound of zero is already the variable's domain; only
            // emit min-capacity constraints when some fraction is positive.
            if storage.capacity_min.sum(space.time.len()) > 0.0 {
                for t in space.time.steps() {
                    let expr =
                        LinExpr::from(capacity[t]) - storage.capacity_min.value(t) * invest;
                    problem.add_constraint(
                        format!("min_capacity[{},{}]", storage.label, t),
                        expr,
                        Relation::Ge,
                    );
                }
            }

            self.costs
                .push((invest, investment.ep_costs, storage.label.clone()));
            self.capacity.insert(n, capacity);
            self.invest.insert(n, invest);
        }
        debug!(storages = group.len(), "investment storages created");
        Ok(())
    }

    fn objective_expression(&self) -> EnflowResult<LinExpr> {
        let mut expr = LinExpr::new();
        for (invest, ep_costs, label) in &self.costs {
            match ep_costs {
                Some(costs) => expr += *costs * *invest,
                None => {
                    return Err(EnflowError::MissingCost(format!(
                        "storage '{}': investment without ep_costs",
                        label
                    )))
                }
            }
        }
        Ok(expr)
    }
}
