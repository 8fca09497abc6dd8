//! Combined-heat-and-power constraint blocks.
//!
//! [`GenericChpBlock`] implements the mixed-integer two-segment envelope
//! linking fuel consumption, electrical output and heat output via an
//! on/off indicator. [`ExtractionTurbineBlock`] is the purely linear
//! extraction-turbine model operating directly on the flow variables.

use std::collections::HashMap;

use enflow_core::{EnergySystem, EnflowError, EnflowResult, Node, NodeIndex};
use tracing::debug;

use super::ConstraintBlock;
use crate::model::ModelSpace;
use crate::problem::{LinExpr, Problem, Relation, VarId};

/// Block-local variable tables of one CHP instance.
#[derive(Debug)]
pub struct ChpVars {
    /// Fuel consumption.
    pub h_f: Vec<VarId>,
    /// Flue-gas loss at maximum fuel flow.
    pub h_l_fg_max: Vec<VarId>,
    /// Flue-gas loss at minimum fuel flow.
    pub h_l_fg_min: Vec<VarId>,
    /// Electrical output without district heating.
    pub p_wo_dh: Vec<VarId>,
    /// Electrical output.
    pub p: Vec<VarId>,
    /// Heat output.
    pub q: Vec<VarId>,
    /// On/off indicator.
    pub y: Vec<VarId>,
}

/// Binary-programming formulation of generic CHP plants.
#[derive(Debug, Default)]
pub struct GenericChpBlock {
    vars: HashMap<NodeIndex, ChpVars>,
}

impl GenericChpBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chp_vars(&self, n: NodeIndex) -> Option<&ChpVars> {
        self.vars.get(&n)
    }
}

impl ConstraintBlock for GenericChpBlock {
    fn create(
        &mut self,
        system: &EnergySystem,
        space: &ModelSpace,
        problem: &mut Problem,
        group: &[NodeIndex],
    ) -> EnflowResult<()> {
        for &n in group {
            let Node::GenericChp(chp) = system.node(n) else {
                continue;
            };
            let label = &chp.label;
            let (fuel, _) = *system.inputs(n).first().ok_or_else(|| {
                EnflowError::Network(format!("CHP '{}' has no fuel input", label))
            })?;
            let electrical = system.output_to_bus(n, chp.electrical_bus).ok_or_else(|| {
                EnflowError::Network(format!(
                    "CHP '{}' is not connected to its electrical bus",
                    label
                ))
            })?;
            let heat = system.output_to_bus(n, chp.heat_bus).ok_or_else(|| {
                EnflowError::Network(format!("CHP '{}' is not connected to its heat bus", label))
            })?;

            // Explicit precomputation of the fuel-model coefficients; held
            // block-locally for the model's lifetime.
            let alphas = chp.calculate_alphas(space.time.len())?;

            let series = |problem: &mut Problem, name: &str| -> Vec<VarId> {
                space
                    .time
                    .steps()
                    .map(|t| problem.add_var(format!("{}[{},{}]", name, label, t), 0.0, f64::INFINITY))
                    .collect()
            };
            let vars = ChpVars {
                h_f: series(problem, "H_F"),
                h_l_fg_max: series(problem, "H_L_FG_max"),
                h_l_fg_min: series(problem, "H_L_FG_min"),
                p_wo_dh: series(problem, "P_woDH"),
                p: series(problem, "P"),
                q: series(problem, "Q"),
                y: space
                    .time
                    .steps()
                    .map(|t| problem.add_binary(format!("Y[{},{}]", label, t)))
                    .collect(),
            };

            for t in space.time.steps() {
                let (a0, a1) = (alphas.alpha0[t], alphas.alpha1[t]);

                // Link fuel consumption and outputs to the flow variables.
                problem.add_constraint(
                    format!("H_flow[{},{}]", label, t),
                    LinExpr::from(vars.h_f[t]) - space.flow(fuel, n, t)?,
                    Relation::Eq,
                );
                problem.add_constraint(
                    format!("P_flow[{},{}]", label, t),
                    LinExpr::from(vars.p[t]) - space.flow(n, electrical, t)?,
                    Relation::Eq,
                );
                problem.add_constraint(
                    format!("Q_flow[{},{}]", label, t),
                    LinExpr::from(vars.q[t]) - space.flow(n, heat, t)?,
                    Relation::Eq,
                );

                // Fuel consumption without heat extraction.
                problem.add_constraint(
                    format!("H_F_1[{},{}]", label, t),
                    a0 * vars.y[t] + a1 * vars.p_wo_dh[t] - vars.h_f[t],
                    Relation::Eq,
                );
                // Fuel consumption under heat extraction with penalty beta.
                problem.add_constraint(
                    format!("H_F_2[{},{}]", label, t),
                    a0 * vars.y[t] + a1 * vars.p[t] + a1 * chp.beta.value(t) * vars.q[t]
                        - vars.h_f[t],
                    Relation::Eq,
                );
                // Operating envelope: when off (Y = 0) the fuel flow is
                // forced to exactly zero.
                let upper = chp.electrical.p_max.value(t) / chp.electrical.eta_max.value(t);
                problem.add_constraint(
                    format!("H_F_3[{},{}]", label, t),
                    LinExpr::from(vars.h_f[t]) - upper * vars.y[t],
                    Relation::Le,
                );
                let lower = chp.electrical.p_min.value(t) / chp.electrical.eta_min.value(t);
                problem.add_constraint(
                    format!("H_F_4[{},{}]", label, t),
                    LinExpr::from(vars.h_f[t]) - lower * vars.y[t],
                    Relation::Ge,
                );

                problem.add_constraint(
                    format!("H_L_FG_max_def[{},{}]", label, t),
                    chp.flue_gas_share_max.value(t) * vars.h_f[t] - vars.h_l_fg_max[t],
                    Relation::Eq,
                );
                // Back-pressure turbines have no independent condensing
                // path: the energy balance is exact.
                let q_max_res = LinExpr::from(vars.p[t])
                    + vars.q[t]
                    + vars.h_l_fg_max[t]
                    + chp.q_cw_min.value(t) * vars.y[t]
                    - vars.h_f[t];
                problem.add_constraint(
                    format!("Q_max_res[{},{}]", label, t),
                    q_max_res,
                    if chp.back_pressure {
                        Relation::Eq
                    } else {
                        Relation::Le
                    },
                );

                // Minimum flue-gas losses, e.g. for motoric CHPs; skipped
                // entirely when no share is declared.
                if let Some(share_min) = &chp.flue_gas_share_min {
                    problem.add_constraint(
                        format!("H_L_FG_min_def[{},{}]", label, t),
                        share_min.value(t) * vars.h_f[t] - vars.h_l_fg_min[t],
                        Relation::Eq,
                    );
                    let q_min_res = LinExpr::from(vars.p[t])
                        + vars.q[t]
                        + vars.h_l_fg_min[t]
                        + chp.q_cw_min.value(t) * vars.y[t]
                        - vars.h_f[t];
                    problem.add_constraint(
                        format!("Q_min_res[{},{}]", label, t),
                        q_min_res,
                        Relation::Ge,
                    );
                }
            }

            self.vars.insert(n, vars);
        }
        debug!(plants = group.len(), "generic CHP envelopes created");
        Ok(())
    }

    // No investment variant exists for this component; variable costs are
    // covered by the flow block.
}

/// Per-instance derived state of an extraction turbine.
#[derive(Debug, Clone)]
pub struct TurbineIndices {
    /// Feasible main/tapped output ratio per timestep.
    pub flow_relation: Vec<f64>,
    /// Efficiency penalty of tapping per timestep.
    pub main_flow_loss: Vec<f64>,
}

/// Linear extraction-turbine model: no bespoke variables, two relations on
/// the existing flow variables per timestep.
#[derive(Debug, Default)]
pub struct ExtractionTurbineBlock {
    indices: HashMap<NodeIndex, TurbineIndices>,
}

impl ExtractionTurbineBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turbine_indices(&self, n: NodeIndex) -> Option<&TurbineIndices> {
        self.indices.get(&n)
    }
}

impl ConstraintBlock for ExtractionTurbineBlock {
    fn create(
        &mut self,
        system: &EnergySystem,
        space: &ModelSpace,
        problem: &mut Problem,
        group: &[NodeIndex],
    ) -> EnflowResult<()> {
        for &n in group {
            let Node::ExtractionTurbineChp(turbine) = system.node(n) else {
                continue;
            };
            let label = &turbine.label;
            let (input, _) = *system.inputs(n).first().ok_or_else(|| {
                EnflowError::Network(format!("turbine '{}' has no input flow", label))
            })?;
            let main = system.output_to_bus(n, turbine.main_bus()).ok_or_else(|| {
                EnflowError::Network(format!(
                    "turbine '{}' is not connected to its main output bus",
                    label
                ))
            })?;
            let (tapped, _) = *system
                .outputs(n)
                .iter()
                .find(|(target, _)| *target != main)
                .ok_or_else(|| {
                    EnflowError::Network(format!("turbine '{}' has no tapped output", label))
                })?;
            let tapped_bus = system.bus_id(tapped).ok_or_else(|| {
                EnflowError::Network(format!(
                    "turbine '{}': tapped output does not end at a bus",
                    label
                ))
            })?;

            let cf_main = turbine
                .conversion_factor(turbine.main_bus())
                .ok_or_else(|| {
                    EnflowError::Config(format!(
                        "turbine '{}': no conversion factor for the main output",
                        label
                    ))
                })?;
            let cf_tapped = turbine.conversion_factor(tapped_bus).ok_or_else(|| {
                EnflowError::Config(format!(
                    "turbine '{}': no conversion factor for the tapped output",
                    label
                ))
            })?;
            let cf_condensation = &turbine.full_condensation_factor.1;

            let indices = TurbineIndices {
                flow_relation: space
                    .time
                    .steps()
                    .map(|t| cf_main.value(t) / cf_tapped.value(t))
                    .collect(),
                main_flow_loss: space
                    .time
                    .steps()
                    .map(|t| (cf_condensation.value(t) - cf_main.value(t)) / cf_tapped.value(t))
                    .collect(),
            };

            for t in space.time.steps() {
                // inflow = (main + tapped * loss_index) / eta_condensing,
                // cleared of the division.
                let expr = cf_condensation.value(t) * space.flow(input, n, t)?
                    - space.flow(n, main, t)?
                    - indices.main_flow_loss[t] * space.flow(n, tapped, t)?;
                problem.add_constraint(
                    format!("input_output_relation[{},{}]", label, t),
                    expr,
                    Relation::Eq,
                );

                // Feasible main/tapped output ratio.
                let expr = LinExpr::from(space.flow(n, main, t)?)
                    - indices.flow_relation[t] * space.flow(n, tapped, t)?;
                problem.add_constraint(
                    format!("out_flow_relation[{},{}]", label, t),
                    expr,
                    Relation::Ge,
                );
            }

            self.indices.insert(n, indices);
        }
        debug!(turbines = group.len(), "extraction turbines created");
        Ok(())
    }
}
