//! Component definitions for storages and combined-heat-and-power plants.
//!
//! These records attach physical and economic parameters to topology nodes
//! and perform cross-parameter validation at construction. The matching
//! constraint blocks live in `enflow-model`; a component never carries
//! solver state.

use faer::prelude::SpSolver;
use faer::{FaerMat, Mat};
use serde::{Deserialize, Serialize};

use crate::error::{EnflowError, EnflowResult};
use crate::sequence::Sequence;
use crate::BusId;

/// Descriptor for an optimizer-sized capacity.
///
/// When present on a component or flow, its nominal size becomes a decision
/// variable bounded by `maximum`, priced at `ep_costs` per unit and year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    /// Upper bound on the invested size.
    pub maximum: f64,
    /// Equivalent periodical (annualized) costs per unit of invested size.
    pub ep_costs: Option<f64>,
}

impl Default for Investment {
    fn default() -> Self {
        Self {
            maximum: f64::INFINITY,
            ep_costs: None,
        }
    }
}

impl Investment {
    pub fn new(ep_costs: f64) -> Self {
        Self {
            maximum: f64::INFINITY,
            ep_costs: Some(ep_costs),
        }
    }

    pub fn with_maximum(mut self, maximum: f64) -> Self {
        self.maximum = maximum;
        self
    }
}

/// An energy storage with conversion losses on both connections.
///
/// The capacity is either fixed (`nominal_capacity`) or sized by the
/// optimizer (`investment`), never both. `initial_capacity` is the level
/// fraction fixed at the last timestep; the cyclic balance makes it the
/// start-of-horizon level as well.
#[derive(Debug, Clone)]
pub struct Storage {
    pub label: String,
    pub nominal_capacity: Option<f64>,
    /// Ratio between the nominal inflow and the capacity (c-rate). Sets the
    /// input flow's nominal value when the storage itself has one.
    pub nominal_input_capacity_ratio: Option<f64>,
    pub nominal_output_capacity_ratio: Option<f64>,
    /// Level fraction at the first (and, via the cyclic balance, last) step.
    pub initial_capacity: Option<f64>,
    /// Relative capacity loss between two consecutive timesteps.
    pub capacity_loss: Sequence,
    pub inflow_conversion_factor: Sequence,
    pub outflow_conversion_factor: Sequence,
    /// Minimum level as fraction of the nominal capacity.
    pub capacity_min: Sequence,
    /// Maximum level as fraction of the nominal capacity.
    pub capacity_max: Sequence,
    pub investment: Option<Investment>,
}

impl Storage {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            nominal_capacity: None,
            nominal_input_capacity_ratio: None,
            nominal_output_capacity_ratio: None,
            initial_capacity: None,
            capacity_loss: Sequence::Constant(0.0),
            inflow_conversion_factor: Sequence::Constant(1.0),
            outflow_conversion_factor: Sequence::Constant(1.0),
            capacity_min: Sequence::Constant(0.0),
            capacity_max: Sequence::Constant(1.0),
            investment: None,
        }
    }

    pub fn with_nominal_capacity(mut self, nominal_capacity: f64) -> Self {
        self.nominal_capacity = Some(nominal_capacity);
        self
    }

    pub fn with_capacity_ratios(mut self, input: f64, output: f64) -> Self {
        self.nominal_input_capacity_ratio = Some(input);
        self.nominal_output_capacity_ratio = Some(output);
        self
    }

    pub fn with_initial_capacity(mut self, fraction: f64) -> Self {
        self.initial_capacity = Some(fraction);
        self
    }

    pub fn with_capacity_loss(mut self, loss: impl Into<Sequence>) -> Self {
        self.capacity_loss = loss.into();
        self
    }

    pub fn with_conversion_factors(
        mut self,
        inflow: impl Into<Sequence>,
        outflow: impl Into<Sequence>,
    ) -> Self {
        self.inflow_conversion_factor = inflow.into();
        self.outflow_conversion_factor = outflow.into();
        self
    }

    pub fn with_capacity_bounds(
        mut self,
        min: impl Into<Sequence>,
        max: impl Into<Sequence>,
    ) -> Self {
        self.capacity_min = min.into();
        self.capacity_max = max.into();
        self
    }

    pub fn with_investment(mut self, investment: Investment) -> Self {
        self.investment = Some(investment);
        self
    }

    /// Component-local configuration check: the invest variable replaces the
    /// nominal capacity, so only one of the two may be set.
    pub fn validate(&self) -> EnflowResult<()> {
        if self.investment.is_some() && self.nominal_capacity.is_some() {
            return Err(EnflowError::Config(format!(
                "storage '{}': the invest variable replaces the nominal capacity, \
                 leave nominal_capacity unset",
                self.label
            )));
        }
        Ok(())
    }
}

/// Electrical operating range of a CHP without district-heat extraction.
///
/// Minimum/maximum power and the efficiencies at those points; all four
/// series must cover the same horizon.
#[derive(Debug, Clone)]
pub struct ChpOperatingRange {
    pub p_min: Sequence,
    pub eta_min: Sequence,
    pub p_max: Sequence,
    pub eta_max: Sequence,
}

/// Linear fuel-consumption coefficients per timestep, solved from the
/// declared operating range (see [`GenericChp::calculate_alphas`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Alphas {
    pub alpha0: Vec<f64>,
    pub alpha1: Vec<f64>,
}

/// A combined-heat-and-power plant in mixed-integer formulation.
///
/// Models extraction or back-pressure turbines via a two-segment piecewise
/// linear envelope with an on/off indicator. More accurate than
/// [`ExtractionTurbineChp`] at the price of binary variables.
///
/// Formulation after Mollenhauer, Christidis & Tsatsaronis (2016),
/// doi:10.1007/s40095-016-0204-6.
#[derive(Debug, Clone)]
pub struct GenericChp {
    pub label: String,
    /// Bus receiving the electrical output.
    pub electrical_bus: BusId,
    /// Bus receiving the heat output.
    pub heat_bus: BusId,
    pub electrical: ChpOperatingRange,
    /// Power-loss factor of heat extraction.
    pub beta: Sequence,
    /// Back-pressure turbines have no independent condensing path, turning
    /// the energy balance into an exact equality.
    pub back_pressure: bool,
    /// Flue-gas losses at maximum fuel flow as share of the fuel flow.
    pub flue_gas_share_max: Sequence,
    /// Flue-gas losses at minimum fuel flow, e.g. for motoric CHPs. Absent
    /// means the minimum-loss constraints are not generated at all.
    pub flue_gas_share_min: Option<Sequence>,
    /// Minimum cooling-water heat flow.
    pub q_cw_min: Sequence,
}

impl GenericChp {
    /// Solve the 2x2 linear system
    /// `[[1, P_min], [1, P_max]] * [a0, a1] = [P_min/eta_min, P_max/eta_max]`
    /// for every timestep.
    ///
    /// All four operating-range series must cover the `n_steps` horizon;
    /// mismatched explicit lengths are a hard validation error.
    pub fn calculate_alphas(&self, n_steps: usize) -> EnflowResult<Alphas> {
        let attrs = [
            &self.electrical.p_min,
            &self.electrical.eta_min,
            &self.electrical.p_max,
            &self.electrical.eta_max,
        ];
        if attrs
            .iter()
            .any(|seq| seq.len().map(|len| len != n_steps).unwrap_or(false))
        {
            return Err(EnflowError::Validation(format!(
                "CHP '{}': operating-range series to calculate alphas must all \
                 be of dimension {}",
                self.label, n_steps
            )));
        }

        let mut alpha0 = Vec::with_capacity(n_steps);
        let mut alpha1 = Vec::with_capacity(n_steps);
        for t in 0..n_steps {
            let p_min = self.electrical.p_min.value(t);
            let p_max = self.electrical.p_max.value(t);
            let mut a = Mat::zeros(2, 2);
            a.write(0, 0, 1.0);
            a.write(0, 1, p_min);
            a.write(1, 0, 1.0);
            a.write(1, 1, p_max);
            let mut b = Mat::zeros(2, 1);
            b.write(0, 0, p_min / self.electrical.eta_min.value(t));
            b.write(1, 0, p_max / self.electrical.eta_max.value(t));

            let x = a.partial_piv_lu().solve(&b);
            let (a0, a1) = (x.read(0, 0), x.read(1, 0));
            if !a0.is_finite() || !a1.is_finite() {
                return Err(EnflowError::Validation(format!(
                    "CHP '{}': singular operating range at step {} \
                     (P_min == P_max?)",
                    self.label, t
                )));
            }
            alpha0.push(a0);
            alpha1.push(a1);
        }
        Ok(Alphas { alpha0, alpha1 })
    }
}

/// A two-output extraction turbine in a linear model.
///
/// One main output (named by the full-condensation factor) is tapped by the
/// remaining output. Conversion factors are declared for full CHP mode per
/// output, plus the main output's efficiency with no tapped flow.
#[derive(Debug, Clone)]
pub struct ExtractionTurbineChp {
    pub label: String,
    /// Conversion factor per output bus in full CHP mode.
    pub conversion_factors: Vec<(BusId, Sequence)>,
    /// Efficiency of the main output with no tapped flow; the bus named
    /// here is the main output, the other output is the tapped one.
    pub full_condensation_factor: (BusId, Sequence),
}

impl ExtractionTurbineChp {
    /// The bus carrying the main output flow.
    pub fn main_bus(&self) -> BusId {
        self.full_condensation_factor.0
    }

    pub fn conversion_factor(&self, bus: BusId) -> Option<&Sequence> {
        self.conversion_factors
            .iter()
            .find(|(b, _)| *b == bus)
            .map(|(_, seq)| seq)
    }
}

/// A plain conversion node: every output is the input scaled by a
/// per-timestep conversion factor.
#[derive(Debug, Clone)]
pub struct LinearTransformer {
    pub label: String,
    pub conversion_factors: Vec<(BusId, Sequence)>,
}
