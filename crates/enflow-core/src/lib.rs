//! # enflow-core: Energy System Topology Core
//!
//! Data structures for energy-system graphs consumed by the dispatch and
//! capacity-planning optimizer in `enflow-model`.
//!
//! ## Design
//!
//! Topologies are modeled as **directed graphs** where:
//! - **Nodes**: buses, sources, sinks and energy converters (transformers,
//!   storages, CHP plants)
//! - **Edges**: [`Flow`]s, time-indexed quantities moving between two nodes,
//!   bounded by a nominal capacity and per-step fraction limits
//!
//! The graph is kept explicit (public `petgraph` field, as in all enflow
//! crates' upstream consumers) so model assembly can iterate nodes and edges
//! without an extra indirection layer.
//!
//! ## Quick Start
//!
//! ```rust
//! use enflow_core::*;
//!
//! let mut system = EnergySystem::new();
//! let bel = system.add_bus(BusId::new(0), "electricity");
//!
//! // A wind source feeding the bus, and a demand drawing from it.
//! let wind = system.add_node(Node::Source(Source { label: "wind".into() }));
//! system.add_flow(wind, bel, Flow::new().with_nominal_value(80.0));
//!
//! let demand = system.add_node(Node::Sink(Sink { label: "demand".into() }));
//! system.add_flow(bel, demand, Flow::new().with_nominal_value(50.0));
//!
//! assert_eq!(system.outputs(bel).len(), 1);
//! ```
//!
//! ## Modules
//!
//! - [`components`] - storage and CHP component records with validation
//! - [`sequence`] - scalar-or-series parameter broadcasting
//! - [`error`] - unified error type

use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

pub mod components;
pub mod error;
pub mod sequence;

pub use components::{
    Alphas, ChpOperatingRange, ExtractionTurbineChp, GenericChp, Investment, LinearTransformer,
    Storage,
};
pub use error::{EnflowError, EnflowResult};
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use sequence::Sequence;

// Newtype wrapper for bus IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);

impl BusId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BusId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// A balance point of the energy system; everything connects via buses.
#[derive(Debug, Clone)]
pub struct Bus {
    pub id: BusId,
    pub label: String,
}

/// A node producing a commodity (fuel supply, feed-in, ...).
#[derive(Debug, Clone)]
pub struct Source {
    pub label: String,
}

/// A node consuming a commodity (demand, export, ...).
#[derive(Debug, Clone)]
pub struct Sink {
    pub label: String,
}

/// Closed set of node kinds; the constraint-block grouping in
/// `enflow-model` matches exhaustively over this enum.
#[derive(Debug, Clone)]
pub enum Node {
    Bus(Bus),
    Source(Source),
    Sink(Sink),
    Transformer(LinearTransformer),
    Storage(Storage),
    GenericChp(GenericChp),
    ExtractionTurbineChp(ExtractionTurbineChp),
}

impl Node {
    pub fn label(&self) -> &str {
        match self {
            Node::Bus(bus) => &bus.label,
            Node::Source(source) => &source.label,
            Node::Sink(sink) => &sink.label,
            Node::Transformer(transformer) => &transformer.label,
            Node::Storage(storage) => &storage.label,
            Node::GenericChp(chp) => &chp.label,
            Node::ExtractionTurbineChp(chp) => &chp.label,
        }
    }
}

/// A directed, time-indexed quantity moving between two nodes.
///
/// The effective bound at timestep t is
/// `(nominal value | invested size) * (max|min fraction at t)`.
#[derive(Debug, Clone)]
pub struct Flow {
    /// Absolute capacity; `None` when the size is itself a decision
    /// variable (investment) or unbounded.
    pub nominal_value: Option<f64>,
    /// Lower bound per step as fraction of the nominal value.
    pub min: Sequence,
    /// Upper bound per step as fraction of the nominal value.
    pub max: Sequence,
    /// Pre-computed values as fraction of the nominal value.
    pub actual_value: Option<Sequence>,
    /// Fix the flow variable to `actual_value * nominal_value`.
    pub fixed: bool,
    /// Costs per unit of flow and hour.
    pub variable_costs: Option<Sequence>,
    /// Maximum upward ramp per step.
    pub positive_gradient: Option<Sequence>,
    /// Maximum downward ramp per step.
    pub negative_gradient: Option<Sequence>,
    pub investment: Option<Investment>,
}

impl Default for Flow {
    fn default() -> Self {
        Self {
            nominal_value: None,
            min: Sequence::Constant(0.0),
            max: Sequence::Constant(1.0),
            actual_value: None,
            fixed: false,
            variable_costs: None,
            positive_gradient: None,
            negative_gradient: None,
            investment: None,
        }
    }
}

impl Flow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nominal_value(mut self, nominal_value: f64) -> Self {
        self.nominal_value = Some(nominal_value);
        self
    }

    pub fn with_bounds(mut self, min: impl Into<Sequence>, max: impl Into<Sequence>) -> Self {
        self.min = min.into();
        self.max = max.into();
        self
    }

    /// Fix the flow to the given fraction series of the nominal value.
    pub fn with_fixed_values(mut self, actual: impl Into<Sequence>) -> Self {
        self.actual_value = Some(actual.into());
        self.fixed = true;
        self
    }

    pub fn with_variable_costs(mut self, costs: impl Into<Sequence>) -> Self {
        self.variable_costs = Some(costs.into());
        self
    }

    pub fn with_positive_gradient(mut self, limit: impl Into<Sequence>) -> Self {
        self.positive_gradient = Some(limit.into());
        self
    }

    pub fn with_negative_gradient(mut self, limit: impl Into<Sequence>) -> Self {
        self.negative_gradient = Some(limit.into());
        self
    }

    pub fn with_investment(mut self, investment: Investment) -> Self {
        self.investment = Some(investment);
        self
    }
}

/// The energy system graph handed to model assembly.
///
/// Plain nodes and edges can be inserted directly through the public graph;
/// the `add_*` helpers perform the cross-parameter validation that the
/// component families require at construction time.
#[derive(Debug, Default)]
pub struct EnergySystem {
    pub graph: DiGraph<Node, Flow>,
}

impl EnergySystem {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
        }
    }

    pub fn add_node(&mut self, node: Node) -> NodeIndex {
        self.graph.add_node(node)
    }

    pub fn add_bus(&mut self, id: BusId, label: impl Into<String>) -> NodeIndex {
        self.graph.add_node(Node::Bus(Bus {
            id,
            label: label.into(),
        }))
    }

    pub fn add_flow(&mut self, source: NodeIndex, target: NodeIndex, flow: Flow) -> EdgeIndex {
        self.graph.add_edge(source, target, flow)
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.graph[index]
    }

    /// The bus id of a node, if it is a bus.
    pub fn bus_id(&self, index: NodeIndex) -> Option<BusId> {
        match &self.graph[index] {
            Node::Bus(bus) => Some(bus.id),
            _ => None,
        }
    }

    /// Nodes feeding `index`, paired with the connecting edge.
    pub fn inputs(&self, index: NodeIndex) -> Vec<(NodeIndex, EdgeIndex)> {
        self.graph
            .edges_directed(index, Direction::Incoming)
            .map(|edge| (edge.source(), edge.id()))
            .collect()
    }

    /// Nodes fed by `index`, paired with the connecting edge.
    pub fn outputs(&self, index: NodeIndex) -> Vec<(NodeIndex, EdgeIndex)> {
        self.graph
            .edges_directed(index, Direction::Outgoing)
            .map(|edge| (edge.target(), edge.id()))
            .collect()
    }

    /// The outgoing edge of `node` that ends at the bus with the given id.
    pub fn output_to_bus(&self, node: NodeIndex, bus: BusId) -> Option<NodeIndex> {
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .find(|edge| matches!(&self.graph[edge.target()], Node::Bus(b) if b.id == bus))
            .map(|edge| edge.target())
    }

    pub fn flow(&self, edge: EdgeIndex) -> &Flow {
        &self.graph[edge]
    }

    /// All edges as `(source, target, flow)` in insertion order.
    pub fn flows(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, &Flow)> {
        self.graph
            .edge_references()
            .map(|edge| (edge.source(), edge.target(), edge.weight()))
    }

    /// Insert a storage with exactly one inflow and one outflow.
    ///
    /// Performs the construction-time validation of the storage family:
    /// sizing mode exclusivity, duplicate nominal-value definitions via
    /// capacity ratios, and the investment bookkeeping on the paired flows.
    pub fn add_storage(
        &mut self,
        storage: Storage,
        input: (NodeIndex, Flow),
        output: (NodeIndex, Flow),
    ) -> EnflowResult<NodeIndex> {
        storage.validate()?;

        let (input_bus, mut input_flow) = input;
        let (output_bus, mut output_flow) = output;
        prepare_storage_flow(
            &storage,
            &mut input_flow,
            storage.nominal_input_capacity_ratio,
            "input",
        )?;
        prepare_storage_flow(
            &storage,
            &mut output_flow,
            storage.nominal_output_capacity_ratio,
            "output",
        )?;

        let node = self.graph.add_node(Node::Storage(storage));
        self.graph.add_edge(input_bus, node, input_flow);
        self.graph.add_edge(node, output_bus, output_flow);
        Ok(node)
    }

    /// Insert a mixed-integer CHP with its fuel input and electrical/heat
    /// outputs. The output targets must be the buses the component declares.
    pub fn add_generic_chp(
        &mut self,
        chp: GenericChp,
        fuel: (NodeIndex, Flow),
        electrical: (NodeIndex, Flow),
        heat: (NodeIndex, Flow),
    ) -> EnflowResult<NodeIndex> {
        if self.bus_id(electrical.0) != Some(chp.electrical_bus) {
            return Err(EnflowError::Network(format!(
                "CHP '{}': electrical output target is not the declared bus",
                chp.label
            )));
        }
        if self.bus_id(heat.0) != Some(chp.heat_bus) {
            return Err(EnflowError::Network(format!(
                "CHP '{}': heat output target is not the declared bus",
                chp.label
            )));
        }
        let node = self.graph.add_node(Node::GenericChp(chp));
        self.graph.add_edge(fuel.0, node, fuel.1);
        self.graph.add_edge(node, electrical.0, electrical.1);
        self.graph.add_edge(node, heat.0, heat.1);
        Ok(node)
    }

    /// Insert an extraction turbine with one input and two outputs; which
    /// output is the main one follows from the full-condensation factor.
    pub fn add_extraction_turbine_chp(
        &mut self,
        chp: ExtractionTurbineChp,
        input: (NodeIndex, Flow),
        outputs: [(NodeIndex, Flow); 2],
    ) -> EnflowResult<NodeIndex> {
        let main_matches = outputs
            .iter()
            .filter(|(target, _)| self.bus_id(*target) == Some(chp.main_bus()))
            .count();
        if main_matches != 1 {
            return Err(EnflowError::Network(format!(
                "turbine '{}': exactly one output must end at the \
                 full-condensation bus",
                chp.label
            )));
        }
        for (target, _) in &outputs {
            let bus = self.bus_id(*target).ok_or_else(|| {
                EnflowError::Network(format!(
                    "turbine '{}': outputs must end at buses",
                    chp.label
                ))
            })?;
            if chp.conversion_factor(bus).is_none() {
                return Err(EnflowError::Config(format!(
                    "turbine '{}': no conversion factor for output bus '{}'",
                    chp.label,
                    self.graph[*target].label()
                )));
            }
        }
        let node = self.graph.add_node(Node::ExtractionTurbineChp(chp));
        self.graph.add_edge(input.0, node, input.1);
        let [a, b] = outputs;
        self.graph.add_edge(node, a.0, a.1);
        self.graph.add_edge(node, b.0, b.1);
        Ok(node)
    }

    /// Insert a linear transformer with one input and any number of outputs.
    pub fn add_transformer(
        &mut self,
        transformer: LinearTransformer,
        input: (NodeIndex, Flow),
        outputs: Vec<(NodeIndex, Flow)>,
    ) -> EnflowResult<NodeIndex> {
        for (target, _) in &outputs {
            let bus = self.bus_id(*target).ok_or_else(|| {
                EnflowError::Network(format!(
                    "transformer '{}': outputs must end at buses",
                    transformer.label
                ))
            })?;
            if !transformer.conversion_factors.iter().any(|(b, _)| *b == bus) {
                return Err(EnflowError::Config(format!(
                    "transformer '{}': no conversion factor for output bus '{}'",
                    transformer.label,
                    self.graph[*target].label()
                )));
            }
        }
        let node = self.graph.add_node(Node::Transformer(transformer));
        self.graph.add_edge(input.0, node, input.1);
        for (target, flow) in outputs {
            self.graph.add_edge(node, target, flow);
        }
        Ok(node)
    }
}

fn prepare_storage_flow(
    storage: &Storage,
    flow: &mut Flow,
    capacity_ratio: Option<f64>,
    side: &str,
) -> EnflowResult<()> {
    if storage.investment.is_some() && flow.nominal_value.is_some() {
        return Err(EnflowError::Config(format!(
            "storage '{}': the invest variable replaces the nominal value of \
             the {} flow, leave it unset",
            storage.label, side
        )));
    }
    if flow.nominal_value.is_some() && capacity_ratio.is_some() {
        return Err(EnflowError::Config(format!(
            "storage '{}': duplicate definition, the nominal_{}_capacity_ratio \
             already sets the {} flow's nominal value",
            storage.label, side, side
        )));
    }
    if storage.investment.is_none() {
        if let (Some(ratio), Some(capacity)) = (capacity_ratio, storage.nominal_capacity) {
            flow.nominal_value = Some(ratio * capacity);
        }
    } else if flow.investment.is_none() {
        // The sizing-coupling constraints need an invest variable on the
        // paired flow; its cost lives on the storage.
        flow.investment = Some(Investment::default());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus_and_storage_flows() -> (EnergySystem, NodeIndex) {
        let mut system = EnergySystem::new();
        let bus = system.add_bus(BusId::new(0), "electricity");
        (system, bus)
    }

    #[test]
    fn storage_derives_flow_nominal_values_from_ratios() {
        let (mut system, bus) = bus_and_storage_flows();
        let storage = Storage::new("battery")
            .with_nominal_capacity(1200.0)
            .with_capacity_ratios(1.0 / 6.0, 1.0 / 6.0);
        let node = system
            .add_storage(storage, (bus, Flow::new()), (bus, Flow::new()))
            .unwrap();

        let (_, in_edge) = system.inputs(node)[0];
        let (_, out_edge) = system.outputs(node)[0];
        assert_eq!(system.flow(in_edge).nominal_value, Some(200.0));
        assert_eq!(system.flow(out_edge).nominal_value, Some(200.0));
    }

    #[test]
    fn storage_rejects_ratio_next_to_explicit_nominal_value() {
        let (mut system, bus) = bus_and_storage_flows();
        let storage = Storage::new("battery")
            .with_nominal_capacity(1200.0)
            .with_capacity_ratios(1.0 / 6.0, 1.0 / 6.0);
        let result = system.add_storage(
            storage,
            (bus, Flow::new().with_nominal_value(100.0)),
            (bus, Flow::new()),
        );
        assert!(matches!(result, Err(EnflowError::Config(_))));
    }

    #[test]
    fn investment_storage_rejects_sized_flows() {
        let (mut system, bus) = bus_and_storage_flows();
        let storage = Storage::new("battery").with_investment(Investment::new(50.0));
        let result = system.add_storage(
            storage,
            (bus, Flow::new().with_nominal_value(100.0)),
            (bus, Flow::new()),
        );
        assert!(matches!(result, Err(EnflowError::Config(_))));
    }

    #[test]
    fn investment_storage_equips_flows_with_investment() {
        let (mut system, bus) = bus_and_storage_flows();
        let storage = Storage::new("battery").with_investment(Investment::new(50.0));
        let node = system
            .add_storage(storage, (bus, Flow::new()), (bus, Flow::new()))
            .unwrap();

        let (_, in_edge) = system.inputs(node)[0];
        let flow = system.flow(in_edge);
        assert!(flow.investment.is_some());
        assert_eq!(flow.investment.as_ref().unwrap().ep_costs, None);
    }

    #[test]
    fn generic_chp_validates_declared_buses() {
        let mut system = EnergySystem::new();
        let bgas = system.add_bus(BusId::new(0), "gas");
        let bel = system.add_bus(BusId::new(1), "electricity");
        let bth = system.add_bus(BusId::new(2), "heat");

        let chp = GenericChp {
            label: "chp".into(),
            electrical_bus: BusId::new(1),
            heat_bus: BusId::new(2),
            electrical: ChpOperatingRange {
                p_min: Sequence::Constant(50.0),
                eta_min: Sequence::Constant(0.4),
                p_max: Sequence::Constant(100.0),
                eta_max: Sequence::Constant(0.5),
            },
            beta: Sequence::Constant(0.12),
            back_pressure: false,
            flue_gas_share_max: Sequence::Constant(0.18),
            flue_gas_share_min: None,
            q_cw_min: Sequence::Constant(10.0),
        };

        // Heat and electrical targets swapped: must be rejected.
        let result = system.add_generic_chp(
            chp.clone(),
            (bgas, Flow::new()),
            (bth, Flow::new()),
            (bel, Flow::new()),
        );
        assert!(matches!(result, Err(EnflowError::Network(_))));

        let node = system
            .add_generic_chp(chp, (bgas, Flow::new()), (bel, Flow::new()), (bth, Flow::new()))
            .unwrap();
        assert_eq!(system.outputs(node).len(), 2);
        assert_eq!(system.inputs(node).len(), 1);
    }

    #[test]
    fn extraction_turbine_needs_conversion_factors_for_both_outputs() {
        let mut system = EnergySystem::new();
        let bgas = system.add_bus(BusId::new(0), "gas");
        let bel = system.add_bus(BusId::new(1), "electricity");
        let bth = system.add_bus(BusId::new(2), "heat");

        let turbine = ExtractionTurbineChp {
            label: "variable_chp".into(),
            conversion_factors: vec![(BusId::new(1), Sequence::Constant(0.3))],
            full_condensation_factor: (BusId::new(1), Sequence::Constant(0.5)),
        };
        let result = system.add_extraction_turbine_chp(
            turbine,
            (bgas, Flow::new()),
            [(bel, Flow::new()), (bth, Flow::new())],
        );
        assert!(matches!(result, Err(EnflowError::Config(_))));
    }

    #[test]
    fn output_to_bus_resolves_targets() {
        let mut system = EnergySystem::new();
        let bel = system.add_bus(BusId::new(7), "electricity");
        let source = system.add_node(Node::Source(Source {
            label: "plant".into(),
        }));
        system.add_flow(source, bel, Flow::new());

        assert_eq!(system.output_to_bus(source, BusId::new(7)), Some(bel));
        assert_eq!(system.output_to_bus(source, BusId::new(8)), None);
    }
}
