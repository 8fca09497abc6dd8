//! # enflow-model: Constraint Generation and Model Assembly
//!
//! Turns an [`enflow_core::EnergySystem`] topology plus per-component
//! parameters into a linear (or mixed-integer linear) problem description,
//! and delegates the solve to a backend.
//!
//! ## Architecture
//!
//! | Layer | Responsibility |
//! |-------|----------------|
//! | [`problem`] | Immutable variable/constraint/objective records |
//! | [`blocks`] | One constraint block per component family |
//! | [`model`] | Flow-variable space, time bookkeeping, orchestration |
//! | [`solver`] | Lowering into good_lp, Clarabel/HiGHS delegation |
//!
//! The assembler builds the global flow-variable space, computes the
//! wrap-around time index, asks every block to create its variables and
//! constraints for the node subset of its family, and sums the blocks'
//! objective contributions. Blocks keep all derived state locally; shared
//! component records are never mutated during assembly.
//!
//! ## Example
//!
//! ```rust,no_run
//! use enflow_core::{BusId, EnergySystem, Flow, Node, Sink, Source};
//! use enflow_model::{OperationalModel, SolverBackend, TimeIndex};
//!
//! # fn main() -> enflow_core::EnflowResult<()> {
//! let mut system = EnergySystem::new();
//! let bel = system.add_bus(BusId::new(0), "electricity");
//!
//! let plant = system.add_node(Node::Source(Source { label: "plant".into() }));
//! system.add_flow(
//!     plant,
//!     bel,
//!     Flow::new().with_nominal_value(100.0).with_variable_costs(30.0),
//! );
//!
//! let demand = system.add_node(Node::Sink(Sink { label: "demand".into() }));
//! system.add_flow(
//!     bel,
//!     demand,
//!     Flow::new().with_nominal_value(50.0).with_fixed_values(1.0),
//! );
//!
//! let mut model = OperationalModel::new(system, TimeIndex::new(24, 1.0))?;
//! model.solve(SolverBackend::Clarabel)?;
//! let results = model.results()?;
//! println!("dispatch costs: {:.2}", results.objective);
//! # Ok(())
//! # }
//! ```

pub mod blocks;
pub mod model;
pub mod problem;
pub mod solver;
pub mod time;

pub use model::{ModelResults, ModelSpace, OperationalModel};
pub use problem::{
    ConstraintDef, Domain, LinExpr, ObjectiveSense, Problem, ProblemStats, Relation, VarDef, VarId,
};
pub use solver::SolverBackend;
pub use time::TimeIndex;
