//! Solver collaborator boundary.
//!
//! Lowers the finalized problem records into good_lp and delegates to the
//! selected backend. Solver failure modes (infeasibility, unboundedness,
//! crashes) are passed through unmodified; this layer does not interpret
//! solver status codes.

use std::time::Instant;

use good_lp::solvers::clarabel::clarabel;
use good_lp::{constraint, variable, variables, Expression, Solution, SolverModel, Variable};
use tracing::debug;

use enflow_core::{EnflowError, EnflowResult};

use crate::problem::{LinExpr, ObjectiveSense, Problem, Relation};

/// The available solver backends.
///
/// Clarabel ships as pure Rust and handles every continuous problem this
/// crate emits; exact mixed-integer solves need the `solver-highs` feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverBackend {
    /// Clarabel interior-point solver (pure Rust, LPs and relaxations).
    Clarabel,
    /// HiGHS LP/MIP solver.
    #[cfg(feature = "solver-highs")]
    Highs,
}

impl SolverBackend {
    pub fn display_name(&self) -> &'static str {
        match self {
            SolverBackend::Clarabel => "Clarabel",
            #[cfg(feature = "solver-highs")]
            SolverBackend::Highs => "HiGHS",
        }
    }
}

/// Primal values of a finished solve, dense over [`crate::problem::VarId`].
#[derive(Debug)]
pub(crate) struct SolverOutcome {
    pub values: Vec<f64>,
}

pub(crate) fn solve(problem: &Problem, backend: SolverBackend) -> EnflowResult<SolverOutcome> {
    match backend {
        SolverBackend::Clarabel => {
            if problem.has_integer_vars() {
                return Err(EnflowError::Solver(
                    "Clarabel cannot handle integer domains; call relax_problem() \
                     first or use a MIP backend"
                        .into(),
                ));
            }
            solve_with_clarabel(problem)
        }
        #[cfg(feature = "solver-highs")]
        SolverBackend::Highs => solve_with_highs(problem),
    }
}

fn lower_expr(expr: &LinExpr, lp_vars: &[Variable]) -> Expression {
    let mut lowered = Expression::from(expr.constant);
    for (var, coefficient) in &expr.terms {
        lowered += *coefficient * lp_vars[var.value()];
    }
    lowered
}

fn solve_with_clarabel(problem: &Problem) -> EnflowResult<SolverOutcome> {
    let start = Instant::now();

    let mut vars = variables!();
    let lp_vars: Vec<Variable> = problem
        .vars()
        .iter()
        .map(|def| vars.add(variable().min(def.lower).max(def.upper)))
        .collect();

    let objective = lower_expr(problem.objective(), &lp_vars);
    let mut model = match problem.sense() {
        ObjectiveSense::Minimize => vars.minimise(objective).using(clarabel),
        ObjectiveSense::Maximize => vars.maximise(objective).using(clarabel),
    };

    for def in problem.constraints() {
        let expr = lower_expr(&def.expr, &lp_vars);
        model = match def.relation {
            Relation::Eq => model.with(constraint!(expr == 0.0)),
            Relation::Le => model.with(constraint!(expr <= 0.0)),
            Relation::Ge => model.with(constraint!(expr >= 0.0)),
        };
    }

    let solution = model
        .solve()
        .map_err(|e| EnflowError::Solver(format!("{:?}", e)))?;

    let values = lp_vars.iter().map(|&v| solution.value(v)).collect();
    debug!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "clarabel solve finished"
    );
    Ok(SolverOutcome { values })
}

#[cfg(feature = "solver-highs")]
fn solve_with_highs(problem: &Problem) -> EnflowResult<SolverOutcome> {
    use crate::problem::Domain;
    use good_lp::solvers::highs::highs;

    let start = Instant::now();

    let mut vars = variables!();
    let lp_vars: Vec<Variable> = problem
        .vars()
        .iter()
        .map(|def| {
            let mut definition = variable().min(def.lower).max(def.upper);
            definition = match def.domain {
                Domain::Continuous => definition,
                Domain::Integer => definition.integer(),
                Domain::Binary => definition.binary(),
            };
            vars.add(definition)
        })
        .collect();

    let objective = lower_expr(problem.objective(), &lp_vars);
    let mut model = match problem.sense() {
        ObjectiveSense::Minimize => vars.minimise(objective).using(highs),
        ObjectiveSense::Maximize => vars.maximise(objective).using(highs),
    };

    for def in problem.constraints() {
        let expr = lower_expr(&def.expr, &lp_vars);
        model = match def.relation {
            Relation::Eq => model.with(constraint!(expr == 0.0)),
            Relation::Le => model.with(constraint!(expr <= 0.0)),
            Relation::Ge => model.with(constraint!(expr >= 0.0)),
        };
    }

    let solution = model
        .solve()
        .map_err(|e| EnflowError::Solver(format!("{:?}", e)))?;

    let values = lp_vars.iter().map(|&v| solution.value(v)).collect();
    debug!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "highs solve finished"
    );
    Ok(SolverOutcome { values })
}
