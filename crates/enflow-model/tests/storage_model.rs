//! Storage constraint-block tests: variable bounds, the cyclic balance
//! recurrence and the investment-sizing coupling.

use enflow_core::{BusId, EnergySystem, EnflowError, Flow, Investment, NodeIndex, Storage};
use enflow_model::{OperationalModel, Problem, TimeIndex, VarId};

fn var_id(problem: &Problem, name: &str) -> VarId {
    VarId::new(
        problem
            .vars()
            .iter()
            .position(|def| def.name == name)
            .unwrap_or_else(|| panic!("no variable named {}", name)),
    )
}

/// One bus, one storage; inflow 100 at t=0 only, outflow zero throughout.
fn plain_storage_system() -> (EnergySystem, NodeIndex) {
    let mut system = EnergySystem::new();
    let bel = system.add_bus(BusId::new(0), "electricity");
    let storage = Storage::new("battery")
        .with_nominal_capacity(1000.0)
        .with_capacity_loss(0.01)
        .with_conversion_factors(0.9, 0.93)
        .with_capacity_bounds(0.0, 0.9)
        .with_initial_capacity(0.0);
    let node = system
        .add_storage(
            storage,
            (
                bel,
                Flow::new()
                    .with_nominal_value(100.0)
                    .with_fixed_values(vec![1.0, 0.0, 0.0]),
            ),
            (
                bel,
                Flow::new().with_nominal_value(100.0).with_fixed_values(0.0),
            ),
        )
        .unwrap();
    (system, node)
}

#[test]
fn capacity_bounds_follow_nominal_capacity_and_fractions() {
    let (system, _) = plain_storage_system();
    let model = OperationalModel::new(system, TimeIndex::new(3, 1.0)).unwrap();
    let problem = model.problem();

    let cap0 = problem.var(var_id(problem, "capacity[battery,0]"));
    assert_eq!(cap0.lower, 0.0);
    assert_eq!(cap0.upper, 900.0);

    // The initial level fixes the *last* timestep; the cyclic balance makes
    // it the start-of-horizon level too.
    let cap2 = problem.var(var_id(problem, "capacity[battery,2]"));
    assert_eq!(cap2.lower, 0.0);
    assert_eq!(cap2.upper, 0.0);
}

#[test]
fn balance_recurrence_reproduces_forward_simulation() {
    let (system, _) = plain_storage_system();
    let model = OperationalModel::new(system, TimeIndex::new(3, 1.0)).unwrap();
    let problem = model.problem();

    // The balance at t=0 must reference the last step's level (wrap).
    let wrap = problem.constraint("storage_balance[battery,0]").unwrap();
    let cap2 = var_id(problem, "capacity[battery,2]");
    assert!((wrap.expr.coefficient(cap2) + 0.99).abs() < 1e-12);

    let inflows = [100.0, 0.0, 0.0];
    let mut level_prev = 0.0; // fixed last-step level
    let mut levels = Vec::new();
    for t in 0..3 {
        let balance = problem
            .constraint(&format!("storage_balance[battery,{}]", t))
            .unwrap();
        let cap_t = var_id(problem, &format!("capacity[battery,{}]", t));
        let cap_prev = var_id(
            problem,
            &format!("capacity[battery,{}]", if t == 0 { 2 } else { t - 1 }),
        );
        let inflow = var_id(problem, &format!("flow[electricity:battery,{}]", t));
        let outflow = var_id(problem, &format!("flow[battery:electricity,{}]", t));

        // expr == 0  =>  level[t] = -(sum of the other terms) / coef(cap_t)
        let level = -(balance.expr.coefficient(cap_prev) * level_prev
            + balance.expr.coefficient(inflow) * inflows[t]
            + balance.expr.coefficient(outflow) * 0.0)
            / balance.expr.coefficient(cap_t);
        levels.push(level);
        level_prev = level;
    }

    // level[0] = 0 * 0.99 + 100 * 0.9 = 90, then decay by 1% per step.
    assert!((levels[0] - 90.0).abs() < 1e-9);
    assert!((levels[1] - 89.1).abs() < 1e-9);
    assert!((levels[2] - 88.209).abs() < 1e-9);
}

#[test]
fn balance_applies_conversion_factors_and_duration() {
    let (system, _) = plain_storage_system();
    // Half-hour steps: the flow terms scale with the duration.
    let model = OperationalModel::new(system, TimeIndex::new(3, 0.5)).unwrap();
    let problem = model.problem();

    let balance = problem.constraint("storage_balance[battery,1]").unwrap();
    let inflow = var_id(problem, "flow[electricity:battery,1]");
    let outflow = var_id(problem, "flow[battery:electricity,1]");
    assert!((balance.expr.coefficient(inflow) + 0.9 * 0.5).abs() < 1e-12);
    assert!((balance.expr.coefficient(outflow) - 0.5 / 0.93).abs() < 1e-12);
}

fn investment_storage_system(storage: Storage) -> (EnergySystem, NodeIndex) {
    let mut system = EnergySystem::new();
    let bel = system.add_bus(BusId::new(0), "electricity");
    let node = system
        .add_storage(storage, (bel, Flow::new()), (bel, Flow::new()))
        .unwrap();
    (system, node)
}

#[test]
fn invest_variable_is_bounded_by_the_descriptor() {
    let storage = Storage::new("battery")
        .with_investment(Investment::new(50.0).with_maximum(500.0));
    let (system, node) = investment_storage_system(storage);
    let model = OperationalModel::new(system, TimeIndex::new(3, 1.0)).unwrap();
    let problem = model.problem();

    let invest = model.storage_invest_var(node).unwrap();
    assert_eq!(problem.var(invest).lower, 0.0);
    assert_eq!(problem.var(invest).upper, 500.0);

    // Level bounds are decision-dependent and live in constraints, not on
    // the variable.
    let cap = problem.var(var_id(problem, "capacity[battery,1]"));
    assert_eq!(cap.lower, 0.0);
    assert!(cap.upper.is_infinite());
    assert_eq!(problem.constraints_with_prefix("max_capacity[battery").count(), 3);
}

#[test]
fn sizing_couples_storage_and_flow_investments() {
    let storage = Storage::new("battery")
        .with_investment(Investment::new(50.0))
        .with_capacity_ratios(1.0 / 6.0, 1.0 / 4.0);
    let (system, node) = investment_storage_system(storage);
    let model = OperationalModel::new(system, TimeIndex::new(3, 1.0)).unwrap();
    let problem = model.problem();

    let invest = model.storage_invest_var(node).unwrap();
    let inflow_invest = var_id(problem, "invest_flow[electricity:battery]");
    let coupling = problem.constraint("storage_capacity_inflow[battery]").unwrap();
    assert_eq!(coupling.expr.coefficient(inflow_invest), 1.0);
    assert!((coupling.expr.coefficient(invest) + 1.0 / 6.0).abs() < 1e-12);

    let outflow_invest = var_id(problem, "invest_flow[battery:electricity]");
    let coupling = problem
        .constraint("storage_capacity_outflow[battery]")
        .unwrap();
    assert_eq!(coupling.expr.coefficient(outflow_invest), 1.0);
    assert!((coupling.expr.coefficient(invest) + 0.25).abs() < 1e-12);
}

#[test]
fn initial_capacity_binds_last_level_to_the_invest_decision() {
    let storage = Storage::new("battery")
        .with_investment(Investment::new(50.0))
        .with_initial_capacity(0.5);
    let (system, node) = investment_storage_system(storage);
    let model = OperationalModel::new(system, TimeIndex::new(3, 1.0)).unwrap();
    let problem = model.problem();

    let invest = model.storage_invest_var(node).unwrap();
    let cap2 = var_id(problem, "capacity[battery,2]");
    let initial = problem.constraint("initial_capacity[battery]").unwrap();
    assert_eq!(initial.expr.coefficient(cap2), 1.0);
    assert_eq!(initial.expr.coefficient(invest), -0.5);
}

#[test]
fn min_capacity_is_only_created_for_positive_fractions() {
    let zero_min = Storage::new("battery").with_investment(Investment::new(50.0));
    let (system, _) = investment_storage_system(zero_min);
    let model = OperationalModel::new(system, TimeIndex::new(3, 1.0)).unwrap();
    assert_eq!(
        model
            .problem()
            .constraints_with_prefix("min_capacity[battery")
            .count(),
        0
    );

    let positive_min = Storage::new("battery")
        .with_investment(Investment::new(50.0))
        .with_capacity_bounds(vec![0.0, 0.1, 0.0], 1.0);
    let (system, _) = investment_storage_system(positive_min);
    let model = OperationalModel::new(system, TimeIndex::new(3, 1.0)).unwrap();
    assert_eq!(
        model
            .problem()
            .constraints_with_prefix("min_capacity[battery")
            .count(),
        3
    );
}

#[test]
fn investment_objective_prices_the_invested_capacity() {
    let storage = Storage::new("battery").with_investment(Investment::new(50.0));
    let (system, node) = investment_storage_system(storage);
    let model = OperationalModel::new(system, TimeIndex::new(3, 1.0)).unwrap();

    let invest = model.storage_invest_var(node).unwrap();
    assert_eq!(model.problem().objective().coefficient(invest), 50.0);
}

#[test]
fn missing_investment_costs_are_fatal_at_objective_assembly() {
    let storage = Storage::new("battery").with_investment(Investment::default());
    let mut system = EnergySystem::new();
    let bel = system.add_bus(BusId::new(0), "electricity");
    system
        .add_storage(storage, (bel, Flow::new()), (bel, Flow::new()))
        .unwrap();

    let err = OperationalModel::new(system, TimeIndex::new(3, 1.0)).unwrap_err();
    assert!(matches!(err, EnflowError::MissingCost(_)));
}

#[test]
fn rebuilding_the_objective_is_idempotent() {
    let storage = Storage::new("battery").with_investment(Investment::new(50.0));
    let (system, node) = investment_storage_system(storage);
    let mut model = OperationalModel::new(system, TimeIndex::new(3, 1.0)).unwrap();
    let invest = model.storage_invest_var(node).unwrap();

    model.rebuild_objective().unwrap();
    model.rebuild_objective().unwrap();
    // The previous objective component is discarded, not accumulated.
    assert_eq!(model.problem().objective().coefficient(invest), 50.0);
}
