//! CHP constraint-block tests: the mixed-integer envelope of the generic
//! CHP and the linear extraction-turbine relations.

use enflow_core::{
    BusId, ChpOperatingRange, EnergySystem, ExtractionTurbineChp, Flow, GenericChp, Node,
    NodeIndex, Sequence, Sink, Source,
};
use enflow_model::{Domain, OperationalModel, Problem, Relation, TimeIndex, VarId};

fn var_id(problem: &Problem, name: &str) -> VarId {
    VarId::new(
        problem
            .vars()
            .iter()
            .position(|def| def.name == name)
            .unwrap_or_else(|| panic!("no variable named {}", name)),
    )
}

fn combined_cycle_plant(back_pressure: bool, share_min: Option<Sequence>) -> GenericChp {
    GenericChp {
        label: "ccet".into(),
        electrical_bus: BusId::new(1),
        heat_bus: BusId::new(2),
        electrical: ChpOperatingRange {
            p_min: Sequence::Constant(68.787),
            eta_min: Sequence::Constant(0.444),
            p_max: Sequence::Constant(155.946),
            eta_max: Sequence::Constant(0.525),
        },
        beta: Sequence::Constant(0.122),
        back_pressure,
        flue_gas_share_max: Sequence::Constant(0.183),
        flue_gas_share_min: share_min,
        q_cw_min: Sequence::Constant(10.552),
    }
}

fn chp_system(chp: GenericChp) -> (EnergySystem, NodeIndex) {
    let mut system = EnergySystem::new();
    let bgas = system.add_bus(BusId::new(0), "gas");
    let bel = system.add_bus(BusId::new(1), "electricity");
    let bth = system.add_bus(BusId::new(2), "heat");
    let supply = system.add_node(Node::Source(Source {
        label: "gas_supply".into(),
    }));
    system.add_flow(supply, bgas, Flow::new());
    let el_demand = system.add_node(Node::Sink(Sink {
        label: "el_demand".into(),
    }));
    system.add_flow(bel, el_demand, Flow::new());
    let th_demand = system.add_node(Node::Sink(Sink {
        label: "th_demand".into(),
    }));
    system.add_flow(bth, th_demand, Flow::new());

    let node = system
        .add_generic_chp(
            chp,
            (bgas, Flow::new()),
            (bel, Flow::new()),
            (bth, Flow::new()),
        )
        .unwrap();
    (system, node)
}

#[test]
fn fuel_model_uses_the_solved_alpha_coefficients() {
    let chp = combined_cycle_plant(false, None);
    let alphas = chp.calculate_alphas(2).unwrap();
    let (system, node) = chp_system(chp);
    let model = OperationalModel::new(system, TimeIndex::new(2, 1.0)).unwrap();
    let problem = model.problem();
    let vars = model.chp_vars(node).unwrap();

    for t in 0..2 {
        let h_f_1 = problem
            .constraint(&format!("H_F_1[ccet,{}]", t))
            .unwrap();
        assert!((h_f_1.expr.coefficient(vars.y[t]) - alphas.alpha0[t]).abs() < 1e-9);
        assert!((h_f_1.expr.coefficient(vars.p_wo_dh[t]) - alphas.alpha1[t]).abs() < 1e-9);
        assert_eq!(h_f_1.expr.coefficient(vars.h_f[t]), -1.0);

        // Under heat extraction the same coefficients apply, with the
        // penalty beta on the heat term.
        let h_f_2 = problem
            .constraint(&format!("H_F_2[ccet,{}]", t))
            .unwrap();
        assert!(
            (h_f_2.expr.coefficient(vars.q[t]) - alphas.alpha1[t] * 0.122).abs() < 1e-9
        );
    }
}

#[test]
fn operating_envelope_is_tied_to_the_indicator() {
    let (system, node) = chp_system(combined_cycle_plant(false, None));
    let model = OperationalModel::new(system, TimeIndex::new(1, 1.0)).unwrap();
    let problem = model.problem();
    let vars = model.chp_vars(node).unwrap();

    assert_eq!(problem.var(vars.y[0]).domain, Domain::Binary);

    let upper = problem.constraint("H_F_3[ccet,0]").unwrap();
    assert_eq!(upper.relation, Relation::Le);
    assert!((upper.expr.coefficient(vars.y[0]) + 155.946 / 0.525).abs() < 1e-9);

    let lower = problem.constraint("H_F_4[ccet,0]").unwrap();
    assert_eq!(lower.relation, Relation::Ge);
    assert!((lower.expr.coefficient(vars.y[0]) + 68.787 / 0.444).abs() < 1e-9);
}

#[test]
fn back_pressure_turns_the_energy_balance_into_an_equality() {
    let (system, _) = chp_system(combined_cycle_plant(false, None));
    let model = OperationalModel::new(system, TimeIndex::new(1, 1.0)).unwrap();
    let q_max = model.problem().constraint("Q_max_res[ccet,0]").unwrap();
    assert_eq!(q_max.relation, Relation::Le);

    let (system, node) = chp_system(combined_cycle_plant(true, None));
    let model = OperationalModel::new(system, TimeIndex::new(1, 1.0)).unwrap();
    let q_max = model.problem().constraint("Q_max_res[ccet,0]").unwrap();
    assert_eq!(q_max.relation, Relation::Eq);

    let vars = model.chp_vars(node).unwrap();
    assert!((q_max.expr.coefficient(vars.y[0]) - 10.552).abs() < 1e-9);
    assert_eq!(q_max.expr.coefficient(vars.h_f[0]), -1.0);
}

#[test]
fn minimum_flue_gas_constraints_are_skipped_when_undeclared() {
    let (system, _) = chp_system(combined_cycle_plant(false, None));
    let model = OperationalModel::new(system, TimeIndex::new(2, 1.0)).unwrap();
    let problem = model.problem();
    assert_eq!(problem.constraints_with_prefix("H_L_FG_min_def").count(), 0);
    assert_eq!(problem.constraints_with_prefix("Q_min_res").count(), 0);

    let motoric = combined_cycle_plant(false, Some(Sequence::Constant(0.09)));
    let (system, node) = chp_system(motoric);
    let model = OperationalModel::new(system, TimeIndex::new(2, 1.0)).unwrap();
    let problem = model.problem();
    assert_eq!(problem.constraints_with_prefix("H_L_FG_min_def").count(), 2);
    assert_eq!(problem.constraints_with_prefix("Q_min_res").count(), 2);

    let vars = model.chp_vars(node).unwrap();
    let min_def = problem.constraint("H_L_FG_min_def[ccet,0]").unwrap();
    assert!((min_def.expr.coefficient(vars.h_f[0]) - 0.09).abs() < 1e-12);
    assert_eq!(min_def.expr.coefficient(vars.h_l_fg_min[0]), -1.0);
}

#[test]
fn chp_outputs_are_linked_to_the_flow_variables() {
    let (system, node) = chp_system(combined_cycle_plant(false, None));
    let model = OperationalModel::new(system, TimeIndex::new(1, 1.0)).unwrap();
    let problem = model.problem();
    let vars = model.chp_vars(node).unwrap();

    let link = problem.constraint("P_flow[ccet,0]").unwrap();
    let el_flow = var_id(problem, "flow[ccet:electricity,0]");
    assert_eq!(link.expr.coefficient(vars.p[0]), 1.0);
    assert_eq!(link.expr.coefficient(el_flow), -1.0);

    let link = problem.constraint("H_flow[ccet,0]").unwrap();
    let fuel_flow = var_id(problem, "flow[gas:ccet,0]");
    assert_eq!(link.expr.coefficient(vars.h_f[0]), 1.0);
    assert_eq!(link.expr.coefficient(fuel_flow), -1.0);
}

#[test]
fn relaxation_rewrites_the_indicator_domain_in_place() {
    let (system, node) = chp_system(combined_cycle_plant(false, None));
    let mut model = OperationalModel::new(system, TimeIndex::new(1, 1.0)).unwrap();
    assert!(model.problem().has_integer_vars());

    model.relax_problem();
    assert!(!model.problem().has_integer_vars());
    let vars = model.chp_vars(node).unwrap();
    let y = model.problem().var(vars.y[0]);
    assert_eq!(y.domain, Domain::Continuous);
    assert_eq!(y.lower, 0.0);
    assert_eq!(y.upper, 1.0);
}

fn turbine_system() -> (EnergySystem, NodeIndex) {
    let mut system = EnergySystem::new();
    let bgas = system.add_bus(BusId::new(0), "gas");
    let bel = system.add_bus(BusId::new(1), "electricity");
    let bth = system.add_bus(BusId::new(2), "heat");
    let supply = system.add_node(Node::Source(Source {
        label: "gas_supply".into(),
    }));
    system.add_flow(supply, bgas, Flow::new());

    let turbine = ExtractionTurbineChp {
        label: "variable_chp".into(),
        conversion_factors: vec![
            (BusId::new(1), Sequence::Constant(0.5)),
            (BusId::new(2), Sequence::Constant(0.3)),
        ],
        full_condensation_factor: (BusId::new(1), Sequence::Constant(0.5)),
    };
    let node = system
        .add_extraction_turbine_chp(
            turbine,
            (bgas, Flow::new()),
            [(bel, Flow::new()), (bth, Flow::new())],
        )
        .unwrap();
    (system, node)
}

#[test]
fn turbine_indices_follow_the_conversion_factors() {
    let (system, node) = turbine_system();
    let model = OperationalModel::new(system, TimeIndex::new(2, 1.0)).unwrap();
    let indices = model.turbine_indices(node).unwrap();

    // main 0.5, tapped 0.3, full condensation 0.5
    assert!((indices.flow_relation[0] - 0.5 / 0.3).abs() < 1e-12);
    assert!((indices.main_flow_loss[0] - 0.0).abs() < 1e-12);
}

#[test]
fn turbine_relations_constrain_the_flow_variables() {
    let (system, _) = turbine_system();
    let model = OperationalModel::new(system, TimeIndex::new(1, 1.0)).unwrap();
    let problem = model.problem();

    let main = var_id(problem, "flow[variable_chp:electricity,0]");
    let tapped = var_id(problem, "flow[variable_chp:heat,0]");
    let input = var_id(problem, "flow[gas:variable_chp,0]");

    let relation = problem
        .constraint("out_flow_relation[variable_chp,0]")
        .unwrap();
    assert_eq!(relation.relation, Relation::Ge);
    assert_eq!(relation.expr.coefficient(main), 1.0);
    assert!((relation.expr.coefficient(tapped) + 0.5 / 0.3).abs() < 1e-12);

    // With zero loss index the input relation reduces to
    // eta_condensing * inflow == main_outflow.
    let io = problem
        .constraint("input_output_relation[variable_chp,0]")
        .unwrap();
    assert_eq!(io.relation, Relation::Eq);
    assert!((io.expr.coefficient(input) - 0.5).abs() < 1e-12);
    assert_eq!(io.expr.coefficient(main), -1.0);
    assert_eq!(io.expr.coefficient(tapped), 0.0);
}
