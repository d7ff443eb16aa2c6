use cthyb_core::{GfStruct, SolverError};
use cthyb_driver::config::{translate, EngineConfiguration, ProblemFacts, ATOM, GENERAL, QMC};
use cthyb_driver::hash::config_fingerprint;
use cthyb_driver::{OptionValue, SolveParams, SolverSetup};

fn setup(complex: bool) -> SolverSetup {
    let mut setup = SolverSetup::new(20.0, GfStruct::new(vec![("up", 2), ("down", 2)]));
    setup.n_tau = 101;
    setup.complex = complex;
    setup
}

fn facts(offdiag: bool) -> ProblemFacts {
    ProblemFacts {
        n_orb: 2,
        offdiag,
        has_quadratic_term: true,
    }
}

#[test]
fn derived_options_follow_the_solve_parameters() {
    let mut params = SolveParams::with_cycles(4000);
    params.max_time = Some(120.0);
    params.length_cycle = 20;
    params.n_warmup_cycles = 100;
    params.move_double = false;
    params.measure_g_l = true;
    let resolved = translate(&setup(false), &params, &facts(false)).unwrap();
    let engine = &resolved.engine;

    assert_eq!(engine.get(GENERAL, "beta"), Some(&OptionValue::Float(20.0)));
    assert_eq!(engine.get(ATOM, "Nd"), Some(&OptionValue::Int(2)));
    assert_eq!(engine.qmc_int("offdiag"), 0);
    assert_eq!(engine.qmc_int("Ntau"), 202);
    assert_eq!(engine.qmc_int("Niw"), 1025);
    assert_eq!(engine.qmc_int("NLegMax"), 30);
    assert_eq!(engine.qmc_int("NLegOrder"), 30);
    assert_eq!(engine.qmc_int("Nwarmups"), 2000);
    assert_eq!(engine.qmc_int("Nmeas"), 4000);
    assert_eq!(engine.qmc_int("Ncorr"), 20);
    assert_eq!(engine.qmc_f64("measurement_time"), 120.0);
    assert_eq!(engine.qmc_f64("Percentage4OperatorMove"), 0.0);
    assert_eq!(engine.qmc_f64("PercentageGlobalMove"), 0.005);
    assert_eq!(engine.qmc_f64("TaudiffMax"), -1.0);
    assert!(!engine.qmc_flag("complex"));
    assert!(resolved.diagonal_only());
    assert!(!resolved.worm);
}

#[test]
fn legendre_order_collapses_when_not_measured() {
    let params = SolveParams::with_cycles(10);
    let resolved = translate(&setup(false), &params, &facts(true)).unwrap();
    assert_eq!(resolved.engine.qmc_int("NLegMax"), 1);
    assert_eq!(resolved.engine.qmc_int("offdiag"), 1);
    assert_eq!(resolved.engine.qmc_f64("measurement_time"), -1.0);
    assert_eq!(resolved.engine.qmc_f64("Percentage4OperatorMove"), 0.005);
}

#[test]
fn complex_and_worm_is_fatal() {
    let mut params = SolveParams::with_cycles(10);
    params.worm = true;
    let err = translate(&setup(true), &params, &facts(true)).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.info().code, "complex-worm");
}

#[test]
fn complex_with_automatic_two_particle_is_fatal() {
    let mut params = SolveParams::with_cycles(10);
    params.measure_g2_iw_ph = true;
    let err = translate(&setup(true), &params, &facts(true)).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.info().code, "complex-worm");

    params
        .cfg_qmc
        .insert("Nmeas".to_string(), OptionValue::Int(10));
    let resolved = translate(&setup(true), &params, &facts(true)).unwrap();
    assert!(!resolved.worm);
    assert!(resolved.engine.qmc_flag("complex"));
}

#[test]
fn complex_requires_offdiagonal_hybridization() {
    let params = SolveParams::with_cycles(10);
    let err = translate(&setup(true), &params, &facts(false)).unwrap_err();
    assert!(matches!(err, SolverError::Configuration(_)));

    let resolved = translate(&setup(true), &params, &facts(true)).unwrap();
    assert!(resolved.engine.qmc_flag("complex"));
    assert!(resolved.engine.qmc_flag("use_phase"));
}

#[test]
fn hybridization_interface_requires_quadratic_term() {
    let mut setup = setup(false);
    setup.delta_interface = true;
    let params = SolveParams::with_cycles(10);
    let mut facts = facts(false);
    facts.has_quadratic_term = false;
    let err = translate(&setup, &params, &facts).unwrap_err();
    assert_eq!(err.info().code, "missing-h0");
}

#[test]
fn at_least_one_observable_is_required() {
    let mut params = SolveParams::with_cycles(10);
    params.measure_g_tau = false;
    let err = translate(&setup(false), &params, &facts(false)).unwrap_err();
    assert_eq!(err.info().code, "no-observable");
}

#[test]
fn worm_mode_enables_green_function_measurement() {
    let mut params = SolveParams::with_cycles(10);
    params.worm = true;
    params.percentage_worm_insert = 0.0;
    params.percentage_worm_replace = 0.35;
    let resolved = translate(&setup(false), &params, &facts(false)).unwrap();
    let engine = &resolved.engine;
    assert!(engine.qmc_flag("WormMeasGiw"));
    assert!(engine.qmc_flag("WormMeasGtau"));
    assert!(engine.qmc_flag("WormSearchEta"));
    assert_eq!(engine.qmc_f64("PercentageWormInsert"), 0.2);
    assert_eq!(engine.qmc_f64("PercentageWormReplace"), 0.35);
    assert!(resolved.worm);
}

#[test]
fn automatic_two_particle_pipeline_sets_g4_options() {
    let mut params = SolveParams::with_cycles(10);
    params.measure_g2_iw_ph = true;
    params.measure_g2_n_fermionic = 12;
    params.measure_g2_n_bosonic = 7;
    let resolved = translate(&setup(false), &params, &facts(false)).unwrap();
    let engine = &resolved.engine;
    assert!(resolved.automatic_two_particle);
    assert!(resolved.worm);
    assert_eq!(engine.qmc_int("FourPnt"), 8);
    assert_eq!(engine.qmc_int("N4iwf"), 12);
    assert_eq!(engine.qmc_int("N4iwb"), 6);
    assert!(engine.qmc_flag("WormMeasG4iw"));
    assert!(!engine.qmc_flag("WormMeasGiw"));
}

#[test]
fn raw_overrides_bypass_the_automatic_pipeline() {
    let mut params = SolveParams::with_cycles(10);
    params.worm = true;
    params.measure_g2_iw_ph = true;
    params
        .cfg_qmc
        .insert("WormMeasP2iwPH".to_string(), OptionValue::Int(1));
    let resolved = translate(&setup(false), &params, &facts(false)).unwrap();
    assert!(resolved.manual_override);
    assert!(!resolved.automatic_two_particle);
    assert_eq!(resolved.engine.qmc_int("FourPnt"), 0);
    assert!(!resolved.engine.qmc_flag("WormMeasGiw"));
    assert!(resolved.engine.qmc_flag("WormMeasP2iwPH"));
}

#[test]
fn raw_overrides_are_type_checked_and_applied_last() {
    let mut params = SolveParams::with_cycles(10);
    params.cfg_qmc.insert("Nmeas".to_string(), OptionValue::Float(77.0));
    params
        .cfg_qmc
        .insert("measurement_time".to_string(), OptionValue::Int(5));
    params
        .cfg_qmc
        .insert("CustomFlag".to_string(), OptionValue::Text("yes".into()));
    let resolved = translate(&setup(false), &params, &facts(false)).unwrap();
    assert_eq!(resolved.engine.get(QMC, "Nmeas"), Some(&OptionValue::Int(77)));
    assert_eq!(
        resolved.engine.get(QMC, "measurement_time"),
        Some(&OptionValue::Float(5.0))
    );
    assert_eq!(
        resolved.engine.get(QMC, "CustomFlag"),
        Some(&OptionValue::Text("yes".into()))
    );

    params
        .cfg_qmc
        .insert("FourPnt".to_string(), OptionValue::Text("eight".into()));
    let err = translate(&setup(false), &params, &facts(false)).unwrap_err();
    assert_eq!(err.info().code, "override-type");
}

#[test]
fn fingerprint_tracks_configuration_content() {
    let params = SolveParams::with_cycles(10);
    let first = translate(&setup(false), &params, &facts(false)).unwrap();
    let second = translate(&setup(false), &params, &facts(false)).unwrap();
    let a = config_fingerprint(&first.engine).unwrap();
    assert_eq!(a.len(), 64);
    assert_eq!(a, config_fingerprint(&second.engine).unwrap());

    let mut changed = first.engine.clone();
    changed.set_qmc("Nmeas", OptionValue::Int(11));
    assert_ne!(a, config_fingerprint(&changed).unwrap());
    assert_ne!(a, config_fingerprint(&EngineConfiguration::default()).unwrap());
}

#[test]
fn params_load_from_yaml() {
    let yaml = r#"
n_cycles: 5000
max_time: 60.0
worm: true
worm_components: [3, [0, 1], [[0, 1], [1, 0]]]
cfg_qmc:
  Nmeas: 10
  TaudiffMax: 2.5
"#;
    let params: SolveParams = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(params.n_cycles, 5000);
    assert_eq!(params.length_cycle, 50);
    assert_eq!(params.random_seed, 1);
    assert!(params.has_time_budget());
    assert_eq!(params.worm_prune_threshold, Some(1e-5));
    let components = params.worm_components.as_ref().unwrap();
    assert_eq!(components.len(), 3);
    assert_eq!(params.cfg_qmc.get("Nmeas"), Some(&OptionValue::Int(10)));
    assert_eq!(params.cfg_qmc.get("TaudiffMax"), Some(&OptionValue::Float(2.5)));
    assert_eq!(params.seed_policy().for_rank(3), 4);
}
