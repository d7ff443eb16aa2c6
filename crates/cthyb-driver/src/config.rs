use cthyb_core::{ErrorInfo, SolverError};
use indexmap::IndexMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::params::{SolveParams, SolverSetup};

/// Section holding the global run options.
pub const GENERAL: &str = "General";
/// Section describing the single impurity atom.
pub const ATOM: &str = "Atoms.1";
/// Section holding every sampler option.
pub const QMC: &str = "QMC";

/// Weight of the four-operator move when double moves are enabled.
pub const FOUR_OPERATOR_MOVE_WEIGHT: f64 = 0.005;

/// Value of an engine option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer option or toggle.
    Int(i64),
    /// Floating point option.
    Float(f64),
    /// Free-form text.
    Text(String),
    /// Nested list (component selections).
    List(Vec<OptionValue>),
}

impl OptionValue {
    /// Integer view; booleans map to 0/1 and integral floats are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Bool(flag) => Some(i64::from(*flag)),
            OptionValue::Int(value) => Some(*value),
            OptionValue::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    /// Floating point view of numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Int(value) => Some(*value as f64),
            OptionValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Int(_) => "int",
            OptionValue::Float(_) => "float",
            OptionValue::Text(_) => "text",
            OptionValue::List(_) => "list",
        }
    }
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionValue::Bool(flag) => write!(f, "{flag}"),
            OptionValue::Int(value) => write!(f, "{value}"),
            OptionValue::Float(value) => write!(f, "{value}"),
            OptionValue::Text(text) => write!(f, "{text}"),
            OptionValue::List(values) => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

/// Expected type of a known QMC option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionKind {
    Int,
    Float,
    List,
}

const QMC_SCHEMA: &[(&str, OptionKind)] = &[
    ("offdiag", OptionKind::Int),
    ("complex", OptionKind::Int),
    ("use_phase", OptionKind::Int),
    ("flavourchange_moves", OptionKind::Int),
    ("statesampling", OptionKind::Int),
    ("Niw", OptionKind::Int),
    ("Ntau", OptionKind::Int),
    ("NLegMax", OptionKind::Int),
    ("NLegOrder", OptionKind::Int),
    ("Nwarmups", OptionKind::Int),
    ("Nmeas", OptionKind::Int),
    ("Ncorr", OptionKind::Int),
    ("FourPnt", OptionKind::Int),
    ("N4iwf", OptionKind::Int),
    ("N4iwb", OptionKind::Int),
    ("N3iwf", OptionKind::Int),
    ("N3iwb", OptionKind::Int),
    ("N2iwb", OptionKind::Int),
    ("WormMeasGiw", OptionKind::Int),
    ("WormMeasGtau", OptionKind::Int),
    ("WormMeasGSigmaiw", OptionKind::Int),
    ("WormMeasG4iw", OptionKind::Int),
    ("WormMeasG4tau", OptionKind::Int),
    ("WormMeasH4iw", OptionKind::Int),
    ("WormMeasP2iwPH", OptionKind::Int),
    ("WormMeasP2tauPH", OptionKind::Int),
    ("WormMeasP2iwPP", OptionKind::Int),
    ("WormMeasP2tauPP", OptionKind::Int),
    ("WormMeasP3iwPH", OptionKind::Int),
    ("WormMeasP3iwPP", OptionKind::Int),
    ("WormSearchEta", OptionKind::Int),
    ("TaudiffMax", OptionKind::Float),
    ("measurement_time", OptionKind::Float),
    ("Percentage4OperatorMove", OptionKind::Float),
    ("PercentageGlobalMove", OptionKind::Float),
    ("PercentageWormInsert", OptionKind::Float),
    ("PercentageWormReplace", OptionKind::Float),
    ("WormComponents", OptionKind::List),
];

/// Worm measurement toggles inspected by the sector selection.
pub const WORM_TOGGLES: &[&str] = &[
    "WormMeasGiw",
    "WormMeasGtau",
    "WormMeasGSigmaiw",
    "WormMeasG4iw",
    "WormMeasG4tau",
    "WormMeasH4iw",
    "WormMeasP2iwPH",
    "WormMeasP2tauPH",
    "WormMeasP2iwPP",
    "WormMeasP2tauPP",
    "WormMeasP3iwPH",
    "WormMeasP3iwPP",
];

fn schema_kind(key: &str) -> Option<OptionKind> {
    QMC_SCHEMA
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, kind)| *kind)
}

/// Checks a raw override against the option schema, coercing integers to floats.
fn validate_override(key: &str, value: &OptionValue) -> Result<OptionValue, SolverError> {
    let mismatch = |expected: &str| {
        SolverError::Configuration(
            ErrorInfo::new("override-type", "raw override has the wrong type")
                .with_context("key", key)
                .with_context("expected", expected)
                .with_context("found", value.kind()),
        )
    };
    match schema_kind(key) {
        None => Ok(value.clone()),
        Some(OptionKind::Int) => value
            .as_i64()
            .map(OptionValue::Int)
            .ok_or_else(|| mismatch("int")),
        Some(OptionKind::Float) => value
            .as_f64()
            .map(OptionValue::Float)
            .ok_or_else(|| mismatch("float")),
        Some(OptionKind::List) => match value {
            OptionValue::List(_) => Ok(value.clone()),
            _ => Err(mismatch("list")),
        },
    }
}

/// Two-level option map handed to the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineConfiguration {
    sections: IndexMap<String, IndexMap<String, OptionValue>>,
}

impl EngineConfiguration {
    /// Configuration pre-populated with the engine's baseline options.
    pub fn baseline(n_orb: usize) -> Self {
        let mut config = Self::default();
        config.set(ATOM, "Nd", OptionValue::Int(n_orb as i64));
        config.set(ATOM, "Hamiltonian", "Kanamori".into());
        config.set_qmc("TaudiffMax", OptionValue::Float(-1.0));
        for key in WORM_TOGGLES {
            config.set_qmc(key, OptionValue::Int(0));
        }
        config.set_qmc("WormSearchEta", OptionValue::Int(0));
        config.set_qmc("FourPnt", OptionValue::Int(0));
        for key in ["N4iwf", "N4iwb", "N3iwf", "N3iwb", "N2iwb"] {
            config.set_qmc(key, OptionValue::Int(30));
        }
        config.set_qmc("WormComponents", OptionValue::List(Vec::new()));
        config
    }

    /// Sets an option, creating the section when needed.
    pub fn set(&mut self, section: &str, key: &str, value: OptionValue) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Sets an option of the QMC section.
    pub fn set_qmc(&mut self, key: &str, value: OptionValue) {
        self.set(QMC, key, value);
    }

    /// Looks up an option.
    pub fn get(&self, section: &str, key: &str) -> Option<&OptionValue> {
        self.sections.get(section).and_then(|options| options.get(key))
    }

    /// Integer value of a QMC option; absent or non-numeric options read as zero.
    pub fn qmc_int(&self, key: &str) -> i64 {
        self.get(QMC, key).and_then(OptionValue::as_i64).unwrap_or(0)
    }

    /// Floating point value of a QMC option; absent options read as zero.
    pub fn qmc_f64(&self, key: &str) -> f64 {
        self.get(QMC, key).and_then(OptionValue::as_f64).unwrap_or(0.0)
    }

    /// Whether a QMC toggle is set to a non-zero value.
    pub fn qmc_flag(&self, key: &str) -> bool {
        self.qmc_int(key) != 0
    }

    /// Sections in insertion order.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &IndexMap<String, OptionValue>)> {
        self.sections
            .iter()
            .map(|(name, options)| (name.as_str(), options))
    }

    /// Copy with the measurement budget replaced.
    pub fn with_budget(&self, budget: &crate::components::Budget) -> Self {
        let mut config = self.clone();
        match budget {
            crate::components::Budget::Cycles(cycles) => {
                config.set_qmc("Nmeas", OptionValue::Int(*cycles as i64));
            }
            crate::components::Budget::WallClock(seconds) => {
                config.set_qmc("measurement_time", OptionValue::Float(*seconds));
            }
        }
        config
    }

    /// Logs every option, one line each.
    pub fn echo(&self) {
        for (section, options) in self.sections() {
            info!("{}", "=".repeat(72));
            info!("[[{section}]]");
            for (key, value) in options {
                info!("cfg[{section}][{key}] = {value}");
            }
        }
    }
}

/// Observables requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Measurements {
    /// Imaginary-time Green's function.
    pub g_tau: bool,
    /// Legendre coefficients.
    pub g_l: bool,
    /// Perturbation-order histogram.
    pub pert_order: bool,
    /// Full particle-hole two-particle Green's function.
    pub g2_iw_ph: bool,
}

/// Facts about the problem that influence the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProblemFacts {
    /// Number of orbitals.
    pub n_orb: usize,
    /// Whether any hybridization block is larger than 1x1.
    pub offdiag: bool,
    /// Whether a quadratic Hamiltonian term accompanies the problem.
    pub has_quadratic_term: bool,
}

/// Immutable outcome of the parameter translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    /// Engine options.
    pub engine: EngineConfiguration,
    /// Requested observables.
    pub measurements: Measurements,
    /// Complex-valued model.
    pub complex: bool,
    /// Worm sampling active (explicitly or through the two-particle pipeline).
    pub worm: bool,
    /// The automatic two-particle configuration was applied.
    pub automatic_two_particle: bool,
    /// Raw overrides were supplied.
    pub manual_override: bool,
}

impl ResolvedConfig {
    /// Whether the engine runs without off-diagonal hybridization.
    pub fn diagonal_only(&self) -> bool {
        self.engine.qmc_int("offdiag") == 0
    }
}

/// Translates the flat solve options into a fully populated engine configuration.
pub fn translate(
    setup: &SolverSetup,
    params: &SolveParams,
    facts: &ProblemFacts,
) -> Result<ResolvedConfig, SolverError> {
    let manual_override = !params.cfg_qmc.is_empty();
    let automatic_two_particle = params.measure_g2_iw_ph && !manual_override;
    if setup.complex && (params.worm || automatic_two_particle) {
        return Err(SolverError::Fatal(
            ErrorInfo::new(
                "complex-worm",
                "complex and worm together not yet implemented",
            )
            .with_hint("disable either complex mode or worm sampling"),
        ));
    }
    if setup.complex && !facts.offdiag {
        return Err(SolverError::Configuration(
            ErrorInfo::new(
                "complex-diagonal",
                "complex mode does not make sense for a diagonal hybridization",
            )
            .with_context("max_block_size", "1"),
        ));
    }
    if setup.delta_interface && !facts.has_quadratic_term {
        return Err(SolverError::Configuration(
            ErrorInfo::new(
                "missing-h0",
                "the hybridization interface requires the quadratic term h_0",
            )
            .with_hint("supply OneBodyTerm::Quadratic with the problem"),
        ));
    }
    let measurements = Measurements {
        g_tau: params.measure_g_tau,
        g_l: params.measure_g_l,
        pert_order: params.measure_pert_order,
        g2_iw_ph: params.measure_g2_iw_ph,
    };
    if !(measurements.g_tau || measurements.g_l || measurements.pert_order || measurements.g2_iw_ph)
    {
        return Err(SolverError::configuration(
            "no-observable",
            "no observable was requested",
        ));
    }

    let mut engine = EngineConfiguration::baseline(facts.n_orb);
    engine.set(GENERAL, "beta", OptionValue::Float(setup.beta));
    engine.set_qmc("offdiag", OptionValue::Int(i64::from(facts.offdiag)));
    if setup.complex {
        engine.set_qmc("complex", OptionValue::Int(1));
        engine.set_qmc("use_phase", OptionValue::Int(1));
    }
    let four_operator_weight = if params.move_double {
        FOUR_OPERATOR_MOVE_WEIGHT
    } else {
        0.0
    };
    engine.set_qmc(
        "Percentage4OperatorMove",
        OptionValue::Float(four_operator_weight),
    );
    engine.set_qmc(
        "PercentageGlobalMove",
        OptionValue::Float(params.move_global_prob),
    );
    engine.set_qmc(
        "flavourchange_moves",
        OptionValue::Int(i64::from(params.flavourchange_moves)),
    );
    engine.set_qmc("Niw", OptionValue::Int(setup.n_iw as i64));
    engine.set_qmc("Ntau", OptionValue::Int(2 * setup.n_tau as i64));
    let n_leg = if params.measure_g_l { setup.n_l } else { 1 } as i64;
    engine.set_qmc("NLegMax", OptionValue::Int(n_leg));
    engine.set_qmc("NLegOrder", OptionValue::Int(n_leg));
    engine.set_qmc(
        "Nwarmups",
        OptionValue::Int((params.length_cycle * params.n_warmup_cycles) as i64),
    );
    engine.set_qmc("Nmeas", OptionValue::Int(params.n_cycles as i64));
    engine.set_qmc(
        "measurement_time",
        OptionValue::Float(params.max_time.unwrap_or(-1.0)),
    );
    engine.set_qmc("Ncorr", OptionValue::Int(params.length_cycle as i64));
    engine.set_qmc(
        "statesampling",
        OptionValue::Int(i64::from(params.statesampling)),
    );

    let insert = worm_percentage(params.percentage_worm_insert);
    let replace = worm_percentage(params.percentage_worm_replace);

    if params.worm {
        if !manual_override && !automatic_two_particle {
            engine.set_qmc("WormMeasGiw", OptionValue::Int(1));
            engine.set_qmc("WormMeasGtau", OptionValue::Int(1));
            engine.set_qmc("WormSearchEta", OptionValue::Int(1));
        }
        engine.set_qmc("PercentageWormInsert", OptionValue::Float(insert));
        engine.set_qmc("PercentageWormReplace", OptionValue::Float(replace));
    }

    if automatic_two_particle {
        engine.set_qmc("FourPnt", OptionValue::Int(8));
        engine.set_qmc(
            "N4iwf",
            OptionValue::Int(params.measure_g2_n_fermionic as i64),
        );
        engine.set_qmc(
            "N4iwb",
            OptionValue::Int(params.measure_g2_n_bosonic.saturating_sub(1) as i64),
        );
        engine.set_qmc("PercentageWormInsert", OptionValue::Float(insert));
        engine.set_qmc("PercentageWormReplace", OptionValue::Float(replace));
        engine.set_qmc("WormMeasG4iw", OptionValue::Int(1));
        engine.set_qmc("WormSearchEta", OptionValue::Int(1));
    } else if params.measure_g2_iw_ph {
        warn!("measure_g2_iw_ph ignored because raw cfg_qmc overrides were supplied");
    }

    for (key, value) in &params.cfg_qmc {
        let value = validate_override(key, value)?;
        info!("cfg[\"QMC\"][{key}] = {value}");
        engine.set_qmc(key, value);
    }

    Ok(ResolvedConfig {
        engine,
        measurements,
        complex: setup.complex,
        worm: params.worm || automatic_two_particle,
        automatic_two_particle,
        manual_override,
    })
}

fn worm_percentage(requested: f64) -> f64 {
    if requested != 0.0 {
        requested
    } else {
        0.20
    }
}
