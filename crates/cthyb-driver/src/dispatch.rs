//! Per-sector measurement pipelines.
//!
//! Every handler talks to the engine one or more times, never retries, and
//! returns the [`SolveOutcome`] variant matching its sector. Aggregation is
//! collective, so all processes of the group walk the same component list.

use cthyb_core::{Block2Gf, ErrorInfo, FourierTransform, Mesh, SolverError, C64};
use log::{debug, info, warn};
use ndarray::{ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

use crate::compound::{index_to_component, ComponentSpec};
use crate::components::{
    plan_four_operator, plan_two_operator, specs_from_config, ComponentPlan, TWO_OPERATORS,
};
use crate::config::{EngineConfiguration, ResolvedConfig};
use crate::convert::{
    check_tau_shape, component_result, diagonal_fill, g4_to_block2gf, pair_average_bins,
    tau_result, tau_to_iw, ComponentResult, TauResult,
};
use crate::engine::{
    EngineOutput, EngineProblem, EngineRequest, EngineResult, ImpurityEngine, Invocation,
};
use crate::hash::invocation_fingerprint;
use crate::params::{SolveParams, SolverSetup};
use crate::sample::{collapse_replicates, DistributedSample, Estimate, ProcessGroup};
use crate::sector::{MeasurementSector, WormSector};

/// Output of a standard-sector solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardOutcome {
    /// Sector that produced the result.
    pub sector: MeasurementSector,
    /// Imaginary-time Green's function, when measured.
    pub tau: Option<TauResult>,
    /// Legendre coefficients (`gleg-full`), when measured.
    pub legendre: Option<Estimate>,
    /// Perturbation-order histogram (`hist`), when measured.
    pub pert_order: Option<Estimate>,
}

/// Raw engine output of the last sampled component.
///
/// The generator carries sector-wide observables such as the sign and
/// expansion-order histograms, which are otherwise not converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentOutput {
    /// Compound index of the component.
    pub component: u64,
    /// Output of the generator (partition-function) estimator.
    pub generator: EngineOutput,
    /// Output of the component estimator.
    pub output: EngineOutput,
}

/// Output of the one-particle worm sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WormGreenOutcome {
    /// Components that were sampled.
    pub components: Vec<u64>,
    /// Assembled Green's function; pruned components stay zero.
    pub tau: TauResult,
    /// Raw output of the last component; `None` when nothing was sampled.
    pub last_output: Option<ComponentOutput>,
}

/// Output of the full two-particle worm sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoParticleOutcome {
    /// Per-component estimates on `(fermionic, fermionic, bosonic)` meshes.
    pub components: Vec<ComponentResult>,
    /// Block-pair mean of the particle-hole two-particle Green's function.
    pub g2_iw_ph: Block2Gf,
    /// Block-pair standard error.
    pub g2_iw_ph_error: Block2Gf,
    /// Raw output of the last component.
    pub last_output: Option<ComponentOutput>,
}

/// Output of a reduced two-particle worm sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedOutcome {
    /// Sector that produced the result.
    pub sector: MeasurementSector,
    /// Per-component estimates.
    pub components: Vec<ComponentResult>,
    /// Raw output of the last component.
    pub last_output: Option<ComponentOutput>,
}

/// Result of a solve call, tagged by the pipeline that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolveOutcome {
    /// Single standard invocation.
    Standard(StandardOutcome),
    /// One-particle worm sampling, component by component.
    WormGreen(WormGreenOutcome),
    /// Full two-particle worm sampling.
    TwoParticle(TwoParticleOutcome),
    /// Reduced two-particle worm sampling.
    Reduced(ReducedOutcome),
}

impl SolveOutcome {
    /// Sector the outcome belongs to.
    pub fn sector(&self) -> MeasurementSector {
        match self {
            SolveOutcome::Standard(outcome) => outcome.sector,
            SolveOutcome::WormGreen(_) => MeasurementSector::WormTwoOperator,
            SolveOutcome::TwoParticle(_) => MeasurementSector::WormFourOperatorFull,
            SolveOutcome::Reduced(outcome) => outcome.sector,
        }
    }
}

/// Everything a handler needs besides the engine.
pub struct DispatchContext<'a> {
    /// Construction-time setup.
    pub setup: &'a SolverSetup,
    /// Translated configuration.
    pub resolved: &'a ResolvedConfig,
    /// Problem in engine layout.
    pub problem: &'a EngineProblem,
    /// Cooperating processes.
    pub group: &'a dyn ProcessGroup,
    /// Seed of this process.
    pub seed: u64,
    /// Optional transform producing `G(iω)` from `G(τ)`.
    pub transform: Option<&'a dyn FourierTransform>,
}

impl DispatchContext<'_> {
    fn is_root(&self) -> bool {
        self.group.rank() == 0
    }

    fn tau_mesh(&self) -> Mesh {
        Mesh::fermionic_tau(self.setup.beta, self.setup.n_tau)
    }

    fn engine_bins(&self) -> usize {
        2 * self.setup.n_tau
    }

    fn invoke(
        &self,
        engine: &mut dyn ImpurityEngine,
        config: &EngineConfiguration,
        invocation: Invocation,
    ) -> Result<EngineResult, SolverError> {
        let request = EngineRequest {
            problem: self.problem,
            config,
            seed: self.seed,
            invocation,
        };
        let component = match invocation {
            Invocation::Standard => None,
            Invocation::Component { component, .. } => Some(component),
        };
        debug!(
            "rank {} invoking engine: {:?} seed {} config {}",
            self.group.rank(),
            invocation,
            self.seed,
            invocation_fingerprint(config, self.seed, component)?
        );
        engine.invoke(&request)
    }

    fn banner(&self, label: &str, component: u64) {
        if self.is_root() {
            info!("{}", "=".repeat(72));
            info!("worm sampling {label} component: {component}");
            info!("{}", "=".repeat(72));
        }
    }

    fn with_iw(&self, mut tau: TauResult) -> Result<TauResult, SolverError> {
        if let Some(transform) = self.transform {
            let iw_mesh = Mesh::fermionic_iw(self.setup.beta, self.setup.n_iw);
            tau.g_iw = Some(tau_to_iw(&tau.g_tau, iw_mesh, transform)?);
        }
        Ok(tau)
    }
}

/// Components the four-operator and reduced sectors iterate over.
///
/// The automatic pipeline reads `worm_components` (or the full range); raw
/// overrides read `WormComponents` from the engine options.
fn four_operator_specs(
    resolved: &ResolvedConfig,
    params: &SolveParams,
) -> Result<Option<Vec<ComponentSpec>>, SolverError> {
    if resolved.automatic_two_particle {
        return Ok(params.worm_components.clone());
    }
    if params.worm_components.is_some() {
        warn!("worm_components parameter not used, set cfg_qmc[\"WormComponents\"] instead");
    }
    Ok(Some(specs_from_config(&resolved.engine)?))
}

/// Iteration plan of a component-resolved sector; `None` for standard sectors.
pub fn component_plan(
    sector: MeasurementSector,
    resolved: &ResolvedConfig,
    params: &SolveParams,
    problem: &EngineProblem,
) -> Result<Option<ComponentPlan>, SolverError> {
    match sector {
        MeasurementSector::StandardTau
        | MeasurementSector::Legendre
        | MeasurementSector::PerturbationOrder => Ok(None),
        MeasurementSector::WormTwoOperator => plan_two_operator(
            problem.n_orb,
            &problem.ftau,
            params.worm_prune_threshold,
            &resolved.engine,
        )
        .map(Some),
        MeasurementSector::WormFourOperatorFull
        | MeasurementSector::WormP3iwPH
        | MeasurementSector::WormP2iwPH
        | MeasurementSector::WormP2tauPH => {
            let specs = four_operator_specs(resolved, params)?;
            plan_four_operator(problem.n_orb, specs.as_deref()).map(Some)
        }
    }
}

/// Runs the pipeline of `sector`.
pub fn dispatch(
    ctx: &DispatchContext<'_>,
    engine: &mut dyn ImpurityEngine,
    sector: MeasurementSector,
    plan: Option<&ComponentPlan>,
) -> Result<SolveOutcome, SolverError> {
    let empty = ComponentPlan {
        arity: TWO_OPERATORS,
        components: Vec::new(),
        budget: None,
    };
    let plan = plan.unwrap_or(&empty);
    match sector {
        MeasurementSector::StandardTau
        | MeasurementSector::Legendre
        | MeasurementSector::PerturbationOrder => run_standard(ctx, engine, sector),
        MeasurementSector::WormTwoOperator => run_two_operator(ctx, engine, plan),
        MeasurementSector::WormFourOperatorFull => run_four_operator(ctx, engine, plan),
        MeasurementSector::WormP3iwPH
        | MeasurementSector::WormP2iwPH
        | MeasurementSector::WormP2tauPH => run_reduced(ctx, engine, sector, plan),
    }
}

fn aggregate(
    output: &EngineOutput,
    key: &str,
    group: &dyn ProcessGroup,
) -> Result<Estimate, SolverError> {
    DistributedSample::from_replicates(output.require(key)?, group)?.estimate()
}

fn run_standard(
    ctx: &DispatchContext<'_>,
    engine: &mut dyn ImpurityEngine,
    sector: MeasurementSector,
) -> Result<SolveOutcome, SolverError> {
    let output = ctx
        .invoke(engine, &ctx.resolved.engine, Invocation::Standard)?
        .into_standard()?;
    let measurements = ctx.resolved.measurements;

    let tau = if sector == MeasurementSector::StandardTau {
        let full = if ctx.resolved.diagonal_only() && !ctx.resolved.worm {
            diagonal_fill(&collapse_replicates(output.require("gtau")?)?)?
        } else {
            collapse_replicates(output.require("gtau-full")?)?
        };
        check_tau_shape(&full, ctx.problem.n_orb, ctx.engine_bins())?;
        let estimate = DistributedSample::new(full, ctx.group)
            .apply(pair_average_bins)
            .estimate()?;
        Some(ctx.with_iw(tau_result(&estimate, &ctx.setup.gf_struct, ctx.tau_mesh())?)?)
    } else {
        None
    };
    let legendre = if measurements.g_l {
        Some(aggregate(&output, "gleg-full", ctx.group)?)
    } else {
        None
    };
    let pert_order = if measurements.pert_order {
        Some(aggregate(&output, "hist", ctx.group)?)
    } else {
        None
    };
    Ok(SolveOutcome::Standard(StandardOutcome {
        sector,
        tau,
        legendre,
        pert_order,
    }))
}

fn run_two_operator(
    ctx: &DispatchContext<'_>,
    engine: &mut dyn ImpurityEngine,
    plan: &ComponentPlan,
) -> Result<SolveOutcome, SolverError> {
    let n_orb = ctx.problem.n_orb;
    let bins = ctx.engine_bins();
    let sector = WormSector::from_config(&ctx.resolved.engine).number();
    let config = match &plan.budget {
        Some(budget) => ctx.resolved.engine.with_budget(budget),
        None => ctx.resolved.engine.clone(),
    };
    let mut assembled = ArrayD::<C64>::zeros(IxDyn(&[n_orb, 2, n_orb, 2, bins]));
    let mut last_output = None;
    for &component in &plan.components {
        ctx.banner("two point", component);
        let (generator, output) = ctx
            .invoke(engine, &config, Invocation::Component { sector, component })?
            .into_component()?;
        let (name, samples) = output.find_unique("gtau-worm")?;
        let local = collapse_replicates(samples)?;
        if local.shape() != [bins] {
            return Err(SolverError::Consistency(
                ErrorInfo::new("gtau-worm-shape", "worm Green's function has an unexpected shape")
                    .with_context("key", name)
                    .with_context("expected", format!("[{bins}]"))
                    .with_context("found", format!("{:?}", local.shape())),
            ));
        }
        let pairs = index_to_component(n_orb, TWO_OPERATORS, component)?;
        assembled
            .view_mut()
            .index_axis_move(Axis(0), pairs[0].band)
            .index_axis_move(Axis(0), pairs[0].spin)
            .index_axis_move(Axis(0), pairs[1].band)
            .index_axis_move(Axis(0), pairs[1].spin)
            .assign(&local);
        last_output = Some(ComponentOutput {
            component,
            generator,
            output,
        });
    }
    let estimate = DistributedSample::new(assembled, ctx.group)
        .apply(pair_average_bins)
        .estimate()?;
    let tau = ctx.with_iw(tau_result(&estimate, &ctx.setup.gf_struct, ctx.tau_mesh())?)?;
    Ok(SolveOutcome::WormGreen(WormGreenOutcome {
        components: plan.components.clone(),
        tau,
        last_output,
    }))
}

/// Samples every planned component and aggregates its `key` observable.
fn sample_components(
    ctx: &DispatchContext<'_>,
    engine: &mut dyn ImpurityEngine,
    plan: &ComponentPlan,
    key: &str,
    label: &str,
    meshes: &[Mesh],
) -> Result<(Vec<ComponentResult>, Option<ComponentOutput>), SolverError> {
    let sector = WormSector::from_config(&ctx.resolved.engine).number();
    if ctx.is_root() {
        info!("worm sector index = {sector}");
        info!("worm component indices = {:?}", plan.components);
    }
    let expected: Vec<usize> = meshes.iter().map(Mesh::len).collect();
    let mut results = Vec::with_capacity(plan.len());
    let mut last_output = None;
    for &component in &plan.components {
        ctx.banner(label, component);
        let (generator, output) = ctx
            .invoke(engine, &ctx.resolved.engine, Invocation::Component { sector, component })?
            .into_component()?;
        let (name, samples) = output.find_unique(key)?;
        let local = collapse_replicates(samples)?;
        if local.shape() != expected.as_slice() {
            return Err(SolverError::Consistency(
                ErrorInfo::new("worm-shape", "worm observable does not match its meshes")
                    .with_context("key", name)
                    .with_context("expected", format!("{expected:?}"))
                    .with_context("found", format!("{:?}", local.shape())),
            ));
        }
        let estimate = DistributedSample::new(local, ctx.group).estimate()?;
        results.push(component_result(component, meshes.to_vec(), estimate)?);
        last_output = Some(ComponentOutput {
            component,
            generator,
            output,
        });
    }
    Ok((results, last_output))
}

fn frequency_count(config: &EngineConfiguration, key: &str) -> usize {
    config.qmc_int(key).max(0) as usize
}

fn run_four_operator(
    ctx: &DispatchContext<'_>,
    engine: &mut dyn ImpurityEngine,
    plan: &ComponentPlan,
) -> Result<SolveOutcome, SolverError> {
    let config = &ctx.resolved.engine;
    let beta = ctx.setup.beta;
    let fmesh = Mesh::fermionic_iw(beta, frequency_count(config, "N4iwf"));
    let bmesh = Mesh::bosonic_iw(beta, frequency_count(config, "N4iwb") + 1);
    let (components, last_output) = sample_components(
        ctx,
        engine,
        plan,
        "g4iw-worm",
        "four point",
        &[fmesh, fmesh, bmesh],
    )?;
    let (g2_iw_ph, g2_iw_ph_error) = g4_to_block2gf(
        &components,
        ctx.problem.n_orb,
        &ctx.setup.gf_struct,
        [bmesh, fmesh, fmesh],
    )?;
    Ok(SolveOutcome::TwoParticle(TwoParticleOutcome {
        components,
        g2_iw_ph,
        g2_iw_ph_error,
        last_output,
    }))
}

fn run_reduced(
    ctx: &DispatchContext<'_>,
    engine: &mut dyn ImpurityEngine,
    sector: MeasurementSector,
    plan: &ComponentPlan,
) -> Result<SolveOutcome, SolverError> {
    let config = &ctx.resolved.engine;
    let beta = ctx.setup.beta;
    let (key, meshes) = match sector {
        MeasurementSector::WormP3iwPH => (
            "p3iw-worm",
            vec![
                Mesh::fermionic_iw(beta, frequency_count(config, "N3iwf")),
                Mesh::bosonic_iw(beta, frequency_count(config, "N3iwb") + 1),
            ],
        ),
        MeasurementSector::WormP2iwPH => (
            "p2iw-worm",
            vec![Mesh::bosonic_iw(beta, frequency_count(config, "N2iwb") + 1)],
        ),
        MeasurementSector::WormP2tauPH => (
            "p2tau-worm",
            vec![Mesh::bosonic_tau(beta, ctx.engine_bins())],
        ),
        other => {
            return Err(SolverError::UnimplementedSector(
                ErrorInfo::new("reduced-sector", "sector is not a reduced two-particle sector")
                    .with_context("sector", other.as_str()),
            ))
        }
    };
    let (components, last_output) =
        sample_components(ctx, engine, plan, key, "reduced four point", &meshes)?;
    Ok(SolveOutcome::Reduced(ReducedOutcome {
        sector,
        components,
        last_output,
    }))
}
