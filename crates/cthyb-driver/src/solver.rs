use cthyb_core::{FourierTransform, SolverError};
use log::info;
use serde::{Deserialize, Serialize};

use crate::components::ComponentPlan;
use crate::config::{translate, ProblemFacts, ResolvedConfig};
use crate::dispatch::{component_plan, dispatch, DispatchContext, SolveOutcome};
use crate::engine::{EngineProblem, ImpurityEngine};
use crate::hash::config_fingerprint;
use crate::params::{SolveParams, SolverSetup};
use crate::problem::ImpurityProblem;
use crate::sample::ProcessGroup;
use crate::sector::{select, MeasurementSector, WormSector};
use crate::tensor::{check_problem_layout, map_problem, orbitals_from_interaction};

/// Everything decided before the engine is first invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPlan {
    /// Selected pipeline.
    pub sector: MeasurementSector,
    /// Engine worm sector number for component-resolved pipelines.
    pub worm_sector: Option<u32>,
    /// Ordered components and their budget.
    pub components: Option<ComponentPlan>,
    /// Translated configuration.
    pub config: ResolvedConfig,
    /// SHA-256 of the engine options.
    pub fingerprint: String,
    /// Seed of the planning process.
    pub seed: u64,
}

/// CT-HYB solve orchestrator bound to a fixed block structure and meshes.
pub struct Solver {
    setup: SolverSetup,
    transform: Option<Box<dyn FourierTransform>>,
}

impl std::fmt::Debug for Solver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solver")
            .field("setup", &self.setup)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl Solver {
    /// Creates a solver; results are produced on the meshes described by `setup`.
    pub fn new(setup: SolverSetup) -> Self {
        Self {
            setup,
            transform: None,
        }
    }

    /// Attaches the transform used to fill `G(iω)` from `G(τ)`.
    pub fn with_transform(mut self, transform: Box<dyn FourierTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Construction-time setup.
    pub fn setup(&self) -> &SolverSetup {
        &self.setup
    }

    fn prepare(
        &self,
        problem: &ImpurityProblem,
        params: &SolveParams,
        rank: usize,
    ) -> Result<(DispatchPlan, EngineProblem), SolverError> {
        let n_orb = orbitals_from_interaction(&problem.interaction.tensor)?;
        check_problem_layout(&self.setup, problem, n_orb)?;
        let facts = ProblemFacts {
            n_orb,
            offdiag: problem.offdiagonal(),
            has_quadratic_term: problem.has_quadratic_term(),
        };
        let resolved = translate(&self.setup, params, &facts)?;
        let engine_problem = map_problem(&self.setup, problem)?;
        let sector = select(&resolved)?;
        let components = component_plan(sector, &resolved, params, &engine_problem)?;
        let worm_sector = sector
            .is_component_resolved()
            .then(|| WormSector::from_config(&resolved.engine).number());
        let plan = DispatchPlan {
            sector,
            worm_sector,
            components,
            fingerprint: config_fingerprint(&resolved.engine)?,
            config: resolved,
            seed: params.seed_policy().for_rank(rank),
        };
        Ok((plan, engine_problem))
    }

    /// Translates, maps and selects without invoking the engine.
    pub fn plan(
        &self,
        problem: &ImpurityProblem,
        params: &SolveParams,
        rank: usize,
    ) -> Result<DispatchPlan, SolverError> {
        self.prepare(problem, params, rank).map(|(plan, _)| plan)
    }

    /// Runs the selected measurement pipeline.
    ///
    /// Every process of `group` must call this with identical parameters.
    pub fn solve(
        &self,
        engine: &mut dyn ImpurityEngine,
        group: &dyn ProcessGroup,
        problem: &ImpurityProblem,
        params: &SolveParams,
    ) -> Result<SolveOutcome, SolverError> {
        let (plan, engine_problem) = self.prepare(problem, params, group.rank())?;
        if group.rank() == 0 {
            plan.config.engine.echo();
            info!("measurement sector: {}", plan.sector);
        }
        info!(
            "rank {} configuration fingerprint {}",
            group.rank(),
            plan.fingerprint
        );
        let ctx = DispatchContext {
            setup: &self.setup,
            resolved: &plan.config,
            problem: &engine_problem,
            group,
            seed: plan.seed,
            transform: self.transform.as_deref(),
        };
        dispatch(&ctx, engine, plan.sector, plan.components.as_ref())
    }
}
