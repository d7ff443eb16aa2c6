#![allow(dead_code)]

use cthyb_core::{BlockGf, GfStruct, Mesh, SolverError, C64};
use cthyb_driver::{
    EngineOutput, EngineRequest, EngineResult, ImpurityEngine, ImpurityProblem, Interaction,
    Invocation, OneBodyTerm, SolverSetup,
};
use ndarray::{Array2, Array4, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const BETA: f64 = 10.0;
pub const N_TAU: usize = 11;

/// Engine producing seeded pseudo-random observables of the right shapes.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    pub calls: Vec<Invocation>,
    pub seeds: Vec<u64>,
    pub budgets: Vec<i64>,
    pub replicates: usize,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            seeds: Vec::new(),
            budgets: Vec::new(),
            replicates: 2,
        }
    }
}

pub fn random(rng: &mut StdRng, shape: &[usize]) -> ArrayD<C64> {
    ArrayD::from_shape_simple_fn(IxDyn(shape), || C64::new(rng.gen::<f64>(), rng.gen::<f64>()))
}

fn dim(request: &EngineRequest<'_>, key: &str) -> usize {
    request.config.qmc_int(key).max(0) as usize
}

impl ImpurityEngine for ScriptedEngine {
    fn invoke(&mut self, request: &EngineRequest<'_>) -> Result<EngineResult, SolverError> {
        self.calls.push(request.invocation);
        self.seeds.push(request.seed);
        self.budgets.push(request.config.qmc_int("Nmeas"));
        let n_orb = request.problem.n_orb;
        let bins = dim(request, "Ntau");
        let reps = self.replicates;
        match request.invocation {
            Invocation::Standard => {
                let mut rng = StdRng::seed_from_u64(request.seed);
                let mut output = EngineOutput::default();
                output.insert("gtau", random(&mut rng, &[reps, n_orb, 2, bins]));
                output.insert(
                    "gtau-full",
                    random(&mut rng, &[reps, n_orb, 2, n_orb, 2, bins]),
                );
                output.insert(
                    "gleg-full",
                    random(&mut rng, &[reps, n_orb, 2, n_orb, 2, dim(request, "NLegMax")]),
                );
                output.insert("hist", random(&mut rng, &[reps, n_orb, 2, 8]));
                Ok(EngineResult::Standard(output))
            }
            Invocation::Component { sector, component } => {
                let mut rng = StdRng::seed_from_u64(request.seed ^ component);
                let mut generator = EngineOutput::default();
                generator.insert("sign", random(&mut rng, &[reps]));
                let mut output = EngineOutput::default();
                let key = format!("{component:05}");
                match sector {
                    2 => output.insert(format!("gtau-worm/{key}"), random(&mut rng, &[reps, bins])),
                    4 => output.insert(
                        format!("g4iw-worm/{key}"),
                        random(
                            &mut rng,
                            &[
                                reps,
                                2 * dim(request, "N4iwf"),
                                2 * dim(request, "N4iwf"),
                                2 * dim(request, "N4iwb") + 1,
                            ],
                        ),
                    ),
                    8 => output.insert(
                        format!("p3iw-worm/{key}"),
                        random(
                            &mut rng,
                            &[reps, 2 * dim(request, "N3iwf"), 2 * dim(request, "N3iwb") + 1],
                        ),
                    ),
                    6 if request.config.qmc_flag("WormMeasP2iwPH") => output.insert(
                        format!("p2iw-worm/{key}"),
                        random(&mut rng, &[reps, 2 * dim(request, "N2iwb") + 1]),
                    ),
                    6 => output.insert(format!("p2tau-worm/{key}"), random(&mut rng, &[reps, bins])),
                    other => {
                        return Err(SolverError::engine(
                            "sector",
                            format!("scripted engine cannot sample sector {other}"),
                        ))
                    }
                }
                Ok(EngineResult::Component {
                    generator,
                    component: output,
                })
            }
        }
    }
}

/// Spin-major diagonal structure: one block per spin-orbital.
pub fn diagonal_structure(n_orb: usize) -> GfStruct {
    let mut blocks = Vec::new();
    for spin in ["up", "down"] {
        for orbital in 0..n_orb {
            blocks.push((format!("{spin}_{orbital}"), 1));
        }
    }
    GfStruct::new(blocks)
}

/// One block per spin holding every orbital.
pub fn spin_structure(n_orb: usize) -> GfStruct {
    GfStruct::new(vec![("up", n_orb), ("down", n_orb)])
}

pub fn setup(structure: GfStruct) -> SolverSetup {
    let mut setup = SolverSetup::new(BETA, structure);
    setup.n_iw = 8;
    setup.n_tau = N_TAU;
    setup.n_l = 5;
    setup
}

/// Density-density interaction in monomial convention.
pub fn density_interaction(n_orb: usize, u: f64) -> Array4<C64> {
    let dim = 2 * n_orb;
    let mut tensor = Array4::<C64>::zeros((dim, dim, dim, dim));
    for i in 0..dim {
        for j in 0..dim {
            if i != j {
                tensor[[i, j, j, i]] = C64::new(u / 2.0, 0.0);
            }
        }
    }
    tensor
}

fn levels(size: usize) -> Array2<C64> {
    Array2::<C64>::eye(size).mapv(|value| value * -0.5)
}

/// Problem whose hybridization is `-0.3` on every block entry.
pub fn problem(structure: &GfStruct, quadratic: bool) -> ImpurityProblem {
    let n_orb = structure.total_size() / 2;
    let mut delta = BlockGf::zeros(Mesh::fermionic_tau(BETA, N_TAU), structure);
    for block in delta.blocks_mut() {
        block.fill(C64::new(-0.3, 0.0));
    }
    let one_body = if quadratic {
        OneBodyTerm::Quadratic(levels(2 * n_orb))
    } else {
        OneBodyTerm::Levels(
            structure
                .blocks()
                .iter()
                .map(|block| levels(block.size))
                .collect(),
        )
    };
    ImpurityProblem::new(delta, one_body, Interaction::monomial(density_interaction(n_orb, 2.0)))
}
