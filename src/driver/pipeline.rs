use crate::bath::{construct_bath, BathOptions, BathSpace};
use crate::driver::logging;
use crate::error::BeError;
use crate::fragmentation::{Fragment, Partition};
use crate::hamiltonian::{build_hamiltonian, EmbeddingHamiltonian, Potential};
use crate::matching::{ChemicalPotentials, MatchingLayout};
use crate::solver::{FragmentResult, SolverError, SolverGuess, SolverKind};
use crate::system::System;
use log::{debug, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, Ordering};

/// Reaction on a failing fragment solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorPolicy {
    FailFast,
    /// call the solver again with a perturbed guess, at most `max_retries` times
    Retry { max_retries: usize },
}

impl ErrorPolicy {
    fn attempts(&self) -> usize {
        match self {
            ErrorPolicy::FailFast => 1,
            ErrorPolicy::Retry { max_retries } => max_retries + 1,
        }
    }
}

/// Runs the potential -> Hamiltonian -> solver chain of all fragments on a thread pool.
pub struct FragmentPipeline {
    pool: ThreadPool,
    policy: ErrorPolicy,
    tolerance: f64,
}

impl FragmentPipeline {
    /// `parallelism = 0` uses the default number of threads of rayon.
    pub fn new(parallelism: usize, policy: ErrorPolicy, tolerance: f64) -> Result<Self, BeError> {
        let pool: ThreadPool = ThreadPoolBuilder::new()
            .num_threads(parallelism)
            .build()
            .map_err(|err| BeError::Setup(format!("thread pool: {}", err)))?;
        Ok(FragmentPipeline {
            pool,
            policy,
            tolerance,
        })
    }

    pub fn n_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Schmidt decomposition and projection of the bare integrals for every fragment. These
    /// depend only on the reference density and are computed once per run.
    pub fn prepare(
        &self,
        system: &System,
        partition: &Partition,
        options: &BathOptions,
    ) -> Result<Vec<EmbeddingHamiltonian>, BeError> {
        let outcomes: Vec<Result<EmbeddingHamiltonian, BeError>> = self.pool.install(|| {
            partition
                .fragments
                .par_iter()
                .map(|frag: &Fragment| -> Result<EmbeddingHamiltonian, BeError> {
                    let bath: BathSpace = construct_bath(frag, system.density.view(), options)?;
                    let ham: EmbeddingHamiltonian = build_hamiltonian(
                        system,
                        frag,
                        &bath,
                        &Potential::default(),
                        self.tolerance,
                    )?;
                    Ok(ham)
                })
                .collect()
        });
        let hamiltonians: Vec<EmbeddingHamiltonian> =
            outcomes.into_iter().collect::<Result<Vec<_>, BeError>>()?;
        logging::bath_header();
        for ham in hamiltonians.iter() {
            let frag: &Fragment = &partition.fragments[ham.fragment];
            logging::bath_summary(ham.fragment, frag.n_orbs(), ham.dim() - frag.n_orbs(), ham.n_elec);
        }
        Ok(hamiltonians)
    }

    /// Solve every fragment at the given potentials. The results are ordered by fragment
    /// index. After the first failure no new fragment is started and the error of the
    /// failed fragment with the lowest index is returned.
    pub fn run(
        &self,
        hamiltonians: &[EmbeddingHamiltonian],
        potentials: &ChemicalPotentials,
        layout: &MatchingLayout,
        solver: &SolverKind,
    ) -> Result<Vec<FragmentResult>, BeError> {
        let abort: AtomicBool = AtomicBool::new(false);
        let outcomes: Vec<Option<Result<FragmentResult, BeError>>> = self.pool.install(|| {
            hamiltonians
                .par_iter()
                .map(|bare| {
                    if abort.load(Ordering::SeqCst) {
                        return None;
                    }
                    let outcome: Result<FragmentResult, BeError> =
                        self.solve_fragment(bare, potentials, layout, solver);
                    if outcome.is_err() {
                        abort.store(true, Ordering::SeqCst);
                    }
                    Some(outcome)
                })
                .collect()
        });

        let mut results: Vec<FragmentResult> = Vec::with_capacity(outcomes.len());
        let mut skipped: Option<usize> = None;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(result)) => results.push(result),
                Some(Err(err)) => return Err(err),
                None => {
                    skipped.get_or_insert(index);
                }
            }
        }
        match skipped {
            Some(index) => Err(BeError::Setup(format!(
                "fragment {} was skipped without a failing fragment",
                index
            ))),
            None => Ok(results),
        }
    }

    fn solve_fragment(
        &self,
        bare: &EmbeddingHamiltonian,
        potentials: &ChemicalPotentials,
        layout: &MatchingLayout,
        solver: &SolverKind,
    ) -> Result<FragmentResult, BeError> {
        let ham: EmbeddingHamiltonian =
            bare.with_potential(&potentials.potential_for(layout, bare.fragment), self.tolerance)?;
        let mut guess: SolverGuess = SolverGuess::new(ham.guess.clone());
        let attempts: usize = self.policy.attempts();
        let mut last_error: Option<SolverError> = None;
        for attempt in 0..attempts {
            guess.attempt = attempt;
            match solver.solve(&ham, &guess) {
                Ok(result) => {
                    debug!(
                        "fragment {}: {} energy {:.10} after {} iterations",
                        ham.fragment,
                        solver.name(),
                        result.energy,
                        result.iterations
                    );
                    return Ok(result);
                }
                Err(err) => {
                    if attempt + 1 < attempts {
                        warn!("{}, retrying with a perturbed guess", err);
                    }
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) => Err(BeError::Solver(err)),
            None => Err(BeError::Setup(String::from("no solver attempt was made"))),
        }
    }
}
