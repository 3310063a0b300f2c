mod ci;
mod determinant;
mod diis;
pub mod mean_field;

pub use ci::{CiOptions, CiSolver};
pub use mean_field::{restricted_scf, MeanFieldOptions, MeanFieldSolver, ScfSolution};

use crate::hamiltonian::EmbeddingHamiltonian;
use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;

/// Output of a fragment solver in the embedding basis of the fragment.
#[derive(Debug, Clone)]
pub struct FragmentResult {
    pub fragment: usize,
    /// electronic energy of the embedding Hamiltonian (including the matching potentials)
    pub energy: f64,
    /// spin-summed one-particle density matrix
    pub rdm1: Array2<f64>,
    /// spin-summed two-particle density matrix, E = sum h_pq g_pq + 1/2 sum (pq|rs) G_pqrs
    pub rdm2: Option<Array4<f64>>,
    pub iterations: usize,
}

/// Starting point of a solver call. `attempt` counts the retries of the same fragment,
/// a solver is expected to perturb its guess for `attempt > 0`.
#[derive(Debug, Clone)]
pub struct SolverGuess {
    pub density: Option<Array2<f64>>,
    pub attempt: usize,
}

impl SolverGuess {
    pub fn new(density: Array2<f64>) -> Self {
        SolverGuess {
            density: Some(density),
            attempt: 0,
        }
    }

    /// The guess density with a symmetric random perturbation of magnitude `scale`. The random
    /// numbers are seeded by fragment and attempt so that repeated runs are reproducible.
    pub fn perturbed_density(&self, fragment: usize, scale: f64) -> Option<Array2<f64>> {
        let density: &Array2<f64> = self.density.as_ref()?;
        if self.attempt == 0 {
            return Some(density.clone());
        }
        let seed: u64 = ((fragment as u64) << 32) | self.attempt as u64;
        let mut rng: StdRng = StdRng::seed_from_u64(seed);
        let n: usize = density.nrows();
        let mut perturbed: Array2<f64> = density.clone();
        for i in 0..n {
            for j in i..n {
                let delta: f64 = scale * rng.gen_range(-1.0..1.0);
                perturbed[[i, j]] += delta;
                if i != j {
                    perturbed[[j, i]] += delta;
                }
            }
        }
        Some(perturbed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolverErrorKind {
    NotConverged { iterations: usize, residual: f64 },
    Numerical(String),
    SpaceTooLarge { determinants: usize, limit: usize },
    Backend(String),
}

impl fmt::Display for SolverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SolverErrorKind::NotConverged {
                iterations,
                residual,
            } => write!(
                f,
                "not converged after {} iterations (residual {:.3e})",
                iterations, residual
            ),
            SolverErrorKind::Numerical(msg) => write!(f, "numerical failure: {}", msg),
            SolverErrorKind::SpaceTooLarge {
                determinants,
                limit,
            } => write!(
                f,
                "{} determinants exceed the limit of {} (solver option max_determinants)",
                determinants, limit
            ),
            SolverErrorKind::Backend(msg) => write!(f, "backend failure: {}", msg),
        }
    }
}

/// A solver failed on one fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverError {
    pub fragment: usize,
    pub kind: SolverErrorKind,
}

impl SolverError {
    pub fn new(fragment: usize, kind: SolverErrorKind) -> Self {
        SolverError { fragment, kind }
    }
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "solver failed on fragment {}: {}", self.fragment, self.kind)
    }
}

impl std::error::Error for SolverError {}

/// Contract of a correlated solver. Implementations only read the embedding Hamiltonian and
/// must not keep state between calls, fragments are solved concurrently.
pub trait FragmentSolver: Send + Sync {
    fn name(&self) -> &str;

    fn solve(
        &self,
        ham: &EmbeddingHamiltonian,
        guess: &SolverGuess,
    ) -> Result<FragmentResult, SolverError>;
}

/// The available solver backends.
#[derive(Clone)]
pub enum SolverKind {
    MeanField(MeanFieldOptions),
    Fci(CiOptions),
    Cisd(CiOptions),
    External(Arc<dyn FragmentSolver>),
}

impl fmt::Debug for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SolverKind::MeanField(opts) => f.debug_tuple("MeanField").field(opts).finish(),
            SolverKind::Fci(opts) => f.debug_tuple("Fci").field(opts).finish(),
            SolverKind::Cisd(opts) => f.debug_tuple("Cisd").field(opts).finish(),
            SolverKind::External(solver) => {
                f.debug_tuple("External").field(&solver.name()).finish()
            }
        }
    }
}

impl SolverKind {
    pub fn name(&self) -> &str {
        match self {
            SolverKind::MeanField(_) => "RHF",
            SolverKind::Fci(_) => "FCI",
            SolverKind::Cisd(_) => "CISD",
            SolverKind::External(solver) => solver.name(),
        }
    }

    /// Solve one embedding problem with the selected backend and check the shape of the
    /// returned density matrices.
    pub fn solve(
        &self,
        ham: &EmbeddingHamiltonian,
        guess: &SolverGuess,
    ) -> Result<FragmentResult, SolverError> {
        let mut result: FragmentResult = match self {
            SolverKind::MeanField(opts) => MeanFieldSolver::new(opts.clone()).solve(ham, guess),
            SolverKind::Fci(opts) => CiSolver::fci(opts.clone()).solve(ham, guess),
            SolverKind::Cisd(opts) => CiSolver::cisd(opts.clone()).solve(ham, guess),
            SolverKind::External(solver) => solver.solve(ham, guess),
        }?;
        result.fragment = ham.fragment;

        let n: usize = ham.dim();
        let backend_error = |msg: String| {
            SolverError::new(ham.fragment, SolverErrorKind::Backend(msg))
        };
        if result.rdm1.dim() != (n, n) {
            return Err(backend_error(format!(
                "1-RDM has shape {:?}, expected ({}, {})",
                result.rdm1.dim(),
                n,
                n
            )));
        }
        if let Some(rdm2) = result.rdm2.as_ref() {
            if rdm2.shape() != [n, n, n, n] {
                return Err(backend_error(format!(
                    "2-RDM has shape {:?}, expected [{}; 4]",
                    rdm2.shape(),
                    n
                )));
            }
        }
        if !result.energy.is_finite() || result.rdm1.iter().any(|x| !x.is_finite()) {
            return Err(SolverError::new(
                ham.fragment,
                SolverErrorKind::Numerical(String::from("non-finite solver output")),
            ));
        }
        Ok(result)
    }
}
