use crate::defaults::{DIIS_LIMIT, GUESS_PERTURBATION, SOLVER_CONV_TOL, SOLVER_MAX_CYCLES};
use crate::hamiltonian::transform::{mean_field_energy, two_electron_potential};
use crate::hamiltonian::EmbeddingHamiltonian;
use crate::solver::diis::Diis;
use crate::solver::{FragmentResult, FragmentSolver, SolverError, SolverErrorKind, SolverGuess};
use crate::utils::{eigh, max_abs_deviation};
use log::{debug, trace};
use ndarray::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct MeanFieldOptions {
    pub max_cycles: usize,
    pub conv_tol: f64,
    pub diis_space: usize,
}

impl Default for MeanFieldOptions {
    fn default() -> Self {
        MeanFieldOptions {
            max_cycles: SOLVER_MAX_CYCLES,
            conv_tol: SOLVER_CONV_TOL,
            diis_space: DIIS_LIMIT,
        }
    }
}

/// Converged closed-shell mean-field state.
#[derive(Debug, Clone)]
pub struct ScfSolution {
    /// electronic energy
    pub energy: f64,
    /// spin-summed density matrix
    pub density: Array2<f64>,
    /// canonical orbitals (columns), ascending in energy
    pub orbitals: Array2<f64>,
    pub orbital_energies: Array1<f64>,
    pub iterations: usize,
}

/// Spin-summed density 2 C_occ C_occ^T of the lowest `n_occ` orbitals.
pub fn occupied_density(orbitals: ArrayView2<f64>, n_occ: usize) -> Array2<f64> {
    let occ: ArrayView2<f64> = orbitals.slice(s![.., ..n_occ]);
    2.0 * occ.dot(&occ.t())
}

/// Restricted closed-shell SCF in an orthonormal basis with DIIS acceleration. Convergence
/// requires both the largest change of the density matrix and the change of the energy to
/// drop below `conv_tol`.
pub fn restricted_scf(
    h: ArrayView2<f64>,
    eri: ArrayView4<f64>,
    n_elec: usize,
    guess: Option<ArrayView2<f64>>,
    options: &MeanFieldOptions,
) -> Result<ScfSolution, SolverErrorKind> {
    let n_orbs: usize = h.nrows();
    if n_elec % 2 != 0 {
        return Err(SolverErrorKind::Numerical(format!(
            "{} electrons cannot form a closed shell",
            n_elec
        )));
    }
    let n_occ: usize = n_elec / 2;
    if n_occ > n_orbs {
        return Err(SolverErrorKind::Numerical(format!(
            "{} electrons do not fit into {} orbitals",
            n_elec, n_orbs
        )));
    }
    let diagonalize = |f: ArrayView2<f64>| -> Result<(Array1<f64>, Array2<f64>), SolverErrorKind> {
        eigh(f).map_err(|err| SolverErrorKind::Numerical(err.to_string()))
    };

    // core Hamiltonian guess if no density is provided
    let mut density: Array2<f64> = match guess {
        Some(d) => d.to_owned(),
        None => occupied_density(diagonalize(h)?.1.view(), n_occ),
    };
    let mut energy: f64 = mean_field_energy(h, eri, density.view());
    let mut diis: Diis = Diis::new(options.diis_space);
    let mut change: f64 = f64::INFINITY;

    for iter in 0..options.max_cycles {
        let fock: Array2<f64> = &h + &two_electron_potential(eri, density.view());
        let error: Array2<f64> = fock.dot(&density) - density.dot(&fock);
        diis.push(fock.clone(), error);
        let fock: Array2<f64> = if iter > 0 {
            diis.extrapolate().unwrap_or(fock)
        } else {
            fock
        };
        let (_, orbitals): (Array1<f64>, Array2<f64>) = diagonalize(fock.view())?;
        let new_density: Array2<f64> = occupied_density(orbitals.view(), n_occ);
        let new_energy: f64 = mean_field_energy(h, eri, new_density.view());
        change = max_abs_deviation(new_density.view(), density.view());
        let delta_e: f64 = (new_energy - energy).abs();
        trace!(
            "SCF iteration {:>3}: E = {:>18.12} dE = {:>10.3e} dP = {:>10.3e}",
            iter + 1,
            new_energy,
            delta_e,
            change
        );
        density = new_density;
        energy = new_energy;

        if change < options.conv_tol && delta_e < options.conv_tol {
            // canonical orbitals of the final (not extrapolated) Fock matrix
            let fock: Array2<f64> = &h + &two_electron_potential(eri, density.view());
            let (orbital_energies, orbitals) = diagonalize(fock.view())?;
            return Ok(ScfSolution {
                energy,
                density,
                orbitals,
                orbital_energies,
                iterations: iter + 1,
            });
        }
    }
    Err(SolverErrorKind::NotConverged {
        iterations: options.max_cycles,
        residual: change,
    })
}

/// Restricted mean-field solver for embedded fragments. Solving the embedding problem at the
/// mean-field level reproduces the reference calculation (HF-in-HF).
pub struct MeanFieldSolver {
    options: MeanFieldOptions,
}

impl MeanFieldSolver {
    pub fn new(options: MeanFieldOptions) -> Self {
        MeanFieldSolver { options }
    }
}

impl FragmentSolver for MeanFieldSolver {
    fn name(&self) -> &str {
        "RHF"
    }

    fn solve(
        &self,
        ham: &EmbeddingHamiltonian,
        guess: &SolverGuess,
    ) -> Result<FragmentResult, SolverError> {
        let start: Option<Array2<f64>> = guess.perturbed_density(ham.fragment, GUESS_PERTURBATION);
        let scf: ScfSolution = restricted_scf(
            ham.h1.view(),
            ham.eri.view(),
            ham.n_elec,
            start.as_ref().map(|d| d.view()),
            &self.options,
        )
        .map_err(|kind| SolverError::new(ham.fragment, kind))?;
        debug!(
            "fragment {}: RHF converged in {} iterations, E = {:.10}",
            ham.fragment, scf.iterations, scf.energy
        );
        Ok(FragmentResult {
            fragment: ham.fragment,
            energy: scf.energy,
            rdm1: scf.density,
            rdm2: None,
            iterations: scf.iterations,
        })
    }
}
