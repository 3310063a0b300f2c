use crate::defaults::{GUESS_PERTURBATION, MAX_DETERMINANTS};
use crate::hamiltonian::transform::{transform_eri, transform_one};
use crate::hamiltonian::EmbeddingHamiltonian;
use crate::solver::determinant::*;
use crate::solver::mean_field::{restricted_scf, MeanFieldOptions, ScfSolution};
use crate::solver::{FragmentResult, FragmentSolver, SolverError, SolverErrorKind, SolverGuess};
use crate::utils::eigh;
use hashbrown::HashMap;
use log::debug;
use ndarray::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct CiOptions {
    /// largest number of determinants for the dense diagonalization
    pub max_determinants: usize,
    /// SCF settings for the reference determinant of truncated CI
    pub mean_field: MeanFieldOptions,
}

impl Default for CiOptions {
    fn default() -> Self {
        CiOptions {
            max_determinants: MAX_DETERMINANTS,
            mean_field: MeanFieldOptions::default(),
        }
    }
}

/// Configuration interaction in a determinant basis. Without an excitation limit this is
/// full CI in the embedding orbitals, with a limit of two it is CISD on top of the canonical
/// mean-field orbitals of the fragment.
pub struct CiSolver {
    options: CiOptions,
    max_excitation: Option<usize>,
}

impl CiSolver {
    pub fn fci(options: CiOptions) -> Self {
        CiSolver {
            options,
            max_excitation: None,
        }
    }

    pub fn cisd(options: CiOptions) -> Self {
        CiSolver {
            options,
            max_excitation: Some(2),
        }
    }
}

impl FragmentSolver for CiSolver {
    fn name(&self) -> &str {
        match self.max_excitation {
            None => "FCI",
            Some(_) => "CISD",
        }
    }

    fn solve(
        &self,
        ham: &EmbeddingHamiltonian,
        guess: &SolverGuess,
    ) -> Result<FragmentResult, SolverError> {
        let fail = |kind: SolverErrorKind| SolverError::new(ham.fragment, kind);
        let n: usize = ham.dim();
        if ham.n_elec % 2 != 0 {
            return Err(fail(SolverErrorKind::Numerical(format!(
                "{} electrons cannot form a closed shell",
                ham.n_elec
            ))));
        }
        let n_alpha: usize = ham.n_elec / 2;
        if n_alpha > n {
            return Err(fail(SolverErrorKind::Numerical(format!(
                "{} electrons do not fit into {} orbitals",
                ham.n_elec, n
            ))));
        }
        let size: usize = match self.max_excitation {
            None => space_size(n, n_alpha, n_alpha),
            Some(max_exc) => truncated_space_size(n, n_alpha, n_alpha, max_exc),
        };
        if n > MAX_ORBITALS || size > self.options.max_determinants {
            return Err(fail(SolverErrorKind::SpaceTooLarge {
                determinants: size,
                limit: self.options.max_determinants,
            }));
        }

        // orbital basis of the CI expansion and the reference determinant
        let (h, eri, basis): (Array2<f64>, Array4<f64>, Option<Array2<f64>>) =
            match self.max_excitation {
                None => (ham.h1.clone(), ham.eri.clone(), None),
                Some(_) => {
                    let start: Option<Array2<f64>> =
                        guess.perturbed_density(ham.fragment, GUESS_PERTURBATION);
                    let scf: ScfSolution = restricted_scf(
                        ham.h1.view(),
                        ham.eri.view(),
                        ham.n_elec,
                        start.as_ref().map(|d| d.view()),
                        &self.options.mean_field,
                    )
                    .map_err(fail)?;
                    let c: Array2<f64> = scf.orbitals;
                    (
                        transform_one(ham.h1.view(), c.view()),
                        transform_eri(ham.eri.view(), c.view()),
                        Some(c),
                    )
                }
            };

        // the canonical orbitals are ordered by energy, the reference occupies the lowest ones
        let dets: Vec<Determinant> = match self.max_excitation {
            None => determinant_space(n, n_alpha, n_alpha),
            Some(max_exc) => truncated_space(n, n_alpha, n_alpha, max_exc),
        };
        let index: HashMap<Determinant, usize> =
            dets.iter().enumerate().map(|(i, &d)| (d, i)).collect();

        let hmat: Array2<f64> = hamiltonian_matrix(&dets, &index, h.view(), eri.view(), n);
        let (values, vectors): (Array1<f64>, Array2<f64>) = eigh(hmat.view())
            .map_err(|err| fail(SolverErrorKind::Numerical(err.to_string())))?;
        let energy: f64 = values[0];
        let (mut rdm1, mut rdm2): (Array2<f64>, Array4<f64>) =
            density_matrices(&dets, &index, vectors.column(0), n);

        if let Some(c) = basis {
            rdm1 = c.dot(&rdm1).dot(&c.t());
            rdm2 = transform_eri(rdm2.view(), c.t());
        }
        debug!(
            "fragment {}: {} with {} determinants, E = {:.10}",
            ham.fragment,
            self.name(),
            dets.len(),
            energy
        );
        Ok(FragmentResult {
            fragment: ham.fragment,
            energy,
            rdm1,
            rdm2: Some(rdm2),
            iterations: 1,
        })
    }
}

// spin orbitals with the same spin as `so`
fn same_spin(so: usize, n: usize) -> std::ops::Range<usize> {
    if so < n {
        0..n
    } else {
        n..2 * n
    }
}

enum Excitation {
    /// a+_p a_q
    One(usize, usize),
    /// a+_p a+_r a_s a_q
    Two(usize, usize, usize, usize),
}

/// Visit all non-vanishing one- and two-body excitations of the determinant `det`. The
/// callback receives the spatial indices, the resulting determinant and the fermionic sign.
fn for_each_excitation<F>(det: Determinant, n: usize, mut visit: F)
where
    F: FnMut(Excitation, Determinant, f64),
{
    let occ: Vec<usize> = occupied(det, 2 * n);
    for &q in occ.iter() {
        let (d1, s1) = match annihilate(det, q) {
            Some(x) => x,
            None => continue,
        };
        for p in same_spin(q, n) {
            if let Some((d2, s2)) = create(d1, p) {
                visit(Excitation::One(p % n, q % n), d2, s1 * s2);
            }
        }
        for &s in occ.iter().filter(|&&s| s != q) {
            let (d2, s2) = match annihilate(d1, s) {
                Some(x) => x,
                None => continue,
            };
            for r in same_spin(s, n) {
                let (d3, s3) = match create(d2, r) {
                    Some(x) => x,
                    None => continue,
                };
                for p in same_spin(q, n) {
                    if let Some((d4, s4)) = create(d3, p) {
                        visit(
                            Excitation::Two(p % n, q % n, r % n, s % n),
                            d4,
                            s1 * s2 * s3 * s4,
                        );
                    }
                }
            }
        }
    }
}

fn hamiltonian_matrix(
    dets: &[Determinant],
    index: &HashMap<Determinant, usize>,
    h: ArrayView2<f64>,
    eri: ArrayView4<f64>,
    n: usize,
) -> Array2<f64> {
    let dim: usize = dets.len();
    let mut hmat: Array2<f64> = Array2::zeros((dim, dim));
    for (i, &det) in dets.iter().enumerate() {
        for_each_excitation(det, n, |exc, d, sign| {
            if let Some(&j) = index.get(&d) {
                hmat[[j, i]] += match exc {
                    Excitation::One(p, q) => sign * h[[p, q]],
                    Excitation::Two(p, q, r, s) => 0.5 * sign * eri[[p, q, r, s]],
                };
            }
        });
    }
    hmat
}

/// Spin-summed 1- and 2-RDM of a real CI vector,
/// g_pq = <a+_p a_q> and G_pqrs = <a+_p a+_r a_s a_q>.
fn density_matrices(
    dets: &[Determinant],
    index: &HashMap<Determinant, usize>,
    civec: ArrayView1<f64>,
    n: usize,
) -> (Array2<f64>, Array4<f64>) {
    let mut rdm1: Array2<f64> = Array2::zeros((n, n));
    let mut rdm2: Array4<f64> = Array4::zeros([n, n, n, n]);
    for (i, &det) in dets.iter().enumerate() {
        let ci: f64 = civec[i];
        if ci == 0.0 {
            continue;
        }
        for_each_excitation(det, n, |exc, d, sign| {
            if let Some(&j) = index.get(&d) {
                let value: f64 = sign * civec[j] * ci;
                match exc {
                    Excitation::One(p, q) => rdm1[[p, q]] += value,
                    Excitation::Two(p, q, r, s) => rdm2[[p, q, r, s]] += value,
                }
            }
        });
    }
    (rdm1, rdm2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn hubbard_hamiltonian(n: usize, t: f64, u: f64, n_elec: usize) -> EmbeddingHamiltonian {
        let mut h: Array2<f64> = Array2::zeros((n, n));
        for i in 1..n {
            h[[i - 1, i]] = -t;
            h[[i, i - 1]] = -t;
        }
        let mut eri: Array4<f64> = Array4::zeros([n, n, n, n]);
        for p in 0..n {
            eri[[p, p, p, p]] = u;
        }
        EmbeddingHamiltonian::from_integrals(0, h, eri, n_elec)
    }

    fn energy_from_rdms(ham: &EmbeddingHamiltonian, result: &FragmentResult) -> f64 {
        let rdm2: &Array4<f64> = result.rdm2.as_ref().unwrap();
        (&ham.h1 * &result.rdm1).sum() + 0.5 * (&ham.eri * rdm2).sum()
    }

    #[test]
    fn hubbard_dimer_fci() {
        let (t, u): (f64, f64) = (1.0, 4.0);
        let ham: EmbeddingHamiltonian = hubbard_hamiltonian(2, t, u, 2);
        let guess: SolverGuess = SolverGuess::new(ham.guess.clone());
        let result: FragmentResult = CiSolver::fci(CiOptions::default())
            .solve(&ham, &guess)
            .unwrap();
        let exact: f64 = 0.5 * u - (0.25 * u * u + 4.0 * t * t).sqrt();
        assert_abs_diff_eq!(result.energy, exact, epsilon = 1e-10);
        assert_abs_diff_eq!(result.rdm1.diag().sum(), 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(energy_from_rdms(&ham, &result), exact, epsilon = 1e-10);
    }

    #[test]
    fn rdm2_contracts_to_rdm1() {
        let ham: EmbeddingHamiltonian = hubbard_hamiltonian(4, 1.0, 2.0, 4);
        let guess: SolverGuess = SolverGuess::new(ham.guess.clone());
        let result: FragmentResult = CiSolver::fci(CiOptions::default())
            .solve(&ham, &guess)
            .unwrap();
        let rdm2: &Array4<f64> = result.rdm2.as_ref().unwrap();
        for p in 0..4 {
            for q in 0..4 {
                let partial: f64 = (0..4).map(|r| rdm2[[p, q, r, r]]).sum();
                assert_abs_diff_eq!(partial, 3.0 * result.rdm1[[p, q]], epsilon = 1e-10);
            }
        }
        assert_abs_diff_eq!(energy_from_rdms(&ham, &result), result.energy, epsilon = 1e-10);
    }

    #[test]
    fn cisd_is_exact_for_two_electrons() {
        let ham: EmbeddingHamiltonian = hubbard_hamiltonian(3, 1.0, 3.0, 2);
        let guess: SolverGuess = SolverGuess::new(ham.guess.clone());
        let fci: FragmentResult = CiSolver::fci(CiOptions::default())
            .solve(&ham, &guess)
            .unwrap();
        let cisd: FragmentResult = CiSolver::cisd(CiOptions::default())
            .solve(&ham, &guess)
            .unwrap();
        assert_abs_diff_eq!(cisd.energy, fci.energy, epsilon = 1e-9);
        for (a, b) in cisd.rdm1.iter().zip(fci.rdm1.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-7);
        }
        assert_abs_diff_eq!(energy_from_rdms(&ham, &cisd), fci.energy, epsilon = 1e-9);
    }

    #[test]
    fn cisd_is_variational() {
        let ham: EmbeddingHamiltonian = hubbard_hamiltonian(6, 1.0, 4.0, 6);
        let guess: SolverGuess = SolverGuess::new(ham.guess.clone());
        let fci: FragmentResult = CiSolver::fci(CiOptions::default())
            .solve(&ham, &guess)
            .unwrap();
        let cisd: FragmentResult = CiSolver::cisd(CiOptions::default())
            .solve(&ham, &guess)
            .unwrap();
        assert!(cisd.energy > fci.energy - 1e-10);
        assert_abs_diff_eq!(energy_from_rdms(&ham, &cisd), cisd.energy, epsilon = 1e-8);
    }

    #[test]
    fn determinant_limit() {
        let ham: EmbeddingHamiltonian = hubbard_hamiltonian(6, 1.0, 1.0, 6);
        let guess: SolverGuess = SolverGuess::new(ham.guess.clone());
        let options: CiOptions = CiOptions {
            max_determinants: 100,
            ..CiOptions::default()
        };
        let err: SolverError = CiSolver::fci(options).solve(&ham, &guess).unwrap_err();
        assert_eq!(
            err.kind,
            SolverErrorKind::SpaceTooLarge {
                determinants: 400,
                limit: 100
            }
        );
    }
    #[test]
    fn cisd_limit_is_checked_before_the_space_is_built() {
        // the full space of 12 electrons in 24 orbitals has about 7e12 determinants
        let ham: EmbeddingHamiltonian = hubbard_hamiltonian(24, 1.0, 2.0, 12);
        let guess: SolverGuess = SolverGuess::new(ham.guess.clone());
        let err: SolverError = CiSolver::cisd(CiOptions::default())
            .solve(&ham, &guess)
            .unwrap_err();
        assert_eq!(
            err.kind,
            SolverErrorKind::SpaceTooLarge {
                determinants: 29737,
                limit: MAX_DETERMINANTS
            }
        );
    }

    #[test]
    fn cisd_space_size_is_exact() {
        // 1 + 2 * 3 * 3 + 2 * 3 * 3 + 9 * 9 = 118 of the 400 determinants of 6 electrons in 6 orbitals
        let ham: EmbeddingHamiltonian = hubbard_hamiltonian(6, 1.0, 1.0, 6);
        let guess: SolverGuess = SolverGuess::new(ham.guess.clone());
        let options: CiOptions = CiOptions {
            max_determinants: 117,
            ..CiOptions::default()
        };
        let err: SolverError = CiSolver::cisd(options.clone()).solve(&ham, &guess).unwrap_err();
        assert_eq!(
            err.kind,
            SolverErrorKind::SpaceTooLarge {
                determinants: 118,
                limit: 117
            }
        );
        let options: CiOptions = CiOptions {
            max_determinants: 118,
            ..options
        };
        assert!(CiSolver::cisd(options).solve(&ham, &guess).is_ok());
    }
    #[test]
    fn ten_orbital_fci_needs_a_larger_limit() {
        let ham: EmbeddingHamiltonian = hubbard_hamiltonian(10, 1.0, 2.0, 10);
        let guess: SolverGuess = SolverGuess::new(ham.guess.clone());
        let err: SolverError = CiSolver::fci(CiOptions::default())
            .solve(&ham, &guess)
            .unwrap_err();
        assert_eq!(
            err.kind,
            SolverErrorKind::SpaceTooLarge {
                determinants: 63504,
                limit: MAX_DETERMINANTS
            }
        );
        assert!(err.to_string().contains("max_determinants"));
        assert!(space_size(8, 4, 4) <= MAX_DETERMINANTS);
    }
}
