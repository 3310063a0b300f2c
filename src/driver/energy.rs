use crate::hamiltonian::EmbeddingHamiltonian;
use crate::solver::FragmentResult;
use ndarray::prelude::*;

/// Contribution of the center orbitals of one fragment to the total energy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentEnergy {
    pub fragment: usize,
    /// sum_p sum_q h_pq gamma_qp
    pub one_body: f64,
    /// 1/2 sum_p sum_q G[D_core]_pq gamma_qp
    pub core: f64,
    /// 1/2 sum_p sum_qrs (pq|rs) Gamma_pqrs
    pub two_body: f64,
}

impl FragmentEnergy {
    pub fn total(&self) -> f64 {
        self.one_body + self.core + self.two_body
    }
}

/// Energy of a converged embedding calculation, E = E1 + EC + E2 + E_nuc.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyReport {
    pub fragments: Vec<FragmentEnergy>,
    pub one_body: f64,
    pub core: f64,
    pub two_body: f64,
    pub e_nuc: f64,
    pub total: f64,
    /// mean-field energy of the reference density
    pub reference: f64,
    pub correlation: f64,
}

impl EnergyReport {
    pub fn new(fragments: Vec<FragmentEnergy>, e_nuc: f64, reference: f64) -> Self {
        let one_body: f64 = fragments.iter().map(|f| f.one_body).sum();
        let core: f64 = fragments.iter().map(|f| f.core).sum();
        let two_body: f64 = fragments.iter().map(|f| f.two_body).sum();
        let total: f64 = one_body + core + two_body + e_nuc;
        EnergyReport {
            fragments,
            one_body,
            core,
            two_body,
            e_nuc,
            total,
            reference,
            correlation: total - reference,
        }
    }
}

/// Center energy of a fragment. The bare one-electron Hamiltonian is used, the matching
/// potentials do not enter. Without a 2-RDM the mean-field factorisation
/// Gamma_pqrs = gamma_pq gamma_rs - 1/2 gamma_ps gamma_rq is used.
pub fn fragment_energy(ham: &EmbeddingHamiltonian, result: &FragmentResult) -> FragmentEnergy {
    let gamma: &Array2<f64> = &result.rdm1;
    let n: usize = gamma.nrows();
    let mut one_body: f64 = 0.0;
    let mut core: f64 = 0.0;
    let mut two_body: f64 = 0.0;

    for &p in ham.center.iter() {
        one_body += ham.h1_bare.row(p).dot(&gamma.column(p));
        core += 0.5 * ham.g_core.row(p).dot(&gamma.column(p));
        let eri_p: ArrayView3<f64> = ham.eri.index_axis(Axis(0), p);
        two_body += 0.5
            * match result.rdm2.as_ref() {
                Some(rdm2) => (&eri_p * &rdm2.index_axis(Axis(0), p)).sum(),
                None => {
                    let mut e: f64 = 0.0;
                    for q in 0..n {
                        for r in 0..n {
                            for s in 0..n {
                                e += eri_p[[q, r, s]]
                                    * (gamma[[p, q]] * gamma[[r, s]]
                                        - 0.5 * gamma[[p, s]] * gamma[[r, q]]);
                            }
                        }
                    }
                    e
                }
            };
    }

    FragmentEnergy {
        fragment: ham.fragment,
        one_body,
        core,
        two_body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hamiltonian::transform::mean_field_energy;
    use approx::assert_abs_diff_eq;

    fn dimer() -> EmbeddingHamiltonian {
        let h: Array2<f64> = array![[0.1, -1.0], [-1.0, -0.1]];
        let mut eri: Array4<f64> = Array4::zeros([2, 2, 2, 2]);
        eri[[0, 0, 0, 0]] = 2.0;
        eri[[1, 1, 1, 1]] = 2.0;
        EmbeddingHamiltonian::from_integrals(0, h, eri, 2)
    }

    #[test]
    fn factorised_energy_is_mean_field_energy() {
        let ham: EmbeddingHamiltonian = dimer();
        let gamma: Array2<f64> = array![[1.1, 0.9], [0.9, 0.9]];
        let result: FragmentResult = FragmentResult {
            fragment: 0,
            energy: 0.0,
            rdm1: gamma.clone(),
            rdm2: None,
            iterations: 0,
        };
        let energy: FragmentEnergy = fragment_energy(&ham, &result);
        assert_abs_diff_eq!(
            energy.total(),
            mean_field_energy(ham.h1.view(), ham.eri.view(), gamma.view()),
            epsilon = 1e-12
        );
        assert_eq!(energy.core, 0.0);
    }

    #[test]
    fn center_rows_split_the_energy() {
        let mut ham: EmbeddingHamiltonian = dimer();
        let result: FragmentResult = FragmentResult {
            fragment: 0,
            energy: 0.0,
            rdm1: array![[1.0, 0.8], [0.8, 1.0]],
            rdm2: None,
            iterations: 0,
        };
        let full: f64 = fragment_energy(&ham, &result).total();
        ham.center = vec![0];
        let first: f64 = fragment_energy(&ham, &result).total();
        ham.center = vec![1];
        let second: f64 = fragment_energy(&ham, &result).total();
        assert_abs_diff_eq!(first + second, full, epsilon = 1e-12);
    }

    #[test]
    fn report_sums_fragments() {
        let fragments: Vec<FragmentEnergy> = vec![
            FragmentEnergy {
                fragment: 0,
                one_body: -1.0,
                core: 0.5,
                two_body: 0.25,
            },
            FragmentEnergy {
                fragment: 1,
                one_body: -2.0,
                core: 0.0,
                two_body: 0.5,
            },
        ];
        let report: EnergyReport = EnergyReport::new(fragments, 1.0, -0.5);
        assert_abs_diff_eq!(report.total, -0.75, epsilon = 1e-14);
        assert_abs_diff_eq!(report.correlation, -0.25, epsilon = 1e-14);
        assert_abs_diff_eq!(report.core, 0.5, epsilon = 1e-14);
    }
}
