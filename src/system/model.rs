use crate::defaults::OVERLAP_THRESHOLD;
use crate::fragmentation::{build_site_graph, chain_bonds, SiteGraph};
use crate::hamiltonian::transform::{transform_eri, transform_one};
use crate::solver::{restricted_scf, MeanFieldOptions, ScfSolution};
use crate::system::{check_dim, IntegralProvider, SystemError};
use crate::utils::inv_sqrt;
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// A system given by explicit integral matrices. The reference density is obtained from a
/// closed-shell mean-field calculation in the orthogonalised basis.
#[derive(Debug, Clone)]
pub struct ModelSystem {
    h: Array2<f64>,
    eri: Array4<f64>,
    overlap: Array2<f64>,
    density: Array2<f64>,
    site_orbitals: Vec<Vec<usize>>,
    bonds: Vec<(usize, usize)>,
    core: Vec<usize>,
    n_elec: usize,
    e_nuc: f64,
}

impl ModelSystem {
    pub fn new(
        h: Array2<f64>,
        eri: Array4<f64>,
        overlap: Array2<f64>,
        site_orbitals: Vec<Vec<usize>>,
        bonds: Vec<(usize, usize)>,
        n_elec: usize,
        e_nuc: f64,
    ) -> Result<Self, SystemError> {
        let n: usize = h.nrows();
        check_dim("one-electron integrals", n, h.ncols())?;
        for &dim in eri.shape().iter() {
            check_dim("two-electron integrals", n, dim)?;
        }
        check_dim("overlap matrix", n, overlap.nrows())?;
        check_dim("overlap matrix", n, overlap.ncols())?;
        let mut assigned: Vec<usize> = vec![0; n];
        for &orb in site_orbitals.iter().flatten() {
            if orb >= n {
                return Err(SystemError::OrbitalAssignment { orbital: orb });
            }
            assigned[orb] += 1;
        }
        if let Some(orbital) = assigned.iter().position(|&c| c != 1) {
            return Err(SystemError::OrbitalAssignment { orbital });
        }

        // mean-field reference in the orthogonalised basis, transformed back afterwards
        let x: Array2<f64> = inv_sqrt(overlap.view(), OVERLAP_THRESHOLD).map_err(SystemError::Overlap)?;
        let h_orth: Array2<f64> = transform_one(h.view(), x.view());
        let eri_orth: Array4<f64> = transform_eri(eri.view(), x.view());
        let scf: ScfSolution = restricted_scf(
            h_orth.view(),
            eri_orth.view(),
            n_elec,
            None,
            &MeanFieldOptions::default(),
        )
        .map_err(|err| SystemError::Reference(err.to_string()))?;
        debug!(
            "reference SCF converged in {} iterations, E = {:.10}",
            scf.iterations,
            scf.energy + e_nuc
        );
        let density: Array2<f64> = x.dot(&scf.density).dot(&x.t());

        Ok(ModelSystem {
            h,
            eri,
            overlap,
            density,
            site_orbitals,
            bonds,
            core: Vec::new(),
            n_elec,
            e_nuc,
        })
    }

    /// Marks orbitals as core orbitals, see [crate::System::freeze_core].
    pub fn with_core_orbitals(mut self, core: Vec<usize>) -> Result<Self, SystemError> {
        if let Some(&orbital) = core.iter().find(|&&p| p >= self.h.nrows()) {
            return Err(SystemError::OrbitalAssignment { orbital });
        }
        self.core = core;
        Ok(self)
    }
}

impl IntegralProvider for ModelSystem {
    fn integrals(&self) -> (Array2<f64>, Array4<f64>) {
        (self.h.clone(), self.eri.clone())
    }

    fn overlap(&self) -> Array2<f64> {
        self.overlap.clone()
    }

    fn reference_density(&self) -> Array2<f64> {
        self.density.clone()
    }

    fn connectivity(&self) -> SiteGraph {
        build_site_graph(self.site_orbitals.len(), &self.bonds)
    }

    fn site_orbitals(&self) -> Vec<Vec<usize>> {
        self.site_orbitals.clone()
    }

    fn n_electrons(&self) -> usize {
        self.n_elec
    }

    fn core_orbitals(&self) -> Vec<usize> {
        self.core.clone()
    }

    fn constant_energy(&self) -> f64 {
        self.e_nuc
    }
}

fn default_periodic() -> bool {
    false
}
fn default_site_energies() -> Vec<f64> {
    Vec::new()
}
fn default_core_hopping() -> f64 {
    0.0
}

/// One-band Hubbard model on a chain or ring with one orbital per site. The optional site
/// energies are repeated periodically along the lattice (ionic Hubbard model). With a
/// `core_level` every site gets a second, doubly occupied orbital at that energy, coupled to
/// the valence orbital of its site by `core_hopping`. The core orbitals are numbered after
/// the valence orbitals.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LatticeModel {
    pub n_sites: usize,
    pub hopping: f64,
    pub hubbard_u: f64,
    #[serde(default = "default_periodic")]
    pub periodic: bool,
    #[serde(default = "default_site_energies")]
    pub site_energies: Vec<f64>,
    /// defaults to half filling
    #[serde(default)]
    pub n_electrons: Option<usize>,
    #[serde(default)]
    pub core_level: Option<f64>,
    #[serde(default = "default_core_hopping")]
    pub core_hopping: f64,
}

impl LatticeModel {
    pub fn chain(n_sites: usize, hopping: f64, hubbard_u: f64) -> Self {
        LatticeModel {
            n_sites,
            hopping,
            hubbard_u,
            periodic: false,
            site_energies: Vec::new(),
            n_electrons: None,
            core_level: None,
            core_hopping: 0.0,
        }
    }

    pub fn ring(n_sites: usize, hopping: f64, hubbard_u: f64) -> Self {
        LatticeModel {
            periodic: true,
            ..LatticeModel::chain(n_sites, hopping, hubbard_u)
        }
    }

    pub fn with_site_energies(mut self, site_energies: Vec<f64>) -> Self {
        self.site_energies = site_energies;
        self
    }

    pub fn with_core(mut self, level: f64, hopping: f64) -> Self {
        self.core_level = Some(level);
        self.core_hopping = hopping;
        self
    }

    pub fn with_electrons(mut self, n_electrons: usize) -> Self {
        self.n_electrons = Some(n_electrons);
        self
    }

    pub fn n_elec(&self) -> usize {
        self.n_electrons.unwrap_or(self.n_sites)
    }

    /// One-electron Hamiltonian: site energies on the diagonal, -t between bonded sites.
    pub fn one_electron(&self) -> Array2<f64> {
        let n: usize = self.n_sites;
        let mut h: Array2<f64> = Array2::zeros((n, n));
        for (a, b) in chain_bonds(n, self.periodic).into_iter() {
            h[[a, b]] -= self.hopping;
            h[[b, a]] -= self.hopping;
        }
        if !self.site_energies.is_empty() {
            for i in 0..n {
                h[[i, i]] = self.site_energies[i % self.site_energies.len()];
            }
        }
        h
    }

    /// On-site repulsion (pp|pp) = U.
    pub fn two_electron(&self) -> Array4<f64> {
        let n: usize = self.n_sites;
        let mut eri: Array4<f64> = Array4::zeros([n, n, n, n]);
        for p in 0..n {
            eri[[p, p, p, p]] = self.hubbard_u;
        }
        eri
    }

    pub fn build(&self) -> Result<ModelSystem, SystemError> {
        let n: usize = self.n_sites;
        let level: f64 = match self.core_level {
            None => {
                return ModelSystem::new(
                    self.one_electron(),
                    self.two_electron(),
                    Array2::eye(n),
                    (0..n).map(|i| vec![i]).collect(),
                    chain_bonds(n, self.periodic),
                    self.n_elec(),
                    0.0,
                )
            }
            Some(level) => level,
        };
        let mut h: Array2<f64> = Array2::zeros((2 * n, 2 * n));
        h.slice_mut(s![..n, ..n]).assign(&self.one_electron());
        let mut eri: Array4<f64> = Array4::zeros([2 * n, 2 * n, 2 * n, 2 * n]);
        for i in 0..n {
            h[[n + i, n + i]] = level;
            h[[i, n + i]] = -self.core_hopping;
            h[[n + i, i]] = -self.core_hopping;
            eri[[i, i, i, i]] = self.hubbard_u;
            eri[[n + i, n + i, n + i, n + i]] = self.hubbard_u;
        }
        ModelSystem::new(
            h,
            eri,
            Array2::eye(2 * n),
            (0..n).map(|i| vec![i, n + i]).collect(),
            chain_bonds(n, self.periodic),
            self.n_elec() + 2 * n,
            0.0,
        )?
        .with_core_orbitals((n..2 * n).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn ring_hopping_closes() {
        let h: Array2<f64> = LatticeModel::ring(4, 1.0, 0.0).one_electron();
        assert_eq!(h[[0, 3]], -1.0);
        assert_eq!(h[[3, 0]], -1.0);
        let h: Array2<f64> = LatticeModel::chain(4, 1.0, 0.0).one_electron();
        assert_eq!(h[[0, 3]], 0.0);
    }

    #[test]
    fn ionic_site_energies_repeat() {
        let h: Array2<f64> = LatticeModel::chain(4, 1.0, 2.0)
            .with_site_energies(vec![0.5, -0.5])
            .one_electron();
        assert_eq!(h.diag().to_vec(), vec![0.5, -0.5, 0.5, -0.5]);
    }

    #[test]
    fn reference_is_closed_shell() {
        let model: ModelSystem = LatticeModel::chain(6, 1.0, 2.0).build().unwrap();
        let d: Array2<f64> = model.reference_density();
        assert_abs_diff_eq!(d.diag().sum(), 6.0, epsilon = 1e-10);
        // particle-hole symmetry of the half-filled chain
        for i in 0..6 {
            assert_abs_diff_eq!(d[[i, i]], 1.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn odd_electron_count_fails() {
        assert!(LatticeModel::chain(3, 1.0, 1.0).build().is_err());
    }

    #[test]
    fn mismatched_integrals_are_rejected() {
        let sites: Vec<Vec<usize>> = vec![vec![0], vec![1]];
        let h: Array2<f64> = Array2::zeros((2, 3));
        let bonds: Vec<(usize, usize)> = vec![(0, 1)];
        let eri: Array4<f64> = Array4::zeros([2, 2, 2, 2]);
        match ModelSystem::new(h, eri, Array2::eye(2), sites.clone(), bonds.clone(), 2, 0.0) {
            Err(SystemError::Dimension { quantity, expected, found }) => {
                assert_eq!(quantity, "one-electron integrals");
                assert_eq!((expected, found), (2, 3));
            }
            other => panic!("unexpected outcome {:?}", other.map(|_| ())),
        }
        let eri: Array4<f64> = Array4::zeros([2, 2, 3, 2]);
        let h: Array2<f64> = Array2::zeros((2, 2));
        match ModelSystem::new(h.clone(), eri, Array2::eye(2), sites.clone(), bonds.clone(), 2, 0.0) {
            Err(SystemError::Dimension { quantity, .. }) => {
                assert_eq!(quantity, "two-electron integrals")
            }
            other => panic!("unexpected outcome {:?}", other.map(|_| ())),
        }
        let overlap: Array2<f64> = Array2::eye(3);
        let eri: Array4<f64> = Array4::zeros([2, 2, 2, 2]);
        let err: SystemError =
            ModelSystem::new(h, eri, overlap, sites, bonds, 2, 0.0).unwrap_err();
        assert_eq!(err.to_string(), "overlap matrix has dimension 3, expected 2");
    }

    #[test]
    fn core_orbitals_follow_the_valence_orbitals() {
        let model: ModelSystem = LatticeModel::chain(3, 1.0, 2.0)
            .with_electrons(2)
            .with_core(-5.0, 0.1)
            .build()
            .unwrap();
        assert_eq!(model.core_orbitals(), vec![3, 4, 5]);
        assert_eq!(model.site_orbitals(), vec![vec![0, 3], vec![1, 4], vec![2, 5]]);
        assert_eq!(model.n_electrons(), 8);
        let (h, _) = model.integrals();
        assert_eq!(h[[1, 4]], -0.1);
        assert_eq!(h[[4, 4]], -5.0);
        assert!(model.with_core_orbitals(vec![6]).is_err());
    }
}
