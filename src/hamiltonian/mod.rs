pub mod transform;

use crate::bath::BathSpace;
use crate::fragmentation::Fragment;
use crate::system::System;
use crate::utils::max_abs_deviation;
use log::trace;
use ndarray::prelude::*;
use std::fmt;
use transform::{asymmetry, eri_asymmetry, transform_eri, transform_one, two_electron_potential};

/// One-body matching potential of a fragment in its embedding basis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Potential {
    /// global chemical potential, subtracted on the center orbitals
    pub mu: f64,
    /// (p, q, u): u is added to h[p, q] and, for p != q, to h[q, p]
    pub terms: Vec<(usize, usize, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionErrorKind {
    NotOrthonormal,
    NotHermitian,
    NotSymmetric,
}

/// The projected integrals violate orthonormality or a symmetry of the exact integrals.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionError {
    pub fragment: usize,
    pub kind: ProjectionErrorKind,
    pub deviation: f64,
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let what: &str = match self.kind {
            ProjectionErrorKind::NotOrthonormal => "embedding orbitals are not orthonormal",
            ProjectionErrorKind::NotHermitian => "one-electron Hamiltonian is not symmetric",
            ProjectionErrorKind::NotSymmetric => {
                "two-electron integrals violate the permutational symmetry"
            }
        };
        write!(
            f,
            "projection of fragment {} failed, {} (deviation {:.3e})",
            self.fragment, what, self.deviation
        )
    }
}

impl std::error::Error for ProjectionError {}

/// Hamiltonian of one fragment in its embedding space (fragment orbitals followed by bath
/// orbitals). The core electrons of the environment enter through `g_core`.
#[derive(Debug, Clone)]
pub struct EmbeddingHamiltonian {
    pub fragment: usize,
    /// h1_bare + g_core + matching potentials
    pub h1: Array2<f64>,
    pub h1_bare: Array2<f64>,
    pub g_core: Array2<f64>,
    pub eri: Array4<f64>,
    pub n_elec: usize,
    /// reference density projected into the embedding space
    pub guess: Array2<f64>,
    /// embedding indices of the center orbitals
    pub center: Vec<usize>,
    /// embedding indices of the edge orbitals
    pub edge: Vec<usize>,
}

impl EmbeddingHamiltonian {
    /// An isolated problem without environment. All orbitals are center orbitals.
    pub fn from_integrals(fragment: usize, h1: Array2<f64>, eri: Array4<f64>, n_elec: usize) -> Self {
        let n: usize = h1.nrows();
        EmbeddingHamiltonian {
            fragment,
            h1_bare: h1.clone(),
            h1,
            g_core: Array2::zeros((n, n)),
            eri,
            n_elec,
            guess: Array2::zeros((n, n)),
            center: (0..n).collect(),
            edge: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.h1.nrows()
    }

    /// Copy of the Hamiltonian with the one-body part rebuilt from the bare and core terms
    /// and the given matching potential folded in.
    pub fn with_potential(
        &self,
        potential: &Potential,
        tolerance: f64,
    ) -> Result<EmbeddingHamiltonian, ProjectionError> {
        let mut ham: EmbeddingHamiltonian = self.clone();
        ham.h1 = &self.h1_bare + &self.g_core;
        for &c in ham.center.iter() {
            ham.h1[[c, c]] -= potential.mu;
        }
        for &(p, q, u) in potential.terms.iter() {
            ham.h1[[p, q]] += u;
            if p != q {
                ham.h1[[q, p]] += u;
            }
        }
        let deviation: f64 = asymmetry(ham.h1.view());
        if deviation > tolerance {
            return Err(ProjectionError {
                fragment: self.fragment,
                kind: ProjectionErrorKind::NotHermitian,
                deviation,
            });
        }
        Ok(ham)
    }
}

/// Project the integrals of the system into the embedding space of a fragment:
/// h_emb = TA^T (h + G[D_core]) TA and (pq|rs)_emb by four index transformations.
pub fn build_hamiltonian(
    system: &System,
    fragment: &Fragment,
    bath: &BathSpace,
    potential: &Potential,
    tolerance: f64,
) -> Result<EmbeddingHamiltonian, ProjectionError> {
    let ta: ArrayView2<f64> = bath.ta.view();
    let fail = |kind: ProjectionErrorKind, deviation: f64| ProjectionError {
        fragment: fragment.index,
        kind,
        deviation,
    };

    let overlap: Array2<f64> = ta.t().dot(&ta);
    let deviation: f64 = max_abs_deviation(overlap.view(), Array2::eye(ta.ncols()).view());
    if deviation > tolerance {
        return Err(fail(ProjectionErrorKind::NotOrthonormal, deviation));
    }

    let h1_bare: Array2<f64> = transform_one(system.h.view(), ta);
    let g_full: Array2<f64> = two_electron_potential(system.eri.view(), bath.core_density.view());
    let g_core: Array2<f64> = transform_one(g_full.view(), ta);
    let eri: Array4<f64> = transform_eri(system.eri.view(), ta);
    let guess: Array2<f64> = transform_one(system.density.view(), ta);

    let deviation: f64 = eri_asymmetry(eri.view());
    if deviation > tolerance {
        return Err(fail(ProjectionErrorKind::NotSymmetric, deviation));
    }
    trace!(
        "fragment {}: embedding space of {} orbitals with {} electrons",
        fragment.index,
        ta.ncols(),
        bath.n_elec
    );

    let bare: EmbeddingHamiltonian = EmbeddingHamiltonian {
        fragment: fragment.index,
        h1: Array2::zeros(h1_bare.raw_dim()),
        h1_bare,
        g_core,
        eri,
        n_elec: bath.n_elec,
        guess,
        center: fragment.center_orbitals.clone(),
        edge: fragment.edge_orbitals.clone(),
    };
    bare.with_potential(potential, tolerance)
}
