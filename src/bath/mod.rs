mod schmidt;

pub use schmidt::{construct_bath, entanglement_spectrum, SchmidtOrbital};

use crate::defaults::{BATH_THRESHOLD, DEGENERACY_THRESHOLD, ELECTRON_TOLERANCE};
use ndarray::prelude::*;
use std::fmt;

/// How many environment orbitals are kept as bath.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BathPolicy {
    /// all entangled orbitals, at most one per fragment orbital
    Minimal,
    /// exactly `n_bath` orbitals in the order of decreasing entanglement
    Extended { n_bath: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BathOptions {
    pub policy: BathPolicy,
    pub threshold: f64,
    pub degeneracy_threshold: f64,
    pub electron_tolerance: f64,
}

impl Default for BathOptions {
    fn default() -> Self {
        BathOptions {
            policy: BathPolicy::Minimal,
            threshold: BATH_THRESHOLD,
            degeneracy_threshold: DEGENERACY_THRESHOLD,
            electron_tolerance: ELECTRON_TOLERANCE,
        }
    }
}

/// Embedding space of one fragment.
#[derive(Debug, Clone)]
pub struct BathSpace {
    pub fragment: usize,
    /// n_lo x (n_frag + n_bath): fragment orbitals (unit vectors) followed by bath orbitals
    pub ta: Array2<f64>,
    pub n_frag: usize,
    pub n_bath: usize,
    /// spin-summed density of the doubly occupied environment orbitals outside the bath
    pub core_density: Array2<f64>,
    /// number of electrons in the embedding space
    pub n_elec: usize,
    /// occupation numbers of the retained bath orbitals
    pub occupations: Array1<f64>,
}

impl BathSpace {
    pub fn dim(&self) -> usize {
        self.n_frag + self.n_bath
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BathErrorKind {
    Decomposition(String),
    InsufficientOrbitals { requested: usize, available: usize },
    NonIntegerElectrons { electrons: f64 },
}

/// The Schmidt decomposition of a fragment failed.
#[derive(Debug, Clone, PartialEq)]
pub struct BathConstructionError {
    pub fragment: usize,
    pub kind: BathErrorKind,
}

impl fmt::Display for BathConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "bath construction of fragment {} failed: ", self.fragment)?;
        match &self.kind {
            BathErrorKind::Decomposition(msg) => write!(f, "{}", msg),
            BathErrorKind::InsufficientOrbitals {
                requested,
                available,
            } => write!(
                f,
                "{} bath orbitals requested, only {} environment orbitals available",
                requested, available
            ),
            BathErrorKind::NonIntegerElectrons { electrons } => write!(
                f,
                "the embedding space holds {:.8} electrons, not an even integer",
                electrons
            ),
        }
    }
}

impl std::error::Error for BathConstructionError {}
