mod core;
mod model;
mod provider;

pub use model::{LatticeModel, ModelSystem};
pub use provider::IntegralProvider;

use crate::defaults::{ELECTRON_TOLERANCE, OVERLAP_THRESHOLD};
use crate::fragmentation::SiteGraph;
use crate::hamiltonian::transform::{mean_field_energy, transform_eri, transform_one};
use crate::utils::{inv_sqrt, max_abs_deviation, LinalgError};
use log::{debug, info};
use ndarray::prelude::*;
use std::fmt;

/// Inconsistent data handed over by an [IntegralProvider].
#[derive(Debug, Clone, PartialEq)]
pub enum SystemError {
    Dimension {
        quantity: &'static str,
        expected: usize,
        found: usize,
    },
    OrbitalAssignment { orbital: usize },
    Overlap(LinalgError),
    ElectronCount { expected: usize, found: f64 },
    Reference(String),
    FrozenCore(String),
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SystemError::Dimension {
                quantity,
                expected,
                found,
            } => write!(
                f,
                "{} has dimension {}, expected {}",
                quantity, found, expected
            ),
            SystemError::OrbitalAssignment { orbital } => write!(
                f,
                "orbital {} is not assigned to exactly one site",
                orbital
            ),
            SystemError::Overlap(err) => write!(f, "orthogonalisation failed: {}", err),
            SystemError::ElectronCount { expected, found } => write!(
                f,
                "reference density contains {:.8} electrons, expected {}",
                found, expected
            ),
            SystemError::Reference(msg) => write!(f, "reference calculation failed: {}", msg),
            SystemError::FrozenCore(msg) => write!(f, "frozen core: {}", msg),
        }
    }
}

impl std::error::Error for SystemError {}

/// The immutable input of one embedding run. All matrices are stored in the basis of the
/// symmetrically orthogonalised (Loewdin) orbitals, each of which belongs to one site.
#[derive(Debug, Clone)]
pub struct System {
    pub n_orbs: usize,
    pub n_elec: usize,
    /// number of doubly occupied orbitals removed by [System::freeze_core]
    pub n_core: usize,
    pub site_orbitals: Vec<Vec<usize>>,
    pub graph: SiteGraph,
    pub h: Array2<f64>,
    pub eri: Array4<f64>,
    /// spin-summed reference density
    pub density: Array2<f64>,
    pub e_nuc: f64,
    /// mean-field energy of the reference density (including `e_nuc`)
    pub e_ref: f64,
    /// coefficients of the localized orbitals in the provider basis
    pub lo_coefficients: Array2<f64>,
}

impl System {
    pub fn from_provider<P: IntegralProvider + ?Sized>(provider: &P) -> Result<Self, SystemError> {
        let (h_ao, eri_ao): (Array2<f64>, Array4<f64>) = provider.integrals();
        let s: Array2<f64> = provider.overlap();
        let p_ao: Array2<f64> = provider.reference_density();
        let site_orbitals: Vec<Vec<usize>> = provider.site_orbitals();
        let n_elec: usize = provider.n_electrons();
        let n_orbs: usize = h_ao.nrows();

        check_dim("one-electron integrals", n_orbs, h_ao.ncols())?;
        for &dim in eri_ao.shape().iter() {
            check_dim("two-electron integrals", n_orbs, dim)?;
        }
        check_dim("overlap matrix", n_orbs, s.nrows())?;
        check_dim("overlap matrix", n_orbs, s.ncols())?;
        check_dim("reference density", n_orbs, p_ao.nrows())?;
        check_dim("reference density", n_orbs, p_ao.ncols())?;

        let mut assigned: Vec<usize> = vec![0; n_orbs];
        for orbs in site_orbitals.iter() {
            for &orb in orbs.iter() {
                if orb >= n_orbs {
                    return Err(SystemError::OrbitalAssignment { orbital: orb });
                }
                assigned[orb] += 1;
            }
        }
        if let Some(orbital) = assigned.iter().position(|&c| c != 1) {
            return Err(SystemError::OrbitalAssignment { orbital });
        }

        // Loewdin orthogonalisation, the localized orbitals stay on the sites of the AOs
        let identity: Array2<f64> = Array2::eye(n_orbs);
        let w: Array2<f64> = if max_abs_deviation(s.view(), identity.view()) < 1.0e-14 {
            identity
        } else {
            debug!("Loewdin orthogonalisation of {} orbitals", n_orbs);
            inv_sqrt(s.view(), OVERLAP_THRESHOLD).map_err(SystemError::Overlap)?
        };
        let h: Array2<f64> = transform_one(h_ao.view(), w.view());
        let eri: Array4<f64> = transform_eri(eri_ao.view(), w.view());
        let sw: Array2<f64> = s.dot(&w);
        let density: Array2<f64> = sw.t().dot(&p_ao).dot(&sw);

        let trace: f64 = density.diag().sum();
        if (trace - n_elec as f64).abs() > ELECTRON_TOLERANCE {
            return Err(SystemError::ElectronCount {
                expected: n_elec,
                found: trace,
            });
        }

        let e_nuc: f64 = provider.constant_energy();
        let e_ref: f64 = mean_field_energy(h.view(), eri.view(), density.view()) + e_nuc;
        info!(
            "{:<25} {} orbitals on {} sites, {} electrons",
            "System:",
            n_orbs,
            site_orbitals.len(),
            n_elec
        );
        info!("{:<25} {:>18.10} Hartree", "reference energy:", e_ref);

        Ok(System {
            n_orbs,
            n_elec,
            n_core: 0,
            site_orbitals,
            graph: provider.connectivity(),
            h,
            eri,
            density,
            e_nuc,
            e_ref,
            lo_coefficients: w,
        })
    }

    pub fn n_sites(&self) -> usize {
        self.site_orbitals.len()
    }
}

pub(crate) fn check_dim(quantity: &'static str, expected: usize, found: usize) -> Result<(), SystemError> {
    if expected != found {
        return Err(SystemError::Dimension {
            quantity,
            expected,
            found,
        });
    }
    Ok(())
}
