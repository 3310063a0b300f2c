use crate::defaults::{ELECTRON_TOLERANCE, OVERLAP_THRESHOLD};
use crate::hamiltonian::transform::{
    mean_field_energy, transform_eri, transform_one, two_electron_potential,
};
use crate::system::{System, SystemError};
use crate::utils::{eigh, inv_sqrt};
use log::{debug, info};
use ndarray::prelude::*;

impl System {
    /// Removes `core.len()` doubly occupied orbitals from the embedding problem.
    ///
    /// The lowest canonical orbitals of the reference Fock matrix form the frozen core. The
    /// localized orbitals that are not listed in `core` are projected onto the complement of
    /// the core space and orthonormalised again, so every site keeps its remaining orbitals.
    /// The core acts on the valence orbitals through its Coulomb and exchange potential and
    /// its mean-field energy is added to `e_nuc`. The reference energy is unchanged.
    pub fn freeze_core(self, core: &[usize]) -> Result<System, SystemError> {
        if core.is_empty() {
            return Ok(self);
        }
        let n: usize = self.n_orbs;
        let n_core: usize = core.len();
        let mut is_core: Vec<bool> = vec![false; n];
        for &orb in core.iter() {
            if orb >= n || is_core[orb] {
                return Err(SystemError::OrbitalAssignment { orbital: orb });
            }
            is_core[orb] = true;
        }
        if 2 * n_core > self.n_elec {
            return Err(SystemError::FrozenCore(format!(
                "{} core orbitals need {} electrons, the system has {}",
                n_core,
                2 * n_core,
                self.n_elec
            )));
        }

        let valence: Vec<usize> = (0..n).filter(|&p| !is_core[p]).collect();
        let mut new_index: Vec<Option<usize>> = vec![None; n];
        for (k, &p) in valence.iter().enumerate() {
            new_index[p] = Some(k);
        }
        let mut site_orbitals: Vec<Vec<usize>> = Vec::with_capacity(self.site_orbitals.len());
        for (site, orbs) in self.site_orbitals.iter().enumerate() {
            let kept: Vec<usize> = orbs.iter().filter_map(|&p| new_index[p]).collect();
            if kept.is_empty() {
                return Err(SystemError::FrozenCore(format!(
                    "site {} has no orbitals outside the core",
                    site
                )));
            }
            site_orbitals.push(kept);
        }

        let fock: Array2<f64> =
            &self.h + &two_electron_potential(self.eri.view(), self.density.view());
        let (_, mo): (Array1<f64>, Array2<f64>) =
            eigh(fock.view()).map_err(|err| SystemError::FrozenCore(err.to_string()))?;
        let c_core: Array2<f64> = mo.slice(s![.., ..n_core]).to_owned();
        let core_projector: Array2<f64> = c_core.dot(&c_core.t());
        let d_core: Array2<f64> = 2.0 * &core_projector;

        // valence orbitals: localized orbitals without their core component
        let complement: Array2<f64> = Array2::eye(n) - &core_projector;
        let projected: Array2<f64> = complement.select(Axis(1), &valence);
        let metric: Array2<f64> = projected.t().dot(&projected);
        let x: Array2<f64> =
            inv_sqrt(metric.view(), OVERLAP_THRESHOLD).map_err(SystemError::Overlap)?;
        let v: Array2<f64> = projected.dot(&x);

        let n_elec: usize = self.n_elec - 2 * n_core;
        let density: Array2<f64> = transform_one(self.density.view(), v.view());
        let trace: f64 = density.diag().sum();
        if (trace - n_elec as f64).abs() > ELECTRON_TOLERANCE {
            // the core orbitals are not fully occupied in the reference
            return Err(SystemError::ElectronCount {
                expected: n_elec,
                found: trace,
            });
        }

        let e_core: f64 = mean_field_energy(self.h.view(), self.eri.view(), d_core.view());
        let core_potential: Array2<f64> = two_electron_potential(self.eri.view(), d_core.view());
        let h: Array2<f64> = transform_one((&self.h + &core_potential).view(), v.view());
        let eri: Array4<f64> = transform_eri(self.eri.view(), v.view());
        let e_nuc: f64 = self.e_nuc + e_core;
        let e_ref: f64 = mean_field_energy(h.view(), eri.view(), density.view()) + e_nuc;
        debug!(
            "reference energy with frozen core deviates by {:.3e}",
            e_ref - self.e_ref
        );
        info!(
            "{:<25} {} orbitals, {} electrons, E(core) = {:.10}",
            "frozen core:",
            n_core,
            2 * n_core,
            e_core
        );

        Ok(System {
            n_orbs: valence.len(),
            n_elec,
            n_core: self.n_core + n_core,
            site_orbitals,
            graph: self.graph,
            h,
            eri,
            density,
            e_nuc,
            e_ref,
            lo_coefficients: self.lo_coefficients.dot(&v),
        })
    }
}
