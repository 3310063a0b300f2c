use crate::fragmentation::SiteGraph;
use ndarray::prelude::*;

/// Source of everything the embedding needs from the reference calculation. The arrays are
/// given in a (possibly non-orthogonal) atomic-orbital basis, `overlap` is its metric.
pub trait IntegralProvider {
    /// One-electron integrals h_pq and two-electron integrals (pq|rs) in chemists' notation.
    fn integrals(&self) -> (Array2<f64>, Array4<f64>);

    fn overlap(&self) -> Array2<f64>;

    /// Spin-summed one-particle density of the reference mean-field state.
    fn reference_density(&self) -> Array2<f64>;

    fn connectivity(&self) -> SiteGraph;

    /// Orbital indices that belong to each site.
    fn site_orbitals(&self) -> Vec<Vec<usize>>;

    fn n_electrons(&self) -> usize;

    /// Orbitals that can be frozen as a doubly occupied core.
    fn core_orbitals(&self) -> Vec<usize> {
        Vec::new()
    }

    /// Nuclear repulsion or any other constant shift of the energy.
    fn constant_energy(&self) -> f64 {
        0.0
    }
}
