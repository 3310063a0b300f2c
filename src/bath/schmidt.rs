use crate::bath::{BathConstructionError, BathErrorKind, BathOptions, BathPolicy, BathSpace};
use crate::fragmentation::Fragment;
use crate::utils::{eigh, LinalgError};
use log::trace;
use ndarray::prelude::*;

/// An eigenvector of the environment block of the density matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchmidtOrbital {
    /// column of the eigenvector matrix
    pub index: usize,
    pub occupation: f64,
    /// entanglement weight n(1 - n)
    pub weight: f64,
}

/// Diagonalize the environment block P_env of the (spin-resolved) density matrix. The
/// eigenvectors are sign-fixed so that their largest component is positive and the orbitals
/// are returned in decreasing order of entanglement. Weights that agree within
/// `degeneracy_threshold` are ordered by occupation and then by eigenvector index.
pub fn entanglement_spectrum(
    p_env: ArrayView2<f64>,
    degeneracy_threshold: f64,
) -> Result<(Vec<SchmidtOrbital>, Array2<f64>), LinalgError> {
    let (occupations, mut vectors): (Array1<f64>, Array2<f64>) = eigh(p_env)?;

    for mut column in vectors.axis_iter_mut(Axis(1)) {
        let mut largest: usize = 0;
        for (i, x) in column.iter().enumerate() {
            if x.abs() > column[largest].abs() {
                largest = i;
            }
        }
        if !column.is_empty() && column[largest] < 0.0 {
            column.mapv_inplace(|x| -x);
        }
    }

    let mut spectrum: Vec<SchmidtOrbital> = occupations
        .iter()
        .enumerate()
        .map(|(index, &n)| {
            let n_clipped: f64 = n.max(0.0).min(1.0);
            SchmidtOrbital {
                index,
                occupation: n,
                weight: n_clipped * (1.0 - n_clipped),
            }
        })
        .collect();

    // quantize to integers so that the ordering is total
    let grid: f64 = degeneracy_threshold.max(f64::EPSILON);
    let bucket = |x: f64| -> i64 { (x / grid).round() as i64 };
    spectrum.sort_by_key(|o| (-bucket(o.weight), bucket(o.occupation), o.index));
    Ok((spectrum, vectors))
}

/// Schmidt decomposition of the reference density with respect to a fragment. The bath
/// orbitals are the entangled eigenvectors of the environment block of P = D/2, the
/// remaining environment orbitals with occupation above 1/2 form the core.
pub fn construct_bath(
    fragment: &Fragment,
    density: ArrayView2<f64>,
    options: &BathOptions,
) -> Result<BathSpace, BathConstructionError> {
    let fail = |kind: BathErrorKind| BathConstructionError {
        fragment: fragment.index,
        kind,
    };
    let n: usize = density.nrows();
    let n_frag: usize = fragment.n_orbs();
    let mut in_fragment: Vec<bool> = vec![false; n];
    for &orb in fragment.orbitals.iter() {
        in_fragment[orb] = true;
    }
    let env: Vec<usize> = (0..n).filter(|&i| !in_fragment[i]).collect();

    let p: Array2<f64> = &density * 0.5;
    let p_env: Array2<f64> = p.select(Axis(0), &env).select(Axis(1), &env);
    let (spectrum, vectors): (Vec<SchmidtOrbital>, Array2<f64>) =
        entanglement_spectrum(p_env.view(), options.degeneracy_threshold)
            .map_err(|err| fail(BathErrorKind::Decomposition(err.to_string())))?;

    let selected: Vec<SchmidtOrbital> = match options.policy {
        BathPolicy::Minimal => spectrum
            .iter()
            .filter(|o| o.weight > options.threshold)
            .take(n_frag)
            .cloned()
            .collect(),
        BathPolicy::Extended { n_bath } => {
            if n_bath > env.len() {
                return Err(fail(BathErrorKind::InsufficientOrbitals {
                    requested: n_bath,
                    available: env.len(),
                }));
            }
            spectrum.iter().take(n_bath).cloned().collect()
        }
    };
    let n_bath: usize = selected.len();

    let mut ta: Array2<f64> = Array2::zeros((n, n_frag + n_bath));
    for (i, &orb) in fragment.orbitals.iter().enumerate() {
        ta[[orb, i]] = 1.0;
    }
    for (b, orbital) in selected.iter().enumerate() {
        for (j, &e) in env.iter().enumerate() {
            ta[[e, n_frag + b]] = vectors[[j, orbital.index]];
        }
    }

    // doubly occupied environment orbitals that are not part of the bath
    let mut core_density: Array2<f64> = Array2::zeros((n, n));
    for orbital in spectrum.iter() {
        if orbital.occupation <= 0.5 || selected.iter().any(|s| s.index == orbital.index) {
            continue;
        }
        let v: ArrayView1<f64> = vectors.column(orbital.index);
        for (a, &ea) in env.iter().enumerate() {
            for (b, &eb) in env.iter().enumerate() {
                core_density[[ea, eb]] += 2.0 * v[a] * v[b];
            }
        }
    }

    let electrons: f64 = ta.t().dot(&density).dot(&ta).diag().sum();
    let pairs: f64 = (0.5 * electrons).round();
    if (electrons - 2.0 * pairs).abs() > options.electron_tolerance {
        return Err(fail(BathErrorKind::NonIntegerElectrons { electrons }));
    }
    trace!(
        "fragment {}: {} fragment and {} bath orbitals, {} electrons",
        fragment.index,
        n_frag,
        n_bath,
        2.0 * pairs
    );

    Ok(BathSpace {
        fragment: fragment.index,
        ta,
        n_frag,
        n_bath,
        core_density,
        n_elec: 2 * pairs as usize,
        occupations: selected.iter().map(|o| o.occupation).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragmentation::{partition, FragmentationScheme, Partition};
    use crate::system::{LatticeModel, System};
    use approx::AbsDiffEq;

    fn ionic_chain() -> (System, Partition) {
        let model = LatticeModel::chain(8, 1.0, 3.0)
            .with_site_energies(vec![0.5, -0.5])
            .build()
            .unwrap();
        let system: System = System::from_provider(&model).unwrap();
        let part: Partition = partition(
            &system.graph,
            &system.site_orbitals,
            &FragmentationScheme::CenterRadius { n_be: 2 },
        )
        .unwrap();
        (system, part)
    }

    #[test]
    fn bath_orbitals_are_orthonormal() {
        let (system, part) = ionic_chain();
        for frag in part.fragments.iter() {
            let bath: BathSpace =
                construct_bath(frag, system.density.view(), &BathOptions::default()).unwrap();
            let overlap: Array2<f64> = bath.ta.t().dot(&bath.ta);
            assert!(overlap.abs_diff_eq(&Array2::eye(bath.dim()), 1e-8));
            assert!(bath.n_bath <= bath.n_frag);
            assert!(bath.dim() < system.n_orbs);
            assert_eq!(bath.n_elec % 2, 0);
            // fragment columns are unit vectors on the fragment orbitals
            for (i, &orb) in frag.orbitals.iter().enumerate() {
                assert_eq!(bath.ta[[orb, i]], 1.0);
            }
        }
    }

    #[test]
    fn construction_is_deterministic() {
        let (system, part) = ionic_chain();
        let frag = &part.fragments[1];
        let a: BathSpace =
            construct_bath(frag, system.density.view(), &BathOptions::default()).unwrap();
        let b: BathSpace =
            construct_bath(frag, system.density.view(), &BathOptions::default()).unwrap();
        assert_eq!(a.ta, b.ta);
        assert_eq!(a.core_density, b.core_density);
    }

    #[test]
    fn core_and_embedding_space_hold_all_electrons() {
        let (system, part) = ionic_chain();
        for frag in part.fragments.iter() {
            let bath: BathSpace =
                construct_bath(frag, system.density.view(), &BathOptions::default()).unwrap();
            let core: f64 = bath.core_density.diag().sum();
            assert!((core + bath.n_elec as f64 - system.n_elec as f64).abs() < 1e-8);
        }
    }

    #[test]
    fn extended_bath_size() {
        let (system, part) = ionic_chain();
        let frag = &part.fragments[0];
        let options: BathOptions = BathOptions {
            policy: BathPolicy::Extended { n_bath: 4 },
            ..BathOptions::default()
        };
        let bath: BathSpace = construct_bath(frag, system.density.view(), &options).unwrap();
        assert_eq!(bath.n_bath, 4);
        let too_many: BathOptions = BathOptions {
            policy: BathPolicy::Extended { n_bath: 100 },
            ..BathOptions::default()
        };
        let err: BathConstructionError =
            construct_bath(frag, system.density.view(), &too_many).unwrap_err();
        assert_eq!(
            err.kind,
            BathErrorKind::InsufficientOrbitals {
                requested: 100,
                available: system.n_orbs - frag.n_orbs()
            }
        );
    }

    #[test]
    fn spectrum_orders_by_entanglement() {
        let p_env: Array2<f64> = array![[0.5, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.1]];
        let (spectrum, vectors) = entanglement_spectrum(p_env.view(), 1e-10).unwrap();
        let occ: Array1<f64> = spectrum.iter().map(|o| o.occupation).collect();
        assert!(occ.abs_diff_eq(&array![0.5, 0.1, 1.0], 1e-12));
        for column in vectors.axis_iter(Axis(1)) {
            assert!(column.iter().cloned().fold(f64::MIN, f64::max) > 0.0);
        }
    }
}
