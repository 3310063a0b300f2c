pub mod mixer;

pub use mixer::{BroydenMixer, LinearMixer, Mixer, SecantMixer, UpdateRule};

use crate::fragmentation::Partition;
use crate::hamiltonian::Potential;
use crate::solver::FragmentResult;
use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use serde::{Deserialize, Serialize};

/// Which residuals are driven to zero by the potential update.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MatchingScheme {
    /// only the electron count, through the global chemical potential
    GlobalScalar,
    /// the edge density blocks of every fragment and the electron count
    PerFragment,
}

/// Which elements of an edge block of the 1-RDM are matched.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MatchingMetric {
    Diagonal,
    /// upper triangle of the block including the diagonal
    FullBlock,
}

/// A matched element of the 1-RDM: (p, q) in the embedding basis of `fragment` is compared
/// with (p_owner, q_owner) in the embedding basis of the fragment that owns the edge site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPair {
    pub site: usize,
    pub owner: usize,
    pub p: usize,
    pub q: usize,
    pub p_owner: usize,
    pub q_owner: usize,
}

/// The matched elements of every fragment. The order of `pairs[f]` fixes the layout of the
/// edge potentials and edge residuals of fragment f.
#[derive(Debug, Clone)]
pub struct MatchingLayout {
    pub metric: MatchingMetric,
    pub pairs: Vec<Vec<MatchPair>>,
}

impl MatchingLayout {
    pub fn new(partition: &Partition, metric: MatchingMetric) -> Self {
        let mut pairs: Vec<Vec<MatchPair>> = Vec::with_capacity(partition.n_fragments());
        for frag in partition.fragments.iter() {
            let mut frag_pairs: Vec<MatchPair> = Vec::new();
            for (&site, &owner) in frag.edge.iter().zip(frag.edge_owner.iter()) {
                let (mine, theirs): (&[usize], &[usize]) = match (
                    frag.positions_of(site),
                    partition.fragments[owner].positions_of(site),
                ) {
                    (Some(a), Some(b)) => (a, b),
                    _ => continue,
                };
                for i in 0..mine.len() {
                    let upper: usize = match metric {
                        MatchingMetric::Diagonal => i + 1,
                        MatchingMetric::FullBlock => mine.len(),
                    };
                    for j in i..upper {
                        frag_pairs.push(MatchPair {
                            site,
                            owner,
                            p: mine[i],
                            q: mine[j],
                            p_owner: theirs[i],
                            q_owner: theirs[j],
                        });
                    }
                }
            }
            pairs.push(frag_pairs);
        }
        MatchingLayout { metric, pairs }
    }

    pub fn n_edge(&self) -> usize {
        self.pairs.iter().map(|p| p.len()).sum()
    }

    /// Length of the vector of driven quantities.
    pub fn n_driven(&self, scheme: MatchingScheme) -> usize {
        match scheme {
            MatchingScheme::GlobalScalar => 1,
            MatchingScheme::PerFragment => self.n_edge() + 1,
        }
    }
}

/// The matching potentials: a global chemical potential acting on all center orbitals and,
/// for every fragment, one potential per matched edge element.
#[derive(Debug, Clone, PartialEq)]
pub struct ChemicalPotentials {
    pub mu: f64,
    pub edge: Vec<Array1<f64>>,
}

impl ChemicalPotentials {
    pub fn zeros(layout: &MatchingLayout) -> Self {
        ChemicalPotentials {
            mu: 0.0,
            edge: layout
                .pairs
                .iter()
                .map(|p| Array1::zeros(p.len()))
                .collect(),
        }
    }

    /// The driven potentials as one vector: [mu] or [edge potentials..., mu].
    pub fn to_vector(&self, scheme: MatchingScheme) -> Array1<f64> {
        match scheme {
            MatchingScheme::GlobalScalar => array![self.mu],
            MatchingScheme::PerFragment => self
                .edge
                .iter()
                .flat_map(|e| e.iter().cloned())
                .chain(std::iter::once(self.mu))
                .collect(),
        }
    }

    /// Inverse of [ChemicalPotentials::to_vector].
    pub fn update(&mut self, scheme: MatchingScheme, x: ArrayView1<f64>) {
        match scheme {
            MatchingScheme::GlobalScalar => self.mu = x[0],
            MatchingScheme::PerFragment => {
                let mut offset: usize = 0;
                for e in self.edge.iter_mut() {
                    let n: usize = e.len();
                    e.assign(&x.slice(s![offset..offset + n]));
                    offset += n;
                }
                self.mu = x[offset];
            }
        }
    }

    /// The one-body potential of a fragment in its embedding basis.
    pub fn potential_for(&self, layout: &MatchingLayout, fragment: usize) -> Potential {
        Potential {
            mu: self.mu,
            terms: layout.pairs[fragment]
                .iter()
                .zip(self.edge[fragment].iter())
                .filter(|(_, u)| **u != 0.0)
                .map(|(pair, &u)| (pair.p, pair.q, u))
                .collect(),
        }
    }
}

/// Deviations from self-consistency after a fragment pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Residuals {
    /// N minus the electrons on the center orbitals of all fragments
    pub electron: f64,
    /// gamma_f[p, q] - gamma_owner[p', q'] for every matched element
    pub edge: Vec<Array1<f64>>,
    /// Frobenius norm of all edge residuals
    pub edge_norm: f64,
}

impl Residuals {
    /// Residual vector in the layout of [ChemicalPotentials::to_vector].
    pub fn driven(&self, scheme: MatchingScheme) -> Array1<f64> {
        match scheme {
            MatchingScheme::GlobalScalar => array![self.electron],
            MatchingScheme::PerFragment => self
                .edge
                .iter()
                .flat_map(|e| e.iter().cloned())
                .chain(std::iter::once(self.electron))
                .collect(),
        }
    }

    pub fn norm(&self, scheme: MatchingScheme) -> f64 {
        let r: Array1<f64> = self.driven(scheme);
        r.dot(&r).sqrt()
    }

    /// Largest absolute edge residual.
    pub fn max_edge(&self) -> f64 {
        let all: Array1<f64> = self
            .edge
            .iter()
            .flat_map(|e| e.iter().map(|x| x.abs()))
            .collect();
        all.max().map(|x| *x).unwrap_or(0.0)
    }
}

/// Compare the 1-RDMs of all fragments. `results` must be ordered by fragment index.
pub fn compute_residuals(
    partition: &Partition,
    layout: &MatchingLayout,
    results: &[FragmentResult],
    n_elec: usize,
) -> Residuals {
    let center_electrons: f64 = partition
        .fragments
        .iter()
        .zip(results.iter())
        .map(|(frag, res)| {
            frag.center_orbitals
                .iter()
                .map(|&c| res.rdm1[[c, c]])
                .sum::<f64>()
        })
        .sum();

    let edge: Vec<Array1<f64>> = layout
        .pairs
        .iter()
        .zip(results.iter())
        .map(|(pairs, res)| {
            pairs
                .iter()
                .map(|pair| {
                    res.rdm1[[pair.p, pair.q]]
                        - results[pair.owner].rdm1[[pair.p_owner, pair.q_owner]]
                })
                .collect()
        })
        .collect();
    let edge_norm: f64 = edge
        .iter()
        .map(|e| e.dot(e))
        .sum::<f64>()
        .sqrt();

    Residuals {
        electron: n_elec as f64 - center_electrons,
        edge,
        edge_norm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragmentation::{build_site_graph, chain_bonds, partition, FragmentationScheme};
    use approx::assert_abs_diff_eq;

    fn chain_partition(n: usize, orbs_per_site: usize) -> Partition {
        let graph = build_site_graph(n, &chain_bonds(n, false));
        let site_orbitals: Vec<Vec<usize>> = (0..n)
            .map(|s| (s * orbs_per_site..(s + 1) * orbs_per_site).collect())
            .collect();
        partition(
            &graph,
            &site_orbitals,
            &FragmentationScheme::CenterRadius { n_be: 2 },
        )
        .unwrap()
    }

    fn result(fragment: usize, rdm1: Array2<f64>) -> FragmentResult {
        FragmentResult {
            fragment,
            energy: 0.0,
            rdm1,
            rdm2: None,
            iterations: 0,
        }
    }

    #[test]
    fn layout_sizes() {
        let part: Partition = chain_partition(4, 2);
        let diagonal: MatchingLayout = MatchingLayout::new(&part, MatchingMetric::Diagonal);
        let full: MatchingLayout = MatchingLayout::new(&part, MatchingMetric::FullBlock);
        // two fragments with one edge site each
        assert_eq!(diagonal.n_edge(), 4);
        assert_eq!(full.n_edge(), 6);
        assert_eq!(full.n_driven(MatchingScheme::PerFragment), 7);
        assert_eq!(full.n_driven(MatchingScheme::GlobalScalar), 1);
        for (f, pairs) in full.pairs.iter().enumerate() {
            for pair in pairs.iter() {
                assert_ne!(pair.owner, f);
                assert!(pair.p <= pair.q);
            }
        }
    }

    #[test]
    fn potentials_round_trip_through_vector() {
        let part: Partition = chain_partition(4, 1);
        let layout: MatchingLayout = MatchingLayout::new(&part, MatchingMetric::Diagonal);
        let mut pots: ChemicalPotentials = ChemicalPotentials::zeros(&layout);
        let x: Array1<f64> = array![0.1, -0.2, 0.3];
        pots.update(MatchingScheme::PerFragment, x.view());
        assert_eq!(pots.mu, 0.3);
        assert_eq!(pots.to_vector(MatchingScheme::PerFragment), x);
        let potential: Potential = pots.potential_for(&layout, 1);
        assert_eq!(potential.mu, 0.3);
        assert_eq!(potential.terms, vec![(layout.pairs[1][0].p, layout.pairs[1][0].p, -0.2)]);
        pots.update(MatchingScheme::GlobalScalar, array![1.5].view());
        assert_eq!(pots.mu, 1.5);
        assert_eq!(pots.edge[0], array![0.1]);
    }

    #[test]
    fn residuals_of_consistent_densities_vanish() {
        // two fragments of the 4-site chain: sites {0, 1, 2} and {1, 2, 3}
        let part: Partition = chain_partition(4, 1);
        let layout: MatchingLayout = MatchingLayout::new(&part, MatchingMetric::FullBlock);
        let rdm1: Array2<f64> = Array2::eye(3);
        let results: Vec<FragmentResult> = vec![result(0, rdm1.clone()), result(1, rdm1)];
        let res: Residuals = compute_residuals(&part, &layout, &results, 4);
        assert_abs_diff_eq!(res.electron, 0.0, epsilon = 1e-14);
        assert_abs_diff_eq!(res.edge_norm, 0.0, epsilon = 1e-14);
        assert_eq!(res.norm(MatchingScheme::PerFragment), 0.0);
    }

    #[test]
    fn edge_residual_sign() {
        let part: Partition = chain_partition(4, 1);
        let layout: MatchingLayout = MatchingLayout::new(&part, MatchingMetric::Diagonal);
        let mut first: Array2<f64> = Array2::eye(3);
        let frag = &part.fragments[0];
        let edge: usize = frag.edge_orbitals[0];
        first[[edge, edge]] = 1.25;
        let results: Vec<FragmentResult> = vec![result(0, first), result(1, Array2::eye(3))];
        let res: Residuals = compute_residuals(&part, &layout, &results, 5);
        assert_abs_diff_eq!(res.edge[0][0], 0.25, epsilon = 1e-14);
        assert_abs_diff_eq!(res.electron, 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(res.max_edge(), 0.25, epsilon = 1e-14);
        assert_abs_diff_eq!(res.norm(MatchingScheme::GlobalScalar), 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(
            res.norm(MatchingScheme::PerFragment),
            (1.0f64 + 0.0625).sqrt(),
            epsilon = 1e-14
        );
    }
}
