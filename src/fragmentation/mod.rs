mod graph;
mod partition;

pub use graph::{build_site_graph, chain_bonds, connected_components, sites_within, SiteGraph};
pub use partition::{partition, FragmentSpec, FragmentationScheme};

use hashbrown::HashMap;
use std::fmt;

/// A fragment of the system: a set of sites, of which the `center` sites are owned by this
/// fragment and the remaining `edge` sites are owned (as centers) by other fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub index: usize,
    /// all sites of the fragment, sorted
    pub sites: Vec<usize>,
    pub center: Vec<usize>,
    pub edge: Vec<usize>,
    /// owning fragment of every edge site, in the order of `edge`
    pub edge_owner: Vec<usize>,
    /// localized orbitals of the fragment, site by site
    pub orbitals: Vec<usize>,
    /// positions of the center orbitals inside `orbitals`
    pub center_orbitals: Vec<usize>,
    /// positions of the edge orbitals inside `orbitals`
    pub edge_orbitals: Vec<usize>,
    // positions inside `orbitals` of the orbitals of every site, aligned with `sites`
    positions: Vec<Vec<usize>>,
}

impl Fragment {
    fn new(
        index: usize,
        sites: Vec<usize>,
        center: Vec<usize>,
        owner: &[Option<usize>],
        site_orbitals: &[Vec<usize>],
    ) -> Self {
        let edge: Vec<usize> = sites
            .iter()
            .filter(|s| center.binary_search(s).is_err())
            .cloned()
            .collect();
        let edge_owner: Vec<usize> = edge
            .iter()
            .map(|&s| owner[s].unwrap_or(index))
            .collect();

        let mut orbitals: Vec<usize> = Vec::new();
        let mut positions: Vec<Vec<usize>> = Vec::with_capacity(sites.len());
        for &site in sites.iter() {
            let start: usize = orbitals.len();
            orbitals.extend(site_orbitals[site].iter());
            positions.push((start..orbitals.len()).collect());
        }
        let collect_positions = |subset: &[usize]| -> Vec<usize> {
            sites
                .iter()
                .zip(positions.iter())
                .filter(|(s, _)| subset.binary_search(s).is_ok())
                .flat_map(|(_, p)| p.iter().cloned())
                .collect()
        };
        let center_orbitals: Vec<usize> = collect_positions(&center);
        let edge_orbitals: Vec<usize> = collect_positions(&edge);

        Fragment {
            index,
            sites,
            center,
            edge,
            edge_owner,
            orbitals,
            center_orbitals,
            edge_orbitals,
            positions,
        }
    }

    /// Number of localized orbitals on the fragment sites.
    pub fn n_orbs(&self) -> usize {
        self.orbitals.len()
    }

    /// Positions of the orbitals of `site` inside the fragment orbital list.
    pub fn positions_of(&self, site: usize) -> Option<&[usize]> {
        self.sites
            .binary_search(&site)
            .ok()
            .map(|i| self.positions[i].as_slice())
    }
}

/// Inconsistent fragmentation input.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionError {
    UnknownSite { site: usize, n_sites: usize },
    EmptyFragment { fragment: usize },
    NoCenter { fragment: usize },
    DuplicateSite { fragment: usize, site: usize },
    CenterOutsideFragment { fragment: usize, site: usize },
    OverlappingCenter { site: usize, first: usize, second: usize },
    Uncovered { site: usize },
    OrphanEdge { fragment: usize, site: usize },
    InvalidOrder { n_be: usize },
}

impl PartitionError {
    pub fn fragment(&self) -> Option<usize> {
        match self {
            PartitionError::EmptyFragment { fragment }
            | PartitionError::NoCenter { fragment }
            | PartitionError::DuplicateSite { fragment, .. }
            | PartitionError::CenterOutsideFragment { fragment, .. }
            | PartitionError::OrphanEdge { fragment, .. } => Some(*fragment),
            PartitionError::OverlappingCenter { second, .. } => Some(*second),
            _ => None,
        }
    }
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PartitionError::UnknownSite { site, n_sites } => {
                write!(f, "site {} does not exist, the system has {} sites", site, n_sites)
            }
            PartitionError::EmptyFragment { fragment } => {
                write!(f, "fragment {} contains no sites", fragment)
            }
            PartitionError::NoCenter { fragment } => {
                write!(f, "fragment {} has no center site", fragment)
            }
            PartitionError::DuplicateSite { fragment, site } => {
                write!(f, "site {} is listed twice in fragment {}", site, fragment)
            }
            PartitionError::CenterOutsideFragment { fragment, site } => write!(
                f,
                "center site {} is not a member of fragment {}",
                site, fragment
            ),
            PartitionError::OverlappingCenter {
                site,
                first,
                second,
            } => write!(
                f,
                "site {} is a center of fragment {} and of fragment {}",
                site, first, second
            ),
            PartitionError::Uncovered { site } => {
                write!(f, "site {} is not the center of any fragment", site)
            }
            PartitionError::OrphanEdge { fragment, site } => write!(
                f,
                "edge site {} of fragment {} is not owned by another fragment",
                site, fragment
            ),
            PartitionError::InvalidOrder { n_be } => {
                write!(f, "fragment order n_be = {} is invalid, it must be at least 1", n_be)
            }
        }
    }
}

impl std::error::Error for PartitionError {}

/// The fragments of a system together with the site-to-fragment maps.
#[derive(Debug, Clone)]
pub struct Partition {
    pub fragments: Vec<Fragment>,
    /// site -> sorted list of all fragments that contain the site
    pub membership: HashMap<usize, Vec<usize>>,
    /// site -> fragment that has the site as a center
    pub center_owner: Vec<usize>,
    pub n_sites: usize,
}

impl Partition {
    /// Build the fragments from raw site/center lists and check all invariants.
    pub fn from_specs(
        specs: Vec<FragmentSpec>,
        site_orbitals: &[Vec<usize>],
    ) -> Result<Self, PartitionError> {
        let n_sites: usize = site_orbitals.len();
        let mut owner: Vec<Option<usize>> = vec![None; n_sites];
        let mut normalized: Vec<(Vec<usize>, Vec<usize>)> = Vec::with_capacity(specs.len());

        for (index, spec) in specs.into_iter().enumerate() {
            let sites: Vec<usize> = sorted_unique(&spec.sites)
                .map_err(|site| PartitionError::DuplicateSite { fragment: index, site })?;
            if sites.is_empty() {
                return Err(PartitionError::EmptyFragment { fragment: index });
            }
            if let Some(&site) = sites.iter().find(|&&s| s >= n_sites) {
                return Err(PartitionError::UnknownSite { site, n_sites });
            }
            let center: Vec<usize> = sorted_unique(&spec.center)
                .map_err(|site| PartitionError::DuplicateSite { fragment: index, site })?;
            if center.is_empty() {
                return Err(PartitionError::NoCenter { fragment: index });
            }
            for &site in center.iter() {
                if sites.binary_search(&site).is_err() {
                    return Err(PartitionError::CenterOutsideFragment {
                        fragment: index,
                        site,
                    });
                }
                if let Some(first) = owner[site] {
                    return Err(PartitionError::OverlappingCenter {
                        site,
                        first,
                        second: index,
                    });
                }
                owner[site] = Some(index);
            }
            normalized.push((sites, center));
        }

        if let Some(site) = owner.iter().position(|o| o.is_none()) {
            return Err(PartitionError::Uncovered { site });
        }

        let fragments: Vec<Fragment> = normalized
            .into_iter()
            .enumerate()
            .map(|(index, (sites, center))| {
                Fragment::new(index, sites, center, &owner, site_orbitals)
            })
            .collect();

        let mut membership: HashMap<usize, Vec<usize>> = HashMap::with_capacity(n_sites);
        for frag in fragments.iter() {
            for &site in frag.sites.iter() {
                membership.entry(site).or_insert_with(Vec::new).push(frag.index);
            }
        }

        let partition: Partition = Partition {
            fragments,
            membership,
            center_owner: owner.into_iter().flatten().collect(),
            n_sites,
        };
        partition.validate()?;
        Ok(partition)
    }

    /// Check the partition invariants: every site is the center of exactly one fragment,
    /// centers and edges of a fragment are disjoint and span its sites, and every edge site
    /// is a center of the fragment recorded as its owner.
    pub fn validate(&self) -> Result<(), PartitionError> {
        let mut count: Vec<usize> = vec![0; self.n_sites];
        for frag in self.fragments.iter() {
            if frag.sites.is_empty() {
                return Err(PartitionError::EmptyFragment {
                    fragment: frag.index,
                });
            }
            for &site in frag.center.iter() {
                if site >= self.n_sites {
                    return Err(PartitionError::UnknownSite {
                        site,
                        n_sites: self.n_sites,
                    });
                }
                if count[site] > 0 {
                    return Err(PartitionError::OverlappingCenter {
                        site,
                        first: self.center_owner[site],
                        second: frag.index,
                    });
                }
                count[site] += 1;
            }
            if frag.center.len() + frag.edge.len() != frag.sites.len() {
                return Err(PartitionError::DuplicateSite {
                    fragment: frag.index,
                    site: frag.sites[0],
                });
            }
            for (&site, &owner) in frag.edge.iter().zip(frag.edge_owner.iter()) {
                let owned: bool = owner != frag.index
                    && self
                        .fragments
                        .get(owner)
                        .map_or(false, |o| o.center.binary_search(&site).is_ok());
                let shared: bool = self
                    .membership
                    .get(&site)
                    .map_or(false, |m| m.len() >= 2);
                if !owned || !shared {
                    return Err(PartitionError::OrphanEdge {
                        fragment: frag.index,
                        site,
                    });
                }
            }
        }
        match count.iter().position(|&c| c != 1) {
            Some(site) => Err(PartitionError::Uncovered { site }),
            None => Ok(()),
        }
    }

    pub fn n_fragments(&self) -> usize {
        self.fragments.len()
    }

    /// A single fragment without edges that covers the whole system.
    pub fn is_trivial(&self) -> bool {
        self.fragments.len() == 1 && self.fragments[0].edge.is_empty()
    }

    /// All fragments that contain `site`.
    pub fn fragments_of(&self, site: usize) -> &[usize] {
        self.membership
            .get(&site)
            .map(|m| m.as_slice())
            .unwrap_or(&[])
    }
}

// sorts the list, the first repeated element is returned as error
fn sorted_unique(list: &[usize]) -> Result<Vec<usize>, usize> {
    let mut sorted: Vec<usize> = list.to_vec();
    sorted.sort_unstable();
    for pair in sorted.windows(2) {
        if pair[0] == pair[1] {
            return Err(pair[0]);
        }
    }
    Ok(sorted)
}
