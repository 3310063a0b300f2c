use crate::fragmentation::graph::{connected_components, sites_within, SiteGraph};
use crate::fragmentation::{Partition, PartitionError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Sites and center sites of one fragment as given by the user (or produced by a scheme).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FragmentSpec {
    pub sites: Vec<usize>,
    pub center: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FragmentationScheme {
    /// BE-n: every site together with all sites within `n_be - 1` bonds.
    CenterRadius { n_be: usize },
    UserSpecified(Vec<FragmentSpec>),
}

/// Partition the sites of a system into overlapping fragments.
pub fn partition(
    graph: &SiteGraph,
    site_orbitals: &[Vec<usize>],
    scheme: &FragmentationScheme,
) -> Result<Partition, PartitionError> {
    let n_sites: usize = site_orbitals.len();
    let mut nodes: Vec<usize> = graph.nodes().collect();
    nodes.sort_unstable();
    if let Some(&site) = nodes.iter().find(|&&s| s >= n_sites) {
        return Err(PartitionError::UnknownSite { site, n_sites });
    }

    let specs: Vec<FragmentSpec> = match scheme {
        FragmentationScheme::CenterRadius { n_be } => center_radius(graph, n_sites, *n_be)?,
        FragmentationScheme::UserSpecified(specs) => specs.clone(),
    };
    let partition: Partition = Partition::from_specs(specs, site_orbitals)?;

    // fragments whose sites are not connected through the site graph are allowed but unusual
    for frag in partition.fragments.iter() {
        let mut sub: SiteGraph = SiteGraph::new();
        for &s in frag.sites.iter() {
            sub.add_node(s);
        }
        for (a, b, _) in graph.all_edges() {
            if sub.contains_node(a) && sub.contains_node(b) {
                sub.add_edge(a, b, ());
            }
        }
        if connected_components(&sub).len() > 1 {
            warn!("fragment {} is not connected in the site graph", frag.index);
        }
    }
    Ok(partition)
}

// Every site spawns a candidate fragment of radius n_be - 1. A candidate that is a strict
// subset of another candidate, or equal to a candidate with a lower index, is absorbed by the
// first surviving candidate containing it, which then takes over its center site.
fn center_radius(
    graph: &SiteGraph,
    n_sites: usize,
    n_be: usize,
) -> Result<Vec<FragmentSpec>, PartitionError> {
    if n_be == 0 {
        return Err(PartitionError::InvalidOrder { n_be });
    }
    let candidates: Vec<Vec<usize>> = (0..n_sites)
        .map(|c| {
            if graph.contains_node(c) {
                sites_within(graph, c, n_be - 1)
            } else {
                vec![c]
            }
        })
        .collect();

    let is_subset =
        |a: &[usize], b: &[usize]| -> bool { a.iter().all(|x| b.binary_search(x).is_ok()) };
    let survives: Vec<bool> = (0..n_sites)
        .map(|i| {
            !(0..n_sites).any(|j| {
                j != i
                    && is_subset(&candidates[i], &candidates[j])
                    && (candidates[i].len() < candidates[j].len() || j < i)
            })
        })
        .collect();

    let mut centers: Vec<Vec<usize>> = vec![Vec::new(); n_sites];
    for i in 0..n_sites {
        let target: usize = if survives[i] {
            i
        } else {
            (0..n_sites)
                .find(|&j| survives[j] && is_subset(&candidates[i], &candidates[j]))
                .ok_or(PartitionError::Uncovered { site: i })?
        };
        centers[target].push(i);
    }

    let specs: Vec<FragmentSpec> = (0..n_sites)
        .filter(|&i| survives[i])
        .map(|i| FragmentSpec {
            sites: candidates[i].clone(),
            center: centers[i].clone(),
        })
        .collect();
    debug!(
        "BE{} scheme: {} candidates, {} fragments",
        n_be,
        n_sites,
        specs.len()
    );
    Ok(specs)
}
