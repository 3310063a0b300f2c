use hashbrown::HashSet;
use petgraph::algo::dijkstra;
use petgraph::graphmap::GraphMap;
use petgraph::prelude::*;
use petgraph::visit::Bfs;

/// Connectivity of the sites. Nodes are site indices, edges are bonds.
pub type SiteGraph = GraphMap<usize, (), Undirected>;

/// Construct the site graph from a list of bonds. Every site `0..n_sites` is added as a node
/// so that isolated sites are part of the graph.
pub fn build_site_graph(n_sites: usize, bonds: &[(usize, usize)]) -> SiteGraph {
    let mut graph: SiteGraph = GraphMap::with_capacity(n_sites, bonds.len());
    for site in 0..n_sites {
        graph.add_node(site);
    }
    for &(a, b) in bonds.iter() {
        if a != b {
            graph.add_edge(a, b, ());
        }
    }
    graph
}

/// Bonds of a linear chain, closed to a ring if `periodic` is set.
pub fn chain_bonds(n_sites: usize, periodic: bool) -> Vec<(usize, usize)> {
    let mut bonds: Vec<(usize, usize)> = (1..n_sites).map(|i| (i - 1, i)).collect();
    if periodic && n_sites > 2 {
        bonds.push((n_sites - 1, 0));
    }
    bonds
}

/// All sites within `radius` bonds of `center` (including the center itself), sorted.
pub fn sites_within(graph: &SiteGraph, center: usize, radius: usize) -> Vec<usize> {
    let distances = dijkstra(graph, center, None, |_| 1usize);
    let mut sites: Vec<usize> = distances
        .into_iter()
        .filter(|(_, d)| *d <= radius)
        .map(|(site, _)| site)
        .collect();
    sites.sort_unstable();
    sites
}

/// Returns all disconnected components of the graph. The search starts from the lowest
/// unvisited site and collects its component by breadth-first search until every site
/// has been visited.
pub fn connected_components(graph: &SiteGraph) -> Vec<Vec<usize>> {
    let mut nodes: Vec<usize> = graph.nodes().collect();
    nodes.sort_unstable();
    let mut visited: HashSet<usize> = HashSet::with_capacity(nodes.len());
    let mut components: Vec<Vec<usize>> = Vec::new();
    for start in nodes.into_iter() {
        if visited.contains(&start) {
            continue;
        }
        let mut component: Vec<usize> = Vec::new();
        let mut bfs = Bfs::new(graph, start);
        while let Some(nx) = bfs.next(graph) {
            component.push(nx);
            visited.insert(nx);
        }
        component.sort_unstable();
        components.push(component);
    }
    components
}
