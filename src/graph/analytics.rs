//! Graph analytics: modularity communities and subgraph density.
//!
//! Community detection is the local-moving phase of Louvain over the
//! symmetrised adjacency of a layer: every node starts in its own community
//! and greedily moves to the neighbouring community with the best modularity
//! gain until no move improves. Nodes are visited in row order and candidate
//! communities in id order, so the partition is deterministic for a given
//! layer.

use std::collections::BTreeMap;

use ndarray::Array2;

use super::Label;
use super::layer::Layer;

/// Upper bound on local-moving sweeps.
const MAX_SWEEPS: usize = 64;

/// Gains below this are treated as no improvement.
const GAIN_EPSILON: f64 = 1e-12;

/// A partition of a layer's nodes into communities.
#[derive(Debug, Clone)]
pub struct Partition {
    /// Communities as sorted matrix rows, largest first.
    pub communities: Vec<Vec<usize>>,
    /// Modularity of the partition.
    pub modularity: f64,
}

/// A community resolved to labels, with its internal density.
#[derive(Debug, Clone, PartialEq)]
pub struct Community {
    /// Member labels, sorted.
    pub members: Vec<Label>,
    /// Directed internal edge density in [0, 1].
    pub density: f64,
}

/// Undirected weighted neighbour lists from a dense directed matrix.
fn symmetrise(adj: &Array2<f64>) -> Vec<Vec<(usize, f64)>> {
    let n = adj.nrows();
    let mut lists = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            let w = adj[[i, j]].max(0.0) + adj[[j, i]].max(0.0);
            if w > 0.0 {
                lists[i].push((j, w));
                lists[j].push((i, w));
            }
        }
    }
    lists
}

fn modularity(lists: &[Vec<(usize, f64)>], community: &[usize], degree: &[f64], m2: f64) -> f64 {
    if m2 == 0.0 {
        return 0.0;
    }
    let mut internal: BTreeMap<usize, f64> = BTreeMap::new();
    let mut total: BTreeMap<usize, f64> = BTreeMap::new();
    for (i, neighbours) in lists.iter().enumerate() {
        *total.entry(community[i]).or_insert(0.0) += degree[i];
        for &(j, w) in neighbours {
            if community[j] == community[i] {
                *internal.entry(community[i]).or_insert(0.0) += w;
            }
        }
    }
    // Q = sum_c [ in_c / 2m - (tot_c / 2m)^2 ], in_c counting both directions.
    total
        .iter()
        .map(|(c, tot)| internal.get(c).copied().unwrap_or(0.0) / m2 - (tot / m2).powi(2))
        .sum()
}

/// Partition a layer into modularity communities.
pub fn detect_communities(layer: &Layer) -> Partition {
    partition_matrix(layer.adjacency())
}

fn partition_matrix(adj: &Array2<f64>) -> Partition {
    let n = adj.nrows();
    let lists = symmetrise(adj);
    let degree: Vec<f64> = lists
        .iter()
        .map(|ns| ns.iter().map(|&(_, w)| w).sum())
        .collect();
    let m2: f64 = degree.iter().sum();

    let mut community: Vec<usize> = (0..n).collect();
    let mut total = degree.clone();

    if m2 > 0.0 {
        for _ in 0..MAX_SWEEPS {
            let mut moved = false;
            for i in 0..n {
                if degree[i] == 0.0 {
                    continue;
                }
                let current = community[i];
                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for &(j, w) in &lists[i] {
                    *links.entry(community[j]).or_insert(0.0) += w;
                }

                total[current] -= degree[i];
                let gain = |c: usize, k_in: f64| k_in - total[c] * degree[i] / m2;
                let mut best = current;
                let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
                for (&c, &k_in) in &links {
                    let g = gain(c, k_in);
                    if g > best_gain + GAIN_EPSILON {
                        best = c;
                        best_gain = g;
                    }
                }
                total[best] += degree[i];
                if best != current {
                    community[i] = best;
                    moved = true;
                }
            }
            if !moved {
                break;
            }
        }
    }

    let q = modularity(&lists, &community, &degree, m2);

    let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, c) in community.iter().enumerate() {
        grouped.entry(*c).or_default().push(row);
    }
    let mut communities: Vec<Vec<usize>> = grouped.into_values().collect();
    communities.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));

    Partition {
        communities,
        modularity: q,
    }
}

/// Directed density of the subgraph induced by `rows`: ordered member pairs
/// joined by a positive edge over `n * (n - 1)`. Self-loops are ignored.
pub fn density(adj: &Array2<f64>, rows: &[usize]) -> f64 {
    let n = rows.len();
    if n < 2 {
        return 0.0;
    }
    let linked = rows
        .iter()
        .flat_map(|&i| rows.iter().map(move |&j| (i, j)))
        .filter(|&(i, j)| i != j && adj[[i, j]] > 0.0)
        .count();
    linked as f64 / (n * (n - 1)) as f64
}

/// Communities of at least `min_size` members, resolved to labels with their
/// densities.
///
/// Nodes for which `excluded` returns true are cut out of the graph before
/// partitioning and never appear in a community.
pub fn dense_communities(
    layer: &Layer,
    min_size: usize,
    excluded: impl Fn(&str) -> bool,
) -> Vec<Community> {
    let labels = layer.labels();
    let masked: Vec<bool> = labels.iter().map(|l| excluded(l.as_str())).collect();
    let mut adj = layer.adjacency().clone();
    for (row, _) in masked.iter().enumerate().filter(|(_, m)| **m) {
        adj.row_mut(row).fill(0.0);
        adj.column_mut(row).fill(0.0);
    }
    partition_matrix(&adj)
        .communities
        .into_iter()
        .filter(|rows| rows.len() >= min_size && !rows.iter().any(|&r| masked[r]))
        .map(|rows| {
            let mut members: Vec<Label> = rows.iter().map(|&r| labels[r].clone()).collect();
            members.sort();
            Community {
                density: density(&adj, &rows),
                members,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> Layer {
        let mut layer = Layer::new(2);
        let mut seq = 0;
        for group in [["a", "b", "c"], ["d", "e", "f"]] {
            for s in group {
                for o in group {
                    if s != o {
                        layer.upsert(s, "linked", o, 1.0, seq);
                        seq += 1;
                    }
                }
            }
        }
        layer.upsert("c", "linked", "d", 0.1, seq);
        layer.refresh_adjacency();
        layer
    }

    #[test]
    fn finds_two_cliques() {
        let layer = two_triangles();
        let partition = detect_communities(&layer);
        assert_eq!(partition.communities.len(), 2);
        assert_eq!(partition.communities[0], vec![0, 1, 2]);
        assert_eq!(partition.communities[1], vec![3, 4, 5]);
        assert!(partition.modularity > 0.3);
    }

    #[test]
    fn complete_subgraph_has_density_one() {
        let layer = two_triangles();
        let communities = dense_communities(&layer, 3, |_| false);
        assert_eq!(communities.len(), 2);
        assert_eq!(communities[0].members, vec!["a", "b", "c"]);
        assert!((communities[0].density - 1.0).abs() < 1e-12);
    }

    #[test]
    fn density_of_path() {
        let adj = ndarray::array![[0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]];
        let d = density(&adj, &[0, 1, 2]);
        assert!((d - 2.0 / 6.0).abs() < 1e-12);
        assert_eq!(density(&adj, &[0]), 0.0);
    }

    #[test]
    fn empty_layer_partitions_trivially() {
        let mut layer = Layer::new(0);
        layer.refresh_adjacency();
        let partition = detect_communities(&layer);
        assert!(partition.communities.is_empty());
        assert_eq!(partition.modularity, 0.0);
    }

    #[test]
    fn small_communities_filtered() {
        let mut layer = Layer::new(1);
        layer.upsert("x", "linked", "y", 1.0, 0);
        layer.refresh_adjacency();
        assert!(dense_communities(&layer, 3, |_| false).is_empty());
    }

    #[test]
    fn excluded_nodes_are_cut_out() {
        let layer = two_triangles();
        let communities = dense_communities(&layer, 3, |label| label == "c");
        assert_eq!(communities.len(), 1);
        assert_eq!(communities[0].members, vec!["d", "e", "f"]);
        assert!(communities.iter().all(|c| !c.members.contains(&"c".to_string())));

        let loose = dense_communities(&layer, 1, |label| label == "c");
        assert!(loose.iter().all(|c| !c.members.contains(&"c".to_string())));
    }
}
