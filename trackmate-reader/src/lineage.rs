//! Lineage reconstruction
//!
//! A TrackMate track is a directed graph of spots. Walking it from its root
//! yields one or more chains: linear runs of spots that split at division
//! events. The walk uses an explicit stack of pending chains instead of
//! recursion, and the graph is checked for cycles before walking so malformed
//! input fails with [`ReaderError::CyclicGraph`] instead of looping forever.

use crate::config::SplitMode;
use crate::types::{ReaderError, Result, SpotId, Track, TrackId};
use serde::Serialize;
use std::collections::HashMap;

/// One linear run of spots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chain {
    /// Chain number, starting at 1, in the order chains were walked
    pub id: usize,
    /// Chain this one branched off from
    pub parent: Option<usize>,
    /// Spots in walk order
    pub spots: Vec<SpotId>,
}

impl Chain {
    pub fn first(&self) -> Option<SpotId> {
        self.spots.first().copied()
    }

    pub fn last(&self) -> Option<SpotId> {
        self.spots.last().copied()
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }
}

/// The chains of one track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lineage {
    pub track: TrackId,
    pub mode: SplitMode,
    /// Chains ordered by id
    pub chains: Vec<Chain>,
    /// Spots with more than one outgoing edge, in walk order
    pub splits: Vec<SpotId>,
}

impl Lineage {
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chain> {
        self.chains.iter()
    }

    /// Get a chain by id
    pub fn chain(&self, id: usize) -> Option<&Chain> {
        id.checked_sub(1).and_then(|idx| self.chains.get(idx))
    }

    /// Chains that branched off the given chain
    pub fn children(&self, id: usize) -> impl Iterator<Item = &Chain> {
        self.chains.iter().filter(move |c| c.parent == Some(id))
    }

    /// Chains without a parent
    pub fn roots(&self) -> impl Iterator<Item = &Chain> {
        self.chains.iter().filter(|c| c.parent.is_none())
    }
}

/// Adjacency of one track over a dense spot index
///
/// Spots are numbered in order of first appearance in the edge list, and
/// outgoing edges keep document order.
struct TrackGraph {
    nodes: Vec<SpotId>,
    index: HashMap<SpotId, usize>,
    outgoing: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl TrackGraph {
    fn build(track: &Track) -> Self {
        let mut graph = TrackGraph {
            nodes: Vec::new(),
            index: HashMap::new(),
            outgoing: Vec::new(),
            in_degree: Vec::new(),
        };
        for edge in &track.edges {
            let source = graph.node(edge.source);
            let target = graph.node(edge.target);
            graph.outgoing[source].push(target);
            graph.in_degree[target] += 1;
        }
        graph
    }

    fn node(&mut self, id: SpotId) -> usize {
        if let Some(&idx) = self.index.get(&id) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(id);
        self.index.insert(id, idx);
        self.outgoing.push(Vec::new());
        self.in_degree.push(0);
        idx
    }

    fn roots(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&n| self.in_degree[n] == 0)
            .collect()
    }

    /// Iterative three-colour depth-first search over every spot
    fn check_acyclic(&self, track: TrackId) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Colour {
            White,
            Grey,
            Black,
        }

        let mut colour = vec![Colour::White; self.nodes.len()];
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for start in 0..self.nodes.len() {
            if colour[start] != Colour::White {
                continue;
            }
            colour[start] = Colour::Grey;
            stack.push((start, 0));

            while let Some(top) = stack.last_mut() {
                let (node, next) = *top;
                if next < self.outgoing[node].len() {
                    top.1 += 1;
                    let child = self.outgoing[node][next];
                    match colour[child] {
                        Colour::Grey => {
                            return Err(ReaderError::CyclicGraph {
                                track,
                                spot: self.nodes[child],
                            })
                        }
                        Colour::White => {
                            colour[child] = Colour::Grey;
                            stack.push((child, 0));
                        }
                        Colour::Black => {}
                    }
                } else {
                    colour[node] = Colour::Black;
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

/// A chain waiting to be walked
struct Seed {
    parent: Option<usize>,
    spots: Vec<usize>,
    /// Whether the last spot was reached over an edge of this chain, in which
    /// case a merge there ends the chain
    arrived: bool,
}

/// Walk a track into chains
///
/// Starts at `start` if given, otherwise at every spot without incoming edge
/// (in order of first appearance). Sibling chains at a split follow the order
/// of the outgoing edges in the XML.
///
/// A merge spot ends every chain that reaches it; the first arrival gets one
/// continuation chain. In break mode a merge spot that also splits is
/// continued by its children, so no chain consists of the merge spot alone.
pub fn walk(track: &Track, start: Option<SpotId>, mode: SplitMode) -> Result<Lineage> {
    let graph = TrackGraph::build(track);
    graph.check_acyclic(track.id)?;

    let roots = match start {
        Some(id) => vec![*graph.index.get(&id).ok_or(ReaderError::SpotNotFound(id))?],
        None => graph.roots(),
    };
    if roots.is_empty() && !graph.nodes.is_empty() {
        // Every spot has a predecessor, which a finite acyclic graph cannot have
        return Err(ReaderError::CyclicGraph {
            track: track.id,
            spot: graph.nodes[0],
        });
    }

    let mut pending: Vec<Seed> = roots
        .into_iter()
        .rev()
        .map(|root| Seed {
            parent: None,
            spots: vec![root],
            arrived: false,
        })
        .collect();
    let mut continued = vec![false; graph.nodes.len()];
    let mut chains: Vec<Chain> = Vec::new();
    let mut splits: Vec<SpotId> = Vec::new();

    while let Some(seed) = pending.pop() {
        let id = chains.len() + 1;
        let mut spots = seed.spots;
        let mut arrived = seed.arrived;

        while let Some(&current) = spots.last() {
            if arrived && graph.in_degree[current] > 1 {
                // Merge: this chain stops here and only the first arrival continues
                let first = !std::mem::replace(&mut continued[current], true);
                let breaks_here = mode == SplitMode::Break && graph.outgoing[current].len() > 1;
                if !(first && breaks_here) {
                    if first && !graph.outgoing[current].is_empty() {
                        let prefix = match mode {
                            SplitMode::Duplicate => spots.clone(),
                            SplitMode::Continue | SplitMode::Break => vec![current],
                        };
                        pending.push(Seed {
                            parent: Some(id),
                            spots: prefix,
                            arrived: false,
                        });
                    }
                    break;
                }
                // A merge that is also a split in break mode seeds its
                // children directly instead of a one-spot continuation
            }
            arrived = true;

            let outgoing = &graph.outgoing[current];
            match outgoing.len() {
                0 => break,
                1 => spots.push(outgoing[0]),
                _ => {
                    splits.push(graph.nodes[current]);
                    let (first, rest) = (outgoing[0], &outgoing[1..]);
                    match mode {
                        SplitMode::Duplicate => {
                            for &child in rest.iter().rev() {
                                let mut branch = spots.clone();
                                branch.push(child);
                                pending.push(Seed {
                                    parent: Some(id),
                                    spots: branch,
                                    arrived: true,
                                });
                            }
                            spots.push(first);
                        }
                        SplitMode::Continue => {
                            for &child in rest.iter().rev() {
                                pending.push(Seed {
                                    parent: Some(id),
                                    spots: vec![current, child],
                                    arrived: true,
                                });
                            }
                            spots.push(first);
                        }
                        SplitMode::Break => {
                            for &child in outgoing.iter().rev() {
                                pending.push(Seed {
                                    parent: Some(id),
                                    spots: vec![current, child],
                                    arrived: true,
                                });
                            }
                            break;
                        }
                    }
                }
            }
        }

        log::trace!(
            "Track {}: chain {} (parent {:?}) has {} spots",
            track.id,
            id,
            seed.parent,
            spots.len()
        );
        chains.push(Chain {
            id,
            parent: seed.parent,
            spots: spots.into_iter().map(|n| graph.nodes[n]).collect(),
        });
    }

    Ok(Lineage {
        track: track.id,
        mode,
        chains,
        splits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Edge, FeatureMap};

    fn track(edges: &[(u64, u64)]) -> Track {
        Track {
            id: TrackId(0),
            name: "Track_0".to_string(),
            features: FeatureMap::new(),
            edges: edges
                .iter()
                .map(|&(s, t)| Edge {
                    source: SpotId(s),
                    target: SpotId(t),
                    features: FeatureMap::new(),
                })
                .collect(),
        }
    }

    fn ids(chain: &Chain) -> Vec<u64> {
        chain.spots.iter().map(|s| s.0).collect()
    }

    fn all(lineage: &Lineage) -> Vec<Vec<u64>> {
        lineage.iter().map(ids).collect()
    }

    #[test]
    fn test_simple_path_is_one_chain() {
        let lineage = walk(&track(&[(1, 2), (2, 3), (3, 4)]), None, SplitMode::Duplicate).unwrap();
        assert_eq!(all(&lineage), vec![vec![1, 2, 3, 4]]);
        assert!(lineage.splits.is_empty());
        assert_eq!(lineage.chains[0].parent, None);
    }

    #[test]
    fn test_unordered_edges() {
        // Edges are not sorted in TrackMate files
        let lineage = walk(&track(&[(3, 4), (1, 2), (2, 3)]), None, SplitMode::Duplicate).unwrap();
        assert_eq!(all(&lineage), vec![vec![1, 2, 3, 4]]);
    }

    #[test]
    fn test_single_split_duplicate() {
        let lineage = walk(&track(&[(1, 2), (2, 3), (2, 4)]), None, SplitMode::Duplicate).unwrap();
        assert_eq!(all(&lineage), vec![vec![1, 2, 3], vec![1, 2, 4]]);
        assert_eq!(lineage.chains[1].parent, Some(1));
        assert_eq!(lineage.splits, vec![SpotId(2)]);
    }

    #[test]
    fn test_split_order_follows_edges() {
        let lineage = walk(&track(&[(1, 2), (2, 4), (2, 3)]), None, SplitMode::Duplicate).unwrap();
        assert_eq!(all(&lineage), vec![vec![1, 2, 4], vec![1, 2, 3]]);
    }

    #[test]
    fn test_nested_splits_duplicate() {
        // 1 -> 2 -> {3, 4}, 3 -> {5, 6}, 4 -> {7, 8}
        let edges = [(1, 2), (2, 3), (2, 4), (3, 5), (3, 6), (4, 7), (4, 8)];
        let lineage = walk(&track(&edges), None, SplitMode::Duplicate).unwrap();
        assert_eq!(lineage.len(), 4);
        assert_eq!(lineage.chains[0].spots.len(), 4);
        for chain in lineage.iter() {
            assert_eq!(&ids(chain)[..2], &[1, 2]);
        }
        let mut leaves: Vec<u64> = lineage.iter().map(|c| c.last().unwrap().0).collect();
        leaves.sort_unstable();
        assert_eq!(leaves, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_continue_mode() {
        let lineage = walk(&track(&[(1, 2), (2, 3), (3, 5), (2, 4)]), None, SplitMode::Continue).unwrap();
        assert_eq!(all(&lineage), vec![vec![1, 2, 3, 5], vec![2, 4]]);
        assert_eq!(lineage.chains[1].parent, Some(1));
    }

    #[test]
    fn test_break_mode() {
        let lineage = walk(&track(&[(1, 2), (2, 3), (3, 5), (2, 4)]), None, SplitMode::Break).unwrap();
        assert_eq!(all(&lineage), vec![vec![1, 2], vec![2, 3, 5], vec![2, 4]]);
        assert_eq!(lineage.children(1).count(), 2);
        assert_eq!(lineage.roots().count(), 1);
    }

    #[test]
    fn test_merge_ends_chain_and_continues_once() {
        // 1 -> 2 -> {3, 4} -> 5 -> 6
        let edges = [(1, 2), (2, 3), (2, 4), (3, 5), (4, 5), (5, 6)];
        let lineage = walk(&track(&edges), None, SplitMode::Continue).unwrap();
        assert_eq!(
            all(&lineage),
            vec![vec![1, 2, 3, 5], vec![5, 6], vec![2, 4, 5]]
        );
        assert_eq!(lineage.chain(2).unwrap().parent, Some(1));
        assert_eq!(lineage.chain(3).unwrap().parent, Some(1));
    }

    #[test]
    fn test_merge_that_splits_in_break_mode() {
        // 1 -> 3, 2 -> 3, 3 -> {4, 5}
        let edges = [(1, 3), (2, 3), (3, 4), (3, 5)];
        let lineage = walk(&track(&edges), None, SplitMode::Break).unwrap();
        assert_eq!(
            all(&lineage),
            vec![vec![1, 3], vec![3, 4], vec![3, 5], vec![2, 3]]
        );
        assert!(lineage.iter().all(|c| c.spots.len() > 1));
        assert_eq!(lineage.children(1).count(), 2);
        assert_eq!(lineage.splits, vec![SpotId(3)]);
    }

    #[test]
    fn test_start_spot() {
        let edges = [(1, 2), (2, 3), (2, 4)];
        let lineage = walk(&track(&edges), Some(SpotId(2)), SplitMode::Duplicate).unwrap();
        assert_eq!(all(&lineage), vec![vec![2, 3], vec![2, 4]]);

        let err = walk(&track(&edges), Some(SpotId(9)), SplitMode::Duplicate).unwrap_err();
        assert!(matches!(err, ReaderError::SpotNotFound(SpotId(9))));
    }

    #[test]
    fn test_multiple_roots() {
        let lineage = walk(&track(&[(1, 3), (2, 3), (3, 4)]), None, SplitMode::Duplicate).unwrap();
        assert_eq!(lineage.roots().count(), 2);
        assert_eq!(
            all(&lineage),
            vec![vec![1, 3], vec![1, 3, 4], vec![2, 3]]
        );
    }

    #[test]
    fn test_cycle_is_detected() {
        let err = walk(&track(&[(1, 2), (2, 3), (3, 2)]), None, SplitMode::Duplicate).unwrap_err();
        assert!(matches!(err, ReaderError::CyclicGraph { .. }));

        // No root at all
        let err = walk(&track(&[(1, 2), (2, 1)]), None, SplitMode::Duplicate).unwrap_err();
        assert!(matches!(err, ReaderError::CyclicGraph { .. }));
    }

    #[test]
    fn test_empty_track() {
        let lineage = walk(&track(&[]), None, SplitMode::Duplicate).unwrap();
        assert!(lineage.is_empty());
    }
}
