// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A generic implementation of Kahn's algorithm for topological sorting.
//!
//! Ready nodes are taken smallest first, so when nodes are declaration indices the
//! result keeps declaration order wherever the edges leave a choice.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

/// An error indicating that a cycle was detected in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<T> {
    /// The nodes that could not be ordered. Every cycle runs through them.
    pub unresolved: Vec<T>,
}

/// Performs a topological sort on a generic directed graph.
///
/// The graph is defined by a collection of nodes and a set of directed edges
/// representing dependencies (from parent to child). Edges naming a node that is
/// not in `nodes` are ignored.
///
/// # Type Parameters
///
/// * `T`: The type of the nodes in the graph. Its ordering breaks ties between
///   nodes that become ready at the same time.
///
/// # Arguments
///
/// * `nodes`: An iterator over the unique nodes in the graph.
/// * `edges`: An iterator over the directed edges, represented as `(parent, child)` tuples.
///
/// # Returns
///
/// * `Ok(Vec<T>)`: A vector of nodes in a valid topological order.
/// * `Err(CycleError)`: If the graph contains one or more cycles.
pub fn topological_sort<T>(
    nodes: impl IntoIterator<Item = T>,
    edges: impl IntoIterator<Item = (T, T)>,
) -> Result<Vec<T>, CycleError<T>>
where
    T: Copy + Eq + Hash + Ord,
{
    let node_list: Vec<T> = nodes.into_iter().collect();
    if node_list.is_empty() {
        return Ok(Vec::new());
    }

    let mut adjacency_list: HashMap<T, Vec<T>> = HashMap::new();
    let mut in_degree: HashMap<T, usize> = node_list.iter().map(|id| (*id, 0)).collect();

    // 1. Build adjacency list and in-degree counts from edges.
    for (parent, child) in edges {
        if !in_degree.contains_key(&parent) {
            continue;
        }
        if let Some(degree) = in_degree.get_mut(&child) {
            *degree += 1;
            adjacency_list.entry(parent).or_default().push(child);
        }
    }

    // 2. Seed the ready set with all root nodes (in-degree of 0).
    let mut ready: BinaryHeap<Reverse<T>> = node_list
        .iter()
        .filter(|node| in_degree.get(node).copied().unwrap_or(0) == 0)
        .map(|&node| Reverse(node))
        .collect();

    // 3. Process the ready set, smallest node first.
    let mut sorted_list = Vec::with_capacity(node_list.len());
    while let Some(Reverse(parent_node)) = ready.pop() {
        sorted_list.push(parent_node);
        if let Some(children) = adjacency_list.get(&parent_node) {
            for &child_node in children {
                if let Some(degree) = in_degree.get_mut(&child_node) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(child_node));
                    }
                }
            }
        }
    }

    // 4. Check for cycles.
    if sorted_list.len() != node_list.len() {
        let unresolved = node_list
            .into_iter()
            .filter(|node| in_degree.get(node).copied().unwrap_or(0) > 0)
            .collect();
        Err(CycleError { unresolved })
    } else {
        Ok(sorted_list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_graph_sorts_to_nothing() {
        let sorted = topological_sort(Vec::<usize>::new(), Vec::new()).unwrap();
        assert!(sorted.is_empty());
    }

    #[test]
    fn independent_nodes_keep_declaration_order() {
        let sorted = topological_sort([3usize, 0, 2, 1], Vec::new()).unwrap();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn edges_override_declaration_order() {
        // 2 -> 0 -> 1, with 3 free.
        let sorted = topological_sort(0usize..4, [(2, 0), (0, 1)]).unwrap();
        assert_eq!(sorted, vec![2, 0, 1, 3]);
    }

    #[test]
    fn diamond_is_ordered() {
        let sorted = topological_sort(0usize..4, [(0, 1), (0, 2), (1, 3), (2, 3)]).unwrap();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn cycle_is_reported_with_its_nodes() {
        let err = topological_sort(0usize..4, [(0, 1), (1, 2), (2, 1)]).unwrap_err();
        assert_eq!(err.unresolved, vec![1, 2]);
    }

    #[test]
    fn edges_to_unknown_nodes_are_ignored() {
        let sorted = topological_sort(0usize..2, [(0, 7), (9, 1)]).unwrap();
        assert_eq!(sorted, vec![0, 1]);
    }
}
