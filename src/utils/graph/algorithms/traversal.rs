//! Graph traversal algorithms.
//!
//! Iterative depth-first traversals over any [`Successors`] graph. Recursion is
//! avoided so that very long block chains cannot overflow the stack.
//!
//! - [`dfs`] - preorder depth-first iterator
//! - [`postorder`] - nodes after all of their descendants
//! - [`reverse_postorder`] - the usual iteration order for forward dataflow

use crate::utils::graph::{NodeId, Successors};

/// Iterator performing a preorder depth-first traversal.
///
/// Created by [`dfs`].
pub struct DfsIterator<'g, G: Successors> {
    graph: &'g G,
    stack: Vec<NodeId>,
    visited: Vec<bool>,
}

impl<'g, G: Successors> DfsIterator<'g, G> {
    fn new(graph: &'g G, start: NodeId) -> Self {
        let node_count = graph.node_count();
        if start.index() >= node_count {
            return DfsIterator {
                graph,
                stack: Vec::new(),
                visited: Vec::new(),
            };
        }

        let mut visited = vec![false; node_count];
        visited[start.index()] = true;
        DfsIterator {
            graph,
            stack: vec![start],
            visited,
        }
    }
}

impl<G: Successors> Iterator for DfsIterator<'_, G> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;

        // Push in reverse so successors are visited in their listed order
        let successors: Vec<NodeId> = self.graph.successors(node).collect();
        for &succ in successors.iter().rev() {
            if !self.visited[succ.index()] {
                self.visited[succ.index()] = true;
                self.stack.push(succ);
            }
        }

        Some(node)
    }
}

/// Performs a preorder depth-first traversal starting from `start`.
///
/// # Arguments
///
/// * `graph` - The graph to traverse
/// * `start` - The node to start from
///
/// # Returns
///
/// An iterator over the reachable nodes in preorder. An out-of-range start node
/// yields an empty iterator.
pub fn dfs<G: Successors>(graph: &G, start: NodeId) -> DfsIterator<'_, G> {
    DfsIterator::new(graph, start)
}

/// Computes the postorder of all nodes reachable from `start`.
///
/// # Arguments
///
/// * `graph` - The graph to traverse
/// * `start` - The node to start from
///
/// # Returns
///
/// Reachable nodes, each listed after all nodes reachable from it along tree edges.
#[allow(clippy::items_after_statements)]
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return Vec::new();
    }

    let mut visited = vec![false; node_count];
    let mut result = Vec::with_capacity(node_count);

    #[derive(Clone, Copy)]
    enum State {
        Enter,
        Exit,
    }

    let mut stack = vec![(start, State::Enter)];

    while let Some((node, state)) = stack.pop() {
        match state {
            State::Enter => {
                if visited[node.index()] {
                    continue;
                }
                visited[node.index()] = true;

                stack.push((node, State::Exit));

                let successors: Vec<NodeId> = graph.successors(node).collect();
                for &succ in successors.iter().rev() {
                    if !visited[succ.index()] {
                        stack.push((succ, State::Enter));
                    }
                }
            }
            State::Exit => {
                result.push(node);
            }
        }
    }

    result
}

/// Computes the reverse postorder of all nodes reachable from `start`.
///
/// For acyclic graphs this is a topological order. For forward dataflow it visits
/// every block after its non-back-edge predecessors, which minimizes solver iterations.
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut result = postorder(graph, start);
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::GraphBase;

    struct AdjGraph(Vec<Vec<usize>>);

    impl GraphBase for AdjGraph {
        fn node_count(&self) -> usize {
            self.0.len()
        }

        fn node_ids(&self) -> impl Iterator<Item = NodeId> {
            (0..self.0.len()).map(NodeId::new)
        }
    }

    impl Successors for AdjGraph {
        fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.0[node.index()].iter().copied().map(NodeId::new)
        }
    }

    #[test]
    fn test_postorder_diamond() {
        // 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3
        let graph = AdjGraph(vec![vec![1, 2], vec![3], vec![3], vec![]]);
        let order = postorder(&graph, NodeId::new(0));
        assert_eq!(order.len(), 4);
        assert_eq!(order.last(), Some(&NodeId::new(0)));
        assert_eq!(order[0], NodeId::new(3));
    }

    #[test]
    fn test_reverse_postorder_loop() {
        // 0 -> 1, 1 -> 2, 2 -> 1, 1 -> 3
        let graph = AdjGraph(vec![vec![1], vec![2, 3], vec![1], vec![]]);
        let order = reverse_postorder(&graph, NodeId::new(0));
        assert_eq!(order[0], NodeId::new(0));
        assert_eq!(order[1], NodeId::new(1));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_dfs_preorder() {
        let graph = AdjGraph(vec![vec![1, 2], vec![3], vec![], vec![]]);
        let order: Vec<usize> = dfs(&graph, NodeId::new(0)).map(NodeId::index).collect();
        assert_eq!(order, vec![0, 1, 3, 2]);
    }

    #[test]
    fn test_invalid_start() {
        let graph = AdjGraph(vec![vec![]]);
        assert!(postorder(&graph, NodeId::new(5)).is_empty());
        assert_eq!(dfs(&graph, NodeId::new(5)).count(), 0);
    }
}
