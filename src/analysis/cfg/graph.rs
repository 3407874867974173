use crate::{
    analysis::{
        cfg::{CfgEdge, CfgEdgeKind},
        ssa::{SsaFunction, SsaOp},
    },
    utils::graph::{
        algorithms, GraphBase, NodeId, Predecessors, RootedGraph, Successors,
    },
};

/// Control flow graph over the blocks of an [`SsaFunction`].
///
/// Nodes correspond 1:1 to SSA blocks (node `i` is block `i`); block 0 is the
/// entry. Edges come from block terminators and from protected blocks to their
/// exception handlers.
///
/// # Examples
///
/// ```rust
/// use builderfold::analysis::{ssa::{SsaFunctionBuilder, SsaType}, ControlFlowGraph};
/// use builderfold::utils::graph::NodeId;
///
/// let ssa = SsaFunctionBuilder::with_params(&[SsaType::Bool]).build_with(|f| {
///     let cond = f.arg(0);
///     f.block(0, |b| b.branch(cond, 1, 2));
///     f.block(1, |b| b.jump(2));
///     f.block(2, |b| b.ret());
/// });
///
/// let cfg = ControlFlowGraph::from_ssa(&ssa);
/// assert_eq!(cfg.block_count(), 3);
/// assert_eq!(cfg.exits(), &[NodeId::new(2)]);
/// assert_eq!(cfg.reverse_postorder()[0], NodeId::new(0));
/// ```
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    edges: Vec<Vec<CfgEdge>>,
    predecessors: Vec<Vec<NodeId>>,
    exits: Vec<NodeId>,
}

impl ControlFlowGraph {
    /// Builds the control flow graph of `ssa`.
    ///
    /// Targets outside the block range are ignored; [`SsaFunction::verify`]
    /// reports them.
    #[must_use]
    pub fn from_ssa(ssa: &SsaFunction) -> Self {
        let count = ssa.block_count();
        let mut edges: Vec<Vec<CfgEdge>> = vec![Vec::new(); count];
        let mut predecessors: Vec<Vec<NodeId>> = vec![Vec::new(); count];
        let mut exits = Vec::new();

        for (index, block) in ssa.blocks().iter().enumerate() {
            let out = &mut edges[index];
            match block.terminator().map(|t| t.op()) {
                Some(SsaOp::Jump { target }) => {
                    out.push(CfgEdge::new(*target, CfgEdgeKind::Unconditional));
                }
                Some(SsaOp::Branch {
                    true_target,
                    false_target,
                    ..
                }) => {
                    if true_target == false_target {
                        out.push(CfgEdge::new(*true_target, CfgEdgeKind::Unconditional));
                    } else {
                        out.push(CfgEdge::new(*true_target, CfgEdgeKind::ConditionalTrue));
                        out.push(CfgEdge::new(*false_target, CfgEdgeKind::ConditionalFalse));
                    }
                }
                _ => exits.push(NodeId::new(index)),
            }
            for &handler in block.handlers() {
                out.push(CfgEdge::new(handler, CfgEdgeKind::ExceptionHandler));
            }
            out.retain(|edge| edge.target() < count);

            for edge in out.iter() {
                let preds = &mut predecessors[edge.target()];
                if !preds.contains(&NodeId::new(index)) {
                    preds.push(NodeId::new(index));
                }
            }
        }

        Self {
            edges,
            predecessors,
            exits,
        }
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns the blocks that leave the method (return, throw, or no terminator).
    #[must_use]
    pub fn exits(&self) -> &[NodeId] {
        &self.exits
    }

    /// Returns the outgoing edges of a block.
    #[must_use]
    pub fn outgoing_edges(&self, node: NodeId) -> &[CfgEdge] {
        self.edges.get(node.index()).map_or(&[], Vec::as_slice)
    }

    /// Returns blocks reachable from the entry in reverse postorder.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<NodeId> {
        if self.edges.is_empty() {
            return Vec::new();
        }
        algorithms::reverse_postorder(self, self.entry())
    }

    /// Returns `true` if `node` is reachable from the entry.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        !self.edges.is_empty() && algorithms::dfs(self, self.entry()).any(|n| n == node)
    }
}

impl GraphBase for ControlFlowGraph {
    fn node_count(&self) -> usize {
        self.edges.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.edges.len()).map(NodeId::new)
    }
}

impl Successors for ControlFlowGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        let mut seen: Vec<NodeId> = Vec::new();
        for edge in self.outgoing_edges(node) {
            let target = NodeId::new(edge.target());
            if !seen.contains(&target) {
                seen.push(target);
            }
        }
        seen.into_iter()
    }
}

impl Predecessors for ControlFlowGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.predecessors
            .get(node.index())
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .copied()
    }
}

impl RootedGraph for ControlFlowGraph {
    fn entry(&self) -> NodeId {
        NodeId::new(0)
    }
}
