//! Operation graph nodes.
//!
//! Each builder value gets a small directed graph of the operations performed
//! on it, in program order. Nodes live in a single arena ([`OpGraph`]) and
//! refer to each other by [`OpNodeId`]; removing a node splices it out of the
//! graph but keeps its slot, so ids held by the muncher stay valid.

use std::fmt;

use crate::analysis::SsaVarId;

/// Position of an instruction: block index and instruction index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrSite {
    /// Block index.
    pub block: usize,
    /// Instruction index within the block.
    pub index: usize,
}

impl InstrSite {
    /// Creates a site.
    #[must_use]
    pub const fn new(block: usize, index: usize) -> Self {
        Self { block, index }
    }
}

impl fmt::Display for InstrSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}:{}", self.block, self.index)
    }
}

/// Index of a node in an [`OpGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpNodeId(usize);

impl OpNodeId {
    /// Returns the arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for OpNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Payload shared by init and append nodes.
///
/// At most one of `constant` and `non_constant` is set. Munching an append
/// into its predecessor rewrites these in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOrAppend {
    /// The constructor or append call.
    pub site: InstrSite,
    /// The value passed, if any.
    pub argument: Option<SsaVarId>,
    /// Content added, when known at compile time.
    pub constant: Option<String>,
    /// A string value known to be non-null whose content is added.
    pub non_constant: Option<SsaVarId>,
    /// The node materializing an embedded builder passed as the argument.
    pub implicit_materialize: Option<OpNodeId>,
}

impl InitOrAppend {
    /// Creates the payload for the call at `site`.
    #[must_use]
    pub const fn new(site: InstrSite, argument: Option<SsaVarId>) -> Self {
        Self {
            site,
            argument,
            constant: None,
            non_constant: None,
            implicit_materialize: None,
        }
    }

    /// Returns `true` if the added content is a known constant.
    #[must_use]
    pub const fn has_constant(&self) -> bool {
        self.constant.is_some()
    }
}

/// What an operation node stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpNodeKind {
    /// The allocation of the builder.
    Construct {
        /// The `NewObj`.
        site: InstrSite,
    },
    /// The constructor call.
    Init(InitOrAppend),
    /// An append call.
    Append(InitOrAppend),
    /// A `toString`/`valueOf` producing `dest`.
    Materialize {
        /// The materializing call.
        site: InstrSite,
        /// The resulting string, if used.
        dest: Option<SsaVarId>,
        /// The string's identity is observed, so it must stay a fresh object.
        identity_sensitive: bool,
    },
    /// Passing the builder to another builder's init or append, which reads
    /// its content at that point.
    ImplicitMaterialize {
        /// The init/append node of the outer builder.
        consumer: OpNodeId,
    },
    /// A change to the content the pass does not model.
    Mutate {
        /// The mutating instruction, when there is one.
        site: Option<InstrSite>,
    },
    /// A read of the builder that does not change it.
    Inspect {
        /// The inspecting instruction, when there is one.
        site: Option<InstrSite>,
    },
    /// The builder becomes observable by unmodelled code.
    Escape,
    /// Control flow splits; successors are alternative continuations.
    SplitReference,
    /// The successor is executed repeatedly.
    Loop,
}

impl OpNodeKind {
    /// Returns the site of the instruction the node was created for.
    #[must_use]
    pub fn site(&self) -> Option<InstrSite> {
        match self {
            Self::Construct { site } | Self::Materialize { site, .. } => Some(*site),
            Self::Init(payload) | Self::Append(payload) => Some(payload.site),
            Self::Mutate { site } | Self::Inspect { site } => *site,
            Self::ImplicitMaterialize { .. } | Self::Escape | Self::SplitReference | Self::Loop => {
                None
            }
        }
    }

    /// Returns the init/append payload.
    #[must_use]
    pub fn init_or_append(&self) -> Option<&InitOrAppend> {
        match self {
            Self::Init(payload) | Self::Append(payload) => Some(payload),
            _ => None,
        }
    }

    /// Returns the init/append payload, mutably.
    pub fn init_or_append_mut(&mut self) -> Option<&mut InitOrAppend> {
        match self {
            Self::Init(payload) | Self::Append(payload) => Some(payload),
            _ => None,
        }
    }

    /// Returns `true` for the explicit or implicit materialization of content.
    #[must_use]
    pub const fn is_materializing(&self) -> bool {
        matches!(self, Self::Materialize { .. } | Self::ImplicitMaterialize { .. })
    }
}

impl fmt::Display for OpNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Construct { site } => write!(f, "construct@{site}"),
            Self::Init(payload) => write!(f, "init@{}{}", payload.site, Content(payload)),
            Self::Append(payload) => write!(f, "append@{}{}", payload.site, Content(payload)),
            Self::Materialize { site, .. } => write!(f, "materialize@{site}"),
            Self::ImplicitMaterialize { consumer } => write!(f, "implicit->{consumer}"),
            Self::Mutate { .. } => write!(f, "mutate"),
            Self::Inspect { .. } => write!(f, "inspect"),
            Self::Escape => write!(f, "escape"),
            Self::SplitReference => write!(f, "split"),
            Self::Loop => write!(f, "loop"),
        }
    }
}

struct Content<'a>(&'a InitOrAppend);

impl fmt::Display for Content<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.0.constant, self.0.non_constant) {
            (Some(constant), _) => write!(f, "({constant:?})"),
            (None, Some(value)) => write!(f, "({value})"),
            (None, None) => Ok(()),
        }
    }
}

/// A node with its edges.
#[derive(Debug, Clone)]
pub struct OpNode {
    /// What the node stands for.
    pub kind: OpNodeKind,
    successors: Vec<OpNodeId>,
    predecessors: Vec<OpNodeId>,
    dead: bool,
}

impl OpNode {
    /// Successors in insertion order.
    #[must_use]
    pub fn successors(&self) -> &[OpNodeId] {
        &self.successors
    }

    /// Predecessors in insertion order.
    #[must_use]
    pub fn predecessors(&self) -> &[OpNodeId] {
        &self.predecessors
    }

    /// Returns `true` once the node has been removed from the graph.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.dead
    }
}

/// Arena of operation nodes for all builder values of one function.
#[derive(Debug, Clone, Default)]
pub struct OpGraph {
    nodes: Vec<OpNode>,
}

impl OpGraph {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node without edges.
    pub fn add(&mut self, kind: OpNodeKind) -> OpNodeId {
        let id = OpNodeId(self.nodes.len());
        self.nodes.push(OpNode {
            kind,
            successors: Vec::new(),
            predecessors: Vec::new(),
            dead: false,
        });
        id
    }

    /// Number of nodes ever added, including removed ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no node was ever added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes still in the graph.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|node| !node.dead).count()
    }

    /// Returns the node for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this arena.
    #[must_use]
    pub fn node(&self, id: OpNodeId) -> &OpNode {
        &self.nodes[id.0]
    }

    /// Returns the node for `id`, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this arena.
    pub fn node_mut(&mut self, id: OpNodeId) -> &mut OpNode {
        &mut self.nodes[id.0]
    }

    /// Returns the kind of `id`.
    #[must_use]
    pub fn kind(&self, id: OpNodeId) -> &OpNodeKind {
        &self.nodes[id.0].kind
    }

    /// Successors of `id`.
    #[must_use]
    pub fn successors(&self, id: OpNodeId) -> &[OpNodeId] {
        &self.nodes[id.0].successors
    }

    /// Predecessors of `id`.
    #[must_use]
    pub fn predecessors(&self, id: OpNodeId) -> &[OpNodeId] {
        &self.nodes[id.0].predecessors
    }

    /// Returns the successor of `id` if it has exactly one.
    #[must_use]
    pub fn single_successor(&self, id: OpNodeId) -> Option<OpNodeId> {
        match self.successors(id) {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Returns the predecessor of `id` if it has exactly one.
    #[must_use]
    pub fn single_predecessor(&self, id: OpNodeId) -> Option<OpNodeId> {
        match self.predecessors(id) {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Adds the edge `from -> to`, recording both directions. Duplicate edges
    /// are ignored.
    pub fn link(&mut self, from: OpNodeId, to: OpNodeId) {
        if !self.nodes[from.0].successors.contains(&to) {
            self.nodes[from.0].successors.push(to);
        }
        if !self.nodes[to.0].predecessors.contains(&from) {
            self.nodes[to.0].predecessors.push(from);
        }
    }

    /// Splices `id` out of the graph.
    ///
    /// Every predecessor is connected to every successor. The removed node
    /// keeps its own edge lists so a traversal that is currently standing on
    /// it can still move on.
    pub fn remove_node(&mut self, id: OpNodeId) {
        let successors = self.nodes[id.0].successors.clone();
        let predecessors = self.nodes[id.0].predecessors.clone();

        for &succ in &successors {
            self.nodes[succ.0].predecessors.retain(|p| *p != id);
        }
        for &pred in &predecessors {
            self.nodes[pred.0].successors.retain(|s| *s != id);
        }
        for &pred in &predecessors {
            for &succ in &successors {
                self.link(pred, succ);
            }
        }
        self.nodes[id.0].dead = true;
    }

    /// Returns every live node reachable from `root`, in depth-first preorder.
    #[must_use]
    pub fn reachable_from(&self, root: OpNodeId) -> Vec<OpNodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.0], true) {
                continue;
            }
            order.push(id);
            for &succ in self.successors(id).iter().rev() {
                if !seen[succ.0] {
                    stack.push(succ);
                }
            }
        }
        order
    }

    /// Returns `true` if a node satisfying `pred` is reachable backwards from `id`,
    /// `id` itself excluded.
    pub fn any_predecessor(&self, id: OpNodeId, pred: impl Fn(&OpNodeKind) -> bool) -> bool {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack: Vec<_> = self.predecessors(id).to_vec();
        while let Some(next) = stack.pop() {
            if std::mem::replace(&mut seen[next.0], true) {
                continue;
            }
            if pred(self.kind(next)) {
                return true;
            }
            stack.extend_from_slice(self.predecessors(next));
        }
        false
    }

    /// Renders the subgraph reachable from `root`, one node per line.
    #[must_use]
    pub fn render(&self, root: OpNodeId) -> String {
        let mut out = String::new();
        for id in self.reachable_from(root) {
            let succs: Vec<String> = self.successors(id).iter().map(ToString::to_string).collect();
            out.push_str(&format!("{id}: {} -> [{}]\n", self.kind(id), succs.join(", ")));
        }
        out
    }
}
