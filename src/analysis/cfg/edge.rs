//! Control flow edge types for the CFG.

/// The kind of control flow represented by an edge.
///
/// # Examples
///
/// ```rust
/// use builderfold::analysis::CfgEdgeKind;
///
/// let edge_kind = CfgEdgeKind::ConditionalTrue;
/// assert!(edge_kind.is_conditional());
/// assert!(!edge_kind.is_exceptional());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CfgEdgeKind {
    /// Unconditional jump to a single successor.
    Unconditional,

    /// Taken when the branch condition is true.
    ConditionalTrue,

    /// Taken when the branch condition is false.
    ConditionalFalse,

    /// Edge from a protected block to one of its exception handlers.
    ///
    /// Control may leave the block along this edge at any throwing instruction.
    ExceptionHandler,
}

impl CfgEdgeKind {
    /// Returns `true` for the two arms of a conditional branch.
    #[must_use]
    pub const fn is_conditional(&self) -> bool {
        matches!(self, Self::ConditionalTrue | Self::ConditionalFalse)
    }

    /// Returns `true` for edges into exception handlers.
    #[must_use]
    pub const fn is_exceptional(&self) -> bool {
        matches!(self, Self::ExceptionHandler)
    }
}

/// A control flow edge with its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CfgEdge {
    target: usize,
    kind: CfgEdgeKind,
}

impl CfgEdge {
    /// Creates a new edge.
    #[must_use]
    pub const fn new(target: usize, kind: CfgEdgeKind) -> Self {
        Self { target, kind }
    }

    /// Returns the target block.
    #[must_use]
    pub const fn target(&self) -> usize {
        self.target
    }

    /// Returns the edge kind.
    #[must_use]
    pub const fn kind(&self) -> CfgEdgeKind {
        self.kind
    }
}
