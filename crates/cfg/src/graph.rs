// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! CFG data structures
//!
//! Generic CFG types parameterized by instruction type. The graph is built by
//! [`crate::builder::reconstruct`] and is read-only afterwards.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

/// Index of a basic block in the CFG.
pub type BlockIndex = NodeIndex;

/// Data stored in each basic block node.
#[derive(Debug)]
pub struct BlockData<I> {
    /// Address of the first instruction.
    pub start: u64,
    /// The block's instructions, in address order. Never empty.
    pub insts: Vec<I>,
}

impl<I: crate::CfgInstruction> BlockData<I> {
    /// The last instruction of the block. This is the terminator unless the
    /// block ends by running into another block.
    pub fn last(&self) -> &I {
        self.insts.last().expect("block has no instructions")
    }

    /// Address one past the block's last instruction.
    pub fn end(&self) -> u64 {
        self.last().next_address()
    }
}

/// How control reaches a successor block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Sequential execution into the next block.
    FallThrough,
    /// A taken direct branch.
    Branch,
}

/// The two possible successors of a basic block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Successors {
    pub fall_through: Option<BlockIndex>,
    pub branch: Option<BlockIndex>,
}

/// Control flow graph of a single function, backed by petgraph.
pub struct FunctionCfg<I> {
    pub(crate) graph: DiGraph<BlockData<I>, EdgeKind>,
    /// Blocks in discovery order; `order[0]` is the entry block.
    pub(crate) order: Vec<BlockIndex>,
    /// Map from instruction address to (block, index within block).
    pub(crate) addr_map: HashMap<u64, (BlockIndex, usize)>,
}

impl<I: crate::CfgInstruction> FunctionCfg<I> {
    /// A CFG of exactly one block with no successor edges, for callers that
    /// already hold a decoded instruction sequence.
    ///
    /// Panics if `insts` is empty.
    pub fn single_block(insts: Vec<I>) -> Self {
        assert!(!insts.is_empty(), "block has no instructions");
        let mut graph = DiGraph::new();
        let start = insts[0].address();
        let node = graph.add_node(BlockData { start, insts });
        let mut addr_map = HashMap::new();
        for (j, inst) in graph[node].insts.iter().enumerate() {
            addr_map.insert(inst.address(), (node, j));
        }
        Self {
            graph,
            order: vec![node],
            addr_map,
        }
    }

    /// The entry block.
    pub fn entry(&self) -> BlockIndex {
        self.order[0]
    }

    /// Iterate over all blocks in discovery order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        self.order.iter().copied()
    }

    /// Number of basic blocks.
    pub fn block_count(&self) -> usize {
        self.order.len()
    }

    /// Access a block's data.
    pub fn block(&self, b: BlockIndex) -> &BlockData<I> {
        &self.graph[b]
    }

    /// The block *starting* at `addr`, if any.
    pub fn block_at(&self, addr: u64) -> Option<BlockIndex> {
        match self.addr_map.get(&addr) {
            Some(&(b, 0)) => Some(b),
            _ => None,
        }
    }

    /// Locate an instruction by address.
    pub fn instruction_at(&self, addr: u64) -> Option<(BlockIndex, usize)> {
        self.addr_map.get(&addr).copied()
    }

    /// The fall-through and branch successors of a block.
    pub fn successors(&self, b: BlockIndex) -> Successors {
        let mut succ = Successors::default();
        for edge in self.graph.edges(b) {
            use petgraph::visit::EdgeRef;
            match edge.weight() {
                EdgeKind::FallThrough => succ.fall_through = Some(edge.target()),
                EdgeKind::Branch => succ.branch = Some(edge.target()),
            }
        }
        succ
    }

    /// All predecessor blocks of `b`.
    pub fn predecessors(&self, b: BlockIndex) -> Vec<BlockIndex> {
        self.graph.neighbors_directed(b, Direction::Incoming).collect()
    }
}
