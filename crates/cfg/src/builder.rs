// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Queue-driven CFG reconstruction
//!
//! Starting from the entry address, blocks are discovered by decoding
//! linearly until a terminator, enqueueing fall-through addresses and direct
//! branch targets. A branch into the interior of an already-decoded block
//! splits that block.

use std::collections::{HashMap, VecDeque};

use petgraph::graph::DiGraph;
use tracing::{debug, trace};

use crate::graph::{BlockData, BlockIndex, EdgeKind, FunctionCfg};
use crate::CfgInstruction;

/// Reconstruct the CFG of the function at `entry`.
///
/// `decode` returns the instruction at a given address or an error; a decode
/// error aborts the whole reconstruction. Call targets are not followed, only
/// their fall-through; indirect branches terminate a block without a branch
/// edge.
pub fn reconstruct<I, D, E>(entry: u64, mut decode: D) -> Result<FunctionCfg<I>, E>
where
    I: CfgInstruction,
    D: FnMut(u64) -> Result<I, E>,
{
    let mut graph: DiGraph<BlockData<I>, EdgeKind> = DiGraph::new();
    let mut order: Vec<BlockIndex> = Vec::new();
    let mut addr_map: HashMap<u64, (BlockIndex, usize)> = HashMap::new();

    let mut queue: VecDeque<u64> = VecDeque::new();
    queue.push_back(entry);

    while let Some(start) = queue.pop_front() {
        if addr_map.contains_key(&start) {
            // Already decoded: a block start is skipped, a mid-block hit
            // splits the owning block.
            split_at(&mut graph, &mut order, &mut addr_map, start);
            continue;
        }

        trace!(start = format_args!("{start:#x}"), "opening block");
        let node = graph.add_node(BlockData {
            start,
            insts: Vec::new(),
        });
        order.push(node);

        let mut addr = start;
        loop {
            if addr_map.contains_key(&addr) {
                // Ran into existing code; this block falls through into it.
                split_at(&mut graph, &mut order, &mut addr_map, addr);
                break;
            }

            let inst = decode(addr)?;
            addr_map.insert(addr, (node, graph[node].insts.len()));
            let next = inst.next_address();

            if inst.is_terminator() {
                if inst.is_conditional() || inst.is_call() {
                    queue.push_back(next);
                }
                if inst.is_branch() && !inst.is_call() {
                    if let Some(target) = inst.branch_target() {
                        queue.push_back(target);
                    }
                }
                graph[node].insts.push(inst);
                break;
            }

            graph[node].insts.push(inst);
            addr = next;
        }
    }

    wire_edges(&mut graph, &order, &addr_map);
    debug!(blocks = order.len(), "reconstructed function CFG");

    Ok(FunctionCfg {
        graph,
        order,
        addr_map,
    })
}

/// Split the block owning `addr` so that `addr` becomes a block start.
///
/// The owning block keeps the instructions before `addr`; the tail moves into
/// a new block and the address map is rewritten for it. A hit on an existing
/// block start is a no-op, which makes splitting idempotent.
fn split_at<I: CfgInstruction>(
    graph: &mut DiGraph<BlockData<I>, EdgeKind>,
    order: &mut Vec<BlockIndex>,
    addr_map: &mut HashMap<u64, (BlockIndex, usize)>,
    addr: u64,
) -> BlockIndex {
    let (node, idx) = addr_map[&addr];
    if idx == 0 {
        return node;
    }

    trace!(
        addr = format_args!("{addr:#x}"),
        "splitting block at interior target"
    );
    let tail = graph[node].insts.split_off(idx);
    let tail_node = graph.add_node(BlockData {
        start: addr,
        insts: tail,
    });
    order.push(tail_node);

    for (j, inst) in graph[tail_node].insts.iter().enumerate() {
        addr_map.insert(inst.address(), (tail_node, j));
    }
    tail_node
}

/// Wire fall-through and branch edges once all blocks are final.
///
/// Every fall-through or branch destination is guaranteed to be a block start
/// at this point: it was enqueued during discovery, so it either opened a
/// block or forced a split.
fn wire_edges<I: CfgInstruction>(
    graph: &mut DiGraph<BlockData<I>, EdgeKind>,
    order: &[BlockIndex],
    addr_map: &HashMap<u64, (BlockIndex, usize)>,
) {
    let start_of = |addr: u64| -> BlockIndex {
        let (b, idx) = addr_map[&addr];
        debug_assert_eq!(idx, 0, "successor {addr:#x} is not a block start");
        b
    };

    for &node in order {
        let last = graph[node].last();
        let next = last.next_address();

        let fall = if !last.is_terminator() {
            // Block ended by running into another block.
            Some(start_of(next))
        } else if !last.is_unconditional_jump() && !last.is_return() {
            Some(start_of(next))
        } else {
            None
        };

        let branch = if last.is_branch() && !last.is_call() {
            last.branch_target().map(start_of)
        } else {
            None
        };

        if let Some(f) = fall {
            graph.add_edge(node, f, EdgeKind::FallThrough);
        }
        if let Some(b) = branch {
            graph.add_edge(node, b, EdgeKind::Branch);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::traits::test_support::{MockInstruction, MockKind};
    use crate::{CfgInstruction, FunctionCfg};

    /// Decode out of a fixed instruction table keyed by address.
    fn table_decode(
        insts: &[MockInstruction],
    ) -> impl FnMut(u64) -> Result<MockInstruction, String> + '_ {
        move |addr| {
            insts
                .iter()
                .find(|i| i.addr == addr)
                .copied()
                .ok_or_else(|| format!("no instruction at {addr:#x}"))
        }
    }

    fn block_starts(cfg: &FunctionCfg<MockInstruction>) -> Vec<u64> {
        cfg.blocks().map(|b| cfg.block(b).start).collect()
    }

    #[test]
    fn straight_line_until_return() {
        let insts = [
            MockInstruction::plain(0, 4),
            MockInstruction::plain(4, 4),
            MockInstruction::with_kind(8, 1, MockKind::Ret, None),
        ];
        let cfg = crate::reconstruct(0, table_decode(&insts)).unwrap();

        assert_eq!(cfg.block_count(), 1);
        let entry = cfg.entry();
        assert_eq!(cfg.block(entry).insts.len(), 3);
        assert_eq!(cfg.successors(entry), Default::default());
    }

    #[test]
    fn conditional_branch_has_two_successors() {
        // 0: cond -> 4; 2: plain (fall-through); 4: ret (join)
        let insts = [
            MockInstruction::with_kind(0, 2, MockKind::CondJump, Some(4)),
            MockInstruction::plain(2, 2),
            MockInstruction::with_kind(4, 1, MockKind::Ret, None),
        ];
        let cfg = crate::reconstruct(0, table_decode(&insts)).unwrap();

        assert_eq!(cfg.block_count(), 3);
        let entry = cfg.entry();
        let succ = cfg.successors(entry);
        assert_eq!(succ.fall_through, cfg.block_at(2));
        assert_eq!(succ.branch, cfg.block_at(4));

        // The fall-through block flows into the join.
        let fall = cfg.block_at(2).unwrap();
        assert_eq!(cfg.successors(fall).fall_through, cfg.block_at(4));
        assert_eq!(cfg.predecessors(cfg.block_at(4).unwrap()).len(), 2);
    }

    #[test]
    fn call_keeps_fall_through_only() {
        let insts = [
            MockInstruction::with_kind(0, 5, MockKind::Call, Some(100)),
            MockInstruction::with_kind(5, 1, MockKind::Ret, None),
        ];
        let cfg = crate::reconstruct(0, table_decode(&insts)).unwrap();

        // The call target is not followed.
        assert_eq!(cfg.block_count(), 2);
        let succ = cfg.successors(cfg.entry());
        assert_eq!(succ.fall_through, cfg.block_at(5));
        assert_eq!(succ.branch, None);
    }

    #[test]
    fn backward_branch_splits_decoded_block() {
        // 0: plain; 2: plain; 4: plain; 6: cond -> 2; 8: ret
        // The branch to 2 lands two instructions into the entry block.
        let insts = [
            MockInstruction::plain(0, 2),
            MockInstruction::plain(2, 2),
            MockInstruction::plain(4, 2),
            MockInstruction::with_kind(6, 2, MockKind::CondJump, Some(2)),
            MockInstruction::with_kind(8, 1, MockKind::Ret, None),
        ];
        let cfg = crate::reconstruct(0, table_decode(&insts)).unwrap();

        assert_eq!(cfg.block_count(), 3);
        let head = cfg.block_at(0).unwrap();
        let tail = cfg.block_at(2).unwrap();

        assert_eq!(cfg.block(head).insts.len(), 1);
        assert_eq!(cfg.block(tail).insts.len(), 3);
        // The address map was rewritten for the tail instructions.
        assert_eq!(cfg.instruction_at(4), Some((tail, 1)));
        assert_eq!(cfg.instruction_at(6), Some((tail, 2)));

        // head falls through into tail; tail loops back to itself.
        assert_eq!(cfg.successors(head).fall_through, Some(tail));
        assert_eq!(cfg.successors(tail).branch, Some(tail));
        assert_eq!(cfg.successors(tail).fall_through, cfg.block_at(8));
    }

    #[test]
    fn split_is_idempotent() {
        // Two branches to the same interior address: the second hit must not
        // change the CFG further.
        // 0: cond -> 6; 2: plain; 4: cond -> 6 (wait: 6 interior of 4..) —
        // layout: 0: cond->8; 2: plain; 4: plain; 6: cond->4; 8: cond->4; 10: ret
        let insts = [
            MockInstruction::with_kind(0, 2, MockKind::CondJump, Some(8)),
            MockInstruction::plain(2, 2),
            MockInstruction::plain(4, 2),
            MockInstruction::with_kind(6, 2, MockKind::CondJump, Some(4)),
            MockInstruction::with_kind(8, 2, MockKind::CondJump, Some(4)),
            MockInstruction::with_kind(10, 1, MockKind::Ret, None),
        ];
        let cfg = crate::reconstruct(0, table_decode(&insts)).unwrap();

        let tail = cfg.block_at(4).unwrap();
        assert_eq!(cfg.block(tail).insts.len(), 2);
        assert_eq!(cfg.predecessors(tail).len(), 3);

        // Exactly these block starts, each address owned once.
        let mut starts = block_starts(&cfg);
        starts.sort_unstable();
        assert_eq!(starts, vec![0, 2, 4, 8, 10]);
    }

    #[test]
    fn deterministic_discovery_order() {
        let insts = [
            MockInstruction::with_kind(0, 2, MockKind::CondJump, Some(6)),
            MockInstruction::plain(2, 2),
            MockInstruction::with_kind(4, 2, MockKind::Jump, Some(0)),
            MockInstruction::with_kind(6, 1, MockKind::Ret, None),
        ];
        let a = crate::reconstruct(0, table_decode(&insts)).unwrap();
        let b = crate::reconstruct(0, table_decode(&insts)).unwrap();

        assert_eq!(block_starts(&a), block_starts(&b));
        for (ba, bb) in a.blocks().zip(b.blocks()) {
            let (ia, ib) = (&a.block(ba).insts, &b.block(bb).insts);
            assert_eq!(ia.len(), ib.len());
            for (x, y) in ia.iter().zip(ib) {
                assert_eq!(x.address(), y.address());
            }
            assert_eq!(a.successors(ba), b.successors(bb));
        }
    }

    #[test]
    fn decode_error_aborts() {
        // Falls off the end: address 4 has no instruction.
        let insts = [MockInstruction::plain(0, 4)];
        let err = crate::reconstruct(0, table_decode(&insts)).unwrap_err();
        assert!(err.contains("0x4"));
    }

    #[test]
    fn jump_to_entry_self_loop() {
        let insts = [MockInstruction::with_kind(0, 2, MockKind::Jump, Some(0))];
        let cfg = crate::reconstruct(0, table_decode(&insts)).unwrap();

        assert_eq!(cfg.block_count(), 1);
        let entry = cfg.entry();
        assert_eq!(cfg.successors(entry).branch, Some(entry));
        assert_eq!(cfg.successors(entry).fall_through, None);
    }
}
