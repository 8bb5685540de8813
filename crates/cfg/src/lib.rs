// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Control-flow reconstruction for machine code
//!
//! This crate discovers the basic blocks of a native function starting from
//! its entry address. It is independent of any particular ISA and of the IR
//! the blocks are later lifted into:
//!
//! - [`CfgInstruction`]: the interface decoded instructions must provide
//!   (address, length, control-flow classification, direct branch target).
//! - [`reconstruct`]: the queue-driven discovery loop. Decoding is supplied
//!   as a callback so the byte-level decoder stays outside this crate.
//! - [`FunctionCfg`]: the resulting graph of blocks, backed by petgraph.
//!
//! Blocks are split when a branch targets the interior of an already-decoded
//! block; splitting is idempotent and discovery order is deterministic for a
//! given byte stream.

pub mod builder;
pub mod graph;
pub mod traits;

pub use builder::reconstruct;
pub use graph::{BlockData, BlockIndex, EdgeKind, FunctionCfg, Successors};
pub use traits::CfgInstruction;
