// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Instruction interface for CFG construction
//!
//! The [`CfgInstruction`] trait is the only thing the reconstructor knows
//! about an instruction. It is implemented by the decoded-instruction records
//! of each supported ISA (and by a mock type in tests).

/// Control-flow information about a decoded instruction.
///
/// Addresses are virtual addresses; `len` is the encoded length in bytes, so
/// the instruction occupies `[address, address + len)`.
pub trait CfgInstruction {
    /// Virtual address of the first byte of this instruction.
    fn address(&self) -> u64;

    /// Encoded length in bytes.
    fn len(&self) -> u64;

    /// True for any branching instruction: jumps, conditional jumps, calls.
    /// Returns are classified separately by [`is_return`](Self::is_return).
    fn is_branch(&self) -> bool;

    /// True for conditional branches (which always have a fall-through).
    fn is_conditional(&self) -> bool;

    /// True for call instructions.
    fn is_call(&self) -> bool;

    /// True for return instructions.
    fn is_return(&self) -> bool;

    /// The absolute target address of a direct branch, `None` for indirect
    /// branches and non-branches.
    fn branch_target(&self) -> Option<u64>;

    /// True if this instruction ends a basic block.
    #[inline]
    fn is_terminator(&self) -> bool {
        self.is_branch() || self.is_return()
    }

    /// True for unconditional jumps (not calls, not returns), which have no
    /// fall-through edge.
    #[inline]
    fn is_unconditional_jump(&self) -> bool {
        self.is_branch() && !self.is_conditional() && !self.is_call()
    }

    /// Address of the next sequential instruction.
    #[inline]
    fn next_address(&self) -> u64 {
        self.address() + self.len()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::CfgInstruction;

    /// Mock instruction for reconstructor tests: a fixed-size opcode with an
    /// explicit classification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MockKind {
        Plain,
        Jump,
        CondJump,
        Call,
        Ret,
    }

    #[derive(Debug, Clone, Copy)]
    pub struct MockInstruction {
        pub addr: u64,
        pub len: u64,
        pub kind: MockKind,
        pub target: Option<u64>,
    }

    impl MockInstruction {
        pub fn plain(addr: u64, len: u64) -> Self {
            Self {
                addr,
                len,
                kind: MockKind::Plain,
                target: None,
            }
        }

        pub fn with_kind(addr: u64, len: u64, kind: MockKind, target: Option<u64>) -> Self {
            Self {
                addr,
                len,
                kind,
                target,
            }
        }
    }

    impl CfgInstruction for MockInstruction {
        fn address(&self) -> u64 {
            self.addr
        }

        fn len(&self) -> u64 {
            self.len
        }

        fn is_branch(&self) -> bool {
            matches!(
                self.kind,
                MockKind::Jump | MockKind::CondJump | MockKind::Call
            )
        }

        fn is_conditional(&self) -> bool {
            self.kind == MockKind::CondJump
        }

        fn is_call(&self) -> bool {
            self.kind == MockKind::Call
        }

        fn is_return(&self) -> bool {
            self.kind == MockKind::Ret
        }

        fn branch_target(&self) -> Option<u64> {
            self.target
        }
    }

    #[test]
    fn classification() {
        let jmp = MockInstruction::with_kind(0, 2, MockKind::Jump, Some(8));
        assert!(jmp.is_branch());
        assert!(jmp.is_unconditional_jump());
        assert!(jmp.is_terminator());

        let jcc = MockInstruction::with_kind(0, 2, MockKind::CondJump, Some(8));
        assert!(jcc.is_conditional());
        assert!(!jcc.is_unconditional_jump());

        let call = MockInstruction::with_kind(0, 5, MockKind::Call, Some(100));
        assert!(call.is_call());
        assert!(!call.is_unconditional_jump());

        let ret = MockInstruction::with_kind(0, 1, MockKind::Ret, None);
        assert!(!ret.is_branch());
        assert!(ret.is_terminator());

        let add = MockInstruction::plain(0, 4);
        assert!(!add.is_terminator());
        assert_eq!(add.next_address(), 4);
    }
}
