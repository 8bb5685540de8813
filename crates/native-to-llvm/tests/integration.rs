// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end lifting tests: bytes in, LLVM IR out.
//!
//! The assertions check the structural properties of the produced IR (block
//! shapes, φ-nodes, emitted operations) rather than exact listings, so they
//! are robust against value numbering.

use inkwell::context::Context;
use inkwell::values::FunctionValue;
use native_to_llvm::{CodeSlice, LiftConfig, Lifter};

fn lift_x86<'ctx>(
    context: &'ctx Context,
    base: u64,
    code: &[u8],
) -> (Lifter<'ctx>, FunctionValue<'ctx>) {
    let lifter = Lifter::new(context, "test", LiftConfig::default());
    let func = lifter
        .lift_x86_64(&CodeSlice::new(base, code), base)
        .expect("lift failed");
    (lifter, func)
}

fn lift_a64<'ctx>(
    context: &'ctx Context,
    base: u64,
    code: &[u8],
) -> (Lifter<'ctx>, FunctionValue<'ctx>) {
    let lifter = Lifter::new(context, "test", LiftConfig::default());
    let func = lifter
        .lift_aarch64(&CodeSlice::new(base, code), base)
        .expect("lift failed");
    (lifter, func)
}

fn block_names(func: FunctionValue<'_>) -> Vec<String> {
    func.get_basic_blocks()
        .iter()
        .map(|b| b.get_name().to_string_lossy().into_owned())
        .collect()
}

/// `mov rax, rdi; ret`: a single decoded block behind the init block, ending
/// in a return.
#[test]
fn entry_only_block() {
    let context = Context::create();
    let (lifter, func) = lift_x86(&context, 0x1000, &[0x48, 0x89, 0xf8, 0xc3]);

    assert_eq!(func.count_basic_blocks(), 2);
    assert_eq!(block_names(func), vec!["init", "bb_1000"]);

    let ir = lifter.module().print_to_string().to_string();
    assert!(ir.contains("ret void"), "missing return:\n{ir}");
    // The whole register state is written back before returning.
    assert!(ir.contains("store"), "missing state writeback:\n{ir}");
}

/// `xor eax, eax; test edi, edi; je .L; mov eax, 1; .L: ret`: three decoded
/// blocks, and the join block φs RAX over both predecessors.
#[test]
fn forward_conditional_join() {
    let context = Context::create();
    let code = [
        0x31, 0xc0, // 1000: xor eax, eax
        0x85, 0xff, // 1002: test edi, edi
        0x74, 0x05, // 1004: je 0x100b
        0xb8, 0x01, 0x00, 0x00, 0x00, // 1006: mov eax, 1
        0xc3, // 100b: ret
    ];
    let (lifter, func) = lift_x86(&context, 0x1000, &code);

    assert_eq!(func.count_basic_blocks(), 4);
    assert_eq!(
        block_names(func),
        vec!["init", "bb_1000", "bb_1006", "bb_100b"]
    );

    let ir = lifter.module().print_to_string().to_string();
    // The join block receives the constant 1 from the taken-through path.
    assert!(ir.contains("phi i64"), "missing φ-nodes:\n{ir}");
    assert!(ir.contains("[ 1, %bb_1006 ]"), "missing φ input:\n{ir}");
    // Conditional branch on the zero flag.
    assert!(ir.contains("br i1"), "missing conditional branch:\n{ir}");
}

/// A backward branch into the middle of the entry block splits it: the head
/// keeps one instruction, the tail loops on itself.
#[test]
fn block_split_at_interior_target() {
    let context = Context::create();
    let code = [
        0x31, 0xc0, // 2000: xor eax, eax
        0xff, 0xc0, // 2002: inc eax
        0xff, 0xc0, // 2004: inc eax
        0x75, 0xfa, // 2006: jne 0x2002
        0xc3, // 2008: ret
    ];
    let (lifter, func) = lift_x86(&context, 0x2000, &code);

    assert_eq!(func.count_basic_blocks(), 4);
    assert_eq!(
        block_names(func),
        vec!["init", "bb_2000", "bb_2002", "bb_2008"]
    );

    // The loop block is its own predecessor: its φs must have an incoming
    // edge from itself.
    let ir = lifter.module().print_to_string().to_string();
    assert!(ir.contains("%bb_2002 ]"), "missing loop φ input:\n{ir}");
}

/// `rep movsb; ret`: the REP driver produces the header (the decoded block),
/// body, latch, and continue blocks.
#[test]
fn rep_movs_loop_structure() {
    let context = Context::create();
    let (lifter, func) = lift_x86(&context, 0x3000, &[0xf3, 0xa4, 0xc3]);

    assert_eq!(func.count_basic_blocks(), 5);
    let names = block_names(func);
    assert!(names.contains(&"rep_body".to_string()), "{names:?}");
    assert!(names.contains(&"rep_latch".to_string()), "{names:?}");
    assert!(names.contains(&"rep_cont".to_string()), "{names:?}");

    let ir = lifter.module().print_to_string().to_string();
    // The count check guards loop entry, the latch re-checks it.
    assert!(ir.contains("icmp eq i64"), "missing count check:\n{ir}");
    assert!(ir.contains("icmp ne i64"), "missing latch check:\n{ir}");
    // One byte per iteration, direction folded into a select on DF.
    assert!(ir.contains("select i1"), "missing direction select:\n{ir}");
}

/// `addps xmm0, xmm1; ret`: a packed float add over the `<4 x float>` facet,
/// with the result re-entering the canonical integer view by bitcast.
#[test]
fn sse_packed_add() {
    let context = Context::create();
    let (lifter, func) = lift_x86(&context, 0x4000, &[0x0f, 0x58, 0xc1, 0xc3]);

    assert_eq!(func.count_basic_blocks(), 2);
    let ir = lifter.module().print_to_string().to_string();
    assert!(
        ir.contains("fadd <4 x float>"),
        "missing packed add:\n{ir}"
    );
    assert!(
        ir.contains("bitcast <4 x float>"),
        "missing canonical-view bitcast:\n{ir}"
    );
}

/// `ccmp x0, x1, #5, eq; ret`: flags are computed for the compare and
/// selected against the literal NZCV nibble.
#[test]
fn aarch64_ccmp() {
    let context = Context::create();
    let code = [
        0x05, 0x00, 0x41, 0xfa, // ccmp x0, x1, #5, eq
        0xc0, 0x03, 0x5f, 0xd6, // ret
    ];
    let (lifter, func) = lift_a64(&context, 0x8000, &code);

    assert_eq!(func.count_basic_blocks(), 2);
    let ir = lifter.module().print_to_string().to_string();
    // The compare itself plus one select per flag.
    assert!(ir.contains("sub i64"), "missing flag compare:\n{ir}");
    assert_eq!(
        ir.matches("select i1").count(),
        4,
        "expected one select per NZCV flag:\n{ir}"
    );
}

/// A simple AArch64 leaf: `add x0, x0, x1; ret`.
#[test]
fn aarch64_add_and_return() {
    let context = Context::create();
    let code = [
        0x00, 0x00, 0x01, 0x8b, // add x0, x0, x1
        0xc0, 0x03, 0x5f, 0xd6, // ret
    ];
    let (lifter, func) = lift_a64(&context, 0x9000, &code);

    assert_eq!(func.count_basic_blocks(), 2);
    let ir = lifter.module().print_to_string().to_string();
    assert!(ir.contains("add i64"), "missing add:\n{ir}");
    assert!(ir.contains("ret void"), "missing return:\n{ir}");
}

/// Calls keep their fall-through: the callee is not lifted, the return
/// address is pushed, and the call hook is invoked.
#[test]
fn call_goes_through_hook() {
    let context = Context::create();
    let code = [
        0xe8, 0x10, 0x00, 0x00, 0x00, // 5000: call 0x5015
        0xc3, // 5005: ret
    ];
    let (lifter, func) = lift_x86(&context, 0x5000, &code);

    assert_eq!(func.count_basic_blocks(), 3);
    let ir = lifter.module().print_to_string().to_string();
    assert!(
        ir.contains("call void @native_lift_call"),
        "missing call hook:\n{ir}"
    );
}

/// Unsupported instructions fail the lift by default and trap under the
/// permissive configuration.
#[test]
fn unsupported_instruction_policy() {
    let code = [
        0x0f, 0xa2, // cpuid
        0xc3, // ret
    ];

    let context = Context::create();
    let lifter = Lifter::new(&context, "strict", LiftConfig::default());
    let err = lifter
        .lift_x86_64(&CodeSlice::new(0x6000, &code), 0x6000)
        .unwrap_err();
    assert!(
        matches!(err, native_to_llvm::LiftError::UnsupportedInstruction { addr: 0x6000, .. }),
        "unexpected error: {err}"
    );

    let context = Context::create();
    let config = LiftConfig {
        unhandled_as_trap: true,
        ..Default::default()
    };
    let lifter = Lifter::new(&context, "permissive", config);
    lifter
        .lift_x86_64(&CodeSlice::new(0x6000, &code), 0x6000)
        .expect("trap mode should lift");
    let ir = lifter.module().print_to_string().to_string();
    assert!(ir.contains("llvm.trap"), "missing trap:\n{ir}");
}

/// Writing EAX clears the upper half of RAX: the canonical facet after a
/// 32-bit move of a constant is the zero-extended constant.
#[test]
fn gp_write_zero_extends() {
    let context = Context::create();
    let code = [
        0xb8, 0xff, 0xff, 0xff, 0xff, // mov eax, 0xffffffff
        0xc3, // ret
    ];
    let (lifter, _) = lift_x86(&context, 0x7000, &code);
    let ir = lifter.module().print_to_string().to_string();
    // The canonical value stored back to the state is the 32-bit constant
    // zero-extended to 64 bits.
    assert!(
        ir.contains("store i64 4294967295"),
        "missing zero-extended writeback:\n{ir}"
    );
}

/// PUSHF/POPF pack and unpack the flags through their architectural bit
/// positions.
#[test]
fn flags_roundtrip_through_stack() {
    let context = Context::create();
    let code = [
        0x9c, // pushfq
        0x9d, // popfq
        0xc3, // ret
    ];
    let (lifter, func) = lift_x86(&context, 0x7200, &code);

    assert_eq!(func.count_basic_blocks(), 2);
    let ir = lifter.module().print_to_string().to_string();
    // Packing shifts flags into position; unpacking shifts them back out.
    assert!(ir.contains("shl i64"), "missing flag packing:\n{ir}");
    assert!(ir.contains("lshr i64"), "missing flag unpacking:\n{ir}");
}

/// FS-segment loads carry the address-space tag on the pointer type.
#[test]
fn fs_segment_address_space() {
    let context = Context::create();
    let code = [
        0x64, 0x48, 0x8b, 0x04, 0x25, 0x28, 0x00, 0x00, 0x00, // mov rax, fs:[0x28]
        0xc3, // ret
    ];
    let (lifter, _) = lift_x86(&context, 0x7100, &code);
    let ir = lifter.module().print_to_string().to_string();
    assert!(
        ir.contains("addrspace(257)"),
        "missing FS address space:\n{ir}"
    );
}
