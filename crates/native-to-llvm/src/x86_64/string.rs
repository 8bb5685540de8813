// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! String instructions and the REP loop driver
//!
//! A REP-prefixed string instruction becomes a structured loop: the current
//! block ends with the zero-count check, the body runs one iteration and
//! decrements RCX, the latch re-tests the count (and ZF for REPZ/REPNZ), and
//! lifting resumes in the continue block. The direction flag is read once at
//! the loop header and folded into the per-iteration pointer delta.

use inkwell::values::IntValue;
use inkwell::IntPredicate;

use crate::error::LiftResult;
use crate::facet::Facet;
use crate::inst::{Inst, Rep};
use crate::regfile::ArchReg;

use super::{Fl, Mnemonic};

pub(super) fn lift_string(fl: Fl<'_, '_, '_>, inst: &Inst<Mnemonic>) -> LiftResult<()> {
    let size = inst.opsize;
    debug_assert!(matches!(size, 1 | 2 | 4 | 8));

    // Direction: DF clear walks up, DF set walks down.
    let df = fl.get_flag(Facet::Df);
    let delta = fl
        .ctx
        .builder
        .build_select(
            df,
            fl.ctx.i64_type.const_int((-i64::from(size)) as u64, true),
            fl.ctx.i64_type.const_int(u64::from(size), false),
            "delta",
        )
        .unwrap()
        .into_int_value();

    if inst.rep == Rep::None {
        return string_iteration(fl, inst.mnemonic, size, delta);
    }

    let body = fl.add_block("rep_body");
    let latch = fl.add_block("rep_latch");
    let cont = fl.add_block("rep_cont");

    // Header: skip the loop entirely on a zero count.
    let count = fl.get_int(ArchReg::RCX, Facet::I64);
    let none = fl
        .ctx
        .builder
        .build_int_compare(
            IntPredicate::EQ,
            count,
            fl.ctx.i64_type.const_zero(),
            "rep_none",
        )
        .unwrap();
    fl.cond_branch_idx(none, cont, body);

    // Body: one iteration, then decrement the count.
    fl.seat(body);
    string_iteration(fl, inst.mnemonic, size, delta)?;
    let count = fl.get_int(ArchReg::RCX, Facet::I64);
    let dec = fl
        .ctx
        .builder
        .build_int_sub(count, fl.ctx.i64_type.const_int(1, false), "rep_dec")
        .unwrap();
    fl.set_reg(ArchReg::RCX, Facet::I64, dec.into(), true);
    fl.branch_to_idx(latch);

    // Latch: loop while the count is nonzero and, for REPZ/REPNZ, while the
    // comparison outcome keeps the loop alive.
    fl.seat(latch);
    let count = fl.get_int(ArchReg::RCX, Facet::I64);
    let mut again = fl
        .ctx
        .builder
        .build_int_compare(
            IntPredicate::NE,
            count,
            fl.ctx.i64_type.const_zero(),
            "rep_more",
        )
        .unwrap();
    match inst.rep {
        Rep::Repz => {
            let zf = fl.get_flag(Facet::Zf);
            again = fl.ctx.builder.build_and(again, zf, "repz").unwrap();
        }
        Rep::Repnz => {
            let zf = fl.get_flag(Facet::Zf);
            let nz = fl.ctx.builder.build_not(zf, "nz").unwrap();
            again = fl.ctx.builder.build_and(again, nz, "repnz").unwrap();
        }
        _ => {}
    }
    fl.cond_branch_idx(again, body, cont);

    fl.seat(cont);
    Ok(())
}

/// One iteration of a string instruction: the access itself plus the RSI/RDI
/// updates.
fn string_iteration<'ctx>(
    fl: Fl<'_, '_, 'ctx>,
    m: Mnemonic,
    size: u8,
    delta: IntValue<'ctx>,
) -> LiftResult<()> {
    let facet = Facet::int(u32::from(size) * 8);
    match m {
        Mnemonic::Lods => {
            let v = load_through(fl, ArchReg::RSI, size);
            fl.store_gp(ArchReg::RAX, size, false, v);
            advance(fl, ArchReg::RSI, delta);
        }
        Mnemonic::Stos => {
            let v = fl.get_int(ArchReg::RAX, facet);
            store_through(fl, ArchReg::RDI, v);
            advance(fl, ArchReg::RDI, delta);
        }
        Mnemonic::Movs => {
            let v = load_through(fl, ArchReg::RSI, size);
            store_through(fl, ArchReg::RDI, v);
            advance(fl, ArchReg::RSI, delta);
            advance(fl, ArchReg::RDI, delta);
        }
        Mnemonic::Scas => {
            let acc = fl.get_int(ArchReg::RAX, facet);
            let mem = load_through(fl, ArchReg::RDI, size);
            let res = fl.ctx.builder.build_int_sub(acc, mem, "scas").unwrap();
            fl.flag_calc_sub(res, acc, mem);
            advance(fl, ArchReg::RDI, delta);
        }
        Mnemonic::Cmps => {
            let lhs = load_through(fl, ArchReg::RSI, size);
            let rhs = load_through(fl, ArchReg::RDI, size);
            let res = fl.ctx.builder.build_int_sub(lhs, rhs, "cmps").unwrap();
            fl.flag_calc_sub(res, lhs, rhs);
            advance(fl, ArchReg::RSI, delta);
            advance(fl, ArchReg::RDI, delta);
        }
        other => unreachable!("not a string instruction: {other:?}"),
    }
    Ok(())
}

fn load_through<'ctx>(fl: Fl<'_, '_, 'ctx>, reg: ArchReg, size: u8) -> IntValue<'ctx> {
    let addr = fl.get_int(reg, Facet::I64);
    let ptr = fl
        .ctx
        .builder
        .build_int_to_ptr(addr, fl.ctx.ptr_type, "sptr")
        .unwrap();
    fl.ctx
        .builder
        .build_load(fl.ctx.int_type(u32::from(size) * 8), ptr, "selem")
        .unwrap()
        .into_int_value()
}

fn store_through<'ctx>(fl: Fl<'_, '_, 'ctx>, reg: ArchReg, value: IntValue<'ctx>) {
    let addr = fl.get_int(reg, Facet::I64);
    let ptr = fl
        .ctx
        .builder
        .build_int_to_ptr(addr, fl.ctx.ptr_type, "dptr")
        .unwrap();
    fl.ctx.builder.build_store(ptr, value).unwrap();
}

fn advance<'ctx>(fl: Fl<'_, '_, 'ctx>, reg: ArchReg, delta: IntValue<'ctx>) {
    let cur = fl.get_int(reg, Facet::I64);
    let next = fl.ctx.builder.build_int_add(cur, delta, "sadv").unwrap();
    fl.set_reg(reg, Facet::I64, next.into(), true);
}
