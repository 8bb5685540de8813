// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{BasicTypeEnum, FloatType, IntType, PointerType, VectorType};
use inkwell::values::{BasicValueEnum, CallSiteValue, IntValue, VectorValue};
use inkwell::AddressSpace;

/// Wraps the LLVM Context, Module, and Builder for a single lifting unit.
pub struct LlvmContext<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    // Cached primitive types
    pub bool_type: IntType<'ctx>,
    pub i8_type: IntType<'ctx>,
    pub i16_type: IntType<'ctx>,
    pub i32_type: IntType<'ctx>,
    pub i64_type: IntType<'ctx>,
    pub i128_type: IntType<'ctx>,
    pub i256_type: IntType<'ctx>,
    pub f32_type: FloatType<'ctx>,
    pub f64_type: FloatType<'ctx>,
    pub ptr_type: PointerType<'ctx>,
}

impl<'ctx> LlvmContext<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str) -> Self {
        let module = context.create_module(module_name);
        let builder = context.create_builder();

        Self {
            context,
            module,
            builder,
            bool_type: context.bool_type(),
            i8_type: context.i8_type(),
            i16_type: context.i16_type(),
            i32_type: context.i32_type(),
            i64_type: context.i64_type(),
            i128_type: context.i128_type(),
            i256_type: context.custom_width_int_type(256),
            f32_type: context.f32_type(),
            f64_type: context.f64_type(),
            ptr_type: context.i8_type().ptr_type(AddressSpace::default()),
        }
    }

    /// Integer type of an arbitrary bit width, going through the cache for
    /// the common widths.
    pub fn int_type(&self, bits: u32) -> IntType<'ctx> {
        match bits {
            1 => self.bool_type,
            8 => self.i8_type,
            16 => self.i16_type,
            32 => self.i32_type,
            64 => self.i64_type,
            128 => self.i128_type,
            256 => self.i256_type,
            other => self.context.custom_width_int_type(other),
        }
    }

    /// Pointer type in the given address space (segment tag).
    pub fn ptr_type_in(&self, addrspace: u16) -> PointerType<'ctx> {
        if addrspace == 0 {
            self.ptr_type
        } else {
            self.context.i8_type().ptr_type(AddressSpace::from(addrspace))
        }
    }

    /// An `i32` constant, as used for vector lane indices.
    pub fn lane(&self, i: u64) -> IntValue<'ctx> {
        self.i32_type.const_int(i, false)
    }

    /// A constant `<n x i32>` shuffle mask.
    pub fn shuffle_mask(&self, lanes: &[u32]) -> VectorValue<'ctx> {
        let elems: Vec<IntValue<'ctx>> = lanes
            .iter()
            .map(|&i| self.i32_type.const_int(i as u64, false))
            .collect();
        VectorType::const_vector(&elems)
    }

    /// Bit width of a first-class value type.
    pub fn bit_width(ty: BasicTypeEnum<'ctx>) -> u32 {
        match ty {
            BasicTypeEnum::IntType(t) => t.get_bit_width(),
            BasicTypeEnum::FloatType(t) => {
                if t.get_context().f32_type() == t {
                    32
                } else {
                    64
                }
            }
            BasicTypeEnum::VectorType(t) => {
                Self::bit_width(t.get_element_type()) * t.get_size()
            }
            other => panic!("no bit width for type {other:?}"),
        }
    }

    /// The basic value returned by a call site. Panics on void calls.
    pub fn call_value(call: CallSiteValue<'ctx>) -> BasicValueEnum<'ctx> {
        call.try_as_basic_value()
            .left()
            .expect("expected non-void return from callee")
    }
}
