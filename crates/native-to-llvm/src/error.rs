// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LiftError {
    #[error("failed to decode instruction at {addr:#x}: {message}")]
    Decode { addr: u64, message: String },

    #[error("unsupported instruction at {addr:#x}: {mnemonic}")]
    UnsupportedInstruction { addr: u64, mnemonic: String },

    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    #[error("control flow error: {0}")]
    Cfg(String),
}

/// Convenience alias used throughout the crate.
pub type LiftResult<T> = Result<T, LiftError>;
