// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for verdict.
//!
//! The embedded default config is layered under an optional repository config at
//! `.config/verdict.toml` (or a file named on the command line). Unknown keys produce warnings
//! rather than errors.

mod imp;
mod test_threads;

pub use imp::*;
pub use test_threads::*;
