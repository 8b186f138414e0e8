// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds solutions, runs them against test fixtures and classifies the results.
//!
//! `verdict run` compares a candidate program against reference outputs, or against a second
//! program with `--reference-program`. `verdict list` shows the fixtures available and
//! `verdict build` compiles a single program through the build cache.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputContext;
