// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for verdict: a differential test-execution harness.
//!
//! The flow of a run is:
//!
//! 1. [`BuildCache`](build_cache::BuildCache) turns a source file into an executable, reusing a
//!    previously built artifact if the source has not changed.
//! 2. [`RunSession`](runner::RunSession) feeds every [`TestFixture`](fixture::TestFixture) to the
//!    executable(s) through an [`Executor`](runner::Executor), which enforces a hard timeout.
//! 3. Each outcome is classified by the pure functions in [`classify`], using the token
//!    comparison in [`compare`].
//! 4. Timings are folded into per-bucket aggregates by [`stats`], and the finished
//!    [`RunSummary`](runner::RunSummary) is handed to a [`reporter`].

pub mod build_cache;
pub mod classify;
pub mod compare;
pub mod config;
pub mod errors;
pub mod fixture;
mod helpers;
pub mod outcome;
pub mod reporter;
pub mod runner;
pub mod stats;
mod time;

pub use helpers::{format_secs, plural};
