// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests that build and run real programs.
//!
//! Programs are shell scripts, and the "compiler" is a shell script that copies its input and
//! marks it executable.

#![cfg(unix)]

mod build_cache;
mod differential;
mod fixtures;
mod reference;
