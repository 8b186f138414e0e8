// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running programs against fixtures.
//!
//! The main structure in this module is [`RunSession`]. It drives an [`Executor`], which in turn
//! delegates to a [`ProcessRunner`] to actually start processes.

mod executor;
mod process;
mod session;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        #[path = "unix.rs"]
        mod os;
    } else if #[cfg(windows)] {
        #[path = "windows.rs"]
        mod os;
    } else {
        compile_error!("unsupported target platform");
    }
}

pub use executor::*;
pub use process::*;
pub use session::*;
