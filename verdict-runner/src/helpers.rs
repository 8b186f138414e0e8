// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error::Error, time::Duration};
use swrite::{SWrite, swrite};

/// Utilities for pluralizing various words based on count or plurality.
pub mod plural {
    /// Returns "fixture" if `count` is 1, otherwise "fixtures".
    pub fn fixtures_str(count: usize) -> &'static str {
        if count == 1 { "fixture" } else { "fixtures" }
    }

    /// Returns "program" if `count` is 1, otherwise "programs".
    pub fn programs_str(count: usize) -> &'static str {
        if count == 1 { "program" } else { "programs" }
    }
}

/// Formats a duration as seconds with six digits after the decimal point.
pub fn format_secs(duration: Duration) -> String {
    format!("{:.6}", duration.as_secs_f64())
}

/// Formats an error followed by each of its sources, separated by `: `.
pub(crate) fn error_chain_str(err: &dyn Error) -> String {
    let mut s = err.to_string();
    let mut next_error = err.source();
    while let Some(err) = next_error {
        swrite!(s, ": {err}");
        next_error = err.source();
    }
    s
}

pub(crate) fn signal_str(signal: i32) -> Option<&'static str> {
    // These signal numbers are the same on at least Linux, macOS, FreeBSD and illumos.
    match signal {
        1 => Some("HUP"),
        2 => Some("INT"),
        3 => Some("QUIT"),
        4 => Some("ILL"),
        5 => Some("TRAP"),
        6 => Some("ABRT"),
        8 => Some("FPE"),
        9 => Some("KILL"),
        11 => Some("SEGV"),
        13 => Some("PIPE"),
        14 => Some("ALRM"),
        15 => Some("TERM"),
        _ => None,
    }
}
