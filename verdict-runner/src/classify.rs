// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of execution outcomes into terminal statuses.
//!
//! Classification is a pure function of one or two [`ExecutionOutcome`]s. A timeout or a
//! non-zero exit always takes precedence over output comparison, even if the output is correct.

use crate::{compare::outputs_equal, outcome::ExecutionOutcome};
use serde::Serialize;
use std::fmt;

/// The terminal status assigned to one fixture.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixtureStatus {
    /// Reference mode: the output matched the reference output.
    Accepted,

    /// Reference mode: the program exited with status 0 but its output differs from the
    /// reference output.
    WrongAnswer,

    /// Reference mode: the program exited unsuccessfully.
    RuntimeError,

    /// Reference mode: the program did not exit before the timeout.
    Timeout,

    /// Reference mode: the program exited with status 0 and there was no reference output to
    /// compare against.
    NoReference,

    /// Differential mode: both programs exited with status 0 and their outputs are equal.
    Match,

    /// Differential mode: both programs exited with status 0 and their outputs differ.
    Mismatch,

    /// Differential mode: the candidate timed out.
    TimeoutA,

    /// Differential mode: the baseline timed out and the candidate did not.
    TimeoutB,

    /// Differential mode: the candidate exited unsuccessfully.
    RuntimeErrorA,

    /// Differential mode: the baseline exited unsuccessfully and the candidate succeeded.
    RuntimeErrorB,

    /// The fixture could not be executed at all, for example because its input could not be
    /// read.
    ExecFail,
}

impl FixtureStatus {
    /// Every status that reference mode can produce, in report order.
    pub const REFERENCE: &'static [Self] = &[
        Self::Accepted,
        Self::WrongAnswer,
        Self::RuntimeError,
        Self::Timeout,
        Self::NoReference,
        Self::ExecFail,
    ];

    /// Every status that differential mode can produce, in report order.
    pub const DIFFERENTIAL: &'static [Self] = &[
        Self::Match,
        Self::Mismatch,
        Self::RuntimeErrorA,
        Self::RuntimeErrorB,
        Self::TimeoutA,
        Self::TimeoutB,
        Self::ExecFail,
    ];

    /// Returns the name of this status as it appears in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "ACCEPTED",
            Self::WrongAnswer => "WRONG_ANSWER",
            Self::RuntimeError => "RUNTIME_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::NoReference => "NO_REFERENCE",
            Self::Match => "MATCH",
            Self::Mismatch => "MISMATCH",
            Self::TimeoutA => "TIMEOUT_A",
            Self::TimeoutB => "TIMEOUT_B",
            Self::RuntimeErrorA => "RUNTIME_ERROR_A",
            Self::RuntimeErrorB => "RUNTIME_ERROR_B",
            Self::ExecFail => "EXEC_FAIL",
        }
    }

    /// Returns true if this status does not indicate a problem.
    ///
    /// `NO_REFERENCE` counts as a success: the result is unverifiable, not wrong.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Accepted | Self::NoReference | Self::Match)
    }

    /// Returns true if the captured output of a fixture with this status is worth keeping for
    /// inspection when only failures are retained.
    pub fn retains_output(self) -> bool {
        !self.is_success() && self != Self::ExecFail
    }
}

impl fmt::Display for FixtureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Classifies a single outcome against an optional reference output.
pub fn classify_reference(outcome: &ExecutionOutcome, reference: Option<&str>) -> FixtureStatus {
    if outcome.exit.is_timeout() {
        return FixtureStatus::Timeout;
    }
    if !outcome.exit.is_success() {
        return FixtureStatus::RuntimeError;
    }
    match reference {
        None => FixtureStatus::NoReference,
        Some(expected) if outputs_equal(&outcome.stdout, expected) => FixtureStatus::Accepted,
        Some(_) => FixtureStatus::WrongAnswer,
    }
}

/// Classifies the outcomes of a candidate (`a`) and a baseline (`b`) run on the same fixture.
pub fn classify_differential(a: &ExecutionOutcome, b: &ExecutionOutcome) -> FixtureStatus {
    if a.exit.is_timeout() {
        FixtureStatus::TimeoutA
    } else if b.exit.is_timeout() {
        FixtureStatus::TimeoutB
    } else if !a.exit.is_success() {
        FixtureStatus::RuntimeErrorA
    } else if !b.exit.is_success() {
        FixtureStatus::RuntimeErrorB
    } else if outputs_equal(&a.stdout, &b.stdout) {
        FixtureStatus::Match
    } else {
        FixtureStatus::Mismatch
    }
}
