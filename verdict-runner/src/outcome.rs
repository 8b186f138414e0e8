// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The raw result of executing a program against one fixture, before classification.

use crate::helpers::signal_str;
use serde::Serialize;
use std::{fmt, process::ExitStatus, time::Duration};

/// The return code reported for runs that were terminated because of a timeout.
pub const TIMEOUT_RETURN_CODE: i32 = -1;

/// How a process that did not succeed exited.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum FailureStatus {
    /// The process exited with a non-zero exit code.
    ExitCode(i32),

    /// The process was terminated by a signal (Unix only).
    Signal(i32),
}

impl FailureStatus {
    /// Extracts the failure status from an exit status that does not indicate success.
    pub fn extract(exit_status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = exit_status.signal() {
                return Self::Signal(signal);
            }
        }

        // On Windows an exit code is always available. On Unix, either a signal or an exit code
        // is.
        Self::ExitCode(exit_status.code().unwrap_or(-1))
    }
}

impl fmt::Display for FailureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitCode(code) => write!(f, "exit code {code}"),
            Self::Signal(signal) => match signal_str(*signal) {
                Some(name) => write!(f, "signal {signal} (SIG{name})"),
                None => write!(f, "signal {signal}"),
            },
        }
    }
}

/// The exit status of one execution.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum ExitKind {
    /// The process exited with status 0.
    Success,

    /// The process exited unsuccessfully.
    Failed {
        /// How the process failed.
        status: FailureStatus,
    },

    /// The process did not exit before the timeout and was terminated.
    TimedOut,
}

impl ExitKind {
    /// Converts a process exit status into an `ExitKind`.
    pub fn from_exit_status(exit_status: ExitStatus) -> Self {
        if exit_status.success() {
            Self::Success
        } else {
            Self::Failed {
                status: FailureStatus::extract(exit_status),
            }
        }
    }

    /// Returns true if the process exited with status 0.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the process was terminated because of a timeout.
    pub fn is_timeout(self) -> bool {
        matches!(self, Self::TimedOut)
    }

    /// Returns the return code shown in reports.
    ///
    /// This is the exit code for processes that exited, the negated signal number for processes
    /// killed by a signal, and [`TIMEOUT_RETURN_CODE`] for timeouts.
    pub fn return_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failed {
                status: FailureStatus::ExitCode(code),
            } => code,
            Self::Failed {
                status: FailureStatus::Signal(signal),
            } => -signal,
            Self::TimedOut => TIMEOUT_RETURN_CODE,
        }
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "exited successfully"),
            Self::Failed { status } => write!(f, "failed with {status}"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// The outcome of running one executable against one fixture.
///
/// Outcomes are produced fresh for every run and never cached.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionOutcome {
    /// How the process exited.
    pub exit: ExitKind,

    /// Captured standard output, with invalid UTF-8 replaced.
    pub stdout: String,

    /// Captured standard error, with invalid UTF-8 replaced. Never used for classification.
    pub stderr: String,

    /// Wall-clock duration of the run. For timeouts this is exactly the configured timeout.
    pub elapsed: Duration,
}

impl ExecutionOutcome {
    /// Creates an outcome for a process that exited with status 0.
    pub fn success(stdout: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            exit: ExitKind::Success,
            stdout: stdout.into(),
            stderr: String::new(),
            elapsed,
        }
    }

    /// Creates an outcome for a process that exited with the given non-zero exit code.
    pub fn exit_code(code: i32, stdout: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            exit: ExitKind::Failed {
                status: FailureStatus::ExitCode(code),
            },
            stdout: stdout.into(),
            stderr: String::new(),
            elapsed,
        }
    }

    /// Creates an outcome for a process that was terminated after `timeout`.
    pub fn timed_out(stdout: impl Into<String>, timeout: Duration) -> Self {
        Self {
            exit: ExitKind::TimedOut,
            stdout: stdout.into(),
            stderr: String::new(),
            elapsed: timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ExitKind::Success, 0 ; "success")]
    #[test_case(ExitKind::Failed { status: FailureStatus::ExitCode(3) }, 3 ; "exit code")]
    #[test_case(ExitKind::Failed { status: FailureStatus::Signal(9) }, -9 ; "signal")]
    #[test_case(ExitKind::TimedOut, -1 ; "timeout")]
    fn test_return_code(exit: ExitKind, expected: i32) {
        assert_eq!(exit.return_code(), expected);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ExitKind::Failed {
                status: FailureStatus::Signal(11)
            }
            .to_string(),
            "failed with signal 11 (SIGSEGV)"
        );
        assert_eq!(
            ExitKind::Failed {
                status: FailureStatus::ExitCode(2)
            }
            .to_string(),
            "failed with exit code 2"
        );
        assert_eq!(ExitKind::TimedOut.to_string(), "timed out");
    }

    #[cfg(unix)]
    #[test]
    fn test_from_exit_status() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(
            ExitKind::from_exit_status(ExitStatus::from_raw(0)),
            ExitKind::Success
        );
        // Raw wait statuses encode the exit code in the second byte.
        assert_eq!(
            ExitKind::from_exit_status(ExitStatus::from_raw(1 << 8)),
            ExitKind::Failed {
                status: FailureStatus::ExitCode(1)
            }
        );
        assert_eq!(
            ExitKind::from_exit_status(ExitStatus::from_raw(libc::SIGKILL)),
            ExitKind::Failed {
                status: FailureStatus::Signal(libc::SIGKILL)
            }
        );
    }
}
