// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use itertools::Itertools;
use owo_colors::OwoColorize;
use std::{error::Error, path::PathBuf};
use thiserror::Error;
use tracing::error;
use verdict_runner::errors::*;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Documented exit codes for `verdict` failures.
///
/// `verdict` may also exit with other codes when it panics or hits an unexpected error.
pub enum VerdictExitCode {}

impl VerdictExitCode {
    /// The command completed and every fixture had a successful status.
    pub const OK: i32 = 0;

    /// No fixtures were found under the given roots.
    pub const NO_FIXTURES: i32 = 4;

    /// At least one fixture had a failing status.
    pub const FIXTURES_FAILED: i32 = 100;

    /// A program could not be compiled.
    pub const BUILD_FAILED: i32 = 101;

    /// Writing the report or other output failed.
    pub const REPORT_WRITE_FAILED: i32 = 110;

    /// An error occurred while setting up the run: a config or discovery error, for example.
    pub const SETUP_ERROR: i32 = 96;
}

// The #[error()] strings are placeholders; errors are printed with display_to_stderr.

/// An error that ends a command with a documented exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine current directory")]
    CurrentDir {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { path: PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("fixture discovery error")]
    FixtureDiscovery {
        #[from]
        err: FixtureDiscoveryError,
    },
    #[error("no fixtures found")]
    NoFixtures { roots: Vec<Utf8PathBuf> },
    #[error("build failed")]
    BuildFailed {
        #[from]
        err: BuildError,
    },
    #[error("run session error")]
    RunSession {
        #[from]
        err: RunSessionError,
    },
    #[error("fixtures failed")]
    FixturesFailed { failed: usize, total: usize },
    #[error("report write error")]
    ReportWrite {
        #[from]
        err: ReportWriteError,
    },
    #[error("error writing output")]
    WriteOutput {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn fixtures_failed(failed: usize, total: usize) -> Self {
        Self::FixturesFailed { failed, total }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDir { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::FixtureDiscovery { .. } => VerdictExitCode::SETUP_ERROR,
            Self::NoFixtures { .. } => VerdictExitCode::NO_FIXTURES,
            Self::BuildFailed { .. } => VerdictExitCode::BUILD_FAILED,
            Self::RunSession { err } => match err {
                RunSessionError::Build { .. } => VerdictExitCode::BUILD_FAILED,
                _ => VerdictExitCode::SETUP_ERROR,
            },
            Self::FixturesFailed { .. } => VerdictExitCode::FIXTURES_FAILED,
            Self::ReportWrite { .. } | Self::WriteOutput { .. } => {
                VerdictExitCode::REPORT_WRITE_FAILED
            }
        }
    }

    /// Displays this error to stderr, followed by its causes.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDir { err } => {
                error!("could not determine current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse config at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::ProfileNotFound { err } => {
                error!("{err}");
                err.source()
            }
            Self::FixtureDiscovery { err } => {
                error!("{err}");
                err.source()
            }
            Self::NoFixtures { roots } => {
                error!(
                    "no fixtures found under {}",
                    roots
                        .iter()
                        .map(|root| format!("`{}`", root.style(styles.bold)))
                        .join(", ")
                );
                None
            }
            Self::BuildFailed { err } => {
                display_build_error(err, styles);
                build_error_source(err)
            }
            Self::RunSession { err } => match err {
                RunSessionError::Build { role, err } => {
                    error!("failed to build {role} program");
                    display_build_error(err, styles);
                    build_error_source(err)
                }
                other => {
                    error!("{other}");
                    other.source()
                }
            },
            Self::FixturesFailed { failed, total } => {
                error!(
                    "{} of {} {} failed",
                    failed.style(styles.bold),
                    total.style(styles.bold),
                    verdict_runner::plural::fixtures_str(*total),
                );
                None
            }
            Self::ReportWrite { err } => {
                error!("{err}");
                err.source()
            }
            Self::WriteOutput { err } => {
                error!("error writing output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {err}");
            next_error = err.source();
        }
    }
}

fn display_build_error(err: &BuildError, styles: &StderrStyles) {
    match err {
        BuildError::CompileFailed {
            source_path,
            diagnostics,
        } => {
            error!(
                "compilation of `{}` failed",
                source_path.style(styles.bold)
            );
            // Compiler diagnostics are printed as-is.
            error!(target: NO_HEADING_TARGET, "{}", diagnostics.trim_end());
        }
        other => error!("{other}"),
    }
}

fn build_error_source(err: &BuildError) -> Option<&(dyn Error + 'static)> {
    match err {
        BuildError::CompileFailed { .. } => None,
        other => other.source(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_runner::runner::ProgramRole;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            ExpectedError::fixtures_failed(1, 3).process_exit_code(),
            VerdictExitCode::FIXTURES_FAILED
        );
        assert_eq!(
            ExpectedError::NoFixtures { roots: Vec::new() }.process_exit_code(),
            VerdictExitCode::NO_FIXTURES
        );

        let build = ExpectedError::from(RunSessionError::Build {
            role: ProgramRole::Baseline,
            err: BuildError::MissingArtifact {
                source_path: "b.cpp".into(),
            },
        });
        assert_eq!(build.process_exit_code(), VerdictExitCode::BUILD_FAILED);

        let runtime = ExpectedError::from(RunSessionError::RuntimeCreate(std::io::Error::other(
            "no threads",
        )));
        assert_eq!(runtime.process_exit_code(), VerdictExitCode::SETUP_ERROR);
    }
}
