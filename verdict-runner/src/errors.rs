// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by verdict.
//!
//! Anything attributable to the program under test becomes a
//! [`FixtureStatus`](crate::classify::FixtureStatus), never an error. The types here describe the
//! cases where the harness itself could not do its job.

use crate::{fixture::FixtureId, runner::ProgramRole};
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse verdict config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }
}

/// An error which indicates that a profile was requested but not known to verdict.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// Error returned while parsing a [`TestThreads`](crate::config::TestThreads) value from a
/// string.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for test-threads: {input}")]
pub struct TestThreadsParseError {
    input: String,
}

impl TestThreadsParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurred while turning a source file into an executable.
///
/// Build errors are fatal to a run session: no fixture is executed if any program fails to build.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// The source file could not be read to compute its fingerprint.
    #[error("failed to read source file `{source_path}`")]
    ReadSource {
        /// The source file.
        source_path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The cache directory, or a staging directory inside it, could not be created.
    #[error("failed to create build cache directory under `{cache_dir}`")]
    CacheDirCreate {
        /// The cache directory.
        cache_dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The compiler could not be started at all.
    #[error("failed to run compiler `{compiler}`")]
    CompilerSpawn {
        /// The compiler program.
        compiler: String,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The compiler ran and reported failure.
    #[error("compiling `{source_path}` failed")]
    CompileFailed {
        /// The source file.
        source_path: Utf8PathBuf,

        /// Diagnostic text produced by the compiler.
        diagnostics: String,
    },

    /// The compiler reported success but did not produce an executable.
    #[error("compiler reported success for `{source_path}` but produced no executable")]
    MissingArtifact {
        /// The source file.
        source_path: Utf8PathBuf,
    },

    /// The finished executable could not be moved into the cache.
    #[error("failed to publish compiled artifact to `{artifact}`")]
    Publish {
        /// The final artifact path.
        artifact: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },
}

impl BuildError {
    /// Returns the compiler diagnostics, if this error was caused by a failed compilation.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::CompileFailed { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}

/// An error that occurred while starting or waiting on a child process.
#[derive(Clone, Debug, Error)]
pub enum ChildStartError {
    /// An error occurred while spawning the child process.
    #[error("error spawning child process")]
    Spawn(#[source] Arc<std::io::Error>),

    /// An error occurred while waiting for the child process to exit.
    #[error("error waiting for child process to exit")]
    Wait(#[source] Arc<std::io::Error>),

    /// An error occurred while reading standard output.
    #[error("error reading standard output")]
    ReadStdout(#[source] Arc<std::io::Error>),

    /// An error occurred while reading standard error.
    #[error("error reading standard error")]
    ReadStderr(#[source] Arc<std::io::Error>),
}

/// An error that prevents a single fixture from being executed.
///
/// These errors are recorded as [`FixtureStatus::ExecFail`](crate::classify::FixtureStatus) by
/// the run session; the rest of the session carries on.
#[derive(Clone, Debug, Error)]
pub enum ExecutionSetupError {
    /// The input payload could not be read.
    #[error("failed to read input for fixture `{fixture}` from `{path}`")]
    ReadInput {
        /// The fixture.
        fixture: FixtureId,

        /// The input path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: Arc<std::io::Error>,
    },

    /// The reference output could not be read.
    #[error("failed to read reference output for fixture `{fixture}` from `{path}`")]
    ReadReference {
        /// The fixture.
        fixture: FixtureId,

        /// The reference output path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: Arc<std::io::Error>,
    },

    /// The executable could not be run.
    #[error("failed to run `{executable}` for fixture `{fixture}`")]
    Child {
        /// The fixture.
        fixture: FixtureId,

        /// The executable.
        executable: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: ChildStartError,
    },
}

/// An error that occurred while discovering fixtures on disk.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FixtureDiscoveryError {
    /// Walking a fixture root failed.
    #[error("failed to walk fixture directory `{root}`")]
    Walk {
        /// The root being walked.
        root: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: walkdir::Error,
    },

    /// Listing a directory failed.
    #[error("failed to read directory `{dir}`")]
    ReadDir {
        /// The directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// A discovered path was not valid UTF-8.
    #[error("path is not valid UTF-8: {}", .path.display())]
    NonUtf8Path {
        /// The path.
        path: PathBuf,
    },
}

/// An error that occurred while writing a report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportWriteError {
    /// The report directory could not be created.
    #[error("failed to create report directory `{dir}`")]
    CreateDir {
        /// The directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// A report file could not be written.
    #[error("failed to write report file `{path}`")]
    Write {
        /// The file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: atomicwrites::Error<std::io::Error>,
    },

    /// The summary could not be serialized.
    #[error("failed to serialize summary to `{path}`")]
    Serialize {
        /// The file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },
}

/// An error that aborts a whole run session before any fixture runs.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunSessionError {
    /// A program could not be built.
    #[error("failed to build {role} program")]
    Build {
        /// Which program failed to build.
        role: ProgramRole,

        /// The underlying error.
        #[source]
        err: BuildError,
    },

    /// The async runtime could not be created.
    #[error("error creating async runtime")]
    RuntimeCreate(#[source] std::io::Error),
}
