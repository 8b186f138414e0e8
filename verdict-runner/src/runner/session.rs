// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Executor, ProcessRunner};
use crate::{
    build_cache::{BuildCache, ExecutableHandle},
    classify::{FixtureStatus, classify_differential, classify_reference},
    config::{TestThreads, VerdictProfile},
    errors::{ExecutionSetupError, RunSessionError},
    fixture::{FixtureId, TestFixture},
    helpers::{error_chain_str, plural},
    outcome::{ExecutionOutcome, ExitKind},
    stats::{AggregateStats, StatsAggregator, StatsBucket, TimingStats},
    time::stopwatch,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Which program a build or run belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgramRole {
    /// The program under test (program A in differential mode).
    Candidate,

    /// The program the candidate is compared against in differential mode (program B).
    Baseline,
}

impl fmt::Display for ProgramRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Candidate => write!(f, "candidate"),
            Self::Baseline => write!(f, "baseline"),
        }
    }
}

/// Which captured outputs are kept in the results of a run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetainOutput {
    /// Keep the output of fixtures with a failing status.
    #[default]
    Failures,

    /// Keep every output.
    All,

    /// Keep no output.
    None,
}

impl RetainOutput {
    /// Returns true if output of a fixture with the given status should be kept.
    pub fn should_retain(self, status: FixtureStatus) -> bool {
        match self {
            Self::Failures => status.retains_output(),
            Self::All => true,
            Self::None => false,
        }
    }
}

/// What a run session compares the candidate against.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RunMode {
    /// Compare the candidate's output against each fixture's reference output.
    Reference {
        /// The candidate source file.
        candidate: Utf8PathBuf,
    },

    /// Compare the candidate's output against a baseline program's output.
    Differential {
        /// The candidate source file (program A).
        candidate: Utf8PathBuf,

        /// The baseline source file (program B).
        baseline: Utf8PathBuf,
    },
}

impl RunMode {
    /// Returns the kind of this mode.
    pub fn kind(&self) -> RunModeKind {
        match self {
            Self::Reference { .. } => RunModeKind::Reference,
            Self::Differential { .. } => RunModeKind::Differential,
        }
    }
}

/// The kind of a [`RunMode`], without its sources.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunModeKind {
    /// Reference-output comparison.
    Reference,

    /// Two-program differential comparison.
    Differential,
}

impl RunModeKind {
    /// Returns every status this mode can produce, in report order.
    pub fn statuses(self) -> &'static [FixtureStatus] {
        match self {
            Self::Reference => FixtureStatus::REFERENCE,
            Self::Differential => FixtureStatus::DIFFERENTIAL,
        }
    }

    /// Returns the timing buckets of this mode, in report order.
    pub fn buckets(self) -> &'static [StatsBucket] {
        match self {
            Self::Reference => StatsBucket::REFERENCE,
            Self::Differential => StatsBucket::DIFFERENTIAL,
        }
    }
}

/// What is kept of one execution in a [`ClassifiedResult`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OutcomeRecord {
    /// How the process exited.
    pub exit: ExitKind,

    /// The duration of the run. For timeouts this is the configured timeout.
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,

    /// Captured standard output, if retained.
    #[serde(skip)]
    pub stdout: Option<String>,

    /// Captured standard error, if retained.
    #[serde(skip)]
    pub stderr: Option<String>,
}

impl OutcomeRecord {
    /// Creates a record of `outcome`, keeping its output if `retain` calls for it.
    pub fn new(outcome: &ExecutionOutcome, retain: RetainOutput, status: FixtureStatus) -> Self {
        let keep = retain.should_retain(status);
        Self {
            exit: outcome.exit,
            elapsed: outcome.elapsed,
            stdout: keep.then(|| outcome.stdout.clone()),
            stderr: keep.then(|| outcome.stderr.clone()),
        }
    }
}

/// Per-execution details of a [`ClassifiedResult`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResultDetail {
    /// Reference mode: the candidate's run.
    Single(OutcomeRecord),

    /// Differential mode: the runs of both programs.
    Pair {
        /// The candidate's run.
        a: OutcomeRecord,

        /// The baseline's run.
        b: OutcomeRecord,
    },

    /// The fixture could not be executed.
    SetupFailed {
        /// A description of the error.
        message: String,
    },
}

/// The classified result of one fixture.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ClassifiedResult {
    /// The fixture's identity.
    pub fixture_id: FixtureId,

    /// Where the fixture's reference output lives, if it has one.
    pub expected_path: Option<Utf8PathBuf>,

    /// The terminal status.
    pub status: FixtureStatus,

    /// Per-execution details.
    pub detail: ResultDetail,
}

impl ClassifiedResult {
    /// Returns the candidate's run, if the fixture was executed.
    pub fn candidate(&self) -> Option<&OutcomeRecord> {
        match &self.detail {
            ResultDetail::Single(run) => Some(run),
            ResultDetail::Pair { a, .. } => Some(a),
            ResultDetail::SetupFailed { .. } => None,
        }
    }

    /// Returns the baseline's run, if this is a differential result that was executed.
    pub fn baseline(&self) -> Option<&OutcomeRecord> {
        match &self.detail {
            ResultDetail::Pair { b, .. } => Some(b),
            ResultDetail::Single(_) | ResultDetail::SetupFailed { .. } => None,
        }
    }
}

/// A program built for a run session.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ProgramInfo {
    /// The role of the program.
    pub role: ProgramRole,

    /// The source file.
    pub source: Utf8PathBuf,

    /// The compiled executable.
    pub executable: Utf8PathBuf,
}

/// The finished results of a run session.
///
/// Results are ordered by fixture position, regardless of the order in which fixtures finished.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    mode: RunModeKind,
    start_time: DateTime<Local>,
    #[serde(with = "humantime_serde")]
    elapsed: Duration,
    programs: Vec<ProgramInfo>,
    results: Vec<ClassifiedResult>,
    #[serde(flatten)]
    stats: AggregateStats,
}

impl RunSummary {
    /// Returns the mode of the run.
    pub fn mode(&self) -> RunModeKind {
        self.mode
    }

    /// Returns the time at which the run started.
    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    /// Returns the wall-clock duration of the whole run, including builds.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Returns the programs used in the run.
    pub fn programs(&self) -> &[ProgramInfo] {
        &self.programs
    }

    /// Returns the program with the given role.
    pub fn program(&self, role: ProgramRole) -> Option<&ProgramInfo> {
        self.programs.iter().find(|program| program.role == role)
    }

    /// Returns the per-fixture results.
    pub fn results(&self) -> &[ClassifiedResult] {
        &self.results
    }

    /// Returns the number of fixtures in the run.
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Returns the number of results with each status of the mode, zeros included, in report
    /// order.
    pub fn counts(&self) -> impl Iterator<Item = (FixtureStatus, usize)> + '_ {
        self.stats.counts.iter().map(|(&status, &count)| (status, count))
    }

    /// Returns the number of results with the given status.
    pub fn count(&self, status: FixtureStatus) -> usize {
        self.stats.counts.get(&status).copied().unwrap_or_default()
    }

    /// Returns the timing statistics for every bucket of the mode, in report order.
    pub fn timings(&self) -> impl Iterator<Item = (StatsBucket, TimingStats)> + '_ {
        self.stats.timings.iter().map(|(&bucket, &stats)| (bucket, stats))
    }

    /// Returns the timing statistics for a bucket. Buckets of the other mode report zeros.
    pub fn bucket(&self, bucket: StatsBucket) -> TimingStats {
        self.stats.timings.get(&bucket).copied().unwrap_or_default()
    }

    /// Returns true if no result has a failing status.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|result| result.status.is_success())
    }
}

/// An event emitted while a run session is in progress.
#[derive(Clone, Debug)]
pub enum SessionEvent<'a> {
    /// All programs were built and fixtures are about to run.
    RunStarted {
        /// The mode of the run.
        mode: RunModeKind,

        /// The number of fixtures that will run.
        fixture_count: usize,

        /// The number of fixtures that run at the same time.
        test_threads: usize,
    },

    /// A fixture finished.
    FixtureFinished {
        /// The result of the fixture.
        result: &'a ClassifiedResult,

        /// The number of fixtures finished so far, including this one.
        completed: usize,

        /// The total number of fixtures.
        total: usize,
    },
}

/// Builder for [`RunSession`]. Settings not set here are taken from the profile.
#[derive(Clone, Debug, Default)]
pub struct RunSessionBuilder {
    timeout: Option<Duration>,
    test_threads: Option<TestThreads>,
    retain_output: Option<RetainOutput>,
}

impl RunSessionBuilder {
    /// Sets the timeout for each run of each program.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the number of fixtures to run simultaneously.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) -> &mut Self {
        self.test_threads = Some(test_threads);
        self
    }

    /// Sets which outputs are kept in the results.
    pub fn set_retain_output(&mut self, retain_output: RetainOutput) -> &mut Self {
        self.retain_output = Some(retain_output);
        self
    }

    /// Creates a new run session.
    pub fn build<'a, R: ProcessRunner>(
        self,
        profile: &VerdictProfile<'_>,
        cache: &'a BuildCache,
        runner: R,
    ) -> Result<RunSession<'a, R>, RunSessionError> {
        let test_threads = self
            .test_threads
            .unwrap_or_else(|| profile.test_threads())
            .compute()
            .max(1);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("verdict-runner-worker")
            .build()
            .map_err(RunSessionError::RuntimeCreate)?;

        Ok(RunSession {
            cache,
            executor: Executor::new(runner),
            timeout: self.timeout.unwrap_or_else(|| profile.timeout()),
            test_threads,
            retain_output: self.retain_output.unwrap_or_else(|| profile.retain_output()),
            runtime,
        })
    }
}

/// Runs a collection of fixtures through an executor and classifier.
///
/// Created with [`RunSessionBuilder`].
#[derive(Debug)]
pub struct RunSession<'a, R> {
    cache: &'a BuildCache,
    executor: Executor<R>,
    timeout: Duration,
    test_threads: usize,
    retain_output: RetainOutput,
    runtime: Runtime,
}

impl<R: ProcessRunner> RunSession<'_, R> {
    /// Returns the timeout applied to each run.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the number of fixtures run simultaneously.
    pub fn test_threads(&self) -> usize {
        self.test_threads
    }

    /// Runs every fixture and returns the finished summary.
    pub fn execute(
        &self,
        fixtures: &[TestFixture],
        mode: &RunMode,
    ) -> Result<RunSummary, RunSessionError> {
        self.execute_with_reporter(fixtures, mode, |_| {})
    }

    /// Runs every fixture, calling `callback` as the run progresses, and returns the finished
    /// summary.
    ///
    /// Every program is built before any fixture runs; a build failure aborts the session.
    /// Failures of individual fixtures are recorded as results and never abort the session.
    pub fn execute_with_reporter<F>(
        &self,
        fixtures: &[TestFixture],
        mode: &RunMode,
        mut callback: F,
    ) -> Result<RunSummary, RunSessionError>
    where
        F: FnMut(SessionEvent<'_>),
    {
        let stopwatch = stopwatch();
        let kind = mode.kind();
        let (programs, program_infos) = self.acquire_programs(mode)?;
        info!(
            "built {} {}, running {} {}",
            program_infos.len(),
            plural::programs_str(program_infos.len()),
            fixtures.len(),
            plural::fixtures_str(fixtures.len()),
        );

        callback(SessionEvent::RunStarted {
            mode: kind,
            fixture_count: fixtures.len(),
            test_threads: self.test_threads,
        });

        let mut finished = self.runtime.block_on(async {
            let programs = &programs;
            let mut finished = Vec::with_capacity(fixtures.len());
            let mut results = futures::stream::iter(fixtures.iter().enumerate())
                .map(|(index, fixture)| async move {
                    (index, self.run_fixture(fixture, programs).await)
                })
                .buffer_unordered(self.test_threads);

            while let Some((index, result)) = results.next().await {
                callback(SessionEvent::FixtureFinished {
                    result: &result,
                    completed: finished.len() + 1,
                    total: fixtures.len(),
                });
                finished.push((index, result));
            }
            finished
        });

        // Restore fixture order, independent of completion order.
        finished.sort_unstable_by_key(|(index, _)| *index);
        let results: Vec<_> = finished.into_iter().map(|(_, result)| result).collect();

        let mut aggregator = StatsAggregator::new(kind);
        for result in &results {
            aggregator.record(result);
        }

        let snapshot = stopwatch.snapshot();
        Ok(RunSummary {
            mode: kind,
            start_time: snapshot.start_time,
            elapsed: snapshot.duration,
            programs: program_infos,
            results,
            stats: aggregator.finalize(),
        })
    }

    fn acquire_programs(
        &self,
        mode: &RunMode,
    ) -> Result<(Programs, Vec<ProgramInfo>), RunSessionError> {
        let acquire = |role: ProgramRole, source: &Utf8Path| {
            self.cache
                .acquire(source)
                .map_err(|err| RunSessionError::Build { role, err })
        };

        let programs = match mode {
            RunMode::Reference { candidate } => Programs::Reference {
                candidate: acquire(ProgramRole::Candidate, candidate)?,
            },
            RunMode::Differential {
                candidate,
                baseline,
            } => Programs::Differential {
                candidate: acquire(ProgramRole::Candidate, candidate)?,
                baseline: acquire(ProgramRole::Baseline, baseline)?,
            },
        };

        let infos = programs
            .handles()
            .into_iter()
            .map(|(role, handle)| ProgramInfo {
                role,
                source: handle.source().to_owned(),
                executable: handle.path().to_owned(),
            })
            .collect();
        Ok((programs, infos))
    }

    async fn run_fixture(&self, fixture: &TestFixture, programs: &Programs) -> ClassifiedResult {
        let res = match programs {
            Programs::Reference { candidate } => self.run_reference(fixture, candidate).await,
            Programs::Differential {
                candidate,
                baseline,
            } => self.run_differential(fixture, candidate, baseline).await,
        };

        let (status, detail) = res.unwrap_or_else(|err| {
            let message = error_chain_str(&err);
            debug!(fixture = %fixture.id(), "fixture could not be executed: {message}");
            (FixtureStatus::ExecFail, ResultDetail::SetupFailed { message })
        });

        ClassifiedResult {
            fixture_id: fixture.id().clone(),
            expected_path: fixture
                .reference()
                .and_then(|reference| reference.path())
                .map(ToOwned::to_owned),
            status,
            detail,
        }
    }

    async fn run_reference(
        &self,
        fixture: &TestFixture,
        candidate: &ExecutableHandle,
    ) -> Result<(FixtureStatus, ResultDetail), ExecutionSetupError> {
        let outcome = self.executor.run(candidate, fixture, self.timeout).await?;

        // The reference output only matters for runs that exited successfully.
        let reference = match fixture.reference() {
            Some(reference) if outcome.exit.is_success() => {
                Some(reference.read_async().await.map_err(|err| {
                    ExecutionSetupError::ReadReference {
                        fixture: fixture.id().clone(),
                        path: reference.describe(),
                        err: Arc::new(err),
                    }
                })?)
            }
            _ => None,
        };

        let status = classify_reference(&outcome, reference.as_deref());
        let record = OutcomeRecord::new(&outcome, self.retain_output, status);
        Ok((status, ResultDetail::Single(record)))
    }

    async fn run_differential(
        &self,
        fixture: &TestFixture,
        candidate: &ExecutableHandle,
        baseline: &ExecutableHandle,
    ) -> Result<(FixtureStatus, ResultDetail), ExecutionSetupError> {
        let a = self.executor.run(candidate, fixture, self.timeout).await?;
        let b = self.executor.run(baseline, fixture, self.timeout).await?;

        let status = classify_differential(&a, &b);
        Ok((
            status,
            ResultDetail::Pair {
                a: OutcomeRecord::new(&a, self.retain_output, status),
                b: OutcomeRecord::new(&b, self.retain_output, status),
            },
        ))
    }
}

#[derive(Debug)]
enum Programs {
    Reference {
        candidate: ExecutableHandle,
    },
    Differential {
        candidate: ExecutableHandle,
        baseline: ExecutableHandle,
    },
}

impl Programs {
    fn handles(&self) -> Vec<(ProgramRole, &ExecutableHandle)> {
        match self {
            Self::Reference { candidate } => vec![(ProgramRole::Candidate, candidate)],
            Self::Differential {
                candidate,
                baseline,
            } => vec![
                (ProgramRole::Candidate, candidate),
                (ProgramRole::Baseline, baseline),
            ],
        }
    }
}
