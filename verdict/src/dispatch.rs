// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::{Result, VerdictExitCode},
    output::{OutputContext, OutputOpts, StdoutStyles, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use std::io::{self, Write};
use swrite::{SWrite, swrite};
use tracing::{debug, info};
use verdict_runner::{
    build_cache::BuildCache,
    classify::FixtureStatus,
    compare::first_difference,
    config::{TestThreads, VerdictConfig},
    fixture::{self, TestFixture},
    format_secs, plural,
    reporter::ReportWriter,
    runner::{
        ClassifiedResult, RunMode, RunSessionBuilder, RunSummary, SessionEvent,
        TokioProcessRunner,
    },
};

/// Build solutions, run them against test fixtures and classify the results.
#[derive(Debug, Parser)]
#[command(version, styles = clap_styles::style())]
pub struct VerdictApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(subcommand)]
    command: Command,
}

impl VerdictApp {
    /// Initializes logging and color output.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        match self.command {
            Command::Run(opts) => opts.exec(&self.config_opts, output),
            Command::List(opts) => opts.exec(&self.config_opts, output),
            Command::Build(opts) => opts.exec(&self.config_opts),
        }
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Config file [default: workspace-root/.config/verdict.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// The verdict profile to use
    #[arg(
        long,
        short = 'P',
        global = true,
        env = "VERDICT_PROFILE",
        default_value = VerdictConfig::DEFAULT_PROFILE,
    )]
    profile: String,

    /// Workspace root [default: current directory]
    #[arg(long, global = true, value_name = "DIR")]
    workspace_root: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn workspace_root(&self) -> Result<Utf8PathBuf> {
        match &self.workspace_root {
            Some(root) => Ok(root.clone()),
            None => current_dir(),
        }
    }

    fn make_config(&self) -> Result<VerdictConfig> {
        let workspace_root = self.workspace_root()?;
        Ok(VerdictConfig::from_sources(
            workspace_root,
            self.config_file.as_deref(),
        )?)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the candidate and run it against every fixture
    ///
    /// Without --reference-program, each fixture's output is compared with its reference output.
    /// With --reference-program, the output is compared with that program's output instead.
    Run(RunOpts),

    /// List suites, their groups and fixture counts
    List(ListOpts),

    /// Build a program, or reuse a cached build, and print the executable's path
    Build(BuildOpts),
}

#[derive(Debug, Args)]
struct RunOpts {
    /// The program under test
    #[arg(long, value_name = "SOURCE")]
    candidate: Utf8PathBuf,

    /// Compare against this program's output instead of reference outputs
    #[arg(long, value_name = "SOURCE", visible_alias = "baseline")]
    reference_program: Option<Utf8PathBuf>,

    /// Directories to search for fixtures
    #[arg(required = true, value_name = "FIXTURE_ROOTS")]
    roots: Vec<Utf8PathBuf>,

    /// Base directory for fixture names [default: current directory]
    #[arg(long, value_name = "DIR")]
    base: Option<Utf8PathBuf>,

    /// Time limit for each run of each program, e.g. "2s" or "500ms"
    #[arg(long, value_name = "DURATION", env = "VERDICT_TIMEOUT")]
    timeout: Option<humantime::Duration>,

    /// Number of fixtures to run simultaneously [possible values: integer or "num-cpus"]
    #[arg(
        long,
        short = 'j',
        value_name = "THREADS",
        allow_negative_numbers = true,
        env = "VERDICT_TEST_THREADS"
    )]
    test_threads: Option<TestThreads>,

    /// Do not write a report directory
    #[arg(long, conflicts_with = "report_dir")]
    no_report: bool,

    /// Directory under which the report directory is created [default: from config]
    #[arg(long, value_name = "DIR")]
    report_dir: Option<Utf8PathBuf>,
}

impl RunOpts {
    fn exec(self, config_opts: &ConfigOpts, output: OutputContext) -> Result<i32> {
        let config = config_opts.make_config()?;
        let profile = config.profile(&config_opts.profile)?;

        let base = match self.base {
            Some(base) => base,
            None => current_dir()?,
        };
        let fixtures = fixture::discover_fixtures(&base, &self.roots, config.fixture_naming())?;
        if fixtures.is_empty() {
            return Err(ExpectedError::NoFixtures { roots: self.roots });
        }

        let mode = match self.reference_program {
            Some(baseline) => RunMode::Differential {
                candidate: self.candidate,
                baseline,
            },
            None => RunMode::Reference {
                candidate: self.candidate,
            },
        };

        let cache = BuildCache::new(config.cache_dir(), Box::new(config.compiler()));
        let runner = TokioProcessRunner::new(profile.grace_period());
        let mut builder = RunSessionBuilder::default();
        if let Some(timeout) = self.timeout {
            builder.set_timeout(timeout.into());
        }
        if let Some(test_threads) = self.test_threads {
            builder.set_test_threads(test_threads);
        }
        let session = builder.build(&profile, &cache, runner)?;
        debug!(
            profile = profile.name(),
            timeout = ?session.timeout(),
            test_threads = session.test_threads(),
            "starting run"
        );

        let styles = output.stdout_styles();
        let mut printer = ProgressPrinter::new(&styles, output.verbose);
        let summary =
            session.execute_with_reporter(&fixtures, &mode, |event| printer.handle(event, &fixtures))?;
        printer.finish()?;

        write_summary(&summary, &styles).map_err(|err| ExpectedError::WriteOutput { err })?;

        if !self.no_report {
            let report_root = self.report_dir.unwrap_or_else(|| config.report_dir());
            let writer = ReportWriter::for_summary(&report_root, &summary);
            writer.write(&summary)?;
            info!("wrote report to {}", writer.dir());
        }

        if summary.is_success() {
            Ok(VerdictExitCode::OK)
        } else {
            let failed = summary
                .results()
                .iter()
                .filter(|result| !result.status.is_success())
                .count();
            Err(ExpectedError::fixtures_failed(failed, summary.total()))
        }
    }
}

/// Prints one line per finished fixture to stdout.
struct ProgressPrinter<'a> {
    styles: &'a StdoutStyles,
    verbose: bool,
    stdout: io::StdoutLock<'static>,
    error: Option<io::Error>,
}

impl<'a> ProgressPrinter<'a> {
    fn new(styles: &'a StdoutStyles, verbose: bool) -> Self {
        Self {
            styles,
            verbose,
            stdout: io::stdout().lock(),
            error: None,
        }
    }

    fn handle(&mut self, event: SessionEvent<'_>, fixtures: &[TestFixture]) {
        if self.error.is_some() {
            return;
        }
        let line = match event {
            SessionEvent::RunStarted {
                fixture_count,
                test_threads,
                ..
            } => format!(
                "{:>12} {} {} with {} {}\n",
                "Starting".style(self.styles.pass),
                fixture_count.style(self.styles.count),
                plural::fixtures_str(fixture_count),
                test_threads.style(self.styles.count),
                if test_threads == 1 { "thread" } else { "threads" },
            ),
            SessionEvent::FixtureFinished { result, .. } => {
                let mut line = self.status_line(result);
                if self.verbose {
                    if let Some(detail) = difference_detail(result, fixtures) {
                        swrite!(line, "{:>14}{detail}\n", "");
                    }
                }
                line
            }
        };
        if let Err(err) = self.stdout.write_all(line.as_bytes()) {
            self.error = Some(err);
        }
    }

    fn status_line(&self, result: &ClassifiedResult) -> String {
        let style = match result.status {
            FixtureStatus::NoReference => self.styles.skip,
            status if status.is_success() => self.styles.pass,
            _ => self.styles.fail,
        };
        let time = match (result.candidate(), result.baseline()) {
            (Some(a), Some(b)) => format!(
                "{} {}",
                format_secs(a.elapsed),
                format_secs(b.elapsed)
            ),
            (Some(a), None) => format_secs(a.elapsed),
            _ => "-".to_owned(),
        };
        format!(
            "{:>15}  {time}  {}\n",
            result.status.style(style),
            result.fixture_id
        )
    }

    fn finish(mut self) -> Result<()> {
        if let Some(err) = self.error.take() {
            return Err(ExpectedError::WriteOutput { err });
        }
        self.stdout
            .flush()
            .map_err(|err| ExpectedError::WriteOutput { err })
    }
}

/// Describes where a wrong answer or mismatch first differs, if the outputs were retained.
fn difference_detail(result: &ClassifiedResult, fixtures: &[TestFixture]) -> Option<String> {
    let (left, right) = match result.status {
        FixtureStatus::WrongAnswer => {
            let reference = fixtures
                .iter()
                .find(|fixture| fixture.id() == &result.fixture_id)?
                .reference()?
                .read()
                .ok()?;
            (result.candidate()?.stdout.clone()?, reference)
        }
        FixtureStatus::Mismatch => (
            result.candidate()?.stdout.clone()?,
            result.baseline()?.stdout.clone()?,
        ),
        _ => return None,
    };

    let diff = first_difference(&left, &right)?;
    let token = |token: Option<&str>| match token {
        Some(token) => format!("`{token}`"),
        None => "end of output".to_owned(),
    };
    Some(format!(
        "first difference at token {}: {} vs {}",
        diff.index + 1,
        token(diff.left),
        token(diff.right)
    ))
}

fn write_summary(summary: &RunSummary, styles: &StdoutStyles) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out)?;
    writeln!(
        out,
        "{} {} {} in {:.3}s",
        "Summary:".style(styles.heading),
        summary.total().style(styles.count),
        plural::fixtures_str(summary.total()),
        summary.elapsed().as_secs_f64(),
    )?;
    for (status, count) in summary.counts() {
        writeln!(out, "{:>15}: {}", status, count.style(styles.count))?;
    }

    writeln!(out)?;
    writeln!(
        out,
        "{:>10} {:>6} {:>12} {:>12} {:>12} {:>12}",
        "bucket", "count", "total", "mean", "min", "max"
    )?;
    for (bucket, stats) in summary.timings() {
        writeln!(
            out,
            "{:>10} {:>6} {:>12} {:>12} {:>12} {:>12}",
            bucket.as_str(),
            stats.count,
            format_secs(stats.total),
            format_secs(stats.mean),
            format_secs(stats.min),
            format_secs(stats.max),
        )?;
    }
    out.flush()
}

#[derive(Debug, Args)]
struct ListOpts {
    /// Directory containing suites of fixture groups
    #[arg(value_name = "TESTS_ROOT", default_value = "tests")]
    tests_root: Utf8PathBuf,
}

impl ListOpts {
    fn exec(self, config_opts: &ConfigOpts, output: OutputContext) -> Result<i32> {
        let styles = output.stdout_styles();
        let config = config_opts.make_config()?;
        let naming = config.fixture_naming();

        let mut listing = String::new();
        for suite in fixture::list_suites(&self.tests_root)? {
            swrite!(listing, "{}\n", display_name(&suite).style(styles.heading));
            for group in fixture::list_groups(&suite)? {
                let count =
                    fixture::discover_fixtures(&group, std::slice::from_ref(&group), naming)?.len();
                swrite!(
                    listing,
                    "    {}: {} {}\n",
                    display_name(&group),
                    count.style(styles.count),
                    plural::fixtures_str(count)
                );
            }
        }

        if listing.is_empty() {
            info!("no suites found under {}", self.tests_root);
        }
        io::stdout()
            .lock()
            .write_all(listing.as_bytes())
            .map_err(|err| ExpectedError::WriteOutput { err })?;
        Ok(VerdictExitCode::OK)
    }
}

#[derive(Debug, Args)]
struct BuildOpts {
    /// The source file to build
    #[arg(value_name = "SOURCE")]
    source: Utf8PathBuf,
}

impl BuildOpts {
    fn exec(self, config_opts: &ConfigOpts) -> Result<i32> {
        let config = config_opts.make_config()?;
        let cache = BuildCache::new(config.cache_dir(), Box::new(config.compiler()));
        let handle = cache.acquire(&self.source)?;
        debug!(fingerprint = %handle.fingerprint(), "built `{}`", handle.source());

        writeln!(io::stdout().lock(), "{}", handle.path())
            .map_err(|err| ExpectedError::WriteOutput { err })?;
        Ok(VerdictExitCode::OK)
    }
}

fn display_name(dir: &Utf8Path) -> &str {
    dir.file_name().unwrap_or(dir.as_str())
}

fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|err| ExpectedError::CurrentDir { err })?;
    Utf8PathBuf::from_path_buf(dir).map_err(|path| ExpectedError::CurrentDirInvalidUtf8 { path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_verify_app() {
        VerdictApp::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let app = VerdictApp::try_parse_from([
            "verdict",
            "run",
            "--candidate",
            "a.cpp",
            "--baseline",
            "b.cpp",
            "--timeout",
            "2s",
            "-j",
            "-1",
            "tests/suite1",
            "tests/suite2",
        ])
        .unwrap();

        let Command::Run(opts) = app.command else {
            panic!("expected run command");
        };
        assert_eq!(opts.candidate, "a.cpp");
        assert_eq!(opts.reference_program.as_deref(), Some(Utf8Path::new("b.cpp")));
        assert_eq!(
            opts.timeout.map(std::time::Duration::from),
            Some(std::time::Duration::from_secs(2))
        );
        assert!(matches!(opts.test_threads, Some(TestThreads::Count(n)) if n >= 1));
        assert_eq!(opts.roots, vec!["tests/suite1", "tests/suite2"]);
    }

    #[test]
    fn test_parse_errors() {
        // Fixture roots are required.
        VerdictApp::try_parse_from(["verdict", "run", "--candidate", "a.cpp"]).unwrap_err();
        // Zero threads are rejected.
        VerdictApp::try_parse_from([
            "verdict",
            "run",
            "--candidate",
            "a.cpp",
            "-j",
            "0",
            "tests",
        ])
        .unwrap_err();
        VerdictApp::try_parse_from([
            "verdict",
            "run",
            "--candidate",
            "a.cpp",
            "--no-report",
            "--report-dir",
            "out",
            "tests",
        ])
        .unwrap_err();
    }

    #[test]
    fn test_difference_detail() {
        let fixtures = vec![TestFixture::inline("g/1", "", Some("1 2 3"))];
        let result = ClassifiedResult {
            fixture_id: fixtures[0].id().clone(),
            expected_path: None,
            status: FixtureStatus::WrongAnswer,
            detail: verdict_runner::runner::ResultDetail::Single(
                verdict_runner::runner::OutcomeRecord {
                    exit: verdict_runner::outcome::ExitKind::Success,
                    elapsed: std::time::Duration::ZERO,
                    stdout: Some("1 2".to_owned()),
                    stderr: None,
                },
            ),
        };
        assert_eq!(
            difference_detail(&result, &fixtures).as_deref(),
            Some("first difference at token 3: end of output vs `3`")
        );
    }
}
