// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use bytes::Bytes;
use color_eyre::eyre::{Result, ensure};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};
use verdict_runner::{
    classify::FixtureStatus,
    fixture::TestFixture,
    outcome::{ExitKind, FailureStatus},
    runner::{ProcessRunner, RunMode, TokioProcessRunner},
    stats::StatsBucket,
};

#[test]
fn test_discovered_fixtures_accepted() -> Result<()> {
    let ws = TestWorkspace::new()?;
    ws.fixture_file("g1/1", "3\n")?;
    ws.fixture_file("g1/A 1", "6\n")?;
    ws.fixture_file("g1/2", "10\n")?;
    ws.fixture_file("g1/2.out", "21\n")?;
    ws.fixture_file("g2/7", "1\n")?;
    let candidate = ws.program("double.sh", "read n; echo $((n * 2))")?;

    let fixtures = ws.discover()?;
    let ids: Vec<_> = fixtures.iter().map(|f| f.id().as_str()).collect();
    assert_eq!(ids, vec!["g1/1", "g1/2", "g2/7"]);

    let summary = ws.run(
        &fixtures,
        &RunMode::Reference { candidate },
        Duration::from_secs(10),
    )?;
    let statuses: Vec<_> = summary.results().iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            FixtureStatus::Accepted,
            FixtureStatus::WrongAnswer,
            FixtureStatus::NoReference,
        ]
    );
    assert_eq!(
        summary.results()[0].expected_path,
        Some(ws.tests_dir().join("g1/A 1"))
    );
    assert_eq!(summary.results()[2].expected_path, None);

    let exit0 = summary.bucket(StatsBucket::Exit0);
    assert_eq!(exit0.count, 3);
    assert_eq!(exit0.mean, exit0.total / 3);
    assert!(exit0.min <= exit0.mean && exit0.mean <= exit0.max);
    assert_eq!(summary.bucket(StatsBucket::Accepted).count, 1);
    Ok(())
}

#[test]
fn test_runtime_error() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let candidate = ws.program("crash.sh", "echo partial; exit 3")?;
    let fixtures = vec![TestFixture::inline("t", "", Some("partial"))];

    let summary = ws.run(
        &fixtures,
        &RunMode::Reference { candidate },
        Duration::from_secs(10),
    )?;
    let result = &summary.results()[0];
    assert_eq!(result.status, FixtureStatus::RuntimeError);

    let run = result.candidate().expect("fixture was executed");
    assert_eq!(
        run.exit,
        ExitKind::Failed {
            status: FailureStatus::ExitCode(3)
        }
    );
    assert_eq!(run.exit.return_code(), 3);
    assert_eq!(run.stdout.as_deref(), Some("partial\n"));
    assert_eq!(summary.bucket(StatsBucket::Exit0).count, 0);
    assert_eq!(summary.bucket(StatsBucket::All).count, 1);
    Ok(())
}

#[test]
fn test_timeout_is_clamped() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let candidate = ws.program("slow.sh", "echo started; sleep 10")?;
    let fixtures = vec![TestFixture::inline("t", "", Some("started"))];
    let timeout = Duration::from_millis(300);

    let start = Instant::now();
    let summary = ws.run(&fixtures, &RunMode::Reference { candidate }, timeout)?;
    ensure!(
        start.elapsed() < Duration::from_secs(8),
        "the run was stopped well before the program finished"
    );

    let result = &summary.results()[0];
    assert_eq!(result.status, FixtureStatus::Timeout);
    let run = result.candidate().expect("fixture was executed");
    assert_eq!(run.elapsed, timeout);
    assert_eq!(run.exit.return_code(), -1);
    assert_eq!(run.stdout.as_deref(), Some("started\n"));
    assert_eq!(summary.bucket(StatsBucket::All).max, timeout);
    Ok(())
}

#[test]
fn test_sigterm_ignored_is_killed() -> Result<()> {
    let ws = TestWorkspace::new()?;
    // Ignored signals are inherited, so the sleeps ignore SIGTERM as well.
    let program = ws.root().join("stubborn.sh");
    write_executable(
        &program,
        "#!/bin/sh\ntrap '' TERM\nwhile :; do sleep 0.05; done\n",
    )?;

    let runtime = tokio::runtime::Runtime::new()?;
    let runner = TokioProcessRunner::new(Duration::from_millis(200));
    let start = Instant::now();
    let output = runtime.block_on(runner.run_with_timeout(
        &program,
        Bytes::new(),
        Duration::from_millis(200),
    ))?;

    assert_eq!(output.exit, ExitKind::TimedOut);
    ensure!(
        start.elapsed() < Duration::from_secs(5),
        "process group was killed after the grace period, took {:?}",
        start.elapsed()
    );
    Ok(())
}

#[test]
fn test_large_input() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let candidate = ws.program("count.sh", "wc -l")?;
    let input = "1\n".repeat(200_000);
    let fixtures = vec![TestFixture::inline("big", input, Some("200000"))];

    let summary = ws.run(
        &fixtures,
        &RunMode::Reference { candidate },
        Duration::from_secs(10),
    )?;
    assert_eq!(summary.results()[0].status, FixtureStatus::Accepted);
    Ok(())
}
