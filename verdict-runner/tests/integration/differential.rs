// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use pretty_assertions::assert_eq;
use std::time::Duration;
use verdict_runner::{
    classify::FixtureStatus,
    fixture::TestFixture,
    runner::{RunMode, RunSummary},
    stats::StatsBucket,
};

fn differential(
    ws: &TestWorkspace,
    candidate: &str,
    baseline: &str,
    fixtures: &[TestFixture],
) -> Result<RunSummary> {
    let candidate = ws.program(&format!("{candidate}.sh"), &body(candidate))?;
    let baseline = ws.program(&format!("{baseline}.sh"), &body(baseline))?;
    ws.run(
        fixtures,
        &RunMode::Differential {
            candidate,
            baseline,
        },
        Duration::from_millis(500),
    )
}

fn body(name: &str) -> String {
    match name {
        "five" => "echo 5".to_owned(),
        "five-spaced" => "printf '5 \\n'".to_owned(),
        "echo" => "cat".to_owned(),
        "crash" => "exit 1".to_owned(),
        "slow" => "sleep 10".to_owned(),
        other => panic!("unknown program {other}"),
    }
}

fn fixtures() -> Vec<TestFixture> {
    vec![
        TestFixture::inline("t/1", "5\n", None),
        TestFixture::inline("t/2", "6\n", None),
    ]
}

#[test]
fn test_match_ignores_whitespace() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let summary = differential(&ws, "five", "five-spaced", &fixtures()[..1])?;
    assert_eq!(summary.results()[0].status, FixtureStatus::Match);
    assert_eq!(summary.bucket(StatsBucket::MatchedA).count, 1);
    assert_eq!(summary.bucket(StatsBucket::MatchedB).count, 1);
    assert!(summary.is_success());
    Ok(())
}

#[test]
fn test_mismatch_counts() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let summary = differential(&ws, "five", "echo", &fixtures())?;
    let statuses: Vec<_> = summary.results().iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![FixtureStatus::Match, FixtureStatus::Mismatch]);
    assert_eq!(summary.bucket(StatsBucket::AllA).count, 2);
    assert_eq!(summary.bucket(StatsBucket::MatchedA).count, 1);

    let mismatch = &summary.results()[1];
    assert_eq!(mismatch.candidate().unwrap().stdout.as_deref(), Some("5\n"));
    assert_eq!(mismatch.baseline().unwrap().stdout.as_deref(), Some("6\n"));
    Ok(())
}

#[test]
fn test_symmetry() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let pairs = [
        ("crash", "five", FixtureStatus::RuntimeErrorA, FixtureStatus::RuntimeErrorB),
        ("slow", "five", FixtureStatus::TimeoutA, FixtureStatus::TimeoutB),
        ("five", "echo", FixtureStatus::Mismatch, FixtureStatus::Mismatch),
    ];

    let all = fixtures();
    let fixtures = &all[1..];
    for (a, b, forward, backward) in pairs {
        let summary = differential(&ws, a, b, fixtures)?;
        assert_eq!(summary.results()[0].status, forward, "{a} vs {b}");
        let summary = differential(&ws, b, a, fixtures)?;
        assert_eq!(summary.results()[0].status, backward, "{b} vs {a}");
    }
    Ok(())
}

#[test]
fn test_match_count_survives_swap() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let fixtures = vec![
        TestFixture::inline("t/1", "5\n", None),
        TestFixture::inline("t/2", "6\n", None),
        TestFixture::inline("t/3", "5 \n", None),
        TestFixture::inline("u/1", "7\n", None),
    ];

    for (a, b, matches) in [("five", "echo", 2), ("five-spaced", "echo", 2), ("crash", "five", 0)] {
        let forward = differential(&ws, a, b, &fixtures)?;
        let backward = differential(&ws, b, a, &fixtures)?;
        assert_eq!(forward.count(FixtureStatus::Match), matches, "{a} vs {b}");
        assert_eq!(
            forward.count(FixtureStatus::Match),
            backward.count(FixtureStatus::Match),
            "{a} vs {b} swapped"
        );
        assert_eq!(
            forward.count(FixtureStatus::Mismatch),
            backward.count(FixtureStatus::Mismatch),
            "{a} vs {b} swapped"
        );
    }
    Ok(())
}

#[test]
fn test_timeout_takes_precedence() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let summary = differential(&ws, "crash", "slow", &fixtures()[..1])?;
    assert_eq!(summary.results()[0].status, FixtureStatus::TimeoutB);
    assert_eq!(
        summary.results()[0].baseline().unwrap().elapsed,
        Duration::from_millis(500)
    );
    Ok(())
}
