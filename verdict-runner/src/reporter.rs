// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Writes a finished [`RunSummary`] to disk.
//!
//! Each run gets its own directory containing:
//!
//! * `results.csv`: one row per fixture;
//! * `summary.csv`: `metric,value` rows with counts and timing aggregates;
//! * `summary.json`: the whole summary;
//! * the retained output of failing fixtures, one text file per run.

use crate::{
    classify::FixtureStatus,
    errors::ReportWriteError,
    helpers::format_secs,
    runner::{ClassifiedResult, OutcomeRecord, ProgramRole, RunModeKind, RunSummary},
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{borrow::Cow, io::Write};
use swrite::{SWrite, swriteln};
use tracing::debug;

const RESULTS_FILE: &str = "results.csv";
const SUMMARY_CSV_FILE: &str = "summary.csv";
const SUMMARY_JSON_FILE: &str = "summary.json";

/// Writes report files for one run into a directory.
#[derive(Clone, Debug)]
pub struct ReportWriter {
    dir: Utf8PathBuf,
}

impl ReportWriter {
    /// Creates a writer for the given directory. The directory is created when the report is
    /// written.
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates a writer for a per-run directory under `report_root`, named after the programs and
    /// the start time of the run.
    pub fn for_summary(report_root: &Utf8Path, summary: &RunSummary) -> Self {
        Self::new(report_root.join(report_dir_name(summary)))
    }

    /// Returns the directory reports are written to.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Writes every report file for `summary`.
    pub fn write(&self, summary: &RunSummary) -> Result<(), ReportWriteError> {
        std::fs::create_dir_all(&self.dir).map_err(|err| ReportWriteError::CreateDir {
            dir: self.dir.clone(),
            err,
        })?;

        self.write_file(RESULTS_FILE, &results_csv(summary))?;
        self.write_file(SUMMARY_CSV_FILE, &summary_csv(summary))?;

        let path = self.dir.join(SUMMARY_JSON_FILE);
        let json = serde_json::to_string_pretty(summary)
            .map_err(|err| ReportWriteError::Serialize { path, err })?;
        self.write_file(SUMMARY_JSON_FILE, &json)?;

        let mut dumped = 0;
        for result in summary.results() {
            for (file_name, output) in output_dumps(summary.mode(), result) {
                self.write_file(&file_name, output)?;
                dumped += 1;
            }
        }

        debug!("wrote report to {} ({dumped} output dumps)", self.dir);
        Ok(())
    }

    fn write_file(&self, file_name: &str, contents: &str) -> Result<(), ReportWriteError> {
        let path = self.dir.join(file_name);
        atomicwrites::AtomicFile::new(&path, atomicwrites::AllowOverwrite)
            .write(|file| file.write_all(contents.as_bytes()))
            .map_err(|err| ReportWriteError::Write { path, err })
    }
}

/// Returns the name of the per-run report directory.
///
/// This is `bench_<stem>_<stamp>` in reference mode, and `stress_<stem A>_VS_<stem B>_<stamp>` in
/// differential mode.
pub fn report_dir_name(summary: &RunSummary) -> String {
    let stem = |role| {
        summary
            .program(role)
            .and_then(|program| program.source.file_stem())
            .unwrap_or("program")
    };
    let stamp = summary.start_time().format("%Y-%m-%d_%H-%M-%S");

    match summary.mode() {
        RunModeKind::Reference => format!("bench_{}_{stamp}", stem(ProgramRole::Candidate)),
        RunModeKind::Differential => format!(
            "stress_{}_VS_{}_{stamp}",
            stem(ProgramRole::Candidate),
            stem(ProgramRole::Baseline),
        ),
    }
}

fn results_csv(summary: &RunSummary) -> String {
    let mut out = String::new();
    match summary.mode() {
        RunModeKind::Reference => {
            swriteln!(out, "test_rel,expected_path,status,time_sec,return_code");
            for result in summary.results() {
                let expected = result
                    .expected_path
                    .as_deref()
                    .map_or("", |path| path.as_str());
                let run = result.candidate();
                swriteln!(
                    out,
                    "{},{},{},{},{}",
                    csv_field(result.fixture_id.as_str()),
                    csv_field(expected),
                    result.status,
                    time_field(run),
                    rc_field(run),
                );
            }
        }
        RunModeKind::Differential => {
            swriteln!(out, "test_rel,status,time_a_sec,time_b_sec,rc_a,rc_b");
            for result in summary.results() {
                let (a, b) = (result.candidate(), result.baseline());
                swriteln!(
                    out,
                    "{},{},{},{},{},{}",
                    csv_field(result.fixture_id.as_str()),
                    result.status,
                    time_field(a),
                    time_field(b),
                    rc_field(a),
                    rc_field(b),
                );
            }
        }
    }
    out
}

fn summary_csv(summary: &RunSummary) -> String {
    let mut out = String::new();
    swriteln!(out, "metric,value");
    swriteln!(out, "tests_total,{}", summary.total());
    for (status, count) in summary.counts() {
        swriteln!(out, "count_{status},{count}");
    }
    for (bucket, stats) in summary.timings() {
        swriteln!(out, "time_total_{bucket}_sec,{}", format_secs(stats.total));
        swriteln!(out, "time_avg_{bucket}_sec,{}", format_secs(stats.mean));
        swriteln!(out, "time_min_{bucket}_sec,{}", format_secs(stats.min));
        swriteln!(out, "time_max_{bucket}_sec,{}", format_secs(stats.max));
    }
    out
}

/// Returns the retained outputs of a result to dump, as (file name, contents) pairs.
///
/// File names are derived from the whole fixture id, so `g1/1` and `g2/1` dump to `g1__1.*` and
/// `g2__1.*`.
fn output_dumps(mode: RunModeKind, result: &ClassifiedResult) -> Vec<(String, &str)> {
    let name = dump_stem(result.fixture_id.as_str());
    match mode {
        RunModeKind::Reference => result
            .candidate()
            .and_then(|run| run.stdout.as_deref())
            .map(|stdout| vec![(format!("{name}.my.txt"), stdout)])
            .unwrap_or_default(),
        RunModeKind::Differential => {
            if result.status != FixtureStatus::Mismatch {
                return Vec::new();
            }
            [("A", result.candidate()), ("B", result.baseline())]
                .into_iter()
                .filter_map(|(suffix, run)| {
                    let stdout = run?.stdout.as_deref()?;
                    Some((format!("{name}.{suffix}.txt"), stdout))
                })
                .collect()
        }
    }
}

fn dump_stem(fixture_id: &str) -> String {
    fixture_id.replace(['/', '\\'], "__")
}

fn time_field(run: Option<&OutcomeRecord>) -> String {
    run.map(|run| format_secs(run.elapsed)).unwrap_or_default()
}

fn rc_field(run: Option<&OutcomeRecord>) -> String {
    run.map(|run| run.exit.return_code().to_string())
        .unwrap_or_default()
}

/// Quotes a CSV field if it contains a separator, a quote or a line break.
fn csv_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
