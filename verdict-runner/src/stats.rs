// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregate timing statistics, partitioned into buckets by outcome.
//!
//! Only running aggregates are kept: count, total, minimum and maximum. The mean is computed when
//! the statistics are finalized. Empty buckets report zeros.

use crate::{
    classify::FixtureStatus,
    runner::{ClassifiedResult, ResultDetail, RunModeKind},
};
use indexmap::IndexMap;
use serde::Serialize;
use std::{fmt, time::Duration};

/// A partition of results used for aggregate timing statistics.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsBucket {
    /// Reference mode: every run that was executed, with timeouts at the configured timeout.
    All,

    /// Reference mode: every run that exited with status 0, whatever its output.
    Exit0,

    /// Reference mode: every run classified as accepted.
    Accepted,

    /// Differential mode: every candidate run.
    AllA,

    /// Differential mode: every baseline run.
    AllB,

    /// Differential mode: candidate runs on fixtures where the outputs matched.
    MatchedA,

    /// Differential mode: baseline runs on fixtures where the outputs matched.
    MatchedB,
}

impl StatsBucket {
    /// The buckets maintained in reference mode, in report order.
    pub const REFERENCE: &'static [Self] = &[Self::All, Self::Exit0, Self::Accepted];

    /// The buckets maintained in differential mode, in report order.
    pub const DIFFERENTIAL: &'static [Self] =
        &[Self::AllA, Self::AllB, Self::MatchedA, Self::MatchedB];

    /// Returns the name of this bucket as it appears in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Exit0 => "exit0",
            Self::Accepted => "accepted",
            Self::AllA => "all_a",
            Self::AllB => "all_b",
            Self::MatchedA => "matched_a",
            Self::MatchedB => "matched_b",
        }
    }
}

impl fmt::Display for StatsBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Finalized statistics for one bucket.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TimingStats {
    /// The number of samples.
    pub count: usize,

    /// The sum of all samples.
    #[serde(with = "humantime_serde")]
    pub total: Duration,

    /// The mean of all samples, or zero if there are none.
    #[serde(with = "humantime_serde")]
    pub mean: Duration,

    /// The smallest sample, or zero if there are none.
    #[serde(with = "humantime_serde")]
    pub min: Duration,

    /// The largest sample, or zero if there are none.
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

/// A running count, sum, minimum and maximum.
#[derive(Clone, Debug, Default)]
pub struct TimingAccumulator {
    count: usize,
    total: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
}

impl TimingAccumulator {
    /// Adds a sample.
    pub fn add(&mut self, sample: Duration) {
        self.count += 1;
        self.total += sample;
        self.min = Some(self.min.map_or(sample, |min| min.min(sample)));
        self.max = Some(self.max.map_or(sample, |max| max.max(sample)));
    }

    /// Computes the final statistics.
    pub fn finalize(&self) -> TimingStats {
        let mean = match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.total / count,
            Err(_) => self.total.div_f64(self.count as f64),
        };
        TimingStats {
            count: self.count,
            total: self.total,
            mean,
            min: self.min.unwrap_or_default(),
            max: self.max.unwrap_or_default(),
        }
    }
}

/// Per-status counts and per-bucket timings for a finished run.
#[derive(Clone, Debug, Serialize)]
pub struct AggregateStats {
    /// The number of results with each status, including zeros, in report order.
    pub counts: IndexMap<FixtureStatus, usize>,

    /// The timing statistics of each bucket, in report order.
    pub timings: IndexMap<StatsBucket, TimingStats>,
}

/// Folds classified results into per-status counts and per-bucket timing aggregates.
#[derive(Clone, Debug)]
pub struct StatsAggregator {
    counts: IndexMap<FixtureStatus, usize>,
    buckets: IndexMap<StatsBucket, TimingAccumulator>,
}

impl StatsAggregator {
    /// Creates an aggregator for results of the given mode.
    pub fn new(mode: RunModeKind) -> Self {
        Self {
            counts: mode.statuses().iter().map(|&status| (status, 0)).collect(),
            buckets: mode
                .buckets()
                .iter()
                .map(|&bucket| (bucket, TimingAccumulator::default()))
                .collect(),
        }
    }

    /// Records one result.
    pub fn record(&mut self, result: &ClassifiedResult) {
        *self.counts.entry(result.status).or_default() += 1;

        match &result.detail {
            ResultDetail::Single(run) => {
                self.add(StatsBucket::All, run.elapsed);
                if run.exit.is_success() {
                    self.add(StatsBucket::Exit0, run.elapsed);
                }
                if result.status == FixtureStatus::Accepted {
                    self.add(StatsBucket::Accepted, run.elapsed);
                }
            }
            ResultDetail::Pair { a, b } => {
                self.add(StatsBucket::AllA, a.elapsed);
                self.add(StatsBucket::AllB, b.elapsed);
                if result.status == FixtureStatus::Match {
                    self.add(StatsBucket::MatchedA, a.elapsed);
                    self.add(StatsBucket::MatchedB, b.elapsed);
                }
            }
            // Setup failures never ran, so they have no timing.
            ResultDetail::SetupFailed { .. } => {}
        }
    }

    fn add(&mut self, bucket: StatsBucket, sample: Duration) {
        // Buckets are fixed per mode; a result of the other mode's shape is ignored.
        if let Some(acc) = self.buckets.get_mut(&bucket) {
            acc.add(sample);
        }
    }

    /// Computes the final statistics.
    pub fn finalize(&self) -> AggregateStats {
        AggregateStats {
            counts: self.counts.clone(),
            timings: self
                .buckets
                .iter()
                .map(|(&bucket, acc)| (bucket, acc.finalize()))
                .collect(),
        }
    }
}
