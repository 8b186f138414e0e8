// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{config::get_num_cpus, errors::TestThreadsParseError};
use serde::{Deserialize, Deserializer, de::Error as _};
use std::str::FromStr;

/// How many fixtures run at the same time.
///
/// Written as a positive count, a negative offset from the logical CPU count (`-1` leaves one
/// CPU free, never dropping below one thread) or `num-cpus`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestThreads {
    /// A fixed number of threads.
    Count(usize),

    /// One thread per logical CPU.
    NumCpus,
}

impl TestThreads {
    /// Resolves the number of threads to use.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(threads) => threads,
            Self::NumCpus => get_num_cpus(),
        }
    }

    fn from_signed(n: i64) -> Result<Self, TestThreadsParseError> {
        if n == 0 {
            return Err(TestThreadsParseError::new("0 (must be non-zero)"));
        }
        let count = if n > 0 {
            usize::try_from(n).unwrap_or(usize::MAX)
        } else {
            let cpus = i64::try_from(get_num_cpus()).unwrap_or(i64::MAX);
            cpus.saturating_add(n).max(1) as usize
        };
        Ok(Self::Count(count))
    }
}

impl FromStr for TestThreads {
    type Err = TestThreadsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }
        let n = s
            .parse::<i64>()
            .map_err(|_| TestThreadsParseError::new(s))?;
        Self::from_signed(n)
    }
}

impl<'de> Deserialize<'de> for TestThreads {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // TOML integers arrive as i64; strings also cover environment overrides like "4".
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
        }

        let parsed = match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Self::from_signed(n),
            Raw::Str(s) => s.parse(),
        };
        parsed.map_err(D::Error::custom)
    }
}
